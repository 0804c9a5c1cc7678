//! Codec identifiers for `CODECS=` attributes.

/// H.264 High profile, level 4.1: what the encoder is told to produce.
pub const H264_HIGH_41: &str = "avc1.640029";

/// AAC-LC.
pub const AAC_LC: &str = "mp4a.40.2";

/// Map a video codec name to its identifier.
pub fn video_codec_tag(codec: &str) -> &'static str {
    match codec.to_lowercase().as_str() {
        "h264" | "avc" | "avc1" => H264_HIGH_41,
        "h265" | "hevc" | "hvc1" => "hvc1.1.6.L93.B0",
        "av1" => "av01.0.08M.08",
        "vp9" => "vp09.00.10.08",
        _ => H264_HIGH_41,
    }
}

/// Map an audio codec name to its identifier.
pub fn audio_codec_tag(codec: &str) -> &'static str {
    match codec.to_lowercase().as_str() {
        "aac" | "aac-lc" => AAC_LC,
        "he-aac" | "aac-he" => "mp4a.40.5",
        "ac3" => "ac-3",
        "eac3" | "e-ac3" => "ec-3",
        "opus" => "Opus",
        "flac" => "fLaC",
        _ => AAC_LC,
    }
}

/// Build a `CODECS` attribute value from optional video and audio codec names.
pub fn codecs_attribute(video: Option<&str>, audio: Option<&str>) -> String {
    match (video, audio) {
        (Some(v), Some(a)) => format!("{},{}", video_codec_tag(v), audio_codec_tag(a)),
        (Some(v), None) => video_codec_tag(v).to_string(),
        (None, Some(a)) => audio_codec_tag(a).to_string(),
        (None, None) => H264_HIGH_41.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codecs_attribute() {
        assert_eq!(
            codecs_attribute(Some("h264"), Some("aac")),
            "avc1.640029,mp4a.40.2"
        );
        assert_eq!(codecs_attribute(Some("HEVC"), None), "hvc1.1.6.L93.B0");
        assert_eq!(codecs_attribute(None, Some("eac3")), "ec-3");
    }
}
