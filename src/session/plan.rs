//! Encoding plan: segment accounting and encoder arguments.

use super::ladder::Rendition;
use hlsvod_av::SourceMedia;
use std::collections::BTreeMap;
use std::path::Path;

/// Frame rate assumed when the probe did not report one.
const DEFAULT_FRAME_RATE: f64 = 24.0;

/// Audio codecs that can be copied into MPEG-TS segments.
const DIRECT_AUDIO_CODECS: &[&str] = &["aac"];

/// Default nominal segment length in seconds.
pub const DEFAULT_SEGMENT_LENGTH: u32 = 3;

/// Where the encoder starts and how long its segments are.
#[derive(Debug, Clone)]
pub struct EncodingPlan {
    /// Nominal segment length in seconds.
    pub segment_length: u32,
    /// First segment number of the current encoder run.
    pub segment_start: u32,
    /// Burn the default subtitle stream into the video.
    pub hardcode_subtitles: bool,
    frame_rate: f64,
    durations: BTreeMap<String, Vec<f64>>,
}

impl EncodingPlan {
    /// Create a plan for a source.
    pub fn new(source: &SourceMedia, segment_length: u32, hardcode_subtitles: bool) -> Self {
        Self {
            segment_length: segment_length.max(1),
            segment_start: 0,
            hardcode_subtitles,
            frame_rate: source.video.frame_rate.unwrap_or(DEFAULT_FRAME_RATE),
            durations: BTreeMap::new(),
        }
    }

    /// Output frame rate.
    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Whether the frame rate is a 1000/1001 rate such as 23.976 or 29.97.
    pub fn is_ntsc(&self) -> bool {
        (self.frame_rate - self.frame_rate.round()).abs() > 1e-3
    }

    /// Segment length in seconds as the encoder will actually cut it.
    ///
    /// NTSC rates stretch the nominal length by 1001/1000 (3 becomes 3.003)
    /// so segment boundaries stay on whole frames.
    pub fn actual_segment_length(&self) -> f64 {
        let nominal = self.segment_length as f64;
        if self.is_ntsc() {
            nominal * 1001.0 / 1000.0
        } else {
            nominal
        }
    }

    /// [`actual_segment_length`](Self::actual_segment_length) with three decimals.
    pub fn actual_segment_length_string(&self) -> String {
        format!("{:.3}", self.actual_segment_length())
    }

    /// Keyframe interval in frames, so every segment starts on a keyframe.
    pub fn gop_size(&self) -> u32 {
        (self.frame_rate * self.segment_length as f64).round().max(1.0) as u32
    }

    /// Frame rate argument; NTSC rates are given as exact rationals.
    pub fn frame_rate_arg(&self) -> String {
        if self.is_ntsc() {
            format!("{}/1001", (self.frame_rate * 1.001).round() as u64 * 1000)
        } else {
            format!("{}", self.frame_rate.round() as u64)
        }
    }

    /// Record the real segment durations of a rendition.
    pub fn record_durations(&mut self, rendition: &str, durations: Vec<f64>) {
        self.durations.insert(rendition.to_string(), durations);
    }

    /// Recorded durations of a rendition, if any.
    pub fn durations(&self, rendition: &str) -> Option<&[f64]> {
        self.durations.get(rendition).map(Vec::as_slice)
    }

    /// Number of segments in a rendition, when its durations are known.
    pub fn segment_count(&self, rendition: &str) -> Option<u32> {
        self.durations(rendition).map(|d| d.len() as u32)
    }

    /// Timestamp at which a segment starts.
    ///
    /// Sums recorded durations of all earlier segments; segments without a
    /// recorded duration count as one actual segment length.
    pub fn segment_start_time(&self, rendition: &str, segment: u32) -> f64 {
        let recorded = self.durations(rendition).unwrap_or(&[]);
        let segment = segment as usize;
        let known = segment.min(recorded.len());
        let missing = segment - known;

        recorded[..known].iter().sum::<f64>() + missing as f64 * self.actual_segment_length()
    }

    /// Start time of the current run.
    pub fn start_time(&self, rendition: &str) -> f64 {
        self.segment_start_time(rendition, self.segment_start)
    }

    /// Whether the rendition will copy the source video.
    pub fn copies_video(&self, source: &SourceMedia, rendition: &Rendition) -> bool {
        rendition.is_direct() && !self.burns_subtitles(source)
    }

    fn burns_subtitles(&self, source: &SourceMedia) -> bool {
        self.hardcode_subtitles && source.default_subtitle().is_some()
    }

    /// Full encoder argument list for one run of `rendition` into `output_dir`.
    pub fn encoder_args(
        &self,
        source: &SourceMedia,
        rendition: &Rendition,
        output_dir: &Path,
    ) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        let mut push = |items: &[&str]| args.extend(items.iter().map(|s| s.to_string()));

        push(&["-loglevel", "warning"]);
        if self.segment_start > 0 {
            let start = format!("{:.6}", self.start_time(&rendition.name));
            push(&["-ss", &start, "-noaccurate_seek"]);
        }
        push(&["-i", &source.file_path.to_string_lossy()]);

        let burn_in = self.burns_subtitles(source);
        push(&["-threads", "0", "-map_metadata", "-1", "-map_chapters", "-1"]);
        if burn_in {
            push(&["-map", "[v]"]);
        } else {
            push(&["-map", &format!("0:{}", source.video.index)]);
        }
        let audio = source.default_audio();
        if let Some(audio) = audio {
            push(&["-map", &format!("0:{}", audio.index)]);
        }
        if !burn_in {
            push(&["-map", "-0:s"]);
        }
        push(&["-r", &self.frame_rate_arg(), "-sc_threshold", "0"]);

        if self.copies_video(source, rendition) {
            push(&["-c:v", "copy"]);
        } else {
            let (width, height) = rendition.encode_size(source);
            let rate = rendition.video_bit_rate;
            push(&[
                "-codec:v:0",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-preset",
                "veryfast",
                "-crf",
                "23",
                "-maxrate",
                &rate.to_string(),
                "-bufsize",
                &(rate * 2).to_string(),
                "-profile:v:0",
                "high",
                "-level",
                "41",
            ]);

            let scale = format!(
                "scale='trunc(min(max(iw,ih*dar),{})/2)*2':'trunc(ow/dar/2)*2'",
                width
            );
            match source.default_subtitle().filter(|_| burn_in) {
                Some(subtitle) => {
                    let graph = format!(
                        "[0:{}]scale={}x{}[sub];[0:{}]{}[base];[base][sub]overlay[v]",
                        subtitle.index, width, height, source.video.index, scale
                    );
                    push(&["-filter_complex", &graph]);
                }
                None => push(&["-vf", &scale]),
            }
        }

        push(&["-start_at_zero", "-vsync", "-1", "-g", &self.gop_size().to_string()]);

        if let Some(audio) = audio {
            if DIRECT_AUDIO_CODECS.contains(&audio.codec.to_lowercase().as_str()) {
                push(&["-c:a", "copy"]);
            } else {
                let channels = audio.channels.unwrap_or(2).to_string();
                let bit_rate = rendition.audio_bit_rate.to_string();
                push(&["-codec:a:0", "aac", "-ac", &channels, "-ab", &bit_rate]);
            }
        }

        let segment_pattern = output_dir.join(format!("{}-%d.ts", rendition.name));
        let encoder_playlist = output_dir.join(encoder_playlist_name(&rendition.name));
        push(&[
            "-f",
            "hls",
            "-copyts",
            "-avoid_negative_ts",
            "disabled",
            "-max_delay",
            "5000000",
            "-max_muxing_queue_size",
            "2048",
            "-hls_time",
            &self.segment_length.to_string(),
            "-hls_segment_type",
            "mpegts",
            "-start_number",
            &self.segment_start.to_string(),
            "-hls_playlist_type",
            "vod",
            "-hls_list_size",
            "0",
            "-hls_allow_cache",
            "0",
            "-hls_flags",
            "temp_file",
            "-hls_segment_filename",
            &segment_pattern.to_string_lossy(),
            &encoder_playlist.to_string_lossy(),
        ]);

        args
    }
}

/// Scratch playlist the encoder writes, kept apart from the served one.
pub fn encoder_playlist_name(rendition: &str) -> String {
    format!("{}.encoder.m3u8", rendition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ladder::tests::source;
    use crate::session::ladder::{LadderOptions, QualityLadder};
    use hlsvod_av::SubtitleStream;

    fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_ntsc_segment_length() {
        let media = source("hevc", 1920, 1080, 10_000_000);
        let plan = EncodingPlan::new(&media, 3, false);

        assert!(plan.is_ntsc());
        assert!((plan.actual_segment_length() - 3.003).abs() < 1e-9);
        assert_eq!(plan.actual_segment_length_string(), "3.003");
        assert_eq!(plan.gop_size(), 72);
        assert_eq!(plan.frame_rate_arg(), "24000/1001");
    }

    #[test]
    fn test_integer_frame_rate_segment_length() {
        let mut media = source("hevc", 1920, 1080, 10_000_000);
        media.video.frame_rate = Some(24.0);
        let plan = EncodingPlan::new(&media, 3, false);

        assert!(!plan.is_ntsc());
        assert_eq!(plan.actual_segment_length(), 3.0);
        assert_eq!(plan.actual_segment_length_string(), "3.000");
        assert_eq!(plan.gop_size(), 72);
        assert_eq!(plan.frame_rate_arg(), "24");
    }

    #[test]
    fn test_29_97_frame_rate() {
        let mut media = source("hevc", 1920, 1080, 10_000_000);
        media.video.frame_rate = Some(30000.0 / 1001.0);
        let plan = EncodingPlan::new(&media, 3, false);

        assert_eq!(plan.gop_size(), 90);
        assert_eq!(plan.frame_rate_arg(), "30000/1001");
    }

    #[test]
    fn test_segment_start_time_uses_recorded_durations() {
        let media = source("hevc", 1920, 1080, 10_000_000);
        let mut plan = EncodingPlan::new(&media, 3, false);

        // Nothing recorded yet: actual length times index.
        assert!((plan.segment_start_time("720p", 10) - 30.03).abs() < 1e-9);

        plan.record_durations("720p", vec![2.5, 3.5, 3.0]);
        assert_eq!(plan.segment_start_time("720p", 0), 0.0);
        assert_eq!(plan.segment_start_time("720p", 2), 6.0);
        // Past the recorded list, fall back per missing segment.
        assert!((plan.segment_start_time("720p", 4) - (9.0 + 3.003)).abs() < 1e-9);
        // Other renditions are unaffected.
        assert!((plan.segment_start_time("480p", 2) - 6.006).abs() < 1e-9);
    }

    #[test]
    fn test_segment_start_time_far_past_recorded_list() {
        let media = source("hevc", 1920, 1080, 10_000_000);
        let mut plan = EncodingPlan::new(&media, 3, false);
        plan.record_durations("720p", vec![2.5, 3.5]);

        let start = std::time::Instant::now();
        let secs = plan.segment_start_time("720p", u32::MAX);
        assert!(start.elapsed() < std::time::Duration::from_millis(100));

        let expected = 6.0 + (u32::MAX as f64 - 2.0) * 3.003;
        assert!((secs - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn test_transcode_args() {
        let mut media = source("hevc", 1920, 1080, 10_000_000);
        media.audio_streams[0].codec = "ac3".to_string();
        media.audio_streams[0].channels = Some(6);
        let ladder = QualityLadder::build(&media, &LadderOptions::default());
        let rendition = ladder.get("720p").unwrap();
        let plan = EncodingPlan::new(&media, 3, false);

        let args = plan.encoder_args(&media, rendition, Path::new("/tmp/out"));

        assert!(!args.contains(&"-ss".to_string()));
        assert_eq!(arg_after(&args, "-i"), Some("/media/movie.mkv"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:0"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:1"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "-0:s"));
        assert_eq!(arg_after(&args, "-codec:v:0"), Some("libx264"));
        assert_eq!(arg_after(&args, "-maxrate"), Some("4000000"));
        assert_eq!(arg_after(&args, "-bufsize"), Some("8000000"));
        assert_eq!(
            arg_after(&args, "-vf"),
            Some("scale='trunc(min(max(iw,ih*dar),1080)/2)*2':'trunc(ow/dar/2)*2'")
        );
        assert_eq!(arg_after(&args, "-g"), Some("72"));
        assert_eq!(arg_after(&args, "-codec:a:0"), Some("aac"));
        assert_eq!(arg_after(&args, "-ac"), Some("6"));
        assert_eq!(arg_after(&args, "-ab"), Some("160000"));
        assert_eq!(arg_after(&args, "-start_number"), Some("0"));
        assert_eq!(arg_after(&args, "-hls_time"), Some("3"));
        assert_eq!(
            arg_after(&args, "-hls_segment_filename"),
            Some("/tmp/out/720p-%d.ts")
        );
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out/720p.encoder.m3u8"));
    }

    #[test]
    fn test_direct_args_copy_streams() {
        let media = source("h264", 1920, 1080, 5_000_000);
        let ladder = QualityLadder::build(&media, &LadderOptions::default());
        let rendition = ladder.selected();
        let mut plan = EncodingPlan::new(&media, 3, false);
        plan.record_durations(&rendition.name, vec![3.0; 10]);
        plan.segment_start = 4;

        let args = plan.encoder_args(&media, rendition, Path::new("/tmp/out"));

        assert_eq!(arg_after(&args, "-ss"), Some("12.000000"));
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert_eq!(arg_after(&args, "-c:v"), Some("copy"));
        assert!(!args.contains(&"libx264".to_string()));
        assert_eq!(arg_after(&args, "-c:a"), Some("copy"));
        assert_eq!(arg_after(&args, "-start_number"), Some("4"));
    }

    #[test]
    fn test_burn_in_maps_subtitle_and_reencodes() {
        let mut media = source("h264", 1920, 1080, 5_000_000);
        media.subtitle_streams.push(SubtitleStream {
            index: 2,
            codec: "hdmv_pgs_subtitle".to_string(),
            language: Some("eng".to_string()),
            title: None,
            default: true,
            forced: false,
        });
        let ladder = QualityLadder::build(&media, &LadderOptions::default());
        let plan = EncodingPlan::new(&media, 3, true);

        let args = plan.encoder_args(&media, ladder.selected(), Path::new("/tmp/out"));

        assert!(!args.contains(&"-0:s".to_string()));
        assert!(!args.contains(&"-vf".to_string()));
        assert_eq!(
            arg_after(&args, "-filter_complex"),
            Some("[0:2]scale=1920x1080[sub];[0:0]scale='trunc(min(max(iw,ih*dar),1920)/2)*2':'trunc(ow/dar/2)*2'[base];[base][sub]overlay[v]")
        );
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "[v]"));
        assert!(!args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:0"));
        assert_eq!(arg_after(&args, "-codec:v:0"), Some("libx264"));
    }

    #[test]
    fn test_burn_in_without_subtitle_stream_is_ignored() {
        let media = source("h264", 1920, 1080, 5_000_000);
        let ladder = QualityLadder::build(&media, &LadderOptions::default());
        let plan = EncodingPlan::new(&media, 3, true);

        let args = plan.encoder_args(&media, ladder.selected(), Path::new("/tmp/out"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "-0:s"));
        assert_eq!(arg_after(&args, "-c:v"), Some("copy"));
    }
}
