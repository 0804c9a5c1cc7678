//! HLS playlist structures.

use crate::timeline::Timeline;
use std::fmt;

/// A segment entry in the playlist.
#[derive(Debug, Clone)]
pub struct SegmentEntry {
    /// Duration in seconds.
    pub duration: f64,
    /// Segment URI.
    pub uri: String,
}

/// Media playlist for a single rendition.
///
/// Always rendered as a complete VOD playlist: every segment is listed up
/// front and the playlist ends with `#EXT-X-ENDLIST`.
#[derive(Debug, Clone)]
pub struct MediaPlaylist {
    /// Protocol version.
    pub version: u8,
    /// Target duration in seconds.
    pub target_duration: u32,
    /// Media sequence number.
    pub media_sequence: u32,
    /// Segment entries.
    pub segments: Vec<SegmentEntry>,
}

impl MediaPlaylist {
    /// Create a new, empty VOD playlist.
    pub fn vod() -> Self {
        Self {
            version: 3,
            target_duration: 3,
            media_sequence: 0,
            segments: Vec::new(),
        }
    }

    /// Create from a timeline, naming each segment with `uri_for(index)`.
    ///
    /// The target duration is the rounded nominal segment length, raised to
    /// cover the longest segment so keyframe-cut playlists stay valid.
    pub fn from_timeline(timeline: &Timeline, uri_for: impl Fn(u32) -> String) -> Self {
        let mut playlist = Self::vod();
        let nominal = timeline.segment_length_secs.round() as u32;
        let longest = timeline.max_segment_duration().round() as u32;
        playlist.target_duration = nominal.max(longest).max(1);

        playlist.segments = timeline
            .segments
            .iter()
            .map(|segment| SegmentEntry {
                duration: segment.duration_secs,
                uri: uri_for(segment.index),
            })
            .collect();

        playlist
    }

    /// Sum of EXTINF durations.
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }

    /// Render to M3U8 string.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MediaPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;
        writeln!(f, "#EXT-X-PLAYLIST-TYPE:VOD")?;
        writeln!(f, "#EXT-X-VERSION:{}", self.version)?;
        writeln!(f, "#EXT-X-TARGETDURATION:{}", self.target_duration)?;
        writeln!(f, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence)?;

        for segment in &self.segments {
            writeln!(f, "#EXTINF:{:.6},", segment.duration)?;
            writeln!(f, "{}", segment.uri)?;
        }

        writeln!(f, "#EXT-X-ENDLIST")
    }
}

/// Master playlist with multiple renditions.
#[derive(Debug, Clone, Default)]
pub struct MasterPlaylist {
    /// Stream variants.
    pub streams: Vec<StreamInfo>,
}

impl MasterPlaylist {
    /// Create a new master playlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stream variant.
    pub fn add_stream(mut self, stream: StreamInfo) -> Self {
        self.streams.push(stream);
        self
    }

    /// Render to M3U8 string.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MasterPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;

        for stream in &self.streams {
            write!(f, "#EXT-X-STREAM-INF:BANDWIDTH={}", stream.bandwidth)?;
            if !stream.codecs.is_empty() {
                write!(f, ",CODECS=\"{}\"", stream.codecs)?;
            }
            write!(f, ",RESOLUTION={}x{}", stream.width, stream.height)?;
            if let Some(frame_rate) = stream.frame_rate {
                write!(f, ",FRAME-RATE={:.3}", frame_rate)?;
            }
            writeln!(f)?;
            writeln!(f, "{}", stream.uri)?;
        }
        Ok(())
    }
}

/// Stream variant information.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Playlist URI.
    pub uri: String,
    /// Bandwidth in bits per second.
    pub bandwidth: u64,
    /// Video width.
    pub width: u32,
    /// Video height.
    pub height: u32,
    /// Codec string (e.g., "avc1.640029,mp4a.40.2").
    pub codecs: String,
    /// Frame rate.
    pub frame_rate: Option<f64>,
}
