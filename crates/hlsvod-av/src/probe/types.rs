//! Source media types.
//!
//! [`SourceMedia`] is the read-only view of a probed source file that the
//! session engine works from. Stream indices are container-global so they can
//! be used directly in encoder `-map 0:<index>` arguments.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Structured metadata for a probed source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMedia {
    /// Path to the source file.
    pub file_path: PathBuf,
    /// File size in bytes.
    pub file_size: u64,
    /// Container format long name (e.g. "Matroska / WebM").
    pub container: String,
    /// Duration in seconds.
    pub duration: f64,
    /// Overall container bitrate, bits per second.
    pub bit_rate: Option<u64>,
    /// The primary video stream.
    pub video: VideoStream,
    /// All audio streams, in container order.
    pub audio_streams: Vec<AudioStream>,
    /// All subtitle streams, in container order.
    pub subtitle_streams: Vec<SubtitleStream>,
}

/// The video stream of a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStream {
    /// Container-global stream index.
    pub index: u32,
    /// Codec short name (e.g. "h264", "hevc").
    pub codec: String,
    /// Codec profile if reported.
    pub profile: Option<String>,
    /// Width in pixels.
    pub width: Option<u32>,
    /// Height in pixels.
    pub height: Option<u32>,
    /// Bitrate in bits per second.
    pub bit_rate: Option<u64>,
    /// Frame rate in frames per second.
    pub frame_rate: Option<f64>,
    /// Pixel format (e.g. "yuv420p").
    pub pix_fmt: Option<String>,
}

/// An audio stream of a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStream {
    /// Container-global stream index.
    pub index: u32,
    /// Codec short name (e.g. "aac", "ac3").
    pub codec: String,
    /// Number of channels.
    pub channels: Option<u32>,
    /// Sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Bitrate in bits per second.
    pub bit_rate: Option<u64>,
    /// Language tag.
    pub language: Option<String>,
    /// Track title.
    pub title: Option<String>,
    /// Whether the container marks this stream as default.
    pub default: bool,
}

/// A subtitle stream of a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleStream {
    /// Container-global stream index.
    pub index: u32,
    /// Codec short name (e.g. "subrip", "hdmv_pgs_subtitle").
    pub codec: String,
    /// Language tag.
    pub language: Option<String>,
    /// Track title.
    pub title: Option<String>,
    /// Whether the container marks this stream as default.
    pub default: bool,
    /// Whether this is a forced track.
    pub forced: bool,
}

impl SourceMedia {
    /// The default audio stream, or the first one if none is flagged.
    pub fn default_audio(&self) -> Option<&AudioStream> {
        self.audio_streams
            .iter()
            .find(|s| s.default)
            .or_else(|| self.audio_streams.first())
    }

    /// The default subtitle stream, or the first one if none is flagged.
    pub fn default_subtitle(&self) -> Option<&SubtitleStream> {
        self.subtitle_streams
            .iter()
            .find(|s| s.default)
            .or_else(|| self.subtitle_streams.first())
    }

    /// Width / height of the video, when both are known.
    pub fn aspect_ratio(&self) -> Option<f64> {
        match (self.video.width, self.video.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(w as f64 / h as f64),
            _ => None,
        }
    }

    /// Video bitrate, estimated from the container bitrate (or file size over
    /// duration) minus audio when the stream itself does not report one.
    pub fn video_bit_rate(&self) -> Option<u64> {
        if let Some(rate) = self.video.bit_rate {
            return Some(rate);
        }
        let total = self.bit_rate.or_else(|| {
            (self.file_size > 0 && self.duration > 0.0)
                .then(|| (self.file_size as f64 * 8.0 / self.duration) as u64)
        })?;
        let audio: u64 = self.audio_streams.iter().filter_map(|a| a.bit_rate).sum();
        total.checked_sub(audio).filter(|r| *r > 0)
    }

    /// Human-readable resolution label.
    pub fn resolution_label(&self) -> &'static str {
        resolution_label(self.video.width, self.video.height)
    }
}

/// Map a resolution to a label: 4K, 1440p, 1080p, 720p, 480p or SD.
pub fn resolution_label(width: Option<u32>, height: Option<u32>) -> &'static str {
    let (w, h) = (width.unwrap_or(0), height.unwrap_or(0));
    if w == 0 || h == 0 {
        return "SD";
    }
    match (w, h) {
        (w, h) if w >= 3800 || h >= 2000 => "4K",
        (w, _) if w >= 2500 => "1440p",
        (w, h) if w >= 1900 || h >= 1000 => "1080p",
        (w, h) if w >= 1260 || h >= 700 => "720p",
        (w, h) if w >= 700 || h >= 440 => "480p",
        _ => "SD",
    }
}
