//! # hlsvod-av
//!
//! Source probing for the on-demand HLS engine.
//!
//! This crate provides:
//! - Probing a source file into [`SourceMedia`] via `ffprobe`
//! - Listing keyframe timestamps for stream-copied renditions
//! - Locating the `ffmpeg`/`ffprobe` binaries
//!
//! ## Example
//!
//! ```no_run
//! use hlsvod_av::probe;
//!
//! let media = probe("/path/to/video.mkv")?;
//! println!("{} ({})", media.video.codec, media.resolution_label());
//! # Ok::<(), hlsvod_av::Error>(())
//! ```

mod error;
pub mod keyframes;
pub mod probe;
pub mod tools;

pub use error::{Error, Result};
pub use keyframes::list_keyframes;
pub use probe::{AudioStream, SourceMedia, SubtitleStream, VideoStream};
pub use tools::{check_tools, Tool, ToolInfo};

/// Probe a media file, looking `ffprobe` up on `PATH`.
pub fn probe<P: AsRef<std::path::Path>>(path: P) -> Result<SourceMedia> {
    probe::probe(path.as_ref(), None)
}

/// Probe a media file with an explicitly configured `ffprobe`.
pub fn probe_with<P: AsRef<std::path::Path>>(
    path: P,
    ffprobe: Option<&std::path::Path>,
) -> Result<SourceMedia> {
    probe::probe(path.as_ref(), ffprobe)
}
