//! hlsvod-media: HLS playlists and segment timelines.
//!
//! # Modules
//!
//! - `timeline` - Per-segment durations as the encoder will actually cut them
//! - `hls` - Master and variant playlist rendering (m3u8)
//!
//! Variant playlists are written before any segment exists, so their EXTINF
//! values come from a [`Timeline`] rather than from the encoder's own output.

pub mod error;
pub mod hls;
pub mod timeline;

pub use error::{Error, Result};
pub use hls::{MasterPlaylist, MediaPlaylist, StreamInfo};
pub use timeline::{Timeline, TimelineBuilder, TimelineSegment};
