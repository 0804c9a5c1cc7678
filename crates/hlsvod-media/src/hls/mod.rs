//! HLS playlist generation.
//!
//! This module renders the master playlist and per-rendition variant
//! playlists, and maps codec names onto RFC 6381 codec identifiers.

mod codecs;
mod playlist;

pub use codecs::{audio_codec_tag, codecs_attribute, video_codec_tag};
pub use playlist::{MasterPlaylist, MediaPlaylist, SegmentEntry, StreamInfo};
