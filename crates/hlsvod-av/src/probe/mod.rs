//! Source media probing.
//!
//! Probing shells out to `ffprobe` and maps its JSON output onto
//! [`SourceMedia`]. Stream indices are kept container-global.

mod ffprobe;
mod types;

pub use ffprobe::{parse_ffprobe_json, probe_with_ffprobe};
pub use types::*;

use crate::tools::Tool;
use crate::Result;
use std::path::Path;

/// Probe a media file, resolving `ffprobe` from an optional configured path.
pub fn probe(path: &Path, ffprobe: Option<&Path>) -> Result<SourceMedia> {
    let binary = Tool::Ffprobe.resolve(ffprobe)?;
    probe_with_ffprobe(&binary, path)
}
