//! Keyframe listing.
//!
//! When a rendition stream-copies the source video, the encoder can only cut
//! segments on keyframes. The precise timeline needs their timestamps.

use crate::tools::Tool;
use crate::{Error, Result};
use std::path::Path;
use std::process::Command;

/// List keyframe presentation timestamps (seconds) of the first video stream.
///
/// Timestamps are returned sorted and deduplicated.
pub fn list_keyframes(path: &Path, ffprobe: Option<&Path>) -> Result<Vec<f64>> {
    if !path.exists() {
        return Err(Error::file_not_found(path));
    }
    let binary = Tool::Ffprobe.resolve(ffprobe)?;

    let output = Command::new(&binary)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "packet=pts_time,flags",
            "-of",
            "csv=print_section=0",
        ])
        .arg(path)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_failed("ffprobe", stderr.to_string()));
    }

    let keyframes = parse_keyframe_csv(&String::from_utf8_lossy(&output.stdout));

    #[cfg(feature = "tracing")]
    tracing::debug!(
        path = %path.display(),
        count = keyframes.len(),
        "Listed keyframes"
    );

    Ok(keyframes)
}

/// Parse `pts_time,flags` CSV rows, keeping packets flagged as keyframes.
pub fn parse_keyframe_csv(csv: &str) -> Vec<f64> {
    let mut times: Vec<f64> = csv
        .lines()
        .filter_map(|line| {
            let mut fields = line.trim().split(',');
            let pts = fields.next()?.parse::<f64>().ok()?;
            let flags = fields.next()?;
            flags.contains('K').then_some(pts)
        })
        .filter(|t| t.is_finite())
        .collect();

    times.sort_by(|a, b| a.total_cmp(b));
    times.dedup_by(|a, b| (*a - *b).abs() < 1e-6);
    times
}
