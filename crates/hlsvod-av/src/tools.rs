//! External tool detection.
//!
//! The engine drives two binaries: `ffprobe` for the probing contract and
//! `ffmpeg` as the encoder. Both can be pinned to explicit paths; otherwise
//! they are looked up on `PATH`.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// External binaries the engine knows how to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
}

impl Tool {
    /// Executable name looked up on `PATH`.
    pub fn binary(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
        }
    }

    /// Resolve the executable, preferring a configured path over `PATH` lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolNotFound`] when neither the configured path exists
    /// nor the binary is on `PATH`.
    pub fn resolve(self, configured: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = configured {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
        }

        which::which(self.binary()).map_err(|_| Error::tool_not_found(self.binary()))
    }

    /// Run `<tool> -version` and report what was found.
    pub fn check(self, configured: Option<&Path>) -> ToolInfo {
        let missing = ToolInfo {
            name: self.binary().to_string(),
            available: false,
            version: None,
            path: None,
        };

        let Ok(path) = self.resolve(configured) else {
            return missing;
        };

        match Command::new(&path).arg("-version").output() {
            Ok(output) if output.status.success() => ToolInfo {
                name: self.binary().to_string(),
                available: true,
                version: String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .map(|s| s.to_string()),
                path: Some(path),
            },
            _ => missing,
        }
    }
}

/// Information about an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// First line of `-version` output if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Check both tools, honouring configured overrides.
pub fn check_tools(ffmpeg: Option<&Path>, ffprobe: Option<&Path>) -> Vec<ToolInfo> {
    vec![Tool::Ffmpeg.check(ffmpeg), Tool::Ffprobe.check(ffprobe)]
}
