//! Tunables shared by every session.

use super::ladder::{LadderOptions, DEFAULT_MAX_NETWORK_BITRATE};
use super::plan::DEFAULT_SEGMENT_LENGTH;
use super::process::{EncoderLauncher, FfmpegLauncher};
use super::window::DEFAULT_WINDOW_SIZE;
use crate::watch::WatchMode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Settings for opening and driving stream sessions.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Directory under which each session gets its own output directory.
    pub output_root: PathBuf,
    /// Nominal segment length in seconds.
    pub segment_length: u32,
    /// Segments the encoder may run ahead of the cursor.
    pub window_size: u32,
    /// Minimum time between encoder starts.
    pub restart_cooldown: Duration,
    /// Pause between killing the old encoder and starting the new one.
    pub restart_grace: Duration,
    /// Existence checks made while waiting for a segment.
    pub wait_attempts: u32,
    /// Time between existence checks.
    pub wait_interval: Duration,
    /// Upper bound on any rendition's video bitrate.
    pub max_network_bitrate: u64,
    /// Burn the default subtitle stream into the video.
    pub hardcode_subtitles: bool,
    /// How long a new file's size must hold still before it counts.
    pub settle: Duration,
    pub watch_mode: WatchMode,
    /// Explicit ffprobe binary; `None` searches PATH.
    pub ffprobe_path: Option<PathBuf>,
    pub launcher: Arc<dyn EncoderLauncher>,
}

impl SessionOptions {
    pub fn ladder_options(&self) -> LadderOptions {
        LadderOptions {
            max_network_bitrate: self.max_network_bitrate,
        }
    }

    /// Longest a single segment wait can take.
    pub fn wait_budget(&self) -> Duration {
        self.wait_interval * self.wait_attempts
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            output_root: std::env::temp_dir().join("hlsvod"),
            segment_length: DEFAULT_SEGMENT_LENGTH,
            window_size: DEFAULT_WINDOW_SIZE,
            restart_cooldown: Duration::from_millis(500),
            restart_grace: Duration::from_millis(100),
            wait_attempts: 10,
            wait_interval: Duration::from_secs(1),
            max_network_bitrate: DEFAULT_MAX_NETWORK_BITRATE,
            hardcode_subtitles: false,
            settle: Duration::from_millis(500),
            watch_mode: WatchMode::Notify,
            ffprobe_path: None,
            launcher: Arc::new(FfmpegLauncher::default()),
        }
    }
}
