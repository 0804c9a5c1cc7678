use crate::session::{FfmpegLauncher, SessionOptions};
use crate::watch::WatchMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory whose media files can be opened as sessions
    #[serde(default = "default_media_path")]
    pub media_path: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    4000
}
fn default_media_path() -> PathBuf {
    PathBuf::from("./media")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            media_path: default_media_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// Each session writes its playlists and segments under `<output_root>/<name>`
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Nominal segment length in seconds (default: 3)
    #[serde(default = "default_segment_length")]
    pub segment_length: u32,

    /// Segments the encoder may run ahead of the viewer (default: 10)
    #[serde(default = "default_window_size")]
    pub window_size: u32,

    /// Minimum time between encoder restarts (default: 500)
    #[serde(default = "default_restart_cooldown_ms")]
    pub restart_cooldown_ms: u64,

    /// Pause between killing and restarting the encoder (default: 100)
    #[serde(default = "default_restart_grace_ms")]
    pub restart_grace_ms: u64,

    #[serde(default = "default_wait_attempts")]
    pub wait_attempts: u32,

    #[serde(default = "default_wait_interval_ms")]
    pub wait_interval_ms: u64,

    /// Upper bound on rendition video bitrate in bits/s (default: 7200000)
    #[serde(default = "default_max_network_bitrate")]
    pub max_network_bitrate: u64,

    /// Burn the default subtitle stream into the video
    #[serde(default)]
    pub hardcode_subtitles: bool,

    /// How long a new segment's size must stay unchanged (default: 500)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default)]
    pub watch_mode: WatchMode,

    /// Close sessions without requests for this long; 0 disables (default: 300)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("/tmp/hlsvod")
}
fn default_segment_length() -> u32 {
    3
}
fn default_window_size() -> u32 {
    10
}
fn default_restart_cooldown_ms() -> u64 {
    500
}
fn default_restart_grace_ms() -> u64 {
    100
}
fn default_wait_attempts() -> u32 {
    10
}
fn default_wait_interval_ms() -> u64 {
    1000
}
fn default_max_network_bitrate() -> u64 {
    7_200_000
}
fn default_settle_ms() -> u64 {
    500
}
fn default_idle_timeout_secs() -> u64 {
    300
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            segment_length: default_segment_length(),
            window_size: default_window_size(),
            restart_cooldown_ms: default_restart_cooldown_ms(),
            restart_grace_ms: default_restart_grace_ms(),
            wait_attempts: default_wait_attempts(),
            wait_interval_ms: default_wait_interval_ms(),
            max_network_bitrate: default_max_network_bitrate(),
            hardcode_subtitles: false,
            settle_ms: default_settle_ms(),
            watch_mode: WatchMode::default(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl StreamingConfig {
    /// Idle timeout, or `None` when idle sessions are kept forever.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
}

impl Config {
    /// Engine options for this configuration.
    pub fn session_options(&self) -> SessionOptions {
        let streaming = &self.streaming;
        let launcher = match &self.tools.ffmpeg_path {
            Some(path) => FfmpegLauncher::new(path),
            None => FfmpegLauncher::default(),
        };

        SessionOptions {
            output_root: streaming.output_root.clone(),
            segment_length: streaming.segment_length,
            window_size: streaming.window_size,
            restart_cooldown: Duration::from_millis(streaming.restart_cooldown_ms),
            restart_grace: Duration::from_millis(streaming.restart_grace_ms),
            wait_attempts: streaming.wait_attempts,
            wait_interval: Duration::from_millis(streaming.wait_interval_ms),
            max_network_bitrate: streaming.max_network_bitrate,
            hardcode_subtitles: streaming.hardcode_subtitles,
            settle: Duration::from_millis(streaming.settle_ms),
            watch_mode: streaming.watch_mode,
            ffprobe_path: self.tools.ffprobe_path.clone(),
            launcher: Arc::new(launcher),
        }
    }
}
