//! Shared test harness for integration tests.
//!
//! Provides [`TestEnv`], which builds [`SessionOptions`] rooted in a temporary
//! directory and driven by a scripted `sh` encoder, so no ffmpeg is needed.

#![allow(dead_code)]

use hlsvod::session::{EncoderLauncher, SessionOptions};
use hlsvod::watch::WatchMode;
use hlsvod_av::{AudioStream, SourceMedia, VideoStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;

/// Encoder that never writes anything and runs until killed.
pub const IDLE_ENCODER: &str = "exec sleep 30";

/// Encoder that fails right away with an ffmpeg-like message.
pub const FAILING_ENCODER: &str = "echo 'Invalid data found when processing input' >&2; exit 1";

/// Encoder that writes `count` segments starting at `-start_number`, each
/// through a temp file like `-hls_flags temp_file`, then idles.
pub fn producing_encoder(count: u32) -> String {
    format!(
        r#"start=0
pattern=""
while [ $# -gt 0 ]; do
  case "$1" in
    -start_number) start="$2"; shift ;;
    -hls_segment_filename) pattern="$2"; shift ;;
  esac
  shift
done
i=$start
end=$((start + {count}))
while [ $i -lt $end ]; do
  f=$(printf '%s' "$pattern" | sed "s/%d/$i/")
  printf 'segment %s' "$i" > "$f.tmp"
  mv "$f.tmp" "$f"
  i=$((i + 1))
  sleep 0.02
done
exec sleep 30"#
    )
}

/// Launches `sh -c <script> sh <args...>` and records every launch.
#[derive(Debug)]
pub struct ScriptLauncher {
    script: String,
    spawns: AtomicUsize,
    args: Mutex<Vec<Vec<String>>>,
    /// Launches from this count on point at a missing binary.
    fail_from: Option<usize>,
}

impl ScriptLauncher {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            spawns: AtomicUsize::new(0),
            args: Mutex::new(Vec::new()),
            fail_from: None,
        }
    }

    /// Runs `script` for the first `launches` launches, then cannot start.
    pub fn failing_after(script: impl Into<String>, launches: usize) -> Self {
        Self {
            fail_from: Some(launches),
            ..Self::new(script)
        }
    }
}

impl EncoderLauncher for ScriptLauncher {
    fn command(&self, args: &[String]) -> Command {
        let launch = self.spawns.fetch_add(1, Ordering::SeqCst);
        self.args.lock().unwrap().push(args.to_vec());

        if self.fail_from.is_some_and(|n| launch >= n) {
            return Command::new("/nonexistent/hlsvod-test-encoder");
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&self.script).arg("sh").args(args);
        cmd
    }
}

/// Launcher pointing at a binary that does not exist.
#[derive(Debug)]
pub struct MissingLauncher;

impl EncoderLauncher for MissingLauncher {
    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new("/nonexistent/hlsvod-test-encoder");
        cmd.args(args);
        cmd
    }
}

/// Temporary output root plus options wired to a [`ScriptLauncher`].
pub struct TestEnv {
    pub root: TempDir,
    pub launcher: Arc<ScriptLauncher>,
    pub options: SessionOptions,
}

impl TestEnv {
    pub fn new(script: impl Into<String>) -> Self {
        Self::with_launcher(ScriptLauncher::new(script))
    }

    pub fn with_launcher(launcher: ScriptLauncher) -> Self {
        let root = tempfile::tempdir().unwrap();
        let launcher = Arc::new(launcher);

        let options = SessionOptions {
            output_root: root.path().to_path_buf(),
            segment_length: 3,
            window_size: 10,
            restart_cooldown: Duration::ZERO,
            restart_grace: Duration::from_millis(10),
            wait_attempts: 100,
            wait_interval: Duration::from_millis(50),
            settle: Duration::from_millis(30),
            watch_mode: WatchMode::Polling,
            launcher: launcher.clone(),
            ..SessionOptions::default()
        };

        Self {
            root,
            launcher,
            options,
        }
    }

    /// Adjust the options before opening anything.
    pub fn with(mut self, f: impl FnOnce(&mut SessionOptions)) -> Self {
        f(&mut self.options);
        self
    }

    pub fn session_dir(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Number of encoder launches so far.
    pub fn spawns(&self) -> usize {
        self.launcher.spawns.load(Ordering::SeqCst)
    }

    /// Arguments of the most recent launch.
    pub fn last_args(&self) -> Vec<String> {
        self.launcher.args.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

/// Value following `flag` in an argument list.
pub fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// A 2-minute HEVC source at 24 fps. HEVC keeps the ladder transcode-only:
/// 1080p, 720p, 480p, 360p with 1080p selected.
pub fn source_media(path: &Path) -> SourceMedia {
    SourceMedia {
        file_path: path.to_path_buf(),
        file_size: 150_000_000,
        container: "Matroska / WebM".to_string(),
        duration: 120.0,
        bit_rate: Some(10_192_000),
        video: VideoStream {
            index: 0,
            codec: "hevc".to_string(),
            profile: Some("Main".to_string()),
            width: Some(1920),
            height: Some(1080),
            bit_rate: Some(10_000_000),
            frame_rate: Some(24.0),
            pix_fmt: Some("yuv420p".to_string()),
        },
        audio_streams: vec![AudioStream {
            index: 1,
            codec: "aac".to_string(),
            channels: Some(2),
            sample_rate: Some(48000),
            bit_rate: Some(192_000),
            language: Some("eng".to_string()),
            title: None,
            default: true,
        }],
        subtitle_streams: vec![],
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
