//! Encoder process lifecycle.
//!
//! A [`TranscodeProcess`] is one run of the external encoder. A monitor task
//! owns the child, forwards its stderr to the log, and reports exactly one
//! [`ProcessExit`] when it ends. Kills issued through [`TranscodeProcess::kill`]
//! are reported as [`ExitOutcome::Killed`] so they can never be mistaken for a
//! failure.

use super::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// How long to wait for trailing stderr after the encoder exits on its own.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Builds the command for an encoder run.
///
/// Production uses [`FfmpegLauncher`]; tests substitute scripted commands.
pub trait EncoderLauncher: Send + Sync + fmt::Debug {
    /// Command that runs the encoder with `args`.
    fn command(&self, args: &[String]) -> Command;
}

/// Runs `ffmpeg` with the plan's arguments.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    path: PathBuf,
}

impl FfmpegLauncher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl EncoderLauncher for FfmpegLauncher {
    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(args);
        cmd
    }
}

/// How an encoder run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited successfully: every segment of the run was written.
    Completed,
    /// Killed on request.
    Killed,
    /// Exited with an error nobody asked for.
    Failed(String),
}

/// Exit notification for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub run_id: u64,
    pub outcome: ExitOutcome,
}

/// Handle to a running encoder.
#[derive(Debug)]
pub struct TranscodeProcess {
    run_id: u64,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
}

impl TranscodeProcess {
    /// Start the encoder.
    ///
    /// The exit of this run is reported on `exits`. Must be called from
    /// within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EncoderSpawn`] if the process could not be started.
    pub fn spawn(
        launcher: &dyn EncoderLauncher,
        args: &[String],
        run_id: u64,
        exits: mpsc::UnboundedSender<ProcessExit>,
    ) -> Result<Self> {
        let mut cmd = launcher.command(args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(Error::EncoderSpawn)?;
        let pid = child.id();
        tracing::info!(run_id, pid = ?pid, "Encoder started: {:?}", cmd.as_std());

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(
                async move {
                    let mut lines = BufReader::new(stderr).lines();
                    let mut last = None;
                    while let Ok(Some(line)) = lines.next_line().await {
                        tracing::debug!(target: "hlsvod::encoder", "{}", line);
                        last = Some(line);
                    }
                    last
                }
                .in_current_span(),
            )
        });

        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        let monitor = tokio::spawn(
            async move {
                let outcome = tokio::select! {
                    status = child.wait() => match status {
                        Ok(status) if status.success() => ExitOutcome::Completed,
                        Ok(status) => ExitOutcome::Failed(status.to_string()),
                        Err(e) => ExitOutcome::Failed(e.to_string()),
                    },
                    // Fires on an explicit kill and when the handle is dropped.
                    _ = kill_rx => {
                        if let Err(e) = child.kill().await {
                            tracing::warn!(run_id, "Failed to kill encoder: {}", e);
                        }
                        ExitOutcome::Killed
                    }
                };

                let outcome = match (outcome, stderr_task) {
                    (ExitOutcome::Failed(status), Some(task)) => {
                        let last_line = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task)
                            .await
                            .ok()
                            .and_then(|joined| joined.ok())
                            .flatten();
                        match last_line {
                            Some(line) => ExitOutcome::Failed(format!("{}: {}", status, line)),
                            None => ExitOutcome::Failed(status),
                        }
                    }
                    (outcome, Some(task)) => {
                        task.abort();
                        outcome
                    }
                    (outcome, None) => outcome,
                };

                match &outcome {
                    ExitOutcome::Completed => tracing::info!(run_id, "Encoder finished"),
                    ExitOutcome::Killed => tracing::info!(run_id, "Encoder killed"),
                    ExitOutcome::Failed(reason) => {
                        tracing::error!(run_id, reason = %reason, "Encoder failed")
                    }
                }

                let _ = exits.send(ProcessExit { run_id, outcome });
            }
            .in_current_span(),
        );

        Ok(Self {
            run_id,
            pid,
            kill_tx: Some(kill_tx),
            monitor,
        })
    }

    /// Identifier of this run.
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// OS process id, if the process was still alive when spawned.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the monitor has observed the exit.
    pub fn is_finished(&self) -> bool {
        self.monitor.is_finished()
    }

    /// Kill the encoder and wait until it is gone.
    ///
    /// Reported as [`ExitOutcome::Killed`] unless the process had already
    /// exited on its own.
    pub async fn kill(mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.monitor).await {
            tracing::warn!(run_id = self.run_id, "Encoder monitor task failed: {}", e);
        }
    }
}
