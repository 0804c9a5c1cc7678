//! Observation of encoder output directories.
//!
//! An observer reports each file that appears in a directory once its size
//! has stopped changing. [`NotifyObserver`] uses OS change notifications;
//! [`PollingObserver`] rescans on an interval and serves as the fallback
//! when notifications are unavailable.

pub mod polling;
pub mod settle;

pub use polling::PollingObserver;
pub use settle::FileSettleTracker;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Default extensions treated as playable media.
pub const MEDIA_EXTENSIONS: &[&str] = &["avi", "mp4", "mkv", "m4v", "m2ts", "mov", "ts"];

/// How output directories are observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// OS change notifications, falling back to polling if they fail.
    #[default]
    Notify,
    /// Periodic directory scans only.
    Polling,
}

/// Reports files added to a directory once they have settled.
///
/// `observe` starts a background task and returns immediately. The task
/// stops when `cancel` fires or the receiving side of `files` is dropped.
pub trait DirectoryObserver: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn observe(
        &self,
        dir: &Path,
        files: mpsc::Sender<PathBuf>,
        cancel: CancellationToken,
    ) -> io::Result<()>;
}

/// Observer backed by the platform's recommended notify watcher.
#[derive(Debug, Clone)]
pub struct NotifyObserver {
    settle: Duration,
    poll_interval: Duration,
}

enum WatchEvent {
    Changed(PathBuf),
    Failed(notify::Error),
}

impl NotifyObserver {
    pub fn new(settle: Duration, poll_interval: Duration) -> Self {
        Self {
            settle,
            poll_interval,
        }
    }

    fn create_watcher(
        dir: &Path,
        event_tx: mpsc::Sender<WatchEvent>,
    ) -> notify::Result<RecommendedWatcher> {
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if event.kind.is_create() || event.kind.is_modify() {
                        for path in event.paths {
                            let _ = event_tx.blocking_send(WatchEvent::Changed(path));
                        }
                    }
                }
                Err(e) => {
                    let _ = event_tx.blocking_send(WatchEvent::Failed(e));
                }
            },
            Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }
}

impl DirectoryObserver for NotifyObserver {
    fn name(&self) -> &'static str {
        "notify"
    }

    fn observe(
        &self,
        dir: &Path,
        files: mpsc::Sender<PathBuf>,
        cancel: CancellationToken,
    ) -> io::Result<()> {
        let (event_tx, mut event_rx) = mpsc::channel::<WatchEvent>(256);
        let watcher = Self::create_watcher(dir, event_tx.clone()).map_err(io::Error::other)?;

        let dir = dir.to_path_buf();
        let mut tracker = FileSettleTracker::new(self.settle, files);
        let check_every = (self.settle / 2).max(Duration::from_millis(25));
        let poll_interval = self.poll_interval;
        tracing::debug!(dir = %dir.display(), "Watching for segments");

        tokio::spawn(
            async move {
                let mut watcher = Some(watcher);
                let mut check_interval = tokio::time::interval(check_every);

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,

                        Some(event) = event_rx.recv() => match event {
                            WatchEvent::Changed(path) => tracker.file_changed(path),
                            WatchEvent::Failed(e) => {
                                tracing::warn!(dir = %dir.display(), "Watch error: {}", e);
                                watcher = None;
                                match Self::create_watcher(&dir, event_tx.clone()) {
                                    Ok(w) => watcher = Some(w),
                                    Err(e) => {
                                        tracing::warn!(
                                            dir = %dir.display(),
                                            "Could not re-establish watch, switching to polling: {}",
                                            e
                                        );
                                        break;
                                    }
                                }
                            }
                        },

                        _ = check_interval.tick() => {
                            tracker.check_settled().await;
                        }
                    }
                }

                if watcher.is_none() && !cancel.is_cancelled() {
                    polling::poll_directory(dir, tracker, poll_interval, cancel).await;
                } else {
                    tracing::debug!(dir = %dir.display(), "Stopped watching");
                }
            }
            .in_current_span(),
        );

        Ok(())
    }
}

/// Start observing `dir` using `mode`. Notification setup failures degrade
/// to polling. Returns the name of the mechanism in use.
pub fn observe_dir(
    mode: WatchMode,
    dir: &Path,
    settle: Duration,
    files: mpsc::Sender<PathBuf>,
    cancel: CancellationToken,
) -> io::Result<&'static str> {
    let poll_interval = (settle / 2).max(Duration::from_millis(25));
    let polling = PollingObserver::new(poll_interval, settle);

    if mode == WatchMode::Notify {
        let observer = NotifyObserver::new(settle, poll_interval);
        match observer.observe(dir, files.clone(), cancel.clone()) {
            Ok(()) => return Ok(observer.name()),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "Change notifications unavailable, polling instead: {}", e);
            }
        }
    }

    polling.observe(dir, files, cancel)?;
    Ok(polling.name())
}

/// Check if a file has a media extension
pub fn is_media_file(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy().to_lowercase();

    if extensions.is_empty() {
        return MEDIA_EXTENSIONS.contains(&ext.as_str());
    }
    extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
}
