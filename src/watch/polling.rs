//! Directory observation by periodic scanning.

use super::{DirectoryObserver, FileSettleTracker};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Observer that rescans the directory on a fixed interval.
///
/// Works on every filesystem, including ones where change notifications are
/// unavailable.
#[derive(Debug, Clone)]
pub struct PollingObserver {
    interval: Duration,
    settle: Duration,
}

impl PollingObserver {
    pub fn new(interval: Duration, settle: Duration) -> Self {
        Self { interval, settle }
    }
}

impl DirectoryObserver for PollingObserver {
    fn name(&self) -> &'static str {
        "polling"
    }

    fn observe(
        &self,
        dir: &Path,
        files: mpsc::Sender<PathBuf>,
        cancel: CancellationToken,
    ) -> io::Result<()> {
        if !dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a directory: {}", dir.display()),
            ));
        }

        let tracker = FileSettleTracker::new(self.settle, files);
        tokio::spawn(
            poll_directory(dir.to_path_buf(), tracker, self.interval, cancel).in_current_span(),
        );
        tracing::debug!(dir = %dir.display(), "Polling for segments");
        Ok(())
    }
}

/// Scan `dir` every `interval` until cancelled, feeding new files through
/// the settle tracker.
pub(crate) async fn poll_directory(
    dir: PathBuf,
    mut tracker: FileSettleTracker,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut reported: HashSet<PathBuf> = HashSet::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match scan(&dir).await {
            Ok(paths) => {
                for path in paths {
                    if !reported.contains(&path) && !tracker.is_pending(&path) {
                        tracker.file_changed(path);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => tracing::warn!(dir = %dir.display(), "Directory scan failed: {}", e),
        }

        reported.extend(tracker.check_settled().await);
    }

    tracing::debug!(dir = %dir.display(), "Stopped polling");
}

async fn scan(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            paths.push(entry.path());
        }
    }
    Ok(paths)
}
