use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug)]
struct Pending {
    changed_at: Instant,
    size: Option<u64>,
}

/// Tracks files and determines when they've "settled" (stopped growing)
#[derive(Debug)]
pub struct FileSettleTracker {
    /// Files seen but not yet settled
    pending: HashMap<PathBuf, Pending>,
    /// How long a file's size must stay unchanged to be considered settled
    settle_duration: Duration,
    /// Channel to send settled files
    settled_tx: mpsc::Sender<PathBuf>,
}

impl FileSettleTracker {
    pub fn new(settle_duration: Duration, settled_tx: mpsc::Sender<PathBuf>) -> Self {
        Self {
            pending: HashMap::new(),
            settle_duration,
            settled_tx,
        }
    }

    /// Record that a file was created or written to
    pub fn file_changed(&mut self, path: PathBuf) {
        self.pending.insert(
            path,
            Pending {
                changed_at: Instant::now(),
                size: None,
            },
        );
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Check for settled files and send them. Returns the paths sent.
    pub async fn check_settled(&mut self) -> Vec<PathBuf> {
        let now = Instant::now();
        let mut settled = Vec::new();
        let mut vanished = Vec::new();

        for (path, pending) in self.pending.iter_mut() {
            let size = match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => meta.len(),
                // Renamed away (encoder temp file) or deleted.
                _ => {
                    vanished.push(path.clone());
                    continue;
                }
            };

            if pending.size != Some(size) {
                if pending.size.is_some() {
                    pending.changed_at = now;
                }
                pending.size = Some(size);
            }

            if now.duration_since(pending.changed_at) >= self.settle_duration {
                settled.push(path.clone());
            }
        }

        for path in &vanished {
            self.pending.remove(path);
        }

        let mut sent = Vec::with_capacity(settled.len());
        for path in settled {
            self.pending.remove(&path);
            if let Err(e) = self.settled_tx.send(path.clone()).await {
                tracing::error!("Failed to send settled file: {}", e);
            } else {
                tracing::trace!("File settled: {:?}", path);
                sent.push(path);
            }
        }
        sent
    }

    /// Remove a file from tracking (e.g., if deleted)
    pub fn remove(&mut self, path: &Path) {
        self.pending.remove(path);
    }
}
