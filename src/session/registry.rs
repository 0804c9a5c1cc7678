//! Name-keyed registry of open stream sessions.
//!
//! The registry is the only thing that adds or removes sessions. Sessions
//! report their own teardown through [`SessionNotice`]s, which a background
//! task consumes to free the name.

use super::options::SessionOptions;
use super::stream::{
    validate_name, CloseReason, SegmentResponse, SessionNotice, SessionStatus, StreamSession,
};
use super::{Error, Result};
use chrono::Utc;
use dashmap::DashMap;
use hlsvod_av::SourceMedia;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Thread-safe registry of open sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<StreamSession>>>,
    /// Names reserved by opens still in progress.
    opening: Arc<Mutex<HashSet<String>>>,
    options: SessionOptions,
    notices_tx: mpsc::UnboundedSender<SessionNotice>,
}

/// Releases a name reservation when an open finishes either way.
#[derive(Debug)]
struct Reservation {
    opening: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.opening.lock().remove(&self.name);
    }
}

impl SessionRegistry {
    /// Create a registry. Must be called from within a Tokio runtime.
    pub fn new(options: SessionOptions) -> Self {
        let sessions: Arc<DashMap<String, Arc<StreamSession>>> = Arc::new(DashMap::new());
        let (notices_tx, mut notices_rx) = mpsc::unbounded_channel::<SessionNotice>();

        let map = sessions.clone();
        tokio::spawn(async move {
            while let Some(notice) = notices_rx.recv().await {
                match notice {
                    SessionNotice::Closed { name, reason } => {
                        if map.remove_if(&name, |_, s| s.is_closed()).is_some() {
                            tracing::info!(session = %name, %reason, "Session removed");
                        }
                    }
                    SessionNotice::EncodeFinished { name, run_id } => {
                        tracing::debug!(session = %name, run_id, "Encoder reached end of source");
                    }
                }
            }
        });

        Self {
            sessions,
            opening: Arc::new(Mutex::new(HashSet::new())),
            options,
            notices_tx,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    fn reserve(&self, name: &str) -> Result<Reservation> {
        validate_name(name)?;
        let mut opening = self.opening.lock();
        if self.sessions.contains_key(name) || !opening.insert(name.to_string()) {
            return Err(Error::SessionExists(name.to_string()));
        }
        Ok(Reservation {
            opening: self.opening.clone(),
            name: name.to_string(),
        })
    }

    /// Probe `path` and open a session for it under `name`.
    ///
    /// # Errors
    ///
    /// [`Error::SessionExists`] if the name is taken, [`Error::Probe`] if the
    /// source cannot be read, or any error from [`StreamSession::open`].
    pub async fn open_session(&self, name: &str, path: &Path) -> Result<Arc<StreamSession>> {
        let reservation = self.reserve(name)?;

        let probe_path = path.to_path_buf();
        let ffprobe = self.options.ffprobe_path.clone();
        let source = tokio::task::spawn_blocking(move || {
            hlsvod_av::probe_with(&probe_path, ffprobe.as_deref())
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
        .map_err(|e| Error::probe(path, e))?;

        self.open_reserved(reservation, source).await
    }

    /// Open a session for already-probed media.
    pub async fn open_with_media(&self, name: &str, source: SourceMedia) -> Result<Arc<StreamSession>> {
        let reservation = self.reserve(name)?;
        self.open_reserved(reservation, source).await
    }

    async fn open_reserved(
        &self,
        reservation: Reservation,
        source: SourceMedia,
    ) -> Result<Arc<StreamSession>> {
        let name = reservation.name.clone();
        let session = StreamSession::open(
            name.clone(),
            source,
            self.options.clone(),
            self.notices_tx.clone(),
        )
        .await?;

        self.sessions.insert(name.clone(), session.clone());
        drop(reservation);

        // A close that raced the insert sent its notice before the entry existed.
        if session.is_closed() {
            self.sessions.remove_if(&name, |_, s| Arc::ptr_eq(s, &session));
            return Err(Error::SessionClosed(name));
        }
        tracing::info!(
            session = %name,
            master = %session.master_playlist_url(),
            "Registered stream session"
        );
        Ok(session)
    }

    /// Look up an open session.
    pub fn get(&self, name: &str) -> Option<Arc<StreamSession>> {
        self.sessions.get(name).map(|entry| entry.value().clone())
    }

    /// Route a segment request to its session and record the fetch.
    pub async fn request_segment(
        &self,
        name: &str,
        rendition: &str,
        number: u32,
    ) -> Result<SegmentResponse> {
        let session = self
            .get(name)
            .ok_or_else(|| Error::SessionNotFound(name.to_string()))?;

        let response = session.on_segment_request(rendition, number).await?;
        session.record_fetched(rendition, number);
        Ok(response)
    }

    /// Close a session and free its name.
    pub async fn close_session(&self, name: &str) -> Result<()> {
        self.close_with(name, CloseReason::Requested).await
    }

    async fn close_with(&self, name: &str, reason: CloseReason) -> Result<()> {
        let session = self
            .get(name)
            .ok_or_else(|| Error::SessionNotFound(name.to_string()))?;

        session.close(reason).await;
        self.sessions.remove_if(name, |_, s| Arc::ptr_eq(s, &session));
        Ok(())
    }

    /// Status of every open session, sorted by name.
    pub async fn list(&self) -> Vec<SessionStatus> {
        let sessions: Vec<Arc<StreamSession>> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();

        let mut statuses = Vec::with_capacity(sessions.len());
        for session in sessions {
            statuses.push(session.status().await);
        }
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Close sessions that have seen no request within `timeout`.
    ///
    /// # Returns
    /// The number of sessions that were closed.
    pub async fn cleanup_idle(&self, timeout: Duration) -> usize {
        let now = Utc::now();
        let timeout = chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::seconds(300));

        let idle: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle(timeout, now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut closed = 0;
        for name in idle {
            if let Some(session) = self.get(&name) {
                tracing::info!(
                    session = %name,
                    inactive_secs = (now - session.last_activity()).num_seconds(),
                    "Closing idle session"
                );
            }
            if self.close_with(&name, CloseReason::Idle).await.is_ok() {
                closed += 1;
            }
        }

        if closed > 0 {
            tracing::debug!(closed, "Cleaned up idle sessions");
        }
        closed
    }

    /// Close every session.
    pub async fn close_all(&self, reason: CloseReason) {
        let names: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for name in names {
            let _ = self.close_with(&name, reason.clone()).await;
        }
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Start a background task that periodically closes idle sessions.
///
/// # Arguments
/// * `registry` - The registry to clean up.
/// * `interval` - How often to run cleanup.
/// * `idle_timeout` - Inactivity after which a session is closed.
pub fn start_cleanup_task(
    registry: SessionRegistry,
    interval: Duration,
    idle_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            registry.cleanup_idle(idle_timeout).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn registry() -> (SessionRegistry, tempfile::TempDir) {
        let root = tempfile::tempdir().unwrap();
        let options = SessionOptions {
            output_root: root.path().to_path_buf(),
            ..SessionOptions::default()
        };
        (SessionRegistry::new(options), root)
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (registry, _root) = registry();

        assert_matches!(
            registry.request_segment("missing", "720p", 0).await,
            Err(Error::SessionNotFound(name)) if name == "missing"
        );
        assert_matches!(
            registry.close_session("missing").await,
            Err(Error::SessionNotFound(_))
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_open_missing_file_is_probe_error() {
        let (registry, root) = registry();

        let result = registry
            .open_session("movie", Path::new("/nonexistent/movie.mkv"))
            .await;
        assert_matches!(result, Err(Error::Probe { .. }));
        assert!(registry.is_empty());
        assert!(!root.path().join("movie").exists());
    }

    #[tokio::test]
    async fn test_invalid_name_rejected() {
        let (registry, _root) = registry();
        let result = registry
            .open_session("../escape", Path::new("/nonexistent/movie.mkv"))
            .await;
        assert_matches!(result, Err(Error::InvalidName(_)));
    }

    #[tokio::test]
    async fn test_reservation_blocks_concurrent_open() {
        let (registry, _root) = registry();

        let held = registry.reserve("movie").unwrap();
        assert_matches!(registry.reserve("movie"), Err(Error::SessionExists(_)));
        drop(held);
        assert!(registry.reserve("movie").is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_with_no_sessions() {
        let (registry, _root) = registry();
        assert_eq!(registry.cleanup_idle(Duration::from_secs(1)).await, 0);
        assert!(registry.list().await.is_empty());
    }
}
