//! Session engine errors.

use std::path::PathBuf;

/// Result type for session engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between a segment request and a served file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source could not be probed.
    #[error("failed to probe {}: {source}", path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: hlsvod_av::Error,
    },

    /// The encoder process could not be started.
    #[error("failed to start encoder: {0}")]
    EncoderSpawn(#[source] std::io::Error),

    /// The encoder exited with an error that nobody asked for.
    #[error("encoder failed: {0}")]
    EncoderRuntime(String),

    /// A restart was requested too soon after the previous start.
    #[error("restart throttled: last start was {elapsed_ms}ms ago")]
    RestartThrottled { elapsed_ms: u64 },

    /// A segment did not appear within the wait budget.
    #[error("timed out waiting for segment {rendition}-{number}")]
    SegmentTimeout { rendition: String, number: u32 },

    /// A segment could not be produced after switching renditions.
    #[error("segment {rendition}-{number} is unavailable")]
    SegmentUnavailable { rendition: String, number: u32 },

    /// The rendition has no segment with this number.
    #[error("segment {rendition}-{number} is out of range ({total} segments)")]
    SegmentOutOfRange {
        rendition: String,
        number: u32,
        total: u32,
    },

    /// A restart to a different target made this wait irrelevant.
    #[error("wait for segment {number} superseded by restart at {target}")]
    Superseded { number: u32, target: u32 },

    /// No rendition with this name exists in the ladder.
    #[error("rendition not found: {0}")]
    RenditionNotFound(String),

    /// A session with this name is already open.
    #[error("session already open: {0}")]
    SessionExists(String),

    /// No session with this name is open.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session was closed while the operation was in progress.
    #[error("session closed: {0}")]
    SessionClosed(String),

    /// The session name cannot be used as a directory name.
    #[error("invalid session name: {0:?}")]
    InvalidName(String),

    /// Playlist timeline could not be built.
    #[error("playlist error: {0}")]
    Playlist(#[from] hlsvod_media::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a probe error.
    pub fn probe(path: impl Into<PathBuf>, source: hlsvod_av::Error) -> Self {
        Self::Probe {
            path: path.into(),
            source,
        }
    }

    /// Create a segment timeout error.
    pub fn segment_timeout(rendition: impl Into<String>, number: u32) -> Self {
        Self::SegmentTimeout {
            rendition: rendition.into(),
            number,
        }
    }

    /// Create a segment unavailable error.
    pub fn segment_unavailable(rendition: impl Into<String>, number: u32) -> Self {
        Self::SegmentUnavailable {
            rendition: rendition.into(),
            number,
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::RestartThrottled { .. }
                | Error::SegmentTimeout { .. }
                | Error::SegmentUnavailable { .. }
                | Error::Superseded { .. }
        )
    }

    /// HTTP status code this error maps to.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Probe { .. } => 422,
            Error::EncoderSpawn(_) => 500,
            Error::EncoderRuntime(_) => 500,
            Error::RestartThrottled { .. } => 503,
            Error::SegmentTimeout { .. } => 404,
            Error::SegmentUnavailable { .. } => 404,
            Error::SegmentOutOfRange { .. } => 404,
            Error::Superseded { .. } => 404,
            Error::RenditionNotFound(_) => 404,
            Error::SessionExists(_) => 409,
            Error::SessionNotFound(_) => 400,
            Error::SessionClosed(_) => 404,
            Error::InvalidName(_) => 400,
            Error::Playlist(_) => 500,
            Error::Io(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::segment_timeout("720p", 4).http_status(), 404);
        assert_eq!(Error::RestartThrottled { elapsed_ms: 10 }.http_status(), 503);
        assert_eq!(Error::EncoderRuntime("boom".into()).http_status(), 500);
        assert_eq!(Error::SessionNotFound("x".into()).http_status(), 400);
        let out_of_range = Error::SegmentOutOfRange {
            rendition: "720p".into(),
            number: 40,
            total: 40,
        };
        assert_eq!(out_of_range.http_status(), 404);
        assert!(!out_of_range.is_transient());
    }

    #[test]
    fn test_transient() {
        assert!(Error::RestartThrottled { elapsed_ms: 10 }.is_transient());
        assert!(Error::Superseded { number: 5, target: 30 }.is_transient());
        assert!(!Error::RenditionNotFound("4k".into()).is_transient());
        assert!(!Error::EncoderRuntime("boom".into()).is_transient());
    }

    #[test]
    fn test_display() {
        let err = Error::segment_timeout("480p", 12);
        assert_eq!(err.to_string(), "timed out waiting for segment 480p-12");
    }
}
