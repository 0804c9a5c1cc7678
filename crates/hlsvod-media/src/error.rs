//! Error types for hlsvod-media.

use thiserror::Error;

/// Result type for hlsvod-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for hlsvod-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The timeline would contain no segments.
    #[error("timeline has no segments")]
    EmptyTimeline,

    /// A duration or segment length was zero, negative, or not finite.
    #[error("invalid duration: {0}")]
    InvalidDuration(f64),
}
