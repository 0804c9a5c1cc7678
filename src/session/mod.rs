//! On-demand HLS session engine.
//!
//! # Modules
//!
//! - `ladder` - Rendition ladder for a source and the selected rendition
//! - `plan` - Segment accounting and encoder arguments
//! - `playlist` - Master and variant playlists written at open
//! - `tracker` - Created/fetched segment bookkeeping
//! - `window` - Lookahead window classification
//! - `process` - One encoder run
//! - `stream` - The per-stream orchestrator
//! - `registry` - Open sessions keyed by name

mod error;
pub mod ladder;
mod options;
pub mod plan;
pub mod playlist;
pub mod process;
pub mod registry;
pub mod stream;
pub mod tracker;
pub mod window;

pub use error::{Error, Result};
pub use ladder::{LadderOptions, QualityLadder, Rendition};
pub use options::SessionOptions;
pub use plan::EncodingPlan;
pub use process::{EncoderLauncher, ExitOutcome, FfmpegLauncher, ProcessExit, TranscodeProcess};
pub use registry::{start_cleanup_task, SessionRegistry};
pub use stream::{
    CloseReason, Lifecycle, SegmentResponse, SessionNotice, SessionStatus, StreamSession,
};
pub use tracker::{parse_segment_name, segment_file_name, SegmentName, SegmentTracker};
pub use window::{LookaheadWindow, WindowPosition};
