//! Segment timelines.
//!
//! A timeline lists the duration of every segment an encoder run will produce
//! for one rendition. Playlists are written from it up front, and seeks use it
//! to turn a segment number into a start timestamp.

mod builder;

pub use builder::TimelineBuilder;

/// A single segment of a timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TimelineSegment {
    /// Segment index (0-based).
    pub index: u32,
    /// Start time in seconds from the beginning of the source.
    pub start_secs: f64,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl TimelineSegment {
    /// End time in seconds.
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }
}

/// Ordered segment durations covering a whole source.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Timeline {
    /// Total duration in seconds.
    pub duration_secs: f64,
    /// Nominal segment length the timeline was built for.
    pub segment_length_secs: f64,
    /// All segments.
    pub segments: Vec<TimelineSegment>,
}

impl Timeline {
    /// Create a new timeline builder.
    pub fn builder(duration_secs: f64) -> TimelineBuilder {
        TimelineBuilder::new(duration_secs)
    }

    /// Get segment count.
    pub fn segment_count(&self) -> u32 {
        self.segments.len() as u32
    }

    /// Get a segment by index.
    pub fn get(&self, index: u32) -> Option<&TimelineSegment> {
        self.segments.get(index as usize)
    }

    /// Longest segment duration.
    pub fn max_segment_duration(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.duration_secs)
            .fold(0.0, f64::max)
    }

    /// Sum of all segment durations.
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration_secs).sum()
    }

    /// Per-segment durations in order.
    pub fn durations(&self) -> Vec<f64> {
        self.segments.iter().map(|s| s.duration_secs).collect()
    }

    /// Start timestamp of a segment, clamped to the end of the source.
    pub fn start_of(&self, index: u32) -> f64 {
        match self.get(index) {
            Some(segment) => segment.start_secs,
            None => self.duration_secs,
        }
    }
}
