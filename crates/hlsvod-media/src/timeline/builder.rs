//! Timeline builder.

use super::{Timeline, TimelineSegment};
use crate::{Error, Result};

/// Segments shorter than this are folded into their neighbour.
const MIN_SEGMENT_SECS: f64 = 1e-6;

/// Builder for [`Timeline`].
///
/// Without keyframes the encoder controls the GOP, so segments are cut at
/// exact multiples of the segment length. With keyframes (stream copy) a cut
/// happens at the first keyframe at or after each multiple of the segment
/// length, counted per emitted segment the way the HLS muxer does it.
#[derive(Debug, Clone)]
pub struct TimelineBuilder {
    duration_secs: f64,
    segment_length_secs: f64,
    keyframes: Option<Vec<f64>>,
}

impl TimelineBuilder {
    /// Create a new builder for a source of the given duration.
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            segment_length_secs: 3.0,
            keyframes: None,
        }
    }

    /// Set segment length in seconds.
    pub fn segment_length(mut self, secs: f64) -> Self {
        self.segment_length_secs = secs;
        self
    }

    /// Cut on these keyframe timestamps instead of fixed intervals.
    pub fn keyframes(mut self, keyframes: Vec<f64>) -> Self {
        self.keyframes = Some(keyframes);
        self
    }

    /// Build the timeline.
    pub fn build(self) -> Result<Timeline> {
        let duration = self.duration_secs;
        let length = self.segment_length_secs;

        if !duration.is_finite() || duration <= 0.0 {
            return Err(Error::InvalidDuration(duration));
        }
        if !length.is_finite() || length <= 0.0 {
            return Err(Error::InvalidDuration(length));
        }

        let boundaries = match &self.keyframes {
            Some(keyframes) if !keyframes.is_empty() => {
                keyframe_boundaries(duration, length, keyframes)
            }
            _ => fixed_boundaries(duration, length),
        };

        let mut segments = Vec::with_capacity(boundaries.len());
        let mut start = 0.0;
        for (index, end) in boundaries.into_iter().enumerate() {
            segments.push(TimelineSegment {
                index: index as u32,
                start_secs: start,
                duration_secs: end - start,
            });
            start = end;
        }

        if segments.is_empty() {
            return Err(Error::EmptyTimeline);
        }

        Ok(Timeline {
            duration_secs: duration,
            segment_length_secs: length,
            segments,
        })
    }
}

/// End times of fixed-length segments; the last one holds the remainder.
fn fixed_boundaries(duration: f64, length: f64) -> Vec<f64> {
    let count = ((duration - MIN_SEGMENT_SECS) / length).ceil().max(1.0) as u64;
    let mut ends: Vec<f64> = (1..count).map(|i| i as f64 * length).collect();
    ends.push(duration);
    ends
}

/// End times of keyframe-aligned segments; the last one holds the remainder.
fn keyframe_boundaries(duration: f64, length: f64, keyframes: &[f64]) -> Vec<f64> {
    let mut ends = Vec::new();
    let mut start = 0.0;

    for &keyframe in keyframes {
        if keyframe >= duration - MIN_SEGMENT_SECS {
            break;
        }
        let threshold = (ends.len() + 1) as f64 * length;
        if keyframe + MIN_SEGMENT_SECS >= threshold && keyframe - start > MIN_SEGMENT_SECS {
            ends.push(keyframe);
            start = keyframe;
        }
    }

    ends.push(duration);
    ends
}
