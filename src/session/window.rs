//! Lookahead window classification.

/// Default lookahead window in segments.
pub const DEFAULT_WINDOW_SIZE: u32 = 10;

/// Where a requested segment sits relative to the playback cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    /// `0 <= distance < size`: the running encoder will get there.
    Within,
    /// `distance == size`: still reachable, and the cursor should advance.
    Edge,
    /// `distance > size`: too far ahead to wait for.
    Beyond,
    /// `distance < 0`: already behind the encoder.
    Behind,
}

impl WindowPosition {
    /// Whether serving this request needs the encoder moved.
    pub fn needs_restart(self) -> bool {
        matches!(self, WindowPosition::Beyond | WindowPosition::Behind)
    }
}

/// The range of segments the encoder may run ahead of the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookaheadWindow {
    /// Last segment the viewer is assumed to have consumed.
    pub cursor: u32,
    /// How far ahead of the cursor a request may be without a restart.
    pub size: u32,
}

impl LookaheadWindow {
    pub fn new(cursor: u32, size: u32) -> Self {
        Self { cursor, size }
    }

    /// Signed distance from the cursor to `segment`.
    pub fn distance(&self, segment: u32) -> i64 {
        segment as i64 - self.cursor as i64
    }

    /// Classify a requested segment.
    pub fn classify(&self, segment: u32) -> WindowPosition {
        let distance = self.distance(segment);
        let size = self.size as i64;
        if distance < 0 {
            WindowPosition::Behind
        } else if distance > size {
            WindowPosition::Beyond
        } else if distance == size {
            WindowPosition::Edge
        } else {
            WindowPosition::Within
        }
    }
}
