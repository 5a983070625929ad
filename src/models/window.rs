// src/models/window.rs
use serde::Serialize;
use std::fmt;
use std::ops::Range;

/// Offsets below the API's current max item id that bound a fetch window.
/// `from_max` is inclusive, `to_max` exclusive: `(1100, 100)` resolves to
/// `max - 1100 .. max - 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOffsets {
    pub from_max: u64,
    pub to_max: u64,
}

impl WindowOffsets {
    /// Window used to collect the training corpus.
    pub const TRAINING: WindowOffsets = WindowOffsets {
        from_max: 1100,
        to_max: 100,
    };
    /// Newest window, used for live predictions.
    pub const INFERENCE: WindowOffsets = WindowOffsets {
        from_max: 100,
        to_max: 0,
    };

    pub fn new(from_max: u64, to_max: u64) -> Self {
        Self { from_max, to_max }
    }

    pub fn resolve(&self, max_item_id: u64) -> IdWindow {
        let start = max_item_id.saturating_sub(self.from_max);
        let end = max_item_id.saturating_sub(self.to_max).max(start);
        IdWindow { start, end }
    }
}

/// Contiguous half-open range of item ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdWindow {
    pub start: u64,
    pub end: u64,
}

impl IdWindow {
    pub fn ids(&self) -> Range<u64> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for IdWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
