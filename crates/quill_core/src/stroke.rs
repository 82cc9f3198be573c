//! Stroke identifiers

use serde::{Deserialize, Serialize};

/// Unique identifier for a committed stroke
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StrokeId(pub u64);

impl StrokeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Generator for unique stroke IDs
#[derive(Debug, Default)]
pub struct StrokeIdGenerator {
    next: u64,
}

impl StrokeIdGenerator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Continue numbering after previously issued ids
    pub fn starting_at(next: u64) -> Self {
        Self { next: next.max(1) }
    }

    pub fn next(&mut self) -> StrokeId {
        let id = StrokeId(self.next.max(1));
        self.next = id.0 + 1;
        id
    }
}
