//! Process-wide solution epoch
//!
//! Bumped once per submission attempt. Every dispatch loop compares the
//! value it observed when fetching its work unit with the current one and
//! refetches when they differ.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Epoch(AtomicU64);

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current epoch value
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Advances the epoch and returns the new value
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}
