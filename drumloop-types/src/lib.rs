//! # drumloop-types
//!
//! Shared type definitions for the drumloop step sequencer.
//! This crate holds the pure data model used by drumloop-audio and
//! drumloop-core: the common tick timeline, per-track pass automation,
//! and the meter bounds that drive step timing.

pub mod automation;
pub mod meter;
pub mod tick;

pub use automation::*;
pub use meter::*;
pub use tick::{SubdivisionKind, Tick, TICKS_PER_QUARTER};

use std::num::NonZeroU64;

/// Identifier grouping every trigger issued for one step.
///
/// The audio backend commits all sources started under the same batch as
/// one unit so that hits on different tracks share an onset. Zero is not a
/// valid batch, which the `NonZeroU64` representation enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchId(NonZeroU64);

impl BatchId {
    /// The first batch of a playback sequence.
    pub const FIRST: BatchId = BatchId(NonZeroU64::MIN);

    /// Returns `None` for zero.
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// The following batch. Wraps back to 1, never to 0.
    pub fn next(self) -> Self {
        Self(self.0.checked_add(1).unwrap_or(NonZeroU64::MIN))
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
