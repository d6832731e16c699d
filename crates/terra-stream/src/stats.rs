//! Streaming counters.

use std::fmt;

/// Running totals kept by the driver since world start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Slots created on leaves.
    pub materializations: u64,
    /// Slots disposed.
    pub evictions: u64,
    /// Evictions postponed because a generation was in flight.
    pub deferrals: u64,
    /// Generations that found no solid voxel and stopped after density.
    pub empty_chunks: u64,
    pub uploads: u64,
    pub regenerations: u64,
    pub root_expansions: u64,
    /// Queue entries or completions that no longer matched the world.
    pub stale_requests: u64,
    /// Dispatches requeued after a retryable failure.
    pub retries: u64,
    /// Dispatches the backend refused while saturated.
    pub backpressure: u64,
}

impl fmt::Display for StreamStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "materialized={} evicted={} deferred={} empty={} uploads={} regen={} expansions={} stale={} retries={} busy={}",
            self.materializations,
            self.evictions,
            self.deferrals,
            self.empty_chunks,
            self.uploads,
            self.regenerations,
            self.root_expansions,
            self.stale_requests,
            self.retries,
            self.backpressure,
        )
    }
}

/// Work done by one driver tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub materialized: u32,
    pub evicted: u32,
    pub deferred: u32,
    pub started: u32,
    pub regenerated: u32,
    pub completions: u32,
    pub uploads: u32,
    pub expansions: u32,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}
