//! Point-in-time pool statistics.

/// Snapshot of a pool's collections and lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Surfaces currently idle in the pool.
    pub idle: usize,
    /// Surfaces parked until their consumer releases them.
    pub deferred: usize,
    /// Surfaces checked out, including deferred ones.
    pub outstanding: usize,
    /// Total surfaces ever allocated.
    pub created: u64,
    /// Total acquisitions served from the idle set.
    pub reused: u64,
    /// Total surfaces returned to the idle set.
    pub returned: u64,
    /// Total surfaces destroyed by eviction, shrink or clear.
    pub destroyed: u64,
    /// Total surfaces reported lost.
    pub lost: u64,
    /// Times usage stayed above the ceiling with nothing to evict.
    pub capacity_overruns: u64,
    /// Whether an idle shrink is scheduled.
    pub shrink_pending: bool,
}

impl PoolStats {
    /// Surfaces counted against the ceiling: idle plus outstanding.
    ///
    /// Deferred surfaces are already part of `outstanding`.
    #[must_use]
    pub fn total(&self) -> usize {
        self.idle + self.outstanding
    }
}
