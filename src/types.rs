//! Shared Types for the Migration Engine
//!
//! This module defines the types shared across the engine:
//!
//! - Page identifiers and migration buffer records
//! - Hotlist score parameters and engine thresholds, with their defaults
//! - Setup error taxonomy (`CapacityError`)
//! - Engine statistics counters

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use alloc::collections::TryReserveError;

// ============================================================================
// Identifiers and Limits
// ============================================================================

/// Opaque page identifier (machine frame number or similar).
pub type PageId = u64;

/// Maximum number of CPUs the engine will track.
pub const MAX_CPUS: usize = 1024;

/// Maximum entries in a single fixed pool (hotlist or candidate pool).
/// Pool entries are addressed by `u32` index with `u32::MAX` reserved
/// as the nil sentinel.
pub const MAX_POOL_ENTRIES: usize = 1 << 22;

/// Upper bound on any single score parameter. Keeps the overflow-rebase
/// margin arithmetic (`decrement + maximum`) comfortably inside `u32`.
pub const MAX_SCORE_PARAM: u32 = 1 << 24;

/// Nil sentinel for `u32` arena indices (free lists, active lists, tree
/// links). Pool capacities stay below this by the [`MAX_POOL_ENTRIES`]
/// bound.
pub(crate) const NIL: u32 = u32::MAX;

// ============================================================================
// Migration Buffer Record
// ============================================================================

/// One enqueued migration decision: move `page_id` to `dest_node`.
///
/// The buffer is fully overwritten each decision cycle and drained by the
/// external migration executor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationTarget {
    /// Page to relocate.
    pub page_id: PageId,
    /// NUMA node the page should move to.
    pub dest_node: u32,
}

// ============================================================================
// Tunable Parameters
// ============================================================================

/// Score tunables shared by every hotlist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HotlistParams {
    /// Relative score granted to a newly inserted entry.
    pub insertion: u32,
    /// Score added to an entry on reinforcement (on top of the decay
    /// compensation).
    pub increment: u32,
    /// Global decay applied to every entry per touch event, realized lazily
    /// through the hotlist base score.
    pub decrement: u32,
    /// Cap on any entry's relative score.
    pub maximum: u32,
}

impl HotlistParams {
    /// Engine defaults: `insertion=0, increment=8, decrement=1, maximum=1024`.
    pub const fn default_params() -> Self {
        Self {
            insertion: 0,
            increment: 8,
            decrement: 1,
            maximum: 1024,
        }
    }

    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.maximum == 0 {
            return Err("hotlist maximum score must be non-zero");
        }
        if self.maximum > MAX_SCORE_PARAM
            || self.increment > MAX_SCORE_PARAM
            || self.decrement > MAX_SCORE_PARAM
            || self.insertion > MAX_SCORE_PARAM
        {
            return Err("hotlist score parameter out of range");
        }
        if self.insertion > self.maximum {
            return Err("hotlist insertion score exceeds maximum");
        }
        Ok(())
    }
}

impl Default for HotlistParams {
    fn default() -> Self {
        Self::default_params()
    }
}

/// Thresholds gating what the engine considers migration-worthy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineParams {
    /// Minimum access-rate share (percent of the aggregate score observed
    /// from the destination node) for a candidate to be enqueued.
    pub min_rate: u8,
    /// Minimum aggregate relative score for a candidate to be enqueued.
    pub min_score: u32,
    /// Whether the external driver is expected to flush the hotlists after
    /// each refill cycle. Advisory: enforced by the caller, never by the
    /// engine itself.
    pub flush_after_refill: bool,
}

impl EngineParams {
    /// Engine defaults: `min_rate=90, min_score=64, flush_after_refill=false`.
    pub const fn default_params() -> Self {
        Self {
            min_rate: 90,
            min_score: 64,
            flush_after_refill: false,
        }
    }

    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.min_rate > 100 {
            return Err("migration minimum rate exceeds 100 percent");
        }
        Ok(())
    }
}

impl Default for EngineParams {
    fn default() -> Self {
        Self::default_params()
    }
}

// ============================================================================
// Setup Errors
// ============================================================================

/// Errors raised while allocating the fixed engine pools.
///
/// Setup is all-or-nothing: a failed allocation leaves no partial engine
/// behind, and every variant is recoverable by retrying with smaller sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapacityError {
    /// CPU count was zero or above [`MAX_CPUS`].
    BadCpuCount,
    /// A hotlist needs at least two entries (one slot stays free so an
    /// evictable victim always exists).
    HotlistTooSmall,
    /// Candidate pool or migration buffer capacity was zero.
    EmptyPool,
    /// A requested pool exceeds [`MAX_POOL_ENTRIES`].
    PoolTooLarge,
    /// The underlying allocator refused the reservation.
    OutOfMemory,
}

impl CapacityError {
    /// Static description, usable from restrictive contexts.
    pub const fn as_str(self) -> &'static str {
        match self {
            CapacityError::BadCpuCount => "CPU count out of range",
            CapacityError::HotlistTooSmall => "hotlist pool needs at least 2 entries",
            CapacityError::EmptyPool => "candidate pool and buffer need at least 1 entry",
            CapacityError::PoolTooLarge => "requested pool exceeds the entry limit",
            CapacityError::OutOfMemory => "pool allocation failed",
        }
    }
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TryReserveError> for CapacityError {
    fn from(_: TryReserveError) -> Self {
        CapacityError::OutOfMemory
    }
}

// ============================================================================
// Engine Statistics
// ============================================================================

/// Monotonic engine counters, updated with relaxed atomics so the sampling
/// path never takes an extra lock for accounting.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Page-access events routed into a hotlist.
    pub touches: AtomicU64,
    /// Touches that inserted a previously untracked page.
    pub insertions: AtomicU64,
    /// Coldest-entry evictions forced by a full hotlist.
    pub evictions: AtomicU64,
    /// Pages forgotten after a completed migration.
    pub forgets: AtomicU64,
    /// Completed decision cycles.
    pub refills: AtomicU64,
    /// Candidates examined across all decision cycles.
    pub candidates: AtomicU64,
    /// Migration targets actually enqueued.
    pub enqueued: AtomicU64,
}

impl EngineStats {
    pub const fn new() -> Self {
        Self {
            touches: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            forgets: AtomicU64::new(0),
            refills: AtomicU64::new(0),
            candidates: AtomicU64::new(0),
            enqueued: AtomicU64::new(0),
        }
    }

    /// Zero every counter. Used when the engine is re-initialized.
    pub fn reset(&self) {
        self.touches.store(0, Ordering::Relaxed);
        self.insertions.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.forgets.store(0, Ordering::Relaxed);
        self.refills.store(0, Ordering::Relaxed);
        self.candidates.store(0, Ordering::Relaxed);
        self.enqueued.store(0, Ordering::Relaxed);
    }

    /// Copy the counters out for reporting.
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            touches: self.touches.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            forgets: self.forgets.load(Ordering::Relaxed),
            refills: self.refills.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub touches: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub forgets: u64,
    pub refills: u64,
    pub candidates: u64,
    pub enqueued: u64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hotlist_params() {
        let params = HotlistParams::default();
        assert_eq!(params.insertion, 0);
        assert_eq!(params.increment, 8);
        assert_eq!(params.decrement, 1);
        assert_eq!(params.maximum, 1024);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_default_engine_params() {
        let params = EngineParams::default();
        assert_eq!(params.min_rate, 90);
        assert_eq!(params.min_score, 64);
        assert!(!params.flush_after_refill);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_hotlist_params_validation() {
        let mut params = HotlistParams::default();
        params.maximum = 0;
        assert!(params.validate().is_err());

        let mut params = HotlistParams::default();
        params.insertion = params.maximum + 1;
        assert!(params.validate().is_err());

        let mut params = HotlistParams::default();
        params.increment = MAX_SCORE_PARAM + 1;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_engine_params_validation() {
        let mut params = EngineParams::default();
        params.min_rate = 101;
        assert!(params.validate().is_err());
        params.min_rate = 100;
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_capacity_error_strings() {
        assert!(!CapacityError::HotlistTooSmall.as_str().is_empty());
        assert!(!CapacityError::OutOfMemory.as_str().is_empty());
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = EngineStats::new();
        EngineStats::bump(&stats.touches);
        EngineStats::bump(&stats.touches);
        EngineStats::add(&stats.enqueued, 3);

        let snap = stats.snapshot();
        assert_eq!(snap.touches, 2);
        assert_eq!(snap.enqueued, 3);
        assert_eq!(snap.evictions, 0);
    }
}
