//! Migration Candidate Pool
//!
//! Fixed pool collecting the pages a decision cycle considers moving. The
//! pool is reset and repopulated wholesale every cycle; stale candidates
//! from the previous cycle are never patched up. Dedup by page id goes
//! through the same arena AVL the hotlists use; the pool's capacity is a
//! hard cap on how many distinct pages one cycle examines.
//!
//! Once the merge finishes, the pool is sorted for enqueueing (threshold
//! qualifiers first, then by descending rate) and copied into the
//! migration buffer until a candidate misses a threshold or the buffer is
//! full. Sorting reorders the slots, so the id index is only meaningful
//! during the fill phase.

use alloc::vec::Vec;

use crate::avl::IndexAvl;
use crate::types::{CapacityError, MigrationTarget, PageId, MAX_POOL_ENTRIES};

/// A page picked as a potential migration target for the current cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationCandidate {
    pub page_id: PageId,
    /// Node with the largest aggregate score for this page.
    pub dest_node: u32,
    /// Aggregate relative score summed over every CPU.
    pub score: u32,
    /// Share of the aggregate score observed from `dest_node`, in percent.
    pub rate: u8,
}

/// Cursor into one CPU's hotlist during the k-way merge. Ordered by
/// relative score so a max-heap of slots yields entries in globally
/// descending score order; ordering among equal scores is unspecified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct HeapSlot {
    pub cpu: u32,
    pub entry: u32,
    pub score: u32,
}

impl Ord for HeapSlot {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| self.cpu.cmp(&other.cpu))
            .then_with(|| self.entry.cmp(&other.entry))
    }
}

impl PartialOrd for HeapSlot {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Fixed, id-deduplicated candidate pool.
pub struct CandidatePool {
    slots: Vec<MigrationCandidate>,
    used: usize,
    index: IndexAvl,
}

impl CandidatePool {
    pub fn with_capacity(capacity: usize) -> Result<Self, CapacityError> {
        if capacity == 0 {
            return Err(CapacityError::EmptyPool);
        }
        if capacity > MAX_POOL_ENTRIES {
            return Err(CapacityError::PoolTooLarge);
        }
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity)?;
        slots.resize(capacity, MigrationCandidate::default());
        let index = IndexAvl::with_capacity(capacity)?;
        Ok(Self {
            slots,
            used: 0,
            index,
        })
    }

    /// Discard the previous cycle's candidates.
    pub fn reset(&mut self) {
        self.used = 0;
        self.index.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.used == self.slots.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether a candidate for `page_id` was already admitted this cycle.
    /// Only meaningful during the fill phase.
    #[inline]
    pub fn contains(&self, page_id: PageId) -> bool {
        self.index.find(page_id).is_some()
    }

    /// Admit a candidate. The caller checks [`Self::is_full`] and
    /// [`Self::contains`] first; a full pool rejects the candidate.
    pub fn push(&mut self, candidate: MigrationCandidate) -> bool {
        if self.is_full() {
            return false;
        }
        debug_assert!(!self.contains(candidate.page_id));
        let idx = self.used;
        self.slots[idx] = candidate;
        self.index.insert(candidate.page_id, idx as u32);
        self.used += 1;
        true
    }

    /// Candidates admitted this cycle, fill order (or sorted order after
    /// [`drain_into_buffer`] ran).
    #[inline]
    pub fn as_slice(&self) -> &[MigrationCandidate] {
        &self.slots[..self.used]
    }

    /// Sort for enqueueing: candidates meeting `min_score` ahead of those
    /// that don't, descending rate within each group. Invalidates the id
    /// index until the next [`Self::reset`].
    fn sort_for_enqueue(&mut self, min_score: u32) {
        self.index.clear();
        self.slots[..self.used].sort_unstable_by(|a, b| {
            let a_fits = a.score >= min_score;
            let b_fits = b.score >= min_score;
            b_fits
                .cmp(&a_fits)
                .then_with(|| b.rate.cmp(&a.rate))
        });
    }
}

/// Sort the pool and copy qualifying candidates into the migration buffer,
/// best rate first. Stops at the buffer capacity or at the first candidate
/// failing either threshold; everything past it ranks lower by
/// construction. Returns the number of targets enqueued; zero is a valid
/// outcome, not an error.
pub(crate) fn drain_into_buffer(
    pool: &mut CandidatePool,
    buffer: &mut Vec<MigrationTarget>,
    capacity: usize,
    min_score: u32,
    min_rate: u8,
) -> usize {
    pool.sort_for_enqueue(min_score);
    buffer.clear();
    for candidate in pool.as_slice() {
        if buffer.len() == capacity {
            break;
        }
        if candidate.score < min_score || candidate.rate < min_rate {
            break;
        }
        buffer.push(MigrationTarget {
            page_id: candidate.page_id,
            dest_node: candidate.dest_node,
        });
    }
    buffer.len()
}

// ============================================================================
// Tests
// ============================================================================
