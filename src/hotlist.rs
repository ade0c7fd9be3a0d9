//! Per-CPU Hotlist
//!
//! Score-ranked approximation of the pages a CPU touched recently and
//! often. Each CPU owns one instance; the sampling path feeds it through
//! [`Hotlist::touch`] and the decision cycle reads it through
//! [`Hotlist::hottest`] / [`Hotlist::cooler`].
//!
//! ## Structure
//!
//! A fixed pool of entries allocated once at engine setup, threaded through
//! three index-linked structures:
//!
//! - a free list of unused slots,
//! - the active list, doubly linked and ordered by non-increasing absolute
//!   score (head is the hottest page, tail the coldest),
//! - an AVL index keyed by page id for O(log n) lookup.
//!
//! An entry is on the active list iff it is in the index; otherwise it is
//! on the free list. The active population never exceeds `size - 1`: one
//! slot stays free so an insertion always has an evictable victim (the
//! tail) before it takes a slot.
//!
//! ## Lazy decay
//!
//! Every touch ages the whole list by bumping `base_score`; a page's
//! effective heat is `score - base_score`, floored at zero. Aging is O(1)
//! regardless of population. When `base_score` nears the top of the `u32`
//! range, every entry is rebased (`score - base_score`, floored) and
//! `base_score` returns to zero; relative scores and list order are
//! unchanged by the rebase.

use alloc::vec::Vec;

use crate::avl::IndexAvl;
use crate::types::{CapacityError, HotlistParams, PageId, MAX_POOL_ENTRIES, NIL};

/// One tracked page. Pool-owned; never moves after setup.
#[derive(Clone, Copy, Debug)]
struct HotlistEntry {
    page_id: PageId,
    /// Absolute score. Effective heat is `score - base_score`, floored.
    score: u32,
    prev: u32,
    /// Active-list successor, or free-list link while the slot is unused.
    next: u32,
}

impl HotlistEntry {
    const fn vacant() -> Self {
        Self {
            page_id: 0,
            score: 0,
            prev: NIL,
            next: NIL,
        }
    }
}

/// What a touch did to the list. Feeds the engine statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TouchOutcome {
    /// The page was not tracked before and got a fresh entry.
    pub inserted: bool,
    /// The coldest entry was evicted to make room.
    pub evicted: bool,
}

/// Per-CPU score-decaying page tracker.
pub struct Hotlist {
    entries: Vec<HotlistEntry>,
    index: IndexAvl,
    free_head: u32,
    head: u32,
    tail: u32,
    active: usize,
    /// Score mass already decayed away from every entry.
    base_score: u32,
    params: HotlistParams,
}

impl Hotlist {
    /// Allocate the fixed entry pool. `size` must be at least 2; parameters
    /// are assumed validated by the control surface.
    pub fn with_capacity(size: usize, params: HotlistParams) -> Result<Self, CapacityError> {
        debug_assert!(params.validate().is_ok());
        if size < 2 {
            return Err(CapacityError::HotlistTooSmall);
        }
        if size > MAX_POOL_ENTRIES {
            return Err(CapacityError::PoolTooLarge);
        }
        let mut entries = Vec::new();
        entries.try_reserve_exact(size)?;
        entries.resize(size, HotlistEntry::vacant());
        let index = IndexAvl::with_capacity(size)?;
        let mut list = Self {
            entries,
            index,
            free_head: NIL,
            head: NIL,
            tail: NIL,
            active: 0,
            base_score: 0,
            params,
        };
        list.reset();
        Ok(list)
    }

    /// Drop every tracked page and return to the post-setup state. The pool
    /// itself is retained; parameters are untouched.
    pub fn reset(&mut self) {
        self.head = NIL;
        self.tail = NIL;
        self.active = 0;
        self.base_score = 0;
        self.index.clear();
        self.free_head = NIL;
        for i in (0..self.entries.len()).rev() {
            self.entries[i].prev = NIL;
            self.entries[i].next = self.free_head;
            self.free_head = i as u32;
        }
    }

    /// Replace the score tunables. Takes effect from the next touch;
    /// intended for use between decision cycles only.
    pub fn set_params(&mut self, params: HotlistParams) {
        debug_assert!(params.validate().is_ok());
        self.params = params;
    }

    #[inline]
    pub fn params(&self) -> HotlistParams {
        self.params
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.active
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Pool size, one above the maximum active population.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn base_score(&self) -> u32 {
        self.base_score
    }

    // ------------------------------------------------------------------
    // Sampling path
    // ------------------------------------------------------------------

    /// Record one access to `page_id`. Ages the whole list by one
    /// decrement, then reinforces the page (inserting it, evicting the
    /// coldest entry first if no slot is spare). Amortized O(1) on top of
    /// the O(log n) index update.
    pub fn touch(&mut self, page_id: PageId) -> TouchOutcome {
        self.maybe_rebase();
        self.base_score += self.params.decrement;

        if let Some(idx) = self.index.find(page_id) {
            self.reinforce(idx);
            return TouchOutcome {
                inserted: false,
                evicted: false,
            };
        }

        let mut evicted = false;
        if self.active + 1 == self.entries.len() {
            self.evict_coldest();
            evicted = true;
        }
        let idx = self.pop_free();
        let score = self.base_score.saturating_add(self.params.insertion);
        {
            let entry = &mut self.entries[idx as usize];
            entry.page_id = page_id;
            entry.score = score;
        }
        self.index.insert(page_id, idx);
        self.place_upward(idx, self.tail);
        self.active += 1;
        debug_assert_eq!(self.index.len(), self.active);
        TouchOutcome {
            inserted: true,
            evicted,
        }
    }

    /// Stop tracking `page_id`. No-op if the page is not tracked.
    pub fn forget(&mut self, page_id: PageId) -> bool {
        match self.index.remove(page_id) {
            Some(idx) => {
                self.unlink(idx);
                self.push_free(idx);
                self.active -= 1;
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Read path (decision cycle)
    // ------------------------------------------------------------------

    /// Index of the hottest tracked entry.
    #[inline]
    pub fn hottest(&self) -> Option<u32> {
        if self.head == NIL {
            None
        } else {
            Some(self.head)
        }
    }

    /// Next-cooler neighbor of `idx`, or `None` at the tail.
    #[inline]
    pub fn cooler(&self, idx: u32) -> Option<u32> {
        let next = self.entries[idx as usize].next;
        if next == NIL {
            None
        } else {
            Some(next)
        }
    }

    #[inline]
    pub fn page_id(&self, idx: u32) -> PageId {
        self.entries[idx as usize].page_id
    }

    /// Decayed score of the entry at `idx`.
    #[inline]
    pub fn relative_score(&self, idx: u32) -> u32 {
        self.entries[idx as usize].score.saturating_sub(self.base_score)
    }

    /// Index of the entry tracking `page_id`, if any.
    #[inline]
    pub fn lookup(&self, page_id: PageId) -> Option<u32> {
        self.index.find(page_id)
    }

    /// Decayed score of `page_id`, zero when untracked.
    pub fn relative_score_of(&self, page_id: PageId) -> u32 {
        match self.index.find(page_id) {
            Some(idx) => self.relative_score(idx),
            None => 0,
        }
    }

    #[inline]
    pub fn contains(&self, page_id: PageId) -> bool {
        self.index.find(page_id).is_some()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Raise a tracked entry and move it toward the head past every
    /// strictly-cooler predecessor. Equal scores keep their prior order.
    fn reinforce(&mut self, idx: u32) {
        let cap = self.base_score.saturating_add(self.params.maximum);
        let boost = self.params.increment + self.params.decrement;
        let entry = &mut self.entries[idx as usize];
        // An entry that decayed to the floor re-enters from base_score,
        // the value the read path already reports for it.
        let from = entry.score.max(self.base_score);
        entry.score = from.saturating_add(boost).min(cap);

        let score = self.entries[idx as usize].score;
        let pred = self.entries[idx as usize].prev;
        if pred == NIL || self.entries[pred as usize].score >= score {
            return;
        }
        self.unlink(idx);
        self.place_upward(idx, pred);
    }

    /// Link `idx` into the active list at the sorted position found by
    /// walking from `start` toward the head: below the nearest entry with
    /// an equal or higher score, above everything strictly cooler.
    fn place_upward(&mut self, idx: u32, start: u32) {
        let score = self.entries[idx as usize].score;
        let mut pred = start;
        while pred != NIL && self.entries[pred as usize].score < score {
            pred = self.entries[pred as usize].prev;
        }
        self.link_after(pred, idx);
    }

    fn link_after(&mut self, pred: u32, idx: u32) {
        if pred == NIL {
            let old_head = self.head;
            self.entries[idx as usize].prev = NIL;
            self.entries[idx as usize].next = old_head;
            if old_head != NIL {
                self.entries[old_head as usize].prev = idx;
            } else {
                self.tail = idx;
            }
            self.head = idx;
        } else {
            let next = self.entries[pred as usize].next;
            self.entries[idx as usize].prev = pred;
            self.entries[idx as usize].next = next;
            self.entries[pred as usize].next = idx;
            if next != NIL {
                self.entries[next as usize].prev = idx;
            } else {
                self.tail = idx;
            }
        }
    }

    fn unlink(&mut self, idx: u32) {
        let prev = self.entries[idx as usize].prev;
        let next = self.entries[idx as usize].next;
        if prev != NIL {
            self.entries[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.entries[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn evict_coldest(&mut self) {
        let victim = self.tail;
        debug_assert!(victim != NIL);
        let key = self.entries[victim as usize].page_id;
        self.unlink(victim);
        self.index.remove(key);
        self.push_free(victim);
        self.active -= 1;
    }

    fn pop_free(&mut self) -> u32 {
        let idx = self.free_head;
        debug_assert!(idx != NIL);
        self.free_head = self.entries[idx as usize].next;
        idx
    }

    fn push_free(&mut self, idx: u32) {
        self.entries[idx as usize].prev = NIL;
        self.entries[idx as usize].next = self.free_head;
        self.free_head = idx;
    }

    /// Reset the numeric range before `base_score` can wrap. Every active
    /// entry is shifted down by the current base; relative scores and list
    /// order are preserved exactly.
    fn maybe_rebase(&mut self) {
        let margin = self.params.decrement + self.params.maximum;
        if self.base_score < u32::MAX - margin {
            return;
        }
        let base = self.base_score;
        let mut cursor = self.head;
        while cursor != NIL {
            let entry = &mut self.entries[cursor as usize];
            entry.score = entry.score.saturating_sub(base);
            cursor = entry.next;
        }
        self.base_score = 0;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> HotlistParams {
        HotlistParams::default()
    }

    /// Walk the active list head-to-tail, collecting (page, relative score).
    fn snapshot(list: &Hotlist) -> Vec<(PageId, u32)> {
        let mut out = Vec::new();
        let mut cursor = list.hottest();
        while let Some(idx) = cursor {
            out.push((list.page_id(idx), list.relative_score(idx)));
            cursor = list.cooler(idx);
        }
        out
    }

    /// Full structural check: population bound, list/tree agreement, sort
    /// order, free-list accounting.
    fn assert_invariants(list: &Hotlist) {
        assert!(list.len() <= list.capacity() - 1, "population bound violated");

        let mut seen = 0usize;
        let mut cursor = list.hottest();
        let mut prev_score: Option<u32> = None;
        let mut prev_idx = NIL;
        while let Some(idx) = cursor {
            let entry = &list.entries[idx as usize];
            assert_eq!(entry.prev, prev_idx, "broken back link");
            if let Some(prev) = prev_score {
                assert!(prev >= entry.score, "active list out of order");
            }
            assert_eq!(
                list.lookup(entry.page_id),
                Some(idx),
                "listed entry missing from index"
            );
            prev_score = Some(entry.score);
            prev_idx = idx;
            seen += 1;
            cursor = list.cooler(idx);
        }
        assert_eq!(seen, list.len(), "list length disagrees with population");
        assert_eq!(list.index.len(), list.len(), "index size disagrees");

        let mut free = 0usize;
        let mut cursor = list.free_head;
        while cursor != NIL {
            free += 1;
            cursor = list.entries[cursor as usize].next;
        }
        assert_eq!(free + list.len(), list.capacity(), "pool slots leaked");
    }

    // ========================================================================
    // Construction
    // ========================================================================

    #[test]
    fn test_minimum_size() {
        assert_eq!(
            Hotlist::with_capacity(1, defaults()).err(),
            Some(CapacityError::HotlistTooSmall)
        );
        assert!(Hotlist::with_capacity(2, defaults()).is_ok());
    }

    #[test]
    fn test_size_limit() {
        assert_eq!(
            Hotlist::with_capacity(MAX_POOL_ENTRIES + 1, defaults()).err(),
            Some(CapacityError::PoolTooLarge)
        );
    }

    #[test]
    fn test_new_list_is_empty() {
        let list = Hotlist::with_capacity(8, defaults()).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.hottest(), None);
        assert_eq!(list.base_score(), 0);
        assert_invariants(&list);
    }

    // ========================================================================
    // Touch / Eviction
    // ========================================================================

    #[test]
    fn test_population_bound() {
        let mut list = Hotlist::with_capacity(4, defaults()).unwrap();
        for page in 0..10u64 {
            list.touch(0x1000 + page);
            assert_invariants(&list);
        }
        // Pool of 4 tracks at most 3 pages.
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_eviction_takes_coldest() {
        let mut list = Hotlist::with_capacity(4, defaults()).unwrap();
        list.touch(0xa);
        list.touch(0xb);
        list.touch(0xc);
        assert_eq!(list.len(), 3);

        // 0xa has aged the longest and sits at the tail.
        let outcome = list.touch(0xd);
        assert!(outcome.inserted);
        assert!(outcome.evicted);
        assert!(!list.contains(0xa));
        assert!(list.contains(0xb));
        assert!(list.contains(0xc));
        assert!(list.contains(0xd));
        assert_invariants(&list);
    }

    #[test]
    fn test_reinforce_promotes() {
        let mut list = Hotlist::with_capacity(8, defaults()).unwrap();
        list.touch(0xa);
        list.touch(0xb);
        list.touch(0xc);
        // Freshest insertion is hottest right now.
        assert_eq!(list.page_id(list.hottest().unwrap()), 0xc);

        list.touch(0xa);
        assert_eq!(list.page_id(list.hottest().unwrap()), 0xa);
        assert_invariants(&list);
    }

    #[test]
    fn test_touch_outcome_flags() {
        let mut list = Hotlist::with_capacity(8, defaults()).unwrap();
        let first = list.touch(0xa);
        assert!(first.inserted);
        assert!(!first.evicted);

        let again = list.touch(0xa);
        assert!(!again.inserted);
        assert!(!again.evicted);
    }

    #[test]
    fn test_equal_scores_keep_prior_order() {
        // increment = decrement = 0 makes every entry sit at the same score.
        let params = HotlistParams {
            insertion: 5,
            increment: 0,
            decrement: 0,
            maximum: 1024,
        };
        let mut list = Hotlist::with_capacity(8, params).unwrap();
        list.touch(0xa);
        list.touch(0xb);
        list.touch(0xc);
        assert_eq!(
            snapshot(&list),
            vec![(0xa, 5), (0xb, 5), (0xc, 5)]
        );

        // Re-touching 0xb must not move it past its equal-score peers.
        list.touch(0xb);
        assert_eq!(
            snapshot(&list),
            vec![(0xa, 5), (0xb, 5), (0xc, 5)]
        );
        assert_invariants(&list);
    }

    #[test]
    fn test_score_clamped_to_maximum() {
        let params = HotlistParams {
            insertion: 0,
            increment: 1000,
            decrement: 1,
            maximum: 100,
        };
        let mut list = Hotlist::with_capacity(4, params).unwrap();
        list.touch(0xa);
        list.touch(0xa);
        let idx = list.hottest().unwrap();
        assert_eq!(list.relative_score(idx), 100);

        list.touch(0xa);
        let idx = list.hottest().unwrap();
        assert_eq!(list.relative_score(idx), 100);
        assert_invariants(&list);
    }

    // ========================================================================
    // Decay
    // ========================================================================

    #[test]
    fn test_lazy_decay_formula() {
        let mut list = Hotlist::with_capacity(8, defaults()).unwrap();
        list.touch(0xa);
        let first = list.relative_score_of(0xa);

        list.touch(0xb);
        list.touch(0xa);
        let after = list.relative_score_of(0xa);

        // One reinforcement nets at least a full increment even though the
        // base advanced in between.
        assert!(after >= first + defaults().increment);
        assert_eq!(after, defaults().increment + defaults().decrement);
    }

    #[test]
    fn test_stale_entry_decays_to_floor() {
        let params = HotlistParams {
            insertion: 3,
            increment: 8,
            decrement: 1,
            maximum: 1024,
        };
        let mut list = Hotlist::with_capacity(16, params).unwrap();
        list.touch(0xa);
        assert_eq!(list.relative_score_of(0xa), 3);

        // Five foreign touches age 0xa past its insertion credit.
        for page in 1..6u64 {
            list.touch(0xb00 + page);
        }
        assert_eq!(list.relative_score_of(0xa), 0);
        assert!(list.contains(0xa));
        assert_invariants(&list);
    }

    #[test]
    fn test_untracked_page_reads_zero() {
        let list = Hotlist::with_capacity(4, defaults()).unwrap();
        assert_eq!(list.relative_score_of(0xdead), 0);
    }

    // ========================================================================
    // Overflow rebase
    // ========================================================================

    #[test]
    fn test_rebase_preserves_relative_state() {
        let params = defaults();
        let mut shifted = Hotlist::with_capacity(8, params).unwrap();
        let mut control = Hotlist::with_capacity(8, params).unwrap();

        for list in [&mut shifted, &mut control] {
            list.touch(0xa);
            list.touch(0xa);
            list.touch(0xa);
            list.touch(0xb);
            list.touch(0xb);
            list.touch(0xc);
        }

        // Move the shifted list's numeric frame right up to the rebase
        // threshold without altering any relative score.
        let margin = params.decrement + params.maximum;
        let delta = (u32::MAX - margin) - shifted.base_score;
        shifted.base_score += delta;
        let mut cursor = shifted.head;
        while cursor != NIL {
            shifted.entries[cursor as usize].score += delta;
            cursor = shifted.entries[cursor as usize].next;
        }
        assert_eq!(snapshot(&shifted), snapshot(&control));

        // The next touch rebases the shifted list; behavior must be
        // indistinguishable from the control.
        shifted.touch(0xb);
        control.touch(0xb);

        assert_eq!(snapshot(&shifted), snapshot(&control));
        assert_eq!(shifted.base_score(), params.decrement);
        assert!(control.base_score() > params.decrement);
        assert_invariants(&shifted);
        assert_invariants(&control);
    }

    // ========================================================================
    // Forget / Reset
    // ========================================================================

    #[test]
    fn test_forget_is_idempotent() {
        let mut list = Hotlist::with_capacity(4, defaults()).unwrap();
        assert!(!list.forget(0xa));

        list.touch(0xa);
        assert!(list.forget(0xa));
        assert!(!list.forget(0xa));
        assert!(list.is_empty());
        assert_invariants(&list);
    }

    #[test]
    fn test_forget_middle_entry_relinks() {
        let mut list = Hotlist::with_capacity(8, defaults()).unwrap();
        list.touch(0xa);
        list.touch(0xb);
        list.touch(0xc);

        assert!(list.forget(0xb));
        assert_eq!(list.len(), 2);
        let pages: Vec<PageId> =
            snapshot(&list).iter().map(|(page, _)| *page).collect();
        assert_eq!(pages, vec![0xc, 0xa]);
        assert_invariants(&list);
    }

    #[test]
    fn test_reset_returns_to_empty() {
        let mut list = Hotlist::with_capacity(8, defaults()).unwrap();
        for page in 0..5u64 {
            list.touch(page);
        }
        list.reset();
        assert!(list.is_empty());
        assert_eq!(list.base_score(), 0);
        assert_invariants(&list);

        list.touch(0xa);
        assert_eq!(list.len(), 1);
        assert_invariants(&list);
    }

    #[test]
    fn test_slot_reuse_after_churn() {
        let mut list = Hotlist::with_capacity(4, defaults()).unwrap();
        for round in 0..50u64 {
            list.touch(round % 7);
            if round % 3 == 0 {
                list.forget((round + 1) % 7);
            }
            assert_invariants(&list);
        }
    }
}
