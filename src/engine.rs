//! Migration Engine and Control Surface
//!
//! Ties the per-CPU hotlists, the candidate pool, and the migration buffer
//! together:
//!
//! ```text
//! sampling IRQ ──► register_page_access ──► hotlists[cpu].touch
//!                                                 │
//! decision tick ─► refill_migration_buffer ◄──────┘
//!                      │  k-way heap merge over every hotlist
//!                      ▼
//!                  candidate pool ──sort──► migration buffer
//!                                                 │
//! migration executor ◄────────────────────────────┘
//!                      └─► register_page_moved ──► forget everywhere
//! ```
//!
//! ## Locking
//!
//! Each hotlist sits behind its own `spin::Mutex`; `touch`/`forget` take
//! exactly one of them. The decision cycle takes the hotlist locks one at a
//! time while merging, which makes each individual read safe, and the
//! single-flight cycle state (candidate pool, buffer, merge scratch) sits
//! behind its own mutex. The cross-cycle consistency of the merge still
//! relies on the external sequencing contract: the control plane stops the
//! sampling source before a decision tick and resumes it afterwards, so
//! the hotlists are quiescent while the merge walks them. Locks never
//! nest, so no ordering discipline is needed.

use alloc::collections::BinaryHeap;
use alloc::vec::Vec;

use spin::{Mutex, RwLock};

use crate::candidates::{drain_into_buffer, CandidatePool, HeapSlot, MigrationCandidate};
use crate::hotlist::Hotlist;
use crate::topology::{self, NodeMap, MAX_NODES};
use crate::types::{
    CapacityError, EngineParams, EngineStats, EngineStatsSnapshot, HotlistParams, MigrationTarget,
    PageId, MAX_CPUS, MAX_POOL_ENTRIES,
};

/// Single-flight decision-cycle state. Everything the merge needs is
/// preallocated here so a refill never allocates.
struct CycleState {
    pool: CandidatePool,
    buffer: Vec<MigrationTarget>,
    buffer_capacity: usize,
    heap: BinaryHeap<HeapSlot>,
    node_sums: [u64; MAX_NODES],
}

/// The NUMA page-migration decision engine.
pub struct MigrationEngine {
    hotlists: Vec<Mutex<Hotlist>>,
    cycle: Mutex<CycleState>,
    node_map: NodeMap,
    params: EngineParams,
    hotlist_params: HotlistParams,
    stats: EngineStats,
}

impl MigrationEngine {
    /// Allocate every fixed pool. All-or-nothing: any failure drops
    /// whatever was built and reports why.
    pub fn new(
        cpus: usize,
        tracked: usize,
        candidates: usize,
        enqueued: usize,
    ) -> Result<Self, CapacityError> {
        if cpus == 0 || cpus > MAX_CPUS {
            return Err(CapacityError::BadCpuCount);
        }
        if enqueued == 0 {
            return Err(CapacityError::EmptyPool);
        }
        if enqueued > MAX_POOL_ENTRIES {
            return Err(CapacityError::PoolTooLarge);
        }

        let hotlist_params = HotlistParams::default_params();
        let mut hotlists = Vec::new();
        hotlists.try_reserve_exact(cpus)?;
        for _ in 0..cpus {
            hotlists.push(Mutex::new(Hotlist::with_capacity(tracked, hotlist_params)?));
        }

        let pool = CandidatePool::with_capacity(candidates)?;
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(enqueued)?;
        let mut heap = BinaryHeap::new();
        heap.try_reserve(cpus)?;

        let node_map = NodeMap::identity(cpus).map_err(|_| CapacityError::OutOfMemory)?;

        Ok(Self {
            hotlists,
            cycle: Mutex::new(CycleState {
                pool,
                buffer,
                buffer_capacity: enqueued,
                heap,
                node_sums: [0; MAX_NODES],
            }),
            node_map,
            params: EngineParams::default_params(),
            hotlist_params,
            stats: EngineStats::new(),
        })
    }

    /// Reset every tunable to its default and drop all tracked state.
    /// Pool capacities and the topology map are untouched.
    pub fn init(&mut self) {
        self.params = EngineParams::default_params();
        self.hotlist_params = HotlistParams::default_params();
        for list in &self.hotlists {
            let mut list = list.lock();
            list.set_params(self.hotlist_params);
            list.reset();
        }
        let cycle = self.cycle.get_mut();
        cycle.pool.reset();
        cycle.buffer.clear();
        self.stats.reset();
    }

    #[inline]
    pub fn cpu_count(&self) -> usize {
        self.hotlists.len()
    }

    #[inline]
    pub fn engine_params(&self) -> EngineParams {
        self.params
    }

    #[inline]
    pub fn hotlist_params(&self) -> HotlistParams {
        self.hotlist_params
    }

    pub fn set_engine_params(&mut self, params: EngineParams) -> Result<(), &'static str> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Replace the score tunables on every hotlist. Intended for use
    /// between decision cycles only.
    pub fn set_hotlist_params(&mut self, params: HotlistParams) -> Result<(), &'static str> {
        params.validate()?;
        self.hotlist_params = params;
        for list in &self.hotlists {
            list.lock().set_params(params);
        }
        Ok(())
    }

    /// Install an explicit CPU→node table; it must cover every CPU.
    pub fn set_node_map(&mut self, table: &[u32]) -> Result<(), &'static str> {
        if table.len() != self.hotlists.len() {
            return Err("topology map must cover every CPU");
        }
        self.node_map = NodeMap::from_slice(table)?;
        Ok(())
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    // ------------------------------------------------------------------
    // Sampling path
    // ------------------------------------------------------------------

    /// Record a page access observed on `cpu`. Total: out-of-range CPUs
    /// fold onto the last hotlist rather than fail.
    pub fn touch(&self, cpu: usize, page_id: PageId) {
        let cpu = cpu.min(self.hotlists.len() - 1);
        let outcome = self.hotlists[cpu].lock().touch(page_id);
        EngineStats::bump(&self.stats.touches);
        if outcome.inserted {
            EngineStats::bump(&self.stats.insertions);
        }
        if outcome.evicted {
            EngineStats::bump(&self.stats.evictions);
        }
    }

    /// Forget a page on every CPU's hotlist; called after the executor
    /// relocated it so stale samples do not re-nominate the old frame.
    pub fn forget_everywhere(&self, page_id: PageId) {
        let mut forgotten = false;
        for list in &self.hotlists {
            forgotten |= list.lock().forget(page_id);
        }
        if forgotten {
            EngineStats::bump(&self.stats.forgets);
        }
    }

    /// Reset every hotlist, keeping parameters. The external driver calls
    /// this after a cycle when `flush_after_refill` is set.
    pub fn flush_hotlists(&self) {
        for list in &self.hotlists {
            list.lock().reset();
        }
    }

    #[cfg(test)]
    fn hotlist_contains(&self, cpu: usize, page_id: PageId) -> bool {
        self.hotlists[cpu].lock().contains(page_id)
    }

    // ------------------------------------------------------------------
    // Decision cycle
    // ------------------------------------------------------------------

    /// Run one decision cycle: merge every hotlist, rebuild the candidate
    /// pool, sort, and overwrite the migration buffer. Returns the number
    /// of targets enqueued; zero is a valid outcome. Single-flight by
    /// construction: concurrent callers serialize on the cycle state.
    pub fn refill_migration_buffer(&self) -> usize {
        let mut cycle = self.cycle.lock();
        let cycle = &mut *cycle;

        self.refill_candidates(cycle);
        EngineStats::add(&self.stats.candidates, cycle.pool.len() as u64);

        let enqueued = drain_into_buffer(
            &mut cycle.pool,
            &mut cycle.buffer,
            cycle.buffer_capacity,
            self.params.min_score,
            self.params.min_rate,
        );
        EngineStats::bump(&self.stats.refills);
        EngineStats::add(&self.stats.enqueued, enqueued as u64);
        crate::kdebug!(
            "migration refill: {} candidates, {} enqueued",
            cycle.pool.len(),
            enqueued
        );
        enqueued
    }

    /// Read access to the buffer produced by the last refill, without
    /// recomputation.
    pub fn with_migration_buffer<R>(&self, f: impl FnOnce(&[MigrationTarget]) -> R) -> R {
        let cycle = self.cycle.lock();
        f(&cycle.buffer)
    }

    /// Copy the last buffer into `out`, returning how many targets were
    /// written.
    pub fn copy_migration_buffer(&self, out: &mut [MigrationTarget]) -> usize {
        let cycle = self.cycle.lock();
        let count = cycle.buffer.len().min(out.len());
        out[..count].copy_from_slice(&cycle.buffer[..count]);
        count
    }

    /// Read access to the last cycle's candidate pool (diagnostics).
    pub fn with_candidates<R>(&self, f: impl FnOnce(&[MigrationCandidate]) -> R) -> R {
        let cycle = self.cycle.lock();
        f(cycle.pool.as_slice())
    }

    /// Build the candidate pool by consuming hotlist entries in globally
    /// descending relative-score order: a max-heap holds one cursor per
    /// non-empty hotlist, and every pop either admits a new page (after
    /// inquiring all CPUs for its aggregate) or skips a duplicate, then
    /// advances that CPU's cursor. Ends when the pool is full or every
    /// cursor ran off its list.
    fn refill_candidates(&self, cycle: &mut CycleState) {
        cycle.pool.reset();
        cycle.heap.clear();

        for (cpu, list) in self.hotlists.iter().enumerate() {
            let list = list.lock();
            if let Some(entry) = list.hottest() {
                cycle.heap.push(HeapSlot {
                    cpu: cpu as u32,
                    entry,
                    score: list.relative_score(entry),
                });
            }
        }

        while !cycle.pool.is_full() {
            let Some(slot) = cycle.heap.pop() else {
                break;
            };

            let (page_id, next) = {
                let list = self.hotlists[slot.cpu as usize].lock();
                let page_id = list.page_id(slot.entry);
                let next = list
                    .cooler(slot.entry)
                    .map(|entry| (entry, list.relative_score(entry)));
                (page_id, next)
            };

            if !cycle.pool.contains(page_id) {
                let candidate = self.inquire(page_id, &mut cycle.node_sums);
                cycle.pool.push(candidate);
            }

            if let Some((entry, score)) = next {
                cycle.heap.push(HeapSlot {
                    cpu: slot.cpu,
                    entry,
                    score,
                });
            }
        }
    }

    /// Aggregate a page's relative score across every CPU, grouped by
    /// destination node. The node with the largest share becomes the
    /// migration destination; the rate is that share in percent, rounded,
    /// with the denominator floored to one.
    fn inquire(&self, page_id: PageId, node_sums: &mut [u64; MAX_NODES]) -> MigrationCandidate {
        node_sums.fill(0);
        let mut total: u64 = 0;
        for (cpu, list) in self.hotlists.iter().enumerate() {
            let score = list.lock().relative_score_of(page_id) as u64;
            if score == 0 {
                continue;
            }
            node_sums[self.node_map.node_of(cpu)] += score;
            total += score;
        }

        let mut dest_node = 0usize;
        let mut best = 0u64;
        for (node, &sum) in node_sums.iter().enumerate() {
            if sum > best {
                best = sum;
                dest_node = node;
            }
        }

        let denom = total.max(1);
        let rate = ((best * 100 + denom / 2) / denom) as u8;
        MigrationCandidate {
            page_id,
            dest_node: dest_node as u32,
            score: total.min(u32::MAX as u64) as u32,
            rate,
        }
    }
}

// ============================================================================
// Global Control Surface
// ============================================================================

/// The engine slot. One engine per hypervisor; the control plane allocates
/// it at bring-up and frees it at teardown.
static ENGINE: RwLock<Option<MigrationEngine>> = RwLock::new(None);

/// Allocate the engine pools: `tracked` hotlist entries per CPU, a
/// candidate pool, and the migration buffer. All-or-nothing: on failure
/// the previous engine (if any) is left untouched.
pub fn alloc_migration_engine(
    cpus: usize,
    tracked: usize,
    candidates: usize,
    enqueued: usize,
) -> Result<(), CapacityError> {
    let engine = MigrationEngine::new(cpus, tracked, candidates, enqueued)?;
    crate::kinfo!(
        "migration engine allocated: {} CPUs, {} tracked/CPU, {} candidates, {} buffer slots",
        cpus,
        tracked,
        candidates,
        enqueued
    );
    *ENGINE.write() = Some(engine);
    Ok(())
}

/// Reset tunables to defaults and drop all tracked state.
pub fn init_migration_engine() -> Result<(), &'static str> {
    let mut slot = ENGINE.write();
    let engine = slot.as_mut().ok_or("migration engine not allocated")?;
    engine.init();
    crate::kinfo!("migration engine reset to defaults");
    Ok(())
}

/// Set the migration thresholds and the flush policy flag.
pub fn param_migration_engine(
    min_rate: u8,
    min_score: u32,
    flush_after_refill: bool,
) -> Result<(), &'static str> {
    let mut slot = ENGINE.write();
    let engine = slot.as_mut().ok_or("migration engine not allocated")?;
    engine.set_engine_params(EngineParams {
        min_rate,
        min_score,
        flush_after_refill,
    })?;
    crate::kdebug!(
        "migration params: min_rate={} min_score={} flush={}",
        min_rate,
        min_score,
        flush_after_refill
    );
    Ok(())
}

/// Set the hotlist score tunables on every CPU.
pub fn param_migration_lists(
    insertion: u32,
    increment: u32,
    decrement: u32,
    maximum: u32,
) -> Result<(), &'static str> {
    let mut slot = ENGINE.write();
    let engine = slot.as_mut().ok_or("migration engine not allocated")?;
    engine.set_hotlist_params(HotlistParams {
        insertion,
        increment,
        decrement,
        maximum,
    })?;
    crate::kdebug!(
        "hotlist params: insertion={} increment={} decrement={} maximum={}",
        insertion,
        increment,
        decrement,
        maximum
    );
    Ok(())
}

/// Install the CPU→node map supplied by the platform layer.
pub fn param_migration_topology(table: &[u32]) -> Result<(), &'static str> {
    let mut slot = ENGINE.write();
    let engine = slot.as_mut().ok_or("migration engine not allocated")?;
    engine.set_node_map(table)?;
    crate::kdebug!("topology map installed for {} CPUs", table.len());
    Ok(())
}

/// Record a page access on the CPU reported by the registered current-CPU
/// resolver. No-op while the engine is not allocated.
pub fn register_page_access(page_id: PageId) {
    register_page_access_cpu(page_id, topology::current_cpu());
}

/// Record a page access observed on a specific CPU. No-op while the engine
/// is not allocated.
pub fn register_page_access_cpu(page_id: PageId, cpu: usize) {
    if let Some(engine) = ENGINE.read().as_ref() {
        engine.touch(cpu, page_id);
    }
}

/// Called by the migration executor after a successful relocation: the
/// page is forgotten on every CPU, not just the source.
pub fn register_page_moved(page_id: PageId) {
    if let Some(engine) = ENGINE.read().as_ref() {
        engine.forget_everywhere(page_id);
    }
}

/// Run one decision cycle and return how many targets were enqueued.
pub fn refill_migration_buffer() -> Result<usize, &'static str> {
    let slot = ENGINE.read();
    let engine = slot.as_ref().ok_or("migration engine not allocated")?;
    Ok(engine.refill_migration_buffer())
}

/// Copy the buffer produced by the last refill into `out` without
/// recomputation. Returns the number of targets written; zero when the
/// engine is not allocated.
pub fn get_migration_buffer(out: &mut [MigrationTarget]) -> usize {
    match ENGINE.read().as_ref() {
        Some(engine) => engine.copy_migration_buffer(out),
        None => 0,
    }
}

/// Reset every hotlist, keeping parameters. Drivers honoring
/// `flush_after_refill` call this after draining the buffer.
pub fn flush_migration_lists() -> Result<(), &'static str> {
    let slot = ENGINE.read();
    let engine = slot.as_ref().ok_or("migration engine not allocated")?;
    engine.flush_hotlists();
    Ok(())
}

/// Counter snapshot, `None` while the engine is not allocated.
pub fn migration_stats() -> Option<EngineStatsSnapshot> {
    ENGINE.read().as_ref().map(|engine| engine.stats())
}

pub fn engine_allocated() -> bool {
    ENGINE.read().is_some()
}

/// Tear the engine down, releasing every pool.
pub fn free_migration_engine() {
    if ENGINE.write().take().is_some() {
        crate::kinfo!("migration engine freed");
    }
}

// ============================================================================
// Tests
// ============================================================================
