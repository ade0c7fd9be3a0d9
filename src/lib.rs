//! # pagemig
//!
//! NUMA page-migration decision engine for hypervisor memory balancing.
//!
//! The hypervisor samples page accesses per CPU (IBS/PEBS drivers, outside
//! this crate) and feeds them to [`register_page_access_cpu`]. Each CPU
//! owns a [`hotlist::Hotlist`], a score-decaying approximation of its
//! recently hot pages with O(1) amortized touch and eviction. On every
//! decision tick, [`refill_migration_buffer`] merges all hotlists through
//! a k-way heap, deduplicates pages into a fixed candidate pool, picks a
//! destination node per page from the cross-CPU score aggregate, and emits
//! a bounded, priority-ordered migration buffer. The migration executor
//! drains the buffer and reports completed moves via
//! [`register_page_moved`].
//!
//! Everything is preallocated at [`alloc_migration_engine`]; the sampling
//! and decision paths never allocate, block, or perform I/O, so they are
//! safe to call from interrupt-like contexts. See `DESIGN.md` for the
//! structure and locking rationale.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod avl;
pub mod candidates;
pub mod engine;
pub mod hotlist;
pub mod logger;
pub mod topology;
pub mod types;

pub use candidates::MigrationCandidate;
pub use engine::{
    alloc_migration_engine, engine_allocated, flush_migration_lists, free_migration_engine,
    get_migration_buffer, init_migration_engine, migration_stats, param_migration_engine,
    param_migration_lists, param_migration_topology, refill_migration_buffer,
    register_page_access, register_page_access_cpu, register_page_moved, MigrationEngine,
};
pub use hotlist::{Hotlist, TouchOutcome};
pub use topology::{register_current_cpu_fn, NodeMap, MAX_NODES};
pub use types::{
    CapacityError, EngineParams, EngineStatsSnapshot, HotlistParams, MigrationTarget, PageId,
    MAX_CPUS,
};

#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {{
        $crate::logger::log($level, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::FATAL, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::ERROR, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::WARN, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::INFO, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::DEBUG, $($arg)*);
    }};
}

#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::TRACE, $($arg)*);
    }};
}
