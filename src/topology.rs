//! CPU → NUMA Node Topology
//!
//! The merge/inquire step groups per-CPU scores by destination node, so it
//! needs a CPU→node mapping. That mapping belongs to the platform layer
//! (SRAT parsing, hypervisor topology discovery), not to this engine; the
//! embedder supplies it through the control surface and may replace it
//! between decision cycles. The default is the identity mapping (one node
//! per CPU index), which is exact on small hosts and a stated approximation
//! elsewhere.
//!
//! The engine also needs to know which CPU observed a sampled access when
//! the caller uses the CPU-less entry point; the embedder registers a
//! current-CPU callback for that.

use alloc::vec::Vec;

use spin::RwLock;

/// Maximum number of NUMA nodes supported.
pub const MAX_NODES: usize = 64;

static CURRENT_CPU_FN: RwLock<Option<fn() -> usize>> = RwLock::new(None);

/// CPU index → node id map, fixed per engine allocation.
pub struct NodeMap {
    map: Vec<u32>,
    nodes: usize,
}

impl NodeMap {
    /// Identity mapping: node i = cpu i, wrapping past [`MAX_NODES`] on
    /// hosts with more CPUs than supported nodes.
    pub fn identity(cpus: usize) -> Result<Self, &'static str> {
        let mut map = Vec::new();
        map.try_reserve_exact(cpus)
            .map_err(|_| "topology map allocation failed")?;
        for cpu in 0..cpus {
            map.push((cpu % MAX_NODES) as u32);
        }
        Ok(Self {
            nodes: cpus.min(MAX_NODES),
            map,
        })
    }

    /// Build from an explicit per-CPU node table.
    pub fn from_slice(table: &[u32]) -> Result<Self, &'static str> {
        if table.is_empty() {
            return Err("topology map is empty");
        }
        let mut highest = 0u32;
        for &node in table {
            if node as usize >= MAX_NODES {
                return Err("topology map references a node out of range");
            }
            highest = highest.max(node);
        }
        let mut map = Vec::new();
        map.try_reserve_exact(table.len())
            .map_err(|_| "topology map allocation failed")?;
        map.extend_from_slice(table);
        Ok(Self {
            map,
            nodes: highest as usize + 1,
        })
    }

    /// Node the given CPU belongs to. Out-of-range CPUs fold to node 0,
    /// mirroring the platform fallback for unknown processors.
    #[inline]
    pub fn node_of(&self, cpu: usize) -> usize {
        self.map.get(cpu).copied().unwrap_or(0) as usize
    }

    /// Number of distinct nodes the map can produce.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// Number of CPUs covered by the map.
    #[inline]
    pub fn cpu_count(&self) -> usize {
        self.map.len()
    }
}

/// Register the callback resolving "which CPU is executing right now".
/// Replaces any previous registration.
pub fn register_current_cpu_fn(resolver: fn() -> usize) {
    *CURRENT_CPU_FN.write() = Some(resolver);
}

/// Drop the current-CPU callback; lookups fall back to CPU 0.
pub fn unregister_current_cpu_fn() {
    *CURRENT_CPU_FN.write() = None;
}

/// CPU id of the caller, per the registered resolver; CPU 0 when none is
/// registered.
pub fn current_cpu() -> usize {
    match *CURRENT_CPU_FN.read() {
        Some(resolver) => resolver(),
        None => 0,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_identity_map() {
        let map = NodeMap::identity(4).unwrap();
        assert_eq!(map.cpu_count(), 4);
        assert_eq!(map.node_count(), 4);
        for cpu in 0..4 {
            assert_eq!(map.node_of(cpu), cpu);
        }
    }

    #[test]
    fn test_identity_wraps_past_node_limit() {
        let map = NodeMap::identity(MAX_NODES + 2).unwrap();
        assert_eq!(map.node_count(), MAX_NODES);
        assert_eq!(map.node_of(MAX_NODES), 0);
        assert_eq!(map.node_of(MAX_NODES + 1), 1);
    }

    #[test]
    fn test_explicit_map() {
        let map = NodeMap::from_slice(&[0, 0, 1, 1]).unwrap();
        assert_eq!(map.node_count(), 2);
        assert_eq!(map.node_of(0), 0);
        assert_eq!(map.node_of(3), 1);
        // Unknown CPUs fold to node 0.
        assert_eq!(map.node_of(17), 0);
    }

    #[test]
    fn test_explicit_map_validation() {
        assert!(NodeMap::from_slice(&[]).is_err());
        assert!(NodeMap::from_slice(&[0, MAX_NODES as u32]).is_err());
    }

    #[test]
    #[serial]
    fn test_current_cpu_fallback_and_hook() {
        unregister_current_cpu_fn();
        assert_eq!(current_cpu(), 0);

        fn fake_cpu() -> usize {
            3
        }
        register_current_cpu_fn(fake_cpu);
        assert_eq!(current_cpu(), 3);

        unregister_current_cpu_fn();
        assert_eq!(current_cpu(), 0);
    }
}
