//! Global configuration constants and run-time settings for island management.

use serde::{Deserialize, Serialize};

/// Sentinel node slot meaning "static body, not a real node".
pub const INVALID_NODE: u32 = u32::MAX;

/// Sentinel island id. An island whose active index equals this value is asleep.
pub const INVALID_ISLAND: u32 = u32::MAX;

/// Sentinel edge and edge-instance index.
pub const INVALID_EDGE: u32 = u32::MAX;

/// Dirty nodes repaired per frame when enhanced determinism is off.
pub const DEFAULT_MAX_DIRTY_NODES_PER_FRAME: u32 = 1000;

/// Number of extra edge-node slots reserved whenever the edge table runs out of room.
pub const EDGE_NODE_INDEX_GROWTH: usize = 2048;

/// Initial size of the first-partition-edge table when GPU bookkeeping is enabled.
pub const DEFAULT_PARTITION_EDGE_CAPACITY: usize = 1024;

/// Per-pass wall clock budget (in milliseconds) above which a warning is logged.
pub const DEFAULT_PASS_BUDGET_MS: f32 = 2.0;

/// Run-time settings for [`crate::SimpleIslandManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IslandManagerConfig {
    /// Repair every dirty node each frame instead of capping the work.
    pub enhanced_determinism: bool,
    /// Keep GPU partition bookkeeping on the accurate island sim.
    pub gpu: bool,
    /// Opaque id forwarded to profile zones.
    pub context_id: u64,
    /// Initial capacity of the first-partition-edge table.
    pub initial_partition_edge_capacity: usize,
}

impl Default for IslandManagerConfig {
    fn default() -> Self {
        Self {
            enhanced_determinism: false,
            gpu: false,
            context_id: 0,
            initial_partition_edge_capacity: DEFAULT_PARTITION_EDGE_CAPACITY,
        }
    }
}

impl IslandManagerConfig {
    pub fn with_enhanced_determinism(mut self, enabled: bool) -> Self {
        self.enhanced_determinism = enabled;
        self
    }

    pub fn with_gpu(mut self, enabled: bool) -> Self {
        self.gpu = enabled;
        self
    }

    pub fn with_context_id(mut self, context_id: u64) -> Self {
        self.context_id = context_id;
        self
    }

    /// Dirty-node budget handed to every lost-edge pass.
    pub fn max_dirty_nodes_per_frame(&self) -> u32 {
        if self.enhanced_determinism {
            u32::MAX
        } else {
            DEFAULT_MAX_DIRTY_NODES_PER_FRAME
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_lifts_dirty_node_cap() {
        let config = IslandManagerConfig::default();
        assert_eq!(config.max_dirty_nodes_per_frame(), 1000);
        let config = config.with_enhanced_determinism(true);
        assert_eq!(config.max_dirty_nodes_per_frame(), u32::MAX);
    }
}
