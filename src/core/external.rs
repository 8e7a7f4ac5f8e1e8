//! Caller-owned data blocks shared with the island sims.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::edge::EdgeIndex;
use super::node_index::NodeIndex;
use crate::utils::BitMap;

/// Opaque id of a solver-side partition edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct PartitionEdgeId(pub u32);

/// Edge endpoint table shared read-only by the accurate and speculative sims.
///
/// Endpoint `k` of edge `e` lives at `2 * e + k`, which doubles as the
/// edge-instance index of that endpoint.
#[derive(Debug, Clone, Default)]
pub struct CpuExternalData {
    pub edge_node_indices: Vec<NodeIndex>,
}

impl CpuExternalData {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn node_index1(&self, edge: EdgeIndex) -> NodeIndex {
        self.edge_node_indices[2 * edge as usize]
    }

    #[inline]
    pub fn node_index2(&self, edge: EdgeIndex) -> NodeIndex {
        self.edge_node_indices[2 * edge as usize + 1]
    }

    /// Endpoint owning edge instance `instance`.
    #[inline]
    pub fn instance_node(&self, instance: u32) -> NodeIndex {
        self.edge_node_indices[instance as usize]
    }

    /// Endpoint on the other side of edge instance `instance`.
    #[inline]
    pub fn opposite_node(&self, instance: u32) -> NodeIndex {
        self.instance_node(instance ^ 1)
    }

    /// Number of edge slots the table can hold.
    pub fn edge_capacity(&self) -> usize {
        self.edge_node_indices.len() / 2
    }

    /// Grows the table so that `edge` has a slot, reserving `growth` extra entries.
    pub fn reserve_edge(&mut self, edge: EdgeIndex, growth: usize) -> bool {
        let node_ids = 2 * edge as usize;
        if self.edge_node_indices.len() <= node_ids {
            self.edge_node_indices
                .resize(node_ids + growth.max(2), NodeIndex::STATIC);
            return true;
        }
        false
    }

    pub fn set_edge_nodes(&mut self, edge: EdgeIndex, node1: NodeIndex, node2: NodeIndex) {
        let node_ids = 2 * edge as usize;
        self.edge_node_indices[node_ids] = node1;
        self.edge_node_indices[node_ids + 1] = node2;
    }
}

/// GPU-solver bookkeeping, owned by the accurate sim only.
#[derive(Debug, Clone, Default)]
pub struct GpuExternalData {
    pub first_partition_edges: Vec<Option<PartitionEdgeId>>,
    pub destroyed_partition_edges: Vec<PartitionEdgeId>,
    pub active_contact_edges: BitMap,
    /// Opaque device address of the narrow-phase edge-node index buffer.
    pub edge_node_index_ptr: Option<u64>,
}

impl GpuExternalData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partition_capacity(capacity: usize) -> Self {
        Self {
            first_partition_edges: vec![None; capacity],
            ..Self::default()
        }
    }

    pub fn first_partition_edge(&self, edge: EdgeIndex) -> Option<PartitionEdgeId> {
        self.first_partition_edges
            .get(edge as usize)
            .copied()
            .flatten()
    }

    pub fn set_first_partition_edge(&mut self, edge: EdgeIndex, partition: Option<PartitionEdgeId>) {
        let slot = edge as usize;
        if slot >= self.first_partition_edges.len() {
            self.first_partition_edges.resize(2 * (slot + 1), None);
        }
        self.first_partition_edges[slot] = partition;
    }

    /// Makes room for `edge` in the first-partition-edge table.
    pub fn reserve_edge(&mut self, edge: EdgeIndex) {
        let slot = edge as usize;
        if self.first_partition_edges.len() <= slot {
            self.first_partition_edges.resize(2 * (slot + 1), None);
        }
    }

    pub fn destroyed_partition_edges(&self) -> &[PartitionEdgeId] {
        &self.destroyed_partition_edges
    }

    pub fn clear_destroyed_partition_edges(&mut self) {
        self.destroyed_partition_edges.clear();
    }

    pub fn active_contact_manager_bitmap(&self) -> &BitMap {
        &self.active_contact_edges
    }

    pub fn set_edge_node_index_ptr(&mut self, ptr: Option<u64>) {
        self.edge_node_index_ptr = ptr;
    }

    pub fn edge_node_index_ptr(&self) -> Option<u64> {
        self.edge_node_index_ptr
    }
}

/// Endpoint table as shared between the accurate and speculative sims.
pub type SharedCpuData = Arc<RwLock<CpuExternalData>>;

/// GPU bookkeeping as handed to the accurate sim.
pub type SharedGpuData = Arc<Mutex<GpuExternalData>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_two_endpoints_per_edge() {
        let mut data = CpuExternalData::new();
        assert!(data.reserve_edge(3, 16));
        data.set_edge_nodes(3, NodeIndex::new(5), NodeIndex::STATIC);
        assert_eq!(data.node_index1(3), NodeIndex::new(5));
        assert!(data.node_index2(3).is_static_body());
        assert_eq!(data.opposite_node(6), NodeIndex::STATIC);
        assert_eq!(data.opposite_node(7), NodeIndex::new(5));
        assert!(!data.reserve_edge(3, 16));
    }

    #[test]
    fn partition_table_grows_on_demand() {
        let mut gpu = GpuExternalData::with_partition_capacity(2);
        gpu.set_first_partition_edge(9, Some(PartitionEdgeId(4)));
        assert_eq!(gpu.first_partition_edge(9), Some(PartitionEdgeId(4)));
        assert_eq!(gpu.first_partition_edge(1), None);
        assert_eq!(gpu.first_partition_edge(500), None);
    }
}
