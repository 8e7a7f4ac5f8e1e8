//! Structural validation of the island graph.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::IslandSim;
use crate::config::{INVALID_EDGE, INVALID_ISLAND};
use crate::core::{CpuExternalData, EdgeType, IslandId, NodeType};
use crate::error::{ConsistencyError, Result};

impl IslandSim {
    /// Walks every island and checks the intrusive lists, counters, active
    /// indices and edge ownership against each other.
    pub fn check_internal_consistency(&self) -> Result<()> {
        let cpu = self.cpu_data.read();
        let island_ids: Vec<IslandId> = self.island_id_iter().collect();

        #[cfg(feature = "parallel")]
        island_ids
            .par_iter()
            .try_for_each(|&island_id| self.check_island(island_id, &cpu))?;
        #[cfg(not(feature = "parallel"))]
        island_ids
            .iter()
            .try_for_each(|&island_id| self.check_island(island_id, &cpu))?;

        for (index, &island_id) in self.active_islands.iter().enumerate() {
            let island = &self.islands[island_id as usize];
            if island.active_index != index as u32 || island.is_empty() {
                return Err(ConsistencyError::ActiveIndexMismatch { island: island_id });
            }
        }

        // Every inserted edge with a dynamic endpoint in an island is linked exactly once.
        // Queued and pending-destroyed edges may still be detached.
        let mut occurrences = vec![0u8; self.edges.len()];
        for &island_id in &island_ids {
            for ty in 0..EdgeType::COUNT {
                let mut edge_index = self.islands[island_id as usize].first_edge[ty];
                while edge_index != INVALID_EDGE {
                    let seen = &mut occurrences[edge_index as usize];
                    *seen = seen.saturating_add(1);
                    edge_index = self.edges[edge_index as usize].next_island_edge;
                }
            }
        }
        for (edge_index, edge) in self.edges.iter().enumerate() {
            let expected = u8::from(
                edge.is_inserted()
                    && !edge.is_in_dirty_list()
                    && self.owning_island(edge_index as u32, &cpu) != INVALID_ISLAND,
            );
            let seen = occurrences[edge_index];
            let detached_ok = edge.is_in_dirty_list() || edge.is_pending_destroyed();
            if seen > 1 || (seen != expected && !detached_ok) {
                return Err(ConsistencyError::EdgeIslandMismatch {
                    edge: edge_index as u32,
                });
            }
        }
        Ok(())
    }

    fn check_island(&self, island_id: IslandId, cpu: &CpuExternalData) -> Result<()> {
        let island = &self.islands[island_id as usize];

        let awake_listed = island.is_awake()
            && self.active_islands.get(island.active_index as usize) == Some(&island_id);
        if island.is_awake() != awake_listed || island.is_awake() != self.island_awake.test(island_id as usize) {
            return Err(ConsistencyError::ActiveIndexMismatch { island: island_id });
        }

        let mut node_count = [0u32; NodeType::COUNT];
        let mut static_touch = 0u32;
        let mut previous = crate::core::NodeIndex::STATIC;
        let mut current = island.root_node;
        let limit = self.nodes.len() as u32;
        let mut walked = 0u32;
        while current.is_valid() {
            walked += 1;
            if walked > limit {
                return Err(ConsistencyError::NodeListBroken { island: island_id });
            }
            let node = &self.nodes[current.slot()];
            if node.prev_node.index() != previous.index() {
                return Err(ConsistencyError::NodeListBroken { island: island_id });
            }
            if self.island_ids[current.slot()] != island_id || node.is_kinematic() || node.is_deleted() {
                return Err(ConsistencyError::NodeIslandMismatch {
                    node: current.index(),
                    island: island_id,
                });
            }
            node_count[node.ty.index()] += 1;
            static_touch += node.static_touch_count as u32;
            previous = current;
            current = node.next_node;
        }
        if previous.index() != island.last_node.index() {
            return Err(ConsistencyError::NodeListBroken { island: island_id });
        }
        if node_count != island.node_count {
            return Err(ConsistencyError::NodeCountMismatch { island: island_id });
        }
        if static_touch != self.island_static_touch_count[island_id as usize] {
            return Err(ConsistencyError::StaticTouchMismatch { island: island_id });
        }

        for ty in 0..EdgeType::COUNT {
            let mut count = 0u32;
            let mut previous = INVALID_EDGE;
            let mut edge_index = island.first_edge[ty];
            while edge_index != INVALID_EDGE {
                let edge = &self.edges[edge_index as usize];
                count += 1;
                if count as usize > self.edges.len()
                    || edge.prev_island_edge != previous
                    || edge.edge_type.index() != ty
                {
                    return Err(ConsistencyError::EdgeListBroken { island: island_id, edge_type: ty });
                }
                if self.owning_island(edge_index, cpu) != island_id {
                    return Err(ConsistencyError::EdgeIslandMismatch { edge: edge_index });
                }
                previous = edge_index;
                edge_index = edge.next_island_edge;
            }
            if previous != island.last_edge[ty] {
                return Err(ConsistencyError::EdgeListBroken { island: island_id, edge_type: ty });
            }
            if count != island.edge_count[ty] {
                return Err(ConsistencyError::EdgeCountMismatch { island: island_id, edge_type: ty });
            }
        }
        Ok(())
    }

    /// Whether everything reported by the last sleep pass is actually asleep.
    pub fn validate_deactivations(&self) -> bool {
        let nodes_asleep = self
            .nodes_to_put_to_sleep
            .iter()
            .flatten()
            .all(|node| !self.nodes[node.slot()].is_active());
        let edges_asleep = self
            .deactivating_edges
            .iter()
            .flatten()
            .all(|edge| !self.edges[*edge as usize].is_active());
        nodes_asleep && edges_asleep
    }
}
