use std::sync::Arc;

use super::IslandSim;
use crate::config::{INVALID_EDGE, INVALID_ISLAND};
use crate::core::{
    edge_of_instance, CpuExternalData, EdgeIndex, EdgeState, EdgeType, IslandId, NodeIndex,
};
use crate::utils::ScopedTimer;

impl IslandSim {
    /// Links every queued edge into the graph, creating, growing and merging
    /// islands as needed, and wakes islands touched by newly active edges.
    pub fn process_new_edges(&mut self) {
        let _timer = ScopedTimer::new("Basic.processNewEdges", self.context_id);
        let cpu_data = Arc::clone(&self.cpu_data);
        let cpu = cpu_data.read();

        self.insert_new_edges(&cpu);

        let mut processed = 0usize;
        for ty in 0..EdgeType::COUNT {
            let dirty = std::mem::take(&mut self.dirty_edges[ty]);
            for &edge_index in &dirty {
                let edge = self.edges[edge_index as usize];
                if !edge.is_in_dirty_list() {
                    continue;
                }
                self.edges[edge_index as usize].clear_in_dirty_list();
                if edge.is_pending_destroyed() || !edge.is_inserted() {
                    continue;
                }
                self.connect_edge(edge_index, &cpu);
                processed += 1;
            }
            let mut dirty = dirty;
            dirty.clear();
            self.dirty_edges[ty] = dirty;
        }
        if processed > 0 {
            log::debug!(
                "processed {processed} new edges, {} islands awake",
                self.active_islands.len()
            );
        }
    }

    fn insert_new_edges(&mut self, cpu: &CpuExternalData) {
        let _timer = ScopedTimer::new("Basic.insertNewEdges", self.context_id);
        for ty in 0..EdgeType::COUNT {
            for i in 0..self.dirty_edges[ty].len() {
                let edge_index = self.dirty_edges[ty][i];
                let edge = self.edges[edge_index as usize];
                if edge.is_in_dirty_list() && !edge.is_pending_destroyed() && !edge.is_inserted() {
                    self.add_connection_to_graph(edge_index, cpu);
                    self.edges[edge_index as usize].set_inserted();
                }
            }
        }
    }

    /// Threads the edge's instances into its endpoints' lists and activates it
    /// when an endpoint is awake.
    fn add_connection_to_graph(&mut self, edge_index: EdgeIndex, cpu: &CpuExternalData) {
        let node1 = cpu.node_index1(edge_index).without_link();
        let node2 = cpu.node_index2(edge_index).without_link();
        let instance = 2 * edge_index;

        let mut active_edge = false;
        let mut kinematic_kinematic = true;
        if node1.is_valid() {
            self.link_edge_instance(node1, instance);
            let node = &self.nodes[node1.slot()];
            active_edge = node.is_active_or_activating();
            kinematic_kinematic = node.is_kinematic();
        }
        if node2.is_valid() && node2.index() != node1.index() {
            self.link_edge_instance(node2, instance + 1);
            let node = &self.nodes[node2.slot()];
            active_edge = active_edge || node.is_active_or_activating();
            kinematic_kinematic = kinematic_kinematic && node.is_kinematic();
        }

        if node1.is_static_body() != node2.is_static_body() {
            let body = if node1.is_valid() { node1 } else { node2 };
            // The island sum moves only with the node count, so both saturate together.
            let node = &mut self.nodes[body.slot()];
            if node.static_touch_count < u16::MAX {
                node.static_touch_count += 1;
                let island_id = self.island_ids[body.slot()];
                if island_id != INVALID_ISLAND {
                    self.island_static_touch_count[island_id as usize] += 1;
                }
            }
        }

        let edge_type = self.edges[edge_index as usize].edge_type;
        if active_edge && (!kinematic_kinematic || edge_type == EdgeType::ContactManager) {
            self.mark_edge_active(edge_index, node1, node2);
        }
    }

    /// Places an inserted edge into the island structure.
    fn connect_edge(&mut self, edge_index: EdgeIndex, cpu: &CpuExternalData) {
        let node1 = cpu.node_index1(edge_index).without_link();
        let node2 = cpu.node_index2(edge_index).without_link();
        let dynamic1 = node1.is_valid() && !self.nodes[node1.slot()].is_kinematic();
        let dynamic2 = node2.is_valid() && !self.nodes[node2.slot()].is_kinematic();

        if dynamic1 && dynamic2 {
            let island1 = self.island_ids[node1.slot()];
            let island2 = self.island_ids[node2.slot()];
            match (island1 != INVALID_ISLAND, island2 != INVALID_ISLAND) {
                (false, false) => {
                    let island_id = self.create_island(node1, cpu);
                    if node2.index() != node1.index() {
                        self.add_node_to_island(node2, node1, island_id, cpu);
                    }
                }
                (true, false) => self.add_node_to_island(node2, node1, island1, cpu),
                (false, true) => self.add_node_to_island(node1, node2, island2, cpu),
                (true, true) if island1 != island2 => {
                    self.merge_islands(island1, island2, node1, node2, cpu);
                }
                (true, true) => {}
            }
        }

        let island_id = self.owning_island(edge_index, cpu);
        if island_id != INVALID_ISLAND && !self.is_edge_linked(island_id, edge_index) {
            self.add_edge_to_island(island_id, edge_index);
        }

        if self.edges[edge_index as usize].is_active() {
            self.wake_edge_endpoints(edge_index, node1, node2, cpu);
        }
    }

    /// Active edges drag sleeping dynamic endpoints awake.
    fn wake_edge_endpoints(
        &mut self,
        edge_index: EdgeIndex,
        node1: NodeIndex,
        node2: NodeIndex,
        cpu: &CpuExternalData,
    ) {
        for node_index in [node1, node2] {
            if !node_index.is_valid() || self.nodes[node_index.slot()].is_kinematic() {
                continue;
            }
            let island_id = self.island_ids[node_index.slot()];
            if island_id == INVALID_ISLAND {
                if !self.nodes[node_index.slot()].is_active() {
                    self.activate_node_internal(node_index, cpu);
                }
            } else if !self.islands[island_id as usize].is_awake() {
                log::trace!("edge {edge_index} wakes island {island_id}");
                self.mark_island_active(island_id);
                self.activate_island_internal(island_id, cpu);
            }
        }
    }

    /// Creates a one-node island around the islandless dynamic `node_index`.
    fn create_island(&mut self, node_index: NodeIndex, cpu: &CpuExternalData) -> IslandId {
        let island_id = self.allocate_island();
        let slot = node_index.slot();
        self.append_node_to_island(island_id, node_index);
        self.island_ids[slot] = island_id;
        self.island_static_touch_count[island_id as usize] = self.nodes[slot].static_touch_count as u32;
        self.fast_route[slot] = NodeIndex::STATIC;
        self.hop_counts[slot] = 0;
        self.link_lone_node_edges(node_index, island_id, cpu);
        if self.nodes[slot].is_active() {
            self.mark_island_active(island_id);
        }
        log::trace!("created island {island_id} rooted at node {slot}");
        island_id
    }

    /// Adds the islandless dynamic `node_index` to `island_id`, reached through `via`.
    fn add_node_to_island(
        &mut self,
        node_index: NodeIndex,
        via: NodeIndex,
        island_id: IslandId,
        cpu: &CpuExternalData,
    ) {
        let slot = node_index.slot();
        debug_assert_eq!(self.island_ids[slot], INVALID_ISLAND);
        self.append_node_to_island(island_id, node_index);
        self.island_ids[slot] = island_id;
        self.island_static_touch_count[island_id as usize] += self.nodes[slot].static_touch_count as u32;
        self.fast_route[slot] = via;
        self.hop_counts[slot] = self.hop_counts[via.slot()] + 1;
        self.link_lone_node_edges(node_index, island_id, cpu);

        let island_awake = self.islands[island_id as usize].is_awake();
        let node_active = self.nodes[slot].is_active();
        if island_awake && !node_active {
            self.activate_node_internal(node_index, cpu);
        } else if !island_awake && node_active {
            self.mark_island_active(island_id);
            self.activate_island_internal(island_id, cpu);
        }
    }

    /// Links the static and kinematic edges a node collected while islandless.
    fn link_lone_node_edges(&mut self, node_index: NodeIndex, island_id: IslandId, cpu: &CpuExternalData) {
        let mut instance = self.nodes[node_index.slot()].first_edge_index;
        while instance != INVALID_EDGE {
            let next = self.edge_instances[instance as usize].next_edge;
            let edge_index = edge_of_instance(instance);
            let other = cpu.opposite_node(instance);
            let other_dynamic = other.is_valid()
                && other.index() != node_index.index()
                && !self.nodes[other.slot()].is_kinematic();
            if !other_dynamic
                && self.edges[edge_index as usize].is_inserted()
                && !self.is_edge_linked(island_id, edge_index)
            {
                self.add_edge_to_island(island_id, edge_index);
            }
            instance = next;
        }
    }

    /// Merges two islands. The one with more nodes survives; its id is returned.
    pub(crate) fn merge_islands(
        &mut self,
        island0: IslandId,
        island1: IslandId,
        node0: NodeIndex,
        node1: NodeIndex,
        cpu: &CpuExternalData,
    ) -> IslandId {
        let size0 = self.islands[island0 as usize].total_nodes();
        let size1 = self.islands[island1 as usize].total_nodes();
        let (keep, absorb, keep_node, absorb_node) = if size0 > size1 {
            (island0, island1, node0, node1)
        } else {
            (island1, island0, node1, node0)
        };

        let keep_awake = self.islands[keep as usize].is_awake();
        let absorb_awake = self.islands[absorb as usize].is_awake();
        if keep_awake && !absorb_awake {
            self.activate_island_internal(absorb, cpu);
        } else if !keep_awake && absorb_awake {
            self.mark_island_active(keep);
            self.activate_island_internal(keep, cpu);
        }
        if absorb_awake {
            self.mark_island_inactive(absorb);
        }

        // Relabel, then splice the node list.
        let mut current = self.islands[absorb as usize].root_node;
        while current.is_valid() {
            self.island_ids[current.slot()] = keep;
            current = self.nodes[current.slot()].next_node;
        }
        let absorbed = std::mem::take(&mut self.islands[absorb as usize]);
        {
            let target = &mut self.islands[keep as usize];
            let tail = target.last_node;
            if tail.is_valid() {
                self.nodes[tail.slot()].next_node = absorbed.root_node;
            } else {
                target.root_node = absorbed.root_node;
            }
            if absorbed.root_node.is_valid() {
                self.nodes[absorbed.root_node.slot()].prev_node = tail;
                target.last_node = absorbed.last_node;
            }
            for ty in 0..target.node_count.len() {
                target.node_count[ty] += absorbed.node_count[ty];
            }

            for ty in 0..EdgeType::COUNT {
                if absorbed.first_edge[ty] == INVALID_EDGE {
                    continue;
                }
                let tail = target.last_edge[ty];
                if tail != INVALID_EDGE {
                    self.edges[tail as usize].next_island_edge = absorbed.first_edge[ty];
                } else {
                    target.first_edge[ty] = absorbed.first_edge[ty];
                }
                self.edges[absorbed.first_edge[ty] as usize].prev_island_edge = tail;
                target.last_edge[ty] = absorbed.last_edge[ty];
                target.edge_count[ty] += absorbed.edge_count[ty];
            }
        }

        self.island_static_touch_count[keep as usize] += self.island_static_touch_count[absorb as usize];
        self.island_static_touch_count[absorb as usize] = 0;
        self.fast_route[absorb_node.slot()] = keep_node;
        self.hop_counts[absorb_node.slot()] = self.hop_counts[keep_node.slot()] + 1;

        self.island_awake.reset(absorb as usize);
        self.island_handles.free_handle(absorb);
        log::trace!("merged island {absorb} into island {keep}");
        keep
    }

    /// Applies every removal requested since the last call.
    pub fn remove_destroyed_edges(&mut self) {
        let _timer = ScopedTimer::new("Basic.removeDestroyedEdges", self.context_id);
        let cpu_data = Arc::clone(&self.cpu_data);
        let cpu = cpu_data.read();

        let destroyed = std::mem::take(&mut self.destroyed_edges);
        for &edge_index in &destroyed {
            let edge = self.edges[edge_index as usize];
            if !edge.is_pending_destroyed() {
                continue;
            }
            if edge.is_inserted() {
                self.remove_connection_internal(edge_index, &cpu);
            }
            let edge = &mut self.edges[edge_index as usize];
            edge.clear_pending_destroyed();
            edge.clear_in_dirty_list();
            edge.set_destroyed();
        }
        let mut destroyed = destroyed;
        destroyed.clear();
        self.destroyed_edges = destroyed;
    }

    /// Unlinks an inserted edge from the graph and marks its endpoints dirty.
    fn remove_connection_internal(&mut self, edge_index: EdgeIndex, cpu: &CpuExternalData) {
        let node1 = cpu.node_index1(edge_index).without_link();
        let node2 = cpu.node_index2(edge_index).without_link();

        let island_id = self.owning_island(edge_index, cpu);
        if island_id != INVALID_ISLAND && self.is_edge_linked(island_id, edge_index) {
            self.remove_edge_from_island(island_id, edge_index);
        }

        if node1.is_valid() {
            self.mark_node_lost_connection(node1, node2);
            self.unlink_edge_instance(node1, 2 * edge_index);
        }
        if node2.is_valid() && node2.index() != node1.index() {
            self.mark_node_lost_connection(node2, node1);
            self.unlink_edge_instance(node2, 2 * edge_index + 1);
        }

        if node1.is_static_body() != node2.is_static_body() {
            let body = if node1.is_valid() { node1 } else { node2 };
            let node = &mut self.nodes[body.slot()];
            if node.static_touch_count > 0 {
                node.static_touch_count -= 1;
                let body_island = self.island_ids[body.slot()];
                if body_island != INVALID_ISLAND {
                    self.island_static_touch_count[body_island as usize] -= 1;
                }
            }
        }

        self.remove_edge_from_activating_list(edge_index);
        if self.edges[edge_index as usize].is_active() {
            self.mark_edge_inactive(edge_index, cpu, false);
        }
        self.edges[edge_index as usize].clear_inserted();
    }

    fn remove_edge_from_activating_list(&mut self, edge_index: EdgeIndex) {
        let edge = &mut self.edges[edge_index as usize];
        if !edge.is_activating() {
            return;
        }
        edge.state.remove(EdgeState::ACTIVATING);
        let list = &mut self.activated_edges[edge.edge_type.index()];
        if let Some(position) = list.iter().position(|e| *e == edge_index) {
            list.swap_remove(position);
        }
    }
}
