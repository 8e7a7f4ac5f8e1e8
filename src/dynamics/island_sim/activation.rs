//! Wake and sleep bookkeeping: activity lists, edge activation and the sleep pass.

use std::sync::Arc;

use super::IslandSim;
use crate::config::{INVALID_EDGE, INVALID_ISLAND, INVALID_NODE};
use crate::core::{
    edge_of_instance, CpuExternalData, EdgeIndex, EdgeState, EdgeType, IslandId, NodeIndex, NodeType,
};
use crate::utils::ScopedTimer;

impl IslandSim {
    /// Activates every queued node and the islands they belong to.
    ///
    /// Starts a new frame of reporting: previously activated edges lose their
    /// activating flag and [`Self::nodes_to_activate`] restarts from the
    /// current active lists.
    pub fn wake_islands(&mut self) {
        let _timer = ScopedTimer::new("Basic.wakeIslands", self.context_id);
        self.wake_islands_internal(true);
    }

    /// Second wake pass of a frame. Activations accumulate on top of the
    /// first pass instead of starting a new report.
    pub fn wake_islands2(&mut self) {
        let _timer = ScopedTimer::new("Basic.wakeIslands2", self.context_id);
        self.wake_islands_internal(false);
    }

    fn wake_islands_internal(&mut self, new_frame: bool) {
        if new_frame {
            for ty in 0..EdgeType::COUNT {
                for i in 0..self.activated_edges[ty].len() {
                    let edge_index = self.activated_edges[ty][i];
                    self.edges[edge_index as usize].state.remove(EdgeState::ACTIVATING);
                }
                self.activated_edges[ty].clear();
            }
            for ty in 0..NodeType::COUNT {
                self.initial_active_node_count[ty] = self.active_nodes[ty].len() as u32;
            }
        }

        let cpu_data = Arc::clone(&self.cpu_data);
        let cpu = cpu_data.read();
        let original_active_islands = self.active_islands.len();

        let activating = std::mem::take(&mut self.activating_nodes);
        for node_index in &activating {
            let slot = node_index.slot();
            self.nodes[slot].clear_activating();
            self.active_node_index[slot] = INVALID_NODE;
        }

        for &node_index in &activating {
            let slot = node_index.slot();
            let node = self.nodes[slot];
            if node.is_deleted() || node.is_active() {
                continue;
            }
            let island_id = self.island_ids[slot];
            if island_id != INVALID_ISLAND {
                if !self.islands[island_id as usize].is_awake() {
                    self.mark_island_active(island_id);
                } else {
                    self.activate_node_internal(node_index, &cpu);
                }
            } else if node.is_kinematic() {
                self.wake_kinematic(node_index, &cpu);
            } else {
                self.activate_node_internal(node_index, &cpu);
            }
        }

        // Newly woken islands may only grow the list while we walk it.
        let mut i = original_active_islands;
        while i < self.active_islands.len() {
            let island_id = self.active_islands[i];
            self.activate_island_internal(island_id, &cpu);
            i += 1;
        }

        let mut activating = activating;
        activating.clear();
        if self.activating_nodes.is_empty() {
            self.activating_nodes = activating;
        }

        let woken = self.active_islands.len() - original_active_islands;
        if woken > 0 {
            log::debug!(
                "woke {woken} islands, {} active islands total",
                self.active_islands.len()
            );
        }
    }

    /// Activates a kinematic and whatever it touches.
    fn wake_kinematic(&mut self, node_index: NodeIndex, cpu: &CpuExternalData) {
        let slot = node_index.slot();
        self.nodes[slot].set_active();
        self.nodes[slot].clear_ready_for_sleeping();
        self.mark_kinematic_active(node_index);

        let mut instance = self.nodes[slot].first_edge_index;
        while instance != INVALID_EDGE {
            let next = self.edge_instances[instance as usize].next_edge;
            let edge_index = edge_of_instance(instance);
            let other = cpu.opposite_node(instance).without_link();
            let edge = self.edges[edge_index as usize];
            if edge.is_inserted() {
                let other_is_dynamic = other.is_valid() && !self.nodes[other.slot()].is_kinematic();
                if !other_is_dynamic {
                    if !edge.is_active() && edge.edge_type != EdgeType::Constraint {
                        self.mark_edge_active(edge_index, cpu.node_index1(edge_index), cpu.node_index2(edge_index));
                    }
                } else {
                    let island_id = self.island_ids[other.slot()];
                    if island_id != INVALID_ISLAND {
                        if !self.islands[island_id as usize].is_awake() {
                            self.mark_island_active(island_id);
                        }
                    } else {
                        self.activate_node_internal(other, cpu);
                    }
                }
            }
            instance = next;
        }
    }

    /// Activates every node and edge of `island_id`.
    pub(crate) fn activate_island_internal(&mut self, island_id: IslandId, cpu: &CpuExternalData) {
        let mut current = self.islands[island_id as usize].root_node;
        while current.is_valid() {
            let slot = current.slot();
            let next = self.nodes[slot].next_node;
            if !self.nodes[slot].is_active() {
                if self.nodes[slot].is_activating() {
                    self.remove_from_activating_list(current);
                }
                let node = &mut self.nodes[slot];
                node.set_active();
                node.clear_ready_for_sleeping();
                self.mark_active(current);
            }
            current = next;
        }

        for ty in 0..EdgeType::COUNT {
            let mut edge_index = self.islands[island_id as usize].first_edge[ty];
            while edge_index != INVALID_EDGE {
                let edge = self.edges[edge_index as usize];
                if !edge.is_active() {
                    self.mark_edge_active(edge_index, cpu.node_index1(edge_index), cpu.node_index2(edge_index));
                }
                edge_index = edge.next_island_edge;
            }
        }
    }

    /// Activates a single node and its inserted edges.
    pub(crate) fn activate_node_internal(&mut self, node_index: NodeIndex, cpu: &CpuExternalData) {
        let slot = node_index.slot();
        if self.nodes[slot].is_active() {
            return;
        }
        if self.nodes[slot].is_activating() {
            self.remove_from_activating_list(node_index);
        }
        let node = &mut self.nodes[slot];
        node.set_active();
        node.clear_ready_for_sleeping();
        let node_is_kinematic = node.is_kinematic();
        self.mark_active(node_index);

        let mut instance = self.nodes[slot].first_edge_index;
        while instance != INVALID_EDGE {
            let next = self.edge_instances[instance as usize].next_edge;
            let edge_index = edge_of_instance(instance);
            let edge = self.edges[edge_index as usize];
            if edge.is_inserted() && !edge.is_active() {
                let other = cpu.opposite_node(instance);
                let other_is_dynamic = other.is_valid() && !self.nodes[other.slot()].is_kinematic();
                if !node_is_kinematic || other_is_dynamic || edge.edge_type == EdgeType::ContactManager {
                    self.mark_edge_active(edge_index, cpu.node_index1(edge_index), cpu.node_index2(edge_index));
                }
            }
            instance = next;
        }
    }

    /// Puts every node and edge of `island_id` to sleep and reports them.
    pub(crate) fn deactivate_island(&mut self, island_id: IslandId, cpu: &CpuExternalData) {
        let mut current = self.islands[island_id as usize].root_node;
        while current.is_valid() {
            let slot = current.slot();
            let next = self.nodes[slot].next_node;
            if self.nodes[slot].is_active() {
                self.nodes_to_put_to_sleep[self.nodes[slot].ty.index()].push(current);
                self.mark_inactive(current);
                self.nodes[slot].clear_active();
            }
            current = next;
        }

        for ty in 0..EdgeType::COUNT {
            let mut edge_index = self.islands[island_id as usize].first_edge[ty];
            while edge_index != INVALID_EDGE {
                let edge = self.edges[edge_index as usize];
                if edge.is_active() {
                    self.mark_edge_inactive(edge_index, cpu, true);
                }
                edge_index = edge.next_island_edge;
            }
        }

        self.mark_island_inactive(island_id);
        log::trace!("island {island_id} went to sleep");
    }

    /// Deactivates every island (and islandless node) whose bodies are all ready
    /// for sleeping and that no awake kinematic holds up.
    pub(crate) fn run_sleep_pass(&mut self, permit_kinematic_deactivation: bool, cpu: &CpuExternalData) {
        for i in 0..self.active_islands.len() {
            let island_id = self.active_islands[i];
            self.island_awake.reset(island_id as usize);
        }

        let mut kinematics = std::mem::take(&mut self.kinematic_scratch);
        kinematics.clear();
        kinematics.extend_from_slice(&self.active_kinematic_nodes);
        for &node_index in &kinematics {
            let slot = node_index.slot();
            let listed = self.active_node_index[slot] != INVALID_NODE
                && self
                    .active_kinematic_nodes
                    .get(self.active_node_index[slot] as usize)
                    .is_some_and(|listed| listed.index() == node_index.index());
            if !listed {
                continue;
            }
            if self.nodes[slot].is_ready_for_sleeping() {
                if permit_kinematic_deactivation {
                    self.put_kinematic_to_sleep(node_index, cpu);
                }
            } else {
                let mut instance = self.nodes[slot].first_edge_index;
                while instance != INVALID_EDGE {
                    let other = cpu.opposite_node(instance);
                    if other.is_valid() {
                        let island_id = self.island_ids[other.slot()];
                        if island_id != INVALID_ISLAND {
                            self.island_awake.set(island_id as usize);
                        }
                    }
                    instance = self.edge_instances[instance as usize].next_edge;
                }
            }
        }
        self.kinematic_scratch = kinematics;

        let mut deactivated = 0usize;
        for i in (0..self.active_islands.len()).rev() {
            let Some(&island_id) = self.active_islands.get(i) else {
                continue;
            };
            if self.island_awake.test(island_id as usize) {
                continue;
            }
            let can_deactivate = self.all_nodes_ready(island_id);
            self.island_awake.set(island_id as usize);
            if can_deactivate {
                self.deactivate_island(island_id, cpu);
                deactivated += 1;
            }
        }

        for ty in 0..NodeType::COUNT {
            for i in (0..self.active_nodes[ty].len()).rev() {
                let Some(&node_index) = self.active_nodes[ty].get(i) else {
                    continue;
                };
                if self.can_put_lone_node_to_sleep(node_index, cpu) {
                    self.put_lone_node_to_sleep(node_index, cpu);
                    deactivated += 1;
                }
            }
        }

        if deactivated > 0 {
            log::debug!("sleep pass deactivated {deactivated} islands and islandless nodes");
        }
    }

    fn all_nodes_ready(&self, island_id: IslandId) -> bool {
        let mut current = self.islands[island_id as usize].root_node;
        while current.is_valid() {
            let node = &self.nodes[current.slot()];
            if !node.is_ready_for_sleeping() {
                return false;
            }
            current = node.next_node;
        }
        true
    }

    fn put_kinematic_to_sleep(&mut self, node_index: NodeIndex, cpu: &CpuExternalData) {
        let slot = node_index.slot();
        let mut instance = self.nodes[slot].first_edge_index;
        while instance != INVALID_EDGE {
            let next = self.edge_instances[instance as usize].next_edge;
            let edge_index = edge_of_instance(instance);
            let other = cpu.opposite_node(instance);
            let other_is_dynamic = other.is_valid() && !self.nodes[other.slot()].is_kinematic();
            if !other_is_dynamic && self.edges[edge_index as usize].is_active() {
                self.mark_edge_inactive(edge_index, cpu, true);
            }
            instance = next;
        }
        self.nodes[slot].clear_active();
        self.mark_kinematic_inactive(node_index);
    }

    fn can_put_lone_node_to_sleep(&self, node_index: NodeIndex, cpu: &CpuExternalData) -> bool {
        let slot = node_index.slot();
        let node = &self.nodes[slot];
        if self.island_ids[slot] != INVALID_ISLAND || node.is_kinematic() || !node.is_ready_for_sleeping() {
            return false;
        }
        let mut instance = node.first_edge_index;
        while instance != INVALID_EDGE {
            let other = cpu.opposite_node(instance);
            if other.is_valid() {
                let other_node = &self.nodes[other.slot()];
                if other_node.is_kinematic() && other_node.is_active() && !other_node.is_ready_for_sleeping() {
                    return false;
                }
            }
            instance = self.edge_instances[instance as usize].next_edge;
        }
        true
    }

    fn put_lone_node_to_sleep(&mut self, node_index: NodeIndex, cpu: &CpuExternalData) {
        let slot = node_index.slot();
        self.nodes_to_put_to_sleep[self.nodes[slot].ty.index()].push(node_index);
        self.mark_inactive(node_index);
        self.nodes[slot].clear_active();

        let mut instance = self.nodes[slot].first_edge_index;
        while instance != INVALID_EDGE {
            let next = self.edge_instances[instance as usize].next_edge;
            let edge_index = edge_of_instance(instance);
            if self.edges[edge_index as usize].is_active() {
                self.mark_edge_inactive(edge_index, cpu, true);
            }
            instance = next;
        }
    }

    // ---------------------------------------------------------------------
    // Activity lists

    /// Lists an active node in the active table of its type.
    pub(crate) fn mark_active(&mut self, node_index: NodeIndex) {
        let slot = node_index.slot();
        let node = self.nodes[slot];
        if node.is_kinematic() {
            self.mark_kinematic_active(node_index);
            return;
        }
        if self.active_node_index[slot] == INVALID_NODE {
            let list = &mut self.active_nodes[node.ty.index()];
            self.active_node_index[slot] = list.len() as u32;
            list.push(node_index.without_link());
        }
    }

    /// Swap-removes a node from the active table of its type, keeping the
    /// entries listed before the frame's first wake pass packed at the front.
    pub(crate) fn mark_inactive(&mut self, node_index: NodeIndex) {
        let slot = node_index.slot();
        let node = self.nodes[slot];
        if node.is_kinematic() {
            self.mark_kinematic_inactive(node_index);
            return;
        }
        let mut index = self.active_node_index[slot];
        if index == INVALID_NODE {
            return;
        }
        let ty = node.ty.index();
        let list = &mut self.active_nodes[ty];

        let initial = &mut self.initial_active_node_count[ty];
        if index < *initial {
            *initial -= 1;
            let boundary = *initial;
            let moved = list[boundary as usize];
            list[index as usize] = moved;
            list[boundary as usize] = node_index.without_link();
            self.active_node_index[moved.slot()] = index;
            index = boundary;
        }

        list.swap_remove(index as usize);
        if let Some(moved) = list.get(index as usize).copied() {
            self.active_node_index[moved.slot()] = index;
        }
        self.active_node_index[slot] = INVALID_NODE;
    }

    pub(crate) fn mark_kinematic_active(&mut self, node_index: NodeIndex) {
        let slot = node_index.slot();
        debug_assert!(self.nodes[slot].is_kinematic());
        if self.active_node_index[slot] == INVALID_NODE {
            self.active_node_index[slot] = self.active_kinematic_nodes.len() as u32;
            self.active_kinematic_nodes.push(node_index.without_link());
        }
    }

    /// Drops a kinematic from the kinematic list once nothing references it.
    pub(crate) fn mark_kinematic_inactive(&mut self, node_index: NodeIndex) {
        let slot = node_index.slot();
        if self.nodes[slot].active_ref_count == 0 && self.active_node_index[slot] != INVALID_NODE {
            self.remove_from_kinematic_list(node_index);
        }
    }

    pub(crate) fn remove_from_kinematic_list(&mut self, node_index: NodeIndex) {
        let slot = node_index.slot();
        let index = self.active_node_index[slot];
        debug_assert_ne!(index, INVALID_NODE);
        debug_assert_eq!(self.active_kinematic_nodes[index as usize].index(), node_index.index());
        self.active_kinematic_nodes.swap_remove(index as usize);
        if let Some(moved) = self.active_kinematic_nodes.get(index as usize).copied() {
            self.active_node_index[moved.slot()] = index;
        }
        self.active_node_index[slot] = INVALID_NODE;
    }

    pub(crate) fn remove_from_activating_list(&mut self, node_index: NodeIndex) {
        let slot = node_index.slot();
        let index = self.active_node_index[slot];
        debug_assert_ne!(index, INVALID_NODE);
        debug_assert_eq!(self.activating_nodes[index as usize].index(), node_index.index());
        self.activating_nodes.swap_remove(index as usize);
        if let Some(moved) = self.activating_nodes.get(index as usize).copied() {
            self.active_node_index[moved.slot()] = index;
        }
        self.active_node_index[slot] = INVALID_NODE;
        self.nodes[slot].clear_activating();
    }

    pub(crate) fn mark_island_active(&mut self, island_id: IslandId) {
        let island = &mut self.islands[island_id as usize];
        debug_assert!(!island.is_awake(), "island {island_id} woken twice");
        island.active_index = self.active_islands.len() as u32;
        self.active_islands.push(island_id);
        self.island_awake.set(island_id as usize);
    }

    pub(crate) fn mark_island_inactive(&mut self, island_id: IslandId) {
        let index = self.islands[island_id as usize].active_index;
        debug_assert_ne!(index, INVALID_ISLAND);
        debug_assert_eq!(self.active_islands[index as usize], island_id);
        self.active_islands.swap_remove(index as usize);
        if let Some(moved) = self.active_islands.get(index as usize).copied() {
            self.islands[moved as usize].active_index = index;
        }
        self.islands[island_id as usize].active_index = INVALID_ISLAND;
        self.island_awake.reset(island_id as usize);
    }

    // ---------------------------------------------------------------------
    // Edge activity

    /// Activates an edge, reports it and references its kinematic endpoints.
    pub(crate) fn mark_edge_active(&mut self, edge_index: EdgeIndex, node1: NodeIndex, node2: NodeIndex) {
        let edge = &mut self.edges[edge_index as usize];
        debug_assert!(!edge.is_active(), "edge {edge_index} activated twice");
        edge.activate_edge();
        let edge_type = edge.edge_type;
        if !edge.is_activating() {
            edge.state.insert(EdgeState::ACTIVATING);
            self.activated_edges[edge_type.index()].push(edge_index);
        }
        self.active_edge_count[edge_type.index()] += 1;

        if edge_type == EdgeType::ContactManager {
            if let Some(gpu) = &self.gpu_data {
                gpu.lock().active_contact_edges.set(edge_index as usize);
            }
        }

        if node1.is_valid() && node2.is_valid() {
            for node_index in [node1, node2] {
                let node = self.nodes[node_index.slot()];
                if node.active_ref_count == 0 && node.is_kinematic() && !node.is_active_or_activating() {
                    self.mark_kinematic_active(node_index);
                }
                self.nodes[node_index.slot()].active_ref_count += 1;
            }
        }
    }

    /// Deactivates an edge and releases its kinematic endpoints. With `report`
    /// the edge is listed in [`Self::deactivating_edges`].
    pub(crate) fn mark_edge_inactive(&mut self, edge_index: EdgeIndex, cpu: &CpuExternalData, report: bool) {
        let edge = &mut self.edges[edge_index as usize];
        debug_assert!(edge.is_active(), "edge {edge_index} deactivated twice");
        edge.deactivate_edge();
        let edge_type = edge.edge_type;
        self.active_edge_count[edge_type.index()] -= 1;

        if edge_type == EdgeType::ContactManager {
            if let Some(gpu) = &self.gpu_data {
                gpu.lock().active_contact_edges.reset(edge_index as usize);
            }
        }

        let node1 = cpu.node_index1(edge_index);
        let node2 = cpu.node_index2(edge_index);
        if node1.is_valid() && node2.is_valid() {
            for node_index in [node1, node2] {
                let slot = node_index.slot();
                let node = &mut self.nodes[slot];
                node.active_ref_count = node.active_ref_count.saturating_sub(1);
                let node = *node;
                if node.is_kinematic() && node.active_ref_count == 0 && !node.is_active_or_activating() {
                    self.mark_kinematic_inactive(node_index);
                }
            }
        }

        if report {
            self.deactivating_edges[edge_type.index()].push(edge_index);
        }
    }
}
