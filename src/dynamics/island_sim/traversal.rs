//! Lost-edge handling: destroyed nodes, connectivity proofs and island splits.

use std::sync::Arc;

use super::IslandSim;
use crate::config::{INVALID_EDGE, INVALID_ISLAND, INVALID_NODE};
use crate::core::{
    edge_of_instance, CpuExternalData, EdgeType, IslandId, NodeIndex, QueueElement, TraversalState,
};
use crate::utils::ScopedTimer;

impl IslandSim {
    /// Removes destroyed nodes, splits islands that lost connectivity and,
    /// when `allow_deactivation` is set, runs the sleep pass.
    ///
    /// `dirty_node_limit` caps the dirty nodes examined per call when the
    /// `limit-dirty-nodes` feature is enabled; the rest carry over.
    pub fn process_lost_edges(
        &mut self,
        destroyed_nodes: &[NodeIndex],
        allow_deactivation: bool,
        permit_kinematic_deactivation: bool,
        dirty_node_limit: u32,
    ) {
        let _timer = ScopedTimer::new("Basic.processLostEdges", self.context_id);
        let cpu_data = Arc::clone(&self.cpu_data);
        let cpu = cpu_data.read();

        for &node_index in destroyed_nodes {
            self.remove_destroyed_node(node_index.without_link());
        }

        self.collect_dirty_nodes(dirty_node_limit);
        let dirty = std::mem::take(&mut self.dirty_scratch);
        let mut splits = 0usize;
        for &slot in &dirty {
            let node_index = NodeIndex::new(slot);
            let node = self.nodes[slot as usize];
            let island_id = self.island_ids[slot as usize];
            if !node.is_kinematic()
                && !node.is_deleted()
                && island_id != INVALID_ISLAND
                && !self.visited_state.test(slot as usize)
            {
                let base = self.visited_nodes.len();
                let found = self.try_fast_path(node_index, island_id, &cpu)
                    || self.find_route(node_index, island_id, &cpu);
                if !found {
                    self.split_island(island_id, base, &cpu);
                    splits += 1;
                }
            }
            self.nodes[slot as usize].clear_dirty();
            self.dirty_map.reset(slot as usize);
        }
        let mut dirty = dirty;
        dirty.clear();
        self.dirty_scratch = dirty;

        for state in self.visited_nodes.drain(..) {
            self.visited_state.reset(state.node_index.slot());
        }
        if splits > 0 {
            log::debug!("lost edges split {splits} islands");
        }

        if allow_deactivation {
            self.run_sleep_pass(permit_kinematic_deactivation, &cpu);
        }
    }

    fn remove_destroyed_node(&mut self, node_index: NodeIndex) {
        let slot = node_index.slot();
        if slot >= self.nodes.len() || self.nodes[slot].is_deleted() {
            return;
        }
        debug_assert_eq!(
            self.nodes[slot].first_edge_index,
            INVALID_EDGE,
            "node {slot} destroyed with edges attached"
        );

        let island_id = self.island_ids[slot];
        if island_id != INVALID_ISLAND {
            self.remove_node_from_island(island_id, node_index);
            self.island_static_touch_count[island_id as usize] -= self.nodes[slot].static_touch_count as u32;
            self.island_ids[slot] = INVALID_ISLAND;
            if self.islands[island_id as usize].is_empty() {
                self.release_island(island_id);
            }
        }

        let node = self.nodes[slot];
        if node.is_activating() {
            self.remove_from_activating_list(node_index);
        } else if self.active_node_index[slot] != INVALID_NODE {
            if node.is_kinematic() {
                self.remove_from_kinematic_list(node_index);
            } else {
                self.mark_inactive(node_index);
            }
        }

        self.fast_route[slot] = NodeIndex::STATIC;
        self.hop_counts[slot] = 0;
        self.nodes[slot].reset();
        self.dirty_map.reset(slot);
    }

    #[cfg(feature = "limit-dirty-nodes")]
    fn collect_dirty_nodes(&mut self, dirty_node_limit: u32) {
        self.dirty_scratch.clear();
        let limit = dirty_node_limit as usize;
        let start = self.last_map_index;
        // Resume where the previous call stopped, then wrap around.
        let ordered = self
            .dirty_map
            .iter_from(start)
            .chain(self.dirty_map.iter().take_while(|slot| *slot < start));
        self.dirty_scratch
            .extend(ordered.take(limit).map(|slot| slot as u32));

        let total = self.dirty_map.count();
        match self.dirty_scratch.last() {
            Some(&last) if total > self.dirty_scratch.len() => {
                self.last_map_index = last as usize + 1;
                log::warn!(
                    "dirty node limit {limit} reached, {} nodes deferred",
                    total - self.dirty_scratch.len()
                );
            }
            _ => self.last_map_index = 0,
        }
    }

    #[cfg(not(feature = "limit-dirty-nodes"))]
    fn collect_dirty_nodes(&mut self, _dirty_node_limit: u32) {
        self.dirty_scratch.clear();
        self.dirty_scratch
            .extend(self.dirty_map.iter().map(|slot| slot as u32));
    }

    fn push_visited(&mut self, node_index: NodeIndex, prev_index: u32, depth: u32) -> u32 {
        let current = self.visited_nodes.len() as u32;
        self.visited_nodes
            .push(TraversalState::new(node_index, current, prev_index, depth));
        self.visited_state.set(node_index.slot());
        current
    }

    /// Follows cached routes from `start` towards the island root.
    ///
    /// Reaching the root, or any node already proven connected during this
    /// pass, proves connectivity.
    fn try_fast_path(&mut self, start: NodeIndex, island_id: IslandId, cpu: &CpuExternalData) -> bool {
        let base = self.visited_nodes.len();
        let root = self.islands[island_id as usize].root_node;
        let mut current = start;
        let mut found = false;
        let mut prev = INVALID_NODE;

        loop {
            if current.index() == root.index() {
                found = true;
                break;
            }
            let slot = current.slot();
            if self.visited_state.test(slot) {
                // Proven earlier this pass, or a cycle in the cached routes.
                found = self.island_ids[slot] == island_id;
                break;
            }
            if self.island_ids[slot] != island_id {
                break;
            }
            prev = self.push_visited(current, prev, 0);
            self.island_ids[slot] = INVALID_ISLAND;
            let next = self.fast_route[slot];
            if !next.is_valid() || self.nodes[next.slot()].is_deleted() {
                break;
            }
            debug_assert!(self.is_path_to(current, next, cpu), "stale route from node {slot}");
            current = next;
        }

        for state in &self.visited_nodes[base..] {
            self.island_ids[state.node_index.slot()] = island_id;
        }
        if !found {
            for state in self.visited_nodes.drain(base..) {
                self.visited_state.reset(state.node_index.slot());
            }
        }
        found
    }

    /// Hop-ordered search from `start` for the root or a proven node.
    ///
    /// On failure the nodes it pushed onto `visited_nodes` are exactly the
    /// component `start` belongs to.
    fn find_route(&mut self, start: NodeIndex, island_id: IslandId, cpu: &CpuExternalData) -> bool {
        let base = self.visited_nodes.len();
        let target = self.islands[island_id as usize].root_node;
        let hop = self.hop_counts[start.slot()];
        let first = self.push_visited(start, INVALID_NODE, 0);
        self.island_ids[start.slot()] = INVALID_ISLAND;
        self.priority_queue.push(QueueElement::new(first, hop));

        let mut found = false;
        'search: while let Some(element) = self.priority_queue.pop() {
            let state = self.visited_nodes[element.state as usize];
            let mut instance = self.nodes[state.node_index.slot()].first_edge_index;
            while instance != INVALID_EDGE {
                let next = self.edge_instances[instance as usize].next_edge;
                let other = cpu.opposite_node(instance).without_link();
                instance = next;
                if !other.is_valid() || other.index() == state.node_index.index() {
                    continue;
                }
                let other_slot = other.slot();
                let other_node = &self.nodes[other_slot];
                if other_node.is_kinematic() || other_node.is_deleted() {
                    continue;
                }
                if other.index() == target.index() {
                    self.unwind_route(state.current_index, target, 0);
                    found = true;
                    break 'search;
                }
                if self.visited_state.test(other_slot) {
                    if self.island_ids[other_slot] == island_id {
                        let hops = self.hop_counts[other_slot];
                        self.unwind_route(state.current_index, other, hops);
                        found = true;
                        break 'search;
                    }
                    continue;
                }
                let depth = state.depth + 1;
                let index = self.push_visited(other, state.current_index, depth);
                self.island_ids[other_slot] = INVALID_ISLAND;
                self.priority_queue
                    .push(QueueElement::new(index, self.hop_counts[other_slot]));
            }
        }
        self.priority_queue.clear();

        for i in base..self.visited_nodes.len() {
            let slot = self.visited_nodes[i].node_index.slot();
            self.island_ids[slot] = island_id;
        }
        found
    }

    /// Writes the route found by a search back into the cached routes.
    fn unwind_route(&mut self, traversal_index: u32, last: NodeIndex, hop_count: u32) {
        let mut hops = hop_count + 1;
        let mut next = last;
        let mut index = traversal_index;
        while index != INVALID_NODE {
            let state = self.visited_nodes[index as usize];
            let slot = state.node_index.slot();
            self.hop_counts[slot] = hops;
            self.fast_route[slot] = next;
            next = state.node_index;
            hops += 1;
            index = state.prev_index;
        }
    }

    /// Moves the component collected in `visited_nodes[base..]` into a fresh island.
    fn split_island(&mut self, island_id: IslandId, base: usize, cpu: &CpuExternalData) {
        let new_island = self.allocate_island();
        let mut moved_touch = 0u32;

        for i in base..self.visited_nodes.len() {
            let node_index = self.visited_nodes[i].node_index;
            let slot = node_index.slot();
            self.remove_node_from_island(island_id, node_index);
            self.append_node_to_island(new_island, node_index);
            self.island_ids[slot] = new_island;
            moved_touch += self.nodes[slot].static_touch_count as u32;
        }
        let start = self.visited_nodes[base].node_index;
        self.fast_route[start.slot()] = NodeIndex::STATIC;
        self.hop_counts[start.slot()] = 0;
        self.island_static_touch_count[island_id as usize] -= moved_touch;
        self.island_static_touch_count[new_island as usize] += moved_touch;

        let mut split_edges = std::mem::take(&mut self.island_split_edges);
        for list in &mut split_edges {
            list.clear();
        }
        for i in base..self.visited_nodes.len() {
            let node_index = self.visited_nodes[i].node_index;
            let mut instance = self.nodes[node_index.slot()].first_edge_index;
            while instance != INVALID_EDGE {
                let next = self.edge_instances[instance as usize].next_edge;
                let edge_index = edge_of_instance(instance);
                let other = cpu.opposite_node(instance).without_link();
                let other_is_dynamic = other.is_valid() && !self.nodes[other.slot()].is_kinematic();
                // Both instances of a dynamic pair are visited; take one.
                let duplicate = other_is_dynamic && other.index() != node_index.index() && instance & 1 == 1;
                let self_loop_twin = other.index() == node_index.index() && instance & 1 == 1;
                if !duplicate && !self_loop_twin && self.is_edge_linked(island_id, edge_index) {
                    let ty = self.edges[edge_index as usize].edge_type.index();
                    split_edges[ty].push(edge_index);
                }
                instance = next;
            }
        }
        for ty in 0..EdgeType::COUNT {
            for &edge_index in &split_edges[ty] {
                self.remove_edge_from_island(island_id, edge_index);
                self.add_edge_to_island(new_island, edge_index);
            }
        }
        self.island_split_edges = split_edges;

        if self.islands[island_id as usize].is_awake() {
            self.mark_island_active(new_island);
        }
        log::trace!(
            "split {} nodes from island {island_id} into island {new_island}",
            self.islands[new_island as usize].total_nodes()
        );

        #[cfg(feature = "sanity-checks")]
        {
            let old_root = self.islands[island_id as usize].root_node;
            assert!(
                !self.can_find_root(start, old_root, cpu),
                "split island {new_island} still reaches the root of island {island_id}"
            );
        }
    }

    /// Breadth-first reachability check used to validate splits.
    #[cfg(feature = "sanity-checks")]
    fn can_find_root(&self, start: NodeIndex, root: NodeIndex, cpu: &CpuExternalData) -> bool {
        if !root.is_valid() {
            return false;
        }
        let mut seen = crate::utils::BitMap::with_capacity(self.nodes.len());
        let mut queue = std::collections::VecDeque::from([start]);
        seen.set(start.slot());
        while let Some(current) = queue.pop_front() {
            if current.index() == root.index() {
                return true;
            }
            let mut instance = self.nodes[current.slot()].first_edge_index;
            while instance != INVALID_EDGE {
                let other = cpu.opposite_node(instance).without_link();
                if other.is_valid() && !self.nodes[other.slot()].is_kinematic() && !seen.test(other.slot()) {
                    seen.set(other.slot());
                    queue.push_back(other);
                }
                instance = self.edge_instances[instance as usize].next_edge;
            }
        }
        false
    }

    /// Whether `from` has an edge to `to`, or is `to`.
    pub(crate) fn is_path_to(&self, from: NodeIndex, to: NodeIndex, cpu: &CpuExternalData) -> bool {
        if from.index() == to.index() {
            return true;
        }
        let mut instance = self.nodes[from.slot()].first_edge_index;
        while instance != INVALID_EDGE {
            if cpu.opposite_node(instance).index() == to.index() {
                return true;
            }
            instance = self.edge_instances[instance as usize].next_edge;
        }
        false
    }
}
