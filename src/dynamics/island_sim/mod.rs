//! Incremental island (connected component) tracking with sleep management.
//!
//! Nodes, edges and islands live in flat arrays addressed by integer handles.
//! Islands thread intrusive doubly linked lists through those arrays so merges
//! splice in O(1) and sleep/wake toggles swap-remove in O(1). Edge removals are
//! batched: the endpoints are marked dirty and a later pass proves (cheaply,
//! via cached routes) or disproves (via a hop-count ordered search) that each
//! dirty node still reaches its island root.

mod activation;
mod consistency;
mod graph;
mod traversal;

use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::config::{INVALID_EDGE, INVALID_ISLAND, INVALID_NODE};
use crate::core::{
    edge_of_instance, CpuExternalData, Edge, EdgeIndex, EdgeInstance, EdgeType, Island, IslandId,
    Node, NodeIndex, NodeType, QueueElement, SharedCpuData, SharedGpuData, TraversalState,
};
use crate::utils::{BitMap, HandleManager};

/// Island generator over one view of the interaction graph.
///
/// Not internally synchronised: one island-update phase drives it per step.
/// The endpoint table is shared read-only with a sibling sim; GPU bookkeeping,
/// when present, belongs to this sim alone.
pub struct IslandSim {
    island_handles: HandleManager<IslandId>,

    // Parallel arrays indexed by node slot.
    nodes: Vec<Node>,
    active_node_index: Vec<u32>,
    /// Observed hops from a node to its island root. Only a search heuristic.
    hop_counts: Vec<u32>,
    /// Last neighbour known to lead towards the island root.
    fast_route: Vec<NodeIndex>,
    island_ids: Vec<IslandId>,

    edges: Vec<Edge>,
    edge_instances: Vec<EdgeInstance>,
    islands: Vec<Island>,
    island_static_touch_count: Vec<u32>,

    active_nodes: [Vec<NodeIndex>; NodeType::COUNT],
    active_kinematic_nodes: Vec<NodeIndex>,
    activated_edges: [Vec<EdgeIndex>; EdgeType::COUNT],
    active_edge_count: [u32; EdgeType::COUNT],

    island_awake: BitMap,
    active_islands: Vec<IslandId>,
    initial_active_node_count: [u32; NodeType::COUNT],
    nodes_to_put_to_sleep: [Vec<NodeIndex>; NodeType::COUNT],

    dirty_edges: [Vec<EdgeIndex>; EdgeType::COUNT],
    /// Nodes that lost a connection since the last lost-edge pass.
    dirty_map: BitMap,
    #[cfg(feature = "limit-dirty-nodes")]
    last_map_index: usize,
    activating_nodes: Vec<NodeIndex>,
    destroyed_edges: Vec<EdgeIndex>,

    // Traversal scratch, reused between calls.
    priority_queue: BinaryHeap<QueueElement>,
    visited_nodes: Vec<TraversalState>,
    visited_state: BitMap,
    island_split_edges: [Vec<EdgeIndex>; EdgeType::COUNT],
    dirty_scratch: Vec<u32>,
    kinematic_scratch: Vec<NodeIndex>,

    deactivating_edges: [Vec<EdgeIndex>; EdgeType::COUNT],

    cpu_data: SharedCpuData,
    gpu_data: Option<SharedGpuData>,
    context_id: u64,
}

impl IslandSim {
    pub fn new(cpu_data: SharedCpuData, gpu_data: Option<SharedGpuData>, context_id: u64) -> Self {
        Self {
            island_handles: HandleManager::new(),
            nodes: Vec::new(),
            active_node_index: Vec::new(),
            hop_counts: Vec::new(),
            fast_route: Vec::new(),
            island_ids: Vec::new(),
            edges: Vec::new(),
            edge_instances: Vec::new(),
            islands: Vec::new(),
            island_static_touch_count: Vec::new(),
            active_nodes: Default::default(),
            active_kinematic_nodes: Vec::new(),
            activated_edges: Default::default(),
            active_edge_count: [0; EdgeType::COUNT],
            island_awake: BitMap::new(),
            active_islands: Vec::new(),
            initial_active_node_count: [0; NodeType::COUNT],
            nodes_to_put_to_sleep: Default::default(),
            dirty_edges: Default::default(),
            dirty_map: BitMap::new(),
            #[cfg(feature = "limit-dirty-nodes")]
            last_map_index: 0,
            activating_nodes: Vec::new(),
            destroyed_edges: Vec::new(),
            priority_queue: BinaryHeap::new(),
            visited_nodes: Vec::new(),
            visited_state: BitMap::new(),
            island_split_edges: Default::default(),
            dirty_scratch: Vec::new(),
            kinematic_scratch: Vec::new(),
            deactivating_edges: Default::default(),
            cpu_data,
            gpu_data,
            context_id,
        }
    }

    /// Registers (or revives) the node stored in slot `node_index`.
    pub fn add_node(
        &mut self,
        is_active: bool,
        is_kinematic: bool,
        ty: NodeType,
        node_index: NodeIndex,
        object: Option<u64>,
    ) {
        let slot = node_index.slot();
        if slot >= self.nodes.len() {
            let len = slot + 1;
            self.nodes.resize(len, Node::new());
            self.active_node_index.resize(len, INVALID_NODE);
            self.hop_counts.resize(len, 0);
            self.fast_route.resize(len, NodeIndex::STATIC);
            self.island_ids.resize(len, INVALID_ISLAND);
        }
        debug_assert!(self.nodes[slot].is_deleted(), "node {slot} added twice");
        debug_assert_eq!(self.active_node_index[slot], INVALID_NODE);

        self.island_ids[slot] = INVALID_ISLAND;
        self.fast_route[slot] = NodeIndex::STATIC;
        self.hop_counts[slot] = 0;

        let node = &mut self.nodes[slot];
        node.reset();
        node.flags = Default::default();
        node.ty = ty;
        node.object = object;
        node.next_node = NodeIndex::STATIC;
        node.prev_node = NodeIndex::STATIC;
        if is_kinematic {
            node.set_kinematic_flag();
        }
        if is_active {
            self.activate_node(node_index);
        } else {
            self.nodes[slot].set_ready_for_sleeping();
        }
    }

    /// Queues `node_index` for activation by the next wake pass.
    pub fn activate_node(&mut self, node_index: NodeIndex) {
        if !node_index.is_valid() {
            return;
        }
        let slot = node_index.slot();
        let node = self.nodes[slot];
        if !node.is_active_or_activating() {
            // An inactive kinematic may still sit in the kinematic list because
            // edges reference it. It leaves that list while it is activating.
            if node.is_kinematic() && self.active_node_index[slot] != INVALID_NODE {
                self.remove_from_kinematic_list(node_index.without_link());
            }
            debug_assert_eq!(self.active_node_index[slot], INVALID_NODE);
            self.active_node_index[slot] = self.activating_nodes.len() as u32;
            self.activating_nodes.push(node_index.without_link());
            self.nodes[slot].set_activating();
        }
        let node = &mut self.nodes[slot];
        node.clear_ready_for_sleeping();
        node.clear_deleted();
    }

    /// Flags `node_index` as ready for sleeping, cancelling a pending activation.
    pub fn deactivate_node(&mut self, node_index: NodeIndex) {
        if !node_index.is_valid() {
            return;
        }
        let slot = node_index.slot();
        if self.nodes[slot].is_activating() {
            self.remove_from_activating_list(node_index.without_link());
            let node = self.nodes[slot];
            // The kinematic list holds referenced kinematics too, so put it back.
            if node.is_kinematic() && node.active_ref_count > 0 {
                self.active_node_index[slot] = self.active_kinematic_nodes.len() as u32;
                self.active_kinematic_nodes.push(node_index.without_link());
            }
        }
        self.nodes[slot].set_ready_for_sleeping();
    }

    pub fn put_node_to_sleep(&mut self, node_index: NodeIndex) {
        if node_index.is_valid() {
            self.deactivate_node(node_index);
        }
    }

    pub fn activate_node_for_gpu_solver(&mut self, node_index: NodeIndex) {
        self.nodes[node_index.slot()].clear_ready_for_sleeping();
    }

    pub fn deactivate_node_for_gpu_solver(&mut self, node_index: NodeIndex) {
        self.nodes[node_index.slot()].set_ready_for_sleeping();
    }

    /// Queues edge `handle` for insertion by the next [`Self::process_new_edges`].
    ///
    /// The endpoints must already be stored in the shared endpoint table.
    pub fn add_connection(
        &mut self,
        node1: NodeIndex,
        node2: NodeIndex,
        edge_type: EdgeType,
        handle: EdgeIndex,
    ) {
        self.preallocate_connections(handle);
        let edge = &mut self.edges[handle as usize];
        if edge.is_pending_destroyed() {
            // Re-added before the removal was applied: keep the existing edge.
            edge.clear_pending_destroyed();
            return;
        }
        if edge.is_in_dirty_list() {
            debug_assert_eq!(edge.edge_type, edge_type);
            return;
        }
        debug_assert!(!edge.is_inserted(), "edge {handle} inserted twice");
        debug_assert!(
            node1.is_valid() || node2.is_valid(),
            "edge {handle} connects the static world to itself"
        );
        debug_assert_eq!(edge.next_island_edge, INVALID_EDGE);
        debug_assert_eq!(edge.prev_island_edge, INVALID_EDGE);

        edge.clear_destroyed();
        edge.edge_type = edge_type;
        edge.mark_in_dirty_list();
        edge.state.remove(crate::core::EdgeState::ACTIVATING);
        self.dirty_edges[edge_type.index()].push(handle);
    }

    /// Makes room for every edge handle up to `max_handle`.
    pub fn preallocate_connections(&mut self, max_handle: EdgeIndex) {
        let len = max_handle as usize + 1;
        if self.edges.len() < len {
            self.edges.resize(len, Edge::new());
        }
        if self.edge_instances.len() < 2 * len {
            self.edge_instances.resize(2 * len, EdgeInstance::default());
        }
    }

    /// Lock-free half of [`Self::add_connection`] for a preallocated handle.
    ///
    /// Returns `false` when the call only cancelled a pending destruction.
    /// Handles that return `true` must be passed to [`Self::add_delayed_dirty_edges`].
    pub fn add_connection_preallocated(
        &mut self,
        node1: NodeIndex,
        node2: NodeIndex,
        edge_type: EdgeType,
        handle: EdgeIndex,
    ) -> bool {
        debug_assert!((handle as usize) < self.edges.len(), "edge {handle} not preallocated");
        debug_assert!(node1.is_valid() || node2.is_valid());
        let edge = &mut self.edges[handle as usize];
        if edge.is_pending_destroyed() {
            edge.clear_pending_destroyed();
            return false;
        }
        edge.clear_destroyed();
        edge.edge_type = edge_type;
        edge.mark_in_dirty_list();
        edge.state.remove(crate::core::EdgeState::ACTIVATING);
        true
    }

    /// Combining step after [`Self::add_connection_preallocated`].
    pub fn add_delayed_dirty_edges(&mut self, handles: &[EdgeIndex]) {
        for &handle in handles {
            let edge_type = self.edges[handle as usize].edge_type;
            self.dirty_edges[edge_type.index()].push(handle);
        }
    }

    /// Requests removal of `edge_index`. Applied by [`Self::remove_destroyed_edges`].
    pub fn remove_connection(&mut self, edge_index: EdgeIndex) {
        let Some(edge) = self.edges.get_mut(edge_index as usize) else {
            return;
        };
        if !edge.is_pending_destroyed() && (edge.is_in_dirty_list() || edge.is_inserted()) {
            edge.set_pending_destroyed();
            self.destroyed_edges.push(edge_index);
        }
    }

    /// Forgets the deactivations reported by the previous sleep pass.
    pub fn clear_deactivations(&mut self) {
        for list in &mut self.nodes_to_put_to_sleep {
            list.clear();
        }
        for list in &mut self.deactivating_edges {
            list.clear();
        }
    }

    // ---------------------------------------------------------------------
    // Accessors

    pub fn active_nodes(&self, ty: NodeType) -> &[NodeIndex] {
        &self.active_nodes[ty.index()]
    }

    pub fn active_kinematics(&self) -> &[NodeIndex] {
        &self.active_kinematic_nodes
    }

    /// Nodes activated since the frame's first wake pass.
    pub fn nodes_to_activate(&self, ty: NodeType) -> &[NodeIndex] {
        let initial = self.initial_active_node_count[ty.index()] as usize;
        &self.active_nodes[ty.index()][initial..]
    }

    pub fn nodes_to_deactivate(&self, ty: NodeType) -> &[NodeIndex] {
        &self.nodes_to_put_to_sleep[ty.index()]
    }

    pub fn activated_edges(&self, ty: EdgeType) -> &[EdgeIndex] {
        &self.activated_edges[ty.index()]
    }

    pub fn active_edge_count(&self, ty: EdgeType) -> u32 {
        self.active_edge_count[ty.index()]
    }

    pub fn deactivating_edges(&self, ty: EdgeType) -> &[EdgeIndex] {
        &self.deactivating_edges[ty.index()]
    }

    pub fn object(&self, node_index: NodeIndex, ty: NodeType) -> Option<u64> {
        let node = &self.nodes[node_index.slot()];
        debug_assert_eq!(node.ty, ty);
        node.object
    }

    pub fn island(&self, island_id: IslandId) -> &Island {
        &self.islands[island_id as usize]
    }

    pub fn island_id(&self, node_index: NodeIndex) -> Option<IslandId> {
        self.island_ids
            .get(node_index.slot())
            .copied()
            .filter(|id| *id != INVALID_ISLAND)
    }

    pub fn island_for_node(&self, node_index: NodeIndex) -> Option<&Island> {
        self.island_id(node_index)
            .map(|id| &self.islands[id as usize])
    }

    /// Ids of every live island.
    pub fn island_id_iter(&self) -> impl Iterator<Item = IslandId> + '_ {
        self.islands
            .iter()
            .enumerate()
            .filter(|(_, island)| !island.is_empty())
            .map(|(id, _)| id as IslandId)
    }

    pub fn island_count(&self) -> usize {
        self.island_id_iter().count()
    }

    pub fn active_islands(&self) -> &[IslandId] {
        &self.active_islands
    }

    pub fn is_island_awake(&self, island_id: IslandId) -> bool {
        self.island_awake.test(island_id as usize)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, edge_index: EdgeIndex) -> &Edge {
        &self.edges[edge_index as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, node_index: NodeIndex) -> &Node {
        &self.nodes[node_index.slot()]
    }

    pub fn active_node_index(&self, node_index: NodeIndex) -> u32 {
        self.active_node_index[node_index.slot()]
    }

    pub fn active_node_indices(&self) -> &[u32] {
        &self.active_node_index
    }

    /// Upper bound of island ids issued so far.
    pub fn island_capacity(&self) -> u32 {
        self.island_handles.total_handles()
    }

    pub fn island_static_touch_counts(&self) -> &[u32] {
        &self.island_static_touch_count
    }

    pub fn island_static_touch_count(&self, node_index: NodeIndex) -> u32 {
        let id = self.island_ids[node_index.slot()];
        debug_assert_ne!(id, INVALID_ISLAND);
        self.island_static_touch_count[id as usize]
    }

    pub fn island_ids(&self) -> &[IslandId] {
        &self.island_ids
    }

    pub fn fast_route(&self, node_index: NodeIndex) -> NodeIndex {
        self.fast_route[node_index.slot()]
    }

    pub fn hop_count(&self, node_index: NodeIndex) -> u32 {
        self.hop_counts[node_index.slot()]
    }

    pub fn is_node_dirty(&self, node_index: NodeIndex) -> bool {
        self.dirty_map.test(node_index.slot())
    }

    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    pub fn cpu_data(&self) -> &SharedCpuData {
        &self.cpu_data
    }

    pub fn gpu_data(&self) -> Option<&SharedGpuData> {
        self.gpu_data.as_ref()
    }

    // ---------------------------------------------------------------------
    // Kinematic transitions

    /// Turns a dynamic node kinematic. It leaves its island and its activity
    /// moves to the kinematic bookkeeping.
    pub fn set_kinematic(&mut self, node_index: NodeIndex) {
        let node_index = node_index.without_link();
        let slot = node_index.slot();
        if self.nodes[slot].is_kinematic() {
            return;
        }
        let cpu_data = Arc::clone(&self.cpu_data);
        let cpu = cpu_data.read();

        let was_active = self.nodes[slot].is_active();
        let was_activating = self.nodes[slot].is_activating();
        if was_activating {
            self.remove_from_activating_list(node_index);
        }
        if was_active {
            self.mark_inactive(node_index);
            self.nodes[slot].clear_active();
        }

        let island_id = self.island_ids[slot];
        if island_id != INVALID_ISLAND {
            let mut instance = self.nodes[slot].first_edge_index;
            while instance != INVALID_EDGE {
                let next = self.edge_instances[instance as usize].next_edge;
                let edge_index = edge_of_instance(instance);
                let other = cpu.opposite_node(instance).without_link();
                let other_keeps_edge = other.is_valid()
                    && other.index() != node_index.index()
                    && !self.nodes[other.slot()].is_kinematic();
                if other_keeps_edge {
                    self.mark_node_lost_connection(other, node_index);
                } else if self.is_edge_linked(island_id, edge_index) {
                    self.remove_edge_from_island(island_id, edge_index);
                }
                instance = next;
            }
            self.remove_node_from_island(island_id, node_index);
            self.island_ids[slot] = INVALID_ISLAND;
            self.island_static_touch_count[island_id as usize] -=
                self.nodes[slot].static_touch_count as u32;
            if self.islands[island_id as usize].is_empty() {
                self.release_island(island_id);
            }
        }
        self.fast_route[slot] = NodeIndex::STATIC;
        self.hop_counts[slot] = 0;
        self.nodes[slot].set_kinematic_flag();

        // Constraints between two kinematics are never solved.
        let mut instance = self.nodes[slot].first_edge_index;
        while instance != INVALID_EDGE {
            let next = self.edge_instances[instance as usize].next_edge;
            let edge_index = edge_of_instance(instance);
            let other = cpu.opposite_node(instance);
            let edge = self.edges[edge_index as usize];
            let other_is_kinematic = other.is_valid() && self.nodes[other.slot()].is_kinematic();
            if edge.is_active()
                && edge.edge_type != EdgeType::ContactManager
                && (other.is_static_body() || other_is_kinematic)
            {
                self.mark_edge_inactive(edge_index, &cpu, true);
            }
            instance = next;
        }
        drop(cpu);

        if was_active || was_activating {
            self.activate_node(node_index);
        } else if self.nodes[slot].active_ref_count > 0
            && self.active_node_index[slot] == INVALID_NODE
        {
            self.active_node_index[slot] = self.active_kinematic_nodes.len() as u32;
            self.active_kinematic_nodes.push(node_index);
        }
        log::trace!("node {slot} became kinematic");
    }

    /// Turns a kinematic node dynamic. Its edges are requeued so the next
    /// [`Self::process_new_edges`] links it into the right island.
    pub fn set_dynamic(&mut self, node_index: NodeIndex) {
        let node_index = node_index.without_link();
        let slot = node_index.slot();
        if !self.nodes[slot].is_kinematic() {
            return;
        }
        let cpu_data = Arc::clone(&self.cpu_data);
        let cpu = cpu_data.read();

        // Edges are held by the neighbour's island while this node is
        // kinematic. Ownership moves once it turns dynamic, so unlink them
        // here; pending-destroyed ones stay unlinked and are not requeued.
        let mut instance = self.nodes[slot].first_edge_index;
        while instance != INVALID_EDGE {
            let edge_index = edge_of_instance(instance);
            if self.edges[edge_index as usize].is_inserted() {
                let island_id = self.owning_island(edge_index, &cpu);
                if island_id != INVALID_ISLAND && self.is_edge_linked(island_id, edge_index) {
                    self.remove_edge_from_island(island_id, edge_index);
                }
            }
            instance = self.edge_instances[instance as usize].next_edge;
        }
        drop(cpu);

        let was_active = self.nodes[slot].is_active_or_activating();
        if self.nodes[slot].is_activating() {
            self.remove_from_activating_list(node_index);
        } else if self.active_node_index[slot] != INVALID_NODE {
            self.remove_from_kinematic_list(node_index);
        }
        let node = &mut self.nodes[slot];
        node.clear_active();
        node.clear_kinematic_flag();

        let mut instance = self.nodes[slot].first_edge_index;
        while instance != INVALID_EDGE {
            let edge_index = edge_of_instance(instance);
            let edge = &mut self.edges[edge_index as usize];
            if edge.is_inserted() && !edge.is_pending_destroyed() && !edge.is_in_dirty_list() {
                edge.mark_in_dirty_list();
                self.dirty_edges[edge.edge_type.index()].push(edge_index);
            }
            instance = self.edge_instances[instance as usize].next_edge;
        }

        if was_active {
            self.activate_node(node_index);
        } else {
            self.nodes[slot].set_ready_for_sleeping();
        }
        log::trace!("node {slot} became dynamic");
    }

    // ---------------------------------------------------------------------
    // Intrusive list surgery

    pub(crate) fn append_node_to_island(&mut self, island_id: IslandId, node_index: NodeIndex) {
        let island = &mut self.islands[island_id as usize];
        let last = island.last_node;
        let node = &mut self.nodes[node_index.slot()];
        node.prev_node = last;
        node.next_node = NodeIndex::STATIC;
        island.node_count[node.ty.index()] += 1;
        if last.is_valid() {
            self.nodes[last.slot()].next_node = node_index;
        } else {
            island.root_node = node_index;
        }
        island.last_node = node_index;
    }

    pub(crate) fn remove_node_from_island(&mut self, island_id: IslandId, node_index: NodeIndex) {
        let Node {
            next_node,
            prev_node,
            ty,
            ..
        } = self.nodes[node_index.slot()];
        let island = &mut self.islands[island_id as usize];
        if next_node.is_valid() {
            debug_assert_eq!(self.nodes[next_node.slot()].prev_node.index(), node_index.index());
            self.nodes[next_node.slot()].prev_node = prev_node;
        } else {
            debug_assert_eq!(island.last_node.index(), node_index.index());
            island.last_node = prev_node;
        }
        if prev_node.is_valid() {
            debug_assert_eq!(self.nodes[prev_node.slot()].next_node.index(), node_index.index());
            self.nodes[prev_node.slot()].next_node = next_node;
        } else {
            debug_assert_eq!(island.root_node.index(), node_index.index());
            island.root_node = next_node;
        }
        island.node_count[ty.index()] -= 1;
        let node = &mut self.nodes[node_index.slot()];
        node.next_node = NodeIndex::STATIC;
        node.prev_node = NodeIndex::STATIC;
    }

    pub(crate) fn add_edge_to_island(&mut self, island_id: IslandId, edge_index: EdgeIndex) {
        let island = &mut self.islands[island_id as usize];
        let edge = &mut self.edges[edge_index as usize];
        debug_assert!(edge.next_island_edge == INVALID_EDGE && edge.prev_island_edge == INVALID_EDGE);
        let ty = edge.edge_type.index();
        let last = island.last_edge[ty];
        edge.prev_island_edge = last;
        if last != INVALID_EDGE {
            debug_assert_eq!(self.edges[last as usize].next_island_edge, INVALID_EDGE);
            self.edges[last as usize].next_island_edge = edge_index;
        } else {
            debug_assert_eq!(island.first_edge[ty], INVALID_EDGE);
            island.first_edge[ty] = edge_index;
        }
        island.last_edge[ty] = edge_index;
        island.edge_count[ty] += 1;
    }

    pub(crate) fn remove_edge_from_island(&mut self, island_id: IslandId, edge_index: EdgeIndex) {
        let island = &mut self.islands[island_id as usize];
        let Edge {
            edge_type,
            next_island_edge,
            prev_island_edge,
            ..
        } = self.edges[edge_index as usize];
        let ty = edge_type.index();
        if next_island_edge != INVALID_EDGE {
            debug_assert_eq!(self.edges[next_island_edge as usize].prev_island_edge, edge_index);
            self.edges[next_island_edge as usize].prev_island_edge = prev_island_edge;
        } else {
            debug_assert_eq!(island.last_edge[ty], edge_index);
            island.last_edge[ty] = prev_island_edge;
        }
        if prev_island_edge != INVALID_EDGE {
            debug_assert_eq!(self.edges[prev_island_edge as usize].next_island_edge, edge_index);
            self.edges[prev_island_edge as usize].next_island_edge = next_island_edge;
        } else {
            debug_assert_eq!(island.first_edge[ty], edge_index);
            island.first_edge[ty] = next_island_edge;
        }
        island.edge_count[ty] -= 1;
        let edge = &mut self.edges[edge_index as usize];
        edge.next_island_edge = INVALID_EDGE;
        edge.prev_island_edge = INVALID_EDGE;
    }

    /// Whether `edge_index` is threaded into `island_id`'s list of its type.
    pub(crate) fn is_edge_linked(&self, island_id: IslandId, edge_index: EdgeIndex) -> bool {
        let edge = &self.edges[edge_index as usize];
        edge.next_island_edge != INVALID_EDGE
            || edge.prev_island_edge != INVALID_EDGE
            || self.islands[island_id as usize].first_edge[edge.edge_type.index()] == edge_index
    }

    /// Island that owns `edge_index`: the island of a dynamic endpoint, if any.
    pub(crate) fn owning_island(&self, edge_index: EdgeIndex, cpu: &CpuExternalData) -> IslandId {
        [cpu.node_index1(edge_index), cpu.node_index2(edge_index)]
            .into_iter()
            .filter(|node| node.is_valid() && !self.nodes[node.slot()].is_kinematic())
            .map(|node| self.island_ids[node.slot()])
            .find(|id| *id != INVALID_ISLAND)
            .unwrap_or(INVALID_ISLAND)
    }

    pub(crate) fn link_edge_instance(&mut self, node_index: NodeIndex, instance: u32) {
        let node = &mut self.nodes[node_index.slot()];
        let head = node.first_edge_index;
        self.edge_instances[instance as usize] = EdgeInstance {
            next_edge: head,
            prev_edge: INVALID_EDGE,
        };
        if head != INVALID_EDGE {
            self.edge_instances[head as usize].prev_edge = instance;
        }
        node.first_edge_index = instance;
    }

    pub(crate) fn unlink_edge_instance(&mut self, node_index: NodeIndex, instance: u32) {
        let EdgeInstance {
            next_edge,
            prev_edge,
        } = self.edge_instances[instance as usize];
        if next_edge != INVALID_EDGE {
            self.edge_instances[next_edge as usize].prev_edge = prev_edge;
        }
        if prev_edge != INVALID_EDGE {
            self.edge_instances[prev_edge as usize].next_edge = next_edge;
        } else {
            debug_assert_eq!(self.nodes[node_index.slot()].first_edge_index, instance);
            self.nodes[node_index.slot()].first_edge_index = next_edge;
        }
        self.edge_instances[instance as usize] = EdgeInstance::default();
    }

    /// Marks `node_index` dirty after it lost its connection to `lost`.
    pub(crate) fn mark_node_lost_connection(&mut self, node_index: NodeIndex, lost: NodeIndex) {
        let slot = node_index.slot();
        if self.fast_route[slot].index() == lost.index() {
            self.fast_route[slot] = NodeIndex::STATIC;
        }
        let node = &mut self.nodes[slot];
        if !node.is_dirty() {
            node.mark_dirty();
            self.dirty_map.set(slot);
        }
    }

    /// Allocates an empty island slot.
    pub(crate) fn allocate_island(&mut self) -> IslandId {
        let id = self.island_handles.get_handle();
        let slot = id as usize;
        if slot >= self.islands.len() {
            self.islands.resize(slot + 1, Island::new());
            self.island_static_touch_count.resize(slot + 1, 0);
        }
        self.islands[slot] = Island::new();
        self.island_static_touch_count[slot] = 0;
        self.island_awake.grow_to_fit(slot);
        self.island_awake.reset(slot);
        id
    }

    /// Frees an island whose node list is empty.
    pub(crate) fn release_island(&mut self, island_id: IslandId) {
        let slot = island_id as usize;
        debug_assert!(self.islands[slot].is_empty());
        debug_assert_eq!(self.islands[slot].total_edges(), 0);
        if self.islands[slot].is_awake() {
            self.mark_island_inactive(island_id);
        }
        self.islands[slot] = Island::new();
        self.island_static_touch_count[slot] = 0;
        self.island_awake.reset(slot);
        self.island_handles.free_handle(island_id);
        log::trace!("released island {island_id}");
    }
}
