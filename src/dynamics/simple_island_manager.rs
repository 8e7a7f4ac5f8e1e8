//! Owner of the accurate and speculative island sims.
//!
//! The speculative sim sees every contact pair the broad phase reports and
//! drives early activation; the accurate sim only sees pairs that actually
//! touch (plus constraints) and drives sleeping. Both read the same endpoint
//! table.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{IslandManagerConfig, DEFAULT_PASS_BUDGET_MS, EDGE_NODE_INDEX_GROWTH};
use crate::core::{
    CpuExternalData, EdgeIndex, EdgeType, GpuExternalData, NodeIndex, NodeType, SharedCpuData,
    SharedGpuData,
};
use crate::dynamics::island_sim::IslandSim;
use crate::error::Result;
use crate::utils::logging::warn_if_pass_budget_exceeded;
use crate::utils::{BitMap, HandleManager, ScopedTimer};

/// Caller data attached to an edge handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePayload {
    /// Opaque contact manager or constraint id.
    pub object: Option<u64>,
    /// Opaque id of the interaction that owns the edge.
    pub interaction: Option<u64>,
}

impl EdgePayload {
    pub fn new(object: u64) -> Self {
        Self {
            object: Some(object),
            interaction: None,
        }
    }

    pub fn with_interaction(mut self, interaction: u64) -> Self {
        self.interaction = Some(interaction);
        self
    }
}

pub struct SimpleIslandManager {
    node_handles: HandleManager<u32>,
    edge_handles: HandleManager<EdgeIndex>,
    cpu_data: SharedCpuData,
    gpu_data: Option<SharedGpuData>,
    accurate: IslandSim,
    speculative: IslandSim,
    /// Edges currently inserted into the accurate sim.
    connected_map: BitMap,
    payloads: Vec<EdgePayload>,
    destroyed_nodes: Vec<NodeIndex>,
    destroyed_edges: Vec<EdgeIndex>,
    max_dirty_nodes_per_frame: u32,
    config: IslandManagerConfig,
}

impl Default for SimpleIslandManager {
    fn default() -> Self {
        Self::new(IslandManagerConfig::default())
    }
}

impl SimpleIslandManager {
    pub fn new(config: IslandManagerConfig) -> Self {
        let cpu_data: SharedCpuData = Arc::new(RwLock::new(CpuExternalData::new()));
        let gpu_data = config.gpu.then(|| {
            Arc::new(Mutex::new(GpuExternalData::with_partition_capacity(
                config.initial_partition_edge_capacity,
            )))
        });
        let accurate = IslandSim::new(Arc::clone(&cpu_data), gpu_data.clone(), config.context_id);
        let speculative = IslandSim::new(Arc::clone(&cpu_data), None, config.context_id);
        log::debug!(
            "island manager created (gpu: {}, enhanced determinism: {})",
            config.gpu,
            config.enhanced_determinism
        );

        Self {
            node_handles: HandleManager::new(),
            edge_handles: HandleManager::new(),
            cpu_data,
            gpu_data,
            accurate,
            speculative,
            connected_map: BitMap::new(),
            payloads: Vec::new(),
            destroyed_nodes: Vec::new(),
            destroyed_edges: Vec::new(),
            max_dirty_nodes_per_frame: config.max_dirty_nodes_per_frame(),
            config,
        }
    }

    pub fn config(&self) -> &IslandManagerConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Nodes

    /// Issues a node handle and registers the body with both sims.
    pub fn add_node(
        &mut self,
        is_active: bool,
        is_kinematic: bool,
        ty: NodeType,
        object: Option<u64>,
    ) -> NodeIndex {
        let node_index = NodeIndex::new(self.node_handles.get_handle());
        self.accurate
            .add_node(is_active, is_kinematic, ty, node_index, object);
        self.speculative
            .add_node(is_active, is_kinematic, ty, node_index, object);
        node_index
    }

    /// Schedules a node for destruction. Its edges must be removed first.
    pub fn remove_node(&mut self, node_index: NodeIndex) {
        let node_index = node_index.without_link();
        self.accurate.deactivate_node(node_index);
        self.speculative.deactivate_node(node_index);
        self.destroyed_nodes.push(node_index);
    }

    pub fn activate_node(&mut self, node_index: NodeIndex) {
        self.accurate.activate_node(node_index);
        self.speculative.activate_node(node_index);
    }

    pub fn deactivate_node(&mut self, node_index: NodeIndex) {
        self.accurate.deactivate_node(node_index);
        self.speculative.deactivate_node(node_index);
    }

    pub fn put_node_to_sleep(&mut self, node_index: NodeIndex) {
        self.accurate.put_node_to_sleep(node_index);
        self.speculative.put_node_to_sleep(node_index);
    }

    pub fn set_kinematic(&mut self, node_index: NodeIndex) {
        self.accurate.set_kinematic(node_index);
        self.speculative.set_kinematic(node_index);
    }

    pub fn set_dynamic(&mut self, node_index: NodeIndex) {
        self.accurate.set_dynamic(node_index);
        self.speculative.set_dynamic(node_index);
    }

    // ---------------------------------------------------------------------
    // Edges

    fn allocate_edge(&mut self, payload: EdgePayload, node1: NodeIndex, node2: NodeIndex) -> EdgeIndex {
        let handle = self.edge_handles.get_handle();
        {
            let mut cpu = self.cpu_data.write();
            cpu.reserve_edge(handle, EDGE_NODE_INDEX_GROWTH);
            cpu.set_edge_nodes(handle, node1, node2);
        }
        if let Some(gpu) = &self.gpu_data {
            gpu.lock().reserve_edge(handle);
        }
        let slot = handle as usize;
        if slot >= self.payloads.len() {
            self.payloads.resize(slot + 1, EdgePayload::default());
        }
        self.payloads[slot] = payload;
        self.connected_map.grow_to_fit(slot);
        self.connected_map.reset(slot);
        handle
    }

    /// Adds a broad-phase pair. It enters the speculative sim only and starts
    /// disconnected until [`Self::set_edge_connected`].
    pub fn add_contact_manager(
        &mut self,
        payload: EdgePayload,
        node1: NodeIndex,
        node2: NodeIndex,
        ty: EdgeType,
    ) -> EdgeIndex {
        debug_assert_ne!(ty, EdgeType::Constraint, "constraints go through add_constraint");
        let handle = self.allocate_edge(payload, node1, node2);
        self.speculative.add_connection(node1, node2, ty, handle);
        handle
    }

    /// Adds a constraint. Constraints enter both sims and start connected.
    pub fn add_constraint(&mut self, payload: EdgePayload, node1: NodeIndex, node2: NodeIndex) -> EdgeIndex {
        let handle = self.allocate_edge(payload, node1, node2);
        self.speculative
            .add_connection(node1, node2, EdgeType::Constraint, handle);
        self.accurate
            .add_connection(node1, node2, EdgeType::Constraint, handle);
        self.connected_map.set(handle as usize);
        handle
    }

    /// Reserves `count` edge handles and sizes every table for them.
    pub fn preallocate_contact_managers(&mut self, count: usize) -> Vec<EdgeIndex> {
        let handles: Vec<EdgeIndex> = (0..count).map(|_| self.edge_handles.get_handle()).collect();
        let Some(&max_handle) = handles.iter().max() else {
            return handles;
        };
        self.cpu_data
            .write()
            .reserve_edge(max_handle, EDGE_NODE_INDEX_GROWTH);
        if let Some(gpu) = &self.gpu_data {
            gpu.lock().reserve_edge(max_handle);
        }
        let len = max_handle as usize + 1;
        if self.payloads.len() < len {
            self.payloads.resize(len, EdgePayload::default());
        }
        self.connected_map.grow_to_fit(max_handle as usize);
        self.speculative.preallocate_connections(max_handle);
        self.accurate.preallocate_connections(max_handle);
        handles
    }

    /// Fills a handle from [`Self::preallocate_contact_managers`].
    ///
    /// Returns `true` when the handle must be passed to [`Self::add_delayed_dirty_edges`].
    pub fn add_preallocated_contact_manager(
        &mut self,
        handle: EdgeIndex,
        payload: EdgePayload,
        node1: NodeIndex,
        node2: NodeIndex,
        ty: EdgeType,
    ) -> bool {
        self.cpu_data.write().set_edge_nodes(handle, node1, node2);
        self.payloads[handle as usize] = payload;
        self.connected_map.reset(handle as usize);
        self.speculative
            .add_connection_preallocated(node1, node2, ty, handle)
    }

    pub fn add_delayed_dirty_edges(&mut self, handles: &[EdgeIndex]) {
        self.speculative.add_delayed_dirty_edges(handles);
    }

    /// Inserts a touching pair into the accurate sim.
    pub fn set_edge_connected(&mut self, edge_index: EdgeIndex, ty: EdgeType) {
        if self.connected_map.test(edge_index as usize) {
            return;
        }
        let (node1, node2) = {
            let cpu = self.cpu_data.read();
            (cpu.node_index1(edge_index), cpu.node_index2(edge_index))
        };
        self.accurate.add_connection(node1, node2, ty, edge_index);
        self.connected_map.set(edge_index as usize);
    }

    /// Removes a pair that stopped touching from the accurate sim.
    pub fn set_edge_disconnected(&mut self, edge_index: EdgeIndex) {
        if self.connected_map.test(edge_index as usize) {
            self.accurate.remove_connection(edge_index);
            self.connected_map.reset(edge_index as usize);
        }
    }

    /// Removes an edge from both sims. Its handle is recycled by the next
    /// third pass.
    pub fn remove_connection(&mut self, edge_index: EdgeIndex) {
        self.destroyed_edges.push(edge_index);
        self.speculative.remove_connection(edge_index);
        self.set_edge_disconnected(edge_index);
        self.deactivate_edge(edge_index);
        if let Some(payload) = self.payloads.get_mut(edge_index as usize) {
            *payload = EdgePayload::default();
        }
    }

    /// Retires the GPU partition edges of `edge_index`.
    pub fn deactivate_edge(&mut self, edge_index: EdgeIndex) {
        if let Some(gpu) = &self.gpu_data {
            let mut gpu = gpu.lock();
            if let Some(partition) = gpu.first_partition_edge(edge_index) {
                gpu.destroyed_partition_edges.push(partition);
                gpu.set_first_partition_edge(edge_index, None);
            }
        }
    }

    /// Records the rigid contact manager of a GPU-managed pair and marks it connected.
    pub fn set_edge_rigid_cm(&mut self, edge_index: EdgeIndex, contact_manager: u64) {
        self.connected_map.set(edge_index as usize);
        if let Some(payload) = self.payloads.get_mut(edge_index as usize) {
            payload.object = Some(contact_manager);
        }
    }

    pub fn clear_edge_rigid_cm(&mut self, edge_index: EdgeIndex) {
        self.connected_map.reset(edge_index as usize);
        if let Some(payload) = self.payloads.get_mut(edge_index as usize) {
            payload.object = None;
        }
        self.deactivate_edge(edge_index);
    }

    // ---------------------------------------------------------------------
    // Per-step passes

    /// Speculative pass: wakes islands and links new broad-phase pairs.
    pub fn first_pass_island_gen(&mut self) {
        let timer = ScopedTimer::new("Basic.firstPassIslandGen", self.config.context_id);
        self.speculative.clear_deactivations();
        self.speculative.wake_islands();
        self.speculative.process_new_edges();
        self.speculative.remove_destroyed_edges();
        self.speculative.process_lost_edges(
            &self.destroyed_nodes,
            false,
            false,
            self.max_dirty_nodes_per_frame,
        );
        warn_if_pass_budget_exceeded("first pass island gen", timer.elapsed(), DEFAULT_PASS_BUDGET_MS);
    }

    /// Wakes what the speculative sim activated after the first pass.
    pub fn additional_speculative_activation(&mut self) {
        self.speculative.wake_islands2();
    }

    pub fn second_pass_island_gen(&mut self) {
        let timer = ScopedTimer::new("Basic.secondPassIslandGen", self.config.context_id);
        self.second_pass_island_gen_part1();
        self.second_pass_island_gen_part2();
        warn_if_pass_budget_exceeded("second pass island gen", timer.elapsed(), DEFAULT_PASS_BUDGET_MS);
    }

    /// Accurate wake and insertion.
    pub fn second_pass_island_gen_part1(&mut self) {
        self.accurate.wake_islands();
        self.accurate.process_new_edges();
    }

    /// Accurate removal and split detection, then node handle recycling.
    ///
    /// Nodes must be removed before the frame's first pass so that both sims
    /// have dropped them by now.
    pub fn second_pass_island_gen_part2(&mut self) {
        self.accurate.remove_destroyed_edges();
        self.accurate.process_lost_edges(
            &self.destroyed_nodes,
            false,
            false,
            self.max_dirty_nodes_per_frame,
        );
        self.free_destroyed_nodes();
    }

    /// Final pass: both sims apply removals and put idle islands to sleep.
    pub fn third_pass_island_gen(&mut self) {
        let timer = ScopedTimer::new("Basic.thirdPassIslandGen", self.config.context_id);
        self.accurate.clear_deactivations();

        let Self {
            accurate,
            speculative,
            destroyed_nodes,
            max_dirty_nodes_per_frame,
            ..
        } = self;
        let limit = *max_dirty_nodes_per_frame;
        let destroyed: &[NodeIndex] = destroyed_nodes;
        let third_pass = |sim: &mut IslandSim| {
            sim.remove_destroyed_edges();
            sim.process_lost_edges(destroyed, true, true, limit);
        };

        #[cfg(feature = "parallel")]
        rayon::join(|| third_pass(accurate), || third_pass(speculative));
        #[cfg(not(feature = "parallel"))]
        {
            third_pass(accurate);
            third_pass(speculative);
        }

        self.post_third_pass();
        warn_if_pass_budget_exceeded("third pass island gen", timer.elapsed(), DEFAULT_PASS_BUDGET_MS);
    }

    fn post_third_pass(&mut self) {
        self.free_destroyed_nodes();
        for edge_index in self.destroyed_edges.drain(..) {
            self.edge_handles.free_handle(edge_index);
        }
        debug_assert!(self.validate_deactivations());
    }

    fn free_destroyed_nodes(&mut self) {
        for node_index in self.destroyed_nodes.drain(..) {
            self.node_handles.free_handle(node_index.index());
        }
    }

    // ---------------------------------------------------------------------
    // Validation and accessors

    pub fn validate_deactivations(&self) -> bool {
        self.accurate.validate_deactivations() && self.speculative.validate_deactivations()
    }

    pub fn check_internal_consistency(&self) -> Result<()> {
        self.accurate.check_internal_consistency()?;
        self.speculative.check_internal_consistency()
    }

    pub fn accurate_island_sim(&self) -> &IslandSim {
        &self.accurate
    }

    pub fn accurate_island_sim_mut(&mut self) -> &mut IslandSim {
        &mut self.accurate
    }

    pub fn speculative_island_sim(&self) -> &IslandSim {
        &self.speculative
    }

    pub fn speculative_island_sim_mut(&mut self) -> &mut IslandSim {
        &mut self.speculative
    }

    pub fn cpu_data(&self) -> &SharedCpuData {
        &self.cpu_data
    }

    pub fn gpu_data(&self) -> Option<&SharedGpuData> {
        self.gpu_data.as_ref()
    }

    pub fn edge_payload(&self, edge_index: EdgeIndex) -> Option<&EdgePayload> {
        self.payloads.get(edge_index as usize)
    }

    pub fn is_edge_connected(&self, edge_index: EdgeIndex) -> bool {
        self.connected_map.test(edge_index as usize)
    }

    pub fn max_dirty_nodes_per_frame(&self) -> u32 {
        self.max_dirty_nodes_per_frame
    }

    /// Number of node handles currently issued, recycled ones excluded.
    pub fn live_node_count(&self) -> usize {
        self.node_handles.total_handles() as usize - self.node_handles.free_count()
    }
}
