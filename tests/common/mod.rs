#![allow(dead_code)]

use island_sim::*;
use parking_lot::RwLock;
use std::sync::Arc;

/// Drives a single `IslandSim` the way the manager does, writing edge
/// endpoints into the shared table before queueing them.
pub struct SimHarness {
    pub cpu: SharedCpuData,
    pub sim: IslandSim,
    next_edge: EdgeIndex,
}

impl SimHarness {
    pub fn new() -> Self {
        let cpu: SharedCpuData = Arc::new(RwLock::new(CpuExternalData::new()));
        let sim = IslandSim::new(Arc::clone(&cpu), None, 0);
        Self {
            cpu,
            sim,
            next_edge: 0,
        }
    }

    pub fn dynamic(&mut self, slot: u32) -> NodeIndex {
        let node = NodeIndex::new(slot);
        self.sim
            .add_node(true, false, NodeType::RigidBody, node, Some(slot as u64));
        node
    }

    pub fn kinematic(&mut self, slot: u32, active: bool) -> NodeIndex {
        let node = NodeIndex::new(slot);
        self.sim
            .add_node(active, true, NodeType::RigidBody, node, None);
        node
    }

    pub fn connect(&mut self, a: NodeIndex, b: NodeIndex, ty: EdgeType) -> EdgeIndex {
        let edge = self.next_edge;
        self.next_edge += 1;
        {
            let mut cpu = self.cpu.write();
            cpu.reserve_edge(edge, 16);
            cpu.set_edge_nodes(edge, a, b);
        }
        self.sim.add_connection(a, b, ty, edge);
        edge
    }

    pub fn contact(&mut self, a: NodeIndex, b: NodeIndex) -> EdgeIndex {
        self.connect(a, b, EdgeType::ContactManager)
    }

    /// Wake pass followed by edge insertion.
    pub fn step(&mut self) {
        self.sim.wake_islands();
        self.sim.process_new_edges();
    }

    /// Applies removals and repairs islands without putting anything to sleep.
    pub fn settle(&mut self) {
        self.sim.remove_destroyed_edges();
        self.sim.process_lost_edges(&[], false, false, u32::MAX);
    }

    /// Applies removals, repairs islands and runs the sleep pass.
    pub fn sleep_pass(&mut self) {
        self.sim.clear_deactivations();
        self.sim.remove_destroyed_edges();
        self.sim.process_lost_edges(&[], true, true, u32::MAX);
    }

    pub fn island_nodes(&self, node: NodeIndex) -> u32 {
        self.sim
            .island_for_node(node)
            .map(|island| island.total_nodes())
            .unwrap_or(0)
    }

    pub fn island_edges(&self, node: NodeIndex) -> u32 {
        self.sim
            .island_for_node(node)
            .map(|island| island.total_edges())
            .unwrap_or(0)
    }

    pub fn assert_consistent(&self) {
        if let Err(err) = self.sim.check_internal_consistency() {
            panic!("island graph inconsistent: {err}");
        }
    }
}
