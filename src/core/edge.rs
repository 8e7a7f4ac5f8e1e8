use serde::{Deserialize, Serialize};

use crate::config::INVALID_EDGE;

/// Index of an edge in the island sim's edge table.
pub type EdgeIndex = u32;

/// Index of an edge instance: `2 * edge` for the first endpoint, `2 * edge + 1` for the second.
pub type EdgeInstanceIndex = u32;

/// Kind of interaction an edge stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[repr(u16)]
pub enum EdgeType {
    ContactManager = 0,
    Constraint = 1,
    SoftBodyContact = 2,
    FemClothContact = 3,
    ParticleSystemContact = 4,
}

impl EdgeType {
    pub const COUNT: usize = 5;

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Lifecycle bits of an [`Edge`].
#[repr(transparent)]
#[derive(Hash, Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct EdgeState(u16);

bitflags::bitflags! {
    impl EdgeState: u16 {
        /// Linked into the graph.
        const INSERTED = 1 << 0;
        /// Removal requested, applied by the next destroyed-edge pass.
        const PENDING_DESTROYED = 1 << 1;
        /// Part of an awake island.
        const ACTIVE = 1 << 2;
        /// Queued for insertion.
        const IN_DIRTY_LIST = 1 << 3;
        /// Slot is free.
        const DESTROYED = 1 << 4;
        /// Listed in this frame's activated edges.
        const ACTIVATING = 1 << 5;
    }
}

/// One interaction between two nodes, or a node and the static world.
///
/// Endpoints live in the external edge-node table so topology stays separate
/// from per-edge payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub edge_type: EdgeType,
    pub state: EdgeState,
    pub next_island_edge: EdgeIndex,
    pub prev_island_edge: EdgeIndex,
}

impl Default for Edge {
    fn default() -> Self {
        Self::new()
    }
}

impl Edge {
    pub fn new() -> Self {
        Self {
            edge_type: EdgeType::ContactManager,
            state: EdgeState::DESTROYED,
            next_island_edge: INVALID_EDGE,
            prev_island_edge: INVALID_EDGE,
        }
    }

    #[inline]
    pub fn set_inserted(&mut self) {
        self.state.insert(EdgeState::INSERTED);
    }

    #[inline]
    pub fn clear_inserted(&mut self) {
        self.state.remove(EdgeState::INSERTED);
    }

    #[inline]
    pub fn set_destroyed(&mut self) {
        self.state.insert(EdgeState::DESTROYED);
    }

    #[inline]
    pub fn clear_destroyed(&mut self) {
        self.state.remove(EdgeState::DESTROYED);
    }

    #[inline]
    pub fn set_pending_destroyed(&mut self) {
        self.state.insert(EdgeState::PENDING_DESTROYED);
    }

    #[inline]
    pub fn clear_pending_destroyed(&mut self) {
        self.state.remove(EdgeState::PENDING_DESTROYED);
    }

    #[inline]
    pub fn activate_edge(&mut self) {
        self.state.insert(EdgeState::ACTIVE);
    }

    #[inline]
    pub fn deactivate_edge(&mut self) {
        self.state.remove(EdgeState::ACTIVE);
    }

    #[inline]
    pub fn mark_in_dirty_list(&mut self) {
        self.state.insert(EdgeState::IN_DIRTY_LIST);
    }

    #[inline]
    pub fn clear_in_dirty_list(&mut self) {
        self.state.remove(EdgeState::IN_DIRTY_LIST);
    }

    #[inline]
    pub fn is_inserted(&self) -> bool {
        self.state.contains(EdgeState::INSERTED)
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.state.contains(EdgeState::DESTROYED)
    }

    #[inline]
    pub fn is_pending_destroyed(&self) -> bool {
        self.state.contains(EdgeState::PENDING_DESTROYED)
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state.contains(EdgeState::ACTIVE)
    }

    #[inline]
    pub fn is_in_dirty_list(&self) -> bool {
        self.state.contains(EdgeState::IN_DIRTY_LIST)
    }

    #[inline]
    pub fn is_activating(&self) -> bool {
        self.state.contains(EdgeState::ACTIVATING)
    }
}

/// Link in a node's list of incident edge instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeInstance {
    pub next_edge: EdgeInstanceIndex,
    pub prev_edge: EdgeInstanceIndex,
}

impl Default for EdgeInstance {
    fn default() -> Self {
        Self {
            next_edge: INVALID_EDGE,
            prev_edge: INVALID_EDGE,
        }
    }
}

/// Edge owning an edge instance.
#[inline]
pub const fn edge_of_instance(instance: EdgeInstanceIndex) -> EdgeIndex {
    instance >> 1
}
