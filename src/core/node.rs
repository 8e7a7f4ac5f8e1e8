use serde::{Deserialize, Serialize};

use super::node_index::NodeIndex;
use crate::config::INVALID_EDGE;

/// Kind of simulation body a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[repr(u8)]
pub enum NodeType {
    RigidBody = 0,
    Articulation = 1,
    DeformableSurface = 2,
    DeformableVolume = 3,
    ParticleSystem = 4,
}

impl NodeType {
    pub const COUNT: usize = 5;

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// State bits of a [`Node`].
#[repr(transparent)]
#[derive(Hash, Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct NodeFlags(u8);

bitflags::bitflags! {
    impl NodeFlags: u8 {
        /// The sleep check may put this node to sleep.
        const READY_FOR_SLEEPING = 1 << 0;
        /// The node is awake.
        const ACTIVE = 1 << 1;
        /// The node is driven externally.
        const KINEMATIC = 1 << 2;
        /// The slot is a tombstone.
        const DELETED = 1 << 3;
        /// The node lost a connection and its island must be re-verified.
        const DIRTY = 1 << 4;
        /// The node is queued in the activating list.
        const ACTIVATING = 1 << 5;
    }
}

/// One simulation body in the connectivity graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    /// Head of this node's edge-instance list.
    pub first_edge_index: u32,
    pub flags: NodeFlags,
    pub ty: NodeType,
    pub static_touch_count: u16,
    pub next_node: NodeIndex,
    pub prev_node: NodeIndex,
    /// Number of active edges referencing this node. Keeps kinematics in the active list.
    pub active_ref_count: u32,
    /// Opaque user object associated with the body.
    pub object: Option<u64>,
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    pub fn new() -> Self {
        Self {
            first_edge_index: INVALID_EDGE,
            flags: NodeFlags::DELETED,
            ty: NodeType::RigidBody,
            static_touch_count: 0,
            next_node: NodeIndex::STATIC,
            prev_node: NodeIndex::STATIC,
            active_ref_count: 0,
            object: None,
        }
    }

    /// Turns the slot back into a tombstone.
    pub fn reset(&mut self) {
        self.first_edge_index = INVALID_EDGE;
        self.flags = NodeFlags::DELETED;
        self.object = None;
        self.active_ref_count = 0;
        self.static_touch_count = 0;
    }

    #[inline]
    pub fn set_active(&mut self) {
        self.flags.insert(NodeFlags::ACTIVE);
    }

    #[inline]
    pub fn clear_active(&mut self) {
        self.flags.remove(NodeFlags::ACTIVE);
    }

    #[inline]
    pub fn set_activating(&mut self) {
        self.flags.insert(NodeFlags::ACTIVATING);
    }

    #[inline]
    pub fn clear_activating(&mut self) {
        self.flags.remove(NodeFlags::ACTIVATING);
    }

    #[inline]
    pub fn set_ready_for_sleeping(&mut self) {
        self.flags.insert(NodeFlags::READY_FOR_SLEEPING);
    }

    #[inline]
    pub fn clear_ready_for_sleeping(&mut self) {
        self.flags.remove(NodeFlags::READY_FOR_SLEEPING);
    }

    #[inline]
    pub fn clear_deleted(&mut self) {
        self.flags.remove(NodeFlags::DELETED);
    }

    #[inline]
    pub fn set_kinematic_flag(&mut self) {
        debug_assert!(!self.is_kinematic());
        self.flags.insert(NodeFlags::KINEMATIC);
    }

    #[inline]
    pub fn clear_kinematic_flag(&mut self) {
        debug_assert!(self.is_kinematic());
        self.flags.remove(NodeFlags::KINEMATIC);
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.flags.insert(NodeFlags::DIRTY);
    }

    #[inline]
    pub fn clear_dirty(&mut self) {
        self.flags.remove(NodeFlags::DIRTY);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.flags.contains(NodeFlags::ACTIVE)
    }

    #[inline]
    pub fn is_active_or_activating(&self) -> bool {
        self.flags
            .intersects(NodeFlags::ACTIVE | NodeFlags::ACTIVATING)
    }

    #[inline]
    pub fn is_activating(&self) -> bool {
        self.flags.contains(NodeFlags::ACTIVATING)
    }

    #[inline]
    pub fn is_kinematic(&self) -> bool {
        self.flags.contains(NodeFlags::KINEMATIC)
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(NodeFlags::DELETED)
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(NodeFlags::DIRTY)
    }

    #[inline]
    pub fn is_ready_for_sleeping(&self) -> bool {
        self.flags.contains(NodeFlags::READY_FOR_SLEEPING)
    }

    #[inline]
    pub fn node_type(&self) -> NodeType {
        self.ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_is_tombstone() {
        let node = Node::new();
        assert!(node.is_deleted());
        assert!(!node.is_active_or_activating());
        assert_eq!(node.first_edge_index, INVALID_EDGE);
    }

    #[test]
    fn activating_counts_as_active_or_activating() {
        let mut node = Node::new();
        node.set_activating();
        assert!(node.is_active_or_activating());
        assert!(!node.is_active());
        node.clear_activating();
        node.set_active();
        assert!(node.is_active_or_activating());
    }

    #[test]
    fn reset_keeps_type_and_links() {
        let mut node = Node::new();
        node.ty = NodeType::Articulation;
        node.flags = NodeFlags::ACTIVE | NodeFlags::KINEMATIC;
        node.active_ref_count = 3;
        node.static_touch_count = 2;
        node.reset();
        assert_eq!(node.flags, NodeFlags::DELETED);
        assert_eq!(node.ty, NodeType::Articulation);
        assert_eq!(node.active_ref_count, 0);
        assert_eq!(node.static_touch_count, 0);
    }
}
