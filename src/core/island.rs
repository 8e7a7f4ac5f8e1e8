use std::cmp::Ordering;

use super::edge::{EdgeIndex, EdgeType};
use super::node::NodeType;
use super::node_index::NodeIndex;
use crate::config::{INVALID_EDGE, INVALID_ISLAND};

/// Island id handed out by the island handle manager.
pub type IslandId = u32;

/// A connected component of bodies: an intrusive node list plus one intrusive
/// edge list per [`EdgeType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Island {
    pub root_node: NodeIndex,
    pub last_node: NodeIndex,
    pub node_count: [u32; NodeType::COUNT],
    /// Slot in the active-island table, or [`INVALID_ISLAND`] while asleep.
    pub active_index: u32,
    pub first_edge: [EdgeIndex; EdgeType::COUNT],
    pub last_edge: [EdgeIndex; EdgeType::COUNT],
    pub edge_count: [u32; EdgeType::COUNT],
}

impl Default for Island {
    fn default() -> Self {
        Self::new()
    }
}

impl Island {
    pub fn new() -> Self {
        Self {
            root_node: NodeIndex::STATIC,
            last_node: NodeIndex::STATIC,
            node_count: [0; NodeType::COUNT],
            active_index: INVALID_ISLAND,
            first_edge: [INVALID_EDGE; EdgeType::COUNT],
            last_edge: [INVALID_EDGE; EdgeType::COUNT],
            edge_count: [0; EdgeType::COUNT],
        }
    }

    pub fn total_nodes(&self) -> u32 {
        self.node_count.iter().sum()
    }

    pub fn total_edges(&self) -> u32 {
        self.edge_count.iter().sum()
    }

    pub fn nodes_of_type(&self, ty: NodeType) -> u32 {
        self.node_count[ty.index()]
    }

    pub fn edges_of_type(&self, ty: EdgeType) -> u32 {
        self.edge_count[ty.index()]
    }

    pub fn is_awake(&self) -> bool {
        self.active_index != INVALID_ISLAND
    }

    pub fn is_empty(&self) -> bool {
        !self.root_node.is_valid()
    }
}

/// One visited node of a route search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalState {
    pub node_index: NodeIndex,
    /// Position of this state in the visited list.
    pub current_index: u32,
    /// Position of the state this one was reached from.
    pub prev_index: u32,
    pub depth: u32,
}

impl TraversalState {
    pub fn new(node_index: NodeIndex, current_index: u32, prev_index: u32, depth: u32) -> Self {
        Self {
            node_index,
            current_index,
            prev_index,
            depth,
        }
    }
}

/// Priority queue entry. `BinaryHeap` pops the entry with the fewest hops first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueElement {
    /// Position of the [`TraversalState`] in the visited list.
    pub state: u32,
    pub hop_count: u32,
}

impl QueueElement {
    pub fn new(state: u32, hop_count: u32) -> Self {
        Self { state, hop_count }
    }
}

impl Ord for QueueElement {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .hop_count
            .cmp(&self.hop_count)
            .then_with(|| other.state.cmp(&self.state))
    }
}

impl PartialOrd for QueueElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn new_island_is_empty_and_asleep() {
        let island = Island::new();
        assert!(island.is_empty());
        assert!(!island.is_awake());
        assert_eq!(island.total_nodes(), 0);
        assert_eq!(island.total_edges(), 0);
    }

    #[test]
    fn queue_pops_lowest_hop_count_first() {
        let mut queue = BinaryHeap::new();
        queue.push(QueueElement::new(0, 7));
        queue.push(QueueElement::new(1, 2));
        queue.push(QueueElement::new(2, 4));
        queue.push(QueueElement::new(3, 2));
        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|e| e.state).collect();
        assert_eq!(order, vec![1, 3, 2, 0]);
    }
}
