//! Core graph records: node handles, nodes, edges, islands, and the external data blocks.

pub mod edge;
pub mod external;
pub mod island;
pub mod node;
pub mod node_index;

pub use edge::{
    edge_of_instance, Edge, EdgeIndex, EdgeInstance, EdgeInstanceIndex, EdgeState, EdgeType,
};
pub use external::{
    CpuExternalData, GpuExternalData, PartitionEdgeId, SharedCpuData, SharedGpuData,
};
pub use island::{Island, IslandId, QueueElement, TraversalState};
pub use node::{Node, NodeFlags, NodeType};
pub use node_index::NodeIndex;
