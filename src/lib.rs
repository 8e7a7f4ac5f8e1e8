//! Island Sim – incremental island and sleep management for rigid-body physics.
//!
//! This crate tracks which bodies interact (islands) and which of them can
//! sleep, updating both incrementally as contacts and constraints come and go.
//! [`SimpleIslandManager`] drives an accurate and a speculative [`IslandSim`]
//! over a shared endpoint table and hands activation lists to a solver.

pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;

pub use config::{IslandManagerConfig, INVALID_EDGE, INVALID_ISLAND, INVALID_NODE};
pub use core::{
    CpuExternalData, Edge, EdgeIndex, EdgeState, EdgeType, GpuExternalData, Island, IslandId,
    Node, NodeFlags, NodeIndex, NodeType, PartitionEdgeId, SharedCpuData, SharedGpuData,
};
pub use dynamics::{EdgePayload, IslandSim, SimpleIslandManager};
pub use error::ConsistencyError;
pub use utils::{BitMap, HandleManager};
