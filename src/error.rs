//! Error types reported by the island consistency validator.
//!
//! Island maintenance itself is infallible: contract violations are debug
//! assertions. Only the explicit validator returns [`ConsistencyError`].

use std::fmt;

/// A broken invariant found by `check_internal_consistency`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    /// An island's node list is cyclic, has bad back links, or does not end at its last node.
    NodeListBroken { island: u32 },
    /// An island's per-type node counts disagree with its node list.
    NodeCountMismatch { island: u32 },
    /// A node's island id disagrees with the island list that holds it.
    NodeIslandMismatch { node: u32, island: u32 },
    /// An island's edge list of one type is cyclic or has bad back links.
    EdgeListBroken { island: u32, edge_type: usize },
    /// An island's per-type edge count disagrees with its edge list.
    EdgeCountMismatch { island: u32, edge_type: usize },
    /// An inserted edge is missing from (or duplicated in) the island that owns its endpoints.
    EdgeIslandMismatch { edge: u32 },
    /// The active-island table and the islands' active indices disagree.
    ActiveIndexMismatch { island: u32 },
    /// An island's static touch count is not the sum over its nodes.
    StaticTouchMismatch { island: u32 },
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NodeListBroken { island } => write!(f, "node list of island {island} is broken"),
            Self::NodeCountMismatch { island } => {
                write!(f, "node count of island {island} does not match its list")
            }
            Self::NodeIslandMismatch { node, island } => {
                write!(f, "node {node} is not recorded as a member of island {island}")
            }
            Self::EdgeListBroken { island, edge_type } => {
                write!(f, "edge list {edge_type} of island {island} is broken")
            }
            Self::EdgeCountMismatch { island, edge_type } => {
                write!(f, "edge count {edge_type} of island {island} does not match its list")
            }
            Self::EdgeIslandMismatch { edge } => {
                write!(f, "edge {edge} is not linked exactly once into its island")
            }
            Self::ActiveIndexMismatch { island } => {
                write!(f, "active index of island {island} is out of sync")
            }
            Self::StaticTouchMismatch { island } => {
                write!(f, "static touch count of island {island} is out of sync")
            }
        }
    }
}

impl std::error::Error for ConsistencyError {}

/// Result alias for validator calls.
pub type Result<T> = std::result::Result<T, ConsistencyError>;
