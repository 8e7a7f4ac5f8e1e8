use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::config::INVALID_NODE;

/// Packed 64-bit handle to a simulation node.
///
/// The low word is the body slot. The high word packs an articulation link id
/// (shifted left by one) above an "is articulation" bit. A slot of
/// [`INVALID_NODE`] denotes the static world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIndex {
    index: u32,
    link_and_flag: u32,
}

impl NodeIndex {
    /// The static-world sentinel.
    pub const STATIC: Self = Self {
        index: INVALID_NODE,
        link_and_flag: 0,
    };

    #[inline]
    pub const fn new(index: u32) -> Self {
        Self {
            index,
            link_and_flag: 0,
        }
    }

    /// Handle to link `link_id` of the articulation stored in slot `index`.
    #[inline]
    pub const fn articulation(index: u32, link_id: u32) -> Self {
        Self {
            index,
            link_and_flag: (link_id << 1) | 1,
        }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn slot(self) -> usize {
        self.index as usize
    }

    /// The same body with the articulation link information dropped.
    #[inline]
    pub const fn without_link(self) -> Self {
        Self::new(self.index)
    }

    #[inline]
    pub const fn articulation_link_id(self) -> u32 {
        self.link_and_flag >> 1
    }

    #[inline]
    pub const fn is_articulation(self) -> bool {
        self.link_and_flag & 1 != 0
    }

    #[inline]
    pub const fn is_static_body(self) -> bool {
        self.index == INVALID_NODE
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.index != INVALID_NODE
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        ((self.link_and_flag as u64) << 32) | self.index as u64
    }
}

impl Default for NodeIndex {
    fn default() -> Self {
        Self::STATIC
    }
}

impl PartialOrd for NodeIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw().cmp(&other.raw())
    }
}

impl From<u32> for NodeIndex {
    fn from(index: u32) -> Self {
        Self::new(index)
    }
}
