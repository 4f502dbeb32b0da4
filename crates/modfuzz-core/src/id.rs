//! Stable ID newtypes for graph entities.
//!
//! Both IDs are distinct newtype wrappers over `u32`, so a `NodeId` cannot be
//! used where an `EdgeId` is expected. A node's ID is its creation ordinal,
//! which is also its position in the graph and its served file name.

use std::fmt;

use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};

/// Node identifier. `NodeId(0)` is always the document root.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

/// Edge identifier. Edge IDs grow in insertion order, which is the declared
/// import order of each source node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EdgeId(pub u32);

impl NodeId {
    /// The document root.
    pub const ROOT: NodeId = NodeId(0);

    /// Returns `true` for the document root.
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    /// The ID as a slice index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Bridge between the IDs and petgraph's u32 indices.

impl From<NodeIndex<u32>> for NodeId {
    fn from(idx: NodeIndex<u32>) -> Self {
        NodeId(idx.index() as u32)
    }
}

impl From<NodeId> for NodeIndex<u32> {
    fn from(id: NodeId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}

impl From<EdgeIndex<u32>> for EdgeId {
    fn from(idx: EdgeIndex<u32>) -> Self {
        EdgeId(idx.index() as u32)
    }
}

impl From<EdgeId> for EdgeIndex<u32> {
    fn from(id: EdgeId) -> Self {
        EdgeIndex::new(id.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_to_node_index_roundtrip() {
        let idx = NodeIndex::<u32>::new(42);
        let node_id = NodeId::from(idx);
        assert_eq!(node_id.0, 42);

        let back: NodeIndex<u32> = node_id.into();
        assert_eq!(back.index(), 42);
    }

    #[test]
    fn edge_id_to_edge_index_roundtrip() {
        let back: EdgeIndex<u32> = EdgeId(9).into();
        assert_eq!(EdgeId::from(back), EdgeId(9));
    }

    #[test]
    fn root_is_zero() {
        assert!(NodeId(0).is_root());
        assert!(!NodeId(3).is_root());
        assert_eq!(NodeId(3).index(), 3);
    }

    #[test]
    fn ids_display_inner_value() {
        assert_eq!(format!("{}", NodeId(7)), "7");
        assert_eq!(format!("{}", EdgeId(99)), "99");
    }

    #[test]
    fn serde_roundtrip() {
        let node = NodeId(42);
        let json = serde_json::to_string(&node).unwrap();
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }
}
