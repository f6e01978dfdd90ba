//! Stable ID newtypes bridging `StreamGraph` nodes/edges to petgraph's own
//! index types, mirroring the teacher's `NodeId`/`EdgeId` pattern: the
//! graph crate never leaks a raw `NodeIndex`/`EdgeIndex` past its own API,
//! so swapping the backing `StableGraph`'s index type stays a local change.

use std::fmt;

use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

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

impl From<EdgeIndex<u32>> for ChannelId {
    fn from(idx: EdgeIndex<u32>) -> Self {
        ChannelId(idx.index() as u32)
    }
}

impl From<ChannelId> for EdgeIndex<u32> {
    fn from(id: ChannelId) -> Self {
        EdgeIndex::new(id.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_roundtrips_through_node_index() {
        let idx = NodeIndex::<u32>::new(5);
        let id: NodeId = idx.into();
        assert_eq!(id.0, 5);
        let back: NodeIndex<u32> = id.into();
        assert_eq!(back, idx);
    }

    #[test]
    fn channel_id_roundtrips_through_edge_index() {
        let idx = EdgeIndex::<u32>::new(9);
        let id: ChannelId = idx.into();
        let back: EdgeIndex<u32> = id.into();
        assert_eq!(back, idx);
    }

    #[test]
    fn display_prints_bare_index() {
        assert_eq!(format!("{}", NodeId(3)), "3");
        assert_eq!(format!("{}", ChannelId(7)), "7");
    }
}
