//! `StreamGraph`: the flattened, elaborated stream topology (spec §3, §4.4).
//!
//! Mirrors the teacher's `ProgramGraph` idiom of a private `StableGraph`
//! behind validated builder methods, minus the dual compute/semantic split
//! -- this graph only ever needs one node/edge space, since `Pipeline` and
//! `SplitJoin` are elaborated away before anything is inserted (see
//! [`crate::node`]'s module doc).

use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::id::{ChannelId, NodeId};
use crate::node::{FilterNode, JoinNode, SplitNode, StreamNode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamGraph {
    graph: StableGraph<StreamNode, Channel>,
}

impl StreamGraph {
    pub fn new() -> Self {
        StreamGraph { graph: StableGraph::new() }
    }

    pub fn add_filter(&mut self, node: FilterNode) -> NodeId {
        self.graph.add_node(StreamNode::Filter(node)).into()
    }

    pub fn add_split(&mut self, node: SplitNode) -> NodeId {
        self.graph.add_node(StreamNode::Split(node)).into()
    }

    pub fn add_join(&mut self, node: JoinNode) -> NodeId {
        self.graph.add_node(StreamNode::Join(node)).into()
    }

    pub fn add_channel(&mut self, from: NodeId, to: NodeId, channel: Channel) -> ChannelId {
        self.graph.add_edge(from.into(), to.into(), channel).into()
    }

    pub fn node(&self, id: NodeId) -> &StreamNode {
        &self.graph[petgraph::graph::NodeIndex::from(id)]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut StreamNode {
        &mut self.graph[petgraph::graph::NodeIndex::from(id)]
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.graph[petgraph::graph::EdgeIndex::from(id)]
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> &mut Channel {
        &mut self.graph[petgraph::graph::EdgeIndex::from(id)]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn channel_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &StreamNode)> {
        self.graph.node_indices().map(|i| (i.into(), &self.graph[i]))
    }

    pub fn channels(&self) -> impl Iterator<Item = (ChannelId, NodeId, NodeId, &Channel)> {
        self.graph.edge_indices().map(|e| {
            let (from, to) = self.graph.edge_endpoints(e).expect("edge index came from edge_indices");
            (e.into(), from.into(), to.into(), &self.graph[e])
        })
    }

    /// `(channel, source node)` pairs for every edge feeding into `id`, in
    /// the order petgraph last inserted them.
    pub fn incoming(&self, id: NodeId) -> Vec<(ChannelId, NodeId)> {
        self.graph
            .edges_directed(id.into(), Direction::Incoming)
            .map(|e| (e.id().into(), e.source().into()))
            .collect()
    }

    /// `(channel, target node)` pairs for every edge leaving `id`.
    pub fn outgoing(&self, id: NodeId) -> Vec<(ChannelId, NodeId)> {
        self.graph
            .edges_directed(id.into(), Direction::Outgoing)
            .map(|e| (e.id().into(), e.target().into()))
            .collect()
    }
}

impl Default for StreamGraph {
    fn default() -> Self {
        Self::new()
    }
}
