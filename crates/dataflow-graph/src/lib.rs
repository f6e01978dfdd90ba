//! Component C4: elaborates hierarchical stream declarations (pipeline /
//! splitjoin / filter) into a flat `StreamGraph` and solves steady-state
//! channel multiplicities (spec §4.4).
//!
//! [`elaborate::build`] is the entry point: it walks the AST starting from
//! a top-level `void -> void` pipeline declaration and produces a
//! [`graph::StreamGraph`] with every channel's element type resolved, then
//! [`multiplicity::fill_channel_multiplicities`] solves the per-channel
//! firing counts before the graph is handed to `dataflow-hdl`.

pub mod channel;
pub mod elaborate;
pub mod error;
pub mod graph;
pub mod id;
pub mod multiplicity;
pub mod node;
pub mod rational;

pub use channel::{Channel, FIFO_SIZE_MULTIPLIER};
pub use elaborate::build;
pub use error::GraphError;
pub use graph::StreamGraph;
pub use id::{ChannelId, NodeId};
pub use node::{FilterNode, JoinNode, SplitNode, SplitPolicy, StreamNode};
