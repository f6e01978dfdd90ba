//! `StreamGraph` node payloads (spec §3 "StreamGraph node types").
//!
//! `Pipeline` and `SplitJoin` are elaborated away by [`crate::elaborate`]
//! rather than materialised as their own node kind: a pipeline is just a
//! chain of channels between its flattened children, and a splitjoin is a
//! `Split` node, its branches, and a `Join` node wired directly together.
//! Only the three leaf/fan kinds the contract's multiplicity algorithm
//! actually reasons about over edges survive into the built graph.

use dataflow_check::const_eval::ConstValue;
use dataflow_core::id::{DeclId, FilterId};
use dataflow_core::type_registry::TypeId;
use serde::{Deserialize, Serialize};

/// A resolved split policy: `duplicate` forwards the full input rate to
/// every branch, `roundrobin` partitions it by weight (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitPolicy {
    Duplicate,
    RoundRobin { weights: Vec<u32> },
}

/// A resolved join policy. Always `roundrobin`; weights default to
/// all-ones when the source declaration omitted them (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPolicy {
    pub weights: Vec<u32>,
}

/// A filter declaration materialised with resolved parameter values and a
/// unique identifier (spec §3 "FilterInstance"). The IR module itself
/// lives in `dataflow-irgen`'s output, keyed by `decl`/`instance_id`; this
/// node only carries what C4's rate algorithm and C5's instantiation need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterNode {
    pub instance_id: FilterId,
    pub name: String,
    pub decl: DeclId,
    pub input_type: TypeId,
    pub output_type: TypeId,
    pub peek_rate: u32,
    pub pop_rate: u32,
    pub push_rate: u32,
    pub stateful: bool,
    /// Constant-folded arguments bound to the filter's declared parameters,
    /// in declaration order.
    pub args: Vec<ConstValue>,
    /// Steady-state firing count, i.e. how many times this instance's
    /// `work` block runs per whole-graph steady-state cycle. `None` until
    /// [`crate::multiplicity`] (invoked from within elaboration) solves it.
    pub firing_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitNode {
    pub policy: SplitPolicy,
    pub element_type: TypeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinNode {
    pub policy: JoinPolicy,
    pub element_type: TypeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamNode {
    Filter(FilterNode),
    Split(SplitNode),
    Join(JoinNode),
}

impl StreamNode {
    pub fn input_type(&self) -> TypeId {
        match self {
            StreamNode::Filter(f) => f.input_type,
            StreamNode::Split(s) => s.element_type,
            StreamNode::Join(j) => j.element_type,
        }
    }

    pub fn output_type(&self) -> TypeId {
        match self {
            StreamNode::Filter(f) => f.output_type,
            StreamNode::Split(s) => s.element_type,
            StreamNode::Join(j) => j.element_type,
        }
    }

    pub fn as_filter(&self) -> Option<&FilterNode> {
        match self {
            StreamNode::Filter(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_filter_mut(&mut self) -> Option<&mut FilterNode> {
        match self {
            StreamNode::Filter(f) => Some(f),
            _ => None,
        }
    }
}
