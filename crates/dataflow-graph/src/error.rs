//! Errors for `dataflow-graph` (spec §4.4, §7).
//!
//! Every variant here is a *user-visible* failure: the program passed C2
//! but its stream topology or instantiation arguments don't elaborate into
//! a schedulable graph. Internal bugs (an unreachable node-kind match, a
//! malformed edge) use `Internal` instead of inventing a new variant.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    /// A `Pipeline`'s adjacent children don't share a common channel type.
    #[error("pipeline type mismatch: '{upstream}' produces {produced}, '{downstream}' expects {expected}")]
    PipelineTypeMismatch {
        upstream: String,
        downstream: String,
        produced: String,
        expected: String,
    },

    /// A `SplitJoin`'s split output type or join input type doesn't match
    /// every branch.
    #[error("splitjoin type mismatch at branch {branch}: expected {expected}, found {found}")]
    SplitJoinTypeMismatch { branch: usize, expected: String, found: String },

    /// Rate-closure solving produced no integer firing-count solution.
    #[error("unschedulable graph: {reason}")]
    UnschedulableGraph { reason: String },

    /// A filter-instantiation argument did not fold to a compile-time
    /// constant (spec §4.4: "each must evaluate to a constant under §4.2").
    #[error("non-constant argument to stream instantiation '{name}'")]
    NonConstantArgument { name: String },

    /// The declaration named by an `add`/top-level reference is not a
    /// stream declaration (filter, pipeline, or splitjoin).
    #[error("'{name}' does not name a stream declaration")]
    NotAStreamDeclaration { name: String },

    #[error("internal graph-builder error: {0}")]
    Internal(String),
}
