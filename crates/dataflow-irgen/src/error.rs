//! Errors for `dataflow-irgen`.
//!
//! Per spec §4.3/§7: "all internal errors are bugs (unreachable); user-
//! visible failures have been rejected by C2." `IrError` therefore only has
//! an `Internal` variant plus the simulator's runtime faults, which are
//! distinct from "impossible" lowering bugs -- a FIFO underrun is a real
//! condition a running hardware instance could hit if fed too few inputs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IrError {
    /// An invariant the semantic analyser should have already enforced
    /// did not hold. Reaching this is a lowerer bug, not a user error.
    #[error("internal lowering error: {0}")]
    Internal(String),

    #[error("simulator: input FIFO exhausted on pop/peek")]
    FifoUnderrun,

    #[error("simulator: output FIFO push exceeded declared push rate")]
    PushOverrun,
}
