//! Errors for `dataflow-hdl` (component C5, spec §4.5, §7).
//!
//! Per §7: "Lowerers (C3, C5) treat every condition reachable by a
//! well-typed input as infallible; any unreachable case is surfaced as
//! `Internal`." The one genuinely user-visible failure this crate can
//! still raise is `UnsupportedForHardware` (a `Float` element type reaching
//! an integer-only flow, spec §4.1) -- everything upstream of C5 has
//! already rejected non-schedulable or ill-typed programs.

use dataflow_core::type_registry::TypeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HdlError {
    #[error("unsupported for hardware: type {ty} contains a floating-point component")]
    UnsupportedForHardware { ty: TypeId },

    #[error("internal HDL emission error: {0}")]
    Internal(String),
}
