//! Semantic analyser (component C2, spec §4.2).
//!
//! Walks a [`dataflow_core::ast::SourceProgram`] once, mutating each node
//! to fill in its resolved type and, for identifiers/calls, its referenced
//! declaration. [`analyze`] is the entry point; it never panics on
//! malformed-but-well-formed-AST input -- every rejection is surfaced as a
//! [`diagnostics::Diagnostic`] in the returned [`diagnostics::Report`].

pub mod builtins;
pub mod const_eval;
pub mod diagnostics;
pub mod overload;
pub mod rate_count;
pub mod scope;

mod analyzer;

pub use analyzer::analyze;
pub use diagnostics::{Diagnostic, DiagnosticKind, Report};
