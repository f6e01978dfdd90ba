//! Diagnostics accumulated by the semantic analyser (spec §4.2, §7).
//!
//! Analysis does not stop at the first error within a declaration: it
//! resynchronises at the next statement boundary and keeps walking, so a
//! single run can surface every independent mistake in a filter body
//! instead of just the first one. [`Report`] is the accumulator;
//! compilation fails overall iff it's non-empty once analysis of the whole
//! program completes.

use dataflow_core::id::{DeclId, ExprId};
use dataflow_core::span::Span;
use dataflow_core::type_registry::TypeId;
use serde::{Deserialize, Serialize};

/// A suggested fix attached to a diagnostic where one is obvious (e.g. an
/// explicit cast for a narrowing assignment). Does not change
/// accept/reject behaviour -- purely diagnostic payload richness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub message: String,
    /// Span the fix would apply to, usually the offending expression's.
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DiagnosticKind {
    UndeclaredName { name: String },
    TypeMismatch { expected: TypeId, found: TypeId },
    NotAnLValue,
    ArityMismatch { name: String, expected: usize, found: usize },
    Ambiguous { name: String, candidates: Vec<DeclId> },
    NonConstantArraySize,
    RateMismatch { reason: String },
    Redefinition { name: String, original: Span },
    /// A stateless filter's work block writes to a filter-scope field; only
    /// `stateful` filters may retain state across invocations (spec §4.2).
    StatelessFieldWrite { name: String },
    /// `peek(i)` where `i` is not a compile-time constant, or is constant but
    /// out of `[0, peek_rate)` (spec §4.2).
    InvalidPeekIndex { index: Option<i64>, peek_rate: Option<u32> },
}

impl DiagnosticKind {
    fn message(&self) -> String {
        match self {
            DiagnosticKind::UndeclaredName { name } => format!("undeclared name '{name}'"),
            DiagnosticKind::TypeMismatch { expected, found } => {
                format!("type mismatch: expected {expected}, found {found}")
            }
            DiagnosticKind::NotAnLValue => "expression is not an lvalue".to_string(),
            DiagnosticKind::ArityMismatch { name, expected, found } => format!(
                "'{name}' expects {expected} argument(s), found {found}"
            ),
            DiagnosticKind::Ambiguous { name, candidates } => format!(
                "call to '{name}' is ambiguous among {} candidate(s)",
                candidates.len()
            ),
            DiagnosticKind::NonConstantArraySize => {
                "array size must be a compile-time constant".to_string()
            }
            DiagnosticKind::RateMismatch { reason } => format!("rate mismatch: {reason}"),
            DiagnosticKind::Redefinition { name, .. } => {
                format!("redefinition of '{name}' in the same scope")
            }
            DiagnosticKind::StatelessFieldWrite { name } => format!(
                "stateless filter cannot write to persistent field '{name}'"
            ),
            DiagnosticKind::InvalidPeekIndex { index, peek_rate } => match (index, peek_rate) {
                (Some(i), Some(rate)) => {
                    format!("peek index {i} out of range for peek rate {rate}")
                }
                _ => "peek index must be a non-negative compile-time constant".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub span: Span,
    pub kind: DiagnosticKind,
    pub fix: Option<FixSuggestion>,
}

impl Diagnostic {
    pub fn new(span: Span, kind: DiagnosticKind) -> Self {
        Diagnostic { span, kind, fix: None }
    }

    pub fn with_fix(mut self, fix: FixSuggestion) -> Self {
        self.fix = Some(fix);
        self
    }

    pub fn message(&self) -> String {
        self.kind.message()
    }
}

/// Accumulates every diagnostic raised during one analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn new() -> Self {
        Report::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }
}

/// Marker type returned on the error path of an expression-typing helper:
/// the diagnostic has already been pushed to the `Report`, so the caller
/// only needs to know typing failed, not why (the "why" is in the report).
pub(crate) struct Rejected;

pub(crate) type TypeResult = Result<TypeId, Rejected>;

pub(crate) fn reject_and_record(
    report: &mut Report,
    span: Span,
    kind: DiagnosticKind,
) -> TypeResult {
    report.push(Diagnostic::new(span, kind));
    Err(Rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_starts_empty() {
        let r = Report::new();
        assert!(r.is_empty());
        assert_eq!(r.len(), 0);
    }

    #[test]
    fn push_accumulates() {
        let mut r = Report::new();
        r.push(Diagnostic::new(
            Span::synthetic(),
            DiagnosticKind::UndeclaredName { name: "x".into() },
        ));
        r.push(Diagnostic::new(
            Span::synthetic(),
            DiagnosticKind::NotAnLValue,
        ));
        assert_eq!(r.len(), 2);
        assert!(!r.is_empty());
    }

    #[test]
    fn messages_are_human_readable() {
        let d = Diagnostic::new(
            Span::synthetic(),
            DiagnosticKind::ArityMismatch {
                name: "f".into(),
                expected: 2,
                found: 1,
            },
        );
        assert!(d.message().contains("expects 2"));
    }
}
