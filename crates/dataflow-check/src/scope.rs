//! Lexical scoping (spec §4.2 "Lexical scoping").
//!
//! A stack of symbol tables mapping `name -> DeclId`. Scopes are pushed at
//! function/filter/block entry and popped at exit. Shadowing across scopes
//! is allowed; a duplicate declaration within the *same* scope is a
//! [`crate::diagnostics::DiagnosticKind::Redefinition`].

use std::collections::HashMap;

use dataflow_core::id::DeclId;
use dataflow_core::span::Span;

struct Frame {
    names: HashMap<String, (DeclId, Span)>,
}

/// A stack of lexical scopes, innermost last.
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack {
            frames: vec![Frame { names: HashMap::new() }],
        }
    }

    pub fn push_scope(&mut self) {
        self.frames.push(Frame { names: HashMap::new() });
    }

    pub fn pop_scope(&mut self) {
        self.frames.pop();
        debug_assert!(!self.frames.is_empty(), "popped the root scope");
    }

    /// Declares `name` in the innermost scope. Returns the original span if
    /// `name` is already declared in that same scope (a `Redefinition`);
    /// the caller decides whether to record a diagnostic and whether to
    /// keep the old or new binding.
    pub fn declare(&mut self, name: &str, decl: DeclId, span: Span) -> Result<(), Span> {
        let frame = self.frames.last_mut().expect("at least one scope");
        if let Some((_, original_span)) = frame.names.get(name) {
            return Err(*original_span);
        }
        frame.names.insert(name.to_string(), (decl, span));
        Ok(())
    }

    /// Resolves `name` starting from the innermost scope outward.
    pub fn resolve(&self, name: &str) -> Option<DeclId> {
        for frame in self.frames.iter().rev() {
            if let Some((decl, _)) = frame.names.get(name) {
                return Some(*decl);
            }
        }
        None
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_in_innermost_scope_first() {
        let mut s = ScopeStack::new();
        s.declare("x", DeclId(0), Span::synthetic()).unwrap();
        s.push_scope();
        s.declare("x", DeclId(1), Span::synthetic()).unwrap();
        assert_eq!(s.resolve("x"), Some(DeclId(1)));
        s.pop_scope();
        assert_eq!(s.resolve("x"), Some(DeclId(0)));
    }

    #[test]
    fn duplicate_in_same_scope_is_rejected() {
        let mut s = ScopeStack::new();
        let original = Span::new(0, 1);
        s.declare("x", DeclId(0), original).unwrap();
        let err = s.declare("x", DeclId(1), Span::new(5, 6)).unwrap_err();
        assert_eq!(err, original);
    }

    #[test]
    fn unresolved_name_is_none() {
        let s = ScopeStack::new();
        assert_eq!(s.resolve("nope"), None);
    }

    #[test]
    fn shadowing_is_allowed_across_scopes() {
        let mut s = ScopeStack::new();
        s.declare("x", DeclId(0), Span::synthetic()).unwrap();
        s.push_scope();
        // a second declaration of `x` in the child scope is fine
        assert!(s.declare("x", DeclId(1), Span::synthetic()).is_ok());
    }
}
