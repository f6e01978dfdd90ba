//! Byte-offset source spans.
//!
//! The grammar-driven parser is out of scope for this crate, but every
//! [`Expression`](crate::ast::Expression), [`Statement`](crate::ast::Statement)
//! and [`Declaration`](crate::ast::Declaration) still carries a span so that
//! diagnostics produced downstream (in `dataflow-check`) can point at a
//! location in the original source text.

use serde::{Deserialize, Serialize};

/// A half-open byte range `[start, end)` into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub const fn new(start: u32, end: u32) -> Self {
        Span { start, end }
    }

    /// A zero-width span, used for synthesized nodes that have no source
    /// counterpart (e.g. an implicit cast inserted by constant folding).
    pub const fn synthetic() -> Self {
        Span { start: 0, end: 0 }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_takes_the_union() {
        let a = Span::new(10, 20);
        let b = Span::new(5, 15);
        assert_eq!(a.merge(b), Span::new(5, 20));
    }

    #[test]
    fn synthetic_is_zero_width() {
        let s = Span::synthetic();
        assert_eq!(s.start, s.end);
    }
}
