//! Stable ID newtypes for arena-owned data.
//!
//! Per the Design Notes' arena-AST recommendation, the AST is not a
//! pointer-linked tree: every [`crate::ast::Expression`] and
//! [`crate::ast::Statement`] lives in a flat `Vec` owned by the
//! [`crate::ast::SourceProgram`] (or function body) and is referred to by
//! index. `TypeId` lives in [`crate::type_registry`] since it has its own
//! interning discipline; the IDs here are plain index newtypes with no
//! registry behind them.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! index_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                $name(v as u32)
            }
        }
    };
}

index_id!(ExprId);
index_id!(StmtId);
index_id!(DeclId);
index_id!(FilterId);
index_id!(FunctionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_type_name() {
        assert_eq!(format!("{}", ExprId(3)), "ExprId(3)");
        assert_eq!(format!("{}", DeclId(0)), "DeclId(0)");
    }

    #[test]
    fn roundtrips_through_usize() {
        let id: ExprId = 7usize.into();
        assert_eq!(id.index(), 7);
    }

    #[test]
    fn serde_roundtrip() {
        let id = FilterId(42);
        let json = serde_json::to_string(&id).unwrap();
        let back: FilterId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
