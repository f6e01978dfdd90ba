//! Core error type for `dataflow-core`.
//!
//! Narrow in scope: failures that can occur while interning types or
//! indexing into the arena-owned AST. Semantic-analysis diagnostics
//! (§7 of the specification) live in `dataflow-check::diagnostics`.

use thiserror::Error;

use crate::type_registry::TypeId;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("type not found: {id}")]
    TypeNotFound { id: TypeId },

    #[error("duplicate struct field name '{name}' in struct '{struct_name}'")]
    DuplicateFieldName { struct_name: String, name: String },

    #[error("array length must be > 0, got {length}")]
    ZeroLengthArray { length: u32 },

    #[error("APInt width must be in 2..=128, got {width}")]
    ApIntWidthOutOfRange { width: u32 },
}
