//! `TypeId` identity and the `TypeRegistry` that interns [`Type`] values.
//!
//! Two `Type` values with equal kind and parameters share one canonical
//! `TypeId` (spec §3: "Types are interned"). The five scalar kinds are
//! pre-registered at fixed IDs on construction, mirroring the teacher's
//! `TypeRegistry::new()` pattern of reserving low IDs for built-ins;
//! `APInt`, `Array`, and `Struct` are registered on demand and deduplicated
//! by a structural key so that e.g. two occurrences of `bit<8>` or `int[4]`
//! resolve to the same `TypeId`.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Type;

/// Unique identifier for an interned [`Type`]. Indexes into the
/// `TypeRegistry`'s type vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

impl TypeId {
    pub const VOID: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const BIT: TypeId = TypeId(2);
    pub const INT: TypeId = TypeId(3);
    pub const FLOAT: TypeId = TypeId(4);
}

/// Structural key used to dedup non-scalar / parametric types so that
/// repeated occurrences of the same shape share a `TypeId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum StructuralKey {
    ApInt { signed: bool, width: u32 },
    Array { element: TypeId, length: u32 },
    StructName(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeRegistry {
    types: Vec<Type>,
    /// Dedup index from structural shape to the `TypeId` already holding it.
    /// Not persisted -- a deserialized registry just can't dedup further
    /// interning calls against its pre-existing entries, which only matters
    /// for long-lived incremental sessions, not single-shot compiles.
    #[serde(skip)]
    by_key: HashMap<StructuralKey, TypeId>,
}

const BUILTIN_COUNT: usize = 5;

impl TypeRegistry {
    /// Creates a registry with `Void`, `Bool`, `Bit`, `Int`, `Float`
    /// pre-registered at `TypeId(0..=4)`.
    pub fn new() -> Self {
        TypeRegistry {
            types: vec![Type::Void, Type::Bool, Type::Bit, Type::Int, Type::Float],
            by_key: HashMap::new(),
        }
    }

    pub fn get(&self, id: TypeId) -> Option<&Type> {
        self.types.get(id.0 as usize)
    }

    fn intern_structural(&mut self, key: StructuralKey, ty: Type) -> TypeId {
        if let Some(existing) = self.by_key.get(&key) {
            return *existing;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        self.by_key.insert(key, id);
        id
    }

    /// Interns an `APInt { signed, width }`, deduped by `(signed, width)`.
    /// `width` is not validated here (the analyser enforces 2..=128 at the
    /// declaration site via [`CoreError::ApIntWidthOutOfRange`]-returning
    /// callers); this method is infallible so it can be used freely from
    /// `common_type`.
    pub fn intern_apint(&mut self, signed: bool, width: u32) -> TypeId {
        self.intern_structural(
            StructuralKey::ApInt { signed, width },
            Type::APInt { signed, width },
        )
    }

    /// Validated variant of [`Self::intern_apint`] for use at declaration
    /// sites, where an out-of-range width is a real user error.
    pub fn intern_apint_checked(&mut self, signed: bool, width: u32) -> Result<TypeId, CoreError> {
        if !(2..=128).contains(&width) {
            return Err(CoreError::ApIntWidthOutOfRange { width });
        }
        Ok(self.intern_apint(signed, width))
    }

    /// Interns `Array { element, length }`, deduped by `(element, length)`.
    pub fn intern_array(&mut self, element: TypeId, length: u32) -> TypeId {
        self.intern_structural(
            StructuralKey::Array { element, length },
            Type::Array { element, length },
        )
    }

    pub fn intern_array_checked(
        &mut self,
        element: TypeId,
        length: u32,
    ) -> Result<TypeId, CoreError> {
        if length == 0 {
            return Err(CoreError::ZeroLengthArray { length });
        }
        Ok(self.intern_array(element, length))
    }

    /// Interns a named struct, deduped by name (struct names are unique
    /// within a compilation unit per spec §4.2's `Redefinition` check).
    /// Field-list duplicate-name validation happens in `dataflow-check`
    /// before the fields reach an `IndexMap`, which cannot itself hold a
    /// duplicate key.
    pub fn intern_struct(&mut self, name: &str, fields: IndexMap<String, TypeId>) -> TypeId {
        self.intern_structural(
            StructuralKey::StructName(name.to_string()),
            Type::Struct {
                name: name.to_string(),
                fields,
            },
        )
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
