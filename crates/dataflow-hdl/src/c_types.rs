//! SSA type -> C type lowering (spec §4.5 "C-syntax lowering").
//!
//! Every SSA type becomes a named C type. Structs are pre-declared and
//! emitted by reachability from the types a filter's functions actually
//! use; arrays are wrapped in a single-field struct so value semantics
//! (pass-by-value, return-by-value) survive function boundaries, exactly
//! as the teacher's own LLVM path wraps aggregates; integer widths round
//! up to the next container size in `{8, 16, 32, 64, 128}`.

use std::collections::BTreeSet;

use dataflow_core::type_registry::{TypeId, TypeRegistry};
use dataflow_core::types::{self, Type};

use crate::error::HdlError;
use crate::naming::{escape_ident, NameMangler};

/// Smallest container width in `{8, 16, 32, 64, 128}` that holds `width`
/// bits (spec §4.5: "integer widths round up to 8/16/32/64/128").
pub fn container_width(width: u32) -> u32 {
    for candidate in [8, 16, 32, 64, 128] {
        if width <= candidate {
            return candidate;
        }
    }
    128
}

/// `true` iff a value of this logical `width` needs masking on every store
/// and truncating use: its container is wider than its logical width
/// (spec §4.5 "Non-power-of-two integer widths").
pub fn needs_mask(width: u32) -> bool {
    width != container_width(width)
}

pub(crate) fn container_c_type(width: u32, signed: bool) -> &'static str {
    match (container_width(width), signed) {
        (8, true) => "int8_t",
        (8, false) => "uint8_t",
        (16, true) => "int16_t",
        (16, false) => "uint16_t",
        (32, true) => "int32_t",
        (32, false) => "uint32_t",
        (64, true) => "int64_t",
        (64, false) => "uint64_t",
        (128, true) => "__int128",
        (128, false) => "unsigned __int128",
        _ => unreachable!("container_width only returns one of 8/16/32/64/128"),
    }
}

/// `true` iff the logical type's lattice rung is signed (`Int` and signed
/// `APInt`); unsigned otherwise. `Bool`/`Bit` are unsigned single-bit
/// quantities.
pub fn is_signed(id: TypeId, registry: &TypeRegistry) -> bool {
    matches!(
        registry.get(id),
        Some(Type::Int) | Some(Type::APInt { signed: true, .. })
    )
}

/// Per-emitted-file struct/array-wrapper registry: maps a [`TypeId`] to the
/// C type name it was declared under, and records pre-declarations in
/// dependency order (an aggregate is declared only after every aggregate
/// it contains).
#[derive(Default)]
pub struct TypeLayout {
    names: Vec<(TypeId, String)>,
    declared: BTreeSet<u32>,
    /// C `struct <name> { ... };` bodies, in the order they must appear
    /// (reachability order: dependencies first).
    pub struct_decls: Vec<String>,
}

impl TypeLayout {
    pub fn new() -> TypeLayout {
        TypeLayout::default()
    }

    fn lookup(&self, id: TypeId) -> Option<&str> {
        self.names.iter().find(|(t, _)| *t == id).map(|(_, n)| n.as_str())
    }

    fn remember(&mut self, id: TypeId, name: String) {
        self.names.push((id, name));
    }

    /// Resolves `id` to its C type spelling, registering (and emitting a
    /// pre-declaration for) any struct or array-wrapper it needs first.
    /// `registry` supplies the logical `Type`; `reject_float` is `true`
    /// when the HDL backend was invoked for an integer-only flow (spec
    /// §4.1's `UnsupportedForHardware`).
    pub fn resolve(
        &mut self,
        id: TypeId,
        registry: &TypeRegistry,
        mangler: &mut NameMangler,
        reject_float: bool,
    ) -> Result<String, HdlError> {
        if let Some(existing) = self.lookup(id) {
            return Ok(existing.to_string());
        }
        let ty = registry
            .get(id)
            .ok_or_else(|| HdlError::Internal(format!("unresolved {id} reaching HDL emission")))?;
        let name = match ty {
            Type::Void => "void".to_string(),
            Type::Bool => "uint8_t".to_string(),
            Type::Bit => "uint8_t".to_string(),
            Type::Int => "int32_t".to_string(),
            Type::APInt { signed, width } => container_c_type(*width, *signed).to_string(),
            Type::Float => {
                if reject_float {
                    return Err(HdlError::UnsupportedForHardware { ty: id });
                }
                "float".to_string()
            }
            Type::Array { element, length } => {
                if reject_float && types::contains_float(id, registry) {
                    return Err(HdlError::UnsupportedForHardware { ty: id });
                }
                let elem_name = self.resolve(*element, registry, mangler, reject_float)?;
                let struct_name = mangler.anon_struct();
                self.struct_decls.push(format!(
                    "struct {struct_name} {{\n    {elem_name} data[{length}];\n}};"
                ));
                struct_name
            }
            Type::Struct { name: src_name, fields } => {
                if reject_float && types::contains_float(id, registry) {
                    return Err(HdlError::UnsupportedForHardware { ty: id });
                }
                let struct_name = format!("l_struct_{}", escape_ident(src_name));
                let mut body = String::new();
                for (field_name, field_ty) in fields {
                    let field_c = self.resolve(*field_ty, registry, mangler, reject_float)?;
                    body.push_str(&format!("    {field_c} {};\n", escape_ident(field_name)));
                }
                self.struct_decls.push(format!("struct {struct_name} {{\n{body}}};"));
                struct_name
            }
        };
        self.remember(id, name.clone());
        self.declared.insert(id.0);
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_core::type_registry::TypeRegistry;

    #[test]
    fn container_width_rounds_up_to_nearest_bucket() {
        assert_eq!(container_width(1), 8);
        assert_eq!(container_width(3), 8);
        assert_eq!(container_width(8), 8);
        assert_eq!(container_width(9), 16);
        assert_eq!(container_width(32), 32);
        assert_eq!(container_width(100), 128);
    }

    #[test]
    fn odd_widths_need_masking_pow2_ones_dont() {
        assert!(needs_mask(1));
        assert!(needs_mask(3));
        assert!(needs_mask(7));
        assert!(!needs_mask(8));
        assert!(!needs_mask(32));
    }

    #[test]
    fn scalar_builtins_resolve_without_declarations() {
        let reg = TypeRegistry::new();
        let mut layout = TypeLayout::new();
        let mut mangler = NameMangler::new();
        assert_eq!(layout.resolve(TypeId::INT, &reg, &mut mangler, true).unwrap(), "int32_t");
        assert_eq!(layout.resolve(TypeId::BOOL, &reg, &mut mangler, true).unwrap(), "uint8_t");
        assert!(layout.struct_decls.is_empty());
    }

    #[test]
    fn array_is_wrapped_in_a_single_field_struct() {
        let mut reg = TypeRegistry::new();
        let arr = reg.intern_array(TypeId::INT, 7);
        let mut layout = TypeLayout::new();
        let mut mangler = NameMangler::new();
        let name = layout.resolve(arr, &reg, &mut mangler, true).unwrap();
        assert_eq!(name, "l_struct_0");
        assert_eq!(layout.struct_decls.len(), 1);
        assert!(layout.struct_decls[0].contains("data[7]"));
    }

    #[test]
    fn float_rejected_for_integer_only_flow() {
        let reg = TypeRegistry::new();
        let mut layout = TypeLayout::new();
        let mut mangler = NameMangler::new();
        assert!(layout.resolve(TypeId::FLOAT, &reg, &mut mangler, true).is_err());
        assert!(layout.resolve(TypeId::FLOAT, &reg, &mut mangler, false).is_ok());
    }

    #[test]
    fn repeated_resolution_reuses_the_same_name_and_does_not_redeclare() {
        let mut reg = TypeRegistry::new();
        let arr = reg.intern_array(TypeId::INT, 4);
        let mut layout = TypeLayout::new();
        let mut mangler = NameMangler::new();
        let a = layout.resolve(arr, &reg, &mut mangler, true).unwrap();
        let b = layout.resolve(arr, &reg, &mut mangler, true).unwrap();
        assert_eq!(a, b);
        assert_eq!(layout.struct_decls.len(), 1);
    }
}
