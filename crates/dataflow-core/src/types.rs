//! The canonical type lattice (component C1, spec §4.1).
//!
//! [`Type`] is the kind of a canonicalised type descriptor; the actual
//! identity and storage discipline (interning, structural dedup) lives in
//! [`crate::type_registry`]. This module owns the lattice rules: which
//! conversions are allowed, what the least-upper-bound ("common type") of
//! two types is, and how wide a type is in bits for the HDL backend.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::type_registry::{TypeId, TypeRegistry};

/// A canonical type descriptor. Each kind carries its own invariants, see
/// spec §3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Void,
    /// 1-bit boolean.
    Bool,
    /// 1-bit unsigned bit.
    Bit,
    /// Signed, 32-bit by default.
    Int,
    /// Arbitrary-precision integer, 2..=128 bits.
    APInt { signed: bool, width: u32 },
    /// 32-bit IEEE-754 float.
    Float,
    /// Fixed-size array; `length > 0`.
    Array { element: TypeId, length: u32 },
    /// Named struct with an ordered field list.
    Struct {
        name: String,
        fields: IndexMap<String, TypeId>,
    },
}

impl Type {
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Type::Bool | Type::Bit | Type::Int | Type::APInt { .. } | Type::Float
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Type::Bool | Type::Bit | Type::Int | Type::APInt { .. })
    }
}

/// Where a type falls in the monotone conversion lattice
/// `Bool -> Bit -> APInt_n -> Int -> Float`. Used to rank candidates during
/// overload resolution and to decide convertibility without re-deriving the
/// chain every time. `APInt_n` carries its width so two `APInt` types compare
/// by width within the same rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rung {
    Bool,
    Bit,
    ApInt(u32),
    Int,
    Float,
}

fn rung(ty: &Type) -> Rung {
    match ty {
        Type::Bool => Rung::Bool,
        Type::Bit => Rung::Bit,
        Type::APInt { width, .. } => Rung::ApInt(*width),
        Type::Int => Rung::Int,
        Type::Float => Rung::Float,
        Type::Void | Type::Array { .. } | Type::Struct { .. } => {
            unreachable!("rung() is only meaningful for scalar lattice members")
        }
    }
}

/// `true` iff a value of type `from` converts to type `to` per spec §4.1:
/// `Bool -> Bit -> APInt_n -> Int -> Float`, plus `APInt_n -> APInt_m` when
/// `n <= m` (sign-extend). Identity always converts. Arrays and structs only
/// convert to themselves (no implicit element-wise coercion).
pub fn can_convert(from: TypeId, to: TypeId, registry: &TypeRegistry) -> bool {
    if from == to {
        return true;
    }
    let (Some(from_ty), Some(to_ty)) = (registry.get(from), registry.get(to)) else {
        return false;
    };
    if !from_ty.is_scalar() || !to_ty.is_scalar() {
        return false;
    }
    if let (Type::APInt { width: w1, .. }, Type::APInt { width: w2, .. }) = (from_ty, to_ty) {
        return w1 <= w2;
    }
    rung(from_ty) < rung(to_ty)
}

/// Least upper bound of `(a, b)` in the conversion lattice, or `None` if the
/// pair has no common type (semantic analysis then fails with
/// `TypeMismatch`). May intern a fresh `APInt` type when the LUB of two
/// `APInt`s of different widths doesn't already exist.
pub fn common_type(a: TypeId, b: TypeId, registry: &mut TypeRegistry) -> Option<TypeId> {
    if a == b {
        return Some(a);
    }
    let ty_a = registry.get(a)?.clone();
    let ty_b = registry.get(b)?.clone();
    if !ty_a.is_scalar() || !ty_b.is_scalar() {
        return None;
    }
    if let (Type::APInt { signed: s1, width: w1 }, Type::APInt { signed: s2, width: w2 }) =
        (&ty_a, &ty_b)
    {
        if s1 != s2 {
            return None;
        }
        let width = (*w1).max(*w2);
        return Some(registry.intern_apint(*s1, width));
    }
    if can_convert(a, b, registry) {
        return Some(b);
    }
    if can_convert(b, a, registry) {
        return Some(a);
    }
    None
}

/// Bit width per spec §4.1: `Bool`=1, `Bit`=1, `APInt_n`=n, `Int`=32,
/// `Float`=32, `Array{e,k}` = k·width(e), `Struct` = sum of field widths.
pub fn bit_width(id: TypeId, registry: &TypeRegistry) -> Option<u32> {
    let ty = registry.get(id)?;
    Some(match ty {
        Type::Void => 0,
        Type::Bool | Type::Bit => 1,
        Type::APInt { width, .. } => *width,
        Type::Int => 32,
        Type::Float => 32,
        Type::Array { element, length } => bit_width(*element, registry)? * length,
        Type::Struct { fields, .. } => {
            let mut total = 0u32;
            for field_ty in fields.values() {
                total += bit_width(*field_ty, registry)?;
            }
            total
        }
    })
}

/// `true` iff `id` (recursively through arrays/structs) contains a `Float`
/// component. Used by `UnsupportedForHardware` checks in the HDL backend,
/// which rejects floating-point element types for integer-only flows.
pub fn contains_float(id: TypeId, registry: &TypeRegistry) -> bool {
    match registry.get(id) {
        Some(Type::Float) => true,
        Some(Type::Array { element, .. }) => contains_float(*element, registry),
        Some(Type::Struct { fields, .. }) => {
            fields.values().any(|f| contains_float(*f, registry))
        }
        _ => false,
    }
}

/// Textual bit-vector form for HDL output: `std_logic` for 1-bit types,
/// `std_logic_vector(N-1 downto 0)` otherwise.
pub fn vhdl_bit_vector_form(id: TypeId, registry: &TypeRegistry) -> Option<String> {
    let width = bit_width(id, registry)?;
    Some(if width <= 1 {
        "std_logic".to_string()
    } else {
        format!("std_logic_vector({} downto 0)", width - 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_converts_up_the_whole_lattice() {
        let reg = TypeRegistry::new();
        assert!(can_convert(TypeId::BOOL, TypeId::BIT, &reg));
        assert!(can_convert(TypeId::BOOL, TypeId::INT, &reg));
        assert!(can_convert(TypeId::BOOL, TypeId::FLOAT, &reg));
        assert!(!can_convert(TypeId::INT, TypeId::BOOL, &reg));
    }

    #[test]
    fn apint_converts_only_to_wider_same_sign() {
        let mut reg = TypeRegistry::new();
        let a8 = reg.intern_apint(true, 8);
        let a16 = reg.intern_apint(true, 16);
        let u8_ = reg.intern_apint(false, 8);
        assert!(can_convert(a8, a16, &reg));
        assert!(!can_convert(a16, a8, &reg));
        // different sign families aren't ordered by can_convert since both are
        // ApInt(width) rungs; widths equal so neither direction holds.
        assert!(!can_convert(a8, u8_, &reg));
    }

    #[test]
    fn common_type_picks_lub() {
        let mut reg = TypeRegistry::new();
        assert_eq!(
            common_type(TypeId::BOOL, TypeId::INT, &mut reg),
            Some(TypeId::INT)
        );
        assert_eq!(
            common_type(TypeId::INT, TypeId::FLOAT, &mut reg),
            Some(TypeId::FLOAT)
        );
    }

    #[test]
    fn common_type_of_incompatible_apint_signs_is_none() {
        let mut reg = TypeRegistry::new();
        let s = reg.intern_apint(true, 8);
        let u = reg.intern_apint(false, 8);
        assert_eq!(common_type(s, u, &mut reg), None);
    }

    #[test]
    fn bit_width_rules() {
        let mut reg = TypeRegistry::new();
        assert_eq!(bit_width(TypeId::BOOL, &reg), Some(1));
        assert_eq!(bit_width(TypeId::INT, &reg), Some(32));
        assert_eq!(bit_width(TypeId::FLOAT, &reg), Some(32));
        let a7 = reg.intern_apint(true, 7);
        assert_eq!(bit_width(a7, &reg), Some(7));
        let arr = reg.intern_array(TypeId::INT, 4);
        assert_eq!(bit_width(arr, &reg), Some(128));
    }

    #[test]
    fn struct_width_sums_fields() {
        let mut reg = TypeRegistry::new();
        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), TypeId::INT);
        fields.insert("y".to_string(), TypeId::BOOL);
        let s = reg.intern_struct("Point", fields);
        assert_eq!(bit_width(s, &reg), Some(33));
    }

    #[test]
    fn contains_float_recurses_through_arrays() {
        let mut reg = TypeRegistry::new();
        let arr = reg.intern_array(TypeId::FLOAT, 3);
        assert!(contains_float(arr, &reg));
        assert!(!contains_float(TypeId::INT, &reg));
    }

    #[test]
    fn vhdl_form_single_bit_vs_vector() {
        let reg = TypeRegistry::new();
        assert_eq!(vhdl_bit_vector_form(TypeId::BOOL, &reg).unwrap(), "std_logic");
        assert_eq!(
            vhdl_bit_vector_form(TypeId::INT, &reg).unwrap(),
            "std_logic_vector(31 downto 0)"
        );
    }

    #[test]
    fn vhdl_bit_vector_forms_across_widths() {
        let mut reg = TypeRegistry::new();
        let a3 = reg.intern_apint(true, 3);
        let a12 = reg.intern_apint(false, 12);
        let arr = reg.intern_array(TypeId::BOOL, 5);
        let forms: Vec<String> = [TypeId::BOOL, TypeId::BIT, TypeId::INT, TypeId::FLOAT, a3, a12, arr]
            .into_iter()
            .map(|t| vhdl_bit_vector_form(t, &reg).unwrap())
            .collect();
        assert_eq!(
            forms,
            vec![
                "std_logic".to_string(),
                "std_logic".to_string(),
                "std_logic_vector(31 downto 0)".to_string(),
                "std_logic_vector(31 downto 0)".to_string(),
                "std_logic_vector(2 downto 0)".to_string(),
                "std_logic_vector(11 downto 0)".to_string(),
                "std_logic_vector(4 downto 0)".to_string(),
            ]
        );
    }

    proptest::proptest! {
        /// `common_type` is symmetric for any two same-signedness `APInt`
        /// widths: the LUB shouldn't depend on argument order.
        #[test]
        fn common_type_of_apints_is_symmetric(w1 in 2u32..=128, w2 in 2u32..=128, signed in proptest::bool::ANY) {
            let mut reg = TypeRegistry::new();
            let a = reg.intern_apint(signed, w1);
            let b = reg.intern_apint(signed, w2);
            let ab = common_type(a, b, &mut reg);
            let ba = common_type(b, a, &mut reg);
            prop_assert_eq!(ab, ba);
            prop_assert_eq!(bit_width(ab.unwrap(), &reg), Some(w1.max(w2)));
        }

        /// Widening an `APInt` to itself or to a wider same-signed `APInt`
        /// always converts; narrowing never does.
        #[test]
        fn apint_widening_is_monotone(w1 in 2u32..=128, w2 in 2u32..=128, signed in proptest::bool::ANY) {
            let mut reg = TypeRegistry::new();
            let a = reg.intern_apint(signed, w1);
            let b = reg.intern_apint(signed, w2);
            prop_assert_eq!(can_convert(a, b, &reg), w1 <= w2);
        }
    }
}
