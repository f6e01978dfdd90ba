//! Pre-registered built-in functions (spec §4.2: "Built-in functions
//! (`println`, math intrinsics) are pre-registered").
//!
//! Each built-in is overloaded per scalar type the same way a user function
//! could be, so [`crate::overload`] doesn't need to special-case them: a
//! built-in is just a [`dataflow_core::ast::FunctionDecl`] with
//! `builtin = true` and no body, registered before the program's own
//! declarations are analysed.

use dataflow_core::ast::{Declaration, DeclarationKind, FunctionDecl, SourceProgram};
use dataflow_core::id::{DeclId, FunctionId};
use dataflow_core::span::Span;
use dataflow_core::type_registry::TypeId;

/// One built-in overload: name, parameter types, return type.
struct BuiltinSig {
    name: &'static str,
    params: &'static [TypeId],
    return_type: TypeId,
}

fn signatures() -> Vec<BuiltinSig> {
    const INT: TypeId = TypeId::INT;
    const FLOAT: TypeId = TypeId::FLOAT;
    const VOID: TypeId = TypeId::VOID;

    vec![
        // println is overloaded per scalar type it can print.
        BuiltinSig { name: "println", params: &[INT], return_type: VOID },
        BuiltinSig { name: "println", params: &[FLOAT], return_type: VOID },
        BuiltinSig { name: "println", params: &[TypeId::BOOL], return_type: VOID },
        // integer math intrinsics
        BuiltinSig { name: "abs", params: &[INT], return_type: INT },
        BuiltinSig { name: "min", params: &[INT, INT], return_type: INT },
        BuiltinSig { name: "max", params: &[INT, INT], return_type: INT },
        // float math intrinsics
        BuiltinSig { name: "abs", params: &[FLOAT], return_type: FLOAT },
        BuiltinSig { name: "min", params: &[FLOAT, FLOAT], return_type: FLOAT },
        BuiltinSig { name: "max", params: &[FLOAT, FLOAT], return_type: FLOAT },
        BuiltinSig { name: "sin", params: &[FLOAT], return_type: FLOAT },
        BuiltinSig { name: "cos", params: &[FLOAT], return_type: FLOAT },
        BuiltinSig { name: "sqrt", params: &[FLOAT], return_type: FLOAT },
    ]
}

/// Registers every built-in overload as a [`Declaration`] in `program`,
/// returning `(name, DeclId)` pairs so the caller can seed the function
/// table `overload::FunctionTable` used during call resolution.
pub fn register(program: &mut SourceProgram) -> Vec<(String, DeclId)> {
    let mut out = Vec::new();
    for (index, sig) in signatures().into_iter().enumerate() {
        let params = sig
            .params
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                program.push_decl(Declaration {
                    name: format!("arg{i}"),
                    span: Span::synthetic(),
                    ty: *ty,
                    constant: false,
                    kind: DeclarationKind::Parameter,
                    initializer: None,
                    array_length_expr: None,
                })
            })
            .collect();
        let decl = program.push_decl(Declaration {
            name: sig.name.to_string(),
            span: Span::synthetic(),
            ty: sig.return_type,
            constant: true,
            kind: DeclarationKind::Function(FunctionDecl {
                id: FunctionId(index as u32),
                params,
                return_type: sig.return_type,
                body: None,
                builtin: true,
            }),
        });
        out.push((sig.name.to_string(), decl));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_core::type_registry::TypeRegistry;

    #[test]
    fn registers_every_builtin_overload() {
        let mut program = SourceProgram::new(TypeRegistry::new());
        let registered = register(&mut program);
        assert_eq!(registered.len(), signatures().len());
        let println_overloads = registered.iter().filter(|(n, _)| n == "println").count();
        assert_eq!(println_overloads, 3);
    }

    #[test]
    fn builtin_declarations_have_no_body() {
        let mut program = SourceProgram::new(TypeRegistry::new());
        let registered = register(&mut program);
        let (_, id) = registered.iter().find(|(n, _)| n == "sqrt").unwrap();
        match &program.decl(*id).kind {
            DeclarationKind::Function(f) => {
                assert!(f.builtin);
                assert!(f.body.is_none());
            }
            _ => panic!("expected Function declaration"),
        }
    }
}
