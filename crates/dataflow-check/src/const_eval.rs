//! Constant folding (spec §4.2 "Constant folding").
//!
//! Integer/boolean/float expressions whose operands are compile-time
//! constants fold eagerly. Used to resolve array sizes and work-block
//! rates, and reused by `dataflow-graph` to evaluate filter-instantiation
//! arguments (spec §4.4).

use std::collections::HashMap;

use dataflow_core::ast::{BinaryOp, ExprKind, LogicalOp, RelOp, SourceProgram, UnaryOp};
use dataflow_core::id::{DeclId, ExprId};
use dataflow_core::type_registry::TypeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Int(i64),
    Bool(bool),
    Float(f64),
}

impl ConstValue {
    pub fn as_int(self) -> Option<i64> {
        match self {
            ConstValue::Int(v) => Some(v),
            ConstValue::Bool(b) => Some(b as i64),
            ConstValue::Float(_) => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            ConstValue::Bool(b) => Some(b),
            ConstValue::Int(v) => Some(v != 0),
            ConstValue::Float(_) => None,
        }
    }

    pub fn as_float(self) -> Option<f64> {
        match self {
            ConstValue::Float(f) => Some(f),
            ConstValue::Int(v) => Some(v as f64),
            ConstValue::Bool(b) => Some(b as i64 as f64),
        }
    }
}

/// Environment of already-folded constant declarations (filter/pipeline
/// parameters bound to constant arguments, `const` locals).
pub type ConstEnv = HashMap<DeclId, ConstValue>;

/// Attempts to fold `expr` to a [`ConstValue`]. Returns `None` if any
/// sub-expression is not a compile-time constant (e.g. reads a mutable
/// variable, calls a non-const function, or `peek`/`pop`/`push`).
pub fn eval_const(program: &SourceProgram, env: &ConstEnv, expr: ExprId) -> Option<ConstValue> {
    match &program.expr(expr).kind {
        ExprKind::IntLiteral(v) => Some(ConstValue::Int(*v)),
        ExprKind::BoolLiteral(v) => Some(ConstValue::Bool(*v)),
        ExprKind::FloatLiteral(v) => Some(ConstValue::Float(*v)),
        ExprKind::Identifier { decl, .. } => env.get(&decl.as_ref().copied()?).copied(),
        ExprKind::Unary { op, operand } => {
            let v = eval_const(program, env, *operand)?;
            Some(match op {
                UnaryOp::Neg => match v {
                    ConstValue::Int(i) => ConstValue::Int(-i),
                    ConstValue::Float(f) => ConstValue::Float(-f),
                    ConstValue::Bool(_) => return None,
                },
                UnaryOp::LogicalNot => ConstValue::Bool(!v.as_bool()?),
                UnaryOp::BitNot => ConstValue::Int(!v.as_int()?),
                UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                    return None
                }
            })
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let l = eval_const(program, env, *lhs)?;
            let r = eval_const(program, env, *rhs)?;
            eval_binary(*op, l, r)
        }
        ExprKind::Relational { op, lhs, rhs } => {
            let l = eval_const(program, env, *lhs)?;
            let r = eval_const(program, env, *rhs)?;
            eval_relational(*op, l, r)
        }
        ExprKind::Logical { op, lhs, rhs } => {
            let l = eval_const(program, env, *lhs)?.as_bool()?;
            match op {
                LogicalOp::And if !l => Some(ConstValue::Bool(false)),
                LogicalOp::Or if l => Some(ConstValue::Bool(true)),
                _ => {
                    let r = eval_const(program, env, *rhs)?.as_bool()?;
                    Some(ConstValue::Bool(r))
                }
            }
        }
        ExprKind::Cast { target_type, operand } => {
            let v = eval_const(program, env, *operand)?;
            cast_const(v, *target_type)
        }
        _ => None,
    }
}

fn eval_binary(op: BinaryOp, l: ConstValue, r: ConstValue) -> Option<ConstValue> {
    if matches!(l, ConstValue::Float(_)) || matches!(r, ConstValue::Float(_)) {
        let (a, b) = (l.as_float()?, r.as_float()?);
        return Some(ConstValue::Float(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            _ => return None,
        }));
    }
    let (a, b) = (l.as_int()?, r.as_int()?);
    Some(ConstValue::Int(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b != 0 => a / b,
        BinaryOp::Mod if b != 0 => a % b,
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::Shl => a.wrapping_shl(b as u32),
        BinaryOp::Shr => a.wrapping_shr(b as u32),
        _ => return None,
    }))
}

fn eval_relational(op: RelOp, l: ConstValue, r: ConstValue) -> Option<ConstValue> {
    let ordering = if matches!(l, ConstValue::Float(_)) || matches!(r, ConstValue::Float(_)) {
        l.as_float()?.partial_cmp(&r.as_float()?)?
    } else {
        l.as_int()?.cmp(&r.as_int()?)
    };
    use std::cmp::Ordering::*;
    Some(ConstValue::Bool(match op {
        RelOp::Lt => ordering == Less,
        RelOp::Le => ordering != Greater,
        RelOp::Gt => ordering == Greater,
        RelOp::Ge => ordering != Less,
        RelOp::Eq => ordering == Equal,
        RelOp::Ne => ordering != Equal,
    }))
}

fn cast_const(v: ConstValue, target: TypeId) -> Option<ConstValue> {
    Some(match target {
        TypeId::FLOAT => ConstValue::Float(v.as_float()?),
        TypeId::BOOL => ConstValue::Bool(v.as_bool()?),
        _ => ConstValue::Int(v.as_int()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_core::ast::{Expression, SourceProgram};
    use dataflow_core::span::Span;
    use dataflow_core::type_registry::TypeRegistry;

    fn push(p: &mut SourceProgram, kind: ExprKind) -> ExprId {
        p.push_expr(Expression {
            span: Span::synthetic(),
            resolved_type: None,
            kind,
        })
    }

    #[test]
    fn folds_arithmetic() {
        let mut p = SourceProgram::new(TypeRegistry::new());
        let two = push(&mut p, ExprKind::IntLiteral(2));
        let three = push(&mut p, ExprKind::IntLiteral(3));
        let sum = push(
            &mut p,
            ExprKind::Binary { op: BinaryOp::Add, lhs: two, rhs: three },
        );
        let env = ConstEnv::new();
        assert_eq!(eval_const(&p, &env, sum), Some(ConstValue::Int(5)));
    }

    #[test]
    fn short_circuits_and() {
        let mut p = SourceProgram::new(TypeRegistry::new());
        let f = push(&mut p, ExprKind::BoolLiteral(false));
        // rhs references an undeclared identifier that would fail to fold,
        // but short-circuiting means we never evaluate it.
        let bogus = push(&mut p, ExprKind::Identifier { name: "x".into(), decl: None });
        let and = push(
            &mut p,
            ExprKind::Logical { op: LogicalOp::And, lhs: f, rhs: bogus },
        );
        let env = ConstEnv::new();
        assert_eq!(eval_const(&p, &env, and), Some(ConstValue::Bool(false)));
    }

    #[test]
    fn division_by_zero_does_not_fold() {
        let mut p = SourceProgram::new(TypeRegistry::new());
        let n = push(&mut p, ExprKind::IntLiteral(1));
        let z = push(&mut p, ExprKind::IntLiteral(0));
        let div = push(&mut p, ExprKind::Binary { op: BinaryOp::Div, lhs: n, rhs: z });
        let env = ConstEnv::new();
        assert_eq!(eval_const(&p, &env, div), None);
    }

    #[test]
    fn identifier_resolves_through_env() {
        let mut p = SourceProgram::new(TypeRegistry::new());
        let id_expr = push(&mut p, ExprKind::Identifier { name: "N".into(), decl: Some(DeclId(0)) });
        let mut env = ConstEnv::new();
        env.insert(DeclId(0), ConstValue::Int(16));
        assert_eq!(eval_const(&p, &env, id_expr), Some(ConstValue::Int(16)));
    }
}
