//! Symbolic pop/push counting for work-block rate validation (spec §4.2:
//! "`pop()` is allowed up to pop_rate times per work iteration (checked by
//! symbolic count -- if the count is bounded by a statically unrollable
//! loop, use its bound; otherwise warn)").
//!
//! This is a static approximation, not a full abstract interpreter: straight
//! line code counts exactly, an `if`/`else` counts exactly when both
//! branches agree, and a `for` loop counts exactly only when its trip count
//! folds to a constant. Anything else degrades to a lower bound and the
//! caller is expected to emit a warning rather than an error.

use dataflow_core::ast::{ExprKind, SourceProgram, StmtKind};
use dataflow_core::id::StmtId;

use crate::const_eval::{self, ConstEnv};

/// Result of symbolically counting occurrences of a primitive (`pop()` or a
/// `push` statement) within a statement list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCount {
    /// A sound lower bound on how many times the primitive executes.
    pub min: u32,
    /// `true` iff `min` is also an exact count (every control-flow path
    /// taken executes the primitive exactly `min` times).
    pub exact: bool,
}

impl RateCount {
    const ZERO: RateCount = RateCount { min: 0, exact: true };

    fn add(self, other: RateCount) -> RateCount {
        RateCount {
            min: self.min + other.min,
            exact: self.exact && other.exact,
        }
    }

    fn scale(self, n: u32) -> RateCount {
        RateCount {
            min: self.min.saturating_mul(n),
            exact: self.exact,
        }
    }

    fn inexact(min: u32) -> RateCount {
        RateCount { min, exact: false }
    }
}

fn count_expr_pops(program: &SourceProgram, expr: dataflow_core::id::ExprId) -> u32 {
    match &program.expr(expr).kind {
        ExprKind::Pop => 1,
        ExprKind::Peek { index } => count_expr_pops(program, *index),
        ExprKind::Index { base, index } => {
            count_expr_pops(program, *base) + count_expr_pops(program, *index)
        }
        ExprKind::Unary { operand, .. } => count_expr_pops(program, *operand),
        ExprKind::Binary { lhs, rhs, .. }
        | ExprKind::Relational { lhs, rhs, .. }
        | ExprKind::Logical { lhs, rhs, .. }
        | ExprKind::Comma { lhs, rhs } => {
            count_expr_pops(program, *lhs) + count_expr_pops(program, *rhs)
        }
        ExprKind::Assign { target, value, .. } => {
            count_expr_pops(program, *target) + count_expr_pops(program, *value)
        }
        ExprKind::Call { args, .. } => args.iter().map(|a| count_expr_pops(program, *a)).sum(),
        ExprKind::Cast { operand, .. } => count_expr_pops(program, *operand),
        ExprKind::InitList { elements } => {
            elements.iter().map(|e| count_expr_pops(program, *e)).sum()
        }
        ExprKind::IntLiteral(_)
        | ExprKind::BoolLiteral(_)
        | ExprKind::FloatLiteral(_)
        | ExprKind::Identifier { .. } => 0,
    }
}

/// Tries to fold a `for (init; cond; step)` loop's trip count to a constant,
/// assuming the canonical `for (i = lo; i < hi; i++)`-shaped counted loop.
/// Returns `None` for any other shape (unbounded, non-constant bound, or a
/// step other than `+1`/`-1`), in which case the caller treats the loop's
/// body count as a lower bound only.
fn try_fold_trip_count(
    program: &SourceProgram,
    env: &ConstEnv,
    init: Option<StmtId>,
    cond: Option<dataflow_core::id::ExprId>,
    step: Option<StmtId>,
) -> Option<u32> {
    let init = init?;
    let cond = cond?;
    let step = step?;

    // init must be `i = const`
    let (var, start) = match &program.stmt(init).kind {
        StmtKind::Expr(e) => match &program.expr(*e).kind {
            ExprKind::Assign {
                op: dataflow_core::ast::AssignOp::Assign,
                target,
                value,
            } => {
                let ExprKind::Identifier { decl: Some(d), .. } = &program.expr(*target).kind
                else {
                    return None;
                };
                (*d, const_eval::eval_const(program, env, *value)?.as_int()?)
            }
            _ => return None,
        },
        _ => return None,
    };

    // cond must be `i < const` or `i <= const`
    let ExprKind::Relational { op, lhs, rhs } = &program.expr(cond).kind else {
        return None;
    };
    let ExprKind::Identifier { decl: Some(cond_var), .. } = &program.expr(*lhs).kind else {
        return None;
    };
    if *cond_var != var {
        return None;
    }
    let bound = const_eval::eval_const(program, env, *rhs)?.as_int()?;
    let end_exclusive = match op {
        dataflow_core::ast::RelOp::Lt => bound,
        dataflow_core::ast::RelOp::Le => bound + 1,
        _ => return None,
    };

    // step must be `i++`/`i += 1`
    let is_unit_increment = match &program.stmt(step).kind {
        StmtKind::Expr(e) => match &program.expr(*e).kind {
            ExprKind::Unary {
                op: dataflow_core::ast::UnaryOp::PostInc | dataflow_core::ast::UnaryOp::PreInc,
                operand,
            } => matches!(
                &program.expr(*operand).kind,
                ExprKind::Identifier { decl: Some(d), .. } if *d == var
            ),
            _ => false,
        },
        _ => false,
    };
    if !is_unit_increment || end_exclusive <= start {
        return None;
    }
    Some((end_exclusive - start) as u32)
}

fn count_stmt(program: &SourceProgram, env: &ConstEnv, stmt: StmtId, is_pop: bool) -> RateCount {
    match &program.stmt(stmt).kind {
        StmtKind::Push(expr) => {
            if is_pop {
                RateCount { min: count_expr_pops(program, *expr), exact: true }
            } else {
                RateCount { min: 1, exact: true }
            }
        }
        StmtKind::Expr(e) | StmtKind::Return(Some(e)) => RateCount {
            min: if is_pop { count_expr_pops(program, *e) } else { 0 },
            exact: true,
        },
        StmtKind::VarDecl(_) | StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue => {
            RateCount::ZERO
        }
        StmtKind::Add { args, .. } => RateCount {
            min: if is_pop {
                args.iter().map(|a| count_expr_pops(program, *a)).sum()
            } else {
                0
            },
            exact: true,
        },
        StmtKind::Split(_) | StmtKind::Join(_) => RateCount::ZERO,
        StmtKind::If { cond, then_branch, else_branch } => {
            let cond_count = RateCount {
                min: if is_pop { count_expr_pops(program, *cond) } else { 0 },
                exact: true,
            };
            let then_count = count_block(program, env, then_branch, is_pop);
            let else_count = count_block(program, env, else_branch, is_pop);
            let branch_count = if then_count == else_count {
                then_count
            } else {
                RateCount::inexact(then_count.min.min(else_count.min))
            };
            cond_count.add(branch_count)
        }
        StmtKind::For { init, cond, step, body } => {
            let body_count = count_block(program, env, body, is_pop);
            match try_fold_trip_count(program, env, *init, *cond, *step) {
                Some(trips) if body_count.exact => body_count.scale(trips),
                Some(trips) => RateCount::inexact(body_count.min.saturating_mul(trips)),
                None => RateCount::inexact(body_count.min),
            }
        }
    }
}

fn count_block(program: &SourceProgram, env: &ConstEnv, stmts: &[StmtId], is_pop: bool) -> RateCount {
    stmts
        .iter()
        .map(|s| count_stmt(program, env, *s, is_pop))
        .fold(RateCount::ZERO, RateCount::add)
}

/// Counts `pop()` occurrences (including inside `peek`-less expressions)
/// across `stmts`.
pub fn count_pops(program: &SourceProgram, env: &ConstEnv, stmts: &[StmtId]) -> RateCount {
    count_block(program, env, stmts, true)
}

/// Counts `push(...)` statements across `stmts`.
pub fn count_pushes(program: &SourceProgram, env: &ConstEnv, stmts: &[StmtId]) -> RateCount {
    count_block(program, env, stmts, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_core::ast::{Expression, SourceProgram, Statement};
    use dataflow_core::span::Span;
    use dataflow_core::type_registry::TypeRegistry;

    fn push_expr(p: &mut SourceProgram, kind: ExprKind) -> dataflow_core::id::ExprId {
        p.push_expr(Expression { span: Span::synthetic(), resolved_type: None, kind })
    }
    fn push_stmt(p: &mut SourceProgram, kind: StmtKind) -> StmtId {
        p.push_stmt(Statement { span: Span::synthetic(), kind })
    }

    #[test]
    fn straight_line_push_count_is_exact() {
        let mut p = SourceProgram::new(TypeRegistry::new());
        let lit = push_expr(&mut p, ExprKind::IntLiteral(1));
        let s1 = push_stmt(&mut p, StmtKind::Push(lit));
        let s2 = push_stmt(&mut p, StmtKind::Push(lit));
        let env = ConstEnv::new();
        let count = count_pushes(&p, &env, &[s1, s2]);
        assert_eq!(count, RateCount { min: 2, exact: true });
    }

    #[test]
    fn pop_inside_expression_is_counted() {
        let mut p = SourceProgram::new(TypeRegistry::new());
        let pop_expr = push_expr(&mut p, ExprKind::Pop);
        let s = push_stmt(&mut p, StmtKind::Expr(pop_expr));
        let env = ConstEnv::new();
        assert_eq!(count_pops(&p, &env, &[s]), RateCount { min: 1, exact: true });
    }

    #[test]
    fn foldable_for_loop_multiplies_body_count() {
        let mut p = SourceProgram::new(TypeRegistry::new());
        use dataflow_core::ast::{AssignOp, Declaration, DeclarationKind, RelOp, UnaryOp};
        use dataflow_core::type_registry::TypeId;
        let i_decl = p.push_decl(Declaration {
            name: "i".into(),
            span: Span::synthetic(),
            ty: TypeId::INT,
            constant: false,
            kind: DeclarationKind::Variable,
            initializer: None,
            array_length_expr: None,
        });
        let i_ident = || ExprKind::Identifier { name: "i".into(), decl: Some(i_decl) };
        let zero = push_expr(&mut p, ExprKind::IntLiteral(0));
        let four = push_expr(&mut p, ExprKind::IntLiteral(4));
        let i_expr_target = push_expr(&mut p, i_ident());
        let init_assign = push_expr(
            &mut p,
            ExprKind::Assign { op: AssignOp::Assign, target: i_expr_target, value: zero },
        );
        let init = push_stmt(&mut p, StmtKind::Expr(init_assign));
        let i_expr_cond = push_expr(&mut p, i_ident());
        let cond = push_expr(
            &mut p,
            ExprKind::Relational { op: RelOp::Lt, lhs: i_expr_cond, rhs: four },
        );
        let i_expr_step = push_expr(&mut p, i_ident());
        let step_expr = push_expr(
            &mut p,
            ExprKind::Unary { op: UnaryOp::PostInc, operand: i_expr_step },
        );
        let step = push_stmt(&mut p, StmtKind::Expr(step_expr));
        let pop_expr = push_expr(&mut p, ExprKind::Pop);
        let body_stmt = push_stmt(&mut p, StmtKind::Expr(pop_expr));
        let for_stmt = push_stmt(
            &mut p,
            StmtKind::For {
                init: Some(init),
                cond: Some(cond),
                step: Some(step),
                body: vec![body_stmt],
            },
        );
        let env = ConstEnv::new();
        let count = count_pops(&p, &env, &[for_stmt]);
        assert_eq!(count, RateCount { min: 4, exact: true });
    }

    #[test]
    fn non_foldable_loop_is_inexact() {
        let mut p = SourceProgram::new(TypeRegistry::new());
        let pop_expr = push_expr(&mut p, ExprKind::Pop);
        let body_stmt = push_stmt(&mut p, StmtKind::Expr(pop_expr));
        let for_stmt = push_stmt(
            &mut p,
            StmtKind::For { init: None, cond: None, step: None, body: vec![body_stmt] },
        );
        let env = ConstEnv::new();
        let count = count_pops(&p, &env, &[for_stmt]);
        assert!(!count.exact);
    }

    proptest::proptest! {
        /// Scaling by 1 is a no-op, and scaling never turns an inexact count
        /// exact or changes its exactness flag.
        #[test]
        fn scale_by_one_is_identity(min in 0u32..1_000, exact in proptest::bool::ANY) {
            let c = RateCount { min, exact };
            prop_assert_eq!(c.scale(1), c);
        }

        /// `add` is commutative and sums the `min` fields.
        #[test]
        fn add_is_commutative_and_sums_mins(m1 in 0u32..1_000, m2 in 0u32..1_000, e1 in proptest::bool::ANY, e2 in proptest::bool::ANY) {
            let a = RateCount { min: m1, exact: e1 };
            let b = RateCount { min: m2, exact: e2 };
            prop_assert_eq!(a.add(b), b.add(a));
            prop_assert_eq!(a.add(b).min, m1 + m2);
        }
    }
}
