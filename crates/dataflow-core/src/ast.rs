//! Arena-owned AST for the streaming dataflow source language (spec §3, §6).
//!
//! Per the Design Notes (§9), this is not a pointer-linked tree: every
//! [`Expression`] and [`Statement`] lives in a flat `Vec` inside a
//! [`SourceProgram`] and is referred to by [`ExprId`]/[`StmtId`].
//! Identifiers resolve to a [`DeclId`] rather than a raw pointer to a
//! `Declaration`. The grammar-driven parser is out of scope for this crate
//! (spec §1); `SourceProgram` is the contract a parser is expected to
//! deliver.

use serde::{Deserialize, Serialize};

use crate::id::{DeclId, ExprId, FunctionId, StmtId};
use crate::span::Span;
use crate::type_registry::{TypeId, TypeRegistry};

// ---------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------

/// A named entity: source location, resolved type, `constant` flag, plus
/// kind-specific data (spec §3 "Declaration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub span: Span,
    pub ty: TypeId,
    pub constant: bool,
    pub kind: DeclarationKind,
    /// `Some(e)` for a `Variable` declared with an initializer (`int n = 0;`).
    pub initializer: Option<ExprId>,
    /// `Some(e)` for a `Variable` whose declared array length is a
    /// (possibly parameter-dependent) expression rather than a literal
    /// baked directly into `ty`'s interned `Array` length -- e.g. a filter
    /// body declaring `int[N] buf;` where `N` is a filter parameter. `ty`
    /// holds a placeholder until this folds to a constant during analysis;
    /// see spec §4.2 `NonConstantArraySize`.
    pub array_length_expr: Option<ExprId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeclarationKind {
    Variable,
    Parameter,
    Filter(FilterDecl),
    Pipeline(CompositionDecl),
    SplitJoin(CompositionDecl),
    Function(FunctionDecl),
}

/// `T1 -> T2 [stateful] filter NAME(params) { vars; init{}? prework{}? work P {} }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterDecl {
    pub input_type: TypeId,
    pub output_type: TypeId,
    pub stateful: bool,
    pub params: Vec<DeclId>,
    /// Filter-scope variables, persistent across `work` invocations iff
    /// `stateful`.
    pub fields: Vec<DeclId>,
    pub init: Option<WorkBlock>,
    pub prework: Option<WorkBlock>,
    pub work: WorkBlock,
}

/// Shared shape of `pipeline` and `splitjoin` declarations: both are a
/// parameterised `T1 -> T2` stream composition whose body is a statement
/// list of `add` / `split` / `join` statements (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionDecl {
    pub input_type: TypeId,
    pub output_type: TypeId,
    pub params: Vec<DeclId>,
    pub body: Vec<StmtId>,
}

/// A user function or one of the pre-registered built-ins (`println`,
/// `abs`/`min`/`max`, `sin`/`cos`/`sqrt`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub id: FunctionId,
    pub params: Vec<DeclId>,
    pub return_type: TypeId,
    /// `None` for built-ins, which have no lowerable body.
    pub body: Option<Vec<StmtId>>,
    pub builtin: bool,
}

/// A constant-expression rate clause (`peek N` / `pop N` / `push N`).
/// `resolved` is `None` until constant folding (spec §4.2) determines its
/// value; mirrors the `resolved_type` pattern on [`Expression`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateClause {
    pub expr: ExprId,
    pub resolved: Option<u32>,
}

/// `(peek_rate, pop_rate, push_rate)` plus a statement list (spec §3).
/// Invariant: once resolved, `peek_rate >= pop_rate` when both are present.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkBlock {
    pub peek: Option<RateClause>,
    pub pop: Option<RateClause>,
    pub push: Option<RateClause>,
    pub body: Vec<StmtId>,
}

impl WorkBlock {
    pub fn peek_rate(&self) -> Option<u32> {
        self.peek.as_ref().and_then(|r| r.resolved)
    }

    pub fn pop_rate(&self) -> Option<u32> {
        self.pop.as_ref().and_then(|r| r.resolved)
    }

    pub fn push_rate(&self) -> Option<u32> {
        self.push.as_ref().and_then(|r| r.resolved)
    }
}

// ---------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------

/// Carries a source location and a resolved type, `None` until semantic
/// analysis succeeds (spec §3 "Expression").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    pub span: Span,
    pub resolved_type: Option<TypeId>,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
    Neg,
    LogicalNot,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShlAssign,
    ShrAssign,
}

impl AssignOp {
    /// The binary operator a compound assignment desugars to, or `None`
    /// for plain `=`.
    pub fn as_binary_op(self) -> Option<BinaryOp> {
        Some(match self {
            AssignOp::Assign => return None,
            AssignOp::AddAssign => BinaryOp::Add,
            AssignOp::SubAssign => BinaryOp::Sub,
            AssignOp::MulAssign => BinaryOp::Mul,
            AssignOp::DivAssign => BinaryOp::Div,
            AssignOp::ModAssign => BinaryOp::Mod,
            AssignOp::AndAssign => BinaryOp::BitAnd,
            AssignOp::OrAssign => BinaryOp::BitOr,
            AssignOp::XorAssign => BinaryOp::BitXor,
            AssignOp::ShlAssign => BinaryOp::Shl,
            AssignOp::ShrAssign => BinaryOp::Shr,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    IntLiteral(i64),
    BoolLiteral(bool),
    FloatLiteral(f64),
    /// Resolves to a [`DeclId`] during semantic analysis; `None` beforehand.
    Identifier { name: String, decl: Option<DeclId> },
    Index { base: ExprId, index: ExprId },
    Unary { op: UnaryOp, operand: ExprId },
    Binary { op: BinaryOp, lhs: ExprId, rhs: ExprId },
    Relational { op: RelOp, lhs: ExprId, rhs: ExprId },
    Logical { op: LogicalOp, lhs: ExprId, rhs: ExprId },
    Comma { lhs: ExprId, rhs: ExprId },
    Assign { op: AssignOp, target: ExprId, value: ExprId },
    Peek { index: ExprId },
    Pop,
    /// Resolved to a specific overload (`function`) by §4.2's overload
    /// resolution; `None` beforehand.
    Call {
        name: String,
        function: Option<FunctionId>,
        args: Vec<ExprId>,
    },
    Cast { target_type: TypeId, operand: ExprId },
    InitList { elements: Vec<ExprId> },
}

// ---------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SplitPolicy {
    Duplicate,
    /// `None` = weights omitted, defaults to all-ones sized to the branch
    /// count once the splitjoin's children are known (spec §4.4).
    RoundRobin(Option<Vec<u32>>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinPolicy {
    pub weights: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    Expr(ExprId),
    VarDecl(DeclId),
    Push(ExprId),
    /// `add <stream>(args...)`, resolved to the callee stream declaration.
    Add {
        name: String,
        decl: Option<DeclId>,
        args: Vec<ExprId>,
    },
    Split(SplitPolicy),
    Join(JoinPolicy),
    If {
        cond: ExprId,
        then_branch: Vec<StmtId>,
        else_branch: Vec<StmtId>,
    },
    For {
        init: Option<StmtId>,
        cond: Option<ExprId>,
        step: Option<StmtId>,
        body: Vec<StmtId>,
    },
    Break,
    Continue,
    Return(Option<ExprId>),
}

// ---------------------------------------------------------------------
// Program arena
// ---------------------------------------------------------------------

/// The arena owning every `Expression`, `Statement`, and `Declaration` in a
/// compilation unit, plus the shared [`TypeRegistry`]. This is what a
/// parser is assumed to deliver (spec §1); `dataflow-check` mutates it in
/// place to fill in resolved types and declaration links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProgram {
    pub types: TypeRegistry,
    exprs: Vec<Expression>,
    stmts: Vec<Statement>,
    decls: Vec<Declaration>,
    /// Top-level stream declarations (pipeline / splitjoin / filter),
    /// in source order.
    pub top_level: Vec<DeclId>,
}

impl SourceProgram {
    pub fn new(types: TypeRegistry) -> Self {
        SourceProgram {
            types,
            exprs: Vec::new(),
            stmts: Vec::new(),
            decls: Vec::new(),
            top_level: Vec::new(),
        }
    }

    pub fn push_expr(&mut self, expr: Expression) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn push_stmt(&mut self, stmt: Statement) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    pub fn push_decl(&mut self, decl: Declaration) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(decl);
        id
    }

    pub fn expr(&self, id: ExprId) -> &Expression {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expression {
        &mut self.exprs[id.index()]
    }

    pub fn stmt(&self, id: StmtId) -> &Statement {
        &self.stmts[id.index()]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Statement {
        &mut self.stmts[id.index()]
    }

    pub fn decl(&self, id: DeclId) -> &Declaration {
        &self.decls[id.index()]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Declaration {
        &mut self.decls[id.index()]
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn decl_count(&self) -> usize {
        self.decls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> SourceProgram {
        SourceProgram::new(TypeRegistry::new())
    }

    #[test]
    fn push_and_index_round_trips() {
        let mut p = program();
        let e = p.push_expr(Expression {
            span: Span::synthetic(),
            resolved_type: None,
            kind: ExprKind::IntLiteral(7),
        });
        assert!(matches!(p.expr(e).kind, ExprKind::IntLiteral(7)));
        assert_eq!(p.expr_count(), 1);
    }

    #[test]
    fn ids_are_assigned_in_insertion_order() {
        let mut p = program();
        let a = p.push_decl(Declaration {
            name: "a".into(),
            span: Span::synthetic(),
            ty: TypeId::INT,
            constant: false,
            kind: DeclarationKind::Variable,
            initializer: None,
            array_length_expr: None,
        });
        let b = p.push_decl(Declaration {
            name: "b".into(),
            span: Span::synthetic(),
            ty: TypeId::INT,
            constant: false,
            kind: DeclarationKind::Variable,
            initializer: None,
            array_length_expr: None,
        });
        assert_eq!(a.0 + 1, b.0);
        assert_eq!(p.decl_count(), 2);
    }

    #[test]
    fn compound_assign_desugars_to_binary_op() {
        assert_eq!(AssignOp::Assign.as_binary_op(), None);
        assert_eq!(AssignOp::AddAssign.as_binary_op(), Some(BinaryOp::Add));
        assert_eq!(AssignOp::ShrAssign.as_binary_op(), Some(BinaryOp::Shr));
    }

    #[test]
    fn work_block_rate_accessors() {
        let mut wb = WorkBlock::default();
        assert_eq!(wb.push_rate(), None);
        wb.push = Some(RateClause {
            expr: ExprId(0),
            resolved: Some(8),
        });
        assert_eq!(wb.push_rate(), Some(8));
    }

    #[test]
    fn mutating_a_decl_through_mut_accessor_persists() {
        let mut p = program();
        let d = p.push_decl(Declaration {
            name: "x".into(),
            span: Span::synthetic(),
            ty: TypeId::VOID,
            constant: false,
            kind: DeclarationKind::Variable,
            initializer: None,
            array_length_expr: None,
        });
        p.decl_mut(d).ty = TypeId::INT;
        assert_eq!(p.decl(d).ty, TypeId::INT);
    }
}
