//! Entry point for the semantic analyser (component C2, spec §4.2).
//!
//! [`analyze`] walks a [`SourceProgram`] exactly once: it resolves every
//! identifier and call to a [`DeclId`]/[`FunctionId`], assigns a resolved
//! [`TypeId`] to every expression, validates work-block rates, and folds
//! compile-time constants. It never stops at the first problem within a
//! declaration -- every statement is its own resync point, so one run
//! surfaces every independent mistake in a filter body.

use std::collections::HashMap;

use dataflow_core::ast::{
    AssignOp, BinaryOp, CompositionDecl, DeclarationKind, ExprKind, FilterDecl, LogicalOp, RelOp,
    SourceProgram, SplitPolicy, StmtKind, UnaryOp, WorkBlock,
};
use dataflow_core::id::{DeclId, ExprId, StmtId};
use dataflow_core::type_registry::TypeId;
use dataflow_core::types;

use crate::builtins;
use crate::const_eval::{self, ConstEnv, ConstValue};
use crate::diagnostics::{reject_and_record, Diagnostic, DiagnosticKind, Rejected, Report, TypeResult};
use crate::overload::{self, FunctionTable, Resolution};
use crate::rate_count;
use crate::scope::ScopeStack;

/// Per-filter context threaded through statement/expression analysis:
/// the element types `peek`/`pop`/`push` operate on, whether the filter may
/// retain state across invocations, and which declarations are its
/// persistent fields (so writes to them from a stateless filter can be
/// rejected).
#[derive(Clone, Copy)]
struct FilterCtx<'a> {
    input_type: TypeId,
    output_type: TypeId,
    stateful: bool,
    fields: &'a [DeclId],
    peek_rate: Option<u32>,
}

/// Top-level analysis state: accumulated diagnostics, the function table used
/// by overload resolution (§4.2), and the stream-declaration table used to
/// resolve `add <stream>(args...)` (spec §6/§4.4).
struct Analyzer {
    report: Report,
    functions: FunctionTable,
    streams: HashMap<String, DeclId>,
}

/// Runs semantic analysis over `program`, mutating it in place to fill in
/// resolved types and declaration links. Returns `Ok(())` if no diagnostic
/// was raised, otherwise the accumulated [`Report`].
pub fn analyze(program: &mut SourceProgram) -> Result<(), Report> {
    let mut az = Analyzer {
        report: Report::new(),
        functions: FunctionTable::new(),
        streams: HashMap::new(),
    };

    for (name, decl) in builtins::register(program) {
        overload::insert(&mut az.functions, &name, decl);
    }

    // Pre-pass: register every user function and stream declaration by name
    // before analysing any body, so forward references and recursive calls
    // to declarations appearing later in source order still resolve.
    for id in all_decl_ids(program) {
        match &program.decl(id).kind {
            // Builtins are already registered above; re-adding them here
            // would duplicate every builtin candidate and make ordinary
            // builtin calls spuriously ambiguous.
            DeclarationKind::Function(f) if !f.builtin => {
                let name = program.decl(id).name.clone();
                overload::insert(&mut az.functions, &name, id);
            }
            DeclarationKind::Filter(_) | DeclarationKind::Pipeline(_) | DeclarationKind::SplitJoin(_) => {
                let name = program.decl(id).name.clone();
                az.streams.insert(name, id);
            }
            _ => {}
        }
    }

    let top_level: Vec<DeclId> = program.top_level.clone();
    for id in top_level {
        az.analyze_top_level(program, id);
    }

    if az.report.is_empty() {
        Ok(())
    } else {
        Err(az.report)
    }
}

/// Every declaration index currently in the arena, in insertion order. Used
/// for the pre-registration pass since `top_level` only lists stream
/// declarations, not the user functions nested inside (or alongside) them.
fn all_decl_ids(program: &SourceProgram) -> Vec<DeclId> {
    (0..program.decl_count() as u32).map(DeclId).collect()
}

impl Analyzer {
    fn analyze_top_level(&mut self, program: &mut SourceProgram, id: DeclId) {
        match program.decl(id).kind.clone() {
            DeclarationKind::Filter(filter) => self.analyze_filter(program, id, filter),
            DeclarationKind::Pipeline(comp) | DeclarationKind::SplitJoin(comp) => {
                self.analyze_composition(program, comp)
            }
            DeclarationKind::Function(func) => {
                if let Some(body) = func.body.clone() {
                    let mut scope = ScopeStack::new();
                    for p in &func.params {
                        self.declare(&mut scope, program, *p);
                    }
                    self.analyze_block(program, &mut scope, &ConstEnv::new(), &body, None);
                }
            }
            DeclarationKind::Variable | DeclarationKind::Parameter => {}
        }
    }

    fn declare(&mut self, scope: &mut ScopeStack, program: &SourceProgram, id: DeclId) {
        let decl = program.decl(id);
        let (name, span) = (decl.name.clone(), decl.span);
        if let Err(original) = scope.declare(&name, id, span) {
            self.report.push(Diagnostic::new(
                span,
                DiagnosticKind::Redefinition { name, original },
            ));
        }
    }

    fn analyze_filter(&mut self, program: &mut SourceProgram, filter_id: DeclId, filter: FilterDecl) {
        let mut scope = ScopeStack::new();
        for p in &filter.params {
            self.declare(&mut scope, program, *p);
        }
        for f in &filter.fields {
            self.declare(&mut scope, program, *f);
        }

        let ctx = FilterCtx {
            input_type: filter.input_type,
            output_type: filter.output_type,
            stateful: filter.stateful,
            fields: &filter.fields,
            peek_rate: None,
        };

        let mut work_blocks: Vec<(&'static str, Option<WorkBlock>)> = vec![
            ("init", filter.init.clone()),
            ("prework", filter.prework.clone()),
            ("work", Some(filter.work.clone())),
        ];

        for (label, block) in work_blocks.drain(..) {
            let Some(mut block) = block else { continue };
            self.resolve_rate_clause(program, &mut block.peek);
            self.resolve_rate_clause(program, &mut block.pop);
            self.resolve_rate_clause(program, &mut block.push);

            if let (Some(peek), Some(pop)) = (block.peek_rate(), block.pop_rate()) {
                if peek < pop {
                    self.report.push(Diagnostic::new(
                        program.decl(filter_id).span,
                        DiagnosticKind::RateMismatch {
                            reason: format!(
                                "{label}: peek rate {peek} is less than pop rate {pop}"
                            ),
                        },
                    ));
                }
            }

            let block_ctx = FilterCtx { peek_rate: block.peek_rate(), ..ctx };
            scope.push_scope();
            self.analyze_block(program, &mut scope, &ConstEnv::new(), &block.body, Some(block_ctx));
            scope.pop_scope();

            self.validate_rate_counts(program, label, &block, block_ctx);

            match &mut program.decl_mut(filter_id).kind {
                DeclarationKind::Filter(f) => match label {
                    "init" => f.init = Some(block),
                    "prework" => f.prework = Some(block),
                    "work" => f.work = block,
                    _ => unreachable!(),
                },
                _ => unreachable!("filter_id must name a Filter declaration"),
            }
        }
    }

    /// Folds a rate clause's expression against an empty constant
    /// environment. Filter-parameter-dependent rates stay unresolved here;
    /// `dataflow-graph` re-folds them per instantiation once parameter
    /// arguments are bound (spec §4.4).
    fn resolve_rate_clause(
        &mut self,
        program: &SourceProgram,
        clause: &mut Option<dataflow_core::ast::RateClause>,
    ) {
        let Some(c) = clause else { return };
        if let Some(v) = const_eval::eval_const(program, &ConstEnv::new(), c.expr).and_then(|v| v.as_int())
        {
            if v >= 0 {
                c.resolved = Some(v as u32);
            }
        }
    }

    fn validate_rate_counts(
        &mut self,
        program: &SourceProgram,
        label: &str,
        block: &WorkBlock,
        ctx: FilterCtx,
    ) {
        let env = ConstEnv::new();
        if let Some(pop_rate) = block.pop_rate() {
            let counted = rate_count::count_pops(program, &env, &block.body);
            if counted.exact && counted.min != pop_rate {
                self.report.push(Diagnostic::new(
                    dataflow_core::span::Span::synthetic(),
                    DiagnosticKind::RateMismatch {
                        reason: format!(
                            "{label}: declared pop rate {pop_rate} but body pops {} time(s)",
                            counted.min
                        ),
                    },
                ));
            } else if !counted.exact {
                tracing::warn!(
                    filter_work = label,
                    declared = pop_rate,
                    observed_min = counted.min,
                    "pop count is not statically exact; trusting the declared rate"
                );
            }
        }
        if let Some(push_rate) = block.push_rate() {
            let counted = rate_count::count_pushes(program, &env, &block.body);
            if counted.exact && counted.min != push_rate {
                self.report.push(Diagnostic::new(
                    dataflow_core::span::Span::synthetic(),
                    DiagnosticKind::RateMismatch {
                        reason: format!(
                            "{label}: declared push rate {push_rate} but body pushes {} time(s)",
                            counted.min
                        ),
                    },
                ));
            } else if !counted.exact {
                tracing::warn!(
                    filter_work = label,
                    declared = push_rate,
                    observed_min = counted.min,
                    "push count is not statically exact; trusting the declared rate"
                );
            }
        }
        let _ = ctx;
    }

    fn analyze_composition(&mut self, program: &mut SourceProgram, comp: CompositionDecl) {
        let mut scope = ScopeStack::new();
        for p in &comp.params {
            self.declare(&mut scope, program, *p);
        }
        self.analyze_block(program, &mut scope, &ConstEnv::new(), &comp.body, None);
    }

    fn analyze_block(
        &mut self,
        program: &mut SourceProgram,
        scope: &mut ScopeStack,
        env: &ConstEnv,
        stmts: &[StmtId],
        ctx: Option<FilterCtx>,
    ) {
        for &stmt in stmts {
            self.analyze_stmt(program, scope, env, stmt, ctx);
        }
    }

    fn analyze_stmt(
        &mut self,
        program: &mut SourceProgram,
        scope: &mut ScopeStack,
        env: &ConstEnv,
        stmt: StmtId,
        ctx: Option<FilterCtx>,
    ) {
        let kind = program.stmt(stmt).kind.clone();
        match kind {
            StmtKind::Expr(e) => {
                let _ = self.type_expr(program, scope, env, e, ctx);
            }
            StmtKind::VarDecl(decl_id) => self.analyze_var_decl(program, scope, env, decl_id, ctx),
            StmtKind::Push(e) => {
                let span = program.expr(e).span;
                if let Ok(ty) = self.type_expr(program, scope, env, e, ctx) {
                    if let Some(c) = ctx {
                        if !self.convertible(program, ty, c.output_type) {
                            self.report.push(Diagnostic::new(
                                span,
                                DiagnosticKind::TypeMismatch { expected: c.output_type, found: ty },
                            ));
                        }
                    }
                }
            }
            StmtKind::Add { name, args, .. } => {
                let resolved_decl = self.streams.get(&name).copied();
                let span = program.stmt(stmt).span;
                let arg_types: Vec<(ExprId, Option<TypeId>)> = args
                    .iter()
                    .map(|&a| (a, self.type_expr(program, scope, env, a, None).ok()))
                    .collect();
                match resolved_decl {
                    None => self.report.push(Diagnostic::new(
                        span,
                        DiagnosticKind::UndeclaredName { name: name.clone() },
                    )),
                    Some(decl_id) => {
                        let params = match &program.decl(decl_id).kind {
                            DeclarationKind::Filter(f) => f.params.clone(),
                            DeclarationKind::Pipeline(c) | DeclarationKind::SplitJoin(c) => {
                                c.params.clone()
                            }
                            _ => Vec::new(),
                        };
                        if params.len() != args.len() {
                            self.report.push(Diagnostic::new(
                                span,
                                DiagnosticKind::ArityMismatch {
                                    name: name.clone(),
                                    expected: params.len(),
                                    found: args.len(),
                                },
                            ));
                        }
                        for (arg_expr, arg_ty) in &arg_types {
                            if const_eval::eval_const(program, env, *arg_expr).is_none() {
                                self.report.push(Diagnostic::new(
                                    program.expr(*arg_expr).span,
                                    DiagnosticKind::NonConstantArraySize,
                                ));
                            }
                            let _ = arg_ty;
                        }
                        if let StmtKind::Add { decl, .. } = &mut program.stmt_mut(stmt).kind {
                            *decl = Some(decl_id);
                        }
                    }
                }
            }
            StmtKind::Split(SplitPolicy::RoundRobin(Some(weights)))
            | StmtKind::Join(dataflow_core::ast::JoinPolicy { weights: Some(weights) }) => {
                if weights.is_empty() {
                    self.report.push(Diagnostic::new(
                        program.stmt(stmt).span,
                        DiagnosticKind::RateMismatch {
                            reason: "round-robin weight list must not be empty".to_string(),
                        },
                    ));
                }
            }
            StmtKind::Split(_) | StmtKind::Join(_) => {}
            StmtKind::If { cond, then_branch, else_branch } => {
                self.expect_bool(program, scope, env, cond, ctx);
                scope.push_scope();
                self.analyze_block(program, scope, env, &then_branch, ctx);
                scope.pop_scope();
                scope.push_scope();
                self.analyze_block(program, scope, env, &else_branch, ctx);
                scope.pop_scope();
            }
            StmtKind::For { init, cond, step, body } => {
                scope.push_scope();
                if let Some(init) = init {
                    self.analyze_stmt(program, scope, env, init, ctx);
                }
                if let Some(cond) = cond {
                    self.expect_bool(program, scope, env, cond, ctx);
                }
                self.analyze_block(program, scope, env, &body, ctx);
                if let Some(step) = step {
                    self.analyze_stmt(program, scope, env, step, ctx);
                }
                scope.pop_scope();
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Return(Some(e)) => {
                let _ = self.type_expr(program, scope, env, e, ctx);
            }
            StmtKind::Return(None) => {}
        }
    }

    fn expect_bool(
        &mut self,
        program: &mut SourceProgram,
        scope: &mut ScopeStack,
        env: &ConstEnv,
        expr: ExprId,
        ctx: Option<FilterCtx>,
    ) {
        if let Ok(ty) = self.type_expr(program, scope, env, expr, ctx) {
            if ty != TypeId::BOOL {
                self.report.push(Diagnostic::new(
                    program.expr(expr).span,
                    DiagnosticKind::TypeMismatch { expected: TypeId::BOOL, found: ty },
                ));
            }
        }
    }

    fn analyze_var_decl(
        &mut self,
        program: &mut SourceProgram,
        scope: &mut ScopeStack,
        env: &ConstEnv,
        decl_id: DeclId,
        ctx: Option<FilterCtx>,
    ) {
        let (name, span, mut ty, array_len_expr, initializer) = {
            let d = program.decl(decl_id);
            (d.name.clone(), d.span, d.ty, d.array_length_expr, d.initializer)
        };

        if let Some(len_expr) = array_len_expr {
            match const_eval::eval_const(program, env, len_expr).and_then(|v| v.as_int()) {
                Some(n) if n > 0 => {
                    let element = match program.types.get(ty) {
                        Some(dataflow_core::types::Type::Array { element, .. }) => *element,
                        _ => ty,
                    };
                    ty = program.types.intern_array(element, n as u32);
                    program.decl_mut(decl_id).ty = ty;
                }
                _ => self.report.push(Diagnostic::new(span, DiagnosticKind::NonConstantArraySize)),
            }
        }

        if let Some(init) = initializer {
            if let Ok(init_ty) = self.type_expr(program, scope, env, init, ctx) {
                if !self.convertible(program, init_ty, ty) {
                    self.report.push(Diagnostic::new(
                        program.expr(init).span,
                        DiagnosticKind::TypeMismatch { expected: ty, found: init_ty },
                    ));
                }
            }
        }

        self.declare(scope, program, decl_id);
        let _ = name;
    }

    /// Convertibility check used at assignment/push/initializer sites: scalar
    /// conversions follow the type lattice (§4.1); arrays/structs only
    /// convert to themselves.
    fn convertible(&self, program: &SourceProgram, from: TypeId, to: TypeId) -> bool {
        from == to || types::can_convert(from, to, &program.types)
    }

    fn type_expr(
        &mut self,
        program: &mut SourceProgram,
        scope: &mut ScopeStack,
        env: &ConstEnv,
        expr: ExprId,
        ctx: Option<FilterCtx>,
    ) -> TypeResult {
        let span = program.expr(expr).span;
        let kind = program.expr(expr).kind.clone();
        let result = self.type_expr_kind(program, scope, env, expr, &kind, ctx);
        if let Ok(ty) = result {
            program.expr_mut(expr).resolved_type = Some(ty);
        }
        result
    }

    fn type_expr_kind(
        &mut self,
        program: &mut SourceProgram,
        scope: &mut ScopeStack,
        env: &ConstEnv,
        expr: ExprId,
        kind: &ExprKind,
        ctx: Option<FilterCtx>,
    ) -> TypeResult {
        let span = program.expr(expr).span;
        match kind {
            ExprKind::IntLiteral(_) => Ok(TypeId::INT),
            ExprKind::BoolLiteral(_) => Ok(TypeId::BOOL),
            ExprKind::FloatLiteral(_) => Ok(TypeId::FLOAT),

            ExprKind::Identifier { name, .. } => {
                let Some(decl_id) = scope.resolve(name) else {
                    return reject_and_record(
                        &mut self.report,
                        span,
                        DiagnosticKind::UndeclaredName { name: name.clone() },
                    );
                };
                if let ExprKind::Identifier { decl, .. } = &mut program.expr_mut(expr).kind {
                    *decl = Some(decl_id);
                }
                Ok(program.decl(decl_id).ty)
            }

            ExprKind::Index { base, index } => {
                let base_ty = self.type_expr(program, scope, env, *base, ctx)?;
                let index_ty = self.type_expr(program, scope, env, *index, ctx)?;
                let index_ty_desc = program.types.get(index_ty).cloned();
                if !index_ty_desc.map(|t| t.is_integral()).unwrap_or(false) {
                    return reject_and_record(
                        &mut self.report,
                        span,
                        DiagnosticKind::TypeMismatch { expected: TypeId::INT, found: index_ty },
                    );
                }
                match program.types.get(base_ty).cloned() {
                    Some(dataflow_core::types::Type::Array { element, .. }) => Ok(element),
                    _ => reject_and_record(
                        &mut self.report,
                        span,
                        DiagnosticKind::TypeMismatch { expected: TypeId::INT, found: base_ty },
                    ),
                }
            }

            ExprKind::Unary { op, operand } => {
                let operand_ty = self.type_expr(program, scope, env, *operand, ctx)?;
                self.lvalue_required_for_incdec(program, *op, *operand, operand_ty, span)?;
                let operand_desc = program.types.get(operand_ty).cloned();
                match op {
                    UnaryOp::Neg => {
                        if operand_desc.map(|t| t.is_scalar() && !matches!(t, dataflow_core::types::Type::Bool | dataflow_core::types::Type::Bit)).unwrap_or(false) {
                            Ok(operand_ty)
                        } else {
                            reject_and_record(
                                &mut self.report,
                                span,
                                DiagnosticKind::TypeMismatch { expected: TypeId::INT, found: operand_ty },
                            )
                        }
                    }
                    UnaryOp::LogicalNot => {
                        if operand_ty == TypeId::BOOL {
                            Ok(TypeId::BOOL)
                        } else {
                            reject_and_record(
                                &mut self.report,
                                span,
                                DiagnosticKind::TypeMismatch { expected: TypeId::BOOL, found: operand_ty },
                            )
                        }
                    }
                    UnaryOp::BitNot | UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                        if operand_desc.map(|t| t.is_integral()).unwrap_or(false) {
                            Ok(operand_ty)
                        } else {
                            reject_and_record(
                                &mut self.report,
                                span,
                                DiagnosticKind::TypeMismatch { expected: TypeId::INT, found: operand_ty },
                            )
                        }
                    }
                }
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let lhs_ty = self.type_expr(program, scope, env, *lhs, ctx)?;
                let rhs_ty = self.type_expr(program, scope, env, *rhs, ctx)?;
                self.binary_common(program, span, *op, lhs_ty, rhs_ty)
            }

            ExprKind::Relational { lhs, rhs, .. } => {
                let lhs_ty = self.type_expr(program, scope, env, *lhs, ctx)?;
                let rhs_ty = self.type_expr(program, scope, env, *rhs, ctx)?;
                match types::common_type(lhs_ty, rhs_ty, &mut program.types) {
                    Some(_) => Ok(TypeId::BOOL),
                    None => reject_and_record(
                        &mut self.report,
                        span,
                        DiagnosticKind::TypeMismatch { expected: lhs_ty, found: rhs_ty },
                    ),
                }
            }

            ExprKind::Logical { lhs, rhs, op } => {
                let lhs_ty = self.type_expr(program, scope, env, *lhs, ctx)?;
                if lhs_ty != TypeId::BOOL {
                    return reject_and_record(
                        &mut self.report,
                        span,
                        DiagnosticKind::TypeMismatch { expected: TypeId::BOOL, found: lhs_ty },
                    );
                }
                let rhs_ty = self.type_expr(program, scope, env, *rhs, ctx)?;
                if rhs_ty != TypeId::BOOL {
                    return reject_and_record(
                        &mut self.report,
                        span,
                        DiagnosticKind::TypeMismatch { expected: TypeId::BOOL, found: rhs_ty },
                    );
                }
                let _ = op;
                Ok(TypeId::BOOL)
            }

            ExprKind::Comma { lhs, rhs } => {
                self.type_expr(program, scope, env, *lhs, ctx)?;
                self.type_expr(program, scope, env, *rhs, ctx)
            }

            ExprKind::Assign { op, target, value } => {
                self.check_lvalue(program, *target, span)?;
                let target_ty = self.type_expr(program, scope, env, *target, ctx)?;
                let value_ty = self.type_expr(program, scope, env, *value, ctx)?;
                let effective_value_ty = match op.as_binary_op() {
                    Some(bin_op) => self.binary_common(program, span, bin_op, target_ty, value_ty)?,
                    None => value_ty,
                };
                if !self.convertible(program, effective_value_ty, target_ty) {
                    return reject_and_record(
                        &mut self.report,
                        span,
                        DiagnosticKind::TypeMismatch { expected: target_ty, found: effective_value_ty },
                    );
                }
                if let Some(c) = ctx {
                    if !c.stateful {
                        if let ExprKind::Identifier { decl: Some(d), .. } = &program.expr(*target).kind {
                            if c.fields.contains(d) {
                                self.report.push(Diagnostic::new(
                                    span,
                                    DiagnosticKind::StatelessFieldWrite {
                                        name: program.decl(*d).name.clone(),
                                    },
                                ));
                            }
                        }
                    }
                }
                Ok(target_ty)
            }

            ExprKind::Peek { index } => {
                let Some(c) = ctx else {
                    return reject_and_record(&mut self.report, span, DiagnosticKind::NotAnLValue);
                };
                let index_ty = self.type_expr(program, scope, env, *index, ctx)?;
                if !program.types.get(index_ty).map(|t| t.is_integral()).unwrap_or(false) {
                    return reject_and_record(
                        &mut self.report,
                        span,
                        DiagnosticKind::TypeMismatch { expected: TypeId::INT, found: index_ty },
                    );
                }
                match const_eval::eval_const(program, env, *index).and_then(|v| v.as_int()) {
                    Some(i) if i >= 0 => {
                        if let Some(rate) = c.peek_rate {
                            if i as u32 >= rate {
                                self.report.push(Diagnostic::new(
                                    span,
                                    DiagnosticKind::InvalidPeekIndex {
                                        index: Some(i),
                                        peek_rate: Some(rate),
                                    },
                                ));
                            }
                        }
                    }
                    _ => self.report.push(Diagnostic::new(
                        span,
                        DiagnosticKind::InvalidPeekIndex { index: None, peek_rate: c.peek_rate },
                    )),
                }
                Ok(c.input_type)
            }

            ExprKind::Pop => match ctx {
                Some(c) => Ok(c.input_type),
                None => reject_and_record(&mut self.report, span, DiagnosticKind::NotAnLValue),
            },

            ExprKind::Call { name, args, .. } => {
                let mut arg_types = Vec::with_capacity(args.len());
                for &a in args {
                    arg_types.push(self.type_expr(program, scope, env, a, ctx)?);
                }
                let resolution = overload::resolve(program, &self.functions, &program.types, name, &arg_types);
                match resolution {
                    Resolution::Found(decl_id) => {
                        let (function_id, return_type) = match &program.decl(decl_id).kind {
                            DeclarationKind::Function(f) => (f.id, f.return_type),
                            _ => unreachable!("FunctionTable only holds Function declarations"),
                        };
                        if let ExprKind::Call { function, .. } = &mut program.expr_mut(expr).kind {
                            *function = Some(function_id);
                        }
                        Ok(return_type)
                    }
                    Resolution::NotFound => reject_and_record(
                        &mut self.report,
                        span,
                        DiagnosticKind::UndeclaredName { name: name.clone() },
                    ),
                    Resolution::ArityMismatch { expected } => reject_and_record(
                        &mut self.report,
                        span,
                        DiagnosticKind::ArityMismatch {
                            name: name.clone(),
                            expected: expected.first().copied().unwrap_or(0),
                            found: args.len(),
                        },
                    ),
                    Resolution::Ambiguous(candidates) => reject_and_record(
                        &mut self.report,
                        span,
                        DiagnosticKind::Ambiguous { name: name.clone(), candidates },
                    ),
                }
            }

            ExprKind::Cast { target_type, operand } => {
                self.type_expr(program, scope, env, *operand, ctx)?;
                Ok(*target_type)
            }

            ExprKind::InitList { elements } => {
                let mut elem_ty: Option<TypeId> = None;
                for &e in elements {
                    let ty = self.type_expr(program, scope, env, e, ctx)?;
                    elem_ty = Some(match elem_ty {
                        None => ty,
                        Some(prev) => match types::common_type(prev, ty, &mut program.types) {
                            Some(common) => common,
                            None => {
                                return reject_and_record(
                                    &mut self.report,
                                    span,
                                    DiagnosticKind::TypeMismatch { expected: prev, found: ty },
                                )
                            }
                        },
                    });
                }
                let elem_ty = elem_ty.unwrap_or(TypeId::INT);
                Ok(program.types.intern_array(elem_ty, elements.len().max(1) as u32))
            }
        }
    }

    fn binary_common(
        &mut self,
        program: &mut SourceProgram,
        span: dataflow_core::span::Span,
        op: BinaryOp,
        lhs: TypeId,
        rhs: TypeId,
    ) -> TypeResult {
        let bitwise = matches!(
            op,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        );
        if bitwise {
            let lhs_ok = program.types.get(lhs).map(|t| t.is_integral()).unwrap_or(false);
            if !lhs_ok {
                return reject_and_record(
                    &mut self.report,
                    span,
                    DiagnosticKind::TypeMismatch { expected: TypeId::INT, found: lhs },
                );
            }
        }
        match types::common_type(lhs, rhs, &mut program.types) {
            Some(common) => Ok(common),
            None => reject_and_record(
                &mut self.report,
                span,
                DiagnosticKind::TypeMismatch { expected: lhs, found: rhs },
            ),
        }
    }

    fn check_lvalue(
        &mut self,
        program: &SourceProgram,
        expr: ExprId,
        span: dataflow_core::span::Span,
    ) -> Result<(), Rejected> {
        match &program.expr(expr).kind {
            ExprKind::Identifier { .. } | ExprKind::Index { .. } => Ok(()),
            _ => {
                self.report.push(Diagnostic::new(span, DiagnosticKind::NotAnLValue));
                Err(Rejected)
            }
        }
    }

    fn lvalue_required_for_incdec(
        &mut self,
        program: &SourceProgram,
        op: UnaryOp,
        operand: ExprId,
        _operand_ty: TypeId,
        span: dataflow_core::span::Span,
    ) -> Result<(), Rejected> {
        if matches!(
            op,
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
        ) {
            self.check_lvalue(program, operand, span)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_core::ast::{Declaration, Expression, RateClause, Statement};
    use dataflow_core::span::Span;
    use dataflow_core::type_registry::TypeRegistry;

    fn new_program() -> SourceProgram {
        SourceProgram::new(TypeRegistry::new())
    }

    fn push_expr(p: &mut SourceProgram, kind: ExprKind) -> ExprId {
        p.push_expr(Expression { span: Span::synthetic(), resolved_type: None, kind })
    }
    fn push_stmt(p: &mut SourceProgram, kind: StmtKind) -> StmtId {
        p.push_stmt(Statement { span: Span::synthetic(), kind })
    }

    fn counter_filter(p: &mut SourceProgram) -> DeclId {
        let n = p.push_decl(Declaration {
            name: "n".into(),
            span: Span::synthetic(),
            ty: TypeId::INT,
            constant: false,
            kind: DeclarationKind::Variable,
            initializer: Some(push_expr(p, ExprKind::IntLiteral(0))),
            array_length_expr: None,
        });
        let n_ident = |p: &mut SourceProgram| push_expr(p, ExprKind::Identifier { name: "n".into(), decl: Some(n) });
        let push_n = push_stmt(p, StmtKind::Push(n_ident(p)));
        let one = push_expr(p, ExprKind::IntLiteral(1));
        let n_target = n_ident(p);
        let n_rhs = n_ident(p);
        let sum = push_expr(p, ExprKind::Binary { op: BinaryOp::Add, lhs: n_rhs, rhs: one });
        let assign = push_expr(p, ExprKind::Assign { op: AssignOp::Assign, target: n_target, value: sum });
        let assign_stmt = push_stmt(p, StmtKind::Expr(assign));

        let push_rate_expr = push_expr(p, ExprKind::IntLiteral(1));
        // `n` is already declared as a filter field (below), so the body
        // only needs to read and update it, not redeclare it.
        let work = WorkBlock {
            peek: None,
            pop: None,
            push: Some(RateClause { expr: push_rate_expr, resolved: None }),
            body: vec![assign_stmt, push_n],
        };

        p.push_decl(Declaration {
            name: "counter".into(),
            span: Span::synthetic(),
            ty: TypeId::VOID,
            constant: false,
            kind: DeclarationKind::Filter(FilterDecl {
                input_type: TypeId::VOID,
                output_type: TypeId::INT,
                stateful: true,
                params: vec![],
                fields: vec![n],
                init: None,
                prework: None,
                work,
            }),
            initializer: None,
            array_length_expr: None,
        })
    }

    #[test]
    fn counter_filter_analyzes_cleanly() {
        let mut p = new_program();
        let id = counter_filter(&mut p);
        p.top_level.push(id);
        assert!(analyze(&mut p).is_ok());
    }

    #[test]
    fn type_mismatch_assigning_float_to_bool_is_rejected() {
        // The lattice only widens (Bool -> Bit -> APInt_n -> Int -> Float);
        // a Float initializer for a Bool-typed variable goes the wrong way
        // and must be rejected.
        let mut p = new_program();
        let x = p.push_decl(Declaration {
            name: "x".into(),
            span: Span::synthetic(),
            ty: TypeId::BOOL,
            constant: false,
            kind: DeclarationKind::Variable,
            initializer: Some(push_expr(&mut p, ExprKind::FloatLiteral(1.0))),
            array_length_expr: None,
        });
        let decl_stmt = push_stmt(&mut p, StmtKind::VarDecl(x));
        let work = WorkBlock { body: vec![decl_stmt], ..WorkBlock::default() };
        let filter = p.push_decl(Declaration {
            name: "bad".into(),
            span: Span::synthetic(),
            ty: TypeId::VOID,
            constant: false,
            kind: DeclarationKind::Filter(FilterDecl {
                input_type: TypeId::VOID,
                output_type: TypeId::VOID,
                stateful: false,
                params: vec![],
                fields: vec![],
                init: None,
                prework: None,
                work,
            }),
            initializer: None,
            array_length_expr: None,
        });
        p.top_level.push(filter);
        let err = analyze(&mut p).unwrap_err();
        assert!(err
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::TypeMismatch { .. })));
    }

    #[test]
    fn undeclared_identifier_is_rejected() {
        let mut p = new_program();
        let bogus = push_expr(&mut p, ExprKind::Identifier { name: "ghost".into(), decl: None });
        let stmt = push_stmt(&mut p, StmtKind::Expr(bogus));
        let work = WorkBlock { body: vec![stmt], ..WorkBlock::default() };
        let filter = p.push_decl(Declaration {
            name: "f".into(),
            span: Span::synthetic(),
            ty: TypeId::VOID,
            constant: false,
            kind: DeclarationKind::Filter(FilterDecl {
                input_type: TypeId::VOID,
                output_type: TypeId::VOID,
                stateful: false,
                params: vec![],
                fields: vec![],
                init: None,
                prework: None,
                work,
            }),
            initializer: None,
            array_length_expr: None,
        });
        p.top_level.push(filter);
        let err = analyze(&mut p).unwrap_err();
        assert!(err
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::UndeclaredName { .. })));
    }

    #[test]
    fn stateless_filter_writing_field_is_rejected() {
        let mut p = new_program();
        let n = p.push_decl(Declaration {
            name: "n".into(),
            span: Span::synthetic(),
            ty: TypeId::INT,
            constant: false,
            kind: DeclarationKind::Variable,
            initializer: None,
            array_length_expr: None,
        });
        let n_target = push_expr(&mut p, ExprKind::Identifier { name: "n".into(), decl: Some(n) });
        let one = push_expr(&mut p, ExprKind::IntLiteral(1));
        let assign = push_expr(&mut p, ExprKind::Assign { op: AssignOp::Assign, target: n_target, value: one });
        let stmt = push_stmt(&mut p, StmtKind::Expr(assign));
        let work = WorkBlock { body: vec![stmt], ..WorkBlock::default() };
        let filter = p.push_decl(Declaration {
            name: "f".into(),
            span: Span::synthetic(),
            ty: TypeId::VOID,
            constant: false,
            kind: DeclarationKind::Filter(FilterDecl {
                input_type: TypeId::VOID,
                output_type: TypeId::VOID,
                stateful: false,
                params: vec![],
                fields: vec![n],
                init: None,
                prework: None,
                work,
            }),
            initializer: None,
            array_length_expr: None,
        });
        p.top_level.push(filter);
        let err = analyze(&mut p).unwrap_err();
        assert!(err
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::StatelessFieldWrite { .. })));
    }
}
