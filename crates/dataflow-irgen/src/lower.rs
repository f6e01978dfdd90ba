//! Statement/expression lowering (spec §4.3): walks a semantically-analysed
//! `SourceProgram` filter-by-filter and function-by-function, emitting one
//! [`crate::ir::Function`] per work block and per user-declared function.
//!
//! Every local variable and every parameter becomes a stack slot allocated
//! in the entry block ("Entry allocation" in §4.3), loaded and stored
//! through rather than bound as an SSA value directly -- this sidesteps the
//! need for a mem2reg-style promotion pass, which is out of scope (no
//! target-independent optimization beyond what this crate already does).
//! Persistent filter fields are module globals instead, so they survive
//! across separate invocations of a filter's `work` function.

use std::collections::HashMap;

use dataflow_core::ast::{
    AssignOp, BinaryOp, DeclarationKind, ExprKind, FilterDecl, FunctionDecl, LogicalOp,
    SourceProgram, StmtKind, UnaryOp, WorkBlock,
};
use dataflow_core::id::{DeclId, ExprId, FunctionId, StmtId};
use dataflow_core::type_registry::TypeId;
use dataflow_core::types::{self, Type};

use crate::builder::FunctionBuilder;
use crate::error::IrError;
use crate::ir::{Constant, Function, GlobalVar, Module, Opcode, Operand};
use crate::target::{GenericStreamBuilder, TargetFragmentBuilder};

/// Per-function lowering state: where each parameter/local's stack slot
/// lives, the enclosing filter's field-to-global map (empty for a plain
/// function), and the input element type `pop`/`peek` read from.
struct FnCtx<'a> {
    program: &'a SourceProgram,
    fields: &'a HashMap<DeclId, u32>,
    fn_names: &'a HashMap<FunctionId, String>,
    slots: HashMap<DeclId, Operand>,
    input_ty: TypeId,
}

/// Lowers an entire compilation unit. Built once per program; `fn_names`
/// (a mangled name per `FunctionId`, disambiguating overloads sharing a
/// source-level name) is computed up front since it is needed by every
/// `Call` site regardless of lowering order.
pub struct Lowerer<'p> {
    program: &'p SourceProgram,
    fn_names: HashMap<FunctionId, String>,
}

impl<'p> Lowerer<'p> {
    pub fn new(program: &'p SourceProgram) -> Self {
        let mut fn_names = HashMap::new();
        for i in 0..program.decl_count() {
            let id = DeclId::from(i);
            if let DeclarationKind::Function(f) = &program.decl(id).kind {
                fn_names.insert(f.id, format!("{}__{}", program.decl(id).name, f.id.0));
            }
        }
        Lowerer { program, fn_names }
    }

    /// Lowers every top-level filter's work blocks and every user-declared
    /// function into one [`Module`]. `tgt` supplies the streaming-primitive
    /// lowering (spec §4.3's only backend coupling); pipelines and
    /// splitjoins contribute no IR here -- their `add`/`split`/`join`
    /// statements are consumed by stream-graph construction instead.
    pub fn lower_program(&self, tgt: &mut dyn TargetFragmentBuilder) -> Result<Module, IrError> {
        let mut module = Module::new("program");
        for &top in &self.program.top_level {
            let decl = self.program.decl(top);
            if let DeclarationKind::Filter(filter) = &decl.kind {
                self.lower_filter(&decl.name, filter, &mut module, tgt)?;
            }
        }
        for i in 0..self.program.decl_count() {
            let id = DeclId::from(i);
            let decl = self.program.decl(id);
            if let DeclarationKind::Function(f) = &decl.kind {
                if let Some(body) = &f.body {
                    let func = self.lower_function(
                        self.fn_names.get(&f.id).cloned().unwrap_or_else(|| decl.name.clone()),
                        f,
                        body,
                    )?;
                    module.add_function(func);
                }
            }
        }
        Ok(module)
    }

    fn fold_const(&self, id: ExprId) -> Option<Constant> {
        match &self.program.expr(id).kind {
            ExprKind::IntLiteral(v) => Some(Constant::Int(*v)),
            ExprKind::BoolLiteral(v) => Some(Constant::Bool(*v)),
            ExprKind::FloatLiteral(v) => Some(Constant::Float(*v)),
            _ => None,
        }
    }

    fn lower_filter(
        &self,
        name: &str,
        filter: &FilterDecl,
        module: &mut Module,
        tgt: &mut dyn TargetFragmentBuilder,
    ) -> Result<(), IrError> {
        let mut fields = HashMap::new();
        for &field_id in &filter.fields {
            let field = self.program.decl(field_id);
            let initial = field.initializer.and_then(|e| self.fold_const(e));
            let idx = module.add_global(GlobalVar {
                name: format!("{name}__{}", field.name),
                ty: field.ty,
                initial,
            });
            fields.insert(field_id, idx);
        }

        if let Some(wb) = &filter.init {
            let f = self.lower_work_block(format!("{name}__init"), filter, wb, &fields, tgt)?;
            module.add_function(f);
        }
        if let Some(wb) = &filter.prework {
            let f = self.lower_work_block(format!("{name}__prework"), filter, wb, &fields, tgt)?;
            module.add_function(f);
        }
        let f = self.lower_work_block(format!("{name}__work"), filter, &filter.work, &fields, tgt)?;
        module.add_function(f);
        Ok(())
    }

    fn lower_work_block(
        &self,
        fn_name: String,
        filter: &FilterDecl,
        wb: &WorkBlock,
        fields: &HashMap<DeclId, u32>,
        tgt: &mut dyn TargetFragmentBuilder,
    ) -> Result<Function, IrError> {
        let params: Vec<TypeId> =
            filter.params.iter().map(|&p| self.program.decl(p).ty).collect();
        let mut fb = FunctionBuilder::new(fn_name, params, TypeId::VOID);
        let mut ctx = FnCtx {
            program: self.program,
            fields,
            fn_names: &self.fn_names,
            slots: HashMap::new(),
            input_ty: filter.input_type,
        };
        self.bind_params(&mut fb, &mut ctx, &filter.params);
        self.alloc_locals(&mut fb, &mut ctx, &wb.body);
        self.lower_block(&mut fb, &mut ctx, tgt, &wb.body)?;
        fb.ins_ret(None);
        Ok(fb.finish())
    }

    fn lower_function(
        &self,
        name: String,
        f: &FunctionDecl,
        body: &[StmtId],
    ) -> Result<Function, IrError> {
        let params: Vec<TypeId> = f.params.iter().map(|&p| self.program.decl(p).ty).collect();
        let mut fb = FunctionBuilder::new(name, params, f.return_type);
        let no_fields = HashMap::new();
        let mut ctx = FnCtx {
            program: self.program,
            fields: &no_fields,
            fn_names: &self.fn_names,
            slots: HashMap::new(),
            input_ty: TypeId::VOID,
        };
        self.bind_params(&mut fb, &mut ctx, &f.params);
        self.alloc_locals(&mut fb, &mut ctx, body);
        let mut tgt = GenericStreamBuilder;
        self.lower_block(&mut fb, &mut ctx, &mut tgt, body)?;
        fb.ins_ret(None);
        Ok(fb.finish())
    }

    fn bind_params(&self, fb: &mut FunctionBuilder, ctx: &mut FnCtx, params: &[DeclId]) {
        for (i, &param_decl) in params.iter().enumerate() {
            let ty = self.program.decl(param_decl).ty;
            let slot = Operand::Value(fb.ins_alloca(ty));
            fb.ins_store(slot, Operand::Arg(i as u32));
            ctx.slots.insert(param_decl, slot);
        }
    }

    fn alloc_locals(&self, fb: &mut FunctionBuilder, ctx: &mut FnCtx, body: &[StmtId]) {
        let mut locals = Vec::new();
        collect_var_decls(self.program, body, &mut locals);
        for decl_id in locals {
            let ty = self.program.decl(decl_id).ty;
            let slot = Operand::Value(fb.ins_alloca(ty));
            ctx.slots.insert(decl_id, slot);
        }
    }

    fn addr_of(&self, ctx: &FnCtx, decl_id: DeclId) -> Result<Operand, IrError> {
        if let Some(op) = ctx.slots.get(&decl_id) {
            return Ok(*op);
        }
        if let Some(&idx) = ctx.fields.get(&decl_id) {
            return Ok(Operand::Global(idx));
        }
        Err(IrError::Internal(format!("no storage location for declaration {decl_id}")))
    }

    fn lvalue_addr(
        &self,
        fb: &mut FunctionBuilder,
        ctx: &mut FnCtx,
        tgt: &mut dyn TargetFragmentBuilder,
        id: ExprId,
    ) -> Result<(Operand, TypeId), IrError> {
        let expr = self.program.expr(id);
        match &expr.kind {
            ExprKind::Identifier { decl, name } => {
                let decl_id = decl
                    .ok_or_else(|| IrError::Internal(format!("unresolved identifier `{name}`")))?;
                Ok((self.addr_of(ctx, decl_id)?, expr.resolved_type.unwrap_or(TypeId::VOID)))
            }
            ExprKind::Index { base, index } => {
                let (base_addr, _) = self.lvalue_addr(fb, ctx, tgt, *base)?;
                let index_val = self.lower_expr(fb, ctx, tgt, *index)?;
                let elem_ty = expr.resolved_type.unwrap_or(TypeId::VOID);
                let addr = fb.ins_gep(elem_ty, base_addr, vec![index_val]);
                Ok((Operand::Value(addr), elem_ty))
            }
            _ => Err(IrError::Internal("expression is not an lvalue".into())),
        }
    }

    fn lower_block(
        &self,
        fb: &mut FunctionBuilder,
        ctx: &mut FnCtx,
        tgt: &mut dyn TargetFragmentBuilder,
        stmts: &[StmtId],
    ) -> Result<(), IrError> {
        for &sid in stmts {
            self.lower_stmt(fb, ctx, tgt, sid)?;
        }
        Ok(())
    }

    fn lower_stmt(
        &self,
        fb: &mut FunctionBuilder,
        ctx: &mut FnCtx,
        tgt: &mut dyn TargetFragmentBuilder,
        sid: StmtId,
    ) -> Result<(), IrError> {
        if fb.current_block_is_terminated() {
            // Statements textually after a return/break/continue in the
            // same block are unreachable; nothing left to lower.
            return Ok(());
        }
        match &self.program.stmt(sid).kind {
            StmtKind::Expr(e) => {
                self.lower_expr(fb, ctx, tgt, *e)?;
                Ok(())
            }
            StmtKind::VarDecl(decl_id) => self.lower_var_decl(fb, ctx, tgt, *decl_id),
            StmtKind::Push(e) => {
                let val = self.lower_expr(fb, ctx, tgt, *e)?;
                tgt.build_push(fb, val);
                Ok(())
            }
            StmtKind::Add { .. } | StmtKind::Split(_) | StmtKind::Join(_) => {
                // Stream-composition statements feed stream-graph
                // construction, not filter-body IR.
                Ok(())
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                let cond_val = self.lower_expr(fb, ctx, tgt, *cond)?;
                let then_block = fb.new_block("if_then");
                let else_block = fb.new_block("if_else");
                let merge_block = fb.new_block("if_merge");
                fb.ins_cond_br(cond_val, then_block, else_block);
                fb.switch_to(then_block);
                self.lower_block(fb, ctx, tgt, then_branch)?;
                fb.ins_br(merge_block);
                fb.switch_to(else_block);
                self.lower_block(fb, ctx, tgt, else_branch)?;
                fb.ins_br(merge_block);
                fb.switch_to(merge_block);
                Ok(())
            }
            StmtKind::For { init, cond, step, body } => {
                if let Some(init_id) = *init {
                    self.lower_stmt(fb, ctx, tgt, init_id)?;
                }
                let header = fb.new_block("for_header");
                let body_block = fb.new_block("for_body");
                let step_block = fb.new_block("for_step");
                let exit_block = fb.new_block("for_exit");
                fb.ins_br(header);
                fb.switch_to(header);
                let cond_val = match cond {
                    Some(c) => self.lower_expr(fb, ctx, tgt, *c)?,
                    None => Operand::Const(Constant::Bool(true)),
                };
                fb.ins_cond_br(cond_val, body_block, exit_block);
                fb.switch_to(body_block);
                fb.loops.push(exit_block, step_block);
                self.lower_block(fb, ctx, tgt, body)?;
                fb.loops.pop();
                fb.ins_br(step_block);
                fb.switch_to(step_block);
                if let Some(step_id) = *step {
                    self.lower_stmt(fb, ctx, tgt, step_id)?;
                }
                fb.ins_br(header);
                fb.switch_to(exit_block);
                Ok(())
            }
            StmtKind::Break => match fb.loops.current_break() {
                Some(target_block) => {
                    fb.ins_br(target_block);
                    Ok(())
                }
                None => Err(IrError::Internal("break outside a loop".into())),
            },
            StmtKind::Continue => match fb.loops.current_continue() {
                Some(target_block) => {
                    fb.ins_br(target_block);
                    Ok(())
                }
                None => Err(IrError::Internal("continue outside a loop".into())),
            },
            StmtKind::Return(e) => {
                let val = match e {
                    Some(expr_id) => Some(self.lower_expr(fb, ctx, tgt, *expr_id)?),
                    None => None,
                };
                fb.ins_ret(val);
                Ok(())
            }
        }
    }

    fn lower_var_decl(
        &self,
        fb: &mut FunctionBuilder,
        ctx: &mut FnCtx,
        tgt: &mut dyn TargetFragmentBuilder,
        decl_id: DeclId,
    ) -> Result<(), IrError> {
        let decl = self.program.decl(decl_id);
        let Some(init) = decl.initializer else { return Ok(()) };
        let decl_ty = decl.ty;
        let slot = *ctx
            .slots
            .get(&decl_id)
            .ok_or_else(|| IrError::Internal(format!("no stack slot for declaration {decl_id}")))?;

        if let ExprKind::InitList { elements } = &self.program.expr(init).kind {
            let elements = elements.clone();
            let elem_ty = match self.program.types.get(decl_ty) {
                Some(Type::Array { element, .. }) => *element,
                _ => {
                    return Err(IrError::Internal(
                        "InitList initializer on a non-array declaration".into(),
                    ))
                }
            };
            for (i, elem_expr) in elements.iter().enumerate() {
                let elem_val = self.lower_expr(fb, ctx, tgt, *elem_expr)?;
                let addr = fb.ins_gep(elem_ty, slot, vec![Operand::Const(Constant::Int(i as i64))]);
                fb.ins_store(Operand::Value(addr), elem_val);
            }
            return Ok(());
        }

        let val = self.lower_expr(fb, ctx, tgt, init)?;
        let from_ty = self.program.expr(init).resolved_type.unwrap_or(decl_ty);
        let val = self.lower_cast(fb, val, from_ty, decl_ty)?;
        fb.ins_store(slot, val);
        Ok(())
    }

    fn lower_expr(
        &self,
        fb: &mut FunctionBuilder,
        ctx: &mut FnCtx,
        tgt: &mut dyn TargetFragmentBuilder,
        id: ExprId,
    ) -> Result<Operand, IrError> {
        let expr = self.program.expr(id);
        let ty = expr.resolved_type.unwrap_or(TypeId::VOID);
        match &expr.kind {
            ExprKind::IntLiteral(v) => Ok(Operand::Const(Constant::Int(*v))),
            ExprKind::BoolLiteral(v) => Ok(Operand::Const(Constant::Bool(*v))),
            ExprKind::FloatLiteral(v) => Ok(Operand::Const(Constant::Float(*v))),
            ExprKind::Identifier { decl, name } => {
                let decl_id = decl
                    .ok_or_else(|| IrError::Internal(format!("unresolved identifier `{name}`")))?;
                let addr = self.addr_of(ctx, decl_id)?;
                Ok(Operand::Value(fb.ins_load(ty, addr)))
            }
            ExprKind::Index { .. } => {
                let (addr, elem_ty) = self.lvalue_addr(fb, ctx, tgt, id)?;
                Ok(Operand::Value(fb.ins_load(elem_ty, addr)))
            }
            ExprKind::Unary { op, operand } => self.lower_unary(fb, ctx, tgt, *op, *operand, ty),
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.lower_expr(fb, ctx, tgt, *lhs)?;
                let r = self.lower_expr(fb, ctx, tgt, *rhs)?;
                Ok(Operand::Value(fb.ins_binary(ty, *op, l, r)))
            }
            ExprKind::Relational { op, lhs, rhs } => {
                let l = self.lower_expr(fb, ctx, tgt, *lhs)?;
                let r = self.lower_expr(fb, ctx, tgt, *rhs)?;
                Ok(Operand::Value(fb.ins_cmp(*op, l, r)))
            }
            ExprKind::Logical { op, lhs, rhs } => self.lower_logical(fb, ctx, tgt, *op, *lhs, *rhs),
            ExprKind::Comma { lhs, rhs } => {
                self.lower_expr(fb, ctx, tgt, *lhs)?;
                self.lower_expr(fb, ctx, tgt, *rhs)
            }
            ExprKind::Assign { op, target, value } => {
                self.lower_assign(fb, ctx, tgt, *op, *target, *value)
            }
            ExprKind::Peek { index } => {
                let index_val = self.lower_expr(fb, ctx, tgt, *index)?;
                Ok(Operand::Value(tgt.build_peek(fb, ctx.input_ty, index_val)))
            }
            ExprKind::Pop => Ok(Operand::Value(tgt.build_pop(fb, ctx.input_ty))),
            ExprKind::Call { name, function, args } => {
                let mut arg_vals = Vec::with_capacity(args.len());
                for &a in args {
                    arg_vals.push(self.lower_expr(fb, ctx, tgt, a)?);
                }
                let fid = function
                    .ok_or_else(|| IrError::Internal(format!("unresolved call to `{name}`")))?;
                let mangled = self.fn_names.get(&fid).cloned().unwrap_or_else(|| name.clone());
                Ok(Operand::Value(fb.ins_call(ty, mangled, arg_vals)))
            }
            ExprKind::Cast { target_type, operand } => {
                let operand_val = self.lower_expr(fb, ctx, tgt, *operand)?;
                let from_ty = self.program.expr(*operand).resolved_type.unwrap_or(*target_type);
                self.lower_cast(fb, operand_val, from_ty, *target_type)
            }
            ExprKind::InitList { .. } => Err(IrError::Internal(
                "InitList is only valid as a variable-declaration initializer".into(),
            )),
        }
    }

    fn lower_unary(
        &self,
        fb: &mut FunctionBuilder,
        ctx: &mut FnCtx,
        tgt: &mut dyn TargetFragmentBuilder,
        op: UnaryOp,
        operand: ExprId,
        ty: TypeId,
    ) -> Result<Operand, IrError> {
        match op {
            UnaryOp::Neg => {
                let v = self.lower_expr(fb, ctx, tgt, operand)?;
                Ok(Operand::Value(fb.ins_neg(ty, v)))
            }
            UnaryOp::LogicalNot => {
                let v = self.lower_expr(fb, ctx, tgt, operand)?;
                Ok(Operand::Value(fb.ins_logical_not(v)))
            }
            UnaryOp::BitNot => {
                let v = self.lower_expr(fb, ctx, tgt, operand)?;
                Ok(Operand::Value(fb.ins_bit_not(ty, v)))
            }
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                let (addr, elem_ty) = self.lvalue_addr(fb, ctx, tgt, operand)?;
                let old = Operand::Value(fb.ins_load(elem_ty, addr));
                let delta = Operand::Const(Constant::Int(1));
                let bin_op = if matches!(op, UnaryOp::PreInc | UnaryOp::PostInc) {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                let new_val = Operand::Value(fb.ins_binary(elem_ty, bin_op, old, delta));
                fb.ins_store(addr, new_val);
                Ok(if matches!(op, UnaryOp::PreInc | UnaryOp::PreDec) { new_val } else { old })
            }
        }
    }

    /// Lowers `&&`/`||` to diamond-shaped control flow with a PHI at the
    /// merge block, so the right-hand side is only evaluated when it can
    /// affect the result (spec §4.3 "short-circuit semantics").
    fn lower_logical(
        &self,
        fb: &mut FunctionBuilder,
        ctx: &mut FnCtx,
        tgt: &mut dyn TargetFragmentBuilder,
        op: LogicalOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> Result<Operand, IrError> {
        let lhs_val = self.lower_expr(fb, ctx, tgt, lhs)?;
        let origin_block = fb.current_block;
        let rhs_block = fb.new_block("logical_rhs");
        let merge_block = fb.new_block("logical_merge");
        let short_circuit = match op {
            LogicalOp::And => Constant::Bool(false),
            LogicalOp::Or => Constant::Bool(true),
        };
        match op {
            LogicalOp::And => fb.ins_cond_br(lhs_val, rhs_block, merge_block),
            LogicalOp::Or => fb.ins_cond_br(lhs_val, merge_block, rhs_block),
        }
        fb.switch_to(rhs_block);
        let rhs_val = self.lower_expr(fb, ctx, tgt, rhs)?;
        let rhs_end_block = fb.current_block;
        fb.ins_br(merge_block);
        fb.switch_to(merge_block);
        let phi = fb.ins_phi(
            TypeId::BOOL,
            vec![(origin_block, Operand::Const(short_circuit)), (rhs_end_block, rhs_val)],
        );
        Ok(Operand::Value(phi))
    }

    fn lower_assign(
        &self,
        fb: &mut FunctionBuilder,
        ctx: &mut FnCtx,
        tgt: &mut dyn TargetFragmentBuilder,
        op: AssignOp,
        target_expr: ExprId,
        value_expr: ExprId,
    ) -> Result<Operand, IrError> {
        let (addr, elem_ty) = self.lvalue_addr(fb, ctx, tgt, target_expr)?;
        let rhs_val = self.lower_expr(fb, ctx, tgt, value_expr)?;
        let value_ty = self.program.expr(value_expr).resolved_type.unwrap_or(elem_ty);
        let stored = match op.as_binary_op() {
            None => self.lower_cast(fb, rhs_val, value_ty, elem_ty)?,
            Some(bin_op) => {
                let old = Operand::Value(fb.ins_load(elem_ty, addr));
                let rhs_cast = self.lower_cast(fb, rhs_val, value_ty, elem_ty)?;
                Operand::Value(fb.ins_binary(elem_ty, bin_op, old, rhs_cast))
            }
        };
        fb.ins_store(addr, stored);
        Ok(stored)
    }

    /// Casts resolved by the type lattice (spec §4.1/§4.3.5): truncate,
    /// sign/zero-extend, or switch between the integer and float domains.
    /// Zero-extension only applies when the source is `Bit`/`Bool`; every
    /// other widening integer cast sign-extends.
    fn lower_cast(
        &self,
        fb: &mut FunctionBuilder,
        value: Operand,
        from: TypeId,
        to: TypeId,
    ) -> Result<Operand, IrError> {
        if from == to {
            return Ok(value);
        }
        let from_ty = self.program.types.get(from).cloned();
        let to_ty = self.program.types.get(to).cloned();
        let is_float_from = matches!(from_ty, Some(Type::Float));
        let is_float_to = matches!(to_ty, Some(Type::Float));

        if is_float_from && !is_float_to {
            return Ok(Operand::Value(fb.ins_cast(Opcode::FloatToInt { value, to }, to)));
        }
        if !is_float_from && is_float_to {
            return Ok(Operand::Value(fb.ins_cast(Opcode::IntToFloat { value, to }, to)));
        }
        if is_float_from && is_float_to {
            return Ok(value);
        }

        let from_w = types::bit_width(from, &self.program.types).unwrap_or(32);
        let to_w = types::bit_width(to, &self.program.types).unwrap_or(32);
        if to_w < from_w {
            Ok(Operand::Value(fb.ins_cast(Opcode::Trunc { value, to }, to)))
        } else if to_w > from_w {
            let zero_extend = matches!(from_ty, Some(Type::Bit) | Some(Type::Bool));
            if zero_extend {
                Ok(Operand::Value(fb.ins_cast(Opcode::ZExt { value, to }, to)))
            } else {
                Ok(Operand::Value(fb.ins_cast(Opcode::SExt { value, to }, to)))
            }
        } else {
            Ok(value)
        }
    }
}

/// Recursively collects every `VarDecl` in `stmts`, descending into
/// `if`/`for` bodies (but not into nested function/filter bodies, which are
/// lowered as their own separate `Function`s).
fn collect_var_decls(program: &SourceProgram, stmts: &[StmtId], out: &mut Vec<DeclId>) {
    for &sid in stmts {
        match &program.stmt(sid).kind {
            StmtKind::VarDecl(d) => out.push(*d),
            StmtKind::If { then_branch, else_branch, .. } => {
                collect_var_decls(program, then_branch, out);
                collect_var_decls(program, else_branch, out);
            }
            StmtKind::For { init, body, .. } => {
                if let Some(init_id) = init {
                    collect_var_decls(program, std::slice::from_ref(init_id), out);
                }
                collect_var_decls(program, body, out);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_core::ast::{
        Declaration, DeclarationKind, Expression, FilterDecl, Statement, WorkBlock,
    };
    use dataflow_core::span::Span;
    use dataflow_core::type_registry::TypeRegistry;
    use crate::target::GenericStreamBuilder;

    /// A passthrough filter: `int -> int filter pass() { work pop 1 push 1 { push(pop()); } }`.
    fn passthrough_program() -> (SourceProgram, DeclId) {
        let mut p = SourceProgram::new(TypeRegistry::new());
        let pop_expr = p.push_expr(Expression {
            span: Span::synthetic(),
            resolved_type: Some(TypeId::INT),
            kind: ExprKind::Pop,
        });
        let push_stmt = p.push_stmt(Statement { span: Span::synthetic(), kind: StmtKind::Push(pop_expr) });
        let filter = FilterDecl {
            input_type: TypeId::INT,
            output_type: TypeId::INT,
            stateful: false,
            params: vec![],
            fields: vec![],
            init: None,
            prework: None,
            work: WorkBlock {
                peek: None,
                pop: None,
                push: None,
                body: vec![push_stmt],
            },
        };
        let decl = p.push_decl(Declaration {
            name: "pass".into(),
            span: Span::synthetic(),
            ty: TypeId::VOID,
            constant: false,
            kind: DeclarationKind::Filter(filter),
            initializer: None,
            array_length_expr: None,
        });
        p.top_level.push(decl);
        (p, decl)
    }

    #[test]
    fn passthrough_filter_lowers_to_pop_then_push() {
        let (program, _) = passthrough_program();
        let lowerer = Lowerer::new(&program);
        let mut tgt = GenericStreamBuilder;
        let module = lowerer.lower_program(&mut tgt).unwrap();
        let work = module.function("pass__work").expect("work function emitted");
        assert!(work.check_dominance());
        let opcodes: Vec<&Opcode> =
            work.blocks().flat_map(|(_, b)| b.insts.iter().map(|i| &work.inst(*i).opcode)).collect();
        assert!(opcodes.iter().any(|op| matches!(op, Opcode::Pop)));
        assert!(opcodes.iter().any(|op| matches!(op, Opcode::Push { .. })));
    }

    #[test]
    fn stateful_field_becomes_a_module_global() {
        let mut p = SourceProgram::new(TypeRegistry::new());
        let field = p.push_decl(Declaration {
            name: "count".into(),
            span: Span::synthetic(),
            ty: TypeId::INT,
            constant: false,
            kind: DeclarationKind::Variable,
            initializer: None,
            array_length_expr: None,
        });
        let filter = FilterDecl {
            input_type: TypeId::INT,
            output_type: TypeId::INT,
            stateful: true,
            params: vec![],
            fields: vec![field],
            init: None,
            prework: None,
            work: WorkBlock { peek: None, pop: None, push: None, body: vec![] },
        };
        let decl = p.push_decl(Declaration {
            name: "counter".into(),
            span: Span::synthetic(),
            ty: TypeId::VOID,
            constant: false,
            kind: DeclarationKind::Filter(filter),
            initializer: None,
            array_length_expr: None,
        });
        p.top_level.push(decl);

        let lowerer = Lowerer::new(&p);
        let mut tgt = GenericStreamBuilder;
        let module = lowerer.lower_program(&mut tgt).unwrap();
        assert_eq!(module.globals.len(), 1);
        assert_eq!(module.globals[0].name, "counter__count");
    }
}
