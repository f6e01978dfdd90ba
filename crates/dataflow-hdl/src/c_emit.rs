//! IR -> C-syntax lowering (spec §4.5 "C-syntax lowering").
//!
//! One `.c` file is emitted per *filter declaration* (not per instance --
//! multiple stream instances of the same parameterised filter share the
//! same lowered IR and the same generated source; only the VHDL wrapper
//! `dataflow-hdl::vhdl` emits is per-instance). `pop`/`peek`/`push` have no
//! IR-level FIFO-depth knowledge (that lives entirely in the stream graph
//! and the VHDL wrapper around this function), so they lower to three
//! callback-style accessors on a small channel-context struct -- the same
//! "only coupling between the generic lowerer and any particular backend"
//! seam `dataflow-irgen::target::TargetFragmentBuilder` describes, carried
//! one level further into the emitted C itself so an HLS tool's AXI-stream
//! or FIFO pragma can bind to `in_ch`/`out_ch` however it likes.

use std::collections::HashMap;

use dataflow_core::ast::{BinaryOp, RelOp};
use dataflow_core::type_registry::{TypeId, TypeRegistry};
use dataflow_core::types::{self, Type};
use dataflow_irgen::ir::{BlockId, Constant, Function, InstId, Module, Opcode, Operand};

use crate::c_types::{self, TypeLayout};
use crate::error::HdlError;
use crate::inline::InlinePlan;
use crate::naming::{escape_ident, NameMangler};

pub const C_STANDARD_INCLUDES: &str =
    "#include <stdarg.h>\n#include <limits.h>\n#include <stdint.h>\n#include <math.h>\n";

pub const C_HELPER_MACROS: &str = "\
#define NORETURN __attribute__((noreturn))\n\
#define FORCEINLINE static inline __attribute__((always_inline))\n\
#define LLVM_NAN (__builtin_nan(\"\"))\n\
#define LLVM_NANF (__builtin_nanf(\"\"))\n\
#define LLVM_INF (__builtin_inf())\n\
#define LLVM_INFF (__builtin_inff())\n\
#ifndef __cplusplus\n\
#define bool uint8_t\n\
#define true 1\n\
#define false 0\n\
#endif\n";

fn binary_op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
    }
}

fn rel_op_symbol(op: RelOp) -> &'static str {
    match op {
        RelOp::Lt => "<",
        RelOp::Le => "<=",
        RelOp::Gt => ">",
        RelOp::Ge => ">=",
        RelOp::Eq => "==",
        RelOp::Ne => "!=",
    }
}

/// `true` iff the instruction's result is a usable C value -- excludes
/// pure-effect opcodes (`Store`/terminators/`Push`) and the two
/// address-only opcodes (`Alloca`/`Gep`), whose "value" is an lvalue
/// expression threaded through [`FnEmitter::addr_expr`] instead.
fn produces_value(opcode: &Opcode) -> bool {
    !matches!(
        opcode,
        Opcode::Store { .. }
            | Opcode::Br { .. }
            | Opcode::CondBr { .. }
            | Opcode::Ret { .. }
            | Opcode::Push { .. }
            | Opcode::Alloca { .. }
            | Opcode::Gep { .. }
    )
}

/// One filter declaration's C-source build-up (spec §4.5: "emission
/// accumulates into two buffers (header, bodies) concatenated at the
/// end").
struct FileBuffers {
    header: String,
    bodies: String,
}

/// Per-function emission state. Constructed fresh for each `Function`
/// (work/init/prework or a called user function) but shares the file-wide
/// [`TypeLayout`] and [`NameMangler`] so struct declarations and anonymous
/// names stay unique and consistently ordered across an entire `.c` file.
struct FnEmitter<'a> {
    module: &'a Module,
    registry: &'a TypeRegistry,
    layout: &'a mut TypeLayout,
    mangler: &'a mut NameMangler,
    reject_float: bool,
    is_channel_fn: bool,
    in_c_ty: Option<String>,
    out_c_ty: Option<String>,
    filter_name: &'a str,

    def_block: HashMap<InstId, BlockId>,
    plan: InlinePlan,
    var_name: HashMap<InstId, String>,
    addr_expr: HashMap<InstId, String>,
    bitcast_union: HashMap<InstId, String>,
    phis_by_block: HashMap<BlockId, Vec<InstId>>,
    decls: Vec<String>,
}

impl<'a> FnEmitter<'a> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        module: &'a Module,
        registry: &'a TypeRegistry,
        layout: &'a mut TypeLayout,
        mangler: &'a mut NameMangler,
        reject_float: bool,
        is_channel_fn: bool,
        in_c_ty: Option<String>,
        out_c_ty: Option<String>,
        filter_name: &'a str,
        function: &Function,
    ) -> FnEmitter<'a> {
        let mut def_block = HashMap::new();
        for (block_id, block) in function.blocks() {
            for &id in &block.insts {
                def_block.insert(id, block_id);
            }
        }
        let plan = InlinePlan::compute(function);
        FnEmitter {
            module,
            registry,
            layout,
            mangler,
            reject_float,
            is_channel_fn,
            in_c_ty,
            out_c_ty,
            filter_name,
            def_block,
            plan,
            var_name: HashMap::new(),
            addr_expr: HashMap::new(),
            bitcast_union: HashMap::new(),
            phis_by_block: HashMap::new(),
            decls: Vec::new(),
        }
    }

    fn c_type(&mut self, ty: TypeId) -> Result<String, HdlError> {
        self.layout.resolve(ty, self.registry, self.mangler, self.reject_float)
    }

    fn should_never_inline(opcode: &Opcode) -> bool {
        matches!(opcode, Opcode::Bitcast { .. } | Opcode::Phi { .. })
    }

    /// Best-effort type of an operand, used only to pick a signed/unsigned
    /// cast family for comparisons and casts whose opcode doesn't carry
    /// the source width directly. Falls back to `fallback` for a constant
    /// operand, which carries no type of its own.
    fn infer_operand_type(&self, function: &Function, operand: Operand, fallback: TypeId) -> TypeId {
        match operand {
            Operand::Value(id) => function.inst(id).ty,
            Operand::Arg(i) => function.params.get(i as usize).copied().unwrap_or(fallback),
            Operand::Global(g) => self.module.globals.get(g as usize).map(|g| g.ty).unwrap_or(fallback),
            Operand::Const(_) => fallback,
        }
    }

    fn bit_width(&self, ty: TypeId) -> u32 {
        types::bit_width(ty, self.registry).unwrap_or(32)
    }

    fn is_signed(&self, ty: TypeId) -> bool {
        c_types::is_signed(ty, self.registry)
    }

    fn is_float(&self, ty: TypeId) -> bool {
        matches!(self.registry.get(ty), Some(Type::Float))
    }

    fn is_integral(&self, ty: TypeId) -> bool {
        self.registry.get(ty).map(Type::is_integral).unwrap_or(false)
    }

    /// First pass: walks every block's instructions in order, declaring a
    /// C local for every value-producing, non-inlined instruction and
    /// resolving every `Alloca`/`Gep` to an lvalue expression. Order
    /// matters: `Gep`'s base must already be resolved, which dominance
    /// guarantees since a `Gep` only ever follows its base's definition.
    fn collect_declarations(&mut self, function: &Function) -> Result<(), HdlError> {
        for (block_id, block) in function.blocks() {
            let mut leading_phis = Vec::new();
            for &id in &block.insts {
                let inst = function.inst(id);
                match &inst.opcode {
                    Opcode::Alloca { elem_ty } => {
                        let name = self.mangler.anon_value();
                        let ty_name = self.c_type(*elem_ty)?;
                        self.decls.push(format!("    {ty_name} {name};"));
                        self.addr_expr.insert(id, name);
                    }
                    Opcode::Gep { base, indices } => {
                        if indices.len() != 1 {
                            return Err(HdlError::Internal(
                                "multi-index Gep has no source-language counterpart".into(),
                            ));
                        }
                        let base_expr = self.render_addr(function, *base)?;
                        let idx_expr = self.render_value(function, indices[0])?;
                        self.addr_expr.insert(id, format!("{base_expr}.data[{idx_expr}]"));
                    }
                    Opcode::Phi { .. } => {
                        leading_phis.push(id);
                        let var = self.mangler.anon_value();
                        let shadow = format!("{var}__PHI_TEMPORARY");
                        self.mangler.note_phi_shadow();
                        let ty_name = self.c_type(inst.ty)?;
                        self.decls.push(format!("    {ty_name} {var};"));
                        self.decls.push(format!("    {ty_name} {shadow};"));
                        self.var_name.insert(id, var);
                    }
                    Opcode::Bitcast { value, to } => {
                        let from_ty = self.infer_operand_type(function, *value, *to);
                        let from_c = self.c_type(from_ty)?;
                        let to_c = self.c_type(*to)?;
                        let union_name = self.mangler.bitcast_tmp();
                        self.decls
                            .push(format!("    union {{ {from_c} src; {to_c} dst; }} {union_name};"));
                        let var = self.mangler.anon_value();
                        self.decls.push(format!("    {to_c} {var};"));
                        self.bitcast_union.insert(id, union_name);
                        self.var_name.insert(id, var);
                    }
                    other if produces_value(other) => {
                        if self.plan.should_inline(id, block_id, other) && !Self::should_never_inline(other)
                        {
                            continue;
                        }
                        let var = self.mangler.anon_value();
                        let ty_name = self.c_type(inst.ty)?;
                        self.decls.push(format!("    {ty_name} {var};"));
                        self.var_name.insert(id, var);
                    }
                    _ => {}
                }
            }
            if !leading_phis.is_empty() {
                self.phis_by_block.insert(block_id, leading_phis);
            }
        }
        Ok(())
    }

    /// Resolves `operand` to the lvalue expression it addresses (only
    /// meaningful for `Alloca`/`Gep` results and `Global`s, which this
    /// backend never treats as raw pointers -- see the module doc).
    fn render_addr(&self, function: &Function, operand: Operand) -> Result<String, HdlError> {
        match operand {
            Operand::Value(id) => self
                .addr_expr
                .get(&id)
                .cloned()
                .ok_or_else(|| HdlError::Internal(format!("{id} used as an address but is not Alloca/Gep"))),
            Operand::Global(g) => {
                let global = self
                    .module
                    .globals
                    .get(g as usize)
                    .ok_or_else(|| HdlError::Internal(format!("global {g} out of range")))?;
                Ok(escape_ident(&global.name))
            }
            _ => {
                let _ = function;
                Err(HdlError::Internal("constant/argument operand used as an address".into()))
            }
        }
    }

    /// Literal text for a compile-time constant (spec §6: `LLVM_NAN{F}`/
    /// `LLVM_INF{F}` cover the non-finite float cases).
    fn render_const(&self, c: Constant) -> String {
        match c {
            Constant::Int(v) => format!("{v}"),
            Constant::Bool(b) => if b { "1" } else { "0" }.to_string(),
            Constant::Float(f) => {
                if f.is_nan() {
                    "LLVM_NANF".to_string()
                } else if f == f64::INFINITY {
                    "LLVM_INFF".to_string()
                } else if f == f64::NEG_INFINITY {
                    "(-LLVM_INFF)".to_string()
                } else {
                    format!("{f}f")
                }
            }
        }
    }

    /// Wraps `raw` in a truncating mask when `ty`'s logical width doesn't
    /// fill its container (spec §4.5 "Non-power-of-two integer widths").
    /// The mask is built from a shift rather than a precomputed literal so
    /// it stays correct for widths that don't fit a plain decimal constant
    /// (anything wider than 64 bits needs a `__int128` shift, not a
    /// literal the preprocessor could parse directly).
    fn masked(&self, raw: String, ty: TypeId) -> String {
        if !self.is_integral(ty) {
            return raw;
        }
        let width = self.bit_width(ty);
        if !c_types::needs_mask(width) {
            return raw;
        }
        let cty = container_cast_type(c_types::container_width(width), false);
        format!("(({raw}) & ((({cty})1 << {width}) - 1))")
    }

    /// Renders `operand`'s *value* (as opposed to [`Self::render_addr`]'s
    /// lvalue): an `Alloca`/`Gep` id still resolves through the address
    /// map (reading the variable/field it names), a non-inlined
    /// instruction resolves to its declared local, and an inlined
    /// instruction is recursively substituted at the use site.
    fn render_value(&mut self, function: &Function, operand: Operand) -> Result<String, HdlError> {
        match operand {
            Operand::Const(c) => Ok(self.render_const(c)),
            Operand::Arg(i) => Ok(format!("p{i}")),
            Operand::Global(g) => self.render_addr(function, Operand::Global(g)),
            Operand::Value(id) => {
                if let Some(addr) = self.addr_expr.get(&id) {
                    return Ok(addr.clone());
                }
                let inst = function.inst(id);
                let def_block = *self
                    .def_block
                    .get(&id)
                    .ok_or_else(|| HdlError::Internal(format!("{id} has no recorded defining block")))?;
                if self.plan.should_inline(id, def_block, &inst.opcode) && !Self::should_never_inline(&inst.opcode)
                {
                    self.value_expr(function, id)
                } else {
                    self.var_name
                        .get(&id)
                        .cloned()
                        .ok_or_else(|| HdlError::Internal(format!("{id} has no materialised name")))
                }
            }
        }
    }

    /// The masked value expression for instruction `id`: used both when
    /// materialising it into its declared local and when substituting it
    /// inline at a single use site, so masking is applied exactly once
    /// regardless of which path the instruction takes.
    fn value_expr(&mut self, function: &Function, id: InstId) -> Result<String, HdlError> {
        let inst = function.inst(id);
        let ty = inst.ty;
        let opcode = inst.opcode.clone();
        let raw = self.raw_expr(function, id, ty, &opcode)?;
        Ok(self.masked(raw, ty))
    }

    fn raw_expr(
        &mut self,
        function: &Function,
        id: InstId,
        ty: TypeId,
        opcode: &Opcode,
    ) -> Result<String, HdlError> {
        match opcode {
            Opcode::Load { ptr } => self.render_addr(function, *ptr),
            Opcode::Binary { op, lhs, rhs } => {
                let l = self.render_value(function, *lhs)?;
                let r = self.render_value(function, *rhs)?;
                let use_signed = matches!(op, BinaryOp::Div | BinaryOp::Mod | BinaryOp::Shr)
                    && self.is_signed(ty);
                let cty = if self.is_float(ty) {
                    self.c_type(ty)?
                } else {
                    container_cast_type(self.bit_width(ty), use_signed)
                };
                Ok(format!("((({cty})({l})) {} (({cty})({r})))", binary_op_symbol(*op)))
            }
            Opcode::Cmp { op, lhs, rhs } => {
                let lhs_ty = self.infer_operand_type(function, *lhs, TypeId::INT);
                let rhs_ty = self.infer_operand_type(function, *rhs, lhs_ty);
                let signed = self.is_signed(lhs_ty) || self.is_signed(rhs_ty);
                let width = self.bit_width(lhs_ty).max(self.bit_width(rhs_ty));
                let l = self.render_value(function, *lhs)?;
                let r = self.render_value(function, *rhs)?;
                if matches!(op, RelOp::Eq | RelOp::Ne) || self.is_float(lhs_ty) {
                    Ok(format!("(({l}) {} ({r}))", rel_op_symbol(*op)))
                } else {
                    let cty = container_cast_type(width, signed);
                    Ok(format!("((({cty})({l})) {} (({cty})({r})))", rel_op_symbol(*op)))
                }
            }
            Opcode::Neg(v) => {
                let inner = self.render_value(function, *v)?;
                if self.is_float(ty) {
                    Ok(format!("(-({inner}))"))
                } else if self.is_signed(ty) {
                    let cty = container_cast_type(self.bit_width(ty), true);
                    Ok(format!("(-(({cty})({inner})))"))
                } else {
                    let cty = container_cast_type(self.bit_width(ty), false);
                    Ok(format!("((({cty})0) - (({cty})({inner})))"))
                }
            }
            Opcode::LogicalNot(v) => {
                let inner = self.render_value(function, *v)?;
                Ok(format!("(!({inner}))"))
            }
            Opcode::BitNot(v) => {
                let inner = self.render_value(function, *v)?;
                let cty = container_cast_type(self.bit_width(ty), false);
                Ok(format!("(~(({cty})({inner})))"))
            }
            Opcode::Trunc { value, .. } => {
                let cty = self.c_type(ty)?;
                let inner = self.render_value(function, *value)?;
                Ok(format!("(({cty})({inner}))"))
            }
            Opcode::SExt { value, to } => {
                let from_ty = self.infer_operand_type(function, *value, *to);
                let from_w = self.bit_width(from_ty);
                let signed_from = container_cast_type(from_w, true);
                let to_c = self.c_type(*to)?;
                let inner = self.render_value(function, *value)?;
                Ok(format!("(({to_c})(({signed_from})({inner})))"))
            }
            Opcode::ZExt { value, to } => {
                let from_ty = self.infer_operand_type(function, *value, *to);
                let from_w = self.bit_width(from_ty);
                let unsigned_from = container_cast_type(from_w, false);
                let to_c = self.c_type(*to)?;
                let inner = self.render_value(function, *value)?;
                Ok(format!("(({to_c})(({unsigned_from})({inner})))"))
            }
            Opcode::IntToFloat { value, .. } => {
                let from_ty = self.infer_operand_type(function, *value, TypeId::INT);
                let signed_from = container_cast_type(self.bit_width(from_ty), true);
                let inner = self.render_value(function, *value)?;
                Ok(format!("((float)(({signed_from})({inner})))"))
            }
            Opcode::FloatToInt { value, .. } => {
                let cty = self.c_type(ty)?;
                let inner = self.render_value(function, *value)?;
                Ok(format!("(({cty})({inner}))"))
            }
            Opcode::Call { function: callee, args } => {
                let mut rendered = Vec::with_capacity(args.len());
                for &a in args {
                    rendered.push(self.render_value(function, a)?);
                }
                if self.is_channel_function_name(callee) {
                    rendered.push("in_ch".to_string());
                    rendered.push("out_ch".to_string());
                }
                Ok(format!("{}({})", escape_ident(callee), rendered.join(", ")))
            }
            Opcode::Pop => {
                if self.in_c_ty.is_none() {
                    return Err(HdlError::Internal("pop() in a filter with no input channel".into()));
                }
                Ok("in_ch->pop(in_ch->state)".to_string())
            }
            Opcode::Peek { index } => {
                if self.in_c_ty.is_none() {
                    return Err(HdlError::Internal("peek() in a filter with no input channel".into()));
                }
                let idx = self.render_value(function, *index)?;
                Ok(format!("in_ch->peek(in_ch->state, (uint32_t)({idx}))"))
            }
            Opcode::Phi { .. } => {
                let shadow = self
                    .var_name
                    .get(&id)
                    .map(|v| format!("{v}__PHI_TEMPORARY"))
                    .ok_or_else(|| HdlError::Internal(format!("{id} phi has no shadow")))?;
                Ok(shadow)
            }
            Opcode::Bitcast { value, .. } => {
                let union_name = self
                    .bitcast_union
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| HdlError::Internal(format!("{id} bitcast has no union temp")))?;
                let _ = value;
                Ok(format!("{union_name}.dst"))
            }
            _ => Err(HdlError::Internal(format!("opcode {opcode:?} has no value-producing form"))),
        }
    }

    fn is_channel_function_name(&self, name: &str) -> bool {
        name == format!("{}__work", self.filter_name)
            || name == format!("{}__init", self.filter_name)
            || name == format!("{}__prework", self.filter_name)
    }

    /// Second pass: emits every block as a label (skipped for the entry
    /// block, which has no predecessor) followed by its statements.
    fn emit_blocks(&mut self, function: &Function) -> Result<String, HdlError> {
        let mut out = String::new();
        for (block_id, block) in function.blocks() {
            if block_id != function.entry {
                out.push_str(&format!("{}_{}:\n", escape_ident(&block.name), block_id.0));
            }
            for &id in &block.insts {
                let inst = function.inst(id);
                match &inst.opcode {
                    Opcode::Alloca { .. } | Opcode::Gep { .. } => {}
                    Opcode::Phi { .. } => {
                        let var = self.var_name.get(&id).cloned().unwrap();
                        out.push_str(&format!("    {var} = {var}__PHI_TEMPORARY;\n"));
                    }
                    Opcode::Bitcast { value, .. } => {
                        let union_name = self.bitcast_union.get(&id).cloned().unwrap();
                        let inner = self.render_value(function, *value)?;
                        let var = self.var_name.get(&id).cloned().unwrap();
                        out.push_str(&format!("    {union_name}.src = {inner};\n"));
                        out.push_str(&format!("    {var} = {union_name}.dst;\n"));
                    }
                    Opcode::Store { ptr, value } => {
                        let target_ty = self.addr_pointee_ty(function, *ptr)?;
                        let lhs = self.render_addr(function, *ptr)?;
                        let rhs = self.render_value(function, *value)?;
                        let rhs = self.masked(rhs, target_ty);
                        out.push_str(&format!("    {lhs} = {rhs};\n"));
                    }
                    Opcode::Push { value } => {
                        if self.out_c_ty.is_none() {
                            return Err(HdlError::Internal("push() in a filter with no output channel".into()));
                        }
                        let rendered = self.render_value(function, *value)?;
                        out.push_str(&format!("    out_ch->push(out_ch->state, {rendered});\n"));
                    }
                    Opcode::Br { target } => {
                        self.emit_phi_assignments(function, block_id, *target, &mut out)?;
                        out.push_str(&format!(
                            "    goto {}_{};\n",
                            escape_ident(&function.block(*target).name),
                            target.0
                        ));
                    }
                    Opcode::CondBr { cond, then_block, else_block } => {
                        let cond_expr = self.render_value(function, *cond)?;
                        out.push_str(&format!("    if ({cond_expr}) {{\n"));
                        self.emit_phi_assignments(function, block_id, *then_block, &mut out)?;
                        out.push_str(&format!(
                            "        goto {}_{};\n",
                            escape_ident(&function.block(*then_block).name),
                            then_block.0
                        ));
                        out.push_str("    } else {\n");
                        self.emit_phi_assignments(function, block_id, *else_block, &mut out)?;
                        out.push_str(&format!(
                            "        goto {}_{};\n",
                            escape_ident(&function.block(*else_block).name),
                            else_block.0
                        ));
                        out.push_str("    }\n");
                    }
                    Opcode::Ret { value } => match value {
                        Some(v) => {
                            let expr = self.render_value(function, *v)?;
                            out.push_str(&format!("    return {expr};\n"));
                        }
                        None => out.push_str("    return;\n"),
                    },
                    other if produces_value(other) => {
                        let def_block = self.def_block[&id];
                        if self.plan.should_inline(id, def_block, other) {
                            continue;
                        }
                        if inst.ty == TypeId::VOID {
                            let expr = self.raw_expr(function, id, inst.ty, other)?;
                            out.push_str(&format!("    {expr};\n"));
                        } else {
                            let var = self.var_name.get(&id).cloned().unwrap();
                            let expr = self.value_expr(function, id)?;
                            out.push_str(&format!("    {var} = {expr};\n"));
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(out)
    }

    fn emit_phi_assignments(
        &mut self,
        function: &Function,
        pred: BlockId,
        target: BlockId,
        out: &mut String,
    ) -> Result<(), HdlError> {
        let Some(phi_ids) = self.phis_by_block.get(&target).cloned() else {
            return Ok(());
        };
        for phi_id in phi_ids {
            let incoming = match &function.inst(phi_id).opcode {
                Opcode::Phi { incoming } => incoming.clone(),
                _ => continue,
            };
            if let Some((_, value)) = incoming.iter().find(|(p, _)| *p == pred) {
                let ty = function.inst(phi_id).ty;
                let expr = self.render_value(function, *value)?;
                let expr = self.masked(expr, ty);
                let var = self.var_name.get(&phi_id).cloned().unwrap();
                out.push_str(&format!("        {var}__PHI_TEMPORARY = {expr};\n"));
            }
        }
        Ok(())
    }

    fn addr_pointee_ty(&self, function: &Function, ptr: Operand) -> Result<TypeId, HdlError> {
        match ptr {
            Operand::Value(id) => Ok(function.inst(id).ty),
            Operand::Global(g) => self
                .module
                .globals
                .get(g as usize)
                .map(|g| g.ty)
                .ok_or_else(|| HdlError::Internal(format!("global {g} out of range"))),
            _ => {
                let _ = function;
                Err(HdlError::Internal("store target is not an address".into()))
            }
        }
    }
}

/// Container integer type to cast through for a given width/signedness,
/// independent of any particular logical `Type` (used for the
/// unsigned-arithmetic rewrite, spec §4.5 "Arithmetic"). Rounds `width` up
/// to its container first, then delegates to [`c_types`]'s scalar mapping
/// so there's exactly one table for "width, signedness -> C type name".
fn container_cast_type(width: u32, signed: bool) -> &'static str {
    c_types::container_c_type(c_types::container_width(width), signed)
}

/// Everything needed to emit one filter declaration's `.c` file.
pub struct FilterCSource {
    pub filter_name: String,
    pub source: String,
}

/// Emits the `.c` source for one filter declaration: its `init`/`prework`/
/// `work` functions plus every user function transitively reachable from
/// them, preceded by standard includes, helper macros, struct
/// pre-declarations, channel typedefs, and this filter's persistent
/// globals (spec §4.5, §6).
pub fn emit_filter(
    module: &Module,
    filter_name: &str,
    input_type: TypeId,
    output_type: TypeId,
    registry: &TypeRegistry,
    reject_float: bool,
) -> Result<FilterCSource, HdlError> {
    let mut layout = TypeLayout::new();
    let mut mangler = NameMangler::new();

    let has_input = !matches!(registry.get(input_type), Some(Type::Void));
    let has_output = !matches!(registry.get(output_type), Some(Type::Void));

    let in_c_ty = if has_input {
        Some(layout.resolve(input_type, registry, &mut mangler, reject_float)?)
    } else {
        None
    };
    let out_c_ty = if has_output {
        Some(layout.resolve(output_type, registry, &mut mangler, reject_float)?)
    } else {
        None
    };

    let channel_fn_names: Vec<String> = ["init", "prework", "work"]
        .iter()
        .map(|phase| format!("{filter_name}__{phase}"))
        .filter(|n| module.function(n).is_some())
        .collect();

    let helper_names = reachable_helpers(module, &channel_fn_names);

    let mut prototypes = Vec::new();
    let mut bodies = Vec::new();

    for name in helper_names.iter().chain(channel_fn_names.iter()) {
        let function = module
            .function(name)
            .ok_or_else(|| HdlError::Internal(format!("function '{name}' vanished during emission")))?;
        let is_channel_fn = channel_fn_names.contains(name);
        let mut emitter = FnEmitter::new(
            module,
            registry,
            &mut layout,
            &mut mangler,
            reject_float,
            is_channel_fn,
            in_c_ty.clone(),
            out_c_ty.clone(),
            filter_name,
            function,
        );
        emitter.collect_declarations(function)?;
        let body_stmts = emitter.emit_blocks(function)?;

        let ret_c = layout.resolve(function.return_type, registry, &mut mangler, reject_float)?;
        let mut params: Vec<String> = Vec::with_capacity(function.params.len() + 2);
        for (i, &p) in function.params.iter().enumerate() {
            let pty = layout.resolve(p, registry, &mut mangler, reject_float)?;
            params.push(format!("{pty} p{i}"));
        }
        if is_channel_fn {
            if let Some(_ty) = &in_c_ty {
                params.push(format!("{}_in_channel_t *in_ch", escape_ident(filter_name)));
            }
            if let Some(_ty) = &out_c_ty {
                params.push(format!("{}_out_channel_t *out_ch", escape_ident(filter_name)));
            }
        }
        let params_text = if params.is_empty() { "void".to_string() } else { params.join(", ") };
        let signature = format!("static {ret_c} {}({params_text})", escape_ident(name));
        prototypes.push(format!("{signature};"));
        bodies.push(format!("{signature} {{\n{}\n{}}}\n", emitter.decls.join("\n"), body_stmts));
    }

    let mut header = String::new();
    header.push_str(C_STANDARD_INCLUDES);
    header.push('\n');
    header.push_str(C_HELPER_MACROS);
    header.push('\n');
    for decl in &layout.struct_decls {
        header.push_str(decl);
        header.push_str("\n\n");
    }
    if let Some(in_ty) = &in_c_ty {
        header.push_str(&format!(
            "typedef struct {{\n    {in_ty} (*pop)(void *state);\n    {in_ty} (*peek)(void *state, uint32_t index);\n    void *state;\n}} {}_in_channel_t;\n\n",
            escape_ident(filter_name)
        ));
    }
    if let Some(out_ty) = &out_c_ty {
        header.push_str(&format!(
            "typedef struct {{\n    void (*push)(void *state, {out_ty} value);\n    void *state;\n}} {}_out_channel_t;\n\n",
            escape_ident(filter_name)
        ));
    }
    for global in &module.globals {
        if global.name.starts_with(&format!("{filter_name}__")) {
            let ty_name = layout.resolve(global.ty, registry, &mut mangler, reject_float)?;
            let init = global.initial.map(render_top_level_const).unwrap_or_else(|| "0".to_string());
            header.push_str(&format!("static {ty_name} {} = {init};\n", escape_ident(&global.name)));
        }
    }
    header.push('\n');
    for proto in &prototypes {
        header.push_str(proto);
        header.push('\n');
    }
    header.push('\n');

    let mut source = header;
    source.push_str(&bodies.join("\n"));

    Ok(FilterCSource { filter_name: filter_name.to_string(), source })
}

fn render_top_level_const(c: Constant) -> String {
    match c {
        Constant::Int(v) => format!("{v}"),
        Constant::Bool(b) => if b { "1" } else { "0" }.to_string(),
        Constant::Float(f) => format!("{f}f"),
    }
}

/// BFS over `Opcode::Call` targets reachable from `roots`, restricted to
/// functions that exist in `module` and excluding the roots themselves
/// (callers get emitted separately, after their callees, so every call
/// site has already seen a prototype).
fn reachable_helpers(module: &Module, roots: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut stack: Vec<String> = roots.to_vec();
    while let Some(name) = stack.pop() {
        let Some(function) = module.function(&name) else { continue };
        for (_, block) in function.blocks() {
            for &id in &block.insts {
                if let Opcode::Call { function: callee, .. } = &function.inst(id).opcode {
                    if !roots.contains(callee) && !seen.contains(callee) {
                        seen.push(callee.clone());
                        stack.push(callee.clone());
                    }
                }
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_core::type_registry::TypeRegistry;
    use dataflow_irgen::builder::FunctionBuilder;
    use dataflow_irgen::ir::{GlobalVar, Operand};
    use dataflow_irgen::target::GenericStreamBuilder;

    fn counter_module() -> Module {
        // void -> int filter counter { int n = 0; work push 1 { push(n); n = n + 1; } }
        let mut module = Module::new("program");
        module.add_global(GlobalVar { name: "counter__n".into(), ty: TypeId::INT, initial: Some(Constant::Int(0)) });
        let mut fb = FunctionBuilder::new("counter__work", vec![], TypeId::VOID);
        let mut tgt = GenericStreamBuilder;
        let cur = fb.ins_load(TypeId::INT, Operand::Global(0));
        tgt.build_push(&mut fb, Operand::Value(cur));
        let next = fb.ins_binary(TypeId::INT, BinaryOp::Add, Operand::Value(cur), Operand::Const(Constant::Int(1)));
        fb.ins_store(Operand::Global(0), Operand::Value(next));
        fb.ins_ret(None);
        module.add_function(fb.finish());
        module
    }

    #[test]
    fn counter_filter_emits_push_and_increment() {
        let module = counter_module();
        let registry = TypeRegistry::new();
        let src = emit_filter(&module, "counter", TypeId::VOID, TypeId::INT, &registry, true).unwrap();
        assert!(src.source.contains("out_ch->push"));
        assert!(src.source.contains("counter__n"));
        assert!(src.source.contains("counter_out_channel_t"));
        assert!(!src.source.contains("in_channel_t"));
    }

    #[test]
    fn integer_only_flow_rejects_float_elements() {
        let module = counter_module();
        let registry = TypeRegistry::new();
        let err = emit_filter(&module, "counter", TypeId::VOID, TypeId::FLOAT, &registry, true).unwrap_err();
        assert!(matches!(err, HdlError::UnsupportedForHardware { .. }));
    }
}
