//! A second, simpler `TargetFragmentBuilder`-adjacent backend: an in-memory
//! FIFO-backed interpreter that executes a lowered `Function` directly,
//! without going through an HDL toolchain. This is what proves a filter's
//! behavior end-to-end (e.g. a counter filter pushing 0, 1, 2, 3, ...)
//! against nothing but the generic IR `dataflow-irgen::lower` already
//! produces.
//!
//! The interpreter walks basic blocks, following `Br`/`CondBr` targets and
//! resolving `Phi` nodes against the previously-executed block, which is
//! exactly the predecessor-tracking a real dominance-respecting SSA
//! consumer needs.

use std::collections::{HashMap, VecDeque};

use dataflow_core::ast::{BinaryOp, RelOp};

use crate::error::IrError;
use crate::ir::{BlockId, Constant, Function, GlobalVar, InstId, Module, Opcode, Operand};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Float(f64),
}

impl Value {
    fn as_i64(self) -> i64 {
        match self {
            Value::Int(v) => v,
            Value::Bool(b) => b as i64,
            Value::Float(f) => f as i64,
        }
    }

    fn as_bool(self) -> bool {
        match self {
            Value::Bool(b) => b,
            Value::Int(v) => v != 0,
            Value::Float(f) => f != 0.0,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Value::Float(f) => f,
            Value::Int(v) => v as f64,
            Value::Bool(b) => (b as i64) as f64,
        }
    }
}

impl From<Constant> for Value {
    fn from(c: Constant) -> Self {
        match c {
            Constant::Int(v) => Value::Int(v),
            Constant::Bool(v) => Value::Bool(v),
            Constant::Float(v) => Value::Float(v),
        }
    }
}

/// One memory cell per module global, seeded from each `GlobalVar`'s
/// constant initializer (spec §3 "module-level globals"); uninitialised
/// persistent fields start at the type's zero value.
pub fn init_globals(module: &Module) -> Vec<Value> {
    module.globals.iter().map(GlobalVar::initial_or_zero).collect()
}

trait InitialOrZero {
    fn initial_or_zero(&self) -> Value;
}

impl InitialOrZero for GlobalVar {
    fn initial_or_zero(&self) -> Value {
        self.initial.map(Value::from).unwrap_or(Value::Int(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Address {
    Slot(u32, u32),
    Global(u32, u32),
}

impl Address {
    fn add_offset(self, extra: u32) -> Self {
        match self {
            Address::Slot(s, o) => Address::Slot(s, o + extra),
            Address::Global(g, o) => Address::Global(g, o + extra),
        }
    }
}

#[derive(Default)]
struct Frame {
    values: HashMap<InstId, Value>,
    addrs: HashMap<InstId, Address>,
    slots: Vec<Vec<Value>>,
}

fn eval_addr(frame: &Frame, op: Operand) -> Result<Address, IrError> {
    match op {
        Operand::Value(id) => frame
            .addrs
            .get(&id)
            .copied()
            .ok_or_else(|| IrError::Internal(format!("{id} does not denote an address"))),
        Operand::Global(idx) => Ok(Address::Global(idx, 0)),
        _ => Err(IrError::Internal("expected an address operand".into())),
    }
}

fn eval_value(frame: &Frame, globals: &[Value], args: &[Value], op: Operand) -> Result<Value, IrError> {
    match op {
        Operand::Const(c) => Ok(Value::from(c)),
        Operand::Arg(i) => args
            .get(i as usize)
            .copied()
            .ok_or_else(|| IrError::Internal("argument index out of range".into())),
        Operand::Value(id) => frame
            .values
            .get(&id)
            .copied()
            .ok_or_else(|| IrError::Internal(format!("{id} has no computed value yet"))),
        Operand::Global(idx) => globals
            .get(idx as usize)
            .copied()
            .ok_or_else(|| IrError::Internal("global index out of range".into())),
    }
}

fn read(frame: &Frame, globals: &[Value], addr: Address) -> Result<Value, IrError> {
    match addr {
        Address::Slot(slot, offset) => frame
            .slots
            .get(slot as usize)
            .and_then(|s| s.get(offset as usize))
            .copied()
            .ok_or_else(|| IrError::Internal("slot offset out of range".into())),
        Address::Global(idx, _) => globals
            .get(idx as usize)
            .copied()
            .ok_or_else(|| IrError::Internal("global index out of range".into())),
    }
}

fn write(frame: &mut Frame, globals: &mut [Value], addr: Address, value: Value) -> Result<(), IrError> {
    match addr {
        Address::Slot(slot, offset) => {
            let s = frame
                .slots
                .get_mut(slot as usize)
                .ok_or_else(|| IrError::Internal("slot index out of range".into()))?;
            if offset as usize >= s.len() {
                s.resize(offset as usize + 1, Value::Int(0));
            }
            s[offset as usize] = value;
        }
        Address::Global(idx, _) => {
            let g = globals
                .get_mut(idx as usize)
                .ok_or_else(|| IrError::Internal("global index out of range".into()))?;
            *g = value;
        }
    }
    Ok(())
}

fn eval_binary(op: BinaryOp, l: Value, r: Value) -> Value {
    if matches!(l, Value::Float(_)) || matches!(r, Value::Float(_)) {
        let (a, b) = (l.as_f64(), r.as_f64());
        return Value::Float(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a % b,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr => {
                unreachable!("semantic analysis rejects bitwise operators on float operands")
            }
        });
    }
    let (a, b) = (l.as_i64(), r.as_i64());
    Value::Int(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => a.wrapping_div(b),
        BinaryOp::Mod => a.wrapping_rem(b),
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::Shl => a.wrapping_shl(b as u32),
        BinaryOp::Shr => a.wrapping_shr(b as u32),
    })
}

fn eval_cmp(op: RelOp, l: Value, r: Value) -> bool {
    let (a, b) = if matches!(l, Value::Float(_)) || matches!(r, Value::Float(_)) {
        (l.as_f64(), r.as_f64())
    } else {
        (l.as_i64() as f64, r.as_i64() as f64)
    };
    match op {
        RelOp::Lt => a < b,
        RelOp::Le => a <= b,
        RelOp::Gt => a > b,
        RelOp::Ge => a >= b,
        RelOp::Eq => a == b,
        RelOp::Ne => a != b,
    }
}

/// Executes `function` once against `args`, reading/writing `globals` and
/// `input`/`output` for any `Pop`/`Peek`/`Push`. Returns the `Ret` value, if
/// any. A fresh [`Frame`] (stack slots, computed values) is used per call;
/// globals are the caller's to thread across repeated invocations so a
/// stateful filter's `work` can be called once per firing.
pub fn run(
    function: &Function,
    args: &[Value],
    globals: &mut [Value],
    input: &mut VecDeque<Value>,
    output: &mut Vec<Value>,
) -> Result<Option<Value>, IrError> {
    let mut frame = Frame::default();
    let mut block = function.entry;
    let mut prev_block = function.entry;

    loop {
        let bb = function.block(block);
        let mut terminator_result: Option<Option<Value>> = None;
        let mut next_block: Option<BlockId> = None;

        for &iid in &bb.insts {
            let inst = function.inst(iid);
            match &inst.opcode {
                Opcode::Alloca { .. } => {
                    let slot_id = frame.slots.len() as u32;
                    frame.slots.push(vec![Value::Int(0)]);
                    frame.addrs.insert(iid, Address::Slot(slot_id, 0));
                }
                Opcode::Load { ptr } => {
                    let addr = eval_addr(&frame, *ptr)?;
                    let v = read(&frame, globals, addr)?;
                    frame.values.insert(iid, v);
                }
                Opcode::Store { ptr, value } => {
                    let addr = eval_addr(&frame, *ptr)?;
                    let v = eval_value(&frame, globals, args, *value)?;
                    write(&mut frame, globals, addr, v)?;
                }
                Opcode::Gep { base, indices } => {
                    let base_addr = eval_addr(&frame, *base)?;
                    let mut offset: i64 = 0;
                    for idx in indices {
                        offset += eval_value(&frame, globals, args, *idx)?.as_i64();
                    }
                    frame.addrs.insert(iid, base_addr.add_offset(offset as u32));
                }
                Opcode::Binary { op, lhs, rhs } => {
                    let l = eval_value(&frame, globals, args, *lhs)?;
                    let r = eval_value(&frame, globals, args, *rhs)?;
                    frame.values.insert(iid, eval_binary(*op, l, r));
                }
                Opcode::Cmp { op, lhs, rhs } => {
                    let l = eval_value(&frame, globals, args, *lhs)?;
                    let r = eval_value(&frame, globals, args, *rhs)?;
                    frame.values.insert(iid, Value::Bool(eval_cmp(*op, l, r)));
                }
                Opcode::Neg(v) => {
                    let val = eval_value(&frame, globals, args, *v)?;
                    let negated = match val {
                        Value::Float(f) => Value::Float(-f),
                        other => Value::Int(-other.as_i64()),
                    };
                    frame.values.insert(iid, negated);
                }
                Opcode::LogicalNot(v) => {
                    let val = eval_value(&frame, globals, args, *v)?;
                    frame.values.insert(iid, Value::Bool(!val.as_bool()));
                }
                Opcode::BitNot(v) => {
                    let val = eval_value(&frame, globals, args, *v)?;
                    frame.values.insert(iid, Value::Int(!val.as_i64()));
                }
                Opcode::Trunc { value, .. } | Opcode::SExt { value, .. } | Opcode::ZExt { value, .. } => {
                    let v = eval_value(&frame, globals, args, *value)?;
                    frame.values.insert(iid, Value::Int(v.as_i64()));
                }
                Opcode::IntToFloat { value, .. } => {
                    let v = eval_value(&frame, globals, args, *value)?;
                    frame.values.insert(iid, Value::Float(v.as_f64()));
                }
                Opcode::FloatToInt { value, .. } => {
                    let v = eval_value(&frame, globals, args, *value)?;
                    frame.values.insert(iid, Value::Int(v.as_i64()));
                }
                Opcode::Bitcast { value, .. } => {
                    let v = eval_value(&frame, globals, args, *value)?;
                    frame.values.insert(iid, v);
                }
                Opcode::Call { function, .. } => {
                    return Err(IrError::Internal(format!(
                        "simulator does not cross function boundaries (call to `{function}`); \
                         run each function independently"
                    )));
                }
                Opcode::Phi { incoming } => {
                    let selected = incoming
                        .iter()
                        .find(|(b, _)| *b == prev_block)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| {
                            IrError::Internal("phi has no incoming edge for the executed predecessor".into())
                        })?;
                    let v = eval_value(&frame, globals, args, selected)?;
                    frame.values.insert(iid, v);
                }
                Opcode::Pop => {
                    let v = input.pop_front().ok_or(IrError::FifoUnderrun)?;
                    frame.values.insert(iid, v);
                }
                Opcode::Peek { index } => {
                    let idx = eval_value(&frame, globals, args, *index)?.as_i64() as usize;
                    let v = *input.get(idx).ok_or(IrError::FifoUnderrun)?;
                    frame.values.insert(iid, v);
                }
                Opcode::Push { value } => {
                    let v = eval_value(&frame, globals, args, *value)?;
                    output.push(v);
                }
                Opcode::Br { target } => next_block = Some(*target),
                Opcode::CondBr { cond, then_block, else_block } => {
                    let c = eval_value(&frame, globals, args, *cond)?;
                    next_block = Some(if c.as_bool() { *then_block } else { *else_block });
                }
                Opcode::Ret { value } => {
                    let v = match value {
                        Some(op) => Some(eval_value(&frame, globals, args, *op)?),
                        None => None,
                    };
                    terminator_result = Some(v);
                }
            }
        }

        if let Some(result) = terminator_result {
            return Ok(result);
        }
        let nb = next_block
            .ok_or_else(|| IrError::Internal("basic block fell through without a terminator".into()))?;
        prev_block = block;
        block = nb;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::Lowerer;
    use crate::target::GenericStreamBuilder;
    use dataflow_core::ast::{
        AssignOp, BinaryOp as AstBinaryOp, Declaration, DeclarationKind, ExprKind, Expression,
        FilterDecl, Statement, StmtKind, WorkBlock,
    };
    use dataflow_core::span::Span;
    use dataflow_core::type_registry::{TypeId, TypeRegistry};
    use dataflow_core::ast::SourceProgram;

    /// `0 -> int filter counter() stateful { int count = 0; work push 1 {
    /// push(count); count = count + 1; } }` -- the scenario from spec §8.
    fn counter_program() -> SourceProgram {
        let mut p = SourceProgram::new(TypeRegistry::new());
        let field = p.push_decl(Declaration {
            name: "count".into(),
            span: Span::synthetic(),
            ty: TypeId::INT,
            constant: false,
            kind: DeclarationKind::Variable,
            initializer: Some(p_int_literal(&mut p, 0)),
            array_length_expr: None,
        });

        let count_read = p.push_expr(Expression {
            span: Span::synthetic(),
            resolved_type: Some(TypeId::INT),
            kind: ExprKind::Identifier { name: "count".into(), decl: Some(field) },
        });
        let push_stmt = p.push_stmt(Statement { span: Span::synthetic(), kind: StmtKind::Push(count_read) });

        let count_lhs = p.push_expr(Expression {
            span: Span::synthetic(),
            resolved_type: Some(TypeId::INT),
            kind: ExprKind::Identifier { name: "count".into(), decl: Some(field) },
        });
        let count_rhs = p.push_expr(Expression {
            span: Span::synthetic(),
            resolved_type: Some(TypeId::INT),
            kind: ExprKind::Identifier { name: "count".into(), decl: Some(field) },
        });
        let one = p_int_literal(&mut p, 1);
        let sum = p.push_expr(Expression {
            span: Span::synthetic(),
            resolved_type: Some(TypeId::INT),
            kind: ExprKind::Binary { op: AstBinaryOp::Add, lhs: count_rhs, rhs: one },
        });
        let assign = p.push_expr(Expression {
            span: Span::synthetic(),
            resolved_type: Some(TypeId::INT),
            kind: ExprKind::Assign { op: AssignOp::Assign, target: count_lhs, value: sum },
        });
        let assign_stmt = p.push_stmt(Statement { span: Span::synthetic(), kind: StmtKind::Expr(assign) });

        let filter = FilterDecl {
            input_type: TypeId::VOID,
            output_type: TypeId::INT,
            stateful: true,
            params: vec![],
            fields: vec![field],
            init: None,
            prework: None,
            work: WorkBlock { peek: None, pop: None, push: None, body: vec![push_stmt, assign_stmt] },
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
        p
    }

    fn p_int_literal(p: &mut SourceProgram, v: i64) -> dataflow_core::id::ExprId {
        p.push_expr(Expression { span: Span::synthetic(), resolved_type: Some(TypeId::INT), kind: ExprKind::IntLiteral(v) })
    }

    #[test]
    fn counter_filter_pushes_increasing_integers() {
        let program = counter_program();
        let lowerer = Lowerer::new(&program);
        let mut tgt = GenericStreamBuilder;
        let module = lowerer.lower_program(&mut tgt).unwrap();
        let work = module.function("counter__work").unwrap();
        assert!(work.check_dominance());

        let mut globals = init_globals(&module);
        let mut input = VecDeque::new();
        let mut output = Vec::new();
        for _ in 0..4 {
            run(work, &[], &mut globals, &mut input, &mut output).unwrap();
        }
        assert_eq!(output, vec![Value::Int(0), Value::Int(1), Value::Int(2), Value::Int(3)]);
    }
}
