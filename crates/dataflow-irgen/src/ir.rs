//! The in-house SSA IR (component C3, spec §3 "SSA IR", §9 "IR library
//! dependency").
//!
//! The source program's Design Notes assume an external compiler
//! infrastructure library supplies value/type/instruction/block/function/
//! module types. This reimplementation does not bind one: `Module`,
//! `Function`, `BasicBlock`, and `Instruction` here are sized to exactly
//! what §4.3 (lowering) and §4.5 (HDL emission) require -- no
//! target-independent optimization passes, no legacy pass manager.
//!
//! Instructions live in a per-function arena (`Vec<Instruction>`); a basic
//! block is just an ordered list of `InstId`s into that arena, mirroring
//! how the teacher's computational graph separates node identity (`NodeId`)
//! from node storage. PHI nodes are a first-class opcode, reconciling a
//! value across predecessor blocks by `(BlockId, Operand)` pairs.

use std::fmt;

use dataflow_core::ast::{BinaryOp, RelOp};
use dataflow_core::type_registry::TypeId;
use serde::{Deserialize, Serialize};

macro_rules! index_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

index_id!(BlockId);
index_id!(InstId);

/// A compile-time scalar constant, embedded directly as an operand rather
/// than materialised through an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i64),
    Bool(bool),
    Float(f64),
}

/// A use of a value: either a previously-emitted instruction's result, a
/// function argument, an embedded constant, or a module-level global (used
/// for a stateful filter's persistent fields, which must survive across
/// separate invocations of the `work` function).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Value(InstId),
    Arg(u32),
    Const(Constant),
    Global(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Opcode {
    // Memory
    Alloca { elem_ty: TypeId },
    Load { ptr: Operand },
    Store { ptr: Operand, value: Operand },
    /// Address computation: `base` plus a chain of structured indices
    /// (array index or struct field index), mirroring the source's GEP.
    Gep { base: Operand, indices: Vec<Operand> },

    // Arithmetic / bitwise
    Binary { op: BinaryOp, lhs: Operand, rhs: Operand },
    Cmp { op: RelOp, lhs: Operand, rhs: Operand },
    Neg(Operand),
    LogicalNot(Operand),
    BitNot(Operand),

    // Casts, resolved by the type lattice (§4.1) ahead of lowering
    Trunc { value: Operand, to: TypeId },
    SExt { value: Operand, to: TypeId },
    ZExt { value: Operand, to: TypeId },
    IntToFloat { value: Operand, to: TypeId },
    FloatToInt { value: Operand, to: TypeId },
    /// FP<->int reinterpretation, routed through a bitcast union at the C
    /// backend (§4.5 "FP<->int bitcasts").
    Bitcast { value: Operand, to: TypeId },

    Call { function: String, args: Vec<Operand> },

    /// Reconciles a value across predecessor blocks; valid only at block
    /// entry (spec §8 "SSA dominance").
    Phi { incoming: Vec<(BlockId, Operand)> },

    // Streaming primitives (spec §4.3 "Streaming primitives")
    Pop,
    Peek { index: Operand },
    Push { value: Operand },

    // Terminators
    Br { target: BlockId },
    CondBr { cond: Operand, then_block: BlockId, else_block: BlockId },
    Ret { value: Option<Operand> },
}

impl Opcode {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Opcode::Br { .. } | Opcode::CondBr { .. } | Opcode::Ret { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub ty: TypeId,
    pub opcode: Opcode,
    /// `None` for a synthesised/anonymous value; the C emitter's name
    /// mangling (§4.5) assigns a number when this is absent.
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub name: String,
    pub insts: Vec<InstId>,
}

impl BasicBlock {
    fn new(name: impl Into<String>) -> Self {
        BasicBlock { name: name.into(), insts: Vec::new() }
    }

    /// `true` iff this block already ends in a terminator -- used to guard
    /// against emitting unreachable code after an early `return`.
    pub fn is_terminated(&self, function: &Function) -> bool {
        self.insts
            .last()
            .map(|id| function.inst(*id).opcode.is_terminator())
            .unwrap_or(false)
    }
}

/// One lowered function: a filter's `init`/`prework`/`work` block, or a
/// user-declared function (spec §4.3: "one function per filter work block
/// plus a function per user-declared function").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<TypeId>,
    pub return_type: TypeId,
    pub entry: BlockId,
    blocks: Vec<BasicBlock>,
    instructions: Vec<Instruction>,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<TypeId>, return_type: TypeId) -> Self {
        let mut blocks = Vec::new();
        blocks.push(BasicBlock::new("entry"));
        Function {
            name: name.into(),
            params,
            return_type,
            entry: BlockId(0),
            blocks,
            instructions: Vec::new(),
        }
    }

    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(name));
        id
    }

    pub fn push_inst(&mut self, block: BlockId, inst: Instruction) -> InstId {
        let id = InstId(self.instructions.len() as u32);
        self.instructions.push(inst);
        self.blocks[block.index()].insts.push(id);
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.instructions[id.index()]
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks.iter().enumerate().map(|(i, b)| (BlockId(i as u32), b))
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Every use of a value is dominated by its definition (spec §8 "SSA
    /// dominance") because instructions are only ever pushed into the block
    /// currently being built and operands only ever reference already-built
    /// instructions or PHI results in predecessor blocks -- there is no
    /// mutation path that could construct a forward reference. This method
    /// re-checks that invariant structurally, for use in tests and as a
    /// post-lowering assertion.
    pub fn check_dominance(&self) -> bool {
        use std::collections::HashSet;
        let mut defined: HashSet<InstId> = HashSet::new();
        for (_, block) in self.blocks() {
            for &id in &block.insts {
                let inst = self.inst(id);
                if !matches!(inst.opcode, Opcode::Phi { .. }) {
                    for operand in operands_of(&inst.opcode) {
                        if let Operand::Value(used) = operand {
                            if !defined.contains(&used) {
                                return false;
                            }
                        }
                    }
                }
                defined.insert(id);
            }
        }
        true
    }
}

/// Every `Operand::Value` referenced directly by `opcode` (not recursively
/// -- operands are always flat references, never nested instructions).
pub fn operands_of(opcode: &Opcode) -> Vec<Operand> {
    match opcode {
        Opcode::Alloca { .. } => vec![],
        Opcode::Load { ptr } => vec![*ptr],
        Opcode::Store { ptr, value } => vec![*ptr, *value],
        Opcode::Gep { base, indices } => {
            let mut v = vec![*base];
            v.extend(indices.iter().copied());
            v
        }
        Opcode::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
        Opcode::Cmp { lhs, rhs, .. } => vec![*lhs, *rhs],
        Opcode::Neg(v) | Opcode::LogicalNot(v) | Opcode::BitNot(v) => vec![*v],
        Opcode::Trunc { value, .. }
        | Opcode::SExt { value, .. }
        | Opcode::ZExt { value, .. }
        | Opcode::IntToFloat { value, .. }
        | Opcode::FloatToInt { value, .. }
        | Opcode::Bitcast { value, .. } => vec![*value],
        Opcode::Call { args, .. } => args.clone(),
        Opcode::Phi { incoming } => incoming.iter().map(|(_, v)| *v).collect(),
        Opcode::Pop => vec![],
        Opcode::Peek { index } => vec![*index],
        Opcode::Push { value } => vec![*value],
        Opcode::Br { .. } => vec![],
        Opcode::CondBr { cond, .. } => vec![*cond],
        Opcode::Ret { value } => value.iter().copied().collect(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalVar {
    pub name: String,
    pub ty: TypeId,
    /// Present for a filter field with a constant initializer; `None` for
    /// an uninitialised persistent field.
    pub initial: Option<Constant>,
}

/// A lowered compilation unit: every filter work block and user function,
/// plus the globals backing stateful filters' persistent fields (spec §3
/// "Modules contain global variables and functions").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub globals: Vec<GlobalVar>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module { name: name.into(), globals: Vec::new(), functions: Vec::new() }
    }

    pub fn add_global(&mut self, global: GlobalVar) -> u32 {
        let id = self.globals.len() as u32;
        self.globals.push(global);
        id
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_core::type_registry::TypeId;

    #[test]
    fn push_inst_assigns_increasing_ids_and_appends_to_block() {
        let mut f = Function::new("work", vec![], TypeId::VOID);
        let entry = f.entry;
        let a = f.push_inst(entry, Instruction { ty: TypeId::INT, opcode: Opcode::Pop, name: None });
        let b = f.push_inst(
            entry,
            Instruction { ty: TypeId::INT, opcode: Opcode::Neg(Operand::Value(a)), name: None },
        );
        assert_eq!(a, InstId(0));
        assert_eq!(b, InstId(1));
        assert_eq!(f.block(entry).insts, vec![a, b]);
    }

    #[test]
    fn dominance_holds_for_straight_line_code() {
        let mut f = Function::new("f", vec![], TypeId::INT);
        let entry = f.entry;
        let c = f.push_inst(
            entry,
            Instruction { ty: TypeId::INT, opcode: Opcode::Binary {
                op: BinaryOp::Add,
                lhs: Operand::Const(Constant::Int(1)),
                rhs: Operand::Const(Constant::Int(2)),
            }, name: None },
        );
        f.push_inst(entry, Instruction { ty: TypeId::INT, opcode: Opcode::Ret { value: Some(Operand::Value(c)) }, name: None });
        assert!(f.check_dominance());
    }

    #[test]
    fn new_function_starts_with_one_entry_block() {
        let f = Function::new("f", vec![], TypeId::VOID);
        assert_eq!(f.block_count(), 1);
        assert_eq!(f.entry, BlockId(0));
    }

    #[test]
    fn phi_is_exempt_from_the_forward_use_check() {
        // A PHI's incoming values come from predecessor blocks that, in a
        // loop header, are defined *after* the PHI appears in source order
        // of block construction (the back edge). check_dominance only
        // requires definitions to already exist by the time a later
        // instruction is scanned for non-PHI operands; PHI operands are
        // skipped in that same-pass check since they are validated against
        // predecessor blocks, not against the textual instruction order.
        let mut f = Function::new("f", vec![], TypeId::INT);
        let entry = f.entry;
        let header = f.add_block("header");
        let phi = f.push_inst(
            header,
            Instruction {
                ty: TypeId::INT,
                opcode: Opcode::Phi { incoming: vec![(entry, Operand::Const(Constant::Int(0)))] },
                name: None,
            },
        );
        f.push_inst(header, Instruction { ty: TypeId::INT, opcode: Opcode::Ret { value: Some(Operand::Value(phi)) }, name: None });
        assert!(f.check_dominance());
    }
}
