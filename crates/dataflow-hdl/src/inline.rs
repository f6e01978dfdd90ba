//! Instruction-inlining analysis (spec §4.5 "Instruction inlining").
//!
//! "An instruction is inlined into its single use iff: result has one use;
//! use is in the same basic block; opcode is not a load, call, PHI,
//! terminator, or insert-op (loads may not cross stores)." This IR has no
//! insert-op (aggregate values are never rebuilt in place -- array/struct
//! writes always go through `Store`), so that clause never excludes
//! anything here; it's kept in the doc comment only to name where the
//! teacher's rule came from.

use std::collections::HashMap;

use dataflow_irgen::ir::{operands_of, BlockId, Function, InstId, Opcode, Operand};

#[derive(Debug, Clone, Copy, Default)]
struct UseInfo {
    count: u32,
    /// The block the (first, and only, if count==1) use appeared in.
    block: Option<BlockId>,
}

/// Per-function inlining decision: which `InstId`s can be substituted
/// textually into their single use rather than bound to a C local.
pub struct InlinePlan {
    uses: HashMap<InstId, UseInfo>,
}

impl InlinePlan {
    /// Computes the plan for `function`. A PHI's incoming value is counted
    /// as used in its *predecessor* block, not the block the PHI itself
    /// sits in -- that's where the shadow-variable assignment the PHI
    /// lowers to (§4.5 "PHI nodes") will actually read it.
    pub fn compute(function: &Function) -> InlinePlan {
        let mut uses: HashMap<InstId, UseInfo> = HashMap::new();
        for (block_id, block) in function.blocks() {
            for &inst_id in &block.insts {
                let inst = function.inst(inst_id);
                match &inst.opcode {
                    Opcode::Phi { incoming } => {
                        for (pred, operand) in incoming {
                            if let Operand::Value(used) = operand {
                                let entry = uses.entry(*used).or_default();
                                entry.count += 1;
                                entry.block = Some(*pred);
                            }
                        }
                    }
                    other => {
                        for operand in operands_of(other) {
                            if let Operand::Value(used) = operand {
                                let entry = uses.entry(used).or_default();
                                entry.count += 1;
                                entry.block = Some(block_id);
                            }
                        }
                    }
                }
            }
        }
        InlinePlan { uses }
    }

    /// `true` iff `id` (defined in `def_block` with opcode `opcode`) should
    /// be substituted into its use rather than bound to a named local.
    pub fn should_inline(&self, id: InstId, def_block: BlockId, opcode: &Opcode) -> bool {
        if matches!(
            opcode,
            Opcode::Load { .. } | Opcode::Call { .. } | Opcode::Phi { .. }
        ) || opcode.is_terminator()
        {
            return false;
        }
        match self.uses.get(&id) {
            Some(info) => info.count == 1 && info.block == Some(def_block),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_core::ast::BinaryOp;
    use dataflow_core::type_registry::TypeId;
    use dataflow_irgen::builder::FunctionBuilder;
    use dataflow_irgen::ir::Constant;

    #[test]
    fn single_use_same_block_arithmetic_is_inlined() {
        let mut fb = FunctionBuilder::new("f", vec![], TypeId::INT);
        let a = fb.ins_binary(
            TypeId::INT,
            BinaryOp::Add,
            Operand::Const(Constant::Int(1)),
            Operand::Const(Constant::Int(2)),
        );
        fb.ins_ret(Some(Operand::Value(a)));
        let f = fb.finish();
        let plan = InlinePlan::compute(&f);
        let opcode = &f.inst(a).opcode;
        assert!(plan.should_inline(a, f.entry, opcode));
    }

    #[test]
    fn load_is_never_inlined_even_with_one_use() {
        let mut fb = FunctionBuilder::new("f", vec![], TypeId::INT);
        let slot = fb.ins_alloca(TypeId::INT);
        let loaded = fb.ins_load(TypeId::INT, Operand::Value(slot));
        fb.ins_ret(Some(Operand::Value(loaded)));
        let f = fb.finish();
        let plan = InlinePlan::compute(&f);
        assert!(!plan.should_inline(loaded, f.entry, &f.inst(loaded).opcode));
    }

    #[test]
    fn multi_use_value_is_not_inlined() {
        let mut fb = FunctionBuilder::new("f", vec![], TypeId::INT);
        let a = fb.ins_binary(
            TypeId::INT,
            BinaryOp::Add,
            Operand::Const(Constant::Int(1)),
            Operand::Const(Constant::Int(2)),
        );
        let b = fb.ins_binary(TypeId::INT, BinaryOp::Mul, Operand::Value(a), Operand::Value(a));
        fb.ins_ret(Some(Operand::Value(b)));
        let f = fb.finish();
        let plan = InlinePlan::compute(&f);
        assert!(!plan.should_inline(a, f.entry, &f.inst(a).opcode));
    }
}
