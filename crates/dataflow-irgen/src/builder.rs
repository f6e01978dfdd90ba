//! `FunctionBuilder`: an IR builder tied to a "current" insertion point,
//! mirroring the source's "compound statements keep a running reference to
//! a `current_block` and an `ir_builder` tied to its insertion point"
//! (spec §4.3 step 2).

use dataflow_core::ast::{BinaryOp, RelOp};
use dataflow_core::type_registry::TypeId;

use crate::ir::{BasicBlock, BlockId, Constant, Function, InstId, Instruction, Opcode, Operand};

/// Break/continue targets for the loop currently being lowered (spec §4.3:
/// "Two stacks hold current break/continue targets").
#[derive(Default)]
pub struct LoopTargets {
    break_stack: Vec<BlockId>,
    continue_stack: Vec<BlockId>,
}

impl LoopTargets {
    pub fn push(&mut self, break_target: BlockId, continue_target: BlockId) {
        self.break_stack.push(break_target);
        self.continue_stack.push(continue_target);
    }

    pub fn pop(&mut self) {
        self.break_stack.pop();
        self.continue_stack.pop();
    }

    pub fn current_break(&self) -> Option<BlockId> {
        self.break_stack.last().copied()
    }

    pub fn current_continue(&self) -> Option<BlockId> {
        self.continue_stack.last().copied()
    }
}

/// Builds a single [`Function`] by tracking the block currently being
/// appended to. All `ins_*` helpers push to `current_block` and return the
/// new instruction's [`InstId`].
pub struct FunctionBuilder {
    pub function: Function,
    pub current_block: BlockId,
    pub loops: LoopTargets,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, params: Vec<TypeId>, return_type: TypeId) -> Self {
        let function = Function::new(name, params, return_type);
        let entry = function.entry;
        FunctionBuilder { function, current_block: entry, loops: LoopTargets::default() }
    }

    pub fn entry_block(&self) -> BlockId {
        self.function.entry
    }

    pub fn new_block(&mut self, name: impl Into<String>) -> BlockId {
        self.function.add_block(name)
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current_block = block;
    }

    /// `true` iff the current block already has a terminator, meaning any
    /// further instructions pushed into it would be unreachable (e.g. code
    /// following an unconditional `return` or `break`).
    pub fn current_block_is_terminated(&self) -> bool {
        self.function.block(self.current_block).is_terminated(&self.function)
    }

    fn push(&mut self, ty: TypeId, opcode: Opcode) -> InstId {
        self.function.push_inst(self.current_block, Instruction { ty, opcode, name: None })
    }

    /// Allocates a stack slot for `elem_ty`. The IR has no distinct pointer
    /// type, so the instruction's own `ty` doubles as the slot's pointee
    /// type; consumers that need "this is an address" just look at the
    /// opcode.
    pub fn ins_alloca(&mut self, elem_ty: TypeId) -> InstId {
        self.push(elem_ty, Opcode::Alloca { elem_ty })
    }

    pub fn ins_load(&mut self, ty: TypeId, ptr: Operand) -> InstId {
        self.push(ty, Opcode::Load { ptr })
    }

    pub fn ins_store(&mut self, ptr: Operand, value: Operand) {
        self.push(TypeId::VOID, Opcode::Store { ptr, value });
    }

    pub fn ins_gep(&mut self, ty: TypeId, base: Operand, indices: Vec<Operand>) -> InstId {
        self.push(ty, Opcode::Gep { base, indices })
    }

    pub fn ins_binary(&mut self, ty: TypeId, op: BinaryOp, lhs: Operand, rhs: Operand) -> InstId {
        self.push(ty, Opcode::Binary { op, lhs, rhs })
    }

    pub fn ins_cmp(&mut self, op: RelOp, lhs: Operand, rhs: Operand) -> InstId {
        self.push(TypeId::BOOL, Opcode::Cmp { op, lhs, rhs })
    }

    pub fn ins_neg(&mut self, ty: TypeId, v: Operand) -> InstId {
        self.push(ty, Opcode::Neg(v))
    }

    pub fn ins_logical_not(&mut self, v: Operand) -> InstId {
        self.push(TypeId::BOOL, Opcode::LogicalNot(v))
    }

    pub fn ins_bit_not(&mut self, ty: TypeId, v: Operand) -> InstId {
        self.push(ty, Opcode::BitNot(v))
    }

    pub fn ins_cast(&mut self, opcode: Opcode, to: TypeId) -> InstId {
        self.push(to, opcode)
    }

    pub fn ins_call(&mut self, ty: TypeId, function: String, args: Vec<Operand>) -> InstId {
        self.push(ty, Opcode::Call { function, args })
    }

    pub fn ins_phi(&mut self, ty: TypeId, incoming: Vec<(BlockId, Operand)>) -> InstId {
        self.function.push_inst(
            self.current_block,
            Instruction { ty, opcode: Opcode::Phi { incoming }, name: None },
        )
    }

    pub fn ins_pop(&mut self, ty: TypeId) -> InstId {
        self.push(ty, Opcode::Pop)
    }

    pub fn ins_peek(&mut self, ty: TypeId, index: Operand) -> InstId {
        self.push(ty, Opcode::Peek { index })
    }

    pub fn ins_push(&mut self, value: Operand) {
        self.push(TypeId::VOID, Opcode::Push { value });
    }

    pub fn ins_br(&mut self, target: BlockId) {
        if !self.current_block_is_terminated() {
            self.push(TypeId::VOID, Opcode::Br { target });
        }
    }

    pub fn ins_cond_br(&mut self, cond: Operand, then_block: BlockId, else_block: BlockId) {
        self.push(TypeId::VOID, Opcode::CondBr { cond, then_block, else_block });
    }

    pub fn ins_ret(&mut self, value: Option<Operand>) {
        if !self.current_block_is_terminated() {
            self.push(TypeId::VOID, Opcode::Ret { value });
        }
    }

    pub fn inst(&self, id: InstId) -> &Instruction {
        self.function.inst(id)
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.function.block(id)
    }

    pub fn finish(self) -> Function {
        self.function
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ret_after_ret_in_same_block_is_a_no_op() {
        let mut b = FunctionBuilder::new("f", vec![], TypeId::INT);
        b.ins_ret(Some(Operand::Const(Constant::Int(1))));
        let before = b.function.block(b.current_block).insts.len();
        b.ins_ret(Some(Operand::Const(Constant::Int(2))));
        let after = b.function.block(b.current_block).insts.len();
        assert_eq!(before, after, "unreachable second terminator must not be emitted");
    }

    #[test]
    fn br_targets_a_freshly_created_block() {
        let mut b = FunctionBuilder::new("f", vec![], TypeId::VOID);
        let target = b.new_block("merge");
        b.ins_br(target);
        match &b.inst(b.block(b.current_block).insts[0]).opcode {
            Opcode::Br { target: t } => assert_eq!(*t, target),
            other => panic!("expected Br, got {other:?}"),
        }
    }
}
