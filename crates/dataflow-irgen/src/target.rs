//! `TargetFragmentBuilder`: the pluggable channel-access capability set
//! (spec §4.3).
//!
//! `build_pop`/`build_peek`/`build_push` are "the only couplings between
//! the generic lowerer and any particular backend (software simulator,
//! C-like HDL backend, VHDL component)". [`GenericStreamBuilder`] is the
//! only implementation this workspace ships: it emits the ordinary
//! `Opcode::Pop`/`Peek`/`Push` instructions the IR already models, so both
//! downstream consumers -- `dataflow-hdl`'s C emitter and
//! `dataflow-irgen::simulator`'s interpreter -- work from identical IR and
//! differ only in how they *execute or serialise* those opcodes. A future
//! backend needing different channel-access IR (e.g. a hypothetical direct
//! LLVM target) would supply its own `TargetFragmentBuilder` instead.

use dataflow_core::type_registry::TypeId;

use crate::builder::FunctionBuilder;
use crate::ir::{InstId, Operand};

pub trait TargetFragmentBuilder {
    fn build_pop(&mut self, fb: &mut FunctionBuilder, element_ty: TypeId) -> InstId;
    fn build_peek(&mut self, fb: &mut FunctionBuilder, element_ty: TypeId, index: Operand) -> InstId;
    fn build_push(&mut self, fb: &mut FunctionBuilder, value: Operand);
}

/// The default, backend-agnostic `TargetFragmentBuilder`: just inserts the
/// generic streaming opcodes.
pub struct GenericStreamBuilder;

impl TargetFragmentBuilder for GenericStreamBuilder {
    fn build_pop(&mut self, fb: &mut FunctionBuilder, element_ty: TypeId) -> InstId {
        fb.ins_pop(element_ty)
    }

    fn build_peek(&mut self, fb: &mut FunctionBuilder, element_ty: TypeId, index: Operand) -> InstId {
        fb.ins_peek(element_ty, index)
    }

    fn build_push(&mut self, fb: &mut FunctionBuilder, value: Operand) {
        fb.ins_push(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Opcode;

    #[test]
    fn generic_builder_emits_plain_pop_opcode() {
        let mut fb = FunctionBuilder::new("work", vec![], TypeId::VOID);
        let mut target = GenericStreamBuilder;
        let id = target.build_pop(&mut fb, TypeId::INT);
        assert!(matches!(fb.inst(id).opcode, Opcode::Pop));
    }
}
