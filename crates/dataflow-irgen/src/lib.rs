//! Component C3: lowers a semantically-analysed program into SSA IR (spec
//! §4.3). Owns the in-house IR data model (no external compiler
//! infrastructure library is bound, per the Design Notes), the generic
//! lowering algorithm, the pluggable `TargetFragmentBuilder` seam that
//! `dataflow-hdl`'s C emitter will implement, and an in-process simulator
//! backend used to exercise lowered IR directly in tests.

pub mod builder;
pub mod error;
pub mod ir;
pub mod lower;
pub mod simulator;
pub mod target;

pub use error::IrError;
pub use ir::{BasicBlock, BlockId, Constant, Function, GlobalVar, InstId, Instruction, Module, Opcode, Operand};
pub use lower::Lowerer;
pub use target::{GenericStreamBuilder, TargetFragmentBuilder};
