//! Component C5: serialises SSA IR into C-syntax HLS source per filter and
//! a VHDL component shell / top-level interconnect / test bench for the
//! finished stream graph (spec §4.5).
//!
//! [`manifest::emit_program`] is the orchestration entry point: given the
//! [`dataflow_irgen::ir::Module`] C3 produced and the [`dataflow_graph::StreamGraph`]
//! C4 built, it drives [`c_emit`] once per filter declaration and [`vhdl`]
//! once per filter instance plus the shared top-level/test-bench pair, and
//! returns every artefact alongside a [`manifest::Manifest`] describing
//! them. Writing the artefacts to disk is left to `dataflow-cli` (spec §1:
//! file I/O is an external collaborator of the core).

pub mod c_emit;
pub mod c_types;
pub mod error;
pub mod inline;
pub mod manifest;
pub mod naming;
pub mod vhdl;

pub use error::HdlError;
pub use manifest::{emit_program, ArtifactKind, EmittedProgram, Manifest, ManifestEntry};
pub use vhdl::ClockConfig;
