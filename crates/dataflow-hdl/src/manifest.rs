//! Project manifest (spec §6: "one project manifest listing all produced
//! files") and [`emit_program`], the orchestration entry point tying
//! `c_emit`/`vhdl` together the way `dataflow-graph`'s `build` ties its own
//! sub-passes together.

use serde::{Deserialize, Serialize};

use dataflow_core::type_registry::TypeRegistry;
use dataflow_graph::node::StreamNode;
use dataflow_graph::StreamGraph;
use dataflow_irgen::ir::Module;

use crate::c_emit::{self, FilterCSource};
use crate::error::HdlError;
use crate::vhdl::{self, ClockConfig, FilterWrapper, TestBench, TopLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    HlsC,
    FilterVhdl,
    TopVhdl,
    TestBenchVhdl,
    Manifest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub kind: ArtifactKind,
    /// The filter or top-level component this artefact belongs to; `None`
    /// for the manifest itself.
    pub owner: Option<String>,
    /// blake3 content hash of the emitted source, hex-encoded. Lets a build
    /// pipeline skip re-synthesising a filter whose hash hasn't changed
    /// since the last run, the way `lmlang-codegen::incremental` hashes
    /// function bodies to skip unchanged ones.
    pub content_hash: String,
}

fn content_hash(source: &str) -> String {
    blake3::hash(source.as_bytes()).to_hex().to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub files: Vec<ManifestEntry>,
}

/// Every artefact `emit_program` produced, still in memory -- writing them
/// to disk is the CLI's job (spec §1: file I/O is an external collaborator
/// of the core).
pub struct EmittedProgram {
    pub filter_c_sources: Vec<FilterCSource>,
    pub filter_wrappers: Vec<FilterWrapper>,
    pub top_level: TopLevel,
    pub test_bench: TestBench,
    pub manifest: Manifest,
}

fn filename_for(kind: ArtifactKind, name: &str) -> String {
    match kind {
        ArtifactKind::HlsC => format!("{name}.c"),
        ArtifactKind::FilterVhdl => format!("{name}.vhd"),
        ArtifactKind::TopVhdl => format!("{name}.vhd"),
        ArtifactKind::TestBenchVhdl => format!("{name}.vhd"),
        ArtifactKind::Manifest => "manifest.json".to_string(),
    }
}

/// Emits every artefact for a finished compile: one `.c` per distinct
/// filter declaration, one wrapper `.vhd` per filter *instance*, the
/// top-level interconnect, the test bench, and the manifest describing all
/// of them (spec §4.5, §6).
pub fn emit_program(
    module: &Module,
    graph: &StreamGraph,
    registry: &TypeRegistry,
    top_entity_name: &str,
    clock: &ClockConfig,
    reject_float: bool,
) -> Result<EmittedProgram, HdlError> {
    let mut filter_c_sources = Vec::new();
    let mut seen_decls = Vec::new();
    let mut filter_wrappers = Vec::new();
    let mut manifest = Manifest::default();

    for (node_id, node) in graph.nodes() {
        let StreamNode::Filter(filter) = node else { continue };

        if !seen_decls.contains(&filter.decl) {
            seen_decls.push(filter.decl);
            let src = c_emit::emit_filter(
                module,
                &filter.name,
                filter.input_type,
                filter.output_type,
                registry,
                reject_float,
            )?;
            manifest.files.push(ManifestEntry {
                path: filename_for(ArtifactKind::HlsC, &filter.name),
                kind: ArtifactKind::HlsC,
                owner: Some(filter.name.clone()),
                content_hash: content_hash(&src.source),
            });
            filter_c_sources.push(src);
        }

        let wrapper = vhdl::emit_filter_wrapper(graph, node_id, registry)?;
        manifest.files.push(ManifestEntry {
            path: filename_for(ArtifactKind::FilterVhdl, &wrapper.entity_name),
            kind: ArtifactKind::FilterVhdl,
            owner: Some(filter.name.clone()),
            content_hash: content_hash(&wrapper.source),
        });
        filter_wrappers.push(wrapper);
    }

    let top_level = vhdl::emit_top_level(graph, top_entity_name, registry)?;
    manifest.files.push(ManifestEntry {
        path: filename_for(ArtifactKind::TopVhdl, top_entity_name),
        kind: ArtifactKind::TopVhdl,
        owner: None,
        content_hash: content_hash(&top_level.source),
    });

    let test_bench = vhdl::emit_test_bench(graph, top_entity_name, clock)?;
    manifest.files.push(ManifestEntry {
        path: filename_for(ArtifactKind::TestBenchVhdl, &test_bench.entity_name),
        kind: ArtifactKind::TestBenchVhdl,
        owner: None,
        content_hash: content_hash(&test_bench.source),
    });

    manifest.files.push(ManifestEntry {
        path: filename_for(ArtifactKind::Manifest, "manifest"),
        kind: ArtifactKind::Manifest,
        owner: None,
        content_hash: String::new(),
    });

    Ok(EmittedProgram { filter_c_sources, filter_wrappers, top_level, test_bench, manifest })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_core::id::{DeclId, FilterId};
    use dataflow_core::type_registry::TypeId;
    use dataflow_graph::node::FilterNode;
    use dataflow_graph::Channel;
    use dataflow_irgen::builder::FunctionBuilder;
    use dataflow_irgen::ir::{GlobalVar, Operand};
    use dataflow_irgen::target::GenericStreamBuilder;

    fn counter_program() -> (Module, StreamGraph, TypeRegistry) {
        let mut module = Module::new("program");
        module.add_global(GlobalVar { name: "counter__n".into(), ty: TypeId::INT, initial: Some(dataflow_irgen::ir::Constant::Int(0)) });
        let mut fb = FunctionBuilder::new("counter__work", vec![], TypeId::VOID);
        let mut tgt = GenericStreamBuilder;
        let cur = fb.ins_load(TypeId::INT, Operand::Global(0));
        tgt.build_push(&mut fb, Operand::Value(cur));
        fb.ins_ret(None);
        module.add_function(fb.finish());

        let mut graph = StreamGraph::new();
        let node = graph.add_filter(FilterNode {
            instance_id: FilterId(0),
            name: "counter".into(),
            decl: DeclId(0),
            input_type: TypeId::VOID,
            output_type: TypeId::INT,
            peek_rate: 0,
            pop_rate: 0,
            push_rate: 1,
            stateful: true,
            args: vec![],
            firing_count: Some(1),
        });
        let sink = graph.add_filter(FilterNode {
            instance_id: FilterId(1),
            name: "writer".into(),
            decl: DeclId(1),
            input_type: TypeId::INT,
            output_type: TypeId::VOID,
            peek_rate: 0,
            pop_rate: 1,
            push_rate: 0,
            stateful: false,
            args: vec![],
            firing_count: Some(1),
        });
        let mut channel = Channel::new(TypeId::INT);
        channel.multiplicity = Some(1);
        graph.add_channel(node, sink, channel);
        (module, graph, TypeRegistry::new())
    }

    #[test]
    fn emit_program_produces_one_c_file_per_declaration_and_one_wrapper_per_instance() {
        let (module, graph, registry) = counter_program();
        let clock = ClockConfig::default();
        let emitted = emit_program(&module, &graph, &registry, "top", &clock, true).unwrap();
        assert_eq!(emitted.filter_c_sources.len(), 2);
        assert_eq!(emitted.filter_wrappers.len(), 2);
        assert!(emitted.manifest.files.iter().any(|f| f.kind == ArtifactKind::HlsC && f.owner.as_deref() == Some("counter")));
        assert!(emitted.manifest.files.iter().any(|f| f.kind == ArtifactKind::FilterVhdl));
        assert!(emitted.test_bench.source.contains("top_tb"));
        assert!(emitted.manifest.files.iter().all(|f| f.kind == ArtifactKind::Manifest || !f.content_hash.is_empty()));
    }

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(content_hash("same input"), content_hash("same input"));
        assert_ne!(content_hash("same input"), content_hash("different input"));
    }

    #[test]
    fn manifest_lists_top_and_test_bench_even_with_no_filters() {
        let graph = StreamGraph::new();
        let registry = TypeRegistry::new();
        let module = Module::new("empty");
        let clock = ClockConfig::default();
        let emitted = emit_program(&module, &graph, &registry, "top", &clock, true).unwrap();
        assert!(emitted.filter_c_sources.is_empty());
        assert!(emitted.manifest.files.iter().any(|f| f.kind == ArtifactKind::TopVhdl));
        assert!(emitted.manifest.files.iter().any(|f| f.kind == ArtifactKind::Manifest));
    }
}
