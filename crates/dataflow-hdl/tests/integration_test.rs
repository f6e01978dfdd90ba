//! End-to-end integration tests for artefact emission: builds a minimal IR
//! module and stream graph, runs `emit_program`, and writes every artefact
//! to a temp directory the way a real build pipeline would.

use dataflow_core::id::{DeclId, FilterId};
use dataflow_core::type_registry::{TypeId, TypeRegistry};
use dataflow_graph::node::FilterNode;
use dataflow_graph::{Channel, StreamGraph};
use dataflow_hdl::{emit_program, ArtifactKind, ClockConfig};
use dataflow_irgen::builder::FunctionBuilder;
use dataflow_irgen::ir::{GlobalVar, Module, Operand};
use dataflow_irgen::target::GenericStreamBuilder;

fn counter_to_writer() -> (Module, StreamGraph, TypeRegistry) {
    let mut module = Module::new("program");
    module.add_global(GlobalVar {
        name: "counter__n".into(),
        ty: TypeId::INT,
        initial: Some(dataflow_irgen::ir::Constant::Int(0)),
    });
    let mut fb = FunctionBuilder::new("counter__work", vec![], TypeId::VOID);
    let mut tgt = GenericStreamBuilder;
    let cur = fb.ins_load(TypeId::INT, Operand::Global(0));
    tgt.build_push(&mut fb, Operand::Value(cur));
    fb.ins_ret(None);
    module.add_function(fb.finish());

    let mut graph = StreamGraph::new();
    let source = graph.add_filter(FilterNode {
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
    graph.add_channel(source, sink, channel);
    (module, graph, TypeRegistry::new())
}

#[test]
fn emitted_artifacts_round_trip_through_disk() {
    let (module, graph, registry) = counter_to_writer();
    let clock = ClockConfig::default();
    let emitted = emit_program(&module, &graph, &registry, "dataflow_top", &clock, true).unwrap();

    let dir = tempfile::tempdir().unwrap();
    for src in &emitted.filter_c_sources {
        std::fs::write(dir.path().join(format!("{}.c", src.filter_name)), &src.source).unwrap();
    }
    for wrapper in &emitted.filter_wrappers {
        std::fs::write(dir.path().join(format!("{}.vhd", wrapper.entity_name)), &wrapper.source).unwrap();
    }
    std::fs::write(
        dir.path().join(format!("{}.vhd", emitted.top_level.entity_name)),
        &emitted.top_level.source,
    )
    .unwrap();
    std::fs::write(
        dir.path().join(format!("{}.vhd", emitted.test_bench.entity_name)),
        &emitted.test_bench.source,
    )
    .unwrap();
    let manifest_json = serde_json::to_string_pretty(&emitted.manifest).unwrap();
    std::fs::write(dir.path().join("manifest.json"), &manifest_json).unwrap();

    for entry in &emitted.manifest.files {
        if entry.kind == ArtifactKind::Manifest {
            continue;
        }
        let path = dir.path().join(&entry.path);
        assert!(path.exists(), "missing emitted artefact {}", entry.path);
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(!on_disk.is_empty());
    }

    let reread: dataflow_hdl::Manifest =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("manifest.json")).unwrap()).unwrap();
    assert_eq!(reread.files.len(), emitted.manifest.files.len());
}
