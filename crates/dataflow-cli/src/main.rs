//! CLI driver for the streaming dataflow compiler: reads a pre-parsed
//! `SourceProgram`, runs the full C2 -> C3 -> C4 -> C5 pipeline, and writes
//! the emitted HLS-C / VHDL artefacts to an output directory (spec §6).
//!
//! Parsing source text into a `SourceProgram` is out of scope for this
//! workspace (spec §1: "we assume a parser delivers the AST"); this binary
//! stands that collaborator in with a `serde_json`-deserialized program
//! file, the same way `lmlang-cli` stands `SqliteStore` in for its own
//! upstream graph source.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use dataflow_check::diagnostics::Report;
use dataflow_core::ast::{DeclarationKind, SourceProgram};
use dataflow_core::id::DeclId;
use dataflow_core::type_registry::TypeId;
use dataflow_hdl::{ClockConfig, EmittedProgram};
use dataflow_irgen::target::GenericStreamBuilder;
use dataflow_irgen::Lowerer;

/// Streaming dataflow HLS compiler: type-checks a program, lowers its
/// filters to SSA IR, elaborates its stream graph, and emits synthesisable
/// HLS-C plus VHDL.
#[derive(Parser)]
#[command(name = "dataflow-compile", about = "Streaming dataflow HLS compiler")]
struct Cli {
    /// Path to a `serde_json`-serialized `SourceProgram`.
    program: PathBuf,

    /// Directory the emitted artefacts are written to.
    #[arg(short, long, default_value = "./build")]
    out_dir: PathBuf,

    /// Name of the top-level `void -> void` pipeline to compile. Defaults
    /// to the program's only top-level pipeline whose input and output are
    /// both `void`; required if there is more than one.
    #[arg(long)]
    entry: Option<String>,

    /// Name of the emitted top-level VHDL component (and test-bench file
    /// prefix).
    #[arg(long, default_value = "dataflow_top")]
    top_entity: String,

    /// Reject `float` element types reaching the HDL backend (spec §4.1
    /// `UnsupportedForHardware`): set this for an integer-only flow.
    #[arg(long)]
    integer_only: bool,

    /// Clock period in nanoseconds for the emitted test bench.
    #[arg(long, default_value_t = 10)]
    clock_period_ns: u32,

    /// Cycles to hold `rst` high in the emitted test bench.
    #[arg(long, default_value_t = 4)]
    reset_cycles: u32,

    /// Number of steady-state cycles the emitted test bench runs for.
    #[arg(long, default_value_t = 64)]
    cycle_count: u32,

    /// Input pattern pumped into the first channel, comma-separated.
    #[arg(long, value_delimiter = ',', default_value = "0,1,2,3")]
    input_pattern: Vec<i64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    process::exit(run(cli));
}

/// Runs the pipeline end to end, returning the process exit code per spec
/// §6: `0` success, `1` parse/semantic error, `2` internal error, `3` I/O
/// error.
fn run(cli: Cli) -> i32 {
    let text = match fs::read_to_string(&cli.program) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: failed to read '{}': {e}", cli.program.display());
            return 3;
        }
    };
    let mut program: SourceProgram = match serde_json::from_str(&text) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: failed to parse program: {e}");
            return 1;
        }
    };

    // C2: semantic analysis, resolving every expression's type in place.
    if let Err(report) = dataflow_check::analyze(&mut program) {
        print_diagnostics(&report);
        return 1;
    }

    let entry = match find_entry(&program, cli.entry.as_deref()) {
        Ok(id) => id,
        Err(msg) => {
            eprintln!("error: {msg}");
            return 1;
        }
    };

    // C4 before C3: the stream graph needs every filter's resolved rates,
    // which analysis has already folded, and doesn't touch IR at all.
    let graph = match dataflow_graph::build(&program, entry) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    // C3: lower every filter's work blocks (and every user function) to
    // SSA IR, using the backend-agnostic streaming-primitive builder --
    // `dataflow-hdl`'s C emitter supplies its own lowering of the
    // resulting Pop/Peek/Push opcodes, so no C-specific builder is needed
    // here.
    let lowerer = Lowerer::new(&program);
    let mut target = GenericStreamBuilder;
    let module = match lowerer.lower_program(&mut target) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("internal error: {e}");
            return 2;
        }
    };

    // C5: HLS-C + VHDL emission.
    let clock = ClockConfig {
        period_ns: cli.clock_period_ns,
        reset_cycles: cli.reset_cycles,
        input_pattern: cli.input_pattern.clone(),
        cycle_count: cli.cycle_count,
    };
    let emitted = match dataflow_hdl::emit_program(
        &module,
        &graph,
        &program.types,
        &cli.top_entity,
        &clock,
        cli.integer_only,
    ) {
        Ok(e) => e,
        Err(dataflow_hdl::HdlError::UnsupportedForHardware { ty }) => {
            eprintln!("error: type {ty} is unsupported for hardware under --integer-only");
            return 1;
        }
        Err(e) => {
            eprintln!("internal error: {e}");
            return 2;
        }
    };

    if let Err(e) = write_artifacts(&cli.out_dir, &emitted) {
        eprintln!("error: failed to write artefacts to '{}': {e}", cli.out_dir.display());
        return 3;
    }

    println!(
        "compiled {} filter(s), {} node(s) to '{}'",
        emitted.filter_c_sources.len(),
        graph.node_count(),
        cli.out_dir.display()
    );
    0
}

/// Finds the `void -> void` pipeline declaration to elaborate from.
/// `requested` names it explicitly; otherwise the program must have
/// exactly one top-level pipeline with both endpoints `void`.
fn find_entry(program: &SourceProgram, requested: Option<&str>) -> Result<DeclId, String> {
    let candidates: Vec<DeclId> = program
        .top_level
        .iter()
        .copied()
        .filter(|&id| {
            let decl = program.decl(id);
            matches!(&decl.kind, DeclarationKind::Pipeline(c) if c.input_type == TypeId::VOID && c.output_type == TypeId::VOID)
                && requested.map(|name| decl.name == name).unwrap_or(true)
        })
        .collect();

    match candidates.len() {
        0 => Err(match requested {
            Some(name) => format!("no top-level 'void -> void' pipeline named '{name}'"),
            None => "no top-level 'void -> void' pipeline declaration found".to_string(),
        }),
        1 => Ok(candidates[0]),
        _ => Err("multiple top-level 'void -> void' pipelines found; pass --entry to disambiguate".to_string()),
    }
}

fn print_diagnostics(report: &Report) {
    eprintln!("compilation failed with {} diagnostic(s):", report.len());
    for d in report.iter() {
        eprintln!("  [{}..{}] {}", d.span.start, d.span.end, d.message());
    }
}

fn write_artifacts(out_dir: &Path, emitted: &EmittedProgram) -> std::io::Result<()> {
    fs::create_dir_all(out_dir)?;
    for src in &emitted.filter_c_sources {
        fs::write(out_dir.join(format!("{}.c", src.filter_name)), &src.source)?;
    }
    for wrapper in &emitted.filter_wrappers {
        fs::write(out_dir.join(format!("{}.vhd", wrapper.entity_name)), &wrapper.source)?;
    }
    fs::write(out_dir.join(format!("{}.vhd", emitted.top_level.entity_name)), &emitted.top_level.source)?;
    fs::write(out_dir.join(format!("{}.vhd", emitted.test_bench.entity_name)), &emitted.test_bench.source)?;
    let manifest_json = serde_json::to_string_pretty(&emitted.manifest)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize manifest: {e}\"}}"));
    fs::write(out_dir.join("manifest.json"), manifest_json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_core::ast::{CompositionDecl, Declaration};
    use dataflow_core::span::Span;
    use dataflow_core::type_registry::TypeRegistry;

    fn pipeline_program(names: &[&str]) -> SourceProgram {
        let mut program = SourceProgram::new(TypeRegistry::new());
        for name in names {
            let id = program.push_decl(Declaration {
                name: name.to_string(),
                span: Span::synthetic(),
                ty: TypeId::VOID,
                constant: false,
                kind: DeclarationKind::Pipeline(CompositionDecl {
                    input_type: TypeId::VOID,
                    output_type: TypeId::VOID,
                    params: vec![],
                    body: vec![],
                }),
                initializer: None,
                array_length_expr: None,
            });
            program.top_level.push(id);
        }
        program
    }

    #[test]
    fn single_pipeline_resolves_without_explicit_entry() {
        let program = pipeline_program(&["main"]);
        let id = find_entry(&program, None).unwrap();
        assert_eq!(program.decl(id).name, "main");
    }

    #[test]
    fn multiple_pipelines_require_explicit_entry() {
        let program = pipeline_program(&["a", "b"]);
        assert!(find_entry(&program, None).is_err());
        let id = find_entry(&program, Some("b")).unwrap();
        assert_eq!(program.decl(id).name, "b");
    }

    #[test]
    fn unknown_requested_entry_is_an_error() {
        let program = pipeline_program(&["main"]);
        assert!(find_entry(&program, Some("nope")).is_err());
    }

    #[test]
    fn no_pipelines_is_an_error() {
        let program = SourceProgram::new(TypeRegistry::new());
        assert!(find_entry(&program, None).is_err());
    }
}
