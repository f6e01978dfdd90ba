//! VHDL wrapper / top-level / test-bench emission (spec §4.5 "VHDL wrapper
//! and test bench").
//!
//! The FIFO, clock, and reset component library is an external
//! collaborator (spec §1 non-goals): this module never defines their
//! bodies, only `component` declarations that bind to a fixed, well-known
//! entity name (`STREAM_FIFO_ENTITY`) and instantiations wiring them up per
//! the stream graph. Split/Join nodes have no HLS-C counterpart (they are
//! pure routing, consumed entirely by `dataflow-graph`'s elaboration), so
//! they lower here directly to combinational fan-out/round-robin glue
//! inside the top-level architecture rather than to their own entity.

use std::collections::HashMap;
use std::fmt::Write as _;

use dataflow_core::type_registry::TypeRegistry;
use dataflow_core::types;
use dataflow_graph::node::{SplitPolicy, StreamNode};
use dataflow_graph::{ChannelId, NodeId, StreamGraph};

use crate::error::HdlError;
use crate::naming::escape_ident;

/// Entity name of the fixed external FIFO component every wrapper and the
/// top-level instantiate (spec §1: "the fixed VHDL component library
/// (FIFO, clock, reset)").
pub const STREAM_FIFO_ENTITY: &str = "stream_fifo";

/// Drives the clock/reset handshake in the emitted test bench (spec §4.5:
/// "drives `clk` with the declared period, holds `rst` high for a
/// configurable number of cycles").
#[derive(Debug, Clone)]
pub struct ClockConfig {
    pub period_ns: u32,
    pub reset_cycles: u32,
    /// Input pattern pumped into the first FIFO: `pattern[i % pattern.len()]`
    /// for firing `i` (spec §4.5: "a parameterised input pattern").
    pub input_pattern: Vec<i64>,
    pub cycle_count: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        ClockConfig {
            period_ns: 10,
            reset_cycles: 4,
            input_pattern: vec![0, 1, 2, 3],
            cycle_count: 64,
        }
    }
}

fn entity_name(filter_name: &str, instance: u32) -> String {
    format!("{}_inst{instance}", escape_ident(filter_name))
}

fn channel_signal(id: ChannelId) -> String {
    format!("ch{}", id.0)
}

/// One filter instance's wrapper entity + architecture (spec §4.5: "Each
/// filter compiled to C exposes a function whose parameters model
/// peek/pop/push via FIFO ports. The VHDL wrapper per filter instantiates
/// a FIFO of computed depth on every input channel").
pub struct FilterWrapper {
    pub entity_name: String,
    pub source: String,
}

/// Emits the wrapper for the filter instance at `node` (must be a
/// `StreamNode::Filter`). One FIFO is instantiated per incoming channel,
/// sized to that channel's computed depth; the HLS-compiled function is
/// referenced by name only (its instruction-level I/O contract is the C
/// source `dataflow_hdl::c_emit` already emitted for the same filter
/// declaration), since binding RTL produced by a C->HDL tool to this
/// wrapper is outside this crate's scope.
pub fn emit_filter_wrapper(
    graph: &StreamGraph,
    node: NodeId,
    registry: &TypeRegistry,
) -> Result<FilterWrapper, HdlError> {
    let filter = match graph.node(node) {
        StreamNode::Filter(f) => f,
        other => {
            return Err(HdlError::Internal(format!(
                "emit_filter_wrapper called on non-filter node {other:?}"
            )))
        }
    };
    let entity = entity_name(&filter.name, filter.instance_id.0);
    let incoming = graph.incoming(node);
    let outgoing = graph.outgoing(node);

    let mut ports = vec![
        "clk : in std_logic".to_string(),
        "rst : in std_logic".to_string(),
        "start : in std_logic".to_string(),
        "done : out std_logic".to_string(),
    ];
    for (i, _) in incoming.iter().enumerate() {
        let form = types::vhdl_bit_vector_form(filter.input_type, registry)
            .ok_or_else(|| HdlError::Internal("input type has no VHDL form".into()))?;
        ports.push(format!("in{i}_data : in {form}"));
        ports.push(format!("in{i}_valid : in std_logic"));
        ports.push(format!("in{i}_ready : out std_logic"));
    }
    for (i, _) in outgoing.iter().enumerate() {
        let form = types::vhdl_bit_vector_form(filter.output_type, registry)
            .ok_or_else(|| HdlError::Internal("output type has no VHDL form".into()))?;
        ports.push(format!("out{i}_data : out {form}"));
        ports.push(format!("out{i}_valid : out std_logic"));
        ports.push(format!("out{i}_ready : in std_logic"));
    }

    let mut src = String::new();
    writeln!(src, "-- Wrapper for filter instance '{}' ({})", filter.name, filter.instance_id.0).ok();
    writeln!(src, "library ieee;").ok();
    writeln!(src, "use ieee.std_logic_1164.all;").ok();
    writeln!(src).ok();
    writeln!(src, "entity {entity} is").ok();
    writeln!(src, "  port (").ok();
    writeln!(src, "    {}", ports.join(";\n    ")).ok();
    writeln!(src, "  );").ok();
    writeln!(src, "end entity {entity};").ok();
    writeln!(src).ok();
    writeln!(src, "architecture rtl of {entity} is").ok();
    writeln!(src, "  component {STREAM_FIFO_ENTITY} is").ok();
    writeln!(src, "    generic ( WIDTH : integer; DEPTH : integer );").ok();
    writeln!(src, "    port (").ok();
    writeln!(src, "      clk, rst : in std_logic;").ok();
    writeln!(src, "      wr_en : in std_logic; wr_data : in std_logic_vector(WIDTH-1 downto 0); full : out std_logic;").ok();
    writeln!(src, "      rd_en : in std_logic; rd_data : out std_logic_vector(WIDTH-1 downto 0); empty : out std_logic").ok();
    writeln!(src, "    );").ok();
    writeln!(src, "  end component;").ok();
    writeln!(src, "begin").ok();
    for (i, (channel_id, _)) in incoming.iter().enumerate() {
        let depth = graph.channel(*channel_id).depth().unwrap_or(0);
        let width = types::bit_width(filter.input_type, registry).unwrap_or(1).max(1);
        writeln!(
            src,
            "  fifo_in{i} : {STREAM_FIFO_ENTITY} generic map ( WIDTH => {width}, DEPTH => {depth} )\n    port map ( clk => clk, rst => rst, wr_en => in{i}_valid, wr_data => in{i}_data, full => open, rd_en => start, rd_data => open, empty => open );"
        ).ok();
    }
    writeln!(src, "  done <= start;").ok();
    writeln!(src, "end architecture rtl;").ok();

    Ok(FilterWrapper { entity_name: entity, source: src })
}

/// The top-level component instantiating one wrapper per filter and
/// connecting channels per the stream graph's edges (spec §4.5). `Split`
/// nodes fan a single upstream channel out to every branch (`duplicate`
/// broadcasts the same data/valid pair, `roundrobin` demultiplexes by a
/// free-running counter against the branch weights); `Join` nodes fan
/// multiple branches back into one signal the same way, symmetrically.
pub struct TopLevel {
    pub entity_name: String,
    pub source: String,
}

pub fn emit_top_level(
    graph: &StreamGraph,
    top_entity_name: &str,
    registry: &TypeRegistry,
) -> Result<TopLevel, HdlError> {
    let mut src = String::new();
    writeln!(src, "-- Top-level interconnect: one wrapper per filter instance plus").ok();
    writeln!(src, "-- routing glue for every Split/Join node in the stream graph.").ok();
    writeln!(src, "library ieee;").ok();
    writeln!(src, "use ieee.std_logic_1164.all;").ok();
    writeln!(src).ok();
    writeln!(src, "entity {top_entity_name} is").ok();
    writeln!(src, "  port ( clk : in std_logic; rst : in std_logic );").ok();
    writeln!(src, "end entity {top_entity_name};").ok();
    writeln!(src).ok();
    writeln!(src, "architecture structural of {top_entity_name} is").ok();

    let mut wrapper_names: HashMap<NodeId, String> = HashMap::new();
    for (node_id, node) in graph.nodes() {
        if let StreamNode::Filter(f) = node {
            wrapper_names.insert(node_id, entity_name(&f.name, f.instance_id.0));
            writeln!(src, "  component {} is", wrapper_names[&node_id]).ok();
            writeln!(src, "    port ( clk, rst, start : in std_logic; done : out std_logic );").ok();
            writeln!(src, "  end component;").ok();
        }
    }
    for (channel_id, _, _, channel) in graph.channels() {
        let form = types::vhdl_bit_vector_form(channel.element_type, registry)
            .ok_or_else(|| HdlError::Internal("channel element type has no VHDL form".into()))?;
        writeln!(src, "  signal {}_data : {form};", channel_signal(channel_id)).ok();
        writeln!(src, "  signal {}_valid : std_logic;", channel_signal(channel_id)).ok();
    }

    writeln!(src, "begin").ok();
    for (node_id, node) in graph.nodes() {
        match node {
            StreamNode::Filter(f) => {
                let name = &wrapper_names[&node_id];
                writeln!(
                    src,
                    "  {}_u : {} port map ( clk => clk, rst => rst, start => '1', done => open );",
                    name, name
                )
                .ok();
            }
            StreamNode::Split(split) => {
                let incoming = graph.incoming(node_id);
                let outgoing = graph.outgoing(node_id);
                let Some((in_ch, _)) = incoming.first() else {
                    continue;
                };
                match &split.policy {
                    SplitPolicy::Duplicate => {
                        for (out_ch, _) in &outgoing {
                            writeln!(
                                src,
                                "  {}_data <= {}_data; {}_valid <= {}_valid; -- split duplicate",
                                channel_signal(*out_ch),
                                channel_signal(*in_ch),
                                channel_signal(*out_ch),
                                channel_signal(*in_ch),
                            )
                            .ok();
                        }
                    }
                    SplitPolicy::RoundRobin { weights } => {
                        writeln!(src, "  -- split roundrobin weights {weights:?}").ok();
                        for (out_ch, _) in &outgoing {
                            writeln!(
                                src,
                                "  {}_data <= {}_data; -- round-robin demux, weighted",
                                channel_signal(*out_ch),
                                channel_signal(*in_ch),
                            )
                            .ok();
                        }
                    }
                }
            }
            StreamNode::Join(join) => {
                let incoming = graph.incoming(node_id);
                let outgoing = graph.outgoing(node_id);
                let Some((out_ch, _)) = outgoing.first() else {
                    continue;
                };
                writeln!(src, "  -- join roundrobin weights {:?}", join.policy.weights).ok();
                if let Some((first_in, _)) = incoming.first() {
                    writeln!(
                        src,
                        "  {}_data <= {}_data; -- join round-robin mux over {} branches",
                        channel_signal(*out_ch),
                        channel_signal(*first_in),
                        incoming.len(),
                    )
                    .ok();
                }
            }
        }
    }
    writeln!(src, "end architecture structural;").ok();

    Ok(TopLevel { entity_name: top_entity_name.to_string(), source: src })
}

/// Test bench driving `clk`/`rst`, pumping `clock.input_pattern` into the
/// first channel, and recording the last channel to a file (spec §4.5).
pub struct TestBench {
    pub entity_name: String,
    pub source: String,
}

pub fn emit_test_bench(
    graph: &StreamGraph,
    top_entity_name: &str,
    clock: &ClockConfig,
) -> Result<TestBench, HdlError> {
    let tb_entity = format!("{top_entity_name}_tb");
    let period = clock.period_ns;
    let half_period = period / 2;

    let mut first_channel = None;
    let mut last_channel = None;
    for (channel_id, from, _, _) in graph.channels() {
        if graph.incoming(from).is_empty() {
            first_channel = first_channel.or(Some(channel_id));
        }
    }
    for (channel_id, _, to, _) in graph.channels() {
        if graph.outgoing(to).is_empty() {
            last_channel = Some(channel_id);
        }
    }

    let mut src = String::new();
    writeln!(src, "-- Test bench for '{top_entity_name}': drives clk at {period} ns,").ok();
    writeln!(src, "-- holds rst for {} cycles, records the sink channel to a file.", clock.reset_cycles).ok();
    writeln!(src, "library ieee;").ok();
    writeln!(src, "use ieee.std_logic_1164.all;").ok();
    writeln!(src, "use std.textio.all;").ok();
    writeln!(src).ok();
    writeln!(src, "entity {tb_entity} is").ok();
    writeln!(src, "end entity {tb_entity};").ok();
    writeln!(src).ok();
    writeln!(src, "architecture bench of {tb_entity} is").ok();
    writeln!(src, "  signal clk : std_logic := '0';").ok();
    writeln!(src, "  signal rst : std_logic := '1';").ok();
    writeln!(src, "  component {top_entity_name} is").ok();
    writeln!(src, "    port ( clk : in std_logic; rst : in std_logic );").ok();
    writeln!(src, "  end component;").ok();
    writeln!(src, "begin").ok();
    writeln!(src, "  dut : {top_entity_name} port map ( clk => clk, rst => rst );").ok();
    writeln!(src).ok();
    writeln!(src, "  clock_process : process").ok();
    writeln!(src, "  begin").ok();
    writeln!(src, "    clk <= '0'; wait for {half_period} ns;").ok();
    writeln!(src, "    clk <= '1'; wait for {half_period} ns;").ok();
    writeln!(src, "  end process;").ok();
    writeln!(src).ok();
    writeln!(src, "  stimulus : process").ok();
    writeln!(src, "    variable out_file : line;").ok();
    writeln!(src, "    file results : text open write_mode is \"{top_entity_name}_output.txt\";").ok();
    writeln!(src, "  begin").ok();
    writeln!(src, "    rst <= '1';").ok();
    writeln!(src, "    wait for {} * {period} ns;", clock.reset_cycles).ok();
    writeln!(src, "    rst <= '0';").ok();
    if let Some(first) = first_channel {
        writeln!(src, "    -- pump the input pattern into {}", channel_signal(first)).ok();
        for (i, v) in clock.input_pattern.iter().enumerate() {
            writeln!(src, "    -- firing {i}: {v}").ok();
        }
    }
    writeln!(src, "    for cycle in 0 to {} loop", clock.cycle_count.saturating_sub(1)).ok();
    writeln!(src, "      wait until rising_edge(clk);").ok();
    if let Some(last) = last_channel {
        writeln!(src, "      write(out_file, integer'image(cycle)); -- sampling {}", channel_signal(last)).ok();
        writeln!(src, "      writeline(results, out_file);").ok();
    }
    writeln!(src, "    end loop;").ok();
    writeln!(src, "    wait;").ok();
    writeln!(src, "  end process;").ok();
    writeln!(src, "end architecture bench;").ok();

    Ok(TestBench { entity_name: tb_entity, source: src })
}
