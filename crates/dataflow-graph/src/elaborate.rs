//! Recursive elaboration of `Pipeline` / `SplitJoin` / `Filter` declarations
//! into a [`StreamGraph`] (spec §4.4).
//!
//! Rate solving happens inline with the tree walk rather than as a
//! separate graph pass: a `SplitJoin`'s branches always reconverge through
//! its own `Join`, so every composite has exactly one degree of freedom
//! and its children's firing counts can be scaled bottom-up as each
//! composite finishes (see [`crate::multiplicity`]'s module doc).

use std::collections::HashMap;

use dataflow_check::const_eval::{eval_const, ConstEnv, ConstValue};
use dataflow_core::ast::{DeclarationKind, SourceProgram, StmtKind};
use dataflow_core::id::{DeclId, FilterId};
use dataflow_core::type_registry::TypeId;

use crate::channel::Channel;
use crate::error::GraphError;
use crate::graph::StreamGraph;
use crate::id::NodeId;
use crate::multiplicity::{fill_channel_multiplicities, pipeline_firings, solve_duplicate_fan, solve_roundrobin_fan};
use crate::node::{FilterNode, JoinNode, JoinPolicy, SplitNode, SplitPolicy};

/// What elaborating one stream declaration hands back to its parent: the
/// chain's two ends to wire into, its type interface, its rate interface
/// for the parent's LCM algebra, and every `Filter` node it created so an
/// enclosing composite can rescale their firing counts.
struct Elaborated {
    entry: NodeId,
    exit: NodeId,
    input_type: TypeId,
    output_type: TypeId,
    trunk_pop: u64,
    trunk_push: u64,
    filters: Vec<NodeId>,
}

struct Builder<'p> {
    program: &'p SourceProgram,
    graph: StreamGraph,
    next_filter_id: u32,
}

/// Elaborates the `void -> void` declaration named by `entry` into a
/// complete, rate-solved [`StreamGraph`] (spec §4.4's overall contract).
pub fn build(program: &SourceProgram, entry: DeclId) -> Result<StreamGraph, GraphError> {
    let mut b = Builder { program, graph: StreamGraph::new(), next_filter_id: 0 };
    let env = ConstEnv::new();
    b.elaborate(entry, &env)?;
    fill_channel_multiplicities(&mut b.graph)?;
    Ok(b.graph)
}

fn decl_name(program: &SourceProgram, decl: DeclId) -> &str {
    &program.decl(decl).name
}

fn scale_filters(graph: &mut StreamGraph, filters: &[NodeId], by: u64) {
    for &id in filters {
        let f = graph.node_mut(id).as_filter_mut().expect("elaborate only collects Filter node ids");
        f.firing_count = Some(f.firing_count.unwrap_or(1) * by);
    }
}

impl<'p> Builder<'p> {
    /// Folds `args` (the actual arguments at an `add`/entry call site) in
    /// `caller_env`, then binds the result to `decl`'s own declared
    /// parameters for use while elaborating `decl`'s body.
    fn bind_args(
        &self,
        decl: DeclId,
        params: &[DeclId],
        args: &[dataflow_core::id::ExprId],
        caller_env: &ConstEnv,
    ) -> Result<ConstEnv, GraphError> {
        let mut env = ConstEnv::new();
        for (param, arg) in params.iter().zip(args) {
            let value = eval_const(self.program, caller_env, *arg).ok_or_else(|| {
                GraphError::NonConstantArgument { name: decl_name(self.program, decl).to_string() }
            })?;
            env.insert(*param, value);
        }
        Ok(env)
    }

    fn elaborate(&mut self, decl_id: DeclId, env: &ConstEnv) -> Result<Elaborated, GraphError> {
        let decl = self.program.decl(decl_id).clone();
        match &decl.kind {
            DeclarationKind::Filter(filter) => self.elaborate_filter(decl_id, &decl.name, filter, env),
            DeclarationKind::Pipeline(comp) => self.elaborate_pipeline(comp, env),
            DeclarationKind::SplitJoin(comp) => self.elaborate_splitjoin(comp, env),
            _ => Err(GraphError::NotAStreamDeclaration { name: decl.name.clone() }),
        }
    }

    fn elaborate_filter(
        &mut self,
        decl_id: DeclId,
        name: &str,
        filter: &dataflow_core::ast::FilterDecl,
        env: &ConstEnv,
    ) -> Result<Elaborated, GraphError> {
        let args: Vec<ConstValue> =
            filter.params.iter().map(|p| env.get(p).copied().unwrap_or(ConstValue::Int(0))).collect();
        let pop_rate = filter.work.pop_rate().unwrap_or(0);
        let push_rate = filter.work.push_rate().unwrap_or(0);
        let peek_rate = filter.work.peek_rate().unwrap_or(pop_rate);
        let instance_id = FilterId(self.next_filter_id);
        self.next_filter_id += 1;
        let node = FilterNode {
            instance_id,
            name: name.to_string(),
            decl: decl_id,
            input_type: filter.input_type,
            output_type: filter.output_type,
            peek_rate,
            pop_rate,
            push_rate,
            stateful: filter.stateful,
            args,
            firing_count: Some(1),
        };
        let id = self.graph.add_filter(node);
        Ok(Elaborated {
            entry: id,
            exit: id,
            input_type: filter.input_type,
            output_type: filter.output_type,
            trunk_pop: pop_rate as u64,
            trunk_push: push_rate as u64,
            filters: vec![id],
        })
    }

    fn elaborate_pipeline(
        &mut self,
        comp: &dataflow_core::ast::CompositionDecl,
        env: &ConstEnv,
    ) -> Result<Elaborated, GraphError> {
        let children = self.elaborate_body_children(&comp.body, env)?;
        if children.is_empty() {
            return Err(GraphError::Internal("pipeline body has no 'add' statements".into()));
        }
        for (i, pair) in children.windows(2).enumerate() {
            if pair[0].output_type != pair[1].input_type {
                return Err(GraphError::PipelineTypeMismatch {
                    upstream: format!("child {i}"),
                    downstream: format!("child {}", i + 1),
                    produced: format!("{}", pair[0].output_type),
                    expected: format!("{}", pair[1].input_type),
                });
            }
        }
        let rates: Vec<(u64, u64)> = children.iter().map(|c| (c.trunk_pop, c.trunk_push)).collect();
        let firings = pipeline_firings(&rates)?;
        for (child, &n) in children.iter().zip(&firings) {
            scale_filters(&mut self.graph, &child.filters, n);
        }
        for i in 0..children.len() - 1 {
            let multiplicity = children[i].trunk_push * firings[i];
            let mut channel = Channel::new(children[i].output_type);
            channel.multiplicity = Some(multiplicity);
            self.graph.add_channel(children[i].exit, children[i + 1].entry, channel);
        }
        let entry = children[0].entry;
        let exit = children.last().unwrap().exit;
        let input_type = children[0].input_type;
        let output_type = children.last().unwrap().output_type;
        let trunk_pop = rates[0].0 * firings[0];
        let trunk_push = rates.last().unwrap().1 * firings.last().unwrap();
        let filters = children.into_iter().flat_map(|c| c.filters).collect();
        Ok(Elaborated { entry, exit, input_type, output_type, trunk_pop, trunk_push, filters })
    }

    fn elaborate_splitjoin(
        &mut self,
        comp: &dataflow_core::ast::CompositionDecl,
        env: &ConstEnv,
    ) -> Result<Elaborated, GraphError> {
        let mut split_policy = None;
        let mut join_weights = None;
        let mut branch_stmts = Vec::new();
        for &stmt_id in &comp.body {
            match &self.program.stmt(stmt_id).kind {
                StmtKind::Split(policy) => split_policy = Some(policy.clone()),
                StmtKind::Add { .. } => branch_stmts.push(stmt_id),
                StmtKind::Join(policy) => join_weights = Some(policy.weights.clone()),
                StmtKind::VarDecl(_) => {}
                other => {
                    return Err(GraphError::Internal(format!(
                        "unexpected statement kind in splitjoin body: {other:?}"
                    )))
                }
            }
        }
        let split_policy = split_policy
            .ok_or_else(|| GraphError::Internal("splitjoin body has no 'split' statement".into()))?;
        if branch_stmts.is_empty() {
            return Err(GraphError::Internal("splitjoin body has no branches".into()));
        }
        let branches = self.elaborate_body_children(&branch_stmts, env)?;
        for (i, b) in branches.iter().enumerate().skip(1) {
            if b.input_type != branches[0].input_type {
                return Err(GraphError::SplitJoinTypeMismatch {
                    branch: i,
                    expected: format!("{}", branches[0].input_type),
                    found: format!("{}", b.input_type),
                });
            }
            if b.output_type != branches[0].output_type {
                return Err(GraphError::SplitJoinTypeMismatch {
                    branch: i,
                    expected: format!("{}", branches[0].output_type),
                    found: format!("{}", b.output_type),
                });
            }
        }

        let branch_rates: Vec<(u64, u64)> = branches.iter().map(|b| (b.trunk_pop, b.trunk_push)).collect();
        let (resolved_split, fan) = match &split_policy {
            dataflow_core::ast::SplitPolicy::Duplicate => {
                (SplitPolicy::Duplicate, solve_duplicate_fan(&branch_rates)?)
            }
            dataflow_core::ast::SplitPolicy::RoundRobin(weights) => {
                let weights = weights.clone().unwrap_or_else(|| vec![1; branches.len()]);
                let fan = solve_roundrobin_fan(&branch_rates, &weights)?;
                (SplitPolicy::RoundRobin { weights }, fan)
            }
        };
        let join_weights = join_weights.unwrap_or_else(|| vec![1; branches.len()]);

        let input_type = branches[0].input_type;
        let output_type = branches[0].output_type;
        let split_id = self.graph.add_split(SplitNode { policy: resolved_split, element_type: input_type });
        let join_id =
            self.graph.add_join(JoinNode { policy: JoinPolicy { weights: join_weights }, element_type: output_type });

        let mut filters = Vec::new();
        for (i, branch) in branches.into_iter().enumerate() {
            scale_filters(&mut self.graph, &branch.filters, fan.branch_scales[i]);
            let consumed = fan.branch_scales[i] * branch_rates[i].0;
            let produced = fan.branch_scales[i] * branch_rates[i].1;
            let mut into_branch = Channel::new(input_type);
            into_branch.multiplicity = Some(consumed);
            self.graph.add_channel(split_id, branch.entry, into_branch);
            let mut out_of_branch = Channel::new(output_type);
            out_of_branch.multiplicity = Some(produced);
            self.graph.add_channel(branch.exit, join_id, out_of_branch);
            filters.extend(branch.filters);
        }

        Ok(Elaborated {
            entry: split_id,
            exit: join_id,
            input_type,
            output_type,
            trunk_pop: fan.trunk_pop,
            trunk_push: fan.trunk_push,
            filters,
        })
    }

    /// Elaborates every `add` statement in `stmts` in order, threading a
    /// body-local environment so earlier `VarDecl`s can feed later `add`
    /// argument expressions (spec §6's composition-body grammar).
    fn elaborate_body_children(
        &mut self,
        stmts: &[dataflow_core::id::StmtId],
        outer_env: &ConstEnv,
    ) -> Result<Vec<Elaborated>, GraphError> {
        let mut local_env: ConstEnv = outer_env.clone();
        let mut out = Vec::new();
        for &stmt_id in stmts {
            match &self.program.stmt(stmt_id).kind {
                StmtKind::VarDecl(decl_id) => {
                    if let Some(init) = self.program.decl(*decl_id).initializer {
                        if let Some(v) = eval_const(self.program, &local_env, init) {
                            local_env.insert(*decl_id, v);
                        }
                    }
                }
                StmtKind::Add { name, decl, args } => {
                    let callee_id = decl.ok_or_else(|| {
                        GraphError::NotAStreamDeclaration { name: name.clone() }
                    })?;
                    let callee = self.program.decl(callee_id).clone();
                    let params: &[DeclId] = match &callee.kind {
                        DeclarationKind::Filter(f) => &f.params,
                        DeclarationKind::Pipeline(c) | DeclarationKind::SplitJoin(c) => &c.params,
                        _ => return Err(GraphError::NotAStreamDeclaration { name: name.clone() }),
                    };
                    let callee_env = self.bind_args(callee_id, params, args, &local_env)?;
                    out.push(self.elaborate(callee_id, &callee_env)?);
                }
                _ => {}
            }
        }
        Ok(out)
    }
}

#[allow(dead_code)]
type FilterParamsLookup = HashMap<DeclId, Vec<ConstValue>>;

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_core::ast::{
        CompositionDecl, Declaration, Expression, ExprKind, FilterDecl, RateClause, Statement, WorkBlock,
    };
    use dataflow_core::span::Span;
    use dataflow_core::type_registry::TypeRegistry;

    fn rate(program: &mut SourceProgram, n: u32) -> RateClause {
        let expr = program.push_expr(Expression {
            span: Span::synthetic(),
            resolved_type: None,
            kind: ExprKind::IntLiteral(n as i64),
        });
        RateClause { expr, resolved: Some(n) }
    }

    fn push_filter(program: &mut SourceProgram, name: &str, pop: u32, push: u32) -> DeclId {
        let pop_rate = rate(program, pop);
        let push_rate = rate(program, push);
        program.push_decl(Declaration {
            name: name.to_string(),
            span: Span::synthetic(),
            ty: TypeId::VOID,
            constant: false,
            kind: DeclarationKind::Filter(FilterDecl {
                input_type: TypeId::INT,
                output_type: TypeId::INT,
                stateful: false,
                params: vec![],
                fields: vec![],
                init: None,
                prework: None,
                work: WorkBlock { peek: None, pop: Some(pop_rate), push: Some(push_rate), body: vec![] },
            }),
            initializer: None,
            array_length_expr: None,
        })
    }

    fn push_add(program: &mut SourceProgram, name: &str, decl: DeclId) -> dataflow_core::id::StmtId {
        program.push_stmt(Statement {
            span: Span::synthetic(),
            kind: StmtKind::Add { name: name.to_string(), decl: Some(decl), args: vec![] },
        })
    }

    #[test]
    fn two_filter_pipeline_gets_matching_channel_multiplicity() {
        let mut program = SourceProgram::new(TypeRegistry::new());
        let producer = push_filter(&mut program, "producer", 0, 1);
        let consumer = push_filter(&mut program, "consumer", 1, 0);
        let a1 = push_add(&mut program, "producer", producer);
        let a2 = push_add(&mut program, "consumer", consumer);
        let top = program.push_decl(Declaration {
            name: "main".to_string(),
            span: Span::synthetic(),
            ty: TypeId::VOID,
            constant: false,
            kind: DeclarationKind::Pipeline(CompositionDecl {
                input_type: TypeId::VOID,
                output_type: TypeId::VOID,
                params: vec![],
                body: vec![a1, a2],
            }),
            initializer: None,
            array_length_expr: None,
        });

        let graph = build(&program, top).unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.channel_count(), 1);
        let (_, _, _, channel) = graph.channels().next().unwrap();
        assert_eq!(channel.multiplicity, Some(1));
        assert_eq!(channel.depth(), Some(4));
    }

    #[test]
    fn splitjoin_with_duplicate_split_sums_join_output() {
        let mut program = SourceProgram::new(TypeRegistry::new());
        let branch_filter = push_filter(&mut program, "f", 1, 8);
        let split_stmt = program.push_stmt(Statement {
            span: Span::synthetic(),
            kind: StmtKind::Split(dataflow_core::ast::SplitPolicy::Duplicate),
        });
        let branch1 = push_add(&mut program, "f", branch_filter);
        let branch2 = push_add(&mut program, "f", branch_filter);
        let join_stmt = program.push_stmt(Statement {
            span: Span::synthetic(),
            kind: StmtKind::Join(dataflow_core::ast::JoinPolicy { weights: None }),
        });
        let top = program.push_decl(Declaration {
            name: "main".to_string(),
            span: Span::synthetic(),
            ty: TypeId::VOID,
            constant: false,
            kind: DeclarationKind::SplitJoin(CompositionDecl {
                input_type: TypeId::INT,
                output_type: TypeId::INT,
                params: vec![],
                body: vec![split_stmt, branch1, branch2, join_stmt],
            }),
            initializer: None,
            array_length_expr: None,
        });

        let graph = build(&program, top).unwrap();
        // Split, Join, and 2 filter instances (filter decl instantiated twice).
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.channel_count(), 4);
        let total_into_join: u64 = graph
            .channels()
            .filter(|(_, _, to, _)| matches!(graph.node(*to), crate::node::StreamNode::Join(_)))
            .map(|(_, _, _, c)| c.multiplicity.unwrap())
            .sum();
        assert_eq!(total_into_join, 16);
    }
}
