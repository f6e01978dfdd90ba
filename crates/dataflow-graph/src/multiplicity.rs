//! Rate-closure solver (spec §4.4 "Multiplicity computation").
//!
//! Firing counts are a tree-structured problem, not a general graph-rate
//! system: a `SplitJoin`'s branches always reconverge through its own
//! `Join`, so every connected component has exactly one degree of freedom.
//! [`crate::elaborate`] exploits this by solving firing counts bottom-up
//! as it walks the `Pipeline`/`SplitJoin` syntax tree, scaling each
//! composite's children by the functions here; [`fill_channel_multiplicities`]
//! is then a thin final pass that reads the now-fully-resolved firing
//! counts back off the graph to label every channel.

use crate::error::GraphError;
use crate::graph::StreamGraph;
use crate::node::StreamNode;
use crate::rational::{integerize, Rational};

/// Per-child firing counts for a `Pipeline` of children whose `(pop, push)`
/// rates are given in source order (spec §4.4: "`n_A * u_A = n_B * p_B`...
/// propagate by LCM scaling across the whole pipeline").
pub fn pipeline_firings(rates: &[(u64, u64)]) -> Result<Vec<u64>, GraphError> {
    if rates.is_empty() {
        return Ok(vec![]);
    }
    let mut rats = vec![Rational::new(1, 1)];
    for i in 1..rates.len() {
        let (_, prev_push) = rates[i - 1];
        let (cur_pop, _) = rates[i];
        if cur_pop == 0 {
            return Err(GraphError::UnschedulableGraph {
                reason: format!("pipeline stage {i} has a zero pop-rate"),
            });
        }
        let ratio = Rational::new(prev_push, cur_pop);
        rats.push(rats[i - 1].mul(ratio));
    }
    Ok(integerize(&rats))
}

pub struct FanSolution {
    /// Multiplier applied to each branch's own internal firing counts so
    /// that every branch consumes/produces a mutually consistent share of
    /// the trunk per whole-graph cycle.
    pub branch_scales: Vec<u64>,
    pub trunk_pop: u64,
    pub trunk_push: u64,
}

/// `duplicate` split: every branch sees the full trunk input (spec §4.4:
/// "each branch sees the same rate as the input"), so branches are scaled
/// to a common multiple of their own pop rates, and the trunk consumes
/// exactly that common amount once (not once per branch).
pub fn solve_duplicate_fan(branch_rates: &[(u64, u64)]) -> Result<FanSolution, GraphError> {
    if branch_rates.iter().any(|&(pop, _)| pop == 0) {
        return Err(GraphError::UnschedulableGraph {
            reason: "duplicate split has a branch with zero pop-rate".into(),
        });
    }
    let common = branch_rates.iter().fold(1u64, |acc, &(pop, _)| crate::rational::lcm(acc, pop));
    let scales: Vec<u64> = branch_rates.iter().map(|&(pop, _)| common / pop).collect();
    let trunk_push = scales.iter().zip(branch_rates).map(|(s, &(_, push))| s * push).sum();
    Ok(FanSolution { branch_scales: scales, trunk_pop: common, trunk_push })
}

/// `roundrobin` split with weights `w_i` (sum `W`): branch `i` receives
/// `w_i` elements per `W` trunk elements (spec §4.4). Solved by scaling
/// every branch's firing count so it consumes exactly `w_i` elements per
/// the same number `T` of round-robin rounds, then taking the LCM of the
/// per-branch denominators to integerize `T`.
pub fn solve_roundrobin_fan(
    branch_rates: &[(u64, u64)],
    weights: &[u32],
) -> Result<FanSolution, GraphError> {
    if branch_rates.len() != weights.len() {
        return Err(GraphError::Internal(
            "roundrobin fan: branch count and weight count differ".into(),
        ));
    }
    if branch_rates.iter().any(|&(pop, _)| pop == 0) || weights.iter().any(|&w| w == 0) {
        return Err(GraphError::UnschedulableGraph {
            reason: "roundrobin fan has a branch with zero pop-rate or zero weight".into(),
        });
    }
    let rats: Vec<Rational> = branch_rates
        .iter()
        .zip(weights)
        .map(|(&(pop, _), &w)| Rational::new(w as u64, pop))
        .collect();
    let scales = integerize(&rats);
    let total_weight: u64 = weights.iter().map(|&w| w as u64).sum();
    // `integerize` scaled every term by the LCM of denominators, which is
    // exactly the number of round-robin rounds `T` in the trunk.
    let t = rats.iter().fold(1u64, |acc, r| crate::rational::lcm(acc, r.den));
    let trunk_pop = t * total_weight;
    let trunk_push = scales.iter().zip(branch_rates).map(|(s, &(_, push))| s * push).sum();
    Ok(FanSolution { branch_scales: scales, trunk_pop, trunk_push })
}

/// Final pass: labels every channel's multiplicity from the firing counts
/// [`crate::elaborate`] already assigned to every `Filter` node, following
/// spec §4.4's "multiplicity = firing-count of producer * producer
/// push-rate". `Split`/`Join` channels are transparent pass-throughs whose
/// amount was already fixed by the fan solve that created them; this pass
/// only needs to copy that amount onto the edge and validate the
/// consumer side agrees (the rate-closure invariant spec §8 calls out).
pub fn fill_channel_multiplicities(graph: &mut StreamGraph) -> Result<(), GraphError> {
    let channel_ids: Vec<_> = graph.channels().map(|(id, from, to, _)| (id, from, to)).collect();
    for (channel_id, from, _to) in channel_ids {
        let amount = match graph.node(from) {
            StreamNode::Filter(f) => {
                let firings = f.firing_count.ok_or_else(|| GraphError::Internal(
                    format!("filter '{}' reached multiplicity fill with no firing count", f.name),
                ))?;
                firings * f.push_rate as u64
            }
            StreamNode::Split(_) | StreamNode::Join(_) => {
                // The edge was created with its amount already known (the
                // fan solve that produced this node fixed every outgoing
                // channel's share); read it back from whatever multiplicity
                // elaboration already stashed on the channel itself.
                graph.channel(channel_id).multiplicity.ok_or_else(|| GraphError::Internal(
                    "split/join channel reached multiplicity fill unset".into(),
                ))?
            }
        };
        let channel = graph.channel_mut(channel_id);
        if let Some(existing) = channel.multiplicity {
            if existing != amount {
                return Err(GraphError::UnschedulableGraph {
                    reason: format!(
                        "channel multiplicity disagreement: producer computed {amount}, consumer expected {existing}"
                    ),
                });
            }
        } else {
            channel.multiplicity = Some(amount);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_firings_matches_spec_8_passthrough_example() {
        // counter (pop 0, push 1) -> writer (pop 1, push 0): n_counter=1, n_writer=1.
        let firings = pipeline_firings(&[(0, 1), (1, 0)]).unwrap();
        assert_eq!(firings, vec![1, 1]);
    }

    #[test]
    fn pipeline_firings_scales_mismatched_rates() {
        // A pushes 2, B pops 3: n_A=3, n_B=2 (3*2 == 2*3).
        let firings = pipeline_firings(&[(0, 2), (3, 0)]).unwrap();
        assert_eq!(firings, vec![3, 2]);
    }

    #[test]
    fn duplicate_fan_of_identical_branches_fires_each_once() {
        // scenario 3: two identical F(pop 1, push 8) branches.
        let fan = solve_duplicate_fan(&[(1, 8), (1, 8)]).unwrap();
        assert_eq!(fan.branch_scales, vec![1, 1]);
        assert_eq!(fan.trunk_pop, 1);
        assert_eq!(fan.trunk_push, 16);
    }

    #[test]
    fn roundrobin_fan_with_default_equal_weights_sums_branch_output() {
        // scenario 4: four branches, each pop N push 1, default weights [1,1,1,1].
        let fan = solve_roundrobin_fan(&[(4, 1), (4, 1), (4, 1), (4, 1)], &[1, 1, 1, 1]).unwrap();
        assert_eq!(fan.trunk_pop, 16);
        assert_eq!(fan.trunk_push, 4);
    }
}
