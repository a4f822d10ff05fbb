//! Performance smoke tests — catch catastrophic regressions, not tune
//! microseconds. Budgets are generous (5-10x expected) so they only fail
//! when something is seriously wrong (e.g. an accidental O(n^2) walk).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use engine_core::evaluator::NodeEvaluator;
use engine_core::graph::NodeGraph;
use engine_core::types::{EvaluationContext, NodeId, SizedPayload};

#[derive(Clone)]
struct Num(i64);

impl SizedPayload for Num {
    fn payload_size(&self) -> usize {
        8
    }
}

struct SumEvaluator;

impl NodeEvaluator<Num> for SumEvaluator {
    fn evaluate(
        &self,
        _node_id: &NodeId,
        parameters: &HashMap<String, String>,
        dependency_outputs: &HashMap<NodeId, Num>,
    ) -> Result<Num, Box<dyn std::error::Error + Send + Sync>> {
        let base: i64 = parameters.get("value").and_then(|v| v.parse().ok()).unwrap_or(0);
        Ok(Num(base + dependency_outputs.values().map(|n| n.0).sum::<i64>()))
    }
}

fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

fn build_chain(n: usize) -> NodeGraph<Num> {
    let g = NodeGraph::new(Arc::new(SumEvaluator));
    for i in 0..n {
        let node = id(&format!("n{i}"));
        g.add_node(node.clone()).unwrap();
        g.update_parameter(&node, "value", "1").unwrap();
    }
    for i in 1..n {
        g.add_dependency(&id(&format!("n{i}")), &id(&format!("n{}", i - 1))).unwrap();
    }
    g
}

#[test]
fn perf_smoke_10k_chain_full_eval_under_2s() {
    let g = build_chain(10_000);
    let start = Instant::now();
    let result = g.evaluate(&EvaluationContext::default()).unwrap();
    let elapsed = start.elapsed();
    assert_eq!(result.visited_nodes.len(), 10_000);
    assert!(elapsed.as_millis() < 2_000, "10k-node full eval took {}ms (budget: 2000ms)", elapsed.as_millis());
}

#[test]
fn perf_smoke_10k_chain_single_dirty_incremental_under_200ms() {
    let g = build_chain(10_000);
    g.evaluate(&EvaluationContext::default()).unwrap();

    let start = Instant::now();
    g.update_parameter(&id("n0"), "value", "2").unwrap();
    let result = g.evaluate(&EvaluationContext::default()).unwrap();
    let elapsed = start.elapsed();
    assert_eq!(result.visited_nodes.len(), 10_000);
    assert!(
        elapsed.as_millis() < 200,
        "incremental re-evaluation of a fully-dirtied 10k chain took {}ms (budget: 200ms)",
        elapsed.as_millis()
    );
}

#[test]
fn perf_smoke_10k_chain_tail_dirty_is_cheap() {
    let g = build_chain(10_000);
    g.evaluate(&EvaluationContext::default()).unwrap();

    let start = Instant::now();
    g.update_parameter(&id("n9999"), "value", "2").unwrap();
    let result = g.evaluate(&EvaluationContext::default()).unwrap();
    let elapsed = start.elapsed();
    assert_eq!(result.visited_nodes.len(), 1);
    assert!(
        elapsed.as_millis() < 50,
        "dirtying a single leaf in a 10k chain took {}ms (budget: 50ms)",
        elapsed.as_millis()
    );
}

#[test]
fn perf_smoke_topological_sort_10k_under_500ms() {
    let g = build_chain(10_000);
    let start = Instant::now();
    let order = g.topological_order().unwrap();
    let elapsed = start.elapsed();
    assert_eq!(order.len(), 10_000);
    assert!(elapsed.as_millis() < 500, "10k-node topological sort took {}ms (budget: 500ms)", elapsed.as_millis());
}
