//! The external node-computation contract and the topological re-evaluation
//! loop that drives it over a dirty set.

use std::collections::HashMap;
use std::time::Instant;

use crate::cache::Cache;
use crate::dependency_graph::DependencyGraph;
use crate::dirty_tracker::DirtyTracker;
use crate::error::{EngineError, EngineResult};
use crate::monitor::PerformanceMonitor;
use crate::types::{CacheKey, EvaluationContext, EvaluationResult, NodeId, SizedPayload, DEFAULT_SUB_KEY};

/// Host-supplied computation kernel. The engine treats a call as pure for
/// the duration of one evaluation step; it never constructs or schedules
/// evaluators of its own.
pub trait NodeEvaluator<P: SizedPayload>: Send + Sync {
    /// Computes `node_id`'s output given its current parameters and the
    /// already-computed outputs of its immediate dependencies.
    fn evaluate(
        &self,
        node_id: &NodeId,
        parameters: &HashMap<String, String>,
        dependency_outputs: &HashMap<NodeId, P>,
    ) -> Result<P, Box<dyn std::error::Error + Send + Sync>>;
}

/// Stateless driver: reads the dirty snapshot, sorts it topologically and
/// walks it once, invoking the evaluator for every node that needs it.
pub struct TopologicalEvaluator;

impl TopologicalEvaluator {
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate<P: SizedPayload>(
        graph: &DependencyGraph,
        dirty: &DirtyTracker,
        cache: &Cache<P>,
        monitor: &PerformanceMonitor,
        parameters: &HashMap<NodeId, HashMap<String, String>>,
        node_evaluator: &dyn NodeEvaluator<P>,
        ctx: &EvaluationContext,
    ) -> EngineResult<EvaluationResult> {
        let start = Instant::now();
        let span = monitor.begin();

        let dirty_snapshot = dirty.dirty_nodes();
        if ctx.cancellation.is_cancelled() {
            monitor.complete(span, 0)?;
            return Err(EngineError::cancelled("evaluation cancelled before it began"));
        }
        if dirty_snapshot.is_empty() {
            monitor.complete(span, 0)?;
            return Ok(EvaluationResult::empty_success());
        }

        let order = match graph.topological_order_subset(&dirty_snapshot) {
            Ok(order) => order,
            Err(e) => {
                monitor.complete(span, 0)?;
                return Err(e);
            }
        };

        let mut visited = Vec::with_capacity(order.len());
        let mut cache_hits = 0u64;
        let mut cache_misses = 0u64;

        for node in &order {
            if ctx.cancellation.is_cancelled() {
                monitor.complete(span, visited.len())?;
                return Err(EngineError::cancelled(format!(
                    "evaluation cancelled after {} of {} nodes",
                    visited.len(),
                    order.len()
                )));
            }

            // `order` is drawn from `dirty_snapshot` itself, so every node
            // reached here is dirty by construction and must be
            // (re-)evaluated — there is no "already cached, skip it" case
            // at this point in the loop.
            let key = CacheKey::new(node.clone(), DEFAULT_SUB_KEY)?;
            let deps = graph.dependencies(node)?;
            let mut dependency_outputs = HashMap::with_capacity(deps.len());
            for dep in &deps {
                let dep_key = CacheKey::new(dep.clone(), DEFAULT_SUB_KEY)?;
                match cache.retrieve(&dep_key) {
                    Some(payload) => {
                        cache_hits += 1;
                        monitor.record_cache_access(true);
                        dependency_outputs.insert(dep.clone(), payload);
                    }
                    None => {
                        monitor.complete(span, visited.len())?;
                        return Err(EngineError::invalid_state(format!(
                            "dependency '{dep}' of '{node}' has no cached output at evaluation time"
                        )));
                    }
                }
            }

            let node_params = parameters.get(node).cloned().unwrap_or_default();
            let node_span = monitor.begin_node();
            let outcome = node_evaluator.evaluate(node, &node_params, &dependency_outputs);
            monitor.complete_node(node_span);

            if ctx.cancellation.is_cancelled() {
                monitor.complete(span, visited.len())?;
                return Err(EngineError::cancelled(format!(
                    "evaluation cancelled while committing '{node}'"
                )));
            }

            match outcome {
                Ok(payload) => {
                    cache.store(key, payload)?;
                    dirty.mark_clean(node)?;
                    cache_misses += 1;
                    monitor.record_cache_access(false);
                    visited.push(node.clone());
                }
                Err(cause) => {
                    monitor.complete(span, visited.len())?;
                    return Err(EngineError::node_evaluation_failed(node.to_string(), cause));
                }
            }
        }

        monitor.complete(span, visited.len())?;
        Ok(EvaluationResult {
            success: true,
            visited_nodes: visited,
            cache_hits,
            cache_misses,
            elapsed: start.elapsed(),
        })
    }
}
