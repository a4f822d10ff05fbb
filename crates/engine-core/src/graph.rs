//! `NodeGraph`: the public facade composing the five engine components
//! and enforcing the cross-component invariants between them.
//!
//! # Locking discipline
//!
//! When an operation touches more than one component, locks are acquired
//! in the fixed order `DependencyGraph < DirtyTracker < Cache <
//! PerformanceMonitor`. No facade method holds two locks across an
//! internal call boundary outside that order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::{Cache, CacheStatistics, DEFAULT_MEMORY_LIMIT};
use crate::dependency_graph::DependencyGraph;
use crate::dirty_tracker::DirtyTracker;
use crate::error::EngineResult;
use crate::evaluator::{NodeEvaluator, TopologicalEvaluator};
use crate::monitor::{BottleneckReport, PerformanceMetrics, PerformanceMonitor, Trend};
use crate::types::{CacheKey, EvaluationContext, EvaluationResult, NodeId, SizedPayload, DEFAULT_SUB_KEY};

/// An incremental node-graph evaluation engine.
///
/// Owns a [`DependencyGraph`], a [`DirtyTracker`], a [`Cache`], and a
/// [`PerformanceMonitor`], plus the per-node parameter store the facade
/// itself is responsible for (none of the five components own it). There
/// is no process-wide singleton: every caller holds its own `NodeGraph`.
pub struct NodeGraph<P: SizedPayload> {
    dependency_graph: DependencyGraph,
    dirty_tracker: DirtyTracker,
    cache: Cache<P>,
    monitor: PerformanceMonitor,
    parameters: RwLock<HashMap<NodeId, HashMap<String, String>>>,
    evaluator: Arc<dyn NodeEvaluator<P>>,
}

impl<P: SizedPayload> NodeGraph<P> {
    /// Builds a graph with the implementation-defined default cache ceiling
    /// (64 MiB). Never fails — the default limit is always valid.
    pub fn new(evaluator: Arc<dyn NodeEvaluator<P>>) -> Self {
        Self::with_cache_limit(evaluator, DEFAULT_MEMORY_LIMIT)
            .expect("default cache memory limit is always > 0")
    }

    pub fn with_cache_limit(evaluator: Arc<dyn NodeEvaluator<P>>, cache_memory_limit: usize) -> EngineResult<Self> {
        Ok(Self {
            dependency_graph: DependencyGraph::new(),
            dirty_tracker: DirtyTracker::new(),
            cache: Cache::new(cache_memory_limit)?,
            monitor: PerformanceMonitor::new(),
            parameters: RwLock::new(HashMap::new()),
            evaluator,
        })
    }

    pub fn add_node(&self, id: NodeId) -> EngineResult<()> {
        self.dependency_graph.add_node(id.clone())?;
        self.dirty_tracker.add_node(id.clone())?;
        self.cache.invalidate_node(&id);
        self.parameters.write().insert(id, HashMap::new());
        self.monitor.record_structural_event();
        Ok(())
    }

    pub fn remove_node(&self, id: &NodeId) -> EngineResult<()> {
        self.dependency_graph.remove_node(id)?;
        self.dirty_tracker.remove_node(id)?;
        self.cache.invalidate_node(id);
        self.parameters.write().remove(id);
        Ok(())
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.dependency_graph.contains_node(id)
    }

    /// `from` depends on `to`; `to` must be evaluated first.
    pub fn add_dependency(&self, from: &NodeId, to: &NodeId) -> EngineResult<()> {
        self.dependency_graph.add_dependency(from, to)?;
        self.dirty_tracker.add_dependency(from, to)?;
        self.dirty_tracker.invalidate_dependents(from)?;
        Ok(())
    }

    pub fn remove_dependency(&self, from: &NodeId, to: &NodeId) -> EngineResult<()> {
        self.dependency_graph.remove_dependency(from, to)?;
        self.dirty_tracker.remove_dependency(from, to)?;
        Ok(())
    }

    pub fn has_dependency(&self, from: &NodeId, to: &NodeId) -> bool {
        self.dependency_graph.has_dependency(from, to)
    }

    pub fn dependencies(&self, id: &NodeId) -> EngineResult<Vec<NodeId>> {
        self.dependency_graph.dependencies(id)
    }

    pub fn dependents(&self, id: &NodeId) -> EngineResult<Vec<NodeId>> {
        self.dependency_graph.dependents(id)
    }

    pub fn topological_order(&self) -> EngineResult<Vec<NodeId>> {
        self.dependency_graph.topological_order()
    }

    pub fn update_parameter(
        &self,
        id: &NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> EngineResult<()> {
        {
            let mut params = self.parameters.write();
            let entry = params
                .get_mut(id)
                .ok_or_else(|| crate::error::EngineError::not_found(format!("node '{id}' not found")))?;
            entry.insert(name.into(), value.into());
        }
        self.dirty_tracker.mark_dirty(id)?;
        self.dirty_tracker.invalidate_dependents(id)?;
        self.monitor.record_parameter_update(id, "value")?;
        Ok(())
    }

    pub fn evaluate(&self, ctx: &EvaluationContext) -> EngineResult<EvaluationResult> {
        let parameters = self.parameters.read().clone();
        TopologicalEvaluator::evaluate(
            &self.dependency_graph,
            &self.dirty_tracker,
            &self.cache,
            &self.monitor,
            &parameters,
            self.evaluator.as_ref(),
            ctx,
        )
    }

    pub fn node_count(&self) -> usize {
        self.dependency_graph.node_count()
    }

    pub fn dirty_node_count(&self) -> usize {
        self.dirty_tracker.dirty_count()
    }

    pub fn is_dirty(&self, id: &NodeId) -> EngineResult<bool> {
        self.dirty_tracker.is_dirty(id)
    }

    pub fn cache_statistics(&self) -> CacheStatistics {
        self.cache.statistics()
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.monitor.metrics()
    }

    pub fn trend(&self) -> Trend {
        self.monitor.trend()
    }

    pub fn bottlenecks(&self, threshold: std::time::Duration) -> BottleneckReport {
        self.monitor.bottlenecks(threshold)
    }

    /// Count of structural mutations (currently: `add_node`) recorded by
    /// the performance monitor.
    pub fn structural_event_count(&self) -> u64 {
        self.monitor.structural_event_count()
    }

    /// Direct access to a node's cached output under the default sub-key,
    /// bypassing dirty/eval bookkeeping. Useful for inspection and tests.
    pub fn cached_output(&self, id: &NodeId) -> Option<P> {
        let key = CacheKey::new(id.clone(), DEFAULT_SUB_KEY).ok()?;
        self.cache.retrieve(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancellationToken;

    #[derive(Clone, Debug, PartialEq)]
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

    fn chain(len: usize) -> NodeGraph<Num> {
        let g = NodeGraph::with_cache_limit(Arc::new(SumEvaluator), 1 << 20).unwrap();
        for i in 0..len {
            let n = id(&format!("n{i}"));
            g.add_node(n.clone()).unwrap();
            g.update_parameter(&n, "value", "1").unwrap();
        }
        for i in 0..len.saturating_sub(1) {
            g.add_dependency(&id(&format!("n{}", i + 1)), &id(&format!("n{i}"))).unwrap();
        }
        g
    }

    #[test]
    fn linear_chain_incremental_scenario() {
        let g = chain(100);
        let ctx = EvaluationContext::default();
        let result = g.evaluate(&ctx).unwrap();
        assert_eq!(result.visited_nodes.len(), 100);

        g.update_parameter(&id("n50"), "value", "2").unwrap();
        assert_eq!(g.dirty_node_count(), 50);

        let result2 = g.evaluate(&EvaluationContext::default()).unwrap();
        assert_eq!(result2.visited_nodes.len(), 50);
        assert_eq!(result2.visited_nodes[0], id("n50"));
        assert_eq!(*result2.visited_nodes.last().unwrap(), id("n99"));
    }

    #[test]
    fn disconnected_components_only_evaluate_touched_chain() {
        let g = NodeGraph::with_cache_limit(Arc::new(SumEvaluator), 1 << 20).unwrap();
        for n in ["n0", "n1", "n2", "n3", "n4", "n5"] {
            g.add_node(id(n)).unwrap();
            g.update_parameter(&id(n), "value", "1").unwrap();
        }
        g.add_dependency(&id("n1"), &id("n0")).unwrap();
        g.add_dependency(&id("n2"), &id("n1")).unwrap();
        g.add_dependency(&id("n4"), &id("n3")).unwrap();
        g.add_dependency(&id("n5"), &id("n4")).unwrap();
        g.evaluate(&EvaluationContext::default()).unwrap();

        g.update_parameter(&id("n0"), "value", "9").unwrap();
        let result = g.evaluate(&EvaluationContext::default()).unwrap();
        assert_eq!(result.visited_nodes, vec![id("n0"), id("n1"), id("n2")]);
        assert!(!g.is_dirty(&id("n3")).unwrap());
    }

    #[test]
    fn diamond_propagation_orders_sinks_last() {
        let g = NodeGraph::with_cache_limit(Arc::new(SumEvaluator), 1 << 20).unwrap();
        for n in ["a", "b", "c", "d"] {
            g.add_node(id(n)).unwrap();
            g.update_parameter(&id(n), "value", "1").unwrap();
        }
        g.add_dependency(&id("b"), &id("a")).unwrap();
        g.add_dependency(&id("c"), &id("a")).unwrap();
        g.add_dependency(&id("d"), &id("b")).unwrap();
        g.add_dependency(&id("d"), &id("c")).unwrap();

        g.update_parameter(&id("a"), "value", "5").unwrap();
        let result = g.evaluate(&EvaluationContext::default()).unwrap();
        assert_eq!(result.visited_nodes.len(), 4);
        assert_eq!(*result.visited_nodes.last().unwrap(), id("d"));
        let b_pos = result.visited_nodes.iter().position(|n| n == &id("b")).unwrap();
        let c_pos = result.visited_nodes.iter().position(|n| n == &id("c")).unwrap();
        let d_pos = result.visited_nodes.iter().position(|n| n == &id("d")).unwrap();
        assert!(b_pos < d_pos);
        assert!(c_pos < d_pos);
    }

    #[test]
    fn cycle_rejection_leaves_graph_unchanged() {
        let g = NodeGraph::with_cache_limit(Arc::new(SumEvaluator), 1 << 20).unwrap();
        for n in ["n0", "n1", "n2"] {
            g.add_node(id(n)).unwrap();
        }
        g.add_dependency(&id("n1"), &id("n0")).unwrap();
        g.add_dependency(&id("n2"), &id("n1")).unwrap();
        let err = g.add_dependency(&id("n0"), &id("n2")).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::CycleDetected);
        assert!(!g.has_dependency(&id("n0"), &id("n2")));
        assert_eq!(g.topological_order().unwrap(), vec![id("n0"), id("n1"), id("n2")]);
    }

    #[test]
    fn add_node_records_structural_event() {
        let g = NodeGraph::with_cache_limit(Arc::new(SumEvaluator), 1 << 20).unwrap();
        assert_eq!(g.structural_event_count(), 0);
        g.add_node(id("a")).unwrap();
        g.add_node(id("b")).unwrap();
        assert_eq!(g.structural_event_count(), 2);
    }

    #[test]
    fn cancellation_then_resume_completes_the_rest() {
        let g = chain(30);
        let token = CancellationToken::new();
        // Cancel the token up front: nothing should be visited this pass.
        token.cancel();
        let ctx = EvaluationContext::new(token);
        let err = g.evaluate(&ctx).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Cancelled);
        assert_eq!(g.dirty_node_count(), 30);

        let result = g.evaluate(&EvaluationContext::default()).unwrap();
        assert_eq!(result.visited_nodes.len(), 30);
        assert_eq!(g.dirty_node_count(), 0);
    }
}
