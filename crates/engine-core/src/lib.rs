//! `engine-core` — incremental node-graph evaluation engine.
//!
//! The computational core of a node-based authoring tool: given a DAG of
//! operator nodes, re-evaluate only the nodes whose output can have changed
//! since the last evaluation, reusing cached outputs for everything else.
//!
//! The engine treats node computation as an external collaborator — it
//! never evaluates a node itself. Callers supply a [`NodeEvaluator`] and
//! drive the graph through [`NodeGraph`], the facade composing the five
//! subcomponents below.
//!
//! # Modules
//!
//! - [`types`]             — node/cache identity, the payload contract, cancellation
//! - [`error`]              — `EngineError` / `ErrorCode`, the crate-wide result type
//! - [`dependency_graph`]   — the DAG: cycle detection, topological sort, reachability
//! - [`cache`]              — byte-budgeted LRU store of node outputs
//! - [`dirty_tracker`]      — dirty-flag bookkeeping and transitive invalidation
//! - [`monitor`]            — bounded performance history and trend/bottleneck queries
//! - [`evaluator`]          — the `NodeEvaluator` contract and the topological re-evaluation loop
//! - [`graph`]              — [`NodeGraph`], the public facade
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use engine_core::evaluator::NodeEvaluator;
//! use engine_core::graph::NodeGraph;
//! use engine_core::types::{EvaluationContext, NodeId, SizedPayload};
//!
//! #[derive(Clone)]
//! struct Scalar(f64);
//! impl SizedPayload for Scalar {
//!     fn payload_size(&self) -> usize { std::mem::size_of::<f64>() }
//! }
//!
//! struct PassThrough;
//! impl NodeEvaluator<Scalar> for PassThrough {
//!     fn evaluate(
//!         &self,
//!         _id: &NodeId,
//!         params: &HashMap<String, String>,
//!         deps: &HashMap<NodeId, Scalar>,
//!     ) -> Result<Scalar, Box<dyn std::error::Error + Send + Sync>> {
//!         let base: f64 = params.get("value").and_then(|v| v.parse().ok()).unwrap_or(0.0);
//!         Ok(Scalar(base + deps.values().map(|s| s.0).sum::<f64>()))
//!     }
//! }
//!
//! let graph = NodeGraph::new(Arc::new(PassThrough));
//! let a = NodeId::new("a").unwrap();
//! let b = NodeId::new("b").unwrap();
//! graph.add_node(a.clone()).unwrap();
//! graph.add_node(b.clone()).unwrap();
//! graph.add_dependency(&b, &a).unwrap(); // b depends on a
//! graph.update_parameter(&a, "value", "2").unwrap();
//! let result = graph.evaluate(&EvaluationContext::default()).unwrap();
//! assert!(result.success);
//! ```

pub mod cache;
pub mod dependency_graph;
pub mod dirty_tracker;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod monitor;
pub mod types;

pub use error::{EngineError, EngineResult, ErrorCode};
pub use evaluator::{NodeEvaluator, TopologicalEvaluator};
pub use graph::NodeGraph;
pub use types::{
    CacheKey, CancellationToken, EvaluationContext, EvaluationResult, NodeId, SizedPayload,
};
