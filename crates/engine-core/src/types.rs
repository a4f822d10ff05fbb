//! Shared value types: node identity, cache keys, the payload contract,
//! and the small data carried across the facade's public API.
//!
//! # NodeId
//!
//! [`NodeId`] wraps an `Arc<str>` rather than a `String` — ids are cloned on
//! every edge traversal, every dirty-set insertion and every topological-sort
//! step, so cloning one needs to be a refcount bump, not an allocation.
//!
//! # CachePayload
//!
//! The cache never inspects what it stores. Callers provide a type
//! implementing [`SizedPayload`]; the cache only needs its byte size and the
//! ability to clone it back out on `retrieve`.

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;

// ── NodeId ───────────────────────────────────────────────────────────

/// Unique, immutable identity of a node. Equality is case-sensitive byte
/// equality. Cheap to clone (refcounted), cheap to hash (cached hash is not
/// kept — strings are short — but the `Arc` avoids re-allocating).
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(Arc<str>);

impl NodeId {
    /// Fails `InvalidArgument` if `id` is empty or all-whitespace.
    pub fn new(id: impl AsRef<str>) -> Result<Self, EngineError> {
        let id = id.as_ref();
        if id.trim().is_empty() {
            return Err(EngineError::invalid_argument(
                "node id must not be empty or whitespace",
            ));
        }
        Ok(NodeId(Arc::from(id)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:?})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for NodeId {
    type Error = EngineError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        NodeId::new(value)
    }
}

impl TryFrom<String> for NodeId {
    type Error = EngineError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        NodeId::new(value)
    }
}

// ── CacheKey ─────────────────────────────────────────────────────────

/// `(node_id, sub_key)`. `sub_key` distinguishes multiple cached artifacts
/// per node (different output ports, intermediate forms, etc).
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct CacheKey {
    pub node_id: NodeId,
    pub sub_key: Arc<str>,
}

impl CacheKey {
    /// Fails `InvalidArgument` if `sub_key` is empty or all-whitespace.
    pub fn new(node_id: NodeId, sub_key: impl AsRef<str>) -> Result<Self, EngineError> {
        let sub_key = sub_key.as_ref();
        if sub_key.trim().is_empty() {
            return Err(EngineError::invalid_argument(
                "cache sub_key must not be empty or whitespace",
            ));
        }
        Ok(CacheKey { node_id, sub_key: Arc::from(sub_key) })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node_id, self.sub_key)
    }
}

/// The sub-key every facade-level operation defaults to when the caller
/// doesn't need more than one cached artifact per node.
pub const DEFAULT_SUB_KEY: &str = "default";

// ── CachePayload contract ────────────────────────────────────────────

/// A value the cache can store: clonable (retrieval yields an owned copy)
/// and self-reporting its own size in bytes. The cache never inspects
/// payload structure beyond this.
pub trait SizedPayload: Clone + Send + Sync + 'static {
    fn payload_size(&self) -> usize;
}

impl SizedPayload for Vec<u8> {
    fn payload_size(&self) -> usize {
        self.len()
    }
}

impl SizedPayload for Arc<[u8]> {
    fn payload_size(&self) -> usize {
        self.len()
    }
}

// ── Cancellation ─────────────────────────────────────────────────────

/// Cheap, clonable handle observable at the evaluator's poll points.
/// The caller holds one end (or a timer holds it) and fires `cancel()`;
/// the engine never constructs or starts one on its own.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CancellationToken(cancelled={})", self.is_cancelled())
    }
}

// ── EvaluationContext ────────────────────────────────────────────────

/// Carries the cancellation token and an opaque handle through to the
/// `NodeEvaluator`. The engine never reads the handle; it is round-tripped
/// for the host application's own bookkeeping (progress UI, request id, …).
#[derive(Clone)]
pub struct EvaluationContext {
    pub cancellation: CancellationToken,
    pub handle: Option<Arc<dyn std::any::Any + Send + Sync>>,
}

impl EvaluationContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self { cancellation, handle: None }
    }

    pub fn with_handle(mut self, handle: Arc<dyn std::any::Any + Send + Sync>) -> Self {
        self.handle = Some(handle);
        self
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

// ── EvaluationResult ─────────────────────────────────────────────────

/// Result of a single `evaluate()` call.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub success: bool,
    /// Nodes visited (evaluator invoked), in evaluation order.
    pub visited_nodes: Vec<NodeId>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub elapsed: Duration,
}

impl EvaluationResult {
    pub(crate) fn empty_success() -> Self {
        Self {
            success: true,
            visited_nodes: Vec::new(),
            cache_hits: 0,
            cache_misses: 0,
            elapsed: Duration::ZERO,
        }
    }
}
