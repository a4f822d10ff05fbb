//! The dependency DAG: nodes plus directed "depends-on" edges, kept acyclic
//! at all times so that topological order is always well-defined.
//!
//! Mirrors the teacher's adjacency-map rebuild (`rebuild_topo`'s in-degree
//! Kahn's walk), but with a `BinaryHeap<Reverse<NodeId>>` frontier in place
//! of a plain queue, so the emitted order is reproducible independent of
//! insertion history.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use parking_lot::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::types::NodeId;

#[derive(Default)]
struct Adjacency {
    /// Immediate dependencies: `out[n]` = nodes `n` depends on.
    out: HashMap<NodeId, HashSet<NodeId>>,
    /// Immediate dependents: `in[n]` = nodes that depend on `n`.
    incoming: HashMap<NodeId, HashSet<NodeId>>,
}

/// Thread-safe directed acyclic graph of node identities.
pub struct DependencyGraph {
    inner: RwLock<Adjacency>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Adjacency::default()) }
    }

    pub fn add_node(&self, id: NodeId) -> EngineResult<()> {
        let mut g = self.inner.write();
        if g.out.contains_key(&id) {
            return Err(EngineError::already_exists(format!("node '{id}' already exists")));
        }
        g.out.insert(id.clone(), HashSet::new());
        g.incoming.insert(id, HashSet::new());
        Ok(())
    }

    pub fn remove_node(&self, id: &NodeId) -> EngineResult<()> {
        let mut g = self.inner.write();
        if !g.out.contains_key(id) {
            return Err(EngineError::not_found(format!("node '{id}' not found")));
        }
        let deps = g.out.remove(id).unwrap_or_default();
        let dependents = g.incoming.remove(id).unwrap_or_default();
        for dep in &deps {
            if let Some(set) = g.incoming.get_mut(dep) {
                set.remove(id);
            }
        }
        for dependent in &dependents {
            if let Some(set) = g.out.get_mut(dependent) {
                set.remove(id);
            }
        }
        Ok(())
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.inner.read().out.contains_key(id)
    }

    /// Records `to` as a dependency of `from` (edge `from -> to` in
    /// dependency direction: `from` depends on `to`, so `to` must be
    /// evaluated first).
    pub fn add_dependency(&self, from: &NodeId, to: &NodeId) -> EngineResult<()> {
        if from == to {
            return Err(EngineError::invalid_argument("a node cannot depend on itself"));
        }
        let mut g = self.inner.write();
        if !g.out.contains_key(from) {
            return Err(EngineError::not_found(format!("node '{from}' not found")));
        }
        if !g.out.contains_key(to) {
            return Err(EngineError::not_found(format!("node '{to}' not found")));
        }
        if g.out.get(from).map(|s| s.contains(to)).unwrap_or(false) {
            return Err(EngineError::already_exists(format!(
                "dependency '{from}' -> '{to}' already exists"
            )));
        }
        if Self::reaches(&g.out, to, from) {
            return Err(EngineError::cycle_detected(format!(
                "adding '{from}' -> '{to}' would create a cycle"
            )));
        }
        g.out.get_mut(from).unwrap().insert(to.clone());
        g.incoming.get_mut(to).unwrap().insert(from.clone());
        Ok(())
    }

    pub fn remove_dependency(&self, from: &NodeId, to: &NodeId) -> EngineResult<()> {
        let mut g = self.inner.write();
        let removed_out = g.out.get_mut(from).map(|s| s.remove(to)).unwrap_or(false);
        if !removed_out {
            return Err(EngineError::not_found(format!(
                "dependency '{from}' -> '{to}' not found"
            )));
        }
        if let Some(set) = g.incoming.get_mut(to) {
            set.remove(from);
        }
        Ok(())
    }

    pub fn has_dependency(&self, from: &NodeId, to: &NodeId) -> bool {
        self.inner.read().out.get(from).map(|s| s.contains(to)).unwrap_or(false)
    }

    pub fn dependencies(&self, id: &NodeId) -> EngineResult<Vec<NodeId>> {
        let g = self.inner.read();
        g.out
            .get(id)
            .map(|s| s.iter().cloned().collect())
            .ok_or_else(|| EngineError::not_found(format!("node '{id}' not found")))
    }

    pub fn dependents(&self, id: &NodeId) -> EngineResult<Vec<NodeId>> {
        let g = self.inner.read();
        g.incoming
            .get(id)
            .map(|s| s.iter().cloned().collect())
            .ok_or_else(|| EngineError::not_found(format!("node '{id}' not found")))
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().out.len()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.inner.read().out.keys().cloned().collect()
    }

    /// DFS from `start`, true if `target` is reachable following
    /// dependency edges (`out`).
    fn reaches(out: &HashMap<NodeId, HashSet<NodeId>>, start: &NodeId, target: &NodeId) -> bool {
        let mut stack = vec![start.clone()];
        let mut seen = HashSet::new();
        while let Some(n) = stack.pop() {
            if &n == target {
                return true;
            }
            if !seen.insert(n.clone()) {
                continue;
            }
            if let Some(next) = out.get(&n) {
                stack.extend(next.iter().cloned());
            }
        }
        false
    }

    /// Full topological order, deterministic tie-break by NodeId ascending.
    /// Kahn's algorithm with `out`/`incoming` swapped so dependencies are
    /// visited before dependents: a node becomes ready once every node it
    /// depends on has been emitted.
    pub fn topological_order(&self) -> EngineResult<Vec<NodeId>> {
        let g = self.inner.read();
        Self::topo_order_over(&g, g.out.keys().cloned().collect())
    }

    /// Topological order restricted to `subset`, considering only edges
    /// whose both endpoints lie in `subset`. Used by the evaluator to sort
    /// just the dirty set.
    pub fn topological_order_subset(&self, subset: &HashSet<NodeId>) -> EngineResult<Vec<NodeId>> {
        let g = self.inner.read();
        Self::topo_order_over(&g, subset.iter().cloned().collect())
    }

    fn topo_order_over(g: &Adjacency, nodes: Vec<NodeId>) -> EngineResult<Vec<NodeId>> {
        let node_set: HashSet<NodeId> = nodes.iter().cloned().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        for n in &nodes {
            let deps_in_subset = g
                .out
                .get(n)
                .map(|deps| deps.iter().filter(|d| node_set.contains(*d)).count())
                .unwrap_or(0);
            in_degree.insert(n.clone(), deps_in_subset);
        }

        let mut frontier: BinaryHeap<Reverse<NodeId>> = BinaryHeap::new();
        for (n, deg) in &in_degree {
            if *deg == 0 {
                frontier.push(Reverse(n.clone()));
            }
        }

        let mut order = Vec::with_capacity(nodes.len());
        while let Some(Reverse(n)) = frontier.pop() {
            order.push(n.clone());
            if let Some(dependents) = g.incoming.get(&n) {
                let mut ready: Vec<NodeId> = Vec::new();
                for dependent in dependents {
                    if !node_set.contains(dependent) {
                        continue;
                    }
                    if let Some(deg) = in_degree.get_mut(dependent) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.push(dependent.clone());
                        }
                    }
                }
                for r in ready {
                    frontier.push(Reverse(r));
                }
            }
        }

        if order.len() != nodes.len() {
            return Err(EngineError::invalid_state(
                "cycle detected during topological sort; graph invariant violated",
            ));
        }
        Ok(order)
    }

    /// `{id} ∪ forward_reachable(id)`, via BFS over dependent edges.
    pub fn affected(&self, id: &NodeId) -> EngineResult<HashSet<NodeId>> {
        let g = self.inner.read();
        if !g.out.contains_key(id) {
            return Err(EngineError::not_found(format!("node '{id}' not found")));
        }
        let mut seen = HashSet::new();
        seen.insert(id.clone());
        let mut queue = VecDeque::new();
        queue.push_back(id.clone());
        while let Some(n) = queue.pop_front() {
            if let Some(dependents) = g.incoming.get(&n) {
                for dependent in dependents {
                    if seen.insert(dependent.clone()) {
                        queue.push_back(dependent.clone());
                    }
                }
            }
        }
        Ok(seen)
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
