//! Tracks which nodes need re-evaluation, plus a propagation graph
//! mirroring the DependencyGraph's edges so invalidation can walk
//! downstream without asking the DependencyGraph for help.
//!
//! Keyed on small integer indices rather than hashing `NodeId` on every
//! edge walk — the teacher's `mark_dirty`/`prune_downstream` pair does the
//! BFS over `String` keys directly, which is fine at its scale but not at
//! the 1000-node scenarios this engine targets.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::types::NodeId;

struct Slot {
    id: NodeId,
    dirty: bool,
    /// Indices of nodes that depend on this one (propagation targets).
    dependents: Vec<usize>,
}

#[derive(Default)]
struct Arena {
    index_of: HashMap<NodeId, usize>,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
}

impl Arena {
    fn get(&self, idx: usize) -> &Slot {
        self.slots[idx].as_ref().expect("dangling arena index")
    }

    fn get_mut(&mut self, idx: usize) -> &mut Slot {
        self.slots[idx].as_mut().expect("dangling arena index")
    }
}

pub struct DirtyTracker {
    inner: RwLock<Arena>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Arena::default()) }
    }

    /// Registers a node, initially dirty (it has never been evaluated).
    pub fn add_node(&self, id: NodeId) -> EngineResult<()> {
        let mut a = self.inner.write();
        if a.index_of.contains_key(&id) {
            return Err(EngineError::already_exists(format!("node '{id}' already tracked")));
        }
        let slot = Slot { id: id.clone(), dirty: true, dependents: Vec::new() };
        let idx = if let Some(idx) = a.free.pop() {
            a.slots[idx] = Some(slot);
            idx
        } else {
            a.slots.push(Some(slot));
            a.slots.len() - 1
        };
        a.index_of.insert(id, idx);
        Ok(())
    }

    pub fn remove_node(&self, id: &NodeId) -> EngineResult<()> {
        let mut a = self.inner.write();
        let idx = a
            .index_of
            .remove(id)
            .ok_or_else(|| EngineError::not_found(format!("node '{id}' not tracked")))?;
        a.slots[idx] = None;
        a.free.push(idx);
        for slot in a.slots.iter_mut().flatten() {
            slot.dependents.retain(|&d| d != idx);
        }
        Ok(())
    }

    /// Mirrors a dependency edge `from -> to` (from depends on to) as a
    /// propagation edge `to -> from` (dirtying `to` must dirty `from`).
    pub fn add_dependency(&self, from: &NodeId, to: &NodeId) -> EngineResult<()> {
        let mut a = self.inner.write();
        let from_idx = *a
            .index_of
            .get(from)
            .ok_or_else(|| EngineError::not_found(format!("node '{from}' not tracked")))?;
        let to_idx = *a
            .index_of
            .get(to)
            .ok_or_else(|| EngineError::not_found(format!("node '{to}' not tracked")))?;
        if Self::reaches(&a, from_idx, to_idx) {
            return Err(EngineError::cycle_detected(format!(
                "adding '{from}' -> '{to}' would create a cycle in the propagation graph"
            )));
        }
        let dependents = &mut a.get_mut(to_idx).dependents;
        if !dependents.contains(&from_idx) {
            dependents.push(from_idx);
        }
        Ok(())
    }

    pub fn remove_dependency(&self, from: &NodeId, to: &NodeId) -> EngineResult<()> {
        let mut a = self.inner.write();
        let from_idx = *a
            .index_of
            .get(from)
            .ok_or_else(|| EngineError::not_found(format!("node '{from}' not tracked")))?;
        let to_idx = *a
            .index_of
            .get(to)
            .ok_or_else(|| EngineError::not_found(format!("node '{to}' not tracked")))?;
        a.get_mut(to_idx).dependents.retain(|&d| d != from_idx);
        Ok(())
    }

    /// Does following `dependents` edges from `start` reach `target`?
    fn reaches(a: &Arena, start: usize, target: usize) -> bool {
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        while let Some(idx) = stack.pop() {
            if idx == target {
                return true;
            }
            if !seen.insert(idx) {
                continue;
            }
            stack.extend(a.get(idx).dependents.iter().copied());
        }
        false
    }

    pub fn mark_dirty(&self, id: &NodeId) -> EngineResult<()> {
        let mut a = self.inner.write();
        let idx = *a
            .index_of
            .get(id)
            .ok_or_else(|| EngineError::not_found(format!("node '{id}' not tracked")))?;
        a.get_mut(idx).dirty = true;
        Ok(())
    }

    pub fn mark_clean(&self, id: &NodeId) -> EngineResult<()> {
        let mut a = self.inner.write();
        if let Some(&idx) = a.index_of.get(id) {
            a.get_mut(idx).dirty = false;
        }
        Ok(())
    }

    pub fn batch_mark_dirty(&self, ids: &[NodeId]) -> EngineResult<()> {
        let mut a = self.inner.write();
        for id in ids {
            if let Some(&idx) = a.index_of.get(id) {
                a.get_mut(idx).dirty = true;
            }
        }
        Ok(())
    }

    pub fn batch_mark_clean(&self, ids: &[NodeId]) -> EngineResult<()> {
        let mut a = self.inner.write();
        for id in ids {
            if let Some(&idx) = a.index_of.get(id) {
                a.get_mut(idx).dirty = false;
            }
        }
        Ok(())
    }

    pub fn is_dirty(&self, id: &NodeId) -> EngineResult<bool> {
        let a = self.inner.read();
        let idx = *a
            .index_of
            .get(id)
            .ok_or_else(|| EngineError::not_found(format!("node '{id}' not tracked")))?;
        Ok(a.get(idx).dirty)
    }

    pub fn dirty_count(&self) -> usize {
        let a = self.inner.read();
        a.slots.iter().flatten().filter(|s| s.dirty).count()
    }

    pub fn dirty_nodes(&self) -> HashSet<NodeId> {
        let a = self.inner.read();
        a.slots.iter().flatten().filter(|s| s.dirty).map(|s| s.id.clone()).collect()
    }

    /// BFS over propagation edges, dirtying every node forward-reachable
    /// from `id` (exclusive of `id` itself). No-op if `id` is unknown.
    pub fn invalidate_dependents(&self, id: &NodeId) -> EngineResult<()> {
        let mut a = self.inner.write();
        let Some(&start) = a.index_of.get(id) else { return Ok(()) };
        let mut queue: VecDeque<usize> = a.get(start).dependents.clone().into();
        let mut visited: HashSet<usize> = HashSet::new();
        while let Some(idx) = queue.pop_front() {
            if !visited.insert(idx) {
                continue;
            }
            a.get_mut(idx).dirty = true;
            for next in a.get(idx).dependents.clone() {
                if !visited.contains(&next) {
                    queue.push_back(next);
                }
            }
        }
        Ok(())
    }

    /// Clears the dirty set while preserving the propagation graph.
    pub fn reset(&self) {
        let mut a = self.inner.write();
        for slot in a.slots.iter_mut().flatten() {
            slot.dirty = false;
        }
    }
}

impl Default for DirtyTracker {
    fn default() -> Self {
        Self::new()
    }
}
