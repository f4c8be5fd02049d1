use super::Engine;
use crate::{NodeId, VarKey, VarSlot};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

impl Engine {
    /// Marks `roots` and, transitively, every dependent stale.
    ///
    /// Staleness is closed under dependents, so the walk stops at a variable that is already
    /// stale. Roots always propagate: an essential write changes a value whose variable may itself
    /// be stale while its readers are fresh.
    pub(super) fn invalidate(&mut self, roots: &[VarKey]) {
        if roots.is_empty() {
            return;
        }
        let root_set: FxHashSet<VarKey> = roots.iter().copied().collect();
        let mut visited: FxHashSet<VarKey> = FxHashSet::default();
        let mut queue: VecDeque<VarKey> = roots.iter().copied().collect();
        let mut staled = 0usize;
        while let Some(key) = queue.pop_front() {
            if !visited.insert(key) {
                continue;
            }
            let was_fresh = self.mark_stale(key);
            if self.stack.contains(&key) {
                self.restaled.insert(key);
            }
            if was_fresh {
                staled += 1;
            } else if !root_set.contains(&key) {
                continue;
            }
            let successors: Vec<VarKey> = self.graph.successors(key).collect();
            queue.extend(successors.into_iter().filter(|k| !visited.contains(k)));
        }
        tracing::trace!(roots = roots.len(), staled, "invalidated");
    }

    /// Returns whether the variable was fresh.
    pub(super) fn mark_stale(&mut self, key: VarKey) -> bool {
        let Some(state) = self.var_state_mut(key) else {
            return false;
        };
        let was_fresh = state.fresh;
        state.fresh = false;
        state.array = None;
        was_fresh
    }

    pub(super) fn node_keys(&self, node: NodeId) -> Vec<VarKey> {
        self.record(node)
            .map(|rec| {
                (0..rec.ty.slot_count() as u32)
                    .map(|slot| VarKey::new(node, VarSlot(slot)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Invalidates every variable of `node` and the nodes below it.
    pub(super) fn invalidate_subtree(&mut self, node: NodeId) {
        let keys: Vec<VarKey> = self
            .subtree(node)
            .into_iter()
            .flat_map(|id| self.node_keys(id))
            .collect();
        self.invalidate(&keys);
    }

    /// `node` plus its attribute components, static children and every allocated replacement,
    /// in preorder.
    pub(super) fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Some(rec) = self.record(id) else {
                continue;
            };
            out.push(id);
            let mut below: Vec<NodeId> = rec.attribute_nodes.values().copied().collect();
            below.extend(rec.static_children.iter().copied());
            if let Some(state) = &rec.replacements {
                below.extend(state.by_key.values().copied());
            }
            stack.extend(below.into_iter().rev());
        }
        out
    }

    /// Registers an author name. The first node to claim a name keeps it.
    pub(super) fn register_name(&mut self, full_name: String, node: NodeId) {
        if let Some(existing) = self.names.get(&full_name).copied() {
            if existing != node {
                let message = format!("duplicate name {full_name:?}; keeping the first node");
                self.warn(node, message);
            }
            return;
        }
        self.names.insert(full_name.clone(), node);
        self.invalidate_name_readers(&full_name);
    }

    pub(super) fn register_subtree_names(&mut self, node: NodeId) {
        for id in self.subtree(node) {
            let visible = !self.is_hidden(id);
            if let Some(full) = self.record(id).and_then(|rec| rec.full_name()) {
                if visible {
                    self.register_name(full, id);
                }
            }
        }
    }

    pub(super) fn unregister_subtree_names(&mut self, node: NodeId) {
        for id in self.subtree(node) {
            let Some(full) = self.record(id).and_then(|rec| rec.full_name()) else {
                continue;
            };
            if self.names.get(&full) == Some(&id) {
                self.names.remove(&full);
                self.invalidate_name_readers(&full);
            }
        }
    }

    fn invalidate_name_readers(&mut self, name: &str) {
        let Some(readers) = self.name_readers.get(name) else {
            return;
        };
        let mut readers: Vec<VarKey> = readers.iter().copied().collect();
        readers.sort_unstable();
        self.invalidate(&readers);
    }

    /// Withheld, or below a withheld replacement.
    pub(super) fn is_hidden(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(rec) = self.record(id) else {
                return true;
            };
            if rec.withheld {
                return true;
            }
            current = rec.parent;
        }
        false
    }
}
