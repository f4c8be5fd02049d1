//! Composite expansion: replacement diffing by stable key, withholding, shadows and teardown.

use super::{Engine, Naming, NodeRecord, node_list};
use crate::dependency::{DeclareContext, DependencySpecs, VarPart};
use crate::registry::{ExpansionContext, ReplacementSource, ReplacementSpec};
use crate::{NodeId, StateValue, VarKey, VarSlot};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::sync::Arc;

impl Engine {
    /// Evaluates a composite's built-in `replacements` variable, re-expanding the composite.
    ///
    /// Reading this variable while stale is what triggers expansion; everything that reads the
    /// composite's children (a parent's child list, child-group dependencies) therefore sees the
    /// current replacements.
    pub(super) fn evaluate_replacements(&mut self, key: VarKey) {
        let Some(rec) = self.record(key.node) else {
            return;
        };
        if let Some(target) = rec.shadow_of {
            self.evaluate_shadowed_replacements(key, target);
            return;
        }
        let Some(behavior) = rec.ty.behavior().cloned() else {
            self.graph.remove_in_edges(key);
            self.store(
                key,
                StateValue::List(Vec::new()),
                false,
                Arc::default(),
                Arc::default(),
            );
            return;
        };

        let outer_blocked = std::mem::take(&mut self.blocked);
        let declare: &dyn Fn(&DeclareContext<'_>) -> DependencySpecs =
            &|ctx: &DeclareContext<'_>| behavior.dependencies(ctx);
        let (specs, deps) = self.declare_and_resolve(key, Some(declare));
        let blocked = self.blocked;
        self.blocked |= outer_blocked;

        let current = self.active_replacements(key.node);
        if blocked && self.constructing {
            self.deferred.insert(key);
            self.store(key, current, false, specs, Arc::new(deps));
            return;
        }
        if self.cycle_members.contains(&key) {
            self.store(key, current, false, specs, Arc::new(deps));
            return;
        }

        let (candidates, warnings) = {
            let Some(rec) = self.record(key.node) else {
                return;
            };
            let lineage = self.lineage(key.node);
            let ctx = ExpansionContext {
                node: key.node,
                name: rec.name.as_deref(),
                template: &rec.template,
                lineage: &lineage,
                warnings: RefCell::default(),
            };
            let candidates = behavior.replacements(&deps, &ctx);
            (candidates, ctx.warnings.into_inner())
        };
        for message in warnings {
            let message = format!("{}: {message}", self.describe_node(key.node));
            self.warn(key.node, message);
        }
        let candidates = match candidates {
            Ok(candidates) => candidates,
            Err(message) => {
                let message = format!("{}: {message}", self.describe_node(key.node));
                self.warn(key.node, message);
                Vec::new()
            }
        };
        self.apply_replacements(key.node, candidates);
        let value = self.active_replacements(key.node);
        self.store(key, value, false, specs, Arc::new(deps));
    }

    /// A shadow of a composite does not expand on its own: it mirrors the target's active
    /// replacements one for one, under the target's keys, so edits made through an extension
    /// land on the original instances.
    fn evaluate_shadowed_replacements(&mut self, key: VarKey, target: NodeId) {
        self.graph.remove_in_edges(key);
        let (value, _) = self.read(
            Some(key),
            VarKey::new(target, VarSlot::REPLACEMENTS),
            VarPart::Whole,
        );
        let keys: FxHashMap<NodeId, String> = self
            .record(target)
            .and_then(|rec| rec.replacements.as_ref())
            .map(|state| state.by_key.iter().map(|(k, id)| (*id, k.clone())).collect())
            .unwrap_or_default();
        let candidates = node_list(&value)
            .into_iter()
            .map(|id| ReplacementSpec {
                key: keys.get(&id).cloned().unwrap_or_else(|| id.0.to_string()),
                source: ReplacementSource::Shadow(id),
            })
            .collect();
        self.apply_replacements(key.node, candidates);
        let value = self.active_replacements(key.node);
        self.store(key, value, false, Arc::default(), Arc::default());
    }

    fn active_replacements(&self, composite: NodeId) -> StateValue {
        let active = self
            .record(composite)
            .and_then(|rec| rec.replacements.as_ref())
            .map(|state| state.active.clone())
            .unwrap_or_default();
        StateValue::List(active.into_iter().map(StateValue::Node).collect())
    }

    /// Diffs `candidates` against the composite's allocated replacements by key. Matching keys
    /// keep their node; new keys instantiate; vanished keys are withheld, or destroyed in trim
    /// mode.
    fn apply_replacements(&mut self, composite: NodeId, candidates: Vec<ReplacementSpec>) {
        let trim = self.config.trim_withheld();
        let scope = self.record(composite).and_then(|rec| rec.full_name());
        let mut active = Vec::with_capacity(candidates.len());
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut created = 0usize;

        for (index, spec) in candidates.into_iter().enumerate() {
            if !seen.insert(spec.key.clone()) {
                let message = format!("duplicate replacement key {:?}", spec.key);
                self.warn(composite, message);
                continue;
            }
            let existing = self.replacement_by_key(composite, &spec.key);
            let reusable = existing.filter(|id| self.is_compatible(*id, &spec.source));
            let id = match reusable {
                Some(id) => {
                    self.reuse_replacement(id, index);
                    id
                }
                None => {
                    if let Some(stale) = existing {
                        self.destroy_node(stale);
                    }
                    let naming = match &scope {
                        Some(scope) => Naming::Scoped(format!("{scope}[{}]", index + 1)),
                        None => Naming::Anonymous,
                    };
                    let built = match spec.source {
                        ReplacementSource::Template(tree) => self
                            .build_node(&tree, Some(composite), naming, Some((composite, index)))
                            .map_err(|err| err.to_string()),
                        ReplacementSource::Shadow(target) => self
                            .build_shadow(target, composite, Some((composite, index)))
                            .ok_or_else(|| format!("cannot shadow missing node {target}")),
                    };
                    match built {
                        Ok(id) => {
                            created += 1;
                            id
                        }
                        Err(message) => {
                            self.warn(composite, message);
                            continue;
                        }
                    }
                }
            };
            if let Some(state) = self
                .record_mut(composite)
                .and_then(|rec| rec.replacements.as_mut())
            {
                state.by_key.insert(spec.key, id);
            }
            active.push(id);
        }

        let vanished: Vec<(String, NodeId)> = self
            .record(composite)
            .and_then(|rec| rec.replacements.as_ref())
            .map(|state| {
                state
                    .by_key
                    .iter()
                    .filter(|(key, _)| !seen.contains(*key))
                    .map(|(key, id)| (key.clone(), *id))
                    .collect()
            })
            .unwrap_or_default();
        for (key, id) in &vanished {
            if trim {
                self.destroy_node(*id);
                if let Some(state) = self
                    .record_mut(composite)
                    .and_then(|rec| rec.replacements.as_mut())
                {
                    state.by_key.shift_remove(key);
                }
            } else {
                self.withhold(*id);
            }
        }

        tracing::debug!(
            composite = composite.0,
            active = active.len(),
            created,
            vanished = vanished.len(),
            trim,
            "expanded composite"
        );
        if let Some(state) = self
            .record_mut(composite)
            .and_then(|rec| rec.replacements.as_mut())
        {
            state.active = active;
        }
    }

    fn replacement_by_key(&self, composite: NodeId, key: &str) -> Option<NodeId> {
        self.record(composite)?
            .replacements
            .as_ref()?
            .by_key
            .get(key)
            .copied()
    }

    fn is_compatible(&self, id: NodeId, source: &ReplacementSource) -> bool {
        let Some(rec) = self.record(id) else {
            return false;
        };
        match source {
            ReplacementSource::Template(_) => rec.shadow_of.is_none(),
            ReplacementSource::Shadow(target) => rec.shadow_of == Some(*target),
        }
    }

    fn reuse_replacement(&mut self, id: NodeId, index: usize) {
        let (was_withheld, moved) = match self.record_mut(id) {
            Some(rec) => {
                let was_withheld = std::mem::replace(&mut rec.withheld, false);
                let moved = rec.instance_index != Some(index);
                rec.instance_index = Some(index);
                (was_withheld, moved)
            }
            None => return,
        };
        if was_withheld {
            self.register_subtree_names(id);
        }
        if moved {
            self.invalidate_subtree(id);
        }
    }

    fn withhold(&mut self, id: NodeId) {
        let newly = match self.record_mut(id) {
            Some(rec) => !std::mem::replace(&mut rec.withheld, true),
            None => false,
        };
        if newly {
            self.unregister_subtree_names(id);
        }
    }

    /// Creates a node mirroring `target`: same type and literal attributes, with every declared
    /// variable forwarding to the target. Static children are shadowed recursively; a shadowed
    /// composite mirrors the target's replacements instead of expanding a template.
    fn build_shadow(
        &mut self,
        target: NodeId,
        parent: NodeId,
        origin: Option<(NodeId, usize)>,
    ) -> Option<NodeId> {
        let source = self.record(target)?;
        let mut record = NodeRecord::new(source.ty.clone(), Some(parent), Naming::Anonymous);
        record.name = source.name.clone();
        record.attributes = source.attributes.clone();
        record.position = source.position;
        record.shadow_of = Some(target);
        if let Some((composite, index)) = origin {
            record.source_composite = Some(composite);
            record.instance_index = Some(index);
        }
        let children = source.static_children.clone();
        let id = self.alloc(record);
        for child in children {
            if let Some(shadow) = self.build_shadow(child, id, None) {
                if let Some(rec) = self.record_mut(id) {
                    rec.static_children.push(shadow);
                }
            }
        }
        Some(id)
    }

    /// Removes `node` and everything below it: graph vertices, essential cells and names.
    /// Readers of the removed variables are invalidated.
    pub(super) fn destroy_node(&mut self, node: NodeId) {
        let doomed = self.subtree(node);
        let doomed_set: FxHashSet<NodeId> = doomed.iter().copied().collect();
        self.unregister_subtree_names(node);

        let mut readers = Vec::new();
        for id in &doomed {
            for key in self.node_keys(*id) {
                readers.extend(
                    self.graph
                        .successors(key)
                        .filter(|k| !doomed_set.contains(&k.node)),
                );
                self.graph.remove_node(key);
            }
            self.essential.remove_node(*id);
        }
        for id in &doomed {
            if let Some(slot) = self.nodes.get_mut(id.0 as usize) {
                *slot = None;
            }
        }
        readers.sort_unstable();
        readers.dedup();
        self.invalidate(&readers);
        tracing::debug!(node = node.0, removed = doomed.len(), "destroyed replacement");
    }

    /// Destroys every withheld replacement of every composite. Returns how many were removed.
    pub fn trim_withheld(&mut self) -> usize {
        let mut doomed = Vec::new();
        for (id, rec) in self.live_nodes() {
            if let Some(state) = &rec.replacements {
                for (key, replacement) in &state.by_key {
                    if self.record(*replacement).is_some_and(|r| r.withheld) {
                        doomed.push((id, key.clone(), *replacement));
                    }
                }
            }
        }
        let mut removed = 0;
        for (composite, key, replacement) in doomed {
            if !self.contains(replacement) {
                continue;
            }
            self.destroy_node(replacement);
            if let Some(state) = self
                .record_mut(composite)
                .and_then(|rec| rec.replacements.as_mut())
            {
                state.by_key.shift_remove(&key);
            }
            removed += 1;
        }
        removed
    }

    /// Visible nodes in document order: each node, its attribute components, then its
    /// expanded children.
    pub(super) fn visible_nodes(&mut self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(attribute_nodes) = self
                .record(id)
                .map(|rec| rec.attribute_nodes.values().copied().collect::<Vec<_>>())
            else {
                continue;
            };
            out.push(id);
            let (children, _) = self.whole_value(VarKey::new(id, VarSlot::CHILDREN));
            let mut below = attribute_nodes;
            below.extend(node_list(&children));
            stack.extend(below.into_iter().rev());
        }
        out
    }
}
