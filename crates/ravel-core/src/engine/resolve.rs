//! Pull-based resolution: declaration rounds, dependency resolution and forward definitions.

use super::{ArrayCache, Engine, node_list};
use crate::definition::{Defined, Resolution, StateVarDef, VarKind};
use crate::dependency::{
    ChildEntry, DeclareContext, DependencySpec, DependencySpecs, DependencyValue,
    DependencyValues, NodeTarget, VarPart, VarRef,
};
use crate::diagnostics::Severity;
use crate::registry::ComponentType;
use crate::{NodeId, StateValue, VarKey, VarSlot};
use indexmap::IndexMap;
use std::sync::Arc;

type DeclareDyn<'f> = &'f dyn Fn(&DeclareContext<'_>) -> DependencySpecs;

/// A variable invalidated while it was being evaluated is evaluated again, at most this often.
const MAX_REEVALUATIONS: usize = 2;

impl Engine {
    /// Brings `key` up to date if it is stale. Re-entering a variable that is already being
    /// evaluated is a cycle: every variable on the evaluation stack from that point resolves to
    /// [`StateValue::Invalid`].
    pub(super) fn ensure_fresh(&mut self, key: VarKey) {
        match self.var_state(key) {
            Some(state) if !state.fresh => {}
            _ => return,
        }
        if let Some(pos) = self.stack.iter().position(|k| *k == key) {
            self.report_cycle(pos);
            return;
        }
        self.stack.push(key);
        for _ in 0..=MAX_REEVALUATIONS {
            self.evaluate(key);
            if !self.restaled.remove(&key) {
                break;
            }
        }
        self.stack.pop();
        if self.cycle_members.remove(&key) {
            self.store_invalid(key);
        }
    }

    fn report_cycle(&mut self, pos: usize) {
        let members: Vec<VarKey> = self.stack[pos..].to_vec();
        let mut path: Vec<String> = members.iter().map(|k| self.describe_var(*k)).collect();
        path.push(self.describe_var(members[0]));
        let message = format!("circular dependency: {}", path.join(" -> "));
        let mut nodes: Vec<NodeId> = members.iter().map(|k| k.node).collect();
        nodes.sort_unstable();
        nodes.dedup();
        for node in nodes {
            self.report(Severity::Error, node, message.clone());
        }
        self.cycle_members.extend(members);
    }

    fn evaluate(&mut self, key: VarKey) {
        let Some(rec) = self.record(key.node) else {
            return;
        };
        let ty = rec.ty.clone();
        let shadow_of = rec.shadow_of;
        tracing::trace!(var = %self.describe_var(key), "evaluate");
        match key.slot {
            VarSlot::CHILDREN => self.evaluate_children(key),
            VarSlot::REPLACEMENTS => self.evaluate_replacements(key),
            slot => {
                let Some(def) = ty.def(slot) else {
                    self.store_invalid(key);
                    return;
                };
                if let Some(target) = shadow_of {
                    self.evaluate_shadowed(key, target, def.is_array());
                    return;
                }
                match &def.kind {
                    VarKind::Scalar => self.evaluate_scalar(key, &ty, def),
                    VarKind::Array => self.evaluate_array(key, def),
                    VarKind::Alias(target) => self.evaluate_alias(key, target),
                    VarKind::Companion { primary } => self.evaluate_companion(key, primary),
                }
            }
        }
    }

    fn evaluate_scalar(&mut self, key: VarKey, ty: &ComponentType, def: &StateVarDef) {
        let declare = def.dependencies.as_deref().map(|f| f as DeclareDyn<'_>);
        let (specs, deps) = self.declare_and_resolve(key, declare);
        let defined = match &def.definition {
            Some(define) => define(&deps),
            None if def.essential => Defined::essential_or_default(),
            None => Defined::default_value(def.default_value.clone()),
        };
        let (value, used_default) = match defined.resolution {
            Resolution::Value(value) => (value, defined.used_default),
            Resolution::UseEssentialOrDefault => match self.essential.get(key) {
                Some(value) => (value.clone(), false),
                None => (def.default_value.clone(), true),
            },
        };
        self.fill_companions(key, ty, &def.name, &defined.additional);
        self.store(key, value, used_default, specs, Arc::new(deps));
    }

    fn fill_companions(
        &mut self,
        key: VarKey,
        ty: &ComponentType,
        primary_name: &str,
        additional: &[(String, StateValue)],
    ) {
        for (slot, def) in ty.declared() {
            let VarKind::Companion { primary } = &def.kind else {
                continue;
            };
            if primary != primary_name {
                continue;
            }
            let value = additional
                .iter()
                .find(|(name, _)| *name == def.name)
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| def.default_value.clone());
            self.store(
                VarKey::new(key.node, slot),
                value,
                false,
                Arc::default(),
                Arc::default(),
            );
        }
    }

    fn evaluate_array(&mut self, key: VarKey, def: &StateVarDef) {
        let declare = def.dependencies.as_deref().map(|f| f as DeclareDyn<'_>);
        let (specs, deps) = self.declare_and_resolve(key, declare);
        let size = def.array_size.as_ref().map(|size| size(&deps)).unwrap_or(0);
        let Some(state) = self.var_state_mut(key) else {
            return;
        };
        state.value = if size == 0 {
            StateValue::List(Vec::new())
        } else {
            StateValue::Null
        };
        state.used_default = false;
        state.array = Some(ArrayCache {
            size,
            entries: Default::default(),
            complete: size == 0,
        });
        state.specs = specs;
        state.deps = Arc::new(deps);
        state.fresh = true;
        state.evaluations += 1;
    }

    /// Computes missing entries of a fresh array: just `only`, or all of them.
    fn fill_entries(&mut self, key: VarKey, only: Option<usize>) {
        let Some(ty) = self.record(key.node).map(|rec| rec.ty.clone()) else {
            return;
        };
        let Some(def) = ty.def(key.slot) else {
            return;
        };
        let Some(state) = self.var_state(key).filter(|state| state.fresh) else {
            return;
        };
        let Some(cache) = state.array.as_ref().filter(|cache| !cache.complete) else {
            return;
        };
        let wanted: Vec<usize> = match only {
            Some(index) if index < cache.size && !cache.entries.contains_key(&index) => {
                vec![index]
            }
            Some(_) => return,
            None => (0..cache.size)
                .filter(|i| !cache.entries.contains_key(i))
                .collect(),
        };
        let deps = state.deps.clone();
        let produced = def
            .array_entries
            .as_ref()
            .map(|entries| entries(&deps, &wanted))
            .unwrap_or_default();

        let Some(state) = self.var_state_mut(key) else {
            return;
        };
        let Some(cache) = state.array.as_mut() else {
            return;
        };
        for (index, value) in produced {
            if index < cache.size {
                cache.entries.insert(index, value);
            }
        }
        for index in wanted {
            cache
                .entries
                .entry(index)
                .or_insert_with(|| def.default_value.clone());
        }
        if cache.entries.len() >= cache.size {
            cache.complete = true;
            state.value = StateValue::List(
                (0..cache.size)
                    .map(|i| cache.entries.get(&i).cloned().unwrap_or_default())
                    .collect(),
            );
        }
    }

    fn evaluate_alias(&mut self, key: VarKey, target: &VarRef) {
        self.graph.remove_in_edges(key);
        let Some(slot) = self.slot_of(key.node, &target.name) else {
            self.store_invalid(key);
            return;
        };
        let (value, used_default) = self.read(Some(key), VarKey::new(key.node, slot), target.part);
        self.store(key, value, used_default, Arc::default(), Arc::default());
    }

    fn evaluate_companion(&mut self, key: VarKey, primary: &str) {
        let Some(slot) = self.slot_of(key.node, primary) else {
            self.store_invalid(key);
            return;
        };
        let primary = VarKey::new(key.node, slot);
        self.ensure_fresh(primary);
        if self.var_state(key).is_some_and(|state| !state.fresh) {
            // The primary was already fresh; run it again to refill its companions.
            self.mark_stale(primary);
            self.ensure_fresh(primary);
        }
        if self.var_state(key).is_some_and(|state| !state.fresh) {
            self.store_invalid(key);
        }
    }

    /// Shadow nodes mirror the same slot of the node they shadow.
    fn evaluate_shadowed(&mut self, key: VarKey, target: NodeId, is_array: bool) {
        self.graph.remove_in_edges(key);
        if self.record(target).is_none() {
            self.store_invalid(key);
            return;
        }
        let (value, used_default) =
            self.read(Some(key), VarKey::new(target, key.slot), VarPart::Whole);
        if !is_array {
            self.store(key, value, used_default, Arc::default(), Arc::default());
            return;
        }
        let StateValue::List(items) = value else {
            self.store_invalid(key);
            return;
        };
        let Some(state) = self.var_state_mut(key) else {
            return;
        };
        state.array = Some(ArrayCache {
            size: items.len(),
            entries: items.iter().cloned().enumerate().collect(),
            complete: true,
        });
        state.value = StateValue::List(items);
        state.used_default = used_default;
        state.fresh = true;
        state.evaluations += 1;
    }

    fn evaluate_children(&mut self, key: VarKey) {
        self.graph.remove_in_edges(key);
        let statics = self
            .record(key.node)
            .map(|rec| rec.static_children.clone())
            .unwrap_or_default();
        let mut out = Vec::new();
        for child in statics {
            self.push_expanded(key, child, &mut out);
        }
        let value = StateValue::List(out.into_iter().map(StateValue::Node).collect());
        self.store(key, value, false, Arc::default(), Arc::default());
    }

    fn push_expanded(&mut self, dependent: VarKey, child: NodeId, out: &mut Vec<NodeId>) {
        let composite = self.record(child).is_some_and(|rec| rec.ty.is_composite());
        if !composite {
            out.push(child);
            return;
        }
        let replacements = VarKey::new(child, VarSlot::REPLACEMENTS);
        let (value, _) = self.read(Some(dependent), replacements, VarPart::Whole);
        for id in node_list(&value) {
            self.push_expanded(dependent, id, out);
        }
    }

    /// Reads `target` on behalf of `dependent`, recording the dependency edge.
    pub(super) fn read(
        &mut self,
        dependent: Option<VarKey>,
        target: VarKey,
        part: VarPart,
    ) -> (StateValue, bool) {
        if let Some(dependent) = dependent {
            if dependent != target {
                self.graph.set_edge(target, dependent);
            }
        }
        match part {
            VarPart::Whole => self.whole_value(target),
            VarPart::Entry(index) => self.entry_value(target, index),
            VarPart::Size => self.size_value(target),
        }
    }

    pub(super) fn whole_value(&mut self, key: VarKey) -> (StateValue, bool) {
        self.ensure_fresh(key);
        if self.is_array(key) {
            self.fill_entries(key, None);
        }
        match self.var_state(key) {
            Some(state) if state.fresh => (state.value.clone(), state.used_default),
            _ => (StateValue::Invalid, false),
        }
    }

    pub(super) fn entry_value(&mut self, key: VarKey, index: usize) -> (StateValue, bool) {
        self.ensure_fresh(key);
        let is_array = self.is_array(key);
        if is_array {
            self.fill_entries(key, Some(index));
        }
        let default = self.default_of(key);
        let Some(state) = self.var_state(key).filter(|state| state.fresh) else {
            return (StateValue::Invalid, false);
        };
        if state.value.is_invalid() {
            return (StateValue::Invalid, false);
        }
        let entry = match &state.array {
            Some(cache) => cache.entries.get(&index).cloned(),
            None => state
                .value
                .as_list()
                .and_then(|items| items.get(index))
                .cloned(),
        };
        let fallback = if is_array { default } else { StateValue::Null };
        (entry.unwrap_or(fallback), state.used_default)
    }

    pub(super) fn size_value(&mut self, key: VarKey) -> (StateValue, bool) {
        self.ensure_fresh(key);
        let Some(state) = self.var_state(key).filter(|state| state.fresh) else {
            return (StateValue::Invalid, false);
        };
        let size = match (&state.array, &state.value) {
            (Some(cache), _) => cache.size,
            (None, StateValue::List(items)) => items.len(),
            (None, StateValue::Invalid) => return (StateValue::Invalid, false),
            (None, _) => 0,
        };
        (StateValue::Number(size as f64), false)
    }

    fn default_of(&self, key: VarKey) -> StateValue {
        self.record(key.node)
            .and_then(|rec| rec.ty.def(key.slot))
            .map(|def| def.default_value.clone())
            .unwrap_or_default()
    }

    pub(super) fn store(
        &mut self,
        key: VarKey,
        value: StateValue,
        used_default: bool,
        specs: Arc<DependencySpecs>,
        deps: Arc<DependencyValues>,
    ) {
        let Some(state) = self.var_state_mut(key) else {
            return;
        };
        state.value = value;
        state.used_default = used_default;
        state.array = None;
        state.specs = specs;
        state.deps = deps;
        state.fresh = true;
        state.evaluations += 1;
    }

    fn store_invalid(&mut self, key: VarKey) {
        let Some(state) = self.var_state_mut(key) else {
            return;
        };
        state.value = StateValue::Invalid;
        state.used_default = false;
        state.array = None;
        state.fresh = true;
    }

    /// Runs the declaration until the declared set stops changing. Each round sees the values
    /// resolved in earlier rounds; the result is the union of every round.
    pub(super) fn declare_and_resolve(
        &mut self,
        key: VarKey,
        declare: Option<DeclareDyn<'_>>,
    ) -> (Arc<DependencySpecs>, DependencyValues) {
        self.graph.remove_in_edges(key);
        let mut values = DependencyValues::new();
        let Some(declare) = declare else {
            return (Arc::default(), values);
        };
        let max_rounds = self.config.max_declaration_rounds();
        let mut specs: IndexMap<String, DependencySpec> = IndexMap::new();
        let mut settled = false;
        for round in 1..=max_rounds {
            let declared = {
                let Some(rec) = self.record(key.node) else {
                    break;
                };
                let ctx = DeclareContext {
                    node: key.node,
                    component_type: rec.ty.name(),
                    resolved: &values,
                    round,
                    attributes: &rec.attributes,
                    attribute_components: &rec.attribute_nodes,
                };
                declare(&ctx)
            };
            let mut changed = false;
            for (name, spec) in declared {
                if specs.get(&name) == Some(&spec) {
                    continue;
                }
                let value = self.resolve_dependency(key, &spec);
                values.insert(name.clone(), value);
                specs.insert(name, spec);
                changed = true;
            }
            if !changed {
                settled = true;
                break;
            }
        }
        if !settled {
            let message = format!(
                "dependencies of {} did not settle after {max_rounds} declaration rounds",
                self.describe_var(key)
            );
            self.warn(key.node, message);
        }
        (Arc::new(specs.into_iter().collect()), values)
    }

    fn resolve_dependency(&mut self, key: VarKey, spec: &DependencySpec) -> DependencyValue {
        let node = key.node;
        match spec {
            DependencySpec::SelfVariable(var) => self.read_var_ref(key, node, var),
            DependencySpec::ParentVariable(var) => match self.effective_parent(node) {
                Some(parent) => self.read_var_ref(key, parent, var),
                None => {
                    let message = format!(
                        "{} has no parent to read {var} from",
                        self.describe_node(node)
                    );
                    self.warn(node, message);
                    DependencyValue::Missing
                }
            },
            DependencySpec::AncestorVariable { role, names } => {
                self.resolve_ancestor(key, role, names)
            }
            DependencySpec::ChildGroup {
                of,
                groups,
                variable_names,
                variables_optional,
                recursive,
            } => self.resolve_child_group(
                key,
                of.as_ref(),
                groups,
                variable_names,
                *variables_optional,
                *recursive,
            ),
            DependencySpec::Essential { variable } => self.resolve_essential(key, variable),
            DependencySpec::SourceCompositeVariable { name, per_instance } => {
                match self.source_composite(node) {
                    Some((composite, index)) => {
                        let var = if *per_instance {
                            VarRef::entry(name.clone(), index)
                        } else {
                            VarRef::whole(name.clone())
                        };
                        self.read_var_ref(key, composite, &var)
                    }
                    None => {
                        let message = format!(
                            "{} was not generated by a composite and cannot read {name}",
                            self.describe_node(node)
                        );
                        self.warn(node, message);
                        DependencyValue::Missing
                    }
                }
            }
            DependencySpec::NodeVariable { target, variable } => {
                match self.resolve_target(key, target) {
                    Some(target) => self.read_var_ref(key, target, variable),
                    None => DependencyValue::Missing,
                }
            }
            DependencySpec::AttributeComponent {
                attribute,
                variable,
            } => {
                let component = self
                    .record(node)
                    .and_then(|rec| rec.attribute_nodes.get(attribute).copied());
                match component {
                    Some(component) => self.read_var_ref(key, component, variable),
                    None => DependencyValue::Missing,
                }
            }
            DependencySpec::Attribute { name } => {
                match self.record(node).and_then(|rec| rec.attributes.get(name)) {
                    Some(value) => DependencyValue::Value {
                        value: value.clone(),
                        used_default: false,
                    },
                    None => DependencyValue::Missing,
                }
            }
            DependencySpec::Identity => DependencyValue::Value {
                value: StateValue::Node(node),
                used_default: false,
            },
            DependencySpec::NodeReference(target) => match self.resolve_target(key, target) {
                Some(target) => DependencyValue::Value {
                    value: StateValue::Node(target),
                    used_default: false,
                },
                None => DependencyValue::Missing,
            },
        }
    }

    fn read_var_ref(&mut self, key: VarKey, node: NodeId, var: &VarRef) -> DependencyValue {
        let Some(slot) = self.slot_of(node, &var.name) else {
            let message = format!(
                "{} has no state variable {}",
                self.describe_node(node),
                var.name
            );
            self.warn(key.node, message);
            return DependencyValue::Missing;
        };
        let (value, used_default) = self.read(Some(key), VarKey::new(node, slot), var.part);
        DependencyValue::Value {
            value,
            used_default,
        }
    }

    fn resolve_ancestor(&mut self, key: VarKey, role: &str, names: &[String]) -> DependencyValue {
        let mut current = self.effective_parent(key.node);
        while let Some(candidate) = current {
            if self
                .record(candidate)
                .is_some_and(|rec| rec.ty.matches_group(role))
            {
                break;
            }
            current = self.effective_parent(candidate);
        }
        let Some(ancestor) = current else {
            if !self.registry.knows_group(role) {
                self.warn(key.node, format!("no component type has role {role:?}"));
            }
            return DependencyValue::Missing;
        };
        let mut values = Vec::with_capacity(names.len());
        let mut used_default = Vec::with_capacity(names.len());
        for name in names {
            match self.slot_of(ancestor, name) {
                Some(slot) => {
                    let (value, used) =
                        self.read(Some(key), VarKey::new(ancestor, slot), VarPart::Whole);
                    values.push(value);
                    used_default.push(used);
                }
                None => {
                    let message = format!(
                        "{} has no state variable {name}",
                        self.describe_node(ancestor)
                    );
                    self.warn(key.node, message);
                    values.push(StateValue::Invalid);
                    used_default.push(true);
                }
            }
        }
        DependencyValue::Ancestor {
            node: ancestor,
            values,
            used_default,
        }
    }

    fn resolve_child_group(
        &mut self,
        key: VarKey,
        of: Option<&NodeTarget>,
        groups: &[String],
        variable_names: &[String],
        optional: bool,
        recursive: bool,
    ) -> DependencyValue {
        let owner = match of {
            None => key.node,
            Some(target) => match self.resolve_target(key, target) {
                Some(owner) => owner,
                None => return DependencyValue::Missing,
            },
        };
        for group in groups {
            if !self.registry.knows_group(group) {
                self.warn(key.node, format!("no component type matches group {group:?}"));
            }
        }
        let mut matched = Vec::new();
        self.collect_matching(key, owner, groups, recursive, &mut matched);

        let mut entries = Vec::with_capacity(matched.len());
        for child in matched {
            let Some(ty) = self.record(child).map(|rec| rec.ty.clone()) else {
                continue;
            };
            let mut values = Vec::with_capacity(variable_names.len());
            let mut used_default = Vec::with_capacity(variable_names.len());
            for name in variable_names {
                match ty.slot(name) {
                    Some(slot) => {
                        let (value, used) =
                            self.read(Some(key), VarKey::new(child, slot), VarPart::Whole);
                        values.push(Some(value));
                        used_default.push(used);
                    }
                    None if optional => {
                        values.push(None);
                        used_default.push(true);
                    }
                    None => {
                        let message = format!(
                            "{} has no state variable {name}",
                            self.describe_node(child)
                        );
                        self.warn(key.node, message);
                        values.push(Some(StateValue::Invalid));
                        used_default.push(true);
                    }
                }
            }
            entries.push(ChildEntry {
                node: child,
                component_type: ty.name().to_string(),
                values,
                used_default,
            });
        }
        DependencyValue::Children(entries)
    }

    fn collect_matching(
        &mut self,
        key: VarKey,
        owner: NodeId,
        groups: &[String],
        recursive: bool,
        out: &mut Vec<NodeId>,
    ) {
        let (children, _) = self.read(
            Some(key),
            VarKey::new(owner, VarSlot::CHILDREN),
            VarPart::Whole,
        );
        for child in node_list(&children) {
            let matches = self
                .record(child)
                .is_some_and(|rec| groups.iter().any(|g| rec.ty.matches_group(g)));
            if matches {
                out.push(child);
            }
            if recursive {
                self.collect_matching(key, child, groups, recursive, out);
            }
        }
    }

    fn resolve_essential(&mut self, key: VarKey, variable: &str) -> DependencyValue {
        let slot = self.record(key.node).and_then(|rec| {
            rec.ty
                .slot(variable)
                .filter(|slot| rec.ty.def(*slot).is_some_and(|def| def.essential))
        });
        let Some(slot) = slot else {
            let message = format!(
                "{} has no essential state variable {variable}",
                self.describe_node(key.node)
            );
            self.warn(key.node, message);
            return DependencyValue::Missing;
        };
        let cell = VarKey::new(key.node, slot);
        if cell != key {
            self.graph.set_edge(cell, key);
        }
        DependencyValue::Essential(self.essential.get(cell).cloned())
    }

    /// The composite that generated `node` (or its nearest generated ancestor) and the instance
    /// index within that composite.
    pub(super) fn source_composite(&self, node: NodeId) -> Option<(NodeId, usize)> {
        let mut current = Some(node);
        while let Some(id) = current {
            let rec = self.record(id)?;
            if let Some(composite) = rec.source_composite {
                return Some((composite, rec.instance_index.unwrap_or(0)));
            }
            current = rec.parent;
        }
        None
    }

    /// Resolves a node target. Name lookups are remembered so the reader is invalidated when the
    /// name later appears or disappears. During construction a missing name defers the current
    /// expansion instead of warning.
    fn resolve_target(&mut self, key: VarKey, target: &NodeTarget) -> Option<NodeId> {
        match target {
            NodeTarget::Id(id) => {
                if self.record(*id).is_some() {
                    Some(*id)
                } else {
                    self.warn(key.node, format!("unknown node {id}"));
                    None
                }
            }
            NodeTarget::Name(name) => {
                self.name_readers
                    .entry(name.clone())
                    .or_default()
                    .insert(key);
                match self.names.get(name).copied() {
                    Some(id) => Some(id),
                    None if self.constructing => {
                        self.blocked = true;
                        self.deferred.insert(key);
                        None
                    }
                    None => {
                        self.warn(key.node, format!("no node named {name:?}"));
                        None
                    }
                }
            }
        }
    }

    /// Looks up a node target without recording a reader (inverse direction).
    pub(super) fn lookup_target(&self, target: &NodeTarget) -> Option<NodeId> {
        match target {
            NodeTarget::Id(id) => self.record(*id).map(|_| *id),
            NodeTarget::Name(name) => self.names.get(name).copied(),
        }
    }
}
