//! The resolution engine: one instance per document.
//!
//! Every state variable of every node is a vertex of a dependency graph keyed by
//! `(NodeId, VarSlot)`. Reads are pull-based: a stale variable re-declares its dependencies,
//! resolves them (recursively) and re-runs its definition. Writes only ever happen to essential
//! cells, through inverse definitions, and invalidate their transitive dependents.

mod composite;
mod invalidate;
mod inverse;
mod resolve;
mod snapshot;

pub use snapshot::{NodeSnapshot, Snapshot, SnapshotDelta};

use crate::config::RavelConfig;
use crate::dependency::{DependencySpecs, DependencyValues};
use crate::diagnostics::{Diagnostic, Diagnostics, Severity, SourceSpan};
use crate::essential::EssentialStore;
use crate::registry::{ComponentRegistry, ComponentType};
use crate::tree::{AttributeValue, NodeTree, TreeChild};
use crate::{Error, NodeId, Result, StateValue, VarKey, VarSlot};
use indexmap::IndexMap;
use ravel_graph::Graph;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Upper bound on construction-time expansion passes.
const MAX_EXPANSION_PASSES: usize = 256;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub registry: Arc<ComponentRegistry>,
    pub config: RavelConfig,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            registry: ComponentRegistry::standard_shared(),
            config: RavelConfig::default(),
        }
    }
}

impl EngineOptions {
    pub fn with_registry(mut self, registry: Arc<ComponentRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: RavelConfig) -> Self {
        self.config = config;
        self
    }
}

/// How a node's author name is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Naming {
    Global,
    /// Inside a named composite's instance: `composite[index]/name`.
    Scoped(String),
    /// Inside an unnamed composite, or a shadow: names are not registered.
    Anonymous,
}

impl Naming {
    fn full_name(&self, name: Option<&str>) -> Option<String> {
        let name = name?;
        match self {
            Naming::Global => Some(name.to_string()),
            Naming::Scoped(prefix) => Some(format!("{prefix}/{name}")),
            Naming::Anonymous => None,
        }
    }
}

#[derive(Debug, Default)]
struct ReplacementState {
    active: Vec<NodeId>,
    /// Every allocated replacement, active or withheld.
    by_key: IndexMap<String, NodeId>,
}

#[derive(Debug, Default)]
struct ArrayCache {
    size: usize,
    entries: FxHashMap<usize, StateValue>,
    complete: bool,
}

#[derive(Debug, Default)]
struct VarState {
    fresh: bool,
    value: StateValue,
    used_default: bool,
    array: Option<ArrayCache>,
    specs: Arc<DependencySpecs>,
    deps: Arc<DependencyValues>,
    evaluations: u64,
}

#[derive(Debug)]
struct NodeRecord {
    ty: Arc<ComponentType>,
    name: Option<String>,
    naming: Naming,
    attributes: IndexMap<String, StateValue>,
    attribute_nodes: IndexMap<String, NodeId>,
    static_children: Vec<NodeId>,
    template: Vec<NodeTree>,
    parent: Option<NodeId>,
    position: Option<SourceSpan>,
    shadow_of: Option<NodeId>,
    source_composite: Option<NodeId>,
    instance_index: Option<usize>,
    replacements: Option<ReplacementState>,
    withheld: bool,
    vars: Vec<VarState>,
}

impl NodeRecord {
    fn new(ty: Arc<ComponentType>, parent: Option<NodeId>, naming: Naming) -> Self {
        let vars = (0..ty.slot_count()).map(|_| VarState::default()).collect();
        let replacements = ty.is_composite().then(ReplacementState::default);
        Self {
            ty,
            name: None,
            naming,
            attributes: IndexMap::new(),
            attribute_nodes: IndexMap::new(),
            static_children: Vec::new(),
            template: Vec::new(),
            parent,
            position: None,
            shadow_of: None,
            source_composite: None,
            instance_index: None,
            replacements,
            withheld: false,
            vars,
        }
    }

    fn full_name(&self) -> Option<String> {
        self.naming.full_name(self.name.as_deref())
    }
}

/// A document instance.
#[derive(Debug)]
pub struct Engine {
    registry: Arc<ComponentRegistry>,
    config: RavelConfig,
    nodes: Vec<Option<NodeRecord>>,
    names: FxHashMap<String, NodeId>,
    name_readers: FxHashMap<String, FxHashSet<VarKey>>,
    root: NodeId,
    graph: Graph<VarKey>,
    essential: EssentialStore,
    diagnostics: Diagnostics,
    stack: Vec<VarKey>,
    cycle_members: FxHashSet<VarKey>,
    /// Variables invalidated while on the evaluation stack.
    restaled: FxHashSet<VarKey>,
    inverse_stack: Vec<VarKey>,
    constructing: bool,
    blocked: bool,
    deferred: FxHashSet<VarKey>,
    last_emitted: Option<Snapshot>,
}

impl Engine {
    /// Builds an engine over `tree` with the standard component library and default config.
    pub fn new(tree: &NodeTree) -> Result<Self> {
        Self::with_options(tree, EngineOptions::default())
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::new(&NodeTree::from_json_str(text)?)
    }

    /// Builds the static tree, expands composites to a fixpoint and resolves every variable once.
    pub fn with_options(tree: &NodeTree, options: EngineOptions) -> Result<Self> {
        tree.validate()?;
        check_component_types(&options.registry, tree)?;

        let mirror = options.config.mirror_diagnostics_to_log();
        let mut engine = Self {
            registry: options.registry,
            config: options.config,
            nodes: Vec::new(),
            names: FxHashMap::default(),
            name_readers: FxHashMap::default(),
            root: NodeId(0),
            graph: Graph::new(),
            essential: EssentialStore::default(),
            diagnostics: Diagnostics::new(mirror),
            stack: Vec::new(),
            cycle_members: FxHashSet::default(),
            restaled: FxHashSet::default(),
            inverse_stack: Vec::new(),
            constructing: true,
            blocked: false,
            deferred: FxHashSet::default(),
            last_emitted: None,
        };
        engine.root = engine.build_node(tree, None, Naming::Global, None)?;
        engine.expand_to_fixpoint();
        engine.resolve_all();
        tracing::debug!(
            nodes = engine.nodes.len(),
            edges = engine.graph.edge_count(),
            diagnostics = engine.diagnostics.items().len(),
            "engine constructed"
        );
        Ok(engine)
    }

    fn build_node(
        &mut self,
        tree: &NodeTree,
        parent: Option<NodeId>,
        naming: Naming,
        origin: Option<(NodeId, usize)>,
    ) -> Result<NodeId> {
        let ty = self
            .registry
            .get(&tree.component_type)
            .cloned()
            .ok_or_else(|| Error::UnknownComponentType {
                component_type: tree.component_type.clone(),
            })?;

        let mut record = NodeRecord::new(ty.clone(), parent, naming.clone());
        record.name = tree.name.clone();
        record.position = tree.position;
        if let Some((composite, index)) = origin {
            record.source_composite = Some(composite);
            record.instance_index = Some(index);
        }
        let mut components = Vec::new();
        for (name, value) in &tree.attributes {
            match value {
                AttributeValue::Literal(json) => {
                    record
                        .attributes
                        .insert(name.clone(), StateValue::from_json(json));
                }
                AttributeValue::Component(component) => components.push((name, component)),
            }
        }
        if ty.has_template() {
            record.template = tree.children.iter().cloned().map(TreeChild::into_node).collect();
        }
        let id = self.alloc(record);

        for (slot, def) in ty.declared() {
            if def.essential {
                let initial = self
                    .record(id)
                    .and_then(|rec| rec.attributes.get(&def.name))
                    .cloned();
                if let Some(value) = initial {
                    self.essential.initialize(VarKey::new(id, slot), value);
                }
            }
        }
        self.link_companions(id, &ty);
        if let Some(full) = naming.full_name(tree.name.as_deref()) {
            self.register_name(full, id);
        }

        for (name, component) in components {
            let child = self.build_node(component, Some(id), naming.clone(), None)?;
            if let Some(rec) = self.record_mut(id) {
                rec.attribute_nodes.insert(name.clone(), child);
            }
        }
        if !ty.has_template() {
            for child in &tree.children {
                let child = child.clone().into_node();
                let child = self.build_node(&child, Some(id), naming.clone(), None)?;
                if let Some(rec) = self.record_mut(id) {
                    rec.static_children.push(child);
                }
            }
        }
        Ok(id)
    }

    fn alloc(&mut self, record: NodeRecord) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(record));
        id
    }

    fn link_companions(&mut self, id: NodeId, ty: &ComponentType) {
        for (slot, def) in ty.declared() {
            if let crate::VarKind::Companion { primary } = &def.kind {
                if let Some(primary) = ty.slot(primary) {
                    self.graph
                        .set_edge(VarKey::new(id, primary), VarKey::new(id, slot));
                }
            }
        }
    }

    /// Expands composites until no pending composite can make progress. Composites whose
    /// dependencies name nodes that do not exist yet are retried after the others; whatever is
    /// still blocked at the fixpoint expands with warnings.
    fn expand_to_fixpoint(&mut self) {
        for pass in 0..MAX_EXPANSION_PASSES {
            let pending = self.pending_composites();
            if pending.is_empty() {
                break;
            }
            let mut progressed = false;
            for key in pending {
                self.blocked = false;
                self.ensure_fresh(key);
                if self.blocked {
                    self.invalidate(&[key]);
                } else {
                    progressed = true;
                }
            }
            tracing::debug!(pass, progressed, "composite expansion pass");
            if !progressed {
                break;
            }
        }
        self.constructing = false;
        self.blocked = false;
        let mut deferred: Vec<VarKey> = self.deferred.drain().collect();
        deferred.sort_unstable();
        self.invalidate(&deferred);
    }

    fn pending_composites(&self) -> Vec<VarKey> {
        self.live_nodes()
            .filter(|(_, rec)| rec.ty.is_composite() && !rec.withheld)
            .map(|(id, _)| VarKey::new(id, VarSlot::REPLACEMENTS))
            .filter(|key| self.var_state(*key).is_some_and(|state| !state.fresh))
            .collect()
    }

    /// Arrays resolve their size only; entries stay lazy until read.
    fn resolve_all(&mut self) {
        let keys: Vec<VarKey> = self
            .live_nodes()
            .flat_map(|(id, rec)| {
                (0..rec.ty.slot_count() as u32).map(move |slot| VarKey::new(id, VarSlot(slot)))
            })
            .collect();
        for key in keys {
            self.ensure_fresh(key);
        }
    }

    fn live_nodes(&self) -> impl Iterator<Item = (NodeId, &NodeRecord)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, rec)| rec.as_ref().map(|rec| (NodeId(i as u32), rec)))
    }

    fn record(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn record_mut(&mut self, id: NodeId) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    fn var_state(&self, key: VarKey) -> Option<&VarState> {
        self.record(key.node)?.vars.get(key.slot.index())
    }

    fn var_state_mut(&mut self, key: VarKey) -> Option<&mut VarState> {
        self.record_mut(key.node)?.vars.get_mut(key.slot.index())
    }

    fn slot_of(&self, node: NodeId, variable: &str) -> Option<VarSlot> {
        self.record(node)?.ty.slot(variable)
    }

    fn is_array(&self, key: VarKey) -> bool {
        self.record(key.node)
            .and_then(|rec| rec.ty.def(key.slot))
            .is_some_and(crate::StateVarDef::is_array)
    }

    /// The nearest ancestor that is not a composite.
    fn effective_parent(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.record(id)?.parent;
        while let Some(candidate) = current {
            let rec = self.record(candidate)?;
            if !rec.ty.is_composite() {
                return Some(candidate);
            }
            current = rec.parent;
        }
        None
    }

    fn lineage(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        let mut current = self.record(id).and_then(|rec| rec.parent);
        while let Some(node) = current {
            out.push(node);
            current = self.record(node).and_then(|rec| rec.parent);
        }
        out
    }

    fn describe_node(&self, id: NodeId) -> String {
        match self.record(id) {
            Some(rec) => match &rec.name {
                Some(name) => format!("<{}> {:?}", rec.ty.name(), name),
                None => format!("<{}> {id}", rec.ty.name()),
            },
            None => format!("removed node {id}"),
        }
    }

    fn describe_var(&self, key: VarKey) -> String {
        match self.record(key.node) {
            Some(rec) => format!(
                "{}.{}",
                self.describe_node(key.node),
                rec.ty.var_name(key.slot)
            ),
            None => format!("{}.?", self.describe_node(key.node)),
        }
    }

    fn report(&mut self, severity: Severity, node: NodeId, message: String) {
        let position = self.record(node).and_then(|rec| rec.position);
        self.diagnostics.push(severity, message, Some(node), position);
    }

    fn warn(&mut self, node: NodeId, message: String) {
        self.report(Severity::Warning, node, message);
    }

    fn key_of(&self, node: NodeId, variable: &str) -> Result<VarKey> {
        let rec = self.record(node).ok_or_else(|| Error::UnknownNode {
            node: node.to_string(),
        })?;
        let slot = rec
            .ty
            .slot(variable)
            .ok_or_else(|| Error::UnknownStateVariable {
                component_type: rec.ty.name().to_string(),
                variable: variable.to_string(),
            })?;
        Ok(VarKey::new(node, slot))
    }

    fn label(&self, key: VarKey) -> (NodeId, String) {
        let name = self
            .record(key.node)
            .map(|rec| rec.ty.var_name(key.slot).to_string())
            .unwrap_or_default();
        (key.node, name)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RavelConfig {
        &self.config
    }

    /// Looks up a node by author name (`name`, or `composite[2]/name` inside a template instance).
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.record(node).is_some()
    }

    pub fn component_type(&self, node: NodeId) -> Option<&str> {
        self.record(node).map(|rec| rec.ty.name())
    }

    pub fn node_name(&self, node: NodeId) -> Option<&str> {
        self.record(node).and_then(|rec| rec.name.as_deref())
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.record(node).and_then(|rec| rec.parent)
    }

    pub fn shadow_of(&self, node: NodeId) -> Option<NodeId> {
        self.record(node).and_then(|rec| rec.shadow_of)
    }

    pub fn is_withheld(&self, node: NodeId) -> bool {
        self.record(node).is_some_and(|rec| rec.withheld)
    }

    /// Resolves (if stale) and returns a variable's value.
    pub fn value(&mut self, node: NodeId, variable: &str) -> Result<StateValue> {
        let key = self.key_of(node, variable)?;
        Ok(self.whole_value(key).0)
    }

    pub fn value_by_name(&mut self, name: &str, variable: &str) -> Result<StateValue> {
        let node = self.node_id(name).ok_or_else(|| Error::UnknownNode {
            node: name.to_string(),
        })?;
        self.value(node, variable)
    }

    pub fn used_default(&mut self, node: NodeId, variable: &str) -> Result<bool> {
        let key = self.key_of(node, variable)?;
        Ok(self.whole_value(key).1)
    }

    /// One entry (0-based) of an array variable, computing only that entry.
    pub fn entry(&mut self, node: NodeId, variable: &str, index: usize) -> Result<StateValue> {
        let key = self.key_of(node, variable)?;
        Ok(self.entry_value(key, index).0)
    }

    pub fn array_size(&mut self, node: NodeId, variable: &str) -> Result<usize> {
        let key = self.key_of(node, variable)?;
        Ok(self.size_value(key).0.as_f64().unwrap_or(0.0) as usize)
    }

    /// The node's children with composites replaced by their active replacements.
    pub fn children(&mut self, node: NodeId) -> Result<Vec<NodeId>> {
        let key = self.key_of(node, "children")?;
        Ok(node_list(&self.whole_value(key).0))
    }

    /// A composite's active replacements, in order.
    pub fn replacements(&mut self, node: NodeId) -> Result<Vec<NodeId>> {
        let key = self.key_of(node, "replacements")?;
        Ok(node_list(&self.whole_value(key).0))
    }

    /// A composite's withheld replacements.
    pub fn withheld(&self, node: NodeId) -> Vec<NodeId> {
        let Some(state) = self.record(node).and_then(|rec| rec.replacements.as_ref()) else {
            return Vec::new();
        };
        state
            .by_key
            .values()
            .copied()
            .filter(|id| self.is_withheld(*id))
            .collect()
    }

    pub fn is_fresh(&self, node: NodeId, variable: &str) -> Result<bool> {
        let key = self.key_of(node, variable)?;
        Ok(self.var_state(key).is_some_and(|state| state.fresh))
    }

    /// How many times the variable's definition has run.
    pub fn evaluation_count(&self, node: NodeId, variable: &str) -> Result<u64> {
        let key = self.key_of(node, variable)?;
        Ok(self.var_state(key).map(|state| state.evaluations).unwrap_or(0))
    }

    /// Variables that read this one, as of their last evaluation.
    pub fn dependents(&self, node: NodeId, variable: &str) -> Result<Vec<(NodeId, String)>> {
        let key = self.key_of(node, variable)?;
        Ok(self.graph.successors(key).map(|k| self.label(k)).collect())
    }

    /// Variables this one read during its last evaluation.
    pub fn dependencies(&self, node: NodeId, variable: &str) -> Result<Vec<(NodeId, String)>> {
        let key = self.key_of(node, variable)?;
        Ok(self.graph.predecessors(key).map(|k| self.label(k)).collect())
    }

    /// Every stale variable of every node, in node order.
    pub fn stale_variables(&self) -> Vec<(NodeId, String)> {
        let mut out = Vec::new();
        for (id, rec) in self.live_nodes() {
            for (slot, state) in rec.vars.iter().enumerate() {
                if !state.fresh {
                    out.push((id, rec.ty.var_name(VarSlot(slot as u32)).to_string()));
                }
            }
        }
        out
    }

    /// Cycles in the current dependency graph (strongly connected components).
    pub fn static_cycles(&self) -> Vec<Vec<(NodeId, String)>> {
        ravel_graph::alg::find_cycles(&self.graph)
            .into_iter()
            .map(|cycle| cycle.into_iter().map(|k| self.label(k)).collect())
            .collect()
    }

    /// `true` after a non-transient action wrote essential values since the last
    /// [`Engine::mark_saved`].
    pub fn has_unsaved_changes(&self) -> bool {
        self.essential.is_dirty()
    }

    pub fn mark_saved(&mut self) {
        self.essential.mark_saved();
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.items()
    }
}

fn node_list(value: &StateValue) -> Vec<NodeId> {
    value
        .as_list()
        .map(|items| items.iter().filter_map(StateValue::as_node).collect())
        .unwrap_or_default()
}

fn check_component_types(registry: &ComponentRegistry, tree: &NodeTree) -> Result<()> {
    if !registry.contains(&tree.component_type) {
        return Err(Error::UnknownComponentType {
            component_type: tree.component_type.clone(),
        });
    }
    for value in tree.attributes.values() {
        if let AttributeValue::Component(component) = value {
            check_component_types(registry, component)?;
        }
    }
    for child in &tree.children {
        match child {
            TreeChild::Node(node) => check_component_types(registry, node)?,
            TreeChild::Text(_) if !registry.contains("text") => {
                return Err(Error::UnknownComponentType {
                    component_type: "text".to_string(),
                });
            }
            TreeChild::Text(_) => {}
        }
    }
    Ok(())
}
