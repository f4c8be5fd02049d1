use crate::definition::{StateVarDef, VarKind};
use crate::dependency::{DeclareContext, DependencySpecs, DependencyValues, VarPart};
use crate::tree::NodeTree;
use crate::{Error, NodeId, Result, VarSlot};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::sync::{Arc, OnceLock};

/// What a composite behavior sees when it computes replacements.
#[derive(Debug)]
pub struct ExpansionContext<'a> {
    pub node: NodeId,
    pub name: Option<&'a str>,
    /// Unexpanded children of a template composite.
    pub template: &'a [NodeTree],
    pub(crate) lineage: &'a [NodeId],
    pub(crate) warnings: RefCell<Vec<String>>,
}

impl ExpansionContext<'_> {
    /// `true` for the composite itself and every node above it.
    pub fn is_self_or_ancestor(&self, node: NodeId) -> bool {
        self.lineage.contains(&node)
    }

    /// Reports a recoverable problem with the expansion. Unlike an `Err` from
    /// [`CompositeBehavior::replacements`], the returned replacements are still used.
    pub fn warn(&self, message: impl Into<String>) {
        self.warnings.borrow_mut().push(message.into());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplacementSource {
    /// Instantiate a fresh subtree.
    Template(NodeTree),
    /// Create a node that mirrors an existing node's state.
    Shadow(NodeId),
}

/// One candidate replacement. Keys identify "the same" replacement across re-expansions.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplacementSpec {
    pub key: String,
    pub source: ReplacementSource,
}

impl ReplacementSpec {
    pub fn template(key: impl Into<String>, tree: NodeTree) -> Self {
        Self {
            key: key.into(),
            source: ReplacementSource::Template(tree),
        }
    }

    pub fn shadow(node: NodeId) -> Self {
        Self {
            key: node.0.to_string(),
            source: ReplacementSource::Shadow(node),
        }
    }
}

/// Computes a composite's children from its resolved dependencies.
pub trait CompositeBehavior: Send + Sync {
    fn dependencies(&self, ctx: &DeclareContext<'_>) -> DependencySpecs;

    /// Candidate replacements in display order. An `Err` is reported as a warning and the
    /// composite yields no replacements.
    fn replacements(
        &self,
        deps: &DependencyValues,
        ctx: &ExpansionContext<'_>,
    ) -> std::result::Result<Vec<ReplacementSpec>, String>;
}

/// A component type: a schema of state variables assembled from fragments, plus an optional
/// composite behavior.
#[derive(Clone)]
pub struct ComponentType {
    name: String,
    roles: Vec<String>,
    vars: Vec<StateVarDef>,
    slots: FxHashMap<String, VarSlot>,
    composite: Option<Arc<dyn CompositeBehavior>>,
    children_are_template: bool,
}

impl std::fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("roles", &self.roles)
            .field("vars", &self.vars.iter().map(|v| &v.name).collect::<Vec<_>>())
            .field("composite", &self.composite.is_some())
            .finish()
    }
}

impl ComponentType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
            vars: Vec::new(),
            slots: FxHashMap::default(),
            composite: None,
            children_are_template: false,
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn var(mut self, def: StateVarDef) -> Self {
        self.vars.push(def);
        self
    }

    /// Appends a fragment of reusable variable definitions.
    pub fn with(mut self, fragment: impl IntoIterator<Item = StateVarDef>) -> Self {
        self.vars.extend(fragment);
        self
    }

    pub fn composite(mut self, behavior: impl CompositeBehavior + 'static) -> Self {
        self.composite = Some(Arc::new(behavior));
        self
    }

    /// Static children are kept as an unexpanded template instead of being instantiated.
    pub fn children_are_template(mut self) -> Self {
        self.children_are_template = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn matches_group(&self, group: &str) -> bool {
        self.name == group || self.roles.iter().any(|r| r == group)
    }

    pub fn is_composite(&self) -> bool {
        self.composite.is_some()
    }

    pub fn has_template(&self) -> bool {
        self.children_are_template
    }

    pub(crate) fn behavior(&self) -> Option<&Arc<dyn CompositeBehavior>> {
        self.composite.as_ref()
    }

    pub fn slot(&self, name: &str) -> Option<VarSlot> {
        match name {
            "children" => Some(VarSlot::CHILDREN),
            "replacements" => Some(VarSlot::REPLACEMENTS),
            _ => self.slots.get(name).copied(),
        }
    }

    pub fn slot_count(&self) -> usize {
        VarSlot::FIRST_DECLARED as usize + self.vars.len()
    }

    pub fn def(&self, slot: VarSlot) -> Option<&StateVarDef> {
        if slot.is_builtin() {
            return None;
        }
        self.vars.get(slot.index() - VarSlot::FIRST_DECLARED as usize)
    }

    pub fn var_name(&self, slot: VarSlot) -> &str {
        match slot {
            VarSlot::CHILDREN => "children",
            VarSlot::REPLACEMENTS => "replacements",
            _ => self.def(slot).map(|d| d.name.as_str()).unwrap_or("?"),
        }
    }

    /// Declared (non-structural) variables with their slots.
    pub fn declared(&self) -> impl Iterator<Item = (VarSlot, &StateVarDef)> {
        self.vars
            .iter()
            .enumerate()
            .map(|(i, def)| (VarSlot(VarSlot::FIRST_DECLARED + i as u32), def))
    }

    fn finalize(&mut self) -> Result<()> {
        self.slots.clear();
        for (i, def) in self.vars.iter().enumerate() {
            let duplicate = matches!(def.name.as_str(), "children" | "replacements")
                || self
                    .slots
                    .insert(
                        def.name.clone(),
                        VarSlot(VarSlot::FIRST_DECLARED + i as u32),
                    )
                    .is_some();
            if duplicate {
                return Err(Error::DuplicateStateVariable {
                    component_type: self.name.clone(),
                    variable: def.name.clone(),
                });
            }
        }
        for def in &self.vars {
            let target = match &def.kind {
                VarKind::Alias(target) => Some(target.name.as_str()),
                VarKind::Companion { primary } => Some(primary.as_str()),
                VarKind::Scalar | VarKind::Array => None,
            };
            if let Some(target) = target {
                if self.slot(target).is_none() {
                    return Err(Error::UnknownStateVariable {
                        component_type: self.name.clone(),
                        variable: target.to_string(),
                    });
                }
            }
            if let VarKind::Alias(target) = &def.kind {
                let target_is_array = self
                    .slot(&target.name)
                    .and_then(|slot| self.def(slot))
                    .is_some_and(StateVarDef::is_array);
                if target.part != VarPart::Whole && !target_is_array {
                    return Err(Error::UnknownStateVariable {
                        component_type: self.name.clone(),
                        variable: target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Component types keyed by type tag.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    types: FxHashMap<String, Arc<ComponentType>>,
    groups: FxHashSet<String>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mut component_type: ComponentType) -> Result<()> {
        if self.types.contains_key(component_type.name()) {
            return Err(Error::DuplicateComponentType {
                component_type: component_type.name,
            });
        }
        component_type.finalize()?;
        self.groups.insert(component_type.name.clone());
        self.groups.extend(component_type.roles.iter().cloned());
        self.types
            .insert(component_type.name.clone(), Arc::new(component_type));
        Ok(())
    }

    pub fn get(&self, component_type: &str) -> Option<&Arc<ComponentType>> {
        self.types.get(component_type)
    }

    pub fn contains(&self, component_type: &str) -> bool {
        self.types.contains_key(component_type)
    }

    /// `true` if some registered type is named `group` or carries it as a role.
    pub fn knows_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The standard component library.
    pub fn standard() -> Self {
        let mut reg = Self::new();
        for component_type in crate::components::standard_types() {
            reg.register(component_type)
                .expect("standard component types are well-formed");
        }
        reg
    }

    /// A process-wide shared copy of [`ComponentRegistry::standard`].
    pub fn standard_shared() -> Arc<Self> {
        static STANDARD: OnceLock<Arc<ComponentRegistry>> = OnceLock::new();
        STANDARD
            .get_or_init(|| Arc::new(ComponentRegistry::standard()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_assigned_after_builtins() {
        let mut reg = ComponentRegistry::new();
        reg.register(
            ComponentType::new("pair")
                .role("container")
                .var(StateVarDef::scalar("a").essential(1.0))
                .var(StateVarDef::alias("b", "a")),
        )
        .unwrap();
        let ty = reg.get("pair").unwrap();
        assert_eq!(ty.slot("children"), Some(VarSlot::CHILDREN));
        assert_eq!(ty.slot("a"), Some(VarSlot(2)));
        assert_eq!(ty.var_name(VarSlot(3)), "b");
        assert!(reg.knows_group("container"));
    }

    #[test]
    fn duplicate_variables_and_dangling_aliases_are_rejected() {
        let mut reg = ComponentRegistry::new();
        let err = reg
            .register(
                ComponentType::new("bad")
                    .var(StateVarDef::scalar("a"))
                    .var(StateVarDef::scalar("a")),
            )
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateStateVariable { .. }));

        let err = reg
            .register(ComponentType::new("dangling").var(StateVarDef::alias("b", "missing")))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownStateVariable { .. }));

        let err = reg
            .register(ComponentType::new("reserved").var(StateVarDef::scalar("children")))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateStateVariable { .. }));
    }

    #[test]
    fn standard_registry_has_the_library() {
        let reg = ComponentRegistry::standard_shared();
        for name in ["document", "point", "directedSegment", "repeat", "collect"] {
            assert!(reg.contains(name), "{name}");
        }
    }
}
