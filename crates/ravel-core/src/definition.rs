//! State-variable definitions: forward definitions, array definitions and inverse definitions.

use crate::StateValue;
use crate::dependency::{DeclareContext, DependencySpec, DependencySpecs, DependencyValues, VarRef};
use std::sync::Arc;

pub type DeclareFn = Arc<dyn Fn(&DeclareContext<'_>) -> DependencySpecs + Send + Sync>;
pub type DefineFn = Arc<dyn Fn(&DependencyValues) -> Defined + Send + Sync>;
pub type ArraySizeFn = Arc<dyn Fn(&DependencyValues) -> usize + Send + Sync>;
pub type ArrayEntriesFn =
    Arc<dyn Fn(&DependencyValues, &[usize]) -> Vec<(usize, StateValue)> + Send + Sync>;
pub type InverseFn = Arc<dyn Fn(&InverseRequest<'_>) -> InverseResult + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum VarKind {
    Scalar,
    /// Variable-length array with a `size` sub-variable and lazily computed entries.
    Array,
    /// Reads (and edits) another variable of the same node.
    Alias(VarRef),
    /// Filled in as an additional output of `primary`'s definition.
    Companion { primary: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Value(StateValue),
    /// Defer to the essential cell, falling back to the variable's default.
    UseEssentialOrDefault,
}

/// Result of a forward definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Defined {
    pub resolution: Resolution,
    pub used_default: bool,
    /// Values for companion variables, by name.
    pub additional: Vec<(String, StateValue)>,
}

impl Defined {
    pub fn value(value: impl Into<StateValue>) -> Self {
        Self {
            resolution: Resolution::Value(value.into()),
            used_default: false,
            additional: Vec::new(),
        }
    }

    /// A value that came from a default somewhere upstream.
    pub fn default_value(value: impl Into<StateValue>) -> Self {
        Self {
            used_default: true,
            ..Self::value(value)
        }
    }

    pub fn essential_or_default() -> Self {
        Self {
            resolution: Resolution::UseEssentialOrDefault,
            used_default: false,
            additional: Vec::new(),
        }
    }

    pub fn with_used_default(mut self, used_default: bool) -> Self {
        self.used_default = used_default;
        self
    }

    pub fn with_additional(
        mut self,
        name: impl Into<String>,
        value: impl Into<StateValue>,
    ) -> Self {
        self.additional.push((name.into(), value.into()));
        self
    }
}

/// A requested new value: for a whole variable, or for some entries of an array variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Desired {
    Whole(StateValue),
    Entries(Vec<(usize, StateValue)>),
}

impl Desired {
    pub fn whole(&self) -> Option<&StateValue> {
        match self {
            Desired::Whole(value) => Some(value),
            Desired::Entries(_) => None,
        }
    }

    /// Folds entry edits into `current` (a list); a whole value replaces it.
    pub fn merged_into(&self, current: &StateValue) -> StateValue {
        match self {
            Desired::Whole(value) => value.clone(),
            Desired::Entries(entries) => {
                let mut items = current.as_list().map(<[_]>::to_vec).unwrap_or_default();
                for (index, value) in entries {
                    if *index >= items.len() {
                        items.resize(index + 1, StateValue::nan());
                    }
                    items[*index] = value.clone();
                }
                StateValue::List(items)
            }
        }
    }
}

impl From<StateValue> for Desired {
    fn from(value: StateValue) -> Self {
        Desired::Whole(value)
    }
}

/// Input to an inverse definition.
#[derive(Debug)]
pub struct InverseRequest<'a> {
    pub desired: &'a Desired,
    pub deps: &'a DependencyValues,
    pub current: &'a StateValue,
    pub used_default: bool,
    /// `true` for the first request of a user gesture, `false` for the intermediate frames.
    pub initial_change: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    SetEssentialValue {
        variable: String,
        value: StateValue,
    },
    /// Recursively request a desired value on one of the declared dependencies.
    SetDependency {
        dependency: String,
        desired: Desired,
        /// For child-group dependencies: which matched child.
        child_index: Option<usize>,
        /// For child-group and ancestor dependencies: which of the requested variables.
        variable_index: Option<usize>,
    },
}

impl Instruction {
    pub fn set_essential(variable: impl Into<String>, value: impl Into<StateValue>) -> Self {
        Self::SetEssentialValue {
            variable: variable.into(),
            value: value.into(),
        }
    }

    pub fn set_dependency(dependency: impl Into<String>, desired: impl Into<StateValue>) -> Self {
        Self::SetDependency {
            dependency: dependency.into(),
            desired: Desired::Whole(desired.into()),
            child_index: None,
            variable_index: None,
        }
    }

    pub fn set_dependency_entries(
        dependency: impl Into<String>,
        entries: Vec<(usize, StateValue)>,
    ) -> Self {
        Self::SetDependency {
            dependency: dependency.into(),
            desired: Desired::Entries(entries),
            child_index: None,
            variable_index: None,
        }
    }

    pub fn set_child(
        dependency: impl Into<String>,
        child_index: usize,
        variable_index: usize,
        desired: impl Into<StateValue>,
    ) -> Self {
        Self::SetDependency {
            dependency: dependency.into(),
            desired: Desired::Whole(desired.into()),
            child_index: Some(child_index),
            variable_index: Some(variable_index),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InverseResult {
    Failure,
    Success(Vec<Instruction>),
}

impl InverseResult {
    pub fn success(instructions: Vec<Instruction>) -> Self {
        Self::Success(instructions)
    }
}

/// Declaration of one state variable of a component type.
#[derive(Clone)]
pub struct StateVarDef {
    pub name: String,
    pub kind: VarKind,
    pub for_renderer: bool,
    /// Backed by an essential cell; a literal attribute with the same name initializes it.
    pub essential: bool,
    pub default_value: StateValue,
    pub dependencies: Option<DeclareFn>,
    pub definition: Option<DefineFn>,
    pub inverse: Option<InverseFn>,
    pub array_size: Option<ArraySizeFn>,
    pub array_entries: Option<ArrayEntriesFn>,
}

impl std::fmt::Debug for StateVarDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateVarDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("for_renderer", &self.for_renderer)
            .field("essential", &self.essential)
            .field("default_value", &self.default_value)
            .field("has_inverse", &self.inverse.is_some())
            .finish_non_exhaustive()
    }
}

impl StateVarDef {
    fn with_kind(name: impl Into<String>, kind: VarKind) -> Self {
        Self {
            name: name.into(),
            kind,
            for_renderer: false,
            essential: false,
            default_value: StateValue::Null,
            dependencies: None,
            definition: None,
            inverse: None,
            array_size: None,
            array_entries: None,
        }
    }

    pub fn scalar(name: impl Into<String>) -> Self {
        Self::with_kind(name, VarKind::Scalar)
    }

    pub fn array(name: impl Into<String>) -> Self {
        Self {
            default_value: StateValue::nan(),
            ..Self::with_kind(name, VarKind::Array)
        }
    }

    pub fn alias(name: impl Into<String>, target: impl Into<VarRef>) -> Self {
        Self::with_kind(name, VarKind::Alias(target.into()))
    }

    pub fn companion(name: impl Into<String>, primary: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            VarKind::Companion {
                primary: primary.into(),
            },
        )
    }

    pub fn for_renderer(mut self) -> Self {
        self.for_renderer = true;
        self
    }

    /// Marks the variable essential with the given default. Without an explicit definition the
    /// variable defers to its essential cell.
    pub fn essential(mut self, default_value: impl Into<StateValue>) -> Self {
        self.essential = true;
        self.default_value = default_value.into();
        self
    }

    pub fn default_value(mut self, value: impl Into<StateValue>) -> Self {
        self.default_value = value.into();
        self
    }

    pub fn deps<F>(mut self, declare: F) -> Self
    where
        F: Fn(&DeclareContext<'_>) -> DependencySpecs + Send + Sync + 'static,
    {
        self.dependencies = Some(Arc::new(declare));
        self
    }

    /// Dependencies that do not depend on anything resolved.
    pub fn static_deps(self, specs: Vec<(&str, DependencySpec)>) -> Self {
        let specs: DependencySpecs = specs
            .into_iter()
            .map(|(name, spec)| (name.to_string(), spec))
            .collect();
        self.deps(move |_| specs.clone())
    }

    pub fn define<F>(mut self, define: F) -> Self
    where
        F: Fn(&DependencyValues) -> Defined + Send + Sync + 'static,
    {
        self.definition = Some(Arc::new(define));
        self
    }

    pub fn inverse<F>(mut self, inverse: F) -> Self
    where
        F: Fn(&InverseRequest<'_>) -> InverseResult + Send + Sync + 'static,
    {
        self.inverse = Some(Arc::new(inverse));
        self
    }

    pub fn size<F>(mut self, size: F) -> Self
    where
        F: Fn(&DependencyValues) -> usize + Send + Sync + 'static,
    {
        self.array_size = Some(Arc::new(size));
        self
    }

    pub fn entries<F>(mut self, entries: F) -> Self
    where
        F: Fn(&DependencyValues, &[usize]) -> Vec<(usize, StateValue)> + Send + Sync + 'static,
    {
        self.array_entries = Some(Arc::new(entries));
        self
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, VarKind::Array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_edits_merge_into_lists() {
        let current = StateValue::point(&[1.0, 2.0]);
        let desired = Desired::Entries(vec![(1, 5.0.into()), (3, 7.0.into())]);
        let merged = desired.merged_into(&current);
        let items = merged.as_point().unwrap();
        assert_eq!(items[..2], [1.0, 5.0]);
        assert!(items[2].is_nan());
        assert_eq!(items[3], 7.0);
    }

    #[test]
    fn essential_builder_sets_default() {
        let def = StateVarDef::scalar("x").essential(0.0).for_renderer();
        assert!(def.essential && def.for_renderer);
        assert_eq!(def.default_value, StateValue::Number(0.0));
        assert!(def.definition.is_none());
    }
}
