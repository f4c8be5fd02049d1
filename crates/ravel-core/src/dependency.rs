//! Dependency declarations and the values they resolve to.

use crate::{NodeId, StateValue};
use indexmap::IndexMap;

/// Which part of a state variable a reference reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarPart {
    Whole,
    /// One entry of an array variable (0-based).
    Entry(usize),
    /// The `size` sub-variable of an array variable.
    Size,
}

/// A reference to a state variable by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub name: String,
    pub part: VarPart,
}

impl VarRef {
    pub fn whole(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            part: VarPart::Whole,
        }
    }

    pub fn entry(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            part: VarPart::Entry(index),
        }
    }

    pub fn size(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            part: VarPart::Size,
        }
    }

    /// Parses `name`, `name[3]` (1-based, as authors write it) or `name.size`.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if let Some(base) = text.strip_suffix(".size") {
            return Self::size(base);
        }
        if let Some(open) = text.find('[') {
            if let Some(inner) = text[open + 1..].strip_suffix(']') {
                if let Ok(index) = inner.trim().parse::<usize>() {
                    if index >= 1 {
                        return Self::entry(&text[..open], index - 1);
                    }
                }
            }
        }
        Self::whole(text)
    }
}

impl From<&str> for VarRef {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl std::fmt::Display for VarRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.part {
            VarPart::Whole => write!(f, "{}", self.name),
            VarPart::Entry(i) => write!(f, "{}[{}]", self.name, i + 1),
            VarPart::Size => write!(f, "{}.size", self.name),
        }
    }
}

/// How a dependency addresses a node other than the dependent's own relatives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeTarget {
    Id(NodeId),
    /// Author-assigned name. Nodes instantiated from a named composite's template are addressed
    /// as `composite[index]/name`.
    Name(String),
}

/// A declared reference from a state variable to something it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum DependencySpec {
    SelfVariable(VarRef),
    ParentVariable(VarRef),
    /// The nearest ancestor whose component type or roles include `role`.
    AncestorVariable {
        role: String,
        names: Vec<String>,
    },
    /// Children (composites expanded in place) whose component type or roles are in `groups`.
    ChildGroup {
        /// Whose children; `None` means the dependent's own node.
        of: Option<NodeTarget>,
        groups: Vec<String>,
        variable_names: Vec<String>,
        variables_optional: bool,
        /// Search every descendant in document order instead of direct children only.
        recursive: bool,
    },
    /// The raw essential cell of a variable of the dependent's node (`None` when unset).
    Essential {
        variable: String,
    },
    /// A variable of the composite that generated this node (or its nearest generated ancestor).
    /// With `per_instance`, the entry of that array variable at the instance's index.
    SourceCompositeVariable {
        name: String,
        per_instance: bool,
    },
    NodeVariable {
        target: NodeTarget,
        variable: VarRef,
    },
    /// A variable of the component held in one of the node's attributes.
    AttributeComponent {
        attribute: String,
        variable: VarRef,
    },
    /// A literal attribute value. Static: creates no graph edge.
    Attribute {
        name: String,
    },
    /// The dependent's own node id.
    Identity,
    /// The id of another node; `Missing` when it does not exist.
    NodeReference(NodeTarget),
}

impl DependencySpec {
    pub fn own(variable: impl Into<VarRef>) -> Self {
        Self::SelfVariable(variable.into())
    }

    pub fn parent(variable: impl Into<VarRef>) -> Self {
        Self::ParentVariable(variable.into())
    }

    pub fn ancestor(role: impl Into<String>, names: &[&str]) -> Self {
        Self::AncestorVariable {
            role: role.into(),
            names: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn children(groups: &[&str], variable_names: &[&str]) -> Self {
        Self::ChildGroup {
            of: None,
            groups: groups.iter().map(|s| s.to_string()).collect(),
            variable_names: variable_names.iter().map(|s| s.to_string()).collect(),
            variables_optional: false,
            recursive: false,
        }
    }

    pub fn essential(variable: impl Into<String>) -> Self {
        Self::Essential {
            variable: variable.into(),
        }
    }

    pub fn source_composite(name: impl Into<String>) -> Self {
        Self::SourceCompositeVariable {
            name: name.into(),
            per_instance: false,
        }
    }

    pub fn instance_item(name: impl Into<String>) -> Self {
        Self::SourceCompositeVariable {
            name: name.into(),
            per_instance: true,
        }
    }

    pub fn node(target: NodeTarget, variable: impl Into<VarRef>) -> Self {
        Self::NodeVariable {
            target,
            variable: variable.into(),
        }
    }

    pub fn named(name: impl Into<String>, variable: impl Into<VarRef>) -> Self {
        Self::node(NodeTarget::Name(name.into()), variable)
    }

    pub fn attribute_component(attribute: impl Into<String>, variable: impl Into<VarRef>) -> Self {
        Self::AttributeComponent {
            attribute: attribute.into(),
            variable: variable.into(),
        }
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute { name: name.into() }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::NodeReference(NodeTarget::Name(name.into()))
    }

    /// For `ChildGroup`: read children of another node.
    pub fn of(mut self, target: NodeTarget) -> Self {
        if let Self::ChildGroup { of, .. } = &mut self {
            *of = Some(target);
        }
        self
    }

    /// For `ChildGroup`: tolerate matching children that lack some of the variables.
    pub fn optional(mut self) -> Self {
        if let Self::ChildGroup {
            variables_optional, ..
        } = &mut self
        {
            *variables_optional = true;
        }
        self
    }

    /// For `ChildGroup`: match descendants at any depth.
    pub fn recursive(mut self) -> Self {
        if let Self::ChildGroup { recursive, .. } = &mut self {
            *recursive = true;
        }
        self
    }
}

/// Declared dependencies, in declaration order.
pub type DependencySpecs = Vec<(String, DependencySpec)>;

/// One matched child of a `ChildGroup` dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildEntry {
    pub node: NodeId,
    pub component_type: String,
    /// Aligned with the dependency's `variable_names`; `None` where the child lacks the variable
    /// and the dependency tolerates that.
    pub values: Vec<Option<StateValue>>,
    pub used_default: Vec<bool>,
}

impl ChildEntry {
    pub fn value(&self, index: usize) -> &StateValue {
        self.values
            .get(index)
            .and_then(Option::as_ref)
            .unwrap_or(&INVALID)
    }
}

/// The resolved value of one dependency.
#[derive(Debug, Clone, PartialEq)]
pub enum DependencyValue {
    Value {
        value: StateValue,
        used_default: bool,
    },
    Ancestor {
        node: NodeId,
        values: Vec<StateValue>,
        used_default: Vec<bool>,
    },
    Children(Vec<ChildEntry>),
    Essential(Option<StateValue>),
    /// The dependency could not be resolved (declaration error or absent optional target).
    Missing,
}

static INVALID: StateValue = StateValue::Invalid;

/// Resolved dependency values handed to definitions and inverse definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyValues {
    entries: IndexMap<String, DependencyValue>,
}

impl DependencyValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: DependencyValue) {
        self.entries.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&DependencyValue> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` when the dependency is absent, missing, or holds an unset essential cell.
    pub fn is_missing(&self, name: &str) -> bool {
        matches!(
            self.entries.get(name),
            None | Some(DependencyValue::Missing) | Some(DependencyValue::Essential(None))
        )
    }

    /// The single value of a variable, ancestor (first name) or essential dependency.
    /// Anything else reads as [`StateValue::Invalid`].
    pub fn value(&self, name: &str) -> &StateValue {
        match self.entries.get(name) {
            Some(DependencyValue::Value { value, .. }) => value,
            Some(DependencyValue::Essential(Some(value))) => value,
            Some(DependencyValue::Ancestor { values, .. }) => values.first().unwrap_or(&INVALID),
            _ => &INVALID,
        }
    }

    pub fn ancestor_value(&self, name: &str, index: usize) -> Option<&StateValue> {
        match self.entries.get(name) {
            Some(DependencyValue::Ancestor { values, .. }) => values.get(index),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> f64 {
        self.value(name).to_f64()
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.value(name).as_bool()
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.value(name).as_str()
    }

    pub fn point(&self, name: &str) -> Option<Vec<f64>> {
        self.value(name).as_point()
    }

    pub fn essential(&self, name: &str) -> Option<&StateValue> {
        match self.entries.get(name) {
            Some(DependencyValue::Essential(value)) => value.as_ref(),
            _ => None,
        }
    }

    pub fn children(&self, name: &str) -> &[ChildEntry] {
        match self.entries.get(name) {
            Some(DependencyValue::Children(children)) => children,
            _ => &[],
        }
    }

    pub fn used_default(&self, name: &str) -> bool {
        match self.entries.get(name) {
            Some(DependencyValue::Value { used_default, .. }) => *used_default,
            Some(DependencyValue::Ancestor { used_default, .. }) => {
                used_default.first().copied().unwrap_or(true)
            }
            Some(DependencyValue::Essential(value)) => value.is_none(),
            Some(DependencyValue::Children(children)) => children
                .iter()
                .all(|child| child.used_default.iter().all(|&d| d)),
            Some(DependencyValue::Missing) | None => true,
        }
    }
}

/// What a dependency declaration can see.
#[derive(Debug)]
pub struct DeclareContext<'a> {
    pub node: NodeId,
    pub component_type: &'a str,
    /// Values of dependencies declared in earlier rounds (empty in round one).
    pub resolved: &'a DependencyValues,
    pub round: usize,
    pub(crate) attributes: &'a IndexMap<String, StateValue>,
    pub(crate) attribute_components: &'a IndexMap<String, NodeId>,
}

impl DeclareContext<'_> {
    pub fn attribute(&self, name: &str) -> Option<&StateValue> {
        self.attributes.get(name)
    }

    pub fn has_attribute_component(&self, name: &str) -> bool {
        self.attribute_components.contains_key(name)
    }
}
