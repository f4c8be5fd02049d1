//! Normalized node trees consumed at construction.
//!
//! The document parser is an external collaborator; this is the shape it hands over.

use crate::SourceSpan;
use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTree {
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, AttributeValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeChild>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<SourceSpan>,
}

/// An attribute is either a literal or a component of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Component(Box<NodeTree>),
    Literal(Value),
}

/// A child is either a node or bare text, which becomes a `text` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeChild {
    Node(NodeTree),
    Text(String),
}

impl TreeChild {
    pub fn into_node(self) -> NodeTree {
        match self {
            TreeChild::Node(node) => node,
            TreeChild::Text(text) => NodeTree::new("text").attribute("value", Value::String(text)),
        }
    }
}

impl NodeTree {
    pub fn new(component_type: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            name: None,
            attributes: IndexMap::new(),
            children: Vec::new(),
            position: None,
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let tree: NodeTree = serde_json::from_str(text)?;
        tree.validate()?;
        Ok(tree)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes
            .insert(name.into(), AttributeValue::Literal(value.into()));
        self
    }

    pub fn attribute_component(mut self, name: impl Into<String>, component: NodeTree) -> Self {
        self.attributes
            .insert(name.into(), AttributeValue::Component(Box::new(component)));
        self
    }

    pub fn child(mut self, child: NodeTree) -> Self {
        self.children.push(TreeChild::Node(child));
        self
    }

    pub fn text_child(mut self, text: impl Into<String>) -> Self {
        self.children.push(TreeChild::Text(text.into()));
        self
    }

    pub fn at(mut self, position: SourceSpan) -> Self {
        self.position = Some(position);
        self
    }

    /// Structural checks that do not need a component registry.
    pub fn validate(&self) -> Result<()> {
        if self.component_type.trim().is_empty() {
            return Err(Error::InvalidTree {
                message: "node with an empty component type".to_string(),
            });
        }
        if let Some(name) = &self.name {
            if name.is_empty() || name.contains(['/', '[', ']']) {
                return Err(Error::InvalidTree {
                    message: format!("invalid node name {name:?}"),
                });
            }
        }
        for value in self.attributes.values() {
            if let AttributeValue::Component(component) = value {
                component.validate()?;
            }
        }
        for child in &self.children {
            if let TreeChild::Node(node) = child {
                node.validate()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attributes_distinguish_components_from_literals() {
        let tree = NodeTree::from_json_str(
            r#"{
                "type": "directedSegment",
                "attributes": {
                    "through": { "type": "point", "attributes": { "x": 1 } },
                    "label": { "text": "no type key" },
                    "hidden": false
                },
                "children": ["hello", { "type": "number" }]
            }"#,
        )
        .unwrap();

        assert!(matches!(
            tree.attributes["through"],
            AttributeValue::Component(_)
        ));
        assert_eq!(
            tree.attributes["label"],
            AttributeValue::Literal(json!({ "text": "no type key" }))
        );
        assert_eq!(tree.attributes["hidden"], AttributeValue::Literal(json!(false)));
        let text = tree.children[0].clone().into_node();
        assert_eq!(text.component_type, "text");
    }

    #[test]
    fn names_with_path_separators_are_rejected() {
        let err = NodeTree::new("point").named("a/b").validate().unwrap_err();
        assert!(err.to_string().contains("invalid node name"));
    }
}
