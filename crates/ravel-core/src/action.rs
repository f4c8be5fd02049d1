//! Action messages and the arrival-order action queue.

use crate::{Engine, NodeId, Result, StateValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMetadata {
    /// First request of a user gesture (as opposed to an intermediate drag frame).
    #[serde(default = "default_true")]
    pub initial_change: bool,
    /// May be coalesced with a newer action on the same target.
    #[serde(default)]
    pub skippable: bool,
    /// Does not count as an unsaved change of the document.
    #[serde(default)]
    pub transient: bool,
}

impl Default for ActionMetadata {
    fn default() -> Self {
        Self {
            initial_change: true,
            skippable: false,
            transient: false,
        }
    }
}

/// A desired-value request on one state variable.
///
/// The target node is addressed by id or by author name. `entry` (0-based) addresses a single entry
/// of an array variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    pub variable: String,
    pub desired: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<usize>,
    #[serde(default)]
    pub metadata: ActionMetadata,
}

impl Action {
    pub fn new(node: NodeId, variable: impl Into<String>, desired: impl Into<Value>) -> Self {
        Self {
            node: Some(node),
            node_name: None,
            variable: variable.into(),
            desired: desired.into(),
            entry: None,
            metadata: ActionMetadata::default(),
        }
    }

    pub fn named(
        name: impl Into<String>,
        variable: impl Into<String>,
        desired: impl Into<Value>,
    ) -> Self {
        Self {
            node: None,
            node_name: Some(name.into()),
            variable: variable.into(),
            desired: desired.into(),
            entry: None,
            metadata: ActionMetadata::default(),
        }
    }

    pub fn at_entry(mut self, entry: usize) -> Self {
        self.entry = Some(entry);
        self
    }

    /// Marks the action as an intermediate frame of a gesture.
    pub fn continuing(mut self) -> Self {
        self.metadata.initial_change = false;
        self
    }

    pub fn skippable(mut self) -> Self {
        self.metadata.skippable = true;
        self
    }

    pub fn transient(mut self) -> Self {
        self.metadata.transient = true;
        self
    }

    pub fn desired_value(&self) -> StateValue {
        StateValue::from_json(&self.desired)
    }

    fn same_target(&self, other: &Action) -> bool {
        self.node == other.node
            && self.node_name == other.node_name
            && self.variable == other.variable
            && self.entry == other.entry
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    /// `false` when the edit was rejected; nothing was changed in that case.
    pub success: bool,
    /// Nodes whose essential values were written.
    pub changed: Vec<NodeId>,
}

impl ActionOutcome {
    pub(crate) fn rejected() -> Self {
        Self {
            success: false,
            changed: Vec::new(),
        }
    }
}

/// Pending actions in arrival order.
///
/// A skippable action replaces a skippable action on the same target that is still waiting at the
/// back of the queue, so a burst of drag frames collapses to the newest one. A gesture start is
/// never lost: the surviving action inherits `initial_change` from the ones it replaced.
#[derive(Debug, Clone, Default)]
pub struct ActionQueue {
    pending: VecDeque<Action>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mut action: Action) {
        if action.metadata.skippable {
            if let Some(last) = self.pending.back_mut() {
                if last.metadata.skippable && last.same_target(&action) {
                    action.metadata.initial_change |= last.metadata.initial_change;
                    *last = action;
                    return;
                }
            }
        }
        self.pending.push_back(action);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pop(&mut self) -> Option<Action> {
        self.pending.pop_front()
    }

    /// Applies every pending action in order. Stops at the first API error, leaving the rest
    /// queued.
    pub fn apply_all(&mut self, engine: &mut Engine) -> Result<Vec<ActionOutcome>> {
        let mut outcomes = Vec::with_capacity(self.pending.len());
        while let Some(action) = self.pending.front() {
            outcomes.push(engine.apply_action_sync(action)?);
            self.pending.pop_front();
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn skippable_actions_coalesce_on_the_same_target() {
        let mut queue = ActionQueue::new();
        queue.push(Action::named("p", "coords", json!([1, 1])).skippable());
        queue.push(Action::named("p", "coords", json!([2, 2])).skippable().continuing());
        queue.push(Action::named("q", "coords", json!([0, 0])).skippable());
        queue.push(Action::named("q", "coords", json!([5, 5])));

        assert_eq!(queue.len(), 3);
        let first = queue.pop().unwrap();
        assert_eq!(first.desired, json!([2, 2]));
        assert!(first.metadata.initial_change);
        assert_eq!(queue.pop().unwrap().desired, json!([0, 0]));
        assert_eq!(queue.pop().unwrap().desired, json!([5, 5]));
    }

    #[test]
    fn actions_deserialize_with_default_metadata() {
        let action: Action = serde_json::from_str(
            r#"{ "nodeName": "seg", "variable": "direction", "desired": [3, 4] }"#,
        )
        .unwrap();
        assert_eq!(action.node_name.as_deref(), Some("seg"));
        assert!(action.metadata.initial_change);
        assert!(!action.metadata.transient);
        assert_eq!(action.desired_value(), StateValue::point(&[3.0, 4.0]));
    }
}
