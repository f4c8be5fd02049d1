//! Renderer-facing snapshots and essential-value persistence.

use super::Engine;
use crate::{Error, NodeId, Result, StateValue, VarKey};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The renderer-visible state of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub component_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub state_values: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub used_default: IndexMap<String, bool>,
}

/// Visible nodes in document order.
pub type Snapshot = IndexMap<NodeId, NodeSnapshot>;

/// Difference between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDelta {
    /// Nodes that are new or whose snapshot changed.
    pub changed: Snapshot,
    /// Nodes that were visible before and are not any more.
    pub removed: Vec<NodeId>,
}

impl SnapshotDelta {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

impl Engine {
    /// Resolves and returns every `for_renderer` variable of every visible node.
    pub fn snapshot(&mut self) -> Snapshot {
        self.snapshot_with(&[])
    }

    /// Like [`Engine::snapshot`], additionally including the named variables on every node type
    /// that has them.
    pub fn snapshot_with(&mut self, extra: &[&str]) -> Snapshot {
        let include_used_default = self.config.include_used_default();
        let mut out = Snapshot::new();
        for id in self.visible_nodes() {
            let Some(ty) = self.record(id).map(|rec| rec.ty.clone()) else {
                continue;
            };
            let mut state_values = IndexMap::new();
            let mut used_default = IndexMap::new();
            for (slot, def) in ty.declared() {
                if !def.for_renderer && !extra.contains(&def.name.as_str()) {
                    continue;
                }
                let (value, used) = self.whole_value(VarKey::new(id, slot));
                state_values.insert(def.name.clone(), value.to_json());
                if include_used_default {
                    used_default.insert(def.name.clone(), used);
                }
            }
            out.insert(
                id,
                NodeSnapshot {
                    component_type: ty.name().to_string(),
                    name: self.record(id).and_then(|rec| rec.name.clone()),
                    state_values,
                    used_default,
                },
            );
        }
        out
    }

    /// Snapshot entries that changed since the previous call; the first call reports everything.
    pub fn take_snapshot_delta(&mut self) -> SnapshotDelta {
        let current = self.snapshot();
        let previous = self.last_emitted.take().unwrap_or_default();
        let changed: Snapshot = current
            .iter()
            .filter(|(id, node)| previous.get(*id) != Some(*node))
            .map(|(id, node)| (*id, node.clone()))
            .collect();
        let removed = previous
            .keys()
            .filter(|id| !current.contains_key(*id))
            .copied()
            .collect();
        self.last_emitted = Some(current);
        SnapshotDelta { changed, removed }
    }

    /// Exports every essential cell as `{ node: { variable: value } }`. Nodes are keyed by their
    /// registered name when they have one and by `#id` otherwise.
    pub fn essential_values(&self) -> Value {
        let mut cells: Vec<(&VarKey, &StateValue)> = self.essential.iter().collect();
        cells.sort_unstable_by_key(|(key, _)| **key);
        let mut out = Map::new();
        for (key, value) in cells {
            let Some(rec) = self.record(key.node) else {
                continue;
            };
            let node_key = rec
                .full_name()
                .filter(|name| self.names.get(name) == Some(&key.node))
                .unwrap_or_else(|| key.node.to_string());
            let entry = out
                .entry(node_key)
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(vars) = entry {
                vars.insert(rec.ty.var_name(key.slot).to_string(), value.to_json());
            }
        }
        Value::Object(out)
    }

    /// Re-applies values exported by [`Engine::essential_values`]. The whole document is checked
    /// before anything is written; restored values are not unsaved changes.
    pub fn restore_essential_values(&mut self, values: &Value) -> Result<()> {
        let Value::Object(nodes) = values else {
            return Err(invalid("expected an object keyed by node"));
        };
        let mut writes = Vec::new();
        for (node_key, vars) in nodes {
            let node = self
                .restore_target(node_key)
                .ok_or_else(|| invalid(format!("unknown node {node_key:?}")))?;
            let Value::Object(vars) = vars else {
                return Err(invalid(format!("values of {node_key:?} must be an object")));
            };
            for (variable, value) in vars {
                let slot = self
                    .record(node)
                    .and_then(|rec| {
                        rec.ty
                            .slot(variable)
                            .filter(|slot| rec.ty.def(*slot).is_some_and(|def| def.essential))
                    })
                    .ok_or_else(|| {
                        invalid(format!("{node_key:?} has no essential variable {variable:?}"))
                    })?;
                writes.push((VarKey::new(node, slot), StateValue::from_json(value)));
            }
        }
        let keys: Vec<VarKey> = writes.iter().map(|(key, _)| *key).collect();
        for (key, value) in writes {
            self.essential.initialize(key, value);
        }
        self.invalidate(&keys);
        tracing::debug!(cells = keys.len(), "restored essential values");
        Ok(())
    }

    fn restore_target(&self, node_key: &str) -> Option<NodeId> {
        if let Some(id) = self.node_id(node_key) {
            return Some(id);
        }
        let id = node_key.strip_prefix('#')?.parse::<u32>().ok()?;
        self.contains(NodeId(id)).then_some(NodeId(id))
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidEssentialValues {
        message: message.into(),
    }
}
