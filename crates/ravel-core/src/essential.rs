//! Persistent, non-derivable state-variable values.

use crate::{NodeId, StateValue, VarKey};
use rustc_hash::FxHashMap;

/// Arena of essential cells keyed by `(node, slot)`.
///
/// Only two paths write here: construction (attribute initialization / restore) and inverse
/// instructions. While an action is in flight every write is journaled so a failed action can
/// restore the exact prior contents.
#[derive(Debug, Default)]
pub(crate) struct EssentialStore {
    cells: FxHashMap<VarKey, StateValue>,
    journal: Option<Vec<(VarKey, Option<StateValue>)>>,
    dirty: bool,
}

impl EssentialStore {
    pub(crate) fn get(&self, key: VarKey) -> Option<&StateValue> {
        self.cells.get(&key)
    }

    pub(crate) fn set(&mut self, key: VarKey, value: StateValue) {
        let previous = self.cells.insert(key, value);
        if let Some(journal) = &mut self.journal {
            journal.push((key, previous));
        }
    }

    /// Initial values written during construction are not "changes".
    pub(crate) fn initialize(&mut self, key: VarKey, value: StateValue) {
        self.cells.insert(key, value);
    }

    pub(crate) fn remove_node(&mut self, node: NodeId) {
        self.cells.retain(|key, _| key.node != node);
    }

    pub(crate) fn begin(&mut self) {
        debug_assert!(self.journal.is_none(), "nested essential transaction");
        self.journal = Some(Vec::new());
    }

    /// Ends the transaction, keeping every write. Returns the keys written.
    pub(crate) fn commit(&mut self, transient: bool) -> Vec<VarKey> {
        let journal = self.journal.take().unwrap_or_default();
        if !journal.is_empty() && !transient {
            self.dirty = true;
        }
        let mut touched: Vec<VarKey> = journal.into_iter().map(|(key, _)| key).collect();
        touched.sort_unstable();
        touched.dedup();
        touched
    }

    /// Ends the transaction, undoing writes newest-first. Returns the keys that were touched.
    pub(crate) fn rollback(&mut self) -> Vec<VarKey> {
        let journal = self.journal.take().unwrap_or_default();
        let mut touched = Vec::with_capacity(journal.len());
        for (key, previous) in journal.into_iter().rev() {
            match previous {
                Some(value) => {
                    self.cells.insert(key, value);
                }
                None => {
                    self.cells.remove(&key);
                }
            }
            touched.push(key);
        }
        touched
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&VarKey, &StateValue)> {
        self.cells.iter()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_saved(&mut self) {
        self.dirty = false;
    }
}
