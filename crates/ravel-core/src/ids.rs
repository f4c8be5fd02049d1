//! Typed identities used on the hot resolution path.

use serde::{Deserialize, Serialize};

/// Stable identity of a node for the lifetime of an [`Engine`](crate::Engine).
///
/// Ids are allocated monotonically and never reused, so a renderer can hold on to one across
/// updates without it silently pointing at a different node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a state variable within its component type's schema.
///
/// Slots are assigned once, when a [`ComponentType`](crate::ComponentType) is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarSlot(pub u32);

impl VarSlot {
    /// Built-in structural variable: the node's expanded child list.
    pub const CHILDREN: VarSlot = VarSlot(0);
    /// Built-in structural variable: a composite's active replacements.
    pub const REPLACEMENTS: VarSlot = VarSlot(1);
    /// First slot available to declared state variables.
    pub const FIRST_DECLARED: u32 = 2;

    pub fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_DECLARED
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A state variable instance: one variable of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarKey {
    pub node: NodeId,
    pub slot: VarSlot,
}

impl VarKey {
    pub fn new(node: NodeId, slot: VarSlot) -> Self {
        Self { node, slot }
    }
}
