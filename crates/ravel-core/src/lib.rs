#![forbid(unsafe_code)]

//! State-variable dependency graph and resolution engine (headless).
//!
//! A document is a tree of typed nodes. Each node type declares state variables; each variable
//! declares the dependencies it needs and a definition that computes its value from them. The
//! engine keeps every variable of every node in one dependency graph, resolves values lazily and
//! invalidates minimally. Edits run the other way: an inverse definition turns a desired value
//! into requests on its dependencies until essential (persisted) values are reached.
//!
//! Design goals:
//! - deterministic resolution independent of read order
//! - stable node identities across composite re-expansion
//! - recoverable authoring errors surface as diagnostics, never as panics
//! - runtime-agnostic async APIs (no specific executor required)

pub mod action;
pub mod components;
pub mod config;
pub mod definition;
pub mod dependency;
pub mod diagnostics;
pub mod engine;
pub mod error;
mod essential;
pub mod ids;
pub mod registry;
pub mod tree;
pub mod value;

pub use action::{Action, ActionMetadata, ActionOutcome, ActionQueue};
pub use config::RavelConfig;
pub use definition::{
    Defined, Desired, Instruction, InverseRequest, InverseResult, Resolution, StateVarDef, VarKind,
};
pub use dependency::{
    ChildEntry, DeclareContext, DependencySpec, DependencySpecs, DependencyValue,
    DependencyValues, NodeTarget, VarPart, VarRef,
};
pub use diagnostics::{Diagnostic, Severity, SourceSpan};
pub use engine::{Engine, EngineOptions, NodeSnapshot, Snapshot, SnapshotDelta};
pub use error::{Error, Result};
pub use ids::{NodeId, VarKey, VarSlot};
pub use registry::{
    ComponentRegistry, ComponentType, CompositeBehavior, ExpansionContext, ReplacementSource,
    ReplacementSpec,
};
pub use tree::{AttributeValue, NodeTree, TreeChild};
pub use value::StateValue;

#[cfg(test)]
mod tests;
