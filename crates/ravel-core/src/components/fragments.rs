//! Reusable state-variable definitions shared by several component types.

use crate::StateValue;
use crate::definition::{Defined, Desired, Instruction, InverseRequest, InverseResult, StateVarDef};
use crate::dependency::DependencySpec;

/// An essential number with no definition: reads the cell, or `default` if unset.
pub fn essential_number(name: &str, default: f64) -> StateVarDef {
    let cell = name.to_string();
    StateVarDef::scalar(name)
        .essential(default)
        .for_renderer()
        .inverse(move |req| match req.desired.whole() {
            Some(value) => InverseResult::success(vec![Instruction::set_essential(
                cell.clone(),
                value.to_f64(),
            )]),
            None => InverseResult::Failure,
        })
}

pub fn essential_bool(name: &str, default: bool) -> StateVarDef {
    StateVarDef::scalar(name).essential(default).for_renderer()
}

pub fn essential_text(name: &str, default: &str) -> StateVarDef {
    let cell = name.to_string();
    StateVarDef::scalar(name)
        .essential(default)
        .for_renderer()
        .inverse(move |req| match req.desired.whole() {
            Some(value) => InverseResult::success(vec![Instruction::set_essential(
                cell.clone(),
                value.to_text(),
            )]),
            None => InverseResult::Failure,
        })
}

/// A variable that cascades down the tree.
///
/// An explicitly set value (the node's own essential cell) wins. Otherwise the nearest ancestor
/// with `role` supplies the value, unless that ancestor is itself only using its default, in
/// which case this node falls back to `default` and reports `used_default`.
pub fn inherited_or_default(name: &str, role: &str, default: impl Into<StateValue>) -> StateVarDef {
    let default = default.into();
    let cell = name.to_string();
    StateVarDef::scalar(name)
        .essential(default.clone())
        .for_renderer()
        .static_deps(vec![
            ("own", DependencySpec::essential(name)),
            ("inherited", DependencySpec::ancestor(role, &[name])),
        ])
        .define(move |deps| {
            if let Some(value) = deps.essential("own") {
                return Defined::value(value.clone());
            }
            if !deps.is_missing("inherited") && !deps.used_default("inherited") {
                return Defined::value(deps.value("inherited").clone());
            }
            Defined::default_value(default.clone())
        })
        .inverse(move |req| match req.desired.whole() {
            Some(value) => {
                InverseResult::success(vec![Instruction::set_essential(
                    cell.clone(),
                    value.clone(),
                )])
            }
            None => InverseResult::Failure,
        })
}

pub fn hidden() -> StateVarDef {
    inherited_or_default("hidden", "container", false)
}

/// A fixed node rejects edits of its own values.
pub fn fixed() -> StateVarDef {
    inherited_or_default("fixed", "container", false)
}

pub fn visibility() -> Vec<StateVarDef> {
    vec![hidden(), fixed()]
}

/// Passes the desired value through to one dependency unchanged.
pub fn forward(dependency: &str, req: &InverseRequest<'_>) -> InverseResult {
    InverseResult::success(vec![Instruction::SetDependency {
        dependency: dependency.to_string(),
        desired: req.desired.clone(),
        child_index: None,
        variable_index: None,
    }])
}

/// `true` when the variable's `fixed` dependency is set.
pub fn is_fixed(req: &InverseRequest<'_>) -> bool {
    req.deps.boolean("fixed") == Some(true)
}

/// The desired value as a point, folding entry edits into the current value.
pub fn desired_point(req: &InverseRequest<'_>) -> Option<Vec<f64>> {
    match req.desired {
        Desired::Whole(value) => value.as_point(),
        Desired::Entries(_) => req.desired.merged_into(req.current).as_point(),
    }
}
