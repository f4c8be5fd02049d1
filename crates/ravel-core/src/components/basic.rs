use super::fragments;
use crate::StateValue;
use crate::definition::{Defined, Instruction, InverseResult, StateVarDef};
use crate::dependency::{DependencySpec, VarRef};
use crate::registry::ComponentType;

pub(super) fn document() -> ComponentType {
    ComponentType::new("document")
        .role("container")
        .with(fragments::visibility())
}

pub(super) fn group() -> ComponentType {
    ComponentType::new("group")
        .role("container")
        .with(fragments::visibility())
}

/// A number is its own essential value when one was given, else the value of its first child
/// (a number or a bit of text).
pub(super) fn number() -> ComponentType {
    let value = StateVarDef::scalar("value")
        .essential(f64::NAN)
        .for_renderer()
        .static_deps(vec![
            ("own", DependencySpec::essential("value")),
            (
                "children",
                DependencySpec::children(&["number", "text"], &["value"]),
            ),
            ("fixed", DependencySpec::own("fixed")),
        ])
        .define(|deps| {
            if let Some(value) = deps.essential("own") {
                return Defined::value(value.to_f64());
            }
            match deps.children("children").first() {
                Some(child) => Defined::value(child.value(0).to_f64())
                    .with_used_default(child.used_default.first().copied().unwrap_or(true)),
                None => Defined::default_value(f64::NAN),
            }
        })
        .inverse(|req| {
            if fragments::is_fixed(req) {
                return InverseResult::Failure;
            }
            let Some(desired) = req.desired.whole().map(StateValue::to_f64) else {
                return InverseResult::Failure;
            };
            if req.deps.essential("own").is_none() && !req.deps.children("children").is_empty() {
                return InverseResult::success(vec![Instruction::set_child(
                    "children", 0, 0, desired,
                )]);
            }
            InverseResult::success(vec![Instruction::set_essential("value", desired)])
        });
    ComponentType::new("number")
        .var(value)
        .with(fragments::visibility())
}

pub(super) fn boolean() -> ComponentType {
    let value = StateVarDef::scalar("value")
        .essential(false)
        .for_renderer()
        .static_deps(vec![
            ("own", DependencySpec::essential("value")),
            (
                "children",
                DependencySpec::children(&["boolean", "text"], &["value"]),
            ),
            ("fixed", DependencySpec::own("fixed")),
        ])
        .define(|deps| {
            if let Some(value) = deps.essential("own") {
                return Defined::value(value.as_bool().unwrap_or(false));
            }
            match deps.children("children").first() {
                Some(child) => Defined::value(child.value(0).as_bool().unwrap_or(false))
                    .with_used_default(child.used_default.first().copied().unwrap_or(true)),
                None => Defined::default_value(false),
            }
        })
        .inverse(|req| {
            if fragments::is_fixed(req) {
                return InverseResult::Failure;
            }
            match req.desired.whole().and_then(StateValue::as_bool) {
                Some(desired) => {
                    InverseResult::success(vec![Instruction::set_essential("value", desired)])
                }
                None => InverseResult::Failure,
            }
        });
    ComponentType::new("boolean")
        .var(value)
        .with(fragments::visibility())
}

/// Bare text children of other components become `text` nodes.
pub(super) fn text() -> ComponentType {
    ComponentType::new("text")
        .var(fragments::essential_text("value", ""))
        .with(fragments::visibility())
}

/// Reads a variable of a node chosen by name at resolution time.
///
/// The target name comes from a `target` attribute component when present (so it can itself be
/// computed) or from a literal `target` attribute; `variable` defaults to `value` and may address
/// an array entry (`numbers[2]`) or size (`numbers.size`). The referent is only known after the
/// first declaration round resolves the name.
pub(super) fn lookup() -> ComponentType {
    let value = StateVarDef::scalar("value")
        .for_renderer()
        .deps(|ctx| {
            let mut specs = Vec::new();
            if ctx.has_attribute_component("target") {
                specs.push((
                    "targetName".to_string(),
                    DependencySpec::attribute_component("target", "value"),
                ));
            }
            let literal = ctx.attribute("target").and_then(StateValue::as_str);
            let computed = ctx.resolved.text("targetName");
            let variable = ctx
                .attribute("variable")
                .and_then(StateValue::as_str)
                .unwrap_or("value");
            if let Some(target) = computed.or(literal).filter(|name| !name.is_empty()) {
                specs.push((
                    "referent".to_string(),
                    DependencySpec::named(target, VarRef::parse(variable)),
                ));
            }
            specs
        })
        .define(|deps| {
            if deps.is_missing("referent") {
                return Defined::default_value(StateValue::Null);
            }
            Defined::value(deps.value("referent").clone())
                .with_used_default(deps.used_default("referent"))
        })
        .inverse(|req| {
            if req.deps.is_missing("referent") {
                return InverseResult::Failure;
            }
            fragments::forward("referent", req)
        });
    ComponentType::new("lookup").var(value)
}
