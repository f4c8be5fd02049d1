//! Components whose children are computed: `collect`, `repeat` and `extend`.

use super::fragments;
use crate::StateValue;
use crate::definition::{Defined, InverseResult, StateVarDef};
use crate::dependency::{
    DeclareContext, DependencySpec, DependencySpecs, DependencyValues, NodeTarget, VarRef,
};
use crate::registry::{ComponentType, CompositeBehavior, ExpansionContext, ReplacementSpec};
use crate::tree::NodeTree;

/// Upper bound on the instances of one counted `repeat`.
pub const MAX_REPEAT_INSTANCES: usize = 10_000;

fn text_attribute<'a>(ctx: &'a DeclareContext<'_>, name: &str) -> Option<&'a str> {
    ctx.attribute(name)
        .and_then(StateValue::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Mirrors every descendant of `source` matching `componentType`, up to `maxNumber`.
#[derive(Debug, Clone, Copy, Default)]
struct Collect;

impl CompositeBehavior for Collect {
    fn dependencies(&self, ctx: &DeclareContext<'_>) -> DependencySpecs {
        let (Some(source), Some(component_type)) = (
            text_attribute(ctx, "source"),
            text_attribute(ctx, "componentType"),
        ) else {
            return Vec::new();
        };
        let mut specs = vec![(
            "matches".to_string(),
            DependencySpec::children(&[component_type], &[])
                .of(NodeTarget::Name(source.to_string()))
                .recursive(),
        )];
        if ctx.attribute("maxNumber").is_some() {
            specs.push(("maxNumber".to_string(), DependencySpec::attribute("maxNumber")));
        }
        specs
    }

    fn replacements(
        &self,
        deps: &DependencyValues,
        ctx: &ExpansionContext<'_>,
    ) -> Result<Vec<ReplacementSpec>, String> {
        if !deps.contains("matches") {
            return Err("collect needs `source` and `componentType` attributes".to_string());
        }
        if deps.is_missing("matches") {
            return Ok(Vec::new());
        }
        let limit = deps
            .value("maxNumber")
            .as_f64()
            .filter(|n| *n >= 0.0)
            .map_or(usize::MAX, |n| n as usize);
        Ok(deps
            .children("matches")
            .iter()
            .filter(|entry| !ctx.is_self_or_ancestor(entry.node))
            .take(limit)
            .map(|entry| ReplacementSpec::shadow(entry.node))
            .collect())
    }
}

pub(super) fn collect() -> ComponentType {
    ComponentType::new("collect")
        .var(
            StateVarDef::scalar("numberCollected")
                .for_renderer()
                .static_deps(vec![(
                    "replacements",
                    DependencySpec::own(VarRef::size("replacements")),
                )])
                .define(|deps| Defined::value(deps.number("replacements"))),
        )
        .with(fragments::visibility())
        .composite(Collect)
}

/// Instantiates its template children once per item.
#[derive(Debug, Clone, Copy, Default)]
struct Repeat;

impl CompositeBehavior for Repeat {
    fn dependencies(&self, ctx: &DeclareContext<'_>) -> DependencySpecs {
        let mut specs = vec![(
            "items".to_string(),
            DependencySpec::own(VarRef::size("items")),
        )];
        if !ctx.has_attribute_component("for") {
            specs.push(("count".to_string(), DependencySpec::own("count")));
        }
        specs
    }

    fn replacements(
        &self,
        deps: &DependencyValues,
        ctx: &ExpansionContext<'_>,
    ) -> Result<Vec<ReplacementSpec>, String> {
        let count = deps.number("items");
        if !count.is_finite() || ctx.template.is_empty() {
            return Ok(Vec::new());
        }
        let requested = deps.number("count");
        if deps.contains("count") && requested > MAX_REPEAT_INSTANCES as f64 {
            ctx.warn(format!(
                "count {requested} exceeds the limit of {MAX_REPEAT_INSTANCES} instances"
            ));
        }
        let instance = match ctx.template {
            [single] => single.clone(),
            many => many
                .iter()
                .cloned()
                .fold(NodeTree::new("group"), NodeTree::child),
        };
        Ok((0..count as usize)
            .map(|i| ReplacementSpec::template((i + 1).to_string(), instance.clone()))
            .collect())
    }
}

/// Item values come from a `for` list component when given, else `1..=count`.
pub(super) fn repeat() -> ComponentType {
    let items = StateVarDef::array("items")
        .for_renderer()
        .deps(|ctx| {
            let mut specs = vec![("count".to_string(), DependencySpec::own("count"))];
            if ctx.has_attribute_component("for") {
                specs.push((
                    "for".to_string(),
                    DependencySpec::attribute_component("for", "numbers"),
                ));
            }
            specs
        })
        .size(|deps| {
            if deps.contains("for") {
                return deps.value("for").as_list().map_or(0, <[_]>::len);
            }
            let count = deps.number("count");
            if count.is_finite() && count > 0.0 {
                (count as usize).min(MAX_REPEAT_INSTANCES)
            } else {
                0
            }
        })
        .entries(|deps, wanted| {
            let list = deps.value("for").as_list();
            wanted
                .iter()
                .map(|&i| {
                    let value = match list {
                        Some(items) => items.get(i).cloned().unwrap_or_else(StateValue::nan),
                        None => StateValue::Number((i + 1) as f64),
                    };
                    (i, value)
                })
                .collect()
        })
        .inverse(|req| {
            if req.deps.contains("for") {
                fragments::forward("for", req)
            } else {
                InverseResult::Failure
            }
        });
    let indices = StateVarDef::array("indices")
        .static_deps(vec![("size", DependencySpec::own(VarRef::size("items")))])
        .size(|deps| deps.number("size") as usize)
        .entries(|_, wanted| {
            wanted
                .iter()
                .map(|&i| (i, StateValue::Number((i + 1) as f64)))
                .collect()
        });
    ComponentType::new("repeat")
        .var(fragments::essential_number("count", 1.0))
        .var(items)
        .var(indices)
        .with(fragments::visibility())
        .children_are_template()
        .composite(Repeat)
}

/// The item of the enclosing `repeat` instance.
pub(super) fn repeat_value() -> ComponentType {
    let value = StateVarDef::scalar("value")
        .for_renderer()
        .static_deps(vec![("item", DependencySpec::instance_item("items"))])
        .define(|deps| {
            Defined::value(deps.value("item").clone()).with_used_default(deps.used_default("item"))
        })
        .inverse(|req| fragments::forward("item", req));
    ComponentType::new("repeatValue").var(value)
}

/// The 1-based index of the enclosing `repeat` instance.
pub(super) fn repeat_index() -> ComponentType {
    let value = StateVarDef::scalar("value")
        .for_renderer()
        .static_deps(vec![("index", DependencySpec::instance_item("indices"))])
        .define(|deps| Defined::value(deps.value("index").clone()));
    ComponentType::new("repeatIndex").var(value)
}

/// Shadows one other node by name.
#[derive(Debug, Clone, Copy, Default)]
struct Extend;

impl CompositeBehavior for Extend {
    fn dependencies(&self, ctx: &DeclareContext<'_>) -> DependencySpecs {
        match text_attribute(ctx, "target") {
            Some(target) => vec![("target".to_string(), DependencySpec::reference(target))],
            None => Vec::new(),
        }
    }

    fn replacements(
        &self,
        deps: &DependencyValues,
        ctx: &ExpansionContext<'_>,
    ) -> Result<Vec<ReplacementSpec>, String> {
        if !deps.contains("target") {
            return Err("extend needs a `target` attribute".to_string());
        }
        let Some(target) = deps.value("target").as_node() else {
            return Ok(Vec::new());
        };
        if ctx.is_self_or_ancestor(target) {
            return Err("extend cannot target itself or an enclosing node".to_string());
        }
        Ok(vec![ReplacementSpec::shadow(target)])
    }
}

pub(super) fn extend() -> ComponentType {
    ComponentType::new("extend")
        .with(fragments::visibility())
        .composite(Extend)
}
