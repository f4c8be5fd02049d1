//! Points and directed segments, editable from any of their derived quantities.

use super::fragments;
use crate::StateValue;
use crate::definition::{Defined, Desired, Instruction, InverseRequest, InverseResult, StateVarDef};
use crate::dependency::{DependencySpec, DependencySpecs, DependencyValues};
use crate::registry::ComponentType;

fn coordinate(name: &'static str) -> StateVarDef {
    StateVarDef::scalar(name)
        .essential(0.0)
        .for_renderer()
        .static_deps(vec![("fixed", DependencySpec::own("fixed"))])
        .inverse(move |req| {
            if fragments::is_fixed(req) {
                return InverseResult::Failure;
            }
            match req.desired.whole().and_then(StateValue::as_f64) {
                Some(value) => {
                    InverseResult::success(vec![Instruction::set_essential(name, value)])
                }
                None => InverseResult::Failure,
            }
        })
}

/// Drags arrive at `coords` as one initial request followed by continuing frames. Only the
/// initial request moves `gestureOrigin`, so `displacement` measures the whole gesture.
pub(super) fn point() -> ComponentType {
    let coords = StateVarDef::scalar("coords")
        .for_renderer()
        .static_deps(vec![
            ("x", DependencySpec::own("x")),
            ("y", DependencySpec::own("y")),
        ])
        .define(|deps| {
            Defined::value(StateValue::point(&[deps.number("x"), deps.number("y")]))
                .with_used_default(deps.used_default("x") && deps.used_default("y"))
        })
        .inverse(|req| {
            let mut instructions = Vec::new();
            if req.initial_change {
                instructions.push(Instruction::set_essential("gestureOrigin", req.current.clone()));
            }
            match req.desired {
                Desired::Whole(value) => {
                    let Some([x, y]) = value.as_point().as_deref().and_then(pair) else {
                        return InverseResult::Failure;
                    };
                    instructions.push(Instruction::set_dependency("x", x));
                    instructions.push(Instruction::set_dependency("y", y));
                }
                Desired::Entries(entries) => {
                    for (index, value) in entries {
                        let dependency = match index {
                            0 => "x",
                            1 => "y",
                            _ => return InverseResult::Failure,
                        };
                        instructions.push(Instruction::set_dependency(dependency, value.to_f64()));
                    }
                }
            }
            InverseResult::success(instructions)
        });
    let displacement = StateVarDef::scalar("displacement")
        .static_deps(vec![
            ("coords", DependencySpec::own("coords")),
            ("origin", DependencySpec::own("gestureOrigin")),
        ])
        .define(|deps| match (point_dep(deps, "coords"), point_dep(deps, "origin")) {
            (Some(p), Some(origin)) => Defined::value(point_value(sub(p, origin))),
            _ => Defined::default_value(point_value([0.0, 0.0])),
        });
    ComponentType::new("point")
        .var(coordinate("x"))
        .var(coordinate("y"))
        .var(coords)
        .var(StateVarDef::scalar("gestureOrigin").essential(StateValue::Null))
        .var(displacement)
        .with(fragments::visibility())
}

fn pair(coords: &[f64]) -> Option<[f64; 2]> {
    match coords {
        [x, y, ..] => Some([*x, *y]),
        _ => None,
    }
}

fn sub(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

fn add(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [a[0] + b[0], a[1] + b[1]]
}

fn point_dep(deps: &DependencyValues, name: &str) -> Option<[f64; 2]> {
    deps.point(name).as_deref().and_then(pair)
}

fn point_value(p: [f64; 2]) -> StateValue {
    StateValue::point(&p)
}

/// An endpoint of a segment: the `coords` of an attribute component of the same name when one
/// is given, otherwise an essential point.
fn anchor(name: &'static str, default: [f64; 2]) -> StateVarDef {
    StateVarDef::scalar(name)
        .essential(point_value(default))
        .for_renderer()
        .deps(move |ctx| {
            let mut specs: DependencySpecs = vec![
                ("fixed".to_string(), DependencySpec::own("fixed")),
                ("own".to_string(), DependencySpec::essential(name)),
            ];
            if ctx.has_attribute_component(name) {
                specs.push((
                    "component".to_string(),
                    DependencySpec::attribute_component(name, "coords"),
                ));
            }
            specs
        })
        .define(move |deps| {
            if deps.contains("component") {
                return Defined::value(deps.value("component").clone())
                    .with_used_default(deps.used_default("component"));
            }
            match deps.essential("own") {
                Some(value) => Defined::value(value.clone()),
                None => Defined::default_value(point_value(default)),
            }
        })
        .inverse(move |req| {
            if fragments::is_fixed(req) {
                return InverseResult::Failure;
            }
            if req.deps.contains("component") {
                return fragments::forward("component", req);
            }
            match fragments::desired_point(req).as_deref().and_then(pair) {
                Some(p) => {
                    InverseResult::success(vec![Instruction::set_essential(name, point_value(p))])
                }
                None => InverseResult::Failure,
            }
        })
}

fn segment_inverse<F>(solve: F) -> impl Fn(&InverseRequest<'_>) -> InverseResult + Send + Sync
where
    F: Fn(&InverseRequest<'_>, [f64; 2]) -> Option<Vec<Instruction>> + Send + Sync,
{
    move |req| {
        if fragments::is_fixed(req) {
            return InverseResult::Failure;
        }
        let Some(desired) = fragments::desired_point(req).as_deref().and_then(pair) else {
            return InverseResult::Failure;
        };
        match solve(req, desired) {
            Some(instructions) => InverseResult::success(instructions),
            None => InverseResult::Failure,
        }
    }
}

/// A segment given by an `endpoint` (tail) and a `through` point (head).
///
/// `direction`, `length` and `midpoint` are derived and editable: a new direction moves the
/// endpoint and keeps the head; a new length scales the direction; a new midpoint translates both
/// ends.
pub(super) fn directed_segment() -> ComponentType {
    let direction = StateVarDef::scalar("direction")
        .for_renderer()
        .static_deps(vec![
            ("endpoint", DependencySpec::own("endpoint")),
            ("through", DependencySpec::own("through")),
            ("fixed", DependencySpec::own("fixed")),
        ])
        .define(|deps| {
            let (Some(e), Some(t)) = (point_dep(deps, "endpoint"), point_dep(deps, "through"))
            else {
                return Defined::value(StateValue::Invalid);
            };
            Defined::value(point_value(sub(t, e)))
                .with_used_default(deps.used_default("endpoint") && deps.used_default("through"))
        })
        .inverse(segment_inverse(|req, d| {
            let through = point_dep(req.deps, "through")?;
            Some(vec![Instruction::set_dependency(
                "endpoint",
                point_value(sub(through, d)),
            )])
        }));

    let length = StateVarDef::scalar("length")
        .for_renderer()
        .static_deps(vec![
            ("direction", DependencySpec::own("direction")),
            ("fixed", DependencySpec::own("fixed")),
        ])
        .define(|deps| match point_dep(deps, "direction") {
            Some([dx, dy]) => Defined::value(dx.hypot(dy))
                .with_used_default(deps.used_default("direction")),
            None => Defined::value(StateValue::Invalid),
        })
        .inverse(|req| {
            if fragments::is_fixed(req) {
                return InverseResult::Failure;
            }
            let Some(target) = req.desired.whole().and_then(StateValue::as_f64) else {
                return InverseResult::Failure;
            };
            let Some([dx, dy]) = point_dep(req.deps, "direction") else {
                return InverseResult::Failure;
            };
            let current = dx.hypot(dy);
            if current == 0.0 || !target.is_finite() {
                return InverseResult::Failure;
            }
            let scale = target / current;
            InverseResult::success(vec![Instruction::set_dependency(
                "direction",
                point_value([dx * scale, dy * scale]),
            )])
        });

    let midpoint = StateVarDef::scalar("midpoint")
        .for_renderer()
        .static_deps(vec![
            ("endpoint", DependencySpec::own("endpoint")),
            ("through", DependencySpec::own("through")),
            ("fixed", DependencySpec::own("fixed")),
        ])
        .define(|deps| {
            let (Some(e), Some(t)) = (point_dep(deps, "endpoint"), point_dep(deps, "through"))
            else {
                return Defined::value(StateValue::Invalid);
            };
            Defined::value(point_value([(e[0] + t[0]) / 2.0, (e[1] + t[1]) / 2.0]))
        })
        .inverse(segment_inverse(|req, m| {
            let e = point_dep(req.deps, "endpoint")?;
            let t = point_dep(req.deps, "through")?;
            let shift = sub(m, [(e[0] + t[0]) / 2.0, (e[1] + t[1]) / 2.0]);
            Some(vec![
                Instruction::set_dependency("endpoint", point_value(add(e, shift))),
                Instruction::set_dependency("through", point_value(add(t, shift))),
            ])
        }));

    ComponentType::new("directedSegment")
        .var(anchor("endpoint", [0.0, 0.0]))
        .var(anchor("through", [1.0, 0.0]))
        .var(direction)
        .var(StateVarDef::alias("tail", "endpoint"))
        .var(StateVarDef::alias("head", "through"))
        .var(length)
        .var(midpoint)
        .with(fragments::visibility())
}
