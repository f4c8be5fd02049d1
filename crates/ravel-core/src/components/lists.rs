use super::fragments;
use crate::StateValue;
use crate::definition::{Defined, Desired, Instruction, InverseResult, StateVarDef};
use crate::dependency::{DependencySpec, DependencyValues, VarRef};
use crate::registry::ComponentType;

/// Author-supplied list literal: an array, or whitespace/comma separated text.
fn parse_numbers(value: &StateValue) -> Vec<f64> {
    match value {
        StateValue::List(items) => items.iter().map(StateValue::to_f64).collect(),
        StateValue::Text(text) => text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<f64>().unwrap_or(f64::NAN))
            .collect(),
        StateValue::Number(n) => vec![*n],
        _ => Vec::new(),
    }
}

fn list_size(deps: &DependencyValues) -> usize {
    let children = deps.children("children");
    if !children.is_empty() {
        return children.len();
    }
    deps.essential("own").map(|v| parse_numbers(v).len()).unwrap_or(0)
}

/// A list of numbers taken from `number` children, or from a literal `numbers` attribute.
pub(super) fn number_list() -> ComponentType {
    let numbers = StateVarDef::array("numbers")
        .essential(f64::NAN)
        .for_renderer()
        .static_deps(vec![
            ("children", DependencySpec::children(&["number"], &["value"])),
            ("own", DependencySpec::essential("numbers")),
            ("fixed", DependencySpec::own("fixed")),
        ])
        .size(list_size)
        .entries(|deps, wanted| {
            let children = deps.children("children");
            if !children.is_empty() {
                return wanted
                    .iter()
                    .filter_map(|&i| {
                        let child = children.get(i)?;
                        Some((i, StateValue::Number(child.value(0).to_f64())))
                    })
                    .collect();
            }
            let literal = deps.essential("own").map(parse_numbers).unwrap_or_default();
            wanted
                .iter()
                .filter_map(|&i| literal.get(i).map(|n| (i, StateValue::Number(*n))))
                .collect()
        })
        .inverse(|req| {
            if fragments::is_fixed(req) {
                return InverseResult::Failure;
            }
            let children = req.deps.children("children");
            if children.is_empty() {
                let merged = req.desired.merged_into(req.current);
                return InverseResult::success(vec![Instruction::set_essential("numbers", merged)]);
            }
            let edits: Vec<(usize, StateValue)> = match req.desired {
                Desired::Whole(value) => match value.as_list() {
                    Some(items) if items.len() == children.len() => {
                        items.iter().cloned().enumerate().collect()
                    }
                    _ => return InverseResult::Failure,
                },
                Desired::Entries(entries) => entries.clone(),
            };
            let mut instructions = Vec::with_capacity(edits.len());
            for (index, value) in edits {
                if index >= children.len() {
                    return InverseResult::Failure;
                }
                instructions.push(Instruction::set_child("children", index, 0, value.to_f64()));
            }
            InverseResult::success(instructions)
        });
    ComponentType::new("numberList")
        .var(numbers)
        .var(StateVarDef::alias("length", VarRef::size("numbers")).for_renderer())
        .with(fragments::visibility())
}

/// Sums `number` and `numberList` children. Not invertible.
pub(super) fn sum() -> ComponentType {
    let value = StateVarDef::scalar("value")
        .for_renderer()
        .static_deps(vec![(
            "terms",
            DependencySpec::children(&["number", "numberList"], &["value", "numbers"]).optional(),
        )])
        .define(|deps| {
            let terms = deps.children("terms");
            if terms.is_empty() {
                return Defined::default_value(0.0);
            }
            let total: f64 = terms
                .iter()
                .map(|term| match &term.values[..] {
                    [Some(value), ..] => value.to_f64(),
                    [_, Some(StateValue::List(items))] => {
                        items.iter().map(StateValue::to_f64).sum()
                    }
                    _ => f64::NAN,
                })
                .sum();
            Defined::value(total)
        });
    ComponentType::new("sum")
        .var(value)
        .with(fragments::visibility())
}
