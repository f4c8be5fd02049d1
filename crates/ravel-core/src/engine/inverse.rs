//! Backward propagation of desired values.

use super::Engine;
use crate::action::{Action, ActionOutcome};
use crate::definition::{Desired, Instruction, InverseRequest, InverseResult, VarKind};
use crate::dependency::{DependencySpec, DependencyValue, DependencyValues, VarPart};
use crate::{Error, NodeId, Result, StateValue, VarKey};
use std::sync::Arc;

/// Where an instruction's desired value lands.
enum InverseTarget {
    Variable(VarKey, VarPart),
    /// An essential cell read directly through an `Essential` dependency.
    Cell(VarKey),
}

impl Engine {
    /// Processes one action to completion.
    ///
    /// The desired value is pushed backward through inverse definitions. Every essential write is
    /// journaled; if any step fails the writes are undone and everything they touched is
    /// invalidated again, so observable values are exactly as before. Unknown targets are API
    /// errors; a rejected edit is a normal outcome with `success == false`.
    pub fn apply_action_sync(&mut self, action: &Action) -> Result<ActionOutcome> {
        let node = self.action_target(action)?;
        let key = self.key_of(node, &action.variable)?;
        if key.slot.is_builtin() {
            return Err(Error::UnknownStateVariable {
                component_type: self.component_type(node).unwrap_or_default().to_string(),
                variable: action.variable.clone(),
            });
        }
        let desired = match action.entry {
            Some(index) => Desired::Entries(vec![(index, action.desired_value())]),
            None => Desired::Whole(action.desired_value()),
        };
        tracing::debug!(
            var = %self.describe_var(key),
            initial_change = action.metadata.initial_change,
            transient = action.metadata.transient,
            "apply action"
        );

        self.essential.begin();
        self.inverse_stack.clear();
        let accepted = self.request_desired(key, desired, action.metadata.initial_change);
        if accepted {
            let touched = self.essential.commit(action.metadata.transient);
            let mut changed: Vec<NodeId> = touched.iter().map(|key| key.node).collect();
            changed.dedup();
            Ok(ActionOutcome {
                success: true,
                changed,
            })
        } else {
            let touched = self.essential.rollback();
            self.invalidate(&touched);
            tracing::debug!(var = %self.describe_var(key), "action rejected");
            Ok(ActionOutcome::rejected())
        }
    }

    /// Async wrapper around [`Engine::apply_action_sync`]. The engine never suspends; this
    /// exists so hosts can drive it from async code without an executor dependency.
    pub async fn apply_action(&mut self, action: &Action) -> Result<ActionOutcome> {
        self.apply_action_sync(action)
    }

    fn action_target(&self, action: &Action) -> Result<NodeId> {
        match (&action.node, &action.node_name) {
            (Some(node), _) if self.contains(*node) => Ok(*node),
            (Some(node), _) => Err(Error::UnknownNode {
                node: node.to_string(),
            }),
            (None, Some(name)) => self.node_id(name).ok_or_else(|| Error::UnknownNode {
                node: name.clone(),
            }),
            (None, None) => Err(Error::UnknownNode {
                node: "<no target>".to_string(),
            }),
        }
    }

    fn request_desired(&mut self, key: VarKey, desired: Desired, initial_change: bool) -> bool {
        if self.inverse_stack.contains(&key) {
            tracing::debug!(var = %self.describe_var(key), "inverse recursion revisits variable");
            return false;
        }
        self.inverse_stack.push(key);
        let accepted = self.request_desired_inner(key, desired, initial_change);
        self.inverse_stack.pop();
        accepted
    }

    fn request_desired_inner(
        &mut self,
        key: VarKey,
        desired: Desired,
        initial_change: bool,
    ) -> bool {
        let Some(rec) = self.record(key.node) else {
            return false;
        };
        let ty = rec.ty.clone();
        let shadow_of = rec.shadow_of;
        let Some(def) = ty.def(key.slot) else {
            return false;
        };
        if let Some(target) = shadow_of {
            return self.request_desired(VarKey::new(target, key.slot), desired, initial_change);
        }
        if let VarKind::Alias(target) = &def.kind {
            let Some(slot) = ty.slot(&target.name) else {
                return false;
            };
            let Some(desired) = retarget(desired, target.part) else {
                return false;
            };
            return self.request_desired(VarKey::new(key.node, slot), desired, initial_change);
        }

        let Some(inverse) = def.inverse.clone() else {
            if !def.essential {
                return false;
            }
            let (current, _) = self.whole_value(key);
            let value = desired.merged_into(&current);
            return self.write_essential(key, value);
        };

        let (current, used_default) = self.whole_value(key);
        let (specs, deps) = match self.var_state(key) {
            Some(state) => (state.specs.clone(), state.deps.clone()),
            None => return false,
        };
        let request = InverseRequest {
            desired: &desired,
            deps: &deps,
            current: &current,
            used_default,
            initial_change,
        };
        let instructions = match inverse(&request) {
            InverseResult::Failure => {
                tracing::trace!(var = %self.describe_var(key), "inverse definition failed");
                return false;
            }
            InverseResult::Success(instructions) => instructions,
        };
        for instruction in instructions {
            if !self.apply_instruction(key, &specs, &deps, instruction, initial_change) {
                return false;
            }
        }
        true
    }

    fn apply_instruction(
        &mut self,
        key: VarKey,
        specs: &Arc<Vec<(String, DependencySpec)>>,
        deps: &Arc<DependencyValues>,
        instruction: Instruction,
        initial_change: bool,
    ) -> bool {
        match instruction {
            Instruction::SetEssentialValue { variable, value } => {
                let slot = self.record(key.node).and_then(|rec| {
                    rec.ty
                        .slot(&variable)
                        .filter(|slot| rec.ty.def(*slot).is_some_and(|def| def.essential))
                });
                match slot {
                    Some(slot) => self.write_essential(VarKey::new(key.node, slot), value),
                    None => {
                        let message = format!(
                            "{} has no essential state variable {variable}",
                            self.describe_node(key.node)
                        );
                        self.warn(key.node, message);
                        false
                    }
                }
            }
            Instruction::SetDependency {
                dependency,
                desired,
                child_index,
                variable_index,
            } => {
                let Some(spec) = specs
                    .iter()
                    .find(|(name, _)| *name == dependency)
                    .map(|(_, spec)| spec)
                else {
                    let message = format!(
                        "{} has no dependency named {dependency}",
                        self.describe_var(key)
                    );
                    self.warn(key.node, message);
                    return false;
                };
                let target = self.inverse_target(
                    key,
                    spec,
                    deps.get(&dependency),
                    child_index,
                    variable_index,
                );
                match target {
                    Some(InverseTarget::Variable(target, part)) => match retarget(desired, part) {
                        Some(desired) => self.request_desired(target, desired, initial_change),
                        None => false,
                    },
                    Some(InverseTarget::Cell(cell)) => {
                        let current = self.essential.get(cell).cloned().unwrap_or_default();
                        let value = desired.merged_into(&current);
                        self.write_essential(cell, value)
                    }
                    None => false,
                }
            }
        }
    }

    fn inverse_target(
        &self,
        key: VarKey,
        spec: &DependencySpec,
        resolved: Option<&DependencyValue>,
        child_index: Option<usize>,
        variable_index: Option<usize>,
    ) -> Option<InverseTarget> {
        let node = key.node;
        let variable = |target: NodeId, name: &str, part: VarPart| {
            self.slot_of(target, name)
                .map(|slot| InverseTarget::Variable(VarKey::new(target, slot), part))
        };
        match spec {
            DependencySpec::SelfVariable(var) => variable(node, &var.name, var.part),
            DependencySpec::ParentVariable(var) => {
                variable(self.effective_parent(node)?, &var.name, var.part)
            }
            DependencySpec::AncestorVariable { names, .. } => {
                let Some(DependencyValue::Ancestor { node: ancestor, .. }) = resolved else {
                    return None;
                };
                let name = names.get(variable_index.unwrap_or(0))?;
                variable(*ancestor, name, VarPart::Whole)
            }
            DependencySpec::ChildGroup { variable_names, .. } => {
                let Some(DependencyValue::Children(children)) = resolved else {
                    return None;
                };
                let child = children.get(child_index?)?;
                let name = variable_names.get(variable_index.unwrap_or(0))?;
                variable(child.node, name, VarPart::Whole)
            }
            DependencySpec::Essential { variable: name } => {
                let rec = self.record(node)?;
                let slot = rec.ty.slot(name)?;
                rec.ty
                    .def(slot)
                    .filter(|def| def.essential)
                    .map(|_| InverseTarget::Cell(VarKey::new(node, slot)))
            }
            DependencySpec::SourceCompositeVariable { name, per_instance } => {
                let (composite, index) = self.source_composite(node)?;
                let part = if *per_instance {
                    VarPart::Entry(index)
                } else {
                    VarPart::Whole
                };
                variable(composite, name, part)
            }
            DependencySpec::NodeVariable {
                target,
                variable: var,
            } => variable(self.lookup_target(target)?, &var.name, var.part),
            DependencySpec::AttributeComponent {
                attribute,
                variable: var,
            } => {
                let component = *self.record(node)?.attribute_nodes.get(attribute)?;
                variable(component, &var.name, var.part)
            }
            DependencySpec::Attribute { .. }
            | DependencySpec::Identity
            | DependencySpec::NodeReference(_) => None,
        }
    }

    /// Writes an essential cell inside the current action. A value equal to the stored one
    /// (within `inverse.tolerance`) is not a change.
    fn write_essential(&mut self, key: VarKey, value: StateValue) -> bool {
        let tolerance = self.config.inverse_tolerance();
        if self
            .essential
            .get(key)
            .is_some_and(|current| current.approx_eq(&value, tolerance))
        {
            return true;
        }
        tracing::trace!(var = %self.describe_var(key), value = ?value, "essential write");
        self.essential.set(key, value);
        self.invalidate(&[key]);
        true
    }
}

/// Adapts a desired value to the part of the variable it is aimed at.
fn retarget(desired: Desired, part: VarPart) -> Option<Desired> {
    match (part, desired) {
        (VarPart::Whole, desired) => Some(desired),
        (VarPart::Entry(index), Desired::Whole(value)) => {
            Some(Desired::Entries(vec![(index, value)]))
        }
        (VarPart::Entry(_), Desired::Entries(_)) | (VarPart::Size, _) => None,
    }
}
