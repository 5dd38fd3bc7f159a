//! Transition plans: the per-task target states and phase ordering a
//! three-phase transition drives through the command servant (spec §4.6).

use crate::command_servant::CommandTarget;
use crate::domain::environment::RoleNode;

/// One phase of a transition: a batched command sent to every target in
/// the phase at once. Phases within a plan execute strictly in order;
/// targets within a phase are dispatched concurrently by the command
/// servant.
#[derive(Debug, Clone)]
pub struct TransitionPhase {
    pub command_name: String,
    pub targets: Vec<CommandTarget>,
}

/// The full ordered sequence of phases for one transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionPlan {
    pub phases: Vec<TransitionPhase>,
}

impl TransitionPlan {
    pub fn single_phase(command_name: impl Into<String>, targets: Vec<CommandTarget>) -> Self {
        Self {
            phases: vec![TransitionPhase {
                command_name: command_name.into(),
                targets,
            }],
        }
    }

    /// Build a plan that drives one phase per depth level of the workflow
    /// role tree, leaves first — the partial order referenced in spec
    /// §4.6 step 1. `command_name` and `targets_for_role` let the caller
    /// supply the actual command and command-target mapping per role.
    pub fn from_role_tree(
        workflow: &RoleNode,
        command_name: impl Into<String>,
        mut targets_for_role: impl FnMut(&str) -> Vec<CommandTarget>,
    ) -> Self {
        let command_name = command_name.into();
        let mut levels: Vec<Vec<String>> = Vec::new();
        collect_levels(workflow, String::new(), 0, &mut levels);
        levels.reverse();

        let phases = levels
            .into_iter()
            .filter_map(|role_paths| {
                let targets: Vec<CommandTarget> = role_paths.iter().flat_map(|p| targets_for_role(p)).collect();
                (!targets.is_empty()).then_some(TransitionPhase {
                    command_name: command_name.clone(),
                    targets,
                })
            })
            .collect();

        Self { phases }
    }
}

fn collect_levels(node: &RoleNode, prefix: String, depth: usize, levels: &mut Vec<Vec<String>>) {
    let path = if prefix.is_empty() { node.name.clone() } else { format!("{prefix}/{}", node.name) };

    if levels.len() <= depth {
        levels.resize_with(depth + 1, Vec::new);
    }
    levels[depth].push(path.clone());

    for child in &node.children {
        collect_levels(child, path.clone(), depth + 1, levels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_role_tree_orders_leaves_before_root() {
        let workflow = RoleNode {
            name: "root".to_string(),
            children: vec![RoleNode::leaf("flp/0"), RoleNode::leaf("flp/1")],
        };

        let plan = TransitionPlan::from_role_tree(&workflow, "CONFIGURE", |path| {
            vec![CommandTarget {
                agent_id: "agent".to_string(),
                executor_id: "exec".to_string(),
                task_id: path.to_string(),
            }]
        });

        assert_eq!(plan.phases.len(), 2);
        assert_eq!(plan.phases[0].targets.len(), 2);
        assert_eq!(plan.phases[1].targets.len(), 1);
    }
}
