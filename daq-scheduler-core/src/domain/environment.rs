//! Environments: operator-visible deployments aggregating tasks under one
//! state machine (spec §3, §4.6).

use std::collections::BTreeSet;

use crate::domain::task::{EnvironmentId, TaskId};

/// Finite states of an environment (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    Standby,
    Configured,
    Running,
    Paused,
    Error,
    Done,
}

/// Operator- or event-triggered transitions between [`EnvironmentState`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentTrigger {
    Deploy,
    Configure,
    Start,
    Stop,
    Reset,
    Exit,
    /// A task left the plan unexpectedly; forces the environment to error
    /// regardless of source state.
    UnexpectedTerminal,
}

impl EnvironmentState {
    /// The target state reached by applying `trigger`, or `None` if the
    /// trigger is not valid from this state.
    pub fn apply(self, trigger: EnvironmentTrigger) -> Option<EnvironmentState> {
        use EnvironmentState::*;
        use EnvironmentTrigger::*;

        if matches!(trigger, UnexpectedTerminal) {
            return Some(Error);
        }

        match (self, trigger) {
            (Standby, Deploy) => Some(Configured),
            (Configured, Configure) => Some(Configured),
            (Configured, Start) => Some(Running),
            (Running, Stop) => Some(Configured),
            (Running | Configured | Paused, Reset) => Some(Standby),
            (Running, UnexpectedTerminal) => Some(Error),
            (Error, Reset) => Some(Standby),
            (_, Exit) => Some(Done),
            _ => None,
        }
    }
}

/// One node of the workflow's role tree: a path segment and its children.
/// Descriptors are produced per leaf role, and constraints are inherited
/// down the path (spec §3).
#[derive(Debug, Clone)]
pub struct RoleNode {
    pub name: String,
    pub children: Vec<RoleNode>,
}

impl RoleNode {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Depth-first collection of every leaf's full role path, `/`-joined.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_leaf_paths(String::new(), &mut out);
        out
    }

    fn collect_leaf_paths(&self, prefix: String, out: &mut Vec<String>) {
        let path = if prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{prefix}/{}", self.name)
        };
        if self.children.is_empty() {
            out.push(path);
        } else {
            for child in &self.children {
                child.collect_leaf_paths(path.clone(), out);
            }
        }
    }
}

/// An environment: a finite-state machine plus the set of tasks it owns.
/// Tasks reference their environment by identifier only, never by handle
/// (spec §9 — avoids reference cycles).
#[derive(Debug, Clone)]
pub struct Environment {
    pub id: EnvironmentId,
    pub state: EnvironmentState,
    pub workflow: RoleNode,
    pub task_ids: BTreeSet<TaskId>,
}

impl Environment {
    pub fn new(id: impl Into<EnvironmentId>, workflow: RoleNode) -> Self {
        Self {
            id: id.into(),
            state: EnvironmentState::Standby,
            workflow,
            task_ids: BTreeSet::new(),
        }
    }

    /// Apply `trigger`, updating `self.state` in place. Returns `false` if
    /// the trigger was not valid from the current state (state unchanged).
    pub fn transition(&mut self, trigger: EnvironmentTrigger) -> bool {
        match self.state.apply(trigger) {
            Some(next) => {
                self.state = next;
                true
            }
            None => false,
        }
    }
}
