//! Tasks: mutable records created at launch, owned by the task manager for
//! their whole lifetime.

use std::collections::BTreeMap;

use crate::domain::descriptor::TaskDescriptor;

/// Unique task identifier, assigned fresh by the task manager at launch.
pub type TaskId = String;
pub type AgentId = String;
pub type ExecutorId = String;
pub type EnvironmentId = String;

/// Lifecycle as driven by the outer resource manager's status updates
/// (spec §4.4). `Launched` is the pre-running state entered immediately
/// after a successful ACCEPT, before the first status update arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskLifecycleState {
    Launched,
    Running,
    Finished,
    Lost,
    Killed,
    Failed,
    Error,
}

impl TaskLifecycleState {
    /// Once a task enters a terminal state it never transitions again
    /// (spec invariant, §3).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskLifecycleState::Finished
                | TaskLifecycleState::Lost
                | TaskLifecycleState::Killed
                | TaskLifecycleState::Failed
                | TaskLifecycleState::Error
        )
    }

    /// Parse the outer manager's UPDATE event state string (spec §4.2,
    /// vocabulary from §4.4: "launched → running → finished/lost/killed/
    /// failed/error"). Case-insensitive; unrecognized strings return `None`
    /// so the caller can drop the event rather than guess.
    pub fn parse(state: &str) -> Option<Self> {
        match state.to_ascii_lowercase().as_str() {
            "launched" => Some(TaskLifecycleState::Launched),
            "running" => Some(TaskLifecycleState::Running),
            "finished" => Some(TaskLifecycleState::Finished),
            "lost" => Some(TaskLifecycleState::Lost),
            "killed" => Some(TaskLifecycleState::Killed),
            "failed" => Some(TaskLifecycleState::Failed),
            "error" => Some(TaskLifecycleState::Error),
            _ => None,
        }
    }
}

/// A running (or launching) task owned by the task manager.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub descriptor: TaskDescriptor,
    /// Dynamic ports bound at launch, named → concrete port number.
    pub bound_ports: BTreeMap<String, u32>,
    pub agent_id: AgentId,
    pub executor_id: ExecutorId,
    pub role_path: String,
    pub environment_id: EnvironmentId,
    pub state: TaskLifecycleState,
    /// Fine-grained executor-reported state string, distinct from the
    /// lifecycle enum; set by the fast `UpdateTaskState` path (spec §4.4).
    pub fine_grained_state: Option<String>,
    pub control_port: u32,
}

impl Task {
    /// All ports occupied by this task on its agent, for disjointness
    /// checks against other live tasks on the same agent.
    pub fn occupied_ports(&self) -> impl Iterator<Item = u32> + '_ {
        self.bound_ports.values().copied().chain(std::iter::once(self.control_port))
    }

    /// Apply an outer-manager lifecycle transition. Returns `false` (and
    /// leaves the state untouched) if the task is already terminal, per
    /// the state-monotonicity invariant (spec §8).
    pub fn apply_status(&mut self, new_state: TaskLifecycleState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = new_state;
        true
    }
}
