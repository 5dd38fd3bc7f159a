//! # Environment Manager (C6)
//!
//! Per-environment state machine driving coordinated, multi-phase
//! transitions across the tasks of one environment (spec §4.6). A
//! transition is:
//!
//! 1. compute the per-task target state and the partial order of phases
//!    demanded by the workflow graph,
//! 2. invoke the command servant (C5) with a batched transition command
//!    per phase,
//! 3. on completion, either advance to the next phase or roll the
//!    environment into `Error`.
//!
//! A task reaching an unexpected terminal state outside a transition also
//! forces the environment to `Error`. The manager additionally watches for
//! *end-of-data* device events: when any task of a `Running` environment
//! reports end-of-data, it initiates the stop transition on its own,
//! without waiting for an operator.

mod transition;

pub use transition::{TransitionPhase, TransitionPlan};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::command_servant::{CommandOutcome, CommandServant, CommandTransport};
use crate::domain::environment::{Environment, EnvironmentId, EnvironmentState, EnvironmentTrigger};
use crate::domain::task::TaskId;

/// What happened to an environment as the result of driving one transition
/// to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    Completed(EnvironmentState),
    RolledToError,
}

pub struct EnvironmentManager {
    environments: Mutex<HashMap<EnvironmentId, Environment>>,
    command_servant: Arc<CommandServant>,
}

impl EnvironmentManager {
    pub fn new(command_servant: Arc<CommandServant>) -> Self {
        Self {
            environments: Mutex::new(HashMap::new()),
            command_servant,
        }
    }

    pub async fn register(&self, environment: Environment) {
        let mut envs = self.environments.lock().await;
        envs.insert(environment.id.clone(), environment);
    }

    pub async fn state_of(&self, environment_id: &str) -> Option<EnvironmentState> {
        self.environments.lock().await.get(environment_id).map(|e| e.state)
    }

    /// Drive `trigger` to completion: compute the transition plan, run each
    /// phase's command through the command servant, and advance or roll to
    /// error based on the outcome (spec §4.6).
    pub async fn transition(
        &self,
        environment_id: &str,
        trigger: EnvironmentTrigger,
        plan: TransitionPlan,
        transport: &dyn CommandTransport,
        phase_timeout: Duration,
    ) -> Option<TransitionResult> {
        let target_state = {
            let mut envs = self.environments.lock().await;
            let env = envs.get_mut(environment_id)?;
            if !env.transition(trigger) {
                warn!(environment_id, ?trigger, state = ?env.state, "trigger not valid from current state");
                return None;
            }
            env.state
        };

        for (index, phase) in plan.phases.iter().enumerate() {
            let command_id = format!("{environment_id}-transition-{index}");
            let outcome = self
                .command_servant
                .send_command(command_id, &phase.command_name, phase.targets.clone(), phase_timeout, transport)
                .await;

            match outcome {
                CommandOutcome::Ok(_) => continue,
                CommandOutcome::Partial { .. } | CommandOutcome::Timeout { .. } | CommandOutcome::Cancelled => {
                    warn!(environment_id, phase = index, "transition phase did not complete cleanly; rolling to error");
                    let mut envs = self.environments.lock().await;
                    if let Some(env) = envs.get_mut(environment_id) {
                        env.state = EnvironmentState::Error;
                    }
                    return Some(TransitionResult::RolledToError);
                }
            }
        }

        info!(environment_id, ?target_state, "transition completed");
        Some(TransitionResult::Completed(target_state))
    }

    /// A task left the plan in an unexpected terminal state outside any
    /// transition; force the owning environment to `Error` (spec §4.6).
    pub async fn force_error_for_task_failure(&self, environment_id: &str, task_id: &TaskId) {
        let mut envs = self.environments.lock().await;
        if let Some(env) = envs.get_mut(environment_id) {
            warn!(environment_id, task_id, "unexpected terminal task state; forcing environment to error");
            env.state = EnvironmentState::Error;
        }
    }

    /// Handle an end-of-data device event from `task_id`: if its
    /// environment is `Running`, initiate the stop transition (spec §4.6,
    /// §8 scenario 5). The caller supplies the stop plan, since the
    /// per-task target ordering depends on the workflow graph.
    pub async fn handle_end_of_data(
        &self,
        environment_id: &str,
        stop_plan: TransitionPlan,
        transport: &dyn CommandTransport,
        phase_timeout: Duration,
    ) -> Option<TransitionResult> {
        let is_running = {
            let envs = self.environments.lock().await;
            envs.get(environment_id).map(|e| e.state) == Some(EnvironmentState::Running)
        };

        if !is_running {
            return None;
        }

        info!(environment_id, "end-of-data observed; initiating stop transition");
        self.transition(environment_id, EnvironmentTrigger::Stop, stop_plan, transport, phase_timeout)
            .await
    }
}

