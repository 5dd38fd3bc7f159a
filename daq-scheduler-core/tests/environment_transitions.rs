//! Environment manager transition scenarios (spec §8, scenarios 4 and 5).

use std::sync::Arc;
use std::time::Duration;

use daq_scheduler_core::command_servant::{CommandServant, CommandTarget, CommandTransport};
use daq_scheduler_core::domain::environment::{Environment, EnvironmentState, EnvironmentTrigger, RoleNode};
use daq_scheduler_core::environment_manager::{EnvironmentManager, TransitionPlan};

fn target(n: u32) -> CommandTarget {
    CommandTarget {
        agent_id: format!("agent-{n}"),
        executor_id: format!("exec-{n}"),
        task_id: format!("task-{n}"),
    }
}

/// Responds to every target except one, simulating the silent target of
/// spec §8 scenario 4.
struct PartiallyRespondingTransport {
    servant: Arc<CommandServant>,
    silent_task: String,
}

#[async_trait::async_trait]
impl CommandTransport for PartiallyRespondingTransport {
    async fn send_command(
        &self,
        command_id: &str,
        _command_name: &str,
        target: &CommandTarget,
    ) -> Result<(), daq_scheduler_shared::SchedulerError> {
        if target.task_id == self.silent_task {
            return Ok(());
        }
        let servant = self.servant.clone();
        let command_id = command_id.to_string();
        let response = daq_scheduler_core::command_servant::TargetResponse {
            target: target.clone(),
            ok: true,
            message: "done".to_string(),
        };
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            servant.deliver_response(&command_id, response).await;
        });
        Ok(())
    }
}

#[tokio::test]
async fn transition_with_one_silent_target_rolls_environment_to_error() {
    let servant = Arc::new(CommandServant::new());
    let manager = EnvironmentManager::new(servant.clone());

    let workflow = RoleNode::leaf("flp/0");
    let environment = Environment::new("env-1", workflow);
    manager.register(environment).await;

    // deploy -> configured, so `start` is a valid trigger.
    let deploy_plan = TransitionPlan::single_phase("CONFIGURE", vec![]);
    let noop_transport = PartiallyRespondingTransport {
        servant: servant.clone(),
        silent_task: "none".to_string(),
    };
    manager
        .transition("env-1", EnvironmentTrigger::Deploy, deploy_plan, &noop_transport, Duration::from_millis(50))
        .await
        .expect("deploy should be valid from standby");

    let targets = vec![target(1), target(2), target(3)];
    let transport = PartiallyRespondingTransport {
        servant: servant.clone(),
        silent_task: "task-3".to_string(),
    };
    let plan = TransitionPlan::single_phase("CONFIGURE", targets);

    let result = manager
        .transition("env-1", EnvironmentTrigger::Configure, plan, &transport, Duration::from_millis(50))
        .await
        .expect("configure should be valid from configured");

    assert_eq!(
        result,
        daq_scheduler_core::environment_manager::TransitionResult::RolledToError
    );
}

#[tokio::test]
async fn end_of_data_initiates_stop_from_running() {
    let servant = Arc::new(CommandServant::new());
    let manager = EnvironmentManager::new(servant.clone());

    let workflow = RoleNode::leaf("flp/0");
    let mut environment = Environment::new("env-2", workflow);
    environment.state = EnvironmentState::Running;
    manager.register(environment).await;

    let transport = PartiallyRespondingTransport {
        servant: servant.clone(),
        silent_task: "none".to_string(),
    };
    let stop_plan = TransitionPlan::single_phase("STOP", vec![target(1)]);

    let result = manager
        .handle_end_of_data("env-2", stop_plan, &transport, Duration::from_millis(50))
        .await;

    assert!(result.is_some());
    assert_eq!(manager.state_of("env-2").await, Some(EnvironmentState::Configured));
}
