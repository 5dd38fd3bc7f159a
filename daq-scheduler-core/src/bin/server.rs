//! Scheduler binary entry point: loads configuration, wires the
//! components together, and runs the subscribe/dispatch loop until
//! cancelled or a fatal error occurs.

use std::sync::Arc;

use daq_scheduler_core::command_servant::CommandTransport;
use daq_scheduler_core::controller::SchedulerController;
use daq_scheduler_core::environment_manager::EnvironmentManager;
use daq_scheduler_core::offer_matcher::{deploy_notify_channel, pending_descriptors_channel, OfferMatcher};
use daq_scheduler_core::rm_client::http::HttpTransport;
use daq_scheduler_core::rm_client::ResourceManagerClient;
use daq_scheduler_core::{CommandServant, TaskManager, TaskManagerState};
use daq_scheduler_shared::{FrameworkIdentityStore, SchedulerConfig};

/// Dispatches a transition command over the resource-manager client's
/// opaque message call, the one piece of [`CommandTransport`] the binary
/// must supply (the command servant itself is transport-agnostic).
struct RmClientCommandTransport {
    rm_client: Arc<ResourceManagerClient>,
}

#[async_trait::async_trait]
impl CommandTransport for RmClientCommandTransport {
    async fn send_command(
        &self,
        command_id: &str,
        command_name: &str,
        target: &daq_scheduler_core::command_servant::CommandTarget,
    ) -> Result<(), daq_scheduler_shared::SchedulerError> {
        let payload = serde_json::json!({
            "_messageType": "Transition",
            "commandId": command_id,
            "name": command_name,
            "taskId": target.task_id,
        });
        let bytes = serde_json::to_vec(&payload)
            .map_err(|e| daq_scheduler_shared::SchedulerError::Protocol(format!("failed to encode command: {e}")))?;
        self.rm_client.message(&target.agent_id, &target.executor_id, bytes).await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SchedulerConfig::load(std::env::var_os("DAQ_SCHED_CONFIG").map(std::path::PathBuf::from).as_deref())?;
    daq_scheduler_shared::logging::init_tracing(config.verbose, config.very_verbose);

    tracing::info!("starting daq-scheduler");

    let identity = Arc::new(FrameworkIdentityStore::open(&config.identity_store_path)?);
    let transport = Arc::new(HttpTransport::new(
        std::env::var("DAQ_SCHED_RESOURCE_MANAGER_URL").unwrap_or_else(|_| "http://127.0.0.1:5050".to_string()),
    ));
    let rm_client = Arc::new(ResourceManagerClient::new(transport));

    let task_manager_state = Arc::new(TaskManagerState::new(TaskManager::new()));
    let command_servant = Arc::new(CommandServant::new());
    let environment_manager = Arc::new(EnvironmentManager::new(command_servant.clone()));
    let offer_matcher = Arc::new(OfferMatcher::new(task_manager_state.clone(), rm_client.clone(), config.ports));

    let (controller, handle) = SchedulerController::new(
        rm_client.clone(),
        task_manager_state.clone(),
        command_servant.clone(),
        environment_manager,
        offer_matcher,
        identity,
        std::time::Duration::from_secs(config.backoff.registration_min_backoff_secs),
        std::time::Duration::from_secs(config.backoff.registration_max_backoff_secs),
        std::time::Duration::from_secs(config.backoff.revive_token_interval_secs),
        config.default_command_timeout(),
    );
    let controller = Arc::new(controller);
    let _ = handle;

    let (_pending_tx, mut pending_rx) = pending_descriptors_channel();
    let (deploy_notifier, _deploy_rx) = deploy_notify_channel();
    let command_transport = RmClientCommandTransport { rm_client };

    let reason = controller.run(&mut pending_rx, &deploy_notifier, &command_transport).await;
    tracing::info!(?reason, "daq-scheduler shutting down");

    Ok(())
}
