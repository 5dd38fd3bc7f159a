//! # Scheduler Controller (C8)
//!
//! Runs the connection lifecycle: subscribe, dispatch events to the other
//! components, and reconnect with exponential backoff on transport
//! failure. A separate consumer loop forwards revive requests as REVIVE
//! calls, throttled by a token bucket (spec §4.8).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use daq_scheduler_shared::FrameworkIdentityStore;
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::{error, info, warn};

use crate::command_servant::{CommandServant, CommandTransport};
use crate::domain::task::TaskLifecycleState;
use crate::environment_manager::{EnvironmentManager, TransitionPlan};
use crate::message_router::{MessageRouter, RoutedEffect};
use crate::offer_matcher::{DeployNotifier, OfferMatcher, PendingDescriptorsReceiver};
use crate::rm_client::{DisconnectReason, InboundEvent, RegistrationBackoff, ResourceManagerClient};
use crate::task_manager::TaskManagerState;

/// Rate-limit bucket for revive requests: at most one token available at
/// a time, refilled on a fixed interval (spec §4.8, §5 `reviveTokens`).
pub struct ReviveThrottle {
    semaphore: Arc<Semaphore>,
}

impl ReviveThrottle {
    /// Spawn the background refill task and return the throttle handle.
    pub fn spawn(interval: Duration) -> Self {
        let semaphore = Arc::new(Semaphore::new(1));
        let refill = semaphore.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if refill.available_permits() == 0 {
                    refill.add_permits(1);
                }
            }
        });
        Self { semaphore }
    }

    /// Wait for the next available token. Blocks (without holding any
    /// other lock) until the refill task grants one.
    pub async fn acquire(&self) {
        let permit = self.semaphore.acquire().await.expect("revive token semaphore closed");
        permit.forget();
    }
}

/// Why the controller loop stopped. Returned from [`SchedulerController::run`]
/// so the binary entry point can choose an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Cancelled,
    Fatal,
}

pub struct SchedulerController {
    rm_client: Arc<ResourceManagerClient>,
    task_manager_state: Arc<TaskManagerState>,
    command_servant: Arc<CommandServant>,
    environment_manager: Arc<EnvironmentManager>,
    offer_matcher: Arc<OfferMatcher>,
    message_router: MessageRouter,
    identity: Arc<FrameworkIdentityStore>,
    backoff: tokio::sync::Mutex<RegistrationBackoff>,
    revive_throttle: ReviveThrottle,
    revive_requests: tokio::sync::Mutex<mpsc::Receiver<()>>,
    cancelled: AtomicBool,
    cancel_notify: Notify,
    phase_timeout: Duration,
}

pub struct SchedulerControllerHandle {
    pub revive_trigger: mpsc::Sender<()>,
}

impl SchedulerController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rm_client: Arc<ResourceManagerClient>,
        task_manager_state: Arc<TaskManagerState>,
        command_servant: Arc<CommandServant>,
        environment_manager: Arc<EnvironmentManager>,
        offer_matcher: Arc<OfferMatcher>,
        identity: Arc<FrameworkIdentityStore>,
        backoff_min: Duration,
        backoff_max: Duration,
        revive_interval: Duration,
        phase_timeout: Duration,
    ) -> (Self, SchedulerControllerHandle) {
        let (revive_tx, revive_rx) = mpsc::channel(1);
        let message_router = MessageRouter::new(command_servant.clone());

        let controller = Self {
            rm_client,
            task_manager_state,
            command_servant,
            environment_manager,
            offer_matcher,
            message_router,
            identity,
            backoff: tokio::sync::Mutex::new(RegistrationBackoff::new(backoff_min, backoff_max)),
            revive_throttle: ReviveThrottle::spawn(revive_interval),
            revive_requests: tokio::sync::Mutex::new(revive_rx),
            cancelled: AtomicBool::new(false),
            cancel_notify: Notify::new(),
            phase_timeout,
        };

        (controller, SchedulerControllerHandle { revive_trigger: revive_tx })
    }

    /// Signal cancellation: unblocks network calls and exits the loop after
    /// one additional event iteration (spec §5).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run the subscribe/dispatch loop plus the revive consumer loop until
    /// cancelled or a fatal state error occurs (spec §4.8).
    pub async fn run(
        self: &Arc<Self>,
        pending_descriptors: &mut PendingDescriptorsReceiver,
        deploy_notifier: &DeployNotifier,
        transport: &dyn CommandTransport,
    ) -> ShutdownReason {
        let revive_loop = {
            let this = self.clone();
            tokio::spawn(async move { this.run_revive_loop().await })
        };

        let result = self.run_event_loop(pending_descriptors, deploy_notifier, transport).await;
        self.cancel();
        revive_loop.abort();
        result
    }

    async fn run_event_loop(
        &self,
        pending_descriptors: &mut PendingDescriptorsReceiver,
        deploy_notifier: &DeployNotifier,
        transport: &dyn CommandTransport,
    ) -> ShutdownReason {
        loop {
            if self.is_cancelled() {
                self.command_servant.cancel_all().await;
                return ShutdownReason::Cancelled;
            }

            let current_identity = self.identity.current();
            if let Err(e) = self.rm_client.subscribe(current_identity.as_deref()).await {
                warn!(error = %e, "subscribe call failed; backing off before retry");
                self.sleep_backoff().await;
                continue;
            }

            loop {
                if self.is_cancelled() {
                    self.command_servant.cancel_all().await;
                    return ShutdownReason::Cancelled;
                }

                match self.rm_client.next_event().await {
                    Ok(event) => {
                        if let Some(reason) = self.dispatch_event(event, pending_descriptors, deploy_notifier, transport).await {
                            return reason;
                        }
                    }
                    Err(DisconnectReason::Expected) => {
                        info!("subscription ended normally; reconnecting");
                        break;
                    }
                    Err(DisconnectReason::TransportError) => {
                        warn!("subscription ended with a transport error; reconnecting with backoff");
                        self.sleep_backoff().await;
                        break;
                    }
                }
            }
        }
    }

    async fn sleep_backoff(&self) {
        let delay = self.backoff.lock().await.next_delay();
        tokio::time::sleep(delay).await;
    }

    /// Dispatch one inbound event. Returns `Some(reason)` if the event
    /// demands the controller shut down.
    async fn dispatch_event(
        &self,
        event: InboundEvent,
        pending_descriptors: &mut PendingDescriptorsReceiver,
        deploy_notifier: &DeployNotifier,
        transport: &dyn CommandTransport,
    ) -> Option<ShutdownReason> {
        match event {
            InboundEvent::Subscribed { framework_id } => {
                if let Err(e) = self.identity.remember(framework_id) {
                    error!(error = %e, "failed to persist framework identity");
                    return Some(ShutdownReason::Fatal);
                }
                self.backoff.lock().await.reset();
                info!("subscribed; framework identity refreshed");
            }
            InboundEvent::Offers(offers) => {
                self.offer_matcher.match_cycle(offers, pending_descriptors, deploy_notifier).await;
            }
            InboundEvent::Update { task_id, state } => {
                if let Err(e) = self.rm_client.acknowledge(&task_id).await {
                    warn!(task_id, error = %e, "failed to acknowledge update");
                }

                let Some(lifecycle) = TaskLifecycleState::parse(&state) else {
                    warn!(task_id, state, "unrecognized task lifecycle state in UPDATE event; ignored");
                    return None;
                };

                let terminal_environment = {
                    let mut guard = self.task_manager_state.lock();
                    let applied = guard.manager().update_task_status(&task_id, lifecycle, Instant::now());
                    if applied && lifecycle.is_terminal() {
                        guard.manager().get(&task_id).map(|t| t.environment_id.clone())
                    } else {
                        None
                    }
                };

                // An unexpected terminal lifecycle state (outside a driven
                // transition) forces the owning environment to error (spec
                // §4.6); the environment manager's own transition paths
                // never route through this UPDATE handler.
                if let Some(environment_id) = terminal_environment {
                    self.environment_manager.force_error_for_task_failure(&environment_id, &task_id).await;
                }
            }
            InboundEvent::Failure { agent_id, executor_id } => {
                warn!(?agent_id, ?executor_id, "resource manager reported a failure event");
            }
            InboundEvent::Message {
                agent_id,
                executor_id,
                payload,
            } => {
                let effect = self.message_router.route(&agent_id, &executor_id, &payload).await;
                if let RoutedEffect::EndOfData { task_id } = effect {
                    self.handle_end_of_data(&task_id, transport).await;
                }
            }
        }
        None
    }

    async fn handle_end_of_data(&self, task_id: &str, transport: &dyn CommandTransport) {
        let environment_id = {
            let mut guard = self.task_manager_state.lock();
            guard.manager().get(task_id).map(|t| t.environment_id.clone())
        };

        let Some(environment_id) = environment_id else {
            warn!(task_id, "end-of-data for unknown task; ignored");
            return;
        };

        let targets = {
            let mut guard = self.task_manager_state.lock();
            guard
                .manager()
                .tasks_for_environment(&environment_id)
                .map(|t| crate::command_servant::CommandTarget {
                    agent_id: t.agent_id.clone(),
                    executor_id: t.executor_id.clone(),
                    task_id: t.id.clone(),
                })
                .collect::<Vec<_>>()
        };

        let stop_plan = TransitionPlan::single_phase("STOP", targets);
        self.environment_manager
            .handle_end_of_data(&environment_id, stop_plan, transport, self.phase_timeout)
            .await;
    }

    async fn run_revive_loop(self: Arc<Self>) {
        loop {
            let received = {
                let mut rx = self.revive_requests.lock().await;
                rx.recv().await
            };

            match received {
                Some(()) => {
                    self.revive_throttle.acquire().await;
                    if let Err(e) = self.rm_client.revive().await {
                        warn!(error = %e, "REVIVE call failed");
                    }
                }
                None => return,
            }

            if self.is_cancelled() {
                return;
            }
        }
    }
}

