//! # Offer Matcher (C7)
//!
//! Runs inside the OFFERS event handler. Per cycle: drain the pending
//! descriptor list, then for each offer walk the descriptor list in
//! **reverse insertion order**, matching constraints and resource demand,
//! allocating named dynamic ports above their configured floor, and
//! constructing a task through the task manager. The state mutex guarding
//! the catalog and pending list is held for the whole of step 3 below and
//! released before any ACCEPT/DECLINE call is issued (spec §4.7, §5).

use std::collections::HashMap;
use std::sync::Arc;

use daq_scheduler_shared::config::PortFloorsConfig;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::offer::Offer;
use crate::domain::task::{AgentId, ExecutorId, TaskId};
use crate::rm_client::{LaunchOperation, ResourceManagerClient};
use crate::task_manager::TaskManagerState;

/// A task constructed and accepted during one matching cycle, reported out
/// on the `tasksDeployed` notification channel (spec §4.7 step 5, §5).
#[derive(Debug, Clone)]
pub struct DeployedTask {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub offer_id: String,
}

/// Single-slot, coalescing sender for descriptors awaiting a match (spec
/// §5 `tasksToDeploy`). A new deploy overwrites whatever was queued,
/// concatenating with it rather than dropping it, since the environment
/// manager refills on every deploy with the union of outstanding work.
pub struct PendingDescriptors {
    tx: mpsc::Sender<Vec<crate::domain::TaskDescriptor>>,
}

pub struct PendingDescriptorsReceiver {
    rx: mpsc::Receiver<Vec<crate::domain::TaskDescriptor>>,
}

pub fn pending_descriptors_channel() -> (PendingDescriptors, PendingDescriptorsReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (PendingDescriptors { tx }, PendingDescriptorsReceiver { rx })
}

impl PendingDescriptors {
    /// Enqueue `descriptors` for the next matching cycle. Non-blocking: if
    /// the single slot is full, the new batch is dropped by design — the
    /// environment manager is expected to refill with the combined list on
    /// its next deploy (spec §5 backpressure note).
    pub fn push(&self, descriptors: Vec<crate::domain::TaskDescriptor>) {
        let _ = self.tx.try_send(descriptors);
    }
}

impl PendingDescriptorsReceiver {
    fn try_take(&mut self) -> Vec<crate::domain::TaskDescriptor> {
        self.rx.try_recv().unwrap_or_default()
    }
}

/// Per-cycle deployment notification, one-slot, dropped on full (spec §5
/// `resourceOffersDone`).
pub struct DeployNotifier {
    tx: mpsc::Sender<Vec<DeployedTask>>,
}

impl DeployNotifier {
    pub fn notify(&self, deployed: Vec<DeployedTask>) {
        let _ = self.tx.try_send(deployed);
    }
}

pub fn deploy_notify_channel() -> (DeployNotifier, mpsc::Receiver<Vec<DeployedTask>>) {
    let (tx, rx) = mpsc::channel(1);
    (DeployNotifier { tx }, rx)
}

pub struct OfferMatcher {
    state: Arc<TaskManagerState>,
    rm_client: Arc<ResourceManagerClient>,
    ports: PortFloorsConfig,
}

impl OfferMatcher {
    pub fn new(state: Arc<TaskManagerState>, rm_client: Arc<ResourceManagerClient>, ports: PortFloorsConfig) -> Self {
        Self { state, rm_client, ports }
    }

    /// Run one matching cycle against `offers`, as dispatched by the
    /// scheduler controller's OFFERS handler (spec §4.7).
    pub async fn match_cycle(
        &self,
        offers: Vec<Offer>,
        pending: &mut PendingDescriptorsReceiver,
        deploy_notifier: &DeployNotifier,
    ) {
        let fresh = pending.try_take();
        let mut offers = offers;
        let mut decline_set: Vec<String> = offers.iter().map(|o| o.id.clone()).collect();
        let mut accepts: HashMap<String, Vec<LaunchOperation>> = HashMap::new();
        let mut deployed = Vec::new();

        {
            let mut guard = self.state.lock();
            // Descriptors left unmatched at the end of a cycle are carried
            // into the next one under the same state mutex that guards the
            // catalog and the agent cache (spec §4.7 step 3, §5).
            let mut carried = std::mem::take(guard.pending_descriptors());
            carried.extend(fresh);

            for offer in &mut offers {
                let mut matched_indices = Vec::new();

                // Reverse insertion order: last-submitted descriptors compete
                // first (deliberate LIFO bias, spec §4.7 "Tie-breaks").
                for index in (0..carried.len()).rev() {
                    let descriptor = &carried[index];

                    let attributes = &offer.attributes;
                    if !descriptor.satisfied_by(attributes) {
                        debug!(offer_id = %offer.id, class = %descriptor.class_name, "constraint mismatch; skipped");
                        continue;
                    }

                    let Some(demand) = guard.manager().get_wants_for_descriptor(descriptor).cloned() else {
                        debug!(class = %descriptor.class_name, "unknown class demand; descriptor skipped");
                        continue;
                    };

                    if !offer.resources.covers_scalars(demand.cpus, demand.memory_mib) {
                        continue;
                    }

                    let mut bound_ports = HashMap::new();
                    let mut shortfall = false;

                    // Every task gets a control port, taken from the offer
                    // like any other dynamic port; it is not one of the
                    // descriptor's named `dynamic_ports` (spec §3's task
                    // model tracks it as a separate field from the bound
                    // port map).
                    let control_port = match offer.resources.min_port_above(self.ports.control_port_floor) {
                        Some(port) => {
                            offer.resources.take_port(port);
                            Some(port)
                        }
                        None => {
                            shortfall = true;
                            None
                        }
                    };

                    if !shortfall {
                        for name in &demand.dynamic_ports {
                            match offer.resources.min_port_above(self.ports.dynamic_port_floor) {
                                Some(port) => {
                                    offer.resources.take_port(port);
                                    bound_ports.insert(name.clone(), port);
                                }
                                None => {
                                    shortfall = true;
                                    break;
                                }
                            }
                        }
                    }

                    if shortfall {
                        // Abandon this descriptor on this offer only; ports
                        // already taken from this offer for this attempt are
                        // not returned, matching the spec's "abandon this
                        // descriptor on this offer and continue with the
                        // next offer" — the remaining offer capacity still
                        // reflects the partial allocation attempt.
                        continue;
                    }

                    offer.resources.subtract_scalars(demand.cpus, demand.memory_mib);
                    let control_port = control_port.expect("control port allocated when shortfall is false");

                    let executor_id: ExecutorId = format!("executor-{}", offer.agent_id);
                    let Some(task) = guard
                        .manager()
                        .new_task_for_offer(offer, descriptor, bound_ports.clone(), control_port, executor_id.clone())
                    else {
                        continue;
                    };

                    decline_set.retain(|id| id != &offer.id);
                    matched_indices.push(index);

                    let mut ports: Vec<u32> = bound_ports.values().copied().collect();
                    ports.push(control_port);

                    accepts.entry(offer.id.clone()).or_default().push(LaunchOperation {
                        task_id: task.id.clone(),
                        agent_id: offer.agent_id.clone(),
                        command_shell: descriptor.command.shell.clone(),
                        command_arguments: descriptor.command.arguments.clone(),
                        ports,
                    });

                    deployed.push(DeployedTask {
                        task_id: task.id,
                        agent_id: offer.agent_id.clone(),
                        offer_id: offer.id.clone(),
                    });
                }

                for index in matched_indices {
                    carried.remove(index);
                }
            }

            *guard.pending_descriptors() = carried;
        }

        for (offer_id, launches) in accepts {
            if let Err(e) = self.rm_client.accept(&offer_id, launches).await {
                tracing::warn!(offer_id, error = %e, "ACCEPT failed; logged, not retried per design");
            }
        }

        if !decline_set.is_empty() {
            if let Err(e) = self.rm_client.decline(decline_set).await {
                tracing::warn!(error = %e, "DECLINE failed");
            }
        }

        deploy_notifier.notify(deployed);
    }
}
