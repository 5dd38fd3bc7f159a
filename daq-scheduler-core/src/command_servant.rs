//! # Command Servant (C5)
//!
//! Coordinates fan-out transition commands issued by the environment
//! manager. A command is serialized once, one message is dispatched per
//! target via the resource-manager client, and a pending slot is recorded
//! per target with an absolute deadline. Responses are matched by
//! (command-id, target-id); a command completes exactly once, `ok` iff
//! every target responded before the deadline elapses (spec §4.5, §8).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::domain::task::{AgentId, ExecutorId, TaskId};

/// One fan-out target: the (agent, executor, task) triple the spec's
/// Command Envelope addresses (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandTarget {
    pub agent_id: AgentId,
    pub executor_id: ExecutorId,
    pub task_id: TaskId,
}

/// A single target's response to a dispatched command.
#[derive(Debug, Clone)]
pub struct TargetResponse {
    pub target: CommandTarget,
    pub ok: bool,
    pub message: String,
}

/// Outcome of a completed command fan-out (spec §9 — tagged variant rather
/// than error-or-nil, because `Partial` carries state the environment
/// manager must inspect per target).
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    /// Every target responded before the deadline.
    Ok(HashMap<CommandTarget, TargetResponse>),
    /// Some targets responded; the rest timed out.
    Partial {
        responded: HashMap<CommandTarget, TargetResponse>,
        timed_out: Vec<CommandTarget>,
    },
    /// The deadline elapsed before any target responded.
    Timeout { outstanding: Vec<CommandTarget> },
    /// The ambient cancellation context fired before completion (spec §5).
    Cancelled,
}

/// Dispatches a single target message; implemented by the resource-manager
/// client facade (C2). Kept as a narrow trait so the servant can be tested
/// without a real transport.
#[async_trait::async_trait]
pub trait CommandTransport: Send + Sync {
    async fn send_command(
        &self,
        command_id: &str,
        command_name: &str,
        target: &CommandTarget,
    ) -> Result<(), daq_scheduler_shared::SchedulerError>;
}

struct PendingCommand {
    slots: HashMap<CommandTarget, Option<oneshot::Sender<TargetResponse>>>,
    cancelled: bool,
}

/// The command servant's pending-slot map, guarded by its own
/// finer-grained lock (spec §5) distinct from the task manager's state
/// mutex.
#[derive(Default)]
pub struct CommandServant {
    pending: Mutex<HashMap<String, PendingCommand>>,
}

impl CommandServant {
    pub fn new() -> Self {
        Self::default()
    }

    /// *SendCommand* (spec §4.5): dispatch `command_name` to every target
    /// via `transport`, then wait up to `timeout` for all responses.
    ///
    /// The command is not considered issued until every target message has
    /// been handed to the transport; only after that does the deadline
    /// clock start, matching the ordering guarantee in spec §5.
    pub async fn send_command(
        &self,
        command_id: String,
        command_name: &str,
        targets: Vec<CommandTarget>,
        timeout: Duration,
        transport: &dyn CommandTransport,
    ) -> CommandOutcome {
        let mut waiters = FuturesUnordered::new();
        let mut slots = HashMap::with_capacity(targets.len());

        for target in &targets {
            let (tx, rx) = oneshot::channel();
            slots.insert(target.clone(), Some(tx));
            let target = target.clone();
            waiters.push(async move { (target, rx.await) });
        }

        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                command_id.clone(),
                PendingCommand {
                    slots,
                    cancelled: false,
                },
            );
        }

        for target in &targets {
            if let Err(e) = transport.send_command(&command_id, command_name, target).await {
                warn!(%command_id, ?target, error = %e, "failed to dispatch command to target");
            }
        }

        let mut responded = HashMap::new();
        let deadline = Instant::now() + timeout;

        loop {
            if waiters.is_empty() {
                break;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            tokio::select! {
                next = waiters.next() => {
                    match next {
                        Some((target, Ok(response))) => {
                            responded.insert(target, response);
                        }
                        Some((_, Err(_))) => {
                            // sender dropped: slot was cancelled, not timed out.
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(remaining) => {
                    break;
                }
            }
        }

        let was_cancelled = {
            let mut pending = self.pending.lock().await;
            let cancelled = pending.get(&command_id).is_some_and(|c| c.cancelled);
            pending.remove(&command_id);
            cancelled
        };

        if was_cancelled {
            return CommandOutcome::Cancelled;
        }

        let timed_out: Vec<CommandTarget> = targets.iter().filter(|t| !responded.contains_key(*t)).cloned().collect();

        if timed_out.is_empty() {
            CommandOutcome::Ok(responded)
        } else if responded.is_empty() {
            CommandOutcome::Timeout { outstanding: timed_out }
        } else {
            CommandOutcome::Partial {
                responded,
                timed_out,
            }
        }
    }

    /// Delivers an incoming response, matched by (command-id, target).
    /// Duplicate or unmatched responses are logged and discarded (spec
    /// §4.5).
    pub async fn deliver_response(&self, command_id: &str, response: TargetResponse) {
        let mut pending = self.pending.lock().await;
        let Some(command) = pending.get_mut(command_id) else {
            debug!(command_id, target = ?response.target, "response for unknown or already-completed command; discarded");
            return;
        };

        let Some(slot) = command.slots.get_mut(&response.target) else {
            debug!(command_id, target = ?response.target, "response for unmatched target; discarded");
            return;
        };

        let Some(resolver) = slot.take() else {
            debug!(command_id, target = ?response.target, "duplicate response; discarded");
            return;
        };

        let _ = resolver.send(response);
    }

    /// Mark every still-pending command cancelled, unblocking their
    /// `send_command` callers with [`CommandOutcome::Cancelled`] (spec §5).
    pub async fn cancel_all(&self) {
        let mut pending = self.pending.lock().await;
        for command in pending.values_mut() {
            command.cancelled = true;
            command.slots.clear();
        }
    }

    pub async fn outstanding_command_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingTransport {
        sent: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl CommandTransport for RecordingTransport {
        async fn send_command(
            &self,
            _command_id: &str,
            _command_name: &str,
            _target: &CommandTarget,
        ) -> Result<(), daq_scheduler_shared::SchedulerError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn target(n: u32) -> CommandTarget {
        CommandTarget {
            agent_id: format!("agent-{n}"),
            executor_id: format!("exec-{n}"),
            task_id: format!("task-{n}"),
        }
    }

    #[tokio::test]
    async fn completes_ok_when_all_targets_respond() {
        let servant = CommandServant::new();
        let sent = Arc::new(AtomicUsize::new(0));
        let transport = RecordingTransport { sent: sent.clone() };
        let targets = vec![target(1), target(2)];

        let servant_ref = &servant;
        let targets_clone = targets.clone();
        let responder = async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            for t in &targets_clone {
                servant_ref
                    .deliver_response(
                        "cmd-1",
                        TargetResponse {
                            target: t.clone(),
                            ok: true,
                            message: "done".to_string(),
                        },
                    )
                    .await;
            }
        };

        let (outcome, _) = tokio::join!(
            servant.send_command("cmd-1".to_string(), "CONFIGURE", targets.clone(), Duration::from_secs(1), &transport),
            responder
        );

        assert_eq!(sent.load(Ordering::SeqCst), 2);
        match outcome {
            CommandOutcome::Ok(responses) => assert_eq!(responses.len(), 2),
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn completes_partial_when_one_target_silent() {
        let servant = CommandServant::new();
        let transport = RecordingTransport {
            sent: Arc::new(AtomicUsize::new(0)),
        };
        let targets = vec![target(1), target(2)];

        let servant_ref = &servant;
        let responder = async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            servant_ref
                .deliver_response(
                    "cmd-2",
                    TargetResponse {
                        target: target(1),
                        ok: true,
                        message: "done".to_string(),
                    },
                )
                .await;
        };

        let (outcome, _) = tokio::join!(
            servant.send_command("cmd-2".to_string(), "CONFIGURE", targets, Duration::from_millis(50), &transport),
            responder
        );

        match outcome {
            CommandOutcome::Partial { responded, timed_out } => {
                assert_eq!(responded.len(), 1);
                assert_eq!(timed_out.len(), 1);
            }
            other => panic!("expected Partial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn times_out_when_nobody_responds() {
        let servant = CommandServant::new();
        let transport = RecordingTransport {
            sent: Arc::new(AtomicUsize::new(0)),
        };

        let outcome = servant
            .send_command("cmd-3".to_string(), "CONFIGURE", vec![target(1)], Duration::from_millis(20), &transport)
            .await;

        match outcome {
            CommandOutcome::Timeout { outstanding } => assert_eq!(outstanding.len(), 1),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }
}
