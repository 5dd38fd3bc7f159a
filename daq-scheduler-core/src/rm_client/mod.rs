//! # Resource-Manager Client (C2)
//!
//! A thin bidirectional façade over the outer resource manager's typed
//! call/event transport (spec §4.2, §6). `ResourceManagerTransport` is the
//! seam: production code drives an HTTP-based Mesos scheduler transport
//! ([`http::HttpTransport`]); tests drive an in-memory one
//! ([`memory::InMemoryTransport`]). The facade distinguishes transport
//! termination from protocol errors so the controller (C8) can decide
//! between reconnect and shutdown, and wraps every call through the
//! circuit breaker that protects the scheduler from a wedged outer
//! manager.

pub mod http;
pub mod memory;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use daq_scheduler_shared::resilience::{CircuitBreaker, CircuitBreakerBehavior, CircuitBreakerConfig};
use daq_scheduler_shared::{SchedulerError, SchedulerResult};
use tracing::warn;

use crate::domain::offer::Offer;
use crate::domain::task::{AgentId, ExecutorId, TaskId};

/// One launch operation bundled into an ACCEPT call: the task to start and
/// where it goes.
#[derive(Debug, Clone)]
pub struct LaunchOperation {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub command_shell: String,
    pub command_arguments: Vec<String>,
    pub ports: Vec<u32>,
}

/// Inbound events from the outer manager (spec §4.2, §6).
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Subscribed { framework_id: String },
    Offers(Vec<Offer>),
    Update {
        task_id: TaskId,
        state: String,
    },
    Failure {
        agent_id: Option<AgentId>,
        executor_id: Option<ExecutorId>,
    },
    Message {
        agent_id: AgentId,
        executor_id: ExecutorId,
        payload: Vec<u8>,
    },
}

/// Distinguishes why the event stream ended, so the controller (C8) can
/// choose between a backoff-governed reconnect and a fatal shutdown
/// (spec §4.2, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The outer manager closed the stream as part of ordinary operation
    /// (e.g. a rolling restart it announced).
    Expected,
    /// A network/transport failure.
    TransportError,
}

/// The outer manager's call/event transport (spec §4.2). Implementors MUST
/// surface transport-level termination ([`DisconnectReason`]) distinctly
/// from individual call failures.
#[async_trait]
pub trait ResourceManagerTransport: Send + Sync {
    async fn subscribe(&self, framework_id: Option<&str>) -> SchedulerResult<()>;
    async fn next_event(&self) -> Result<InboundEvent, DisconnectReason>;
    async fn accept(&self, offer_id: &str, launches: Vec<LaunchOperation>) -> SchedulerResult<()>;
    async fn decline(&self, offer_ids: Vec<String>) -> SchedulerResult<()>;
    async fn revive(&self) -> SchedulerResult<()>;
    async fn kill(&self, task_id: &str) -> SchedulerResult<()>;
    async fn message(&self, agent_id: &str, executor_id: &str, payload: Vec<u8>) -> SchedulerResult<()>;
    /// UPDATE events are acknowledged automatically by the facade, not by
    /// callers (spec §4.2); implementors expose the raw call here.
    async fn acknowledge(&self, task_id: &str) -> SchedulerResult<()>;
}

/// Wraps a [`ResourceManagerTransport`] with the circuit breaker that
/// protects the scheduler from cascading failures when the outer manager
/// is unhealthy. Calls are rejected locally (as [`SchedulerError::Transport`])
/// without reaching the network while the breaker is open.
pub struct ResourceManagerClient {
    transport: Arc<dyn ResourceManagerTransport>,
    breaker: CircuitBreaker,
}

impl ResourceManagerClient {
    pub fn new(transport: Arc<dyn ResourceManagerTransport>) -> Self {
        Self::with_breaker_config(transport, CircuitBreakerConfig::default())
    }

    pub fn with_breaker_config(transport: Arc<dyn ResourceManagerTransport>, config: CircuitBreakerConfig) -> Self {
        Self {
            transport,
            breaker: CircuitBreaker::new("resource-manager-client".to_string(), config),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn guarded<T, F, Fut>(&self, f: F) -> SchedulerResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = SchedulerResult<T>>,
    {
        if !self.breaker.should_allow() {
            return Err(SchedulerError::Transport(format!(
                "{} circuit open; rejecting call locally",
                self.breaker.name()
            )));
        }

        let started = Instant::now();
        match f().await {
            Ok(value) => {
                self.breaker.record_success(started.elapsed());
                Ok(value)
            }
            Err(e) => {
                self.breaker.record_failure(started.elapsed());
                warn!(error = %e, "resource manager call failed");
                Err(e)
            }
        }
    }

    pub async fn subscribe(&self, framework_id: Option<&str>) -> SchedulerResult<()> {
        self.guarded(|| self.transport.subscribe(framework_id)).await
    }

    pub async fn next_event(&self) -> Result<InboundEvent, DisconnectReason> {
        self.transport.next_event().await
    }

    pub async fn accept(&self, offer_id: &str, launches: Vec<LaunchOperation>) -> SchedulerResult<()> {
        self.guarded(|| self.transport.accept(offer_id, launches)).await
    }

    pub async fn decline(&self, offer_ids: Vec<String>) -> SchedulerResult<()> {
        self.guarded(|| self.transport.decline(offer_ids)).await
    }

    pub async fn revive(&self) -> SchedulerResult<()> {
        self.guarded(|| self.transport.revive()).await
    }

    pub async fn kill(&self, task_id: &str) -> SchedulerResult<()> {
        self.guarded(|| self.transport.kill(task_id)).await
    }

    pub async fn message(&self, agent_id: &str, executor_id: &str, payload: Vec<u8>) -> SchedulerResult<()> {
        self.guarded(|| self.transport.message(agent_id, executor_id, payload)).await
    }

    pub async fn acknowledge(&self, task_id: &str) -> SchedulerResult<()> {
        self.guarded(|| self.transport.acknowledge(task_id)).await
    }
}

/// Exponential-backoff token source for re-subscription after a transport
/// disconnect (spec §4.8, min/max configurable, defaults 1s/15s). Wraps the
/// `exponential-backoff` crate's retry schedule rather than hand-rolling
/// the doubling arithmetic; [`RegistrationBackoff::reset`] restarts the
/// schedule after a successful SUBSCRIBED event.
pub struct RegistrationBackoff {
    min: Duration,
    max: Duration,
    attempt: u32,
}

impl RegistrationBackoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max, attempt: 0 }
    }

    /// Delay before the next re-subscription attempt. Never blocks;
    /// callers `tokio::time::sleep` on the result themselves.
    pub fn next_delay(&mut self) -> Duration {
        let backoff = exponential_backoff::Backoff::new(u32::MAX, self.min, self.max);
        let delay = (&backoff)
            .into_iter()
            .nth(self.attempt as usize)
            .flatten()
            .unwrap_or(self.max);
        self.attempt += 1;
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps_at_max() {
        let mut backoff = RegistrationBackoff::new(Duration::from_secs(1), Duration::from_secs(15));
        let first = backoff.next_delay();
        let second = backoff.next_delay();
        assert!(first >= Duration::from_secs(1) && first <= Duration::from_secs(15));
        assert!(second >= first || second <= Duration::from_secs(15));

        let mut later = Duration::from_secs(0);
        for _ in 0..20 {
            later = backoff.next_delay();
            assert!(later <= Duration::from_secs(15));
        }
        assert!(later <= Duration::from_secs(15));
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut backoff = RegistrationBackoff::new(Duration::from_secs(1), Duration::from_secs(15));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
