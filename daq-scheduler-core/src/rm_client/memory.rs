//! In-memory [`ResourceManagerTransport`] used by integration tests to
//! drive the scheduler controller and offer matcher without a live outer
//! resource manager.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use daq_scheduler_shared::SchedulerResult;
use tokio::sync::Notify;

use super::{DisconnectReason, InboundEvent, LaunchOperation, ResourceManagerTransport};

#[derive(Debug, Default, Clone)]
pub struct RecordedAccept {
    pub offer_id: String,
    pub launches: Vec<LaunchRecord>,
}

#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub task_id: String,
    pub agent_id: String,
    pub ports: Vec<u32>,
}

#[derive(Default)]
struct Recorded {
    accepts: Vec<RecordedAccept>,
    declines: Vec<Vec<String>>,
    revives: u32,
    kills: Vec<String>,
    acknowledged: Vec<String>,
}

/// A transport whose event queue and call log are both driven by the test
/// harness. `push_event` enqueues the next `next_event` result; calls are
/// appended to an inspectable log.
pub struct InMemoryTransport {
    events: Mutex<VecDeque<Result<InboundEvent, DisconnectReason>>>,
    notify: Notify,
    recorded: Mutex<Recorded>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            recorded: Mutex::new(Recorded::default()),
        }
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&self, event: Result<InboundEvent, DisconnectReason>) {
        self.events.lock().expect("transport lock poisoned").push_back(event);
        self.notify.notify_one();
    }

    pub fn accepts(&self) -> Vec<RecordedAccept> {
        self.recorded.lock().expect("transport lock poisoned").accepts.clone()
    }

    pub fn declines(&self) -> Vec<Vec<String>> {
        self.recorded.lock().expect("transport lock poisoned").declines.clone()
    }

    pub fn revive_count(&self) -> u32 {
        self.recorded.lock().expect("transport lock poisoned").revives
    }

    pub fn kills(&self) -> Vec<String> {
        self.recorded.lock().expect("transport lock poisoned").kills.clone()
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.recorded.lock().expect("transport lock poisoned").acknowledged.clone()
    }
}

#[async_trait]
impl ResourceManagerTransport for InMemoryTransport {
    async fn subscribe(&self, _framework_id: Option<&str>) -> SchedulerResult<()> {
        Ok(())
    }

    async fn next_event(&self) -> Result<InboundEvent, DisconnectReason> {
        loop {
            if let Some(event) = self.events.lock().expect("transport lock poisoned").pop_front() {
                return event;
            }
            self.notify.notified().await;
        }
    }

    async fn accept(&self, offer_id: &str, launches: Vec<LaunchOperation>) -> SchedulerResult<()> {
        let mut recorded = self.recorded.lock().expect("transport lock poisoned");
        recorded.accepts.push(RecordedAccept {
            offer_id: offer_id.to_string(),
            launches: launches
                .into_iter()
                .map(|l| LaunchRecord {
                    task_id: l.task_id,
                    agent_id: l.agent_id,
                    ports: l.ports,
                })
                .collect(),
        });
        Ok(())
    }

    async fn decline(&self, offer_ids: Vec<String>) -> SchedulerResult<()> {
        self.recorded.lock().expect("transport lock poisoned").declines.push(offer_ids);
        Ok(())
    }

    async fn revive(&self) -> SchedulerResult<()> {
        self.recorded.lock().expect("transport lock poisoned").revives += 1;
        Ok(())
    }

    async fn kill(&self, task_id: &str) -> SchedulerResult<()> {
        self.recorded.lock().expect("transport lock poisoned").kills.push(task_id.to_string());
        Ok(())
    }

    async fn message(&self, _agent_id: &str, _executor_id: &str, _payload: Vec<u8>) -> SchedulerResult<()> {
        Ok(())
    }

    async fn acknowledge(&self, task_id: &str) -> SchedulerResult<()> {
        self.recorded.lock().expect("transport lock poisoned").acknowledged.push(task_id.to_string());
        Ok(())
    }
}

