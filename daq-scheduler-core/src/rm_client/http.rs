//! HTTP-based transport against the outer resource manager's scheduler
//! API. Treated as an externally-defined wire protocol (spec §6); this is
//! an illustrative client for it, not a reimplementation of its semantics.
//! The long-poll event stream is modeled as newline-delimited JSON read
//! from a chunked response body.

use async_trait::async_trait;
use daq_scheduler_shared::{SchedulerError, SchedulerResult};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{instrument, warn};

use super::{DisconnectReason, InboundEvent, LaunchOperation, ResourceManagerTransport};
use crate::domain::offer::{Offer, ResourceBundle};

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum OutboundCall {
    Subscribe { framework_id: Option<String> },
    Accept { offer_id: String, launches: Vec<LaunchOperationWire> },
    Decline { offer_ids: Vec<String> },
    Revive,
    Kill { task_id: String },
    Message { agent_id: String, executor_id: String, payload: Vec<u8> },
    Acknowledge { task_id: String },
}

#[derive(Debug, Serialize)]
struct LaunchOperationWire {
    task_id: String,
    agent_id: String,
    command_shell: String,
    command_arguments: Vec<String>,
    ports: Vec<u32>,
}

impl From<LaunchOperation> for LaunchOperationWire {
    fn from(op: LaunchOperation) -> Self {
        Self {
            task_id: op.task_id,
            agent_id: op.agent_id,
            command_shell: op.command_shell,
            command_arguments: op.command_arguments,
            ports: op.ports,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum InboundEventWire {
    Subscribed { framework_id: String },
    Offers { offers: Vec<OfferWire> },
    Update { task_id: String, state: String },
    Failure {
        agent_id: Option<String>,
        executor_id: Option<String>,
    },
    Message {
        agent_id: String,
        executor_id: String,
        payload: Vec<u8>,
    },
}

#[derive(Debug, Deserialize)]
struct OfferWire {
    id: String,
    agent_id: String,
    hostname: String,
    attributes: std::collections::BTreeMap<String, String>,
    cpus: f64,
    memory_mib: u64,
    port_ranges: Vec<(u32, u32)>,
}

impl From<OfferWire> for Offer {
    fn from(wire: OfferWire) -> Self {
        Offer {
            id: wire.id,
            agent_id: wire.agent_id,
            hostname: wire.hostname,
            attributes: wire.attributes,
            resources: ResourceBundle::new(
                wire.cpus,
                wire.memory_mib,
                wire.port_ranges.into_iter().map(|(s, e)| s..=e).collect(),
            ),
        }
    }
}

impl From<InboundEventWire> for InboundEvent {
    fn from(wire: InboundEventWire) -> Self {
        match wire {
            InboundEventWire::Subscribed { framework_id } => InboundEvent::Subscribed { framework_id },
            InboundEventWire::Offers { offers } => InboundEvent::Offers(offers.into_iter().map(Offer::from).collect()),
            InboundEventWire::Update { task_id, state } => InboundEvent::Update { task_id, state },
            InboundEventWire::Failure { agent_id, executor_id } => InboundEvent::Failure { agent_id, executor_id },
            InboundEventWire::Message {
                agent_id,
                executor_id,
                payload,
            } => InboundEvent::Message {
                agent_id,
                executor_id,
                payload,
            },
        }
    }
}

/// HTTP transport against the outer manager's scheduler endpoint. The
/// event stream is consumed on a background task that forwards parsed
/// events over an mpsc channel; `next_event` just reads from it.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    events: Mutex<ReceiverStream<Result<InboundEvent, DisconnectReason>>>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let client = reqwest::Client::new();
        let (tx, rx) = mpsc::channel(64);

        let stream_url = format!("{base_url}/scheduler/events");
        let stream_client = client.clone();
        tokio::spawn(async move {
            run_event_stream(stream_client, stream_url, tx).await;
        });

        Self {
            client,
            base_url,
            events: Mutex::new(ReceiverStream::new(rx)),
        }
    }

    async fn call(&self, call: OutboundCall) -> SchedulerResult<()> {
        let url = format!("{}/scheduler/calls", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&call)
            .send()
            .await
            .map_err(|e| SchedulerError::Transport(format!("call failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SchedulerError::Transport(format!(
                "call rejected with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

async fn run_event_stream(
    client: reqwest::Client,
    url: String,
    tx: mpsc::Sender<Result<InboundEvent, DisconnectReason>>,
) {
    let response = match client.get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "failed to open scheduler event stream");
            let _ = tx.send(Err(DisconnectReason::TransportError)).await;
            return;
        }
    };

    let mut stream = response.bytes_stream();
    let mut buffer = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "scheduler event stream read error");
                let _ = tx.send(Err(DisconnectReason::TransportError)).await;
                return;
            }
        };

        buffer.extend_from_slice(&chunk);
        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<InboundEventWire>(line) {
                Ok(wire) => {
                    if tx.send(Ok(wire.into())).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "malformed event on scheduler stream; dropped");
                }
            }
        }
    }

    let _ = tx.send(Err(DisconnectReason::Expected)).await;
}

#[async_trait]
impl ResourceManagerTransport for HttpTransport {
    #[instrument(skip(self))]
    async fn subscribe(&self, framework_id: Option<&str>) -> SchedulerResult<()> {
        self.call(OutboundCall::Subscribe {
            framework_id: framework_id.map(String::from),
        })
        .await
    }

    async fn next_event(&self) -> Result<InboundEvent, DisconnectReason> {
        let mut events = self.events.lock().await;
        match events.next().await {
            Some(event) => event,
            None => Err(DisconnectReason::Expected),
        }
    }

    async fn accept(&self, offer_id: &str, launches: Vec<LaunchOperation>) -> SchedulerResult<()> {
        self.call(OutboundCall::Accept {
            offer_id: offer_id.to_string(),
            launches: launches.into_iter().map(LaunchOperationWire::from).collect(),
        })
        .await
    }

    async fn decline(&self, offer_ids: Vec<String>) -> SchedulerResult<()> {
        self.call(OutboundCall::Decline { offer_ids }).await
    }

    async fn revive(&self) -> SchedulerResult<()> {
        self.call(OutboundCall::Revive).await
    }

    async fn kill(&self, task_id: &str) -> SchedulerResult<()> {
        self.call(OutboundCall::Kill {
            task_id: task_id.to_string(),
        })
        .await
    }

    async fn message(&self, agent_id: &str, executor_id: &str, payload: Vec<u8>) -> SchedulerResult<()> {
        self.call(OutboundCall::Message {
            agent_id: agent_id.to_string(),
            executor_id: executor_id.to_string(),
            payload,
        })
        .await
    }

    async fn acknowledge(&self, task_id: &str) -> SchedulerResult<()> {
        self.call(OutboundCall::Acknowledge {
            task_id: task_id.to_string(),
        })
        .await
    }
}
