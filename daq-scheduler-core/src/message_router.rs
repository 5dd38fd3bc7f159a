//! # Message Router (inside C8, spec §4.9)
//!
//! Inbound agent messages are opaque byte payloads, self-describing via a
//! `_messageType` discriminator field. Only two discriminator values are
//! standardized: `DeviceEvent` (routed to the environment manager) and
//! `MesosCommandResponse` (routed to the command servant when its `name`
//! field names a transition response). Anything else, or anything that
//! fails to parse at the peek step, is logged and dropped — never
//! retried.

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::command_servant::{CommandServant, CommandTarget, TargetResponse};
use crate::domain::task::{AgentId, ExecutorId};

#[derive(Debug, Deserialize)]
struct DiscriminatorPeek {
    #[serde(rename = "_messageType")]
    message_type: String,
}

#[derive(Debug, Deserialize)]
struct DeviceEventPayload {
    #[serde(rename = "type")]
    event_type: String,
    origin: DeviceEventOrigin,
}

#[derive(Debug, Deserialize)]
struct DeviceEventOrigin {
    #[serde(rename = "taskId")]
    task_id: String,
    #[allow(dead_code)]
    hostname: String,
}

#[derive(Debug, Deserialize)]
struct MesosCommandResponsePayload {
    name: String,
    id: String,
    #[serde(rename = "taskId")]
    task_id: String,
    ok: bool,
    message: String,
}

const END_OF_DATA: &str = "END_OF_DATA";
const TRANSITION_RESPONSE: &str = "TransitionResponse";

/// Routes inbound agent messages for the scheduler controller (spec §4.9).
/// Device events are not dispatched to the environment manager directly:
/// driving the stop transition needs the owning environment's workflow
/// graph and a transport handle, neither of which the router holds, so it
/// reports `RoutedEffect::EndOfData` and leaves the actual C6 call to its
/// caller.
pub struct MessageRouter {
    command_servant: Arc<CommandServant>,
}

/// What the caller (the scheduler controller) should do after routing one
/// message. `EndOfData` carries the originating task id so the controller
/// can look up its environment and run the stop transition plan.
pub enum RoutedEffect {
    None,
    EndOfData { task_id: String },
}

impl MessageRouter {
    pub fn new(command_servant: Arc<CommandServant>) -> Self {
        Self { command_servant }
    }

    /// Route one inbound agent message (spec §4.9).
    pub async fn route(&self, agent_id: &AgentId, executor_id: &ExecutorId, payload: &[u8]) -> RoutedEffect {
        let peek: DiscriminatorPeek = match serde_json::from_slice(payload) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "malformed agent message; dropped at discriminator peek");
                return RoutedEffect::None;
            }
        };

        match peek.message_type.as_str() {
            "DeviceEvent" => self.route_device_event(payload),
            "MesosCommandResponse" => {
                self.route_command_response(agent_id, executor_id, payload).await;
                RoutedEffect::None
            }
            other => {
                warn!(discriminator = other, "unrecognized message discriminator; dropped");
                RoutedEffect::None
            }
        }
    }

    fn route_device_event(&self, payload: &[u8]) -> RoutedEffect {
        let event: DeviceEventPayload = match serde_json::from_slice(payload) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "malformed DeviceEvent; dropped");
                return RoutedEffect::None;
            }
        };

        if event.event_type == END_OF_DATA {
            RoutedEffect::EndOfData {
                task_id: event.origin.task_id,
            }
        } else {
            RoutedEffect::None
        }
    }

    async fn route_command_response(&self, agent_id: &AgentId, executor_id: &ExecutorId, payload: &[u8]) {
        let response: MesosCommandResponsePayload = match serde_json::from_slice(payload) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed MesosCommandResponse; dropped");
                return;
            }
        };

        if response.name != TRANSITION_RESPONSE {
            // Not a transition response; no other MesosCommandResponse
            // kind is actionable by this router today.
            return;
        }

        self.command_servant
            .deliver_response(
                &response.id,
                TargetResponse {
                    target: CommandTarget {
                        agent_id: agent_id.clone(),
                        executor_id: executor_id.clone(),
                        task_id: response.task_id,
                    },
                    ok: response.ok,
                    message: response.message,
                },
            )
            .await;
    }
}

