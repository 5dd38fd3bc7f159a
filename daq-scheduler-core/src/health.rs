//! Structured health snapshot assembled on demand — ambient observability,
//! not the excluded operator RPC façade. No network surface is added for
//! it; it is a plain method other binaries or tests can call.

use daq_scheduler_shared::resilience::{CircuitBreakerBehavior, CircuitBreakerMetrics};
use serde::Serialize;

use crate::rm_client::ResourceManagerClient;
use crate::task_manager::TaskManagerState;

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerHealth {
    pub live_task_count: usize,
    pub resource_manager_circuit: CircuitBreakerMetrics,
}

impl SchedulerHealth {
    pub fn snapshot(task_manager_state: &TaskManagerState, rm_client: &ResourceManagerClient) -> Self {
        let live_task_count = task_manager_state.lock().manager().len();
        Self {
            live_task_count,
            resource_manager_circuit: rm_client.breaker().metrics(),
        }
    }
}
