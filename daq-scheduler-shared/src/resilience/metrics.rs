//! Circuit breaker metrics snapshot, used by health reporting and logging.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub half_open_calls: u64,
    pub total_duration: Duration,
    pub current_state: CircuitState,
    pub failure_rate: f64,
    pub success_rate: f64,
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "healthy",
            CircuitState::Open => "failing - rejecting calls",
            CircuitState::HalfOpen => "recovering - testing",
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "state={} calls={} success={:.1}% failures={} avg={:.2}ms",
            self.state_description(),
            self.total_calls,
            self.success_rate * 100.0,
            self.failure_count,
            self.average_duration.as_millis()
        )
    }
}
