//! Generic closed/open/half-open circuit breaker.
//!
//! Used to protect the resource-manager client (C2) from hammering a
//! struggling outer resource manager with calls that are almost certain to
//! fail. This is independent from the controller's reconnect backoff
//! (§4.8): the backoff governs *resubscription* after the stream drops; the
//! breaker governs individual in-flight calls while still subscribed.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::resilience::behavior::CircuitBreakerBehavior;
use crate::resilience::metrics::CircuitBreakerMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: Mutex<CircuitState>,
    opened_at: Mutex<Option<Instant>>,
    consecutive_failures: AtomicU32,
    half_open_calls: AtomicU32,
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    total_duration_nanos: AtomicU64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Inner,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Inner {
                state: Mutex::new(CircuitState::Closed),
                opened_at: Mutex::new(None),
                consecutive_failures: AtomicU32::new(0),
                half_open_calls: AtomicU32::new(0),
                total_calls: AtomicU64::new(0),
                success_count: AtomicU64::new(0),
                failure_count: AtomicU64::new(0),
                total_duration_nanos: AtomicU64::new(0),
            },
        }
    }

    /// Evaluates the Open -> HalfOpen recovery transition, then reports
    /// whether the caller may proceed.
    pub fn should_allow(&self) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        match *state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .inner
                    .opened_at
                    .lock()
                    .unwrap()
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.timeout {
                    *state = CircuitState::HalfOpen;
                    self.inner.half_open_calls.store(0, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success_manual(&self, duration: Duration) {
        self.inner.total_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.success_count.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        self.inner.consecutive_failures.store(0, Ordering::SeqCst);

        let mut state = self.inner.state.lock().unwrap();
        if *state == CircuitState::HalfOpen {
            let successes = self.inner.half_open_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if successes >= self.config.success_threshold {
                *state = CircuitState::Closed;
                *self.inner.opened_at.lock().unwrap() = None;
            }
        }
    }

    pub fn record_failure_manual(&self, duration: Duration) {
        self.inner.total_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.failure_count.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        let failures = self.inner.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;

        let mut state = self.inner.state.lock().unwrap();
        match *state {
            CircuitState::HalfOpen => self.open_locked(&mut state),
            CircuitState::Closed if failures >= self.config.failure_threshold => {
                self.open_locked(&mut state)
            }
            _ => {}
        }
    }

    fn open_locked(&self, state: &mut CircuitState) {
        *state = CircuitState::Open;
        *self.inner.opened_at.lock().unwrap() = Some(Instant::now());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        *self.inner.state.lock().unwrap()
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn force_open(&self) {
        let mut state = self.inner.state.lock().unwrap();
        self.open_locked(&mut state);
    }

    pub fn force_closed(&self) {
        *self.inner.state.lock().unwrap() = CircuitState::Closed;
        *self.inner.opened_at.lock().unwrap() = None;
        self.inner.consecutive_failures.store(0, Ordering::SeqCst);
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let total_calls = self.inner.total_calls.load(Ordering::Relaxed);
        let success_count = self.inner.success_count.load(Ordering::Relaxed);
        let failure_count = self.inner.failure_count.load(Ordering::Relaxed);
        let total_duration = Duration::from_nanos(self.inner.total_duration_nanos.load(Ordering::Relaxed));

        CircuitBreakerMetrics {
            total_calls,
            success_count,
            failure_count,
            consecutive_failures: self.inner.consecutive_failures.load(Ordering::SeqCst) as u64,
            half_open_calls: self.inner.half_open_calls.load(Ordering::SeqCst) as u64,
            total_duration,
            current_state: self.state(),
            failure_rate: if total_calls > 0 {
                failure_count as f64 / total_calls as f64
            } else {
                0.0
            },
            success_rate: if total_calls > 0 {
                success_count as f64 / total_calls as f64
            } else {
                0.0
            },
            average_duration: if total_calls > 0 {
                total_duration / total_calls as u32
            } else {
                Duration::ZERO
            },
        }
    }
}

impl CircuitBreakerBehavior for CircuitBreaker {
    fn name(&self) -> &str {
        self.name()
    }

    fn state(&self) -> CircuitState {
        self.state()
    }

    fn should_allow(&self) -> bool {
        self.should_allow()
    }

    fn record_success(&self, duration: Duration) {
        self.record_success_manual(duration);
    }

    fn record_failure(&self, duration: Duration) {
        self.record_failure_manual(duration);
    }

    fn is_healthy(&self) -> bool {
        self.is_healthy()
    }

    fn force_open(&self) {
        self.force_open();
    }

    fn force_closed(&self) {
        self.force_closed();
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        self.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed_and_allows() {
        let cb = CircuitBreaker::new("rm-client".into(), CircuitBreakerConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.should_allow());
    }

    #[test]
    fn opens_after_failure_threshold() {
        let cb = CircuitBreaker::new(
            "rm-client".into(),
            CircuitBreakerConfig {
                failure_threshold: 3,
                timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
        );
        cb.record_failure_manual(Duration::ZERO);
        cb.record_failure_manual(Duration::ZERO);
        assert!(cb.should_allow());
        cb.record_failure_manual(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.should_allow());
    }

    #[test]
    fn half_open_recovers_after_timeout() {
        let cb = CircuitBreaker::new(
            "rm-client".into(),
            CircuitBreakerConfig {
                failure_threshold: 1,
                timeout: Duration::from_millis(0),
                success_threshold: 2,
            },
        );
        cb.record_failure_manual(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Open);

        assert!(cb.should_allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success_manual(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success_manual(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn failure_in_half_open_reopens() {
        let cb = CircuitBreaker::new(
            "rm-client".into(),
            CircuitBreakerConfig {
                failure_threshold: 1,
                timeout: Duration::from_millis(0),
                success_threshold: 2,
            },
        );
        cb.record_failure_manual(Duration::ZERO);
        assert!(cb.should_allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure_manual(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn force_operations() {
        let cb = CircuitBreaker::new("rm-client".into(), CircuitBreakerConfig::default());
        cb.force_open();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.force_closed();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
