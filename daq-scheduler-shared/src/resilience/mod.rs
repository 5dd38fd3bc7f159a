pub mod behavior;
pub mod circuit_breaker;
pub mod metrics;

pub use behavior::CircuitBreakerBehavior;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use metrics::CircuitBreakerMetrics;
