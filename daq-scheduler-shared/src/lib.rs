//! Shared types, configuration, and ambient infrastructure for the
//! scheduler: error kinds, layered configuration, the framework identity
//! store, tracing setup, and the resilience (circuit breaker) primitives
//! used to protect the resource manager client from cascading failures.

pub mod config;
pub mod errors;
pub mod identity;
pub mod logging;
pub mod resilience;

pub use config::SchedulerConfig;
pub use errors::{SchedulerError, SchedulerResult};
pub use identity::FrameworkIdentityStore;
