//! # Scheduler Configuration
//!
//! Layered configuration: built-in defaults, an optional TOML file, then
//! environment variables prefixed `DAQ_SCHED_` (double-underscore nesting,
//! e.g. `DAQ_SCHED_BACKOFF__REGISTRATION_MIN_BACKOFF_SECS`). Mirrors the
//! teacher's `config`-crate-over-defaults layering; `dotenvy` loads a local
//! `.env` file before the environment layer is read, for developer
//! convenience only (never required in production).

pub mod backoff;
pub mod ports;

pub use backoff::BackoffConfig;
pub use ports::PortFloorsConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::{SchedulerError, SchedulerResult};

/// Top-level scheduler configuration (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How long the outer resource manager holds the framework registration
    /// open for reclaim after a disconnect.
    #[serde(default = "SchedulerConfig::default_failover_timeout_secs")]
    pub mesos_failover_timeout_secs: u64,

    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub very_verbose: bool,
    #[serde(default)]
    pub summary_metrics: bool,
    #[serde(default)]
    pub mesos_resource_type_metrics: bool,

    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub ports: PortFloorsConfig,

    /// Default deadline for a command servant transition command when the
    /// environment manager does not specify one explicitly.
    #[serde(default = "SchedulerConfig::default_command_timeout_secs")]
    pub default_command_timeout_secs: u64,

    /// Path used by the framework identity store to persist the single
    /// opaque identity string across restarts.
    #[serde(default = "SchedulerConfig::default_identity_path")]
    pub identity_store_path: String,
}

impl SchedulerConfig {
    fn default_failover_timeout_secs() -> u64 {
        7 * 24 * 60 * 60
    }

    fn default_command_timeout_secs() -> u64 {
        10
    }

    fn default_identity_path() -> String {
        "daq-scheduler-framework-id".to_string()
    }

    pub fn mesos_failover_timeout(&self) -> Duration {
        Duration::from_secs(self.mesos_failover_timeout_secs)
    }

    pub fn default_command_timeout(&self) -> Duration {
        Duration::from_secs(self.default_command_timeout_secs)
    }

    /// Build configuration from (in increasing precedence): compiled-in
    /// defaults, an optional TOML file at `path`, and `DAQ_SCHED_`-prefixed
    /// environment variables.
    pub fn load(path: Option<&Path>) -> SchedulerResult<Self> {
        let _ = dotenvy::dotenv();

        let defaults = serde_json::to_value(SchedulerConfig::default())
            .expect("SchedulerConfig::default must serialize");

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults).expect("defaults are valid config"));

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DAQ_SCHED")
                .separator("__")
                .try_parsing(true),
        );

        let built = builder
            .build()
            .map_err(|e| SchedulerError::State(format!("failed to build configuration: {e}")))?;

        built
            .try_deserialize()
            .map_err(|e| SchedulerError::State(format!("failed to deserialize configuration: {e}")))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mesos_failover_timeout_secs: Self::default_failover_timeout_secs(),
            verbose: false,
            very_verbose: false,
            summary_metrics: false,
            mesos_resource_type_metrics: false,
            backoff: BackoffConfig::default(),
            ports: PortFloorsConfig::default(),
            default_command_timeout_secs: Self::default_command_timeout_secs(),
            identity_store_path: Self::default_identity_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.backoff.registration_min_backoff_secs, 1);
        assert_eq!(cfg.backoff.registration_max_backoff_secs, 15);
        assert_eq!(cfg.ports.control_port_floor, 47100);
        assert_eq!(cfg.ports.dynamic_port_floor, 8999);
    }

    #[test]
    fn load_with_no_file_falls_back_to_defaults() {
        let cfg = SchedulerConfig::load(None).expect("load should succeed with defaults only");
        assert_eq!(cfg.ports.control_port_floor, 47100);
    }

    #[test]
    fn load_overlays_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.toml");
        std::fs::write(
            &path,
            r#"
            [ports]
            control_port_floor = 50000
            dynamic_port_floor = 9000
            "#,
        )
        .unwrap();

        let cfg = SchedulerConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.ports.control_port_floor, 50000);
        assert_eq!(cfg.ports.dynamic_port_floor, 9000);
    }
}
