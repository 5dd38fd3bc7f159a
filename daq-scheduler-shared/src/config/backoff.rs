//! Registration backoff and revive-throttle configuration (spec §4.8, §6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Minimum delay between re-subscription attempts.
    #[serde(default = "BackoffConfig::default_min_secs")]
    pub registration_min_backoff_secs: u64,
    /// Maximum delay between re-subscription attempts.
    #[serde(default = "BackoffConfig::default_max_secs")]
    pub registration_max_backoff_secs: u64,
    /// Interval between tokens in the revive rate limiter; at most one
    /// REVIVE call is forwarded per interval, at most one outstanding.
    #[serde(default = "BackoffConfig::default_revive_interval_secs")]
    pub revive_token_interval_secs: u64,
}

impl BackoffConfig {
    fn default_min_secs() -> u64 {
        1
    }
    fn default_max_secs() -> u64 {
        15
    }
    fn default_revive_interval_secs() -> u64 {
        5
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            registration_min_backoff_secs: Self::default_min_secs(),
            registration_max_backoff_secs: Self::default_max_secs(),
            revive_token_interval_secs: Self::default_revive_interval_secs(),
        }
    }
}
