//! Server behavior and background-job configuration types.

use super::defaults::{
    default_cors_origins, default_kv_cleanup_interval_secs, default_validator_enabled,
    default_validator_interval_hours, default_validator_recheck_days,
};
use serde::{Deserialize, Serialize};

/// HTTP server configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Comma-separated allowed CORS origins, or "*" for permissive.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
    /// Interval for the key-value expiry sweep task (seconds).
    #[serde(default = "default_kv_cleanup_interval_secs")]
    pub kv_cleanup_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cors_origins: default_cors_origins(),
            kv_cleanup_interval_secs: default_kv_cleanup_interval_secs(),
        }
    }
}

/// Username validator background-job configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct ValidatorConfig {
    #[serde(default = "default_validator_enabled")]
    pub enabled: bool,
    /// How often the sweep runs (hours).
    #[serde(default = "default_validator_interval_hours")]
    pub interval_hours: u64,
    /// Identities whose last check is older than this are re-verified (days).
    #[serde(default = "default_validator_recheck_days")]
    pub recheck_days: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: default_validator_enabled(),
            interval_hours: default_validator_interval_hours(),
            recheck_days: default_validator_recheck_days(),
        }
    }
}

impl ValidatorConfig {
    #[must_use]
    pub fn recheck_horizon(&self) -> chrono::Duration {
        chrono::Duration::days(self.recheck_days as i64)
    }

    #[must_use]
    pub const fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_hours * 3600)
    }
}
