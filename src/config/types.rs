//! Root configuration types.

use super::defaults::default_port;
use super::limits::{BulkConfig, ConcurrencyLimitsConfig, RateLimitConfig};
use super::logging::LoggingConfig;
use super::platforms::PlatformsConfig;
use super::server::{ServerConfig, ValidatorConfig};
use serde::{Deserialize, Serialize};

/// Root configuration struct for the sync service.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyLimitsConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            server: ServerConfig::default(),
            platforms: PlatformsConfig::default(),
            concurrency: ConcurrencyLimitsConfig::default(),
            bulk: BulkConfig::default(),
            rate_limit: RateLimitConfig::default(),
            validator: ValidatorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
