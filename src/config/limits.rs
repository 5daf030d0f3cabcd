//! Concurrency caps, bulk-operation tuning, and inbound rate-limit rules.

use super::defaults::{
    default_api_rate_limit, default_api_rate_window_secs, default_auth_rate_limit,
    default_auth_rate_window_secs, default_bulk_batch_delay_ms, default_bulk_batch_size,
    default_bulk_max_retries, default_bulk_retry_delay_ms, default_database_concurrency,
    default_external_concurrency, default_general_concurrency, default_messaging_rate_limit,
    default_messaging_rate_window_secs, default_platform_concurrency,
    default_platform_refresh_rate_limit, default_platform_refresh_rate_window_secs,
    default_room_operations_rate_limit, default_room_operations_rate_window_secs,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum simultaneously in-flight operations per operation class.
///
/// Enforced per process; no cross-process coordination is attempted.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct ConcurrencyLimitsConfig {
    /// Platform stat fetches (the flakiest dependency, kept tight).
    #[serde(default = "default_platform_concurrency")]
    pub platform: usize,
    /// Persistent-store writes.
    #[serde(default = "default_database_concurrency")]
    pub database: usize,
    /// Everything without a dedicated class.
    #[serde(default = "default_general_concurrency")]
    pub general: usize,
    /// Lightweight external existence checks (validator job).
    #[serde(default = "default_external_concurrency")]
    pub external: usize,
}

impl Default for ConcurrencyLimitsConfig {
    fn default() -> Self {
        Self {
            platform: default_platform_concurrency(),
            database: default_database_concurrency(),
            general: default_general_concurrency(),
            external: default_external_concurrency(),
        }
    }
}

/// Batch shaping for bulk refreshes: politeness throttle on top of the
/// per-item concurrency cap.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct BulkConfig {
    /// Items dispatched per batch; the next batch starts only after the
    /// previous one fully settles.
    #[serde(default = "default_bulk_batch_size")]
    pub batch_size: usize,
    /// Pause between batches (milliseconds).
    #[serde(default = "default_bulk_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Operation-level retries per item beyond the first attempt.
    #[serde(default = "default_bulk_max_retries")]
    pub max_retries: u32,
    /// Base delay for the exponential backoff between retries (milliseconds).
    #[serde(default = "default_bulk_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_size: default_bulk_batch_size(),
            batch_delay_ms: default_bulk_batch_delay_ms(),
            max_retries: default_bulk_max_retries(),
            retry_delay_ms: default_bulk_retry_delay_ms(),
        }
    }
}

impl BulkConfig {
    #[must_use]
    pub const fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// One fixed-window rule: at most `limit` actions per `window_secs`.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window_secs: u64,
}

impl RateLimitRule {
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Inbound rate-limit rules per endpoint class.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct RateLimitConfig {
    #[serde(default = "default_auth_rule")]
    pub auth: RateLimitRule,
    #[serde(default = "default_platform_refresh_rule")]
    pub platform_refresh: RateLimitRule,
    #[serde(default = "default_room_operations_rule")]
    pub room_operations: RateLimitRule,
    #[serde(default = "default_messaging_rule")]
    pub messaging: RateLimitRule,
    #[serde(default = "default_api_rule")]
    pub api: RateLimitRule,
}

const fn default_auth_rule() -> RateLimitRule {
    RateLimitRule {
        limit: default_auth_rate_limit(),
        window_secs: default_auth_rate_window_secs(),
    }
}

const fn default_platform_refresh_rule() -> RateLimitRule {
    RateLimitRule {
        limit: default_platform_refresh_rate_limit(),
        window_secs: default_platform_refresh_rate_window_secs(),
    }
}

const fn default_room_operations_rule() -> RateLimitRule {
    RateLimitRule {
        limit: default_room_operations_rate_limit(),
        window_secs: default_room_operations_rate_window_secs(),
    }
}

const fn default_messaging_rule() -> RateLimitRule {
    RateLimitRule {
        limit: default_messaging_rate_limit(),
        window_secs: default_messaging_rate_window_secs(),
    }
}

const fn default_api_rule() -> RateLimitRule {
    RateLimitRule {
        limit: default_api_rate_limit(),
        window_secs: default_api_rate_window_secs(),
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth: default_auth_rule(),
            platform_refresh: default_platform_refresh_rule(),
            room_operations: default_room_operations_rule(),
            messaging: default_messaging_rule(),
            api: default_api_rule(),
        }
    }
}
