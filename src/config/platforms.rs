//! Per-platform tuning: endpoints, cache TTLs, freshness windows, timeouts.

use super::defaults::{
    default_cache_ttl_secs, default_codeforces_base_url, default_freshness_window_secs,
    default_github_base_url, default_github_cache_ttl_secs, default_invalid_recheck_hours,
    default_leetcode_base_url, default_request_timeout_secs, default_transport_retry_attempts,
};
use crate::model::Platform;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for one external platform.
///
/// TTLs and freshness windows are deliberately per-platform: the services
/// differ in how often their numbers move and how touchy their rate limits
/// are, so one global constant would either waste quota or serve stale data.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlatformTuning {
    /// Base URL for the platform's API (overridable for tests).
    pub base_url: String,
    /// Cache entry lifetime (seconds).
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// How long fetched stats count as fresh (seconds); refreshes inside
    /// this window are no-ops unless forced.
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,
    /// Client-side timeout per request (seconds). Exceeding it is a
    /// transient failure, never username invalidity.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Transport-level retry attempts for known-transient HTTP statuses.
    #[serde(default = "default_transport_retry_attempts")]
    pub transport_retry_attempts: u32,
}

impl PlatformTuning {
    fn with_base_url(base_url: String) -> Self {
        Self {
            base_url,
            cache_ttl_secs: default_cache_ttl_secs(),
            freshness_window_secs: default_freshness_window_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            transport_retry_attempts: default_transport_retry_attempts(),
        }
    }

    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_window_secs as i64)
    }
}

fn default_leetcode_tuning() -> PlatformTuning {
    PlatformTuning::with_base_url(default_leetcode_base_url())
}

fn default_github_tuning() -> PlatformTuning {
    PlatformTuning {
        cache_ttl_secs: default_github_cache_ttl_secs(),
        ..PlatformTuning::with_base_url(default_github_base_url())
    }
}

fn default_codeforces_tuning() -> PlatformTuning {
    PlatformTuning::with_base_url(default_codeforces_base_url())
}

/// Configuration for all supported platforms.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlatformsConfig {
    #[serde(default = "default_leetcode_tuning")]
    pub leetcode: PlatformTuning,
    #[serde(default = "default_github_tuning")]
    pub github: PlatformTuning,
    #[serde(default = "default_codeforces_tuning")]
    pub codeforces: PlatformTuning,
    /// Hours a confirmed-invalid username is trusted before the updater is
    /// willing to re-verify it on a non-forced refresh.
    #[serde(default = "default_invalid_recheck_hours")]
    pub invalid_recheck_hours: u64,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            leetcode: default_leetcode_tuning(),
            github: default_github_tuning(),
            codeforces: default_codeforces_tuning(),
            invalid_recheck_hours: default_invalid_recheck_hours(),
        }
    }
}

impl PlatformsConfig {
    #[must_use]
    pub const fn tuning(&self, platform: Platform) -> &PlatformTuning {
        match platform {
            Platform::Leetcode => &self.leetcode,
            Platform::Github => &self.github,
            Platform::Codeforces => &self.codeforces,
        }
    }

    #[must_use]
    pub fn invalid_recheck_horizon(&self) -> chrono::Duration {
        chrono::Duration::hours(self.invalid_recheck_hours as i64)
    }
}
