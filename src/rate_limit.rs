use crate::config::limits::{RateLimitConfig, RateLimitRule};
use crate::kv::KeyValueStore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Endpoint classes with independent inbound rate-limit rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Auth,
    PlatformRefresh,
    RoomOperations,
    Messaging,
    Api,
}

impl EndpointClass {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::PlatformRefresh => "platform-refresh",
            Self::RoomOperations => "room-operations",
            Self::Messaging => "messaging",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a rate-limit check. The limiter never blocks or errors; callers
/// decide whether `allowed == false` means rejection or degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
    /// Time until the current window resets.
    pub reset_after: Duration,
}

impl RateLimitDecision {
    #[must_use]
    pub const fn retry_after_secs(&self) -> u64 {
        self.reset_after.as_secs()
    }
}

/// Fixed-window rate limiter over the shared key-value store.
///
/// The store's `incr_window` is a single atomic increment-and-expire, so
/// concurrent callers on the same key never corrupt the counter. When the
/// store is unreachable the limiter **fails open**: availability of the
/// tracked feature is prioritized over strict enforcement.
pub struct RateLimiter {
    kv: Arc<dyn KeyValueStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: RateLimitConfig) -> Self {
        Self { kv, config }
    }

    /// Check and count one action for `key` against an explicit rule.
    pub async fn check(&self, key: &str, limit: u32, window: Duration) -> RateLimitDecision {
        match self.kv.incr_window(key, window).await {
            Ok(counter) => RateLimitDecision {
                allowed: counter.count <= u64::from(limit),
                remaining: u64::from(limit).saturating_sub(counter.count),
                reset_after: counter.remaining_window,
            },
            Err(err) => {
                warn!(
                    key,
                    error = %err,
                    "Rate limiter backend unavailable, failing open"
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: u64::from(limit),
                    reset_after: window,
                }
            }
        }
    }

    /// Check one action for a `(class, subject)` pair using the configured
    /// per-class rule. Key shape: `<class>:<subject>`.
    pub async fn check_endpoint(&self, class: EndpointClass, subject: &str) -> RateLimitDecision {
        let rule = self.rule(class);
        let key = format!("{class}:{subject}");
        self.check(&key, rule.limit, rule.window()).await
    }

    const fn rule(&self, class: EndpointClass) -> &RateLimitRule {
        match class {
            EndpointClass::Auth => &self.config.auth,
            EndpointClass::PlatformRefresh => &self.config.platform_refresh,
            EndpointClass::RoomOperations => &self.config.room_operations,
            EndpointClass::Messaging => &self.config.messaging,
            EndpointClass::Api => &self.config.api,
        }
    }
}
