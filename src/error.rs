use crate::model::{Platform, RoomId, UserId};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a platform client when fetching user statistics.
///
/// The `NotFound` / everything-else split is load-bearing: only `NotFound`
/// may ever mark a stored username invalid. Transient transport problems,
/// upstream rate limiting and malformed payloads leave the identity alone so
/// a flaky third-party API can never invalidate a working username.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The platform confirmed the username does not exist.
    #[error("username not found on {platform}")]
    NotFound { platform: Platform },

    /// The platform rejected the request with its own rate limiter.
    #[error("{platform} rate limited the request")]
    RateLimited {
        platform: Platform,
        retry_after: Option<Duration>,
    },

    /// Network failure, timeout, or a 5xx that survived transport retries.
    #[error("transient {platform} failure: {message}")]
    Transient { platform: Platform, message: String },

    /// The platform answered but the payload did not have the expected shape.
    #[error("unexpected {platform} response: {message}")]
    InvalidResponse { platform: Platform, message: String },
}

impl PlatformError {
    /// Whether the operation-level retry loop should try this item again.
    ///
    /// `NotFound` and `RateLimited` are final answers from the platform;
    /// retrying them only burns quota. `InvalidResponse` means the payload
    /// shape changed, which another attempt will not fix.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub const fn platform(&self) -> Platform {
        match self {
            Self::NotFound { platform }
            | Self::RateLimited { platform, .. }
            | Self::Transient { platform, .. }
            | Self::InvalidResponse { platform, .. } => *platform,
        }
    }
}

/// Errors from the shared key-value store backing the cache and rate limiter.
///
/// Callers treat the store as best-effort: the rate limiter fails open and
/// the cache degrades to "always miss" on any of these.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),

    #[error("key-value store operation failed: {0}")]
    Backend(String),
}

/// Structural failures of the sync service itself.
///
/// Individual per-user refresh failures never surface here; they are folded
/// into the bulk result. These variants mean the orchestration could not
/// proceed at all.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    #[error("bulk refresh requires at least one user")]
    EmptyBulkRequest,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
