//! Shared HTTP transport helpers for the platform clients.
//!
//! Transport-level retry lives here and covers only the known-transient
//! status ladder (502/503/504) and connection-level failures, with bounded
//! attempts and increasing delay. Operation-level retry for anything that
//! still fails belongs to the concurrency limiter; keeping the two layers
//! delineated avoids multiplicative retry storms.

use crate::config::platforms::PlatformTuning;
use crate::error::PlatformError;
use crate::model::Platform;
use reqwest::{Client, Request, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("stat-sync-server/", env!("CARGO_PKG_VERSION"));
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Build the shared reqwest client for one platform: per-request timeout and
/// a stable User-Agent (GitHub rejects requests without one).
pub(crate) fn build_client(
    platform: Platform,
    tuning: &PlatformTuning,
) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(tuning.request_timeout())
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build {platform} HTTP client: {e}"))
}

pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 502 | 503 | 504)
}

/// Seconds from a `Retry-After` header, when the platform provides one.
pub(crate) fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Execute a request, retrying known-transient statuses and connection
/// failures up to `max_attempts` total attempts with increasing delay.
///
/// A 429 is returned immediately as [`PlatformError::RateLimited`], never
/// retried here, since hammering a rate limiter only deepens the hole. Any
/// other status is handed back to the caller to interpret.
pub(crate) async fn execute_with_retry(
    client: &Client,
    request: Request,
    platform: Platform,
    max_attempts: u32,
) -> Result<Response, PlatformError> {
    let max_attempts = max_attempts.max(1);
    let mut delay = INITIAL_RETRY_DELAY;
    let mut attempt = 1u32;

    loop {
        let Some(this_attempt) = request.try_clone() else {
            return Err(PlatformError::InvalidResponse {
                platform,
                message: "request body cannot be replayed".to_string(),
            });
        };

        match client.execute(this_attempt).await {
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::TOO_MANY_REQUESTS {
                    let retry_after = retry_after(&response);
                    return Err(PlatformError::RateLimited {
                        platform,
                        retry_after,
                    });
                }
                if is_transient_status(status) {
                    if attempt >= max_attempts {
                        return Err(PlatformError::Transient {
                            platform,
                            message: format!("upstream returned {status} after {attempt} attempts"),
                        });
                    }
                    debug!(
                        %platform,
                        %status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient upstream status, retrying"
                    );
                } else {
                    return Ok(response);
                }
            }
            Err(err) => {
                let retryable = err.is_timeout() || err.is_connect();
                if !retryable || attempt >= max_attempts {
                    return Err(PlatformError::Transient {
                        platform,
                        message: err.to_string(),
                    });
                }
                warn!(
                    %platform,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transport failure, retrying"
                );
            }
        }

        sleep(delay).await;
        delay = delay.saturating_mul(2);
        attempt += 1;
    }
}

/// Decode a JSON body, mapping failures to [`PlatformError::InvalidResponse`].
pub(crate) async fn decode_json<T: serde::de::DeserializeOwned>(
    response: Response,
    platform: Platform,
) -> Result<T, PlatformError> {
    response
        .json::<T>()
        .await
        .map_err(|e| PlatformError::InvalidResponse {
            platform,
            message: format!("undecodable payload: {e}"),
        })
}
