//! Codeforces client: `api/user.info` handle lookups.
//!
//! The Codeforces API answers HTTP 200 for application-level failures and
//! carries the real verdict in `{"status": "FAILED", "comment": ...}`, so
//! the not-found detection has to inspect the comment text.

use super::http::{build_client, decode_json, execute_with_retry};
use super::PlatformClient;
use crate::config::platforms::PlatformTuning;
use crate::error::PlatformError;
use crate::model::{CodeforcesStats, Platform, PlatformStats};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const PLATFORM: Platform = Platform::Codeforces;

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    status: String,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    result: Option<Vec<ApiUser>>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    #[serde(default)]
    rating: Option<i32>,
    #[serde(default, rename = "maxRating")]
    max_rating: Option<i32>,
    #[serde(default)]
    rank: Option<String>,
    #[serde(default)]
    contribution: i32,
}

pub struct CodeforcesClient {
    http: Client,
    base_url: String,
    retry_attempts: u32,
}

impl CodeforcesClient {
    pub fn new(tuning: &PlatformTuning) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_client(PLATFORM, tuning)?,
            base_url: tuning.base_url.trim_end_matches('/').to_string(),
            retry_attempts: tuning.transport_retry_attempts,
        })
    }

    async fn user_info(&self, username: &str) -> Result<ApiUser, PlatformError> {
        let request = self
            .http
            .get(format!("{}/api/user.info", self.base_url))
            .query(&[("handles", username)])
            .build()
            .map_err(|e| PlatformError::Transient {
                platform: PLATFORM,
                message: e.to_string(),
            })?;

        let response =
            execute_with_retry(&self.http, request, PLATFORM, self.retry_attempts).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::Transient {
                platform: PLATFORM,
                message: format!("user.info returned {status}"),
            });
        }

        let envelope: ApiEnvelope = decode_json(response, PLATFORM).await?;
        if envelope.status != "OK" {
            let comment = envelope.comment.unwrap_or_default();
            if comment.to_ascii_lowercase().contains("not found") {
                return Err(PlatformError::NotFound { platform: PLATFORM });
            }
            return Err(PlatformError::InvalidResponse {
                platform: PLATFORM,
                message: format!("api status {}: {comment}", envelope.status),
            });
        }

        envelope
            .result
            .and_then(|mut users| (!users.is_empty()).then(|| users.remove(0)))
            .ok_or_else(|| PlatformError::InvalidResponse {
                platform: PLATFORM,
                message: "empty result set".to_string(),
            })
    }
}

#[async_trait]
impl PlatformClient for CodeforcesClient {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    async fn fetch_stats(&self, username: &str) -> Result<PlatformStats, PlatformError> {
        let user = self.user_info(username).await?;
        Ok(PlatformStats::Codeforces(CodeforcesStats {
            rating: user.rating,
            max_rating: user.max_rating,
            rank: user.rank,
            contribution: user.contribution,
        }))
    }

    async fn username_exists(&self, username: &str) -> Result<bool, PlatformError> {
        match self.user_info(username).await {
            Ok(_) => Ok(true),
            Err(PlatformError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
