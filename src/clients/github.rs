//! GitHub client: REST `/users/{username}` profile lookups.

use super::http::{build_client, decode_json, execute_with_retry, retry_after};
use super::PlatformClient;
use crate::config::platforms::PlatformTuning;
use crate::error::PlatformError;
use crate::model::{GithubStats, Platform, PlatformStats};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

const PLATFORM: Platform = Platform::Github;

#[derive(Debug, Deserialize)]
struct GithubUserResponse {
    #[serde(default)]
    public_repos: u32,
    #[serde(default)]
    followers: u32,
    #[serde(default)]
    following: u32,
    #[serde(default)]
    public_gists: u32,
}

pub struct GithubClient {
    http: Client,
    base_url: String,
    retry_attempts: u32,
}

impl GithubClient {
    pub fn new(tuning: &PlatformTuning) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_client(PLATFORM, tuning)?,
            base_url: tuning.base_url.trim_end_matches('/').to_string(),
            retry_attempts: tuning.transport_retry_attempts,
        })
    }

    async fn get_user(&self, username: &str) -> Result<Response, PlatformError> {
        let request = self
            .http
            .get(format!("{}/users/{username}", self.base_url))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .build()
            .map_err(|e| PlatformError::Transient {
                platform: PLATFORM,
                message: e.to_string(),
            })?;

        let response =
            execute_with_retry(&self.http, request, PLATFORM, self.retry_attempts).await?;
        Self::classify_status(response)
    }

    /// GitHub signals primary rate limiting with 403 + `x-ratelimit-remaining: 0`
    /// rather than a plain 429; both must map to `RateLimited`, not to a
    /// username problem.
    fn classify_status(response: Response) -> Result<Response, PlatformError> {
        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => Err(PlatformError::NotFound { platform: PLATFORM }),
            StatusCode::FORBIDDEN => {
                let exhausted = response
                    .headers()
                    .get("x-ratelimit-remaining")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.trim() == "0")
                    .unwrap_or(false);
                if exhausted {
                    let retry_after = retry_after(&response);
                    Err(PlatformError::RateLimited {
                        platform: PLATFORM,
                        retry_after,
                    })
                } else {
                    Err(PlatformError::Transient {
                        platform: PLATFORM,
                        message: "forbidden".to_string(),
                    })
                }
            }
            status if !status.is_success() => Err(PlatformError::Transient {
                platform: PLATFORM,
                message: format!("users endpoint returned {status}"),
            }),
            _ => Ok(response),
        }
    }
}

#[async_trait]
impl PlatformClient for GithubClient {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    async fn fetch_stats(&self, username: &str) -> Result<PlatformStats, PlatformError> {
        let response = self.get_user(username).await?;
        let user: GithubUserResponse = decode_json(response, PLATFORM).await?;
        Ok(PlatformStats::Github(GithubStats {
            public_repos: user.public_repos,
            followers: user.followers,
            following: user.following,
            public_gists: user.public_gists,
        }))
    }

    async fn username_exists(&self, username: &str) -> Result<bool, PlatformError> {
        match self.get_user(username).await {
            Ok(_) => Ok(true),
            Err(PlatformError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
