//! LeetCode client: GraphQL `matchedUser` queries against the public API.

use super::http::{build_client, decode_json, execute_with_retry};
use super::PlatformClient;
use crate::config::platforms::PlatformTuning;
use crate::error::PlatformError;
use crate::model::{LeetcodeStats, Platform, PlatformStats};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const PLATFORM: Platform = Platform::Leetcode;

const USER_PROFILE_QUERY: &str = "\
query userProfile($username: String!) {\n\
  matchedUser(username: $username) {\n\
    username\n\
    profile { ranking }\n\
    submitStatsGlobal { acSubmissionNum { difficulty count } }\n\
  }\n\
}";

const USER_EXISTS_QUERY: &str = "\
query userExists($username: String!) {\n\
  matchedUser(username: $username) { username }\n\
}";

pub struct LeetcodeClient {
    http: Client,
    base_url: String,
    retry_attempts: u32,
}

impl LeetcodeClient {
    pub fn new(tuning: &PlatformTuning) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_client(PLATFORM, tuning)?,
            base_url: tuning.base_url.trim_end_matches('/').to_string(),
            retry_attempts: tuning.transport_retry_attempts,
        })
    }

    /// Run a GraphQL query and return the `matchedUser` node, or `NotFound`
    /// when the API resolves it to null (LeetCode's "no such user" answer;
    /// the HTTP status is 200 either way).
    async fn matched_user(&self, query: &str, username: &str) -> Result<Value, PlatformError> {
        let body = json!({
            "query": query,
            "variables": { "username": username },
        });
        let request = self
            .http
            .post(format!("{}/graphql", self.base_url))
            .json(&body)
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
                message: format!("graphql endpoint returned {status}"),
            });
        }

        let payload: Value = decode_json(response, PLATFORM).await?;
        match payload.pointer("/data/matchedUser") {
            Some(user) if !user.is_null() => Ok(user.clone()),
            _ => Err(PlatformError::NotFound { platform: PLATFORM }),
        }
    }
}

fn parse_stats(user: &Value) -> Result<LeetcodeStats, PlatformError> {
    let submissions = user
        .pointer("/submitStatsGlobal/acSubmissionNum")
        .and_then(Value::as_array)
        .ok_or_else(|| PlatformError::InvalidResponse {
            platform: PLATFORM,
            message: "missing submitStatsGlobal.acSubmissionNum".to_string(),
        })?;

    let mut stats = LeetcodeStats {
        ranking: user.pointer("/profile/ranking").and_then(Value::as_u64),
        ..LeetcodeStats::default()
    };

    for entry in submissions {
        let count = entry.get("count").and_then(Value::as_u64).unwrap_or(0) as u32;
        match entry.get("difficulty").and_then(Value::as_str) {
            Some("All") => stats.total_solved = count,
            Some("Easy") => stats.easy_solved = count,
            Some("Medium") => stats.medium_solved = count,
            Some("Hard") => stats.hard_solved = count,
            _ => {}
        }
    }

    Ok(stats)
}

#[async_trait]
impl PlatformClient for LeetcodeClient {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    async fn fetch_stats(&self, username: &str) -> Result<PlatformStats, PlatformError> {
        let user = self.matched_user(USER_PROFILE_QUERY, username).await?;
        Ok(PlatformStats::Leetcode(parse_stats(&user)?))
    }

    async fn username_exists(&self, username: &str) -> Result<bool, PlatformError> {
        match self.matched_user(USER_EXISTS_QUERY, username).await {
            Ok(_) => Ok(true),
            Err(PlatformError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
