//! Platform clients: one implementation per external service behind a
//! common trait.
//!
//! The error contract is the heart of this module: clients must raise
//! [`PlatformError::NotFound`] only when the platform itself confirms the
//! username does not exist, and classify everything else as rate limiting or
//! transient failure. The updater's invalidate-or-not branching is an
//! exhaustive match on that enum.

use crate::config::platforms::PlatformsConfig;
use crate::error::PlatformError;
use crate::model::{Platform, PlatformStats};
use async_trait::async_trait;
use std::sync::Arc;

mod http;

pub mod codeforces;
pub mod github;
pub mod leetcode;

pub use codeforces::CodeforcesClient;
pub use github::GithubClient;
pub use leetcode::LeetcodeClient;

/// Contract for fetching one user's statistics from an external platform.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn platform(&self) -> Platform;

    /// Fetch and normalize the user's statistics.
    async fn fetch_stats(&self, username: &str) -> Result<PlatformStats, PlatformError>;

    /// Lightweight existence check used by the validator job, cheaper than
    /// a full stats fetch where the platform allows it.
    async fn username_exists(&self, username: &str) -> Result<bool, PlatformError>;
}

/// One client per platform, dispatched by the closed `Platform` enum.
pub struct ClientRegistry {
    leetcode: Arc<dyn PlatformClient>,
    github: Arc<dyn PlatformClient>,
    codeforces: Arc<dyn PlatformClient>,
}

impl ClientRegistry {
    /// Build the production clients from configuration.
    pub fn from_config(platforms: &PlatformsConfig) -> anyhow::Result<Self> {
        Ok(Self {
            leetcode: Arc::new(LeetcodeClient::new(&platforms.leetcode)?),
            github: Arc::new(GithubClient::new(&platforms.github)?),
            codeforces: Arc::new(CodeforcesClient::new(&platforms.codeforces)?),
        })
    }

    /// Assemble a registry from explicit clients (tests inject scripted ones).
    pub fn new(
        leetcode: Arc<dyn PlatformClient>,
        github: Arc<dyn PlatformClient>,
        codeforces: Arc<dyn PlatformClient>,
    ) -> Self {
        Self {
            leetcode,
            github,
            codeforces,
        }
    }

    #[must_use]
    pub fn for_platform(&self, platform: Platform) -> Arc<dyn PlatformClient> {
        match platform {
            Platform::Leetcode => Arc::clone(&self.leetcode),
            Platform::Github => Arc::clone(&self.github),
            Platform::Codeforces => Arc::clone(&self.codeforces),
        }
    }
}
