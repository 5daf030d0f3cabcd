//! Core domain types: platforms, normalized statistics, and user identities.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type UserId = Uuid;
pub type RoomId = Uuid;

/// External platform whose user statistics are mirrored locally.
///
/// Closed set; dispatch is always an exhaustive match, never a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Leetcode,
    Github,
    Codeforces,
}

impl Platform {
    pub const ALL: [Self; 3] = [Self::Leetcode, Self::Github, Self::Codeforces];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Leetcode => "leetcode",
            Self::Github => "github",
            Self::Codeforces => "codeforces",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform '{0}', expected one of: leetcode, github, codeforces")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "leetcode" => Ok(Self::Leetcode),
            "github" => Ok(Self::Github),
            "codeforces" => Ok(Self::Codeforces),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

/// Normalized per-platform statistics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PlatformStats {
    Leetcode(LeetcodeStats),
    Github(GithubStats),
    Codeforces(CodeforcesStats),
}

impl PlatformStats {
    #[must_use]
    pub const fn platform(&self) -> Platform {
        match self {
            Self::Leetcode(_) => Platform::Leetcode,
            Self::Github(_) => Platform::Github,
            Self::Codeforces(_) => Platform::Codeforces,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeetcodeStats {
    pub total_solved: u32,
    pub easy_solved: u32,
    pub medium_solved: u32,
    pub hard_solved: u32,
    /// Global ranking; absent for accounts with no accepted submissions.
    pub ranking: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubStats {
    pub public_repos: u32,
    pub followers: u32,
    pub following: u32,
    pub public_gists: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeforcesStats {
    /// Current rating; unrated accounts have none.
    pub rating: Option<i32>,
    pub max_rating: Option<i32>,
    pub rank: Option<String>,
    pub contribution: i32,
}

/// Stored mapping from a local user to a username on one platform, plus
/// validity and freshness metadata. Mutated only by the stats updater and
/// the username validator job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformIdentity {
    pub username: Option<String>,
    pub is_valid: bool,
    pub last_validation_check: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_refresh_attempt: Option<DateTime<Utc>>,
    pub stats: Option<PlatformStats>,
}

impl Default for PlatformIdentity {
    fn default() -> Self {
        Self {
            username: None,
            is_valid: true,
            last_validation_check: None,
            last_updated: None,
            last_refresh_attempt: None,
            stats: None,
        }
    }
}

impl PlatformIdentity {
    #[must_use]
    pub fn with_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    /// Username with surrounding whitespace stripped; `None` when unset or blank.
    #[must_use]
    pub fn trimmed_username(&self) -> Option<&str> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// Whether `last_updated` falls within the freshness window.
    #[must_use]
    pub fn is_fresh(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.last_updated
            .map(|last| now - last < window)
            .unwrap_or(false)
    }

    /// Whether the invalid marker was confirmed recently enough to trust
    /// without another external call.
    #[must_use]
    pub fn invalid_recently_checked(&self, horizon: Duration, now: DateTime<Utc>) -> bool {
        !self.is_valid
            && self
                .last_validation_check
                .map(|checked| now - checked < horizon)
                .unwrap_or(false)
    }
}

/// Local user record as seen by this subsystem: id, display name, and one
/// identity slot per platform. The full user document lives in the external
/// document store; only the platform sub-fields are touched here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub identities: HashMap<Platform, PlatformIdentity>,
}

impl UserRecord {
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            identities: HashMap::new(),
        }
    }

    #[must_use]
    pub fn identity(&self, platform: Platform) -> Option<&PlatformIdentity> {
        self.identities.get(&platform)
    }

    #[must_use]
    pub fn username_for(&self, platform: Platform) -> Option<&str> {
        self.identities
            .get(&platform)
            .and_then(PlatformIdentity::trimmed_username)
    }
}

/// Cached normalized stats for one `(user, platform)` pair. Always replaced
/// wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub stats: PlatformStats,
    pub cached_at: DateTime<Utc>,
}

/// Outcome of one user/platform refresh attempt. Bulk callers always get a
/// value back; nothing in the refresh path panics or throws past this.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshStatus {
    /// Stats fetched from the platform and persisted.
    Updated,
    /// A cache entry satisfied the refresh; no external call.
    FromCache,
    /// `last_updated` is within the freshness window; nothing to do.
    Fresh,
    /// The user has no username configured for this platform.
    SkippedNoUsername,
    /// The platform confirmed the username does not exist.
    InvalidUsername,
    /// The platform rate limited the fetch; retry later.
    RateLimited { retry_after_secs: Option<u64> },
    /// Transient fetch or storage failure; identity left untouched.
    ApiError { message: String },
}

impl RefreshStatus {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Updated | Self::FromCache | Self::Fresh)
    }

    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::SkippedNoUsername)
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !self.is_success() && !self.is_skip()
    }

    #[must_use]
    pub const fn came_from_cache(&self) -> bool {
        matches!(self, Self::FromCache)
    }
}

/// Per-item result of a refresh, as returned to callers and aggregated into
/// bulk reports.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub user_id: UserId,
    pub platform: Platform,
    #[serde(flatten)]
    pub status: RefreshStatus,
    /// The identity after the refresh (absent when the user had none).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<PlatformIdentity>,
}

/// Aggregate counters for one bulk operation.
/// Invariants: `successful + failed + skipped == total`, `from_cache <= successful`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkCounts {
    pub total: usize,
    /// Items that were actually attempted (total minus skipped).
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub from_cache: usize,
}

/// Result of a bulk refresh: ordered per-item reports plus aggregate counts.
/// Ephemeral: returned to the caller, never persisted as-is.
#[derive(Debug, Clone, Serialize)]
pub struct BulkOperationResult {
    pub platform: Platform,
    /// One report per input user, in the caller's original order.
    pub outcomes: Vec<RefreshReport>,
    pub counts: BulkCounts,
    pub processing_time_ms: u64,
    /// Actionable per-user notes (invalid usernames, rate limits).
    pub warnings: Vec<String>,
}

/// Overall state of a room's last platform refresh, for UI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomUpdateStatus {
    Completed,
    CompletedWithErrors,
}

/// Summarized refresh status written back onto the room aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomPlatformStatus {
    pub update_status: RoomUpdateStatus,
    pub last_updated: DateTime<Utc>,
    pub last_results: BulkCounts,
}
