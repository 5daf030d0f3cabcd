//! Per-platform stats updater: the refresh state machine.
//!
//! One updater serves all platforms; the platform is a parameter and the
//! client is resolved through the registry. The order of the short-circuits
//! is what protects external API quota: no-username and known-invalid
//! identities and still-fresh data never reach the network.

use crate::cache::PlatformCache;
use crate::clients::ClientRegistry;
use crate::config::platforms::PlatformsConfig;
use crate::error::PlatformError;
use crate::model::{
    CacheEntry, Platform, PlatformIdentity, RefreshReport, RefreshStatus, UserRecord,
};
use crate::stats::SyncMetrics;
use crate::store::UserStore;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Options for one refresh call.
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Bypass the known-invalid, freshness, and cache short-circuits.
    pub force: bool,
    /// Consult the platform cache before fetching.
    pub use_cache: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            force: false,
            use_cache: true,
        }
    }
}

pub struct StatsUpdater {
    clients: Arc<ClientRegistry>,
    store: Arc<dyn UserStore>,
    cache: Arc<PlatformCache>,
    metrics: Arc<SyncMetrics>,
    platforms: PlatformsConfig,
}

impl StatsUpdater {
    pub fn new(
        clients: Arc<ClientRegistry>,
        store: Arc<dyn UserStore>,
        cache: Arc<PlatformCache>,
        metrics: Arc<SyncMetrics>,
        platforms: PlatformsConfig,
    ) -> Self {
        Self {
            clients,
            store,
            cache,
            metrics,
            platforms,
        }
    }

    /// Refresh one user's stats on one platform, always producing a report.
    /// Transient failures surface as [`RefreshStatus::ApiError`].
    pub async fn refresh(
        &self,
        user: &UserRecord,
        platform: Platform,
        opts: &UpdateOptions,
    ) -> RefreshReport {
        match self.try_refresh(user, platform, opts).await {
            Ok(report) => report,
            Err(error) => RefreshReport {
                user_id: user.id,
                platform,
                status: RefreshStatus::ApiError {
                    message: error.to_string(),
                },
                identity: user.identity(platform).cloned(),
            },
        }
    }

    /// Refresh with transient failures left as `Err` so the concurrency
    /// limiter's operation-level retry can take another swing. Terminal
    /// outcomes (skip, invalid username, rate limit, success) are always
    /// `Ok`; retrying them would be wasted or harmful work.
    pub async fn try_refresh(
        &self,
        user: &UserRecord,
        platform: Platform,
        opts: &UpdateOptions,
    ) -> Result<RefreshReport, PlatformError> {
        let identity = user.identity(platform).cloned().unwrap_or_default();
        let report = |status: RefreshStatus, identity: Option<PlatformIdentity>| RefreshReport {
            user_id: user.id,
            platform,
            status,
            identity,
        };

        let Some(username) = identity.trimmed_username().map(str::to_string) else {
            SyncMetrics::increment(&self.metrics.skipped_no_username);
            return Ok(report(RefreshStatus::SkippedNoUsername, None));
        };

        let now = Utc::now();

        // A username the platform already disowned is not re-checked until
        // the recheck horizon elapses or the caller forces it.
        if !opts.force
            && identity.invalid_recently_checked(self.platforms.invalid_recheck_horizon(), now)
        {
            SyncMetrics::increment(&self.metrics.invalid_short_circuits);
            debug!(user_id = %user.id, %platform, "Skipping known-invalid username");
            return Ok(report(RefreshStatus::InvalidUsername, Some(identity)));
        }

        let tuning = self.platforms.tuning(platform);
        if !opts.force && identity.is_fresh(tuning.freshness_window(), now) {
            SyncMetrics::increment(&self.metrics.freshness_short_circuits);
            return Ok(report(RefreshStatus::Fresh, Some(identity)));
        }

        if opts.use_cache && !opts.force {
            if let Some(entry) = self.cache.get(user.id, platform).await {
                SyncMetrics::increment(&self.metrics.cache_hits);
                let applied = self.apply_cached(user, platform, &identity, &entry).await;
                return Ok(applied);
            }
            SyncMetrics::increment(&self.metrics.cache_misses);
        }

        if let Err(err) = self
            .store
            .stamp_refresh_attempt(&user.id, platform, now)
            .await
        {
            warn!(user_id = %user.id, %platform, error = %err, "Failed to stamp refresh attempt");
        }

        SyncMetrics::increment(&self.metrics.external_fetches);
        let fetch_started = Instant::now();
        let fetched = self
            .clients
            .for_platform(platform)
            .fetch_stats(&username)
            .await;
        self.metrics
            .record_fetch_latency(platform, fetch_started.elapsed())
            .await;

        match fetched {
            Ok(stats) => {
                let mut updated = identity;
                updated.stats = Some(stats.clone());
                updated.last_updated = Some(Utc::now());
                updated.last_refresh_attempt = Some(now);
                updated.is_valid = true;

                if let Err(err) = self
                    .store
                    .update_platform_identity(&user.id, platform, updated.clone())
                    .await
                {
                    warn!(user_id = %user.id, %platform, error = %err, "Failed to persist fetched stats");
                    return Ok(report(
                        RefreshStatus::ApiError {
                            message: format!("failed to persist stats: {err}"),
                        },
                        Some(updated),
                    ));
                }

                self.cache.set(user.id, platform, &stats, None).await;
                Ok(report(RefreshStatus::Updated, Some(updated)))
            }
            Err(PlatformError::NotFound { .. }) => {
                SyncMetrics::increment(&self.metrics.invalid_usernames);
                let checked_at = Utc::now();
                if let Err(err) = self
                    .store
                    .set_identity_validity(&user.id, platform, false, checked_at)
                    .await
                {
                    warn!(user_id = %user.id, %platform, error = %err, "Failed to mark username invalid");
                }
                let mut updated = identity;
                updated.is_valid = false;
                updated.last_validation_check = Some(checked_at);
                Ok(report(RefreshStatus::InvalidUsername, Some(updated)))
            }
            Err(PlatformError::RateLimited { retry_after, .. }) => {
                SyncMetrics::increment(&self.metrics.rate_limited_fetches);
                // No identity mutation: the username is fine, the quota is not.
                Ok(report(
                    RefreshStatus::RateLimited {
                        retry_after_secs: retry_after.map(|d| d.as_secs()),
                    },
                    Some(identity),
                ))
            }
            Err(error) => {
                SyncMetrics::increment(&self.metrics.fetch_failures);
                // Identity and last_updated stay untouched so the next
                // attempt runs the full path again.
                Err(error)
            }
        }
    }

    /// Apply a cache hit: write the cached stats through to the user store
    /// so restarted processes converge. `last_updated` is taken from the
    /// entry's `cached_at` to keep staleness semantics truthful.
    pub async fn apply_cached(
        &self,
        user: &UserRecord,
        platform: Platform,
        identity: &PlatformIdentity,
        entry: &CacheEntry,
    ) -> RefreshReport {
        let mut updated = identity.clone();
        updated.stats = Some(entry.stats.clone());
        updated.last_updated = Some(entry.cached_at);
        updated.is_valid = true;

        if let Err(err) = self
            .store
            .update_platform_identity(&user.id, platform, updated.clone())
            .await
        {
            warn!(user_id = %user.id, %platform, error = %err, "Failed to write cached stats through");
        }

        RefreshReport {
            user_id: user.id,
            platform,
            status: RefreshStatus::FromCache,
            identity: Some(updated),
        }
    }
}
