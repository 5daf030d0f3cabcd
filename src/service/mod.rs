//! Sync service: the orchestration layer controllers call into.
//!
//! Owns the cache, concurrency limiter, updater, and metrics collector, and
//! exposes the refresh surface: single user / single platform, single user /
//! multiple platforms, bulk per room, cache invalidation, and service stats.

mod bulk;

pub use bulk::{BulkRefreshOptions, RoomRefreshOutcome};

use crate::cache::PlatformCache;
use crate::clients::ClientRegistry;
use crate::config::Config;
use crate::error::ServiceError;
use crate::kv::KeyValueStore;
use crate::limiter::{ConcurrencyLimiter, LimiterStatsSnapshot, OperationClass};
use crate::model::{Platform, RefreshReport, RefreshStatus, UserId, UserRecord};
use crate::stats::{SyncMetrics, SyncMetricsSnapshot};
use crate::store::{RoomDirectory, UserStore};
use crate::updater::{StatsUpdater, UpdateOptions};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of a single-user, single-platform refresh.
#[derive(Debug, Clone, Serialize)]
pub struct SingleRefreshOutcome {
    pub success: bool,
    pub from_cache: bool,
    pub report: RefreshReport,
    pub warnings: Vec<String>,
}

/// Outcome of refreshing one user across several platforms.
#[derive(Debug, Clone, Serialize)]
pub struct MultiPlatformOutcome {
    pub success: bool,
    pub user: UserRecord,
    pub reports: Vec<RefreshReport>,
    pub warnings: Vec<String>,
}

/// Combined service and concurrency statistics for observability.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatsReport {
    pub sync: SyncMetricsSnapshot,
    pub concurrency: LimiterStatsSnapshot,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub user_store: bool,
    pub kv_store: bool,
}

pub struct SyncService {
    store: Arc<dyn UserStore>,
    rooms: Arc<dyn RoomDirectory>,
    kv: Arc<dyn KeyValueStore>,
    cache: Arc<PlatformCache>,
    limiter: Arc<ConcurrencyLimiter>,
    updater: Arc<StatsUpdater>,
    metrics: Arc<SyncMetrics>,
    bulk: crate::config::BulkConfig,
}

impl SyncService {
    pub fn new(
        config: &Config,
        store: Arc<dyn UserStore>,
        rooms: Arc<dyn RoomDirectory>,
        kv: Arc<dyn KeyValueStore>,
        clients: Arc<ClientRegistry>,
    ) -> Arc<Self> {
        Self::with_metrics(config, store, rooms, kv, clients, Arc::new(SyncMetrics::new()))
    }

    /// Build with an injected metrics collector (tests use isolated ones).
    pub fn with_metrics(
        config: &Config,
        store: Arc<dyn UserStore>,
        rooms: Arc<dyn RoomDirectory>,
        kv: Arc<dyn KeyValueStore>,
        clients: Arc<ClientRegistry>,
        metrics: Arc<SyncMetrics>,
    ) -> Arc<Self> {
        let cache = Arc::new(PlatformCache::new(
            Arc::clone(&kv),
            config.platforms.clone(),
        ));
        let limiter = Arc::new(ConcurrencyLimiter::new(&config.concurrency));
        let updater = Arc::new(StatsUpdater::new(
            clients,
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&metrics),
            config.platforms.clone(),
        ));

        Arc::new(Self {
            store,
            rooms,
            kv,
            cache,
            limiter,
            updater,
            metrics,
            bulk: config.bulk,
        })
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    pub(crate) fn cache(&self) -> &Arc<PlatformCache> {
        &self.cache
    }

    pub(crate) fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    pub(crate) fn rooms(&self) -> &Arc<dyn RoomDirectory> {
        &self.rooms
    }

    pub(crate) fn updater(&self) -> &Arc<StatsUpdater> {
        &self.updater
    }

    pub(crate) const fn bulk_config(&self) -> &crate::config::BulkConfig {
        &self.bulk
    }

    /// Refresh one user's stats on one platform.
    pub async fn refresh_user_platform(
        &self,
        user_id: UserId,
        platform: Platform,
        opts: UpdateOptions,
    ) -> Result<SingleRefreshOutcome, ServiceError> {
        let user = self
            .store
            .find_by_id(&user_id)
            .await?
            .ok_or(ServiceError::UserNotFound(user_id))?;

        let result = self
            .limiter
            .run(OperationClass::Platform, || {
                self.updater.try_refresh(&user, platform, &opts)
            })
            .await;

        let report = match result {
            Ok(report) => report,
            Err(error) => RefreshReport {
                user_id,
                platform,
                status: RefreshStatus::ApiError {
                    message: error.to_string(),
                },
                identity: user.identity(platform).cloned(),
            },
        };

        let warnings = warning_for(&report).into_iter().collect();
        Ok(SingleRefreshOutcome {
            success: report.status.is_success(),
            from_cache: report.status.came_from_cache(),
            report,
            warnings,
        })
    }

    /// Refresh one user across several platforms, sequentially.
    ///
    /// Deliberately not concurrent: the platform list is bounded at three,
    /// and sequencing keeps one platform's failure fully isolated from the
    /// next without extra machinery.
    pub async fn update_user_platforms(
        &self,
        user_id: UserId,
        platforms: &[Platform],
        opts: UpdateOptions,
    ) -> Result<MultiPlatformOutcome, ServiceError> {
        let user = self
            .store
            .find_by_id(&user_id)
            .await?
            .ok_or(ServiceError::UserNotFound(user_id))?;

        let mut reports = Vec::with_capacity(platforms.len());
        let mut warnings = Vec::new();

        for &platform in platforms {
            let result = self
                .limiter
                .run(OperationClass::Platform, || {
                    self.updater.try_refresh(&user, platform, &opts)
                })
                .await;

            let report = match result {
                Ok(report) => report,
                Err(error) => RefreshReport {
                    user_id,
                    platform,
                    status: RefreshStatus::ApiError {
                        message: error.to_string(),
                    },
                    identity: user.identity(platform).cloned(),
                },
            };

            if let Some(warning) = warning_for(&report) {
                warnings.push(warning);
            }
            reports.push(report);
        }

        // Re-read so the merged record reflects every platform's update.
        let user = self
            .store
            .find_by_id(&user_id)
            .await?
            .ok_or(ServiceError::UserNotFound(user_id))?;

        Ok(MultiPlatformOutcome {
            success: reports.iter().all(|r| !r.status.is_failure()),
            user,
            reports,
            warnings,
        })
    }

    /// Drop cached stats for one platform, or all platforms when `platform`
    /// is `None`.
    pub async fn invalidate_cache(&self, user_id: UserId, platform: Option<Platform>) -> bool {
        self.cache.invalidate(user_id, platform).await
    }

    pub async fn service_stats(&self) -> ServiceStatsReport {
        ServiceStatsReport {
            sync: self.metrics.snapshot().await,
            concurrency: self.limiter.stats_snapshot().await,
        }
    }

    pub async fn health(&self) -> HealthReport {
        let user_store = self.store.health_check().await;
        let kv_store = self.kv.ping().await;
        HealthReport {
            // The kv store is best-effort by design; only the user store is
            // load-bearing for liveness.
            healthy: user_store,
            user_store,
            kv_store,
        }
    }
}

/// Actionable warning line for a failed per-item refresh, or `None` for
/// successes and skips.
pub(crate) fn warning_for(report: &RefreshReport) -> Option<String> {
    match &report.status {
        RefreshStatus::InvalidUsername => Some(format!(
            "user {}: {} username not found, update the linked account",
            report.user_id, report.platform
        )),
        RefreshStatus::RateLimited { retry_after_secs } => Some(match retry_after_secs {
            Some(secs) => format!(
                "user {}: {} rate limited, retry in {secs}s",
                report.user_id, report.platform
            ),
            None => format!(
                "user {}: {} rate limited, retry later",
                report.user_id, report.platform
            ),
        }),
        RefreshStatus::ApiError { message } => Some(format!(
            "user {}: {} fetch failed: {message}",
            report.user_id, report.platform
        )),
        _ => None,
    }
}
