//! Bulk refresh orchestration: many users, one platform.
//!
//! A room-wide refresh can touch dozens of users against an external API
//! with unpublished rate limits. Three layers keep one click from tripping
//! abuse detection: the endpoint rate-limit gate ahead of this service,
//! cache-hit short-circuiting here, and the concurrency limiter's bounded,
//! batched fan-out underneath.

use super::{warning_for, SyncService};
use crate::error::ServiceError;
use crate::limiter::{BatchOptions, BatchProgress};
use crate::model::{
    BulkCounts, BulkOperationResult, Platform, RefreshReport, RefreshStatus, RoomId,
    RoomPlatformStatus, RoomUpdateStatus, UserId, UserRecord,
};
use crate::stats::SyncMetrics;
use crate::updater::UpdateOptions;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{info, warn};

/// Options for one bulk refresh call. Batch shaping defaults come from the
/// service's bulk configuration; callers may override per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkRefreshOptions {
    pub force: bool,
    pub batch_size: Option<usize>,
    pub max_retries: Option<u32>,
}

/// Outcome of a room-wide refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RoomRefreshOutcome {
    pub room_id: RoomId,
    pub result: BulkOperationResult,
}

impl SyncService {
    /// Refresh many users' stats on one platform.
    ///
    /// Users without a username are counted as skipped; per-user failures
    /// are folded into the result, never raised. The returned outcome list
    /// has one entry per input user in the caller's original order. Only
    /// structural problems (empty input, storage failure) produce an `Err`.
    pub async fn bulk_update_platform_stats(
        &self,
        user_ids: &[UserId],
        platform: Platform,
        opts: BulkRefreshOptions,
        progress: Option<UnboundedSender<BatchProgress>>,
    ) -> Result<BulkOperationResult, ServiceError> {
        if user_ids.is_empty() {
            return Err(ServiceError::EmptyBulkRequest);
        }

        SyncMetrics::increment(&self.metrics().bulk_operations);
        let started = Instant::now();
        let total = user_ids.len();

        let users = self.store().find_by_ids(user_ids).await?;

        let mut slots: Vec<Option<RefreshReport>> = vec![None; total];
        let mut fetch_items: Vec<(usize, UserRecord)> = Vec::new();

        for (index, user_id) in user_ids.iter().enumerate() {
            match users.get(user_id) {
                None => {
                    // A vanished user record is a caller-side inconsistency;
                    // surfaced per item so the rest of the room still refreshes.
                    slots[index] = Some(RefreshReport {
                        user_id: *user_id,
                        platform,
                        status: RefreshStatus::ApiError {
                            message: "user record not found".to_string(),
                        },
                        identity: None,
                    });
                }
                Some(user) if user.username_for(platform).is_none() => {
                    SyncMetrics::increment(&self.metrics().skipped_no_username);
                    slots[index] = Some(RefreshReport {
                        user_id: *user_id,
                        platform,
                        status: RefreshStatus::SkippedNoUsername,
                        identity: None,
                    });
                }
                Some(user) => fetch_items.push((index, user.clone())),
            }
        }

        // Cache phase: bulk-look up every candidate, apply hits directly,
        // and narrow the fetch set to the misses.
        if !opts.force && !fetch_items.is_empty() {
            fetch_items = self.apply_bulk_cache_hits(platform, fetch_items, &mut slots).await;
        }

        // Fetch phase: everything still unresolved goes through the
        // concurrency limiter with operation-level retry.
        if !fetch_items.is_empty() {
            let batch_opts = BatchOptions {
                batch_size: Some(opts.batch_size.unwrap_or(self.bulk_config().batch_size).max(1)),
                batch_delay: self.bulk_config().batch_delay(),
                max_retries: opts.max_retries.unwrap_or(self.bulk_config().max_retries),
                retry_delay: self.bulk_config().retry_delay(),
            };
            // The bulk cache lookup already ran; per-item refreshes go
            // straight to the network path.
            let item_opts = UpdateOptions {
                force: opts.force,
                use_cache: false,
            };

            let indices: Vec<usize> = fetch_items.iter().map(|(index, _)| *index).collect();
            let ids: Vec<UserId> = fetch_items.iter().map(|(_, user)| user.id).collect();
            let users_to_fetch: Vec<UserRecord> =
                fetch_items.into_iter().map(|(_, user)| user).collect();

            let updater = Arc::clone(self.updater());
            let outcome = self
                .limiter()
                .run_platform_batch(
                    platform,
                    users_to_fetch,
                    move |user| {
                        let updater = Arc::clone(&updater);
                        async move { updater.try_refresh(&user, platform, &item_opts).await }
                    },
                    batch_opts,
                    progress,
                )
                .await;

            for (position, result) in outcome.results.into_iter().enumerate() {
                let (Some(&index), Some(&user_id)) = (indices.get(position), ids.get(position))
                else {
                    continue;
                };
                let report = match result {
                    Ok(report) => report,
                    Err(error) => RefreshReport {
                        user_id,
                        platform,
                        status: RefreshStatus::ApiError {
                            message: error.to_string(),
                        },
                        identity: None,
                    },
                };
                if let Some(slot) = slots.get_mut(index) {
                    *slot = Some(report);
                }
            }
        }

        let outcomes: Vec<RefreshReport> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| RefreshReport {
                    user_id: user_ids.get(index).copied().unwrap_or_default(),
                    platform,
                    status: RefreshStatus::ApiError {
                        message: "refresh never settled".to_string(),
                    },
                    identity: None,
                })
            })
            .collect();

        let mut counts = BulkCounts {
            total,
            ..BulkCounts::default()
        };
        let mut warnings = Vec::new();
        for report in &outcomes {
            if report.status.is_success() {
                counts.successful += 1;
                if report.status.came_from_cache() {
                    counts.from_cache += 1;
                }
            } else if report.status.is_skip() {
                counts.skipped += 1;
            } else {
                counts.failed += 1;
            }
            if let Some(warning) = warning_for(report) {
                warnings.push(warning);
            }
        }
        counts.processed = counts.total - counts.skipped;

        let processing_time = started.elapsed();
        info!(
            %platform,
            total = counts.total,
            successful = counts.successful,
            failed = counts.failed,
            skipped = counts.skipped,
            from_cache = counts.from_cache,
            elapsed_ms = processing_time.as_millis() as u64,
            "Bulk platform refresh finished"
        );

        Ok(BulkOperationResult {
            platform,
            outcomes,
            counts,
            processing_time_ms: processing_time.as_millis() as u64,
            warnings,
        })
    }

    async fn apply_bulk_cache_hits(
        &self,
        platform: Platform,
        fetch_items: Vec<(usize, UserRecord)>,
        slots: &mut [Option<RefreshReport>],
    ) -> Vec<(usize, UserRecord)> {
        let candidate_ids: Vec<UserId> = fetch_items.iter().map(|(_, user)| user.id).collect();
        let hits = self.cache().get_bulk(&candidate_ids, platform).await;

        let mut misses = Vec::with_capacity(fetch_items.len());
        for (index, user) in fetch_items {
            match hits.get(&user.id) {
                Some(entry) => {
                    SyncMetrics::increment(&self.metrics().cache_hits);
                    let identity = user.identity(platform).cloned().unwrap_or_default();
                    let report = self
                        .updater()
                        .apply_cached(&user, platform, &identity, entry)
                        .await;
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(report);
                    }
                }
                None => {
                    SyncMetrics::increment(&self.metrics().cache_misses);
                    misses.push((index, user));
                }
            }
        }
        misses
    }

    /// Refresh every member of a room on one platform and write the
    /// summarized status back onto the room aggregate.
    ///
    /// When `user_ids` is provided it overrides the room's member list
    /// (controllers pass the subset they already resolved).
    pub async fn bulk_refresh_room(
        &self,
        room_id: RoomId,
        platform: Platform,
        user_ids: Option<Vec<UserId>>,
        opts: BulkRefreshOptions,
        progress: Option<UnboundedSender<BatchProgress>>,
    ) -> Result<RoomRefreshOutcome, ServiceError> {
        let members = match user_ids {
            Some(ids) if !ids.is_empty() => ids,
            _ => self
                .rooms()
                .member_ids(&room_id)
                .await?
                .ok_or(ServiceError::RoomNotFound(room_id))?,
        };

        let result = self
            .bulk_update_platform_stats(&members, platform, opts, progress)
            .await?;

        let status = RoomPlatformStatus {
            update_status: if result.counts.failed == 0 {
                RoomUpdateStatus::Completed
            } else {
                RoomUpdateStatus::CompletedWithErrors
            },
            last_updated: Utc::now(),
            last_results: result.counts,
        };
        // The refresh already happened; a failed status write must not
        // undo it. The blob is display-only.
        if let Err(err) = self
            .rooms()
            .record_platform_status(&room_id, platform, status)
            .await
        {
            warn!(%room_id, %platform, error = %err, "Failed to record room refresh status");
        }

        Ok(RoomRefreshOutcome { room_id, result })
    }
}
