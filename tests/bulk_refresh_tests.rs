//! Integration tests for bulk and room-wide refresh orchestration.


use chrono::Utc;
use stat_sync_server::error::{PlatformError, ServiceError};
use stat_sync_server::kv::KeyValueStore;
use stat_sync_server::model::{
    CacheEntry, Platform, PlatformIdentity, RefreshStatus, RoomUpdateStatus, UserId,
};
use stat_sync_server::service::BulkRefreshOptions;
use stat_sync_server::store::{RoomDirectory, UserStore};
use test_helpers::{build_harness, default_stats_for, harness, test_config, TestHarness};
use uuid::Uuid;

fn stale_identity(username: &str) -> PlatformIdentity {
    let mut identity = PlatformIdentity::with_username(username);
    identity.last_updated = Some(Utc::now() - chrono::Duration::hours(5));
    identity
}

/// Seed a live cache entry directly in the shared kv store.
async fn seed_cache(h: &TestHarness, user_id: UserId, platform: Platform) {
    let entry = CacheEntry {
        stats: default_stats_for(platform),
        cached_at: Utc::now() - chrono::Duration::minutes(5),
    };
    h.kv.set(
        &format!("stats:{user_id}:{platform}"),
        serde_json::to_string(&entry).unwrap(),
        None,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_bulk_preserves_input_order_across_mixed_outcomes() {
    let h = harness();
    let platform = Platform::Leetcode;

    // One of each kind, deliberately interleaved.
    let cache_hit = h
        .add_user_with_identity(platform, stale_identity("cached"))
        .await;
    seed_cache(&h, cache_hit.id, platform).await;

    let no_username = h.add_user(platform, None).await;
    let fetched = h.add_user(platform, Some("fetch_me")).await;

    let failing = h.add_user(platform, Some("flaky")).await;
    // max_retries=1 in the test config: two transient responses exhaust it.
    h.leetcode.script(
        "flaky",
        vec![
            Err(PlatformError::Transient {
                platform,
                message: "502".to_string(),
            }),
            Err(PlatformError::Transient {
                platform,
                message: "502 again".to_string(),
            }),
        ],
    );

    let invalid = h.add_user(platform, Some("ghost")).await;
    h.leetcode
        .script("ghost", vec![Err(PlatformError::NotFound { platform })]);

    let input = vec![cache_hit.id, no_username.id, fetched.id, failing.id, invalid.id];
    let result = h
        .service
        .bulk_update_platform_stats(&input, platform, BulkRefreshOptions::default(), None)
        .await
        .unwrap();

    // Length N, original order, regardless of completion order.
    assert_eq!(result.outcomes.len(), input.len());
    let returned: Vec<UserId> = result.outcomes.iter().map(|r| r.user_id).collect();
    assert_eq!(returned, input);

    assert_eq!(result.outcomes[0].status, RefreshStatus::FromCache);
    assert_eq!(result.outcomes[1].status, RefreshStatus::SkippedNoUsername);
    assert_eq!(result.outcomes[2].status, RefreshStatus::Updated);
    assert!(matches!(
        result.outcomes[3].status,
        RefreshStatus::ApiError { .. }
    ));
    assert_eq!(result.outcomes[4].status, RefreshStatus::InvalidUsername);
}

#[tokio::test]
async fn test_bulk_aggregate_count_invariants() {
    let h = harness();
    let platform = Platform::Github;

    let mut input = Vec::new();
    for i in 0..4 {
        let user = h.add_user(platform, Some(&format!("user{i}"))).await;
        input.push(user.id);
    }
    let cached = h
        .add_user_with_identity(platform, stale_identity("cached"))
        .await;
    seed_cache(&h, cached.id, platform).await;
    input.push(cached.id);
    input.push(h.add_user(platform, None).await.id);

    h.github
        .script("user2", vec![Err(PlatformError::NotFound { platform })]);

    let result = h
        .service
        .bulk_update_platform_stats(&input, platform, BulkRefreshOptions::default(), None)
        .await
        .unwrap();

    let counts = result.counts;
    assert_eq!(counts.total, 6);
    assert_eq!(
        counts.successful + counts.failed + counts.skipped,
        counts.total,
        "successful + failed + skipped must equal total"
    );
    assert!(counts.from_cache <= counts.successful);
    assert_eq!(counts.processed, counts.total - counts.skipped);
    assert_eq!(counts.skipped, 1);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.from_cache, 1);
    assert_eq!(counts.successful, 4);
}

#[tokio::test]
async fn test_room_refresh_scenario_mixed_membership() {
    let h = harness();
    let platform = Platform::Leetcode;

    // Room of 5: two without a leetcode username, one invalid, two valid.
    let no_name_a = h.add_user(platform, None).await;
    let no_name_b = h.add_user(platform, None).await;
    let invalid = h.add_user(platform, Some("ghost")).await;
    h.leetcode
        .script("ghost", vec![Err(PlatformError::NotFound { platform })]);
    let valid_a = h.add_user(platform, Some("alice")).await;
    let valid_b = h.add_user(platform, Some("bob")).await;

    let room_id = Uuid::new_v4();
    h.rooms
        .insert_room(
            room_id,
            vec![no_name_a.id, no_name_b.id, invalid.id, valid_a.id, valid_b.id],
        )
        .await;

    let outcome = h
        .service
        .bulk_refresh_room(
            room_id,
            platform,
            None,
            BulkRefreshOptions::default(),
            None,
        )
        .await
        .unwrap();

    let counts = outcome.result.counts;
    assert_eq!(counts.total, 5);
    assert_eq!(counts.skipped, 2);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.successful, 2);

    // The invalid username produced an actionable warning.
    assert!(outcome
        .result
        .warnings
        .iter()
        .any(|w| w.contains("username not found")));

    // The summarized status blob landed on the room aggregate.
    let status = h
        .rooms
        .platform_status(&room_id, platform)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.update_status, RoomUpdateStatus::CompletedWithErrors);
    assert_eq!(status.last_results, counts);
}

#[tokio::test]
async fn test_room_refresh_all_successful_marks_completed() {
    let h = harness();
    let platform = Platform::Codeforces;
    let a = h.add_user(platform, Some("alpha")).await;
    let b = h.add_user(platform, Some("beta")).await;

    let room_id = Uuid::new_v4();
    h.rooms.insert_room(room_id, vec![a.id, b.id]).await;

    let outcome = h
        .service
        .bulk_refresh_room(room_id, platform, None, BulkRefreshOptions::default(), None)
        .await
        .unwrap();
    assert_eq!(outcome.result.counts.failed, 0);

    let status = h
        .rooms
        .platform_status(&room_id, platform)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.update_status, RoomUpdateStatus::Completed);
}

#[tokio::test]
async fn test_bulk_cache_hits_skip_external_calls() {
    let h = harness();
    let platform = Platform::Leetcode;

    let mut input = Vec::new();
    for name in ["hit_a", "hit_b"] {
        let user = h.add_user_with_identity(platform, stale_identity(name)).await;
        seed_cache(&h, user.id, platform).await;
        input.push(user.id);
    }
    let miss = h.add_user(platform, Some("miss")).await;
    input.push(miss.id);

    let result = h
        .service
        .bulk_update_platform_stats(&input, platform, BulkRefreshOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(result.counts.from_cache, 2);
    assert_eq!(result.counts.successful, 3);
    assert_eq!(
        h.leetcode.fetch_call_count(),
        1,
        "only the cache miss may reach the platform"
    );

    // Cache hits were written through to the persistent store.
    let stored = h.store.find_by_id(&input[0]).await.unwrap().unwrap();
    assert!(stored.identity(platform).unwrap().stats.is_some());
}

#[tokio::test]
async fn test_bulk_forced_ignores_cache_entirely() {
    let h = harness();
    let platform = Platform::Leetcode;

    let user = h.add_user_with_identity(platform, stale_identity("cached")).await;
    seed_cache(&h, user.id, platform).await;

    let result = h
        .service
        .bulk_update_platform_stats(
            &[user.id],
            platform,
            BulkRefreshOptions {
                force: true,
                ..BulkRefreshOptions::default()
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.counts.from_cache, 0);
    assert_eq!(h.leetcode.fetch_call_count(), 1);
}

#[tokio::test]
async fn test_empty_bulk_request_is_structural_error() {
    let h = harness();
    let result = h
        .service
        .bulk_update_platform_stats(&[], Platform::Github, BulkRefreshOptions::default(), None)
        .await;
    assert!(matches!(result, Err(ServiceError::EmptyBulkRequest)));
}

#[tokio::test]
async fn test_unknown_room_is_structural_error() {
    let h = harness();
    let result = h
        .service
        .bulk_refresh_room(
            Uuid::new_v4(),
            Platform::Github,
            None,
            BulkRefreshOptions::default(),
            None,
        )
        .await;
    assert!(matches!(result, Err(ServiceError::RoomNotFound(_))));
}

#[tokio::test]
async fn test_vanished_user_record_fails_item_not_batch() {
    let h = harness();
    let platform = Platform::Github;
    let real = h.add_user(platform, Some("alice")).await;
    let vanished = Uuid::new_v4();

    let result = h
        .service
        .bulk_update_platform_stats(
            &[vanished, real.id],
            platform,
            BulkRefreshOptions::default(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.counts.failed, 1);
    assert_eq!(result.counts.successful, 1);
    assert!(matches!(
        result.outcomes[0].status,
        RefreshStatus::ApiError { .. }
    ));
    assert_eq!(result.outcomes[1].status, RefreshStatus::Updated);
}

#[tokio::test]
async fn test_progress_events_cover_fetched_items() {
    let h = harness();
    let platform = Platform::Codeforces;

    let mut input = Vec::new();
    for i in 0..4 {
        input.push(h.add_user(platform, Some(&format!("cf{i}"))).await.id);
    }
    // A skipped user emits no progress: progress tracks dispatched work.
    input.push(h.add_user(platform, None).await.id);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let result = h
        .service
        .bulk_update_platform_stats(&input, platform, BulkRefreshOptions::default(), Some(tx))
        .await
        .unwrap();
    assert_eq!(result.counts.successful, 4);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| e.total == 4));
    let mut completed: Vec<usize> = events.iter().map(|e| e.completed).collect();
    completed.sort_unstable();
    assert_eq!(completed, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_bulk_respects_platform_concurrency_cap() {
    let mut config = test_config();
    config.concurrency.platform = 3;
    config.bulk.batch_size = 12;
    let h = build_harness(config);
    let platform = Platform::Leetcode;

    h.leetcode.set_delay(std::time::Duration::from_millis(20));

    let mut input = Vec::new();
    for i in 0..12 {
        input.push(h.add_user(platform, Some(&format!("u{i}"))).await.id);
    }

    let result = h
        .service
        .bulk_update_platform_stats(&input, platform, BulkRefreshOptions::default(), None)
        .await
        .unwrap();
    assert_eq!(result.counts.successful, 12);

    let observed = h.leetcode.concurrency_high_water();
    assert!(
        observed <= 3,
        "observed {observed} concurrent fetches, cap is 3"
    );
}

#[tokio::test]
async fn test_bulk_retry_recovers_transient_failure() {
    let h = harness();
    let platform = Platform::Github;

    let user = h.add_user(platform, Some("recovers")).await;
    // First attempt fails transiently, the operation-level retry succeeds.
    h.github.script(
        "recovers",
        vec![Err(PlatformError::Transient {
            platform,
            message: "503".to_string(),
        })],
    );

    let result = h
        .service
        .bulk_update_platform_stats(&[user.id], platform, BulkRefreshOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(result.counts.successful, 1);
    assert_eq!(h.github.fetch_call_count(), 2, "one retry after the failure");
}
