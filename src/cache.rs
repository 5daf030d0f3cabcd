//! Platform statistics cache over the shared key-value store.
//!
//! Keys are `(user, platform)` pairs; values are whole [`CacheEntry`]
//! snapshots, always replaced wholesale. Degradation is centralized here:
//! when the backing store is unavailable every operation returns a safe
//! default (miss / false / empty map), so call sites never special-case
//! connectivity. A cache outage means "always fetch fresh", never a failure.

use crate::config::platforms::PlatformsConfig;
use crate::kv::KeyValueStore;
use crate::model::{CacheEntry, Platform, PlatformStats, UserId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct PlatformCache {
    kv: Arc<dyn KeyValueStore>,
    platforms: PlatformsConfig,
}

impl PlatformCache {
    pub fn new(kv: Arc<dyn KeyValueStore>, platforms: PlatformsConfig) -> Self {
        Self { kv, platforms }
    }

    fn key(user_id: UserId, platform: Platform) -> String {
        format!("stats:{user_id}:{platform}")
    }

    fn ttl_for(&self, platform: Platform, ttl_override: Option<Duration>) -> Duration {
        ttl_override.unwrap_or_else(|| self.platforms.tuning(platform).cache_ttl())
    }

    /// Fetch the cached entry for one user, or `None` on miss, decode
    /// failure, or store outage.
    pub async fn get(&self, user_id: UserId, platform: Platform) -> Option<CacheEntry> {
        let key = Self::key(user_id, platform);
        match self.kv.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<CacheEntry>(&raw) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(%key, error = %err, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(%key, error = %err, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a fresh snapshot. Returns false (and logs) when the store is
    /// unavailable; callers proceed either way.
    pub async fn set(
        &self,
        user_id: UserId,
        platform: Platform,
        stats: &PlatformStats,
        ttl_override: Option<Duration>,
    ) -> bool {
        let entry = CacheEntry {
            stats: stats.clone(),
            cached_at: Utc::now(),
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%platform, error = %err, "Failed to encode cache entry");
                return false;
            }
        };

        let key = Self::key(user_id, platform);
        let ttl = self.ttl_for(platform, ttl_override);
        match self.kv.set(&key, raw, Some(ttl)).await {
            Ok(()) => true,
            Err(err) => {
                warn!(%key, error = %err, "Cache write failed, skipping");
                false
            }
        }
    }

    /// Fetch cached entries for many users at once. Users without a live
    /// entry are simply absent from the map.
    pub async fn get_bulk(
        &self,
        user_ids: &[UserId],
        platform: Platform,
    ) -> HashMap<UserId, CacheEntry> {
        let keys: Vec<String> = user_ids
            .iter()
            .map(|id| Self::key(*id, platform))
            .collect();

        let values = match self.kv.get_many(&keys).await {
            Ok(values) => values,
            Err(err) => {
                warn!(%platform, error = %err, "Bulk cache read failed, treating all as misses");
                return HashMap::new();
            }
        };

        let mut entries = HashMap::with_capacity(values.len());
        for (user_id, raw) in user_ids.iter().zip(values) {
            let Some(raw) = raw else { continue };
            match serde_json::from_str::<CacheEntry>(&raw) {
                Ok(entry) => {
                    entries.insert(*user_id, entry);
                }
                Err(err) => {
                    warn!(user_id = %user_id, %platform, error = %err, "Discarding undecodable cache entry");
                }
            }
        }
        entries
    }

    /// Store snapshots for many users at once, all under the same TTL.
    pub async fn set_bulk(
        &self,
        entries: &[(UserId, PlatformStats)],
        platform: Platform,
        ttl_override: Option<Duration>,
    ) -> bool {
        let cached_at = Utc::now();
        let mut encoded = Vec::with_capacity(entries.len());
        for (user_id, stats) in entries {
            let entry = CacheEntry {
                stats: stats.clone(),
                cached_at,
            };
            match serde_json::to_string(&entry) {
                Ok(raw) => encoded.push((Self::key(*user_id, platform), raw)),
                Err(err) => {
                    warn!(user_id = %user_id, %platform, error = %err, "Failed to encode cache entry");
                }
            }
        }

        let ttl = self.ttl_for(platform, ttl_override);
        match self.kv.set_many(encoded, Some(ttl)).await {
            Ok(()) => true,
            Err(err) => {
                warn!(%platform, error = %err, "Bulk cache write failed, skipping");
                false
            }
        }
    }

    /// Drop the cached entry for one platform, or for all platforms when
    /// `platform` is `None`. Returns true when every delete went through.
    pub async fn invalidate(&self, user_id: UserId, platform: Option<Platform>) -> bool {
        let platforms: &[Platform] = match platform {
            Some(ref p) => std::slice::from_ref(p),
            None => &Platform::ALL,
        };

        let mut all_ok = true;
        for platform in platforms {
            let key = Self::key(user_id, *platform);
            if let Err(err) = self.kv.delete(&key).await {
                warn!(%key, error = %err, "Cache invalidation failed");
                all_ok = false;
            }
        }
        all_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KvError;
    use crate::kv::{InMemoryKvStore, WindowCount};
    use crate::model::{GithubStats, LeetcodeStats};
    use async_trait::async_trait;
    use uuid::Uuid;

    struct DownKvStore;

    #[async_trait]
    impl KeyValueStore for DownKvStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
            Err(KvError::Unavailable("down".to_string()))
        }
        async fn set(
            &self,
            _key: &str,
            _value: String,
            _ttl: Option<Duration>,
        ) -> Result<(), KvError> {
            Err(KvError::Unavailable("down".to_string()))
        }
        async fn get_many(&self, _keys: &[String]) -> Result<Vec<Option<String>>, KvError> {
            Err(KvError::Unavailable("down".to_string()))
        }
        async fn set_many(
            &self,
            _entries: Vec<(String, String)>,
            _ttl: Option<Duration>,
        ) -> Result<(), KvError> {
            Err(KvError::Unavailable("down".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<bool, KvError> {
            Err(KvError::Unavailable("down".to_string()))
        }
        async fn incr_window(
            &self,
            _key: &str,
            _window: Duration,
        ) -> Result<WindowCount, KvError> {
            Err(KvError::Unavailable("down".to_string()))
        }
        async fn ping(&self) -> bool {
            false
        }
    }

    fn sample_stats() -> PlatformStats {
        PlatformStats::Leetcode(LeetcodeStats {
            total_solved: 321,
            easy_solved: 150,
            medium_solved: 140,
            hard_solved: 31,
            ranking: Some(54_321),
        })
    }

    fn memory_cache() -> PlatformCache {
        PlatformCache::new(Arc::new(InMemoryKvStore::new()), PlatformsConfig::default())
    }

    #[tokio::test]
    async fn test_set_then_get_round_trip() {
        let cache = memory_cache();
        let user = Uuid::new_v4();
        let stats = sample_stats();

        assert!(cache.set(user, Platform::Leetcode, &stats, None).await);

        let entry = cache.get(user, Platform::Leetcode).await.unwrap();
        assert_eq!(entry.stats, stats);

        // Other platforms are unaffected.
        assert!(cache.get(user, Platform::Github).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = memory_cache();
        let user = Uuid::new_v4();

        assert!(
            cache
                .set(
                    user,
                    Platform::Leetcode,
                    &sample_stats(),
                    Some(Duration::from_secs(10)),
                )
                .await
        );
        assert!(cache.get(user, Platform::Leetcode).await.is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(
            cache.get(user, Platform::Leetcode).await.is_none(),
            "expired entry must read as a miss"
        );
    }

    #[tokio::test]
    async fn test_bulk_round_trip_and_partial_hits() {
        let cache = memory_cache();
        let hit_a = Uuid::new_v4();
        let hit_b = Uuid::new_v4();
        let miss = Uuid::new_v4();

        let github = PlatformStats::Github(GithubStats {
            public_repos: 12,
            followers: 80,
            following: 5,
            public_gists: 3,
        });
        assert!(
            cache
                .set_bulk(
                    &[(hit_a, github.clone()), (hit_b, github.clone())],
                    Platform::Github,
                    None,
                )
                .await
        );

        let entries = cache
            .get_bulk(&[hit_a, miss, hit_b], Platform::Github)
            .await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.get(&hit_a).unwrap().stats, github);
        assert!(!entries.contains_key(&miss));
    }

    #[tokio::test]
    async fn test_invalidate_single_and_all_platforms() {
        let cache = memory_cache();
        let user = Uuid::new_v4();
        let stats = sample_stats();
        let github = PlatformStats::Github(GithubStats::default());

        cache.set(user, Platform::Leetcode, &stats, None).await;
        cache.set(user, Platform::Github, &github, None).await;

        assert!(cache.invalidate(user, Some(Platform::Leetcode)).await);
        assert!(cache.get(user, Platform::Leetcode).await.is_none());
        assert!(cache.get(user, Platform::Github).await.is_some());

        assert!(cache.invalidate(user, None).await);
        assert!(cache.get(user, Platform::Github).await.is_none());
    }

    #[tokio::test]
    async fn test_degrades_to_noops_when_store_down() {
        let cache = PlatformCache::new(Arc::new(DownKvStore), PlatformsConfig::default());
        let user = Uuid::new_v4();

        assert!(cache.get(user, Platform::Leetcode).await.is_none());
        assert!(!cache.set(user, Platform::Leetcode, &sample_stats(), None).await);
        assert!(cache.get_bulk(&[user], Platform::Leetcode).await.is_empty());
        assert!(
            !cache
                .set_bulk(&[(user, sample_stats())], Platform::Leetcode, None)
                .await
        );
        assert!(!cache.invalidate(user, None).await);
    }

    #[tokio::test]
    async fn test_undecodable_entry_reads_as_miss() {
        let kv = Arc::new(InMemoryKvStore::new());
        let cache = PlatformCache::new(Arc::clone(&kv) as Arc<dyn KeyValueStore>, PlatformsConfig::default());
        let user = Uuid::new_v4();

        kv.set(
            &format!("stats:{user}:leetcode"),
            "{not json".to_string(),
            None,
        )
        .await
        .unwrap();

        assert!(cache.get(user, Platform::Leetcode).await.is_none());
    }
}
