//! Shared key-value store abstraction backing the platform cache and the
//! rate limiter.
//!
//! Production deployments point this at an external store; the in-memory
//! implementation serves single-instance deployments and tests. Every
//! mutating operation is atomic per key so concurrent callers never observe
//! half-written values or corrupted counters.

use crate::error::KvError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Counter state returned by [`KeyValueStore::incr_window`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Counter value after this increment.
    pub count: u64,
    /// Time remaining until the window resets.
    pub remaining_window: Duration,
}

/// Key-value store contract.
///
/// Values are opaque strings (callers serialize JSON). `incr_window` is the
/// increment-and-expire primitive the rate limiter depends on: the counter
/// bump and the window expiry are established in one store-side operation,
/// the equivalent of a Lua-scripted INCR+EXPIRE.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), KvError>;

    /// Fetch many keys at once; the result aligns with the input order.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError>;

    async fn set_many(
        &self,
        entries: Vec<(String, String)>,
        ttl: Option<Duration>,
    ) -> Result<(), KvError>;

    /// Returns true when the key existed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Atomically increment the counter for `key`, starting a new window with
    /// the given duration if none is active.
    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, KvError>;

    /// Liveness probe for health endpoints.
    async fn ping(&self) -> bool;
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy)]
struct CounterWindow {
    count: u64,
    expires_at: Instant,
}

/// In-memory key-value store for single-instance deployments and tests.
///
/// Expiry is lazy (checked on read) plus a periodic sweep; per-key atomicity
/// comes from the map's per-entry locking.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    values: DashMap<String, StoredValue>,
    counters: DashMap<String, CounterWindow>,
}

impl InMemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired values and counters. Called periodically from a
    /// background task; reads are correct without it.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.values.len() + self.counters.len();
        self.values.retain(|_, stored| !stored.is_expired(now));
        self.counters.retain(|_, counter| counter.expires_at > now);
        before - (self.values.len() + self.counters.len())
    }

    /// Periodic expiry sweep, spawned once at startup.
    pub fn start_cleanup_task(self: std::sync::Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.cleanup_expired();
                if removed > 0 {
                    tracing::debug!(removed, "Expired key-value entries swept");
                }
            }
        });
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        match self.values.get(key) {
            Some(stored) if !stored.is_expired(now) => Ok(Some(stored.value.clone())),
            Some(_) => {
                drop(self.values.remove(key));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), KvError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.values
            .insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    async fn set_many(
        &self,
        entries: Vec<(String, String)>,
        ttl: Option<Duration>,
    ) -> Result<(), KvError> {
        for (key, value) in entries {
            self.set(&key, value, ttl).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.values.remove(key).is_some())
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, KvError> {
        let now = Instant::now();
        // The entry guard holds the shard lock for this key, so the
        // reset-or-increment below is atomic with respect to other callers.
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert(CounterWindow {
                count: 0,
                expires_at: now + window,
            });

        if entry.expires_at <= now {
            entry.count = 0;
            entry.expires_at = now + window;
        }
        entry.count += 1;

        Ok(WindowCount {
            count: entry.count,
            remaining_window: entry.expires_at.saturating_duration_since(now),
        })
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_get_delete() {
        let kv = InMemoryKvStore::new();

        assert_eq!(kv.get("missing").await.unwrap(), None);

        kv.set("k", "v".to_string(), None).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some("v".to_string()));

        assert!(kv.delete("k").await.unwrap());
        assert!(!kv.delete("k").await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let kv = InMemoryKvStore::new();
        kv.set("k", "v".to_string(), Some(Duration::from_secs(5)))
            .await
            .unwrap();

        assert!(kv.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_many_preserves_order() {
        let kv = InMemoryKvStore::new();
        kv.set("a", "1".to_string(), None).await.unwrap();
        kv.set("c", "3".to_string(), None).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let values = kv.get_many(&keys).await.unwrap();
        assert_eq!(
            values,
            vec![Some("1".to_string()), None, Some("3".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_window_counts_and_resets() {
        let kv = InMemoryKvStore::new();
        let window = Duration::from_secs(60);

        let first = kv.incr_window("rl:test", window).await.unwrap();
        assert_eq!(first.count, 1);
        let second = kv.incr_window("rl:test", window).await.unwrap();
        assert_eq!(second.count, 2);
        assert!(second.remaining_window <= window);

        tokio::time::advance(Duration::from_secs(61)).await;
        let after_reset = kv.incr_window("rl:test", window).await.unwrap();
        assert_eq!(after_reset.count, 1);
    }

    #[tokio::test]
    async fn test_incr_window_concurrent_callers_never_lose_counts() {
        let kv = Arc::new(InMemoryKvStore::new());
        let tasks = 50;
        let barrier = Arc::new(tokio::sync::Barrier::new(tasks));

        let mut handles = Vec::with_capacity(tasks);
        for _ in 0..tasks {
            let kv = Arc::clone(&kv);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                kv.incr_window("rl:race", Duration::from_secs(60))
                    .await
                    .unwrap()
                    .count
            }));
        }

        let mut counts = Vec::with_capacity(tasks);
        for handle in handles {
            counts.push(handle.await.unwrap());
        }
        counts.sort_unstable();

        // Every increment must be observed exactly once.
        let expected: Vec<u64> = (1..=tasks as u64).collect();
        assert_eq!(counts, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired_sweeps_both_maps() {
        let kv = InMemoryKvStore::new();
        kv.set("short", "v".to_string(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        kv.set("long", "v".to_string(), None).await.unwrap();
        kv.incr_window("counter", Duration::from_secs(1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        let removed = kv.cleanup_expired();
        assert_eq!(removed, 2);
        assert_eq!(kv.get("long").await.unwrap(), Some("v".to_string()));
    }
}
