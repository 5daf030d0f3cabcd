//! Service-level metrics collection.
//!
//! `SyncMetrics` is owned by the service instance and injected into the
//! updater, never a module-level singleton, so tests can instantiate
//! isolated collectors and assert on exact counts.

use crate::model::Platform;
use hdrhistogram::Histogram;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

const LOWEST_DISCERNIBLE_MICROS: u64 = 1;
const HIGHEST_TRACKABLE_MICROS: u64 = 300_000_000; // 5 minutes in microseconds
const SIGNIFICANT_FIGURES: u8 = 3;

/// Metrics for the sync subsystem: cache effectiveness, external fetch
/// outcomes, and per-platform fetch latency.
#[derive(Debug)]
pub struct SyncMetrics {
    // Cache effectiveness
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,

    // External fetch outcomes
    pub external_fetches: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub invalid_usernames: AtomicU64,
    pub rate_limited_fetches: AtomicU64,

    // Short-circuits
    pub skipped_no_username: AtomicU64,
    pub freshness_short_circuits: AtomicU64,
    pub invalid_short_circuits: AtomicU64,

    // Orchestration
    pub bulk_operations: AtomicU64,
    pub validation_sweeps: AtomicU64,

    latencies: RwLock<HashMap<Platform, Histogram<u64>>>,
}

impl SyncMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            external_fetches: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            invalid_usernames: AtomicU64::new(0),
            rate_limited_fetches: AtomicU64::new(0),
            skipped_no_username: AtomicU64::new(0),
            freshness_short_circuits: AtomicU64::new(0),
            invalid_short_circuits: AtomicU64::new(0),
            bulk_operations: AtomicU64::new(0),
            validation_sweeps: AtomicU64::new(0),
            latencies: RwLock::new(HashMap::new()),
        }
    }

    pub fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one external fetch round-trip time.
    pub async fn record_fetch_latency(&self, platform: Platform, elapsed: Duration) {
        let micros = (elapsed.as_micros() as u64)
            .clamp(LOWEST_DISCERNIBLE_MICROS, HIGHEST_TRACKABLE_MICROS);

        let mut latencies = self.latencies.write().await;
        if !latencies.contains_key(&platform) {
            let Ok(histogram) = Histogram::new_with_bounds(
                LOWEST_DISCERNIBLE_MICROS,
                HIGHEST_TRACKABLE_MICROS,
                SIGNIFICANT_FIGURES,
            ) else {
                return;
            };
            latencies.insert(platform, histogram);
        }
        if let Some(histogram) = latencies.get_mut(&platform) {
            let _ = histogram.record(micros);
        }
    }

    /// Fraction of cache lookups that hit, or `None` before any lookup.
    pub fn cache_hit_rate(&self) -> Option<f64> {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        (lookups > 0).then(|| hits as f64 / lookups as f64)
    }

    /// Fraction of external fetches that failed, or `None` before any fetch.
    pub fn error_rate(&self) -> Option<f64> {
        let fetches = self.external_fetches.load(Ordering::Relaxed);
        let failures = self.fetch_failures.load(Ordering::Relaxed)
            + self.rate_limited_fetches.load(Ordering::Relaxed);
        (fetches > 0).then(|| failures as f64 / fetches as f64)
    }

    pub async fn snapshot(&self) -> SyncMetricsSnapshot {
        let latencies = self.latencies.read().await;
        let fetch_latency = latencies
            .iter()
            .map(|(platform, histogram)| {
                (
                    platform.as_str().to_string(),
                    FetchLatencySnapshot {
                        samples: histogram.len(),
                        average_ms: if histogram.is_empty() {
                            None
                        } else {
                            Some(histogram.mean() / 1000.0)
                        },
                        p50_ms: histogram.value_at_quantile(0.5) as f64 / 1000.0,
                        p99_ms: histogram.value_at_quantile(0.99) as f64 / 1000.0,
                        max_ms: histogram.max() as f64 / 1000.0,
                    },
                )
            })
            .collect();

        SyncMetricsSnapshot {
            timestamp: chrono::Utc::now(),
            cache: CacheMetrics {
                hits: self.cache_hits.load(Ordering::Relaxed),
                misses: self.cache_misses.load(Ordering::Relaxed),
                hit_rate: self.cache_hit_rate(),
            },
            fetches: FetchMetrics {
                total: self.external_fetches.load(Ordering::Relaxed),
                failures: self.fetch_failures.load(Ordering::Relaxed),
                invalid_usernames: self.invalid_usernames.load(Ordering::Relaxed),
                rate_limited: self.rate_limited_fetches.load(Ordering::Relaxed),
                error_rate: self.error_rate(),
            },
            short_circuits: ShortCircuitMetrics {
                no_username: self.skipped_no_username.load(Ordering::Relaxed),
                fresh: self.freshness_short_circuits.load(Ordering::Relaxed),
                known_invalid: self.invalid_short_circuits.load(Ordering::Relaxed),
            },
            bulk_operations: self.bulk_operations.load(Ordering::Relaxed),
            validation_sweeps: self.validation_sweeps.load(Ordering::Relaxed),
            fetch_latency,
        }
    }

    pub async fn reset(&self) {
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.external_fetches.store(0, Ordering::Relaxed);
        self.fetch_failures.store(0, Ordering::Relaxed);
        self.invalid_usernames.store(0, Ordering::Relaxed);
        self.rate_limited_fetches.store(0, Ordering::Relaxed);
        self.skipped_no_username.store(0, Ordering::Relaxed);
        self.freshness_short_circuits.store(0, Ordering::Relaxed);
        self.invalid_short_circuits.store(0, Ordering::Relaxed);
        self.bulk_operations.store(0, Ordering::Relaxed);
        self.validation_sweeps.store(0, Ordering::Relaxed);
        self.latencies.write().await.clear();
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct SyncMetricsSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub cache: CacheMetrics,
    pub fetches: FetchMetrics,
    pub short_circuits: ShortCircuitMetrics,
    pub bulk_operations: u64,
    pub validation_sweeps: u64,
    pub fetch_latency: HashMap<String, FetchLatencySnapshot>,
}

#[derive(Debug, Serialize, Clone, Copy)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: Option<f64>,
}

#[derive(Debug, Serialize, Clone, Copy)]
pub struct FetchMetrics {
    pub total: u64,
    pub failures: u64,
    pub invalid_usernames: u64,
    pub rate_limited: u64,
    pub error_rate: Option<f64>,
}

#[derive(Debug, Serialize, Clone, Copy)]
pub struct ShortCircuitMetrics {
    pub no_username: u64,
    pub fresh: u64,
    pub known_invalid: u64,
}

#[derive(Debug, Serialize, Clone, Copy)]
pub struct FetchLatencySnapshot {
    pub samples: u64,
    pub average_ms: Option<f64>,
    pub p50_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}
