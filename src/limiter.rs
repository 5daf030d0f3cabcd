//! Concurrency limiter: bounds simultaneously in-flight operations per
//! operation class and drives bulk platform fetches with operation-level
//! retry, batching, and progress reporting.
//!
//! The caps are process-local. Retry responsibility is split with the
//! platform clients: clients retry known-transient HTTP statuses at the
//! transport level, this limiter retries whole operations that still failed.

use crate::config::limits::{BulkConfig, ConcurrencyLimitsConfig};
use crate::error::PlatformError;
use crate::model::Platform;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Operation classes with independently configurable in-flight caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationClass {
    /// Platform stat fetches.
    Platform,
    /// Persistent-store writes.
    Database,
    /// Anything without a dedicated class.
    General,
    /// Lightweight external existence checks.
    External,
}

impl OperationClass {
    pub const ALL: [Self; 4] = [
        Self::Platform,
        Self::Database,
        Self::General,
        Self::External,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Database => "database",
            Self::General => "general",
            Self::External => "external",
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for one bulk batch run.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Items per batch; `None` dispatches everything as one batch.
    pub batch_size: Option<usize>,
    /// Pause between batches.
    pub batch_delay: Duration,
    /// Operation-level retries per item beyond the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff: `retry_delay * 2^attempt`.
    pub retry_delay: Duration,
}

impl BatchOptions {
    #[must_use]
    pub const fn from_bulk(config: &BulkConfig) -> Self {
        Self {
            batch_size: Some(config.batch_size),
            batch_delay: config.batch_delay(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_bulk(&BulkConfig::default())
    }
}

/// Incremental progress, emitted after every settled item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Result of a bulk batch run. `results` aligns with the input order
/// regardless of completion order.
#[derive(Debug)]
pub struct BatchOutcome<R> {
    pub results: Vec<Result<R, PlatformError>>,
    pub successful: usize,
    pub failed: usize,
    pub processing_time: Duration,
}

#[derive(Debug, Default)]
struct ExecutorStats {
    total_operations: AtomicU64,
    successful_operations: AtomicU64,
    failed_operations: AtomicU64,
    processing_micros: AtomicU64,
}

impl ExecutorStats {
    fn record(&self, success: bool, elapsed: Duration) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_operations.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_operations.fetch_add(1, Ordering::Relaxed);
        }
        self.processing_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.total_operations.store(0, Ordering::Relaxed);
        self.successful_operations.store(0, Ordering::Relaxed);
        self.failed_operations.store(0, Ordering::Relaxed);
        self.processing_micros.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time view of the limiter's counters and configured caps.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterStatsSnapshot {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub total_processing_ms: u64,
    pub average_processing_ms: Option<f64>,
    pub limits: BTreeMap<String, usize>,
}

struct ClassSlot {
    semaphore: Arc<Semaphore>,
    cap: usize,
}

/// Per-class concurrency limiter with running statistics.
///
/// Semaphore permits queue FIFO, so excess operations wait rather than fail.
/// `update_limits` swaps a class's semaphore live: operations already holding
/// a permit from the old semaphore finish undisturbed.
pub struct ConcurrencyLimiter {
    classes: RwLock<HashMap<OperationClass, ClassSlot>>,
    stats: ExecutorStats,
}

impl ConcurrencyLimiter {
    #[must_use]
    pub fn new(limits: &ConcurrencyLimitsConfig) -> Self {
        Self {
            classes: RwLock::new(Self::build_slots(limits)),
            stats: ExecutorStats::default(),
        }
    }

    fn build_slots(limits: &ConcurrencyLimitsConfig) -> HashMap<OperationClass, ClassSlot> {
        let caps = [
            (OperationClass::Platform, limits.platform),
            (OperationClass::Database, limits.database),
            (OperationClass::General, limits.general),
            (OperationClass::External, limits.external),
        ];
        caps.into_iter()
            .map(|(class, cap)| {
                let cap = cap.max(1);
                (
                    class,
                    ClassSlot {
                        semaphore: Arc::new(Semaphore::new(cap)),
                        cap,
                    },
                )
            })
            .collect()
    }

    /// Replace the per-class caps without restarting. In-flight work holding
    /// permits from the previous semaphores is unaffected.
    pub async fn update_limits(&self, limits: &ConcurrencyLimitsConfig) {
        let mut classes = self.classes.write().await;
        *classes = Self::build_slots(limits);
        debug!(
            platform = limits.platform,
            database = limits.database,
            general = limits.general,
            external = limits.external,
            "Concurrency limits updated"
        );
    }

    async fn permit(&self, class: OperationClass) -> Option<OwnedSemaphorePermit> {
        let semaphore = {
            let classes = self.classes.read().await;
            classes.get(&class).map(|slot| Arc::clone(&slot.semaphore))
        };

        match semaphore {
            Some(semaphore) => match semaphore.acquire_owned().await {
                Ok(permit) => Some(permit),
                // Semaphores are never closed; if that invariant somehow
                // breaks, degrade to running unbounded rather than stalling.
                Err(_) => {
                    warn!(%class, "Concurrency semaphore closed, running unbounded");
                    None
                }
            },
            None => None,
        }
    }

    /// Run one operation under the class's in-flight cap, recording success,
    /// failure, and processing time.
    pub async fn run<T, E, F, Fut>(&self, class: OperationClass, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let permit = self.permit(class).await;
        let started = Instant::now();
        let result = op().await;
        drop(permit);
        self.stats.record(result.is_ok(), started.elapsed());
        result
    }

    /// Drive many platform operations with bounded concurrency, sequential
    /// batching, per-item retry, and per-item failure isolation.
    ///
    /// Batch N+1 is dispatched only after batch N has fully settled, with
    /// `batch_delay` in between, a politeness throttle on top of the
    /// per-item cap. Progress events fire on `progress` after every settled
    /// item. The returned results preserve input order.
    pub async fn run_platform_batch<T, R, F, Fut>(
        self: &Arc<Self>,
        platform: Platform,
        items: Vec<T>,
        op: F,
        opts: BatchOptions,
        progress: Option<UnboundedSender<BatchProgress>>,
    ) -> BatchOutcome<R>
    where
        T: Clone + Send + Sync + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<R, PlatformError>> + Send + 'static,
    {
        let total = items.len();
        let started = Instant::now();
        let mut slots: Vec<Option<Result<R, PlatformError>>> =
            (0..total).map(|_| None).collect();

        let completed = Arc::new(AtomicUsize::new(0));
        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        let indexed: Vec<(usize, T)> = items.into_iter().enumerate().collect();
        let batch_size = opts.batch_size.unwrap_or(total).max(1);
        let batch_count = indexed.len().div_ceil(batch_size);

        for (batch_index, batch) in indexed.chunks(batch_size).enumerate() {
            let mut handles = Vec::with_capacity(batch.len());
            for (index, item) in batch.iter().cloned() {
                let limiter = Arc::clone(self);
                let op = op.clone();
                let progress = progress.clone();
                let completed = Arc::clone(&completed);
                let successes = Arc::clone(&successes);
                let failures = Arc::clone(&failures);

                handles.push(tokio::spawn(async move {
                    let result = limiter
                        .run_with_retry(platform, item, op, opts.max_retries, opts.retry_delay)
                        .await;

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    let (ok, err) = if result.is_ok() {
                        (successes.fetch_add(1, Ordering::SeqCst) + 1, failures.load(Ordering::SeqCst))
                    } else {
                        (successes.load(Ordering::SeqCst), failures.fetch_add(1, Ordering::SeqCst) + 1)
                    };

                    if let Some(progress) = &progress {
                        let _ = progress.send(BatchProgress {
                            completed: done,
                            total,
                            successful: ok,
                            failed: err,
                        });
                    }

                    (index, result)
                }));
            }

            for handle in handles {
                match handle.await {
                    Ok((index, result)) => {
                        if let Some(slot) = slots.get_mut(index) {
                            *slot = Some(result);
                        }
                    }
                    Err(join_err) => {
                        warn!(%platform, error = %join_err, "Bulk item task failed");
                    }
                }
            }

            if batch_index + 1 < batch_count {
                sleep(opts.batch_delay).await;
            }
        }

        let results: Vec<Result<R, PlatformError>> = slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(PlatformError::Transient {
                        platform,
                        message: "operation task aborted before settling".to_string(),
                    })
                })
            })
            .collect();

        let successful = results.iter().filter(|r| r.is_ok()).count();
        let failed = results.len() - successful;

        BatchOutcome {
            results,
            successful,
            failed,
            processing_time: started.elapsed(),
        }
    }

    async fn run_with_retry<T, R, F, Fut>(
        &self,
        platform: Platform,
        item: T,
        op: F,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<R, PlatformError>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: std::future::Future<Output = Result<R, PlatformError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            // The permit covers only the attempt; backoff sleeps must not
            // occupy a concurrency slot.
            let result = self
                .run(OperationClass::Platform, || op(item.clone()))
                .await;

            match result {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= max_retries || !error.is_retryable() {
                        return Err(error);
                    }
                    let delay = retry_delay.saturating_mul(1u32 << attempt.min(16));
                    // Jitter spreads retries from concurrent items so they
                    // do not land on the upstream in lockstep.
                    let jitter = Duration::from_millis(
                        fastrand::u64(0..=(delay.as_millis() as u64 / 10).max(1)),
                    );
                    let delay = delay.saturating_add(jitter);
                    warn!(
                        %platform,
                        attempt = attempt + 1,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Platform operation failed, retrying after backoff"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Snapshot the running counters and configured caps.
    pub async fn stats_snapshot(&self) -> LimiterStatsSnapshot {
        let limits = {
            let classes = self.classes.read().await;
            classes
                .iter()
                .map(|(class, slot)| (class.as_str().to_string(), slot.cap))
                .collect()
        };

        let total = self.stats.total_operations.load(Ordering::Relaxed);
        let total_micros = self.stats.processing_micros.load(Ordering::Relaxed);
        LimiterStatsSnapshot {
            total_operations: total,
            successful_operations: self.stats.successful_operations.load(Ordering::Relaxed),
            failed_operations: self.stats.failed_operations.load(Ordering::Relaxed),
            total_processing_ms: total_micros / 1000,
            average_processing_ms: if total > 0 {
                Some(total_micros as f64 / 1000.0 / total as f64)
            } else {
                None
            },
            limits,
        }
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::mpsc;

    fn limiter_with_platform_cap(cap: usize) -> Arc<ConcurrencyLimiter> {
        Arc::new(ConcurrencyLimiter::new(&ConcurrencyLimitsConfig {
            platform: cap,
            ..ConcurrencyLimitsConfig::default()
        }))
    }

    fn quick_opts() -> BatchOptions {
        BatchOptions {
            batch_size: None,
            batch_delay: Duration::from_millis(1),
            max_retries: 2,
            retry_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_run_records_stats() {
        let limiter = limiter_with_platform_cap(5);

        let ok: Result<i32, PlatformError> = limiter
            .run(OperationClass::Platform, || async { Ok(7) })
            .await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<i32, PlatformError> = limiter
            .run(OperationClass::Platform, || async {
                Err(PlatformError::Transient {
                    platform: Platform::Github,
                    message: "boom".to_string(),
                })
            })
            .await;
        assert!(err.is_err());

        let stats = limiter.stats_snapshot().await;
        assert_eq!(stats.total_operations, 2);
        assert_eq!(stats.successful_operations, 1);
        assert_eq!(stats.failed_operations, 1);
        assert!(stats.average_processing_ms.is_some());

        limiter.reset_stats();
        let stats = limiter.stats_snapshot().await;
        assert_eq!(stats.total_operations, 0);
        assert_eq!(stats.average_processing_ms, None);
    }

    #[tokio::test]
    async fn test_concurrency_cap_respected() {
        let cap = 3;
        let limiter = limiter_with_platform_cap(cap);

        let in_flight = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));

        let items: Vec<usize> = (0..20).collect();
        let in_flight_op = Arc::clone(&in_flight);
        let high_water_op = Arc::clone(&high_water);

        let outcome = limiter
            .run_platform_batch(
                Platform::Leetcode,
                items,
                move |_| {
                    let in_flight = Arc::clone(&in_flight_op);
                    let high_water = Arc::clone(&high_water_op);
                    async move {
                        let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        high_water.fetch_max(current, Ordering::SeqCst);
                        sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, PlatformError>(())
                    }
                },
                quick_opts(),
                None,
            )
            .await;

        assert_eq!(outcome.successful, 20);
        assert!(
            high_water.load(Ordering::SeqCst) <= cap,
            "observed {} simultaneous operations, cap is {cap}",
            high_water.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_batch_preserves_input_order() {
        let limiter = limiter_with_platform_cap(8);

        let items: Vec<u64> = (0..12).collect();
        let outcome = limiter
            .run_platform_batch(
                Platform::Github,
                items,
                |n| async move {
                    // Later items finish earlier.
                    sleep(Duration::from_millis(24 - 2 * n.min(12))).await;
                    Ok::<_, PlatformError>(n * 10)
                },
                BatchOptions {
                    batch_size: Some(5),
                    ..quick_opts()
                },
                None,
            )
            .await;

        let values: Vec<u64> = outcome
            .results
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        let expected: Vec<u64> = (0..12).map(|n| n * 10).collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let limiter = limiter_with_platform_cap(2);
        let attempts = Arc::new(AtomicU32::new(0));

        let attempts_op = Arc::clone(&attempts);
        let outcome = limiter
            .run_platform_batch(
                Platform::Codeforces,
                vec![()],
                move |()| {
                    let attempts = Arc::clone(&attempts_op);
                    async move {
                        let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                        if n < 3 {
                            Err(PlatformError::Transient {
                                platform: Platform::Codeforces,
                                message: "503".to_string(),
                            })
                        } else {
                            Ok(n)
                        }
                    }
                },
                quick_opts(),
                None,
            )
            .await;

        assert_eq!(outcome.successful, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_not_retried() {
        let limiter = limiter_with_platform_cap(2);
        let attempts = Arc::new(AtomicU32::new(0));

        let attempts_op = Arc::clone(&attempts);
        let outcome = limiter
            .run_platform_batch(
                Platform::Leetcode,
                vec![()],
                move |()| {
                    let attempts = Arc::clone(&attempts_op);
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(PlatformError::NotFound {
                            platform: Platform::Leetcode,
                        })
                    }
                },
                quick_opts(),
                None,
            )
            .await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1, "NotFound must not retry");
    }

    #[tokio::test]
    async fn test_item_failure_is_isolated() {
        let limiter = limiter_with_platform_cap(4);

        let outcome = limiter
            .run_platform_batch(
                Platform::Github,
                vec![1u32, 2, 3, 4],
                |n| async move {
                    if n == 3 {
                        Err(PlatformError::InvalidResponse {
                            platform: Platform::Github,
                            message: "bad payload".to_string(),
                        })
                    } else {
                        Ok(n)
                    }
                },
                quick_opts(),
                None,
            )
            .await;

        assert_eq!(outcome.successful, 3);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.results[0].is_ok());
        assert!(outcome.results[2].is_err());
        assert!(outcome.results[3].is_ok());
    }

    #[tokio::test]
    async fn test_progress_events_fire_per_item() {
        let limiter = limiter_with_platform_cap(2);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = limiter
            .run_platform_batch(
                Platform::Leetcode,
                vec![1u32, 2, 3, 4, 5],
                |n| async move {
                    if n == 2 {
                        Err(PlatformError::InvalidResponse {
                            platform: Platform::Leetcode,
                            message: "nope".to_string(),
                        })
                    } else {
                        Ok(n)
                    }
                },
                quick_opts(),
                Some(tx),
            )
            .await;
        assert_eq!(outcome.successful, 4);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert_eq!(events.len(), 5);
        let mut completed: Vec<usize> = events.iter().map(|e| e.completed).collect();
        completed.sort_unstable();
        assert_eq!(completed, vec![1, 2, 3, 4, 5]);

        let last = events.iter().find(|e| e.completed == 5).unwrap();
        assert_eq!(last.total, 5);
        assert_eq!(last.successful + last.failed, 5);
    }

    #[tokio::test]
    async fn test_update_limits_applies_new_cap() {
        let limiter = limiter_with_platform_cap(1);

        limiter
            .update_limits(&ConcurrencyLimitsConfig {
                platform: 4,
                ..ConcurrencyLimitsConfig::default()
            })
            .await;

        let stats = limiter.stats_snapshot().await;
        assert_eq!(stats.limits.get("platform"), Some(&4));

        // The raised cap is actually usable.
        let in_flight = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));
        let in_flight_op = Arc::clone(&in_flight);
        let high_water_op = Arc::clone(&high_water);

        let outcome = limiter
            .run_platform_batch(
                Platform::Github,
                (0..8).collect::<Vec<_>>(),
                move |_| {
                    let in_flight = Arc::clone(&in_flight_op);
                    let high_water = Arc::clone(&high_water_op);
                    async move {
                        let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        high_water.fetch_max(current, Ordering::SeqCst);
                        sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, PlatformError>(())
                    }
                },
                quick_opts(),
                None,
            )
            .await;

        assert_eq!(outcome.successful, 8);
        let observed = high_water.load(Ordering::SeqCst);
        assert!(observed <= 4, "cap exceeded: {observed}");
        assert!(observed > 1, "new cap not in effect: {observed}");
    }
}
