//! Username validator: periodic re-verification of stored platform usernames.
//!
//! Keeps the updater's known-invalid short-circuit accurate over time without
//! charging the revalidation cost to refresh requests. Uses the lightweight
//! existence check, not a full stats fetch, and mirrors the updater's rule:
//! only a confirmed "does not exist" marks an identity invalid; a service
//! error merely stamps the check time.

use crate::clients::ClientRegistry;
use crate::config::ValidatorConfig;
use crate::limiter::{ConcurrencyLimiter, OperationClass};
use crate::stats::SyncMetrics;
use crate::store::UserStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters from one validation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSweepSummary {
    pub checked: usize,
    pub confirmed_valid: usize,
    pub marked_invalid: usize,
    pub errored: usize,
}

pub struct UsernameValidator {
    store: Arc<dyn UserStore>,
    clients: Arc<ClientRegistry>,
    limiter: Arc<ConcurrencyLimiter>,
    metrics: Arc<SyncMetrics>,
    config: ValidatorConfig,
}

impl UsernameValidator {
    pub fn new(
        store: Arc<dyn UserStore>,
        clients: Arc<ClientRegistry>,
        limiter: Arc<ConcurrencyLimiter>,
        metrics: Arc<SyncMetrics>,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            store,
            clients,
            limiter,
            metrics,
            config,
        }
    }

    /// Run one sweep over every identity due for re-verification.
    pub async fn run_once(&self) -> ValidationSweepSummary {
        SyncMetrics::increment(&self.metrics.validation_sweeps);
        let cutoff = Utc::now() - self.config.recheck_horizon();

        let due = match self.store.identities_needing_validation(cutoff).await {
            Ok(due) => due,
            Err(err) => {
                warn!(error = %err, "Failed to list identities needing validation");
                return ValidationSweepSummary::default();
            }
        };

        let mut summary = ValidationSweepSummary {
            checked: due.len(),
            ..ValidationSweepSummary::default()
        };

        for (user_id, platform, username) in due {
            let client = self.clients.for_platform(platform);
            let exists = self
                .limiter
                .run(OperationClass::External, || {
                    client.username_exists(&username)
                })
                .await;

            let now = Utc::now();
            let store_result = match exists {
                Ok(true) => {
                    summary.confirmed_valid += 1;
                    self.store
                        .set_identity_validity(&user_id, platform, true, now)
                        .await
                }
                Ok(false) => {
                    summary.marked_invalid += 1;
                    info!(%user_id, %platform, username, "Username no longer exists, marking invalid");
                    self.store
                        .set_identity_validity(&user_id, platform, false, now)
                        .await
                }
                Err(err) => {
                    // The check proved nothing; stamp the attempt and leave
                    // validity alone.
                    summary.errored += 1;
                    debug!(%user_id, %platform, error = %err, "Existence check failed, keeping validity");
                    self.store
                        .stamp_validation_check(&user_id, platform, now)
                        .await
                }
            };

            if let Err(err) = store_result {
                warn!(%user_id, %platform, error = %err, "Failed to persist validation result");
            }
        }

        info!(
            checked = summary.checked,
            confirmed_valid = summary.confirmed_valid,
            marked_invalid = summary.marked_invalid,
            errored = summary.errored,
            "Username validation sweep finished"
        );
        summary
    }

    /// Spawn the periodic sweep loop. The first sweep runs immediately at
    /// startup, then on the configured interval.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval());
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
