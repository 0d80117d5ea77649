use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

use harbor_core::{Clock, Result, Tier};

use crate::store::MemoryStore;

/// The single source of truth for retention: no other component decides
/// to drop a record. Only task-tier records are ever age-pruned, and only
/// once they are older than `max_age`.
pub fn should_prune(
    tier: Tier,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    max_age: Duration,
) -> bool {
    tier == Tier::Task && now - created_at > max_age
}

/// Tuning for the retention pass, from `[memory]`.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub max_age_days: i64,
    /// Records deleted per transaction, so no batch holds locks for long.
    pub batch_size: usize,
    pub interval: std::time::Duration,
    /// Retry attempts per failed batch before giving up on that owner.
    pub batch_retries: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            batch_size: 500,
            interval: std::time::Duration::from_secs(86_400),
            batch_retries: 3,
        }
    }
}

/// Outcome of one retention pass.
#[derive(Debug, Clone, Default)]
pub struct RetentionReport {
    pub owners_processed: usize,
    pub owners_failed: usize,
    pub records_pruned: usize,
}

/// Enforces the task-tier pruning rule in bounded batches, isolating
/// owners from one another: a failure on one owner's data never blocks
/// the purge for everyone else.
pub struct RetentionManager {
    store: Arc<MemoryStore>,
    clock: Arc<dyn Clock>,
    config: RetentionConfig,
}

impl RetentionManager {
    pub fn new(store: Arc<MemoryStore>, clock: Arc<dyn Clock>, config: RetentionConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// One full pass over all owners with expired task-tier records.
    pub async fn run_once(&self) -> Result<RetentionReport> {
        let now = self.clock.now();
        let max_age = Duration::days(self.config.max_age_days);
        let cutoff = now - max_age;

        let owners = self.store.owners_with_expired_tasks(cutoff)?;
        let mut report = RetentionReport::default();

        for owner_id in owners {
            match self.prune_owner(&owner_id, now, max_age).await {
                Ok(pruned) => {
                    report.owners_processed += 1;
                    report.records_pruned += pruned;
                }
                Err(e) => {
                    // Owner isolation: log and move on.
                    error!(owner_id, error = %e, "retention failed for owner");
                    report.owners_failed += 1;
                }
            }
        }

        if report.records_pruned > 0 {
            info!(
                pruned = report.records_pruned,
                owners = report.owners_processed,
                "retention pass complete"
            );
        }
        Ok(report)
    }

    /// Prune one owner's expired task records in bounded batches.
    async fn prune_owner(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<usize> {
        let cutoff = now - max_age;
        let mut total = 0usize;

        loop {
            let batch =
                self.store
                    .list_by_tier_and_age(owner_id, Tier::Task, cutoff, self.config.batch_size)?;
            if batch.is_empty() {
                break;
            }

            let ids: Vec<_> = batch
                .iter()
                .filter(|r| should_prune(r.tier, r.created_at, now, max_age))
                .map(|r| r.id)
                .collect();
            if ids.is_empty() {
                break;
            }

            let deleted = self.delete_with_retry(owner_id, &ids).await?;
            debug!(owner_id, deleted, "pruned retention batch");
            total += deleted;

            if batch.len() < self.config.batch_size {
                break;
            }
        }
        Ok(total)
    }

    /// Delete a batch with bounded backoff. Transient store errors get
    /// retried; persistent failure bubbles up to the per-owner handler.
    async fn delete_with_retry(
        &self,
        owner_id: &str,
        ids: &[harbor_core::MemoryId],
    ) -> Result<usize> {
        let mut backoff = std::time::Duration::from_millis(100);
        let mut attempt = 0u32;
        loop {
            match self.store.delete_many(owner_id, ids) {
                Ok(deleted) => return Ok(deleted),
                Err(e) if e.is_transient() && attempt + 1 < self.config.batch_retries => {
                    attempt += 1;
                    debug!(owner_id, attempt, error = %e, "retrying retention batch");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Recurring retention loop. Runs until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                error!(error = %e, "retention pass failed");
            }
        }
    }
}
