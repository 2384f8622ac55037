//! Periodic reconciliation: replays the disk backup into storage.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::backup::{BackupError, DiskBackup};
use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::counter_cache::CounterCache;
use crate::application::rate_limiter::ClickRateLimiter;
use crate::domain::repositories::ClickRepository;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    /// Files written to storage and deleted.
    pub replayed: usize,
    /// Files whose click was already stored; deleted without counting.
    pub duplicates: usize,
    /// Undecodable files renamed out of the backlog.
    pub quarantined: usize,
    /// Files left for the next sweep.
    pub remaining: usize,
    /// Whether the sweep stopped before the end of the backlog.
    pub stopped_early: bool,
}

pub struct ReconciliationSweeper {
    backup: DiskBackup,
    repository: Arc<dyn ClickRepository>,
    breaker: Arc<CircuitBreaker>,
    cache: Arc<CounterCache>,
    rate_limiter: Option<Arc<ClickRateLimiter>>,
}

impl ReconciliationSweeper {
    pub fn new(
        backup: DiskBackup,
        repository: Arc<dyn ClickRepository>,
        breaker: Arc<CircuitBreaker>,
        cache: Arc<CounterCache>,
    ) -> Self {
        Self {
            backup,
            repository,
            breaker,
            cache,
            rate_limiter: None,
        }
    }

    /// Also prunes idle rate-limit windows, hourly.
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<ClickRateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Replays backup files in arrival order.
    ///
    /// Stops at the first storage failure or as soon as the storage breaker is
    /// open; the remaining files stay for the next sweep.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] only if the backup directory cannot be listed.
    pub async fn sweep(&self) -> Result<SweepReport, BackupError> {
        let files = self.backup.list().await?;
        let mut report = SweepReport::default();

        for (index, path) in files.iter().enumerate() {
            if self.breaker.is_open() {
                debug!("Storage circuit open, postponing backup replay");
                report.remaining = files.len() - index;
                report.stopped_early = true;
                break;
            }

            let event = match self.backup.read(path).await {
                Ok(event) => event,
                Err(BackupError::Serialization(e)) => {
                    error!(file = %path.display(), error = %e, "Corrupt backup file, quarantining");
                    if let Err(e) = self.backup.quarantine(path).await {
                        warn!(file = %path.display(), error = %e, "Failed to quarantine backup file");
                    }
                    report.quarantined += 1;
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read backup file, skipping");
                    report.remaining += 1;
                    continue;
                }
            };

            match self.repository.insert_click(&event).await {
                Ok(inserted) => {
                    self.breaker.record_success();

                    if let Err(e) = self.backup.remove(path).await {
                        warn!(error = %e, "Failed to delete replayed backup file");
                    }

                    if inserted {
                        self.count(&event.ad_id).await;
                        metrics::counter!("backup_files_replayed_total").increment(1);
                        report.replayed += 1;
                    } else {
                        report.duplicates += 1;
                    }
                }
                Err(e) => {
                    self.breaker.record_failure();
                    warn!(
                        click_id = %event.id,
                        error = %e,
                        "Backup replay failed, stopping sweep"
                    );
                    report.remaining += files.len() - index;
                    report.stopped_early = true;
                    break;
                }
            }
        }

        if report != SweepReport::default() {
            info!(?report, "Backup sweep finished");
        }
        Ok(report)
    }

    async fn count(&self, ad_id: &str) {
        if self.cache.peek(ad_id).is_none()
            && let Err(e) = self.cache.get(ad_id).await
        {
            warn!(ad_id, error = %e, "Failed to seed counter cache");
        }
        self.cache.increment(ad_id);

        if let Err(e) = self.repository.increment_ad_total(ad_id, 1).await {
            warn!(ad_id, error = %e, "Failed to update stored ad total");
        }
    }

    fn log_counters(&self) {
        let counters = self.cache.snapshot();
        info!(
            tracked = counters.len(),
            total = self.cache.total(),
            "Counter cache snapshot"
        );
    }

    /// Spawns the periodic sweep.
    ///
    /// The first sweep runs immediately, so a restart replays what an earlier
    /// run left behind. Stops on `shutdown`, never in the middle of a sweep.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_ticker = tokio::time::interval(interval);
            sweep_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut prune_ticker = tokio::time::interval(PRUNE_INTERVAL);
            prune_ticker.tick().await;

            loop {
                tokio::select! {
                    _ = sweep_ticker.tick() => {
                        self.log_counters();
                        if let Err(e) = self.sweep().await {
                            error!(error = %e, "Backup sweep failed");
                        }
                    }
                    _ = prune_ticker.tick() => {
                        if let Some(limiter) = &self.rate_limiter {
                            let removed = limiter.prune();
                            debug!(removed, "Pruned idle rate-limit windows");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Reconciliation sweeper stopped");
        })
    }
}
