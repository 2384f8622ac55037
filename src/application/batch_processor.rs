//! Per-worker click batching and persistence.
//!
//! Each consumer worker owns one [`BatchProcessor`]. Events are buffered until
//! the batch size is reached or the idle flush timer fires, then written to
//! storage in one statement behind the storage circuit breaker. A batch that
//! cannot be written is re-published through [`ClickPublisher`] and re-enters
//! the pipeline at a consumer; the buffer itself is never retried.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::counter_cache::CounterCache;
use crate::application::publisher::{ClickPublisher, PublishOutcome};
use crate::domain::click_event::ClickEvent;
use crate::domain::repositories::ClickRepository;
use crate::infrastructure::event_log::EventLog;

/// An event together with the log delivery it came from.
#[derive(Debug, Clone)]
pub struct PendingClick {
    pub event: ClickEvent,
    /// Log message id to acknowledge once the event reaches a terminal outcome.
    pub delivery_id: String,
}

/// What happened to one flushed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Rows newly written to storage.
    pub persisted: usize,
    /// Events already stored by an earlier delivery.
    pub duplicates: usize,
    /// Events re-published to the log or written to the disk backup.
    pub requeued: usize,
    /// Events that could be neither re-published nor backed up.
    pub unrecovered: usize,
}

/// Storage collaborators shared by every worker's processor.
#[derive(Clone)]
pub struct BatchDeps {
    pub repository: Arc<dyn ClickRepository>,
    pub storage_breaker: Arc<CircuitBreaker>,
    pub cache: Arc<CounterCache>,
    pub publisher: Arc<ClickPublisher>,
    pub log: Arc<dyn EventLog>,
}

pub struct BatchProcessor {
    worker_id: String,
    batch_size: usize,
    buffer: Mutex<Vec<PendingClick>>,
    deps: BatchDeps,
}

impl BatchProcessor {
    /// Creates an empty processor. A `batch_size` of zero is treated as one.
    pub fn new(worker_id: impl Into<String>, batch_size: usize, deps: BatchDeps) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            worker_id: worker_id.into(),
            batch_size,
            buffer: Mutex::new(Vec::with_capacity(batch_size)),
            deps,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of buffered events.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Adds an event to the current batch, flushing it once it is full.
    ///
    /// The full batch is taken out of the buffer under the lock and written
    /// after the lock is released, so a batch never exceeds `batch_size`.
    pub async fn ingest(&self, click: PendingClick) -> Option<FlushReport> {
        let full_batch = {
            let mut buffer = self.buffer.lock();
            buffer.push(click);
            if buffer.len() >= self.batch_size {
                Some(std::mem::replace(
                    &mut *buffer,
                    Vec::with_capacity(self.batch_size),
                ))
            } else {
                None
            }
        };

        match full_batch {
            Some(batch) => Some(self.flush_batch(batch).await),
            None => None,
        }
    }

    /// Flushes whatever is buffered.
    pub async fn flush(&self) -> FlushReport {
        let batch = std::mem::take(&mut *self.buffer.lock());
        self.flush_batch(batch).await
    }

    async fn flush_batch(&self, batch: Vec<PendingClick>) -> FlushReport {
        if batch.is_empty() {
            return FlushReport::default();
        }

        if self.deps.storage_breaker.is_open() {
            debug!(
                worker_id = %self.worker_id,
                size = batch.len(),
                "Storage circuit open, re-queueing batch"
            );
            return self.requeue(batch).await;
        }

        let events: Vec<ClickEvent> = batch.iter().map(|click| click.event.clone()).collect();

        match self.deps.repository.insert_clicks(&events).await {
            Ok(inserted) => {
                self.deps.storage_breaker.record_success();
                let inserted: HashSet<Uuid> = inserted.into_iter().collect();

                self.apply_counts(&events, &inserted).await;
                self.ack(&batch).await;

                metrics::counter!("clicks_persisted_total").increment(inserted.len() as u64);
                let report = FlushReport {
                    persisted: inserted.len(),
                    duplicates: events.len() - inserted.len(),
                    ..FlushReport::default()
                };
                debug!(
                    worker_id = %self.worker_id,
                    persisted = report.persisted,
                    duplicates = report.duplicates,
                    "Batch flushed"
                );
                report
            }
            Err(e) => {
                self.deps.storage_breaker.record_failure();
                warn!(
                    worker_id = %self.worker_id,
                    size = batch.len(),
                    error = %e,
                    "Batch insert failed, re-queueing"
                );
                self.requeue(batch).await
            }
        }
    }

    /// Updates the counter cache and the stored per-ad totals for newly
    /// inserted events. Failures here are logged only.
    async fn apply_counts(&self, events: &[ClickEvent], inserted: &HashSet<Uuid>) {
        let mut per_ad: HashMap<&str, i64> = HashMap::new();
        for event in events.iter().filter(|event| inserted.contains(&event.id)) {
            *per_ad.entry(event.ad_id.as_str()).or_default() += 1;
        }

        for (ad_id, delta) in per_ad {
            // Seed from the stored total before it includes this batch.
            if self.deps.cache.peek(ad_id).is_none()
                && let Err(e) = self.deps.cache.get(ad_id).await
            {
                warn!(ad_id, error = %e, "Failed to seed counter cache");
            }
            for _ in 0..delta {
                self.deps.cache.increment(ad_id);
            }

            if let Err(e) = self.deps.repository.increment_ad_total(ad_id, delta).await {
                warn!(ad_id, delta, error = %e, "Failed to update stored ad total");
            }
        }
    }

    async fn requeue(&self, batch: Vec<PendingClick>) -> FlushReport {
        let mut report = FlushReport::default();
        let mut settled = Vec::with_capacity(batch.len());

        for click in batch {
            match self.deps.publisher.publish(&click.event).await {
                PublishOutcome::Published | PublishOutcome::BackedUp => {
                    report.requeued += 1;
                    settled.push(click);
                }
                PublishOutcome::Lost => {
                    // Left unacknowledged so the log redelivers it.
                    report.unrecovered += 1;
                }
            }
        }

        metrics::counter!("clicks_requeued_total").increment(report.requeued as u64);
        self.ack(&settled).await;

        if report.unrecovered > 0 {
            error!(
                worker_id = %self.worker_id,
                unrecovered = report.unrecovered,
                "Events left pending on the log after failed re-queue"
            );
        }
        report
    }

    async fn ack(&self, clicks: &[PendingClick]) {
        if clicks.is_empty() {
            return;
        }

        let ids: Vec<String> = clicks.iter().map(|c| c.delivery_id.clone()).collect();
        if let Err(e) = self.deps.log.ack(&ids).await {
            warn!(
                worker_id = %self.worker_id,
                count = ids.len(),
                error = %e,
                "Failed to acknowledge messages, they will be redelivered"
            );
        }
    }

    /// Spawns the idle flush timer.
    ///
    /// Every `interval` a non-empty batch is flushed, so no event waits longer
    /// than one interval for a flush. The timer stops when `shutdown` turns
    /// `true`, between flushes.
    pub fn spawn_flush_timer(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let processor = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if processor.buffered() > 0 {
                            let report = processor.flush().await;
                            debug!(worker_id = %processor.worker_id, ?report, "Idle flush");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(worker_id = %processor.worker_id, "Flush timer stopped");
        })
    }
}
