//! Durable-log consumer workers.
//!
//! Each worker reads its own slice of the consumer group and hands decoded
//! clicks to a [`ConsumerHandler`]. Acknowledgement is the handler's job and
//! happens only once an event's batch has reached a terminal outcome.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::batch_processor::{BatchDeps, BatchProcessor, PendingClick};
use crate::domain::click_event::ClickEvent;
use crate::infrastructure::event_log::{EventLog, LogMessage, ReadFrom};

/// Lifecycle hooks of one consumer worker.
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    /// Called once before the first read.
    async fn setup(&self, shutdown: watch::Receiver<bool>);

    /// Processes messages in delivery order.
    async fn handle_batch(&self, messages: Vec<LogMessage>);

    /// Called once after the last read, before the worker exits.
    async fn cleanup(&self);
}

/// Consumer handler that feeds clicks into a worker-owned batch processor.
pub struct ClickConsumerHandler {
    consumer: String,
    log: Arc<dyn EventLog>,
    processor: Arc<BatchProcessor>,
    flush_interval: Duration,
    flush_timer: Mutex<Option<JoinHandle<()>>>,
}

impl ClickConsumerHandler {
    pub fn new(
        consumer: impl Into<String>,
        log: Arc<dyn EventLog>,
        processor: Arc<BatchProcessor>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            consumer: consumer.into(),
            log,
            processor,
            flush_interval,
            flush_timer: Mutex::new(None),
        }
    }

    pub fn processor(&self) -> &Arc<BatchProcessor> {
        &self.processor
    }

    /// Re-processes entries delivered to this consumer before a restart but
    /// never acknowledged.
    ///
    /// Each page is flushed before the next read so its entries are
    /// acknowledged and not returned again.
    async fn replay_pending(&self) {
        let page = self.processor.batch_size();
        let mut replayed = 0;

        loop {
            let messages = match self.log.read(&self.consumer, ReadFrom::Pending, page).await {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(consumer = %self.consumer, error = %e, "Failed to read pending entries");
                    break;
                }
            };
            if messages.is_empty() {
                break;
            }

            replayed += messages.len();
            self.handle_batch(messages).await;
            let report = self.processor.flush().await;
            if report.unrecovered > 0 {
                break;
            }
        }

        if replayed > 0 {
            info!(consumer = %self.consumer, replayed, "Replayed pending entries");
        }
    }

    async fn discard(&self, message: &LogMessage, reason: &str) {
        error!(
            consumer = %self.consumer,
            message_id = %message.id,
            reason,
            "Discarding undecodable log entry"
        );
        if let Err(e) = self.log.ack(std::slice::from_ref(&message.id)).await {
            warn!(message_id = %message.id, error = %e, "Failed to acknowledge discarded entry");
        }
    }
}

#[async_trait]
impl ConsumerHandler for ClickConsumerHandler {
    async fn setup(&self, shutdown: watch::Receiver<bool>) {
        let timer = self
            .processor
            .spawn_flush_timer(self.flush_interval, shutdown);
        *self.flush_timer.lock() = Some(timer);

        self.replay_pending().await;
    }

    async fn handle_batch(&self, messages: Vec<LogMessage>) {
        for message in messages {
            if message.payload.is_empty() {
                self.discard(&message, "entry no longer in the log").await;
                continue;
            }

            match serde_json::from_slice::<ClickEvent>(&message.payload) {
                Ok(event) => {
                    self.processor
                        .ingest(PendingClick {
                            event,
                            delivery_id: message.id,
                        })
                        .await;
                }
                Err(e) => self.discard(&message, &e.to_string()).await,
            }
        }
    }

    async fn cleanup(&self) {
        let report = self.processor.flush().await;
        debug!(consumer = %self.consumer, ?report, "Final flush");

        let timer = self.flush_timer.lock().take();
        if let Some(timer) = timer
            && let Err(e) = timer.await
        {
            error!(consumer = %self.consumer, error = %e, "Flush timer task failed");
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub workers: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub poll_interval: Duration,
    /// How long an entry stays pending before any worker may claim it.
    pub claim_idle: Duration,
}

/// Starts `settings.workers` consumers named `worker-<n>`, each with its own
/// batch processor.
pub fn spawn_consumers(
    log: Arc<dyn EventLog>,
    deps: BatchDeps,
    settings: &ConsumerSettings,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..settings.workers.max(1))
        .map(|n| {
            let name = format!("worker-{n}");
            let processor = Arc::new(BatchProcessor::new(
                name.clone(),
                settings.batch_size,
                deps.clone(),
            ));
            let handler: Arc<dyn ConsumerHandler> = Arc::new(ClickConsumerHandler::new(
                name.clone(),
                log.clone(),
                processor,
                settings.flush_interval,
            ));

            tokio::spawn(run_consumer(
                name,
                log.clone(),
                handler,
                ReadSettings {
                    read_max: settings.batch_size,
                    poll_interval: settings.poll_interval,
                    claim_idle: settings.claim_idle,
                },
                shutdown.clone(),
            ))
        })
        .collect()
}

/// Read tuning of one consumer.
#[derive(Debug, Clone, Copy)]
pub struct ReadSettings {
    pub read_max: usize,
    pub poll_interval: Duration,
    pub claim_idle: Duration,
}

/// Reads new entries until shutdown, backing off for `poll_interval` when
/// the log is empty or unreachable.
///
/// Every `claim_idle` the consumer also claims entries that have been pending
/// that long under any consumer, which recovers entries of workers that no
/// longer run and entries whose acknowledgement failed.
///
/// Shutdown is honoured between reads, so the current batch of messages is
/// always handed over completely.
pub async fn run_consumer(
    name: String,
    log: Arc<dyn EventLog>,
    handler: Arc<dyn ConsumerHandler>,
    settings: ReadSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(consumer = %name, "Consumer started");
    handler.setup(shutdown.clone()).await;

    let read_max = settings.read_max.max(1);
    let mut last_claim = Instant::now();

    while !*shutdown.borrow() {
        if last_claim.elapsed() >= settings.claim_idle {
            last_claim = Instant::now();
            match log.claim(&name, settings.claim_idle, read_max).await {
                Ok(messages) if messages.is_empty() => {}
                Ok(messages) => {
                    info!(consumer = %name, count = messages.len(), "Recovering claimed entries");
                    handler.handle_batch(messages).await;
                }
                Err(e) => {
                    warn!(consumer = %name, error = %e, "Failed to claim idle entries");
                }
            }
        }

        let idle = match log.read(&name, ReadFrom::New, read_max).await {
            Ok(messages) if messages.is_empty() => true,
            Ok(messages) => {
                debug!(consumer = %name, count = messages.len(), "Received entries");
                handler.handle_batch(messages).await;
                false
            }
            Err(e) => {
                warn!(consumer = %name, error = %e, "Failed to read from event log");
                true
            }
        };

        if idle {
            tokio::select! {
                _ = tokio::time::sleep(settings.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }

    handler.cleanup().await;
    info!(consumer = %name, "Consumer stopped");
}
