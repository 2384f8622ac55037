//! Process-local event log.

use super::service::{EventLog, LogMessage, LogResult, ReadFrom};
use crate::domain::click_event::ClickEvent;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

/// An event log kept in memory, with the same delivery and acknowledgement
/// semantics as the Redis implementation.
///
/// Entries do not survive a restart. Used when Redis is not configured and
/// in tests.
pub struct InMemoryEventLog {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    undelivered: VecDeque<(String, Vec<u8>)>,
    pending: BTreeMap<String, PendingEntry>,
}

struct PendingEntry {
    consumer: String,
    payload: Vec<u8>,
    delivered_at: Instant,
}

impl InMemoryEventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        debug!("Using InMemoryEventLog (entries are not durable across restarts)");
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Number of entries not yet delivered to any consumer.
    pub fn backlog(&self) -> usize {
        self.inner.lock().undelivered.len()
    }

    /// Number of entries delivered but not acknowledged.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Number of entries the log still holds. Acknowledged entries are
    /// dropped, so this is `backlog() + pending()`.
    pub fn retained(&self) -> usize {
        let inner = self.inner.lock();
        inner.undelivered.len() + inner.pending.len()
    }

    /// Appends a raw payload, bypassing serialization.
    pub fn publish_raw(&self, payload: Vec<u8>) -> String {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let id = format!("{:020}-0", inner.next_seq);
        inner.undelivered.push_back((id.clone(), payload));
        id
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn ensure_topic(&self) -> LogResult<()> {
        Ok(())
    }

    async fn publish(&self, event: &ClickEvent) -> LogResult<()> {
        let payload = serde_json::to_vec(event)?;
        self.publish_raw(payload);
        Ok(())
    }

    async fn read(
        &self,
        consumer: &str,
        from: ReadFrom,
        max: usize,
    ) -> LogResult<Vec<LogMessage>> {
        let mut inner = self.inner.lock();

        let messages = match from {
            ReadFrom::Pending => {
                let now = Instant::now();
                inner
                    .pending
                    .iter_mut()
                    .filter(|(_, entry)| entry.consumer == consumer)
                    .take(max)
                    .map(|(id, entry)| {
                        entry.delivered_at = now;
                        LogMessage {
                            id: id.clone(),
                            payload: entry.payload.clone(),
                        }
                    })
                    .collect()
            }
            ReadFrom::New => {
                let count = max.min(inner.undelivered.len());
                let delivered: Vec<_> = inner.undelivered.drain(..count).collect();

                delivered
                    .into_iter()
                    .map(|(id, payload)| {
                        inner.pending.insert(
                            id.clone(),
                            PendingEntry {
                                consumer: consumer.to_string(),
                                payload: payload.clone(),
                                delivered_at: Instant::now(),
                            },
                        );
                        LogMessage { id, payload }
                    })
                    .collect()
            }
        };

        Ok(messages)
    }

    async fn claim(
        &self,
        consumer: &str,
        min_idle: Duration,
        max: usize,
    ) -> LogResult<Vec<LogMessage>> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let claimed: Vec<LogMessage> = inner
            .pending
            .iter_mut()
            .filter(|(_, entry)| now.duration_since(entry.delivered_at) >= min_idle)
            .take(max)
            .map(|(id, entry)| {
                entry.consumer = consumer.to_string();
                entry.delivered_at = now;
                LogMessage {
                    id: id.clone(),
                    payload: entry.payload.clone(),
                }
            })
            .collect();

        if !claimed.is_empty() {
            debug!(consumer, claimed = claimed.len(), "Claimed idle pending entries");
        }
        Ok(claimed)
    }

    async fn ack(&self, ids: &[String]) -> LogResult<()> {
        let mut inner = self.inner.lock();
        for id in ids {
            inner.pending.remove(id);
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
