//! Event log trait and error types.

use crate::domain::click_event::ClickEvent;
use async_trait::async_trait;
use std::time::Duration;

/// Errors that can occur while talking to the durable event log.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Event log connection error: {0}")]
    Connection(String),

    #[error("Event log operation error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Event serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event log unavailable: {0}")]
    Unavailable(String),
}

/// Result type for event log operations.
pub type LogResult<T> = Result<T, LogError>;

/// A message delivered to a consumer but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    /// Log-assigned id, used for acknowledgement.
    pub id: String,
    /// Serialized [`ClickEvent`]; empty if the entry was trimmed from the log.
    pub payload: Vec<u8>,
}

/// Where a consumer read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrom {
    /// Entries already delivered to this consumer but never acknowledged.
    Pending,
    /// Entries never delivered to any consumer of the group.
    New,
}

/// At-least-once transport between ingress and the batch workers.
///
/// A single topic is consumed by a single consumer group; each consumer
/// (identified by name) receives a disjoint slice of the topic.
///
/// # Implementations
///
/// - [`crate::infrastructure::event_log::RedisStreamLog`] - Redis Streams
/// - [`crate::infrastructure::event_log::InMemoryEventLog`] - process-local log
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Creates the topic and consumer group. Already existing is not an error.
    async fn ensure_topic(&self) -> LogResult<()>;

    /// Appends an event to the topic.
    ///
    /// Returns only after the log has acknowledged the append.
    async fn publish(&self, event: &ClickEvent) -> LogResult<()>;

    /// Reads up to `max` messages for `consumer`.
    ///
    /// Returns an empty vector when nothing is available; never blocks waiting
    /// for new entries.
    async fn read(&self, consumer: &str, from: ReadFrom, max: usize)
    -> LogResult<Vec<LogMessage>>;

    /// Takes over up to `max` entries that have been pending for at least
    /// `min_idle` under any consumer, including `consumer` itself, and
    /// returns them as delivered to `consumer`.
    ///
    /// Recovers entries stranded by a consumer that stopped running or that
    /// failed to acknowledge.
    async fn claim(
        &self,
        consumer: &str,
        min_idle: Duration,
        max: usize,
    ) -> LogResult<Vec<LogMessage>>;

    /// Acknowledges processed messages and drops them from the log, so they
    /// are neither redelivered nor retained.
    async fn ack(&self, ids: &[String]) -> LogResult<()>;

    /// Checks if the log backend is reachable.
    async fn health_check(&self) -> bool;
}
