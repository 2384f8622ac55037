//! Durable event log between ingress and the batch workers.
//!
//! Provides an [`EventLog`] trait with two implementations:
//! - [`RedisStreamLog`] - Production Redis Streams log with consumer groups
//! - [`InMemoryEventLog`] - Process-local log for development and tests

mod memory_log;
mod redis_stream_log;
mod service;

pub use memory_log::InMemoryEventLog;
pub use redis_stream_log::RedisStreamLog;
pub use service::{EventLog, LogError, LogMessage, LogResult, ReadFrom};

#[cfg(test)]
pub use service::MockEventLog;
