//! Application layer: the click pipeline and the services built on it.
//!
//! # Write path
//!
//! [`services::ClickService`] validates a click and queues it on the
//! [`ingress`] pool, which publishes through [`publisher::ClickPublisher`] to
//! the durable log (or the [`backup`] directory when the log is down).
//! [`consumer`] workers read the log and feed per-worker
//! [`batch_processor::BatchProcessor`]s, which write to storage behind a
//! [`circuit_breaker::CircuitBreaker`] and update the [`counter_cache`].
//! The [`sweeper`] periodically replays the backup directory.
//!
//! # Read path
//!
//! [`services::QueryService`] answers counts from the counter cache or, for
//! time ranges, directly from storage.
//!
//! [`pipeline::Pipeline`] assembles all of the above.

pub mod ad_directory;
pub mod backup;
pub mod batch_processor;
pub mod circuit_breaker;
pub mod consumer;
pub mod counter_cache;
pub mod ingress;
pub mod pipeline;
pub mod publisher;
pub mod rate_limiter;
pub mod services;
pub mod sweeper;
