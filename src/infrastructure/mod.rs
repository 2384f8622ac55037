//! Infrastructure layer for external integrations.
//!
//! This layer implements interfaces defined by the domain and application
//! layers, providing concrete implementations for persistence and transport.
//!
//! # Modules
//!
//! - [`event_log`] - Durable event log (Redis Streams and in-memory)
//! - [`persistence`] - PostgreSQL repository implementations

pub mod event_log;
pub mod persistence;
