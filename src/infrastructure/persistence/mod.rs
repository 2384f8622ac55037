//! PostgreSQL repository implementations.
//!
//! Concrete implementations of domain repository traits using SQLx.
//!
//! # Repositories
//!
//! - [`PgClickRepository`] - Click rows, per-ad totals and ad lookup

pub mod pg_click_repository;

pub use pg_click_repository::PgClickRepository;
