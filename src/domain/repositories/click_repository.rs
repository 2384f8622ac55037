//! Repository trait for click storage and per-ad totals.

use crate::domain::click_event::ClickEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Failure of the storage collaborator.
///
/// Opaque to the pipeline: every variant counts as one breaker failure.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Repository interface for click rows, per-ad running totals and ad lookup.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgClickRepository`] - PostgreSQL implementation
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClickRepository: Send + Sync {
    /// Inserts a batch of click rows in one statement.
    ///
    /// Rows whose id already exists are skipped, so a redelivered event is
    /// stored once.
    ///
    /// # Returns
    ///
    /// The ids of the rows that were actually inserted.
    async fn insert_clicks(&self, clicks: &[ClickEvent]) -> Result<Vec<Uuid>, StorageError>;

    /// Inserts a single click row.
    ///
    /// # Returns
    ///
    /// `true` if the row was inserted, `false` if it already existed.
    async fn insert_click(&self, click: &ClickEvent) -> Result<bool, StorageError>;

    /// Adds `delta` to the stored running total of an ad, creating it if absent.
    async fn increment_ad_total(&self, ad_id: &str, delta: i64) -> Result<(), StorageError>;

    /// Reads the stored running total of an ad (`0` if none is stored).
    async fn get_ad_total(&self, ad_id: &str) -> Result<i64, StorageError>;

    /// Counts clicks for an ad with `start <= clicked_at <= end`.
    async fn count_clicks_in_range(
        &self,
        ad_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, StorageError>;

    /// Checks whether an ad with this id exists.
    async fn ad_exists(&self, ad_id: &str) -> Result<bool, StorageError>;

    /// Checks if the storage backend is reachable.
    async fn health_check(&self) -> bool;
}
