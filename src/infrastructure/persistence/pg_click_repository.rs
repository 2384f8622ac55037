//! PostgreSQL implementation of the click repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::click_event::ClickEvent;
use crate::domain::repositories::{ClickRepository, StorageError};

/// PostgreSQL repository for click rows and per-ad running totals.
pub struct PgClickRepository {
    pool: Arc<PgPool>,
}

impl PgClickRepository {
    /// Creates a new repository with a database connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClickRepository for PgClickRepository {
    async fn insert_clicks(&self, clicks: &[ClickEvent]) -> Result<Vec<Uuid>, StorageError> {
        if clicks.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO clicks (id, ad_id, ip, playback_time, clicked_at) ");

        builder.push_values(clicks, |mut row, click| {
            row.push_bind(click.id)
                .push_bind(&click.ad_id)
                .push_bind(&click.ip)
                .push_bind(click.playback_time)
                .push_bind(click.timestamp);
        });
        builder.push(" ON CONFLICT (id) DO NOTHING RETURNING id");

        let inserted: Vec<Uuid> = builder
            .build_query_scalar()
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(inserted)
    }

    async fn insert_click(&self, click: &ClickEvent) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO clicks (id, ad_id, ip, playback_time, clicked_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(click.id)
        .bind(&click.ad_id)
        .bind(&click.ip)
        .bind(click.playback_time)
        .bind(click.timestamp)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment_ad_total(&self, ad_id: &str, delta: i64) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO ad_click_totals (ad_id, total, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (ad_id)
            DO UPDATE SET total = ad_click_totals.total + EXCLUDED.total,
                          updated_at = NOW()
            "#,
        )
        .bind(ad_id)
        .bind(delta)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn get_ad_total(&self, ad_id: &str) -> Result<i64, StorageError> {
        let total: Option<i64> =
            sqlx::query_scalar("SELECT total FROM ad_click_totals WHERE ad_id = $1")
                .bind(ad_id)
                .fetch_optional(self.pool.as_ref())
                .await?;

        Ok(total.unwrap_or(0))
    }

    async fn count_clicks_in_range(
        &self,
        ad_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM clicks
            WHERE ad_id = $1
              AND clicked_at >= $2
              AND clicked_at <= $3
            "#,
        )
        .bind(ad_id)
        .bind(start)
        .bind(end)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn ad_exists(&self, ad_id: &str) -> Result<bool, StorageError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM ads WHERE id = $1)")
            .bind(ad_id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(exists)
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await
            .is_ok()
    }
}
