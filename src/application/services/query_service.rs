//! Click count queries.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::application::ad_directory::AdDirectory;
use crate::application::counter_cache::CounterCache;
use crate::domain::repositories::ClickRepository;
use crate::domain::timeframe::{TimeframeError, parse_timeframe, parse_timeframe_or_default};
use crate::error::AppError;

/// Clicks counted over a trailing window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeframeCount {
    pub ad_id: String,
    pub timeframe: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub clicks: i64,
}

/// Range count combined with the running total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickAnalytics {
    pub ad_id: String,
    pub timeframe: String,
    pub clicks: i64,
    pub total_clicks: i64,
}

/// Serves count queries, cache-first for running totals and straight from
/// storage for time ranges.
pub struct QueryService {
    repository: Arc<dyn ClickRepository>,
    cache: Arc<CounterCache>,
    ads: Arc<AdDirectory>,
}

impl QueryService {
    pub fn new(
        repository: Arc<dyn ClickRepository>,
        cache: Arc<CounterCache>,
        ads: Arc<AdDirectory>,
    ) -> Self {
        Self {
            repository,
            cache,
            ads,
        }
    }

    /// Whether an ad exists.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unavailable`] if storage cannot be reached.
    pub async fn ad_exists(&self, ad_id: &str) -> Result<bool, AppError> {
        Ok(self.ads.exists(ad_id).await?)
    }

    async fn require_ad(&self, ad_id: &str) -> Result<(), AppError> {
        if self.ad_exists(ad_id).await? {
            Ok(())
        } else {
            Err(AppError::not_found("Ad not found", json!({ "ad_id": ad_id })))
        }
    }

    /// Running click total of an ad.
    ///
    /// Served from the counter cache; a miss is seeded from storage.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown ad.
    pub async fn get_click_count(&self, ad_id: &str) -> Result<i64, AppError> {
        if let Some(count) = self.cache.peek(ad_id) {
            return Ok(count);
        }

        self.require_ad(ad_id).await?;
        Ok(self.cache.get(ad_id).await?)
    }

    /// Clicks in the trailing window given by `expr` (`<n>m`, `<n>h`, `<n>d`;
    /// empty means one hour).
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] for a malformed `expr`
    /// - [`AppError::NotFound`] for an unknown ad
    pub async fn get_click_count_by_timeframe(
        &self,
        ad_id: &str,
        expr: &str,
    ) -> Result<TimeframeCount, AppError> {
        let window = parse_timeframe(expr)?;
        self.require_ad(ad_id).await?;

        let (start, end, clicks) = self.count_window(ad_id, window).await?;

        Ok(TimeframeCount {
            ad_id: ad_id.to_string(),
            timeframe: display_expr(expr),
            start,
            end,
            clicks,
        })
    }

    /// Like [`Self::get_click_count_by_timeframe`], but a malformed `expr`
    /// quietly means one hour. Also reports the running total.
    pub async fn get_click_analytics(
        &self,
        ad_id: &str,
        expr: &str,
    ) -> Result<ClickAnalytics, AppError> {
        let window = parse_timeframe_or_default(expr);
        let timeframe = match parse_timeframe(expr) {
            Ok(_) => display_expr(expr),
            Err(_) => display_expr(""),
        };
        self.require_ad(ad_id).await?;

        let (_, _, clicks) = self.count_window(ad_id, window).await?;
        let total_clicks = self.cache.get(ad_id).await?;

        Ok(ClickAnalytics {
            ad_id: ad_id.to_string(),
            timeframe,
            clicks,
            total_clicks,
        })
    }

    async fn count_window(
        &self,
        ad_id: &str,
        window: Duration,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>, i64), AppError> {
        let end = Utc::now();
        let start = end.checked_sub_signed(window).ok_or_else(|| {
            TimeframeError::OutOfRange(format!("{}s", window.num_seconds()))
        })?;
        let clicks = self
            .repository
            .count_clicks_in_range(ad_id, start, end)
            .await?;
        Ok((start, end, clicks))
    }
}

fn display_expr(expr: &str) -> String {
    match expr.trim() {
        "" => "1h".to_string(),
        expr => expr.to_string(),
    }
}
