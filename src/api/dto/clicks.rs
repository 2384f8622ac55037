//! DTOs for click recording and click counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::services::{ClickAnalytics, TimeframeCount};

/// Body of `POST /ads/click`. The client IP comes from the connection.
#[derive(Debug, Deserialize)]
pub struct ClickRequest {
    pub ad_id: String,
    pub playback_time: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClickAccepted {
    pub id: Uuid,
    pub message: String,
}

/// `?timeframe=` on the count endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct TimeframeQuery {
    pub timeframe: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClickCountResponse {
    pub ad_id: String,
    pub clicks: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl ClickCountResponse {
    pub fn total(ad_id: String, clicks: i64) -> Self {
        Self {
            ad_id,
            clicks,
            timeframe: None,
            start: None,
            end: None,
        }
    }
}

impl From<TimeframeCount> for ClickCountResponse {
    fn from(count: TimeframeCount) -> Self {
        Self {
            ad_id: count.ad_id,
            clicks: count.clicks,
            timeframe: Some(count.timeframe),
            start: Some(count.start),
            end: Some(count.end),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyticsResponse {
    pub ad_id: String,
    pub timeframe: String,
    pub clicks: i64,
    pub total_clicks: i64,
}

impl From<ClickAnalytics> for AnalyticsResponse {
    fn from(analytics: ClickAnalytics) -> Self {
        Self {
            ad_id: analytics.ad_id,
            timeframe: analytics.timeframe,
            clicks: analytics.clicks,
            total_clicks: analytics.total_clicks,
        }
    }
}
