//! Handlers for click recording and click counts.

use axum::{
    Json,
    extract::{ConnectInfo, Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde_json::json;
use std::net::SocketAddr;

use crate::api::dto::clicks::{
    AnalyticsResponse, ClickAccepted, ClickCountResponse, ClickRequest, TimeframeQuery,
};
use crate::domain::click_event::NewClick;
use crate::error::AppError;
use crate::state::AppState;

/// Records an ad click.
///
/// # Endpoint
///
/// `POST /ads/click`
///
/// # Request Body
///
/// ```json
/// { "ad_id": "ad-42", "playback_time": 12 }
/// ```
///
/// The client IP is taken from the peer address.
///
/// # Response
///
/// **202 Accepted** once the click is queued; persistence happens later.
///
/// ```json
/// { "id": "6f1c...", "message": "Click recorded" }
/// ```
///
/// # Errors
///
/// - 400 for a malformed body or click
/// - 404 for an unknown ad
/// - 429 when the client IP exceeded its hourly ceiling
/// - 503 when the click cannot be recorded anywhere
pub async fn record_click_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<ClickRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ClickAccepted>), AppError> {
    let Json(request) = payload.map_err(|e| {
        AppError::bad_request("Invalid request body", json!({ "reason": e.body_text() }))
    })?;

    let new_click = NewClick::new(request.ad_id, addr.ip().to_string(), request.playback_time);
    let event = state.click_service.record_click(new_click).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ClickAccepted {
            id: event.id,
            message: "Click recorded".to_string(),
        }),
    ))
}

/// Returns an ad's click count.
///
/// # Endpoint
///
/// `GET /ads/{id}/clicks[?timeframe=<n>(m|h|d)]`
///
/// Without `timeframe` the running total is returned from the counter cache.
/// With it, clicks in the trailing window are counted in storage; an empty
/// value means one hour.
///
/// # Errors
///
/// - 400 for a malformed timeframe
/// - 404 for an unknown ad
pub async fn click_count_handler(
    State(state): State<AppState>,
    Path(ad_id): Path<String>,
    Query(params): Query<TimeframeQuery>,
) -> Result<Json<ClickCountResponse>, AppError> {
    let response = match params.timeframe {
        Some(expr) => state
            .query_service
            .get_click_count_by_timeframe(&ad_id, &expr)
            .await?
            .into(),
        None => {
            let clicks = state.query_service.get_click_count(&ad_id).await?;
            ClickCountResponse::total(ad_id, clicks)
        }
    };

    Ok(Json(response))
}

/// Returns clicks in a window together with the running total.
///
/// # Endpoint
///
/// `GET /ads/{id}/analytics[?timeframe=<n>(m|h|d)]`
///
/// A missing or malformed timeframe means one hour.
pub async fn analytics_handler(
    State(state): State<AppState>,
    Path(ad_id): Path<String>,
    Query(params): Query<TimeframeQuery>,
) -> Result<Json<AnalyticsResponse>, AppError> {
    let expr = params.timeframe.unwrap_or_default();
    let analytics = state
        .query_service
        .get_click_analytics(&ad_id, &expr)
        .await?;

    Ok(Json(analytics.into()))
}
