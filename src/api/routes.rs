//! API route configuration.

use crate::api::handlers::{analytics_handler, click_count_handler, record_click_handler};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// Click ingestion and query routes.
///
/// # Endpoints
///
/// - `POST /ads/click`            - Record a click
/// - `GET  /ads/{id}/clicks`      - Running total, or a window with `?timeframe=`
/// - `GET  /ads/{id}/analytics`   - Window count plus running total
pub fn click_routes() -> Router<AppState> {
    Router::new()
        .route("/ads/click", post(record_click_handler))
        .route("/ads/{id}/clicks", get(click_count_handler))
        .route("/ads/{id}/analytics", get(analytics_handler))
}
