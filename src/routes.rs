//! Top-level router.
//!
//! # Route Structure
//!
//! - `GET  /health`               - Dependency and breaker health
//! - `POST /ads/click`            - Click ingestion
//! - `GET  /ads/{id}/clicks`      - Click counts
//! - `GET  /ads/{id}/analytics`   - Click analytics
//!
//! Every request is traced, and trailing slashes are trimmed.

use crate::api;
use crate::api::handlers::health_handler;
use crate::api::middleware::tracing;
use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};

/// Constructs the application router with all routes and middleware.
pub fn app_router(state: AppState) -> NormalizePath<Router> {
    let router = Router::new()
        .route("/health", get(health_handler))
        .merge(api::routes::click_routes())
        .with_state(state)
        .layer(tracing::layer());

    NormalizePathLayer::trim_trailing_slash().layer(router)
}
