//! Handler for health check endpoint.

use axum::{Json, extract::State, http::StatusCode};

use crate::api::dto::health::{CheckStatus, HealthChecks, HealthResponse};
use crate::state::AppState;

/// Returns service health status with component checks.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response Codes
///
/// - **200 OK**: storage and event log reachable, every breaker closed
/// - **503 Service Unavailable**: otherwise; clicks are still accepted but
///   pile up in the log or the backup directory
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "checks": {
///     "storage": { "status": "ok" },
///     "event_log": { "status": "ok" },
///     "breakers": [
///       { "name": "storage", "state": "closed", "failure_count": 0 },
///       { "name": "event-log", "state": "closed", "failure_count": 0 }
///     ],
///     "backup_backlog": 0
///   }
/// }
/// ```
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let report = state.health_service.check().await;
    let healthy = report.is_healthy();

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            storage: CheckStatus::from_check(report.storage, "Database unreachable"),
            event_log: CheckStatus::from_check(report.event_log, "Event log unreachable"),
            breakers: report.breakers,
            backup_backlog: report.backup_backlog,
        },
    };

    if healthy {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
