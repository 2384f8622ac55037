//! DTOs for health check endpoint.

use serde::Serialize;

use crate::application::circuit_breaker::BreakerSnapshot;

/// Health check response with component status.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

/// Health status for each system component.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub storage: CheckStatus,
    pub event_log: CheckStatus,
    pub breakers: Vec<BreakerSnapshot>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_backlog: Option<usize>,
}

/// Individual component health status.
#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckStatus {
    pub fn from_check(ok: bool, failure: &str) -> Self {
        if ok {
            Self {
                status: "ok".to_string(),
                message: None,
            }
        } else {
            Self {
                status: "error".to_string(),
                message: Some(failure.to_string()),
            }
        }
    }
}
