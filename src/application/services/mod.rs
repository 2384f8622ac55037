//! Services consumed by the HTTP layer.

pub mod click_service;
pub mod health_service;
pub mod query_service;

pub use click_service::ClickService;
pub use health_service::{HealthReport, HealthService};
pub use query_service::{ClickAnalytics, QueryService, TimeframeCount};
