//! HTTP request handlers for API endpoints.

pub mod clicks;
pub mod health;

pub use clicks::{analytics_handler, click_count_handler, record_click_handler};
pub use health::health_handler;
