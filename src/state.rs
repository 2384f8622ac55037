//! Shared state injected into HTTP handlers.

use std::sync::Arc;

use crate::application::pipeline::Pipeline;
use crate::application::services::{ClickService, HealthService, QueryService};

#[derive(Clone)]
pub struct AppState {
    pub click_service: Arc<ClickService>,
    pub query_service: Arc<QueryService>,
    pub health_service: Arc<HealthService>,
}

impl AppState {
    pub fn new(
        click_service: Arc<ClickService>,
        query_service: Arc<QueryService>,
        health_service: Arc<HealthService>,
    ) -> Self {
        Self {
            click_service,
            query_service,
            health_service,
        }
    }

    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        Self::new(
            pipeline.click_service.clone(),
            pipeline.query_service.clone(),
            pipeline.health_service.clone(),
        )
    }
}
