//! Dependency and pipeline health reporting.

use serde::Serialize;
use std::sync::Arc;

use crate::application::backup::DiskBackup;
use crate::application::circuit_breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
use crate::domain::repositories::ClickRepository;
use crate::infrastructure::event_log::EventLog;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub storage: bool,
    pub event_log: bool,
    pub breakers: Vec<BreakerSnapshot>,
    /// Backup files awaiting replay, `None` if the directory is unreadable.
    pub backup_backlog: Option<usize>,
}

impl HealthReport {
    /// Healthy means the pipeline can persist clicks right now.
    pub fn is_healthy(&self) -> bool {
        self.storage
            && self.event_log
            && self
                .breakers
                .iter()
                .all(|breaker| breaker.state == BreakerState::Closed)
    }
}

pub struct HealthService {
    repository: Arc<dyn ClickRepository>,
    log: Arc<dyn EventLog>,
    breakers: Vec<Arc<CircuitBreaker>>,
    backup: DiskBackup,
}

impl HealthService {
    pub fn new(
        repository: Arc<dyn ClickRepository>,
        log: Arc<dyn EventLog>,
        breakers: Vec<Arc<CircuitBreaker>>,
        backup: DiskBackup,
    ) -> Self {
        Self {
            repository,
            log,
            breakers,
            backup,
        }
    }

    pub async fn check(&self) -> HealthReport {
        let (storage, event_log, backlog) = tokio::join!(
            self.repository.health_check(),
            self.log.health_check(),
            self.backup.list(),
        );

        HealthReport {
            storage,
            event_log,
            breakers: self.breakers.iter().map(|b| b.snapshot()).collect(),
            backup_backlog: backlog.ok().map(|files| files.len()),
        }
    }
}
