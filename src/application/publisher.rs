//! Publication of accepted clicks onto the durable log, with disk fallback.

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::application::backup::DiskBackup;
use crate::application::circuit_breaker::CircuitBreaker;
use crate::domain::click_event::ClickEvent;
use crate::infrastructure::event_log::EventLog;

/// Where a published click ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Appended to the durable log.
    Published,
    /// The log refused or was unreachable; written to the disk backup.
    BackedUp,
    /// Neither the log nor the disk backup accepted it.
    Lost,
}

impl PublishOutcome {
    /// Whether the click is durably held somewhere.
    pub fn is_durable(self) -> bool {
        !matches!(self, Self::Lost)
    }
}

/// Publishes clicks through the log breaker, falling back to the disk backup.
///
/// Used both at ingress and when a failed batch is re-queued.
pub struct ClickPublisher {
    log: Arc<dyn EventLog>,
    breaker: Arc<CircuitBreaker>,
    backup: DiskBackup,
}

impl ClickPublisher {
    pub fn new(log: Arc<dyn EventLog>, breaker: Arc<CircuitBreaker>, backup: DiskBackup) -> Self {
        Self {
            log,
            breaker,
            backup,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn backup(&self) -> &DiskBackup {
        &self.backup
    }

    /// Publishes one click, never returning an error.
    ///
    /// A [`PublishOutcome::Lost`] result has already been logged at error
    /// level; it is the only path on which an accepted click disappears.
    pub async fn publish(&self, event: &ClickEvent) -> PublishOutcome {
        if self.breaker.is_open() {
            debug!(click_id = %event.id, "Event log circuit open, backing up click");
        } else {
            match self.log.publish(event).await {
                Ok(()) => {
                    self.breaker.record_success();
                    return PublishOutcome::Published;
                }
                Err(e) => {
                    self.breaker.record_failure();
                    warn!(click_id = %event.id, error = %e, "Failed to publish click, backing up");
                }
            }
        }

        self.back_up(event).await
    }

    /// Writes a click straight to the disk backup.
    pub async fn back_up(&self, event: &ClickEvent) -> PublishOutcome {
        match self.backup.save(event).await {
            Ok(_) => {
                metrics::counter!("clicks_backed_up_total").increment(1);
                PublishOutcome::BackedUp
            }
            Err(e) => {
                metrics::counter!("clicks_lost_total").increment(1);
                error!(
                    permanent_loss = true,
                    click_id = %event.id,
                    ad_id = %event.ad_id,
                    error = %e,
                    "Click lost: event log and disk backup both failed"
                );
                PublishOutcome::Lost
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::click_event::NewClick;
    use crate::infrastructure::event_log::{LogError, MockEventLog};
    use std::time::Duration;
    use tempfile::TempDir;

    fn click() -> ClickEvent {
        ClickEvent::accept(NewClick::new("ad-1", "10.0.0.1", 5))
    }

    fn publisher(log: MockEventLog, dir: &std::path::Path, threshold: u32) -> ClickPublisher {
        ClickPublisher::new(
            Arc::new(log),
            Arc::new(CircuitBreaker::new(
                "event-log",
                threshold,
                Duration::from_secs(60),
            )),
            DiskBackup::new(dir),
        )
    }

    #[tokio::test]
    async fn test_publish_success_goes_to_log() {
        let tmp = TempDir::new().unwrap();
        let mut log = MockEventLog::new();
        log.expect_publish().times(1).returning(|_| Ok(()));
        let publisher = publisher(log, tmp.path(), 3);

        assert_eq!(publisher.publish(&click()).await, PublishOutcome::Published);
        assert!(publisher.backup().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_falls_back_to_disk() {
        let tmp = TempDir::new().unwrap();
        let mut log = MockEventLog::new();
        log.expect_publish()
            .times(1)
            .returning(|_| Err(LogError::Unavailable("broker down".to_string())));
        let publisher = publisher(log, tmp.path(), 3);
        let event = click();

        assert_eq!(publisher.publish(&event).await, PublishOutcome::BackedUp);

        let files = publisher.backup().list().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(publisher.backup().read(&files[0]).await.unwrap(), event);
        assert_eq!(publisher.breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_log() {
        let tmp = TempDir::new().unwrap();
        let mut log = MockEventLog::new();
        log.expect_publish()
            .times(1)
            .returning(|_| Err(LogError::Unavailable("broker down".to_string())));
        let publisher = publisher(log, tmp.path(), 1);

        assert_eq!(publisher.publish(&click()).await, PublishOutcome::BackedUp);
        assert_eq!(publisher.publish(&click()).await, PublishOutcome::BackedUp);
        assert_eq!(publisher.backup().list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_both_paths_failing_is_lost() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"file in the way").unwrap();

        let mut log = MockEventLog::new();
        log.expect_publish()
            .returning(|_| Err(LogError::Unavailable("broker down".to_string())));
        let publisher = publisher(log, &blocker, 3);

        let outcome = publisher.publish(&click()).await;

        assert_eq!(outcome, PublishOutcome::Lost);
        assert!(!outcome.is_durable());
    }
}
