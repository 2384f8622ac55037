//! Bounded ingress queue drained by a supervised publish pool.
//!
//! Accepted clicks are queued without waiting for the durable log. A
//! dispatcher task publishes them with at most `concurrency` publishes in
//! flight. A full queue is reported to the caller instead of growing.

use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::application::publisher::ClickPublisher;
use crate::domain::click_event::ClickEvent;

/// Errors returned when a click cannot be queued. Both carry the click back.
#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("Ingress queue is full")]
    QueueFull(Box<ClickEvent>),

    #[error("Ingress queue is closed")]
    Closed(Box<ClickEvent>),
}

impl IngressError {
    pub fn into_event(self) -> ClickEvent {
        match self {
            Self::QueueFull(event) | Self::Closed(event) => *event,
        }
    }
}

/// Cloneable sender side of the ingress queue.
#[derive(Clone)]
pub struct IngressHandle {
    tx: mpsc::Sender<ClickEvent>,
}

impl IngressHandle {
    /// Queues a click without waiting.
    pub fn submit(&self, event: ClickEvent) -> Result<(), IngressError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(event) => IngressError::QueueFull(Box::new(event)),
            mpsc::error::TrySendError::Closed(event) => IngressError::Closed(Box::new(event)),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_sender(tx: mpsc::Sender<ClickEvent>) -> Self {
        Self { tx }
    }

    /// Free slots in the queue.
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }
}

pub struct IngressPool;

impl IngressPool {
    /// Starts the dispatcher.
    ///
    /// When `shutdown` turns `true` the queue stops accepting, everything
    /// already queued is published, and the returned task completes once the
    /// last publish has finished.
    pub fn start(
        publisher: Arc<ClickPublisher>,
        capacity: usize,
        concurrency: usize,
        shutdown: watch::Receiver<bool>,
    ) -> (IngressHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(dispatch(rx, publisher, concurrency.max(1), shutdown));
        (IngressHandle { tx }, task)
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<ClickEvent>,
    publisher: Arc<ClickPublisher>,
    concurrency: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let permits = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    let mut draining = false;

    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            changed = shutdown.changed(), if !draining => {
                if changed.is_err() || *shutdown.borrow() {
                    draining = true;
                    rx.close();
                    debug!(queued = rx.len(), "Draining ingress queue");
                }
                continue;
            }
        };
        let Some(event) = event else { break };

        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let publisher = publisher.clone();
        tasks.spawn(async move {
            let _permit = permit;
            publisher.publish(&event).await;
        });

        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "Ingress publish task failed");
            }
        }
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Ingress publish task failed");
        }
    }
    info!("Ingress pool drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backup::DiskBackup;
    use crate::application::circuit_breaker::CircuitBreaker;
    use crate::domain::click_event::NewClick;
    use crate::infrastructure::event_log::InMemoryEventLog;
    use std::time::Duration;
    use tempfile::TempDir;

    fn click() -> ClickEvent {
        ClickEvent::accept(NewClick::new("ad-1", "10.0.0.1", 5))
    }

    fn publisher(log: Arc<InMemoryEventLog>, dir: &std::path::Path) -> Arc<ClickPublisher> {
        Arc::new(ClickPublisher::new(
            log,
            Arc::new(CircuitBreaker::new("event-log", 5, Duration::from_secs(30))),
            DiskBackup::new(dir),
        ))
    }

    #[tokio::test]
    async fn test_submitted_clicks_reach_the_log() {
        let tmp = TempDir::new().unwrap();
        let log = Arc::new(InMemoryEventLog::new());
        let (tx, rx) = watch::channel(false);
        let (handle, task) = IngressPool::start(publisher(log.clone(), tmp.path()), 100, 4, rx);

        for _ in 0..20 {
            handle.submit(click()).unwrap();
        }
        tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(log.backlog(), 20);
    }

    #[tokio::test]
    async fn test_full_queue_returns_the_click() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = IngressHandle { tx };

        handle.submit(click()).unwrap();
        let event = click();
        let err = handle.submit(event.clone()).unwrap_err();

        assert!(matches!(err, IngressError::QueueFull(_)));
        assert_eq!(err.into_event(), event);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_then_rejects() {
        let tmp = TempDir::new().unwrap();
        let log = Arc::new(InMemoryEventLog::new());
        let (tx, rx) = watch::channel(false);
        let (handle, task) = IngressPool::start(publisher(log.clone(), tmp.path()), 1000, 1, rx);

        for _ in 0..200 {
            handle.submit(click()).unwrap();
        }
        tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(log.backlog(), 200);
        assert!(matches!(
            handle.submit(click()),
            Err(IngressError::Closed(_))
        ));
    }
}
