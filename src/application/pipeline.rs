//! Assembly and lifecycle of the click pipeline.
//!
//! [`Pipeline::start`] wires the components around one repository and one
//! event log and spawns every background task. [`Pipeline::shutdown`] stops
//! them in dependency order:
//!
//! 1. ingress stops accepting and publishes what it already queued
//! 2. consumers finish their current read and flush their batch
//! 3. the reconciliation sweeper stops

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::ad_directory::AdDirectory;
use crate::application::backup::DiskBackup;
use crate::application::batch_processor::BatchDeps;
use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::consumer::{ConsumerSettings, spawn_consumers};
use crate::application::counter_cache::CounterCache;
use crate::application::ingress::IngressPool;
use crate::application::publisher::ClickPublisher;
use crate::application::rate_limiter::ClickRateLimiter;
use crate::application::services::{ClickService, HealthService, QueryService};
use crate::application::sweeper::ReconciliationSweeper;
use crate::config::Config;
use crate::domain::repositories::ClickRepository;
use crate::infrastructure::event_log::EventLog;

/// Tuning knobs of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub queue_capacity: usize,
    pub ingress_concurrency: usize,
    pub consumer_workers: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub poll_interval: Duration,
    pub claim_idle: Duration,
    pub sweep_interval: Duration,
    pub backup_dir: PathBuf,
    pub breaker_threshold: u32,
    pub breaker_reset: Duration,
    pub rate_limit_per_hour: u32,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            queue_capacity: config.click_queue_capacity,
            ingress_concurrency: config.ingress_concurrency,
            consumer_workers: config.consumer_workers,
            batch_size: config.batch_size,
            flush_interval: config.flush_interval(),
            poll_interval: config.poll_interval(),
            claim_idle: config.claim_idle(),
            sweep_interval: config.sweep_interval(),
            backup_dir: config.backup_dir.clone(),
            breaker_threshold: config.breaker_threshold,
            breaker_reset: config.breaker_reset(),
            rate_limit_per_hour: config.rate_limit_per_hour,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            ingress_concurrency: 8,
            consumer_workers: 4,
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
            claim_idle: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(40 * 60),
            backup_dir: PathBuf::from("./backup/clicks"),
            breaker_threshold: 5,
            breaker_reset: Duration::from_secs(30),
            rate_limit_per_hour: 30,
        }
    }
}

/// A running pipeline.
pub struct Pipeline {
    pub click_service: Arc<ClickService>,
    pub query_service: Arc<QueryService>,
    pub health_service: Arc<HealthService>,
    pub cache: Arc<CounterCache>,
    pub storage_breaker: Arc<CircuitBreaker>,
    pub log_breaker: Arc<CircuitBreaker>,
    pub backup: DiskBackup,

    ingress_stop: watch::Sender<bool>,
    workers_stop: watch::Sender<bool>,
    ingress_task: JoinHandle<()>,
    consumer_tasks: Vec<JoinHandle<()>>,
    sweeper_task: JoinHandle<()>,
}

impl Pipeline {
    /// Builds every component and spawns the background tasks.
    ///
    /// Must be called from within a tokio runtime. The event log's topic is
    /// expected to exist already.
    pub fn start(
        repository: Arc<dyn ClickRepository>,
        log: Arc<dyn EventLog>,
        settings: PipelineSettings,
    ) -> Self {
        let storage_breaker = Arc::new(CircuitBreaker::new(
            "storage",
            settings.breaker_threshold,
            settings.breaker_reset,
        ));
        let log_breaker = Arc::new(CircuitBreaker::new(
            "event-log",
            settings.breaker_threshold,
            settings.breaker_reset,
        ));
        let backup = DiskBackup::new(&settings.backup_dir);
        let cache = Arc::new(CounterCache::new(repository.clone()));
        let ads = Arc::new(AdDirectory::new(repository.clone()));
        let rate_limiter = Arc::new(ClickRateLimiter::new(settings.rate_limit_per_hour));
        let publisher = Arc::new(ClickPublisher::new(
            log.clone(),
            log_breaker.clone(),
            backup.clone(),
        ));

        let (ingress_stop, ingress_rx) = watch::channel(false);
        let (workers_stop, workers_rx) = watch::channel(false);

        let (ingress, ingress_task) = IngressPool::start(
            publisher.clone(),
            settings.queue_capacity,
            settings.ingress_concurrency,
            ingress_rx,
        );

        let consumer_tasks = spawn_consumers(
            log.clone(),
            BatchDeps {
                repository: repository.clone(),
                storage_breaker: storage_breaker.clone(),
                cache: cache.clone(),
                publisher: publisher.clone(),
                log: log.clone(),
            },
            &ConsumerSettings {
                workers: settings.consumer_workers,
                batch_size: settings.batch_size,
                flush_interval: settings.flush_interval,
                poll_interval: settings.poll_interval,
                claim_idle: settings.claim_idle,
            },
            workers_rx.clone(),
        );

        let sweeper = ReconciliationSweeper::new(
            backup.clone(),
            repository.clone(),
            storage_breaker.clone(),
            cache.clone(),
        )
        .with_rate_limiter(rate_limiter.clone());
        let sweeper_task = Arc::new(sweeper).spawn(settings.sweep_interval, workers_rx);

        let click_service = Arc::new(ClickService::new(
            ads.clone(),
            rate_limiter,
            ingress,
            publisher,
        ));
        let query_service = Arc::new(QueryService::new(repository.clone(), cache.clone(), ads));
        let health_service = Arc::new(HealthService::new(
            repository,
            log,
            vec![storage_breaker.clone(), log_breaker.clone()],
            backup.clone(),
        ));

        info!(
            workers = settings.consumer_workers,
            batch_size = settings.batch_size,
            "Click pipeline started"
        );

        Self {
            click_service,
            query_service,
            health_service,
            cache,
            storage_breaker,
            log_breaker,
            backup,
            ingress_stop,
            workers_stop,
            ingress_task,
            consumer_tasks,
            sweeper_task,
        }
    }

    /// Stops the pipeline and waits for every task to finish.
    pub async fn shutdown(self) {
        info!("Stopping click pipeline");

        let _ = self.ingress_stop.send(true);
        if let Err(e) = self.ingress_task.await {
            error!(error = %e, "Ingress task failed");
        }

        let _ = self.workers_stop.send(true);
        for task in self.consumer_tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Consumer task failed");
            }
        }
        if let Err(e) = self.sweeper_task.await {
            error!(error = %e, "Sweeper task failed");
        }

        info!(total = self.cache.total(), "Click pipeline stopped");
    }
}
