#![allow(dead_code)]

use admetric::application::pipeline::{Pipeline, PipelineSettings};
use admetric::domain::click_event::ClickEvent;
use admetric::domain::repositories::{ClickRepository, StorageError};
use admetric::infrastructure::event_log::InMemoryEventLog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    ads: HashSet<String>,
    clicks: HashMap<Uuid, ClickEvent>,
    totals: HashMap<String, i64>,
}

/// In-memory stand-in for PostgreSQL with a switch to simulate an outage.
#[derive(Default)]
pub struct FakeClickRepository {
    tables: Mutex<Tables>,
    down: AtomicBool,
}

impl FakeClickRepository {
    pub fn with_ads(ads: &[&str]) -> Self {
        let repo = Self::default();
        repo.tables
            .lock()
            .ads
            .extend(ads.iter().map(|ad| ad.to_string()));
        repo
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn stored_clicks(&self) -> usize {
        self.tables.lock().clicks.len()
    }

    pub fn has_click(&self, id: Uuid) -> bool {
        self.tables.lock().clicks.contains_key(&id)
    }

    pub fn stored_total(&self, ad_id: &str) -> i64 {
        self.tables.lock().totals.get(ad_id).copied().unwrap_or(0)
    }

    pub fn insert_raw(&self, event: ClickEvent) {
        self.tables.lock().clicks.insert(event.id, event);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ClickRepository for FakeClickRepository {
    async fn insert_clicks(&self, clicks: &[ClickEvent]) -> Result<Vec<Uuid>, StorageError> {
        self.check()?;
        let mut tables = self.tables.lock();
        let mut inserted = Vec::new();
        for click in clicks {
            if !tables.clicks.contains_key(&click.id) {
                tables.clicks.insert(click.id, click.clone());
                inserted.push(click.id);
            }
        }
        Ok(inserted)
    }

    async fn insert_click(&self, click: &ClickEvent) -> Result<bool, StorageError> {
        Ok(!self.insert_clicks(std::slice::from_ref(click)).await?.is_empty())
    }

    async fn increment_ad_total(&self, ad_id: &str, delta: i64) -> Result<(), StorageError> {
        self.check()?;
        *self
            .tables
            .lock()
            .totals
            .entry(ad_id.to_string())
            .or_default() += delta;
        Ok(())
    }

    async fn get_ad_total(&self, ad_id: &str) -> Result<i64, StorageError> {
        self.check()?;
        Ok(self.stored_total(ad_id))
    }

    async fn count_clicks_in_range(
        &self,
        ad_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        self.check()?;
        let count = self
            .tables
            .lock()
            .clicks
            .values()
            .filter(|c| c.ad_id == ad_id && c.timestamp >= start && c.timestamp <= end)
            .count();
        Ok(count as i64)
    }

    async fn ad_exists(&self, ad_id: &str) -> Result<bool, StorageError> {
        self.check()?;
        Ok(self.tables.lock().ads.contains(ad_id))
    }

    async fn health_check(&self) -> bool {
        self.check().is_ok()
    }
}

/// Settings with short intervals suitable for tests.
pub fn fast_settings(backup_dir: &Path) -> PipelineSettings {
    PipelineSettings {
        queue_capacity: 1_000,
        ingress_concurrency: 4,
        consumer_workers: 2,
        batch_size: 5,
        flush_interval: Duration::from_millis(50),
        poll_interval: Duration::from_millis(10),
        claim_idle: Duration::from_millis(500),
        sweep_interval: Duration::from_millis(200),
        backup_dir: backup_dir.to_path_buf(),
        breaker_threshold: 3,
        breaker_reset: Duration::from_millis(200),
        rate_limit_per_hour: 30,
    }
}

pub struct TestPipeline {
    pub pipeline: Pipeline,
    pub repo: Arc<FakeClickRepository>,
    pub log: Arc<InMemoryEventLog>,
}

pub fn start_pipeline(ads: &[&str], settings: PipelineSettings) -> TestPipeline {
    let repo = Arc::new(FakeClickRepository::with_ads(ads));
    let log = Arc::new(InMemoryEventLog::new());
    let pipeline = Pipeline::start(repo.clone(), log.clone(), settings);
    TestPipeline {
        pipeline,
        repo,
        log,
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
