//! In-memory per-ad click counters.
//!
//! Counters are created on the first observed click or on the first read that
//! misses and seeds from storage. They are never evicted; staleness is bounded
//! by the batch flush interval.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::repositories::{ClickRepository, StorageError};

/// Key of the aggregate counter across all ads.
pub const TOTAL_KEY: &str = "total";

fn ad_key(ad_id: &str) -> String {
    format!("ad:{ad_id}")
}

/// One cached counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    pub count: i64,
    pub last_update: DateTime<Utc>,
}

/// Read-mostly counter cache shared by the write path and the query path.
pub struct CounterCache {
    counters: RwLock<HashMap<String, CounterEntry>>,
    repository: Arc<dyn ClickRepository>,
}

impl CounterCache {
    pub fn new(repository: Arc<dyn ClickRepository>) -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            repository,
        }
    }

    /// Adds one click to an ad's counter and to the aggregate counter.
    pub fn increment(&self, ad_id: &str) {
        let now = Utc::now();
        let mut counters = self.counters.write();

        for key in [ad_key(ad_id), TOTAL_KEY.to_string()] {
            let entry = counters.entry(key).or_insert(CounterEntry {
                count: 0,
                last_update: now,
            });
            entry.count += 1;
            entry.last_update = now;
        }
    }

    /// Returns the cached counter for an ad, if present.
    pub fn peek(&self, ad_id: &str) -> Option<i64> {
        self.counters
            .read()
            .get(&ad_key(ad_id))
            .map(|entry| entry.count)
    }

    /// Returns the aggregate click count observed by this process.
    pub fn total(&self) -> i64 {
        self.counters
            .read()
            .get(TOTAL_KEY)
            .map_or(0, |entry| entry.count)
    }

    /// Returns an ad's count, seeding the cache from storage on a miss.
    ///
    /// If a concurrent increment created the entry while storage was being
    /// queried, the existing entry wins.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the miss cannot be resolved from storage.
    pub async fn get(&self, ad_id: &str) -> Result<i64, StorageError> {
        if let Some(count) = self.peek(ad_id) {
            debug!(ad_id, "Counter cache HIT");
            return Ok(count);
        }

        debug!(ad_id, "Counter cache MISS");
        let stored = self.repository.get_ad_total(ad_id).await?;

        let mut counters = self.counters.write();
        let entry = counters.entry(ad_key(ad_id)).or_insert(CounterEntry {
            count: stored,
            last_update: Utc::now(),
        });
        Ok(entry.count)
    }

    /// Copies every counter, releasing the lock before returning.
    pub fn snapshot(&self) -> Vec<(String, CounterEntry)> {
        self.counters
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), *entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::MockClickRepository;

    fn cache_with(repo: MockClickRepository) -> CounterCache {
        CounterCache::new(Arc::new(repo))
    }

    #[tokio::test]
    async fn test_get_after_increments_returns_exact_count() {
        let mut repo = MockClickRepository::new();
        repo.expect_get_ad_total().never();
        let cache = cache_with(repo);

        for _ in 0..7 {
            cache.increment("ad-1");
        }

        assert_eq!(cache.get("ad-1").await.unwrap(), 7);
        assert_eq!(cache.total(), 7);
    }

    #[tokio::test]
    async fn test_total_spans_all_ads() {
        let cache = cache_with(MockClickRepository::new());

        cache.increment("ad-1");
        cache.increment("ad-2");
        cache.increment("ad-2");

        assert_eq!(cache.peek("ad-1"), Some(1));
        assert_eq!(cache.peek("ad-2"), Some(2));
        assert_eq!(cache.total(), 3);
    }

    #[tokio::test]
    async fn test_ad_named_total_does_not_collide_with_aggregate() {
        let cache = cache_with(MockClickRepository::new());

        cache.increment("total");
        cache.increment("ad-1");

        assert_eq!(cache.peek("total"), Some(1));
        assert_eq!(cache.total(), 2);
    }

    #[tokio::test]
    async fn test_miss_seeds_from_storage_once() {
        let mut repo = MockClickRepository::new();
        repo.expect_get_ad_total()
            .withf(|ad_id| ad_id == "ad-9")
            .times(1)
            .returning(|_| Ok(41));
        let cache = cache_with(repo);

        assert_eq!(cache.get("ad-9").await.unwrap(), 41);
        cache.increment("ad-9");
        assert_eq!(cache.get("ad-9").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_miss_propagates_storage_error_without_seeding() {
        let mut repo = MockClickRepository::new();
        repo.expect_get_ad_total()
            .times(1)
            .returning(|_| Err(StorageError::Unavailable("down".to_string())));
        let cache = cache_with(repo);

        assert!(cache.get("ad-1").await.is_err());
        assert_eq!(cache.peek("ad-1"), None);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let cache = Arc::new(cache_with(MockClickRepository::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        cache.increment("ad-hot");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.peek("ad-hot"), Some(8_000));
        assert_eq!(cache.total(), 8_000);
    }
}
