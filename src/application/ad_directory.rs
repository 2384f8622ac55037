//! Ad existence lookups with an in-process memo of known ads.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::repositories::{ClickRepository, StorageError};

/// Answers "does this ad exist", remembering positive answers.
///
/// Ads are never deleted while the service runs, so a known ad stays
/// acceptable through a storage outage. Negative answers are not remembered.
pub struct AdDirectory {
    repository: Arc<dyn ClickRepository>,
    known: RwLock<HashSet<String>>,
}

impl AdDirectory {
    pub fn new(repository: Arc<dyn ClickRepository>) -> Self {
        Self {
            repository,
            known: RwLock::new(HashSet::new()),
        }
    }

    pub async fn exists(&self, ad_id: &str) -> Result<bool, StorageError> {
        if self.known.read().contains(ad_id) {
            return Ok(true);
        }

        let exists = self.repository.ad_exists(ad_id).await?;
        if exists {
            self.known.write().insert(ad_id.to_string());
        }
        Ok(exists)
    }

    pub fn known_count(&self) -> usize {
        self.known.read().len()
    }
}
