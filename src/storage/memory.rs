//! In-process result store, used by tests and `--no-cache` runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::StoredResultSet;
use crate::storage::{DEFAULT_RETENTION_HOURS, ResultStore};

#[derive(Debug)]
pub struct MemoryStorage {
    sets: RwLock<HashMap<String, StoredResultSet>>,
    retention: chrono::Duration,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(chrono::Duration::hours(DEFAULT_RETENTION_HOURS))
    }
}

impl MemoryStorage {
    pub fn new(retention: chrono::Duration) -> Self {
        Self {
            sets: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub async fn len(&self) -> usize {
        self.sets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sets.read().await.is_empty()
    }
}

#[async_trait]
impl ResultStore for MemoryStorage {
    async fn get(&self, query: &str) -> Result<Option<StoredResultSet>> {
        let sets = self.sets.read().await;
        Ok(sets
            .get(query)
            .filter(|set| !set.is_expired(self.retention, Utc::now()))
            .cloned())
    }

    async fn put(&self, set: &StoredResultSet) -> Result<()> {
        self.sets
            .write()
            .await
            .insert(set.query.clone(), set.clone());
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut sets = self.sets.write().await;
        let before = sets.len();
        sets.retain(|_, set| !set.is_expired(self.retention, now));
        Ok(before - sets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_purge() {
        let store = MemoryStorage::new(chrono::Duration::minutes(30));
        store.put(&StoredResultSet::new("fresh", vec![])).await.unwrap();

        let mut stale = StoredResultSet::new("stale", vec![]);
        stale.created_at = Utc::now() - chrono::Duration::hours(1);
        store.put(&stale).await.unwrap();

        assert!(store.get("fresh").await.unwrap().is_some());
        assert!(store.get("stale").await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
    }
}
