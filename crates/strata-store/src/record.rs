//! In-memory record store for persisted long-term metadata.
//!
//! The long-term tier writes one [`LongTermRecord`] per item; replaying the
//! record set through reindexing reconstructs full retrievability. This
//! implementation keeps records in process memory; a durable backend only
//! needs to satisfy the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use strata_core::{LongTermRecord, RecordStore, Result};

/// Record store holding everything in process memory.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<Uuid, LongTermRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put(&self, record: LongTermRecord) -> Result<()> {
        self.records.write().await.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<LongTermRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn scan(&self) -> Result<Vec<LongTermRecord>> {
        let records = self.records.read().await;
        let mut all: Vec<LongTermRecord> = records.values().cloned().collect();
        all.sort_by_key(|r| r.id);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use strata_core::models::{ContextItem, Metadata};

    fn record(content: &str) -> LongTermRecord {
        let item = ContextItem::new(content, Metadata::new(), Utc::now()).unwrap();
        LongTermRecord::from(&item)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = InMemoryRecordStore::new();
        let r = record("remember this");
        store.put(r.clone()).await.unwrap();

        let fetched = store.get(r.id).await.unwrap().unwrap();
        assert_eq!(fetched, r);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryRecordStore::new();
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryRecordStore::new();
        let r = record("ephemeral");
        store.put(r.clone()).await.unwrap();

        assert!(store.delete(r.id).await.unwrap());
        assert!(!store.delete(r.id).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let store = InMemoryRecordStore::new();
        let mut r = record("version one");
        store.put(r.clone()).await.unwrap();

        r.content = "version two".into();
        store.put(r.clone()).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(r.id).await.unwrap().unwrap().content, "version two");
    }

    #[tokio::test]
    async fn test_scan_sorted_by_id() {
        let store = InMemoryRecordStore::new();
        for content in ["a", "b", "c", "d"] {
            store.put(record(content)).await.unwrap();
        }

        let all = store.scan().await.unwrap();
        assert_eq!(all.len(), 4);
        let mut ids: Vec<Uuid> = all.iter().map(|r| r.id).collect();
        let sorted = {
            let mut s = ids.clone();
            s.sort();
            s
        };
        assert_eq!(ids, sorted);
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }
}
