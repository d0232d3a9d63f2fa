//! In-memory vector store.
//!
//! Reference implementation of the [`VectorStore`] collaborator interface.
//! Remote backends (qdrant, postgres) satisfy the same trait; the variant is
//! chosen at construction, never discovered at runtime.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use strata_core::models::{MetaValue, Metadata};
use strata_core::{CollaboratorHit, Result, VectorStore};

use crate::embedding::cosine_similarity;

#[derive(Debug)]
struct StoredVector {
    vector: Vec<f32>,
    metadata: Metadata,
}

/// Vector store holding everything in process memory.
#[derive(Default)]
pub struct InMemoryVectorStore {
    vectors: RwLock<HashMap<Uuid, StoredVector>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored vectors.
    pub async fn len(&self) -> usize {
        self.vectors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.vectors.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, id: Uuid, vector: Vec<f32>, metadata: Metadata) -> Result<()> {
        self.vectors
            .write()
            .await
            .insert(id, StoredVector { vector, metadata });
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.vectors.write().await.remove(&id);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<CollaboratorHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.vectors.read().await;
        let mut hits: Vec<CollaboratorHit> = vectors
            .iter()
            .filter(|(_, stored)| {
                filter.map_or(true, |f| metadata_matches(&stored.metadata, f))
            })
            .map(|(id, stored)| CollaboratorHit {
                id: *id,
                // Cosine mapped from [-1, 1] into [0, 1].
                score: (cosine_similarity(vector, &stored.vector) + 1.0) / 2.0,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);

        debug!(result_count = hits.len(), "Vector search complete");
        Ok(hits)
    }
}

fn metadata_matches(metadata: &Metadata, filter: &Metadata) -> bool {
    filter.iter().all(|(key, expected)| {
        metadata.get(key).is_some_and(|actual| match (actual, expected) {
            (MetaValue::StrList(list), MetaValue::Str(s)) => list.contains(s),
            (a, e) => a == e,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingBackend;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), MetaValue::from(*v)))
            .collect()
    }

    #[tokio::test]
    async fn test_upsert_and_search() {
        let store = InMemoryVectorStore::new();
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();

        let a = MockEmbeddingBackend::generate("rust cache tiers", 64);
        let b = MockEmbeddingBackend::generate("gardening in spring", 64);

        store.upsert(id_a, a.clone(), Metadata::new()).await.unwrap();
        store.upsert(id_b, b, Metadata::new()).await.unwrap();

        let hits = store.search(&a, 10, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, id_a);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_scores_within_unit_interval() {
        let store = InMemoryVectorStore::new();
        let id = Uuid::new_v4();
        let v = MockEmbeddingBackend::generate("anything at all", 32);
        store.upsert(id, v.clone(), Metadata::new()).await.unwrap();

        let hits = store.search(&v, 1, None).await.unwrap();
        assert!((0.0..=1.0).contains(&hits[0].score));
        // Identical vector: cosine 1 maps to 1.0.
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = InMemoryVectorStore::new();
        let id = Uuid::new_v4();

        store
            .upsert(id, vec![1.0, 0.0], Metadata::new())
            .await
            .unwrap();
        store
            .upsert(id, vec![0.0, 1.0], Metadata::new())
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);

        let hits = store.search(&[0.0, 1.0], 1, None).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_ok() {
        let store = InMemoryVectorStore::new();
        store.delete(Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn test_metadata_filter() {
        let store = InMemoryVectorStore::new();
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();
        let v = vec![1.0, 0.0];

        store
            .upsert(id_a, v.clone(), meta(&[("kind", "fact")]))
            .await
            .unwrap();
        store
            .upsert(id_b, v.clone(), meta(&[("kind", "note")]))
            .await
            .unwrap();

        let hits = store
            .search(&v, 10, Some(&meta(&[("kind", "fact")])))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id_a);
    }

    #[tokio::test]
    async fn test_k_truncation_and_tie_order() {
        let store = InMemoryVectorStore::new();
        let v = vec![1.0, 0.0];
        let mut ids: Vec<Uuid> = (0..5).map(|i| Uuid::from_u128(i)).collect();
        for id in &ids {
            store.upsert(*id, v.clone(), Metadata::new()).await.unwrap();
        }

        let hits = store.search(&v, 3, None).await.unwrap();
        assert_eq!(hits.len(), 3);
        // All scores tie; ordering falls back to ascending id.
        ids.sort();
        let got: Vec<Uuid> = hits.iter().map(|h| h.id).collect();
        assert_eq!(got, ids[..3].to_vec());
    }
}
