//! Collaborator traits.
//!
//! The core depends on these abstractions only; concrete backends (in-memory,
//! remote) are selected at construction. Keeping the capability sets minimal
//! is deliberate: any implementation satisfying the signatures is acceptable.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{LongTermRecord, Metadata};

/// A scored hit returned by a collaborator search.
#[derive(Debug, Clone, PartialEq)]
pub struct CollaboratorHit {
    pub id: Uuid,
    pub score: f32,
}

/// Backend for generating text embeddings.
///
/// Batch-capable; returns fixed-dimension floats. Never called on the hot
/// read path unless the strategy requires semantic search.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one vector per input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Model name being used.
    fn model_name(&self) -> &str;
}

/// External vector store.
///
/// Similarity scores are in [0, 1]; cosine distance is mapped into that
/// range by the implementation.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a vector. `id` is the chunk or item id.
    async fn upsert(&self, id: Uuid, vector: Vec<f32>, metadata: Metadata) -> Result<()>;

    /// Delete a vector. Unknown ids are not an error.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Top-k most similar vectors, filtered by metadata equality.
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<CollaboratorHit>>;
}

/// External graph store for entity relationships.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert or replace an entity node.
    async fn upsert_entity(&self, id: Uuid, entity_type: &str, props: JsonValue) -> Result<()>;

    /// Insert or replace a directed edge.
    async fn upsert_edge(&self, from: Uuid, to: Uuid, edge_type: &str, props: JsonValue)
        -> Result<()>;

    /// Entities matching the query, scored by centrality.
    async fn search(&self, query: &str, max_depth: usize) -> Result<Vec<CollaboratorHit>>;

    /// Path between two entities, if one exists within `max_depth` hops.
    async fn path(&self, a: Uuid, b: Uuid, max_depth: usize) -> Result<Option<Vec<(Uuid, Uuid)>>>;

    /// Remove an entity and its edges. Unknown ids are not an error.
    async fn delete_entity(&self, id: Uuid) -> Result<()>;
}

/// Key-value store for the persisted long-term records.
///
/// The record set must be restorable such that reindexing the keyword index
/// and resubmitting to the vector store fully reconstructs retrievability.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a record, replacing any previous version.
    async fn put(&self, record: LongTermRecord) -> Result<()>;

    /// Fetch a record by id.
    async fn get(&self, id: Uuid) -> Result<Option<LongTermRecord>>;

    /// Delete a record. Returns whether it existed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// All records, ordered by id for determinism.
    async fn scan(&self) -> Result<Vec<LongTermRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traits_are_object_safe() {
        fn assert_obj<T: ?Sized>() {}
        assert_obj::<dyn EmbeddingBackend>();
        assert_obj::<dyn VectorStore>();
        assert_obj::<dyn GraphStore>();
        assert_obj::<dyn RecordStore>();
    }

    #[test]
    fn test_collaborator_hit_clone() {
        let hit = CollaboratorHit {
            id: Uuid::new_v4(),
            score: 0.7,
        };
        assert_eq!(hit.clone(), hit);
    }
}
