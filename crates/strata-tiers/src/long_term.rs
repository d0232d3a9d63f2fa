//! Long-term tier: a thin adapter over the external collaborators.
//!
//! Owns the authoritative [`ContextItem`] record and the mapping from item
//! id to chunk and vector ids. On admission, content is chunked, each chunk
//! is indexed in the keyword index and embedded into the vector store, and a
//! small durable record is persisted. A failure mid-write rolls back every
//! piece that was already applied, so an item is either fully retrievable or
//! absent.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use strata_core::models::{ContextItem, LongTermRecord, MetaValue, Metadata};
use strata_core::{
    EmbeddingBackend, Error, GraphStore, RecordStore, Result, VectorStore,
};
use strata_index::{AdaptiveChunker, KeywordIndex};

#[derive(Debug, Clone)]
struct LongTermEntry {
    item: ContextItem,
    chunk_ids: Vec<String>,
    vector_ids: Vec<Uuid>,
}

#[derive(Default)]
struct LongTermState {
    entries: HashMap<Uuid, LongTermEntry>,
    /// Chunk vector id → owning item id, for resolving vector hits.
    vector_owner: HashMap<Uuid, Uuid>,
}

/// The long-term tier.
pub struct LongTermTier {
    chunker: AdaptiveChunker,
    index: Arc<KeywordIndex>,
    embedder: Arc<dyn EmbeddingBackend>,
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    records: Arc<dyn RecordStore>,
    state: RwLock<LongTermState>,
}

impl LongTermTier {
    pub fn new(
        chunker: AdaptiveChunker,
        index: Arc<KeywordIndex>,
        embedder: Arc<dyn EmbeddingBackend>,
        vectors: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            chunker,
            index,
            embedder,
            vectors,
            graph,
            records,
            state: RwLock::new(LongTermState::default()),
        }
    }

    /// Admit an item: chunk, index, embed, persist. On any collaborator
    /// failure the partially applied state is removed and the error is
    /// surfaced with its write-failure kind.
    #[instrument(skip(self, item), fields(subsystem = "tiers", component = "long_term", op = "add", item_id = %item.id))]
    pub async fn add(&self, item: ContextItem) -> Result<()> {
        let chunks = self.chunker.chunk(item.id, &item.content);
        let chunk_metadata = index_metadata(&item);

        // Keyword postings first; they are cheap to undo.
        let mut chunk_ids = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            self.index
                .index(&chunk.chunk_id, &chunk.content, chunk_metadata.clone());
            chunk_ids.push(chunk.chunk_id.clone());
        }

        let result = self.embed_and_persist(&item, &chunks, &chunk_metadata).await;
        match result {
            Ok(vector_ids) => {
                let mut state = self.state.write().await;
                for vector_id in &vector_ids {
                    state.vector_owner.insert(*vector_id, item.id);
                }
                state.entries.insert(
                    item.id,
                    LongTermEntry {
                        item,
                        chunk_ids,
                        vector_ids,
                    },
                );
                Ok(())
            }
            Err((err, applied_vectors)) => {
                warn!(error = %err, "Long-term write failed, rolling back");
                for chunk_id in &chunk_ids {
                    self.index.remove(chunk_id);
                }
                for vector_id in applied_vectors {
                    // Best-effort cleanup; the store tolerates unknown ids.
                    let _ = self.vectors.delete(vector_id).await;
                }
                let _ = self.records.delete(item.id).await;
                Err(classify_write_error(err))
            }
        }
    }

    async fn embed_and_persist(
        &self,
        item: &ContextItem,
        chunks: &[strata_index::Chunk],
        chunk_metadata: &Metadata,
    ) -> std::result::Result<Vec<Uuid>, (Error, Vec<Uuid>)> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self
            .embedder
            .embed_texts(&texts)
            .await
            .map_err(|e| (e, Vec::new()))?;

        if embeddings.len() != chunks.len() {
            return Err((
                Error::Embedding(format!(
                    "expected {} embeddings, got {}",
                    chunks.len(),
                    embeddings.len()
                )),
                Vec::new(),
            ));
        }

        let mut applied = Vec::with_capacity(chunks.len());
        for embedding in embeddings {
            let vector_id = Uuid::new_v4();
            if let Err(e) = self
                .vectors
                .upsert(vector_id, embedding, chunk_metadata.clone())
                .await
            {
                return Err((e, applied));
            }
            applied.push(vector_id);
        }

        if let Err(e) = self.records.put(LongTermRecord::from(item)).await {
            return Err((e, applied));
        }

        debug!(
            chunk_count = chunks.len(),
            "Long-term admission complete"
        );
        Ok(applied)
    }

    /// Delete an item, cascading to keyword postings, vectors, graph
    /// entities, and the persisted record.
    #[instrument(skip(self), fields(subsystem = "tiers", component = "long_term", op = "delete", item_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let entry = {
            let mut state = self.state.write().await;
            let entry = state.entries.remove(&id);
            if let Some(entry) = &entry {
                for vector_id in &entry.vector_ids {
                    state.vector_owner.remove(vector_id);
                }
            }
            entry
        };

        let Some(entry) = entry else {
            return Ok(false);
        };

        for chunk_id in &entry.chunk_ids {
            self.index.remove(chunk_id);
        }
        for vector_id in &entry.vector_ids {
            if let Err(e) = self.vectors.delete(*vector_id).await {
                warn!(error = %e, "Vector delete failed during cascade");
            }
        }
        if let Err(e) = self.graph.delete_entity(id).await {
            warn!(error = %e, "Graph delete failed during cascade");
        }
        self.records.delete(id).await?;
        Ok(true)
    }

    /// Fetch the authoritative item.
    pub async fn get(&self, id: Uuid) -> Option<ContextItem> {
        self.state.read().await.entries.get(&id).map(|e| e.item.clone())
    }

    /// Record an access on an item; returns its new access count.
    pub async fn touch(&self, id: Uuid, now: chrono::DateTime<chrono::Utc>) -> Option<u32> {
        let mut state = self.state.write().await;
        let entry = state.entries.get_mut(&id)?;
        entry.item.mark_accessed(now);
        Some(entry.item.access_count)
    }

    /// All items passing the metadata filter, id-ordered.
    pub async fn scan(&self, filter: Option<&Metadata>) -> Vec<ContextItem> {
        let state = self.state.read().await;
        let mut items: Vec<ContextItem> = state
            .entries
            .values()
            .filter(|e| filter.map_or(true, |f| metadata_matches(&e.item.metadata, f)))
            .map(|e| e.item.clone())
            .collect();
        items.sort_by_key(|i| i.id);
        items
    }

    /// Keyword search over indexed chunks, grouped back to parent items
    /// keeping each parent's best chunk score.
    pub async fn search_keyword(
        &self,
        query: &str,
        k: usize,
        filters: Option<&Metadata>,
    ) -> Vec<(Uuid, f32)> {
        // Over-fetch chunk hits: several chunks can share one parent.
        let hits = self.index.search(query, k.saturating_mul(4), filters);
        let mut best: HashMap<Uuid, f32> = HashMap::new();
        let mut order: Vec<Uuid> = Vec::new();

        for hit in hits {
            let Some(parent) = parent_of(&hit.doc_id) else {
                continue;
            };
            match best.get_mut(&parent) {
                Some(score) => {
                    if hit.score > *score {
                        *score = hit.score;
                    }
                }
                None => {
                    best.insert(parent, hit.score);
                    order.push(parent);
                }
            }
        }

        let mut grouped: Vec<(Uuid, f32)> =
            order.into_iter().map(|id| (id, best[&id])).collect();
        grouped.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        grouped.truncate(k);
        grouped
    }

    /// Resolve vector-store hits (chunk vector ids) to parent items,
    /// keeping each parent's best similarity.
    pub async fn resolve_vector_hits(
        &self,
        hits: &[strata_core::CollaboratorHit],
    ) -> Vec<(Uuid, f32)> {
        let state = self.state.read().await;
        let mut best: HashMap<Uuid, f32> = HashMap::new();
        let mut order: Vec<Uuid> = Vec::new();

        for hit in hits {
            let Some(&parent) = state.vector_owner.get(&hit.id) else {
                continue;
            };
            match best.get_mut(&parent) {
                Some(score) => {
                    if hit.score > *score {
                        *score = hit.score;
                    }
                }
                None => {
                    best.insert(parent, hit.score);
                    order.push(parent);
                }
            }
        }

        order.into_iter().map(|id| (id, best[&id])).collect()
    }

    /// Whether an item is stored here.
    pub async fn contains(&self, id: Uuid) -> bool {
        self.state.read().await.entries.contains_key(&id)
    }

    /// Number of stored items.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Remove every item and its derived state.
    pub async fn clear(&self) -> Result<usize> {
        let ids: Vec<Uuid> = {
            let state = self.state.read().await;
            state.entries.keys().copied().collect()
        };
        let mut cleared = 0;
        for id in ids {
            if self.delete(id).await? {
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    /// Rebuild the keyword index and vector store from the persisted
    /// records. Returns the number of items restored.
    #[instrument(skip(self), fields(subsystem = "tiers", component = "long_term", op = "reindex"))]
    pub async fn reindex(&self) -> Result<usize> {
        let records = self.records.scan().await?;
        let mut restored = 0;

        for record in records {
            let item = ContextItem {
                id: record.id,
                content: record.content.clone(),
                kind: record.kind,
                priority: record.priority,
                metadata: record.metadata.clone(),
                conversation_id: None,
                created_at: record.created_at,
                last_accessed_at: record.created_at,
                access_count: 0,
                token_estimate: record.token_estimate,
                tier_hint: strata_core::models::TierHint::LongTerm,
            };
            self.add(item).await?;
            restored += 1;
        }

        info!(restored, "Long-term reindex complete");
        Ok(restored)
    }
}

/// Metadata attached to every chunk at index time: the reserved keys that
/// filters may match on.
fn index_metadata(item: &ContextItem) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("type".into(), MetaValue::from(item.kind.as_str()));
    metadata.insert("importance".into(), MetaValue::from(item.priority.as_str()));
    if let Some(conv) = &item.conversation_id {
        metadata.insert("conversation_id".into(), MetaValue::from(conv.clone()));
    }
    if let Some(tags) = item.metadata.get("tags") {
        metadata.insert("tags".into(), tags.clone());
    }
    metadata
}

/// Parent item id from a chunk doc id (`{parent}#{ordinal}` or bare id).
fn parent_of(doc_id: &str) -> Option<Uuid> {
    let base = doc_id.split('#').next().unwrap_or(doc_id);
    Uuid::parse_str(base).ok()
}

fn classify_write_error(err: Error) -> Error {
    match err {
        Error::CapacityExhausted(_) => err,
        Error::Embedding(msg) | Error::Collaborator(msg) | Error::Request(msg) => {
            Error::Collaborator(msg)
        }
        other => other,
    }
}

fn metadata_matches(metadata: &Metadata, filters: &Metadata) -> bool {
    filters.iter().all(|(key, expected)| {
        metadata.get(key).is_some_and(|actual| match (actual, expected) {
            (MetaValue::StrList(list), MetaValue::Str(s)) => list.contains(s),
            (a, e) => a == e,
        })
    })
}
