//! Inverted-index keyword retrieval with BM25 ranking.
//!
//! The index is a monotonic mutable structure guarded by a single
//! reader-writer lock: reads run in parallel, mutations are exclusive.
//! IDF values are cached and the cache is invalidated on any mutation.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use tracing::debug;

use strata_core::models::{MetaValue, Metadata};
use strata_core::KeywordConfig;

use crate::tokenizer::tokenize;

/// A ranked keyword hit.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub doc_id: String,
    pub score: f32,
}

/// Index statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexStats {
    pub doc_count: usize,
    pub vocabulary_size: usize,
    pub avg_doc_len: f32,
}

#[derive(Debug, Default)]
struct DocEntry {
    /// Token count used during indexing (`doc_len` of every posting).
    len: usize,
    metadata: Metadata,
}

#[derive(Debug, Default)]
struct IndexInner {
    /// doc_id → document entry.
    docs: HashMap<String, DocEntry>,
    /// term → (doc_id → term frequency).
    postings: HashMap<String, HashMap<String, u32>>,
    /// Sum of document lengths, for the running average.
    total_len: u64,
}

impl IndexInner {
    fn avg_doc_len(&self) -> f32 {
        if self.docs.is_empty() {
            0.0
        } else {
            self.total_len as f32 / self.docs.len() as f32
        }
    }

    fn remove_doc(&mut self, doc_id: &str) -> bool {
        let Some(entry) = self.docs.remove(doc_id) else {
            return false;
        };
        self.total_len -= entry.len as u64;
        self.postings.retain(|_, docs| {
            docs.remove(doc_id);
            !docs.is_empty()
        });
        true
    }
}

/// BM25 keyword index.
pub struct KeywordIndex {
    config: KeywordConfig,
    inner: RwLock<IndexInner>,
    /// term → IDF. Guarded separately so parallel reads stay cheap;
    /// cleared under the write lock on every mutation.
    idf_cache: Mutex<HashMap<String, f32>>,
}

impl KeywordIndex {
    pub fn new(config: KeywordConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(IndexInner::default()),
            idf_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Tokenize and index a document, replacing any previous version.
    pub fn index(&self, doc_id: &str, text: &str, metadata: Metadata) {
        let tokens = tokenize(text);
        let mut inner = self.inner.write().unwrap();

        inner.remove_doc(doc_id);

        let mut freqs: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *freqs.entry(token.clone()).or_insert(0) += 1;
        }
        for (term, tf) in freqs {
            inner
                .postings
                .entry(term)
                .or_default()
                .insert(doc_id.to_string(), tf);
        }
        inner.total_len += tokens.len() as u64;
        inner.docs.insert(
            doc_id.to_string(),
            DocEntry {
                len: tokens.len(),
                metadata,
            },
        );

        self.idf_cache.lock().unwrap().clear();
        debug!(doc_id, token_count = tokens.len(), "Indexed document");
    }

    /// Index several documents in one pass.
    pub fn index_batch(&self, docs: &[(String, String, Metadata)]) {
        for (doc_id, text, metadata) in docs {
            self.index(doc_id, text, metadata.clone());
        }
    }

    /// Delete a document's postings. Returns whether it existed.
    pub fn remove(&self, doc_id: &str) -> bool {
        let removed = self.inner.write().unwrap().remove_doc(doc_id);
        if removed {
            self.idf_cache.lock().unwrap().clear();
            debug!(doc_id, "Removed document");
        }
        removed
    }

    /// Whether a document is indexed.
    pub fn contains(&self, doc_id: &str) -> bool {
        self.inner.read().unwrap().docs.contains_key(doc_id)
    }

    /// Top-k documents for a free-text query.
    ///
    /// The candidate set is documents whose postings contain at least one
    /// query term AND that pass all metadata filters; filters are evaluated
    /// before scoring. Empty queries and unknown tokens yield no results.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        filters: Option<&Metadata>,
    ) -> Vec<KeywordHit> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut query_freqs: HashMap<&str, u32> = HashMap::new();
        for token in &query_tokens {
            *query_freqs.entry(token).or_insert(0) += 1;
        }

        let inner = self.inner.read().unwrap();
        let n = inner.docs.len();
        if n == 0 {
            return Vec::new();
        }
        let avgdl = inner.avg_doc_len();

        // Candidate set: docs containing >= 1 query term, filters applied
        // before scoring.
        let mut candidates: HashMap<&str, (f32, u64)> = HashMap::new();
        for (&term, _) in &query_freqs {
            let Some(docs) = inner.postings.get(term) else {
                continue;
            };
            let idf = self.idf(term, docs.len(), n);
            for (doc_id, &tf) in docs {
                let entry = &inner.docs[doc_id.as_str()];
                if let Some(filters) = filters {
                    if !metadata_matches(&entry.metadata, filters) {
                        continue;
                    }
                }
                let doc_len = entry.len as f32;
                let tf_f = tf as f32;
                let denom = tf_f
                    + self.config.k1 * (1.0 - self.config.b + self.config.b * doc_len / avgdl);
                let term_score = idf * (tf_f * (self.config.k1 + 1.0)) / denom;

                let slot = candidates.entry(doc_id.as_str()).or_insert((0.0, 0));
                slot.0 += term_score;
                slot.1 += tf as u64;
            }
        }

        let mut hits: Vec<(String, f32, u64)> = candidates
            .into_iter()
            .map(|(doc_id, (score, tf_sum))| {
                let tie = inner.docs[doc_id].len as u64 * tf_sum;
                (doc_id.to_string(), score, tie)
            })
            .collect();

        // Deterministic ordering: score desc, then doc_len·tf_sum desc,
        // then lexicographic doc_id asc.
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(k);

        debug!(
            query,
            result_count = hits.len(),
            "Keyword search complete"
        );

        hits.into_iter()
            .map(|(doc_id, score, _)| KeywordHit { doc_id, score })
            .collect()
    }

    /// Current corpus statistics.
    pub fn stats(&self) -> IndexStats {
        let inner = self.inner.read().unwrap();
        IndexStats {
            doc_count: inner.docs.len(),
            vocabulary_size: inner.postings.len(),
            avg_doc_len: inner.avg_doc_len(),
        }
    }

    /// Remove every document. Used by `clear(all)`.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        *inner = IndexInner::default();
        self.idf_cache.lock().unwrap().clear();
    }

    /// IDF with caching: `ln((N - df + 0.5) / (df + 0.5) + 1)`, floored at
    /// the configured epsilon.
    fn idf(&self, term: &str, df: usize, n: usize) -> f32 {
        let mut cache = self.idf_cache.lock().unwrap();
        if let Some(&idf) = cache.get(term) {
            return idf;
        }
        let idf = ((n as f32 - df as f32 + 0.5) / (df as f32 + 0.5) + 1.0).ln();
        let idf = idf.max(self.config.idf_epsilon);
        cache.insert(term.to_string(), idf);
        idf
    }
}

impl Default for KeywordIndex {
    fn default() -> Self {
        Self::new(KeywordConfig::default())
    }
}

/// Every filter entry must be present and equal in the document metadata.
fn metadata_matches(metadata: &Metadata, filters: &Metadata) -> bool {
    filters.iter().all(|(key, expected)| {
        metadata.get(key).is_some_and(|actual| match (actual, expected) {
            // A single-string filter also matches membership in a tag list.
            (MetaValue::StrList(list), MetaValue::Str(s)) => list.contains(s),
            (a, e) => a == e,
        })
    })
}
