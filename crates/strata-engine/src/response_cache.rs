//! In-process response cache for repeated retrievals.
//!
//! Keys hash the normalized query together with everything else that shapes
//! the response. Entries expire after the configured TTL and the cache is
//! fully invalidated on every write, which keeps read-your-writes intact.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use strata_core::clock::Clock;
use strata_core::defaults::CACHE_SWEEP_COUNT;
use strata_core::models::{RetrievalRequest, RetrievalResponse};
use strata_core::CacheConfig;

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct CachedEntry {
    response: RetrievalResponse,
    cached_at: DateTime<Utc>,
}

/// TTL response cache.
pub struct ResponseCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CachedEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache key over the full request shape. The query is normalized
    /// (lowercased, trimmed) so trivially different spellings share entries.
    pub fn cache_key(&self, request: &RetrievalRequest) -> String {
        let mut hasher = Sha256::new();

        hasher.update(request.query.to_lowercase().trim().as_bytes());
        hasher.update(request.strategy.as_str().as_bytes());
        hasher.update(request.max_results.to_le_bytes());
        hasher.update(request.max_tokens.to_le_bytes());
        if let Some(conv) = &request.conversation_id {
            hasher.update(conv.as_bytes());
        }
        if let Some(kinds) = &request.kinds {
            let mut sorted: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
            sorted.sort_unstable();
            for kind in sorted {
                hasher.update(kind.as_bytes());
            }
        }
        if let Some(min_score) = request.min_score {
            hasher.update(min_score.to_le_bytes());
        }
        if let Some(since) = request.since {
            hasher.update(since.timestamp_millis().to_le_bytes());
        }
        if let Some(until) = request.until {
            hasher.update(until.timestamp_millis().to_le_bytes());
        }

        let hash = hex::encode(hasher.finalize());
        format!("strata:resp:{}", &hash[..16])
    }

    /// Fetch a live entry. The returned response is a deep copy with the
    /// cache-hit flag set.
    pub async fn get(&self, key: &str) -> Option<RetrievalResponse> {
        if !self.config.enabled {
            return None;
        }

        let now = self.clock.now();
        let ttl = Duration::seconds(self.config.ttl_seconds);

        let expired = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if now - entry.cached_at <= ttl => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    let mut response = entry.response.clone();
                    response.cache_hit = true;
                    debug!(cache_hit = true, key, "Response cache HIT");
                    return Some(response);
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            self.entries.write().await.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(cache_hit = false, key, "Response cache MISS");
        None
    }

    /// Store a response. When full, the oldest entries are swept first.
    pub async fn put(&self, key: String, response: RetrievalResponse) {
        if !self.config.enabled {
            return;
        }

        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CachedEntry {
                response,
                cached_at: self.clock.now(),
            },
        );

        if entries.len() > self.config.max_entries {
            let mut by_age: Vec<(String, DateTime<Utc>)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.cached_at))
                .collect();
            by_age.sort_by_key(|(_, at)| *at);
            for (key, _) in by_age.into_iter().take(CACHE_SWEEP_COUNT) {
                entries.remove(&key);
            }
        }
    }

    /// Drop every entry. Called on any write to the tiers.
    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }

    /// Counter snapshot.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.read().await.len(),
        }
    }
}
