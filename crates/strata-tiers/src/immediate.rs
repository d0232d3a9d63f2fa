//! Immediate tier: a fixed-capacity FIFO ring with TTL and a token budget.
//!
//! The hottest context lives here. Capacity is bounded twice: by item count
//! and by the sum of token estimates. Appending evicts from the head until
//! both caps hold again. Expired items are purged lazily on any add or read.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use strata_core::clock::Clock;
use strata_core::defaults::IMMEDIATE_OVERLAP_BONUS;
use strata_core::models::ContextItem;
use strata_core::scoring::{jaccard, recency_decay};
use strata_core::ImmediateConfig;
use strata_index::token_set;

#[derive(Debug, Default)]
struct Ring {
    /// Oldest at the front, newest at the back.
    items: VecDeque<ContextItem>,
    tokens: usize,
}

impl Ring {
    fn pop_oldest(&mut self) -> Option<ContextItem> {
        let item = self.items.pop_front()?;
        self.tokens -= item.token_estimate;
        Some(item)
    }
}

/// Token usage snapshot for the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub current_tokens: usize,
    pub token_cap: usize,
    pub item_count: usize,
}

/// The immediate FIFO tier.
pub struct ImmediateTier {
    config: ImmediateConfig,
    clock: Arc<dyn Clock>,
    ring: RwLock<Ring>,
}

impl ImmediateTier {
    pub fn new(config: ImmediateConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            ring: RwLock::new(Ring::default()),
        }
    }

    /// Append an item, evicting from the head until both the count cap and
    /// the token cap hold. Returns the ids evicted to make room.
    pub fn add(&self, item: ContextItem) -> Vec<Uuid> {
        let mut ring = self.ring.write().unwrap();
        let mut evicted = self.purge_expired(&mut ring);

        ring.tokens += item.token_estimate;
        ring.items.push_back(item);

        while ring.items.len() > self.config.capacity || ring.tokens > self.config.token_cap {
            match ring.pop_oldest() {
                Some(old) => {
                    debug!(item_id = %old.id, tier = "immediate", "Evicted by capacity");
                    evicted.push(old.id);
                }
                None => break,
            }
        }

        if ring.items.is_empty() {
            warn!(
                tier = "immediate",
                token_cap = self.config.token_cap,
                "Item exceeds the ring token budget on its own"
            );
        }

        evicted
    }

    /// All live items, newest first.
    pub fn list(&self) -> Vec<ContextItem> {
        self.expire_lazily();
        let ring = self.ring.read().unwrap();
        ring.items.iter().rev().cloned().collect()
    }

    /// Fetch a live item by id.
    pub fn get(&self, id: Uuid) -> Option<ContextItem> {
        self.expire_lazily();
        let ring = self.ring.read().unwrap();
        ring.items.iter().find(|i| i.id == id).cloned()
    }

    /// Delete an item by id. Returns whether it was present.
    pub fn delete(&self, id: Uuid) -> bool {
        let mut ring = self.ring.write().unwrap();
        if let Some(pos) = ring.items.iter().position(|i| i.id == id) {
            let removed = ring.items.remove(pos).unwrap();
            ring.tokens -= removed.token_estimate;
            true
        } else {
            false
        }
    }

    /// Score live items against a query: recency decay plus a weak keyword
    /// overlap bonus. Zero-scoring items are kept (recency never reaches
    /// zero), ordered best first.
    pub fn search(&self, query: &str, max_results: usize) -> Vec<(ContextItem, f32)> {
        self.expire_lazily();
        let now = self.clock.now();
        let query_terms = token_set(query);
        let half_life = Duration::seconds(self.config.half_life_seconds);

        let ring = self.ring.read().unwrap();
        let mut scored: Vec<(ContextItem, f32)> = ring
            .items
            .iter()
            .map(|item| {
                let recency = recency_decay(now - item.created_at, half_life);
                let overlap = if query_terms.is_empty() {
                    0.0
                } else {
                    IMMEDIATE_OVERLAP_BONUS * jaccard(&query_terms, &token_set(&item.content))
                };
                (item.clone(), recency + overlap)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.last_accessed_at.cmp(&a.0.last_accessed_at))
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        scored.truncate(max_results);
        scored
    }

    /// Record an access on an item; returns its new access count.
    pub fn touch(&self, id: Uuid) -> Option<u32> {
        let now = self.clock.now();
        let mut ring = self.ring.write().unwrap();
        let item = ring.items.iter_mut().find(|i| i.id == id)?;
        item.mark_accessed(now);
        Some(item.access_count)
    }

    /// Remove everything.
    pub fn clear(&self) -> usize {
        let mut ring = self.ring.write().unwrap();
        let count = ring.items.len();
        ring.items.clear();
        ring.tokens = 0;
        count
    }

    pub fn len(&self) -> usize {
        self.ring.read().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.read().unwrap().items.is_empty()
    }

    /// Current token accounting.
    pub fn token_usage(&self) -> TokenUsage {
        let ring = self.ring.read().unwrap();
        TokenUsage {
            current_tokens: ring.tokens,
            token_cap: self.config.token_cap,
            item_count: ring.items.len(),
        }
    }

    /// Purge expired items if any exist. Cheap no-op on the common path.
    fn expire_lazily(&self) {
        let now = self.clock.now();
        let ttl = Duration::seconds(self.config.ttl_seconds);
        {
            let ring = self.ring.read().unwrap();
            if !ring.items.iter().any(|i| now - i.created_at > ttl) {
                return;
            }
        }
        let mut ring = self.ring.write().unwrap();
        self.purge_expired(&mut ring);
    }

    fn purge_expired(&self, ring: &mut Ring) -> Vec<Uuid> {
        let now = self.clock.now();
        let ttl = Duration::seconds(self.config.ttl_seconds);
        let mut evicted = Vec::new();

        let mut idx = 0;
        while idx < ring.items.len() {
            if now - ring.items[idx].created_at > ttl {
                let expired = ring.items.remove(idx).unwrap();
                ring.tokens -= expired.token_estimate;
                debug!(item_id = %expired.id, tier = "immediate", "Expired by TTL");
                evicted.push(expired.id);
            } else {
                idx += 1;
            }
        }
        evicted
    }
}
