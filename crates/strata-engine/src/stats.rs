//! Engine metrics.
//!
//! Counters are updated with relaxed atomics on the hot path; `stats()`
//! assembles a serializable snapshot combining these with per-tier numbers.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use strata_core::models::Tier;

use crate::response_cache::CacheStats;

/// Relaxed-atomic counters owned by the orchestrator.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    total_stores: AtomicU64,
    total_retrievals: AtomicU64,
    degraded_responses: AtomicU64,
    immediate_stores: AtomicU64,
    session_stores: AtomicU64,
    long_term_stores: AtomicU64,
    promotions: AtomicU64,
}

impl EngineMetrics {
    pub fn record_store(&self, tiers: &[Tier]) {
        self.total_stores.fetch_add(1, Ordering::Relaxed);
        for tier in tiers {
            match tier {
                Tier::Immediate => &self.immediate_stores,
                Tier::Session => &self.session_stores,
                Tier::LongTerm => &self.long_term_stores,
            }
            .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_retrieval(&self, degraded: bool) {
        self.total_retrievals.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded_responses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time metrics snapshot returned by `Orchestrator::stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_stores: u64,
    pub total_retrievals: u64,
    pub degraded_responses: u64,
    pub promotions: u64,
    pub immediate_stores: u64,
    pub session_stores: u64,
    pub long_term_stores: u64,
    pub immediate_items: usize,
    pub immediate_tokens: usize,
    pub session_items: usize,
    pub session_conversations: usize,
    pub session_evictions: u64,
    pub session_consolidations: u64,
    pub long_term_items: usize,
    pub cache: CacheStats,
}

impl StatsSnapshot {
    /// Cache hit rate in [0, 1].
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache.hits + self.cache.misses;
        if total == 0 {
            0.0
        } else {
            self.cache.hits as f64 / total as f64
        }
    }
}

impl EngineMetrics {
    pub(crate) fn counters(&self) -> (u64, u64, u64, u64, u64, u64, u64) {
        (
            self.total_stores.load(Ordering::Relaxed),
            self.total_retrievals.load(Ordering::Relaxed),
            self.degraded_responses.load(Ordering::Relaxed),
            self.promotions.load(Ordering::Relaxed),
            self.immediate_stores.load(Ordering::Relaxed),
            self.session_stores.load(Ordering::Relaxed),
            self.long_term_stores.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_store_per_tier() {
        let metrics = EngineMetrics::default();
        metrics.record_store(&[Tier::Immediate]);
        metrics.record_store(&[Tier::Immediate, Tier::Session, Tier::LongTerm]);

        let (stores, _, _, _, immediate, session, long_term) = metrics.counters();
        assert_eq!(stores, 2);
        assert_eq!(immediate, 2);
        assert_eq!(session, 1);
        assert_eq!(long_term, 1);
    }

    #[test]
    fn test_record_retrieval_degraded() {
        let metrics = EngineMetrics::default();
        metrics.record_retrieval(false);
        metrics.record_retrieval(true);

        let (_, retrievals, degraded, ..) = metrics.counters();
        assert_eq!(retrievals, 2);
        assert_eq!(degraded, 1);
    }

    #[test]
    fn test_cache_hit_rate() {
        let snapshot = StatsSnapshot {
            total_stores: 0,
            total_retrievals: 0,
            degraded_responses: 0,
            promotions: 0,
            immediate_stores: 0,
            session_stores: 0,
            long_term_stores: 0,
            immediate_items: 0,
            immediate_tokens: 0,
            session_items: 0,
            session_conversations: 0,
            session_evictions: 0,
            session_consolidations: 0,
            long_term_items: 0,
            cache: CacheStats {
                hits: 3,
                misses: 1,
                entries: 0,
            },
        };
        assert!((snapshot.cache_hit_rate() - 0.75).abs() < 1e-9);
    }
}
