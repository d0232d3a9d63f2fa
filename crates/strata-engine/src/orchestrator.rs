//! The orchestrator: public API over the three tiers.
//!
//! Writes are routed by tier hint or by the routing rules (priority, kind,
//! conversation); reads fan out to the tiers and the external collaborators,
//! fuse their candidate lists, and truncate to the caller's token budget.
//!
//! Retrieval carries an overall deadline. The vector and graph collaborators
//! run concurrently under the remaining time; a sub-query that fails or
//! times out contributes nothing and flags the response as degraded instead
//! of failing the request. Cancellation is drop-based: a caller abandoning
//! the future cancels the outstanding sub-queries with it, and no partial
//! response escapes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use strata_core::clock::Clock;
use strata_core::defaults::GRAPH_SEARCH_MAX_DEPTH;
use strata_core::models::{
    ClearScope, ComponentScores, ContextItem, ContextKind, Metadata, Priority, RetrievalRequest,
    RetrievalResponse, RetrievalStrategy, ScoredItem, StoreReceipt, Tier, TierCounts, TierHint,
};
use strata_core::scoring::recency_decay;
use strata_core::{
    EmbeddingBackend, Error, GraphStore, RecordStore, Result, StrataConfig, VectorStore,
};
use strata_index::{AdaptiveChunker, KeywordIndex};
use strata_search::{fuse, FusionList, FusionSource};
use strata_store::{
    InMemoryGraphStore, InMemoryRecordStore, InMemoryVectorStore, MockEmbeddingBackend,
};
use strata_tiers::{ImmediateTier, LongTermTier, SessionTier};

use crate::response_cache::ResponseCache;
use crate::stats::{EngineMetrics, StatsSnapshot};

/// Central coordinator for the multi-tier context cache.
pub struct Orchestrator {
    config: StrataConfig,
    clock: Arc<dyn Clock>,
    immediate: ImmediateTier,
    session: SessionTier,
    long_term: LongTermTier,
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    embedder: Arc<dyn EmbeddingBackend>,
    cache: ResponseCache,
    metrics: EngineMetrics,
    /// Per-id mutexes serializing same-id writes from concurrent callers.
    write_locks: tokio::sync::Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl Orchestrator {
    /// Build an orchestrator over the given collaborators.
    pub fn new(
        config: StrataConfig,
        clock: Arc<dyn Clock>,
        embedder: Arc<dyn EmbeddingBackend>,
        vectors: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        let index = Arc::new(KeywordIndex::new(config.keyword.clone()));
        let chunker = AdaptiveChunker::new(config.chunker.clone());

        Self {
            immediate: ImmediateTier::new(config.immediate.clone(), clock.clone()),
            session: SessionTier::new(config.session.clone(), clock.clone()),
            long_term: LongTermTier::new(
                chunker,
                index,
                embedder.clone(),
                vectors.clone(),
                graph.clone(),
                records,
            ),
            cache: ResponseCache::new(config.cache.clone(), clock.clone()),
            metrics: EngineMetrics::default(),
            write_locks: tokio::sync::Mutex::new(HashMap::new()),
            config,
            clock,
            vectors,
            graph,
            embedder,
        }
    }

    /// Fully in-process instance: mock embeddings and in-memory stores.
    /// The construction used by tests and local development.
    pub fn in_memory(config: StrataConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config,
            clock,
            Arc::new(MockEmbeddingBackend::new()),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(InMemoryRecordStore::new()),
        )
    }

    /// Store content, routing it to the appropriate tier(s).
    #[instrument(skip(self, content, metadata), fields(subsystem = "engine", component = "orchestrator", op = "store"))]
    pub async fn store(
        &self,
        content: impl Into<String>,
        metadata: Metadata,
        conversation_id: Option<&str>,
        tier_hint: TierHint,
    ) -> Result<StoreReceipt> {
        let now = self.clock.now();
        let mut item = ContextItem::new(content, metadata, now)?;
        if let Some(conv) = conversation_id {
            item.conversation_id = Some(conv.to_string());
        }
        item.tier_hint = tier_hint;

        let targets = self.route(&item)?;
        let _guard = self.lock_id(item.id).await;

        let mut admitted = Vec::with_capacity(targets.len());
        for tier in &targets {
            match tier {
                Tier::Immediate => {
                    self.immediate.add(item.clone());
                    admitted.push(Tier::Immediate);
                }
                Tier::Session => {
                    let conv = item
                        .conversation_id
                        .clone()
                        .expect("session routing requires a conversation");
                    self.session.add(item.clone(), &conv);
                    admitted.push(Tier::Session);
                }
                Tier::LongTerm => {
                    self.long_term.add(item.clone()).await?;
                    admitted.push(Tier::LongTerm);
                }
            }
        }

        self.metrics.record_store(&admitted);
        self.cache.invalidate_all().await;

        debug!(item_id = %item.id, tiers = ?admitted, "Stored context item");
        Ok(StoreReceipt {
            id: item.id,
            admitted,
        })
    }

    /// Tier routing. An explicit hint is honored as-is; `Auto` applies the
    /// routing rules.
    fn route(&self, item: &ContextItem) -> Result<Vec<Tier>> {
        match item.tier_hint {
            TierHint::Immediate => Ok(vec![Tier::Immediate]),
            TierHint::LongTerm => Ok(vec![Tier::LongTerm]),
            TierHint::Session => {
                if item.conversation_id.is_none() {
                    return Err(Error::InvalidInput(
                        "session tier hint requires a conversation_id".into(),
                    ));
                }
                Ok(vec![Tier::Session])
            }
            TierHint::Auto => {
                let mut targets = vec![Tier::Immediate];
                if item.conversation_id.is_some() {
                    targets.push(Tier::Session);
                }
                if item.priority >= Priority::High
                    || matches!(item.kind, ContextKind::Preference | ContextKind::Fact)
                {
                    targets.push(Tier::LongTerm);
                }
                Ok(targets)
            }
        }
    }

    /// Retrieve context for a query under the configured deadline.
    #[instrument(skip(self, request), fields(subsystem = "engine", component = "orchestrator", op = "retrieve", query = %request.query, strategy = request.strategy.as_str()))]
    pub async fn retrieve(&self, request: RetrievalRequest) -> Result<RetrievalResponse> {
        if request.max_results == 0 {
            self.metrics.record_retrieval(false);
            return Ok(RetrievalResponse::empty(request.strategy));
        }
        // An empty query carries no signal for any scored path; only the
        // recency strategy can answer it.
        if request.query.trim().is_empty() && request.strategy != RetrievalStrategy::Recency {
            self.metrics.record_retrieval(false);
            return Ok(RetrievalResponse::empty(request.strategy));
        }

        let key = self.cache.cache_key(&request);
        if let Some(cached) = self.cache.get(&key).await {
            self.metrics.record_retrieval(false);
            return Ok(cached);
        }

        let deadline = StdDuration::from_millis(self.config.retrieve.deadline_ms);
        let started = Instant::now();
        let response = match tokio::time::timeout(deadline, self.execute(&request, started)).await
        {
            Ok(response) => response?,
            Err(_) => {
                self.metrics.record_retrieval(true);
                return Err(Error::DeadlineExceeded(self.config.retrieve.deadline_ms));
            }
        };

        self.metrics.record_retrieval(response.degraded);
        self.cache.put(key, response.clone()).await;
        Ok(response)
    }

    async fn execute(
        &self,
        request: &RetrievalRequest,
        started: Instant,
    ) -> Result<RetrievalResponse> {
        if request.strategy == RetrievalStrategy::Recency {
            return Ok(self.retrieve_by_recency(request).await);
        }

        let strategy = request.strategy;
        let overfetch = request.max_results * 2;
        let use_local = strategy != RetrievalStrategy::Semantic;
        let use_keyword = matches!(
            strategy,
            RetrievalStrategy::Keyword | RetrievalStrategy::Hybrid | RetrievalStrategy::Relevance
        );
        let use_semantic = matches!(
            strategy,
            RetrievalStrategy::Semantic | RetrievalStrategy::Hybrid
        );
        let use_graph = matches!(
            strategy,
            RetrievalStrategy::Graph | RetrievalStrategy::Hybrid
        );

        // In-memory scans are non-blocking; collaborators run concurrently
        // under the remaining deadline.
        let immediate_hits = if use_local {
            self.immediate.search(&request.query, overfetch)
        } else {
            Vec::new()
        };
        let session_hits = if use_local {
            self.session.search(
                &request.query,
                request.conversation_id.as_deref(),
                None,
                overfetch,
            )
        } else {
            Vec::new()
        };
        let keyword_hits = if use_keyword {
            self.long_term
                .search_keyword(&request.query, overfetch, None)
                .await
        } else {
            Vec::new()
        };

        let mut degraded = false;
        // Sub-queries inherit the remaining time, minus a slice reserved
        // for fusion and assembly so a timed-out collaborator degrades the
        // response instead of blowing the overall deadline.
        let total = StdDuration::from_millis(self.config.retrieve.deadline_ms);
        let remaining = total
            .saturating_sub(started.elapsed())
            .saturating_sub(total / 10);

        let semantic_future = async {
            if !use_semantic {
                return Ok(Vec::new());
            }
            let embeddings = self.embedder.embed_texts(&[request.query.clone()]).await?;
            let Some(query_vector) = embeddings.into_iter().next() else {
                return Ok(Vec::new());
            };
            let hits = self.vectors.search(&query_vector, overfetch, None).await?;
            Ok::<_, Error>(self.long_term.resolve_vector_hits(&hits).await)
        };
        let graph_future = async {
            if !use_graph {
                return Ok(Vec::new());
            }
            let hits = self
                .graph
                .search(&request.query, GRAPH_SEARCH_MAX_DEPTH)
                .await?;
            Ok::<_, Error>(hits.into_iter().map(|h| (h.id, h.score)).collect())
        };

        let (semantic_result, graph_result) = tokio::join!(
            tokio::time::timeout(remaining, semantic_future),
            tokio::time::timeout(remaining, graph_future),
        );

        let semantic_hits = flatten_subquery(semantic_result, "semantic", &mut degraded);
        let graph_hits = flatten_subquery(graph_result, "graph", &mut degraded);

        debug!(
            keyword_hits = keyword_hits.len(),
            semantic_hits = semantic_hits.len(),
            graph_hits = graph_hits.len(),
            degraded,
            "Fan-out complete"
        );

        // Long-term count before fusion folds the paths together.
        let long_term_ids: HashSet<Uuid> = keyword_hits
            .iter()
            .chain(&semantic_hits)
            .chain(&graph_hits)
            .map(|(id, _)| *id)
            .collect();

        let tier_counts = TierCounts {
            immediate: immediate_hits.len(),
            session: session_hits.len(),
            long_term: long_term_ids.len(),
        };
        let total_retrieved =
            tier_counts.immediate + tier_counts.session + tier_counts.long_term;

        // The in-memory tiers join fusion as extra lists at half the
        // keyword weight each.
        let local_weight = self.config.fusion.keyword_weight / 2.0;
        let lists = vec![
            FusionList::new(
                FusionSource::Keyword,
                self.config.fusion.keyword_weight,
                keyword_hits,
            ),
            FusionList::new(
                FusionSource::Semantic,
                self.config.fusion.semantic_weight,
                semantic_hits,
            ),
            FusionList::new(
                FusionSource::Graph,
                self.config.fusion.graph_weight,
                graph_hits,
            ),
            FusionList::new(
                FusionSource::Immediate,
                local_weight,
                immediate_hits.iter().map(|(i, s)| (i.id, *s)).collect(),
            ),
            FusionList::new(
                FusionSource::Session,
                local_weight,
                session_hits.iter().map(|(i, s)| (i.id, *s)).collect(),
            ),
        ];
        let fused = fuse(lists, request.min_score, overfetch);

        // Materialize items, preferring the lowest tier an id lives in.
        let mut scored = Vec::with_capacity(fused.len());
        for hit in fused {
            let Some((item, tier)) = self.find_item(hit.id).await else {
                continue;
            };
            if !request.matches(&item) {
                continue;
            }
            scored.push(ScoredItem {
                item,
                score: hit.score,
                source_tier: tier,
                component_scores: hit.components,
            });
        }

        let items = apply_token_budget(scored, request.max_results, request.max_tokens);
        self.track_and_promote(&items).await;

        Ok(RetrievalResponse {
            items,
            strategy,
            total_retrieved,
            tier_counts,
            cache_hit: false,
            degraded,
        })
    }

    /// Recency strategy: newest first from the in-memory tiers, no fusion.
    async fn retrieve_by_recency(&self, request: &RetrievalRequest) -> RetrievalResponse {
        let now = self.clock.now();
        let half_life = Duration::seconds(self.config.immediate.half_life_seconds);

        let immediate_items = self.immediate.list();
        let session_items = match &request.conversation_id {
            Some(conv) => self.session.list(conv),
            None => self.session.all_items(),
        };
        let tier_counts = TierCounts {
            immediate: immediate_items.len(),
            session: session_items.len(),
            long_term: 0,
        };
        let total_retrieved = tier_counts.immediate + tier_counts.session;

        let mut seen = HashSet::new();
        let mut scored: Vec<ScoredItem> = Vec::new();
        for (item, tier) in immediate_items
            .into_iter()
            .map(|i| (i, Tier::Immediate))
            .chain(session_items.into_iter().map(|i| (i, Tier::Session)))
        {
            if !seen.insert(item.id) || !request.matches(&item) {
                continue;
            }
            let recency = recency_decay(now - item.last_accessed_at, half_life);
            scored.push(ScoredItem {
                item,
                score: recency,
                source_tier: tier,
                component_scores: ComponentScores {
                    recency: Some(recency),
                    ..Default::default()
                },
            });
        }

        scored.sort_by(|a, b| {
            b.item
                .last_accessed_at
                .cmp(&a.item.last_accessed_at)
                .then_with(|| a.item.id.cmp(&b.item.id))
        });

        let items = apply_token_budget(scored, request.max_results, request.max_tokens);
        self.track_and_promote(&items).await;

        RetrievalResponse {
            items,
            strategy: RetrievalStrategy::Recency,
            total_retrieved,
            tier_counts,
            cache_hit: false,
            degraded: false,
        }
    }

    /// Locate an item in tier order (Immediate → Session → Long-Term).
    async fn find_item(&self, id: Uuid) -> Option<(ContextItem, Tier)> {
        if let Some(item) = self.immediate.get(id) {
            return Some((item, Tier::Immediate));
        }
        if let Some((_, item)) = self.session.find(id) {
            return Some((item, Tier::Session));
        }
        self.long_term.get(id).await.map(|i| (i, Tier::LongTerm))
    }

    /// Record accesses on returned items and run promotions that crossed
    /// their thresholds. Promotion is copy-on-promote; failures on the
    /// long-term side are logged, never surfaced.
    async fn track_and_promote(&self, items: &[ScoredItem]) {
        for scored in items {
            let id = scored.item.id;

            if let Some(count) = self.immediate.touch(id) {
                let threshold = self.config.promotion.immediate_to_session_access;
                if count >= threshold {
                    if let Some(conv) = scored.item.conversation_id.clone() {
                        if self.session.get(&conv, id).is_none() {
                            let copy = self.immediate.get(id);
                            if let Some(copy) = copy {
                                self.session.add(copy, &conv);
                                self.metrics.record_promotion();
                                info!(item_id = %id, tier = "session", "Promoted item");
                            }
                        }
                    }
                }
            }

            if let Some((conv, _)) = self.session.find(id) {
                let count = self.session.touch(&conv, id).unwrap_or(0);
                let threshold = self.config.promotion.session_to_longterm_access;
                // Re-read so the promoted copy carries the updated tracking.
                let Some(item) = self.session.get(&conv, id) else {
                    continue;
                };
                if count >= threshold
                    && item.priority >= Priority::High
                    && !self.long_term.contains(id).await
                {
                    match self.long_term.add(item).await {
                        Ok(()) => {
                            self.metrics.record_promotion();
                            info!(item_id = %id, tier = "long_term", "Promoted item");
                        }
                        Err(e) => warn!(item_id = %id, error = %e, "Promotion write failed"),
                    }
                }
                continue;
            }

            self.long_term.touch(id, self.clock.now()).await;
        }
    }

    /// Delete an item from every tier. Returns whether anything was removed.
    #[instrument(skip(self), fields(subsystem = "engine", component = "orchestrator", op = "delete", item_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let _guard = self.lock_id(id).await;

        let in_immediate = self.immediate.delete(id);
        let in_session = self.session.delete(id);
        let in_long_term = self.long_term.delete(id).await?;

        self.cache.invalidate_all().await;
        Ok(in_immediate || in_session || in_long_term)
    }

    /// Clear a scope. Returns the number of items removed.
    #[instrument(skip(self), fields(subsystem = "engine", component = "orchestrator", op = "clear"))]
    pub async fn clear(&self, scope: ClearScope) -> Result<usize> {
        let cleared = match scope {
            ClearScope::Immediate => self.immediate.clear(),
            ClearScope::Session(conversation) => self.session.clear(conversation.as_deref()),
            ClearScope::All => {
                self.immediate.clear()
                    + self.session.clear(None)
                    + self.long_term.clear().await?
            }
        };
        self.cache.invalidate_all().await;
        info!(cleared, "Clear complete");
        Ok(cleared)
    }

    /// Run consolidation across every conversation.
    pub fn consolidate_sessions(&self) -> usize {
        self.session.consolidate_all()
    }

    /// Metrics snapshot.
    pub async fn stats(&self) -> StatsSnapshot {
        let (
            total_stores,
            total_retrievals,
            degraded_responses,
            promotions,
            immediate_stores,
            session_stores,
            long_term_stores,
        ) = self.metrics.counters();
        let session_metrics = self.session.metrics();
        let usage = self.immediate.token_usage();

        StatsSnapshot {
            total_stores,
            total_retrievals,
            degraded_responses,
            promotions,
            immediate_stores,
            session_stores,
            long_term_stores,
            immediate_items: usage.item_count,
            immediate_tokens: usage.current_tokens,
            session_items: self.session.total_len(),
            session_conversations: session_metrics.active_conversations,
            session_evictions: session_metrics.total_evictions,
            session_consolidations: session_metrics.total_consolidations,
            long_term_items: self.long_term.len().await,
            cache: self.cache.stats().await,
        }
    }

    /// Direct access to the immediate tier (read paths in tests).
    pub fn immediate(&self) -> &ImmediateTier {
        &self.immediate
    }

    /// Direct access to the session tier.
    pub fn session(&self) -> &SessionTier {
        &self.session
    }

    /// Direct access to the long-term tier.
    pub fn long_term(&self) -> &LongTermTier {
        &self.long_term
    }

    /// Serialize writes to the same id. The entry is dropped again once the
    /// last holder releases it.
    async fn lock_id(&self, id: Uuid) -> IdGuard<'_> {
        let lock = {
            let mut locks = self.write_locks.lock().await;
            locks.entry(id).or_default().clone()
        };
        // Hold the per-id mutex for the guard's lifetime.
        let _permit = lock.clone().lock_owned().await;
        IdGuard {
            orchestrator: self,
            id,
            lock,
            _permit,
        }
    }
}

struct IdGuard<'a> {
    orchestrator: &'a Orchestrator,
    id: Uuid,
    lock: Arc<tokio::sync::Mutex<()>>,
    _permit: tokio::sync::OwnedMutexGuard<()>,
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        // Opportunistic cleanup: forget the entry when nobody else waits.
        if let Ok(mut locks) = self.orchestrator.write_locks.try_lock() {
            if Arc::strong_count(&self.lock) <= 3 {
                locks.remove(&self.id);
            }
        }
    }
}

fn flatten_subquery(
    outcome: std::result::Result<Result<Vec<(Uuid, f32)>>, tokio::time::error::Elapsed>,
    source: &str,
    degraded: &mut bool,
) -> Vec<(Uuid, f32)> {
    match outcome {
        Ok(Ok(hits)) => hits,
        Ok(Err(e)) => {
            warn!(error = %e, source, "Sub-query failed; continuing degraded");
            *degraded = true;
            Vec::new()
        }
        Err(_) => {
            warn!(source, "Sub-query timed out; continuing degraded");
            *degraded = true;
            Vec::new()
        }
    }
}

/// Walk the ranked list accumulating token estimates, stopping before the
/// budget is exceeded. The first item is always included even when it alone
/// exceeds the budget.
fn apply_token_budget(
    scored: Vec<ScoredItem>,
    max_results: usize,
    max_tokens: usize,
) -> Vec<ScoredItem> {
    let mut taken = Vec::new();
    let mut tokens = 0usize;

    for item in scored {
        if taken.len() >= max_results {
            break;
        }
        let cost = item.item.token_estimate;
        if taken.is_empty() || tokens + cost <= max_tokens {
            tokens += cost;
            taken.push(item);
            if tokens >= max_tokens {
                break;
            }
        } else {
            break;
        }
    }

    taken
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use strata_core::clock::ManualClock;
    use strata_core::models::MetaValue;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), MetaValue::from(*v)))
            .collect()
    }

    fn orchestrator() -> (Orchestrator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        (
            Orchestrator::in_memory(StrataConfig::default(), clock.clone()),
            clock,
        )
    }

    #[tokio::test]
    async fn test_store_rejects_empty_content() {
        let (orch, _) = orchestrator();
        let err = orch
            .store("", Metadata::new(), None, TierHint::Auto)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_routing_default_is_immediate_only() {
        let (orch, _) = orchestrator();
        let receipt = orch
            .store("plain note", Metadata::new(), None, TierHint::Auto)
            .await
            .unwrap();
        assert_eq!(receipt.admitted, vec![Tier::Immediate]);
    }

    #[tokio::test]
    async fn test_routing_conversation_adds_session() {
        let (orch, _) = orchestrator();
        let receipt = orch
            .store("chat line", Metadata::new(), Some("c1"), TierHint::Auto)
            .await
            .unwrap();
        assert_eq!(receipt.admitted, vec![Tier::Immediate, Tier::Session]);
    }

    #[tokio::test]
    async fn test_routing_high_priority_adds_long_term() {
        let (orch, _) = orchestrator();
        let receipt = orch
            .store(
                "remember forever",
                meta(&[("importance", "critical")]),
                None,
                TierHint::Auto,
            )
            .await
            .unwrap();
        assert!(receipt.admitted.contains(&Tier::LongTerm));
    }

    #[tokio::test]
    async fn test_routing_fact_kind_adds_long_term() {
        let (orch, _) = orchestrator();
        let receipt = orch
            .store(
                "the capital of France is Paris",
                meta(&[("type", "fact")]),
                None,
                TierHint::Auto,
            )
            .await
            .unwrap();
        assert!(receipt.admitted.contains(&Tier::LongTerm));
    }

    #[tokio::test]
    async fn test_explicit_hint_honored() {
        let (orch, _) = orchestrator();
        let receipt = orch
            .store(
                "long term only",
                Metadata::new(),
                None,
                TierHint::LongTerm,
            )
            .await
            .unwrap();
        assert_eq!(receipt.admitted, vec![Tier::LongTerm]);
        assert!(orch.immediate().is_empty());
    }

    #[tokio::test]
    async fn test_session_hint_without_conversation_rejected() {
        let (orch, _) = orchestrator();
        let err = orch
            .store("orphan", Metadata::new(), None, TierHint::Session)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_store_then_retrieve_hybrid() {
        let (orch, _) = orchestrator();
        orch.store(
            "rust borrow checker rules",
            Metadata::new(),
            None,
            TierHint::Auto,
        )
        .await
        .unwrap();

        let response = orch
            .retrieve(RetrievalRequest::new("borrow checker"))
            .await
            .unwrap();
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].item.content, "rust borrow checker rules");
        assert!(!response.cache_hit);
        assert!(!response.degraded);
    }

    #[tokio::test]
    async fn test_empty_query_returns_empty() {
        let (orch, _) = orchestrator();
        orch.store("something", Metadata::new(), None, TierHint::Auto)
            .await
            .unwrap();

        let response = orch.retrieve(RetrievalRequest::new("   ")).await.unwrap();
        assert!(response.items.is_empty());
    }

    #[tokio::test]
    async fn test_max_results_zero_returns_empty() {
        let (orch, _) = orchestrator();
        orch.store("something", Metadata::new(), None, TierHint::Auto)
            .await
            .unwrap();

        let response = orch
            .retrieve(RetrievalRequest::new("something").with_max_results(0))
            .await
            .unwrap();
        assert!(response.items.is_empty());
    }

    #[tokio::test]
    async fn test_cache_hit_on_repeat() {
        let (orch, _) = orchestrator();
        orch.store("cachable fact", meta(&[("type", "fact")]), None, TierHint::Auto)
            .await
            .unwrap();

        let request = RetrievalRequest::new("cachable fact");
        let first = orch.retrieve(request.clone()).await.unwrap();
        assert!(!first.cache_hit);

        let second = orch.retrieve(request).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.items.len(), first.items.len());
    }

    #[tokio::test]
    async fn test_store_invalidates_cache() {
        let (orch, _) = orchestrator();
        orch.store("first fact", meta(&[("type", "fact")]), None, TierHint::Auto)
            .await
            .unwrap();

        let request = RetrievalRequest::new("fact");
        orch.retrieve(request.clone()).await.unwrap();

        orch.store("second fact", meta(&[("type", "fact")]), None, TierHint::Auto)
            .await
            .unwrap();

        let after = orch.retrieve(request).await.unwrap();
        assert!(!after.cache_hit, "store must invalidate the cache");
        assert_eq!(after.items.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_removes_everywhere() {
        let (orch, _) = orchestrator();
        let receipt = orch
            .store(
                "short lived fact",
                meta(&[("type", "fact")]),
                Some("c1"),
                TierHint::Auto,
            )
            .await
            .unwrap();

        assert!(orch.delete(receipt.id).await.unwrap());
        assert!(!orch.delete(receipt.id).await.unwrap());

        let response = orch
            .retrieve(RetrievalRequest::new("short lived fact"))
            .await
            .unwrap();
        assert!(response.items.is_empty());
    }

    #[tokio::test]
    async fn test_clear_scopes() {
        let (orch, _) = orchestrator();
        orch.store("immediate one", Metadata::new(), None, TierHint::Auto)
            .await
            .unwrap();
        orch.store("session one", Metadata::new(), Some("c1"), TierHint::Auto)
            .await
            .unwrap();

        assert_eq!(orch.clear(ClearScope::Immediate).await.unwrap(), 2);
        assert_eq!(orch.session().len("c1"), 1);

        assert_eq!(
            orch.clear(ClearScope::Session(Some("c1".into()))).await.unwrap(),
            1
        );
        assert!(orch.session().is_empty());
    }

    #[tokio::test]
    async fn test_token_budget_truncation() {
        let (orch, _) = orchestrator();
        // 400-char items: 100 tokens each.
        for i in 0..5 {
            orch.store(
                format!("budget item {i} {}", "x".repeat(385)),
                Metadata::new(),
                None,
                TierHint::Auto,
            )
            .await
            .unwrap();
        }

        let response = orch
            .retrieve(
                RetrievalRequest::new("budget item")
                    .with_max_results(10)
                    .with_max_tokens(250),
            )
            .await
            .unwrap();

        assert_eq!(response.items.len(), 2);
        assert!(response.total_tokens() <= 250);
    }

    #[tokio::test]
    async fn test_token_budget_first_item_exception() {
        let (orch, _) = orchestrator();
        orch.store(
            format!("huge {}", "y".repeat(4000)),
            Metadata::new(),
            None,
            TierHint::Auto,
        )
        .await
        .unwrap();

        let response = orch
            .retrieve(RetrievalRequest::new("huge").with_max_tokens(10))
            .await
            .unwrap();
        assert_eq!(response.items.len(), 1, "oversized first item still returned");
    }

    #[tokio::test]
    async fn test_keyword_strategy_skips_collaborators() {
        let (orch, _) = orchestrator();
        orch.store(
            "indexed fact about lifetimes",
            meta(&[("type", "fact")]),
            None,
            TierHint::Auto,
        )
        .await
        .unwrap();

        let response = orch
            .retrieve(
                RetrievalRequest::new("lifetimes").with_strategy(RetrievalStrategy::Keyword),
            )
            .await
            .unwrap();
        assert!(!response.items.is_empty());
        assert!(!response.degraded);
    }

    #[tokio::test]
    async fn test_semantic_strategy_excludes_memory_tiers() {
        let (orch, _) = orchestrator();
        // Immediate-only item: invisible to a semantic-only search.
        orch.store("ephemeral remark", Metadata::new(), None, TierHint::Immediate)
            .await
            .unwrap();
        orch.store(
            "semantic fact stored long term",
            meta(&[("type", "fact")]),
            None,
            TierHint::Auto,
        )
        .await
        .unwrap();

        let response = orch
            .retrieve(
                RetrievalRequest::new("semantic fact stored long term")
                    .with_strategy(RetrievalStrategy::Semantic),
            )
            .await
            .unwrap();

        assert!(response
            .items
            .iter()
            .all(|s| s.item.content != "ephemeral remark"));
    }

    #[tokio::test]
    async fn test_kind_filter_applies() {
        let (orch, _) = orchestrator();
        orch.store("filter fact", meta(&[("type", "fact")]), None, TierHint::Auto)
            .await
            .unwrap();
        orch.store("filter note", Metadata::new(), None, TierHint::Auto)
            .await
            .unwrap();

        let response = orch
            .retrieve(
                RetrievalRequest::new("filter").with_kinds(vec![ContextKind::Fact]),
            )
            .await
            .unwrap();
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].item.kind, ContextKind::Fact);
    }

    #[tokio::test]
    async fn test_stats_reflect_activity() {
        let (orch, _) = orchestrator();
        orch.store("a fact", meta(&[("type", "fact")]), Some("c1"), TierHint::Auto)
            .await
            .unwrap();
        orch.retrieve(RetrievalRequest::new("fact")).await.unwrap();

        let stats = orch.stats().await;
        assert_eq!(stats.total_stores, 1);
        assert_eq!(stats.total_retrievals, 1);
        assert_eq!(stats.immediate_stores, 1);
        assert_eq!(stats.session_stores, 1);
        assert_eq!(stats.long_term_stores, 1);
        assert_eq!(stats.long_term_items, 1);
        assert!(stats.cache.misses >= 1);
    }

    #[tokio::test]
    async fn test_min_score_filters_weak_results() {
        let (orch, _) = orchestrator();
        orch.store("precise match target", Metadata::new(), None, TierHint::Auto)
            .await
            .unwrap();
        orch.store("unrelated filler words", Metadata::new(), None, TierHint::Auto)
            .await
            .unwrap();

        let strict = orch
            .retrieve(
                RetrievalRequest::new("precise match target").with_min_score(0.9),
            )
            .await
            .unwrap();
        let lax = orch
            .retrieve(RetrievalRequest::new("precise match target"))
            .await
            .unwrap();

        assert!(strict.items.len() <= lax.items.len());
    }
}
