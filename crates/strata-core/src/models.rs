//! Data model for the strata context cache.
//!
//! The unit of storage is the [`ContextItem`]. Items are tagged with a
//! [`ContextKind`] and a [`Priority`], carry a free-form scalar metadata map,
//! and keep access-tracking state that drives tier promotion and eviction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::scoring::estimate_tokens;

/// Reserved metadata key for conversation grouping.
pub const META_CONVERSATION_ID: &str = "conversation_id";
/// Reserved metadata key for task grouping.
pub const META_TASK_ID: &str = "task_id";
/// Reserved metadata key for tags.
pub const META_TAGS: &str = "tags";
/// Reserved metadata key for the item kind.
pub const META_TYPE: &str = "type";
/// Reserved metadata key for the item priority.
pub const META_IMPORTANCE: &str = "importance";

/// Scalar metadata value. Anything beyond the reserved keys is opaque
/// pass-through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Ordered sequence of strings; used by the reserved `tags` key.
    StrList(Vec<String>),
}

impl MetaValue {
    /// String view, if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Str(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Str(s)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

/// Metadata map. BTreeMap keeps iteration order deterministic, which the
/// cache-key and tie-break rules rely on.
pub type Metadata = BTreeMap<String, MetaValue>;

/// Kind of context item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Preference,
    Fact,
    Task,
    Note,
    Conversation,
    Document,
    Code,
}

impl ContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::Preference => "preference",
            ContextKind::Fact => "fact",
            ContextKind::Task => "task",
            ContextKind::Note => "note",
            ContextKind::Conversation => "conversation",
            ContextKind::Document => "document",
            ContextKind::Code => "code",
        }
    }
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContextKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "preference" => Ok(Self::Preference),
            "fact" => Ok(Self::Fact),
            "task" => Ok(Self::Task),
            "note" => Ok(Self::Note),
            "conversation" => Ok(Self::Conversation),
            "document" => Ok(Self::Document),
            "code" => Ok(Self::Code),
            _ => Err(Error::InvalidInput(format!("unknown context kind: {s}"))),
        }
    }
}

/// Item priority. Variant order is ascending so `Ord` reflects importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Minimal,
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Importance weight used by eviction and retrieval scoring.
    pub fn weight(&self) -> f32 {
        match self {
            Priority::Critical => 1.5,
            Priority::High => 1.2,
            Priority::Normal => 1.0,
            Priority::Low => 0.7,
            Priority::Minimal => 0.4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Minimal => "minimal",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            "minimal" => Ok(Self::Minimal),
            _ => Err(Error::InvalidInput(format!("unknown priority: {s}"))),
        }
    }
}

/// One of the three storage layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Immediate,
    Session,
    LongTerm,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Immediate => "immediate",
            Tier::Session => "session",
            Tier::LongTerm => "long_term",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller hint for where a stored item should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TierHint {
    Immediate,
    Session,
    LongTerm,
    #[default]
    Auto,
}

/// Retrieval strategy selecting which sources participate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    Recency,
    Relevance,
    #[default]
    Hybrid,
    Semantic,
    Keyword,
    Graph,
}

impl RetrievalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::Recency => "recency",
            RetrievalStrategy::Relevance => "relevance",
            RetrievalStrategy::Hybrid => "hybrid",
            RetrievalStrategy::Semantic => "semantic",
            RetrievalStrategy::Keyword => "keyword",
            RetrievalStrategy::Graph => "graph",
        }
    }
}

impl std::str::FromStr for RetrievalStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "recency" => Ok(Self::Recency),
            "relevance" => Ok(Self::Relevance),
            "hybrid" => Ok(Self::Hybrid),
            "semantic" => Ok(Self::Semantic),
            "keyword" => Ok(Self::Keyword),
            "graph" => Ok(Self::Graph),
            _ => Err(Error::InvalidInput(format!("unknown strategy: {s}"))),
        }
    }
}

/// The unit of storage. The same logical item may be mirrored into several
/// tiers; it keeps the same `id` across migrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: Uuid,
    pub content: String,
    pub kind: ContextKind,
    pub priority: Priority,
    pub metadata: Metadata,
    pub conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u32,
    /// Derived once at ingest as `⌈chars/4⌉`; immutable afterwards.
    pub token_estimate: usize,
    pub tier_hint: TierHint,
}

impl ContextItem {
    /// Create a new item. `kind` and `priority` are resolved from the
    /// metadata reserved keys when present.
    pub fn new(content: impl Into<String>, metadata: Metadata, now: DateTime<Utc>) -> Result<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("content must not be empty".into()));
        }

        let kind = metadata
            .get(META_TYPE)
            .and_then(MetaValue::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(ContextKind::Note);
        let priority = metadata
            .get(META_IMPORTANCE)
            .and_then(MetaValue::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(Priority::Normal);
        let conversation_id = metadata
            .get(META_CONVERSATION_ID)
            .and_then(MetaValue::as_str)
            .map(str::to_string);
        let token_estimate = estimate_tokens(&content);

        Ok(Self {
            id: Uuid::new_v4(),
            content,
            kind,
            priority,
            metadata,
            conversation_id,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            token_estimate,
            tier_hint: TierHint::Auto,
        })
    }

    /// Set the conversation the item belongs to.
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Set the tier hint.
    pub fn with_tier_hint(mut self, hint: TierHint) -> Self {
        self.tier_hint = hint;
        self
    }

    /// Override the kind.
    pub fn with_kind(mut self, kind: ContextKind) -> Self {
        self.kind = kind;
        self
    }

    /// Override the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Record an access. `access_count` and `last_accessed_at` move together.
    pub fn mark_accessed(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed_at = now;
    }

    /// Importance weight derived from priority.
    pub fn priority_weight(&self) -> f32 {
        self.priority.weight()
    }

    /// Task id from the reserved metadata key, if any.
    pub fn task_id(&self) -> Option<&str> {
        self.metadata.get(META_TASK_ID).and_then(MetaValue::as_str)
    }

    /// Age of the item at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// Retrieval request. Built with `with_*` setters; defaults follow the
/// configuration constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub max_results: usize,
    pub max_tokens: usize,
    pub conversation_id: Option<String>,
    pub kinds: Option<Vec<ContextKind>>,
    pub min_score: Option<f32>,
    pub strategy: RetrievalStrategy,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: crate::defaults::MAX_RESULTS,
            max_tokens: crate::defaults::RETRIEVE_MAX_TOKENS,
            conversation_id: None,
            kinds: None,
            min_score: None,
            strategy: RetrievalStrategy::Hybrid,
            since: None,
            until: None,
        }
    }

    pub fn with_strategy(mut self, strategy: RetrievalStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<ContextKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Whether an item passes the request's kind and time-range filters.
    pub fn matches(&self, item: &ContextItem) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&item.kind) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if item.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if item.created_at > until {
                return false;
            }
        }
        true
    }
}

/// Per-path score breakdown kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub keyword: Option<f32>,
    pub semantic: Option<f32>,
    pub graph: Option<f32>,
    pub recency: Option<f32>,
}

impl ComponentScores {
    /// Number of components that contributed a score.
    pub fn present(&self) -> usize {
        [self.keyword, self.semantic, self.graph, self.recency]
            .iter()
            .filter(|c| c.is_some())
            .count()
    }
}

/// A retrieved item with its fused score and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: ContextItem,
    pub score: f32,
    pub source_tier: Tier,
    pub component_scores: ComponentScores,
}

/// Per-tier hit counts for a retrieval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub immediate: usize,
    pub session: usize,
    pub long_term: usize,
}

/// Ordered retrieval response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub items: Vec<ScoredItem>,
    pub strategy: RetrievalStrategy,
    pub total_retrieved: usize,
    pub tier_counts: TierCounts,
    pub cache_hit: bool,
    /// Set when one or more sub-queries failed or timed out.
    pub degraded: bool,
}

impl RetrievalResponse {
    /// Empty response for the given strategy.
    pub fn empty(strategy: RetrievalStrategy) -> Self {
        Self {
            items: Vec::new(),
            strategy,
            total_retrieved: 0,
            tier_counts: TierCounts::default(),
            cache_hit: false,
            degraded: false,
        }
    }

    /// Sum of token estimates over the returned items.
    pub fn total_tokens(&self) -> usize {
        self.items.iter().map(|s| s.item.token_estimate).sum()
    }
}

/// Receipt for a store operation: the item id and the tiers that admitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReceipt {
    pub id: Uuid,
    pub admitted: Vec<Tier>,
}

/// Scope for `clear` operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    Immediate,
    Session(Option<String>),
    All,
}

/// Persisted long-term record. Restoring these and reindexing fully
/// reconstructs retrievability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTermRecord {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub priority: Priority,
    pub kind: ContextKind,
    pub metadata: Metadata,
    pub token_estimate: usize,
}

impl From<&ContextItem> for LongTermRecord {
    fn from(item: &ContextItem) -> Self {
        Self {
            id: item.id,
            content: item.content.clone(),
            created_at: item.created_at,
            priority: item.priority,
            kind: item.kind,
            metadata: item.metadata.clone(),
            token_estimate: item.token_estimate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), MetaValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_priority_weights() {
        assert_eq!(Priority::Critical.weight(), 1.5);
        assert_eq!(Priority::High.weight(), 1.2);
        assert_eq!(Priority::Normal.weight(), 1.0);
        assert_eq!(Priority::Low.weight(), 0.7);
        assert_eq!(Priority::Minimal.weight(), 0.4);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert!(Priority::Low > Priority::Minimal);
        assert!(Priority::High >= Priority::High);
    }

    #[test]
    fn test_priority_roundtrip() {
        for p in [
            Priority::Critical,
            Priority::High,
            Priority::Normal,
            Priority::Low,
            Priority::Minimal,
        ] {
            assert_eq!(p.as_str().parse::<Priority>().unwrap(), p);
        }
    }

    #[test]
    fn test_kind_roundtrip() {
        for k in [
            ContextKind::Preference,
            ContextKind::Fact,
            ContextKind::Task,
            ContextKind::Note,
            ContextKind::Conversation,
            ContextKind::Document,
            ContextKind::Code,
        ] {
            assert_eq!(k.as_str().parse::<ContextKind>().unwrap(), k);
        }
    }

    #[test]
    fn test_unknown_strategy_is_invalid_input() {
        let err = "bogus".parse::<RetrievalStrategy>().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_item_from_metadata() {
        let now = Utc::now();
        let item = ContextItem::new(
            "the user prefers dark mode",
            meta(&[("importance", "high"), ("type", "preference")]),
            now,
        )
        .unwrap();

        assert_eq!(item.kind, ContextKind::Preference);
        assert_eq!(item.priority, Priority::High);
        assert_eq!(item.access_count, 0);
        assert_eq!(item.created_at, now);
        assert_eq!(item.last_accessed_at, now);
    }

    #[test]
    fn test_item_defaults() {
        let item = ContextItem::new("plain text", Metadata::new(), Utc::now()).unwrap();
        assert_eq!(item.kind, ContextKind::Note);
        assert_eq!(item.priority, Priority::Normal);
        assert_eq!(item.tier_hint, TierHint::Auto);
        assert!(item.conversation_id.is_none());
    }

    #[test]
    fn test_item_empty_content_rejected() {
        let err = ContextItem::new("", Metadata::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = ContextItem::new("   ", Metadata::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_item_token_estimate() {
        // 20 chars -> ceil(20/4) = 5
        let item = ContextItem::new("a".repeat(20), Metadata::new(), Utc::now()).unwrap();
        assert_eq!(item.token_estimate, 5);

        // 21 chars -> ceil(21/4) = 6
        let item = ContextItem::new("a".repeat(21), Metadata::new(), Utc::now()).unwrap();
        assert_eq!(item.token_estimate, 6);
    }

    #[test]
    fn test_item_conversation_from_metadata() {
        let item = ContextItem::new(
            "hello",
            meta(&[("conversation_id", "conv-1")]),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(item.conversation_id.as_deref(), Some("conv-1"));
    }

    #[test]
    fn test_mark_accessed_updates_both_fields() {
        let t0 = Utc::now();
        let mut item = ContextItem::new("hello", Metadata::new(), t0).unwrap();
        let t1 = t0 + chrono::Duration::seconds(5);

        item.mark_accessed(t1);
        assert_eq!(item.access_count, 1);
        assert_eq!(item.last_accessed_at, t1);

        item.mark_accessed(t1);
        assert_eq!(item.access_count, 2);
    }

    #[test]
    fn test_request_builder() {
        let request = RetrievalRequest::new("what does the user prefer")
            .with_strategy(RetrievalStrategy::Keyword)
            .with_max_results(5)
            .with_max_tokens(512)
            .with_conversation("c1")
            .with_min_score(0.2);

        assert_eq!(request.strategy, RetrievalStrategy::Keyword);
        assert_eq!(request.max_results, 5);
        assert_eq!(request.max_tokens, 512);
        assert_eq!(request.conversation_id.as_deref(), Some("c1"));
        assert_eq!(request.min_score, Some(0.2));
    }

    #[test]
    fn test_request_defaults() {
        let request = RetrievalRequest::new("q");
        assert_eq!(request.max_results, crate::defaults::MAX_RESULTS);
        assert_eq!(request.max_tokens, crate::defaults::RETRIEVE_MAX_TOKENS);
        assert_eq!(request.strategy, RetrievalStrategy::Hybrid);
    }

    #[test]
    fn test_request_kind_filter() {
        let request = RetrievalRequest::new("q").with_kinds(vec![ContextKind::Fact]);
        let fact = ContextItem::new("x", meta(&[("type", "fact")]), Utc::now()).unwrap();
        let note = ContextItem::new("x", Metadata::new(), Utc::now()).unwrap();

        assert!(request.matches(&fact));
        assert!(!request.matches(&note));
    }

    #[test]
    fn test_request_time_filter() {
        let t0 = Utc::now();
        let item = ContextItem::new("x", Metadata::new(), t0).unwrap();

        let req = RetrievalRequest::new("q").with_since(t0 - chrono::Duration::seconds(1));
        assert!(req.matches(&item));

        let req = RetrievalRequest::new("q").with_since(t0 + chrono::Duration::seconds(1));
        assert!(!req.matches(&item));

        let req = RetrievalRequest::new("q").with_until(t0 - chrono::Duration::seconds(1));
        assert!(!req.matches(&item));
    }

    #[test]
    fn test_component_scores_present() {
        let scores = ComponentScores {
            keyword: Some(0.4),
            semantic: Some(0.9),
            graph: None,
            recency: None,
        };
        assert_eq!(scores.present(), 2);
        assert_eq!(ComponentScores::default().present(), 0);
    }

    #[test]
    fn test_response_total_tokens() {
        let now = Utc::now();
        let mk = |content: &str| ScoredItem {
            item: ContextItem::new(content, Metadata::new(), now).unwrap(),
            score: 1.0,
            source_tier: Tier::Immediate,
            component_scores: ComponentScores::default(),
        };
        let response = RetrievalResponse {
            items: vec![mk(&"a".repeat(8)), mk(&"b".repeat(4))],
            strategy: RetrievalStrategy::Hybrid,
            total_retrieved: 2,
            tier_counts: TierCounts::default(),
            cache_hit: false,
            degraded: false,
        };
        assert_eq!(response.total_tokens(), 3);
    }

    #[test]
    fn test_long_term_record_from_item() {
        let item = ContextItem::new("fact text", meta(&[("type", "fact")]), Utc::now()).unwrap();
        let record = LongTermRecord::from(&item);
        assert_eq!(record.id, item.id);
        assert_eq!(record.kind, ContextKind::Fact);
        assert_eq!(record.token_estimate, item.token_estimate);
    }

    #[test]
    fn test_serde_roundtrip() {
        let item = ContextItem::new(
            "serialize me",
            meta(&[("importance", "critical"), ("source", "test")]),
            Utc::now(),
        )
        .unwrap();

        let json = serde_json::to_string(&item).unwrap();
        let parsed: ContextItem = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, item);
    }

    #[test]
    fn test_metavalue_untagged_serde() {
        let mut m = Metadata::new();
        m.insert("s".into(), MetaValue::from("text"));
        m.insert("n".into(), MetaValue::from(3_i64));
        m.insert("b".into(), MetaValue::from(true));
        m.insert(
            "tags".into(),
            MetaValue::StrList(vec!["a".into(), "b".into()]),
        );

        let json = serde_json::to_string(&m).unwrap();
        let parsed: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, m);
    }
}
