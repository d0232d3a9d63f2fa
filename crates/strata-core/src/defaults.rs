//! Centralized default constants for the strata system.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates reference these constants instead of defining their
//! own magic numbers.
//!
//! Organized by subsystem. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// IMMEDIATE TIER
// =============================================================================

/// Maximum number of items in the immediate FIFO ring.
pub const IMMEDIATE_CAPACITY: usize = 10;

/// Time-to-live for immediate-tier items in seconds (1 hour).
pub const IMMEDIATE_TTL_SECS: i64 = 3600;

/// Token budget for the immediate ring. Items are evicted from the head
/// until the sum of token estimates fits.
pub const IMMEDIATE_TOKEN_CAP: usize = 2048;

/// Half-life for the immediate recency score, in seconds.
pub const IMMEDIATE_HALF_LIFE_SECS: i64 = 1800;

/// Weight of the keyword-overlap bonus in immediate-tier scoring.
pub const IMMEDIATE_OVERLAP_BONUS: f32 = 0.1;

// =============================================================================
// SESSION TIER
// =============================================================================

/// Maximum items retained per conversation.
pub const SESSION_CAPACITY_PER_CONV: usize = 50;

/// Item count at which consolidation of conversation/note runs triggers.
pub const SESSION_CONSOLIDATION_THRESHOLD: usize = 20;

/// Half-life for session recency decay, in seconds. Eviction decay uses
/// twice this value.
pub const SESSION_HALF_LIFE_SECS: i64 = 1800;

/// Separator used when consolidating adjacent items.
pub const CONSOLIDATION_SEPARATOR: &str = "\n---\n";

// =============================================================================
// KEYWORD INDEX
// =============================================================================

/// BM25 term-frequency saturation parameter.
pub const KEYWORD_K1: f32 = 1.5;

/// BM25 document-length normalization parameter.
pub const KEYWORD_B: f32 = 0.75;

/// Floor applied to IDF scores. Terms present in nearly every document
/// otherwise contribute almost nothing, which makes single-term queries
/// against tiny corpora degenerate.
pub const KEYWORD_IDF_EPSILON: f32 = 0.25;

/// Minimum token length kept by the tokenizer.
pub const MIN_TOKEN_LEN: usize = 2;

// =============================================================================
// CHUNKER
// =============================================================================

/// Preferred chunk size in characters.
pub const CHUNK_TARGET: usize = 512;

/// Minimum acceptable chunk size; shorter chunks are merged backwards.
pub const CHUNK_MIN: usize = 100;

/// Hard upper bound on chunk size; never exceeded.
pub const CHUNK_MAX: usize = 1024;

/// Baseline character overlap between adjacent chunks.
pub const CHUNK_BASE_OVERLAP: usize = 50;

/// Absolute cap on adaptive overlap, in characters.
pub const CHUNK_OVERLAP_CAP: usize = 200;

// =============================================================================
// HYBRID FUSION WEIGHTS
// =============================================================================

/// Default semantic (dense vector) path weight.
pub const FUSION_SEMANTIC_WEIGHT: f32 = 0.5;

/// Default keyword (BM25) path weight.
pub const FUSION_KEYWORD_WEIGHT: f32 = 0.3;

/// Default graph (entity) path weight.
pub const FUSION_GRAPH_WEIGHT: f32 = 0.2;

// =============================================================================
// RETRIEVAL
// =============================================================================

/// Default maximum results per retrieval.
pub const MAX_RESULTS: usize = 10;

/// Default response token budget.
pub const RETRIEVE_MAX_TOKENS: usize = 4096;

/// Default overall retrieval deadline in milliseconds.
pub const RETRIEVE_DEADLINE_MS: u64 = 2000;

/// Traversal depth for graph-path retrieval.
pub const GRAPH_SEARCH_MAX_DEPTH: usize = 2;

// =============================================================================
// RESPONSE CACHE
// =============================================================================

/// Response cache TTL in seconds (5 minutes).
pub const CACHE_TTL_SECS: i64 = 300;

/// Maximum number of cached responses before the oldest are swept.
pub const CACHE_MAX_ENTRIES: usize = 100;

/// Number of entries removed per sweep when the cache is full.
pub const CACHE_SWEEP_COUNT: usize = 20;

// =============================================================================
// PROMOTION
// =============================================================================

/// Access count at which an immediate item is copied into the session tier.
pub const PROMOTE_IMMEDIATE_TO_SESSION_ACCESS: u32 = 3;

/// Access count at which a high-priority session item is copied into the
/// long-term tier.
pub const PROMOTE_SESSION_TO_LONGTERM_ACCESS: u32 = 5;

/// Access count at which a session entry becomes `warm`.
pub const SESSION_WARM_ACCESS: u32 = 3;

/// Access count at which a high-priority session entry becomes `hot`.
pub const SESSION_HOT_ACCESS: u32 = 10;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;
