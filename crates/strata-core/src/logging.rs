//! Structured logging schema and field name constants for strata.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied (per-source read failures) |
//! | INFO  | Lifecycle events, operation completions |
//! | DEBUG | Decision points, intermediate values, cache hits/misses |
//! | TRACE | Per-item iteration, high-volume data (postings, chunks) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "engine", "tiers", "index", "search", "store"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "orchestrator", "immediate", "session", "keyword_index", "fusion"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "store", "retrieve", "consolidate", "promote"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Context item UUID being operated on.
pub const ITEM_ID: &str = "item_id";

/// Conversation the operation is scoped to.
pub const CONVERSATION_ID: &str = "conversation_id";

/// Retrieval query text.
pub const QUERY: &str = "query";

/// Retrieval strategy in effect.
pub const STRATEGY: &str = "strategy";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or retrieval.
pub const RESULT_COUNT: &str = "result_count";

/// Number of chunks produced or indexed.
pub const CHUNK_COUNT: &str = "chunk_count";

/// Token total of a response or buffer.
pub const TOKEN_COUNT: &str = "token_count";

// ─── Retrieval-specific fields ─────────────────────────────────────────────

/// Number of keyword hits before fusion.
pub const KEYWORD_HITS: &str = "keyword_hits";

/// Number of semantic hits before fusion.
pub const SEMANTIC_HITS: &str = "semantic_hits";

/// Number of graph hits before fusion.
pub const GRAPH_HITS: &str = "graph_hits";

/// Whether the response was served from the cache.
pub const CACHE_HIT: &str = "cache_hit";

/// Whether one or more sub-queries failed or timed out.
pub const DEGRADED: &str = "degraded";

// ─── Tier fields ───────────────────────────────────────────────────────────

/// Tier an item was admitted to or evicted from.
pub const TIER: &str = "tier";

/// Number of items evicted by an operation.
pub const EVICTED: &str = "evicted";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
