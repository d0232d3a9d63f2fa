//! Runtime configuration for the strata system.
//!
//! Every knob has a default in [`crate::defaults`]; `from_env()` overlays
//! environment variables with clamping, warning on invalid values rather
//! than failing startup.

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Immediate-tier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmediateConfig {
    /// Maximum items in the FIFO ring.
    pub capacity: usize,
    /// Item time-to-live in seconds.
    pub ttl_seconds: i64,
    /// Token budget for the whole ring.
    pub token_cap: usize,
    /// Recency half-life in seconds.
    pub half_life_seconds: i64,
}

impl Default for ImmediateConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::IMMEDIATE_CAPACITY,
            ttl_seconds: defaults::IMMEDIATE_TTL_SECS,
            token_cap: defaults::IMMEDIATE_TOKEN_CAP,
            half_life_seconds: defaults::IMMEDIATE_HALF_LIFE_SECS,
        }
    }
}

/// Session-tier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum items per conversation.
    pub capacity_per_conv: usize,
    /// Conversation/note item count that triggers consolidation.
    pub consolidation_threshold: usize,
    /// Recency half-life in seconds; eviction uses twice this.
    pub half_life_seconds: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity_per_conv: defaults::SESSION_CAPACITY_PER_CONV,
            consolidation_threshold: defaults::SESSION_CONSOLIDATION_THRESHOLD,
            half_life_seconds: defaults::SESSION_HALF_LIFE_SECS,
        }
    }
}

/// Keyword index (BM25) configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Term-frequency saturation parameter.
    pub k1: f32,
    /// Document-length normalization parameter.
    pub b: f32,
    /// IDF floor.
    pub idf_epsilon: f32,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            k1: defaults::KEYWORD_K1,
            b: defaults::KEYWORD_B,
            idf_epsilon: defaults::KEYWORD_IDF_EPSILON,
        }
    }
}

/// Adaptive chunker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Preferred chunk size in characters.
    pub target: usize,
    /// Minimum acceptable chunk size.
    pub min: usize,
    /// Hard upper bound; never exceeded.
    pub max: usize,
    /// Baseline overlap between adjacent chunks.
    pub base_overlap: usize,
    /// Scale overlap with sentence density.
    pub adaptive: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target: defaults::CHUNK_TARGET,
            min: defaults::CHUNK_MIN,
            max: defaults::CHUNK_MAX,
            base_overlap: defaults::CHUNK_BASE_OVERLAP,
            adaptive: true,
        }
    }
}

impl ChunkerConfig {
    /// Upper bound on overlap: a third of the hard max, capped at 200.
    pub fn overlap_cap(&self) -> usize {
        (self.max / 3).min(defaults::CHUNK_OVERLAP_CAP)
    }
}

/// Fusion weights for the three retrieval paths. Weights of absent lists
/// are redistributed proportionally at fusion time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    pub graph_weight: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            semantic_weight: defaults::FUSION_SEMANTIC_WEIGHT,
            keyword_weight: defaults::FUSION_KEYWORD_WEIGHT,
            graph_weight: defaults::FUSION_GRAPH_WEIGHT,
        }
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveConfig {
    /// Default response token budget.
    pub max_tokens: usize,
    /// Overall retrieval deadline in milliseconds.
    pub deadline_ms: u64,
}

impl Default for RetrieveConfig {
    fn default() -> Self {
        Self {
            max_tokens: defaults::RETRIEVE_MAX_TOKENS,
            deadline_ms: defaults::RETRIEVE_DEADLINE_MS,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry TTL in seconds.
    pub ttl_seconds: i64,
    /// Maximum entries before the oldest are swept.
    pub max_entries: usize,
    /// Set false to disable caching entirely.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: defaults::CACHE_TTL_SECS,
            max_entries: defaults::CACHE_MAX_ENTRIES,
            enabled: true,
        }
    }
}

/// Promotion thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionConfig {
    /// Access count for immediate → session promotion.
    pub immediate_to_session_access: u32,
    /// Access count for session → long-term promotion (priority ≥ high).
    pub session_to_longterm_access: u32,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            immediate_to_session_access: defaults::PROMOTE_IMMEDIATE_TO_SESSION_ACCESS,
            session_to_longterm_access: defaults::PROMOTE_SESSION_TO_LONGTERM_ACCESS,
        }
    }
}

/// Top-level configuration handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    pub immediate: ImmediateConfig,
    pub session: SessionConfig,
    pub keyword: KeywordConfig,
    pub chunker: ChunkerConfig,
    pub fusion: FusionConfig,
    pub retrieve: RetrieveConfig,
    pub cache: CacheConfig,
    pub promotion: PromotionConfig,
}

impl StrataConfig {
    /// Load configuration from environment variables with fallback to
    /// defaults. Invalid values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        read_usize("STRATA_IMMEDIATE_CAPACITY", &mut config.immediate.capacity, 1, 10_000);
        read_i64(
            "STRATA_IMMEDIATE_TTL_SECONDS",
            &mut config.immediate.ttl_seconds,
            1,
            86_400 * 30,
        );
        read_usize(
            "STRATA_IMMEDIATE_TOKEN_CAP",
            &mut config.immediate.token_cap,
            1,
            1_000_000,
        );
        read_usize(
            "STRATA_SESSION_CAPACITY_PER_CONV",
            &mut config.session.capacity_per_conv,
            1,
            100_000,
        );
        read_usize(
            "STRATA_SESSION_CONSOLIDATION_THRESHOLD",
            &mut config.session.consolidation_threshold,
            2,
            100_000,
        );
        read_i64(
            "STRATA_SESSION_HALF_LIFE_SECONDS",
            &mut config.session.half_life_seconds,
            1,
            86_400 * 30,
        );
        read_f32("STRATA_KEYWORD_K1", &mut config.keyword.k1, 0.0, 10.0);
        read_f32("STRATA_KEYWORD_B", &mut config.keyword.b, 0.0, 1.0);
        read_usize("STRATA_CHUNKER_TARGET", &mut config.chunker.target, 16, 1 << 20);
        read_usize("STRATA_CHUNKER_MIN", &mut config.chunker.min, 1, 1 << 20);
        read_usize("STRATA_CHUNKER_MAX", &mut config.chunker.max, 16, 1 << 20);
        read_usize(
            "STRATA_CHUNKER_BASE_OVERLAP",
            &mut config.chunker.base_overlap,
            0,
            1 << 16,
        );
        read_f32(
            "STRATA_FUSION_SEMANTIC_WEIGHT",
            &mut config.fusion.semantic_weight,
            0.0,
            1.0,
        );
        read_f32(
            "STRATA_FUSION_KEYWORD_WEIGHT",
            &mut config.fusion.keyword_weight,
            0.0,
            1.0,
        );
        read_f32(
            "STRATA_FUSION_GRAPH_WEIGHT",
            &mut config.fusion.graph_weight,
            0.0,
            1.0,
        );
        read_usize(
            "STRATA_RETRIEVE_MAX_TOKENS",
            &mut config.retrieve.max_tokens,
            1,
            10_000_000,
        );
        read_u64(
            "STRATA_RETRIEVE_DEADLINE_MS",
            &mut config.retrieve.deadline_ms,
            1,
            600_000,
        );
        read_i64("STRATA_CACHE_TTL_SECONDS", &mut config.cache.ttl_seconds, 0, 86_400);
        read_u32(
            "STRATA_PROMOTION_IMMEDIATE_TO_SESSION_ACCESS",
            &mut config.promotion.immediate_to_session_access,
            1,
            1_000_000,
        );
        read_u32(
            "STRATA_PROMOTION_SESSION_TO_LONGTERM_ACCESS",
            &mut config.promotion.session_to_longterm_access,
            1,
            1_000_000,
        );

        config
    }
}

macro_rules! env_reader {
    ($name:ident, $ty:ty) => {
        fn $name(var: &str, slot: &mut $ty, min: $ty, max: $ty) {
            if let Ok(raw) = std::env::var(var) {
                match raw.parse::<$ty>() {
                    Ok(v) => *slot = v.clamp(min, max),
                    Err(_) => {
                        tracing::warn!(value = %raw, variable = var, "Invalid config value, using default")
                    }
                }
            }
        }
    };
}

env_reader!(read_usize, usize);
env_reader!(read_i64, i64);
env_reader!(read_u64, u64);
env_reader!(read_u32, u32);
env_reader!(read_f32, f32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = StrataConfig::default();
        assert_eq!(config.immediate.capacity, 10);
        assert_eq!(config.immediate.ttl_seconds, 3600);
        assert_eq!(config.immediate.token_cap, 2048);
        assert_eq!(config.session.capacity_per_conv, 50);
        assert_eq!(config.session.consolidation_threshold, 20);
        assert_eq!(config.session.half_life_seconds, 1800);
        assert_eq!(config.keyword.k1, 1.5);
        assert_eq!(config.keyword.b, 0.75);
        assert_eq!(config.chunker.target, 512);
        assert_eq!(config.chunker.min, 100);
        assert_eq!(config.chunker.max, 1024);
        assert_eq!(config.chunker.base_overlap, 50);
        assert_eq!(config.fusion.semantic_weight, 0.5);
        assert_eq!(config.fusion.keyword_weight, 0.3);
        assert_eq!(config.fusion.graph_weight, 0.2);
        assert_eq!(config.retrieve.max_tokens, 4096);
        assert_eq!(config.retrieve.deadline_ms, 2000);
        assert_eq!(config.cache.ttl_seconds, 300);
        assert_eq!(config.promotion.immediate_to_session_access, 3);
        assert_eq!(config.promotion.session_to_longterm_access, 5);
    }

    #[test]
    fn test_overlap_cap() {
        let config = ChunkerConfig::default();
        // min(1024 / 3, 200) = 200
        assert_eq!(config.overlap_cap(), 200);

        let small = ChunkerConfig {
            max: 300,
            ..Default::default()
        };
        assert_eq!(small.overlap_cap(), 100);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = StrataConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: StrataConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
