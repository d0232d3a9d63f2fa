//! # strata-core
//!
//! Core types, traits, and abstractions for the strata context cache.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other strata crates depend on.

pub mod clock;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod scoring;
pub mod traits;

// Re-export commonly used types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheConfig, ChunkerConfig, FusionConfig, ImmediateConfig, KeywordConfig, PromotionConfig,
    RetrieveConfig, SessionConfig, StrataConfig,
};
pub use error::{Error, Result};
pub use models::*;
pub use scoring::{estimate_tokens, jaccard, min_max_normalize, recency_decay};
pub use traits::{CollaboratorHit, EmbeddingBackend, GraphStore, RecordStore, VectorStore};
