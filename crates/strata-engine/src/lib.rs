//! # strata-engine
//!
//! The orchestrator for the strata multi-tier context cache.
//!
//! This crate wires the tiers, the keyword index, the fusion layer, and the
//! external collaborators into one public API:
//!
//! ```ignore
//! use std::sync::Arc;
//! use strata_core::{StrataConfig, SystemClock, TierHint};
//! use strata_core::models::{Metadata, RetrievalRequest};
//! use strata_engine::Orchestrator;
//!
//! let orchestrator = Orchestrator::in_memory(
//!     StrataConfig::from_env(),
//!     Arc::new(SystemClock),
//! );
//!
//! let receipt = orchestrator
//!     .store("the user prefers dark mode", Metadata::new(), None, TierHint::Auto)
//!     .await?;
//!
//! let response = orchestrator
//!     .retrieve(RetrievalRequest::new("what does the user prefer?"))
//!     .await?;
//! ```

pub mod orchestrator;
pub mod response_cache;
pub mod stats;

pub use orchestrator::Orchestrator;
pub use response_cache::{CacheStats, ResponseCache};
pub use stats::{EngineMetrics, StatsSnapshot};
