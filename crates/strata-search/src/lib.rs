//! # strata-search
//!
//! Hybrid score fusion for strata retrieval.
//!
//! Combines keyword, semantic, and graph candidate lists (plus the
//! in-memory tier scans) into one ranked list with deterministic
//! tie-breaking.

pub mod fusion;

pub use fusion::{fuse, FusedHit, FusionList, FusionSource};
