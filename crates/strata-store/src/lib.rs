//! # strata-store
//!
//! Collaborator backends for strata.
//!
//! This crate provides:
//! - Embedding backends (Ollama HTTP client, deterministic mock)
//! - An in-memory vector store with cosine similarity
//! - An in-memory graph store with centrality search and path discovery
//! - An in-memory record store for long-term metadata
//!
//! All backends implement the traits from `strata-core`; the variant is
//! selected at construction.

pub mod embedding;
pub mod graph;
pub mod record;
pub mod vector;

pub use embedding::{cosine_similarity, MockEmbeddingBackend, OllamaEmbeddingBackend};
pub use graph::InMemoryGraphStore;
pub use record::InMemoryRecordStore;
pub use vector::InMemoryVectorStore;
