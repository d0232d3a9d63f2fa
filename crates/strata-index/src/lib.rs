//! # strata-index
//!
//! Text processing and keyword retrieval for strata:
//!
//! - Deterministic tokenization (lowercase, stopwords, no stemming)
//! - Adaptive chunking with sentence-aligned overlap
//! - BM25 inverted index with cached IDF and deterministic tie-breaks

pub mod chunker;
pub mod keyword;
pub mod tokenizer;

pub use chunker::{AdaptiveChunker, Chunk};
pub use keyword::{IndexStats, KeywordHit, KeywordIndex};
pub use tokenizer::{is_stopword, token_set, tokenize};
