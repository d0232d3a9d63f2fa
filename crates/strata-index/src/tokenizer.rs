//! Query and document tokenization.
//!
//! Unicode-aware lowercase split on non-alphanumeric runs, tokens shorter
//! than two characters dropped, fixed English stopword set removed, no
//! stemming. Tokenization is deterministic; both indexing and querying go
//! through the same path.

use std::collections::HashSet;

use strata_core::defaults::MIN_TOKEN_LEN;

/// Fixed English stopword set. Kept deliberately small: removing query
/// terms too aggressively hurts short keyword queries more than keeping a
/// few noisy postings hurts ranking.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Tokenize text into lowercase alphanumeric runs.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                current.push(lower);
            }
        } else if !current.is_empty() {
            push_token(&mut tokens, std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        push_token(&mut tokens, current);
    }

    tokens
}

fn push_token(tokens: &mut Vec<String>, token: String) {
    if token.chars().count() >= MIN_TOKEN_LEN && !is_stopword(&token) {
        tokens.push(token);
    }
}

/// Whether a (lowercased) token is in the stopword set.
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

/// Tokenize into a set, for jaccard-style overlap scoring.
pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}
