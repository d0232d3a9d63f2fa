//! Shared scoring arithmetic used by the tiers and the fusion layer.

use std::collections::HashSet;

use chrono::Duration;

/// Quickly estimate token count without tokenization.
///
/// Fixed at ingest as `⌈chars/4⌉`, with a floor of one token for non-empty
/// text. The estimate is immutable for the lifetime of an item.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(4).max(1)
}

/// Jaccard similarity between two token sets.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Exponential recency decay: `exp(-age / half_life)`.
///
/// Ages at or below zero score 1.0; a zero half-life decays immediately.
pub fn recency_decay(age: Duration, half_life: Duration) -> f32 {
    let age_secs = age.num_milliseconds() as f64 / 1000.0;
    if age_secs <= 0.0 {
        return 1.0;
    }
    let half_life_secs = half_life.num_milliseconds() as f64 / 1000.0;
    if half_life_secs <= 0.0 {
        return 0.0;
    }
    (-age_secs / half_life_secs).exp() as f32
}

/// Min-max normalize scores in place. With one entry, or when all scores
/// are equal, every entry gets 1.0.
pub fn min_max_normalize(scores: &mut [f32]) {
    if scores.is_empty() {
        return;
    }
    let min = scores.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range <= f32::EPSILON {
        scores.iter_mut().for_each(|s| *s = 1.0);
    } else {
        scores.iter_mut().for_each(|s| *s = (*s - min) / range);
    }
}
