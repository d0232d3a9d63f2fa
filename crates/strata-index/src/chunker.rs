//! Adaptive text chunking with context-preserving overlap.
//!
//! Splits long texts into overlapping chunks honoring sentence and paragraph
//! boundaries. Overlap scales with sentence density so dense prose carries
//! more context into the next chunk.
//!
//! Every chunk is a contiguous span of the original text and the next chunk
//! starts exactly `overlap_prev_chars` characters before the previous one
//! ends, so concatenating `content[overlap_prev_chars..]` over all chunks in
//! order reconstructs the input byte-for-byte.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use strata_core::ChunkerConfig;

/// A chunk of a larger context item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Derived id: `{parent_id}#{ordinal}`.
    pub chunk_id: String,
    /// The originating item id.
    pub parent_id: Uuid,
    /// The chunk text, a contiguous span of the original content.
    pub content: String,
    /// 0-based position of the chunk.
    pub ordinal: usize,
    /// Leading characters shared with the previous chunk (0 for ordinal 0).
    pub overlap_prev_chars: usize,
    /// Starting byte offset in the original text.
    pub start_offset: usize,
    /// Ending byte offset in the original text.
    pub end_offset: usize,
}

impl Chunk {
    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Find UTF-8 safe boundary at or before the given position.
fn find_char_boundary_before(text: &str, mut pos: usize) -> usize {
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Adaptive chunker implementing sentence-aware greedy packing.
#[derive(Debug, Clone)]
pub struct AdaptiveChunker {
    config: ChunkerConfig,
    sentence_regex: Regex,
    abbrev_regex: Regex,
    paragraph_regex: Regex,
}

impl AdaptiveChunker {
    /// Create a chunker with the given configuration.
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config,
            sentence_regex: Regex::new(r"[.!?]+(?:\s+|$)").unwrap(),
            abbrev_regex: Regex::new(
                r"(?i)\b(?:dr|mr|mrs|ms|prof|sr|jr|inc|ltd|co|etc|vs|e\.g|i\.e)\.$",
            )
            .unwrap(),
            paragraph_regex: Regex::new(r"\n\s*\n").unwrap(),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into ordered chunks. Empty input yields an empty
    /// sequence; this never fails.
    pub fn chunk(&self, parent_id: Uuid, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        // Short input: single chunk, even below `min`.
        if text.chars().count() <= self.config.target {
            return vec![Chunk {
                chunk_id: format!("{parent_id}#0"),
                parent_id,
                content: text.to_string(),
                ordinal: 0,
                overlap_prev_chars: 0,
                start_offset: 0,
                end_offset: text.len(),
            }];
        }

        let boundaries = self.find_boundaries(text);
        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut overlap_chars = 0usize;
        let mut ordinal = 0usize;

        while start < text.len() {
            let mut end = self.pack_until_target(text, start, &boundaries);

            // Fold a sub-`min` tail into this chunk when the hard cap allows,
            // otherwise pull the boundary back so the tail stays emittable.
            let tail = char_len(&text[end..]);
            if tail > 0 && tail < self.config.min {
                let extended = char_len(&text[start..]);
                if extended <= self.config.max {
                    end = text.len();
                } else {
                    let pulled = byte_pos_for_char_count_from_end(text, self.config.min);
                    if pulled > start {
                        end = pulled;
                    }
                }
            }

            chunks.push(Chunk {
                chunk_id: format!("{parent_id}#{ordinal}"),
                parent_id,
                content: text[start..end].to_string(),
                ordinal,
                overlap_prev_chars: overlap_chars,
                start_offset: start,
                end_offset: end,
            });

            if end >= text.len() {
                break;
            }

            // Overlap for the next chunk scales with sentence density.
            let sentences = boundaries
                .iter()
                .filter(|&&b| b > start && b <= end)
                .count()
                .max(1);
            let requested = if self.config.adaptive {
                let tiers = match sentences {
                    0..=2 => self.config.base_overlap,
                    3..=5 => self.config.base_overlap * 2,
                    _ => self.config.base_overlap * 3,
                };
                tiers.min(self.config.overlap_cap())
            } else {
                self.config.base_overlap.min(self.config.overlap_cap())
            };

            let (next_start, actual_overlap) =
                self.seed_next_start(text, start, end, requested, &boundaries);
            start = next_start;
            overlap_chars = actual_overlap;
            ordinal += 1;
        }

        debug!(
            chunk_count = chunks.len(),
            input_chars = char_len(text),
            "Adaptive chunking complete"
        );

        chunks
    }

    /// Sentence and paragraph end positions (byte offsets), merged and
    /// sorted. Paragraph breaks count as sentence ends.
    fn find_boundaries(&self, text: &str) -> Vec<usize> {
        let mut boundaries = Vec::new();

        for mat in self.sentence_regex.find_iter(text) {
            let candidate = &text[..mat.start() + leading_punct_len(mat.as_str())];
            // Abbreviations and decimals do not end sentences.
            if self.abbrev_regex.is_match(candidate.trim_end()) {
                continue;
            }
            if mat.start() > 0
                && text[..mat.start()]
                    .chars()
                    .last()
                    .is_some_and(|c| c.is_ascii_digit())
                && mat.as_str().starts_with('.')
                && !mat.as_str().trim_end_matches(|c: char| c.is_whitespace()).ends_with(['!', '?'])
            {
                continue;
            }
            boundaries.push(mat.end());
        }

        for mat in self.paragraph_regex.find_iter(text) {
            boundaries.push(mat.end());
        }

        boundaries.sort_unstable();
        boundaries.dedup();
        boundaries
    }

    /// Greedy-pack sentences from `start` until adding the next would exceed
    /// `target` characters. A single sentence longer than `max` is split at
    /// the nearest whitespace at or below `max`.
    fn pack_until_target(&self, text: &str, start: usize, boundaries: &[usize]) -> usize {
        let mut end = start;

        for &boundary in boundaries.iter().filter(|&&b| b > start) {
            let packed = char_len(&text[start..boundary]);
            if end == start {
                // First sentence always enters the chunk; oversized ones
                // are split below.
                end = boundary;
                if packed > self.config.target {
                    break;
                }
            } else if packed > self.config.target {
                break;
            } else {
                end = boundary;
            }
        }

        if end == start {
            // No boundary after start: the remainder is one unterminated run.
            end = text.len();
        }

        // Hard cap: split an oversized sentence on whitespace.
        if char_len(&text[start..end]) > self.config.max {
            end = self.split_at_whitespace(text, start);
        }

        end
    }

    /// Nearest whitespace boundary at or below `start + max` characters;
    /// falls back to a hard character cut when the run has no whitespace.
    fn split_at_whitespace(&self, text: &str, start: usize) -> usize {
        let hard_cap = byte_pos_after_chars(text, start, self.config.max);
        let window = &text[start..hard_cap];

        match window.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
            // Split after the whitespace char so the next chunk starts clean.
            Some((idx, c)) if idx > 0 => start + idx + c.len_utf8(),
            _ => find_char_boundary_before(text, hard_cap),
        }
    }

    /// Compute where the next chunk starts: `overlap` characters back from
    /// `end`, snapped to the sentence boundary nearest to the window start
    /// when one falls inside the window. Returns (next_start, overlap_chars).
    fn seed_next_start(
        &self,
        text: &str,
        chunk_start: usize,
        end: usize,
        overlap: usize,
        boundaries: &[usize],
    ) -> (usize, usize) {
        if overlap == 0 {
            return (end, 0);
        }

        let window_start = byte_pos_back_chars(text, end, overlap).max(chunk_start);
        let aligned = boundaries
            .iter()
            .copied()
            .filter(|&b| b >= window_start && b < end && b > chunk_start)
            .min_by_key(|&b| b - window_start);

        let next_start = aligned.unwrap_or(window_start);
        // Progress guard for degenerate configs.
        let next_start = if next_start <= chunk_start {
            end
        } else {
            next_start
        };
        let actual = char_len(&text[next_start..end]);
        (next_start, actual)
    }
}

impl Default for AdaptiveChunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

/// Length of the punctuation run at the start of a boundary match.
fn leading_punct_len(matched: &str) -> usize {
    matched
        .char_indices()
        .take_while(|(_, c)| matches!(c, '.' | '!' | '?'))
        .count()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte position `n` characters after `start`, clamped to the text end.
fn byte_pos_after_chars(text: &str, start: usize, n: usize) -> usize {
    text[start..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| start + i)
        .unwrap_or(text.len())
}

/// Byte position `n` characters before `end`, clamped to 0.
fn byte_pos_back_chars(text: &str, end: usize, n: usize) -> usize {
    let mut pos = end;
    for _ in 0..n {
        match text[..pos].char_indices().next_back() {
            Some((i, _)) => pos = i,
            None => return 0,
        }
    }
    pos
}

/// Byte position such that the suffix from there holds exactly `n` chars.
fn byte_pos_for_char_count_from_end(text: &str, n: usize) -> usize {
    byte_pos_back_chars(text, text.len(), n)
}
