//! Weighted fusion of independently scored candidate lists.
//!
//! Each retrieval path (keyword, semantic, graph, plus the in-memory tiers)
//! produces a ranked list in its own score scale. Fusion min-max normalizes
//! every list to [0, 1], redistributes the configured weights over the lists
//! that are actually present so active weights sum to 1, merges by id, and
//! produces a deterministic ordering.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use strata_core::models::ComponentScores;
use strata_core::scoring::min_max_normalize;

/// Which retrieval path produced a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionSource {
    Keyword,
    Semantic,
    Graph,
    /// Immediate-tier scan; recorded under the recency component.
    Immediate,
    /// Session-tier scan; recorded under the recency component.
    Session,
}

/// One candidate list with its fusion weight.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionList {
    pub source: FusionSource,
    pub weight: f32,
    /// (id, raw score), best first. Ordering is not relied upon.
    pub hits: Vec<(Uuid, f32)>,
}

impl FusionList {
    pub fn new(source: FusionSource, weight: f32, hits: Vec<(Uuid, f32)>) -> Self {
        Self {
            source,
            weight,
            hits,
        }
    }
}

/// A fused candidate with its per-path diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedHit {
    pub id: Uuid,
    pub score: f32,
    pub components: ComponentScores,
}

/// Fuse candidate lists into a single ranked list.
///
/// Empty lists carry no signal and are treated as absent: their weight is
/// redistributed proportionally across the remaining lists. If all inputs
/// are empty the output is empty; that is not an error.
///
/// `provisional_cap` bounds the output length (callers pass twice their
/// result cap to leave headroom for token-budget truncation downstream).
pub fn fuse(lists: Vec<FusionList>, min_score: Option<f32>, provisional_cap: usize) -> Vec<FusedHit> {
    let active: Vec<FusionList> = lists.into_iter().filter(|l| !l.hits.is_empty()).collect();
    if active.is_empty() || provisional_cap == 0 {
        return Vec::new();
    }

    let total_weight: f32 = active.iter().map(|l| l.weight).sum();
    if total_weight <= 0.0 {
        return Vec::new();
    }

    let mut fused: HashMap<Uuid, (f32, ComponentScores)> = HashMap::new();

    for list in &active {
        let weight = list.weight / total_weight;

        let mut scores: Vec<f32> = list.hits.iter().map(|(_, s)| *s).collect();
        min_max_normalize(&mut scores);

        // Duplicate ids inside one list keep their best normalized score.
        let mut best: HashMap<Uuid, f32> = HashMap::new();
        for ((id, _), normalized) in list.hits.iter().zip(scores) {
            let slot = best.entry(*id).or_insert(f32::NEG_INFINITY);
            if normalized > *slot {
                *slot = normalized;
            }
        }

        for (id, normalized) in best {
            let entry = fused.entry(id).or_insert((0.0, ComponentScores::default()));
            entry.0 += weight * normalized;
            record_component(&mut entry.1, list.source, normalized);
        }
    }

    let mut hits: Vec<FusedHit> = fused
        .into_iter()
        .map(|(id, (score, components))| FusedHit {
            id,
            score,
            components,
        })
        .collect();

    if let Some(min_score) = min_score {
        hits.retain(|h| h.score >= min_score);
    }

    // Deterministic ordering: fused score desc, then number of contributing
    // components desc, then id asc.
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.components.present().cmp(&a.components.present()))
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(provisional_cap);

    debug!(
        list_count = active.len(),
        result_count = hits.len(),
        "Fusion complete"
    );

    hits
}

fn record_component(components: &mut ComponentScores, source: FusionSource, score: f32) {
    let slot = match source {
        FusionSource::Keyword => &mut components.keyword,
        FusionSource::Semantic => &mut components.semantic,
        FusionSource::Graph => &mut components.graph,
        FusionSource::Immediate | FusionSource::Session => &mut components.recency,
    };
    match slot {
        Some(existing) if *existing >= score => {}
        _ => *slot = Some(score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::defaults::{
        FUSION_GRAPH_WEIGHT, FUSION_KEYWORD_WEIGHT, FUSION_SEMANTIC_WEIGHT,
    };

    fn uuid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn keyword(hits: Vec<(Uuid, f32)>) -> FusionList {
        FusionList::new(FusionSource::Keyword, FUSION_KEYWORD_WEIGHT, hits)
    }

    fn semantic(hits: Vec<(Uuid, f32)>) -> FusionList {
        FusionList::new(FusionSource::Semantic, FUSION_SEMANTIC_WEIGHT, hits)
    }

    fn graph(hits: Vec<(Uuid, f32)>) -> FusionList {
        FusionList::new(FusionSource::Graph, FUSION_GRAPH_WEIGHT, hits)
    }

    #[test]
    fn test_scenario_missing_graph_list() {
        // Keyword A=0.9/B=0.5, semantic B=0.8/C=0.7, graph absent.
        // Redistributed weights: w_s = 0.625, w_k = 0.375.
        let (a, b, c) = (uuid(1), uuid(2), uuid(3));
        let hits = fuse(
            vec![
                keyword(vec![(a, 0.9), (b, 0.5)]),
                semantic(vec![(b, 0.8), (c, 0.7)]),
            ],
            None,
            20,
        );

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, b);
        assert_eq!(hits[1].id, a);
        assert_eq!(hits[2].id, c);

        // Exact scores: normalization maps A->1/B->0 (keyword) and
        // B->1/C->0 (semantic); B = 0.625*1, A = 0.375*1, C = 0.
        assert!((hits[0].score - 0.625).abs() < 1e-6);
        assert!((hits[1].score - 0.375).abs() < 1e-6);
        assert!(hits[2].score.abs() < 1e-6);
    }

    #[test]
    fn test_all_lists_present_uses_raw_weights() {
        let (a, b, c) = (uuid(1), uuid(2), uuid(3));
        let hits = fuse(
            vec![
                keyword(vec![(a, 1.0)]),
                semantic(vec![(b, 1.0)]),
                graph(vec![(c, 1.0)]),
            ],
            None,
            20,
        );

        // Single-entry lists normalize to 1.0; weights already sum to 1.
        let score_of = |id| hits.iter().find(|h| h.id == id).unwrap().score;
        assert!((score_of(b) - 0.5).abs() < 1e-6);
        assert!((score_of(a) - 0.3).abs() < 1e-6);
        assert!((score_of(c) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_empty_inputs_produce_empty_output() {
        assert!(fuse(vec![], None, 10).is_empty());
        assert!(fuse(vec![keyword(vec![]), semantic(vec![])], None, 10).is_empty());
    }

    #[test]
    fn test_empty_list_treated_as_absent() {
        let a = uuid(1);
        let with_empty = fuse(
            vec![keyword(vec![(a, 0.4)]), semantic(vec![]), graph(vec![])],
            None,
            10,
        );
        let alone = fuse(vec![keyword(vec![(a, 0.4)])], None, 10);
        assert_eq!(with_empty, alone);
        assert!((with_empty[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dedup_keeps_max_and_union_of_components() {
        let a = uuid(1);
        let hits = fuse(
            vec![
                keyword(vec![(a, 0.9), (a, 0.1), (uuid(2), 0.5)]),
                semantic(vec![(a, 0.3), (uuid(3), 0.6)]),
            ],
            None,
            10,
        );

        let top = hits.iter().find(|h| h.id == a).unwrap();
        // Keyword list: a normalizes to 1.0 (0.9 is max), duplicate 0.1 -> 0.0
        // is dropped in favor of the max.
        assert_eq!(top.components.keyword, Some(1.0));
        assert!(top.components.semantic.is_some());
        assert_eq!(top.components.present(), 2);
    }

    #[test]
    fn test_min_score_filter() {
        let (a, b) = (uuid(1), uuid(2));
        let hits = fuse(
            vec![keyword(vec![(a, 0.9), (b, 0.1)])],
            Some(0.5),
            10,
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, a);
    }

    #[test]
    fn test_single_entry_normalizes_to_one() {
        let hits = fuse(vec![keyword(vec![(uuid(1), 0.0001)])], None, 10);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_equal_scores_normalize_to_one() {
        let hits = fuse(
            vec![keyword(vec![(uuid(1), 0.42), (uuid(2), 0.42)])],
            None,
            10,
        );
        assert!(hits.iter().all(|h| (h.score - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_fusion_idempotent_on_single_list() {
        let raw = vec![(uuid(1), 3.0), (uuid(2), 2.0), (uuid(3), 1.0)];
        let once = fuse(vec![keyword(raw)], None, 10);

        let again_input: Vec<(Uuid, f32)> = once.iter().map(|h| (h.id, h.score)).collect();
        let twice = fuse(vec![keyword(again_input)], None, 10);

        for (a, b) in once.iter().zip(&twice) {
            assert_eq!(a.id, b.id);
            assert!((a.score - b.score).abs() < 1e-6);
        }
    }

    #[test]
    fn test_tie_break_component_count_then_id() {
        let (a, b) = (uuid(5), uuid(9));
        // a: 0.5 from one component; b: 0.25 + 0.25 from two. Equal fused
        // scores, so the component count decides.
        let hits = fuse(
            vec![
                FusionList::new(FusionSource::Keyword, 0.5, vec![(a, 0.8)]),
                FusionList::new(FusionSource::Semantic, 0.25, vec![(b, 0.6)]),
                FusionList::new(FusionSource::Graph, 0.25, vec![(b, 0.3)]),
            ],
            None,
            10,
        );

        assert!((hits[0].score - hits[1].score).abs() < 1e-6);
        assert_eq!(hits[0].id, b);
        assert_eq!(hits[1].id, a);
    }

    #[test]
    fn test_deterministic_id_tie_break() {
        // Two ids with identical single-source scores order by id.
        let (lo, hi) = (uuid(1), uuid(2));
        let hits = fuse(vec![keyword(vec![(hi, 0.5), (lo, 0.5)])], None, 10);
        assert_eq!(hits[0].id, lo);
        assert_eq!(hits[1].id, hi);
    }

    #[test]
    fn test_provisional_cap_truncates() {
        let hits: Vec<(Uuid, f32)> = (0..50).map(|i| (uuid(i), i as f32)).collect();
        let fused = fuse(vec![keyword(hits)], None, 20);
        assert_eq!(fused.len(), 20);
    }

    #[test]
    fn test_repeated_runs_identical() {
        let lists = || {
            vec![
                keyword(vec![(uuid(1), 0.9), (uuid(2), 0.5), (uuid(3), 0.5)]),
                semantic(vec![(uuid(2), 0.8), (uuid(4), 0.7)]),
                graph(vec![(uuid(3), 0.2)]),
            ]
        };
        let first = fuse(lists(), None, 10);
        for _ in 0..10 {
            assert_eq!(fuse(lists(), None, 10), first);
        }
    }

    #[test]
    fn test_immediate_session_record_recency_component() {
        let a = uuid(1);
        let hits = fuse(
            vec![
                FusionList::new(FusionSource::Immediate, 0.15, vec![(a, 0.9)]),
                FusionList::new(FusionSource::Session, 0.15, vec![(a, 0.4)]),
            ],
            None,
            10,
        );
        assert_eq!(hits[0].components.recency, Some(1.0));
        assert_eq!(hits[0].components.present(), 1);
    }
}
