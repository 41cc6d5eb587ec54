//! Rank Fusion (RF): Reciprocal Rank Fusion across Strategy Runner
//! outputs.

use std::collections::BTreeMap;

use crate::retrieval_types::{Confidence, FusedHit, StrategyResult};

/// RRF smoothing constant. Not configurable — changing it would also
/// require recomputing [`SIMILARITY_FLOOR`]'s lower bound (§9).
pub const K_RRF: f64 = 60.0;

/// Minimum fused-score retained in fusion output (§4.9 step 7, §9).
/// Fixed at 0.001: the source design treats this as a documented
/// invariant, not a tunable knob. It must stay at or below
/// `min_weight / (K_RRF + fanout_k)` (≈0.0041 for the smallest
/// configured weight and the default fanout) or valid single-strategy
/// hits get dropped.
pub const SIMILARITY_FLOOR: f64 = 0.001;

/// Fuse every successful [`StrategyResult`] into ranked [`FusedHit`]s.
///
/// Only strategies with `status == Success` contribute. Hits are merged
/// by chunk-id: a ChunkRef appearing in multiple strategies accumulates
/// `w_s / (K_RRF + rank_s(c))` across all of them (§4.6). Confidence is
/// left at [`Confidence::None`] — [`crate::confidence::calibrate`]
/// fills it in after diversity selection decides the final set.
pub fn fuse(results: &[StrategyResult], weights: &[(crate::retrieval_types::Strategy, f64)]) -> Vec<FusedHit> {
    let weight_of = |s: crate::retrieval_types::Strategy| -> f64 {
        weights
            .iter()
            .find(|(ws, _)| *ws == s)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    };

    let mut by_chunk: BTreeMap<String, FusedHit> = BTreeMap::new();

    for result in results {
        if !result.succeeded() {
            continue;
        }
        let w = weight_of(result.strategy);
        if w <= 0.0 {
            continue;
        }
        for hit in &result.hits {
            let contribution = w / (K_RRF + hit.rank as f64);
            let entry = by_chunk
                .entry(hit.chunk.chunk_id.clone())
                .or_insert_with(|| FusedHit {
                    chunk: hit.chunk.clone(),
                    snippet: hit.snippet.clone(),
                    fused_score: 0.0,
                    contributing_strategies: Default::default(),
                    best_rank: Vec::new(),
                    confidence: Confidence::None,
                });
            entry.fused_score += contribution;
            entry.contributing_strategies.insert(result.strategy);
            entry.best_rank.push((result.strategy, hit.rank));
        }
    }

    let mut fused: Vec<FusedHit> = by_chunk.into_values().collect();
    sort_by_rrf_tiebreak(&mut fused);
    fused
}

/// Tie-break order (§4.6): fused-score desc, then contributing-strategy
/// count desc, then best rank across any strategy asc, then chunk-id
/// lexicographic.
pub fn sort_by_rrf_tiebreak(hits: &mut [FusedHit]) {
    hits.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.contributing_strategies
                    .len()
                    .cmp(&a.contributing_strategies.len())
            })
            .then_with(|| best_rank_value(a).cmp(&best_rank_value(b)))
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
}

fn best_rank_value(hit: &FusedHit) -> usize {
    hit.best_rank
        .iter()
        .map(|(_, r)| *r)
        .min()
        .unwrap_or(usize::MAX)
}

/// Drop hits below [`SIMILARITY_FLOOR`] (§4.9 step 7).
pub fn apply_similarity_floor(hits: Vec<FusedHit>) -> Vec<FusedHit> {
    hits.into_iter()
        .filter(|h| h.fused_score >= SIMILARITY_FLOOR)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval_types::{ChunkRef, RetrievedHit, Strategy, StrategyStatus};

    fn chunk(id: &str) -> ChunkRef {
        ChunkRef {
            chunk_id: id.to_string(),
            document_id: format!("doc-{id}"),
            source_id: "filesystem".to_string(),
            path: format!("/docs/{id}.md"),
            chunk_index: 0,
        }
    }

    fn result(strategy: Strategy, ranked_ids: &[&str]) -> StrategyResult {
        StrategyResult {
            strategy,
            status: StrategyStatus::Success,
            elapsed_ms: 1,
            hits: ranked_ids
                .iter()
                .enumerate()
                .map(|(i, id)| RetrievedHit {
                    chunk: chunk(id),
                    snippet: format!("snippet {id}"),
                    raw_score: 1.0,
                    rank: i + 1,
                })
                .collect(),
        }
    }

    #[test]
    fn contributions_from_multiple_strategies_accumulate() {
        let results = vec![
            result(Strategy::ExactLexical, &["a", "b"]),
            result(Strategy::Semantic, &["a", "c"]),
        ];
        let weights = vec![(Strategy::ExactLexical, 0.5), (Strategy::Semantic, 0.5)];
        let fused = fuse(&results, &weights);

        let a = fused.iter().find(|h| h.chunk.chunk_id == "a").unwrap();
        assert_eq!(a.contributing_strategies.len(), 2);
        let expected = 0.5 / (K_RRF + 1.0) + 0.5 / (K_RRF + 1.0);
        assert!((a.fused_score - expected).abs() < 1e-9);
    }

    #[test]
    fn failed_strategies_do_not_contribute() {
        let mut failed = result(Strategy::Semantic, &["a"]);
        failed.status = StrategyStatus::Failed(crate::retrieval_types::EngineErrorKind::Timeout);
        let results = vec![result(Strategy::ExactLexical, &["a"]), failed];
        let weights = vec![(Strategy::ExactLexical, 0.5), (Strategy::Semantic, 0.5)];
        let fused = fuse(&results, &weights);
        assert_eq!(fused[0].contributing_strategies.len(), 1);
    }

    #[test]
    fn monotonicity_adding_strategy_never_decreases_score() {
        let before = fuse(
            &[result(Strategy::ExactLexical, &["a", "b"])],
            &[(Strategy::ExactLexical, 0.5)],
        );
        let after = fuse(
            &[
                result(Strategy::ExactLexical, &["a", "b"]),
                result(Strategy::Semantic, &["a"]),
            ],
            &[(Strategy::ExactLexical, 0.5), (Strategy::Semantic, 0.5)],
        );
        let before_a = before.iter().find(|h| h.chunk.chunk_id == "a").unwrap();
        let after_a = after.iter().find(|h| h.chunk.chunk_id == "a").unwrap();
        assert!(after_a.fused_score >= before_a.fused_score);
    }

    #[test]
    fn tie_break_prefers_more_contributing_strategies() {
        // Construct two hits with identical fused score but different
        // contributor counts by giving "solo" a single strong strategy
        // and "shared" two weaker ones landing at the same total.
        let results = vec![
            result(Strategy::ExactLexical, &["solo"]),
            result(Strategy::Semantic, &["shared"]),
            result(Strategy::HybridFused, &["shared"]),
        ];
        let w_solo = 1.0 / (K_RRF + 1.0);
        let target = w_solo;
        // weight chosen so each shared contribution is half of solo's.
        let w_each = target / 2.0 * (K_RRF + 1.0);
        let weights = vec![
            (Strategy::ExactLexical, w_solo * (K_RRF + 1.0)),
            (Strategy::Semantic, w_each),
            (Strategy::HybridFused, w_each),
        ];
        let fused = fuse(&results, &weights);
        let solo = fused.iter().find(|h| h.chunk.chunk_id == "solo").unwrap();
        let shared = fused.iter().find(|h| h.chunk.chunk_id == "shared").unwrap();
        assert!((solo.fused_score - shared.fused_score).abs() < 1e-9);
        // shared has 2 contributors, must sort before solo.
        let idx_shared = fused.iter().position(|h| h.chunk.chunk_id == "shared").unwrap();
        let idx_solo = fused.iter().position(|h| h.chunk.chunk_id == "solo").unwrap();
        assert!(idx_shared < idx_solo);
    }

    #[test]
    fn similarity_floor_drops_weak_hits() {
        let weak = FusedHit {
            chunk: chunk("weak"),
            snippet: String::new(),
            fused_score: SIMILARITY_FLOOR / 2.0,
            contributing_strategies: Default::default(),
            best_rank: Vec::new(),
            confidence: Confidence::None,
        };
        let strong = FusedHit {
            fused_score: SIMILARITY_FLOOR * 10.0,
            ..weak.clone()
        };
        let filtered = apply_similarity_floor(vec![weak, strong]);
        assert_eq!(filtered.len(), 1);
    }
}
