//! Confidence Calibrator (CC): per-hit and per-response confidence from
//! cross-strategy agreement (§4.8).

use crate::retrieval_types::{Confidence, FusedHit, QueryType, Strategy};

/// Per-hit confidence from the set of contributing strategies and the
/// detected query-type. Rules are checked in the order listed in the
/// spec table; the first matching rule wins.
pub fn calibrate_hit(hit: &FusedHit, query_type: QueryType) -> Confidence {
    let strategies = &hit.contributing_strategies;
    let n = strategies.len();

    if n >= 3 {
        return Confidence::VeryHigh;
    }
    if n == 2 && strategies.contains(&Strategy::Semantic) {
        return Confidence::High;
    }
    if n == 2 {
        return Confidence::MediumHigh;
    }
    if n == 1 {
        let solo = *strategies.iter().next().unwrap();
        if solo == Strategy::Semantic
            && matches!(query_type, QueryType::NaturalLanguage | QueryType::ProperNoun)
        {
            return Confidence::High;
        }
        if solo == Strategy::HybridFused {
            return Confidence::MediumHigh;
        }
        if solo == Strategy::ExactLexical {
            return Confidence::Medium;
        }
        if solo == Strategy::RelaxedLexical {
            return Confidence::Low;
        }
        // Semantic solo outside the NL/proper-noun query types: no rule
        // matches explicitly above medium, so fall through to Medium —
        // weaker evidence than a qualifying semantic hit but stronger
        // than relaxed-lexical-only.
        return Confidence::Medium;
    }
    Confidence::None
}

/// Annotate every hit in place and compute the response-level confidence
/// (highest per-hit confidence, or `none` if `hits` is empty).
pub fn calibrate(hits: &mut [FusedHit], query_type: QueryType) -> Confidence {
    let mut response_confidence = Confidence::None;
    for hit in hits.iter_mut() {
        hit.confidence = calibrate_hit(hit, query_type);
        if hit.confidence > response_confidence {
            response_confidence = hit.confidence;
        }
    }
    response_confidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval_types::ChunkRef;
    use std::collections::BTreeSet;

    fn hit_with(strategies: &[Strategy]) -> FusedHit {
        FusedHit {
            chunk: ChunkRef {
                chunk_id: "c".to_string(),
                document_id: "d".to_string(),
                source_id: "s".to_string(),
                path: "/p".to_string(),
                chunk_index: 0,
            },
            snippet: String::new(),
            fused_score: 1.0,
            contributing_strategies: strategies.iter().copied().collect::<BTreeSet<_>>(),
            best_rank: Vec::new(),
            confidence: Confidence::None,
        }
    }

    #[test]
    fn three_strategies_is_very_high() {
        let hit = hit_with(&[Strategy::ExactLexical, Strategy::Semantic, Strategy::RelaxedLexical]);
        assert_eq!(calibrate_hit(&hit, QueryType::Unknown), Confidence::VeryHigh);
    }

    #[test]
    fn two_with_semantic_is_high() {
        let hit = hit_with(&[Strategy::ExactLexical, Strategy::Semantic]);
        assert_eq!(calibrate_hit(&hit, QueryType::Unknown), Confidence::High);
    }

    #[test]
    fn two_without_semantic_is_medium_high() {
        let hit = hit_with(&[Strategy::ExactLexical, Strategy::RelaxedLexical]);
        assert_eq!(calibrate_hit(&hit, QueryType::Unknown), Confidence::MediumHigh);
    }

    #[test]
    fn solo_semantic_on_natural_language_is_high() {
        let hit = hit_with(&[Strategy::Semantic]);
        assert_eq!(
            calibrate_hit(&hit, QueryType::NaturalLanguage),
            Confidence::High
        );
    }

    #[test]
    fn solo_hybrid_fused_is_medium_high() {
        let hit = hit_with(&[Strategy::HybridFused]);
        assert_eq!(calibrate_hit(&hit, QueryType::Unknown), Confidence::MediumHigh);
    }

    #[test]
    fn solo_exact_lexical_is_medium() {
        let hit = hit_with(&[Strategy::ExactLexical]);
        assert_eq!(calibrate_hit(&hit, QueryType::Unknown), Confidence::Medium);
    }

    #[test]
    fn solo_relaxed_lexical_is_low() {
        let hit = hit_with(&[Strategy::RelaxedLexical]);
        assert_eq!(calibrate_hit(&hit, QueryType::Unknown), Confidence::Low);
    }

    #[test]
    fn response_confidence_is_none_for_empty_hits() {
        let mut hits: Vec<FusedHit> = Vec::new();
        assert_eq!(calibrate(&mut hits, QueryType::Unknown), Confidence::None);
    }

    #[test]
    fn response_confidence_is_max_of_hits() {
        let mut hits = vec![
            hit_with(&[Strategy::RelaxedLexical]),
            hit_with(&[Strategy::ExactLexical, Strategy::Semantic]),
        ];
        assert_eq!(calibrate(&mut hits, QueryType::Unknown), Confidence::High);
    }
}
