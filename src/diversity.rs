//! Diversity Selector (DS): greedy Maximal Marginal Relevance over the
//! fused hit list.

use std::collections::HashSet;

use crate::retrieval_types::FusedHit;

/// MMR relevance/diversity trade-off. Not configurable — the spec fixes
/// it at 0.7.
pub const LAMBDA: f64 = 0.7;
/// Minimum token length considered for the Jaccard similarity kernel.
pub const MIN_TOKEN_LEN: usize = 3;

/// Tokenize a snippet for the similarity kernel: lowercase, strip
/// non-alphanumeric characters, drop tokens shorter than
/// [`MIN_TOKEN_LEN`].
fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| w.len() >= MIN_TOKEN_LEN)
        .collect()
}

/// Jaccard similarity over token sets.
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Greedily select up to `limit` hits from `candidates` (assumed already
/// sorted by [`crate::fusion::sort_by_rrf_tiebreak`]) by Maximal Marginal
/// Relevance (§4.7).
///
/// `candidates` should already be truncated to the top `fanout_k` fused
/// hits by the caller.
pub fn select(candidates: Vec<FusedHit>, limit: usize) -> Vec<FusedHit> {
    if candidates.is_empty() || limit == 0 {
        return Vec::new();
    }

    let tokens: Vec<HashSet<String>> = candidates.iter().map(|c| tokenize(&c.snippet)).collect();
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut selected: Vec<usize> = Vec::new();

    // First pick is simply the highest fused-score candidate; `candidates`
    // is already ordered that way by RF's tie-break, so index 0 wins.
    selected.push(remaining.remove(0));

    while selected.len() < limit && !remaining.is_empty() {
        let mut best_idx_pos = 0usize;
        let mut best_mmr = f64::NEG_INFINITY;
        let mut best_fused = f64::NEG_INFINITY;

        for (pos, &idx) in remaining.iter().enumerate() {
            let max_sim = selected
                .iter()
                .map(|&sidx| jaccard(&tokens[idx], &tokens[sidx]))
                .fold(0.0_f64, f64::max);
            let mmr = LAMBDA * candidates[idx].fused_score - (1.0 - LAMBDA) * max_sim;

            if mmr > best_mmr
                || (mmr == best_mmr && candidates[idx].fused_score > best_fused)
            {
                best_mmr = mmr;
                best_fused = candidates[idx].fused_score;
                best_idx_pos = pos;
            }
        }

        selected.push(remaining.remove(best_idx_pos));
    }

    selected.into_iter().map(|idx| candidates[idx].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval_types::{ChunkRef, Confidence};
    use std::collections::BTreeSet;

    fn hit(id: &str, score: f64, text: &str) -> FusedHit {
        FusedHit {
            chunk: ChunkRef {
                chunk_id: id.to_string(),
                document_id: format!("doc-{id}"),
                source_id: "filesystem".to_string(),
                path: format!("/docs/{id}.md"),
                chunk_index: 0,
            },
            snippet: text.to_string(),
            fused_score: score,
            contributing_strategies: BTreeSet::new(),
            best_rank: Vec::new(),
            confidence: Confidence::None,
        }
    }

    #[test]
    fn selects_at_most_limit() {
        let candidates = vec![
            hit("a", 0.9, "alpha beta gamma"),
            hit("b", 0.8, "delta epsilon zeta"),
            hit("c", 0.7, "eta theta iota"),
        ];
        let result = select(candidates, 2);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn demotes_near_duplicate_in_favor_of_distinct_hit() {
        let dup_text = "oak ridge national laboratory founded year";
        let candidates = vec![
            hit("d1", 0.9, dup_text),
            hit("d2", 0.89, dup_text),
            hit("d3", 0.88, dup_text),
            hit("distinct", 0.5, "completely different unrelated content here"),
        ];
        let result = select(candidates, 3);
        let ids: Vec<&str> = result.iter().map(|h| h.chunk.chunk_id.as_str()).collect();
        assert!(ids.contains(&"distinct"));
        let dup_count = ids.iter().filter(|id| id.starts_with('d') && **id != "distinct").count();
        assert!(dup_count <= 2);
    }

    #[test]
    fn empty_candidates_yield_empty_selection() {
        assert!(select(Vec::new(), 5).is_empty());
    }

    #[test]
    fn first_pick_is_highest_fused_score() {
        let candidates = vec![hit("a", 0.9, "one two three"), hit("b", 0.95, "four five six")];
        // candidates passed in pre-sorted order per fusion's tie-break;
        // caller is responsible for ordering before calling select.
        let sorted = vec![candidates[1].clone(), candidates[0].clone()];
        let result = select(sorted, 1);
        assert_eq!(result[0].chunk.chunk_id, "b");
    }
}
