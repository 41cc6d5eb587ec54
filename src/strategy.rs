//! Strategy Runners (SR): the four independent rank producers (§4.5).
//!
//! `hybrid-fused` depends on `exact-lexical` and `semantic`. Per §9 the
//! dependency graph is a small static DAG, implemented as explicit
//! awaits on shared results rather than a general scheduler — callers
//! (see [`crate::hybrid_search`]) compute exact-lexical and semantic
//! once per request and pass the already-computed [`StrategyResult`]s
//! into [`run_hybrid_fused`], which both satisfies the "reuse shared
//! computation" requirement and the memoization-by-(strategy,
//! normalized-expression) key (there's exactly one normalized
//! expression per strategy within a single request).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::embedder::Embedder;
use crate::fusion;
use crate::lexical_index::LexicalIndex;
use crate::retrieval_types::{
    EngineError, EngineErrorKind, RetrievedHit, Strategy, StrategyResult, StrategyStatus,
};
use crate::vector_store::VectorStore;

/// Cooperative cancellation handle shared by every SR task in a request
/// (§5). Checked at each suspension point; never forcibly aborts a task.
#[derive(Clone)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

fn cancelled_result(strategy: Strategy) -> StrategyResult {
    StrategyResult::empty(strategy, StrategyStatus::Cancelled)
}

fn failed_result(strategy: Strategy, elapsed_ms: u64, err: &EngineError) -> StrategyResult {
    match err.kind() {
        Some(kind) => StrategyResult {
            strategy,
            hits: Vec::new(),
            status: StrategyStatus::Failed(kind),
            elapsed_ms,
        },
        // BadRequest / FatalIndexError never originate from a single SR
        // call in practice, but fail closed rather than panic if they do.
        None => StrategyResult {
            strategy,
            hits: Vec::new(),
            status: StrategyStatus::Failed(EngineErrorKind::BackendUnavailable),
            elapsed_ms,
        },
    }
}

/// Quote unquoted multi-token queries verbatim; leave an already-quoted
/// or single-token query as-is (§4.5 exact-lexical).
pub fn build_exact_lexical_expression(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        return trimmed.to_string();
    }
    if trimmed.split_whitespace().count() > 1 {
        format!("\"{}\"", trimmed.replace('"', ""))
    } else {
        trimmed.to_string()
    }
}

/// Strip punctuation and OR together every token (§4.5 relaxed-lexical).
pub fn build_relaxed_lexical_expression(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| {
            tok.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|tok| !tok.is_empty())
        .collect::<Vec<_>>()
        .join(" OR ")
}

pub async fn run_exact_lexical(
    li: &dyn LexicalIndex,
    query: &str,
    fanout_k: usize,
    cancel: &CancellationHandle,
) -> StrategyResult {
    run_lexical(Strategy::ExactLexical, li, &build_exact_lexical_expression(query), fanout_k, cancel).await
}

pub async fn run_relaxed_lexical(
    li: &dyn LexicalIndex,
    query: &str,
    fanout_k: usize,
    cancel: &CancellationHandle,
) -> StrategyResult {
    run_lexical(
        Strategy::RelaxedLexical,
        li,
        &build_relaxed_lexical_expression(query),
        fanout_k,
        cancel,
    )
    .await
}

async fn run_lexical(
    strategy: Strategy,
    li: &dyn LexicalIndex,
    expression: &str,
    fanout_k: usize,
    cancel: &CancellationHandle,
) -> StrategyResult {
    if cancel.is_cancelled() {
        return cancelled_result(strategy);
    }
    let start = Instant::now();
    match li.search(expression, fanout_k).await {
        Ok(hits) => dense_ranked(strategy, hits, start),
        Err(e) => failed_result(strategy, start.elapsed().as_millis() as u64, &e),
    }
}

pub async fn run_semantic(
    embedder: &dyn Embedder,
    vs: &dyn VectorStore,
    query: &str,
    fanout_k: usize,
    cancel: &CancellationHandle,
) -> StrategyResult {
    if cancel.is_cancelled() {
        return cancelled_result(Strategy::Semantic);
    }
    let start = Instant::now();
    let vector = match embedder.embed_query(query).await {
        Ok(v) => v,
        Err(e) => return failed_result(Strategy::Semantic, start.elapsed().as_millis() as u64, &e),
    };
    if cancel.is_cancelled() {
        return cancelled_result(Strategy::Semantic);
    }
    match vs.search(&vector, fanout_k).await {
        Ok(hits) => dense_ranked(Strategy::Semantic, hits, start),
        Err(e) => failed_result(Strategy::Semantic, start.elapsed().as_millis() as u64, &e),
    }
}

/// Fuse the already-computed exact-lexical and semantic results with
/// fixed weights (0.5, 0.5) and re-expose the top `fanout_k` as this
/// strategy's own ranked output (§4.5 hybrid-fused).
pub fn run_hybrid_fused(
    exact_lexical: &StrategyResult,
    semantic: &StrategyResult,
    fanout_k: usize,
) -> StrategyResult {
    // hybrid-fused depends on semantic (§7): any semantic outage is a
    // hybrid-fused outage too, even if exact-lexical alone still has hits.
    if !semantic.succeeded() {
        let status = match (&exact_lexical.status, &semantic.status) {
            (_, StrategyStatus::Cancelled) => StrategyStatus::Cancelled,
            (_, StrategyStatus::Failed(k)) => StrategyStatus::Failed(*k),
            _ => StrategyStatus::Failed(EngineErrorKind::BackendUnavailable),
        };
        return StrategyResult::empty(Strategy::HybridFused, status);
    }
    if !exact_lexical.succeeded() {
        let status = match &exact_lexical.status {
            StrategyStatus::Cancelled => StrategyStatus::Cancelled,
            StrategyStatus::Failed(k) => StrategyStatus::Failed(*k),
            StrategyStatus::Success => unreachable!("succeeded() is false for Success"),
        };
        return StrategyResult::empty(Strategy::HybridFused, status);
    }

    let weights = [
        (Strategy::ExactLexical, 0.5),
        (Strategy::Semantic, 0.5),
    ];
    let inner_results = [exact_lexical.clone(), semantic.clone()];
    let mut fused = fusion::fuse(&inner_results, &weights);
    fusion::sort_by_rrf_tiebreak(&mut fused);
    fused.truncate(fanout_k);

    let hits = fused
        .into_iter()
        .enumerate()
        .map(|(i, f)| RetrievedHit {
            chunk: f.chunk,
            snippet: f.snippet,
            raw_score: f.fused_score,
            rank: i + 1,
        })
        .collect();

    StrategyResult {
        strategy: Strategy::HybridFused,
        hits,
        status: StrategyStatus::Success,
        elapsed_ms: exact_lexical.elapsed_ms.max(semantic.elapsed_ms),
    }
}

fn dense_ranked(strategy: Strategy, mut hits: Vec<RetrievedHit>, start: Instant) -> StrategyResult {
    for (i, hit) in hits.iter_mut().enumerate() {
        hit.rank = i + 1;
    }
    StrategyResult {
        strategy,
        hits,
        status: StrategyStatus::Success,
        elapsed_ms: start.elapsed().as_millis() as u64,
    }
}
