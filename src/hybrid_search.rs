//! Hybrid Searcher (HS): the public orchestrator (§4.9).
//!
//! Owns read-only references to LI, VS, EMB for the duration of a
//! request and composes QA → SR (parallel, deadline-bounded) → RF →
//! similarity floor → DS → CC into a bounded [`Response`]. Holds no
//! state across requests.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use crate::confidence;
use crate::config::Config;
use crate::db;
use crate::diversity;
use crate::embedder::{Embedder, RealEmbedder};
use crate::embedding;
use crate::fusion;
use crate::lexical_index::{LexicalIndex, SqliteLexicalIndex};
use crate::query_analyzer;
use crate::retrieval_types::{
    Confidence, EngineError, EngineErrorKind, FusedHit, Mode, Query, Response, Strategy,
    StrategyResult, StrategyStatus, DEFAULT_DEADLINE_MS, DEFAULT_FANOUT_K, MAX_FANOUT_K,
    MAX_LIMIT,
};
use crate::strategy::{self, CancellationHandle};
use crate::vector_store::{SqliteVectorStore, VectorStore};

/// Configuration for a [`HybridSearcher`] instance, independent of any
/// one request.
#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    pub fanout_k: usize,
    pub default_deadline_ms: u64,
    /// Optional re-scoring pass between RF and DS (§9 open question 2).
    /// `None`/off by default; never alters the contributing-strategy set
    /// CC reads.
    pub rerank_weight: Option<f64>,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            fanout_k: DEFAULT_FANOUT_K,
            default_deadline_ms: DEFAULT_DEADLINE_MS,
            rerank_weight: None,
        }
    }
}

pub struct HybridSearcher {
    li: Arc<dyn LexicalIndex>,
    vs: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    config: HybridSearchConfig,
}

impl HybridSearcher {
    pub fn new(
        li: Arc<dyn LexicalIndex>,
        vs: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: HybridSearchConfig,
    ) -> Self {
        Self {
            li,
            vs,
            embedder,
            config,
        }
    }

    /// Exposes the underlying LI/VS backends, e.g. for [`crate::deletion::delete_source`]
    /// which operates independently of a single search request.
    pub fn backends(&self) -> (Arc<dyn LexicalIndex>, Arc<dyn VectorStore>) {
        (self.li.clone(), self.vs.clone())
    }

    pub async fn search(&self, query: Query) -> Result<Response, EngineError> {
        let text = query.text.trim().to_string();
        if text.is_empty() || text.chars().count() > 1024 {
            return Err(EngineError::BadRequest(format!(
                "query text must be 1..1024 chars after trimming, got {}",
                text.chars().count()
            )));
        }
        let limit = query.limit.clamp(1, MAX_LIMIT);
        let fanout_k = self.config.fanout_k.min(MAX_FANOUT_K);
        let deadline_ms = query
            .deadline_ms
            .map(|d| d.min(self.config.default_deadline_ms))
            .unwrap_or(self.config.default_deadline_ms);

        let plan = query_analyzer::analyze(&Query {
            text: text.clone(),
            mode: query.mode,
            limit,
            deadline_ms: Some(deadline_ms),
        });

        let start = Instant::now();
        let deadline_at = start + Duration::from_millis(deadline_ms);
        let cancel = CancellationHandle::new();

        let needs_exact =
            plan.is_enabled(Strategy::ExactLexical) || plan.is_enabled(Strategy::HybridFused);
        let needs_semantic =
            plan.is_enabled(Strategy::Semantic) || plan.is_enabled(Strategy::HybridFused);
        let needs_relaxed = plan.is_enabled(Strategy::RelaxedLexical);

        let exact_task = needs_exact.then(|| {
            let li = self.li.clone();
            let q = text.clone();
            let c = cancel.clone();
            tokio::spawn(async move { strategy::run_exact_lexical(li.as_ref(), &q, fanout_k, &c).await })
        });
        let semantic_task = needs_semantic.then(|| {
            let vs = self.vs.clone();
            let embedder = self.embedder.clone();
            let q = text.clone();
            let c = cancel.clone();
            tokio::spawn(async move {
                strategy::run_semantic(embedder.as_ref(), vs.as_ref(), &q, fanout_k, &c).await
            })
        });
        let relaxed_task = needs_relaxed.then(|| {
            let li = self.li.clone();
            let q = text.clone();
            let c = cancel.clone();
            tokio::spawn(async move { strategy::run_relaxed_lexical(li.as_ref(), &q, fanout_k, &c).await })
        });

        let exact_result = await_bounded(exact_task, deadline_at, Strategy::ExactLexical, &cancel).await;
        let semantic_result =
            await_bounded(semantic_task, deadline_at, Strategy::Semantic, &cancel).await;
        let relaxed_result =
            await_bounded(relaxed_task, deadline_at, Strategy::RelaxedLexical, &cancel).await;

        let mut results: Vec<StrategyResult> = Vec::new();
        if plan.is_enabled(Strategy::ExactLexical) {
            if let Some(r) = &exact_result {
                results.push(r.clone());
            }
        }
        if plan.is_enabled(Strategy::Semantic) {
            if let Some(r) = &semantic_result {
                results.push(r.clone());
            }
        }
        if plan.is_enabled(Strategy::RelaxedLexical) {
            if let Some(r) = &relaxed_result {
                results.push(r.clone());
            }
        }
        if plan.is_enabled(Strategy::HybridFused) {
            let exact_ref = exact_result.clone().unwrap_or_else(unavailable_placeholder_exact);
            let semantic_ref =
                semantic_result.clone().unwrap_or_else(unavailable_placeholder_semantic);
            results.push(strategy::run_hybrid_fused(&exact_ref, &semantic_ref, fanout_k));
        }

        let strategies_failed: BTreeSet<Strategy> = results
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.strategy)
            .collect();
        let any_hits = results.iter().any(|r| !r.hits.is_empty());

        if !any_hits && !strategies_failed.is_empty() {
            return Ok(Response::empty(
                plan.query_type,
                strategies_failed,
                elapsed_ms(start),
            ));
        }

        let mut fused = fusion::fuse(&results, &plan.weights);
        fused = fusion::apply_similarity_floor(fused);
        if let Some(w) = self.config.rerank_weight {
            fused = apply_rerank(fused, &semantic_result, w);
        }
        fusion::sort_by_rrf_tiebreak(&mut fused);
        fused.truncate(fanout_k);

        let mut selected = diversity::select(fused, limit);
        let mut response_confidence = confidence::calibrate(&mut selected, plan.query_type);

        // §7: on total semantic outage, results come from lexical strategies
        // only and response confidence is capped at `medium` — regardless of
        // how many lexical strategies agree.
        let semantic_outage = strategies_failed.contains(&Strategy::Semantic)
            && selected
                .iter()
                .all(|h| !h.contributing_strategies.contains(&Strategy::Semantic));
        if semantic_outage {
            for hit in selected.iter_mut() {
                hit.confidence = hit.confidence.min(Confidence::Medium);
            }
            response_confidence = response_confidence.min(Confidence::Medium);
        }

        let strategies_matched: BTreeSet<Strategy> = results
            .iter()
            .filter(|r| r.succeeded() && !r.hits.is_empty())
            .map(|r| r.strategy)
            .collect();

        Ok(Response {
            results: selected,
            confidence: response_confidence,
            query_type: plan.query_type,
            strategies_matched,
            strategies_failed,
            elapsed_ms: elapsed_ms(start),
        })
    }
}

/// Build a [`HybridSearcher`] wired to the real SQLite-backed lexical
/// index, vector store, and configured embedding provider, opening a
/// fresh connection pool. Used by both the CLI and the HTTP server.
pub async fn build_from_config(config: &Config) -> anyhow::Result<(HybridSearcher, SqlitePool)> {
    let pool = db::connect(config).await?;

    let li: Arc<dyn LexicalIndex> = Arc::new(SqliteLexicalIndex::new(pool.clone()));
    let vs: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::new(pool.clone()));
    let provider = embedding::create_provider(&config.embedding)?;
    let embedder: Arc<dyn Embedder> = Arc::new(RealEmbedder::new(provider, config.embedding.clone()));

    let hs_config = HybridSearchConfig {
        fanout_k: config.retrieval.fanout_k,
        default_deadline_ms: config.retrieval.deadline_ms,
        rerank_weight: config.retrieval.rerank_weight,
    };

    Ok((HybridSearcher::new(li, vs, embedder, hs_config), pool))
}

/// CLI entry point for `ctx hybrid-search`.
///
/// Wires a [`HybridSearcher`] from `config`, runs a single query, and
/// prints a formatted result list in the style of `ctx search`.
pub async fn run_hybrid_search(
    config: &Config,
    query: &str,
    mode: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let mode = match mode {
        "auto" => Mode::Auto,
        "hybrid" => Mode::Hybrid,
        "semantic" => Mode::Semantic,
        "lexical" => Mode::Lexical,
        other => anyhow::bail!(
            "Unknown mode: '{}'. Use auto, hybrid, semantic, or lexical.",
            other
        ),
    };

    let (searcher, pool) = build_from_config(config).await?;
    let response = searcher
        .search(Query::new(query).with_mode(mode).with_limit(limit))
        .await?;
    pool.close().await;

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!(
        "query-type: {:?}  confidence: {}  elapsed: {}ms",
        response.query_type,
        response.confidence.as_str(),
        response.elapsed_ms
    );
    for (i, hit) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} ({})",
            i + 1,
            hit.fused_score,
            hit.chunk.path,
            hit.confidence.as_str()
        );
        println!(
            "    strategies: {}",
            hit.contributing_strategies
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!("    excerpt: \"{}\"", hit.snippet.replace('\n', " ").trim());
    }

    Ok(())
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn unavailable_placeholder_exact() -> StrategyResult {
    StrategyResult::empty(
        Strategy::ExactLexical,
        StrategyStatus::Failed(EngineErrorKind::BackendUnavailable),
    )
}

fn unavailable_placeholder_semantic() -> StrategyResult {
    StrategyResult::empty(
        Strategy::Semantic,
        StrategyStatus::Failed(EngineErrorKind::BackendUnavailable),
    )
}

/// Await a spawned SR task, bounded by the shared request deadline. On
/// timeout, signal cooperative cancellation and return a `Cancelled`
/// result without waiting further for the task to notice (§5).
async fn await_bounded(
    task: Option<JoinHandle<StrategyResult>>,
    deadline_at: Instant,
    strategy: Strategy,
    cancel: &CancellationHandle,
) -> Option<StrategyResult> {
    let task = task?;
    let remaining = deadline_at.saturating_duration_since(Instant::now());
    match tokio::time::timeout(remaining, task).await {
        Ok(Ok(result)) => Some(result),
        Ok(Err(_join_err)) => Some(StrategyResult::empty(
            strategy,
            StrategyStatus::Failed(EngineErrorKind::BackendUnavailable),
        )),
        Err(_elapsed) => {
            cancel.cancel();
            Some(StrategyResult::empty(strategy, StrategyStatus::Cancelled))
        }
    }
}

/// Optional reranking pass (§9 open question 2): blends each hit's
/// fused-score with the raw semantic cosine similarity it already
/// produced, if any. Runs strictly between RF and DS and never touches
/// `contributing_strategies`, so CC's confidence rules are unaffected.
fn apply_rerank(
    mut fused: Vec<FusedHit>,
    semantic_result: &Option<StrategyResult>,
    rerank_weight: f64,
) -> Vec<FusedHit> {
    let Some(semantic) = semantic_result else {
        return fused;
    };
    let semantic_scores: HashMap<&str, f64> = semantic
        .hits
        .iter()
        .map(|h| (h.chunk.chunk_id.as_str(), h.raw_score))
        .collect();
    for hit in fused.iter_mut() {
        if let Some(sim) = semantic_scores.get(hit.chunk.chunk_id.as_str()) {
            hit.fused_score += rerank_weight * sim;
        }
    }
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::FakeEmbedder;
    use crate::lexical_index::InMemoryLexicalIndex;
    use crate::retrieval_types::{ChunkRef, Confidence, Mode};
    use crate::vector_store::InMemoryVectorStore;

    fn searcher(rerank_weight: Option<f64>) -> (HybridSearcher, Arc<InMemoryLexicalIndex>, Arc<InMemoryVectorStore>, Arc<FakeEmbedder>) {
        let li = Arc::new(InMemoryLexicalIndex::new());
        let vs = Arc::new(InMemoryVectorStore::new());
        let emb = Arc::new(FakeEmbedder::new(64));
        let hs = HybridSearcher::new(
            li.clone(),
            vs.clone(),
            emb.clone(),
            HybridSearchConfig {
                fanout_k: 40,
                default_deadline_ms: 5_000,
                rerank_weight,
            },
        );
        (hs, li, vs, emb)
    }

    fn index_doc(li: &InMemoryLexicalIndex, vs: &InMemoryVectorStore, emb: &FakeEmbedder, id: &str, text: &str) {
        let chunk = ChunkRef {
            chunk_id: id.to_string(),
            document_id: format!("doc-{id}"),
            source_id: "filesystem".to_string(),
            path: format!("/docs/{id}.md"),
            chunk_index: 0,
        };
        li.insert(chunk.clone(), text);
        vs.insert(chunk, emb.vector_for(text), text);
    }

    #[tokio::test]
    async fn s1_exact_phrase_hit() {
        let (hs, li, vs, emb) = searcher(None);
        index_doc(&li, &vs, &emb, "d1", "Oak Ridge National Laboratory was founded in 1943.");
        index_doc(&li, &vs, &emb, "d2", "Maple ridge park is a public space.");
        index_doc(&li, &vs, &emb, "d3", "Labs across Oak Ridge employ thousands.");

        let response = hs.search(Query::new("\"Oak Ridge\"").with_limit(3)).await.unwrap();
        assert_eq!(response.query_type, crate::retrieval_types::QueryType::ExactPhrase);
        assert!(!response.results.is_empty());
        assert_eq!(response.results[0].chunk.chunk_id, "d1");
        assert!(response.results[0].confidence >= Confidence::High);
    }

    #[tokio::test]
    async fn s3_degraded_when_semantic_unavailable() {
        struct AlwaysFails;
        #[async_trait::async_trait]
        impl Embedder for AlwaysFails {
            async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, EngineError> {
                Err(EngineError::BackendUnavailable("down".to_string()))
            }
        }
        let li = Arc::new(InMemoryLexicalIndex::new());
        let vs = Arc::new(InMemoryVectorStore::new());
        let emb = Arc::new(AlwaysFails);
        li.insert(
            ChunkRef {
                chunk_id: "a".to_string(),
                document_id: "doc-a".to_string(),
                source_id: "filesystem".to_string(),
                path: "/docs/a.md".to_string(),
                chunk_index: 0,
            },
            "error handling strategy guide",
        );
        let hs = HybridSearcher::new(li, vs, emb, HybridSearchConfig::default());

        let response = hs.search(Query::new("error handling strategy")).await.unwrap();
        assert!(response.strategies_failed.contains(&Strategy::Semantic));
        assert!(response.strategies_failed.contains(&Strategy::HybridFused));
        assert!(!response.results.is_empty());
        assert!(response.confidence <= Confidence::Medium);
    }

    #[tokio::test]
    async fn confidence_capped_at_medium_even_when_two_lexical_strategies_agree() {
        struct AlwaysFails;
        #[async_trait::async_trait]
        impl Embedder for AlwaysFails {
            async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, EngineError> {
                Err(EngineError::BackendUnavailable("down".to_string()))
            }
        }
        let li = Arc::new(InMemoryLexicalIndex::new());
        let vs = Arc::new(InMemoryVectorStore::new());
        let emb = Arc::new(AlwaysFails);
        li.insert(
            ChunkRef {
                chunk_id: "a".to_string(),
                document_id: "doc-a".to_string(),
                source_id: "filesystem".to_string(),
                path: "/docs/a.md".to_string(),
                chunk_index: 0,
            },
            "rust error handling guide",
        );
        let hs = HybridSearcher::new(li, vs, emb, HybridSearchConfig::default());

        // exact-lexical and relaxed-lexical both match this chunk, which would
        // put |contributing_strategies|=2 and calibrate to MediumHigh absent
        // the semantic-outage cap.
        let response = hs.search(Query::new("rust error handling")).await.unwrap();
        assert!(response.strategies_failed.contains(&Strategy::Semantic));
        assert!(response.confidence <= Confidence::Medium);
        assert!(response
            .results
            .iter()
            .all(|hit| hit.confidence <= Confidence::Medium));
    }

    #[tokio::test]
    async fn bad_request_rejects_empty_query() {
        let (hs, _li, _vs, _emb) = searcher(None);
        let err = hs.search(Query::new("   ")).await.unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }

    #[tokio::test]
    async fn limit_is_clamped_to_max() {
        let (hs, li, vs, emb) = searcher(None);
        for i in 0..60 {
            index_doc(&li, &vs, &emb, &format!("c{i}"), "shared keyword across every document");
        }
        let response = hs.search(Query::new("shared").with_limit(1000)).await.unwrap();
        assert!(response.results.len() <= crate::retrieval_types::MAX_LIMIT);
    }

    #[tokio::test]
    async fn forced_lexical_mode_only_uses_exact_lexical() {
        let (hs, li, vs, emb) = searcher(None);
        index_doc(&li, &vs, &emb, "a", "rust error handling guide");
        let response = hs
            .search(Query::new("rust error handling").with_mode(Mode::Lexical))
            .await
            .unwrap();
        assert!(response.strategies_matched.iter().all(|s| *s == Strategy::ExactLexical));
    }
}
