//! Shared types for the hybrid retrieval engine.
//!
//! These flow between [`crate::query_analyzer`], [`crate::strategy`],
//! [`crate::fusion`], [`crate::diversity`], [`crate::confidence`], and
//! [`crate::hybrid_search`]. None of them touch storage directly — that's
//! the job of [`crate::lexical_index`], [`crate::vector_store`], and
//! [`crate::embedder`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Per-strategy retrieval cap before fusion.
pub const DEFAULT_FANOUT_K: usize = 40;
/// Hard ceiling on `fanout_k` regardless of config.
pub const MAX_FANOUT_K: usize = 100;
/// Default result count when the caller doesn't specify one.
pub const DEFAULT_LIMIT: usize = 10;
/// Hard ceiling on `limit` regardless of caller request.
pub const MAX_LIMIT: usize = 50;
/// Default wall-clock budget for a single `search` call.
pub const DEFAULT_DEADLINE_MS: u64 = 5_000;

/// One of the four independent rank producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    ExactLexical,
    RelaxedLexical,
    Semantic,
    HybridFused,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ExactLexical => "exact-lexical",
            Strategy::RelaxedLexical => "relaxed-lexical",
            Strategy::Semantic => "semantic",
            Strategy::HybridFused => "hybrid-fused",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a raw query, checked in a fixed rule order (see
/// [`crate::query_analyzer::classify`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryType {
    ExactPhrase,
    ProperNoun,
    NaturalLanguage,
    Technical,
    Unknown,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::ExactPhrase => "exact-phrase",
            QueryType::ProperNoun => "proper-noun",
            QueryType::NaturalLanguage => "natural-language",
            QueryType::Technical => "technical",
            QueryType::Unknown => "unknown",
        }
    }
}

/// Caller-selectable search mode. `Auto` lets [`crate::query_analyzer`]
/// pick the strategy plan; the others force a single-strategy plan with
/// weight 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Auto,
    Hybrid,
    Semantic,
    Lexical,
}

/// Per-hit and per-response confidence, ordered worst-to-best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Confidence {
    None,
    Low,
    Medium,
    MediumHigh,
    High,
    VeryHigh,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::None => "none",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::MediumHigh => "medium-high",
            Confidence::High => "high",
            Confidence::VeryHigh => "very-high",
        }
    }
}

/// A request into the engine. Immutable once created.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub mode: Mode,
    pub limit: usize,
    pub deadline_ms: Option<u64>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: Mode::Auto,
            limit: DEFAULT_LIMIT,
            deadline_ms: None,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Clamp the caller-requested limit to `[1, MAX_LIMIT]`.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, MAX_LIMIT);
        self
    }
}

/// Derived from a [`Query`] by [`crate::query_analyzer::classify`]. Immutable.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub query_type: QueryType,
    /// Weight per enabled strategy; strategies absent here are disabled.
    pub weights: Vec<(Strategy, f64)>,
}

impl QueryPlan {
    pub fn weight(&self, strategy: Strategy) -> Option<f64> {
        self.weights
            .iter()
            .find(|(s, _)| *s == strategy)
            .map(|(_, w)| *w)
    }

    pub fn enabled_strategies(&self) -> BTreeSet<Strategy> {
        self.weights.iter().map(|(s, _)| *s).collect()
    }

    pub fn is_enabled(&self, strategy: Strategy) -> bool {
        self.weight(strategy).is_some_and(|w| w > 0.0)
    }
}

/// Stable identity of a retrievable unit, assigned at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkRef {
    pub chunk_id: String,
    pub document_id: String,
    pub source_id: String,
    pub path: String,
    pub chunk_index: i64,
}

/// One hit within a single strategy's ranked output.
#[derive(Debug, Clone)]
pub struct RetrievedHit {
    pub chunk: ChunkRef,
    pub snippet: String,
    pub raw_score: f64,
    /// 1-indexed, dense within the owning [`StrategyResult`].
    pub rank: usize,
}

/// Outcome of a single Strategy Runner call.
#[derive(Debug, Clone)]
pub struct StrategyResult {
    pub strategy: Strategy,
    pub hits: Vec<RetrievedHit>,
    pub status: StrategyStatus,
    pub elapsed_ms: u64,
}

impl StrategyResult {
    pub fn empty(strategy: Strategy, status: StrategyStatus) -> Self {
        Self {
            strategy,
            hits: Vec::new(),
            status,
            elapsed_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.status, StrategyStatus::Success)
    }

    /// Ranks form a dense `1..n` permutation (§8 invariant 8).
    #[cfg(test)]
    pub fn ranks_are_contiguous(&self) -> bool {
        let mut ranks: Vec<usize> = self.hits.iter().map(|h| h.rank).collect();
        ranks.sort_unstable();
        ranks.iter().enumerate().all(|(i, r)| *r == i + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyStatus {
    Success,
    Failed(EngineErrorKind),
    Cancelled,
}

/// Non-fatal error kinds a backend call can fail with. Fatal kinds
/// ([`EngineError::FatalIndexError`], [`EngineError::BadRequest`]) are not
/// represented here because they never reach a [`StrategyResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    BackendUnavailable,
    Timeout,
    BadQuery,
}

/// Top-level engine error. Only [`EngineError::BadRequest`] and
/// [`EngineError::FatalIndexError`] ever produce an error response to the
/// caller — every other failure is caught at the Strategy Runner boundary
/// and recorded as a [`StrategyStatus::Failed`] instead (§7).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("timeout after {0}ms")]
    Timeout(u64),
    #[error("bad query: {0}")]
    BadQuery(String),
    #[error("fatal index error: {0}")]
    FatalIndexError(String),
}

impl EngineError {
    pub fn kind(&self) -> Option<EngineErrorKind> {
        match self {
            EngineError::BackendUnavailable(_) => Some(EngineErrorKind::BackendUnavailable),
            EngineError::Timeout(_) => Some(EngineErrorKind::Timeout),
            EngineError::BadQuery(_) => Some(EngineErrorKind::BadQuery),
            EngineError::BadRequest(_) | EngineError::FatalIndexError(_) => None,
        }
    }
}

/// A fused, cross-strategy result. Produced by [`crate::fusion::fuse`],
/// reordered by [`crate::diversity::select`], annotated by
/// [`crate::confidence::calibrate`].
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub chunk: ChunkRef,
    pub snippet: String,
    pub fused_score: f64,
    pub contributing_strategies: BTreeSet<Strategy>,
    pub best_rank: Vec<(Strategy, usize)>,
    pub confidence: Confidence,
}

/// The bounded, immutable answer returned to the caller.
#[derive(Debug, Clone)]
pub struct Response {
    pub results: Vec<FusedHit>,
    pub confidence: Confidence,
    pub query_type: QueryType,
    pub strategies_matched: BTreeSet<Strategy>,
    pub strategies_failed: BTreeSet<Strategy>,
    pub elapsed_ms: u64,
}

impl Response {
    pub fn empty(query_type: QueryType, strategies_failed: BTreeSet<Strategy>, elapsed_ms: u64) -> Self {
        Self {
            results: Vec::new(),
            confidence: Confidence::None,
            query_type,
            strategies_matched: BTreeSet::new(),
            strategies_failed,
            elapsed_ms,
        }
    }
}

// ============ §6 wire contract ============

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequestBody {
    pub query: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_wire_limit")]
    pub limit: usize,
}

fn default_wire_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultItem {
    pub chunk_id: String,
    pub path: String,
    pub source_id: String,
    pub snippet: String,
    pub score: f64,
    pub confidence: String,
    pub strategies: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponseBody {
    pub results: Vec<ResultItem>,
    pub confidence: String,
    pub query_type: String,
    pub strategies_matched: Vec<String>,
    pub strategies_failed: Vec<String>,
    pub search_time_ms: u64,
}

impl From<Response> for SearchResponseBody {
    fn from(r: Response) -> Self {
        SearchResponseBody {
            results: r
                .results
                .into_iter()
                .map(|h| ResultItem {
                    chunk_id: h.chunk.chunk_id,
                    path: h.chunk.path,
                    source_id: h.chunk.source_id,
                    snippet: h.snippet,
                    score: h.fused_score,
                    confidence: h.confidence.as_str().to_string(),
                    strategies: h
                        .contributing_strategies
                        .iter()
                        .map(|s| s.as_str().to_string())
                        .collect(),
                })
                .collect(),
            confidence: r.confidence.as_str().to_string(),
            query_type: r.query_type.as_str().to_string(),
            strategies_matched: r
                .strategies_matched
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            strategies_failed: r
                .strategies_failed
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            search_time_ms: r.elapsed_ms,
        }
    }
}
