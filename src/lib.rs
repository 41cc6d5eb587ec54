//! # Hybrid Retrieval Engine
//!
//! A local-first hybrid retrieval engine for AI tools: fuses lexical
//! (BM25 full-text) and semantic (dense vector) search into a single
//! ranked, diversified, confidence-calibrated answer within a hard
//! latency budget.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Connectors  │──▶│  Ingestion   │──▶│  SQLite   │
//! │   FS only   │   │ Chunk+Embed │   │ FTS5+Vec  │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │  (ctx)   │       │  (MCP)   │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Engine data flow
//!
//! A query enters [`hybrid_search::HybridSearcher::search`], which asks
//! [`query_analyzer`] for a [`retrieval_types::QueryPlan`], fans out to the
//! [`strategy`] runners in parallel under a deadline, fuses their results
//! with [`fusion`] (Reciprocal Rank Fusion), filters by the similarity
//! floor, diversifies with [`diversity`] (greedy MMR), and annotates
//! confidence with [`confidence`] before returning a bounded
//! [`retrieval_types::Response`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types: `SourceItem`, `Document`, `Chunk`, `SearchResult` |
//! | [`retrieval_types`] | Query/QueryPlan/ChunkRef/RetrievedHit/StrategyResult/FusedHit/Response |
//! | [`lexical_index`] | Lexical Index (LI) capability trait + SQLite/in-memory backends |
//! | [`vector_store`] | Vector Store (VS) capability trait + SQLite/in-memory backends |
//! | [`embedder`] | Embedder (EMB) capability trait + HTTP/in-memory backends |
//! | [`query_analyzer`] | Query type classification and strategy weighting (QA) |
//! | [`strategy`] | Strategy Runners (SR): exact-lexical, relaxed-lexical, semantic, hybrid-fused |
//! | [`fusion`] | Reciprocal Rank Fusion (RF) |
//! | [`diversity`] | Greedy MMR diversity selection (DS) |
//! | [`confidence`] | Confidence calibration from cross-strategy agreement (CC) |
//! | [`hybrid_search`] | Orchestrator: deadline, fan-out, fusion, degradation (HS) |
//! | [`deletion`] | `delete_source` — vectors, then chunks, then documents, then source record |
//! | [`connector_fs`] | Filesystem connector: walk local directories |
//! | [`chunk`] | Paragraph-boundary text chunker |
//! | [`embedding`] | Legacy single-shot embedding provider used by ingestion and `ctx search` |
//! | [`embed_cmd`] | Embedding CLI commands: `pending` and `rebuild` |
//! | [`ingest`] | Ingestion pipeline: connector → normalize → chunk → embed → store |
//! | [`search`] | Keyword/semantic/hybrid-alpha search (legacy single-shot CLI path) |
//! | [`get`] | Document retrieval by UUID |
//! | [`sources`] | Connector health and status listing |
//! | [`stats`] | Database statistics: document, chunk, and embedding counts |
//! | [`server`] | HTTP server (Axum) with CORS: legacy search, hybrid search, get, sources |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |
//!
//! ## Configuration
//!
//! Configured via a TOML file (default: `config/ctx.toml`). See [`config`]
//! for all available options and [`config::load_config`] for validation rules.

pub mod chunk;
pub mod config;
pub mod confidence;
pub mod connector_fs;
pub mod db;
pub mod deletion;
pub mod diversity;
pub mod embed_cmd;
pub mod embedder;
pub mod embedding;
pub mod fusion;
pub mod get;
pub mod hybrid_search;
pub mod ingest;
pub mod lexical_index;
pub mod migrate;
pub mod models;
pub mod query_analyzer;
pub mod retrieval_types;
pub mod search;
pub mod server;
pub mod sources;
pub mod stats;
pub mod strategy;
pub mod vector_store;

pub use models::SourceItem;
