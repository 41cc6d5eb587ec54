//! # ctx
//!
//! CLI for the hybrid retrieval engine: a local-first context ingestion
//! and retrieval framework for AI tools.
//!
//! Context Harness provides a connector-driven pipeline for ingesting documents
//! from the filesystem, chunking and embedding them, and exposing hybrid
//! search (lexical + semantic, query-analyzed and RRF-fused) via a CLI and
//! MCP-compatible HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! Connectors → Normalization → Chunking → Embedding → SQLite → Query Engine → CLI / MCP Server
//! ```
//!
//! ## Modules
//!
//! - [`config`] — TOML configuration parsing and validation
//! - [`models`] — Core data types: `SourceItem`, `Document`, `Chunk`, `SearchResult`
//! - [`connector_fs`] — Filesystem connector: walk local directories
//! - [`chunk`] — Paragraph-boundary text chunker
//! - [`embedding`] — Embedding provider trait, OpenAI implementation, vector utilities
//! - [`embed_cmd`] — Embedding CLI commands (pending, rebuild)
//! - [`ingest`] — Ingestion pipeline orchestration
//! - [`search`] — Legacy keyword/semantic/hybrid-alpha search
//! - [`get`] — Document retrieval by ID
//! - [`sources`] — Connector health/status listing
//! - [`stats`] — Index statistics summary
//! - [`server`] — MCP-compatible HTTP server (Axum)
//! - [`db`] — SQLite connection management
//! - [`migrate`] — Database schema migrations
//!
//! ## Hybrid retrieval engine
//!
//! - [`retrieval_types`] — Shared types: `Query`, `Response`, `Strategy`, `QueryType`, `Confidence`
//! - [`query_analyzer`] — Classifies a query and picks per-strategy weights (QA)
//! - [`lexical_index`] — FTS5-backed and in-memory exact/relaxed lexical search (LI)
//! - [`vector_store`] — Cosine-similarity vector search backends (VS)
//! - [`embedder`] — Query embedding (EMB)
//! - [`strategy`] — Strategy Runners: exact-lexical, relaxed-lexical, semantic, hybrid-fused (SR)
//! - [`fusion`] — Reciprocal Rank Fusion (RF)
//! - [`diversity`] — Greedy MMR diversity selection (DS)
//! - [`confidence`] — Per-hit and per-response confidence calibration (CC)
//! - [`hybrid_search`] — The public orchestrator (HS)
//! - [`deletion`] — `delete_source`: vectors → chunks → documents

mod chunk;
mod config;
mod confidence;
mod connector_fs;
mod db;
mod deletion;
mod diversity;
mod embed_cmd;
mod embedder;
mod embedding;
mod fusion;
mod get;
mod hybrid_search;
mod ingest;
mod lexical_index;
mod migrate;
mod models;
mod query_analyzer;
mod retrieval_types;
mod search;
mod server;
mod sources;
mod stats;
mod strategy;
mod vector_store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ctx",
    about = "Context Harness — a local-first context ingestion and retrieval framework for AI tools",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/ctx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,

    /// List available connectors and their status
    Sources,

    /// Show index statistics (documents, chunks, embedding coverage)
    Stats,

    /// Ingest data from a connector
    Sync {
        /// Connector name (e.g. filesystem)
        connector: String,

        /// Ignore checkpoint, reingest everything
        #[arg(long)]
        full: bool,

        /// Show counts without writing
        #[arg(long)]
        dry_run: bool,

        /// Only process files modified after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Only process files modified before this date (YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,

        /// Limit number of items processed
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Search indexed documents
    Search {
        /// Search query
        query: String,

        /// Search mode: keyword, semantic, or hybrid
        #[arg(long, default_value = "keyword")]
        mode: String,

        /// Filter by source
        #[arg(long)]
        source: Option<String>,

        /// Filter by date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Retrieve a document by ID
    Get {
        /// Document ID (UUID)
        id: String,
    },

    /// Search via the hybrid retrieval engine (query analysis, RRF fusion, MMR diversity)
    HybridSearch {
        /// Search query
        query: String,

        /// Strategy mode: auto, hybrid, semantic, or lexical
        #[arg(long, default_value = "auto")]
        mode: String,

        /// Maximum number of results
        #[arg(long, default_value_t = crate::retrieval_types::DEFAULT_LIMIT)]
        limit: usize,
    },

    /// Delete all documents, chunks, and vectors belonging to a source
    DeleteSource {
        /// Source identifier (the `documents.source_id` value)
        source_id: String,
    },

    /// Manage embeddings
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Start the MCP-compatible HTTP server
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks that are missing or have stale embeddings
    Pending {
        /// Maximum number of chunks to embed
        #[arg(long)]
        limit: Option<usize>,

        /// Override batch size from config
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all embeddings
    Rebuild {
        /// Override batch size from config
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// Start the MCP tool server
    Mcp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Sync {
            connector,
            full,
            dry_run,
            since,
            until,
            limit,
        } => {
            ingest::run_sync(&cfg, &connector, full, dry_run, since, until, limit).await?;
        }
        Commands::Search {
            query,
            mode,
            source,
            since,
            limit,
        } => {
            search::run_search(&cfg, &query, &mode, source, since, limit).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::HybridSearch { query, mode, limit } => {
            hybrid_search::run_hybrid_search(&cfg, &query, &mode, limit).await?;
        }
        Commands::DeleteSource { source_id } => {
            deletion::run_delete_source(&cfg, &source_id).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                embed_cmd::run_embed_pending(&cfg, limit, batch_size, dry_run).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                embed_cmd::run_embed_rebuild(&cfg, batch_size).await?;
            }
        },
        Commands::Serve { service } => match service {
            ServeService::Mcp => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}
