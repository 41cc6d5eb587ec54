//! Lexical Index (LI): BM25 full-text search over chunk text.
//!
//! Mirrors the capability-trait-plus-backends shape of the teacher's
//! `Store` trait (`sqlite_store.rs` / `store/memory.rs`): one trait,
//! one SQLite-backed implementation reusing the existing `chunks_fts`
//! table, and one in-memory fake for engine tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::retrieval_types::{ChunkRef, EngineError, RetrievedHit};

/// Search surface the Strategy Runners need from a lexical backend.
///
/// `fts_expression` is an already-built SQLite FTS5 MATCH expression
/// (quoted phrase for exact-lexical, OR'd bare terms for
/// relaxed-lexical) — the index itself is agnostic to how the
/// expression was constructed.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    async fn search(
        &self,
        fts_expression: &str,
        fanout_k: usize,
    ) -> Result<Vec<RetrievedHit>, EngineError>;

    /// Remove every chunk belonging to `source_id` from the index.
    /// Returns the number of chunks removed.
    async fn delete_by_source(&self, source_id: &str) -> Result<u64, EngineError>;
}

/// SQLite-backed [`LexicalIndex`] using the `chunks_fts` virtual table.
pub struct SqliteLexicalIndex {
    pool: SqlitePool,
}

impl SqliteLexicalIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LexicalIndex for SqliteLexicalIndex {
    async fn search(
        &self,
        fts_expression: &str,
        fanout_k: usize,
    ) -> Result<Vec<RetrievedHit>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT f.chunk_id, f.document_id, d.source_id AS doc_source_id, d.source_url,
                   c.chunk_index, f.rank,
                   snippet(chunks_fts, 2, '>>>', '<<<', '...', 48) AS snippet
            FROM chunks_fts f
            JOIN chunks c ON c.id = f.chunk_id
            JOIN documents d ON d.id = f.document_id
            WHERE chunks_fts MATCH ?
            ORDER BY f.rank
            LIMIT ?
            "#,
        )
        .bind(fts_expression)
        .bind(fanout_k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err(e, fts_expression))?;

        let hits = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let rank: f64 = row.get("rank");
                RetrievedHit {
                    chunk: ChunkRef {
                        chunk_id: row.get("chunk_id"),
                        document_id: row.get("document_id"),
                        source_id: row.get("doc_source_id"),
                        path: row
                            .get::<Option<String>, _>("source_url")
                            .unwrap_or_default(),
                        chunk_index: row.get("chunk_index"),
                    },
                    snippet: row.get("snippet"),
                    raw_score: -rank,
                    rank: i + 1,
                }
            })
            .collect();

        Ok(hits)
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<u64, EngineError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::FatalIndexError(e.to_string()))?;

        let result = sqlx::query(
            "DELETE FROM chunks_fts WHERE document_id IN (SELECT id FROM documents WHERE source_id = ?)",
        )
        .bind(source_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| EngineError::FatalIndexError(e.to_string()))?;
        let deleted = result.rows_affected();

        sqlx::query(
            "DELETE FROM chunks WHERE document_id IN (SELECT id FROM documents WHERE source_id = ?)",
        )
        .bind(source_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| EngineError::FatalIndexError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| EngineError::FatalIndexError(e.to_string()))?;

        Ok(deleted)
    }
}

fn map_sqlx_err(err: sqlx::Error, expression: &str) -> EngineError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.message().contains("fts5: syntax error") => {
            EngineError::BadQuery(format!("invalid FTS5 expression {:?}: {}", expression, db_err))
        }
        _ => EngineError::BackendUnavailable(err.to_string()),
    }
}

/// In-memory [`LexicalIndex`] fake for engine tests. Does substring and
/// OR-term matching rather than real BM25 — good enough to exercise
/// ranking and fusion logic without a database.
pub struct InMemoryLexicalIndex {
    docs: RwLock<HashMap<String, (ChunkRef, String)>>,
}

impl InMemoryLexicalIndex {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, chunk: ChunkRef, text: impl Into<String>) {
        self.docs
            .write()
            .unwrap()
            .insert(chunk.chunk_id.clone(), (chunk, text.into()));
    }
}

impl Default for InMemoryLexicalIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip surrounding quotes added for an exact-phrase FTS5 MATCH and
/// split an OR expression back into bare lowercase terms.
fn extract_terms(expression: &str) -> (Vec<String>, bool) {
    let trimmed = expression.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        let phrase = &trimmed[1..trimmed.len() - 1];
        return (vec![phrase.to_lowercase()], true);
    }
    let terms = trimmed
        .split(" OR ")
        .map(|t| t.trim().trim_matches('"').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    (terms, false)
}

#[async_trait]
impl LexicalIndex for InMemoryLexicalIndex {
    async fn search(
        &self,
        fts_expression: &str,
        fanout_k: usize,
    ) -> Result<Vec<RetrievedHit>, EngineError> {
        if fts_expression.trim().is_empty() {
            return Err(EngineError::BadQuery("empty FTS expression".to_string()));
        }
        let (terms, exact_phrase) = extract_terms(fts_expression);
        let docs = self.docs.read().unwrap();

        let mut scored: Vec<(f64, ChunkRef, String)> = docs
            .values()
            .filter_map(|(chunk, text)| {
                let lower = text.to_lowercase();
                let score = if exact_phrase {
                    if lower.contains(&terms[0]) {
                        2.0
                    } else {
                        0.0
                    }
                } else {
                    terms.iter().filter(|t| lower.contains(t.as_str())).count() as f64
                };
                if score > 0.0 {
                    Some((score, chunk.clone(), text.clone()))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.chunk_id.cmp(&b.1.chunk_id))
        });
        scored.truncate(fanout_k);

        let hits = scored
            .into_iter()
            .enumerate()
            .map(|(i, (score, chunk, text))| RetrievedHit {
                snippet: text.chars().take(120).collect(),
                chunk,
                raw_score: score,
                rank: i + 1,
            })
            .collect();

        Ok(hits)
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<u64, EngineError> {
        let mut docs = self.docs.write().unwrap();
        let before = docs.len();
        docs.retain(|_, (chunk, _)| chunk.source_id != source_id);
        Ok((before - docs.len()) as u64)
    }
}
