//! Vector Store (VS): dense-vector nearest-neighbor search.
//!
//! SQLite backend does brute-force cosine similarity over
//! `chunk_vectors`, same as the teacher's `SqliteStore::vector_search`
//! — there's no ANN index in this schema, just a full scan. The
//! in-memory fake does the identical scan over a `Vec`.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity};
use crate::retrieval_types::{ChunkRef, EngineError, RetrievedHit};

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(
        &self,
        query_vector: &[f32],
        fanout_k: usize,
    ) -> Result<Vec<RetrievedHit>, EngineError>;

    /// Remove every vector belonging to `source_id`. Returns the number
    /// of vectors removed. Callers (see [`crate::deletion`]) treat a
    /// failure here as non-fatal and degrade to `vectors_deleted: 0`.
    async fn delete_by_source(&self, source_id: &str) -> Result<u64, EngineError>;
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn search(
        &self,
        query_vector: &[f32],
        fanout_k: usize,
    ) -> Result<Vec<RetrievedHit>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, cv.document_id, cv.embedding,
                   d.source_id AS doc_source_id, d.source_url,
                   c.chunk_index,
                   COALESCE(substr(c.text, 1, 240), '') AS snippet
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN documents d ON d.id = cv.document_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::BackendUnavailable(e.to_string()))?;

        let mut scored: Vec<(f64, ChunkRef, String)> = rows
            .into_iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                let similarity = cosine_similarity(query_vector, &vec) as f64;
                let chunk = ChunkRef {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    source_id: row.get("doc_source_id"),
                    path: row
                        .get::<Option<String>, _>("source_url")
                        .unwrap_or_default(),
                    chunk_index: row.get("chunk_index"),
                };
                (similarity, chunk, row.get("snippet"))
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
            .map(|(i, (score, chunk, snippet))| RetrievedHit {
                chunk,
                snippet,
                raw_score: score,
                rank: i + 1,
            })
            .collect();

        Ok(hits)
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<u64, EngineError> {
        let result = sqlx::query(
            "DELETE FROM chunk_vectors WHERE document_id IN (SELECT id FROM documents WHERE source_id = ?)",
        )
        .bind(source_id)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::BackendUnavailable(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

/// In-memory [`VectorStore`] fake for engine tests.
pub struct InMemoryVectorStore {
    vectors: RwLock<HashMap<String, (ChunkRef, Vec<f32>, String)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, chunk: ChunkRef, vector: Vec<f32>, snippet: impl Into<String>) {
        self.vectors
            .write()
            .unwrap()
            .insert(chunk.chunk_id.clone(), (chunk, vector, snippet.into()));
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(
        &self,
        query_vector: &[f32],
        fanout_k: usize,
    ) -> Result<Vec<RetrievedHit>, EngineError> {
        if query_vector.is_empty() {
            return Err(EngineError::BadQuery("empty query vector".to_string()));
        }
        let vectors = self.vectors.read().unwrap();

        let mut scored: Vec<(f64, ChunkRef, String)> = vectors
            .values()
            .map(|(chunk, vec, snippet)| {
                let score = cosine_similarity(query_vector, vec) as f64;
                (score, chunk.clone(), snippet.clone())
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
            .map(|(i, (score, chunk, snippet))| RetrievedHit {
                chunk,
                snippet,
                raw_score: score,
                rank: i + 1,
            })
            .collect();

        Ok(hits)
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<u64, EngineError> {
        let mut vectors = self.vectors.write().unwrap();
        let before = vectors.len();
        vectors.retain(|_, (chunk, _, _)| chunk.source_id != source_id);
        Ok((before - vectors.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str) -> ChunkRef {
        ChunkRef {
            chunk_id: id.to_string(),
            document_id: format!("doc-{id}"),
            source_id: "filesystem".to_string(),
            path: format!("/docs/{id}.md"),
            chunk_index: 0,
        }
    }

    #[tokio::test]
    async fn closest_vector_ranks_first() {
        let vs = InMemoryVectorStore::new();
        vs.insert(chunk("a"), vec![1.0, 0.0, 0.0], "a");
        vs.insert(chunk("b"), vec![0.0, 1.0, 0.0], "b");

        let hits = vs.search(&[0.9, 0.1, 0.0], 10).await.unwrap();
        assert_eq!(hits[0].chunk.chunk_id, "a");
        assert_eq!(hits[0].rank, 1);
    }

    #[tokio::test]
    async fn fanout_k_caps_results() {
        let vs = InMemoryVectorStore::new();
        for i in 0..10 {
            vs.insert(chunk(&format!("c{i}")), vec![1.0, 0.0], "x");
        }
        let hits = vs.search(&[1.0, 0.0], 4).await.unwrap();
        assert_eq!(hits.len(), 4);
    }

    #[tokio::test]
    async fn empty_query_vector_is_bad_query() {
        let vs = InMemoryVectorStore::new();
        let err = vs.search(&[], 10).await.unwrap_err();
        assert!(matches!(err, EngineError::BadQuery(_)));
    }
}
