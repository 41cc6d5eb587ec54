//! `delete_source`: the deletion contract the surrounding knowledge base
//! drives when a connector source is removed (§6).
//!
//! Ordering is fixed: vectors, then chunks, then documents, then the
//! source record. Vector deletion is allowed to fail soft — the vector
//! store is a soft dependency of the engine, unlike the lexical index.

use sqlx::SqlitePool;

use crate::config::Config;
use crate::lexical_index::LexicalIndex;
use crate::retrieval_types::EngineError;
use crate::vector_store::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionResult {
    pub documents_deleted: u64,
    pub vectors_deleted: u64,
    /// Set when vector deletion failed and was skipped rather than
    /// aborting the whole operation.
    pub degraded: bool,
}

/// Delete every document, chunk, and vector belonging to `source_id`.
///
/// Step order per §6: vectors first (best-effort), then lexical chunks,
/// then documents. There is no separate persisted "source" record in
/// this schema — sources are identified entirely by the `source_id`
/// column on `documents` — so this is the final step.
pub async fn delete_source(
    pool: &SqlitePool,
    li: &dyn LexicalIndex,
    vs: &dyn VectorStore,
    source_id: &str,
) -> Result<DeletionResult, EngineError> {
    let (vectors_deleted, degraded) = match vs.delete_by_source(source_id).await {
        Ok(n) => (n, false),
        Err(e) => {
            eprintln!(
                "Warning: vector store unavailable during delete_source({}): {}",
                source_id, e
            );
            (0, true)
        }
    };

    li.delete_by_source(source_id).await?;

    let result = sqlx::query("DELETE FROM documents WHERE source_id = ?")
        .bind(source_id)
        .execute(pool)
        .await
        .map_err(|e| EngineError::FatalIndexError(e.to_string()))?;

    Ok(DeletionResult {
        documents_deleted: result.rows_affected(),
        vectors_deleted,
        degraded,
    })
}

/// CLI entry point for `ctx delete-source`.
///
/// Wires the real SQLite-backed lexical index and vector store from
/// `config` and runs [`delete_source`].
pub async fn run_delete_source(config: &Config, source_id: &str) -> anyhow::Result<()> {
    let (searcher, pool) = crate::hybrid_search::build_from_config(config).await?;
    let (li, vs) = searcher.backends();

    let result = delete_source(&pool, li.as_ref(), vs.as_ref(), source_id).await?;
    pool.close().await;

    println!("delete-source {}", source_id);
    println!("  documents deleted: {}", result.documents_deleted);
    println!("  vectors deleted: {}", result.vectors_deleted);
    if result.degraded {
        println!("  warning: vector store was unavailable, vector deletion skipped");
    }
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical_index::InMemoryLexicalIndex;
    use crate::retrieval_types::ChunkRef;
    use crate::vector_store::InMemoryVectorStore;

    fn chunk(id: &str, source_id: &str) -> ChunkRef {
        ChunkRef {
            chunk_id: id.to_string(),
            document_id: format!("doc-{id}"),
            source_id: source_id.to_string(),
            path: format!("/docs/{id}.md"),
            chunk_index: 0,
        }
    }

    #[tokio::test]
    async fn delete_by_source_is_scoped_to_lexical_and_vector_backends() {
        let li = InMemoryLexicalIndex::new();
        let vs = InMemoryVectorStore::new();
        li.insert(chunk("a", "s1"), "alpha");
        li.insert(chunk("b", "s2"), "beta");
        vs.insert(chunk("a", "s1"), vec![1.0, 0.0], "alpha");
        vs.insert(chunk("b", "s2"), vec![0.0, 1.0], "beta");

        let removed_chunks = li.delete_by_source("s1").await.unwrap();
        let removed_vectors = vs.delete_by_source("s1").await.unwrap();
        assert_eq!(removed_chunks, 1);
        assert_eq!(removed_vectors, 1);

        let remaining = li.search("beta", 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].chunk.chunk_id, "b");
    }
}
