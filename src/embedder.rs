//! Embedder (EMB): turns query text into a dense vector for the Vector
//! Store.
//!
//! The real backend delegates to the legacy [`crate::embedding`] module
//! (same `OpenAIProvider` used by ingestion and `ctx search --mode
//! semantic`) rather than duplicating the HTTP/retry logic. The fake
//! backend is deterministic so engine tests don't depend on network
//! access or floating-point embedding drift.

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::retrieval_types::EngineError;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EngineError>;
}

/// Wraps a configured [`EmbeddingProvider`] + [`EmbeddingConfig`] pair.
pub struct RealEmbedder {
    provider: Box<dyn EmbeddingProvider>,
    config: EmbeddingConfig,
}

impl RealEmbedder {
    pub fn new(provider: Box<dyn EmbeddingProvider>, config: EmbeddingConfig) -> Self {
        Self { provider, config }
    }
}

#[async_trait]
impl Embedder for RealEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::BadQuery("empty query text".to_string()));
        }
        embedding::embed_query(self.provider.as_ref(), &self.config, text)
            .await
            .map_err(|e| EngineError::BackendUnavailable(e.to_string()))
    }
}

/// Deterministic fake embedder for engine tests: hashes each lowercased
/// word into a fixed-width vector so semantically related test fixtures
/// (sharing words) land close together under cosine similarity.
pub struct FakeEmbedder {
    dims: usize,
}

impl FakeEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            let mut bytes = word.as_bytes().to_vec();
            bytes.push(0);
            let idx = bytes.iter().fold(0usize, |acc, b| {
                acc.wrapping_mul(31).wrapping_add(*b as usize)
            }) % self.dims;
            v[idx] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::BadQuery("empty query text".to_string()));
        }
        Ok(self.vector_for(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_embedder_is_deterministic() {
        let emb = FakeEmbedder::new(32);
        let a = emb.embed_query("hello world").await.unwrap();
        let b = emb.embed_query("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn fake_embedder_rejects_empty_text() {
        let emb = FakeEmbedder::new(32);
        let err = emb.embed_query("   ").await.unwrap_err();
        assert!(matches!(err, EngineError::BadQuery(_)));
    }

    #[tokio::test]
    async fn shared_words_increase_similarity() {
        let emb = FakeEmbedder::new(64);
        let a = emb.vector_for("rust error handling patterns");
        let b = emb.vector_for("rust error handling guide");
        let c = emb.vector_for("completely unrelated topic here");

        let sim_ab = crate::embedding::cosine_similarity(&a, &b);
        let sim_ac = crate::embedding::cosine_similarity(&a, &c);
        assert!(sim_ab > sim_ac);
    }
}
