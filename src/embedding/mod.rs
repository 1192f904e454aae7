//! Embedding capability interface and content-addressed caching.
//!
//! The crate never binds to a concrete embedding SDK: anything that can turn
//! text into a fixed-length vector implements [`EmbeddingProvider`] and is
//! injected as an `Arc<dyn EmbeddingProvider>`. [`EmbeddingCache`] wraps a
//! provider with a write-once filesystem cache and implements the trait
//! itself, so cached and uncached providers are interchangeable everywhere
//! downstream.

mod cache;

pub use cache::{BatchStats, CacheStats, EmbeddingCache, EncodeOutcome};

use async_trait::async_trait;

use crate::types::RagError;

/// Capability interface for producing fixed-length vector representations of
/// text.
///
/// Implementations must be deterministic per `(model_id, text)` pair in
/// expectation: the cache layer relies on recomputation producing an
/// equivalent vector when two writers race on the same key.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier of the underlying model. Part of every cache key,
    /// so switching models never resurfaces stale vectors.
    fn model_id(&self) -> &str;

    /// Output vector length.
    fn dimension(&self) -> usize;

    /// Embeds a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embeds many texts in one call; output order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// Deterministic hash-based embedding provider for tests and examples.
///
/// Vectors are derived from a BLAKE3 extended output over the text, mapped
/// into `[-1, 1]`. Identical texts always embed identically; distinct texts
/// embed (near-universally) differently. There is no semantic signal.
pub struct MockEmbeddingProvider {
    dimension: usize,
    model_id: String,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: "mock-embedder".to_string(),
        }
    }

    /// Overrides the reported model id (useful for cache-keying tests).
    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(text.as_bytes());
        let mut reader = hasher.finalize_xof();
        let mut bytes = vec![0u8; self.dimension * 4];
        reader.fill(&mut bytes);
        bytes
            .chunks_exact(4)
            .map(|b| {
                let raw = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                (raw as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }
}
