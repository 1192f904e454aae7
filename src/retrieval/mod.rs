//! Semantic retrieval: an embedding capability composed with a vector index.
//!
//! ```text
//! query text ──► EmbeddingProvider::embed ──► FlatIndex::search ──► ranked
//!                                                                   results
//! ```
//!
//! The retriever owns nothing model-specific: it is constructed from any
//! [`EmbeddingProvider`] (typically an [`EmbeddingCache`] wrapping the real
//! model) and a shared [`FlatIndex`], both behind `Arc` so one loaded model
//! and one index serve many retrievals.
//!
//! [`EmbeddingCache`]: crate::embedding::EmbeddingCache

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chunking::{Chunk, META_CHUNK_ID};
use crate::embedding::EmbeddingProvider;
use crate::index::{FlatIndex, IndexStats, RetrievalResult};
use crate::types::{Metadata, RagError};

/// Metadata key under which [`SemanticRetriever::add_chunks`] stores chunk
/// text, so retrieval results carry their content.
pub const META_TEXT: &str = "text";

/// Per-call retrieval knobs.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrieveOptions {
    /// Maximum number of results.
    pub k: usize,
    /// Drop results scoring below this threshold (applied after search, so
    /// fewer than `k` results may come back; no re-search backfills them).
    pub min_score: Option<f32>,
    /// Exact-equality metadata filters forwarded to the index.
    pub filters: Option<Metadata>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            k: 5,
            min_score: None,
            filters: None,
        }
    }
}

impl RetrieveOptions {
    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: Metadata) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// Combined embedder and index statistics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrieverStats {
    pub model_id: String,
    pub dimension: usize,
    pub index: IndexStats,
}

/// Turns natural-language queries into ranked, scored passages.
pub struct SemanticRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<FlatIndex>,
}

impl SemanticRetriever {
    /// Composes an embedding capability with a vector index.
    ///
    /// Fails with [`RagError::Dimension`] when the embedder's output length
    /// differs from the index's configured dimension; catching this at
    /// construction keeps every later `retrieve` shape-safe.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<FlatIndex>,
    ) -> Result<Self, RagError> {
        if embedder.dimension() != index.dimension() {
            return Err(RagError::Dimension {
                expected: index.dimension(),
                actual: embedder.dimension(),
            });
        }
        tracing::info!(
            model = embedder.model_id(),
            dimension = index.dimension(),
            "retriever initialized"
        );
        Ok(Self { embedder, index })
    }

    /// The underlying index, for persistence or direct management.
    pub fn index(&self) -> &Arc<FlatIndex> {
        &self.index
    }

    /// Retrieves the passages most similar to `query`.
    ///
    /// Fails with [`RagError::EmptyQuery`] on blank input before any
    /// embedding work happens.
    pub async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> Result<Vec<RetrievalResult>, RagError> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let embedding = self.embedder.embed(query).await?;
        let mut results = self
            .index
            .search(&embedding, options.k, options.filters.as_ref())?;

        if let Some(min_score) = options.min_score {
            let before = results.len();
            results.retain(|result| result.score >= min_score);
            if results.len() < before {
                tracing::debug!(
                    dropped = before - results.len(),
                    min_score,
                    "results below score threshold"
                );
            }
        }

        tracing::debug!(num_results = results.len(), "retrieval completed");
        Ok(results)
    }

    /// Retrieves for many queries, preserving 1:1 slot alignment.
    ///
    /// A query that fails (empty text, provider error) yields an empty
    /// result list in its slot; the batch itself never fails.
    pub async fn batch_retrieve(
        &self,
        queries: &[String],
        options: &RetrieveOptions,
    ) -> Vec<Vec<RetrievalResult>> {
        let mut all = Vec::with_capacity(queries.len());
        for (idx, query) in queries.iter().enumerate() {
            match self.retrieve(query, options).await {
                Ok(results) => all.push(results),
                Err(err) => {
                    tracing::warn!(
                        query_index = idx,
                        error = %err,
                        "query failed in batch, returning empty slot"
                    );
                    all.push(Vec::new());
                }
            }
        }
        all
    }

    /// Embeds `texts` in one batch and adds them to the index.
    ///
    /// Surfaces the same dimension/duplicate-id errors as the underlying
    /// [`FlatIndex::add`].
    pub async fn add_documents(
        &self,
        texts: &[String],
        ids: &[String],
        metadatas: Option<Vec<Metadata>>,
    ) -> Result<(), RagError> {
        if texts.len() != ids.len() {
            return Err(RagError::InvalidInput(format!(
                "ids length ({}) must match texts length ({})",
                ids.len(),
                texts.len()
            )));
        }
        let vectors = self.embedder.embed_batch(texts).await?;
        self.index.add(vectors, ids.to_vec(), metadatas)?;
        tracing::info!(
            num_documents = texts.len(),
            total_vectors = self.index.len(),
            "documents added"
        );
        Ok(())
    }

    /// Indexes chunker output directly: each chunk's `chunk_id` becomes its
    /// index id, and the chunk text is stored in metadata under
    /// [`META_TEXT`] so results carry their content.
    pub async fn add_chunks(&self, chunks: Vec<Chunk>) -> Result<(), RagError> {
        let mut texts = Vec::with_capacity(chunks.len());
        let mut ids = Vec::with_capacity(chunks.len());
        let mut metadatas = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let id = chunk
                .metadata
                .get(META_CHUNK_ID)
                .and_then(|value| value.as_str())
                .ok_or_else(|| {
                    RagError::InvalidInput("chunk is missing a chunk_id".to_string())
                })?
                .to_string();
            let mut metadata = chunk.metadata;
            metadata.insert(META_TEXT.to_string(), chunk.text.clone().into());
            texts.push(chunk.text);
            ids.push(id);
            metadatas.push(metadata);
        }

        let vectors = self.embedder.embed_batch(&texts).await?;
        self.index.add(vectors, ids, Some(metadatas))
    }

    pub fn stats(&self) -> RetrieverStats {
        RetrieverStats {
            model_id: self.embedder.model_id().to_string(),
            dimension: self.embedder.dimension(),
            index: self.index.stats(),
        }
    }
}
