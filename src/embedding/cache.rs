//! Write-once filesystem cache in front of an embedding provider.
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/vectors/<key>.vec   raw little-endian f32 vector
//! <root>/meta/<key>.json     human-readable entry summary
//! ```
//!
//! The key is a BLAKE3 hash over `model_id:text`, so entries are coupled to
//! the model that produced them. Entries are never mutated after the first
//! write; a corrupt or truncated entry is treated as a miss and silently
//! overwritten by the recomputed vector. Same-key writer races are benign
//! (both sides write an equivalent vector, last write wins), so no lock is
//! taken around cache writes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::EmbeddingProvider;
use crate::types::RagError;

const VECTORS_DIR: &str = "vectors";
const META_DIR: &str = "meta";
const PREVIEW_CHARS: usize = 100;

/// Result of encoding one text, with cache provenance.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeOutcome {
    pub vector: Vec<f32>,
    pub from_cache: bool,
}

/// Counters for one batch encode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Texts served from the cache.
    pub cached: usize,
    /// Texts sent to the embedding capability.
    pub computed: usize,
    /// Total texts in the batch.
    pub total: usize,
}

/// Size counters over the cache directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub num_entries: usize,
    pub size_bytes: u64,
}

/// Summary sidecar written next to each cached vector.
#[derive(Debug, Serialize, Deserialize)]
struct EntrySummary {
    model_id: String,
    dimension: usize,
    text_length: usize,
    text_preview: String,
    created_at: DateTime<Utc>,
}

/// Content-addressed cache/batch processor wrapping an [`EmbeddingProvider`].
///
/// Implements [`EmbeddingProvider`] itself, so it can be handed to the
/// retriever in place of the raw provider.
///
/// # Examples
///
/// ```rust,ignore
/// let cache = EmbeddingCache::new(provider, "data/embeddings_cache");
/// let outcome = cache.encode_one("hello").await?;
/// assert!(!outcome.from_cache);
/// let again = cache.encode_one("hello").await?;
/// assert!(again.from_cache);
/// assert_eq!(outcome.vector, again.vector);
/// ```
pub struct EmbeddingCache {
    provider: Arc<dyn EmbeddingProvider>,
    root: Option<PathBuf>,
}

impl EmbeddingCache {
    /// Creates a cache rooted at `root`. Directories are created lazily on
    /// the first write.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        tracing::info!(
            model = provider.model_id(),
            root = %root.display(),
            "embedding cache initialized"
        );
        Self {
            provider,
            root: Some(root),
        }
    }

    /// Creates a pass-through wrapper that never reads or writes the disk.
    /// Every encode reports `from_cache = false`.
    pub fn disabled(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            root: None,
        }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    fn cache_key(&self, text: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.provider.model_id().as_bytes());
        hasher.update(b":");
        hasher.update(text.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    fn vector_path(root: &Path, key: &str) -> PathBuf {
        root.join(VECTORS_DIR).join(format!("{key}.vec"))
    }

    async fn load_cached(&self, key: &str) -> Option<Vec<f32>> {
        let root = self.root.as_ref()?;
        let bytes = fs::read(Self::vector_path(root, key)).await.ok()?;
        match decode_vector(&bytes, self.provider.dimension()) {
            Some(vector) => Some(vector),
            None => {
                // Wrong length or torn write: recover as a miss.
                tracing::warn!(key = &key[..8], "corrupt cache entry, recomputing");
                None
            }
        }
    }

    /// Persists a vector and its summary. Failures are logged and swallowed:
    /// a cache that cannot write degrades to recomputation, it does not fail
    /// the encode.
    async fn store(&self, key: &str, text: &str, vector: &[f32]) {
        let Some(root) = self.root.clone() else {
            return;
        };
        let result: Result<(), RagError> = async {
            fs::create_dir_all(root.join(VECTORS_DIR)).await?;
            fs::create_dir_all(root.join(META_DIR)).await?;
            fs::write(Self::vector_path(&root, key), encode_vector(vector)).await?;
            let summary = EntrySummary {
                model_id: self.provider.model_id().to_string(),
                dimension: vector.len(),
                text_length: text.chars().count(),
                text_preview: text.chars().take(PREVIEW_CHARS).collect(),
                created_at: Utc::now(),
            };
            fs::write(
                root.join(META_DIR).join(format!("{key}.json")),
                serde_json::to_vec_pretty(&summary)?,
            )
            .await?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            tracing::warn!(key = &key[..8], error = %err, "failed to persist cache entry");
        }
    }

    /// Encodes one text, consulting the cache first.
    pub async fn encode_one(&self, text: &str) -> Result<EncodeOutcome, RagError> {
        let key = self.cache_key(text);
        if let Some(vector) = self.load_cached(&key).await {
            return Ok(EncodeOutcome {
                vector,
                from_cache: true,
            });
        }
        let vector = self.provider.embed(text).await?;
        self.store(&key, text, &vector).await;
        Ok(EncodeOutcome {
            vector,
            from_cache: false,
        })
    }

    /// Encodes a batch, computing only the uncached subset.
    ///
    /// Cached texts are looked up individually; the remainder goes to the
    /// provider's batch operation in one call and is scattered back into the
    /// original positions, so output order always matches input order. If
    /// that batch call fails the whole encode fails and nothing is written
    /// to the cache for this batch.
    pub async fn encode_batch(
        &self,
        texts: &[String],
    ) -> Result<(Vec<Vec<f32>>, BatchStats), RagError> {
        if texts.is_empty() {
            return Ok((Vec::new(), BatchStats::default()));
        }

        let mut slots: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut to_compute: Vec<String> = Vec::new();
        let mut to_compute_indices: Vec<usize> = Vec::new();
        let mut cached = 0usize;

        for (idx, text) in texts.iter().enumerate() {
            let key = self.cache_key(text);
            if let Some(vector) = self.load_cached(&key).await {
                slots[idx] = Some(vector);
                cached += 1;
            } else {
                to_compute.push(text.clone());
                to_compute_indices.push(idx);
            }
        }

        let computed = to_compute.len();
        if !to_compute.is_empty() {
            let fresh = self.provider.embed_batch(&to_compute).await?;
            if fresh.len() != to_compute.len() {
                return Err(RagError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    fresh.len(),
                    to_compute.len()
                )));
            }
            for ((slot, text), vector) in
                to_compute_indices.iter().zip(&to_compute).zip(fresh)
            {
                let key = self.cache_key(text);
                self.store(&key, text, &vector).await;
                slots[*slot] = Some(vector);
            }
        }

        let stats = BatchStats {
            cached,
            computed,
            total: texts.len(),
        };
        tracing::info!(
            cached = stats.cached,
            computed = stats.computed,
            total = stats.total,
            "batch encode completed"
        );
        let vectors = slots
            .into_iter()
            .map(|slot| slot.expect("every batch slot filled"))
            .collect();
        Ok((vectors, stats))
    }

    /// Removes every cached entry. A disabled cache is a no-op.
    pub async fn clear(&self) -> Result<(), RagError> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        if fs::try_exists(root).await? {
            fs::remove_dir_all(root).await?;
            tracing::info!(root = %root.display(), "embedding cache cleared");
        }
        Ok(())
    }

    /// Entry count and on-disk footprint.
    pub async fn stats(&self) -> Result<CacheStats, RagError> {
        let Some(root) = &self.root else {
            return Ok(CacheStats::default());
        };
        let mut stats = CacheStats::default();
        for dir in [root.join(VECTORS_DIR), root.join(META_DIR)] {
            if !fs::try_exists(&dir).await? {
                continue;
            }
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                if meta.is_file() {
                    stats.size_bytes += meta.len();
                    if entry.path().extension().is_some_and(|ext| ext == "vec") {
                        stats.num_entries += 1;
                    }
                }
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingCache {
    fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.encode_one(text).await?.vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(self.encode_batch(texts).await?.0)
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: &[u8], dimension: usize) -> Option<Vec<f32>> {
    if bytes.len() != dimension * 4 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use tempfile::tempdir;

    fn cache_in(dir: &Path) -> EmbeddingCache {
        EmbeddingCache::new(Arc::new(MockEmbeddingProvider::new(8)), dir)
    }

    #[tokio::test]
    async fn second_encode_hits_cache_bit_identically() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());

        let first = cache.encode_one("andes mountains").await.unwrap();
        assert!(!first.from_cache);

        let second = cache.encode_one("andes mountains").await.unwrap();
        assert!(second.from_cache);
        assert_eq!(first.vector, second.vector);
    }

    #[tokio::test]
    async fn batch_partitions_cached_and_computed() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());

        cache.encode_one("alpha").await.unwrap();

        let texts = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let (vectors, stats) = cache.encode_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(stats.cached, 1);
        assert_eq!(stats.computed, 2);
        assert_eq!(stats.total, 3);

        // Order preserved: each slot matches a direct encode of that text.
        for (text, vector) in texts.iter().zip(&vectors) {
            let direct = cache.encode_one(text).await.unwrap();
            assert_eq!(&direct.vector, vector);
        }
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());
        let (vectors, stats) = cache.encode_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
        assert_eq!(stats, BatchStats::default());
    }

    #[tokio::test]
    async fn corrupt_entry_recovers_as_miss() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());

        let original = cache.encode_one("machu picchu").await.unwrap();

        // Truncate the stored vector to force a corrupt read.
        let key = cache.cache_key("machu picchu");
        let path = EmbeddingCache::vector_path(dir.path(), &key);
        fs::write(&path, b"junk").await.unwrap();

        let recovered = cache.encode_one("machu picchu").await.unwrap();
        assert!(!recovered.from_cache);
        assert_eq!(recovered.vector, original.vector);

        // The corrupt entry was overwritten; the next read hits.
        let again = cache.encode_one("machu picchu").await.unwrap();
        assert!(again.from_cache);
    }

    #[tokio::test]
    async fn distinct_model_ids_get_distinct_keys() {
        let dir = tempdir().unwrap();
        let a = EmbeddingCache::new(Arc::new(MockEmbeddingProvider::new(8)), dir.path());
        let b = EmbeddingCache::new(
            Arc::new(MockEmbeddingProvider::new(8).with_model_id("other-model")),
            dir.path(),
        );
        // Same text, different model: entries must never collide.
        assert_ne!(a.cache_key("same text"), b.cache_key("same text"));
    }

    #[tokio::test]
    async fn disabled_cache_never_writes() {
        let cache = EmbeddingCache::disabled(Arc::new(MockEmbeddingProvider::new(8)));
        let first = cache.encode_one("text").await.unwrap();
        let second = cache.encode_one("text").await.unwrap();
        assert!(!first.from_cache);
        assert!(!second.from_cache);
        assert_eq!(cache.stats().await.unwrap(), CacheStats::default());
    }

    #[tokio::test]
    async fn clear_and_stats_reflect_disk_state() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("cache");
        let cache = EmbeddingCache::new(Arc::new(MockEmbeddingProvider::new(8)), &root);

        cache.encode_one("one").await.unwrap();
        cache.encode_one("two").await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.num_entries, 2);
        assert!(stats.size_bytes > 0);

        cache.clear().await.unwrap();
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.num_entries, 0);

        // The cache rebuilds its directories on the next write.
        cache.encode_one("three").await.unwrap();
        assert_eq!(cache.stats().await.unwrap().num_entries, 1);
    }
}
