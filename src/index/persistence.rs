//! Two-artifact disk layout for [`FlatIndex`].
//!
//! A persisted index is a directory holding:
//!
//! * `vectors.bin` - the raw vector buffer as little-endian f32, exactly
//!   `num_vectors * dimension * 4` bytes, and
//! * `index_meta.json` - the manifest: dimension, count, the id→metadata
//!   map, and both directions of the id↔position mapping.
//!
//! Loading validates the manifest's dimension against the receiving index
//! before any vector bytes are read.

use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::{FlatIndex, IndexState};
use crate::types::{Metadata, RagError};

const VECTORS_FILE: &str = "vectors.bin";
const MANIFEST_FILE: &str = "index_meta.json";

#[derive(Debug, Serialize, Deserialize)]
struct IndexManifest {
    dimension: usize,
    num_vectors: usize,
    id_to_metadata: FxHashMap<String, Metadata>,
    id_to_position: FxHashMap<String, usize>,
    position_to_id: Vec<String>,
}

impl FlatIndex {
    /// Writes the index to `path` (a directory, created if missing).
    pub async fn persist(&self, path: impl AsRef<Path>) -> Result<(), RagError> {
        let dir = path.as_ref();
        fs::create_dir_all(dir).await?;

        // Snapshot under the read lock, write to disk after releasing it.
        let (blob, manifest) = self.with_state(|state| {
            let mut blob = Vec::with_capacity(state.data.len() * 4);
            for value in &state.data {
                blob.extend_from_slice(&value.to_le_bytes());
            }
            let manifest = IndexManifest {
                dimension: self.dimension(),
                num_vectors: state.position_to_id.len(),
                id_to_metadata: state.id_to_metadata.clone(),
                id_to_position: state.id_to_position.clone(),
                position_to_id: state.position_to_id.clone(),
            };
            (blob, manifest)
        });

        fs::write(dir.join(VECTORS_FILE), &blob).await?;
        fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)?,
        )
        .await?;

        tracing::info!(
            path = %dir.display(),
            num_vectors = manifest.num_vectors,
            "index persisted"
        );
        Ok(())
    }

    /// Replaces this index's contents with a persisted snapshot.
    ///
    /// Fails with [`RagError::NotFound`] when `path` or either artifact is
    /// missing, with [`RagError::Config`] when the stored dimension differs
    /// from this index's dimension (checked before the vector blob is
    /// touched), and with [`RagError::Storage`] when the blob length does
    /// not match the manifest.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<(), RagError> {
        let dir = path.as_ref();
        if !fs::try_exists(dir).await? {
            return Err(RagError::NotFound(dir.display().to_string()));
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        if !fs::try_exists(&manifest_path).await? {
            return Err(RagError::NotFound(manifest_path.display().to_string()));
        }
        let manifest: IndexManifest = serde_json::from_slice(&fs::read(&manifest_path).await?)?;

        if manifest.dimension != self.dimension() {
            return Err(RagError::Config(format!(
                "stored dimension {} does not match index dimension {}",
                manifest.dimension,
                self.dimension()
            )));
        }

        let vectors_path = dir.join(VECTORS_FILE);
        if !fs::try_exists(&vectors_path).await? {
            return Err(RagError::NotFound(vectors_path.display().to_string()));
        }
        let blob = fs::read(&vectors_path).await?;
        let expected = manifest.num_vectors * manifest.dimension * 4;
        if blob.len() != expected {
            return Err(RagError::Storage(format!(
                "vector blob is {} bytes, expected {expected}",
                blob.len()
            )));
        }

        let data: Vec<f32> = blob
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        self.replace_state(IndexState {
            data,
            position_to_id: manifest.position_to_id,
            id_to_position: manifest.id_to_position,
            id_to_metadata: manifest.id_to_metadata,
        });

        tracing::info!(
            path = %dir.display(),
            num_vectors = manifest.num_vectors,
            "index loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_index() -> FlatIndex {
        let index = FlatIndex::new(3).unwrap();
        let mut meta = Metadata::new();
        meta.insert("title".to_string(), json!("Sacred Valley"));
        index
            .add(
                vec![vec![0.1, 0.2, 0.3], vec![0.9, 0.8, 0.7]],
                vec!["first".into(), "second".into()],
                Some(vec![meta, Metadata::new()]),
            )
            .unwrap();
        index
    }

    #[tokio::test]
    async fn round_trip_reproduces_search_results() {
        let dir = tempdir().unwrap();
        let original = sample_index();
        original.persist(dir.path()).await.unwrap();

        let restored = FlatIndex::new(3).unwrap();
        restored.load(dir.path()).await.unwrap();

        assert_eq!(restored.len(), original.len());
        let query = [0.1, 0.2, 0.35];
        let before = original.search(&query, 2, None).unwrap();
        let after = restored.search(&query, 2, None).unwrap();
        assert_eq!(before, after);
        assert_eq!(after[0].metadata["title"], "Sacred Valley");
    }

    #[tokio::test]
    async fn load_rejects_dimension_mismatch_before_vectors() {
        let dir = tempdir().unwrap();
        sample_index().persist(dir.path()).await.unwrap();

        // Remove the blob: a dimension mismatch must be detected first, so
        // the missing blob is never observed.
        fs::remove_file(dir.path().join(VECTORS_FILE)).await.unwrap();

        let wrong = FlatIndex::new(5).unwrap();
        let err = wrong.load(dir.path()).await;
        assert!(matches!(err, Err(RagError::Config(_))));
    }

    #[tokio::test]
    async fn load_missing_path_is_not_found() {
        let dir = tempdir().unwrap();
        let index = FlatIndex::new(3).unwrap();
        let err = index.load(dir.path().join("nowhere")).await;
        assert!(matches!(err, Err(RagError::NotFound(_))));
    }

    #[tokio::test]
    async fn truncated_blob_is_a_storage_error() {
        let dir = tempdir().unwrap();
        sample_index().persist(dir.path()).await.unwrap();
        fs::write(dir.path().join(VECTORS_FILE), b"short")
            .await
            .unwrap();

        let index = FlatIndex::new(3).unwrap();
        let err = index.load(dir.path()).await;
        assert!(matches!(err, Err(RagError::Storage(_))));
    }

    #[tokio::test]
    async fn load_replaces_existing_contents() {
        let dir = tempdir().unwrap();
        sample_index().persist(dir.path()).await.unwrap();

        let index = FlatIndex::new(3).unwrap();
        index
            .add(vec![vec![0.0; 3]], vec!["stale".into()], None)
            .unwrap();
        index.load(dir.path()).await.unwrap();

        assert!(!index.contains("stale"));
        assert!(index.contains("first"));
        assert_eq!(index.len(), 2);
    }
}
