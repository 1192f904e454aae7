//! Exact nearest-neighbor vector index with metadata filtering.
//!
//! [`FlatIndex`] stores vectors row-major in one contiguous buffer and scans
//! all of them on every search (exact L2, no approximation). It is the
//! shared mutable resource of the crate: interior locking gives writers
//! exclusive access while readers run in parallel with each other, which is
//! required because [`FlatIndex::delete`] rebuilds the entire backing store.
//!
//! Distances are **squared** Euclidean; the index imposes no normalization.
//! Callers wanting cosine ranking must normalize vectors before insertion.

mod persistence;

use std::cmp::Ordering;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::types::{Metadata, RagError};

/// Over-fetch multiplier used when a metadata filter is present, so that
/// post-filtering rarely under-fills the requested `k`.
const FILTER_OVERFETCH: usize = 10;

/// One ranked search hit.
///
/// `score` is the derived transform `1 / (1 + distance)`: monotonically
/// decreasing in distance, in `(0, 1]`, but with no normalization guarantee
/// across differently-scaled embedding spaces. It exists so callers can set
/// stable `min_score` thresholds; treat it as documented behavior, not a
/// calibrated probability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: String,
    pub score: f32,
    /// Raw squared-L2 distance.
    pub distance: f32,
    pub metadata: Metadata,
}

/// Snapshot counters for an index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub num_vectors: usize,
    pub dimension: usize,
    /// Rough in-memory footprint: vector buffer plus serialized metadata.
    pub memory_bytes: usize,
}

#[derive(Debug, Default)]
struct IndexState {
    /// Row-major vector storage, `num_vectors * dimension` floats.
    data: Vec<f32>,
    /// Dense position → id. Positions are reassigned on delete.
    position_to_id: Vec<String>,
    id_to_position: FxHashMap<String, usize>,
    id_to_metadata: FxHashMap<String, Metadata>,
}

/// In-memory exact-L2 vector index with optional disk persistence.
///
/// # Examples
///
/// ```
/// use ragloom::index::FlatIndex;
///
/// let index = FlatIndex::new(4).unwrap();
/// index
///     .add(
///         vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
///         vec!["a".into(), "b".into()],
///         None,
///     )
///     .unwrap();
/// let hits = index.search(&[1.0, 0.0, 0.0, 0.0], 1, None).unwrap();
/// assert_eq!(hits[0].id, "a");
/// ```
pub struct FlatIndex {
    dimension: usize,
    state: RwLock<IndexState>,
}

impl FlatIndex {
    /// Creates an empty index for vectors of length `dimension`.
    ///
    /// Fails with [`RagError::Config`] when `dimension == 0`; the dimension
    /// is fixed for the index's lifetime.
    pub fn new(dimension: usize) -> Result<Self, RagError> {
        if dimension == 0 {
            return Err(RagError::Config("dimension must be > 0".to_string()));
        }
        Ok(Self {
            dimension,
            state: RwLock::new(IndexState::default()),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.state.read().position_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().id_to_position.contains_key(id)
    }

    /// Appends vectors under caller-supplied unique ids.
    ///
    /// All-or-nothing: every validation (lengths, dimensions, duplicate ids
    /// against the index and within the batch) runs before the first vector
    /// is stored, so a failed call leaves the index untouched.
    pub fn add(
        &self,
        vectors: Vec<Vec<f32>>,
        ids: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
    ) -> Result<(), RagError> {
        if vectors.len() != ids.len() {
            return Err(RagError::InvalidInput(format!(
                "ids length ({}) must match vectors length ({})",
                ids.len(),
                vectors.len()
            )));
        }
        if let Some(metas) = &metadatas {
            if metas.len() != vectors.len() {
                return Err(RagError::InvalidInput(format!(
                    "metadatas length ({}) must match vectors length ({})",
                    metas.len(),
                    vectors.len()
                )));
            }
        }
        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(RagError::Dimension {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }

        let mut state = self.state.write();
        {
            // Checked against the index and within the batch before any row
            // is stored, so a failed add leaves the index untouched.
            let mut batch_ids: FxHashSet<&str> = FxHashSet::default();
            for id in &ids {
                if state.id_to_position.contains_key(id) || !batch_ids.insert(id.as_str()) {
                    return Err(RagError::DuplicateId(id.clone()));
                }
            }
        }

        let metadatas = metadatas.unwrap_or_else(|| vec![Metadata::new(); ids.len()]);
        for ((vector, id), metadata) in vectors.into_iter().zip(ids).zip(metadatas) {
            let position = state.position_to_id.len();
            state.data.extend_from_slice(&vector);
            state.id_to_position.insert(id.clone(), position);
            state.id_to_metadata.insert(id.clone(), metadata);
            state.position_to_id.push(id);
        }
        tracing::debug!(total = state.position_to_id.len(), "vectors added");
        Ok(())
    }

    /// Returns up to `k` results sorted by ascending distance.
    ///
    /// With `filters`, hits are kept only when every filter key/value pair
    /// equals the stored metadata exactly; filtering happens over an
    /// over-fetched candidate window (`k ×` [`FILTER_OVERFETCH`], capped at
    /// the index size) before truncating to `k`. An empty index returns an
    /// empty vec.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        filters: Option<&Metadata>,
    ) -> Result<Vec<RetrievalResult>, RagError> {
        if query.len() != self.dimension {
            return Err(RagError::Dimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let state = self.state.read();
        let count = state.position_to_id.len();
        if count == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let fetch = if filters.is_some() {
            k.saturating_mul(FILTER_OVERFETCH).min(count)
        } else {
            k.min(count)
        };

        let mut scored: Vec<(usize, f32)> = (0..count)
            .map(|pos| {
                let row = &state.data[pos * self.dimension..(pos + 1) * self.dimension];
                (pos, squared_l2(query, row))
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        let mut results = Vec::with_capacity(k.min(fetch));
        for (pos, distance) in scored.into_iter().take(fetch) {
            let id = &state.position_to_id[pos];
            let metadata = state.id_to_metadata.get(id).cloned().unwrap_or_default();
            if let Some(filters) = filters {
                if !matches_filters(&metadata, filters) {
                    continue;
                }
            }
            results.push(RetrievalResult {
                id: id.clone(),
                score: 1.0 / (1.0 + distance),
                distance,
                metadata,
            });
            if results.len() >= k {
                break;
            }
        }
        Ok(results)
    }

    /// Deletes the given ids, returning how many were actually removed.
    /// Unknown ids are silently ignored.
    ///
    /// The backing store has no per-row delete, so this reconstructs every
    /// surviving vector and re-adds it: O(n) per call and it reassigns all
    /// positions, which makes frequent deletion a hot-path hazard. Id-based
    /// lookups remain valid throughout.
    pub fn delete(&self, ids: &[String]) -> usize {
        let mut state = self.state.write();
        let targets: FxHashSet<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| state.id_to_position.contains_key(*id))
            .collect();
        if targets.is_empty() {
            return 0;
        }
        let deleted = targets.len();

        let IndexState {
            data,
            position_to_id,
            id_to_position: _,
            mut id_to_metadata,
        } = std::mem::take(&mut *state);

        for (pos, id) in position_to_id.into_iter().enumerate() {
            if targets.contains(id.as_str()) {
                continue;
            }
            let new_pos = state.position_to_id.len();
            state
                .data
                .extend_from_slice(&data[pos * self.dimension..(pos + 1) * self.dimension]);
            state.id_to_position.insert(id.clone(), new_pos);
            if let Some(meta) = id_to_metadata.remove(&id) {
                state.id_to_metadata.insert(id.clone(), meta);
            }
            state.position_to_id.push(id);
        }

        tracing::debug!(
            deleted,
            remaining = state.position_to_id.len(),
            "index rebuilt after delete"
        );
        deleted
    }

    /// Removes all vectors and metadata.
    pub fn clear(&self) {
        *self.state.write() = IndexState::default();
    }

    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        let vector_bytes = state.data.len() * size_of::<f32>();
        let metadata_bytes: usize = state
            .id_to_metadata
            .iter()
            .map(|(id, meta)| {
                id.len()
                    + serde_json::to_string(meta)
                        .map(|rendered| rendered.len())
                        .unwrap_or(0)
            })
            .sum();
        IndexStats {
            num_vectors: state.position_to_id.len(),
            dimension: self.dimension,
            memory_bytes: vector_bytes + metadata_bytes,
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&IndexState) -> R) -> R {
        f(&self.state.read())
    }

    fn replace_state(&self, new_state: IndexState) {
        *self.state.write() = new_state;
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn matches_filters(metadata: &Metadata, filters: &Metadata) -> bool {
    filters
        .iter()
        .all(|(key, value)| metadata.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, serde_json::Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn seeded_index() -> FlatIndex {
        let index = FlatIndex::new(4).unwrap();
        index
            .add(
                vec![
                    vec![1.0, 0.0, 0.0, 0.0],
                    vec![0.0, 1.0, 0.0, 0.0],
                    vec![1.0, 0.0, 0.0, 0.01],
                ],
                vec!["a".into(), "b".into(), "c".into()],
                Some(vec![
                    meta(&[("page", json!(1))]),
                    meta(&[("page", json!(2))]),
                    meta(&[("page", json!(1))]),
                ]),
            )
            .unwrap();
        index
    }

    #[test]
    fn rejects_zero_dimension() {
        assert!(matches!(FlatIndex::new(0), Err(RagError::Config(_))));
    }

    #[test]
    fn nearest_neighbors_rank_by_distance() {
        let index = seeded_index();
        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "c");
        assert!(results[0].score > results[1].score);
        assert!(results[0].distance <= results[1].distance);
    }

    #[test]
    fn self_similarity_is_near_perfect() {
        let index = seeded_index();
        let results = index.search(&[0.0, 1.0, 0.0, 0.0], 1, None).unwrap();
        assert_eq!(results[0].id, "b");
        assert!(results[0].score > 0.99);
        assert!(results[0].distance.abs() < 1e-6);
    }

    #[test]
    fn empty_index_returns_no_results() {
        let index = FlatIndex::new(4).unwrap();
        assert!(index.search(&[0.0; 4], 5, None).unwrap().is_empty());
    }

    #[test]
    fn query_dimension_mismatch_is_rejected() {
        let index = seeded_index();
        let err = index.search(&[1.0, 0.0], 1, None);
        assert!(matches!(err, Err(RagError::Dimension { expected: 4, actual: 2 })));
    }

    #[test]
    fn add_dimension_mismatch_is_rejected() {
        let index = FlatIndex::new(4).unwrap();
        let err = index.add(vec![vec![1.0; 3]], vec!["a".into()], None);
        assert!(matches!(err, Err(RagError::Dimension { expected: 4, actual: 3 })));
        assert!(index.is_empty());
    }

    #[test]
    fn duplicate_id_leaves_index_unchanged() {
        let index = seeded_index();
        let err = index.add(
            vec![vec![0.0; 4], vec![0.5; 4]],
            vec!["fresh".into(), "a".into()],
            None,
        );
        assert!(matches!(err, Err(RagError::DuplicateId(id)) if id == "a"));
        // Atomic: the valid first row was not inserted either.
        assert_eq!(index.len(), 3);
        assert!(!index.contains("fresh"));
    }

    #[test]
    fn duplicate_id_within_batch_is_rejected() {
        let index = FlatIndex::new(4).unwrap();
        let err = index.add(
            vec![vec![0.0; 4], vec![1.0; 4]],
            vec!["x".into(), "x".into()],
            None,
        );
        assert!(matches!(err, Err(RagError::DuplicateId(_))));
        assert!(index.is_empty());
    }

    #[test]
    fn filters_match_exactly_and_never_add_results() {
        let index = seeded_index();
        let filtered = index
            .search(&[1.0, 0.0, 0.0, 0.0], 3, Some(&meta(&[("page", json!(1))])))
            .unwrap();
        assert_eq!(filtered.len(), 2);
        for result in &filtered {
            assert_eq!(result.metadata["page"], 1);
        }

        let unfiltered = index.search(&[1.0, 0.0, 0.0, 0.0], 3, None).unwrap();
        assert!(unfiltered.len() >= filtered.len());
    }

    #[test]
    fn filter_with_no_matches_is_empty_not_error() {
        let index = seeded_index();
        let results = index
            .search(&[1.0, 0.0, 0.0, 0.0], 3, Some(&meta(&[("page", json!(9))])))
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn delete_ignores_unknown_ids_and_rebuilds() {
        let index = seeded_index();
        let removed = index.delete(&["b".to_string(), "ghost".to_string()]);
        assert_eq!(removed, 1);
        assert_eq!(index.len(), 2);
        assert!(!index.contains("b"));

        // Survivors remain searchable with their metadata after the rebuild.
        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(results[0].id, "a");
        assert_eq!(results[0].metadata["page"], 1);
    }

    #[test]
    fn deleting_everything_equals_clear() {
        let index = seeded_index();
        let removed = index.delete(&["a".into(), "b".into(), "c".into()]);
        assert_eq!(removed, 3);
        assert!(index.is_empty());
        assert!(index.search(&[0.0; 4], 1, None).unwrap().is_empty());
    }

    #[test]
    fn stats_track_size_and_dimension() {
        let index = seeded_index();
        let stats = index.stats();
        assert_eq!(stats.num_vectors, 3);
        assert_eq!(stats.dimension, 4);
        assert!(stats.memory_bytes >= 3 * 4 * size_of::<f32>());

        index.clear();
        assert_eq!(index.stats().num_vectors, 0);
    }

    #[test]
    fn k_zero_returns_nothing() {
        let index = seeded_index();
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 0, None).unwrap().is_empty());
    }
}
