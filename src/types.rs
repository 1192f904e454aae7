//! Shared metadata and error types used across the crate.

use serde_json::Value;

/// Open, insertion-ordered metadata map attached to chunks, indexed vectors,
/// and retrieval results.
///
/// Reserved keys written by the chunker (`chunk_index`, `total_chunks`,
/// `chunk_id`, `chunk_length`) are exported as constants from
/// [`crate::chunking`]; everything else is caller-defined.
pub type Metadata = serde_json::Map<String, Value>;

/// Crate-wide error type.
///
/// Validation failures (bad construction parameters, shape mismatches,
/// duplicate ids, empty queries) are fatal per call and never retried
/// internally. Recoverable conditions are deliberately absent from this enum:
/// a corrupt embedding-cache entry is handled as a cache miss and recomputed,
/// and a failed query inside [`batch_retrieve`](crate::retrieval::SemanticRetriever::batch_retrieve)
/// yields an empty result slot instead of surfacing here.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Invalid construction parameters (chunker sizes, index dimension,
    /// persisted-artifact dimension mismatch).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A vector's length does not match the configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    /// The caller reused an id already present in the index.
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// Query text was empty or whitespace-only.
    #[error("query must not be empty")]
    EmptyQuery,

    /// Batch arguments disagree in length, or an input is structurally
    /// malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A persisted artifact is missing at the given path.
    #[error("not found: {0}")]
    NotFound(String),

    /// The embedding capability failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The text-generation capability failed.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Persistence-layer failure beyond plain IO (truncated blob, bad
    /// manifest shape).
    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
