//! Document chunking: recursive character splitting plus optional cleaning.
//!
//! ```text
//! raw text ──► TextCleaner (optional) ──► RecursiveSplitter::split
//!                                               │
//!                                               ▼
//!                         chunks (text + chunk_index / total_chunks /
//!                                 chunk_id / chunk_length metadata)
//!                                               │
//!                                               ▼
//!                         embedding::EmbeddingCache::encode_batch
//! ```
//!
//! The splitter is a pure function over text: it carries no IO and no model
//! dependency, so it sits at the bottom of the crate's dependency order.

mod cleaner;
mod splitter;

pub use cleaner::{CleanRule, TextCleaner};
pub use splitter::{Chunk, RecursiveSplitter, SplitterConfig};

/// Reserved metadata key: 0-based position of a chunk within its document.
pub const META_CHUNK_INDEX: &str = "chunk_index";
/// Reserved metadata key: number of chunks produced from the same document.
pub const META_TOTAL_CHUNKS: &str = "total_chunks";
/// Reserved metadata key: globally unique chunk identifier (UUID v4).
pub const META_CHUNK_ID: &str = "chunk_id";
/// Reserved metadata key: chunk length in characters.
pub const META_CHUNK_LENGTH: &str = "chunk_length";
