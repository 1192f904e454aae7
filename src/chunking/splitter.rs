//! Recursive character splitter with overlap-seeded merging.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{META_CHUNK_ID, META_CHUNK_INDEX, META_CHUNK_LENGTH, META_TOTAL_CHUNKS};
use crate::types::{Metadata, RagError};

/// Configuration for [`RecursiveSplitter`]. All sizes are measured in
/// characters, not bytes, so multi-byte text chunks the same as ASCII.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Maximum characters accumulated into one chunk before it is emitted.
    pub chunk_size: usize,
    /// Characters carried over from the end of each chunk into the next.
    pub chunk_overlap: usize,
    /// Separator hierarchy tried in order; the empty string is the base case
    /// and splits into individual characters.
    pub separators: Vec<String>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 64,
            separators: default_separators(),
        }
    }
}

impl SplitterConfig {
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_chunk_overlap(mut self, chunk_overlap: usize) -> Self {
        self.chunk_overlap = chunk_overlap;
        self
    }

    #[must_use]
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }
}

fn default_separators() -> Vec<String> {
    ["\n\n", "\n", ". ", " ", ""]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// A bounded span of a source document, carrying positional metadata.
///
/// Chunks are immutable once produced; the embedding pipeline consumes them
/// exactly once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text, including any overlap seeded from the previous chunk.
    pub text: String,
    /// Caller metadata plus the reserved positional keys.
    pub metadata: Metadata,
}

/// Splits text by a separator hierarchy, then merges the resulting segments
/// into overlapping chunks of bounded size.
///
/// Splitting recurses: any segment still longer than `chunk_size` after a
/// separator pass is re-split with the next separator, down to the
/// character-level base case. A single indivisible segment longer than
/// `chunk_size` (one giant token) is emitted as its own oversized chunk
/// rather than truncated; this is accepted behavior, so downstream consumers
/// must not assume a hard upper bound of `chunk_size + chunk_overlap` for
/// such input.
///
/// # Examples
///
/// ```
/// use ragloom::chunking::{RecursiveSplitter, SplitterConfig};
///
/// let splitter = RecursiveSplitter::new(
///     SplitterConfig::default().with_chunk_size(20).with_chunk_overlap(4),
/// )
/// .unwrap();
/// let chunks = splitter.split("First paragraph.\n\nSecond paragraph.");
/// assert!(chunks.len() >= 2);
/// ```
#[derive(Clone, Debug)]
pub struct RecursiveSplitter {
    config: SplitterConfig,
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self {
            config: SplitterConfig::default(),
        }
    }
}

impl RecursiveSplitter {
    /// Validates the configuration and builds a splitter.
    ///
    /// Fails with [`RagError::Config`] when `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`; construction is the only place these
    /// are checked, so `split` itself never fails.
    pub fn new(config: SplitterConfig) -> Result<Self, RagError> {
        if config.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be > 0".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be < chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    /// Current configuration.
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Splits `text` into overlapping chunks.
    ///
    /// Empty or whitespace-only input yields an empty vec, not an error.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let segments = self.split_recursive(text, &self.config.separators);
        let chunks = self.merge_segments(segments);
        tracing::debug!(
            input_chars = char_len(text),
            num_chunks = chunks.len(),
            "split completed"
        );
        chunks
    }

    /// Splits `text` and attaches `metadata` to every chunk, together with
    /// the reserved keys `chunk_index`, `total_chunks`, `chunk_id`, and
    /// `chunk_length`.
    pub fn split_with_metadata(&self, text: &str, metadata: Metadata) -> Vec<Chunk> {
        let pieces = self.split(text);
        let total = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(idx, text)| {
                let mut meta = metadata.clone();
                meta.insert(META_CHUNK_INDEX.to_string(), idx.into());
                meta.insert(META_TOTAL_CHUNKS.to_string(), total.into());
                meta.insert(
                    META_CHUNK_ID.to_string(),
                    Uuid::new_v4().to_string().into(),
                );
                meta.insert(META_CHUNK_LENGTH.to_string(), char_len(&text).into());
                Chunk {
                    text,
                    metadata: meta,
                }
            })
            .collect()
    }

    /// Splits many documents, pairing each with its metadata.
    ///
    /// The whole batch fails with [`RagError::InvalidInput`] when `metadatas`
    /// is present but its length differs from `texts`; individual documents
    /// never fail on their own.
    pub fn split_batch(
        &self,
        texts: &[String],
        metadatas: Option<Vec<Metadata>>,
    ) -> Result<Vec<Vec<Chunk>>, RagError> {
        if let Some(metas) = &metadatas {
            if metas.len() != texts.len() {
                return Err(RagError::InvalidInput(format!(
                    "metadatas length ({}) must match texts length ({})",
                    metas.len(),
                    texts.len()
                )));
            }
        }
        let metadatas = metadatas.unwrap_or_else(|| vec![Metadata::new(); texts.len()]);
        let results: Vec<Vec<Chunk>> = texts
            .iter()
            .zip(metadatas)
            .map(|(text, meta)| self.split_with_metadata(text, meta))
            .collect();
        tracing::debug!(
            num_documents = texts.len(),
            total_chunks = results.iter().map(Vec::len).sum::<usize>(),
            "batch split completed"
        );
        Ok(results)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let Some((separator, rest)) = separators.split_first() else {
            // No separators left: the segment is atomic, however long it is.
            return if text.is_empty() {
                Vec::new()
            } else {
                vec![text.to_string()]
            };
        };

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            split_keeping_separator(text, separator)
        };

        let mut segments = Vec::with_capacity(pieces.len());
        for piece in pieces {
            if char_len(&piece) <= self.config.chunk_size {
                segments.push(piece);
            } else {
                segments.extend(self.split_recursive(&piece, rest));
            }
        }
        segments
    }

    /// Accumulates segments until the next one would push past `chunk_size`,
    /// then emits the chunk and seeds the next with its trailing
    /// `chunk_overlap` characters.
    fn merge_segments(&self, segments: Vec<String>) -> Vec<String> {
        let chunk_size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for segment in segments {
            let segment_len = char_len(&segment);
            if current_len + segment_len > chunk_size && !current.is_empty() {
                let seed = char_suffix(&current, overlap).to_string();
                chunks.push(std::mem::take(&mut current));
                current_len = char_len(&seed);
                current = seed;
            }
            current.push_str(&segment);
            current_len += segment_len;
        }

        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

/// Splits on a literal separator, keeping each separator attached to the
/// segment it terminates so concatenating the pieces reproduces the input.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(at) = rest.find(separator) {
        let end = at + separator.len();
        pieces.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s`, or all of `s` when it is shorter.
fn char_suffix(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let len = s.chars().count();
    if len <= n {
        return s;
    }
    match s.char_indices().nth(len - n) {
        Some((byte_idx, _)) => &s[byte_idx..],
        None => s,
    }
}
