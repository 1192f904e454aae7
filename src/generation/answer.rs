//! RAG answer orchestration: retrieve, format context, generate, cite.
//!
//! Each request walks a fixed sequence (retrieve, format context, generate)
//! and ends either complete, as one [`RagResponse`], or streaming, as an
//! [`AnswerStream`] of fragments that finishes into the same response
//! shape. Retrieval and generation failures are fatal for the request; an
//! empty query fails before any retrieval work.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::llm::{FragmentStream, GenerationParams, StreamChunk, TextGenerator, TokenUsage};
use crate::index::RetrievalResult;
use crate::message::Message;
use crate::retrieval::{RetrieveOptions, SemanticRetriever};
use crate::types::{Metadata, RagError};

/// Context placeholder used when retrieval returns nothing. Generation still
/// runs: grounding failure is surfaced by the model's own answer, not by a
/// short circuit here.
pub const NO_CONTEXT_SENTINEL: &str = "No relevant context found.";

/// Default system instructions for grounded answering.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an assistant that answers questions from the provided source passages.

Follow these rules:
1. Answer from the context. If it does not contain enough information, say so clearly.
2. Cite sources by number when you use them (e.g. \"According to [Source 1]...\").
3. Do not invent information that is not supported by the context.
4. Be concise and direct.";

/// One cited passage in a [`RagResponse`], in retrieval order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// 1-based rank matching the `[Source i]` labels in the prompt.
    pub source_id: usize,
    pub content: String,
    pub score: f32,
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
}

/// A grounded answer with its citations and timing breakdown.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RagResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub query: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub latency_ms: f64,
    pub retrieval_latency_ms: f64,
    pub generation_latency_ms: f64,
}

/// Per-request overrides for [`AnswerGenerator::generate`] and
/// [`AnswerGenerator::stream`].
#[derive(Clone, Debug, Default)]
pub struct AnswerOptions {
    /// Overrides the generator's default `top_k`.
    pub top_k: Option<usize>,
    /// Metadata filters forwarded to retrieval.
    pub filters: Option<Metadata>,
    /// Sampling overrides; fields set here win over the generator defaults.
    pub params: Option<GenerationParams>,
}

impl AnswerOptions {
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: Metadata) -> Self {
        self.filters = Some(filters);
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = Some(params);
        self
    }
}

/// Composes a [`SemanticRetriever`] with a [`TextGenerator`]: the top of the
/// crate's dependency stack.
///
/// # Examples
///
/// ```rust,ignore
/// let generator = AnswerGenerator::new(retriever, llm)
///     .with_top_k(3)
///     .with_system_prompt("Answer strictly from the context.");
/// let response = generator.generate("What are the Nazca Lines?", &AnswerOptions::default()).await?;
/// for source in &response.sources {
///     println!("[{}] {:.2}", source.source_id, source.score);
/// }
/// ```
pub struct AnswerGenerator {
    retriever: Arc<SemanticRetriever>,
    generator: Arc<dyn TextGenerator>,
    top_k: usize,
    include_metadata: bool,
    system_prompt: String,
    params: GenerationParams,
}

impl AnswerGenerator {
    pub fn new(retriever: Arc<SemanticRetriever>, generator: Arc<dyn TextGenerator>) -> Self {
        tracing::info!(model = generator.model_id(), "answer generator initialized");
        Self {
            retriever,
            generator,
            top_k: 5,
            include_metadata: true,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            params: GenerationParams::default(),
        }
    }

    /// Default number of passages retrieved per request.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Whether context headers carry title/chapter/page metadata.
    #[must_use]
    pub fn with_include_metadata(mut self, include_metadata: bool) -> Self {
        self.include_metadata = include_metadata;
        self
    }

    /// Replaces the default system instructions.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Default sampling parameters applied to every request.
    #[must_use]
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Answers `query` in one shot.
    pub async fn generate(
        &self,
        query: &str,
        options: &AnswerOptions,
    ) -> Result<RagResponse, RagError> {
        let total_start = Instant::now();

        let (results, retrieval_latency_ms) = self.retrieve_step(query, options).await?;
        let messages = self.prompt_for(query, &results);
        let params = self.merge_params(options);

        let generation_start = Instant::now();
        let completion = self.generator.generate(&messages, &params).await?;
        let generation_latency_ms = elapsed_ms(generation_start);

        let sources = extract_sources(&results);
        tracing::info!(
            answer_chars = completion.content.len(),
            num_sources = sources.len(),
            retrieval_latency_ms,
            generation_latency_ms,
            "generation completed"
        );

        Ok(RagResponse {
            answer: completion.content,
            sources,
            query: query.to_string(),
            model: completion.model,
            usage: completion.usage,
            latency_ms: elapsed_ms(total_start),
            retrieval_latency_ms,
            generation_latency_ms,
        })
    }

    /// Answers `query` incrementally.
    ///
    /// Retrieval and context formatting run to completion first; the
    /// returned [`AnswerStream`] then yields fragments as the caller pulls
    /// them. Stopping early cancels the remainder; there is no server-side
    /// timeout here.
    pub async fn stream(
        &self,
        query: &str,
        options: &AnswerOptions,
    ) -> Result<AnswerStream, RagError> {
        let total_start = Instant::now();

        let (results, retrieval_latency_ms) = self.retrieve_step(query, options).await?;
        let messages = self.prompt_for(query, &results);
        let params = self.merge_params(options);

        let generation_start = Instant::now();
        let fragments = self.generator.stream(&messages, &params).await?;

        Ok(AnswerStream {
            fragments,
            answer: String::new(),
            sources: extract_sources(&results),
            query: query.to_string(),
            model: self.generator.model_id().to_string(),
            total_start,
            retrieval_latency_ms,
            generation_start,
        })
    }

    async fn retrieve_step(
        &self,
        query: &str,
        options: &AnswerOptions,
    ) -> Result<(Vec<RetrievalResult>, f64), RagError> {
        let k = options.top_k.unwrap_or(self.top_k);
        let mut retrieve_options = RetrieveOptions::default().with_k(k);
        if let Some(filters) = &options.filters {
            retrieve_options = retrieve_options.with_filters(filters.clone());
        }

        let retrieval_start = Instant::now();
        let results = self.retriever.retrieve(query, &retrieve_options).await?;
        let retrieval_latency_ms = elapsed_ms(retrieval_start);
        tracing::debug!(
            num_results = results.len(),
            retrieval_latency_ms,
            "retrieval completed"
        );
        Ok((results, retrieval_latency_ms))
    }

    fn prompt_for(&self, query: &str, results: &[RetrievalResult]) -> Vec<Message> {
        let context = self.format_context(results);
        let user_content = format!(
            "Use the context below to answer the question.\n\n\
             Context:\n{context}\n\n\
             Question: {query}\n\n\
             Cite the sources you rely on by number (e.g. [Source 1]). If the \
             context does not contain enough information to answer, say so."
        );
        vec![
            Message::system(&self.system_prompt),
            Message::user(&user_content),
        ]
    }

    /// Renders each result as a labeled block:
    /// `[Source i] (Title: ..., Page: ...) [Relevance: 0.87]` plus content.
    fn format_context(&self, results: &[RetrievalResult]) -> String {
        if results.is_empty() {
            return NO_CONTEXT_SENTINEL.to_string();
        }

        let mut blocks = Vec::with_capacity(results.len());
        for (idx, result) in results.iter().enumerate() {
            let mut header = format!("[Source {}]", idx + 1);
            if self.include_metadata {
                let mut parts = Vec::new();
                for (label, key) in [("Title", "title"), ("Chapter", "chapter"), ("Page", "page")] {
                    if let Some(value) = result.metadata.get(key) {
                        parts.push(format!("{label}: {}", display_value(value)));
                    }
                }
                if !parts.is_empty() {
                    header.push_str(&format!(" ({})", parts.join(", ")));
                }
            }
            header.push_str(&format!(" [Relevance: {:.2}]", result.score));
            blocks.push(format!("{header}\n{}\n", content_of(result)));
        }
        blocks.join("\n")
    }

    fn merge_params(&self, options: &AnswerOptions) -> GenerationParams {
        let mut params = self.params.clone();
        if let Some(overrides) = &options.params {
            if overrides.temperature.is_some() {
                params.temperature = overrides.temperature;
            }
            if overrides.max_tokens.is_some() {
                params.max_tokens = overrides.max_tokens;
            }
        }
        params
    }
}

/// Incremental answer in progress. The caller pulls fragments with
/// [`next_fragment`](AnswerStream::next_fragment) until `Ok(None)`, then
/// takes the assembled [`RagResponse`] via
/// [`into_response`](AnswerStream::into_response).
pub struct AnswerStream {
    fragments: FragmentStream,
    answer: String,
    sources: Vec<SourceRef>,
    query: String,
    model: String,
    total_start: Instant,
    retrieval_latency_ms: f64,
    generation_start: Instant,
}

impl AnswerStream {
    /// Pulls the next fragment, accumulating its content. Returns `Ok(None)`
    /// once the underlying stream is exhausted; a mid-stream provider error
    /// is fatal for the request.
    pub async fn next_fragment(&mut self) -> Result<Option<StreamChunk>, RagError> {
        match self.fragments.next().await {
            Some(Ok(chunk)) => {
                self.answer.push_str(&chunk.content);
                Ok(Some(chunk))
            }
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    /// Citations for this request, identical to what the non-streaming path
    /// would return. Available before the first fragment arrives.
    pub fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    /// Text accumulated so far.
    pub fn answer_so_far(&self) -> &str {
        &self.answer
    }

    /// Assembles the final response from everything pulled so far.
    ///
    /// Intended to be called after [`next_fragment`](Self::next_fragment)
    /// returns `Ok(None)`; calling earlier (caller-initiated cancellation)
    /// yields a response over the partial answer. Streaming providers do not
    /// report usage, so `usage` is `None`.
    pub fn into_response(self) -> RagResponse {
        RagResponse {
            answer: self.answer,
            sources: self.sources,
            query: self.query,
            model: self.model,
            usage: None,
            latency_ms: elapsed_ms(self.total_start),
            retrieval_latency_ms: self.retrieval_latency_ms,
            generation_latency_ms: elapsed_ms(self.generation_start),
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Chunk content lives in metadata (the retriever stores it under `text`);
/// accept the common aliases for externally-built indexes.
fn content_of(result: &RetrievalResult) -> String {
    for key in ["content", "text", "chunk_text"] {
        if let Some(Value::String(content)) = result.metadata.get(key) {
            return content.clone();
        }
    }
    String::new()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn extract_sources(results: &[RetrievalResult]) -> Vec<SourceRef> {
    results
        .iter()
        .enumerate()
        .map(|(idx, result)| SourceRef {
            source_id: idx + 1,
            content: content_of(result),
            score: result.score,
            metadata: result.metadata.clone(),
            doc_id: Some(result.id.clone()),
        })
        .collect()
}
