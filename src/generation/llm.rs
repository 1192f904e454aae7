//! Text-generation capability interface.
//!
//! Like the embedding side, generation is a narrow injected capability: the
//! orchestrator hands over messages and receives text, either whole
//! ([`TextGenerator::generate`]) or as a finite, non-restartable fragment
//! stream ([`TextGenerator::stream`]). Provider SDK bindings live outside
//! this crate.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::types::RagError;

/// Optional sampling overrides passed through to the provider.
///
/// `None` fields defer to the provider's own defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationParams {
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Token accounting reported by a provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streaming) generation result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub model: String,
    /// Absent when the provider does not report usage (e.g. streaming).
    pub usage: Option<TokenUsage>,
    /// Provider-reported termination reason ("stop", "length", ...).
    pub finish_reason: String,
}

/// One incremental fragment of a streamed generation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Delta text carried by this fragment.
    pub content: String,
    /// Set on the final fragment only.
    pub finish_reason: Option<String>,
}

/// Finite stream of generation fragments. Not restartable: once polled to
/// completion it is exhausted.
pub type FragmentStream = BoxStream<'static, Result<StreamChunk, RagError>>;

/// Capability interface for text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Identifier of the model answering, echoed into responses.
    fn model_id(&self) -> &str;

    /// Generates a complete response for the conversation.
    async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<Completion, RagError>;

    /// Starts an incremental generation. The caller drives consumption;
    /// dropping the stream cancels the remainder.
    async fn stream(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<FragmentStream, RagError>;
}

/// Canned text generator for tests and examples.
///
/// `generate` returns the configured reply verbatim; `stream` yields it
/// word by word with the finish reason on the last fragment, so both paths
/// produce identical final text.
pub struct MockTextGenerator {
    reply: String,
    model_id: String,
}

impl MockTextGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            model_id: "mock-generator".to_string(),
        }
    }

    fn fragments(&self) -> Vec<StreamChunk> {
        let mut fragments: Vec<StreamChunk> = self
            .reply
            .split_inclusive(' ')
            .map(|piece| StreamChunk {
                content: piece.to_string(),
                finish_reason: None,
            })
            .collect();
        if let Some(last) = fragments.last_mut() {
            last.finish_reason = Some("stop".to_string());
        }
        fragments
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate(
        &self,
        messages: &[Message],
        _params: &GenerationParams,
    ) -> Result<Completion, RagError> {
        if messages.is_empty() {
            return Err(RagError::Generation("messages must not be empty".to_string()));
        }
        let prompt_tokens: usize = messages
            .iter()
            .map(|message| message.content.split_whitespace().count())
            .sum();
        let completion_tokens = self.reply.split_whitespace().count();
        Ok(Completion {
            content: self.reply.clone(),
            model: self.model_id.clone(),
            usage: Some(TokenUsage {
                prompt_tokens: prompt_tokens as u32,
                completion_tokens: completion_tokens as u32,
                total_tokens: (prompt_tokens + completion_tokens) as u32,
            }),
            finish_reason: "stop".to_string(),
        })
    }

    async fn stream(
        &self,
        messages: &[Message],
        _params: &GenerationParams,
    ) -> Result<FragmentStream, RagError> {
        if messages.is_empty() {
            return Err(RagError::Generation("messages must not be empty".to_string()));
        }
        let fragments: Vec<Result<StreamChunk, RagError>> =
            self.fragments().into_iter().map(Ok).collect();
        Ok(stream::iter(fragments).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_generate_reports_usage() {
        let generator = MockTextGenerator::new("a short answer");
        let completion = generator
            .generate(&[Message::user("question?")], &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(completion.content, "a short answer");
        assert_eq!(completion.finish_reason, "stop");
        assert_eq!(completion.usage.unwrap().completion_tokens, 3);
    }

    #[tokio::test]
    async fn mock_stream_concatenates_to_full_reply() {
        let generator = MockTextGenerator::new("streamed over several words");
        let mut fragments = generator
            .stream(&[Message::user("question?")], &GenerationParams::default())
            .await
            .unwrap();

        let mut collected = String::new();
        let mut finish = None;
        while let Some(chunk) = fragments.next().await {
            let chunk = chunk.unwrap();
            collected.push_str(&chunk.content);
            if chunk.finish_reason.is_some() {
                finish = chunk.finish_reason;
            }
        }
        assert_eq!(collected, "streamed over several words");
        assert_eq!(finish.as_deref(), Some("stop"));
    }
}
