//! Answer generation: the text-generation capability interface and the RAG
//! orchestrator composing it with retrieval.

mod answer;
mod llm;

pub use answer::{
    AnswerGenerator, AnswerOptions, AnswerStream, DEFAULT_SYSTEM_PROMPT, NO_CONTEXT_SENTINEL,
    RagResponse, SourceRef,
};
pub use llm::{
    Completion, FragmentStream, GenerationParams, MockTextGenerator, StreamChunk, TextGenerator,
    TokenUsage,
};
