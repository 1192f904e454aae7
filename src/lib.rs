//! # Ragloom: Retrieval-Augmented Generation Core
//!
//! Ragloom turns raw documents into a searchable vector index and composes
//! retrieval with a text-generation capability to produce grounded, cited
//! answers. It deliberately owns only the core pipeline; embedding and
//! generation models are injected behind narrow capability traits, and the
//! HTTP/UI layers that would sit on top are out of scope.
//!
//! ## Pipeline
//!
//! ```text
//! document text ──► chunking::RecursiveSplitter ──► chunks + metadata
//!                                                        │
//!                                                        ▼
//!                              embedding::EmbeddingCache::encode_batch
//!                                                        │
//!                                                        ▼
//!                                          index::FlatIndex::add
//!
//! query ──► retrieval::SemanticRetriever::retrieve ──► ranked passages
//!                                                        │
//!                                                        ▼
//!                    generation::AnswerGenerator ──► RagResponse
//!                                                  (or AnswerStream)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragloom::chunking::{RecursiveSplitter, SplitterConfig};
//! use ragloom::embedding::EmbeddingCache;
//! use ragloom::generation::{AnswerGenerator, AnswerOptions};
//! use ragloom::index::FlatIndex;
//! use ragloom::retrieval::SemanticRetriever;
//!
//! // Capabilities are injected; any provider satisfying the traits works.
//! let embedder = Arc::new(EmbeddingCache::new(my_embedding_model, "data/cache"));
//! let index = Arc::new(FlatIndex::new(embedder.dimension())?);
//! let retriever = Arc::new(SemanticRetriever::new(embedder, index)?);
//!
//! // Ingest.
//! let splitter = RecursiveSplitter::new(SplitterConfig::default())?;
//! let chunks = splitter.split_with_metadata(&document_text, doc_metadata);
//! retriever.add_chunks(chunks).await?;
//!
//! // Answer.
//! let generator = AnswerGenerator::new(retriever, my_llm);
//! let response = generator.generate("What are the Nazca Lines?", &AnswerOptions::default()).await?;
//! println!("{}", response.answer);
//! ```
//!
//! ## Module Guide
//!
//! - [`chunking`] - recursive character splitting and text cleaning
//! - [`embedding`] - embedding capability trait and content-addressed cache
//! - [`index`] - in-memory exact-L2 vector index with disk persistence
//! - [`retrieval`] - semantic retriever over an embedder and an index
//! - [`generation`] - text-generation capability and answer orchestration
//! - [`message`] - chat message primitive for generation prompts
//! - [`types`] - shared [`Metadata`] and [`RagError`] types

pub mod chunking;
pub mod embedding;
pub mod generation;
pub mod index;
pub mod message;
pub mod retrieval;
pub mod types;

pub use types::{Metadata, RagError};
