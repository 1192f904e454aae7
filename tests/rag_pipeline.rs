//! End-to-end pipeline tests: clean, chunk, embed through the cache, index,
//! retrieve, and generate, all against the crate's deterministic mock
//! capabilities.

use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use ragloom::Metadata;
use ragloom::chunking::{CleanRule, RecursiveSplitter, SplitterConfig, TextCleaner};
use ragloom::embedding::{EmbeddingCache, EmbeddingProvider, MockEmbeddingProvider};
use ragloom::generation::{AnswerGenerator, AnswerOptions, MockTextGenerator};
use ragloom::index::FlatIndex;
use ragloom::retrieval::{RetrieveOptions, SemanticRetriever};

const DIM: usize = 16;

const DOCUMENT: &str = "\
The stone terraces climb the mountainside in wide steps.\n\n\
Farmers once grew maize and potatoes on the upper levels.\n\n\
A spring-fed channel still carries water through the lower walls.";

fn doc_metadata() -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("title".to_string(), json!("Terraces"));
    meta.insert("page".to_string(), json!(7));
    meta
}

async fn build_retriever(cache_dir: &std::path::Path) -> Arc<SemanticRetriever> {
    let cache = Arc::new(EmbeddingCache::new(
        Arc::new(MockEmbeddingProvider::new(DIM)),
        cache_dir,
    ));
    let index = Arc::new(FlatIndex::new(DIM).unwrap());
    Arc::new(SemanticRetriever::new(cache, index).unwrap())
}

fn build_splitter() -> RecursiveSplitter {
    RecursiveSplitter::new(
        SplitterConfig::default()
            .with_chunk_size(80)
            .with_chunk_overlap(16),
    )
    .unwrap()
}

#[tokio::test]
async fn ingest_then_answer_with_citations() {
    let dir = tempdir().unwrap();
    let retriever = build_retriever(&dir.path().join("cache")).await;

    let cleaner = TextCleaner::new(vec![CleanRule::NormalizeNewlines, CleanRule::Trim]);
    let cleaned = cleaner.clean(DOCUMENT).unwrap();

    let chunks = build_splitter().split_with_metadata(&cleaned, doc_metadata());
    assert!(chunks.len() >= 2, "document should produce several chunks");
    retriever.add_chunks(chunks).await.unwrap();

    let llm = Arc::new(MockTextGenerator::new(
        "Water still flows through the terraces [Source 1].",
    ));
    let generator = AnswerGenerator::new(retriever, llm).with_top_k(2);

    let response = generator
        .generate(
            "Does water still flow through the terraces?",
            &AnswerOptions::default(),
        )
        .await
        .unwrap();

    assert!(response.answer.contains("[Source 1]"));
    assert_eq!(response.sources.len(), 2);
    for (rank, source) in response.sources.iter().enumerate() {
        assert_eq!(source.source_id, rank + 1);
        assert!(!source.content.is_empty());
        assert_eq!(source.metadata["title"], "Terraces");
    }
}

#[tokio::test]
async fn streaming_answer_matches_blocking_answer() {
    let dir = tempdir().unwrap();
    let retriever = build_retriever(&dir.path().join("cache")).await;
    let chunks = build_splitter().split_with_metadata(DOCUMENT, doc_metadata());
    retriever.add_chunks(chunks).await.unwrap();

    let llm = Arc::new(MockTextGenerator::new(
        "The channel carries spring water [Source 1] to the walls.",
    ));
    let generator = AnswerGenerator::new(retriever, llm);

    let query = "What carries water through the walls?";
    let blocking = generator
        .generate(query, &AnswerOptions::default())
        .await
        .unwrap();

    let mut stream = generator
        .stream(query, &AnswerOptions::default())
        .await
        .unwrap();
    let mut fragments = Vec::new();
    while let Some(chunk) = stream.next_fragment().await.unwrap() {
        fragments.push(chunk.content);
    }
    let streamed = stream.into_response();

    assert!(fragments.len() > 1);
    assert_eq!(fragments.concat(), streamed.answer);
    assert_eq!(streamed.answer, blocking.answer);
    assert_eq!(streamed.sources, blocking.sources);
}

#[tokio::test]
async fn reingesting_the_same_document_hits_the_cache() {
    let dir = tempdir().unwrap();
    let cache = EmbeddingCache::new(
        Arc::new(MockEmbeddingProvider::new(DIM)),
        dir.path().join("cache"),
    );

    let chunks = build_splitter().split_with_metadata(DOCUMENT, Metadata::new());
    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();

    let (first_vectors, first_stats) = cache.encode_batch(&texts).await.unwrap();
    assert_eq!(first_stats.cached, 0);
    assert_eq!(first_stats.computed, texts.len());

    let (second_vectors, second_stats) = cache.encode_batch(&texts).await.unwrap();
    assert_eq!(second_stats.cached, texts.len());
    assert_eq!(second_stats.computed, 0);
    assert_eq!(first_vectors, second_vectors);
}

#[tokio::test]
async fn persisted_index_answers_identically_after_reload() {
    let dir = tempdir().unwrap();
    let retriever = build_retriever(&dir.path().join("cache")).await;
    let chunks = build_splitter().split_with_metadata(DOCUMENT, doc_metadata());
    retriever.add_chunks(chunks).await.unwrap();

    let index_dir = dir.path().join("index");
    retriever.index().persist(&index_dir).await.unwrap();

    // A fresh process: new index, same persisted state.
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::new(DIM));
    let restored_index = Arc::new(FlatIndex::new(DIM).unwrap());
    restored_index.load(&index_dir).await.unwrap();
    let restored = SemanticRetriever::new(embedder, restored_index).unwrap();

    let options = RetrieveOptions::default().with_k(3);
    let query = "maize and potatoes on the upper levels";
    let before = retriever.retrieve(query, &options).await.unwrap();
    let after = restored.retrieve(query, &options).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn concurrent_searches_run_against_a_live_index() {
    let dir = tempdir().unwrap();
    let retriever = build_retriever(&dir.path().join("cache")).await;
    let chunks = build_splitter().split_with_metadata(DOCUMENT, doc_metadata());
    retriever.add_chunks(chunks).await.unwrap();

    // Readers in parallel with a writer: the index serializes internally,
    // every task must complete without error.
    let mut tasks = Vec::new();
    for worker in 0..8 {
        let retriever = Arc::clone(&retriever);
        tasks.push(tokio::spawn(async move {
            if worker % 4 == 0 {
                let text = format!("extra document number {worker}");
                retriever
                    .add_documents(&[text], &[format!("extra-{worker}")], None)
                    .await
                    .unwrap();
            } else {
                let results = retriever
                    .retrieve(
                        "water through the lower walls",
                        &RetrieveOptions::default().with_k(2),
                    )
                    .await
                    .unwrap();
                assert!(!results.is_empty());
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}
