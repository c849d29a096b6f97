//! End-to-end tests for ingestion and question answering.
//!
//! The embedding and generation services are in-process fakes, so these
//! tests never touch the network. They count their calls, which lets the
//! tests check that an empty corpus short-circuits both services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rag_harness::config::Config;
use rag_harness::embedding::{DisabledEmbedder, HashingEmbedder};
use rag_harness::pipeline::{Answer, IngestOutcome, PipelineSettings, RagPipeline, Stage};
use rag_harness::rag_core::embedding::Embedder;
use rag_harness::rag_core::generation::Generator;
use rag_harness::rag_core::index::DistanceMetric;
use rag_harness::rag_core::models::{RawDocument, SourceFormat};
use rag_harness::rag_core::retrieve::RetrievalPolicy;
use rag_harness::RagError;

// ─── Fakes ──────────────────────────────────────────────────────────

/// One dimension per vocabulary word, counting occurrences.
struct VocabEmbedder {
    vocab: Vec<&'static str>,
    calls: AtomicUsize,
}

impl VocabEmbedder {
    fn new(vocab: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            vocab: vocab.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for VocabEmbedder {
    fn model_name(&self) -> &str {
        "vocab"
    }

    fn dims(&self) -> Option<usize> {
        Some(self.vocab.len())
    }

    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(batch
            .iter()
            .map(|text| {
                let lowered = text.to_lowercase();
                let tokens: Vec<&str> = lowered
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                    .collect();
                self.vocab
                    .iter()
                    .map(|word| tokens.iter().filter(|t| *t == word).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// Fails every call, or every call after the first `ok_calls`.
struct FailingEmbedder {
    inner: HashingEmbedder,
    ok_calls: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    fn dims(&self) -> Option<usize> {
        self.inner.dims()
    }

    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n >= self.ok_calls {
            return Err(RagError::embedding(Stage::Embedding, "503 service unavailable"));
        }
        self.inner.embed(batch).await
    }
}

/// Embeds "doc N" as `[N]`, finishing later batches first.
struct SlowNumberEmbedder;

#[async_trait]
impl Embedder for SlowNumberEmbedder {
    fn model_name(&self) -> &str {
        "numbers"
    }

    fn dims(&self) -> Option<usize> {
        Some(1)
    }

    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let numbers: Vec<f32> = batch
            .iter()
            .map(|t| {
                t.trim_end_matches('.')
                    .rsplit(' ')
                    .next()
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(0.0)
            })
            .collect();
        let first = numbers.first().copied().unwrap_or(0.0);
        tokio::time::sleep(Duration::from_millis((20.0 - first).max(0.0) as u64 * 2)).await;
        Ok(numbers.into_iter().map(|n| vec![n]).collect())
    }
}

/// Returns `dims_per_call[n]`-dimensional vectors on call `n`, repeating
/// the last entry once the list runs out.
struct ShiftingDimsEmbedder {
    dims_per_call: Vec<usize>,
    calls: AtomicUsize,
}

impl ShiftingDimsEmbedder {
    fn new(dims_per_call: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            dims_per_call: dims_per_call.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Embedder for ShiftingDimsEmbedder {
    fn model_name(&self) -> &str {
        "shifting"
    }

    fn dims(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let last = self.dims_per_call.len() - 1;
        let dims = self.dims_per_call[n.min(last)];
        Ok(batch.iter().map(|_| vec![1.0; dims]).collect())
    }
}

struct RecordingGenerator {
    reply: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(reason.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().map_err(RagError::generation)
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

const QUESTION: &str = "Which city is the economic center?";

fn three_documents() -> Vec<RawDocument> {
    vec![
        RawDocument::plain("ai", "AI is changing the world."),
        RawDocument::plain("city", "Ho Chi Minh City is the economic center of Vietnam."),
        RawDocument::plain("dish", "Pho is a famous Vietnamese dish."),
    ]
}

fn vocab() -> Arc<VocabEmbedder> {
    VocabEmbedder::new(&[
        "city", "economic", "center", "hub", "pho", "dish", "ai", "world",
    ])
}

fn pipeline(
    settings: PipelineSettings,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
) -> RagPipeline {
    RagPipeline::new(settings, embedder, generator).unwrap()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_city_passage_ranks_first() {
    let p = pipeline(
        PipelineSettings::default(),
        vocab(),
        RecordingGenerator::answering("unused"),
    );
    let corpus = p.ingest(three_documents()).await.unwrap().into_corpus().unwrap();
    assert_eq!(corpus.passage_count(), 3);

    let hits = p.retrieve(&corpus, QUESTION).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].passage.source_id, "city");
    assert_eq!(hits[0].score, 0.0);
    assert!(hits.windows(2).all(|w| w[0].score <= w[1].score));
}

#[tokio::test]
async fn test_city_passage_ranks_first_with_hashing_embedder() {
    for metric in [DistanceMetric::L2, DistanceMetric::Cosine] {
        let settings = PipelineSettings {
            metric,
            ..Default::default()
        };
        let p = pipeline(
            settings,
            Arc::new(HashingEmbedder::new(256).unwrap()),
            RecordingGenerator::answering("unused"),
        );
        let corpus = p.ingest(three_documents()).await.unwrap().into_corpus().unwrap();
        let hits = p.retrieve(&corpus, QUESTION).await.unwrap();
        assert_eq!(hits[0].passage.source_id, "city", "metric {:?}", metric);
    }
}

#[tokio::test]
async fn test_ask_builds_grounded_prompt_and_lists_sources() {
    let generator = RecordingGenerator::answering("Ho Chi Minh City.");
    let settings = PipelineSettings {
        k: 2,
        ..Default::default()
    };
    let p = pipeline(settings, vocab(), generator.clone());
    let corpus = p.ingest(three_documents()).await.unwrap().into_corpus().unwrap();

    let answer = p.ask(&corpus, QUESTION).await;
    let Answer::Answered { text, sources } = &answer else {
        panic!("expected an answer, got {:?}", answer);
    };
    assert_eq!(text, "Ho Chi Minh City.");
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].passage.source_id, "city");

    let prompt = generator.last_prompt();
    assert!(prompt.contains("ho chi minh city is the economic center of vietnam."));
    assert!(prompt.contains(QUESTION));
    assert!(prompt.contains("could not find the answer"));
    assert!(prompt.find("Context:").unwrap() < prompt.find(QUESTION).unwrap());

    let rendered = answer.render();
    assert!(rendered.starts_with("Ho Chi Minh City.\n\nSources:\n[1] city #0"));
}

#[tokio::test]
async fn test_empty_corpus_calls_no_service() {
    let embedder = vocab();
    let generator = RecordingGenerator::answering("unused");
    let p = pipeline(
        PipelineSettings::default(),
        embedder.clone(),
        generator.clone(),
    );

    let documents = vec![
        RawDocument::plain("empty", ""),
        RawDocument::plain("blank", "   \n\t "),
        RawDocument::plain("markup", "<p></p> https://example.com"),
    ];
    let answer = p.answer(documents, QUESTION).await;

    assert!(matches!(answer, Answer::NoData));
    assert_eq!(embedder.calls(), 0);
    assert_eq!(generator.calls(), 0);
    assert!(matches!(
        p.ingest(Vec::new()).await.unwrap(),
        IngestOutcome::NoData
    ));
}

#[tokio::test]
async fn test_generation_failure_is_reported_not_raised() {
    let generator = RecordingGenerator::failing("429 quota exceeded");
    let p = pipeline(PipelineSettings::default(), vocab(), generator.clone());

    let answer = p.answer(three_documents(), QUESTION).await;
    match &answer {
        Answer::Failed { stage, message } => {
            assert_eq!(*stage, Stage::Generating);
            assert!(message.contains("quota exceeded"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(answer.render().contains("generating"));
    assert_eq!(generator.calls(), 1, "generation is not retried");
}

#[tokio::test]
async fn test_disabled_generation_from_default_config() {
    let p = RagPipeline::from_config(&Config::default()).unwrap();
    let answer = p.answer(three_documents(), QUESTION).await;
    assert!(matches!(
        answer,
        Answer::Failed {
            stage: Stage::Generating,
            ..
        }
    ));
}

#[tokio::test]
async fn test_embedding_failure_aborts_ingest() {
    let embedder = Arc::new(FailingEmbedder {
        inner: HashingEmbedder::new(32).unwrap(),
        ok_calls: 0,
        calls: AtomicUsize::new(0),
    });
    let p = pipeline(
        PipelineSettings::default(),
        embedder,
        RecordingGenerator::answering("unused"),
    );
    let err = p.ingest(three_documents()).await.unwrap_err();
    assert!(matches!(
        err,
        RagError::EmbeddingService {
            stage: Stage::Embedding,
            ..
        }
    ));
}

#[tokio::test]
async fn test_query_embedding_failure_names_retrieval_stage() {
    let embedder = Arc::new(FailingEmbedder {
        inner: HashingEmbedder::new(32).unwrap(),
        ok_calls: 1,
        calls: AtomicUsize::new(0),
    });
    let generator = RecordingGenerator::answering("unused");
    let p = pipeline(PipelineSettings::default(), embedder, generator.clone());

    let corpus = p.ingest(three_documents()).await.unwrap().into_corpus().unwrap();
    let answer = p.ask(&corpus, QUESTION).await;
    assert!(matches!(
        answer,
        Answer::Failed {
            stage: Stage::Retrieving,
            ..
        }
    ));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_query_dimension_mismatch_fails_during_retrieval() {
    let generator = RecordingGenerator::answering("unused");
    let p = pipeline(
        PipelineSettings::default(),
        ShiftingDimsEmbedder::new(&[3, 2]),
        generator.clone(),
    );
    let corpus = p.ingest(three_documents()).await.unwrap().into_corpus().unwrap();

    let answer = p.ask(&corpus, QUESTION).await;
    match &answer {
        Answer::Failed { stage, message } => {
            assert_eq!(*stage, Stage::Retrieving);
            assert!(message.starts_with("configuration error"), "{}", message);
            assert!(message.contains("dimension"), "{}", message);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(answer.render().contains("failed during retrieving"));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_mixed_dimensions_across_batches_fail_indexing() {
    let settings = PipelineSettings {
        batch_size: 1,
        concurrency: 1,
        ..Default::default()
    };
    let p = pipeline(
        settings,
        ShiftingDimsEmbedder::new(&[3, 2]),
        RecordingGenerator::answering("unused"),
    );
    let err = p.ingest(three_documents()).await.unwrap_err();
    assert!(matches!(
        err,
        RagError::Configuration {
            stage: Some(Stage::Indexing),
            ..
        }
    ));
    assert_eq!(err.stage(), Stage::Indexing);
}

#[tokio::test]
async fn test_disabled_embedder_fails_during_embedding() {
    let p = pipeline(
        PipelineSettings::default(),
        Arc::new(DisabledEmbedder),
        RecordingGenerator::answering("unused"),
    );
    let answer = p.answer(three_documents(), QUESTION).await;
    assert!(matches!(
        answer,
        Answer::Failed {
            stage: Stage::Embedding,
            ..
        }
    ));
}

#[tokio::test]
async fn test_mmr_prefers_novel_passage_over_near_duplicate() {
    let documents = vec![
        RawDocument::plain("a", "City economic center."),
        RawDocument::plain("b", "City economic center hub."),
        RawDocument::plain("c", "City dish."),
    ];
    let question = "city economic center";

    let top_k = pipeline(
        PipelineSettings {
            k: 2,
            ..Default::default()
        },
        vocab(),
        RecordingGenerator::answering("unused"),
    );
    let corpus = top_k.ingest(documents.clone()).await.unwrap().into_corpus().unwrap();
    let ids: Vec<String> = top_k
        .retrieve(&corpus, question)
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.passage.source_id)
        .collect();
    assert_eq!(ids, ["a", "b"]);

    let mmr = pipeline(
        PipelineSettings {
            k: 2,
            policy: RetrievalPolicy::Mmr {
                fetch_k: 3,
                lambda_mult: 0.3,
            },
            ..Default::default()
        },
        vocab(),
        RecordingGenerator::answering("unused"),
    );
    let hits = mmr.retrieve(&corpus, question).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.passage.source_id.as_str()).collect();
    assert_eq!(ids, ["a", "c"]);
    // original search scores are kept
    assert_eq!(hits[0].score, 0.0);
    assert_eq!(hits[1].score, 3.0);
}

#[tokio::test]
async fn test_duplicate_documents_are_indexed_once() {
    let embedder = vocab();
    let p = pipeline(
        PipelineSettings::default(),
        embedder,
        RecordingGenerator::answering("unused"),
    );
    let documents = vec![
        RawDocument::plain("first", "Pho is a dish."),
        RawDocument::plain("copy", "PHO is a <b>dish.</b>"),
        RawDocument::plain("other", "City center."),
    ];
    let corpus = p.ingest(documents).await.unwrap().into_corpus().unwrap();
    assert_eq!(corpus.documents(), ["first", "other"]);
    assert_eq!(corpus.passage_count(), 2);
}

#[tokio::test]
async fn test_concurrent_batches_keep_passage_order() {
    let settings = PipelineSettings {
        normalizer: None,
        batch_size: 1,
        concurrency: 8,
        ..Default::default()
    };
    let p = pipeline(
        settings,
        Arc::new(SlowNumberEmbedder),
        RecordingGenerator::answering("unused"),
    );
    let documents: Vec<RawDocument> = (0..16)
        .map(|i| RawDocument::plain(format!("d{}", i), format!("doc {}.", i)))
        .collect();
    let corpus = p.ingest(documents).await.unwrap().into_corpus().unwrap();

    for position in 0..16 {
        assert_eq!(corpus.index().vector(position).unwrap(), &[position as f32]);
        assert_eq!(
            corpus.index().passage(position).unwrap().source_id,
            format!("d{}", position)
        );
    }
}

#[tokio::test]
async fn test_best_sentences_of_top_passage() {
    let p = pipeline(
        PipelineSettings::default(),
        vocab(),
        RecordingGenerator::answering("unused"),
    );
    let documents = vec![
        RawDocument::plain(
            "guide",
            "Pho is a dish. Ho Chi Minh City is the economic center. AI changes the world.",
        ),
        RawDocument::plain("other", "Pho and dish, pho and dish."),
    ];
    let corpus = p.ingest(documents).await.unwrap().into_corpus().unwrap();

    let best = p.best_sentences(&corpus, QUESTION, 2).await.unwrap();
    assert_eq!(best.len(), 2);
    assert_eq!(best[0].text, "ho chi minh city is the economic center.");
    assert!(best[0].score > best[1].score);

    assert!(p.best_sentences(&corpus, QUESTION, 0).await.is_err());
}

#[tokio::test]
async fn test_concurrent_queries_share_one_corpus() {
    let generator = RecordingGenerator::answering("ok");
    let p = Arc::new(pipeline(PipelineSettings::default(), vocab(), generator.clone()));
    let corpus = p.ingest(three_documents()).await.unwrap().into_corpus().unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let p = Arc::clone(&p);
        let corpus = corpus.clone();
        handles.push(tokio::spawn(async move { p.ask(&corpus, QUESTION).await }));
    }
    for handle in handles {
        assert!(matches!(handle.await.unwrap(), Answer::Answered { .. }));
    }
    assert_eq!(generator.calls(), 4);
}

#[tokio::test]
async fn test_rebuild_produces_new_corpus() {
    let p = pipeline(
        PipelineSettings::default(),
        vocab(),
        RecordingGenerator::answering("unused"),
    );
    let first = p.ingest(three_documents()).await.unwrap().into_corpus().unwrap();
    let second = p
        .ingest(vec![RawDocument::new("only", "Pho dish.", SourceFormat::Markdown)])
        .await
        .unwrap()
        .into_corpus()
        .unwrap();

    assert_ne!(first.id(), second.id());
    assert!(second.built_at() >= first.built_at());
    assert_eq!(first.passage_count(), 3);
    assert_eq!(second.passage_count(), 1);
}

#[test]
fn test_invalid_settings_rejected_before_any_call() {
    let embedder = vocab();
    let settings = PipelineSettings {
        k: 5,
        policy: RetrievalPolicy::Mmr {
            fetch_k: 2,
            lambda_mult: 0.5,
        },
        ..Default::default()
    };
    let result = RagPipeline::new(
        settings,
        embedder.clone(),
        RecordingGenerator::answering("unused"),
    );
    assert!(matches!(result, Err(RagError::Configuration { .. })));
    assert_eq!(embedder.calls(), 0);
}
