//! Retrieval-augmented answering, end to end.
//!
//! [`RagPipeline`] owns the settings and the two external services. It
//! builds a [`Corpus`] from documents (normalize → chunk → embed → index)
//! and answers questions against it (embed → retrieve → prompt → generate).
//!
//! A corpus is an owned value. Rebuilding produces a new one; callers that
//! serve queries swap their own reference. Concurrent queries against the
//! same corpus only read the index.
//!
//! Failure handling:
//! - a file that cannot be extracted is reported in [`IngestReport::failures`]
//!   and the rest of the batch continues;
//! - an embedding failure aborts the ingestion or query it occurred in;
//! - a generation failure becomes [`Answer::Failed`] and is not retried.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use rag_harness_core::chunk::{chunk_text, split_sentences, ChunkingStrategy};
use rag_harness_core::embedding::Embedder;
use rag_harness_core::generation::Generator;
use rag_harness_core::index::{DistanceMetric, VectorIndex};
use rag_harness_core::models::{Passage, RawDocument, ScoredPassage};
use rag_harness_core::normalize::Normalizer;
use rag_harness_core::prompt::PromptTemplate;
use rag_harness_core::retrieve::{RetrievalPolicy, Retriever};
use rag_harness_core::RagError;

pub use rag_harness_core::models::Stage;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::{Extractor, FormatRegistry};
use crate::generation::create_generator;

/// Everything the pipeline needs besides its services.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// `None` chunks the extracted text as-is.
    pub normalizer: Option<Normalizer>,
    pub chunking: ChunkingStrategy,
    pub metric: DistanceMetric,
    pub policy: RetrievalPolicy,
    pub k: usize,
    /// Passages per embedding request.
    pub batch_size: usize,
    /// Embedding requests in flight during ingestion.
    pub concurrency: usize,
    /// Skip documents whose (normalized) text was already seen in the batch.
    pub dedup: bool,
    pub prompt: PromptTemplate,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            normalizer: Some(Normalizer::default()),
            chunking: ChunkingStrategy::default(),
            metric: DistanceMetric::default(),
            policy: RetrievalPolicy::default(),
            k: 3,
            batch_size: 64,
            concurrency: 4,
            dedup: true,
            prompt: PromptTemplate::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Result<Self, RagError> {
        config.validate()?;
        Ok(Self {
            normalizer: if config.normalize.enabled {
                Some(config.normalize.normalizer()?)
            } else {
                None
            },
            chunking: config.chunking.strategy()?,
            metric: config.retrieval.metric()?,
            policy: config.retrieval.policy()?,
            k: config.retrieval.k,
            batch_size: config.embedding.batch_size,
            concurrency: config.embedding.concurrency,
            dedup: config.ingest.dedup,
            prompt: config.prompt.template(),
        })
    }

    pub fn validate(&self) -> Result<(), RagError> {
        self.chunking.validate()?;
        self.policy.validate(self.k)?;
        if self.batch_size == 0 {
            return Err(RagError::config("batch_size must be > 0"));
        }
        if self.concurrency == 0 {
            return Err(RagError::config("concurrency must be > 0"));
        }
        Ok(())
    }
}

/// An immutable, queryable index built from one ingestion.
#[derive(Debug, Clone)]
pub struct Corpus {
    id: Uuid,
    built_at: DateTime<Utc>,
    index: Arc<VectorIndex>,
    documents: Vec<String>,
}

impl Corpus {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Ids of the documents that contributed passages, in ingestion order.
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn passage_count(&self) -> usize {
        self.index.len()
    }
}

#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Ready(Corpus),
    /// No document produced a passage. Not an error.
    NoData,
}

impl IngestOutcome {
    pub fn corpus(&self) -> Option<&Corpus> {
        match self {
            IngestOutcome::Ready(corpus) => Some(corpus),
            IngestOutcome::NoData => None,
        }
    }

    pub fn into_corpus(self) -> Option<Corpus> {
        match self {
            IngestOutcome::Ready(corpus) => Some(corpus),
            IngestOutcome::NoData => None,
        }
    }
}

/// Result of ingesting files: the corpus (if any) plus every file that
/// was skipped and why.
#[derive(Debug)]
pub struct IngestReport {
    pub outcome: IngestOutcome,
    pub failures: Vec<RagError>,
}

#[derive(Debug, Clone)]
pub enum Answer {
    Answered {
        text: String,
        sources: Vec<ScoredPassage>,
    },
    Failed {
        stage: Stage,
        message: String,
    },
    NoData,
}

impl Answer {
    fn failed(err: RagError) -> Self {
        Answer::Failed {
            stage: err.stage(),
            message: err.to_string(),
        }
    }

    /// User-facing text. Answers are followed by their numbered sources.
    pub fn render(&self) -> String {
        match self {
            Answer::Answered { text, sources } => {
                let mut out = text.trim().to_string();
                if !sources.is_empty() {
                    out.push_str("\n\nSources:");
                    for (i, hit) in sources.iter().enumerate() {
                        out.push_str(&format!(
                            "\n[{}] {} #{}: {}",
                            i + 1,
                            hit.passage.source_id,
                            hit.passage.index,
                            snippet(&hit.passage.text, 80)
                        ));
                    }
                }
                out
            }
            Answer::Failed { stage, message } => {
                format!("Could not answer (failed during {}): {}", stage, message)
            }
            Answer::NoData => {
                "No document text was available, so there is nothing to answer from.".to_string()
            }
        }
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    let one_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if one_line.chars().count() <= max_chars {
        return one_line;
    }
    let cut: String = one_line.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

/// A sentence of the top passage and its similarity to the question.
#[derive(Debug, Clone, PartialEq)]
pub struct SentenceMatch {
    pub text: String,
    pub score: f32,
}

fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

pub struct RagPipeline {
    settings: PipelineSettings,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    registry: FormatRegistry,
}

impl RagPipeline {
    /// # Errors
    ///
    /// [`RagError::Configuration`] when `settings` fail validation.
    pub fn new(
        settings: PipelineSettings,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self, RagError> {
        settings.validate()?;
        Ok(Self {
            settings,
            embedder,
            generator,
            registry: FormatRegistry::default(),
        })
    }

    /// Build the pipeline and the providers named in `config`.
    pub fn from_config(config: &Config) -> Result<Self, RagError> {
        let settings = PipelineSettings::from_config(config)?;
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Self::new(settings, embedder, generator)
    }

    pub fn with_registry(mut self, registry: FormatRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Apply the configured normalizer, if any.
    pub fn prepare_text(&self, text: &str) -> String {
        match &self.settings.normalizer {
            Some(normalizer) => normalizer.normalize(text),
            None => text.to_string(),
        }
    }

    /// Normalize, chunk, embed and index `documents` into a new corpus.
    pub async fn ingest(&self, documents: Vec<RawDocument>) -> Result<IngestOutcome, RagError> {
        info!(documents = documents.len(), "ingest started");

        let mut seen = HashSet::new();
        let mut passages: Vec<Passage> = Vec::new();
        let mut ids = Vec::new();

        for doc in &documents {
            let text = self.prepare_text(&doc.text);
            if self.settings.dedup && !seen.insert(content_hash(&text)) {
                debug!(document = %doc.id, "skipping duplicate document");
                continue;
            }

            let chunks = chunk_text(&doc.id, &text, &self.settings.chunking)
                .map_err(|e| e.at_stage(Stage::Chunking))?;
            debug!(document = %doc.id, passages = chunks.len(), "chunked");
            if chunks.is_empty() {
                continue;
            }
            ids.push(doc.id.clone());
            passages.extend(chunks);
        }

        if passages.is_empty() {
            info!("ingest produced no passages");
            return Ok(IngestOutcome::NoData);
        }

        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let vectors = self.embed_all(&texts, Stage::Embedding).await?;

        let mut index = VectorIndex::new(self.settings.metric);
        index
            .add(vectors, passages)
            .map_err(|e| e.at_stage(Stage::Indexing))?;

        let corpus = Corpus {
            id: Uuid::new_v4(),
            built_at: Utc::now(),
            index: Arc::new(index),
            documents: ids,
        };
        info!(
            corpus = %corpus.id,
            documents = corpus.documents.len(),
            passages = corpus.passage_count(),
            dims = corpus.index.dims().unwrap_or(0),
            "ingest finished"
        );
        Ok(IngestOutcome::Ready(corpus))
    }

    /// Extract each file and ingest whatever could be read.
    pub async fn ingest_paths(&self, paths: &[PathBuf]) -> Result<IngestReport, RagError> {
        self.ingest_sources(paths, Vec::new()).await
    }

    /// Like [`ingest_paths`](Self::ingest_paths), with already-extracted
    /// documents appended after the files.
    pub async fn ingest_sources(
        &self,
        paths: &[PathBuf],
        extra: Vec<RawDocument>,
    ) -> Result<IngestReport, RagError> {
        let mut documents = Vec::with_capacity(paths.len() + extra.len());
        let mut failures = Vec::new();

        for path in paths {
            match self.registry.extract(path) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping document");
                    failures.push(e);
                }
            }
        }

        documents.extend(extra);

        let outcome = self.ingest(documents).await?;
        Ok(IngestReport { outcome, failures })
    }

    /// Embed `texts` in batches, `concurrency` requests at a time, keeping
    /// input order.
    async fn embed_all(&self, texts: &[String], stage: Stage) -> Result<Vec<Vec<f32>>, RagError> {
        let batches: Vec<Vec<String>> = texts
            .chunks(self.settings.batch_size)
            .map(|batch| batch.to_vec())
            .collect();
        debug!(
            texts = texts.len(),
            batches = batches.len(),
            model = self.embedder.model_name(),
            "embedding"
        );

        let results: Vec<Vec<Vec<f32>>> = stream::iter(batches.into_iter().map(|batch| {
            let embedder = Arc::clone(&self.embedder);
            async move {
                let vectors = embedder
                    .embed(&batch)
                    .await
                    .map_err(|e| e.at_stage(stage))?;
                if vectors.len() != batch.len() {
                    return Err(RagError::embedding(
                        stage,
                        format!(
                            "{} embeddings returned for {} inputs",
                            vectors.len(),
                            batch.len()
                        ),
                    ));
                }
                Ok(vectors)
            }
        }))
        .buffered(self.settings.concurrency)
        .try_collect()
        .await?;

        Ok(results.into_iter().flatten().collect())
    }

    async fn embed_query(&self, question: &str) -> Result<Vec<f32>, RagError> {
        let prepared = self.prepare_text(question);
        let text = if prepared.is_empty() {
            question.trim().to_string()
        } else {
            prepared
        };

        let vector = self
            .embed_all(&[text], Stage::Retrieving)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        if vector.is_empty() {
            return Err(RagError::embedding(
                Stage::Retrieving,
                "empty query embedding",
            ));
        }
        Ok(vector)
    }

    /// The passages most relevant to `question`, per the retrieval policy.
    pub async fn retrieve(
        &self,
        corpus: &Corpus,
        question: &str,
    ) -> Result<Vec<ScoredPassage>, RagError> {
        let query = self.embed_query(question).await?;
        let hits = Retriever::new(corpus.index(), self.settings.policy)
            .retrieve(&query, self.settings.k)
            .map_err(|e| e.at_stage(Stage::Retrieving))?;
        debug!(hits = hits.len(), policy = ?self.settings.policy, "retrieved");
        Ok(hits)
    }

    /// Retrieve, build the grounded prompt, and generate an answer.
    pub async fn ask(&self, corpus: &Corpus, question: &str) -> Answer {
        let sources = match self.retrieve(corpus, question).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "retrieval failed");
                return Answer::failed(e);
            }
        };
        if sources.is_empty() {
            return Answer::NoData;
        }

        let prompt = self.settings.prompt.build(&sources, question);
        debug!(
            context_passages = prompt.context_passages,
            chars = prompt.text.chars().count(),
            model = self.generator.model_name(),
            "generating"
        );

        match self.generator.generate(&prompt.text).await {
            Ok(text) => {
                info!(sources = sources.len(), "answered");
                Answer::Answered { text, sources }
            }
            Err(e) => {
                warn!(error = %e, "generation failed");
                Answer::failed(e.at_stage(Stage::Generating))
            }
        }
    }

    /// Ingest `documents` and answer one question against them.
    pub async fn answer(&self, documents: Vec<RawDocument>, question: &str) -> Answer {
        match self.ingest(documents).await {
            Ok(IngestOutcome::Ready(corpus)) => self.ask(&corpus, question).await,
            Ok(IngestOutcome::NoData) => Answer::NoData,
            Err(e) => Answer::failed(e),
        }
    }

    /// The `top_n` sentences of the best-matching passage, most similar to
    /// `question` first.
    pub async fn best_sentences(
        &self,
        corpus: &Corpus,
        question: &str,
        top_n: usize,
    ) -> Result<Vec<SentenceMatch>, RagError> {
        if top_n == 0 {
            return Err(RagError::config("top_n must be > 0"));
        }

        let query = self.embed_query(question).await?;
        let top = corpus
            .index()
            .search(&query, 1)
            .map_err(|e| e.at_stage(Stage::Retrieving))?;
        let Some(top) = top.into_iter().next() else {
            return Ok(Vec::new());
        };

        let sentences: Vec<String> = split_sentences(&top.passage.text)
            .into_iter()
            .map(str::to_string)
            .collect();
        let vectors = self.embed_all(&sentences, Stage::Retrieving).await?;

        let metric = corpus.index().metric();
        let mut matches: Vec<SentenceMatch> = sentences
            .into_iter()
            .zip(vectors.iter())
            .map(|(text, vector)| SentenceMatch {
                score: metric.similarity(&query, vector),
                text,
            })
            .collect();
        // stable: equal scores keep sentence order
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_n);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_harness_core::models::Passage;

    fn hit(source: &str, index: usize, text: &str) -> ScoredPassage {
        ScoredPassage {
            passage: Passage::new(source, index, text),
            score: 0.5,
            position: index,
        }
    }

    #[test]
    fn test_render_answer_lists_sources() {
        let answer = Answer::Answered {
            text: "Hà Nội.\n".to_string(),
            sources: vec![hit("a.txt", 0, "hà nội là thủ đô."), hit("b.txt", 2, "phở")],
        };
        assert_eq!(
            answer.render(),
            "Hà Nội.\n\nSources:\n[1] a.txt #0: hà nội là thủ đô.\n[2] b.txt #2: phở"
        );
    }

    #[test]
    fn test_render_failed_names_stage() {
        let answer = Answer::Failed {
            stage: Stage::Generating,
            message: "generation service failed: quota".to_string(),
        };
        assert!(answer.render().contains("failed during generating"));
    }

    #[test]
    fn test_snippet_truncates_on_chars() {
        assert_eq!(snippet("  a\nb  ", 10), "a b");
        assert_eq!(snippet("đường phố", 5), "đường…");
    }

    #[test]
    fn test_settings_from_default_config() {
        let settings = PipelineSettings::from_config(&Config::default()).unwrap();
        assert_eq!(settings.k, 3);
        assert!(settings.normalizer.is_some());
        assert_eq!(settings.policy, RetrievalPolicy::TopK);
    }

    #[test]
    fn test_settings_validation() {
        let settings = PipelineSettings {
            batch_size: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
        let settings = PipelineSettings {
            k: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }
}
