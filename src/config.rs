//! TOML configuration parsing and validation.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all, via [`Config::default`]) yields a valid offline configuration: the
//! feature-hashing embedder and no generation service.
//!
//! Credentials are never stored in the file. Network providers read their
//! API key from the environment variable named by `api_key_env` (or the
//! provider's conventional variable), and a missing key is a hard error at
//! provider construction time.
//!
//! ```toml
//! [chunking]
//! strategy = "fixed_window"
//! chunk_size = 1000
//! chunk_overlap = 100
//!
//! [retrieval]
//! metric = "cosine"
//! policy = "mmr"
//! k = 3
//! fetch_k = 15
//! lambda_mult = 0.5
//!
//! [embedding]
//! provider = "gemini"
//! model = "text-embedding-004"
//!
//! [generation]
//! provider = "gemini"
//! model = "gemini-2.5-flash"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use rag_harness_core::chunk::ChunkingStrategy;
use rag_harness_core::index::DistanceMetric;
use rag_harness_core::normalize::{vietnamese_stopwords, Normalizer};
use rag_harness_core::prompt::PromptTemplate;
use rag_harness_core::retrieve::RetrievalPolicy;
use rag_harness_core::RagError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NormalizeConfig {
    /// Normalize document text before chunking.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub keep_punctuation: bool,
    /// Built-in stop-word list: `"vietnamese"` or `"none"`.
    #[serde(default = "default_stopwords")]
    pub stopwords: String,
    #[serde(default)]
    pub extra_stopwords: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keep_punctuation: true,
            stopwords: default_stopwords(),
            extra_stopwords: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_stopwords() -> String {
    "vietnamese".to_string()
}

impl NormalizeConfig {
    pub fn normalizer(&self) -> Result<Normalizer, RagError> {
        let mut words: Vec<String> = match self.stopwords.as_str() {
            "vietnamese" => vietnamese_stopwords().into_iter().collect(),
            "none" => Vec::new(),
            other => {
                return Err(RagError::config(format!(
                    "unknown stop-word list '{}'. Use vietnamese or none.",
                    other
                )))
            }
        };
        words.extend(self.extra_stopwords.iter().cloned());
        Ok(Normalizer::new(words, self.keep_punctuation))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// `"sentence_bounded"`, `"sentence_count"`, or `"fixed_window"`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_sentences_per_chunk")]
    pub sentences_per_chunk: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            sentences_per_chunk: default_sentences_per_chunk(),
        }
    }
}

fn default_strategy() -> String {
    "sentence_bounded".to_string()
}
fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_sentences_per_chunk() -> usize {
    10
}

impl ChunkingConfig {
    pub fn strategy(&self) -> Result<ChunkingStrategy, RagError> {
        let strategy = match self.strategy.as_str() {
            "sentence_bounded" => ChunkingStrategy::SentenceBounded {
                chunk_size: self.chunk_size,
            },
            "sentence_count" => ChunkingStrategy::SentenceCount {
                sentences_per_chunk: self.sentences_per_chunk,
            },
            "fixed_window" => ChunkingStrategy::FixedWindow {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
            },
            other => {
                return Err(RagError::config(format!(
                    "unknown chunking strategy '{}'. Use sentence_bounded, sentence_count, or fixed_window.",
                    other
                )))
            }
        };
        strategy.validate()?;
        Ok(strategy)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// `"l2"` or `"cosine"`.
    #[serde(default = "default_metric")]
    pub metric: String,
    /// `"top_k"` or `"mmr"`.
    #[serde(default = "default_policy")]
    pub policy: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_lambda_mult")]
    pub lambda_mult: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            metric: default_metric(),
            policy: default_policy(),
            k: default_k(),
            fetch_k: default_fetch_k(),
            lambda_mult: default_lambda_mult(),
        }
    }
}

fn default_metric() -> String {
    "l2".to_string()
}
fn default_policy() -> String {
    "top_k".to_string()
}
fn default_k() -> usize {
    3
}
fn default_fetch_k() -> usize {
    15
}
fn default_lambda_mult() -> f32 {
    0.5
}

impl RetrievalConfig {
    pub fn metric(&self) -> Result<DistanceMetric, RagError> {
        self.metric.parse()
    }

    pub fn policy(&self) -> Result<RetrievalPolicy, RagError> {
        let policy = match self.policy.as_str() {
            "top_k" => RetrievalPolicy::TopK,
            "mmr" => RetrievalPolicy::Mmr {
                fetch_k: self.fetch_k,
                lambda_mult: self.lambda_mult,
            },
            other => {
                return Err(RagError::config(format!(
                    "unknown retrieval policy '{}'. Use top_k or mmr.",
                    other
                )))
            }
        };
        policy.validate(self.k)?;
        Ok(policy)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"`, `"ollama"`, `"gemini"`, `"hashing"`, or `"disabled"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Passage batches embedded concurrently during ingestion.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Base URL override (e.g. a remote Ollama host).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            api_key_env: None,
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "hashing".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_concurrency() -> usize {
    4
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `"openai"`, `"ollama"`, `"gemini"`, or `"disabled"`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Transport-level retries for 429/5xx responses. Off by default.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            temperature: default_temperature(),
            max_retries: 0,
            timeout_secs: default_generation_timeout_secs(),
            api_key_env: None,
            url: None,
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptConfig {
    /// Replaces the default grounding instruction.
    #[serde(default)]
    pub instruction: Option<String>,
}

impl PromptConfig {
    pub fn template(&self) -> PromptTemplate {
        match &self.instruction {
            Some(text) => PromptTemplate::new(text.clone()),
            None => PromptTemplate::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Globs applied when ingesting a directory.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Skip documents whose normalized text was already ingested.
    #[serde(default = "default_true")]
    pub dedup: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            dedup: true,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    ["txt", "md", "pdf", "docx", "pptx", "xlsx"]
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}

const EMBEDDING_PROVIDERS: &[&str] = &["disabled", "openai", "ollama", "gemini", "hashing"];
const GENERATION_PROVIDERS: &[&str] = &["disabled", "openai", "ollama", "gemini"];

impl Config {
    /// Check every parameter combination before any external call is made.
    pub fn validate(&self) -> Result<(), RagError> {
        self.normalize.normalizer()?;
        self.chunking.strategy()?;
        self.retrieval.metric()?;
        self.retrieval.policy()?;

        let emb = &self.embedding;
        if !EMBEDDING_PROVIDERS.contains(&emb.provider.as_str()) {
            return Err(RagError::config(format!(
                "unknown embedding provider '{}'. Must be one of: {}",
                emb.provider,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }
        if emb.batch_size == 0 {
            return Err(RagError::config("embedding.batch_size must be > 0"));
        }
        if emb.concurrency == 0 {
            return Err(RagError::config("embedding.concurrency must be > 0"));
        }
        if emb.dims == Some(0) {
            return Err(RagError::config("embedding.dims must be > 0"));
        }
        if matches!(emb.provider.as_str(), "openai" | "ollama" | "gemini") && emb.model.is_none() {
            return Err(RagError::config(format!(
                "embedding.model must be specified when provider is '{}'",
                emb.provider
            )));
        }

        let gen = &self.generation;
        if !GENERATION_PROVIDERS.contains(&gen.provider.as_str()) {
            return Err(RagError::config(format!(
                "unknown generation provider '{}'. Must be one of: {}",
                gen.provider,
                GENERATION_PROVIDERS.join(", ")
            )));
        }
        if gen.provider != "disabled" && gen.model.is_none() {
            return Err(RagError::config(format!(
                "generation.model must be specified when provider is '{}'",
                gen.provider
            )));
        }
        if !(0.0..=2.0).contains(&gen.temperature) {
            return Err(RagError::config("generation.temperature must be in [0.0, 2.0]"));
        }

        Ok(())
    }
}

/// Parse a TOML string and validate it.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Read a provider's API key from the environment.
///
/// `explicit` names the variable to read; otherwise `fallback_var` is used.
pub fn resolve_api_key(explicit: Option<&str>, fallback_var: &str) -> Result<String, RagError> {
    let var = explicit.unwrap_or(fallback_var);
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(RagError::config(format!(
            "{} environment variable not set",
            var
        ))),
    }
}
