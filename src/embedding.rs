//! Embedding providers.
//!
//! Each provider implements the core [`Embedder`] trait:
//! - **[`DisabledEmbedder`]**: always errors; used when embeddings are not configured.
//! - **[`OpenAIEmbedder`]**: `POST /v1/embeddings`.
//! - **[`OllamaEmbedder`]**: `POST /api/embed` on a local or remote Ollama.
//! - **[`GeminiEmbedder`]**: `batchEmbedContents` on the Generative Language API.
//! - **[`HashingEmbedder`]**: deterministic feature-hashing bag of words, offline.
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the provider named in config:
//!
//! ```rust,no_run
//! # use rag_harness::config::EmbeddingConfig;
//! # use rag_harness::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "hashing"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "hashing");
//! ```
//!
//! Network providers retry through [`crate::http::post_json`] and check that
//! the service returned exactly one vector per input.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use rag_harness_core::embedding::Embedder;
use rag_harness_core::models::Stage;
use rag_harness_core::RagError;

use crate::config::{resolve_api_key, EmbeddingConfig};
use crate::http;

/// Dimension of the hashing embedder when `embedding.dims` is unset.
pub const DEFAULT_HASHING_DIMS: usize = 256;

fn service_error(reason: impl std::fmt::Display) -> RagError {
    RagError::embedding(Stage::Embedding, reason)
}

/// Check count and dimension of a provider response.
fn check_response(
    vectors: Vec<Vec<f32>>,
    expected: usize,
    dims: Option<usize>,
    service: &str,
) -> Result<Vec<Vec<f32>>, RagError> {
    if vectors.len() != expected {
        return Err(service_error(format!(
            "{} returned {} embeddings for {} inputs",
            service,
            vectors.len(),
            expected
        )));
    }
    if let Some(d) = dims {
        if let Some(bad) = vectors.iter().find(|v| v.len() != d) {
            return Err(service_error(format!(
                "{} returned a {}-dimensional vector, expected {}",
                service,
                bad.len(),
                d
            )));
        }
    }
    Ok(vectors)
}

fn parse_vector(value: &serde_json::Value, service: &str) -> Result<Vec<f32>, RagError> {
    let arr = value.as_array().ok_or_else(|| {
        service_error(format!("invalid {} response: embedding is not an array", service))
    })?;
    arr.iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64().map(|x| x as f32).ok_or_else(|| {
                service_error(format!(
                    "invalid {} response: element {} of embedding is {}, not a number",
                    service, i, v
                ))
            })
        })
        .collect()
}

// ============ Disabled ============

pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, _batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Err(RagError::config("embedding provider is disabled"))
    }
}

// ============ OpenAI ============

/// Embeddings through the OpenAI API.
///
/// Requires the key in `api_key_env` (default `OPENAI_API_KEY`).
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    model: String,
    dims: Option<usize>,
    api_key: String,
    base_url: String,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, RagError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| RagError::config("embedding.model required for OpenAI provider"))?;
        let api_key = resolve_api_key(config.api_key_env.as_deref(), "OPENAI_API_KEY")?;

        Ok(Self {
            client: http::client(config.timeout_secs).map_err(RagError::config)?,
            model,
            dims: config.dims,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": batch,
        });
        let json = http::post_json(
            &self.client,
            "OpenAI",
            &format!("{}/v1/embeddings", self.base_url),
            http::Auth::Bearer(&self.api_key),
            &body,
            self.max_retries,
        )
        .await
        .map_err(service_error)?;

        check_response(parse_openai_response(&json)?, batch.len(), self.dims, "OpenAI")
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, RagError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| service_error("invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (i, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| service_error("invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(i);
        indexed.push((index, parse_vector(embedding, "OpenAI")?));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embeddings from an Ollama instance (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: Option<usize>,
    url: String,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, RagError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| RagError::config("embedding.model required for Ollama provider"))?;

        Ok(Self {
            client: http::client(config.timeout_secs).map_err(RagError::config)?,
            model,
            dims: config.dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": batch,
        });
        let json = http::post_json(
            &self.client,
            "Ollama",
            &format!("{}/api/embed", self.url),
            http::Auth::None,
            &body,
            self.max_retries,
        )
        .await
        .map_err(|e| service_error(format!("{} (is Ollama running at {}?)", e, self.url)))?;

        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| service_error("invalid Ollama response: missing embeddings array"))?;
        let vectors = embeddings
            .iter()
            .map(|e| parse_vector(e, "Ollama"))
            .collect::<Result<Vec<_>, _>>()?;

        check_response(vectors, batch.len(), self.dims, "Ollama")
    }
}

// ============ Gemini ============

/// Embeddings from the Gemini API.
///
/// Requires the key in `api_key_env` (default `GOOGLE_API_KEY`).
pub struct GeminiEmbedder {
    client: reqwest::Client,
    model: String,
    dims: Option<usize>,
    api_key: String,
    base_url: String,
    max_retries: u32,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, RagError> {
        let model = config
            .model
            .as_deref()
            .ok_or_else(|| RagError::config("embedding.model required for Gemini provider"))?;
        let api_key = resolve_api_key(config.api_key_env.as_deref(), "GOOGLE_API_KEY")?;

        Ok(Self {
            client: http::client(config.timeout_secs).map_err(RagError::config)?,
            model: gemini_model_name(model),
            dims: config.dims,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            max_retries: config.max_retries,
        })
    }
}

pub(crate) const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub(crate) const GEMINI_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini model ids are addressed as `models/<name>`.
pub(crate) fn gemini_model_name(model: &str) -> String {
    model.trim_start_matches("models/").to_string()
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let qualified = format!("models/{}", self.model);
        let requests: Vec<serde_json::Value> = batch
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": qualified,
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });
        let url = format!("{}/{}:batchEmbedContents", self.base_url, qualified);

        let json = http::post_json(
            &self.client,
            "Gemini",
            &url,
            http::Auth::Header(GEMINI_KEY_HEADER, &self.api_key),
            &body,
            self.max_retries,
        )
        .await
        .map_err(service_error)?;

        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| service_error("invalid Gemini response: missing embeddings array"))?;
        let vectors = embeddings
            .iter()
            .map(|e| {
                let values = e.get("values").ok_or_else(|| {
                    service_error("invalid Gemini response: embedding without values")
                })?;
                parse_vector(values, "Gemini")
            })
            .collect::<Result<Vec<_>, _>>()?;

        check_response(vectors, batch.len(), self.dims, "Gemini")
    }
}

// ============ Hashing ============

/// Offline embedder: each lower-cased word is hashed into one of `dims`
/// buckets with a hash-derived sign, and the result is L2-normalized.
///
/// Texts sharing words land near each other, which is enough for lexical
/// retrieval without any model or network.
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Result<Self, RagError> {
        if dims == 0 {
            return Err(RagError::config("embedding.dims must be > 0"));
        }
        Ok(Self { dims })
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();

        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing"
    }

    fn dims(&self) -> Option<usize> {
        Some(self.dims)
    }

    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(batch.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"gemini"` | [`GeminiEmbedder`] |
/// | `"hashing"` | [`HashingEmbedder`] |
///
/// # Errors
///
/// Unknown provider names, missing model names, and missing API keys are
/// all [`RagError::Configuration`].
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, RagError> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiEmbedder::new(config)?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(
            config.dims.unwrap_or(DEFAULT_HASHING_DIMS),
        )?)),
        other => Err(RagError::config(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}
