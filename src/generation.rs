//! Generation providers implementing the core [`Generator`] trait.
//!
//! `openai` (chat completions), `ollama` (`/api/generate`), `gemini`
//! (`generateContent`), and `disabled`. A failed generation is reported to
//! the caller as-is; transport retries happen only when
//! `generation.max_retries` is set.

use std::sync::Arc;

use async_trait::async_trait;

use rag_harness_core::generation::Generator;
use rag_harness_core::RagError;

use crate::config::{resolve_api_key, GenerationConfig};
use crate::embedding::{gemini_model_name, GEMINI_BASE_URL, GEMINI_KEY_HEADER};
use crate::http;

fn non_empty(text: String, service: &str) -> Result<String, RagError> {
    if text.trim().is_empty() {
        return Err(RagError::generation(format!(
            "{} returned an empty answer",
            service
        )));
    }
    Ok(text)
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, RagError> {
        Err(RagError::generation("generation provider is disabled"))
    }
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    client: reqwest::Client,
    model: String,
    temperature: f32,
    api_key: String,
    base_url: String,
    max_retries: u32,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, RagError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| RagError::config("generation.model required for OpenAI provider"))?;
        let api_key = resolve_api_key(config.api_key_env.as_deref(), "OPENAI_API_KEY")?;

        Ok(Self {
            client: http::client(config.timeout_secs).map_err(RagError::config)?,
            model,
            temperature: config.temperature,
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
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let json = http::post_json(
            &self.client,
            "OpenAI",
            &format!("{}/v1/chat/completions", self.base_url),
            http::Auth::Bearer(&self.api_key),
            &body,
            self.max_retries,
        )
        .await
        .map_err(RagError::generation)?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| RagError::generation("invalid OpenAI response: missing message content"))?;
        non_empty(text.to_string(), "OpenAI")
    }
}

// ============ Ollama ============

pub struct OllamaGenerator {
    client: reqwest::Client,
    model: String,
    temperature: f32,
    url: String,
    max_retries: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, RagError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| RagError::config("generation.model required for Ollama provider"))?;

        Ok(Self {
            client: http::client(config.timeout_secs).map_err(RagError::config)?,
            model,
            temperature: config.temperature,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let json = http::post_json(
            &self.client,
            "Ollama",
            &format!("{}/api/generate", self.url),
            http::Auth::None,
            &body,
            self.max_retries,
        )
        .await
        .map_err(RagError::generation)?;

        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| RagError::generation("invalid Ollama response: missing response"))?;
        non_empty(text.to_string(), "Ollama")
    }
}

// ============ Gemini ============

pub struct GeminiGenerator {
    client: reqwest::Client,
    model: String,
    temperature: f32,
    api_key: String,
    base_url: String,
    max_retries: u32,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, RagError> {
        let model = config
            .model
            .as_deref()
            .ok_or_else(|| RagError::config("generation.model required for Gemini provider"))?;
        let api_key = resolve_api_key(config.api_key_env.as_deref(), "GOOGLE_API_KEY")?;

        Ok(Self {
            client: http::client(config.timeout_secs).map_err(RagError::config)?,
            model: gemini_model_name(model),
            temperature: config.temperature,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            max_retries: config.max_retries,
        })
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String, RagError> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| RagError::generation("invalid Gemini response: no candidate content"))?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    non_empty(text, "Gemini")
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let json = http::post_json(
            &self.client,
            "Gemini",
            &url,
            http::Auth::Header(GEMINI_KEY_HEADER, &self.api_key),
            &body,
            self.max_retries,
        )
        .await
        .map_err(RagError::generation)?;

        parse_gemini_response(&json)
    }
}

/// Create the [`Generator`] named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>, RagError> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        other => Err(RagError::config(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}
