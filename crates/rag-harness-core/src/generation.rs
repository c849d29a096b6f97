//! Generation service trait.
//!
//! Concrete providers (OpenAI chat, Ollama, Gemini) live in the
//! `rag-harness` app crate.

use async_trait::async_trait;

use crate::error::RagError;

/// A black-box service mapping a prompt to a completion.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-2.5-flash"`).
    fn model_name(&self) -> &str;

    /// Produce a completion for `prompt`.
    ///
    /// Failures are [`RagError::GenerationService`] carrying the cause. The
    /// pipeline never retries them; retry policy belongs to the caller or
    /// the provider's transport.
    async fn generate(&self, prompt: &str) -> Result<String, RagError>;
}
