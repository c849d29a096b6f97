//! Embedding service trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! plus the pure vector math used by the index and the MMR re-ranker.
//!
//! Concrete providers (OpenAI, Ollama, Gemini, feature hashing) live in the
//! `rag-harness` app crate.

use async_trait::async_trait;

use crate::error::RagError;

/// A black-box service mapping a batch of strings to fixed-dimension vectors.
///
/// Implementations must return exactly one vector per input string, in input
/// order, all with the same dimension for a given model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding dimensionality when it is known up front.
    fn dims(&self) -> Option<usize>;

    /// Embed a batch of texts.
    ///
    /// Errors should be [`RagError::EmbeddingService`]; the caller re-tags
    /// them with the stage that issued the call.
    async fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different
/// lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Squared Euclidean distance. Callers check lengths first.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
