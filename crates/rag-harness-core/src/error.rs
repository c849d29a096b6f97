//! Error taxonomy shared by every stage of the pipeline.
//!
//! An empty corpus is deliberately absent here: it is a normal outcome
//! (`IngestOutcome::NoData` / `Answer::NoData` in the application crate),
//! not a failure.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::Stage;

/// Failure raised by the retrieval pipeline or one of its collaborators.
///
/// Every variant renders as a human-readable message that names the stage
/// or document that failed.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid parameter combination or mismatched vector dimensions.
    /// `stage` is set once the pipeline knows where the error surfaced.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        stage: Option<Stage>,
    },

    /// No extractor is registered for the file's extension.
    #[error("unsupported format '{extension}' for {}", .path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// A single document could not be parsed. Non-fatal to the batch.
    #[error("extraction failed for {source_id}: {reason}")]
    Extraction { source_id: String, reason: String },

    /// The embedding service failed; fatal to the current ingestion or query.
    #[error("embedding service failed during {stage}: {reason}")]
    EmbeddingService { stage: Stage, reason: String },

    /// The generative model failed; fatal to the current query only.
    #[error("generation service failed: {0}")]
    GenerationService(String),
}

impl RagError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
            stage: None,
        }
    }

    pub fn embedding(stage: Stage, reason: impl std::fmt::Display) -> Self {
        Self::EmbeddingService {
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn generation(reason: impl std::fmt::Display) -> Self {
        Self::GenerationService(reason.to_string())
    }

    /// Attribute the error to the stage that was running when it surfaced.
    ///
    /// Embedding failures take the new stage (providers tag them
    /// `Embedding` even when a query triggered the call). Configuration
    /// errors take it only if they carry none yet. Other variants already
    /// name their stage and are returned unchanged.
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            RagError::EmbeddingService { reason, .. } => RagError::EmbeddingService { stage, reason },
            RagError::Configuration {
                message,
                stage: None,
            } => RagError::Configuration {
                message,
                stage: Some(stage),
            },
            other => other,
        }
    }

    /// The pipeline stage this error belongs to, for failure reporting.
    pub fn stage(&self) -> Stage {
        match self {
            RagError::Configuration { stage, .. } => stage.unwrap_or(Stage::Idle),
            RagError::UnsupportedFormat { .. } | RagError::Extraction { .. } => Stage::Normalizing,
            RagError::EmbeddingService { stage, .. } => *stage,
            RagError::GenerationService(_) => Stage::Generating,
        }
    }
}
