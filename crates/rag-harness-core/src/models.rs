//! Core data models that flow through the retrieval pipeline.
//!
//! Raw documents come in from an extractor, passages come out of the
//! chunker, and scored passages come out of the vector index and the
//! retriever.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source format of a [`RawDocument`], used to pick an extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    PlainText,
    Markdown,
    Pdf,
    Docx,
    Pptx,
    Xlsx,
}

impl SourceFormat {
    /// Resolve a format from a file extension (without the dot).
    ///
    /// Matching is case-insensitive. Returns `None` for unknown extensions;
    /// callers turn that into [`RagError::UnsupportedFormat`](crate::RagError::UnsupportedFormat).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(SourceFormat::PlainText),
            "md" | "markdown" => Some(SourceFormat::Markdown),
            "pdf" => Some(SourceFormat::Pdf),
            "docx" => Some(SourceFormat::Docx),
            "pptx" => Some(SourceFormat::Pptx),
            "xlsx" => Some(SourceFormat::Xlsx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::PlainText => "plain_text",
            SourceFormat::Markdown => "markdown",
            SourceFormat::Pdf => "pdf",
            SourceFormat::Docx => "docx",
            SourceFormat::Pptx => "pptx",
            SourceFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text supplied by an extractor, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Source name or path.
    pub id: String,
    pub text: String,
    pub format: SourceFormat,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>, format: SourceFormat) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            format,
        }
    }

    /// A plain-text document, for text typed or pasted by a user.
    pub fn plain(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, text, SourceFormat::PlainText)
    }
}

/// A bounded unit of source text prepared for embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Passage {
    /// Position within the originating document, from 0.
    pub index: usize,
    pub text: String,
    /// Character count of `text` (not bytes).
    pub length: usize,
    /// Id of the originating [`RawDocument`].
    pub source_id: String,
}

impl Passage {
    pub fn new(source_id: &str, index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            index,
            length: text.chars().count(),
            text,
            source_id: source_id.to_string(),
        }
    }
}

/// A passage returned by the vector index or the retriever.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    /// Squared L2 distance (lower is better) or cosine similarity (higher
    /// is better), depending on the index metric.
    pub score: f32,
    /// Dense slot of the passage in the vector index.
    pub position: usize,
}

/// Pipeline stages, in the order a query moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Normalizing,
    Chunking,
    Embedding,
    Indexing,
    Retrieving,
    Generating,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Normalizing => "normalizing",
            Stage::Chunking => "chunking",
            Stage::Embedding => "embedding",
            Stage::Indexing => "indexing",
            Stage::Retrieving => "retrieving",
            Stage::Generating => "generating",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}
