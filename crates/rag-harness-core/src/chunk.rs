//! Sentence-aware and fixed-window text chunker.
//!
//! Splits document text into [`Passage`]s using one of three
//! interchangeable strategies (see [`ChunkingStrategy`]). A pipeline run
//! uses exactly one strategy; they are never mixed.
//!
//! All sizes are measured in characters, not bytes, so multi-byte scripts
//! such as Vietnamese get the same budget as ASCII text and windows never
//! split a UTF-8 code point.
//!
//! # Sentence boundaries
//!
//! A sentence ends at `.`, `?` or `!` followed by whitespace. The
//! punctuation stays with its sentence; the whitespace is dropped.
//!
//! # Example
//!
//! ```rust
//! use rag_harness_core::chunk::{chunk_text, ChunkingStrategy};
//!
//! let strategy = ChunkingStrategy::SentenceBounded { chunk_size: 40 };
//! let passages = chunk_text("doc-1", "First one. Second one. A third, longer sentence.", &strategy).unwrap();
//! assert_eq!(passages.len(), 2);
//! assert_eq!(passages[0].text, "First one. Second one.");
//! assert_eq!(passages[1].index, 1);
//! ```

use serde::Serialize;

use crate::error::RagError;
use crate::models::Passage;

/// How text is cut into passages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Greedily pack whole sentences while the passage stays within
    /// `chunk_size` characters. A sentence longer than `chunk_size` becomes
    /// its own passage, untruncated.
    SentenceBounded { chunk_size: usize },
    /// Exactly `sentences_per_chunk` sentences per passage (the last may
    /// hold fewer), ignoring character length.
    SentenceCount { sentences_per_chunk: usize },
    /// Windows of `chunk_size` characters advancing by
    /// `chunk_size - chunk_overlap`. May split words and sentences.
    FixedWindow {
        chunk_size: usize,
        chunk_overlap: usize,
    },
}

impl Default for ChunkingStrategy {
    fn default() -> Self {
        ChunkingStrategy::SentenceBounded { chunk_size: 500 }
    }
}

impl ChunkingStrategy {
    /// Reject parameter combinations the chunker cannot honor.
    pub fn validate(&self) -> Result<(), RagError> {
        match *self {
            ChunkingStrategy::SentenceBounded { chunk_size } => {
                if chunk_size == 0 {
                    return Err(RagError::config("chunk_size must be > 0"));
                }
            }
            ChunkingStrategy::SentenceCount {
                sentences_per_chunk,
            } => {
                if sentences_per_chunk == 0 {
                    return Err(RagError::config("sentences_per_chunk must be > 0"));
                }
            }
            ChunkingStrategy::FixedWindow {
                chunk_size,
                chunk_overlap,
            } => {
                if chunk_size == 0 {
                    return Err(RagError::config("chunk_size must be > 0"));
                }
                if chunk_overlap >= chunk_size {
                    return Err(RagError::config(format!(
                        "chunk_overlap ({}) must be < chunk_size ({})",
                        chunk_overlap, chunk_size
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Split `text` into passages with contiguous indices starting at 0.
///
/// Empty or whitespace-only text yields no passages.
///
/// # Errors
///
/// [`RagError::Configuration`] when the strategy fails [`ChunkingStrategy::validate`].
pub fn chunk_text(
    source_id: &str,
    text: &str,
    strategy: &ChunkingStrategy,
) -> Result<Vec<Passage>, RagError> {
    strategy.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let pieces = match *strategy {
        ChunkingStrategy::SentenceBounded { chunk_size } => {
            pack_sentences(&split_sentences(text), chunk_size)
        }
        ChunkingStrategy::SentenceCount {
            sentences_per_chunk,
        } => split_sentences(text)
            .chunks(sentences_per_chunk)
            .map(|group| group.join(" "))
            .collect(),
        ChunkingStrategy::FixedWindow {
            chunk_size,
            chunk_overlap,
        } => fixed_windows(text, chunk_size, chunk_overlap),
    };

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| Passage::new(source_id, i, piece))
        .collect())
}

/// Split text into trimmed, non-empty sentences.
///
/// A boundary is a `.`, `?` or `!` immediately followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '?' | '!') {
            continue;
        }
        if let Some(&(_, next)) = chars.peek() {
            if next.is_whitespace() {
                let end = i + c.len_utf8();
                push_trimmed(&mut sentences, &text[start..end]);
                start = end;
            }
        }
    }
    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, s: &'a str) {
    let trimmed = s.trim();
    if !trimmed.is_empty() {
        out.push(trimmed);
    }
}

fn pack_sentences(sentences: &[&str], chunk_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in sentences {
        let sentence_len = sentence.chars().count();

        if current.is_empty() {
            current.push_str(sentence);
            current_len = sentence_len;
        } else if current_len + 1 + sentence_len <= chunk_size {
            current.push(' ');
            current.push_str(sentence);
            current_len += 1 + sentence_len;
        } else {
            pieces.push(std::mem::take(&mut current));
            current.push_str(sentence);
            current_len = sentence_len;
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn fixed_windows(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let step = chunk_size - chunk_overlap;
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        start += step;
    }
    pieces
}
