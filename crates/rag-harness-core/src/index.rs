//! Brute-force in-memory vector index.
//!
//! Stores passage embeddings in dense positions and answers k-nearest
//! neighbour queries by scoring the query against every stored vector.
//! The index is built once per corpus with [`VectorIndex::add`] and then
//! only read; [`VectorIndex::search`] takes `&self`, so a built index can be
//! shared across threads behind an `Arc` and queried concurrently.
//!
//! # Example
//!
//! ```rust
//! use rag_harness_core::index::{DistanceMetric, VectorIndex};
//! use rag_harness_core::models::Passage;
//!
//! let mut index = VectorIndex::new(DistanceMetric::L2);
//! index
//!     .add(
//!         vec![vec![0.0, 0.0], vec![5.0, 5.0]],
//!         vec![Passage::new("doc", 0, "origin"), Passage::new("doc", 1, "far")],
//!     )
//!     .unwrap();
//! let hits = index.search(&[1.0, 1.0], 1).unwrap();
//! assert_eq!(hits[0].passage.text, "origin");
//! assert_eq!(hits[0].score, 2.0);
//! ```

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, squared_l2};
use crate::error::RagError;
use crate::models::{Passage, ScoredPassage};

/// Scoring function used by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance; smaller is better.
    #[default]
    L2,
    /// Cosine similarity; larger is better.
    Cosine,
}

impl DistanceMetric {
    /// Raw score of `candidate` against `query` under this metric.
    pub fn score(&self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => squared_l2(query, candidate),
            DistanceMetric::Cosine => cosine_similarity(query, candidate),
        }
    }

    /// A similarity where larger is always better.
    ///
    /// Cosine similarity as-is; for L2, `1 / (1 + d²)`, which preserves the
    /// distance ordering. Used by MMR so relevance and redundancy are on the
    /// same scale as the index's own ranking.
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => 1.0 / (1.0 + squared_l2(a, b)),
            DistanceMetric::Cosine => cosine_similarity(a, b),
        }
    }

    /// Order two raw scores best-first.
    fn rank(&self, a: f32, b: f32) -> Ordering {
        let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        match self {
            DistanceMetric::L2 => ord,
            DistanceMetric::Cosine => ord.reverse(),
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l2" => Ok(DistanceMetric::L2),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(RagError::config(format!(
                "unknown distance metric '{}'. Use l2 or cosine.",
                other
            ))),
        }
    }
}

/// Dense position → (embedding, passage) store with brute-force search.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    metric: DistanceMetric,
    dims: Option<usize>,
    vectors: Vec<Vec<f32>>,
    passages: Vec<Passage>,
}

impl VectorIndex {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            dims: None,
            vectors: Vec::new(),
            passages: Vec::new(),
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Dimension shared by every stored vector, once the first is added.
    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.vectors.get(position).map(Vec::as_slice)
    }

    pub fn passage(&self, position: usize) -> Option<&Passage> {
        self.passages.get(position)
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    /// Append vectors and their passages; the i-th gets position `len() + i`.
    ///
    /// The whole batch is checked before anything is stored, so a rejected
    /// batch leaves the index unchanged.
    ///
    /// # Errors
    ///
    /// [`RagError::Configuration`] when the two sequences differ in length,
    /// a vector is empty, or a vector's dimension differs from the index's.
    pub fn add(&mut self, vectors: Vec<Vec<f32>>, passages: Vec<Passage>) -> Result<(), RagError> {
        if vectors.len() != passages.len() {
            return Err(RagError::config(format!(
                "{} vectors supplied for {} passages",
                vectors.len(),
                passages.len()
            )));
        }

        let mut dims = self.dims;
        for (i, v) in vectors.iter().enumerate() {
            if v.is_empty() {
                return Err(RagError::config(format!("vector {} is empty", i)));
            }
            match dims {
                Some(d) if d != v.len() => {
                    return Err(RagError::config(format!(
                        "dimension mismatch: index holds {}-d vectors, vector {} has {}",
                        d,
                        i,
                        v.len()
                    )));
                }
                Some(_) => {}
                None => dims = Some(v.len()),
            }
        }

        self.dims = dims;
        self.vectors.extend(vectors);
        self.passages.extend(passages);
        Ok(())
    }

    /// Return the `k` stored passages closest to `query`, best first.
    ///
    /// Ties are broken by lowest position, so repeated calls return the same
    /// order. An empty index returns an empty result; `k` larger than the
    /// stored count returns everything.
    ///
    /// # Errors
    ///
    /// [`RagError::Configuration`] when `k == 0` or the query dimension does
    /// not match the stored vectors.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredPassage>, RagError> {
        if k == 0 {
            return Err(RagError::config("k must be > 0"));
        }
        let dims = match self.dims {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };
        if query.len() != dims {
            return Err(RagError::config(format!(
                "dimension mismatch: query has {} dims, index holds {}-d vectors",
                query.len(),
                dims
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(pos, v)| (pos, self.metric.score(query, v)))
            .collect();

        scored.sort_by(|a, b| self.metric.rank(a.1, b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| ScoredPassage {
                passage: self.passages[position].clone(),
                score,
                position,
            })
            .collect())
    }
}
