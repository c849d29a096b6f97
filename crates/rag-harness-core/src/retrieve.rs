//! Retrieval policies over a [`VectorIndex`].
//!
//! - **Top-k** returns [`VectorIndex::search`] unchanged.
//! - **MMR** (Maximal Marginal Relevance) over-fetches `fetch_k`
//!   candidates, then greedily picks the candidate maximizing
//!
//! ```text
//! λ · sim(candidate, query) − (1 − λ) · max sim(candidate, s)  for s in selected
//! ```
//!
//! until `k` passages are chosen or the candidates run out. λ = 1 is pure
//! relevance (identical to top-k), λ = 0 is pure diversity. The pairwise
//! similarity work is quadratic in `fetch_k`, never in corpus size.

use serde::Serialize;

use crate::error::RagError;
use crate::index::{DistanceMetric, VectorIndex};
use crate::models::ScoredPassage;

/// Selection policy applied on top of nearest-neighbour search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RetrievalPolicy {
    #[default]
    TopK,
    Mmr { fetch_k: usize, lambda_mult: f32 },
}

impl RetrievalPolicy {
    /// Check the policy against the requested `k`.
    pub fn validate(&self, k: usize) -> Result<(), RagError> {
        if k == 0 {
            return Err(RagError::config("k must be > 0"));
        }
        if let RetrievalPolicy::Mmr {
            fetch_k,
            lambda_mult,
        } = *self
        {
            if fetch_k < k {
                return Err(RagError::config(format!(
                    "fetch_k ({}) must be >= k ({})",
                    fetch_k, k
                )));
            }
            if !(0.0..=1.0).contains(&lambda_mult) {
                return Err(RagError::config(format!(
                    "lambda_mult ({}) must be in [0.0, 1.0]",
                    lambda_mult
                )));
            }
        }
        Ok(())
    }
}

/// A retrieval policy bound to a built index.
pub struct Retriever<'a> {
    index: &'a VectorIndex,
    policy: RetrievalPolicy,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a VectorIndex, policy: RetrievalPolicy) -> Self {
        Self { index, policy }
    }

    pub fn policy(&self) -> RetrievalPolicy {
        self.policy
    }

    /// Retrieve at most `k` passages for `query`, most relevant first (top-k)
    /// or in MMR selection order.
    pub fn retrieve(&self, query: &[f32], k: usize) -> Result<Vec<ScoredPassage>, RagError> {
        self.policy.validate(k)?;

        match self.policy {
            RetrievalPolicy::TopK => self.index.search(query, k),
            RetrievalPolicy::Mmr {
                fetch_k,
                lambda_mult,
            } => {
                let hits = self.index.search(query, fetch_k)?;
                let candidates: Vec<(ScoredPassage, &[f32])> = hits
                    .into_iter()
                    .filter_map(|hit| {
                        let vector = self.index.vector(hit.position)?;
                        Some((hit, vector))
                    })
                    .collect();
                Ok(mmr_select(
                    query,
                    candidates,
                    k,
                    lambda_mult,
                    self.index.metric(),
                ))
            }
        }
    }
}

/// Re-rank `candidates` (in search order) with Maximal Marginal Relevance.
///
/// Similarities are computed with [`DistanceMetric::similarity`]. Ties go to
/// the earlier candidate. Each returned passage keeps its original search
/// score.
pub fn mmr_select(
    query: &[f32],
    candidates: Vec<(ScoredPassage, &[f32])>,
    k: usize,
    lambda: f32,
    metric: DistanceMetric,
) -> Vec<ScoredPassage> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|(_, v)| metric.similarity(query, v))
        .collect();

    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_slot = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (slot, &cand) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| metric.similarity(candidates[cand].1, candidates[s].1))
                .fold(None, |acc: Option<f32>, sim| Some(acc.map_or(sim, |a| a.max(sim))))
                .unwrap_or(0.0);

            let score = lambda * relevance[cand] - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_slot = slot;
            }
        }

        selected.push(remaining.remove(best_slot));
    }

    let mut by_index: Vec<Option<ScoredPassage>> =
        candidates.into_iter().map(|(hit, _)| Some(hit)).collect();
    selected
        .into_iter()
        .filter_map(|i| by_index[i].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Passage;

    fn index_of(metric: DistanceMetric, vectors: Vec<Vec<f32>>) -> VectorIndex {
        let passages = (0..vectors.len())
            .map(|i| Passage::new("doc", i, format!("p{}", i)))
            .collect();
        let mut index = VectorIndex::new(metric);
        index.add(vectors, passages).unwrap();
        index
    }

    fn positions(hits: &[ScoredPassage]) -> Vec<usize> {
        hits.iter().map(|h| h.position).collect()
    }

    /// Two near-duplicates close to the query plus one dissimilar passage.
    fn duplicate_heavy() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.99, 0.01, 0.0],
            vec![0.5, 0.0, 0.86],
            vec![0.0, 1.0, 0.0],
        ]
    }

    #[test]
    fn test_top_k_is_plain_search() {
        let index = index_of(DistanceMetric::Cosine, duplicate_heavy());
        let retriever = Retriever::new(&index, RetrievalPolicy::TopK);
        let query = [1.0, 0.0, 0.1];
        assert_eq!(
            retriever.retrieve(&query, 2).unwrap(),
            index.search(&query, 2).unwrap()
        );
    }

    #[test]
    fn test_mmr_lambda_one_equals_top_k() {
        for metric in [DistanceMetric::Cosine, DistanceMetric::L2] {
            let index = index_of(metric, duplicate_heavy());
            let query = [1.0, 0.0, 0.1];
            let mmr = Retriever::new(
                &index,
                RetrievalPolicy::Mmr {
                    fetch_k: 4,
                    lambda_mult: 1.0,
                },
            );
            assert_eq!(
                positions(&mmr.retrieve(&query, 3).unwrap()),
                positions(&index.search(&query, 3).unwrap()),
                "metric {:?}",
                metric
            );
        }
    }

    #[test]
    fn test_mmr_lambda_zero_prefers_dissimilar() {
        let index = index_of(DistanceMetric::Cosine, duplicate_heavy());
        let query = [1.0, 0.0, 0.1];
        let top = positions(&index.search(&query, 2).unwrap());
        assert_eq!(top, vec![0, 1], "plain top-k returns both duplicates");

        let mmr = Retriever::new(
            &index,
            RetrievalPolicy::Mmr {
                fetch_k: 3,
                lambda_mult: 0.0,
            },
        );
        let picked = positions(&mmr.retrieve(&query, 2).unwrap());
        assert_eq!(picked, vec![0, 2]);
    }

    #[test]
    fn test_mmr_balanced_diversifies() {
        let index = index_of(DistanceMetric::Cosine, duplicate_heavy());
        let mmr = Retriever::new(
            &index,
            RetrievalPolicy::Mmr {
                fetch_k: 4,
                lambda_mult: 0.5,
            },
        );
        let picked = positions(&mmr.retrieve(&[1.0, 0.0, 0.1], 2).unwrap());
        assert_eq!(picked[0], 0);
        assert_ne!(picked[1], 1);
    }

    #[test]
    fn test_mmr_keeps_search_scores() {
        let index = index_of(DistanceMetric::Cosine, duplicate_heavy());
        let query = [1.0, 0.0, 0.1];
        let mmr = Retriever::new(
            &index,
            RetrievalPolicy::Mmr {
                fetch_k: 4,
                lambda_mult: 0.3,
            },
        );
        let all = index.search(&query, 4).unwrap();
        for hit in mmr.retrieve(&query, 3).unwrap() {
            let original = all.iter().find(|h| h.position == hit.position).unwrap();
            assert_eq!(original.score, hit.score);
        }
    }

    #[test]
    fn test_mmr_exhausts_candidates() {
        let index = index_of(DistanceMetric::L2, vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
        let mmr = Retriever::new(
            &index,
            RetrievalPolicy::Mmr {
                fetch_k: 10,
                lambda_mult: 0.5,
            },
        );
        assert_eq!(mmr.retrieve(&[0.0, 1.0], 5).unwrap().len(), 2);
    }

    #[test]
    fn test_mmr_empty_index() {
        let index = VectorIndex::new(DistanceMetric::Cosine);
        let mmr = Retriever::new(
            &index,
            RetrievalPolicy::Mmr {
                fetch_k: 10,
                lambda_mult: 0.5,
            },
        );
        assert!(mmr.retrieve(&[1.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetrievalPolicy::TopK.validate(0).is_err());
        assert!(RetrievalPolicy::Mmr {
            fetch_k: 2,
            lambda_mult: 0.5
        }
        .validate(3)
        .is_err());
        assert!(RetrievalPolicy::Mmr {
            fetch_k: 5,
            lambda_mult: 1.5
        }
        .validate(3)
        .is_err());
        assert!(RetrievalPolicy::Mmr {
            fetch_k: 3,
            lambda_mult: 0.0
        }
        .validate(3)
        .is_ok());
    }
}
