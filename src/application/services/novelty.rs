use crate::{
    application::services::NoveltyIndex,
    domain::{DomainError, EmbeddingVector},
};

/// Outcome of a novelty check, with the nearest similarity for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoveltyDecision {
    pub novel: bool,
    pub nearest: Option<f32>,
}

/// Decides whether a unit is new enough to be processed.
///
/// The unit is skipped only when all `k` neighbor similarities strictly exceed
/// `threshold`. Neighbors the index cannot supply count as similarity `0.0`.
#[derive(Debug, Clone, Copy)]
pub struct NoveltyFilter {
    k: usize,
    threshold: f32,
}

impl NoveltyFilter {
    pub fn new(k: usize, threshold: f32) -> Result<Self, DomainError> {
        if k == 0 {
            return Err(DomainError::validation("novelty neighbors must be at least 1"));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DomainError::validation(format!(
                "novelty threshold must lie in [0, 1], got {threshold}"
            )));
        }
        Ok(Self { k, threshold })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn check(
        &self,
        embedding: &EmbeddingVector,
        index: &dyn NoveltyIndex,
    ) -> Result<NoveltyDecision, DomainError> {
        let neighbors = index.query(embedding, self.k)?;
        let similarities: Vec<f32> = neighbors.iter().map(|(score, _)| *score).collect();

        Ok(NoveltyDecision {
            novel: judge_similarities(&similarities, self.k, self.threshold),
            nearest: similarities.first().copied(),
        })
    }
}

/// Queries `index` and reports whether `embedding` is novel.
pub fn is_novel(
    embedding: &EmbeddingVector,
    index: &dyn NoveltyIndex,
    k: usize,
    threshold: f32,
) -> Result<bool, DomainError> {
    Ok(NoveltyFilter::new(k, threshold)?
        .check(embedding, index)?
        .novel)
}

/// Pure decision over neighbor similarities (sorted or not).
///
/// Only the first `k` similarities are considered; missing ones are padded with
/// `0.0`. A similarity equal to `threshold` counts toward novelty.
pub fn judge_similarities(similarities: &[f32], k: usize, threshold: f32) -> bool {
    let k = k.max(1);
    let supplied = similarities.iter().take(k).copied();
    let padding = std::iter::repeat(0.0f32).take(k.saturating_sub(similarities.len()));

    supplied.chain(padding).any(|score| score <= threshold)
}
