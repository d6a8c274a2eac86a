//! Novelty index adapters.
//!
//! `SledNoveltyIndex` persists entries across runs; `InMemoryNoveltyIndex`
//! serves ephemeral runs and tests. Both score neighbors with a brute-force
//! cosine scan.

pub mod memory_store;
pub mod sled_store;

pub use memory_store::InMemoryNoveltyIndex;
pub use sled_store::SledNoveltyIndex;

use crate::domain::{DomainError, EmbeddingVector, NoveltyIndexEntry};

/// Scores every entry against `query` and keeps the `k` most similar,
/// sorted by descending similarity.
fn rank_neighbors<I>(
    query: &EmbeddingVector,
    entries: I,
    k: usize,
) -> Result<Vec<(f32, NoveltyIndexEntry)>, DomainError>
where
    I: IntoIterator<Item = Result<NoveltyIndexEntry, DomainError>>,
{
    let mut scored = Vec::new();
    for entry in entries {
        let entry = entry?;
        let score = query.cosine_similarity(&entry.embedding)?;
        scored.push((score, entry));
    }

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(k);
    Ok(scored)
}
