use parking_lot::RwLock;

use crate::{
    application::services::NoveltyIndex,
    domain::{DomainError, EmbeddingVector, NoveltyIndexEntry},
};

use super::rank_neighbors;

/// Process-local novelty index. Nothing survives the process.
#[derive(Default)]
pub struct InMemoryNoveltyIndex {
    entries: RwLock<Vec<NoveltyIndexEntry>>,
}

impl InMemoryNoveltyIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NoveltyIndex for InMemoryNoveltyIndex {
    fn query(
        &self,
        embedding: &EmbeddingVector,
        k: usize,
    ) -> Result<Vec<(f32, NoveltyIndexEntry)>, DomainError> {
        let entries = self.entries.read();
        rank_neighbors(embedding, entries.iter().cloned().map(Ok), k)
    }

    fn insert(&self, entry: &NoveltyIndexEntry) -> Result<(), DomainError> {
        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.position == entry.position) {
            return Err(DomainError::duplicate(format!(
                "position `{}` already indexed",
                entry.position
            )));
        }
        entries.push(entry.clone());
        Ok(())
    }

    fn len(&self) -> Result<usize, DomainError> {
        Ok(self.entries.read().len())
    }

    fn persist(&self) -> Result<(), DomainError> {
        Ok(())
    }

    fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }
}
