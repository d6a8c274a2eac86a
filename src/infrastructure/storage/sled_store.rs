use std::path::{Path, PathBuf};

use bincode::Options;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use sled::{Config, Db, Tree};

use crate::{
    application::services::NoveltyIndex,
    domain::{DomainError, EmbeddingVector, NoveltyIndexEntry},
};

use super::rank_neighbors;

const ENTRIES_TREE: &str = "novelty_entries";

/// Embedded novelty index backed by `sled`.
///
/// Entries are stored whole in a single tree keyed by position identifier.
/// Inserts are create-only (`compare_and_swap` against an absent key), so an
/// entry is either fully written or not at all and is never overwritten.
/// Similarity is computed in memory over every entry.
pub struct SledNoveltyIndex {
    db: Db,
    entries: Tree,
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl SledNoveltyIndex {
    /// Opens (or creates) a sled database rooted at `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|err| {
            DomainError::index(format!("failed to create index directory {:?}: {err}", dir))
        })?;

        let db = Config::default()
            .path(&dir)
            .cache_capacity(64 * 1024 * 1024)
            .open()
            .map_err(|err| DomainError::index(format!("failed to open sled db: {err}")))?;

        let entries = db
            .open_tree(ENTRIES_TREE)
            .map_err(|err| DomainError::index(format!("failed to open entries tree: {err}")))?;

        Ok(Self {
            db,
            entries,
            data_dir: dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .serialize(value)
            .map_err(|err| DomainError::index(format!("serialization error: {err}")))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .deserialize(bytes)
            .map_err(|err| DomainError::index(format!("deserialization error: {err}")))
    }

    fn read_entries(&self) -> impl Iterator<Item = Result<NoveltyIndexEntry, DomainError>> + '_ {
        self.entries
            .iter()
            .map(|entry| -> Result<NoveltyIndexEntry, DomainError> {
                let (_, value) = entry.map_err(|err| {
                    DomainError::index(format!("failed to read index entry: {err}"))
                })?;
                Self::deserialize(value.as_ref())
            })
    }
}

impl NoveltyIndex for SledNoveltyIndex {
    fn query(
        &self,
        embedding: &EmbeddingVector,
        k: usize,
    ) -> Result<Vec<(f32, NoveltyIndexEntry)>, DomainError> {
        rank_neighbors(embedding, self.read_entries(), k)
    }

    fn insert(&self, entry: &NoveltyIndexEntry) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock();

        let bytes = Self::serialize(entry)?;
        self.entries
            .compare_and_swap(entry.position.as_bytes(), None as Option<&[u8]>, Some(bytes))
            .map_err(|err| DomainError::index(format!("failed to insert index entry: {err}")))?
            .map_err(|_| {
                DomainError::duplicate(format!("position `{}` already indexed", entry.position))
            })
    }

    fn len(&self) -> Result<usize, DomainError> {
        Ok(self.entries.len())
    }

    fn persist(&self) -> Result<(), DomainError> {
        self.db
            .flush()
            .map_err(|err| DomainError::index(format!("failed to flush index: {err}")))?;
        Ok(())
    }

    fn ping(&self) -> Result<(), DomainError> {
        self.entries
            .first()
            .map_err(|err| DomainError::index(format!("index not readable: {err}")))?;
        Ok(())
    }
}
