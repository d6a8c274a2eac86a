//! Offline sink that appends cards to a JSON Lines file instead of a
//! remote store.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{application::services::FlashcardSink, domain::DomainError};

/// One line of the export file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedCard {
    pub deck: String,
    pub question: String,
    pub answer: String,
    pub tags: Vec<String>,
    pub exported_at: DateTime<Utc>,
}

pub struct JsonlFileSink {
    path: PathBuf,
    decks: Mutex<BTreeSet<String>>,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlFileSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                DomainError::other(format!("failed to create {:?}: {err}", parent))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| DomainError::other(format!("failed to open {:?}: {err}", path)))?;

        Ok(Self {
            path,
            decks: Mutex::new(BTreeSet::new()),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FlashcardSink for JsonlFileSink {
    fn ensure_container(&self, name: &str) -> Result<(), DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::container("deck name cannot be empty"));
        }
        self.decks.lock().insert(name.to_string());
        Ok(())
    }

    fn add_card(
        &self,
        container: &str,
        question: &str,
        answer: &str,
        tags: &[String],
    ) -> Result<(), DomainError> {
        if !self.decks.lock().contains(container) {
            return Err(DomainError::delivery(format!("deck `{container}` was not ensured")));
        }

        let line = serde_json::to_string(&ExportedCard {
            deck: container.to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            tags: tags.to_vec(),
            exported_at: Utc::now(),
        })
        .map_err(|err| DomainError::delivery(format!("serialization error: {err}")))?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")
            .and_then(|_| writer.flush())
            .map_err(|err| DomainError::delivery(format!("write to {:?} failed: {err}", self.path)))
    }
}
