use std::str::FromStr;

use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use parking_lot::Mutex;

use crate::{application::services::EmbeddingEngine, domain::DomainError};

/// Local ONNX embedder (for example `sentence-transformers/all-MiniLM-L6-v2`).
///
/// The loaded model sits behind a `Mutex` because inference needs `&mut`.
pub struct FastEmbedEngine {
    model_label: String,
    dimensions: usize,
    inner: Mutex<TextEmbedding>,
}

impl FastEmbedEngine {
    pub fn try_new(model_name: impl AsRef<str>) -> Result<Self, DomainError> {
        let label = model_name.as_ref().trim();
        if label.is_empty() {
            return Err(DomainError::validation("fastembed model name cannot be empty"));
        }

        let model = EmbeddingModel::from_str(label).map_err(|err| {
            DomainError::validation(format!("unknown fastembed model `{label}`: {err}"))
        })?;
        let dimensions = TextEmbedding::get_model_info(&model)
            .map_err(|err| DomainError::provider(format!("no metadata for `{label}`: {err}")))?
            .dim;
        let embedding = TextEmbedding::try_new(TextInitOptions::new(model)).map_err(|err| {
            DomainError::provider(format!("failed to load fastembed model `{label}`: {err}"))
        })?;

        Ok(Self {
            model_label: label.to_string(),
            dimensions,
            inner: Mutex::new(embedding),
        })
    }
}

impl EmbeddingEngine for FastEmbedEngine {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError> {
        if !model.eq_ignore_ascii_case(&self.model_label) {
            return Err(DomainError::embedding(format!(
                "engine initialised for `{}` but `{}` requested",
                self.model_label, model
            )));
        }
        if text.trim().is_empty() {
            return Err(DomainError::validation("text payload cannot be empty"));
        }

        let vector = self
            .inner
            .lock()
            .embed(vec![text], None)
            .map_err(|err| DomainError::provider(format!("fastembed inference failed: {err}")))?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::provider("fastembed returned no embedding"))?;

        if vector.len() != self.dimensions {
            return Err(DomainError::embedding(format!(
                "unexpected embedding dimension (expected {}, got {})",
                self.dimensions,
                vector.len()
            )));
        }
        Ok(vector)
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }
}
