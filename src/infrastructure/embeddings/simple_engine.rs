use ahash::AHasher;
use std::hash::{Hash, Hasher};

use crate::{application::services::EmbeddingEngine, domain::DomainError};

/// Deterministic offline embedder that hashes lower-cased tokens into a
/// fixed-size, L2-normalised vector. Identical text always yields identical
/// vectors (self-similarity 1.0), which is all the novelty filter needs for
/// exact and near-exact duplicates.
pub struct SimpleEmbedEngine {
    model_name: String,
    dimensions: usize,
}

impl SimpleEmbedEngine {
    pub fn try_new(model_name: impl Into<String>, dimensions: usize) -> Result<Self, DomainError> {
        if dimensions == 0 {
            return Err(DomainError::validation(
                "embedding dimensions must be greater than zero",
            ));
        }
        Ok(Self {
            model_name: model_name.into(),
            dimensions: dimensions.clamp(8, 4096),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn tokenize<'a>(&self, text: &'a str) -> impl Iterator<Item = &'a str> {
        text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .filter(|token| !token.is_empty())
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = AHasher::default();
        token.to_lowercase().hash(&mut hasher);
        (hasher.finish() % self.dimensions as u64) as usize
    }

    fn embed_internal(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in self.tokenize(text) {
            vector[self.bucket(token)] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl EmbeddingEngine for SimpleEmbedEngine {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError> {
        if !model.eq_ignore_ascii_case(&self.model_name) {
            return Err(DomainError::embedding(format!(
                "engine initialised for `{}` but `{}` requested",
                self.model_name, model
            )));
        }
        if self.tokenize(text).next().is_none() {
            return Err(DomainError::validation(
                "text payload has no tokens to embed",
            ));
        }
        Ok(self.embed_internal(text))
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EmbeddingVector;

    #[test]
    fn test_identical_text_has_unit_self_similarity() {
        let engine = SimpleEmbedEngine::try_new("m", 128).unwrap();
        let a = EmbeddingVector::new("m", engine.embed("m", "Processes are isolated.").unwrap());
        let b = EmbeddingVector::new("m", engine.embed("m", "Processes are isolated.").unwrap());
        assert!((a.cosine_similarity(&b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_wrong_model() {
        let engine = SimpleEmbedEngine::try_new("m", 128).unwrap();
        assert!(engine.embed("other", "text").is_err());
    }

    #[test]
    fn test_rejects_token_free_text() {
        let engine = SimpleEmbedEngine::try_new("m", 128).unwrap();
        assert!(engine.embed("m", " ... ").is_err());
    }

    #[test]
    fn test_dimensions_are_clamped() {
        let engine = SimpleEmbedEngine::try_new("m", 2).unwrap();
        assert_eq!(engine.dims("m"), Some(8));
        assert!(SimpleEmbedEngine::try_new("m", 0).is_err());
    }
}
