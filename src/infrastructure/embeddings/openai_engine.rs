use serde::{Deserialize, Serialize};

use crate::{
    application::services::EmbeddingEngine, domain::DomainError,
    infrastructure::http_client::OpenAiHttp,
};

/// Embedding engine backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbeddingEngine {
    http: OpenAiHttp,
    model: String,
    dimensions: Option<usize>,
}

impl OpenAiEmbeddingEngine {
    pub fn new(http: OpenAiHttp, model: impl Into<String>, dimensions: Option<usize>) -> Self {
        Self {
            http,
            model: model.into(),
            dimensions,
        }
    }
}

impl EmbeddingEngine for OpenAiEmbeddingEngine {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError> {
        if !model.eq_ignore_ascii_case(&self.model) {
            return Err(DomainError::embedding(format!(
                "engine initialised for `{}` but `{}` requested",
                self.model, model
            )));
        }
        if text.trim().is_empty() {
            return Err(DomainError::validation("text payload cannot be empty"));
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: [text],
            dimensions: self.dimensions,
        };
        let response: EmbeddingResponse = self.http.post_json("embeddings", &request)?;

        let vector = response
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| DomainError::provider("embedding response had no data"))?;

        if let Some(expected) = self.dimensions {
            if vector.len() != expected {
                return Err(DomainError::embedding(format!(
                    "unexpected embedding dimension (expected {}, got {})",
                    expected,
                    vector.len()
                )));
            }
        }

        Ok(vector)
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        self.dimensions
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
