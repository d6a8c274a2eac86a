use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// A contiguous span of source text plus its position identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    pub position: String,
    pub text: String,
}

impl TextUnit {
    pub fn new(position: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            position: position.into(),
            text: text.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Vector representation of a text unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub model: String,
    pub vector: Vec<f32>,
}

impl EmbeddingVector {
    pub fn new(model: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            model: model.into(),
            vector,
        }
    }

    pub fn dims(&self) -> usize {
        self.vector.len()
    }

    /// Cosine similarity clamped to `[-1, 1]`.
    pub fn cosine_similarity(&self, other: &EmbeddingVector) -> Result<f32, DomainError> {
        if self.dims() != other.dims() {
            return Err(DomainError::embedding(format!(
                "embedding dimension mismatch: query {} vs candidate {}",
                self.dims(),
                other.dims()
            )));
        }

        let mut dot = 0.0f32;
        let mut q_norm = 0.0f32;
        let mut c_norm = 0.0f32;

        for (q, c) in self.vector.iter().zip(other.vector.iter()) {
            dot += q * c;
            q_norm += q * q;
            c_norm += c * c;
        }

        let denom = q_norm.sqrt() * c_norm.sqrt();
        if denom == 0.0 {
            return Err(DomainError::embedding(
                "cannot compute cosine similarity with zero vector",
            ));
        }

        Ok((dot / denom).clamp(-1.0, 1.0))
    }
}

/// Persisted record of a unit that entered the novelty index.
///
/// Entries are keyed by `position`; the store never updates or deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoveltyIndexEntry {
    pub position: String,
    pub embedding: EmbeddingVector,
    pub text: String,
    pub indexed_at: DateTime<Utc>,
}

impl NoveltyIndexEntry {
    pub fn new(unit: &TextUnit, embedding: EmbeddingVector) -> Self {
        Self {
            position: unit.position.clone(),
            embedding,
            text: unit.text.clone(),
            indexed_at: Utc::now(),
        }
    }
}

/// One extractable idea named within a text unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept(pub String);

impl Concept {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Unvalidated question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardCandidate {
    pub question: String,
    pub answer: String,
    pub topic: String,
}

impl CardCandidate {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            topic: topic.into(),
        }
    }
}

/// A candidate that passed quality validation, queued for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedCard {
    pub card: CardCandidate,
    pub source_position: String,
}

impl AcceptedCard {
    pub fn new(card: CardCandidate, source_position: impl Into<String>) -> Self {
        Self {
            card,
            source_position: source_position.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.card.topic
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed { reason: String, detail: String },
}

/// Per-card delivery outcome. Reported, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub topic: String,
    pub question: String,
    pub source_position: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

impl DeliveryResult {
    pub fn delivered(card: &AcceptedCard) -> Self {
        Self::with_status(card, DeliveryStatus::Delivered)
    }

    pub fn failed(card: &AcceptedCard, err: &DomainError) -> Self {
        Self::with_status(
            card,
            DeliveryStatus::Failed {
                reason: err.kind().to_string(),
                detail: err.to_string(),
            },
        )
    }

    fn with_status(card: &AcceptedCard, status: DeliveryStatus) -> Self {
        Self {
            topic: card.card.topic.clone(),
            question: card.card.question.clone(),
            source_position: card.source_position.clone(),
            status,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self.status, DeliveryStatus::Delivered)
    }
}

/// Topic label used as a sink tag: every whitespace character becomes `_`.
pub fn normalize_topic_tag(topic: &str) -> String {
    topic
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}
