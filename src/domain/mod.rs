//! Domain layer: core entities and value objects for the card pipeline.

pub mod errors;
pub mod models;

pub use errors::DomainError;
pub use models::{
    normalize_topic_tag, AcceptedCard, CardCandidate, Concept, DeliveryResult, DeliveryStatus,
    EmbeddingVector, NoveltyIndexEntry, TextUnit,
};
