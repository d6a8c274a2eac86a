use thiserror::Error;

/// Domain-level errors shared across pipeline components.
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    /// Configuration or input violated an invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Embedding or completion capability unreachable or erroring.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Generation response did not contain the expected markers.
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// The sink refused to create (or confirm) a destination container.
    #[error("container creation failed: {0}")]
    ContainerCreationFailed(String),

    /// The sink rejected a single card.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// Novelty store unreachable or unreadable.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    /// An index entry with the same position identifier already exists.
    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Vector incompatibility (dimension mismatch, zero vector).
    #[error("embedding mismatch: {0}")]
    Embedding(String),

    /// The caller cancelled the run or the unit ran out of time.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Any other unexpected failure.
    #[error("unexpected error: {0}")]
    Other(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::ProviderUnavailable(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseFailure(msg.into())
    }

    pub fn container(msg: impl Into<String>) -> Self {
        Self::ContainerCreationFailed(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::DeliveryFailed(msg.into())
    }

    pub fn index(msg: impl Into<String>) -> Self {
        Self::IndexUnavailable(msg.into())
    }

    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::DuplicateEntry(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Stable label used when failures are attached to report items.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::ParseFailure(_) => "parse_failure",
            Self::ContainerCreationFailed(_) => "container_unavailable",
            Self::DeliveryFailed(_) => "delivery_failed",
            Self::IndexUnavailable(_) => "index_unavailable",
            Self::DuplicateEntry(_) => "duplicate_entry",
            Self::Embedding(_) => "embedding_mismatch",
            Self::Cancelled(_) => "cancelled",
            Self::Other(_) => "other",
        }
    }
}
