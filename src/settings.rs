use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::application::services::IndexPolicy;
use crate::domain::DomainError;
use crate::infrastructure::http_client::{DEFAULT_ANKI_CONNECT_URL, DEFAULT_OPENAI_BASE_URL};

/// Default filename looked up inside the data directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Embedding backends compiled into the binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    /// Deterministic token-hash embedder (always available, offline).
    Simple {
        #[serde(default = "default_simple_model")]
        model: String,
        #[serde(default = "default_simple_dim")]
        dimensions: usize,
    },
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai {
        #[serde(default = "default_openai_embedding_model")]
        model: String,
        #[serde(default)]
        dimensions: Option<usize>,
    },
    /// Local ONNX sentence embeddings via fastembed (feature gated).
    #[cfg(feature = "fastembed-engine")]
    #[serde(rename = "fastembed")]
    FastEmbed {
        #[serde(default = "default_fastembed_model")]
        model: String,
    },
}

impl EmbeddingBackend {
    pub fn id(&self) -> &'static str {
        match self {
            EmbeddingBackend::Simple { .. } => "simple",
            EmbeddingBackend::Openai { .. } => "openai",
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { .. } => "fastembed",
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            EmbeddingBackend::Simple { model, .. } => model,
            EmbeddingBackend::Openai { model, .. } => model,
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { model } => model,
        }
    }

    pub fn with_default_model(id: &str) -> Option<Self> {
        match id {
            "simple" => Some(EmbeddingBackend::Simple {
                model: default_simple_model(),
                dimensions: default_simple_dim(),
            }),
            "openai" => Some(EmbeddingBackend::Openai {
                model: default_openai_embedding_model(),
                dimensions: None,
            }),
            #[cfg(feature = "fastembed-engine")]
            "fastembed" => Some(EmbeddingBackend::FastEmbed {
                model: default_fastembed_model(),
            }),
            _ => None,
        }
    }

    fn set_model(&mut self, name: String) {
        match self {
            EmbeddingBackend::Simple { model, .. } => *model = name,
            EmbeddingBackend::Openai { model, .. } => *model = name,
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { model } => *model = name,
        }
    }
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        EmbeddingBackend::Simple {
            model: default_simple_model(),
            dimensions: default_simple_dim(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoveltySettings {
    pub threshold: f32,
    pub neighbors: usize,
    pub index_policy: IndexPolicy,
}

impl Default for NoveltySettings {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            neighbors: 1,
            index_policy: IndexPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            size: 1000,
            overlap: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidatorKind {
    #[default]
    Heuristic,
    Llm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorSettings {
    pub kind: ValidatorKind,
    pub min_question_chars: usize,
    pub min_answer_chars: usize,
    pub accept_score: f32,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            kind: ValidatorKind::default(),
            min_question_chars: 20,
            min_answer_chars: 100,
            accept_score: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub anki_connect_url: String,
    pub note_model: String,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            anki_connect_url: DEFAULT_ANKI_CONNECT_URL.into(),
            note_model: "Basic".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

/// Credentials never round-trip through serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.into(),
        }
    }
}

/// Complete run configuration, constructed once at start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub novelty: NoveltySettings,
    pub chunking: ChunkingSettings,
    pub default_topic: String,
    pub topics: Vec<String>,
    pub validator: ValidatorSettings,
    pub sink: SinkSettings,
    pub embedding: EmbeddingBackend,
    pub llm: LlmSettings,
    pub openai: OpenAiSettings,
    pub data_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            novelty: NoveltySettings::default(),
            chunking: ChunkingSettings::default(),
            default_topic: "OSTEP".into(),
            topics: Vec::new(),
            validator: ValidatorSettings::default(),
            sink: SinkSettings::default(),
            embedding: EmbeddingBackend::default(),
            llm: LlmSettings::default(),
            openai: OpenAiSettings::default(),
            data_dir: None,
        }
    }
}

impl AppConfig {
    /// Defaults, then the JSON file (if any), then environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, DomainError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, DomainError> {
        let bytes = fs::read(path)
            .map_err(|err| DomainError::validation(format!("failed to read {:?}: {err}", path)))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| DomainError::validation(format!("invalid config {:?}: {err}", path)))
    }

    /// Overlay values from an environment-style lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), DomainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(raw) = get("NOVELTY_THRESHOLD") {
            self.novelty.threshold = parse_env("NOVELTY_THRESHOLD", &raw)?;
        }
        if let Some(raw) = get("NOVELTY_NEIGHBORS") {
            self.novelty.neighbors = parse_env("NOVELTY_NEIGHBORS", &raw)?;
        }
        if let Some(raw) = get("NOVELTY_INDEX_POLICY") {
            self.novelty.index_policy = match raw.as_str() {
                "processed-only" => IndexPolicy::ProcessedOnly,
                "all-attempted" => IndexPolicy::AllAttempted,
                other => {
                    return Err(DomainError::validation(format!(
                        "NOVELTY_INDEX_POLICY must be `processed-only` or `all-attempted`, got `{other}`"
                    )))
                }
            };
        }
        if let Some(raw) = get("CHUNK_SIZE") {
            self.chunking.size = parse_env("CHUNK_SIZE", &raw)?;
        }
        if let Some(raw) = get("CHUNK_OVERLAP") {
            self.chunking.overlap = parse_env("CHUNK_OVERLAP", &raw)?;
        }
        if let Some(topic) = get("DEFAULT_TOPIC") {
            self.default_topic = topic;
        }
        if let Some(raw) = get("CARD_TOPICS") {
            self.topics = raw
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Some(raw) = get("CARD_VALIDATOR") {
            self.validator.kind = match raw.as_str() {
                "heuristic" => ValidatorKind::Heuristic,
                "llm" => ValidatorKind::Llm,
                other => {
                    return Err(DomainError::validation(format!(
                        "CARD_VALIDATOR must be `heuristic` or `llm`, got `{other}`"
                    )))
                }
            };
        }
        if let Some(url) = get("ANKI_CONNECT_URL") {
            self.sink.anki_connect_url = url;
        }
        if let Some(id) = get("EMBEDDING_BACKEND") {
            if id != self.embedding.id() {
                self.embedding = EmbeddingBackend::with_default_model(&id).ok_or_else(|| {
                    DomainError::validation(format!("unknown embedding backend `{id}`"))
                })?;
            }
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            self.embedding.set_model(model);
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.openai.base_url = url;
        }
        if let Some(dir) = get("CARDSMITH_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if !(0.0..=1.0).contains(&self.novelty.threshold) {
            return Err(DomainError::validation(format!(
                "novelty threshold must lie in [0, 1], got {}",
                self.novelty.threshold
            )));
        }
        if self.novelty.neighbors == 0 {
            return Err(DomainError::validation("novelty neighbors must be at least 1"));
        }
        if self.chunking.size == 0 || self.chunking.overlap >= self.chunking.size {
            return Err(DomainError::validation(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunking.overlap, self.chunking.size
            )));
        }
        if self.default_topic.trim().is_empty() {
            return Err(DomainError::validation("default topic cannot be empty"));
        }
        Ok(())
    }

    pub fn api_key(&self) -> Result<&str, DomainError> {
        self.openai
            .api_key
            .as_deref()
            .ok_or_else(|| DomainError::validation("OPENAI_API_KEY is not set"))
    }
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T, DomainError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|err| DomainError::validation(format!("{key}: cannot parse `{raw}`: {err}")))
}

const fn default_simple_dim() -> usize {
    256
}

fn default_simple_model() -> String {
    "cardsmith/simple-hash".to_string()
}

fn default_openai_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

#[cfg(feature = "fastembed-engine")]
fn default_fastembed_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}
