use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod settings;

#[cfg(test)]
mod test_support;

use application::services::{
    CardSynthesizer, CompletionEngine, ConceptExtractor, EmbeddingEngine as EmbeddingEngineTrait,
    FlashcardSink, LengthHeuristicValidator, LlmJudgeValidator, NoveltyFilter, NoveltyIndex,
    PipelineService, QualityValidator, ServiceConfig, SyncDispatcher, TopicAssigner,
};
use domain::TextUnit;
#[cfg(feature = "fastembed-engine")]
use infrastructure::FastEmbedEngine;
use infrastructure::{
    load_text, AnkiConnectSink, FixedWindowChunker, InMemoryNoveltyIndex, JsonlFileSink,
    OpenAiCompletionEngine, OpenAiEmbeddingEngine, OpenAiHttp, SimpleEmbedEngine,
    SledNoveltyIndex,
};
use settings::{AppConfig, EmbeddingBackend, ValidatorKind};

/// Where accepted cards go.
#[derive(Debug, Clone)]
pub enum SinkTarget {
    AnkiConnect,
    JsonlFile(PathBuf),
}

/// Where the novelty index lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTarget {
    Persistent,
    Ephemeral,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub sink: SinkTarget,
    pub index: IndexTarget,
}

/// Initialise the global subscriber once. `CARDSMITH_LOG` holds the filter.
pub fn init_tracing() {
    static INIT: std::sync::OnceLock<()> = std::sync::OnceLock::new();

    let _ = INIT.get_or_init(|| {
        let filter = std::env::var("CARDSMITH_LOG").unwrap_or_else(|_| "info".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init();
    });
}

/// Wire every adapter named by `config` into a ready pipeline.
pub fn build_pipeline(config: &AppConfig, options: &BuildOptions) -> Result<PipelineService> {
    let llm = init_llm(config).context("failed to initialise completion engine")?;
    let embedder = init_embedder(config).context("failed to initialise embedding backend")?;
    let index = init_index(config, options.index).context("failed to open novelty index")?;
    let sink = init_sink(config, &options.sink).context("failed to initialise card sink")?;

    let novelty = NoveltyFilter::new(config.novelty.neighbors, config.novelty.threshold)
        .map_err(|err| anyhow!(err))?;
    let service_config = ServiceConfig::new(
        config.embedding.model_name(),
        novelty,
        config.novelty.index_policy,
    );

    let topics = if config.topics.is_empty() {
        TopicAssigner::fixed(&config.default_topic)
    } else {
        TopicAssigner::classifying(
            Arc::clone(&llm),
            config.topics.clone(),
            &config.default_topic,
        )
    };

    Ok(PipelineService::new(
        embedder,
        index,
        ConceptExtractor::new(Arc::clone(&llm)),
        CardSynthesizer::new(Arc::clone(&llm)),
        topics,
        init_validator(config, Arc::clone(&llm)),
        SyncDispatcher::new(sink),
        service_config,
    ))
}

/// Read and chunk a text document into units tagged `<source>#<n>@<hash>`.
pub fn load_units(path: &Path, source: &str, config: &AppConfig) -> Result<Vec<TextUnit>> {
    let text = load_text(path).map_err(|err| anyhow!(err))?;
    let chunker = FixedWindowChunker::new(config.chunking.size, config.chunking.overlap)
        .map_err(|err| anyhow!(err))?;
    let units = chunker.chunk(source, &text);
    info!(source, units = units.len(), "document split into units");
    Ok(units)
}

pub fn resolve_data_dir(config: &AppConfig) -> Result<PathBuf> {
    let dir = match &config.data_dir {
        Some(dir) => dir.clone(),
        None => directories::ProjectDirs::from("dev", "cardsmith", "Cardsmith")
            .ok_or_else(|| anyhow!("unable to determine OS data dir"))?
            .data_dir()
            .to_path_buf(),
    };
    std::fs::create_dir_all(&dir).context("failed to create data directory")?;
    Ok(dir)
}

fn openai_http(config: &AppConfig) -> Result<OpenAiHttp> {
    let api_key = config.api_key().map_err(|err| anyhow!(err))?;
    OpenAiHttp::new(
        api_key,
        &config.openai.base_url,
        Duration::from_secs(config.llm.timeout_secs),
        config.llm.max_retries,
    )
    .map_err(|err| anyhow!(err))
}

fn init_llm(config: &AppConfig) -> Result<Arc<dyn CompletionEngine>> {
    let engine = OpenAiCompletionEngine::new(
        openai_http(config)?,
        config.llm.model.clone(),
        config.llm.temperature,
    );
    Ok(Arc::new(engine))
}

fn init_embedder(config: &AppConfig) -> Result<Arc<dyn EmbeddingEngineTrait>> {
    match &config.embedding {
        EmbeddingBackend::Simple { model, dimensions } => {
            let engine = SimpleEmbedEngine::try_new(model.clone(), *dimensions)
                .map_err(|err| anyhow!(err))?;
            Ok(Arc::new(engine))
        }
        EmbeddingBackend::Openai { model, dimensions } => {
            let engine = OpenAiEmbeddingEngine::new(openai_http(config)?, model.clone(), *dimensions);
            Ok(Arc::new(engine))
        }
        #[cfg(feature = "fastembed-engine")]
        EmbeddingBackend::FastEmbed { model } => {
            let engine = FastEmbedEngine::try_new(model).map_err(|err| anyhow!(err))?;
            Ok(Arc::new(engine))
        }
    }
}

fn init_index(config: &AppConfig, target: IndexTarget) -> Result<Arc<dyn NoveltyIndex>> {
    match target {
        IndexTarget::Ephemeral => Ok(Arc::new(InMemoryNoveltyIndex::new())),
        IndexTarget::Persistent => {
            // One index per embedding model: vectors from different models
            // are not comparable.
            let model_dir = config
                .embedding
                .model_name()
                .replace(['\\', '/', ':'], "-");
            let path = resolve_data_dir(config)?.join("index").join(model_dir);
            let index = SledNoveltyIndex::open(&path).map_err(|err| anyhow!(err))?;
            info!(path = %path.display(), entries = index.len().unwrap_or(0), "novelty index opened");
            Ok(Arc::new(index))
        }
    }
}

fn init_sink(config: &AppConfig, target: &SinkTarget) -> Result<Arc<dyn FlashcardSink>> {
    match target {
        SinkTarget::JsonlFile(path) => {
            Ok(Arc::new(JsonlFileSink::create(path).map_err(|err| anyhow!(err))?))
        }
        SinkTarget::AnkiConnect => {
            let sink = AnkiConnectSink::new(&config.sink.anki_connect_url, &config.sink.note_model);
            match sink.version() {
                Ok(version) => info!(url = %config.sink.anki_connect_url, version, "AnkiConnect reachable"),
                Err(err) => warn!(
                    url = %config.sink.anki_connect_url,
                    error = %err,
                    "AnkiConnect not reachable; deliveries will be reported as failed"
                ),
            }
            Ok(Arc::new(sink))
        }
    }
}

fn init_validator(
    config: &AppConfig,
    llm: Arc<dyn CompletionEngine>,
) -> Arc<dyn QualityValidator> {
    let heuristic = LengthHeuristicValidator {
        min_question_chars: config.validator.min_question_chars,
        min_answer_chars: config.validator.min_answer_chars,
        accept_score: config.validator.accept_score,
    };
    match config.validator.kind {
        ValidatorKind::Heuristic => Arc::new(heuristic),
        ValidatorKind::Llm => Arc::new(LlmJudgeValidator::new(llm, heuristic)),
    }
}
