//! Service layer: the generation pipeline and the components it orchestrates.

mod dispatcher;
mod generation;
mod novelty;
mod pipeline_service;
mod topics;
mod validator;

pub use dispatcher::SyncDispatcher;
pub use generation::{parse_card_response, CardSynthesizer, ConceptExtractor, QaPair};
pub use novelty::{is_novel, judge_similarities, NoveltyDecision, NoveltyFilter};
pub use pipeline_service::{
    CompletionEngine, EmbeddingEngine, FlashcardSink, IndexPolicy, NoveltyIndex,
    PipelineService, QualityValidator, RunControl, ServiceConfig, UnitGuard,
};
pub use topics::TopicAssigner;
pub use validator::{LengthHeuristicValidator, LlmJudgeValidator};
