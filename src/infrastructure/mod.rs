//! Infrastructure layer wiring concrete adapters (embeddings, index, sinks, etc).

pub mod documents;
pub mod embeddings;
pub mod export;
pub mod http_client;
pub mod storage;

pub use documents::{load_text, FixedWindowChunker};
#[cfg(feature = "fastembed-engine")]
pub use embeddings::FastEmbedEngine;
pub use embeddings::{OpenAiEmbeddingEngine, SimpleEmbedEngine};
pub use export::JsonlFileSink;
pub use http_client::{AnkiConnectSink, OpenAiCompletionEngine, OpenAiHttp};
pub use storage::{InMemoryNoveltyIndex, SledNoveltyIndex};
