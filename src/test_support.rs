//! Hand-written fakes shared by unit tests.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::{
    application::services::{CompletionEngine, FlashcardSink, NoveltyIndex},
    domain::{DomainError, EmbeddingVector, NoveltyIndexEntry},
};

/// Completion engine that replays queued responses in order.
#[derive(Default)]
pub struct ScriptedCompletion {
    queue: Mutex<VecDeque<Result<String, DomainError>>>,
    prompts: Mutex<Vec<String>>,
    always_fail: bool,
}

impl ScriptedCompletion {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    pub fn push(&self, response: impl Into<String>) {
        self.queue.lock().push_back(Ok(response.into()));
    }

    pub fn fail_next(&self) {
        self.queue
            .lock()
            .push_back(Err(DomainError::provider("scripted outage")));
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl CompletionEngine for ScriptedCompletion {
    fn complete(&self, prompt: &str) -> Result<String, DomainError> {
        self.prompts.lock().push(prompt.to_string());
        if self.always_fail {
            return Err(DomainError::provider("completion engine offline"));
        }
        self.queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(DomainError::provider("script exhausted")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCard {
    pub container: String,
    pub question: String,
    pub answer: String,
    pub tags: Vec<String>,
}

/// Sink that records deliveries and refuses configured containers/questions.
#[derive(Default)]
pub struct RecordingSink {
    refused_containers: Vec<String>,
    refused_questions: Vec<String>,
    ensured: Mutex<Vec<String>>,
    cards: Mutex<Vec<RecordedCard>>,
    attempts: Mutex<usize>,
}

impl RecordingSink {
    pub fn refuse_container(mut self, name: &str) -> Self {
        self.refused_containers.push(name.to_string());
        self
    }

    pub fn refuse_question(mut self, question: &str) -> Self {
        self.refused_questions.push(question.to_string());
        self
    }

    pub fn ensured(&self) -> Vec<String> {
        self.ensured.lock().clone()
    }

    pub fn cards(&self) -> Vec<RecordedCard> {
        self.cards.lock().clone()
    }

    pub fn add_attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

impl FlashcardSink for RecordingSink {
    fn ensure_container(&self, name: &str) -> Result<(), DomainError> {
        if self.refused_containers.iter().any(|c| c == name) {
            return Err(DomainError::container(format!("deck `{name}` refused")));
        }
        let mut ensured = self.ensured.lock();
        if !ensured.iter().any(|c| c == name) {
            ensured.push(name.to_string());
        }
        Ok(())
    }

    fn add_card(
        &self,
        container: &str,
        question: &str,
        answer: &str,
        tags: &[String],
    ) -> Result<(), DomainError> {
        *self.attempts.lock() += 1;
        if self.refused_questions.iter().any(|q| q == question) {
            return Err(DomainError::delivery("note rejected"));
        }
        self.cards.lock().push(RecordedCard {
            container: container.to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            tags: tags.to_vec(),
        });
        Ok(())
    }
}

/// Index whose every call fails as if the store were unreachable.
pub struct UnavailableIndex;

impl NoveltyIndex for UnavailableIndex {
    fn query(
        &self,
        _embedding: &EmbeddingVector,
        _k: usize,
    ) -> Result<Vec<(f32, NoveltyIndexEntry)>, DomainError> {
        Err(DomainError::index("connection refused"))
    }

    fn insert(&self, _entry: &NoveltyIndexEntry) -> Result<(), DomainError> {
        Err(DomainError::index("connection refused"))
    }

    fn len(&self) -> Result<usize, DomainError> {
        Err(DomainError::index("connection refused"))
    }

    fn persist(&self) -> Result<(), DomainError> {
        Err(DomainError::index("connection refused"))
    }

    fn ping(&self) -> Result<(), DomainError> {
        Err(DomainError::index("connection refused"))
    }
}
