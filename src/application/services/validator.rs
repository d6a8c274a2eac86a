use std::sync::Arc;

use tracing::warn;

use crate::{
    application::services::{CompletionEngine, QualityValidator},
    domain::CardCandidate,
};

/// Length-based scoring gate.
///
/// Each satisfied condition (question longer than `min_question_chars`,
/// answer longer than `min_answer_chars`) adds 0.5; the card is accepted when
/// the score reaches `accept_score`.
#[derive(Debug, Clone)]
pub struct LengthHeuristicValidator {
    pub min_question_chars: usize,
    pub min_answer_chars: usize,
    pub accept_score: f32,
}

impl Default for LengthHeuristicValidator {
    fn default() -> Self {
        Self {
            min_question_chars: 20,
            min_answer_chars: 100,
            accept_score: 0.7,
        }
    }
}

impl LengthHeuristicValidator {
    pub fn score(&self, candidate: &CardCandidate) -> f32 {
        let mut score = 0.0;
        if candidate.question.chars().count() > self.min_question_chars {
            score += 0.5;
        }
        if candidate.answer.chars().count() > self.min_answer_chars {
            score += 0.5;
        }
        score
    }
}

impl QualityValidator for LengthHeuristicValidator {
    fn validate(&self, candidate: &CardCandidate) -> bool {
        self.score(candidate) >= self.accept_score
    }
}

/// Asks the completion engine for a VALID/INVALID judgment.
///
/// Falls back to the wrapped heuristic when the engine fails or answers with
/// neither label.
pub struct LlmJudgeValidator {
    llm: Arc<dyn CompletionEngine>,
    fallback: LengthHeuristicValidator,
}

impl LlmJudgeValidator {
    pub fn new(llm: Arc<dyn CompletionEngine>, fallback: LengthHeuristicValidator) -> Self {
        Self { llm, fallback }
    }

    fn prompt(candidate: &CardCandidate) -> String {
        format!(
            "You review study flashcards. A good card asks one clear question and \
             gives a correct, self-contained answer.\n\n\
             Question: {}\nAnswer: {}\n\n\
             Reply with exactly one word: VALID or INVALID.",
            candidate.question, candidate.answer
        )
    }
}

impl QualityValidator for LlmJudgeValidator {
    fn validate(&self, candidate: &CardCandidate) -> bool {
        match self.llm.complete(&Self::prompt(candidate)) {
            Ok(reply) => {
                let verdict = reply.trim().to_ascii_uppercase();
                if verdict.starts_with("INVALID") {
                    false
                } else if verdict.starts_with("VALID") {
                    true
                } else {
                    warn!(reply = %reply.trim(), "ambiguous validator reply, using heuristic");
                    self.fallback.validate(candidate)
                }
            }
            Err(err) => {
                warn!(error = %err, "validator model unavailable, using heuristic");
                self.fallback.validate(candidate)
            }
        }
    }
}
