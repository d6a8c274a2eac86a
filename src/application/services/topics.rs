use std::sync::Arc;

use tracing::{debug, warn};

use crate::{application::services::CompletionEngine, domain::TextUnit};

/// Assigns the topic (destination container) for every card from one unit.
///
/// With no configured topic list every unit lands in the default topic.
/// Otherwise the completion engine classifies the unit into one of the
/// configured labels; unknown answers and provider failures fall back to the
/// default.
pub struct TopicAssigner {
    llm: Option<Arc<dyn CompletionEngine>>,
    topics: Vec<String>,
    default_topic: String,
}

impl TopicAssigner {
    pub fn fixed(default_topic: impl Into<String>) -> Self {
        Self {
            llm: None,
            topics: Vec::new(),
            default_topic: default_topic.into(),
        }
    }

    pub fn classifying(
        llm: Arc<dyn CompletionEngine>,
        topics: Vec<String>,
        default_topic: impl Into<String>,
    ) -> Self {
        let topics = topics
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            llm: Some(llm),
            topics,
            default_topic: default_topic.into(),
        }
    }

    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    pub fn assign(&self, unit: &TextUnit) -> String {
        let Some(llm) = self.llm.as_ref().filter(|_| !self.topics.is_empty()) else {
            return self.default_topic.clone();
        };

        match llm.complete(&self.prompt(&unit.text)) {
            Ok(answer) => self.match_topic(&answer).unwrap_or_else(|| {
                debug!(unit = %unit.position, answer = %answer.trim(), "unrecognised topic, using default");
                self.default_topic.clone()
            }),
            Err(err) => {
                warn!(unit = %unit.position, error = %err, "topic classification failed, using default");
                self.default_topic.clone()
            }
        }
    }

    fn match_topic(&self, answer: &str) -> Option<String> {
        let cleaned = answer
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())?
            .trim_matches(|c: char| c == '.' || c == '"' || c == '\'' || c == '*')
            .trim();

        self.topics
            .iter()
            .find(|topic| topic.eq_ignore_ascii_case(cleaned))
            .cloned()
    }

    fn prompt(&self, text: &str) -> String {
        format!(
            "Classify the following passage into exactly one of these topics: {}.\n\
             Respond with the topic name only.\n\n{text}",
            self.topics.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedCompletion;

    fn topics() -> Vec<String> {
        vec!["Operating Systems".into(), "Concurrency".into()]
    }

    #[test]
    fn test_fixed_assigner_uses_default() {
        let assigner = TopicAssigner::fixed("OSTEP");
        assert_eq!(assigner.assign(&TextUnit::new("doc#0", "text")), "OSTEP");
    }

    #[test]
    fn test_classifier_matches_case_insensitively() {
        let llm = Arc::new(ScriptedCompletion::new(["  concurrency.\n"]));
        let assigner = TopicAssigner::classifying(llm, topics(), "OSTEP");
        assert_eq!(
            assigner.assign(&TextUnit::new("doc#0", "Locks and threads")),
            "Concurrency"
        );
    }

    #[test]
    fn test_classifier_falls_back_on_unknown_label() {
        let llm = Arc::new(ScriptedCompletion::new(["Networking"]));
        let assigner = TopicAssigner::classifying(llm, topics(), "OSTEP");
        assert_eq!(assigner.assign(&TextUnit::new("doc#0", "Sockets")), "OSTEP");
    }

    #[test]
    fn test_classifier_falls_back_on_provider_failure() {
        let llm = Arc::new(ScriptedCompletion::failing());
        let assigner = TopicAssigner::classifying(llm, topics(), "OSTEP");
        assert_eq!(assigner.assign(&TextUnit::new("doc#0", "text")), "OSTEP");
    }

    #[test]
    fn test_empty_topic_list_skips_classification() {
        let llm = Arc::new(ScriptedCompletion::new(["Concurrency"]));
        let assigner = TopicAssigner::classifying(llm.clone(), vec!["  ".into()], "OSTEP");
        assert_eq!(assigner.assign(&TextUnit::new("doc#0", "text")), "OSTEP");
        assert_eq!(llm.calls(), 0);
    }
}
