use std::sync::Arc;

use crate::{
    application::services::CompletionEngine,
    domain::{CardCandidate, Concept, DomainError, TextUnit},
};

const QUESTION_MARKER: &str = "Q:";
const ANSWER_MARKER: &str = "A:";

/// Turns a text unit into the list of concepts it names.
pub struct ConceptExtractor {
    llm: Arc<dyn CompletionEngine>,
}

impl ConceptExtractor {
    pub fn new(llm: Arc<dyn CompletionEngine>) -> Self {
        Self { llm }
    }

    pub fn extract(&self, unit: &TextUnit) -> Result<Vec<Concept>, DomainError> {
        if unit.is_blank() {
            return Err(DomainError::validation(format!(
                "unit {} has no text to extract from",
                unit.position
            )));
        }

        let response = self.llm.complete(&Self::prompt(&unit.text))?;

        Ok(response
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| Concept(line.to_string()))
            .collect())
    }

    fn prompt(text: &str) -> String {
        format!(
            "From a computer-science perspective, extract ALL key concepts or facts \
             from the following passage:\n\n{text}\n\n\
             Return each concept on its own line."
        )
    }
}

/// Question/answer pair produced by synthesis, before a topic is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn into_candidate(self, topic: impl Into<String>) -> CardCandidate {
        CardCandidate::new(self.question, self.answer, topic)
    }
}

/// Turns a (concept, context) pair into a question/answer pair.
pub struct CardSynthesizer {
    llm: Arc<dyn CompletionEngine>,
}

impl CardSynthesizer {
    pub fn new(llm: Arc<dyn CompletionEngine>) -> Self {
        Self { llm }
    }

    pub fn synthesize(&self, concept: &Concept, context: &str) -> Result<QaPair, DomainError> {
        let response = self.llm.complete(&Self::prompt(concept.as_str(), context))?;
        parse_card_response(&response)
    }

    fn prompt(concept: &str, context: &str) -> String {
        format!(
            "Generate an Anki flashcard for the concept below. Use '{QUESTION_MARKER}' and \
             '{ANSWER_MARKER}' markers.\n\nConcept: {concept}\nContext: {context}"
        )
    }
}

/// Splits a generation response at the first answer marker.
pub fn parse_card_response(response: &str) -> Result<QaPair, DomainError> {
    let split_at = response.find(ANSWER_MARKER).ok_or_else(|| {
        DomainError::parse(format!("response has no `{ANSWER_MARKER}` marker"))
    })?;

    let (head, tail) = response.split_at(split_at);
    let question = head.trim().replacen(QUESTION_MARKER, "", 1).trim().to_string();
    let answer = tail[ANSWER_MARKER.len()..].trim().to_string();

    if question.is_empty() {
        return Err(DomainError::parse("question segment is empty"));
    }
    if answer.is_empty() {
        return Err(DomainError::parse("answer segment is empty"));
    }

    Ok(QaPair { question, answer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedCompletion;

    #[test]
    fn test_parse_basic_response() {
        let pair = parse_card_response("Q: What isolates execution?\nA: Processes do.").unwrap();
        assert_eq!(pair.question, "What isolates execution?");
        assert_eq!(pair.answer, "Processes do.");
    }

    #[test]
    fn test_parse_missing_answer_marker() {
        let err = parse_card_response("Q: What is a thread?").unwrap_err();
        assert!(matches!(err, DomainError::ParseFailure(_)));
    }

    #[test]
    fn test_parse_splits_at_earliest_answer_marker() {
        let pair =
            parse_card_response("Q: Name the isolation unit. A: a process\nA: Processes do.")
                .unwrap();
        assert_eq!(pair.question, "Name the isolation unit.");
        assert_eq!(pair.answer, "a process\nA: Processes do.");
    }

    #[test]
    fn test_parse_keeps_multiline_answer() {
        let pair = parse_card_response("Q: Name two states?\nA: Running.\nBlocked.").unwrap();
        assert_eq!(pair.answer, "Running.\nBlocked.");
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(parse_card_response("Q: \nA: something").is_err());
        assert!(parse_card_response("Q: something?\nA:   ").is_err());
    }

    #[test]
    fn test_extract_splits_lines_and_drops_blanks() {
        let llm = Arc::new(ScriptedCompletion::new(["Process isolation\n\n   \n  Context switch  \n"]));
        let extractor = ConceptExtractor::new(llm);
        let concepts = extractor
            .extract(&TextUnit::new("doc#0", "Processes are isolated execution contexts."))
            .unwrap();
        assert_eq!(
            concepts,
            vec![
                Concept("Process isolation".into()),
                Concept("Context switch".into())
            ]
        );
    }

    #[test]
    fn test_extract_zero_concepts_is_ok() {
        let llm = Arc::new(ScriptedCompletion::new(["   \n"]));
        let extractor = ConceptExtractor::new(llm);
        let concepts = extractor.extract(&TextUnit::new("doc#0", "Filler.")).unwrap();
        assert!(concepts.is_empty());
    }

    #[test]
    fn test_extract_refuses_blank_unit() {
        let llm = Arc::new(ScriptedCompletion::new(["unused"]));
        let extractor = ConceptExtractor::new(llm.clone());
        assert!(extractor.extract(&TextUnit::new("doc#0", "  ")).is_err());
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_extract_surfaces_provider_failure() {
        let llm = Arc::new(ScriptedCompletion::failing());
        let extractor = ConceptExtractor::new(llm);
        let err = extractor.extract(&TextUnit::new("doc#0", "text")).unwrap_err();
        assert!(matches!(err, DomainError::ProviderUnavailable(_)));
    }

    #[test]
    fn test_synthesize_includes_concept_and_context_in_prompt() {
        let llm = Arc::new(ScriptedCompletion::new(["Q: What is a TLB?\nA: A translation cache."]));
        let synthesizer = CardSynthesizer::new(llm.clone());
        let pair = synthesizer
            .synthesize(&Concept("TLB".into()), "The TLB caches translations.")
            .unwrap();
        assert_eq!(pair.question, "What is a TLB?");
        let prompt = llm.prompts().pop().unwrap();
        assert!(prompt.contains("Concept: TLB"));
        assert!(prompt.contains("Context: The TLB caches translations."));
    }
}
