//! Flashcard sink that talks to a running AnkiConnect add-on.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::application::services::FlashcardSink;
use crate::domain::DomainError;

use super::describe_http_error;

const API_VERSION: u8 = 6;

/// Every AnkiConnect response carries `result` and `error`; a non-null
/// `error` means the action failed.
#[derive(Debug, Deserialize)]
struct AnkiResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// `FlashcardSink` backed by AnkiConnect: containers are decks, cards are
/// notes of the configured note model with `Front`/`Back` fields.
pub struct AnkiConnectSink {
    url: String,
    note_model: String,
    agent: ureq::Agent,
}

impl AnkiConnectSink {
    pub fn new(url: impl Into<String>, note_model: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(30))
            .build();

        Self {
            url: url.into(),
            note_model: note_model.into(),
            agent,
        }
    }

    /// Version reported by AnkiConnect; used as a reachability probe.
    pub fn version(&self) -> Result<u64, String> {
        let result = self.invoke("version", json!({}))?;
        result
            .as_u64()
            .ok_or_else(|| format!("unexpected version payload: {result}"))
    }

    fn note_payload(&self, deck: &str, question: &str, answer: &str, tags: &[String]) -> Value {
        json!({
            "note": {
                "deckName": deck,
                "modelName": self.note_model,
                "fields": { "Front": question, "Back": answer },
                "tags": tags,
            }
        })
    }

    fn invoke(&self, action: &str, params: Value) -> Result<Value, String> {
        let payload = json!({
            "action": action,
            "version": API_VERSION,
            "params": params,
        });

        let response = self
            .agent
            .post(&self.url)
            .send_json(payload)
            .map_err(describe_http_error)?;

        let parsed: AnkiResponse = response
            .into_json()
            .map_err(|err| format!("failed to parse AnkiConnect response: {err}"))?;

        match parsed.error {
            Some(error) => Err(error),
            None => Ok(parsed.result),
        }
    }
}

impl FlashcardSink for AnkiConnectSink {
    fn ensure_container(&self, name: &str) -> Result<(), DomainError> {
        let deck_id = self
            .invoke("createDeck", json!({ "deck": name }))
            .map_err(|err| DomainError::container(format!("deck `{name}`: {err}")))?;
        debug!(deck = name, id = %deck_id, "deck ensured");
        Ok(())
    }

    fn add_card(
        &self,
        container: &str,
        question: &str,
        answer: &str,
        tags: &[String],
    ) -> Result<(), DomainError> {
        let params = self.note_payload(container, question, answer, tags);
        self.invoke("addNote", params)
            .map(|_| ())
            .map_err(|err| DomainError::delivery(format!("deck `{container}`: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_payload_shape() {
        let sink = AnkiConnectSink::new("http://localhost:8765", "Basic");
        let payload = sink.note_payload(
            "Operating Systems",
            "What is a process?",
            "A running program.",
            &["Operating_Systems".to_string()],
        );
        assert_eq!(payload["note"]["deckName"], "Operating Systems");
        assert_eq!(payload["note"]["modelName"], "Basic");
        assert_eq!(payload["note"]["fields"]["Front"], "What is a process?");
        assert_eq!(payload["note"]["fields"]["Back"], "A running program.");
        assert_eq!(payload["note"]["tags"][0], "Operating_Systems");
    }

    #[test]
    fn test_error_envelope_parses() {
        let parsed: AnkiResponse =
            serde_json::from_str(r#"{"result": null, "error": "deck was not found"}"#).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("deck was not found"));
    }

    #[test]
    fn test_unreachable_sink_reports_container_failure() {
        let sink = AnkiConnectSink::new("http://127.0.0.1:9", "Basic");
        assert!(matches!(
            sink.ensure_container("OSTEP"),
            Err(DomainError::ContainerCreationFailed(_))
        ));
    }
}
