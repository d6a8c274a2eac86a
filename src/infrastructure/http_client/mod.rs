//! Blocking HTTP clients for the remote collaborators: OpenAI-compatible
//! endpoints (completions, embeddings) and AnkiConnect.

mod anki_sink;
mod openai;

pub use anki_sink::AnkiConnectSink;
pub use openai::{OpenAiCompletionEngine, OpenAiHttp};

use serde::Deserialize;

/// Default AnkiConnect address.
pub const DEFAULT_ANKI_CONNECT_URL: &str = "http://localhost:8765";

/// Default OpenAI-compatible base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Error envelope returned by OpenAI-compatible APIs.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Render a ureq error as a single line, including the API message when the
/// body carries one.
pub(crate) fn describe_http_error(error: ureq::Error) -> String {
    match error {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(parsed) => format!("HTTP {} - {}", code, parsed.error.message),
                Err(_) if body.trim().is_empty() => format!("HTTP error: {}", code),
                Err(_) => format!("HTTP {} - {}", code, body.trim()),
            }
        }
        ureq::Error::Transport(transport) => format!("Transport error: {}", transport),
    }
}
