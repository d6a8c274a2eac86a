//! OpenAI-compatible HTTP plumbing and the chat completion engine.

use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{application::services::CompletionEngine, domain::DomainError};

use super::describe_http_error;

/// Shared authenticated agent for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiHttp {
    agent: ureq::Agent,
    base_url: String,
    auth_header: String,
    max_retries: usize,
}

impl OpenAiHttp {
    pub fn new(
        api_key: &str,
        base_url: &str,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, DomainError> {
        if api_key.trim().is_empty() {
            return Err(DomainError::validation("missing OpenAI API key"));
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: format!("Bearer {}", api_key.trim()),
            max_retries: max_retries.max(1),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// POST `body` to `path`, retrying rate limits, server errors, and
    /// transport failures. Every failure maps to `ProviderUnavailable`.
    pub fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, DomainError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let mut attempt = 0usize;
        loop {
            let response = self
                .agent
                .post(&url)
                .set("Authorization", &self.auth_header)
                .send_json(body);

            match response {
                Ok(resp) => {
                    return resp.into_json::<R>().map_err(|err| {
                        DomainError::provider(format!("failed to parse {path} response: {err}"))
                    });
                }
                Err(err) => {
                    if Self::is_retryable(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        debug!(path, attempt, "retrying OpenAI request");
                        thread::sleep(Self::retry_backoff(attempt));
                        continue;
                    }
                    return Err(DomainError::provider(format!(
                        "{path} request failed: {}",
                        describe_http_error(err)
                    )));
                }
            }
        }
    }

    fn is_retryable(err: &ureq::Error) -> bool {
        match err {
            ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
            ureq::Error::Transport(_) => true,
        }
    }

    fn retry_backoff(attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        Duration::from_millis(500 * (1 << capped))
    }
}

/// Chat-completion backed `CompletionEngine`.
pub struct OpenAiCompletionEngine {
    http: OpenAiHttp,
    model: String,
    temperature: f32,
}

impl OpenAiCompletionEngine {
    pub fn new(http: OpenAiHttp, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            http,
            model: model.into(),
            temperature,
        }
    }
}

impl CompletionEngine for OpenAiCompletionEngine {
    fn complete(&self, prompt: &str) -> Result<String, DomainError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let response: ChatResponse = self.http.post_json("chat/completions", &request)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| DomainError::provider("completion response had no content"))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}
