//! Streaming completions from an Ollama-compatible model service.
//!
//! The [`Aggregator`] posts the whole transcript, reads the newline-delimited
//! JSON response as it streams in, and concatenates the text increments
//! into one reply. When the service cannot be reached it switches itself to
//! [`Mode::Mock`] and keeps answering with synthesized replies until the
//! mode is toggled back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use murmur_store::{Role, Turn};

use crate::config::ServerConfig;
use crate::mock;

const CHAT_PATH: &str = "/api/chat";
const VERSION_PATH: &str = "/api/version";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Live,
    Mock,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    /// Connection refused, timeout or a transport failure mid-stream.
    #[error("Model service unreachable: {0}")]
    Unavailable(#[source] reqwest::Error),

    #[error("Error communicating with AI model: {status}{}", detail_suffix(.detail))]
    Status {
        status: reqwest::StatusCode,
        detail: Option<String>,
    },

    #[error("The model service is reachable but returned no text for model '{model}'. Please try again.")]
    Empty { model: String },
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailure {
    Connect,
    Timeout,
    Status(u16),
    Other,
}

/// Reachability of the model service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub available: bool,
    pub version: Option<String>,
    pub message: String,
    pub failure: Option<ProbeFailure>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Text carried by one streamed chunk.
///
/// Known fields are tried in order (`message.content`, `response`,
/// `content`) and the first non-empty one wins.
pub fn extract_increment(chunk: &Value) -> &str {
    [
        chunk.pointer("/message/content"),
        chunk.get("response"),
        chunk.get("content"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find(|text| !text.is_empty())
    .unwrap_or("")
}

fn append_line(text: &mut String, line: &[u8]) {
    let Ok(line) = std::str::from_utf8(line) else {
        debug!(len = line.len(), "Skipping non UTF-8 chunk");
        return;
    };
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match serde_json::from_str::<Value>(line) {
        Ok(chunk) => text.push_str(extract_increment(&chunk)),
        Err(e) => debug!(error = %e, line = %line, "Skipping malformed chunk"),
    }
}

#[derive(Debug)]
pub struct Aggregator {
    client: reqwest::Client,
    base_url: String,
    completion_timeout: Duration,
    probe_timeout: Duration,
    mock: AtomicBool,
}

impl Aggregator {
    pub fn new(base_url: impl Into<String>, completion_timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            completion_timeout,
            probe_timeout,
            mock: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.completion_url.clone(),
            config.completion_timeout,
            config.probe_timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn mode(&self) -> Mode {
        if self.mock.load(Ordering::SeqCst) {
            Mode::Mock
        } else {
            Mode::Live
        }
    }

    pub fn set_mode(&self, mode: Mode) {
        self.mock.store(mode == Mode::Mock, Ordering::SeqCst);
    }

    /// Flip the mode regardless of reachability. Returns the new mode.
    pub fn toggle_mode(&self) -> Mode {
        let was_mock = self.mock.fetch_xor(true, Ordering::SeqCst);
        let mode = if was_mock { Mode::Live } else { Mode::Mock };
        info!(mode = ?mode, "Completion mode toggled");
        mode
    }

    /// Produce the assistant reply for `turns`. Never fails: an unreachable
    /// service switches to mock mode, other service errors come back as a
    /// diagnostic reply.
    pub async fn complete(&self, turns: &[Turn], model: &str) -> String {
        if self.mode() == Mode::Mock {
            return self.mock_reply(turns, model);
        }

        match self.stream_completion(turns, model).await {
            Ok(text) => text,
            Err(CompletionError::Unavailable(e)) => {
                warn!(url = %self.base_url, error = %e, "Model service unreachable, switching to mock mode");
                self.set_mode(Mode::Mock);
                self.mock_reply(turns, model)
            }
            Err(e) => {
                warn!(model = %model, error = %e, "Completion failed");
                e.to_string()
            }
        }
    }

    /// One live attempt, without any fallback.
    pub async fn stream_completion(&self, turns: &[Turn], model: &str) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model,
            messages: turns
                .iter()
                .map(|t| WireMessage {
                    role: t.role.as_str(),
                    content: &t.content,
                })
                .collect(),
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}{CHAT_PATH}", self.base_url))
            .timeout(self.completion_timeout)
            .json(&request)
            .send()
            .await
            .map_err(CompletionError::Unavailable)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| body.get("error")?.as_str().map(str::to_string));
            return Err(CompletionError::Status { status, detail });
        }

        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut text = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(CompletionError::Unavailable)?;
            pending.extend_from_slice(&chunk);

            while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                append_line(&mut text, &line);
            }
        }
        append_line(&mut text, &pending);

        if text.is_empty() {
            return Err(CompletionError::Empty {
                model: model.to_string(),
            });
        }

        debug!(model = %model, turns = turns.len(), chars = text.len(), "Completion aggregated");
        Ok(text)
    }

    fn mock_reply(&self, turns: &[Turn], model: &str) -> String {
        let latest = turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .unwrap_or("");
        mock::reply(latest, model)
    }

    /// Check reachability without sending a conversation.
    pub async fn probe(&self) -> ProbeReport {
        let url = format!("{}{VERSION_PATH}", self.base_url);

        match self.client.get(&url).timeout(self.probe_timeout).send().await {
            Ok(response) if response.status().is_success() => {
                let version = response
                    .json::<Value>()
                    .await
                    .ok()
                    .and_then(|body| body.get("version")?.as_str().map(str::to_string));
                ProbeReport {
                    available: true,
                    message: match &version {
                        Some(v) => format!("Model service {v} is available at {}", self.base_url),
                        None => format!("Model service is available at {}", self.base_url),
                    },
                    version,
                    failure: None,
                }
            }
            Ok(response) => {
                let status = response.status();
                self.unavailable(
                    ProbeFailure::Status(status.as_u16()),
                    format!("Model service at {} answered {status}", self.base_url),
                )
            }
            Err(e) if e.is_timeout() => self.unavailable(
                ProbeFailure::Timeout,
                format!(
                    "Model service at {} did not answer within {}ms",
                    self.base_url,
                    self.probe_timeout.as_millis()
                ),
            ),
            Err(e) if e.is_connect() => self.unavailable(
                ProbeFailure::Connect,
                format!("Cannot connect to model service at {}", self.base_url),
            ),
            Err(e) => self.unavailable(
                ProbeFailure::Other,
                format!("Model service at {} failed: {e}", self.base_url),
            ),
        }
    }

    fn unavailable(&self, failure: ProbeFailure, message: String) -> ProbeReport {
        debug!(failure = ?failure, message = %message, "Model service probe failed");
        ProbeReport {
            available: false,
            version: None,
            message,
            failure: Some(failure),
        }
    }
}
