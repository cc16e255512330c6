//! Chat backend passthrough with a local inference fallback.
//!
//! When the application wires a [`ChatBackend`] every `llm.*` call goes
//! there. Otherwise the surface talks to a local Ollama-compatible server:
//! `POST {endpoint}/api/chat` with `stream: false` for chat and
//! `GET {endpoint}/api/tags` for the model list. Any transport failure or
//! non-success status becomes `ChatUnavailable`.

use crate::error::{CapabilityError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

/// Default local inference server.
pub const DEFAULT_CHAT_ENDPOINT: &str = "http://localhost:11434";

/// Model used by the local fallback when the caller names none.
pub const DEFAULT_CHAT_MODEL: &str = "llama3.2";

/// The application's chat collaborator.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends a conversation and returns the assistant reply.
    async fn chat(&self, messages: Value, options: Value) -> Result<Value>;

    /// Lists available model names.
    async fn models(&self) -> Result<Vec<String>>;

    async fn current_model(&self) -> Result<String>;
}

// ── Local server wire types ──────────────────────────────

#[derive(Debug, Serialize)]
struct LocalChatRequest<'a> {
    model: &'a str,
    messages: &'a Value,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct LocalChatResponse {
    message: LocalMessage,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocalMessage {
    #[serde(default)]
    role: Option<String>,
    content: String,
}

#[derive(Debug, Deserialize)]
struct LocalTagsResponse {
    #[serde(default)]
    models: Vec<LocalModel>,
}

#[derive(Debug, Deserialize)]
struct LocalModel {
    name: String,
}

// ── LocalChat ────────────────────────────────────────────

/// Fallback client for a local Ollama-compatible inference server.
pub struct LocalChat {
    client: Client,
    endpoint: String,
    default_model: String,
}

impl LocalChat {
    pub fn new(endpoint: &str, default_model: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for LocalChat {
    fn default() -> Self {
        Self::new(DEFAULT_CHAT_ENDPOINT, DEFAULT_CHAT_MODEL)
    }
}

fn unavailable(e: impl std::fmt::Display) -> CapabilityError {
    CapabilityError::ChatUnavailable(e.to_string())
}

#[async_trait]
impl ChatBackend for LocalChat {
    async fn chat(&self, messages: Value, options: Value) -> Result<Value> {
        let model = options
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_model)
            .to_string();
        let generation = options.get("options").filter(|v| v.is_object());

        let request = LocalChatRequest {
            model: &model,
            messages: &messages,
            stream: false,
            options: generation,
        };

        let url = format!("{}/api/chat", self.endpoint);
        debug!(model = %model, url = %url, "Calling local chat backend");

        let response = self.client.post(&url).json(&request).send().await.map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("HTTP {status}: {body}")));
        }

        let body: LocalChatResponse = response.json().await.map_err(unavailable)?;
        Ok(json!({
            "role": body.message.role.unwrap_or_else(|| "assistant".to_string()),
            "content": body.message.content,
            "model": body.model.unwrap_or(model),
        }))
    }

    async fn models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = self.client.get(&url).send().await.map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {status}")));
        }
        let body: LocalTagsResponse = response.json().await.map_err(unavailable)?;
        Ok(body.models.into_iter().map(|m| m.name).collect())
    }

    async fn current_model(&self) -> Result<String> {
        Ok(self.default_model.clone())
    }
}
