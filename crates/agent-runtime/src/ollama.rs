//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference over its HTTP
//! API. Streaming reads the newline-delimited JSON body as it arrives.

use std::time::Duration;

use agent_core::{
    AgentError, ChatOptions, ChunkStream, LlmProvider, Message, Response,
    Result as AgentResult,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use crate::adapters::ollama::{chunk_from_ollama, request_body, response_from_ollama};
use crate::error::{Result, RuntimeError};

const PROVIDER: &str = "ollama";

/// Ollama provider configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OllamaConfig {
    /// Base URL, e.g. `http://localhost:11434`
    pub base_url: String,

    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    /// Read `OLLAMA_HOST`, `OLLAMA_PORT` and `OLLAMA_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost".into());
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(11434);
        let timeout_secs = std::env::var("OLLAMA_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(120);

        Self {
            base_url: format!("{}:{port}", host.trim_end_matches('/')),
            timeout_secs,
        }
    }
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Ollama LLM provider
#[derive(Clone, Debug)]
pub struct OllamaProvider {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create from configuration
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OllamaConfig::from_env())
    }

    /// Create with default localhost settings
    pub fn localhost() -> Result<Self> {
        Self::new(OllamaConfig::default())
    }

    pub const fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post_chat(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self.client.post(self.url("/api/chat")).json(body).send().await?;
        ensure_success(response).await
    }

    /// Whether the server answers at all
    pub async fn health_check(&self) -> bool {
        match self.list_models().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Ollama health check failed");
                false
            }
        }
    }

    /// Names of the locally installed models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self.client.get(self.url("/api/tags")).send().await?;
        let tags: TagsResponse = ensure_success(response).await?.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RuntimeError::Status {
        provider: PROVIDER,
        status: status.as_u16(),
        body,
    })
}

fn parse_line(line: &[u8]) -> AgentResult<Option<agent_core::StreamChunk>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_slice(line).map_err(RuntimeError::from)?;
    Ok(Some(chunk_from_ollama(&value)?))
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> AgentResult<Response> {
        tracing::debug!(model = %options.model, messages = messages.len(), "Ollama chat");

        let body = request_body(messages, options, false);
        let response = self.post_chat(&body).await?;
        let value: Value = response.json().await.map_err(RuntimeError::from)?;

        Ok(response_from_ollama(&value)?)
    }

    async fn stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> AgentResult<ChunkStream> {
        tracing::debug!(model = %options.model, messages = messages.len(), "Ollama stream");

        let body = request_body(messages, options, true);
        let response = self.post_chat(&body).await?;
        let mut bytes = response.bytes_stream();

        Ok(Box::pin(async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(piece) = bytes.next().await {
                match piece {
                    Ok(piece) => buffer.extend_from_slice(&piece),
                    Err(e) => {
                        yield Err(AgentError::from(RuntimeError::from(e)));
                        return;
                    }
                }

                while let Some(end) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=end).collect();
                    match parse_line(&line) {
                        Ok(Some(chunk)) => {
                            let done = chunk.is_complete;
                            yield Ok(chunk);
                            if done {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            // Final line without a trailing newline
            match parse_line(&buffer) {
                Ok(Some(chunk)) => yield Ok(chunk),
                Ok(None) => {}
                Err(e) => yield Err(e),
            }
        }))
    }

    fn supports_tool_calling(&self) -> bool {
        true
    }

    fn supports_vision(&self) -> bool {
        true
    }

    fn supports_structured_output(&self) -> bool {
        true
    }
}
