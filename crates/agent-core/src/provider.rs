//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for all LLM providers (Ollama, OpenAI, Anthropic, etc.)
//! allowing the agent to work with any backend without code changes.
//!
//! Providers translate between the normalized [`Message`]/[`Response`] model
//! and their vendor wire format; the engine never sees vendor shapes. Timeouts
//! and transport errors are the provider's business and reach the engine only
//! as an error.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{ChatOptions, LlmProvider};
//!
//! let provider = OllamaProvider::from_env()?;
//! let response = provider.chat(&messages, &ChatOptions::new("llama3.2")).await?;
//! ```

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::message::Message;
use crate::response::{Response, StopReason, Usage};
use crate::tool::{ToolCall, ToolDescriptor};

/// Options for one provider request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Model identifier (e.g., "llama3.2", "gpt-4o", "claude-3-5-sonnet")
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,

    /// Tools the model may call. Empty when none are offered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,

    /// JSON-Schema the final answer must follow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

impl ChatOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 4096,
            temperature: 0.7,
            tools: Vec::new(),
            output_schema: None,
            stop_sequences: Vec::new(),
        }
    }
}

/// A chunk from a streaming completion
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// The text delta
    pub text: String,

    /// Whether this is the final chunk
    pub is_complete: bool,

    /// Tool calls of the turn, typically only on the final chunk
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Token usage (typically only on final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

impl StreamChunk {
    /// A text delta
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// The final chunk of a stream
    pub fn complete() -> Self {
        Self {
            is_complete: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    #[must_use]
    pub const fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Stream type for completion streaming
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The agent works exclusively through this interface and consults the
/// capability flags before attaching tools, output schemas or images.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "ollama", "openai")
    fn name(&self) -> &str;

    /// Generate a completion from messages
    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<Response>;

    /// Generate a streaming completion
    async fn stream(&self, messages: &[Message], options: &ChatOptions) -> Result<ChunkStream>;

    /// Whether tool/function calling is supported
    fn supports_tool_calling(&self) -> bool {
        false
    }

    /// Whether image inputs are supported
    fn supports_vision(&self) -> bool {
        false
    }

    /// Whether a JSON-Schema output constraint is supported
    fn supports_structured_output(&self) -> bool {
        false
    }
}
