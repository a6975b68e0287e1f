//! # agent-core
//!
//! Provider-agnostic agent orchestration: a tool-calling loop, a schema
//! builder for tool inputs and structured output, and event streaming.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Agent                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Reasoning  │  │    Tools    │  │   LlmProvider       │  │
//! │  │    Loop     │──│   Registry  │──│   (Strategy)        │  │
//! │  └──────┬──────┘  └──────┬──────┘  └─────────────────────┘  │
//! │         │                │                                   │
//! │  ┌──────┴──────┐  ┌──────┴──────┐                            │
//! │  │    Hooks    │  │   Schema    │                            │
//! │  └─────────────┘  └─────────────┘                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping between Ollama, OpenAI, Anthropic,
//! or any other provider without changing agent logic.

pub mod error;
pub mod event;
pub mod hooks;
pub mod message;
pub mod mock;
pub mod provider;
pub mod reasoning;
pub mod response;
pub mod schema;
pub mod tool;

pub use error::{AgentError, Result};
pub use event::{EventStream, StreamEvent};
pub use hooks::Hooks;
pub use message::{Content, ContentPart, Conversation, Message, Role};
pub use provider::{ChatOptions, ChunkStream, LlmProvider, StreamChunk};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, RunOptions, parse_structured_output};
pub use response::{Response, StopReason, Usage};
pub use schema::{Schema, SchemaType, SchemaValidationError, ValidationResult};
pub use tool::{Arguments, Context, FunctionTool, Tool, ToolCall, ToolDescriptor, ToolRegistry};
