//! # agent-runtime
//!
//! Runtime providers for agent-core.
//!
//! ## Providers
//!
//! - **Ollama** (default): Local LLM inference via Ollama's HTTP API
//!
//! ## Adapters
//!
//! Pure request/response mapping for the Anthropic, OpenAI and Ollama wire
//! formats lives in [`adapters`], independent of any transport.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::OllamaProvider;
//!
//! let provider = OllamaProvider::from_env()?;
//! let agent = Agent::builder()
//!     .provider(Arc::new(provider))
//!     .model("llama3.2")
//!     .build()?;
//! ```

pub mod adapters;
pub mod error;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use error::RuntimeError;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentError, LlmProvider, Message, Result, Role, Tool, ToolRegistry,
};
