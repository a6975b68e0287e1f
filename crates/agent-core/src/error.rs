//! Error Types

use thiserror::Error;

use crate::schema::SchemaValidationError;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error, propagated unmodified
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider was asked for something it declares unsupported
    #[error("Provider does not support {0}")]
    UnsupportedCapability(String),

    /// Tool handler failed. Recovered by the engine and only observed
    /// through the `on_error` hook.
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// The tool-calling loop ran out of turns
    #[error("Agent reached maximum turns ({0}) without completing")]
    MaxTurns(usize),

    /// The final answer could not be parsed or did not match the output schema
    #[error("Structured output error: {message}")]
    StructuredOutput { message: String, errors: Vec<String> },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::RateLimited(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::UnsupportedCapability(what) => {
                format!("The selected model does not support {what}.")
            }
            Self::ToolExecution { tool, message } => format!("Tool '{tool}' error: {message}"),
            Self::MaxTurns(_) => {
                "The request took too many steps to complete. Please try a simpler query.".into()
            }
            Self::StructuredOutput { .. } => {
                "The AI response did not match the expected format.".into()
            }
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }

    /// Stable machine-readable code, used by API surfaces
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            Self::UnsupportedCapability(_) => "UNSUPPORTED_CAPABILITY",
            Self::ToolExecution { .. } => "TOOL_ERROR",
            Self::MaxTurns(_) => "MAX_TURNS",
            Self::StructuredOutput { .. } => "STRUCTURED_OUTPUT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::Json(_) => "JSON_ERROR",
            Self::Other(_) => "AGENT_ERROR",
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<SchemaValidationError> for AgentError {
    fn from(err: SchemaValidationError) -> Self {
        Self::StructuredOutput {
            message: err.to_string(),
            errors: err.errors,
        }
    }
}
