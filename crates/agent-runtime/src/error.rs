//! Runtime errors
//!
//! Transport and decoding failures inside providers. They reach the engine
//! converted into [`AgentError`].

use agent_core::AgentError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Malformed {provider} response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuntimeError {
    pub fn decode(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            provider,
            message: message.into(),
        }
    }
}

impl From<RuntimeError> for AgentError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Http(e) if e.is_connect() || e.is_timeout() => {
                Self::ProviderUnavailable(e.to_string())
            }
            RuntimeError::Status { status: 429, body, .. } => Self::RateLimited(body),
            other => Self::Provider(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let limited = RuntimeError::Status {
            provider: "ollama",
            status: 429,
            body: "slow down".into(),
        };
        assert!(matches!(
            AgentError::from(limited),
            AgentError::RateLimited(ref b) if b == "slow down"
        ));

        let server = RuntimeError::Status {
            provider: "ollama",
            status: 500,
            body: "oops".into(),
        };
        assert!(matches!(
            AgentError::from(server),
            AgentError::Provider(ref m) if m == "ollama returned HTTP 500: oops"
        ));
    }

    #[test]
    fn test_decode_is_provider_error() {
        let err: AgentError = RuntimeError::decode("openai", "missing choices").into();
        assert_eq!(err.to_string(), "Provider error: Malformed openai response: missing choices");
    }
}
