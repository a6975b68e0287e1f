//! Vendor wire-format adapters
//!
//! Pure functions between the normalized [`Message`](agent_core::Message) /
//! [`Response`](agent_core::Response) model and each vendor's JSON. No I/O
//! happens here, so a provider for any of these APIs only needs to add
//! transport.

pub mod anthropic;
pub mod ollama;
pub mod openai;

use agent_core::Arguments;
use serde_json::Value;

/// Tool arguments from a JSON object; anything else yields no arguments
pub(crate) fn arguments_from(value: &Value) -> Arguments {
    value.as_object().cloned().unwrap_or_default()
}

/// Tool arguments from a JSON-encoded object string. Empty or invalid input
/// yields no arguments.
pub(crate) fn arguments_from_str(encoded: &str) -> Arguments {
    serde_json::from_str::<Value>(encoded)
        .map(|value| arguments_from(&value))
        .unwrap_or_default()
}

/// Token count field as `u32`, zero when absent
pub(crate) fn token_count(value: &Value) -> u32 {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or_default()
}
