//! Normalized provider results

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;
use crate::tool::ToolCall;

/// Token usage statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

impl Usage {
    pub const fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub const fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Reason generation ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the answer
    EndTurn,
    /// The model wants tools to run
    ToolUse,
    /// Hit the token limit
    MaxTokens,
    StopSequence,
    ContentFilter,
    Other(String),
}

impl StopReason {
    /// Normalise a vendor's stop/finish reason string
    pub fn from_vendor(reason: &str) -> Self {
        match reason {
            "end_turn" | "stop" => Self::EndTurn,
            "tool_use" | "tool_calls" | "function_call" => Self::ToolUse,
            "max_tokens" | "length" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// Result of one provider call, or of a whole agent run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The generated text
    pub text: String,

    /// Tool calls requested by the model
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    /// Parsed structured output, set only after schema validation succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Full conversation log, filled in by the agent at finalization
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,

    #[serde(default)]
    pub usage: Usage,

    #[serde(default)]
    pub stop_reason: Option<StopReason>,
}

impl Response {
    /// A plain text response
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stop_reason: Some(StopReason::EndTurn),
            ..Self::default()
        }
    }

    /// A response requesting tool calls
    pub fn tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: text.into(),
            tool_calls,
            stop_reason: Some(StopReason::ToolUse),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub const fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub const fn total_tokens(&self) -> u32 {
        self.usage.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stop_reason_normalisation() {
        assert_eq!(StopReason::from_vendor("stop"), StopReason::EndTurn);
        assert_eq!(StopReason::from_vendor("tool_calls"), StopReason::ToolUse);
        assert_eq!(StopReason::from_vendor("length"), StopReason::MaxTokens);
        assert_eq!(
            StopReason::from_vendor("refusal"),
            StopReason::Other("refusal".into())
        );
    }

    #[test]
    fn test_usage_totals() {
        let response = Response::text("hi").with_usage(Usage::new(10, 20));
        assert_eq!(response.total_tokens(), 30);
        assert!(!response.has_tool_calls());
        assert!(!response.has_data());
    }

    #[test]
    fn test_response_serialization_skips_empty_fields() {
        let value = serde_json::to_value(Response::text("hi")).unwrap();
        assert_eq!(
            value,
            json!({
                "text": "hi",
                "tool_calls": [],
                "usage": {"input_tokens": 0, "output_tokens": 0},
                "stop_reason": "end_turn",
            })
        );
    }
}
