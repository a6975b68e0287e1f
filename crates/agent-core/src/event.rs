//! Agent event stream
//!
//! The externally observable trace of one agent invocation, as produced by
//! [`Agent::stream_events`](crate::Agent::stream_events).

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::Arguments;

/// One step of an agent run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text delta while the model is generating
    Text { text: String },

    /// The model asked for a tool
    ToolCall {
        id: String,
        tool: String,
        input: Arguments,
    },

    /// A tool finished (or failed, with an `{"error": ...}` result)
    ToolResult {
        id: String,
        tool: String,
        result: Value,
    },

    /// The run completed. `data` holds validated structured output, if requested.
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },

    /// The run failed; no further events follow
    Error { code: String, error: String },
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Whether this event ends the stream
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Stream type for agent events
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let event = StreamEvent::ToolResult {
            id: "call_1".into(),
            tool: "add".into(),
            result: json!(3),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "tool_result", "id": "call_1", "tool": "add", "result": 3})
        );
        assert_eq!(
            serde_json::to_value(StreamEvent::Done { data: None }).unwrap(),
            json!({"type": "done"})
        );
    }

    #[test]
    fn test_terminal_events() {
        assert!(StreamEvent::Done { data: None }.is_terminal());
        assert!(!StreamEvent::text("x").is_terminal());
    }
}
