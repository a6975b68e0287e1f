//! Conversation Messages
//!
//! Immutable message values exchanged with providers. The engine appends them
//! to a per-invocation log and never mutates one after creation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::ToolCall;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// One typed part of a multimodal message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { url: String },
    /// Inline base64 image data
    ImageData { media_type: String, data: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub const fn is_image(&self) -> bool {
        matches!(self, Self::ImageUrl { .. } | Self::ImageData { .. })
    }
}

/// Message content: plain text or an ordered list of parts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// The plain text, or the first text part of multimodal content
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Parts(parts) => parts
                .iter()
                .find_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .unwrap_or(""),
        }
    }

    pub fn has_images(&self) -> bool {
        match self {
            Self::Text(_) => false,
            Self::Parts(parts) => parts.iter().any(ContentPart::is_image),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<ContentPart>> for Content {
    fn from(parts: Vec<ContentPart>) -> Self {
        Self::Parts(parts)
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: Content,

    /// Calls requested by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,

    /// The call a tool-result message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl Message {
    /// Create a system message. Instructions are always plain text.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Content::Text(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<Content>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a user message carrying one image.
    ///
    /// `image` is treated as a URL when it starts with `http://` or
    /// `https://`, and as base64 data of `media_type` otherwise.
    pub fn user_with_image(
        text: impl Into<String>,
        image: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Self {
        let image = image.into();
        let image_part = if image.starts_with("http://") || image.starts_with("https://") {
            ContentPart::ImageUrl { url: image }
        } else {
            ContentPart::ImageData {
                media_type: media_type.into(),
                data: image,
            }
        };
        Self::user(vec![ContentPart::text(text), image_part])
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(content.into()),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Create a tool result message. Non-string results are JSON-encoded.
    pub fn tool_result(tool_call_id: impl Into<String>, result: &Value) -> Self {
        let content = match result {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        Self {
            role: Role::Tool,
            content: Content::Text(content),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub const fn role(&self) -> Role {
        self.role
    }

    pub const fn content(&self) -> &Content {
        &self.content
    }

    /// Text content (first text part for multimodal messages)
    pub fn text(&self) -> &str {
        self.content.text()
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.tool_call_id.as_deref()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    pub fn is_tool(&self) -> bool {
        self.role == Role::Tool
    }
}

/// Caller-managed conversation history.
///
/// The agent itself keeps no history between invocations; this helper is for
/// callers that carry a multi-turn exchange themselves.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    system_prompt: Option<String>,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut conv = Self::new();
        conv.set_system(prompt);
        conv
    }

    /// Set (or replace) the system prompt
    pub fn set_system(&mut self, prompt: impl Into<String>) -> &mut Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn add_user(&mut self, content: impl Into<Content>) -> &mut Self {
        self.messages.push(Message::user(content));
        self
    }

    pub fn add_assistant(
        &mut self,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> &mut Self {
        self.messages.push(Message::assistant(content, tool_calls));
        self
    }

    pub fn add_tool_result(
        &mut self,
        tool_call_id: impl Into<String>,
        result: &Value,
    ) -> &mut Self {
        self.messages.push(Message::tool_result(tool_call_id, result));
        self
    }

    /// Add a message. System messages replace the system prompt.
    pub fn add_message(&mut self, message: Message) -> &mut Self {
        if message.is_system() {
            self.system_prompt = Some(message.text().to_owned());
        } else {
            self.messages.push(message);
        }
        self
    }

    /// All messages, system prompt first
    pub fn messages(&self) -> Vec<Message> {
        self.system_prompt
            .iter()
            .map(Message::system)
            .chain(self.messages.iter().cloned())
            .collect()
    }

    /// Number of messages, excluding the system prompt
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop all messages, optionally keeping the system prompt
    pub fn clear(&mut self, keep_system: bool) -> &mut Self {
        self.messages.clear();
        if !keep_system {
            self.system_prompt = None;
        }
        self
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_assistant())
    }

    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut conv = Self::new();
        for message in messages {
            conv.add_message(message);
        }
        conv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role(), Role::User);
        assert_eq!(msg.text(), "Hello");
        assert!(msg.tool_call_id().is_none());
    }

    #[test]
    fn test_tool_result_encodes_non_strings() {
        let msg = Message::tool_result("call_1", &json!({"temp": 21}));
        assert_eq!(msg.role(), Role::Tool);
        assert_eq!(msg.tool_call_id(), Some("call_1"));
        assert_eq!(
            serde_json::from_str::<Value>(msg.text()).unwrap(),
            json!({"temp": 21})
        );

        let plain = Message::tool_result("call_2", &json!("sunny"));
        assert_eq!(plain.text(), "sunny");
    }

    #[test]
    fn test_user_with_image() {
        let by_url = Message::user_with_image("What is this?", "https://x.test/a.png", "image/png");
        assert!(by_url.content().has_images());
        assert_eq!(by_url.text(), "What is this?");
        assert!(matches!(
            by_url.content(),
            Content::Parts(parts)
                if parts[1] == ContentPart::ImageUrl { url: "https://x.test/a.png".into() }
        ));

        let inline = Message::user_with_image("And this?", "aGVsbG8=", "image/jpeg");
        assert!(matches!(
            inline.content(),
            Content::Parts(parts) if matches!(
                &parts[1],
                ContentPart::ImageData { media_type, .. } if media_type == "image/jpeg"
            )
        ));
    }

    #[test]
    fn test_message_serialization_shape() {
        let msg = Message::assistant("hi", vec![]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"role": "assistant", "content": "hi"}));

        let parts = Message::user(vec![ContentPart::text("look")]);
        assert_eq!(
            serde_json::to_value(&parts).unwrap(),
            json!({"role": "user", "content": [{"type": "text", "text": "look"}]})
        );
    }

    #[test]
    fn test_conversation() {
        let mut conv = Conversation::with_system_prompt("You are helpful.");
        conv.add_user("Hi").add_assistant("Hello!", vec![]);

        assert_eq!(conv.len(), 2);
        let messages = conv.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].is_system());
        assert!(conv.last().unwrap().is_assistant());
    }

    #[test]
    fn test_conversation_system_message_replaces_prompt() {
        let conv = Conversation::from_messages([
            Message::system("first"),
            Message::user("q"),
            Message::system("second"),
        ]);
        let messages = conv.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "second");
    }

    #[test]
    fn test_conversation_clear() {
        let mut conv = Conversation::with_system_prompt("sys");
        conv.add_user("q").add_assistant("a", vec![]).add_user("q2");
        assert_eq!(conv.last_assistant().unwrap().text(), "a");

        conv.clear(true);
        assert!(conv.is_empty());
        assert_eq!(conv.messages().len(), 1);

        conv.clear(false);
        assert!(conv.messages().is_empty());
    }
}
