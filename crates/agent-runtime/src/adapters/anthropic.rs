//! Anthropic Messages API format
//!
//! System instructions travel outside the message list, tool results are
//! `tool_result` blocks inside a user turn, and tool calls come back as
//! `tool_use` content blocks.

use agent_core::{
    ChatOptions, Content, ContentPart, Message, Response, Role, StopReason, ToolCall,
    ToolDescriptor, Usage,
};
use serde_json::{Value, json};

use super::{arguments_from, token_count};
use crate::error::{Result, RuntimeError};

const PROVIDER: &str = "anthropic";

/// `{name, description, input_schema}`
pub fn tool_to_anthropic(tool: &ToolDescriptor) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.input_schema,
    })
}

/// Parse one `tool_use` content block
pub fn tool_call_from_anthropic(block: &Value) -> ToolCall {
    ToolCall::new(
        block["id"].as_str().unwrap_or_default(),
        block["name"].as_str().unwrap_or_default(),
        arguments_from(&block["input"]),
    )
}

/// Split messages into the `system` string and the Anthropic message list.
///
/// Consecutive tool results are merged into one user turn, since the API
/// requires roles to alternate.
pub fn messages_to_anthropic(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system: Vec<&str> = Vec::new();
    let mut converted: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    for message in messages {
        if message.role() != Role::Tool && !pending_results.is_empty() {
            converted.push(json!({
                "role": "user",
                "content": std::mem::take(&mut pending_results),
            }));
        }

        match message.role() {
            Role::System => system.push(message.text()),
            Role::User => converted.push(json!({
                "role": "user",
                "content": content_blocks(message.content()),
            })),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !message.text().is_empty() {
                    blocks.push(json!({"type": "text", "text": message.text()}));
                }
                for call in message.tool_calls() {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                converted.push(json!({"role": "assistant", "content": blocks}));
            }
            Role::Tool => pending_results.push(json!({
                "type": "tool_result",
                "tool_use_id": message.tool_call_id().unwrap_or_default(),
                "content": message.text(),
            })),
        }
    }

    if !pending_results.is_empty() {
        converted.push(json!({"role": "user", "content": pending_results}));
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, converted)
}

fn content_blocks(content: &Content) -> Value {
    match content {
        Content::Text(text) => json!(text),
        Content::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({"type": "text", "text": text}),
                ContentPart::ImageUrl { url } => json!({
                    "type": "image",
                    "source": {"type": "url", "url": url},
                }),
                ContentPart::ImageData { media_type, data } => json!({
                    "type": "image",
                    "source": {"type": "base64", "media_type": media_type, "data": data},
                }),
            })
            .collect(),
    }
}

/// Build a `/v1/messages` request body
pub fn request_body(messages: &[Message], options: &ChatOptions, stream: bool) -> Value {
    let (system, messages) = messages_to_anthropic(messages);

    let mut body = json!({
        "model": options.model,
        "max_tokens": options.max_tokens,
        "temperature": options.temperature,
        "messages": messages,
        "stream": stream,
    });

    if let Some(system) = system {
        body["system"] = json!(system);
    }
    if !options.tools.is_empty() {
        body["tools"] = options.tools.iter().map(tool_to_anthropic).collect();
    }
    if !options.stop_sequences.is_empty() {
        body["stop_sequences"] = json!(options.stop_sequences);
    }

    body
}

/// Parse a Messages API response
pub fn response_from_anthropic(body: &Value) -> Result<Response> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| RuntimeError::decode(PROVIDER, "missing content array"))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => text.push_str(block["text"].as_str().unwrap_or_default()),
            Some("tool_use") => tool_calls.push(tool_call_from_anthropic(block)),
            _ => {}
        }
    }

    Ok(Response {
        text,
        tool_calls,
        usage: Usage::new(
            token_count(&body["usage"]["input_tokens"]),
            token_count(&body["usage"]["output_tokens"]),
        ),
        stop_reason: body["stop_reason"].as_str().map(StopReason::from_vendor),
        ..Response::default()
    })
}
