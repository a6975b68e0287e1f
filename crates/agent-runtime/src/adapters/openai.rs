//! OpenAI Chat Completions format
//!
//! Tool call arguments travel as JSON-encoded strings and tool results are
//! `tool` role messages keyed by `tool_call_id`.

use agent_core::{
    ChatOptions, Content, ContentPart, Message, Response, Role, StopReason, ToolCall,
    ToolDescriptor, Usage,
};
use serde_json::{Value, json};

use super::{arguments_from_str, token_count};
use crate::error::{Result, RuntimeError};

const PROVIDER: &str = "openai";

/// `{type: "function", function: {name, description, parameters}}`
pub fn tool_to_openai(tool: &ToolDescriptor) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

/// Parse one entry of `message.tool_calls`. Undecodable arguments become `{}`.
pub fn tool_call_from_openai(call: &Value) -> ToolCall {
    let function = &call["function"];
    ToolCall::new(
        call["id"].as_str().unwrap_or_default(),
        function["name"].as_str().unwrap_or_default(),
        arguments_from_str(function["arguments"].as_str().unwrap_or_default()),
    )
}

pub fn messages_to_openai(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| match message.role() {
            Role::Assistant if message.has_tool_calls() => {
                let calls: Vec<Value> = message
                    .tool_calls()
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": Value::Object(call.arguments.clone()).to_string(),
                            }
                        })
                    })
                    .collect();
                json!({
                    "role": "assistant",
                    "content": message.text(),
                    "tool_calls": calls,
                })
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id().unwrap_or_default(),
                "content": message.text(),
            }),
            role => json!({
                "role": role.to_string(),
                "content": content_value(message.content()),
            }),
        })
        .collect()
}

fn content_value(content: &Content) -> Value {
    match content {
        Content::Text(text) => json!(text),
        Content::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({"type": "text", "text": text}),
                ContentPart::ImageUrl { url } => json!({
                    "type": "image_url",
                    "image_url": {"url": url},
                }),
                ContentPart::ImageData { media_type, data } => json!({
                    "type": "image_url",
                    "image_url": {"url": format!("data:{media_type};base64,{data}")},
                }),
            })
            .collect(),
    }
}

/// `response_format` constraining the answer to `schema`.
///
/// Strict mode requires every property to be listed in `required`, so it is
/// only requested when the schema has no optional properties.
pub fn response_format(schema: &Value) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "response",
            "schema": schema,
            "strict": all_properties_required(schema),
        }
    })
}

fn all_properties_required(schema: &Value) -> bool {
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let complete = properties.iter().all(|(name, property)| {
            required.contains(&name.as_str()) && all_properties_required(property)
        });
        if !complete {
            return false;
        }
    }

    schema.get("items").is_none_or(all_properties_required)
}

/// Build a `/v1/chat/completions` request body
pub fn request_body(messages: &[Message], options: &ChatOptions, stream: bool) -> Value {
    let mut body = json!({
        "model": options.model,
        "max_tokens": options.max_tokens,
        "temperature": options.temperature,
        "messages": messages_to_openai(messages),
        "stream": stream,
    });

    if !options.tools.is_empty() {
        body["tools"] = options.tools.iter().map(tool_to_openai).collect();
    }
    if let Some(schema) = &options.output_schema {
        body["response_format"] = response_format(schema);
    }
    if !options.stop_sequences.is_empty() {
        body["stop"] = json!(options.stop_sequences);
    }

    body
}

/// Parse a Chat Completions response (first choice only)
pub fn response_from_openai(body: &Value) -> Result<Response> {
    let choice = body["choices"]
        .get(0)
        .ok_or_else(|| RuntimeError::decode(PROVIDER, "missing choices"))?;
    let message = &choice["message"];

    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| calls.iter().map(tool_call_from_openai).collect())
        .unwrap_or_default();

    Ok(Response {
        text: message["content"].as_str().unwrap_or_default().to_owned(),
        tool_calls,
        usage: Usage::new(
            token_count(&body["usage"]["prompt_tokens"]),
            token_count(&body["usage"]["completion_tokens"]),
        ),
        stop_reason: choice["finish_reason"].as_str().map(StopReason::from_vendor),
        ..Response::default()
    })
}
