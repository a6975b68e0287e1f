//! Ollama `/api/chat` format
//!
//! Close to the OpenAI shape, except that tool arguments are plain objects,
//! calls usually carry no ID, images are bare base64 strings and streaming is
//! newline-delimited JSON.

use agent_core::{
    ChatOptions, ContentPart, Message, Response, Role, StopReason, StreamChunk, ToolCall, Usage,
};
use serde_json::{Value, json};

use super::{arguments_from, openai::tool_to_openai, token_count};
use crate::error::{Result, RuntimeError};

const PROVIDER: &str = "ollama";

pub fn messages_to_ollama(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            let mut converted = json!({
                "role": message.role().to_string(),
                "content": message.text(),
            });

            if message.role() == Role::Assistant && message.has_tool_calls() {
                converted["tool_calls"] = message
                    .tool_calls()
                    .iter()
                    .map(|call| {
                        json!({"function": {"name": call.name, "arguments": call.arguments}})
                    })
                    .collect();
            }

            if let agent_core::Content::Parts(parts) = message.content() {
                let images: Vec<&str> = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::ImageData { data, .. } => Some(data.as_str()),
                        ContentPart::ImageUrl { url } => {
                            tracing::warn!(%url, "Ollama only accepts inline images; skipping URL");
                            None
                        }
                        ContentPart::Text { .. } => None,
                    })
                    .collect();
                if !images.is_empty() {
                    converted["images"] = json!(images);
                }
            }

            converted
        })
        .collect()
}

/// Build an `/api/chat` request body
pub fn request_body(messages: &[Message], options: &ChatOptions, stream: bool) -> Value {
    let mut model_options = json!({
        "temperature": options.temperature,
        "num_predict": options.max_tokens,
    });
    if !options.stop_sequences.is_empty() {
        model_options["stop"] = json!(options.stop_sequences);
    }

    let mut body = json!({
        "model": options.model,
        "messages": messages_to_ollama(messages),
        "stream": stream,
        "options": model_options,
    });

    if !options.tools.is_empty() {
        body["tools"] = options.tools.iter().map(tool_to_openai).collect();
    }
    if let Some(schema) = &options.output_schema {
        body["format"] = schema.clone();
    }

    body
}

fn tool_calls_from(message: &Value) -> Vec<ToolCall> {
    message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .map(|call| {
                    let function = &call["function"];
                    let name = function["name"].as_str().unwrap_or_default();
                    let arguments = arguments_from(&function["arguments"]);
                    match call["id"].as_str() {
                        Some(id) => ToolCall::new(id, name, arguments),
                        None => ToolCall::with_generated_id(name, arguments),
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

fn check_error(body: &Value) -> Result<()> {
    match body["error"].as_str() {
        Some(message) => Err(RuntimeError::decode(PROVIDER, message)),
        None => Ok(()),
    }
}

fn usage_from(body: &Value) -> Usage {
    Usage::new(
        token_count(&body["prompt_eval_count"]),
        token_count(&body["eval_count"]),
    )
}

/// Parse a non-streaming `/api/chat` response
pub fn response_from_ollama(body: &Value) -> Result<Response> {
    check_error(body)?;
    let message = body
        .get("message")
        .ok_or_else(|| RuntimeError::decode(PROVIDER, "missing message"))?;

    let tool_calls = tool_calls_from(message);
    let stop_reason = if tool_calls.is_empty() {
        body["done_reason"].as_str().map(StopReason::from_vendor)
    } else {
        Some(StopReason::ToolUse)
    };

    Ok(Response {
        text: message["content"].as_str().unwrap_or_default().to_owned(),
        tool_calls,
        usage: usage_from(body),
        stop_reason,
        ..Response::default()
    })
}

/// Parse one line of a streaming `/api/chat` response
pub fn chunk_from_ollama(line: &Value) -> Result<StreamChunk> {
    check_error(line)?;

    let done = line["done"].as_bool().unwrap_or(false);
    let mut chunk = StreamChunk::text(line["message"]["content"].as_str().unwrap_or_default());
    chunk.is_complete = done;
    chunk.tool_calls = tool_calls_from(&line["message"]);

    if done {
        chunk.usage = Some(usage_from(line));
        chunk.stop_reason = line["done_reason"].as_str().map(StopReason::from_vendor);
    }

    Ok(chunk)
}
