//! HTTP Request Tool
//!
//! Lets the model fetch data from web APIs. JSON bodies are returned decoded,
//! anything else as text. Error statuses fail the tool call.

use std::time::Duration;

use agent_core::{Arguments, FunctionTool, Schema};
use anyhow::{Context as _, bail};
use serde_json::{Value, json};

pub const NAME: &str = "http_request";

const TIMEOUT: Duration = Duration::from_secs(30);

/// `http_request {url, method?, body?}` with a fresh client
pub fn http_tool() -> FunctionTool {
    http_tool_with(reqwest::Client::new())
}

/// `http_request` sharing an existing client
pub fn http_tool_with(client: reqwest::Client) -> FunctionTool {
    FunctionTool::new(
        NAME,
        "Make an HTTP request to fetch data from a URL",
        Schema::object([
            (
                "url",
                Schema::string()
                    .pattern("^https?://")
                    .description("The URL to make the request to"),
            ),
            (
                "method",
                Schema::enumeration(["GET", "POST", "PUT", "PATCH", "DELETE"])
                    .description("HTTP method")
                    .default("GET")
                    .optional(),
            ),
            (
                "body",
                Schema::string()
                    .description("Request body for POST/PUT/PATCH requests")
                    .optional(),
            ),
        ]),
        move |args, _ctx| request(client.clone(), args),
    )
}

async fn request(client: reqwest::Client, args: Arguments) -> anyhow::Result<Value> {
    let url = args.get("url").and_then(Value::as_str).unwrap_or_default();
    let method = args.get("method").and_then(Value::as_str).unwrap_or("GET");
    let method = reqwest::Method::from_bytes(method.as_bytes())
        .with_context(|| format!("Invalid method {method}"))?;

    tracing::debug!(%method, url, "Tool HTTP request");

    let mut builder = client.request(method, url).timeout(TIMEOUT);
    if let Some(body) = args.get("body").and_then(Value::as_str) {
        builder = builder.body(body.to_owned());
    }

    let response = builder.send().await.context("Request failed")?;
    let status = response.status();
    let text = response.text().await.context("Failed to read response body")?;

    if status.is_client_error() || status.is_server_error() {
        bail!("HTTP error: {}", status.as_u16());
    }

    let data = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
    Ok(json!({
        "status_code": status.as_u16(),
        "data": data,
    }))
}
