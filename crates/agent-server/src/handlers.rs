//! HTTP/WebSocket Handlers

use axum::{
    Json,
    extract::{State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use agent_core::{AgentError, RunOptions, StopReason, StreamEvent, ToolDescriptor, Usage};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub model: String,
    /// None when the provider has no health probe
    pub provider_connected: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub prompt: String,
    #[serde(default)]
    pub max_turns: Option<usize>,
}

impl RunRequest {
    fn options(&self) -> RunOptions {
        let mut options = RunOptions::new();
        options.max_turns = self.max_turns;
        options
    }
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub text: String,
    pub usage: Usage,
    pub stop_reason: Option<StopReason>,
    /// Messages exchanged, including tool results
    pub messages: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: &AgentError) -> ApiError {
    let status = match err {
        AgentError::MaxTurns(_) | AgentError::StructuredOutput { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AgentError::UnsupportedCapability(_) => StatusCode::BAD_REQUEST,
        AgentError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AgentError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        AgentError::Provider(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: err.code().into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider_connected = match &state.ollama {
        Some(ollama) => Some(ollama.health_check().await),
        None => None,
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.agent.provider().name().to_owned(),
        model: state.agent.config().model.clone(),
        provider_connected,
    })
}

/// Locally installed models
pub async fn list_models(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ApiError> {
    let Some(ollama) = &state.ollama else {
        return Ok(Json(Vec::new()));
    };

    ollama
        .list_models()
        .await
        .map(Json)
        .map_err(|e| api_error(&AgentError::from(e)))
}

/// Tools the agent can call
pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDescriptor>> {
    Json(state.agent.tools().descriptors())
}

/// Run the agent to completion (non-streaming)
pub async fn run_handler(
    State(state): State<AppState>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let response = state
        .agent
        .run(payload.prompt.as_str(), payload.options())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, code = e.code(), "Agent run failed");
            api_error(&e)
        })?;

    Ok(Json(RunResponse {
        text: response.text,
        usage: response.usage,
        stop_reason: response.stop_reason,
        messages: response.messages.len(),
    }))
}

/// WebSocket event stream: one [`RunRequest`] per text frame, answered by
/// the run's events
pub async fn run_stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

async fn handle_stream(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!(error = %e, "WebSocket error");
                break;
            }
            _ => continue,
        };

        let request: RunRequest = match serde_json::from_str(msg.as_str()) {
            Ok(r) => r,
            Err(e) => {
                let event = StreamEvent::Error {
                    code: "BAD_REQUEST".into(),
                    error: e.to_string(),
                };
                if send_event(&mut sender, &event).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let mut events = state.agent.stream_events(request.prompt.as_str(), request.options());
        while let Some(event) = events.next().await {
            // A closed socket drops the stream, which stops the run
            if send_event(&mut sender, &event).await.is_err() {
                return;
            }
        }
    }
}

async fn send_event<S>(sender: &mut S, event: &StreamEvent) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let payload = serde_json::to_string(event).map_err(|e| {
        tracing::error!(error = %e, "Failed to encode event");
    })?;
    sender
        .send(Message::Text(payload.into()))
        .await
        .map_err(|_| tracing::debug!("Client went away"))
}
