//! agent-server
//!
//! Axum-based server exposing an agent over a REST endpoint and a WebSocket
//! event stream, backed by a local Ollama instance and the built-in tools.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{Agent, ToolRegistry};
use agent_runtime::OllamaProvider;

use crate::config::ServerConfig;
use crate::handlers::{health_check, list_models, list_tools, run_handler, run_stream_handler};
use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/models", get(list_models))
        .route("/api/tools", get(list_tools))
        .route("/api/run", post(run_handler))
        .route("/api/run/stream", get(run_stream_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment before reading RUST_LOG
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    let ollama = Arc::new(OllamaProvider::from_env()?);
    if ollama.health_check().await {
        tracing::info!(url = %ollama.config().base_url, "Connected to Ollama");
        if let Ok(models) = ollama.list_models().await {
            for model in models {
                tracing::info!(%model, "Model available");
            }
        }
    } else {
        tracing::warn!(
            url = %ollama.config().base_url,
            "Ollama not available, runs will fail until `ollama serve` is up"
        );
    }

    let mut tools = ToolRegistry::new();
    agent_tools::register_builtins(&mut tools);
    tracing::info!(count = tools.len(), tools = ?tools.names(), "Registered tools");

    let agent = Agent::builder()
        .provider(ollama.clone())
        .tools(tools)
        .config(config.agent.clone())
        .build()?;

    let state = AppState {
        agent,
        ollama: Some(ollama),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!(
        addr = %config.bind_addr,
        model = %config.agent.model,
        max_turns = config.agent.max_turns,
        "agent-server listening"
    );
    tracing::info!("  GET  /health          - Health check");
    tracing::info!("  GET  /api/models      - List available models");
    tracing::info!("  GET  /api/tools       - List registered tools");
    tracing::info!("  POST /api/run         - Run the agent");
    tracing::info!("  GET  /api/run/stream  - WebSocket event stream");

    axum::serve(listener, router(state)).await?;

    Ok(())
}
