//! Application State

use std::sync::Arc;

use agent_core::Agent;
use agent_runtime::OllamaProvider;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The agent every request runs against
    pub agent: Agent,

    /// Ollama client for health and model listing (None when another provider is used)
    pub ollama: Option<Arc<OllamaProvider>>,
}
