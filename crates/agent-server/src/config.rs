//! Server configuration from the environment

use agent_core::AgentConfig;

const DEFAULT_INSTRUCTIONS: &str =
    "You are a helpful assistant. Use the available tools when they help answer accurately.";

#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub agent: AgentConfig,
}

impl ServerConfig {
    /// Read `BIND_ADDR`, `AGENT_MODEL`, `AGENT_INSTRUCTIONS` and `AGENT_MAX_TURNS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = AgentConfig::default();

        let max_turns = match lookup("AGENT_MAX_TURNS") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Ignoring invalid AGENT_MAX_TURNS");
                defaults.max_turns
            }),
            None => defaults.max_turns,
        };

        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            agent: AgentConfig {
                model: lookup("AGENT_MODEL").unwrap_or(defaults.model.clone()),
                instructions: lookup("AGENT_INSTRUCTIONS")
                    .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.into()),
                max_turns,
                ..defaults
            },
        }
    }
}
