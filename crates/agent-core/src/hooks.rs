//! Tool-call observers
//!
//! Hooks watch the engine run tools. They are side-effect only: nothing they
//! do can change or stop the control flow.

use std::sync::Arc;

use serde_json::Value;

use crate::error::AgentError;
use crate::tool::Arguments;

pub type BeforeToolCall = Arc<dyn Fn(&str, &Arguments) + Send + Sync>;

/// Receives the tool name, its result and the handler's wall-clock seconds
pub type AfterToolCall = Arc<dyn Fn(&str, &Value, f64) + Send + Sync>;

pub type OnError = Arc<dyn Fn(&AgentError) + Send + Sync>;

/// Optional callbacks fired around tool execution
#[derive(Clone, Default)]
pub struct Hooks {
    pub before_tool_call: Option<BeforeToolCall>,
    pub after_tool_call: Option<AfterToolCall>,
    pub on_error: Option<OnError>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn before_tool_call(
        mut self,
        hook: impl Fn(&str, &Arguments) + Send + Sync + 'static,
    ) -> Self {
        self.before_tool_call = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn after_tool_call(
        mut self,
        hook: impl Fn(&str, &Value, f64) + Send + Sync + 'static,
    ) -> Self {
        self.after_tool_call = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&AgentError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub(crate) fn fire_before(&self, name: &str, arguments: &Arguments) {
        if let Some(hook) = &self.before_tool_call {
            hook(name, arguments);
        }
    }

    pub(crate) fn fire_after(&self, name: &str, result: &Value, duration_secs: f64) {
        if let Some(hook) = &self.after_tool_call {
            hook(name, result, duration_secs);
        }
    }

    pub(crate) fn fire_error(&self, error: &AgentError) {
        if let Some(hook) = &self.on_error {
            hook(error);
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("before_tool_call", &self.before_tool_call.is_some())
            .field("after_tool_call", &self.after_tool_call.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
