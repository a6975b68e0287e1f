//! Reasoning Loop
//!
//! Turns a prompt into a final answer, running whatever tools the model asks
//! for along the way, within a fixed turn budget.
//!
//! ```text
//! Start ─▶ AwaitingProviderResponse ─┬─▶ Done
//!               ▲                    ├─▶ MaxTurnsExceeded
//!               └── ToolExecution ◀──┴─▶ Failed
//! ```
//!
//! The agent is stateless between invocations: each call owns its message
//! log, and tools within a turn run one after another in the order the
//! provider returned them.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::event::{EventStream, StreamEvent};
use crate::hooks::Hooks;
use crate::message::{Content, Message};
use crate::provider::{ChatOptions, ChunkStream, LlmProvider, StreamChunk};
use crate::response::Response;
use crate::schema::Schema;
use crate::tool::{Context, Tool, ToolCall, ToolRegistry};

/// Agent configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model identifier passed to the provider
    pub model: String,

    /// System instructions. Empty means no system message at all.
    #[serde(default)]
    pub instructions: String,

    /// Maximum tokens per provider call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Provider calls allowed per invocation before giving up
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_max_turns() -> usize {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            instructions: String::new(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_turns: default_max_turns(),
            stop_sequences: Vec::new(),
        }
    }
}

/// Per-invocation options
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Parse and validate the final answer against this schema
    pub output_schema: Option<Schema>,

    /// Shared state handed to every tool
    pub context: Option<Context>,

    /// Overrides [`AgentConfig::max_turns`]
    pub max_turns: Option<usize>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn output_schema(mut self, schema: Schema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn context<T: Any + Send + Sync>(mut self, context: T) -> Self {
        self.context = Some(Arc::new(context));
        self
    }

    /// Use an already shared context, keeping a handle to inspect it afterwards
    #[must_use]
    pub fn shared_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub const fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("output_schema", &self.output_schema)
            .field("context", &self.context.is_some())
            .field("max_turns", &self.max_turns)
            .finish()
    }
}

/// The main Agent struct
///
/// Cheap to clone; clones share the provider, tools and hooks.
#[derive(Clone)]
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    hooks: Hooks,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(provider: Arc<dyn LlmProvider>, tools: ToolRegistry, config: AgentConfig) -> Self {
        Self {
            provider,
            tools: Arc::new(tools),
            hooks: Hooks::default(),
            config,
        }
    }

    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Register a tool, replacing any tool with the same name.
    ///
    /// Streams already running keep the registry they started with.
    pub fn add_tool<T: Tool + 'static>(&mut self, tool: T) -> &mut Self {
        Arc::make_mut(&mut self.tools).register(tool);
        self
    }

    /// Register a shared tool, replacing any tool with the same name
    pub fn add_tool_arc(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        Arc::make_mut(&mut self.tools).register_arc(tool);
        self
    }

    pub fn set_hooks(&mut self, hooks: Hooks) -> &mut Self {
        self.hooks = hooks;
        self
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run the full tool-calling loop and return the final response.
    ///
    /// Fails with [`AgentError::MaxTurns`] when the model is still calling
    /// tools after the turn budget, and with [`AgentError::StructuredOutput`]
    /// when an output schema was given and the answer does not satisfy it.
    /// Provider errors are returned as they are.
    #[tracing::instrument(name = "agent_run", skip_all, fields(model = %self.config.model))]
    pub async fn run(&self, prompt: impl Into<Content>, options: RunOptions) -> Result<Response> {
        let prompt = prompt.into();
        self.check_capabilities(&prompt)?;

        let max_turns = options.max_turns.unwrap_or(self.config.max_turns);
        let chat_options = self.chat_options(options.output_schema.as_ref());
        let mut messages = self.initial_messages(prompt);

        for turn in 0..max_turns {
            tracing::debug!(turn, messages = messages.len(), "Calling provider");
            let response = self.provider.chat(&messages, &chat_options).await?;

            messages.push(Message::assistant(
                response.text.clone(),
                response.tool_calls.clone(),
            ));

            if !response.has_tool_calls() {
                tracing::debug!(turns = turn + 1, "Agent finished");
                return finalize(response, messages, options.output_schema.as_ref());
            }

            for call in &response.tool_calls {
                let result = self.execute_tool(call, options.context.as_ref()).await;
                messages.push(Message::tool_result(call.id.clone(), &result));
            }
        }

        tracing::warn!(max_turns, "Agent ran out of turns");
        Err(AgentError::MaxTurns(max_turns))
    }

    /// Run with default options and return only the text
    pub async fn ask(&self, question: &str) -> Result<String> {
        self.run(question, RunOptions::default())
            .await
            .map(|response| response.text)
    }

    /// Stream the model's answer to `prompt` without running tools.
    ///
    /// One provider call, forwarded chunk by chunk. Nothing is sent until the
    /// stream is first polled, and dropping it releases the provider stream.
    pub fn stream_text(&self, prompt: impl Into<Content>, options: RunOptions) -> ChunkStream {
        let agent = self.clone();
        let prompt = prompt.into();

        Box::pin(async_stream::stream! {
            if let Err(e) = agent.check_capabilities(&prompt) {
                yield Err::<StreamChunk, AgentError>(e);
                return;
            }

            let mut chat_options = agent.chat_options(options.output_schema.as_ref());
            // No loop here, so never offer tools the model could not use
            chat_options.tools.clear();

            let messages = agent.initial_messages(prompt);
            let mut inner = match agent.provider.stream(&messages, &chat_options).await {
                Ok(inner) => inner,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            while let Some(item) = inner.next().await {
                let done = item.as_ref().map_or(true, |chunk| chunk.is_complete);
                yield item;
                if done {
                    break;
                }
            }
        })
    }

    /// Run the full tool-calling loop as a stream of events.
    ///
    /// Emits `text` deltas while the model generates, a `tool_call` and
    /// `tool_result` pair per tool, and ends with exactly one `done` or
    /// `error` event. Failures never surface as anything but that `error`
    /// event. Dropping the stream stops further provider calls.
    pub fn stream_events(&self, prompt: impl Into<Content>, options: RunOptions) -> EventStream {
        let agent = self.clone();
        let prompt = prompt.into();

        Box::pin(async_stream::stream! {
            if let Err(e) = agent.check_capabilities(&prompt) {
                yield error_event(&e);
                return;
            }

            let max_turns = options.max_turns.unwrap_or(agent.config.max_turns);
            let chat_options = agent.chat_options(options.output_schema.as_ref());
            let mut messages = agent.initial_messages(prompt);

            for turn in 0..max_turns {
                tracing::debug!(turn, messages = messages.len(), "Streaming from provider");

                let mut inner = match agent.provider.stream(&messages, &chat_options).await {
                    Ok(inner) => inner,
                    Err(e) => {
                        yield error_event(&e);
                        return;
                    }
                };

                let mut text = String::new();
                let mut tool_calls = Vec::new();

                while let Some(item) = inner.next().await {
                    let chunk = match item {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            yield error_event(&e);
                            return;
                        }
                    };

                    let done = chunk.is_complete;
                    tool_calls.extend(chunk.tool_calls);
                    if !chunk.text.is_empty() {
                        text.push_str(&chunk.text);
                        yield StreamEvent::Text { text: chunk.text };
                    }
                    if done {
                        break;
                    }
                }
                drop(inner);

                messages.push(Message::assistant(text.clone(), tool_calls.clone()));

                if tool_calls.is_empty() {
                    let data = match &options.output_schema {
                        Some(schema) => parse_structured_output(&text, schema).map(Some),
                        None => Ok(None),
                    };
                    match data {
                        Ok(data) => yield StreamEvent::Done { data },
                        Err(e) => yield error_event(&e),
                    }
                    return;
                }

                for call in tool_calls {
                    yield StreamEvent::ToolCall {
                        id: call.id.clone(),
                        tool: call.name.clone(),
                        input: call.arguments.clone(),
                    };

                    let result = agent.execute_tool(&call, options.context.as_ref()).await;
                    messages.push(Message::tool_result(call.id.clone(), &result));

                    yield StreamEvent::ToolResult {
                        id: call.id,
                        tool: call.name,
                        result,
                    };
                }
            }

            tracing::warn!(max_turns, "Agent ran out of turns");
            yield error_event(&AgentError::MaxTurns(max_turns));
        })
    }

    /// Images are only sent to providers that declare vision support
    fn check_capabilities(&self, prompt: &Content) -> Result<()> {
        if prompt.has_images() && !self.provider.supports_vision() {
            return Err(AgentError::UnsupportedCapability("vision".into()));
        }
        Ok(())
    }

    fn initial_messages(&self, prompt: Content) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if !self.config.instructions.is_empty() {
            messages.push(Message::system(self.config.instructions.clone()));
        }
        messages.push(Message::user(prompt));
        messages
    }

    fn chat_options(&self, output_schema: Option<&Schema>) -> ChatOptions {
        let mut options = ChatOptions {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stop_sequences: self.config.stop_sequences.clone(),
            ..ChatOptions::default()
        };

        if !self.tools.is_empty() && self.provider.supports_tool_calling() {
            options.tools = self.tools.descriptors();
        }

        if let Some(schema) = output_schema {
            if self.provider.supports_structured_output() {
                options.output_schema = Some(schema.describe());
            }
        }

        options
    }

    /// Run one tool call. Never fails: problems become an `{"error": ...}` result.
    async fn execute_tool(&self, call: &ToolCall, context: Option<&Context>) -> Value {
        let Some(tool) = self.tools.get(&call.name) else {
            tracing::warn!(tool = %call.name, "Unknown tool requested");
            return json!({ "error": format!("Unknown tool: {}", call.name) });
        };

        self.hooks.fire_before(&call.name, &call.arguments);
        tracing::debug!(tool = %call.name, id = %call.id, "Executing tool");

        let started = Instant::now();
        match tool.execute(&call.arguments, context).await {
            Ok(result) => {
                let duration = started.elapsed().as_secs_f64();
                tracing::debug!(tool = %call.name, duration, "Tool finished");
                self.hooks.fire_after(&call.name, &result, duration);
                result
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(tool = %call.name, error = %message, "Tool failed");
                self.hooks.fire_error(&AgentError::ToolExecution {
                    tool: call.name.clone(),
                    message: message.clone(),
                });
                json!({ "error": message })
            }
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("provider", &self.provider.name())
            .field("tools", &self.tools)
            .field("hooks", &self.hooks)
            .field("config", &self.config)
            .finish()
    }
}

fn finalize(
    mut response: Response,
    messages: Vec<Message>,
    output_schema: Option<&Schema>,
) -> Result<Response> {
    if let Some(schema) = output_schema {
        response.data = Some(parse_structured_output(&response.text, schema)?);
    }
    response.messages = messages;
    Ok(response)
}

/// Parse the model's final text as JSON and validate it against `schema`.
///
/// A single surrounding Markdown code fence (```` ```json ```` or
/// ```` ``` ````) is removed first.
pub fn parse_structured_output(text: &str, schema: &Schema) -> Result<Value> {
    let body = strip_code_fence(text);
    let data: Value = serde_json::from_str(body).map_err(|e| AgentError::StructuredOutput {
        message: format!("Failed to parse structured output: {e}"),
        errors: vec![e.to_string()],
    })?;
    Ok(schema.parse(data)?)
}

fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

fn error_event(error: &AgentError) -> StreamEvent {
    StreamEvent::Error {
        code: error.code().into(),
        error: error.to_string(),
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    hooks: Hooks,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            hooks: Hooks::default(),
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Replace the whole configuration
    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = instructions.into();
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    #[must_use]
    pub const fn temperature(mut self, temp: f32) -> Self {
        self.config.temperature = temp;
        self
    }

    #[must_use]
    pub const fn max_tokens(mut self, max: u32) -> Self {
        self.config.max_tokens = max;
        self
    }

    #[must_use]
    pub const fn max_turns(mut self, max: usize) -> Self {
        self.config.max_turns = max;
        self
    }

    #[must_use]
    pub fn stop_sequences(mut self, stops: Vec<String>) -> Self {
        self.config.stop_sequences = stops;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        if self.config.model.trim().is_empty() {
            return Err(AgentError::Config("Model is required".into()));
        }

        Ok(Agent {
            provider,
            tools: Arc::new(self.tools),
            hooks: self.hooks,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ContentPart, Role};
    use crate::mock::MockProvider;
    use crate::tool::{Arguments, FunctionTool};
    use std::sync::Mutex;
    use std::time::Duration;

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap_or_default()
    }

    fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
        ToolCall::new(id, name, args(arguments))
    }

    fn add_tool() -> FunctionTool {
        FunctionTool::from_fn(
            "add",
            "Add two integers",
            Schema::object([("a", Schema::integer()), ("b", Schema::integer())]),
            |args, _ctx| {
                let a = args["a"].as_i64().unwrap_or_default();
                let b = args["b"].as_i64().unwrap_or_default();
                Ok(json!(a + b))
            },
        )
    }

    fn agent_with(mock: &Arc<MockProvider>) -> Agent {
        Agent::builder()
            .provider(mock.clone())
            .model("test-model")
            .instructions("You are a calculator.")
            .tool(add_tool())
            .build()
            .unwrap()
    }

    fn roles(messages: &[Message]) -> Vec<Role> {
        messages.iter().map(Message::role).collect()
    }

    #[tokio::test]
    async fn test_no_tool_calls_makes_one_provider_call() {
        let mock = Arc::new(MockProvider::new(vec![Response::text("Forty-two.")]));
        let agent = agent_with(&mock);

        let response = agent.run("What is the answer?", RunOptions::new()).await.unwrap();

        assert_eq!(response.text, "Forty-two.");
        assert_eq!(mock.call_count(), 1);
        assert_eq!(
            roles(&response.messages),
            vec![Role::System, Role::User, Role::Assistant]
        );
        assert!(response.data.is_none());
    }

    #[tokio::test]
    async fn test_empty_instructions_send_no_system_message() {
        let mock = Arc::new(MockProvider::new(vec![Response::text("hi")]));
        let agent = Agent::builder().provider(mock.clone()).model("m").build().unwrap();

        agent.ask("hello").await.unwrap();

        let sent = &mock.requests()[0].messages;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].role(), Role::User);
    }

    #[tokio::test]
    async fn test_tool_chain_appends_results_in_order() {
        let mock = Arc::new(MockProvider::new(vec![
            Response::tool_calls(
                "Let me add.",
                vec![
                    call("c1", "add", json!({"a": 1, "b": 2})),
                    call("c2", "add", json!({"a": 3, "b": 4})),
                ],
            ),
            Response::tool_calls("", vec![call("c3", "add", json!({"a": 3, "b": 7}))]),
            Response::text("The sum is 10."),
        ]));
        let agent = agent_with(&mock);

        let response = agent.run("Add things", RunOptions::new()).await.unwrap();

        assert_eq!(mock.call_count(), 3);
        assert_eq!(response.text, "The sum is 10.");
        assert_eq!(
            roles(&response.messages),
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Tool,
                Role::Assistant,
                Role::Tool,
                Role::Assistant,
            ]
        );

        let results: Vec<(Option<&str>, &str)> = response
            .messages
            .iter()
            .filter(|m| m.is_tool())
            .map(|m| (m.tool_call_id(), m.text()))
            .collect();
        assert_eq!(
            results,
            vec![(Some("c1"), "3"), (Some("c2"), "7"), (Some("c3"), "10")]
        );

        // The second request carries everything produced by the first turn
        assert_eq!(mock.requests()[1].messages.len(), 5);
        assert_eq!(mock.requests()[1].messages[2].tool_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_max_turns_is_a_hard_limit() {
        let mock = Arc::new(MockProvider::repeating(Response::tool_calls(
            "",
            vec![call("c1", "add", json!({"a": 1, "b": 1}))],
        )));
        let agent = agent_with(&mock);

        let err = agent
            .run("loop forever", RunOptions::new().max_turns(3))
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::MaxTurns(3)));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_configured_max_turns_applies_by_default() {
        let mock = Arc::new(MockProvider::repeating(Response::tool_calls(
            "",
            vec![call("c1", "add", json!({"a": 1, "b": 1}))],
        )));
        let agent = Agent::builder()
            .provider(mock.clone())
            .model("m")
            .max_turns(2)
            .tool(add_tool())
            .build()
            .unwrap();

        assert!(matches!(
            agent.run("x", RunOptions::new()).await,
            Err(AgentError::MaxTurns(2))
        ));
        assert_eq!(mock.call_count(), 2);

        assert!(matches!(
            agent.run("x", RunOptions::new().max_turns(0)).await,
            Err(AgentError::MaxTurns(0))
        ));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_the_model() {
        let mock = Arc::new(MockProvider::new(vec![
            Response::tool_calls("", vec![call("c1", "nope", json!({}))]),
            Response::text("Sorry, I can't."),
        ]));
        let before_calls = Arc::new(Mutex::new(0_u32));
        let seen = before_calls.clone();
        let mut agent = agent_with(&mock);
        agent.set_hooks(Hooks::new().before_tool_call(move |_, _| {
            *seen.lock().unwrap() += 1;
        }));

        let response = agent.run("x", RunOptions::new()).await.unwrap();

        let tool_msg = &response.messages[3];
        assert_eq!(tool_msg.tool_call_id(), Some("c1"));
        assert_eq!(
            serde_json::from_str::<Value>(tool_msg.text()).unwrap(),
            json!({"error": "Unknown tool: nope"})
        );
        assert_eq!(response.text, "Sorry, I can't.");
        assert_eq!(*before_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tool_failure_is_recovered_and_observed() {
        let mock = Arc::new(MockProvider::new(vec![
            Response::tool_calls("", vec![call("c1", "explode", json!({}))]),
            Response::text("It failed."),
        ]));
        let errors = Arc::new(Mutex::new(Vec::<String>::new()));
        let afters = Arc::new(Mutex::new(0_u32));
        let (errors_hook, afters_hook) = (errors.clone(), afters.clone());

        let agent = Agent::builder()
            .provider(mock.clone())
            .model("m")
            .tool(FunctionTool::from_fn(
                "explode",
                "Always fails",
                Schema::object(Vec::<(String, Schema)>::new()),
                |_, _| Err(anyhow::anyhow!("boom")),
            ))
            .hooks(
                Hooks::new()
                    .on_error(move |e| errors_hook.lock().unwrap().push(e.to_string()))
                    .after_tool_call(move |_, _, _| *afters_hook.lock().unwrap() += 1),
            )
            .build()
            .unwrap();

        let response = agent.run("x", RunOptions::new()).await.unwrap();

        assert_eq!(
            serde_json::from_str::<Value>(response.messages[2].text()).unwrap(),
            json!({"error": "boom"})
        );
        assert_eq!(*errors.lock().unwrap(), vec!["Tool 'explode' failed: boom"]);
        assert_eq!(*afters.lock().unwrap(), 0);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_hooks_see_arguments_results_and_duration() {
        let mock = Arc::new(MockProvider::new(vec![
            Response::tool_calls("", vec![call("c1", "slow", json!({"ms": 20}))]),
            Response::text("done"),
        ]));
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let durations = Arc::new(Mutex::new(Vec::<f64>::new()));
        let (before_log, after_log) = (log.clone(), log.clone());
        let after_durations = durations.clone();

        let agent = Agent::builder()
            .provider(mock)
            .model("m")
            .tool(FunctionTool::new(
                "slow",
                "Sleeps",
                Schema::object([("ms", Schema::integer().min(0))]),
                |args, _ctx| async move {
                    let ms = args["ms"].as_u64().unwrap_or_default();
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(json!("slept"))
                },
            ))
            .hooks(
                Hooks::new()
                    .before_tool_call(move |name, args| {
                        before_log.lock().unwrap().push(format!("before {name} {}", args["ms"]));
                    })
                    .after_tool_call(move |name, result, duration| {
                        after_log.lock().unwrap().push(format!("after {name} {result}"));
                        after_durations.lock().unwrap().push(duration);
                    }),
            )
            .build()
            .unwrap();

        agent.run("x", RunOptions::new()).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["before slow 20", "after slow \"slept\""]
        );
        let durations = durations.lock().unwrap();
        assert_eq!(durations.len(), 1);
        assert!(durations[0] > 0.0);
    }

    #[tokio::test]
    async fn test_context_is_shared_between_tools() {
        let mock = Arc::new(MockProvider::new(vec![
            Response::tool_calls(
                "",
                vec![
                    call("c1", "remember", json!({"item": "milk"})),
                    call("c2", "remember", json!({"item": "eggs"})),
                ],
            ),
            Response::text("Noted."),
        ]));
        let agent = Agent::builder()
            .provider(mock)
            .model("m")
            .tool(FunctionTool::from_fn(
                "remember",
                "Add to the shopping list",
                Schema::object([("item", Schema::string())]),
                |args, ctx| {
                    let list = ctx
                        .and_then(|c| c.downcast_ref::<Mutex<Vec<String>>>())
                        .ok_or_else(|| anyhow::anyhow!("no list"))?;
                    let mut list = list.lock().map_err(|e| anyhow::anyhow!(e.to_string()))?;
                    list.push(args["item"].as_str().unwrap_or_default().to_owned());
                    Ok(json!(list.len()))
                },
            ))
            .build()
            .unwrap();

        let shared: Context = Arc::new(Mutex::new(Vec::<String>::new()));
        let response = agent
            .run("buy stuff", RunOptions::new().shared_context(shared.clone()))
            .await
            .unwrap();

        let list = shared.downcast_ref::<Mutex<Vec<String>>>().unwrap();
        assert_eq!(*list.lock().unwrap(), vec!["milk", "eggs"]);
        assert_eq!(response.messages[4].text(), "2");
    }

    #[tokio::test]
    async fn test_structured_output_is_parsed_and_validated() {
        let mock = Arc::new(
            MockProvider::new(vec![Response::text(
                "```json\n{\"city\": \"Paris\", \"temp\": 21}\n```",
            )])
            .with_structured_output(true),
        );
        let agent = agent_with(&mock);
        let schema = Schema::object([("city", Schema::string()), ("temp", Schema::integer())]);

        let response = agent
            .run("weather?", RunOptions::new().output_schema(schema.clone()))
            .await
            .unwrap();

        assert_eq!(response.data, Some(json!({"city": "Paris", "temp": 21})));
        assert!(response.text.starts_with("```json"));
        assert_eq!(mock.requests()[0].options.output_schema, Some(schema.describe()));
    }

    #[tokio::test]
    async fn test_schema_hint_only_sent_when_supported() {
        let mock = Arc::new(MockProvider::new(vec![Response::text("{\"ok\": true}")]));
        let agent = agent_with(&mock);

        let response = agent
            .run(
                "x",
                RunOptions::new().output_schema(Schema::object([("ok", Schema::boolean())])),
            )
            .await
            .unwrap();

        assert_eq!(response.data, Some(json!({"ok": true})));
        assert!(mock.requests()[0].options.output_schema.is_none());
    }

    #[tokio::test]
    async fn test_structured_output_validation_failure() {
        let mock = Arc::new(MockProvider::new(vec![Response::text("{\"temp\": \"warm\"}")]));
        let agent = agent_with(&mock);
        let schema = Schema::object([("city", Schema::string()), ("temp", Schema::integer())]);

        let err = agent
            .run("x", RunOptions::new().output_schema(schema))
            .await
            .unwrap_err();

        match err {
            AgentError::StructuredOutput { errors, .. } => assert_eq!(
                errors,
                vec![
                    "$.city: Required property is missing",
                    "$.temp: Expected integer, got string",
                ]
            ),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_structured_output_parse_failure() {
        let mock = Arc::new(MockProvider::new(vec![Response::text("not json")]));
        let agent = agent_with(&mock);

        let err = agent
            .run("x", RunOptions::new().output_schema(Schema::string()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AgentError::StructuredOutput { ref message, .. }
                if message.starts_with("Failed to parse structured output")
        ));
    }

    #[tokio::test]
    async fn test_tools_only_offered_to_capable_providers() {
        let capable = Arc::new(MockProvider::new(vec![Response::text("a")]));
        agent_with(&capable).ask("x").await.unwrap();
        assert_eq!(capable.requests()[0].options.tools.len(), 1);
        assert_eq!(capable.requests()[0].options.tools[0].name, "add");

        let plain = Arc::new(MockProvider::new(vec![Response::text("a")]).with_tool_calling(false));
        agent_with(&plain).ask("x").await.unwrap();
        assert!(plain.requests()[0].options.tools.is_empty());
    }

    #[tokio::test]
    async fn test_images_require_vision_support() {
        let mock = Arc::new(MockProvider::new(vec![Response::text("a cat")]));
        let agent = agent_with(&mock);
        let prompt = vec![
            ContentPart::text("What is this?"),
            ContentPart::ImageUrl { url: "https://x.test/cat.png".into() },
        ];

        let err = agent.run(prompt.clone(), RunOptions::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedCapability(ref what) if what == "vision"));
        assert_eq!(mock.call_count(), 0);

        let seeing = Arc::new(MockProvider::new(vec![Response::text("a cat")]).with_vision(true));
        let response = agent_with(&seeing).run(prompt, RunOptions::new()).await.unwrap();
        assert_eq!(response.text, "a cat");
    }

    #[tokio::test]
    async fn test_provider_errors_propagate_unchanged() {
        let mock = Arc::new(MockProvider::new(vec![]).then_error("connection refused"));
        let agent = agent_with(&mock);

        let err = agent.ask("x").await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ref m) if m == "connection refused"));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stream_events_two_turn_order() {
        let mock = Arc::new(MockProvider::new(vec![
            Response::tool_calls("Adding now", vec![call("c1", "add", json!({"a": 2, "b": 3}))]),
            Response::text("It is 5"),
        ]));
        let agent = agent_with(&mock);

        let events: Vec<StreamEvent> =
            agent.stream_events("2+3?", RunOptions::new()).collect().await;

        assert_eq!(
            events,
            vec![
                StreamEvent::text("Adding "),
                StreamEvent::text("now"),
                StreamEvent::ToolCall {
                    id: "c1".into(),
                    tool: "add".into(),
                    input: args(json!({"a": 2, "b": 3})),
                },
                StreamEvent::ToolResult {
                    id: "c1".into(),
                    tool: "add".into(),
                    result: json!(5),
                },
                StreamEvent::text("It "),
                StreamEvent::text("is "),
                StreamEvent::text("5"),
                StreamEvent::Done { data: None },
            ]
        );
        assert_eq!(mock.call_count(), 2);
        assert!(mock.requests().iter().all(|r| r.streamed));
        // The second turn saw the tool result
        assert_eq!(mock.requests()[1].messages[3].text(), "5");
    }

    #[tokio::test]
    async fn test_stream_events_reports_max_turns_as_event() {
        let mock = Arc::new(MockProvider::repeating(Response::tool_calls(
            "",
            vec![call("c1", "add", json!({"a": 1, "b": 1}))],
        )));
        let agent = agent_with(&mock);

        let events: Vec<StreamEvent> = agent
            .stream_events("x", RunOptions::new().max_turns(2))
            .collect()
            .await;

        assert_eq!(mock.call_count(), 2);
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Error {
                code: "MAX_TURNS".into(),
                error: "Agent reached maximum turns (2) without completing".into(),
            })
        );
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_stream_events_reports_provider_failure() {
        let mock = Arc::new(MockProvider::new(vec![]).then_error("down"));
        let agent = agent_with(&mock);

        let events: Vec<StreamEvent> = agent.stream_events("x", RunOptions::new()).collect().await;

        assert_eq!(
            events,
            vec![StreamEvent::Error {
                code: "PROVIDER_ERROR".into(),
                error: "Provider error: down".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_stream_events_done_carries_structured_data() {
        let mock = Arc::new(MockProvider::new(vec![Response::text("{\"n\": 1}")]));
        let agent = agent_with(&mock);

        let events: Vec<StreamEvent> = agent
            .stream_events(
                "x",
                RunOptions::new().output_schema(Schema::object([("n", Schema::integer())])),
            )
            .collect()
            .await;

        assert_eq!(events.last(), Some(&StreamEvent::Done { data: Some(json!({"n": 1})) }));
    }

    #[tokio::test]
    async fn test_dropping_event_stream_stops_provider_calls() {
        let mock = Arc::new(MockProvider::repeating(Response::tool_calls(
            "working",
            vec![call("c1", "add", json!({"a": 1, "b": 1}))],
        )));
        let agent = agent_with(&mock);

        let mut events = agent.stream_events("x", RunOptions::new());
        assert_eq!(events.next().await, Some(StreamEvent::text("working")));
        drop(events);

        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stream_text_is_single_pass() {
        let mock = Arc::new(MockProvider::new(vec![Response::tool_calls(
            "hello world",
            vec![call("c1", "add", json!({"a": 1, "b": 1}))],
        )]));
        let agent = agent_with(&mock);

        let stream = agent.stream_text("hi", RunOptions::new());
        assert_eq!(mock.call_count(), 0);

        let chunks: Vec<StreamChunk> = stream.map(|c| c.unwrap()).collect().await;
        let text: String = chunks.iter().map(|c| c.text.as_str()).collect();

        assert_eq!(text, "hello world");
        assert!(chunks.last().unwrap().is_complete);
        assert_eq!(mock.call_count(), 1);
        assert!(mock.requests()[0].options.tools.is_empty());
    }

    /// Streams a fixed chunk sequence; each open stream holds a clone of
    /// `transport` until it is dropped
    struct ScriptedStream {
        chunks: Vec<std::result::Result<&'static str, &'static str>>,
        transport: Arc<()>,
        calls: Mutex<usize>,
    }

    impl ScriptedStream {
        fn new(chunks: Vec<std::result::Result<&'static str, &'static str>>) -> Self {
            Self {
                chunks,
                transport: Arc::new(()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedStream {
        fn name(&self) -> &str {
            "scripted-stream"
        }

        async fn chat(&self, _messages: &[Message], _options: &ChatOptions) -> Result<Response> {
            Err(AgentError::Provider("chat not scripted".into()))
        }

        async fn stream(
            &self,
            _messages: &[Message],
            _options: &ChatOptions,
        ) -> Result<ChunkStream> {
            *self.calls.lock().unwrap() += 1;
            let transport = self.transport.clone();
            let chunks = self.chunks.clone();
            Ok(Box::pin(async_stream::stream! {
                let _transport = transport;
                for chunk in chunks {
                    yield chunk
                        .map(StreamChunk::text)
                        .map_err(|e| AgentError::Provider(e.into()));
                }
                yield Ok(StreamChunk::complete());
            }))
        }
    }

    fn scripted_agent(provider: &Arc<ScriptedStream>) -> Agent {
        Agent::builder()
            .provider(provider.clone())
            .model("test-model")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_dropping_text_stream_releases_transport() {
        let provider = Arc::new(ScriptedStream::new(vec![Ok("one "), Ok("two "), Ok("three")]));
        let agent = scripted_agent(&provider);

        let mut stream = agent.stream_text("hi", RunOptions::new());
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.text, "one ");
        assert_eq!(Arc::strong_count(&provider.transport), 2);

        drop(stream);

        assert_eq!(Arc::strong_count(&provider.transport), 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_text_stream_ends_at_provider_error() {
        let provider = Arc::new(ScriptedStream::new(vec![
            Ok("partial "),
            Err("connection reset"),
            Ok("lost"),
        ]));
        let agent = scripted_agent(&provider);

        let items: Vec<Result<StreamChunk>> =
            agent.stream_text("hi", RunOptions::new()).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().text, "partial ");
        assert!(matches!(&items[1], Err(AgentError::Provider(msg)) if msg == "connection reset"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_add_tool_between_runs() {
        let mock = Arc::new(MockProvider::new(vec![
            Response::tool_calls("", vec![call("c1", "echo", json!({"v": "x"}))]),
            Response::text("ok"),
        ]));
        let mut agent = agent_with(&mock);
        let snapshot = agent.clone();

        agent.add_tool(FunctionTool::from_fn(
            "echo",
            "Echo",
            Schema::object([("v", Schema::string())]),
            |args, _| Ok(args["v"].clone()),
        ));

        assert_eq!(agent.tools().len(), 2);
        assert_eq!(snapshot.tools().len(), 1);

        let response = agent.run("x", RunOptions::new()).await.unwrap();
        assert_eq!(response.messages[3].text(), "x");
    }

    #[test]
    fn test_builder_requires_provider_and_model() {
        assert!(matches!(
            AgentBuilder::new().build(),
            Err(AgentError::Config(_))
        ));

        let mock = Arc::new(MockProvider::new(vec![]));
        assert!(matches!(
            Agent::builder().provider(mock).model(" ").build(),
            Err(AgentError::Config(ref m)) if m == "Model is required"
        ));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_code_fence("{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn test_agent_config_defaults_from_partial_json() {
        let config: AgentConfig = serde_json::from_value(json!({"model": "qwen2.5"})).unwrap();
        assert_eq!(config.model, "qwen2.5");
        assert_eq!(config.max_turns, 10);
        assert_eq!(config.max_tokens, 4096);
        assert!(config.instructions.is_empty());
    }
}
