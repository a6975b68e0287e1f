//! Tool System
//!
//! Tools are named, schema-described functions the model may ask the engine
//! to run. They are declared explicitly, parameter schema and handler
//! together, and registered by name (last registration wins).

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::Schema;

/// Tool arguments: parameter name to value
pub type Arguments = serde_json::Map<String, Value>;

/// Caller-supplied state shared by every tool of one invocation.
///
/// Tools downcast it to the concrete type they expect; interior mutability
/// (a `Mutex`, atomics) lets one tool's effects reach the next.
pub type Context = Arc<dyn Any + Send + Sync>;

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID, echoed back on the tool-result message
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: Arguments,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// For providers that do not assign call IDs
    pub fn with_generated_id(name: impl Into<String>, arguments: Arguments) -> Self {
        Self::new(format!("call_{}", uuid::Uuid::new_v4().simple()), name, arguments)
    }
}

/// What a provider is told about a tool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON-Schema description of the arguments object
    pub input_schema: Value,
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique registry key
    fn name(&self) -> &str;

    /// Human-readable description (shown to LLM)
    fn description(&self) -> &str;

    /// JSON-Schema-shaped description of the arguments
    fn parameters(&self) -> Value;

    /// Run the tool. Errors are reported back to the model, never raised.
    async fn execute(
        &self,
        arguments: &Arguments,
        context: Option<&Context>,
    ) -> anyhow::Result<Value>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            input_schema: self.parameters(),
        }
    }
}

type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;

type Handler = Arc<dyn Fn(Arguments, Option<Context>) -> HandlerFuture + Send + Sync>;

/// A tool built from a parameter [`Schema`] and a closure.
///
/// Arguments are validated against the schema before the handler runs; a
/// mismatch is reported like any other handler failure.
///
/// ```rust,ignore
/// let weather = FunctionTool::from_fn(
///     "get_weather",
///     "Current weather for a city",
///     Schema::object([("city", Schema::string())]),
///     |args, _ctx| Ok(json!({"city": args["city"], "temp": 21})),
/// );
/// ```
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    schema: Schema,
    handler: Handler,
}

impl FunctionTool {
    /// Build a tool with an asynchronous handler
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Schema,
        handler: F,
    ) -> Self
    where
        F: Fn(Arguments, Option<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }

    /// Build a tool with a synchronous handler
    pub fn from_fn<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Schema,
        handler: F,
    ) -> Self
    where
        F: Fn(&Arguments, Option<&Context>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, description, schema, move |args, ctx| {
            std::future::ready(handler(&args, ctx.as_ref()))
        })
    }

    pub const fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.schema.describe()
    }

    async fn execute(
        &self,
        arguments: &Arguments,
        context: Option<&Context>,
    ) -> anyhow::Result<Value> {
        let check = self.schema.validate(&Value::Object(arguments.clone()));
        if !check.valid {
            anyhow::bail!("Invalid arguments: {}", check.errors.join("; "));
        }

        (self.handler)(arguments.clone(), context.cloned()).await
    }
}

/// Registry for available tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool, replacing any tool with the same name
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_owned();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "Replaced existing tool");
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Descriptors of all tools, ordered by name
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}
