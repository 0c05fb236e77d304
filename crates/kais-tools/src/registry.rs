//! Tool registry and dispatch (§4.2). Each tool is a self-contained module
//! implementing the `Tool` trait; the registry holds a name→tool map and
//! dispatches by name, never panicking on an unknown or failing tool.

use kais_llm::LlmTool;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub enum ToolResult {
    Text(String),
    Json(Value),
    Error(String),
}

impl ToolResult {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Self::Error(s.into())
    }

    /// The string the agent loop appends to working memory as a `tool` message.
    /// Error text is surfaced verbatim (§4.2: `"Unknown tool: <name>"`,
    /// `"Tool error: <msg>"` — each `Tool::execute` formats its own message).
    pub fn to_content_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Json(v) => serde_json::to_string_pretty(v).unwrap_or_default(),
            Self::Error(e) => e.clone(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// A named, schema-validated, side-effectful operation invokable by a Cell (§4.2).
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> Value;

    fn is_read_only(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> ToolResult;

    /// Default: race `execute` against cancellation. Tools that own a child
    /// process (`bash`) override this to kill it on cancellation.
    async fn execute_cancellable(&self, args: Value, cancel: CancellationToken) -> ToolResult {
        tokio::select! {
            result = self.execute(args) => result,
            _ = cancel.cancelled() => ToolResult::text("[cancelled]"),
        }
    }

    fn to_llm_tool(&self) -> LlmTool {
        LlmTool { name: self.name().to_string(), description: self.description().to_string(), input_schema: self.input_schema() }
    }
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Dispatch by name (§4.2): unknown name yields `isError=true` with
    /// `"Unknown tool: <name>"`; a tool that panics or errors internally never
    /// propagates past this call — see each `Tool::execute` implementation.
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(args).await,
            None => ToolResult::Error(format!("Unknown tool: {}", name)),
        }
    }

    pub async fn execute_cancellable(&self, name: &str, args: Value, cancel: CancellationToken) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute_cancellable(args, cancel).await,
            None => ToolResult::Error(format!("Unknown tool: {}", name)),
        }
    }

    pub fn get_definitions(&self) -> Vec<LlmTool> {
        self.tools.values().map(|t| t.to_llm_tool()).collect()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}
