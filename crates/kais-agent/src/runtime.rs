//! Agent Runtime / Cell (§4.4, C8): the bounded think/act loop that consumes
//! a Cell's inbox, assembles context, calls its `Mind`, dispatches tools, and
//! emits lifecycle and turn events onto the bus.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kais_core::{CellSpec, Envelope, EnvelopeType, Error, OwnerReference, Result};
use kais_bus::MessageBus;
use kais_llm::{ContentBlock, LlmContent, Mind, ThinkRequest};
use kais_tools::{SpawnDecision, SpawnHost, SpawnInput, ToolRegistry};

use crate::budget::BudgetTracker;
use crate::context::assemble_system_prompt;
use crate::memory::WorkingMemory;
use crate::recursion::{CellTreeRegistry, RecursionValidator};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellLifecycle {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Stands in for the Kubernetes API client (`KubeClient`, out of scope, §1):
/// creates the child `Cell` resource a successful `spawn_cell` call needs.
#[async_trait::async_trait]
pub trait CellCreator: Send + Sync {
    async fn create_cell(&self, name: &str, namespace: &str, spec: CellSpec, owner: OwnerReference) -> std::result::Result<(), String>;
}

/// Bridges the `spawn_cell` tool (kais-tools) back into this Cell's own
/// budget ledger, recursion validator, and resource-creation capability —
/// the same decoupling the tool registry's `SpawnHost` trait exists for.
pub struct CellSpawnHost {
    parent_name: String,
    parent_uid: String,
    namespace: String,
    provider: String,
    model: String,
    recursion: Option<kais_core::RecursionSpec>,
    budget: Arc<BudgetTracker>,
    validator: Arc<dyn RecursionValidator>,
    tree: Arc<CellTreeRegistry>,
    creator: Arc<dyn CellCreator>,
}

impl CellSpawnHost {
    pub fn new(
        parent_name: impl Into<String>,
        parent_uid: impl Into<String>,
        namespace: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        recursion: Option<kais_core::RecursionSpec>,
        budget: Arc<BudgetTracker>,
        validator: Arc<dyn RecursionValidator>,
        tree: Arc<CellTreeRegistry>,
        creator: Arc<dyn CellCreator>,
    ) -> Self {
        Self {
            parent_name: parent_name.into(),
            parent_uid: parent_uid.into(),
            namespace: namespace.into(),
            provider: provider.into(),
            model: model.into(),
            recursion,
            budget,
            validator,
            tree,
            creator,
        }
    }
}

#[async_trait::async_trait]
impl SpawnHost for CellSpawnHost {
    fn parent_name(&self) -> &str {
        &self.parent_name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn parent_provider(&self) -> &str {
        &self.provider
    }

    fn parent_model(&self) -> &str {
        &self.model
    }

    fn parent_recursion(&self) -> Option<kais_core::RecursionSpec> {
        self.recursion.clone()
    }

    fn remaining_budget(&self) -> f64 {
        self.budget.remaining()
    }

    async fn validate(&self, input: &SpawnInput) -> SpawnDecision {
        self.validator.validate(&self.parent_name, &self.namespace, self.recursion.as_ref(), input).await
    }

    async fn create_cell(&self, child_name: &str, spec: CellSpec) -> std::result::Result<(), String> {
        let owner = OwnerReference::new("Cell", &self.parent_name, &self.parent_uid);
        self.creator.create_cell(child_name, &self.namespace, spec, owner).await?;
        self.tree.insert_child(&self.parent_name, child_name);
        Ok(())
    }

    async fn deduct_budget(&self, amount: f64) -> std::result::Result<(), String> {
        self.budget.delegate(amount).map_err(|e| e.to_string())
    }
}

/// A running Cell: subscribes to its inbox, drives the think/act loop,
/// publishes lifecycle/turn events (§4.4).
pub struct Cell {
    name: String,
    namespace: String,
    spec: CellSpec,
    bus: Arc<MessageBus>,
    mind: Arc<dyn Mind>,
    tools: Arc<ToolRegistry>,
    memory: WorkingMemory,
    budget: Arc<BudgetTracker>,
    lifecycle: RwLock<CellLifecycle>,
    cancel: CancellationToken,
}

impl Cell {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        spec: CellSpec,
        bus: Arc<MessageBus>,
        mind: Arc<dyn Mind>,
        tools: Arc<ToolRegistry>,
        budget: Arc<BudgetTracker>,
    ) -> Self {
        let working_memory_config = spec.mind.working_memory.clone().unwrap_or_default();
        Self {
            name: name.into(),
            namespace: namespace.into(),
            spec,
            bus,
            mind,
            tools,
            memory: WorkingMemory::new(working_memory_config),
            budget,
            lifecycle: RwLock::new(CellLifecycle::Created),
            cancel: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn budget(&self) -> &Arc<BudgetTracker> {
        &self.budget
    }

    pub async fn lifecycle(&self) -> CellLifecycle {
        *self.lifecycle.read().await
    }

    /// Cancels after the current think/act iteration, per the graceful
    /// shutdown contract in §5.
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    async fn set_lifecycle(&self, phase: CellLifecycle) {
        *self.lifecycle.write().await = phase;
    }

    fn inbox_subject(&self) -> String {
        format!("cell.{}.{}.inbox", self.namespace, self.name)
    }

    fn events_subject(&self, event_type: &str) -> String {
        format!("cell.events.{}.{}.{}", self.namespace, self.name, event_type)
    }

    /// Publishes a lifecycle/turn event. The payload always carries
    /// `cellName`, `namespace` and `type` alongside whatever `extra` fields
    /// the caller supplies — the self-contained shape the event consumer
    /// (§4.6) extracts its `INSERT` columns from, independent of parsing
    /// the subject string.
    async fn emit_event(&self, event_type: &str, extra: Value) -> Result<()> {
        let subject = self.events_subject(event_type);
        let mut payload = serde_json::Map::new();
        payload.insert("cellName".to_string(), json!(self.name));
        payload.insert("namespace".to_string(), json!(self.namespace));
        payload.insert("type".to_string(), json!(event_type));
        if let Value::Object(fields) = extra {
            for (k, v) in fields {
                payload.insert(k, v);
            }
        }
        let envelope = Envelope::new(&self.name, "events", EnvelopeType::System, Value::Object(payload))?;
        self.bus.publish(&subject, envelope).await
    }

    /// Drives the Cell for its whole lifetime: Starting → Running →
    /// Stopping → Stopped (§4.4). Runs until `request_stop` is called or the
    /// inbox subscription is closed.
    pub async fn run(&self) -> Result<()> {
        self.set_lifecycle(CellLifecycle::Starting).await;
        let (sub_id, mut inbox) = self.bus.subscribe_channel(self.inbox_subject()).await?;
        self.emit_event("started", json!({})).await?;
        self.set_lifecycle(CellLifecycle::Running).await;
        info!(cell = %self.name, namespace = %self.namespace, "cell started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(cell = %self.name, "stop requested, awaiting current iteration");
                    break;
                }
                envelope = inbox.recv() => {
                    match envelope {
                        Some(envelope) => {
                            if let Err(err) = self.handle_inbox_message(envelope).await {
                                warn!(cell = %self.name, %err, "think/act loop failed");
                            }
                            if self.lifecycle().await == CellLifecycle::Failed {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        self.set_lifecycle(CellLifecycle::Stopping).await;
        self.bus.unsubscribe(sub_id).await.ok();
        self.emit_event("stopped", json!({})).await.ok();
        self.set_lifecycle(CellLifecycle::Stopped).await;
        info!(cell = %self.name, "cell stopped");
        Ok(())
    }

    async fn handle_inbox_message(&self, envelope: Envelope) -> Result<()> {
        let role = if envelope.kind == EnvelopeType::ToolResult { "tool" } else { "user" };
        let content = envelope.payload.get("content").and_then(|v| v.as_str()).unwrap_or_default();
        if role == "tool" {
            self.memory
                .append_tool_results(vec![ContentBlock::ToolResult {
                    tool_use_id: envelope.id.to_string(),
                    content: content.to_string(),
                    is_error: None,
                }])
                .await;
        } else {
            self.memory.append_user(content).await;
        }
        self.think_act_loop().await
    }

    /// Steps 2–5 of the think/act loop (§4.4), repeating without waiting for
    /// a new inbox message while `toolCalls` keep coming back.
    async fn think_act_loop(&self) -> Result<()> {
        loop {
            self.memory.maybe_summarize(self.mind.as_ref()).await?;

            let system = assemble_system_prompt(&self.spec.mind.system_prompt, &[]);
            let request = ThinkRequest {
                messages: self.memory.snapshot().await,
                system: Some(system),
                tools: self.tools.get_definitions(),
                temperature: self.spec.mind.temperature,
                max_tokens: self.spec.mind.max_tokens,
            };

            let result = self
                .mind
                .think(request)
                .await
                .map_err(|e| Error::llm_error(self.mind.name(), e.to_string()))?;

            if result.usage.cost > 0.0 {
                if let Err(err) = self.budget.spend(result.usage.cost) {
                    self.emit_event("budget_exceeded", json!({ "reason": err.to_string() })).await.ok();
                    self.set_lifecycle(CellLifecycle::Failed).await;
                    return Err(err);
                }
            }

            self.memory.append_assistant(result.content.clone()).await;
            self.emit_event(
                "response",
                json!({
                    "usage": result.usage,
                    "stopReason": result.stop_reason,
                }),
            )
            .await?;

            if result.tool_calls.is_empty() {
                break;
            }

            let mut tool_results = Vec::with_capacity(result.tool_calls.len());
            for call in &result.tool_calls {
                let output = self.tools.execute(&call.name, call.arguments.clone()).await;
                tool_results.push(ContentBlock::ToolResult {
                    tool_use_id: call.id.clone(),
                    content: output.to_content_string(),
                    is_error: Some(output.is_error()),
                });
            }
            self.memory.append_tool_results(tool_results).await;
        }
        Ok(())
    }

    pub async fn working_memory_len(&self) -> usize {
        self.memory.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kais_core::{MindConfig, ResourceLimits};
    use kais_llm::{MindResult, StopReason, ThinkResult, ToolCall, Usage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct ScriptedMind {
        turns: StdMutex<Vec<ThinkResult>>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Mind for ScriptedMind {
        fn name(&self) -> &str {
            "scripted"
        }
        fn models(&self) -> &[&str] {
            &["scripted-model"]
        }
        async fn think(&self, _request: ThinkRequest) -> MindResult<ThinkResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut turns = self.turns.lock().unwrap();
            Ok(turns.remove(0))
        }
    }

    fn cell_spec() -> CellSpec {
        CellSpec {
            mind: MindConfig {
                provider: "anthropic".to_string(),
                model: "claude".to_string(),
                system_prompt: "be helpful".to_string(),
                temperature: None,
                max_tokens: None,
                working_memory: None,
            },
            tools: vec![],
            resources: Some(ResourceLimits { max_total_cost: Some(10.0), ..Default::default() }),
            parent_ref: None,
            recursion: None,
        }
    }

    #[tokio::test]
    async fn single_turn_end_turn_goes_through_response_lifecycle() {
        let bus = Arc::new(MessageBus::new());
        let mind = Arc::new(ScriptedMind {
            turns: StdMutex::new(vec![ThinkResult {
                content: vec![ContentBlock::Text { text: "hi there".into() }],
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: Usage::new(10, 5, 0.01),
            }]),
            calls: AtomicUsize::new(0),
        });
        let tools = Arc::new(ToolRegistry::new());
        let budget = Arc::new(BudgetTracker::new("researcher", 1.0, Some(10.0), None));
        let cell = Arc::new(Cell::new("researcher", "default", cell_spec(), bus.clone(), mind, tools, budget.clone()));

        let (_sub, mut events) = bus.subscribe_channel("cell.events.default.researcher.>").await.unwrap();
        let cell_for_run = cell.clone();
        let handle = tokio::spawn(async move { cell_for_run.run().await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let started = events.recv().await.unwrap();
        assert_eq!(started.payload["cellName"], json!("researcher"));
        assert_eq!(started.payload["type"], json!("started"));

        let envelope = Envelope::message("user", "researcher", "hello").unwrap();
        bus.publish("cell.default.researcher.inbox", envelope).await.unwrap();

        let response = tokio::time::timeout(std::time::Duration::from_millis(500), events.recv()).await.unwrap().unwrap();
        assert_eq!(response.payload["stopReason"], json!("end_turn"));

        cell.request_stop();
        handle.await.unwrap().unwrap();
        assert_eq!(cell.lifecycle().await, CellLifecycle::Stopped);
        assert!((budget.remaining() - 0.99).abs() < 1e-9);
    }

    #[tokio::test]
    async fn tool_call_loops_without_waiting_for_new_inbox_message() {
        let bus = Arc::new(MessageBus::new());
        let mind = Arc::new(ScriptedMind {
            turns: StdMutex::new(vec![
                ThinkResult {
                    content: vec![ContentBlock::ToolUse { id: "t1".into(), name: "noop".into(), input: json!({}) }],
                    tool_calls: vec![ToolCall { id: "t1".into(), name: "noop".into(), arguments: json!({}) }],
                    stop_reason: StopReason::ToolUse,
                    usage: Usage::default(),
                },
                ThinkResult {
                    content: vec![ContentBlock::Text { text: "done".into() }],
                    tool_calls: vec![],
                    stop_reason: StopReason::EndTurn,
                    usage: Usage::default(),
                },
            ]),
            calls: AtomicUsize::new(0),
        });

        let mut registry = ToolRegistry::new();
        registry.register(NoopTool);
        let tools = Arc::new(registry);
        let budget = Arc::new(BudgetTracker::new("researcher", 1.0, None, None));
        let cell = Arc::new(Cell::new("researcher", "default", cell_spec(), bus.clone(), mind.clone(), tools, budget));

        let (_sub, mut events) = bus.subscribe_channel("cell.events.default.researcher.response").await.unwrap();
        let cell_for_run = cell.clone();
        let handle = tokio::spawn(async move { cell_for_run.run().await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let envelope = Envelope::message("user", "researcher", "go").unwrap();
        bus.publish("cell.default.researcher.inbox", envelope).await.unwrap();

        let first = tokio::time::timeout(std::time::Duration::from_millis(500), events.recv()).await.unwrap().unwrap();
        assert_eq!(first.payload["stopReason"], json!("tool_use"));
        let second = tokio::time::timeout(std::time::Duration::from_millis(500), events.recv()).await.unwrap().unwrap();
        assert_eq!(second.payload["stopReason"], json!("end_turn"));

        assert_eq!(mind.calls.load(Ordering::SeqCst), 2);
        cell.request_stop();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn overspend_emits_budget_exceeded_and_fails() {
        let bus = Arc::new(MessageBus::new());
        let mind = Arc::new(ScriptedMind {
            turns: StdMutex::new(vec![ThinkResult {
                content: vec![ContentBlock::Text { text: "expensive".into() }],
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: Usage::new(0, 0, 5.0),
            }]),
            calls: AtomicUsize::new(0),
        });
        let tools = Arc::new(ToolRegistry::new());
        let budget = Arc::new(BudgetTracker::new("researcher", 1.0, Some(1.0), None));
        let cell = Arc::new(Cell::new("researcher", "default", cell_spec(), bus.clone(), mind, tools, budget));

        let (_sub, mut events) = bus.subscribe_channel("cell.events.default.researcher.budget_exceeded").await.unwrap();
        let cell_for_run = cell.clone();
        let handle = tokio::spawn(async move { cell_for_run.run().await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let envelope = Envelope::message("user", "researcher", "go").unwrap();
        bus.publish("cell.default.researcher.inbox", envelope).await.unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_millis(500), events.recv()).await.unwrap().unwrap();
        assert!(event.payload["reason"].as_str().unwrap().contains("budget"));

        tokio::time::timeout(std::time::Duration::from_millis(500), handle).await.unwrap().unwrap().unwrap();
        assert_eq!(cell.lifecycle().await, CellLifecycle::Failed);
    }

    struct NoopTool;

    #[async_trait::async_trait]
    impl kais_tools::Tool for NoopTool {
        fn name(&self) -> &str {
            "noop"
        }
        fn description(&self) -> &str {
            "does nothing"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value) -> kais_tools::ToolResult {
            kais_tools::ToolResult::text("ok")
        }
    }
}
