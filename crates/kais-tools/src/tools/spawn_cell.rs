//! spawn_cell — recursive child-cell spawning (§4.4). The tool itself only
//! shapes and validates the request; the actual budget ledger, recursion
//! validator, and resource creation live behind `SpawnHost`, implemented by
//! the agent runtime that owns this Cell — the same decoupling the teacher
//! uses to break the tools/runtime circular dependency.

use crate::registry::{Tool, ToolResult};
use kais_core::{CellSpec, RecursionSpec};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct SpawnInput {
    pub name: String,
    pub system_prompt: String,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub tools: Vec<String>,
    pub budget: Option<f64>,
    pub can_spawn_children: bool,
    pub blueprint_ref: Option<String>,
    pub max_depth: Option<u32>,
}

/// Outcome of `RecursionValidator::validate` (§4.4, §3 "SpawnRequest").
#[derive(Clone, Debug, Default)]
pub struct SpawnDecision {
    pub allowed: bool,
    pub pending: bool,
    pub reason: Option<String>,
}

/// Capability boundary a Cell's runtime implements so `spawn_cell` can act
/// without the tools crate depending on the agent crate (§9 "dynamic
/// dispatch over tools").
#[async_trait::async_trait]
pub trait SpawnHost: Send + Sync {
    fn parent_name(&self) -> &str;
    fn namespace(&self) -> &str;
    fn parent_provider(&self) -> &str;
    fn parent_model(&self) -> &str;
    fn parent_recursion(&self) -> Option<RecursionSpec>;
    fn remaining_budget(&self) -> f64;

    async fn validate(&self, input: &SpawnInput) -> SpawnDecision;

    /// Creates the child `Cell` resource, owner-referenced to the parent.
    async fn create_cell(&self, child_name: &str, spec: CellSpec) -> Result<(), String>;

    /// Deducts `amount` from the parent's budget as a delegation (§4.4, §6).
    async fn deduct_budget(&self, amount: f64) -> Result<(), String>;
}

pub struct SpawnCellTool {
    host: Arc<dyn SpawnHost>,
}

impl SpawnCellTool {
    pub fn new(host: Arc<dyn SpawnHost>) -> Self {
        Self { host }
    }
}

fn parse_input(args: &Value) -> Result<SpawnInput, String> {
    let name = args.get("name").and_then(|v| v.as_str()).ok_or("missing required parameter 'name'")?.to_string();
    let system_prompt = args
        .get("systemPrompt")
        .and_then(|v| v.as_str())
        .ok_or("missing required parameter 'systemPrompt'")?
        .to_string();
    let tools = args
        .get("tools")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    Ok(SpawnInput {
        name,
        system_prompt,
        model: args.get("model").and_then(|v| v.as_str()).map(str::to_string),
        provider: args.get("provider").and_then(|v| v.as_str()).map(str::to_string),
        tools,
        budget: args.get("budget").and_then(|v| v.as_f64()),
        can_spawn_children: args.get("canSpawnChildren").and_then(|v| v.as_bool()).unwrap_or(false),
        blueprint_ref: args.get("blueprintRef").and_then(|v| v.as_str()).map(str::to_string),
        max_depth: args.get("maxDepth").and_then(|v| v.as_u64()).map(|v| v as u32),
    })
}

#[async_trait::async_trait]
impl Tool for SpawnCellTool {
    fn name(&self) -> &str {
        "spawn_cell"
    }

    fn description(&self) -> &str {
        "Spawn a child cell under this one, subject to budget and recursion limits."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "systemPrompt": { "type": "string" },
                "model": { "type": "string" },
                "provider": { "type": "string" },
                "tools": { "type": "array", "items": { "type": "string" } },
                "budget": { "type": "number" },
                "canSpawnChildren": { "type": "boolean" },
                "blueprintRef": { "type": "string" },
                "maxDepth": { "type": "integer" }
            },
            "required": ["name", "systemPrompt"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let input = match parse_input(&args) {
            Ok(i) => i,
            Err(e) => return ToolResult::error(format!("Tool error: {e}")),
        };

        let remaining = self.host.remaining_budget();
        let child_budget = input.budget.unwrap_or(remaining * 0.1);
        if child_budget <= 0.0 || child_budget > remaining {
            return ToolResult::error(format!(
                "Tool error: requested budget {child_budget} must be > 0 and <= remaining {remaining}"
            ));
        }

        let decision = self.host.validate(&input).await;
        if decision.pending {
            return ToolResult::Json(json!({
                "status": "pending_approval",
                "reason": decision.reason.unwrap_or_default(),
            }));
        }
        if !decision.allowed {
            return ToolResult::error(format!("Spawn rejected: {}", decision.reason.unwrap_or_default()));
        }

        let child_name = format!("{}-{}", self.host.parent_name(), input.name);

        let recursion = if input.can_spawn_children {
            let parent = self.host.parent_recursion();
            Some(RecursionSpec {
                max_depth: input.max_depth.unwrap_or(3),
                max_descendants: parent.as_ref().and_then(|p| p.max_descendants),
                spawn_policy: parent.map(|p| p.spawn_policy).unwrap_or(kais_core::SpawnPolicy::Open),
            })
        } else {
            None
        };

        let mind = kais_core::MindConfig {
            provider: input.provider.clone().unwrap_or_else(|| self.host.parent_provider().to_string()),
            model: input.model.clone().unwrap_or_else(|| self.host.parent_model().to_string()),
            system_prompt: input.system_prompt.clone(),
            temperature: None,
            max_tokens: None,
            working_memory: None,
        };

        let spec = CellSpec {
            mind,
            tools: input.tools.clone(),
            resources: Some(kais_core::ResourceLimits {
                max_total_cost: Some(child_budget),
                ..Default::default()
            }),
            parent_ref: Some(self.host.parent_name().to_string()),
            recursion,
        };

        if let Err(e) = self.host.create_cell(&child_name, spec).await {
            return ToolResult::error(format!("Tool error: failed to create child cell: {e}"));
        }
        if let Err(e) = self.host.deduct_budget(child_budget).await {
            return ToolResult::error(format!("Tool error: failed to deduct budget: {e}"));
        }

        ToolResult::Json(json!({
            "status": "spawned",
            "name": child_name,
            "budget": child_budget,
            "canSpawnChildren": input.can_spawn_children,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kais_core::SpawnPolicy;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    struct FakeHost {
        remaining: StdMutex<f64>,
        decision: SpawnDecision,
        created: AtomicU64,
    }

    #[async_trait::async_trait]
    impl SpawnHost for FakeHost {
        fn parent_name(&self) -> &str {
            "researcher"
        }
        fn namespace(&self) -> &str {
            "default"
        }
        fn parent_provider(&self) -> &str {
            "anthropic"
        }
        fn parent_model(&self) -> &str {
            "claude"
        }
        fn parent_recursion(&self) -> Option<RecursionSpec> {
            Some(RecursionSpec { max_depth: 3, max_descendants: Some(10), spawn_policy: SpawnPolicy::Open })
        }
        fn remaining_budget(&self) -> f64 {
            *self.remaining.lock().unwrap()
        }
        async fn validate(&self, _input: &SpawnInput) -> SpawnDecision {
            self.decision.clone()
        }
        async fn create_cell(&self, _child_name: &str, _spec: CellSpec) -> Result<(), String> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn deduct_budget(&self, amount: f64) -> Result<(), String> {
            *self.remaining.lock().unwrap() -= amount;
            Ok(())
        }
    }

    #[tokio::test]
    async fn spawn_with_explicit_budget_deducts_from_remaining() {
        let host = Arc::new(FakeHost {
            remaining: StdMutex::new(1.0),
            decision: SpawnDecision { allowed: true, pending: false, reason: None },
            created: AtomicU64::new(0),
        });
        let tool = SpawnCellTool::new(host.clone());
        let result = tool
            .execute(json!({"name": "helper", "systemPrompt": "help", "budget": 0.25}))
            .await;
        assert!(!result.is_error(), "{}", result.to_content_string());
        let text = result.to_content_string();
        assert!(text.contains("\"status\": \"spawned\""));
        assert!(text.contains("\"budget\": 0.25"));
        assert_eq!(*host.remaining.lock().unwrap(), 0.75);
        assert_eq!(host.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pending_approval_creates_no_cell() {
        let host = Arc::new(FakeHost {
            remaining: StdMutex::new(1.0),
            decision: SpawnDecision { allowed: false, pending: true, reason: Some("awaiting admin".into()) },
            created: AtomicU64::new(0),
        });
        let tool = SpawnCellTool::new(host.clone());
        let result = tool.execute(json!({"name": "helper", "systemPrompt": "help"})).await;
        assert!(!result.is_error());
        let text = result.to_content_string();
        assert!(text.contains("\"status\": \"pending_approval\""));
        assert!(text.contains("awaiting admin"));
        assert_eq!(host.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_spawn_is_a_tool_error() {
        let host = Arc::new(FakeHost {
            remaining: StdMutex::new(1.0),
            decision: SpawnDecision { allowed: false, pending: false, reason: Some("closed policy".into()) },
            created: AtomicU64::new(0),
        });
        let tool = SpawnCellTool::new(host);
        let result = tool.execute(json!({"name": "helper", "systemPrompt": "help"})).await;
        assert!(result.is_error());
        assert!(result.to_content_string().contains("Spawn rejected: closed policy"));
    }

    #[tokio::test]
    async fn budget_exceeding_remaining_is_rejected() {
        let host = Arc::new(FakeHost {
            remaining: StdMutex::new(1.0),
            decision: SpawnDecision { allowed: true, pending: false, reason: None },
            created: AtomicU64::new(0),
        });
        let tool = SpawnCellTool::new(host);
        let result = tool.execute(json!({"name": "helper", "systemPrompt": "help", "budget": 5.0})).await;
        assert!(result.is_error());
    }
}
