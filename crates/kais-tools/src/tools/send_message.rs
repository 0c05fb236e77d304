//! send_message — publish an inter-cell message envelope to the bus (§4.2).
//! Consults an optional `TopologyEnforcer` before publishing; a violation is
//! surfaced as a tool error, never as a crash.

use crate::registry::{Tool, ToolResult};
use kais_bus::MessageBus;
use kais_core::{Envelope, EnvelopeType};
use serde_json::{json, Value};
use std::sync::Arc;

/// Consulted by `send_message` to decide whether `from` may address `to`
/// (§4.2, §4.4 "Topology enforcement"). Backed by the routing table the
/// Topology Generator (C12) renders into a ConfigMap.
#[async_trait::async_trait]
pub trait TopologyEnforcer: Send + Sync {
    /// Targets `from` is currently allowed to send to. An empty vec paired
    /// with `Ok(false)`-style checks is ambiguous, so callers ask directly.
    async fn allowed_targets(&self, from: &str) -> Vec<String>;

    async fn can_send_to(&self, from: &str, to: &str) -> bool {
        self.allowed_targets(from).await.iter().any(|t| t == to)
    }
}

pub struct SendMessageTool {
    cell_name: String,
    namespace: String,
    bus: Arc<MessageBus>,
    topology: Option<Arc<dyn TopologyEnforcer>>,
}

impl SendMessageTool {
    pub fn new(cell_name: String, namespace: String, bus: Arc<MessageBus>, topology: Option<Arc<dyn TopologyEnforcer>>) -> Self {
        Self { cell_name, namespace, bus, topology }
    }
}

#[async_trait::async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a message to another cell in this namespace via its inbox subject."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": { "type": "string", "description": "Target cell name" },
                "message": { "type": "string", "description": "Message content" }
            },
            "required": ["to", "message"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let to = match args.get("to").and_then(|v| v.as_str()) {
            Some(t) => t,
            None => return ToolResult::error("Tool error: missing required parameter 'to'"),
        };
        let message = match args.get("message").and_then(|v| v.as_str()) {
            Some(m) => m,
            None => return ToolResult::error("Tool error: missing required parameter 'message'"),
        };

        if let Some(enforcer) = &self.topology {
            if !enforcer.can_send_to(&self.cell_name, to).await {
                let allowed = enforcer.allowed_targets(&self.cell_name).await;
                return ToolResult::error(format!(
                    "Topology violation: {} cannot send to {}. Allowed: [{}]",
                    self.cell_name,
                    to,
                    allowed.join(", ")
                ));
            }
        }

        let envelope = match Envelope::new(
            self.cell_name.clone(),
            to.to_string(),
            EnvelopeType::Message,
            json!({ "content": message }),
        ) {
            Ok(e) => e,
            Err(e) => return ToolResult::error(format!("Tool error: {e}")),
        };

        let subject = format!("cell.{}.{}.inbox", self.namespace, to);
        match self.bus.publish(&subject, envelope).await {
            Ok(()) => ToolResult::text(format!("Sent message to {to}")),
            Err(e) => ToolResult::error(format!("Tool error: {e}")),
        }
    }
}
