//! read_file — read a workspace file, truncated past 10 000 chars (§4.2).

use crate::path::WorkspacePaths;
use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

const TRUNCATE_AT: usize = 10_000;

pub struct ReadFileTool {
    paths: Arc<WorkspacePaths>,
}

impl ReadFileTool {
    pub fn new(paths: Arc<WorkspacePaths>) -> Self {
        Self { paths }
    }
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace (private/… or shared/…)."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "private/… or shared/… workspace path" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let path = match args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::error("Missing required parameter: path"),
        };

        let resolved = match self.paths.resolve(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        match fs::read_to_string(&resolved).await {
            Ok(content) if content.chars().count() > TRUNCATE_AT => {
                debug!(path, "read_file truncated");
                let head: String = content.chars().take(TRUNCATE_AT).collect();
                ToolResult::text(format!("{}\n[truncated]", head))
            }
            Ok(content) => ToolResult::text(content),
            Err(e) => ToolResult::error(format!("Tool error: failed to read file: {}", e)),
        }
    }
}
