//! write_file — create or overwrite a workspace file with write+rename
//! semantics where the platform allows (§4.2).

use crate::path::WorkspacePaths;
use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

pub struct WriteFileTool {
    paths: Arc<WorkspacePaths>,
}

impl WriteFileTool {
    pub fn new(paths: Arc<WorkspacePaths>) -> Self {
        Self { paths }
    }
}

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace (private/… or shared/…), creating parent directories."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "private/… or shared/… workspace path" },
                "content": { "type": "string" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let path = match args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::error("Missing required parameter: path"),
        };
        let content = match args.get("content").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("Missing required parameter: content"),
        };

        let resolved = match self.paths.resolve(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolResult::error(format!("Failed to create directories: {}", e));
            }
        }

        let tmp_path = resolved.with_extension(format!("tmp-{}", Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp_path, content).await {
            return ToolResult::error(format!("Failed to write: {}", e));
        }
        if let Err(e) = fs::rename(&tmp_path, &resolved).await {
            let _ = fs::remove_file(&tmp_path).await;
            return ToolResult::error(format!("Failed to finalize write: {}", e));
        }

        debug!(path, bytes = content.len(), "write_file");
        ToolResult::text(format!("Wrote {} bytes to {}", content.len(), path))
    }
}
