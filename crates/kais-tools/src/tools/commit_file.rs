//! commit_file — copy a file from a Cell's private workspace into the shared
//! workspace (§4.2). Both the source and destination are traversal-checked;
//! `destination` defaults to `source`, but source always resolves under the
//! private base and destination always under the shared base, so a
//! defaulted (private-prefixed) destination still lands in `shared/`.

use crate::path::WorkspacePaths;
use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::fs;

pub struct CommitFileTool {
    paths: Arc<WorkspacePaths>,
}

impl CommitFileTool {
    pub fn new(paths: Arc<WorkspacePaths>) -> Self {
        Self { paths }
    }
}

#[async_trait::async_trait]
impl Tool for CommitFileTool {
    fn name(&self) -> &str {
        "commit_file"
    }

    fn description(&self) -> &str {
        "Copy a file from this cell's private workspace into the shared workspace so other cells can read it."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "source": { "type": "string", "description": "private/… path to copy from" },
                "destination": { "type": "string", "description": "shared/… path to copy to; defaults to source" }
            },
            "required": ["source"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let source = match args.get("source").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::error("Tool error: missing required parameter 'source'"),
        };
        let destination = args.get("destination").and_then(|v| v.as_str()).unwrap_or(source);

        // Source always reads from private, destination always writes to
        // shared (§4.2) — independent of whatever prefix each string carries,
        // so a defaulted destination (= source, typically `private/…`) still
        // lands under shared rather than copying the private file onto itself.
        let resolved_source = match self.paths.resolve_private(source) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let resolved_dest = match self.paths.resolve_shared(destination) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if let Some(parent) = resolved_dest.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolResult::error(format!("Tool error: failed to create directories: {e}"));
            }
        }

        match fs::copy(&resolved_source, &resolved_dest).await {
            Ok(bytes) => ToolResult::text(format!("Committed {bytes} bytes from {source} to {destination}")),
            Err(e) => ToolResult::error(format!("Tool error: failed to commit file: {e}")),
        }
    }
}
