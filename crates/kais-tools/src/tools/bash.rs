//! bash — run a shell command via an abstract executor (§4.2). Merges
//! stdout/stderr, appends `[exit code: N]` on a non-zero exit, and reports
//! `"[no output]"` when both streams are empty.

use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MAX_TIMEOUT_MS: u64 = 600_000;

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// The "abstract executor" spec.md §4.2 calls for — lets tests substitute a
/// fake without spawning a real shell.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> Result<CommandOutput, String>;
}

pub struct ShellExecutor;

#[async_trait::async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> Result<CommandOutput, String> {
        let child = Command::new("bash").arg("-c").arg(command).current_dir(cwd).output();
        match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
            }),
            Ok(Err(e)) => Err(format!("failed to execute: {e}")),
            Err(_) => Err(format!("command timed out after {}ms", timeout.as_millis())),
        }
    }
}

pub struct BashTool {
    workspace_root: PathBuf,
    executor: std::sync::Arc<dyn CommandExecutor>,
}

impl BashTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self::with_executor(workspace_root, std::sync::Arc::new(ShellExecutor))
    }

    pub fn with_executor(workspace_root: impl AsRef<Path>, executor: std::sync::Arc<dyn CommandExecutor>) -> Self {
        Self { workspace_root: workspace_root.as_ref().to_path_buf(), executor }
    }
}

#[async_trait::async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command in the cell's workspace and return its merged stdout/stderr."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to run" },
                "timeout": { "type": "integer", "description": "Timeout in milliseconds (default 30000)" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let command = match args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("Tool error: missing required parameter 'command'"),
        };
        let timeout_ms = args.get("timeout").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_TIMEOUT_MS).min(MAX_TIMEOUT_MS);

        debug!(command = %&command[..command.len().min(80)], timeout_ms, "bash");

        match self.executor.run(command, &self.workspace_root, Duration::from_millis(timeout_ms)).await {
            Ok(output) => ToolResult::text(format_output(&output)),
            Err(e) => ToolResult::error(format!("Tool error: {e}")),
        }
    }

    async fn execute_cancellable(&self, args: Value, cancel: CancellationToken) -> ToolResult {
        tokio::select! {
            result = self.execute(args) => result,
            _ = cancel.cancelled() => ToolResult::text("[cancelled]"),
        }
    }
}

/// `stdout + "\n" + stderr + "\n[exit code: N]"` if exit ≠ 0; `"[no output]"`
/// when both streams are empty (§4.2).
fn format_output(output: &CommandOutput) -> String {
    let merged = format!("{}\n{}", output.stdout, output.stderr);
    let merged = merged.trim_matches('\n');
    let body = if merged.is_empty() { "[no output]" } else { merged };

    if output.exit_code != 0 {
        format!("{body}\n[exit code: {}]", output.exit_code)
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeExecutor {
        output: CommandOutput,
    }

    #[async_trait::async_trait]
    impl CommandExecutor for FakeExecutor {
        async fn run(&self, _command: &str, _cwd: &Path, _timeout: Duration) -> Result<CommandOutput, String> {
            Ok(CommandOutput {
                stdout: self.output.stdout.clone(),
                stderr: self.output.stderr.clone(),
                exit_code: self.output.exit_code,
            })
        }
    }

    #[tokio::test]
    async fn successful_command_with_no_output_reports_placeholder() {
        let tool = BashTool::with_executor(
            ".",
            std::sync::Arc::new(FakeExecutor { output: CommandOutput { stdout: String::new(), stderr: String::new(), exit_code: 0 } }),
        );
        let result = tool.execute(json!({"command": "true"})).await;
        assert!(!result.is_error());
        assert_eq!(result.to_content_string(), "[no output]");
    }

    #[tokio::test]
    async fn nonzero_exit_appends_exit_code() {
        let tool = BashTool::with_executor(
            ".",
            std::sync::Arc::new(FakeExecutor {
                output: CommandOutput { stdout: "partial".into(), stderr: "oops".into(), exit_code: 42 },
            }),
        );
        let result = tool.execute(json!({"command": "false"})).await;
        assert_eq!(result.to_content_string(), "partial\noops\n[exit code: 42]");
    }

    #[tokio::test]
    async fn missing_command_is_a_tool_error() {
        let tool = BashTool::new(".");
        let result = tool.execute(json!({})).await;
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn real_echo_round_trips() {
        let tool = BashTool::new(".");
        let result = tool.execute(json!({"command": "echo hi"})).await;
        assert_eq!(result.to_content_string(), "hi");
    }
}
