//! Named, schema-validated tools invokable by a Cell's think/act loop (§4.2).
//!
//! Every built-in tool here implements `registry::Tool`; dispatch through
//! `ToolRegistry::execute` never panics — an unknown name or a failing
//! `execute` both come back as an error-flagged `ToolResult` (§4.2, §7).

pub mod path;
pub mod registry;
pub mod tools;

pub use path::WorkspacePaths;
pub use registry::{Tool, ToolRegistry, ToolResult};
pub use tools::send_message::TopologyEnforcer;
pub use tools::spawn_cell::{SpawnDecision, SpawnHost, SpawnInput};

use std::path::Path;
use std::sync::Arc;

/// Builds the registry of built-in tools (§4.2) around a workspace and the
/// capabilities a Cell supplies: `send_message`'s bus (+ optional topology
/// enforcer) and `spawn_cell`'s host. `spawn_host` is optional — a Cell with
/// `canSpawnChildren` unset simply never gets a `spawn_cell` tool registered.
pub fn create_default_registry(
    workspace_root: impl AsRef<Path>,
    cell_name: impl Into<String>,
    namespace: impl Into<String>,
    bus: Arc<kais_bus::MessageBus>,
    topology: Option<Arc<dyn TopologyEnforcer>>,
    spawn_host: Option<Arc<dyn SpawnHost>>,
) -> ToolRegistry {
    let cell_name = cell_name.into();
    let namespace = namespace.into();
    let root = workspace_root.as_ref();
    let paths = Arc::new(WorkspacePaths::new(root, &cell_name));

    let mut registry = ToolRegistry::new();
    registry.register(tools::send_message::SendMessageTool::new(cell_name, namespace, bus, topology));
    registry.register(tools::read_file::ReadFileTool::new(paths.clone()));
    registry.register(tools::write_file::WriteFileTool::new(paths.clone()));
    registry.register(tools::commit_file::CommitFileTool::new(paths));
    registry.register(tools::bash::BashTool::new(root));
    if let Some(host) = spawn_host {
        registry.register(tools::spawn_cell::SpawnCellTool::new(host));
    }
    registry
}
