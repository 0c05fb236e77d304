//! `kais-cell` — the per-Cell agent process entrypoint (§6 "Agent process
//! environment", SPEC_FULL "Binaries"). Reads `CELL_NAME`/`CELL_SPEC` and
//! exits 1 with a stderr message if either is missing, otherwise wires the
//! bus, tool registry, and Mind and runs the Cell runtime until SIGTERM.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kais_agent::{BudgetTracker, Cell, CellCreator, CellSpawnHost, CellTreeRegistry, DefaultRecursionValidator};
use kais_bus::MessageBus;
use kais_core::{CellSpec, OwnerReference};
use kais_llm::{Mind, OllamaMind};
use kais_tools::create_default_registry;

/// No cluster to create sibling `Cell` resources in from a bare agent
/// process (`KubeClient` plumbing is out of scope, §1); spawn requests are
/// logged and rejected rather than silently dropped.
struct UnsupportedCellCreator;

#[async_trait::async_trait]
impl CellCreator for UnsupportedCellCreator {
    async fn create_cell(&self, name: &str, namespace: &str, _spec: CellSpec, _owner: OwnerReference) -> Result<(), String> {
        Err(format!("cell process cannot create child cell {namespace}/{name}: no KubeClient wired"))
    }
}

fn required_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("missing required environment variable {name}"))
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("kais-cell: {err}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "kais=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cell_name = required_env("CELL_NAME")?;
    let cell_spec_json = required_env("CELL_SPEC")?;
    let namespace = std::env::var("CELL_NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let nats_url = std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());
    let ollama_url = std::env::var("OLLAMA_URL").ok();

    let spec: CellSpec = serde_json::from_str(&cell_spec_json).map_err(|e| anyhow::anyhow!("invalid CELL_SPEC: {e}"))?;

    tracing::info!(cell = %cell_name, namespace = %namespace, provider = %spec.mind.provider, "starting kais-cell");

    let bus = Arc::new(MessageBus::new());

    let mind: Arc<dyn Mind> = match (spec.mind.provider.as_str(), &ollama_url) {
        ("ollama", Some(url)) => Arc::new(OllamaMind::new(url.clone(), spec.mind.model.clone())),
        ("ollama", None) => return Err(anyhow::anyhow!("provider \"ollama\" requires OLLAMA_URL")),
        (other, _) => return Err(anyhow::anyhow!("unsupported mind provider: {other}")),
    };

    let limits = spec.resources.clone().unwrap_or_default();
    let budget = Arc::new(BudgetTracker::new(
        cell_name.clone(),
        limits.max_total_cost.unwrap_or(0.0),
        limits.max_total_cost,
        limits.max_cost_per_hour,
    ));

    let tree = Arc::new(CellTreeRegistry::new());
    tree.insert_root(cell_name.clone(), namespace.clone());
    let validator = Arc::new(DefaultRecursionValidator::new(tree.clone()));
    let spawn_host = Arc::new(CellSpawnHost::new(
        cell_name.clone(),
        cell_name.clone(),
        namespace.clone(),
        spec.mind.provider.clone(),
        spec.mind.model.clone(),
        spec.recursion.clone(),
        budget.clone(),
        validator,
        tree,
        Arc::new(UnsupportedCellCreator),
    ));

    let workspace_root = std::env::temp_dir().join(format!("kais-cell-{cell_name}"));
    std::fs::create_dir_all(&workspace_root)?;
    let tools = Arc::new(create_default_registry(
        workspace_root,
        cell_name.clone(),
        namespace.clone(),
        bus.clone(),
        None,
        Some(spawn_host),
    ));

    let cell = Arc::new(Cell::new(cell_name.clone(), namespace, spec, bus, mind, tools, budget));

    let run_handle = {
        let cell = cell.clone();
        tokio::spawn(async move { cell.run().await })
    };

    tokio::signal::ctrl_c().await.ok();
    tracing::info!(cell = %cell_name, "signal received, stopping cell");
    cell.request_stop();
    run_handle.await??;
    Ok(())
}
