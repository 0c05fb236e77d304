//! Event Consumer (§4.6, §6, C10): bridges `cell.events.>` bus traffic into
//! the relational event store.
//!
//! `DbClient` is an abstract capability trait standing in for the relational
//! store driver (out of scope, §1) — a `sqlx`-style pool. Grounded in shape
//! on `agenticlaw_gateway::ws::handle_connection`'s per-message
//! decode → validate → act loop, which also catches and logs per-message
//! failures rather than letting one bad message end the connection.

use std::sync::Arc;

use kais_bus::{MessageBus, SubscriptionId};
use kais_core::{Error, Result};
use serde_json::Value;
use tracing::{debug, warn};

/// One row as persisted by `insert_cell_event` (§6 `cell_events` table).
#[derive(Clone, Debug)]
pub struct CellEventRow {
    pub id: i64,
    pub cell_name: String,
    pub namespace: String,
    pub event_type: String,
    pub payload: Value,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UsageTotals {
    pub total_cost: f64,
    pub total_tokens: u64,
}

/// Abstract relational-store capability (out of scope per §1). The consumer
/// owns the SQL text from §6; this trait is the boundary a `sqlx` Postgres
/// pool (or a fake, in tests) implements.
#[async_trait::async_trait]
pub trait DbClient: Send + Sync {
    /// `INSERT INTO cell_events (cell_name, namespace, event_type, payload)
    /// VALUES ($1,$2,$3,$4)` (§6).
    async fn insert_cell_event(&self, cell_name: &str, namespace: &str, event_type: &str, payload: Value) -> Result<()>;

    /// `SELECT … WHERE cell_name=$1 ORDER BY created_at DESC LIMIT n` (§6).
    async fn recent_events(&self, cell_name: &str, limit: i64) -> Result<Vec<CellEventRow>>;

    /// Sums `payload->'usage'->>'cost'` and `->>'totalTokens'` where
    /// `event_type='response'` (§6).
    async fn usage_totals(&self, cell_name: &str) -> Result<UsageTotals>;
}

/// In-memory `DbClient` used by tests and by any binary not yet wired to a
/// real pool — mirrors the teacher's pattern of a mock provider standing in
/// for a real HTTP backend (`operator::mock_provider`).
#[derive(Default)]
pub struct InMemoryDbClient {
    rows: tokio::sync::Mutex<Vec<CellEventRow>>,
    next_id: std::sync::atomic::AtomicI64,
}

impl InMemoryDbClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all_rows(&self) -> Vec<CellEventRow> {
        self.rows.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl DbClient for InMemoryDbClient {
    async fn insert_cell_event(&self, cell_name: &str, namespace: &str, event_type: &str, payload: Value) -> Result<()> {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.rows.lock().await.push(CellEventRow {
            id,
            cell_name: cell_name.to_string(),
            namespace: namespace.to_string(),
            event_type: event_type.to_string(),
            payload,
        });
        Ok(())
    }

    async fn recent_events(&self, cell_name: &str, limit: i64) -> Result<Vec<CellEventRow>> {
        let rows = self.rows.lock().await;
        let mut matching: Vec<CellEventRow> = rows.iter().filter(|r| r.cell_name == cell_name).cloned().collect();
        matching.sort_by_key(|r| std::cmp::Reverse(r.id));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }

    async fn usage_totals(&self, cell_name: &str) -> Result<UsageTotals> {
        let rows = self.rows.lock().await;
        let mut totals = UsageTotals::default();
        for row in rows.iter().filter(|r| r.cell_name == cell_name && r.event_type == "response") {
            if let Some(usage) = row.payload.get("usage") {
                totals.total_cost += usage.get("cost").and_then(|v| v.as_f64()).unwrap_or(0.0);
                totals.total_tokens += usage.get("totalTokens").and_then(|v| v.as_u64()).unwrap_or(0);
            }
        }
        Ok(totals)
    }
}

/// Subscribes `cell.events.>` and persists each well-formed envelope via a
/// `DbClient` (§4.6).
pub struct EventConsumer {
    bus: Arc<MessageBus>,
    db: Arc<dyn DbClient>,
    subscription: tokio::sync::Mutex<Option<SubscriptionId>>,
    worker: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl EventConsumer {
    pub fn new(bus: Arc<MessageBus>, db: Arc<dyn DbClient>) -> Self {
        Self { bus, db, subscription: tokio::sync::Mutex::new(None), worker: tokio::sync::Mutex::new(None) }
    }

    /// Starts consuming. Idempotent: calling twice without `stop` in between
    /// is a no-op on the second call.
    pub async fn start(&self) -> Result<()> {
        if self.subscription.lock().await.is_some() {
            return Ok(());
        }
        let (sub_id, mut rx) = self.bus.subscribe_channel("cell.events.>").await?;
        let db = self.db.clone();
        let handle = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if let Err(err) = persist(db.as_ref(), &envelope.payload).await {
                    warn!(%err, "failed to persist cell event");
                }
            }
        });
        *self.subscription.lock().await = Some(sub_id);
        *self.worker.lock().await = Some(handle);
        Ok(())
    }

    /// Unsubscribes and drains in-flight work (§4.6 `stop()`).
    pub async fn stop(&self) -> Result<()> {
        if let Some(sub_id) = self.subscription.lock().await.take() {
            self.bus.unsubscribe(sub_id).await?;
        }
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
        Ok(())
    }
}

/// Extracts `cellName`/`namespace`/`type` from `payload` and inserts a row.
/// Missing `cellName` or `type` is skipped with a warning, never an error
/// that would stop the consumer (§4.6 scenario 2/3).
async fn persist(db: &dyn DbClient, payload: &Value) -> Result<()> {
    let Some(object) = payload.as_object() else {
        warn!("skipping malformed cell event: payload is not a JSON object");
        return Ok(());
    };

    let cell_name = match object.get("cellName").and_then(|v| v.as_str()) {
        Some(name) => name,
        None => {
            warn!("skipping cell event with missing cellName");
            return Ok(());
        }
    };
    let event_type = match object.get("type").and_then(|v| v.as_str()) {
        Some(t) => t,
        None => {
            warn!(cell_name, "skipping cell event with missing type");
            return Ok(());
        }
    };
    let namespace = object.get("namespace").and_then(|v| v.as_str()).unwrap_or("default");

    db.insert_cell_event(cell_name, namespace, event_type, payload.clone()).await.map_err(|e| {
        warn!(cell_name, event_type, %e, "failed to insert cell event");
        e
    })
}

/// Decodes a raw UTF-8 JSON byte payload as the wire form would arrive over
/// a real NATS subscription (§4.6 "decode UTF-8 JSON"), for callers bridging
/// from outside the in-process bus.
pub fn decode_payload(bytes: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(bytes).map_err(|e| Error::validation(format!("invalid utf-8 in event payload: {e}")))?;
    serde_json::from_str(text).map_err(Error::from)
}
