//! Envelope and custom-resource value types shared across the control plane and
//! the agent runtime (data model, §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ===========================================================================
// Envelope
// ===========================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    Message,
    ToolResult,
    System,
    Control,
}

/// Addressed, typed message (§3, §6). Schema-validated on construction — there is
/// no way to build an `Envelope` whose `from`/`to` are empty.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "traceId")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "replyTo")]
    pub reply_to: Option<String>,
}

impl Envelope {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: EnvelopeType,
        payload: serde_json::Value,
    ) -> Result<Self> {
        let from = from.into();
        let to = to.into();
        if from.is_empty() {
            return Err(Error::validation("envelope.from must not be empty"));
        }
        if to.is_empty() {
            return Err(Error::validation("envelope.to must not be empty"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            from,
            to,
            kind,
            payload,
            timestamp: Utc::now(),
            trace_id: None,
            reply_to: None,
        })
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn message(from: impl Into<String>, to: impl Into<String>, content: impl Into<String>) -> Result<Self> {
        Self::new(from, to, EnvelopeType::Message, serde_json::json!({ "content": content.into() }))
    }
}

// ===========================================================================
// Resource metadata / owner references
// ===========================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OwnerReference {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    pub controller: bool,
    #[serde(rename = "blockOwnerDeletion")]
    pub block_owner_deletion: bool,
}

impl OwnerReference {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            api_version: "kais.io/v1".to_string(),
            kind: kind.into(),
            name: name.into(),
            uid: uid.into(),
            controller: true,
            block_owner_deletion: true,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "resourceVersion")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", rename = "ownerReferences")]
    pub owner_references: Vec<OwnerReference>,
    /// Arbitrary controller-owned bookkeeping (e.g. the spec fingerprint a
    /// `CellController` uses to detect pod-affecting spec changes, §4.5).
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub annotations: std::collections::BTreeMap<String, String>,
}

impl ResourceMeta {
    pub fn is_owned_by(&self, kind: &str, name: &str) -> bool {
        self.owner_references.iter().any(|r| r.controller && r.kind == kind && r.name == name)
    }
}

// ===========================================================================
// Cell
// ===========================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MindConfig {
    pub provider: String,
    pub model: String,
    #[serde(rename = "systemPrompt")]
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "maxTokens")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "workingMemory")]
    pub working_memory: Option<WorkingMemoryConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkingMemoryConfig {
    #[serde(rename = "maxMessages")]
    pub max_messages: usize,
    #[serde(rename = "summarizeAfter")]
    pub summarize_after: usize,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self { max_messages: 200, summarize_after: 50 }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "maxTokensPerTurn")]
    pub max_tokens_per_turn: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "maxCostPerHour")]
    pub max_cost_per_hour: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "maxTotalCost")]
    pub max_total_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "cpuLimit")]
    pub cpu_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "memoryLimit")]
    pub memory_limit: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnPolicy {
    Open,
    Closed,
    RequireApproval,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecursionSpec {
    #[serde(default = "default_max_depth", rename = "maxDepth")]
    pub max_depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "maxDescendants")]
    pub max_descendants: Option<u32>,
    #[serde(default = "default_spawn_policy", rename = "spawnPolicy")]
    pub spawn_policy: SpawnPolicy,
}

fn default_max_depth() -> u32 { 3 }
fn default_spawn_policy() -> SpawnPolicy { SpawnPolicy::Open }

impl Default for RecursionSpec {
    fn default() -> Self {
        Self { max_depth: default_max_depth(), max_descendants: None, spawn_policy: default_spawn_policy() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CellSpec {
    pub mind: MindConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "parentRef")]
    pub parent_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursion: Option<RecursionSpec>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CellPhase {
    Pending,
    Running,
    Completed,
    Failed,
    Terminating,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CellStatus {
    pub phase: CellPhase,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "podName")]
    pub pod_name: Option<String>,
    #[serde(default, rename = "totalCost")]
    pub total_cost: f64,
    #[serde(default, rename = "totalTokens")]
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "lastActive")]
    pub last_active: Option<DateTime<Utc>>,
}

impl Default for CellStatus {
    fn default() -> Self {
        Self { phase: CellPhase::Pending, pod_name: None, total_cost: 0.0, total_tokens: 0, last_active: None }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cell {
    #[serde(flatten)]
    pub meta: ResourceMeta,
    pub spec: CellSpec,
    #[serde(default)]
    pub status: CellStatus,
}

// ===========================================================================
// Formation
// ===========================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormationCellDecl {
    pub name: String,
    pub replicas: u32,
    pub spec: CellSpec,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Topology {
    FullMesh,
    Star { hub: String },
    Ring,
    Hierarchy { root: String },
    Blackboard,
    Broadcast { channel: String },
    Route { table: std::collections::BTreeMap<String, Vec<String>> },
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct BudgetSpec {
    #[serde(rename = "maxTotalCost")]
    pub max_total_cost: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormationSpec {
    pub cells: Vec<FormationCellDecl>,
    pub topology: Topology,
    #[serde(default)]
    pub budget: BudgetSpec,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum FormationPhase {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormationStatus {
    pub phase: FormationPhase,
    #[serde(default, rename = "totalCells")]
    pub total_cells: u32,
}

impl Default for FormationStatus {
    fn default() -> Self {
        Self { phase: FormationPhase::Pending, total_cells: 0 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Formation {
    #[serde(flatten)]
    pub meta: ResourceMeta,
    pub spec: FormationSpec,
    #[serde(default)]
    pub status: FormationStatus,
}

// ===========================================================================
// Mission
// ===========================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionCheckType {
    LlmJudge,
    ToolOutput,
    Metric,
    Human,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionCheck {
    #[serde(rename = "type")]
    pub kind: CompletionCheckType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MissionEntrypoint {
    Cell(String),
    Formation(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MissionSpec {
    pub entrypoint: MissionEntrypoint,
    #[serde(default, rename = "completionChecks")]
    pub completion_checks: Vec<CompletionCheck>,
    #[serde(default)]
    pub budget: BudgetSpec,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "reviewSpec")]
    pub review_spec: Option<serde_json::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MissionPhase {
    Pending,
    Running,
    InReview,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    #[serde(rename = "checkedAt")]
    pub checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MissionStatus {
    pub phase: MissionPhase,
    #[serde(default, rename = "checkResults")]
    pub check_results: Vec<CheckResult>,
    #[serde(default)]
    pub history: Vec<String>,
}

impl Default for MissionStatus {
    fn default() -> Self {
        Self { phase: MissionPhase::Pending, check_results: Vec::new(), history: Vec::new() }
    }
}

// ===========================================================================
// Blueprint
// ===========================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Enum,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_json::Value>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlueprintSpec {
    pub parameters: Vec<ParameterDecl>,
    pub formation: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlueprintVersion {
    pub version: u64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub changes: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlueprintStatus {
    #[serde(default)]
    pub versions: Vec<BlueprintVersion>,
    #[serde(default, rename = "usageCount")]
    pub usage_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "lastUsed")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default, rename = "avgSuccessRate")]
    pub avg_success_rate: f64,
}

impl Default for BlueprintStatus {
    fn default() -> Self {
        Self { versions: Vec::new(), usage_count: 0, last_used: None, avg_success_rate: 0.0 }
    }
}

// ===========================================================================
// KnowledgeGraph
// ===========================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Platform,
    Realm,
    Formation,
    Cell,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnowledgeGraphScope {
    pub level: ScopeLevel,
    pub id: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RetentionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "maxFacts")]
    pub max_facts: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "ttlDays")]
    pub ttl_days: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnowledgeGraphSpec {
    pub scope: KnowledgeGraphScope,
    #[serde(default)]
    pub dedicated: bool,
    #[serde(default)]
    pub inherit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "parentRef")]
    pub parent_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceLimits>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum KnowledgeGraphPhase {
    Pending,
    Ready,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnowledgeGraphStatus {
    pub phase: KnowledgeGraphPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, rename = "parentChain")]
    pub parent_chain: Vec<String>,
}

impl Default for KnowledgeGraphStatus {
    fn default() -> Self {
        Self { phase: KnowledgeGraphPhase::Pending, database: None, endpoint: None, parent_chain: Vec::new() }
    }
}

// ===========================================================================
// Channel
// ===========================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub formations: Vec<String>,
    #[serde(default = "default_max_message_size", rename = "maxMessageSize")]
    pub max_message_size: u64,
    #[serde(default = "default_retention_minutes", rename = "retentionMinutes")]
    pub retention_minutes: u32,
}

fn default_max_message_size() -> u64 { 65536 }
fn default_retention_minutes() -> u32 { 60 }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChannelPhase {
    Active,
    Paused,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub phase: ChannelPhase,
    #[serde(default, rename = "messageCount")]
    pub message_count: u64,
    #[serde(default, rename = "subscriberCount")]
    pub subscriber_count: u32,
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self { phase: ChannelPhase::Error, message_count: 0, subscriber_count: 0 }
    }
}

// ===========================================================================
// Budget ledger
// ===========================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOp {
    Allocate,
    Spend,
    Delegate,
    Reclaim,
    TopUp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub op: LedgerOp,
    pub amount: f64,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BudgetBalance {
    #[serde(rename = "cellId")]
    pub cell_id: String,
    pub allocated: f64,
    pub spent: f64,
    pub delegated: f64,
}

impl BudgetBalance {
    pub fn new(cell_id: impl Into<String>, allocated: f64) -> Self {
        Self { cell_id: cell_id.into(), allocated, spent: 0.0, delegated: 0.0 }
    }

    /// `available = allocated − spent − delegated` (§3, §8 invariant).
    pub fn available(&self) -> f64 {
        self.allocated - self.spent - self.delegated
    }
}

// ===========================================================================
// Spawn requests and cell tree
// ===========================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SpawnRequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub id: Uuid,
    pub name: String,
    pub namespace: String,
    #[serde(rename = "requestorCellId")]
    pub requestor_cell_id: String,
    #[serde(rename = "requestedSpec")]
    pub requested_spec: CellSpec,
    pub reason: String,
    pub status: SpawnRequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "decidedBy")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "decidedAt")]
    pub decided_at: Option<DateTime<Utc>>,
}

/// Materialised cell tree node for tree queries (§3, §9 "recursive cell trees").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CellTreeNode {
    #[serde(rename = "cellId")]
    pub cell_id: String,
    #[serde(rename = "parentId")]
    pub parent_id: Option<String>,
    #[serde(rename = "rootId")]
    pub root_id: String,
    pub depth: u32,
    pub path: String,
    #[serde(rename = "descendantCount")]
    pub descendant_count: u32,
    pub namespace: String,
}

impl CellTreeNode {
    pub fn root(cell_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        let cell_id = cell_id.into();
        Self {
            root_id: cell_id.clone(),
            path: cell_id.clone(),
            cell_id,
            parent_id: None,
            depth: 0,
            descendant_count: 0,
            namespace: namespace.into(),
        }
    }

    pub fn child(&self, cell_id: impl Into<String>) -> Self {
        let cell_id = cell_id.into();
        Self {
            path: format!("{}/{}", self.path, cell_id),
            parent_id: Some(self.cell_id.clone()),
            root_id: self.root_id.clone(),
            depth: self.depth + 1,
            cell_id,
            descendant_count: 0,
            namespace: self.namespace.clone(),
        }
    }

    /// `depth = count('/' in path)`, `rootId = split(path,'/')[0]` (§8 invariant).
    pub fn is_consistent(&self) -> bool {
        let expected_depth = self.path.matches('/').count() as u32;
        let expected_root = self.path.split('/').next().unwrap_or_default();
        expected_depth == self.depth && expected_root == self.root_id
    }
}
