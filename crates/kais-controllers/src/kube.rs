//! The `KubeClient` capability (§1, §9): stands in for the Kubernetes API
//! client a real controller manager would hold. One typed [`ResourceStore`]
//! per custom-resource kind plus the built-in Pod/Service/ConfigMap kinds
//! controllers materialise as children — the same "name a capability trait,
//! supply an in-memory fake for tests" shape as `kais_events::DbClient` and
//! `kais_agent::runtime::CellCreator`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use kais_core::{Blueprint, Cell, Channel, Formation, KnowledgeGraph, Mission, OwnerReference, Result};

/// Observed phase of a backing `Pod` (§4.5 "Updates `status.phase` to track
/// the pod phase").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug)]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    pub owner: OwnerReference,
    /// Injected `CELL_NAME`/`CELL_NAMESPACE`/`CELL_SPEC`/`NATS_URL` (§4.5, §6).
    pub env: BTreeMap<String, String>,
    pub spec_hash: String,
    pub phase: PodPhase,
}

#[derive(Clone, Debug)]
pub struct ServiceRecord {
    pub name: String,
    pub namespace: String,
    pub owner: OwnerReference,
    pub selector: String,
    pub ready: bool,
}

#[derive(Clone, Debug)]
pub struct ConfigMapRecord {
    pub name: String,
    pub namespace: String,
    pub owner: OwnerReference,
    pub data: BTreeMap<String, String>,
}

/// Extracts the `(namespace, name)` identity a store keys resources by.
pub trait Keyed {
    fn key(&self) -> (String, String);
}

macro_rules! keyed_by_meta {
    ($ty:ty) => {
        impl Keyed for $ty {
            fn key(&self) -> (String, String) {
                (self.meta.namespace.clone(), self.meta.name.clone())
            }
        }
    };
}

keyed_by_meta!(Cell);
keyed_by_meta!(Formation);
keyed_by_meta!(Mission);
keyed_by_meta!(Blueprint);
keyed_by_meta!(KnowledgeGraph);
keyed_by_meta!(Channel);

impl Keyed for PodRecord {
    fn key(&self) -> (String, String) {
        (self.namespace.clone(), self.name.clone())
    }
}
impl Keyed for ServiceRecord {
    fn key(&self) -> (String, String) {
        (self.namespace.clone(), self.name.clone())
    }
}
impl Keyed for ConfigMapRecord {
    fn key(&self) -> (String, String) {
        (self.namespace.clone(), self.name.clone())
    }
}

/// Generic get/list/put/delete over one resource kind. `put` is create-or-update
/// (patch semantics: the caller supplies the whole desired value).
#[async_trait]
pub trait ResourceStore<T>: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<T>>;
    async fn list(&self, namespace: &str) -> Result<Vec<T>>;
    async fn put(&self, resource: T) -> Result<()>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// In-memory `ResourceStore<T>` — every kind shares this one implementation;
/// only the identity extraction (`Keyed`) differs per kind.
pub struct InMemoryStore<T> {
    items: RwLock<HashMap<(String, String), T>>,
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self { items: RwLock::new(HashMap::new()) }
    }
}

impl<T> InMemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<T> ResourceStore<T> for InMemoryStore<T>
where
    T: Keyed + Clone + Send + Sync,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<T>> {
        Ok(self.items.read().await.get(&(namespace.to_string(), name.to_string())).cloned())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<T>> {
        Ok(self.items.read().await.values().filter(|v| v.key().0 == namespace).cloned().collect())
    }

    async fn put(&self, resource: T) -> Result<()> {
        self.items.write().await.insert(resource.key(), resource);
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.items.write().await.remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }
}

/// Stands in for the Kubernetes API client (`KubeClient`, out of scope per
/// §1). One typed store per kind this control plane materialises.
#[async_trait]
pub trait KubeClient: Send + Sync {
    fn cells(&self) -> &dyn ResourceStore<Cell>;
    fn formations(&self) -> &dyn ResourceStore<Formation>;
    fn missions(&self) -> &dyn ResourceStore<Mission>;
    fn blueprints(&self) -> &dyn ResourceStore<Blueprint>;
    fn knowledge_graphs(&self) -> &dyn ResourceStore<KnowledgeGraph>;
    fn channels(&self) -> &dyn ResourceStore<Channel>;
    fn pods(&self) -> &dyn ResourceStore<PodRecord>;
    fn services(&self) -> &dyn ResourceStore<ServiceRecord>;
    fn config_maps(&self) -> &dyn ResourceStore<ConfigMapRecord>;
}

/// In-memory `KubeClient` used by tests and by any binary not yet wired to a
/// real cluster — mirrors `kais_events::InMemoryDbClient`.
#[derive(Default)]
pub struct InMemoryKubeClient {
    cells: InMemoryStore<Cell>,
    formations: InMemoryStore<Formation>,
    missions: InMemoryStore<Mission>,
    blueprints: InMemoryStore<Blueprint>,
    knowledge_graphs: InMemoryStore<KnowledgeGraph>,
    channels: InMemoryStore<Channel>,
    pods: InMemoryStore<PodRecord>,
    services: InMemoryStore<ServiceRecord>,
    config_maps: InMemoryStore<ConfigMapRecord>,
}

impl InMemoryKubeClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KubeClient for InMemoryKubeClient {
    fn cells(&self) -> &dyn ResourceStore<Cell> {
        &self.cells
    }
    fn formations(&self) -> &dyn ResourceStore<Formation> {
        &self.formations
    }
    fn missions(&self) -> &dyn ResourceStore<Mission> {
        &self.missions
    }
    fn blueprints(&self) -> &dyn ResourceStore<Blueprint> {
        &self.blueprints
    }
    fn knowledge_graphs(&self) -> &dyn ResourceStore<KnowledgeGraph> {
        &self.knowledge_graphs
    }
    fn channels(&self) -> &dyn ResourceStore<Channel> {
        &self.channels
    }
    fn pods(&self) -> &dyn ResourceStore<PodRecord> {
        &self.pods
    }
    fn services(&self) -> &dyn ResourceStore<ServiceRecord> {
        &self.services
    }
    fn config_maps(&self) -> &dyn ResourceStore<ConfigMapRecord> {
        &self.config_maps
    }
}
