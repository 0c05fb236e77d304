//! `CellController` (§4.5, C9): reconciles a `Cell` resource to a backing
//! `Pod`. Grounded in shape on `agenticlaw_kg::executor::Executor`'s
//! observe → prepare → act loop, generalized to the idempotent
//! observe → compute desired state → diff → patch pattern every controller
//! in this crate follows.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use kais_core::{CellPhase, CellStatus, OwnerReference, Result};

use crate::fingerprint::fingerprint;
use crate::kube::{KubeClient, PodPhase, PodRecord};

const FINGERPRINT_ANNOTATION: &str = "kais.io/spec-fingerprint";

pub struct CellController {
    kube: Arc<dyn KubeClient>,
    nats_url: String,
}

impl CellController {
    pub fn new(kube: Arc<dyn KubeClient>, nats_url: impl Into<String>) -> Self {
        Self { kube, nats_url: nats_url.into() }
    }

    /// Observe → compute desired state → diff → patch for one `Cell`.
    /// Idempotent and safe to call concurrently for different names (§4.5).
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<()> {
        let Some(mut cell) = self.kube.cells().get(namespace, name).await? else {
            return Ok(());
        };

        let spec_hash = fingerprint(&cell.spec)?;
        let previous_hash = cell.meta.annotations.get(FINGERPRINT_ANNOTATION).cloned();
        let existing_pod = self.kube.pods().get(namespace, name).await?;

        let pod = match existing_pod {
            Some(pod) if previous_hash.as_deref() == Some(spec_hash.as_str()) => pod,
            Some(_) => {
                // Spec changed since the last reconcile: delete the stale pod so a
                // fresh one picks up the new spec (§4.5 "on change, deletes the old
                // pod so the new one takes effect").
                info!(cell = %name, namespace, "cell spec changed, recreating pod");
                self.kube.pods().delete(namespace, name).await?;
                self.create_pod(namespace, name, &cell, &spec_hash).await?
            }
            None => self.create_pod(namespace, name, &cell, &spec_hash).await?,
        };

        cell.meta.annotations.insert(FINGERPRINT_ANNOTATION.to_string(), spec_hash);
        cell.status = CellStatus { phase: phase_from_pod(pod.phase), pod_name: Some(pod.name.clone()), ..cell.status };
        self.kube.cells().put(cell).await?;
        debug!(cell = %name, namespace, "cell reconciled");
        Ok(())
    }

    async fn create_pod(
        &self,
        namespace: &str,
        name: &str,
        cell: &kais_core::Cell,
        spec_hash: &str,
    ) -> Result<PodRecord> {
        let mut env = BTreeMap::new();
        env.insert("CELL_NAME".to_string(), name.to_string());
        env.insert("CELL_NAMESPACE".to_string(), namespace.to_string());
        env.insert("CELL_SPEC".to_string(), serde_json::to_string(&cell.spec)?);
        env.insert("NATS_URL".to_string(), self.nats_url.clone());

        let uid = cell.meta.uid.clone().unwrap_or_else(|| name.to_string());
        let pod = PodRecord {
            name: name.to_string(),
            namespace: namespace.to_string(),
            owner: OwnerReference::new("Cell", name, uid),
            env,
            spec_hash: spec_hash.to_string(),
            phase: PodPhase::Pending,
        };
        self.kube.pods().put(pod.clone()).await?;
        Ok(pod)
    }

    /// Cascading delete: removes the backing pod before the `Cell` itself is
    /// finalised (§3 "cascading deletion", §8 "Cascade").
    pub async fn reconcile_delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.kube.pods().delete(namespace, name).await?;
        self.kube.cells().delete(namespace, name).await
    }
}

fn phase_from_pod(phase: PodPhase) -> CellPhase {
    match phase {
        PodPhase::Pending => CellPhase::Pending,
        PodPhase::Running => CellPhase::Running,
        PodPhase::Succeeded => CellPhase::Completed,
        PodPhase::Failed => CellPhase::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube::InMemoryKubeClient;
    use kais_core::{Cell, CellSpec, MindConfig, ResourceMeta};

    fn cell(name: &str, system_prompt: &str) -> Cell {
        Cell {
            meta: ResourceMeta { name: name.to_string(), namespace: "default".to_string(), ..Default::default() },
            spec: CellSpec {
                mind: MindConfig {
                    provider: "anthropic".to_string(),
                    model: "claude".to_string(),
                    system_prompt: system_prompt.to_string(),
                    temperature: None,
                    max_tokens: None,
                    working_memory: None,
                },
                tools: vec![],
                resources: None,
                parent_ref: None,
                recursion: None,
            },
            status: Default::default(),
        }
    }

    #[tokio::test]
    async fn first_reconcile_creates_pod_and_sets_fingerprint() {
        let kube: Arc<dyn KubeClient> = Arc::new(InMemoryKubeClient::new());
        kube.cells().put(cell("researcher", "be helpful")).await.unwrap();
        let controller = CellController::new(kube.clone(), "nats://localhost:4222");

        controller.reconcile("default", "researcher").await.unwrap();

        let pod = kube.pods().get("default", "researcher").await.unwrap().unwrap();
        assert_eq!(pod.env["CELL_NAME"], "researcher");
        assert_eq!(pod.env["NATS_URL"], "nats://localhost:4222");

        let updated = kube.cells().get("default", "researcher").await.unwrap().unwrap();
        assert!(updated.meta.annotations.contains_key(FINGERPRINT_ANNOTATION));
        assert_eq!(updated.status.phase, CellPhase::Pending);
    }

    #[tokio::test]
    async fn unchanged_spec_does_not_recreate_pod() {
        let kube: Arc<dyn KubeClient> = Arc::new(InMemoryKubeClient::new());
        kube.cells().put(cell("researcher", "be helpful")).await.unwrap();
        let controller = CellController::new(kube.clone(), "nats://localhost:4222");

        controller.reconcile("default", "researcher").await.unwrap();
        let mut pod = kube.pods().get("default", "researcher").await.unwrap().unwrap();
        pod.phase = PodPhase::Running;
        kube.pods().put(pod).await.unwrap();

        controller.reconcile("default", "researcher").await.unwrap();
        let updated_cell = kube.cells().get("default", "researcher").await.unwrap().unwrap();
        assert_eq!(updated_cell.status.phase, CellPhase::Running);
    }

    #[tokio::test]
    async fn spec_change_recreates_pod() {
        let kube: Arc<dyn KubeClient> = Arc::new(InMemoryKubeClient::new());
        kube.cells().put(cell("researcher", "be helpful")).await.unwrap();
        let controller = CellController::new(kube.clone(), "nats://localhost:4222");
        controller.reconcile("default", "researcher").await.unwrap();

        let mut cell = kube.cells().get("default", "researcher").await.unwrap().unwrap();
        cell.spec.mind.system_prompt = "be very helpful".to_string();
        kube.cells().put(cell).await.unwrap();

        controller.reconcile("default", "researcher").await.unwrap();
        let pod = kube.pods().get("default", "researcher").await.unwrap().unwrap();
        assert_eq!(pod.phase, PodPhase::Pending); // recreated, so back to Pending
    }

    #[tokio::test]
    async fn cascade_delete_removes_pod_before_cell() {
        let kube: Arc<dyn KubeClient> = Arc::new(InMemoryKubeClient::new());
        kube.cells().put(cell("researcher", "be helpful")).await.unwrap();
        let controller = CellController::new(kube.clone(), "nats://localhost:4222");
        controller.reconcile("default", "researcher").await.unwrap();

        controller.reconcile_delete("default", "researcher").await.unwrap();
        assert!(kube.pods().get("default", "researcher").await.unwrap().is_none());
        assert!(kube.cells().get("default", "researcher").await.unwrap().is_none());
    }
}
