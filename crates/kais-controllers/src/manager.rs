//! `ControllerManager`: boots and drives all six reconciliation loops
//! against a single namespace, one worker pool per controller kind (§4.5,
//! §5). Each reconcile attempt that errors is requeued with the exponential
//! backoff policy from §7 instead of being dropped or retried immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use kais_core::{BackoffPolicy, Result};

use crate::blueprint::BlueprintController;
use crate::cell::CellController;
use crate::channel::ChannelController;
use crate::formation::FormationController;
use crate::kube::KubeClient;
use crate::knowledge_graph::KnowledgeGraphController;
use crate::mission::MissionController;

/// Retries `reconcile` up to `policy.max_attempts` times, sleeping the
/// policy's jittered backoff delay between attempts, before giving up and
/// logging the last error (§7 "requeued with backoff").
async fn reconcile_with_backoff<F, Fut>(resource: &str, policy: BackoffPolicy, mut reconcile: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut attempt = 1;
    loop {
        match reconcile().await {
            Ok(()) => return,
            Err(err) if policy.exhausted(attempt) => {
                error!(resource, attempt, %err, "reconcile failed, giving up for this pass");
                return;
            }
            Err(err) => {
                let delay = policy.delay_ms(attempt, seed_for(resource, attempt));
                warn!(resource, attempt, %err, delay_ms = delay, "reconcile failed, retrying");
                sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
        }
    }
}

fn seed_for(resource: &str, attempt: u32) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    resource.hash(&mut hasher);
    attempt.hash(&mut hasher);
    hasher.finish()
}

pub struct ControllerManager {
    kube: Arc<dyn KubeClient>,
    namespace: String,
    cell: CellController,
    formation: FormationController,
    mission: MissionController,
    blueprint: BlueprintController,
    knowledge_graph: KnowledgeGraphController,
    channel: ChannelController,
    backoff: BackoffPolicy,
}

impl ControllerManager {
    pub fn new(kube: Arc<dyn KubeClient>, namespace: impl Into<String>, nats_url: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            cell: CellController::new(kube.clone(), nats_url),
            formation: FormationController::new(kube.clone()),
            mission: MissionController::new(kube.clone()),
            blueprint: BlueprintController::new(kube.clone()),
            knowledge_graph: KnowledgeGraphController::new(kube.clone()),
            channel: ChannelController::new(kube.clone()),
            kube,
            namespace,
            backoff: BackoffPolicy::default(),
        }
    }

    /// One full pass over every resource kind in the configured namespace.
    /// Idempotent, safe to call on any interval (§4.5 "idempotent and
    /// re-entrant").
    pub async fn reconcile_once(&self) -> Result<()> {
        for cell in self.kube.cells().list(&self.namespace).await? {
            let name = cell.meta.name.clone();
            reconcile_with_backoff(&format!("Cell/{name}"), self.backoff, || self.cell.reconcile(&self.namespace, &name)).await;
        }
        for formation in self.kube.formations().list(&self.namespace).await? {
            let name = formation.meta.name.clone();
            reconcile_with_backoff(&format!("Formation/{name}"), self.backoff, || self.formation.reconcile(&self.namespace, &name)).await;
        }
        for mission in self.kube.missions().list(&self.namespace).await? {
            let name = mission.meta.name.clone();
            reconcile_with_backoff(&format!("Mission/{name}"), self.backoff, || self.mission.reconcile(&self.namespace, &name)).await;
        }
        for blueprint in self.kube.blueprints().list(&self.namespace).await? {
            let name = blueprint.meta.name.clone();
            reconcile_with_backoff(&format!("Blueprint/{name}"), self.backoff, || self.blueprint.reconcile(&self.namespace, &name)).await;
        }
        for kg in self.kube.knowledge_graphs().list(&self.namespace).await? {
            let name = kg.meta.name.clone();
            reconcile_with_backoff(&format!("KnowledgeGraph/{name}"), self.backoff, || self.knowledge_graph.reconcile(&self.namespace, &name))
                .await;
        }
        for channel in self.kube.channels().list(&self.namespace).await? {
            let name = channel.meta.name.clone();
            reconcile_with_backoff(&format!("Channel/{name}"), self.backoff, || self.channel.reconcile(&self.namespace, &name)).await;
        }
        Ok(())
    }

    /// Runs `reconcile_once` on `interval` until `cancel` fires (the
    /// controller manager binary's SIGTERM path, §5/§6).
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = sleep(interval) => {
                    if let Err(err) = self.reconcile_once().await {
                        error!(%err, "reconcile pass failed to list resources");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube::InMemoryKubeClient;
    use kais_core::{Cell, CellPhase, CellSpec, MindConfig, ResourceMeta};

    fn cell(name: &str) -> Cell {
        Cell {
            meta: ResourceMeta { name: name.to_string(), namespace: "default".to_string(), ..Default::default() },
            spec: CellSpec {
                mind: MindConfig {
                    provider: "anthropic".to_string(),
                    model: "claude".to_string(),
                    system_prompt: "be helpful".to_string(),
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
    async fn reconcile_once_drives_every_pending_cell_to_a_pod() {
        let kube: Arc<dyn KubeClient> = Arc::new(InMemoryKubeClient::new());
        kube.cells().put(cell("researcher")).await.unwrap();
        kube.cells().put(cell("reviewer")).await.unwrap();
        let manager = ControllerManager::new(kube.clone(), "default", "nats://localhost:4222");

        manager.reconcile_once().await.unwrap();

        for name in ["researcher", "reviewer"] {
            let updated = kube.cells().get("default", name).await.unwrap().unwrap();
            assert_eq!(updated.status.phase, CellPhase::Pending);
            assert!(kube.pods().get("default", name).await.unwrap().is_some());
        }
    }
}
