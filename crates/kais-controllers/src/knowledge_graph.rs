//! `KnowledgeGraphController` (§4.5, C9): shared KnowledgeGraphs resolve
//! immediately; dedicated ones materialise a backing `neo4j-<name>` Pod and
//! Service. `parentChain` is resolved by walking `parentRef` against the
//! namespace's other KnowledgeGraphs.

use std::sync::Arc;

use kais_core::{KnowledgeGraph, KnowledgeGraphPhase, OwnerReference, Result};

use crate::fingerprint::fingerprint;
use crate::kube::{KubeClient, PodPhase, PodRecord, ServiceRecord};

pub struct KnowledgeGraphController {
    kube: Arc<dyn KubeClient>,
}

impl KnowledgeGraphController {
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self { kube }
    }

    fn backing_name(kg_name: &str) -> String {
        format!("neo4j-{kg_name}")
    }

    /// Observe → compute desired state → diff → patch for one
    /// `KnowledgeGraph` (§4.5).
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<()> {
        let Some(mut kg) = self.kube.knowledge_graphs().get(namespace, name).await? else {
            return Ok(());
        };

        kg.status.parent_chain = self.resolve_parent_chain(namespace, &kg).await?;

        if !kg.spec.dedicated {
            kg.status.phase = KnowledgeGraphPhase::Ready;
            kg.status.database = Some(name.to_string());
            kg.status.endpoint = None;
        } else {
            self.reconcile_dedicated(namespace, name, &mut kg).await?;
        }

        self.kube.knowledge_graphs().put(kg).await
    }

    async fn reconcile_dedicated(&self, namespace: &str, name: &str, kg: &mut KnowledgeGraph) -> Result<()> {
        let backing_name = Self::backing_name(name);
        let uid = kg.meta.uid.clone().unwrap_or_else(|| name.to_string());
        let owner = OwnerReference::new("KnowledgeGraph", name, uid);

        if self.kube.pods().get(namespace, &backing_name).await?.is_none() {
            let pod = PodRecord {
                name: backing_name.clone(),
                namespace: namespace.to_string(),
                owner: owner.clone(),
                env: Default::default(),
                spec_hash: fingerprint(&kg.spec)?,
                phase: PodPhase::Pending,
            };
            self.kube.pods().put(pod).await?;
        }

        if self.kube.services().get(namespace, &backing_name).await?.is_none() {
            let service =
                ServiceRecord { name: backing_name.clone(), namespace: namespace.to_string(), owner, selector: backing_name.clone(), ready: true };
            self.kube.services().put(service).await?;
        }

        let service = self.kube.services().get(namespace, &backing_name).await?.expect("just created");
        kg.status.database = Some(backing_name.clone());
        kg.status.endpoint = Some(format!("{backing_name}.{namespace}.svc.cluster.local"));
        kg.status.phase = if service.ready { KnowledgeGraphPhase::Ready } else { KnowledgeGraphPhase::Pending };
        Ok(())
    }

    /// Walks `parentRef` against this namespace's other KnowledgeGraphs.
    /// Empty when `parentRef` is absent (§3, §4.5).
    async fn resolve_parent_chain(&self, namespace: &str, kg: &KnowledgeGraph) -> Result<Vec<String>> {
        let all = self.kube.knowledge_graphs().list(namespace).await?;
        let mut chain = Vec::new();
        let mut current = kg.spec.parent_ref.clone();
        while let Some(parent_name) = current {
            if chain.len() > all.len() {
                break; // guards against an (unexpected) parentRef cycle
            }
            chain.push(parent_name.clone());
            current = all.iter().find(|k| k.meta.name == parent_name).and_then(|k| k.spec.parent_ref.clone());
        }
        Ok(chain)
    }

    /// Removes the backing Pod and Service (§4.5 `reconcileDelete`).
    pub async fn reconcile_delete(&self, namespace: &str, name: &str) -> Result<()> {
        let backing_name = Self::backing_name(name);
        self.kube.services().delete(namespace, &backing_name).await?;
        self.kube.pods().delete(namespace, &backing_name).await?;
        self.kube.knowledge_graphs().delete(namespace, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube::InMemoryKubeClient;
    use kais_core::{KnowledgeGraphScope, KnowledgeGraphSpec, ResourceMeta, ScopeLevel};

    fn kg(name: &str, dedicated: bool, parent_ref: Option<&str>) -> KnowledgeGraph {
        KnowledgeGraph {
            meta: ResourceMeta { name: name.to_string(), namespace: "default".to_string(), ..Default::default() },
            spec: KnowledgeGraphSpec {
                scope: KnowledgeGraphScope { level: ScopeLevel::Formation, id: "research-team".to_string() },
                dedicated,
                inherit: false,
                parent_ref: parent_ref.map(|s| s.to_string()),
                retention: None,
                resources: None,
            },
            status: Default::default(),
        }
    }

    #[tokio::test]
    async fn shared_graph_is_ready_immediately() {
        let kube: Arc<dyn KubeClient> = Arc::new(InMemoryKubeClient::new());
        kube.knowledge_graphs().put(kg("shared", false, None)).await.unwrap();
        let controller = KnowledgeGraphController::new(kube.clone());

        controller.reconcile("default", "shared").await.unwrap();
        let updated = kube.knowledge_graphs().get("default", "shared").await.unwrap().unwrap();
        assert_eq!(updated.status.phase, KnowledgeGraphPhase::Ready);
        assert_eq!(updated.status.database.as_deref(), Some("shared"));
    }

    #[tokio::test]
    async fn dedicated_graph_materialises_pod_and_service() {
        let kube: Arc<dyn KubeClient> = Arc::new(InMemoryKubeClient::new());
        kube.knowledge_graphs().put(kg("private", true, None)).await.unwrap();
        let controller = KnowledgeGraphController::new(kube.clone());

        controller.reconcile("default", "private").await.unwrap();
        assert!(kube.pods().get("default", "neo4j-private").await.unwrap().is_some());
        assert!(kube.services().get("default", "neo4j-private").await.unwrap().is_some());
        let updated = kube.knowledge_graphs().get("default", "private").await.unwrap().unwrap();
        assert_eq!(updated.status.phase, KnowledgeGraphPhase::Ready);
        assert!(updated.status.endpoint.unwrap().contains("neo4j-private"));
    }

    #[tokio::test]
    async fn parent_chain_walks_parent_refs() {
        let kube: Arc<dyn KubeClient> = Arc::new(InMemoryKubeClient::new());
        kube.knowledge_graphs().put(kg("platform", false, None)).await.unwrap();
        kube.knowledge_graphs().put(kg("realm", false, Some("platform"))).await.unwrap();
        kube.knowledge_graphs().put(kg("team", false, Some("realm"))).await.unwrap();
        let controller = KnowledgeGraphController::new(kube.clone());

        controller.reconcile("default", "team").await.unwrap();
        let updated = kube.knowledge_graphs().get("default", "team").await.unwrap().unwrap();
        assert_eq!(updated.status.parent_chain, vec!["realm".to_string(), "platform".to_string()]);
    }

    #[tokio::test]
    async fn reconcile_delete_removes_backing_resources() {
        let kube: Arc<dyn KubeClient> = Arc::new(InMemoryKubeClient::new());
        kube.knowledge_graphs().put(kg("private", true, None)).await.unwrap();
        let controller = KnowledgeGraphController::new(kube.clone());
        controller.reconcile("default", "private").await.unwrap();

        controller.reconcile_delete("default", "private").await.unwrap();
        assert!(kube.pods().get("default", "neo4j-private").await.unwrap().is_none());
        assert!(kube.services().get("default", "neo4j-private").await.unwrap().is_none());
        assert!(kube.knowledge_graphs().get("default", "private").await.unwrap().is_none());
    }
}
