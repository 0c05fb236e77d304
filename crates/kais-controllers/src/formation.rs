//! `FormationController` (§4.5, C9): expands `cells[] × replicas` into child
//! `Cell` resources, regenerates the routing `ConfigMap` on topology change,
//! and tracks `status.totalCells`/`phase`.

use std::sync::Arc;

use tracing::info;

use kais_core::{Cell, FormationPhase, OwnerReference, ResourceMeta, Result};
use kais_topology::{generate_routes, to_configmap_data};

use crate::kube::{ConfigMapRecord, KubeClient};

pub struct FormationController {
    kube: Arc<dyn KubeClient>,
}

impl FormationController {
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self { kube }
    }

    fn routes_configmap_name(formation_name: &str) -> String {
        format!("{formation_name}-routes")
    }

    /// Observe → compute desired state → diff → patch for one `Formation`
    /// (§4.5). Creates missing replica indices, deletes surplus ones on
    /// scale-down, and regenerates the routing `ConfigMap`.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<()> {
        let Some(mut formation) = self.kube.formations().get(namespace, name).await? else {
            return Ok(());
        };
        let uid = formation.meta.uid.clone().unwrap_or_else(|| name.to_string());
        let owner = OwnerReference::new("Formation", name, uid);

        let mut total_cells = 0u32;
        for decl in &formation.spec.cells {
            self.reconcile_replica_set(namespace, name, decl, &owner).await?;
            total_cells += decl.replicas;
        }

        let routes = generate_routes(&formation.spec.cells, &formation.spec.topology);
        let configmap = ConfigMapRecord {
            name: Self::routes_configmap_name(name),
            namespace: namespace.to_string(),
            owner,
            data: to_configmap_data(&routes),
        };
        self.kube.config_maps().put(configmap).await?;

        formation.status.total_cells = total_cells;
        formation.status.phase = FormationPhase::Running;
        self.kube.formations().put(formation).await?;
        info!(formation = %name, namespace, total_cells, "formation reconciled");
        Ok(())
    }

    async fn reconcile_replica_set(
        &self,
        namespace: &str,
        formation_name: &str,
        decl: &kais_core::FormationCellDecl,
        owner: &OwnerReference,
    ) -> Result<()> {
        for i in 0..decl.replicas {
            let cell_name = format!("{}-{}", decl.name, i);
            if self.kube.cells().get(namespace, &cell_name).await?.is_none() {
                let cell = Cell {
                    meta: ResourceMeta {
                        name: cell_name,
                        namespace: namespace.to_string(),
                        owner_references: vec![owner.clone()],
                        ..Default::default()
                    },
                    spec: decl.spec.clone(),
                    status: Default::default(),
                };
                self.kube.cells().put(cell).await?;
            }
        }

        // Scale-down: delete the highest-indexed surplus replicas this
        // Formation owns (§4.5 "replicas decrease: delete highest-indexed
        // surplus Cells", §8 scenario 7).
        let prefix = format!("{}-", decl.name);
        let existing = self.kube.cells().list(namespace).await?;
        for cell in existing {
            if !cell.meta.is_owned_by("Formation", formation_name) {
                continue;
            }
            let Some(index_str) = cell.meta.name.strip_prefix(&prefix) else { continue };
            let Ok(index) = index_str.parse::<u32>() else { continue };
            if index >= decl.replicas {
                self.kube.cells().delete(namespace, &cell.meta.name).await?;
                self.kube.pods().delete(namespace, &cell.meta.name).await?;
            }
        }
        Ok(())
    }

    /// Cascade: delete every Cell this Formation owns (and their pods), the
    /// routing ConfigMap, then the Formation itself (§3, §8 "Cascade").
    pub async fn reconcile_delete(&self, namespace: &str, name: &str) -> Result<()> {
        let owned_cells = self
            .kube
            .cells()
            .list(namespace)
            .await?
            .into_iter()
            .filter(|c| c.meta.is_owned_by("Formation", name))
            .collect::<Vec<_>>();
        for cell in owned_cells {
            self.kube.pods().delete(namespace, &cell.meta.name).await?;
            self.kube.cells().delete(namespace, &cell.meta.name).await?;
        }
        self.kube.config_maps().delete(namespace, &Self::routes_configmap_name(name)).await?;
        self.kube.formations().delete(namespace, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube::InMemoryKubeClient;
    use kais_core::{CellSpec, Formation, FormationCellDecl, FormationSpec, MindConfig, Topology};

    fn formation(replicas: u32) -> Formation {
        Formation {
            meta: ResourceMeta { name: "research-team".to_string(), namespace: "default".to_string(), ..Default::default() },
            spec: FormationSpec {
                cells: vec![FormationCellDecl {
                    name: "worker".to_string(),
                    replicas,
                    spec: CellSpec {
                        mind: MindConfig {
                            provider: "anthropic".into(),
                            model: "claude".into(),
                            system_prompt: "work".into(),
                            temperature: None,
                            max_tokens: None,
                            working_memory: None,
                        },
                        tools: vec![],
                        resources: None,
                        parent_ref: None,
                        recursion: None,
                    },
                }],
                topology: Topology::FullMesh,
                budget: Default::default(),
            },
            status: Default::default(),
        }
    }

    #[tokio::test]
    async fn scale_up_then_down_keeps_lowest_indices() {
        let kube: Arc<dyn KubeClient> = Arc::new(InMemoryKubeClient::new());
        kube.formations().put(formation(1)).await.unwrap();
        let controller = FormationController::new(kube.clone());

        controller.reconcile("default", "research-team").await.unwrap();
        assert!(kube.cells().get("default", "worker-0").await.unwrap().is_some());
        assert_eq!(kube.cells().list("default").await.unwrap().len(), 1);

        let mut f = kube.formations().get("default", "research-team").await.unwrap().unwrap();
        f.spec.cells[0].replicas = 3;
        kube.formations().put(f).await.unwrap();
        controller.reconcile("default", "research-team").await.unwrap();
        assert_eq!(kube.cells().list("default").await.unwrap().len(), 3);
        let updated = kube.formations().get("default", "research-team").await.unwrap().unwrap();
        assert_eq!(updated.status.total_cells, 3);

        let mut f = kube.formations().get("default", "research-team").await.unwrap().unwrap();
        f.spec.cells[0].replicas = 1;
        kube.formations().put(f).await.unwrap();
        controller.reconcile("default", "research-team").await.unwrap();
        let remaining = kube.cells().list("default").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].meta.name, "worker-0");
        assert!(kube.cells().get("default", "worker-1").await.unwrap().is_none());
        assert!(kube.cells().get("default", "worker-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reconcile_regenerates_routing_configmap() {
        let kube: Arc<dyn KubeClient> = Arc::new(InMemoryKubeClient::new());
        kube.formations().put(formation(2)).await.unwrap();
        let controller = FormationController::new(kube.clone());
        controller.reconcile("default", "research-team").await.unwrap();

        let cm = kube.config_maps().get("default", "research-team-routes").await.unwrap().unwrap();
        assert!(cm.data.contains_key("worker-0"));
        assert!(cm.data["worker-0"].contains("worker-1"));
    }

    #[tokio::test]
    async fn cascade_delete_removes_owned_cells_and_configmap() {
        let kube: Arc<dyn KubeClient> = Arc::new(InMemoryKubeClient::new());
        kube.formations().put(formation(2)).await.unwrap();
        let controller = FormationController::new(kube.clone());
        controller.reconcile("default", "research-team").await.unwrap();

        controller.reconcile_delete("default", "research-team").await.unwrap();
        assert!(kube.cells().list("default").await.unwrap().is_empty());
        assert!(kube.config_maps().get("default", "research-team-routes").await.unwrap().is_none());
        assert!(kube.formations().get("default", "research-team").await.unwrap().is_none());
    }
}
