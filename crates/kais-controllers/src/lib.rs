//! Reconciliation loops for every `kais.io/v1` custom resource kind (§4.5,
//! C9), plus the `KubeClient` capability boundary they reconcile against and
//! the `ControllerManager` that drives them all on a shared interval.

pub mod blueprint;
pub mod cell;
pub mod channel;
pub mod fingerprint;
pub mod formation;
pub mod knowledge_graph;
pub mod kube;
pub mod manager;
pub mod mission;

pub use blueprint::BlueprintController;
pub use cell::CellController;
pub use channel::ChannelController;
pub use formation::FormationController;
pub use knowledge_graph::KnowledgeGraphController;
pub use kube::{InMemoryKubeClient, KubeClient, ResourceStore};
pub use manager::ControllerManager;
pub use mission::{BudgetSource, MetricSource, MissionController, ReviewSource, ToolOutputSource};
