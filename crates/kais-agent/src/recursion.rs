//! Recursion Validator (§4.4, C7): gates `spawn_cell` against `maxDepth`,
//! `maxDescendants`, and `spawnPolicy`, and keeps the cell-tree bookkeeping
//! (`CellTreeNode`) that both the spawn path and the controllers' status
//! views rely on.

use dashmap::DashMap;
use kais_core::{CellTreeNode, SpawnPolicy};
use kais_tools::{SpawnDecision, SpawnInput};

/// In-memory cell-tree registry shared by every Cell in a process tree.
/// A real deployment would back this with the `Cell` custom resources
/// themselves; the registry here plays that role for the runtime in-process.
pub struct CellTreeRegistry {
    nodes: DashMap<String, CellTreeNode>,
}

impl CellTreeRegistry {
    pub fn new() -> Self {
        Self { nodes: DashMap::new() }
    }

    pub fn insert_root(&self, cell_id: impl Into<String>, namespace: impl Into<String>) -> CellTreeNode {
        let node = CellTreeNode::root(cell_id, namespace);
        self.nodes.insert(node.cell_id.clone(), node.clone());
        node
    }

    pub fn node(&self, cell_id: &str) -> Option<CellTreeNode> {
        self.nodes.get(cell_id).map(|n| n.clone())
    }

    pub fn descendant_count(&self, root_id: &str) -> u32 {
        self.nodes.iter().filter(|n| n.root_id == root_id && n.cell_id != root_id).count() as u32
    }

    /// Registers `child_id` under `parent_id`, bumping ancestor descendant
    /// counts. Returns the new node.
    pub fn insert_child(&self, parent_id: &str, child_id: impl Into<String>) -> Option<CellTreeNode> {
        let parent = self.node(parent_id)?;
        let child = parent.child(child_id);
        self.nodes.insert(child.cell_id.clone(), child.clone());

        let mut cursor = Some(parent.cell_id.clone());
        while let Some(id) = cursor {
            let next_parent = self.nodes.get(&id).and_then(|n| n.parent_id.clone());
            if let Some(mut node) = self.nodes.get_mut(&id) {
                node.descendant_count += 1;
            }
            cursor = next_parent;
        }
        Some(child)
    }

    pub fn remove_subtree(&self, cell_id: &str) {
        let to_remove: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n.cell_id == cell_id || n.path.starts_with(&format!("{cell_id}/")))
            .map(|n| n.cell_id.clone())
            .collect();
        for id in to_remove {
            self.nodes.remove(&id);
        }
    }
}

impl Default for CellTreeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates a spawn request against the recursion policy inherited from the
/// parent (§3 `RecursionSpec`, §4.4).
#[async_trait::async_trait]
pub trait RecursionValidator: Send + Sync {
    async fn validate(&self, parent_cell_id: &str, namespace: &str, parent_recursion: Option<&kais_core::RecursionSpec>, input: &SpawnInput) -> SpawnDecision;
}

pub struct DefaultRecursionValidator {
    tree: std::sync::Arc<CellTreeRegistry>,
}

impl DefaultRecursionValidator {
    pub fn new(tree: std::sync::Arc<CellTreeRegistry>) -> Self {
        Self { tree }
    }
}

#[async_trait::async_trait]
impl RecursionValidator for DefaultRecursionValidator {
    async fn validate(&self, parent_cell_id: &str, _namespace: &str, parent_recursion: Option<&kais_core::RecursionSpec>, _input: &SpawnInput) -> SpawnDecision {
        let Some(recursion) = parent_recursion else {
            return SpawnDecision { allowed: false, pending: false, reason: Some("parent cell is not permitted to spawn children".to_string()) };
        };

        match recursion.spawn_policy {
            SpawnPolicy::Closed => {
                return SpawnDecision { allowed: false, pending: false, reason: Some("spawn policy is closed".to_string()) };
            }
            SpawnPolicy::RequireApproval => {
                return SpawnDecision { allowed: false, pending: true, reason: Some("spawn requires operator approval".to_string()) };
            }
            SpawnPolicy::Open => {}
        }

        let Some(parent_node) = self.tree.node(parent_cell_id) else {
            return SpawnDecision { allowed: false, pending: false, reason: Some(format!("unknown parent cell {parent_cell_id}")) };
        };

        if parent_node.depth + 1 > recursion.max_depth {
            return SpawnDecision {
                allowed: false,
                pending: false,
                reason: Some(format!("would exceed maxDepth {}", recursion.max_depth)),
            };
        }

        if let Some(max_descendants) = recursion.max_descendants {
            let current = self.tree.descendant_count(&parent_node.root_id);
            if current + 1 > max_descendants {
                return SpawnDecision {
                    allowed: false,
                    pending: false,
                    reason: Some(format!("would exceed maxDescendants {max_descendants}")),
                };
            }
        }

        SpawnDecision { allowed: true, pending: false, reason: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kais_core::RecursionSpec;
    use std::sync::Arc;

    fn input(name: &str) -> SpawnInput {
        SpawnInput {
            name: name.to_string(),
            system_prompt: "help".to_string(),
            model: None,
            provider: None,
            tools: vec![],
            budget: None,
            can_spawn_children: false,
            blueprint_ref: None,
            max_depth: None,
        }
    }

    #[tokio::test]
    async fn closed_policy_rejects() {
        let tree = Arc::new(CellTreeRegistry::new());
        tree.insert_root("root", "default");
        let validator = DefaultRecursionValidator::new(tree);
        let recursion = RecursionSpec { max_depth: 3, max_descendants: None, spawn_policy: SpawnPolicy::Closed };
        let decision = validator.validate("root", "default", Some(&recursion), &input("child")).await;
        assert!(!decision.allowed);
        assert!(!decision.pending);
    }

    #[tokio::test]
    async fn require_approval_policy_is_pending() {
        let tree = Arc::new(CellTreeRegistry::new());
        tree.insert_root("root", "default");
        let validator = DefaultRecursionValidator::new(tree);
        let recursion = RecursionSpec { max_depth: 3, max_descendants: None, spawn_policy: SpawnPolicy::RequireApproval };
        let decision = validator.validate("root", "default", Some(&recursion), &input("child")).await;
        assert!(decision.pending);
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn depth_beyond_max_depth_rejected() {
        let tree = Arc::new(CellTreeRegistry::new());
        tree.insert_root("root", "default");
        tree.insert_child("root", "mid");
        tree.insert_child("mid", "leaf");
        let validator = DefaultRecursionValidator::new(tree);
        let recursion = RecursionSpec { max_depth: 2, max_descendants: None, spawn_policy: SpawnPolicy::Open };
        let decision = validator.validate("leaf", "default", Some(&recursion), &input("too-deep")).await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason.unwrap(), "would exceed maxDepth 2");
    }

    #[tokio::test]
    async fn max_descendants_enforced_across_root() {
        let tree = Arc::new(CellTreeRegistry::new());
        tree.insert_root("root", "default");
        tree.insert_child("root", "a");
        let validator = DefaultRecursionValidator::new(tree);
        let recursion = RecursionSpec { max_depth: 5, max_descendants: Some(1), spawn_policy: SpawnPolicy::Open };
        let decision = validator.validate("root", "default", Some(&recursion), &input("b")).await;
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn open_policy_within_limits_allows() {
        let tree = Arc::new(CellTreeRegistry::new());
        tree.insert_root("root", "default");
        let validator = DefaultRecursionValidator::new(tree);
        let recursion = RecursionSpec { max_depth: 3, max_descendants: Some(10), spawn_policy: SpawnPolicy::Open };
        let decision = validator.validate("root", "default", Some(&recursion), &input("child")).await;
        assert!(decision.allowed);
        assert!(!decision.pending);
    }
}
