//! Envelope, budget ledger, and cell-tree invariants (spec §8).

use kais_core::*;

#[test]
fn envelope_rejects_empty_from_or_to() {
    assert!(Envelope::new("", "b", EnvelopeType::Message, serde_json::json!({})).is_err());
    assert!(Envelope::new("a", "", EnvelopeType::Message, serde_json::json!({})).is_err());
}

#[test]
fn envelope_round_trips_through_json() {
    let e = Envelope::message("researcher", "coder", "hello").unwrap();
    let json = serde_json::to_string(&e).unwrap();
    let back: Envelope = serde_json::from_str(&json).unwrap();
    assert_eq!(e.id, back.id);
    assert_eq!(e.from, back.from);
    assert_eq!(e.to, back.to);
}

#[test]
fn successive_envelopes_have_distinct_ids() {
    let a = Envelope::message("a", "b", "hi").unwrap();
    let b = Envelope::message("a", "b", "hi").unwrap();
    assert_ne!(a.id, b.id);
}

#[test]
fn envelope_type_serializes_snake_case() {
    let e = Envelope::new("a", "b", EnvelopeType::ToolResult, serde_json::json!(null)).unwrap();
    let v = serde_json::to_value(&e).unwrap();
    assert_eq!(v["type"], "tool_result");
}

#[test]
fn budget_available_invariant_holds_after_allocate() {
    let balance = BudgetBalance::new("cell-1", 10.0);
    assert_eq!(balance.available(), 10.0);
}

#[test]
fn budget_available_invariant_holds_after_spend_and_delegate() {
    let mut balance = BudgetBalance::new("cell-1", 10.0);
    balance.spent += 2.0;
    balance.delegated += 3.0;
    assert_eq!(balance.available(), 5.0);
}

#[test]
fn cell_tree_root_is_self_consistent() {
    let root = CellTreeNode::root("researcher", "default");
    assert_eq!(root.depth, 0);
    assert_eq!(root.root_id, "researcher");
    assert!(root.is_consistent());
}

#[test]
fn cell_tree_child_depth_and_root_follow_path() {
    let root = CellTreeNode::root("researcher", "default");
    let child = root.child("researcher-helper");
    assert_eq!(child.path, "researcher/researcher-helper");
    assert_eq!(child.depth, 1);
    assert_eq!(child.root_id, "researcher");
    assert!(child.is_consistent());

    let grandchild = child.child("researcher-helper-sub");
    assert_eq!(grandchild.depth, 2);
    assert_eq!(grandchild.root_id, "researcher");
    assert!(grandchild.is_consistent());
}

#[test]
fn owner_reference_defaults_to_blocking_controller() {
    let owner = OwnerReference::new("Cell", "researcher", "uid-1");
    assert!(owner.controller);
    assert!(owner.block_owner_deletion);
    assert_eq!(owner.api_version, "kais.io/v1");
}
