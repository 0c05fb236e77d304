//! Topology Generator (§4.7, C12): derives a route table — which concrete
//! cell names each concrete cell name may `send_message` to — from a
//! Formation's declared `topology` and its expanded `cells[] × replicas`
//! name list.
//!
//! Grounded in shape on `agenticlaw_kg::registry::NodeTypeRegistry::children_of`:
//! both resolve "neighbor set for this id" by walking a small declared graph
//! rather than any generic graph library.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use kais_core::{FormationCellDecl, Topology};
use kais_tools::TopologyEnforcer;

/// A cell name's allowed `send_message` targets, keyed by concrete cell name
/// (after `<decl>-<i>` replica expansion). Serializes to the ConfigMap the
/// Formation controller mounts into each Cell pod (§4.5, §4.7).
pub type RouteTable = BTreeMap<String, BTreeSet<String>>;

/// Expands `cells[]` into concrete cell names the way `FormationController`
/// does: every declared cell, regardless of replica count, becomes
/// `<name>-<i>` for `i` in `0..replicas` (§4.5 "Formation scale").
pub fn expand_cell_names(cells: &[FormationCellDecl]) -> Vec<String> {
    let mut names = Vec::new();
    for decl in cells {
        for i in 0..decl.replicas {
            names.push(format!("{}-{}", decl.name, i));
        }
    }
    names
}

/// Concrete names belonging to declared cell `decl_name` — either its own
/// replica set, or (for `route`'s verbatim table and bare references) an
/// exact name match.
fn resolve(decl_name: &str, names: &[String]) -> Vec<String> {
    let prefix = format!("{decl_name}-");
    let mut matches: Vec<String> = names.iter().filter(|n| n.starts_with(&prefix) || *n == decl_name).cloned().collect();
    matches.sort();
    matches
}

/// Builds the route table for `topology` over the formation's expanded
/// concrete cell names (§4.7).
///
/// `hierarchy(root)`'s data model carries only a root name — the flat
/// `cells[]` list has no nested parent/child declaration to descend through.
/// We flatten to two levels: `root`'s replicas become the hub, every other
/// declared cell's replicas become direct children of *every* root replica,
/// and a child's own "direct children" are empty (documented decision, see
/// DESIGN.md).
pub fn generate_routes(cells: &[FormationCellDecl], topology: &Topology) -> RouteTable {
    let names = expand_cell_names(cells);
    let mut table: RouteTable = names.iter().map(|n| (n.clone(), BTreeSet::new())).collect();

    match topology {
        Topology::FullMesh => {
            for a in &names {
                for b in &names {
                    if a != b {
                        table.get_mut(a).unwrap().insert(b.clone());
                    }
                }
            }
        }
        Topology::Star { hub } => {
            let hubs = resolve(hub, &names);
            let spokes: Vec<String> = names.iter().filter(|n| !hubs.contains(n)).cloned().collect();
            for h in &hubs {
                let entry = table.get_mut(h).unwrap();
                for s in &spokes {
                    entry.insert(s.clone());
                }
            }
            for s in &spokes {
                let entry = table.get_mut(s).unwrap();
                for h in &hubs {
                    entry.insert(h.clone());
                }
            }
        }
        Topology::Ring => {
            let mut sorted = names.clone();
            sorted.sort();
            let n = sorted.len();
            for (i, name) in sorted.iter().enumerate() {
                if n > 1 {
                    let next = &sorted[(i + 1) % n];
                    table.get_mut(name).unwrap().insert(next.clone());
                }
            }
        }
        Topology::Hierarchy { root } => {
            let roots = resolve(root, &names);
            let root_set: BTreeSet<&String> = roots.iter().collect();
            let children: Vec<String> = names.iter().filter(|n| !root_set.contains(n)).cloned().collect();
            for r in &roots {
                let entry = table.get_mut(r).unwrap();
                for c in &children {
                    entry.insert(c.clone());
                }
            }
            for c in &children {
                let entry = table.get_mut(c).unwrap();
                for r in &roots {
                    entry.insert(r.clone());
                }
            }
        }
        Topology::Blackboard => {
            // Every cell both reads and writes a shared `blackboard` subject;
            // modelled as full mesh since there is no distinguished hub name
            // in the data model (§3 lists it with no parameters).
            for a in &names {
                for b in &names {
                    if a != b {
                        table.get_mut(a).unwrap().insert(b.clone());
                    }
                }
            }
        }
        Topology::Broadcast { channel } => {
            for name in &names {
                table.get_mut(name).unwrap().insert(channel.clone());
            }
        }
        Topology::Route { table: declared } => {
            for (name, targets) in declared {
                table.insert(name.clone(), targets.iter().cloned().collect());
            }
        }
    }

    table
}

/// Serializes a route table to the ConfigMap `data` map each Cell pod
/// mounts: cell name → JSON array of allowed targets (§4.7).
pub fn to_configmap_data(routes: &RouteTable) -> BTreeMap<String, String> {
    routes
        .iter()
        .map(|(name, targets)| {
            let targets: Vec<&String> = targets.iter().collect();
            (name.clone(), serde_json::to_string(&targets).unwrap_or_else(|_| "[]".to_string()))
        })
        .collect()
}

/// `TopologyEnforcer` backed by a generated `RouteTable`, swappable at
/// runtime when the formation's topology is regenerated (§4.7, §9 Open
/// Questions: "re-render on topology change").
pub struct RouteTableEnforcer {
    routes: RwLock<RouteTable>,
}

impl RouteTableEnforcer {
    pub fn new(routes: RouteTable) -> Self {
        Self { routes: RwLock::new(routes) }
    }

    /// Swaps in a freshly generated route table, e.g. after a formation's
    /// replica count or topology kind changes.
    pub fn update(&self, routes: RouteTable) {
        *self.routes.write().unwrap() = routes;
    }
}

#[async_trait::async_trait]
impl TopologyEnforcer for RouteTableEnforcer {
    async fn allowed_targets(&self, from: &str) -> Vec<String> {
        self.routes.read().unwrap().get(from).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }
}
