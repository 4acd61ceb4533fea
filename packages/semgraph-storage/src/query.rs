//! The read-only query façade, `spec.md` §4.5: a thin layer over
//! `GraphStore` that expresses multi-hop questions ("who calls this",
//! "what would change if I touched this") without leaking SQL or the
//! property-graph shape to callers.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use semgraph_ir::{EdgeKind, Node};

use crate::error::Result;
use crate::port::{Direction, GraphStore};

#[derive(Debug, Clone)]
pub struct FunctionDependency {
    pub function_id: String,
    pub distance: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ImpactAnalysis {
    pub root_id: String,
    pub affected_ids: Vec<String>,
    /// How many affected ids were reached through each relationship type,
    /// per `SPEC_FULL.md` §10's supplemented breakdown of `spec.md` §4.5's
    /// impact analysis. Only populated for `ChangeType::Delete`.
    pub cascade: HashMap<EdgeKind, usize>,
}

/// The kind of change `get_impact_analysis` is asked to assess, `spec.md`
/// §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Body/signature edit: the full downstream propagation light-cone is
    /// affected, same set `propagate_changed_flag` would mark.
    Modify,
    /// Entity removal: same downstream light-cone as `Modify`, plus the
    /// per-relationship-type cascade breakdown of what goes dangling.
    Delete,
    /// Name change only: just the entities holding a direct reference to
    /// this one need their reference updated, not the transitive closure.
    Rename,
}

#[derive(Debug, Clone)]
pub struct DiamondInheritance {
    pub class_id: String,
    pub base_a: String,
    pub base_b: String,
    pub common_ancestors: Vec<String>,
}

pub async fn find_function(store: &dyn GraphStore, name: &str) -> Result<Vec<Node>> {
    store.search(name, Some("Function"), 50).await
}

pub async fn search_by_pattern(store: &dyn GraphStore, pattern: &str, label: Option<&str>) -> Result<Vec<Node>> {
    store.search(pattern, label, 100).await
}

/// Functions with a `CALLS` edge landing on `function_id`.
pub async fn find_callers(store: &dyn GraphStore, function_id: &str) -> Result<Vec<Node>> {
    let edges = store.node_edges(function_id, Some(&[EdgeKind::Calls]), Direction::Incoming).await?;
    let mut out = Vec::new();
    for edge in edges {
        // CALLS is CallSite -> Function; the caller is the CallSite's
        // owning Function, reached via the incoming HAS_CALLSITE edge.
        let owners = store
            .node_edges(&edge.from_id, Some(&[EdgeKind::HasCallsite]), Direction::Incoming)
            .await?;
        for owner_edge in owners {
            if let Some(node) = store.node_by_id(&owner_edge.from_id).await? {
                out.push(node);
            }
        }
    }
    dedup_by_id(out)
}

/// Functions `function_id`'s call sites `RESOLVES_TO`.
pub async fn find_callees(store: &dyn GraphStore, function_id: &str) -> Result<Vec<Node>> {
    let call_sites = store.node_edges(function_id, Some(&[EdgeKind::HasCallsite]), Direction::Outgoing).await?;
    let mut out = Vec::new();
    for cs_edge in call_sites {
        let resolves = store.node_edges(&cs_edge.to_id, Some(&[EdgeKind::ResolvesTo]), Direction::Outgoing).await?;
        for r in resolves {
            if let Some(node) = store.node_by_id(&r.to_id).await? {
                out.push(node);
            }
        }
    }
    dedup_by_id(out)
}

pub async fn get_function_signature(store: &dyn GraphStore, function_id: &str) -> Result<Option<String>> {
    use semgraph_ir::NodeKind;
    Ok(store.node_by_id(function_id).await?.and_then(|n| match n.kind {
        NodeKind::Function(f) => Some(f.signature),
        _ => None,
    }))
}

/// Transitive callees up to `max_depth` logical hops, where one logical
/// hop is `HAS_CALLSITE` + `RESOLVES_TO` and `distance` counts only the
/// `RESOLVES_TO` leg (Open Question 1 of `DESIGN.md`).
pub async fn get_function_dependencies(
    store: &dyn GraphStore,
    function_id: &str,
    max_depth: usize,
) -> Result<Vec<FunctionDependency>> {
    let mut visited = HashSet::new();
    visited.insert(function_id.to_string());
    let mut frontier = vec![function_id.to_string()];
    let mut out = Vec::new();

    for distance in 1..=max_depth {
        if frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for id in &frontier {
            for callee in find_callees(store, id).await? {
                if visited.insert(callee.id.clone()) {
                    out.push(FunctionDependency { function_id: callee.id.clone(), distance });
                    next.push(callee.id);
                }
            }
        }
        frontier = next;
    }
    Ok(out)
}

/// Entities with no incident edge in either direction. `Parameter` and
/// `Type` are intrinsically dependent on their owner and are excluded.
pub async fn find_orphaned_nodes(store: &dyn GraphStore) -> Result<Vec<Node>> {
    let nodes = store.all_nodes(usize::MAX).await?;
    let mut out = Vec::new();
    for node in nodes {
        if matches!(node.label(), "Parameter" | "Type") {
            continue;
        }
        let edges = store.node_edges(&node.id, None, Direction::Both).await?;
        if edges.is_empty() {
            out.push(node);
        }
    }
    Ok(out)
}

/// Strongly-connected components of size > 1 in the `CALLS` graph among
/// `Function` nodes, plus functions that call themselves directly.
pub async fn find_circular_dependencies(store: &dyn GraphStore) -> Result<Vec<Vec<String>>> {
    find_cycles_over(store, EdgeKind::Calls, true).await
}

/// Strongly-connected components of size > 1 in the `INHERITS` graph
/// among `Class` nodes.
pub async fn find_circular_inheritance(store: &dyn GraphStore) -> Result<Vec<Vec<String>>> {
    find_cycles_over(store, EdgeKind::Inherits, false).await
}

async fn find_cycles_over(store: &dyn GraphStore, kind: EdgeKind, via_call_site: bool) -> Result<Vec<Vec<String>>> {
    let edges = store.all_edges(usize::MAX).await?;
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    if via_call_site {
        // CALLS is CallSite -> Function; collapse through the CallSite's
        // owning Function to get a Function -> Function call graph.
        let has_callsite: Vec<_> = edges.iter().filter(|e| e.kind == EdgeKind::HasCallsite).collect();
        let owner_of: HashMap<&str, &str> = has_callsite.iter().map(|e| (e.to_id.as_str(), e.from_id.as_str())).collect();
        for edge in edges.iter().filter(|e| e.kind == kind) {
            if let Some(&owner) = owner_of.get(edge.from_id.as_str()) {
                graph.add_edge(owner, &edge.to_id, ());
            }
        }
    } else {
        for edge in edges.iter().filter(|e| e.kind == kind) {
            graph.add_edge(&edge.from_id, &edge.to_id, ());
        }
    }

    let sccs = tarjan_scc(&graph);
    Ok(sccs
        .into_iter()
        .filter(|scc| scc.len() > 1 || scc.iter().any(|&n| graph.contains_edge(n, n)))
        .map(|scc| scc.into_iter().map(|s| s.to_string()).collect())
        .collect())
}

/// Classes with two or more direct bases whose ancestor chains converge
/// on a common class.
pub async fn find_diamond_inheritance(store: &dyn GraphStore) -> Result<Vec<DiamondInheritance>> {
    let edges = store.all_edges(usize::MAX).await?;
    let inherits: Vec<_> = edges.iter().filter(|e| e.kind == EdgeKind::Inherits).collect();

    let mut direct_bases: HashMap<&str, Vec<&str>> = HashMap::new();
    for e in &inherits {
        direct_bases.entry(e.from_id.as_str()).or_default().push(e.to_id.as_str());
    }

    let mut out = Vec::new();
    for (class_id, bases) in &direct_bases {
        if bases.len() < 2 {
            continue;
        }
        let ancestor_sets: Vec<(&str, HashSet<String>)> =
            bases.iter().map(|b| (*b, ancestors_of(&inherits, b))).collect();

        for i in 0..ancestor_sets.len() {
            for j in (i + 1)..ancestor_sets.len() {
                let (base_a, set_a) = &ancestor_sets[i];
                let (base_b, set_b) = &ancestor_sets[j];
                let common: Vec<String> = set_a.intersection(set_b).cloned().collect();
                if !common.is_empty() {
                    out.push(DiamondInheritance {
                        class_id: class_id.to_string(),
                        base_a: base_a.to_string(),
                        base_b: base_b.to_string(),
                        common_ancestors: common,
                    });
                }
            }
        }
    }
    Ok(out)
}

fn ancestors_of(inherits: &[&semgraph_ir::Edge], start: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    seen.insert(start.to_string());
    let mut queue = VecDeque::from([start.to_string()]);
    while let Some(id) = queue.pop_front() {
        for e in inherits.iter().filter(|e| e.from_id == id) {
            if seen.insert(e.to_id.clone()) {
                queue.push_back(e.to_id.clone());
            }
        }
    }
    seen
}

/// A non-mutating replay of the `propagate_changed_flag` rules of
/// `spec.md` §5, starting from `entity_id` as if it alone were changed,
/// without touching the store's persisted `changed` column. `change_type`
/// selects how far the impact is assumed to travel: `Rename` stops at
/// direct references, `Modify`/`Delete` follow the full light-cone, and
/// only `Delete` reports the per-edge-kind `cascade` breakdown.
pub async fn get_impact_analysis(
    store: &dyn GraphStore,
    entity_id: &str,
    change_type: ChangeType,
) -> Result<ImpactAnalysis> {
    if change_type == ChangeType::Rename {
        let mut affected = HashSet::new();
        for (_, neighbor) in downstream_of(store, entity_id).await? {
            affected.insert(neighbor);
        }
        return Ok(ImpactAnalysis {
            root_id: entity_id.to_string(),
            affected_ids: affected.into_iter().collect(),
            cascade: HashMap::new(),
        });
    }

    let mut affected = HashSet::new();
    affected.insert(entity_id.to_string());
    let mut cascade: HashMap<EdgeKind, usize> = HashMap::new();
    let mut frontier = vec![entity_id.to_string()];

    for _ in 0..10 {
        if frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for id in &frontier {
            for (kind, neighbor) in downstream_of(store, id).await? {
                if affected.insert(neighbor.clone()) {
                    if change_type == ChangeType::Delete {
                        *cascade.entry(kind).or_insert(0) += 1;
                    }
                    next.push(neighbor);
                }
            }
        }
        frontier = next;
    }

    affected.remove(entity_id);
    Ok(ImpactAnalysis {
        root_id: entity_id.to_string(),
        affected_ids: affected.into_iter().collect(),
        cascade,
    })
}

/// One step of the seven propagation rules, evaluated from `id` outward
/// as the "changed" source, mirroring `SqliteGraphStore::propagate_changed_flag`.
async fn downstream_of(store: &dyn GraphStore, id: &str) -> Result<Vec<(EdgeKind, String)>> {
    let mut out = Vec::new();

    // A: this is a Function; its CallSites that RESOLVES_TO it become changed.
    for e in store.node_edges(id, Some(&[EdgeKind::ResolvesTo]), Direction::Incoming).await? {
        out.push((EdgeKind::ResolvesTo, e.from_id));
    }
    // B: this is a CallSite; its owning Function becomes changed.
    for e in store.node_edges(id, Some(&[EdgeKind::HasCallsite]), Direction::Incoming).await? {
        out.push((EdgeKind::HasCallsite, e.from_id));
    }
    // C: this is a base Class; subclasses that INHERITS it become changed.
    for e in store.node_edges(id, Some(&[EdgeKind::Inherits]), Direction::Incoming).await? {
        out.push((EdgeKind::Inherits, e.from_id));
    }
    // D/G: this is a Class or Module; entities it DECLARES become changed.
    for e in store.node_edges(id, Some(&[EdgeKind::Declares]), Direction::Outgoing).await? {
        out.push((EdgeKind::Declares, e.to_id));
    }
    // E: this is a Function; its Parameters become changed.
    for e in store.node_edges(id, Some(&[EdgeKind::HasParameter]), Direction::Outgoing).await? {
        out.push((EdgeKind::HasParameter, e.to_id));
    }
    // F: this is a Module; importers that IMPORTS it become changed.
    for e in store.node_edges(id, Some(&[EdgeKind::Imports]), Direction::Incoming).await? {
        out.push((EdgeKind::Imports, e.from_id));
    }

    Ok(out)
}

fn dedup_by_id(mut nodes: Vec<Node>) -> Result<Vec<Node>> {
    let mut seen = HashSet::new();
    nodes.retain(|n| seen.insert(n.id.clone()));
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::SqliteGraphStore;
    use semgraph_ir::{ClassNode, Edge, Node, NodeKind, Visibility};

    fn class_node(id: &str, name: &str, bases: Vec<String>) -> Node {
        Node::new(
            id,
            name,
            NodeKind::Class(ClassNode {
                qualified_name: name.to_string(),
                bases,
                visibility: Visibility::Public,
                decorators: vec![],
            }),
        )
    }

    #[tokio::test]
    async fn test_find_circular_inheritance_detects_cycle() {
        let store = SqliteGraphStore::new_in_memory().unwrap();
        store.initialize_schema().await.unwrap();
        store.upsert_node(&class_node("a", "A", vec!["B".into()])).await.unwrap();
        store.upsert_node(&class_node("b", "B", vec!["A".into()])).await.unwrap();
        store.upsert_edge(&Edge::new("a", "b", EdgeKind::Inherits)).await.unwrap();
        store.upsert_edge(&Edge::new("b", "a", EdgeKind::Inherits)).await.unwrap();

        let cycles = find_circular_inheritance(&store).await.unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 2);
    }

    #[tokio::test]
    async fn test_find_diamond_inheritance() {
        let store = SqliteGraphStore::new_in_memory().unwrap();
        store.initialize_schema().await.unwrap();
        store.upsert_node(&class_node("base", "Base", vec![])).await.unwrap();
        store.upsert_node(&class_node("left", "Left", vec!["Base".into()])).await.unwrap();
        store.upsert_node(&class_node("right", "Right", vec!["Base".into()])).await.unwrap();
        store
            .upsert_node(&class_node("diamond", "Diamond", vec!["Left".into(), "Right".into()]))
            .await
            .unwrap();
        store.upsert_edge(&Edge::new("left", "base", EdgeKind::Inherits)).await.unwrap();
        store.upsert_edge(&Edge::new("right", "base", EdgeKind::Inherits)).await.unwrap();
        store.upsert_edge(&Edge::new("diamond", "left", EdgeKind::Inherits)).await.unwrap();
        store.upsert_edge(&Edge::new("diamond", "right", EdgeKind::Inherits)).await.unwrap();

        let diamonds = find_diamond_inheritance(&store).await.unwrap();
        assert_eq!(diamonds.len(), 1);
        assert!(diamonds[0].common_ancestors.contains(&"base".to_string()));
    }

    #[tokio::test]
    async fn test_find_orphaned_nodes_excludes_parameter() {
        let store = SqliteGraphStore::new_in_memory().unwrap();
        store.initialize_schema().await.unwrap();
        store.upsert_node(&class_node("lonely", "Lonely", vec![])).await.unwrap();
        let orphans = find_orphaned_nodes(&store).await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, "lonely");
    }

    #[tokio::test]
    async fn test_get_impact_analysis_delete_reports_cascade_but_modify_and_rename_dont() {
        let store = SqliteGraphStore::new_in_memory().unwrap();
        store.initialize_schema().await.unwrap();
        store.upsert_node(&class_node("base", "Base", vec![])).await.unwrap();
        store.upsert_node(&class_node("sub", "Sub", vec!["Base".into()])).await.unwrap();
        store.upsert_edge(&Edge::new("sub", "base", EdgeKind::Inherits)).await.unwrap();

        let delete = get_impact_analysis(&store, "base", ChangeType::Delete).await.unwrap();
        assert!(delete.affected_ids.contains(&"sub".to_string()));
        assert!(!delete.cascade.is_empty());

        let modify = get_impact_analysis(&store, "base", ChangeType::Modify).await.unwrap();
        assert!(modify.affected_ids.contains(&"sub".to_string()));
        assert!(modify.cascade.is_empty());

        let rename = get_impact_analysis(&store, "base", ChangeType::Rename).await.unwrap();
        assert!(rename.affected_ids.contains(&"sub".to_string()));
        assert!(rename.cascade.is_empty());
    }
}
