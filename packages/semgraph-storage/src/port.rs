//! The graph store port, `spec.md` §4.3.
//!
//! Grounded on the `#[async_trait] pub trait CodeSnapshotStore: Send + Sync`
//! shape of the storage port this crate follows, rewritten against a
//! property-graph contract instead of a chunk store. The contract is
//! database-agnostic; `infrastructure::sqlite` is the one concrete backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use semgraph_ir::{Edge, EdgeKind, Node};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

#[derive(Debug, Clone, Default)]
pub struct GraphStatistics {
    pub nodes_by_label: BTreeMap<String, usize>,
    pub total_edges: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Subgraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// The result of one `propagate_changed_flag()` fixpoint run, `spec.md` §5.
#[derive(Debug, Clone, Default)]
pub struct PropagationResult {
    pub newly_marked: Vec<String>,
    pub iterations: usize,
}

/// The minimal transactional operations the builder and validator need
/// against a labeled property multigraph, `spec.md` §4.3.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Idempotent creation of uniqueness constraints on `(label, id)` and
    /// secondary indexes on `name`, `qualified_name`, `path`, `changed`.
    async fn initialize_schema(&self) -> Result<()>;

    /// MERGE on id, SET all other properties. `node.id` must be non-empty.
    async fn upsert_node(&self, node: &Node) -> Result<()>;

    /// MATCH both endpoints, MERGE edge, SET properties. Missing endpoints
    /// are skipped with a warning, not an error.
    async fn upsert_edge(&self, edge: &Edge) -> Result<()>;

    /// MATCH nodes whose `location` starts with `path` and DETACH DELETE.
    /// Returns the deletion count. External Module placeholders are exempt.
    async fn delete_nodes_by_location_prefix(&self, path: &str) -> Result<usize>;

    async fn clear_all(&self) -> Result<()>;

    async fn statistics(&self) -> Result<GraphStatistics>;

    async fn all_nodes(&self, limit: usize) -> Result<Vec<Node>>;

    async fn all_edges(&self, limit: usize) -> Result<Vec<Edge>>;

    async fn node_by_id(&self, id: &str) -> Result<Option<Node>>;

    /// Edges incident to `id`, optionally restricted to an allow-list of
    /// edge kinds so callers can express multi-hop paths like
    /// `HAS_CALLSITE+RESOLVES_TO` as a parameterized traversal.
    async fn node_edges(&self, id: &str, kinds: Option<&[EdgeKind]>, direction: Direction) -> Result<Vec<Edge>>;

    async fn node_neighborhood(&self, id: &str, depth: usize) -> Result<Subgraph>;

    async fn function_subgraph(&self, id: &str, depth: usize) -> Result<Subgraph>;

    async fn search(&self, pattern: &str, label: Option<&str>, limit: usize) -> Result<Vec<Node>>;

    /// Name-to-id lookup with the tie-break order fixed by `spec.md` §4.3:
    /// exact qualified match > qualified-suffix match > simple-name match,
    /// ties broken by shortest `qualified_name`.
    async fn resolve_function_id(&self, callee_name: &str) -> Result<Option<String>>;

    async fn mark_nodes_changed(&self, ids: &[String]) -> Result<usize>;

    async fn mark_file_nodes_changed(&self, path: &str) -> Result<usize>;

    async fn get_changed_ids(&self) -> Result<Vec<String>>;

    async fn clear_changed_flags(&self) -> Result<usize>;

    /// Iterate the seven propagation rules of `spec.md` §5 until no new
    /// node is marked, bounded by a 10-iteration safety cap.
    async fn propagate_changed_flag(&self) -> Result<PropagationResult>;
}
