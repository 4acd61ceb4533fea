//! The concrete `rusqlite`-backed `GraphStore` implementation.
//!
//! The teacher's own `infrastructure/sqlite/mod.rs` is a `todo!()`
//! placeholder (`SqliteSnapshotStore::new_in_memory` never implemented),
//! so this is authored fresh, grounded on general `rusqlite` usage
//! elsewhere in the workspace this follows (parameterized queries,
//! `Result` propagation via `From<rusqlite::Error>`).

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection};
use semgraph_ir::{Edge, EdgeKind, Node};
use tokio::sync::Mutex;

use crate::error::{Result, StorageError};
use crate::port::{Direction, GraphStatistics, GraphStore, PropagationResult, Subgraph};

const MAX_PROPAGATION_ITERATIONS: usize = 10;

pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_file(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn qualified_name_of(node: &Node) -> Option<String> {
        use semgraph_ir::NodeKind;
        match &node.kind {
            NodeKind::Module(m) => Some(m.qualified_name.clone()),
            NodeKind::Class(c) => Some(c.qualified_name.clone()),
            NodeKind::Function(f) => Some(f.qualified_name.clone()),
            _ => None,
        }
    }

    fn is_external(node: &Node) -> bool {
        use semgraph_ir::NodeKind;
        matches!(&node.kind, NodeKind::Module(m) if m.is_external)
    }

    fn row_to_node(json: String) -> Result<Node> {
        serde_json::from_str(&json).map_err(StorageError::from)
    }

    fn row_to_edge(from_id: String, to_id: String, kind: String, props_json: String) -> Result<Edge> {
        let kind = EdgeKind::from_str(&kind).ok_or_else(|| StorageError::database(format!("unknown edge kind: {kind}")))?;
        let properties = serde_json::from_str(&props_json)?;
        Ok(Edge { from_id, to_id, kind, properties })
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                name TEXT NOT NULL,
                qualified_name TEXT,
                location TEXT,
                is_external INTEGER NOT NULL DEFAULT 0,
                changed INTEGER NOT NULL DEFAULT 0,
                node_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes(name);
            CREATE INDEX IF NOT EXISTS idx_nodes_qname ON nodes(qualified_name);
            CREATE INDEX IF NOT EXISTS idx_nodes_location ON nodes(location);
            CREATE INDEX IF NOT EXISTS idx_nodes_changed ON nodes(changed);
            CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(label);

            CREATE TABLE IF NOT EXISTS edges (
                from_id TEXT NOT NULL,
                to_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                PRIMARY KEY (from_id, to_id, kind)
            );
            CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_id, kind);
            CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_id, kind);",
        )?;
        Ok(())
    }

    async fn upsert_node(&self, node: &Node) -> Result<()> {
        if node.id.is_empty() {
            return Err(StorageError::database("upsert_node: missing id"));
        }
        let conn = self.conn.lock().await;
        let qualified_name = Self::qualified_name_of(node);
        let is_external = Self::is_external(node);
        let node_json = serde_json::to_string(node)?;
        conn.execute(
            "INSERT INTO nodes (id, label, name, qualified_name, location, is_external, node_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                label = excluded.label,
                name = excluded.name,
                qualified_name = excluded.qualified_name,
                location = excluded.location,
                is_external = excluded.is_external,
                node_json = excluded.node_json",
            params![
                node.id,
                node.label(),
                node.name,
                qualified_name,
                node.location,
                is_external as i64,
                node_json
            ],
        )?;
        Ok(())
    }

    async fn upsert_edge(&self, edge: &Edge) -> Result<()> {
        let conn = self.conn.lock().await;
        let from_exists: bool = conn
            .query_row("SELECT 1 FROM nodes WHERE id = ?1", params![edge.from_id], |_| Ok(()))
            .is_ok();
        let to_exists: bool = conn
            .query_row("SELECT 1 FROM nodes WHERE id = ?1", params![edge.to_id], |_| Ok(()))
            .is_ok();
        if !from_exists || !to_exists {
            tracing::warn!(
                from = %edge.from_id,
                to = %edge.to_id,
                kind = edge.kind.as_str(),
                "upsert_edge: missing endpoint, skipping"
            );
            return Ok(());
        }
        let props_json = serde_json::to_string(&edge.properties)?;
        conn.execute(
            "INSERT INTO edges (from_id, to_id, kind, properties_json) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(from_id, to_id, kind) DO UPDATE SET properties_json = excluded.properties_json",
            params![edge.from_id, edge.to_id, edge.kind.as_str(), props_json],
        )?;
        Ok(())
    }

    async fn delete_nodes_by_location_prefix(&self, path: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id FROM nodes WHERE is_external = 0 AND location IS NOT NULL AND substr(location, 1, length(?1)) = ?1",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![path], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<_>>()?;
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        conn.execute(
            &format!("DELETE FROM edges WHERE from_id IN ({placeholders}) OR to_id IN ({placeholders})"),
            params_from_iter(ids.iter().chain(ids.iter())),
        )?;
        conn.execute(
            &format!("DELETE FROM nodes WHERE id IN ({placeholders})"),
            params_from_iter(ids.iter()),
        )?;
        Ok(ids.len())
    }

    async fn clear_all(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("DELETE FROM edges; DELETE FROM nodes;")?;
        Ok(())
    }

    async fn statistics(&self) -> Result<GraphStatistics> {
        let conn = self.conn.lock().await;
        let mut nodes_by_label = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT label, COUNT(*) FROM nodes GROUP BY label")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?;
        for row in rows {
            let (label, count) = row?;
            nodes_by_label.insert(label, count);
        }
        let total_edges: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(GraphStatistics { nodes_by_label, total_edges: total_edges as usize })
    }

    async fn all_nodes(&self, limit: usize) -> Result<Vec<Node>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT node_json FROM nodes LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        rows.map(|r| Self::row_to_node(r?)).collect()
    }

    async fn all_edges(&self, limit: usize) -> Result<Vec<Edge>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT from_id, to_id, kind, properties_json FROM edges LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        rows.map(|r| {
            let (from_id, to_id, kind, props) = r?;
            Self::row_to_edge(from_id, to_id, kind, props)
        })
        .collect()
    }

    async fn node_by_id(&self, id: &str) -> Result<Option<Node>> {
        let conn = self.conn.lock().await;
        let json: Option<String> = conn
            .query_row("SELECT node_json FROM nodes WHERE id = ?1", params![id], |row| row.get(0))
            .ok();
        json.map(Self::row_to_node).transpose()
    }

    async fn node_edges(&self, id: &str, kinds: Option<&[EdgeKind]>, direction: Direction) -> Result<Vec<Edge>> {
        let conn = self.conn.lock().await;
        let kind_filter: Option<Vec<&'static str>> = kinds.map(|ks| ks.iter().map(|k| k.as_str()).collect());

        let mut out = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            out.extend(Self::query_edges_one_side(&conn, "from_id", id, kind_filter.as_deref())?);
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            out.extend(Self::query_edges_one_side(&conn, "to_id", id, kind_filter.as_deref())?);
        }
        Ok(out)
    }

    async fn node_neighborhood(&self, id: &str, depth: usize) -> Result<Subgraph> {
        self.bfs_subgraph(id, depth, Direction::Both, None).await
    }

    async fn function_subgraph(&self, id: &str, depth: usize) -> Result<Subgraph> {
        self.bfs_subgraph(
            id,
            depth,
            Direction::Both,
            Some(&[EdgeKind::HasCallsite, EdgeKind::ResolvesTo, EdgeKind::Calls]),
        )
        .await
    }

    async fn search(&self, pattern: &str, label: Option<&str>, limit: usize) -> Result<Vec<Node>> {
        let conn = self.conn.lock().await;
        let needle = format!("%{}%", pattern.to_lowercase());
        let sql = match label {
            Some(_) => {
                "SELECT node_json FROM nodes WHERE label = ?2
                 AND (lower(name) LIKE ?1 OR lower(qualified_name) LIKE ?1) LIMIT ?3"
            }
            None => {
                "SELECT node_json FROM nodes WHERE lower(name) LIKE ?1 OR lower(qualified_name) LIKE ?1 LIMIT ?3"
            }
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = match label {
            Some(l) => stmt
                .query_map(params![needle, l, limit as i64], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map(params![needle, limit as i64], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        rows.into_iter().map(Self::row_to_node).collect()
    }

    async fn resolve_function_id(&self, callee_name: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        // (a) exact qualified equality
        if let Some(id) = conn
            .query_row(
                "SELECT id FROM nodes WHERE label = 'Function' AND qualified_name = ?1
                 ORDER BY length(qualified_name) ASC LIMIT 1",
                params![callee_name],
                |row| row.get::<_, String>(0),
            )
            .ok()
        {
            return Ok(Some(id));
        }
        // (b) qualified-suffix equality (dot-boundary)
        let suffix_pattern = format!("%.{callee_name}");
        if let Some(id) = conn
            .query_row(
                "SELECT id FROM nodes WHERE label = 'Function' AND qualified_name LIKE ?1
                 ORDER BY length(qualified_name) ASC LIMIT 1",
                params![suffix_pattern],
                |row| row.get::<_, String>(0),
            )
            .ok()
        {
            return Ok(Some(id));
        }
        // (c) simple-name equality
        if let Some(id) = conn
            .query_row(
                "SELECT id FROM nodes WHERE label = 'Function' AND name = ?1
                 ORDER BY length(qualified_name) ASC LIMIT 1",
                params![callee_name],
                |row| row.get::<_, String>(0),
            )
            .ok()
        {
            return Ok(Some(id));
        }
        Ok(None)
    }

    async fn mark_nodes_changed(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().await;
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let changed = conn.execute(
            &format!("UPDATE nodes SET changed = 1 WHERE changed = 0 AND id IN ({placeholders})"),
            params_from_iter(ids.iter()),
        )?;
        Ok(changed)
    }

    async fn mark_file_nodes_changed(&self, path: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE nodes SET changed = 1 WHERE changed = 0 AND location IS NOT NULL
             AND substr(location, 1, length(?1)) = ?1",
            params![path],
        )?;
        Ok(changed)
    }

    async fn get_changed_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id FROM nodes WHERE changed = 1")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    async fn clear_changed_flags(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let changed = conn.execute("UPDATE nodes SET changed = 0 WHERE changed = 1", [])?;
        Ok(changed)
    }

    async fn propagate_changed_flag(&self) -> Result<PropagationResult> {
        let conn = self.conn.lock().await;
        let mut all_marked = Vec::new();
        let mut iterations = 0usize;

        while iterations < MAX_PROPAGATION_ITERATIONS {
            iterations += 1;
            let mut candidates: HashSet<String> = HashSet::new();

            for sql in PROPAGATION_RULE_QUERIES {
                let mut stmt = conn.prepare(sql)?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                for row in rows {
                    candidates.insert(row?);
                }
            }

            // Only ids that aren't already changed constitute genuinely
            // new marks; this keeps propagation monotone and the iteration
            // count meaningful.
            let mut stmt = conn.prepare("SELECT id FROM nodes WHERE changed = 1")?;
            let already: HashSet<String> = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<_>>()?;
            let fresh: Vec<String> = candidates.into_iter().filter(|id| !already.contains(id)).collect();

            if fresh.is_empty() {
                iterations -= 1;
                break;
            }

            let placeholders = fresh.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            conn.execute(
                &format!("UPDATE nodes SET changed = 1 WHERE id IN ({placeholders})"),
                params_from_iter(fresh.iter()),
            )?;
            all_marked.extend(fresh);
        }

        Ok(PropagationResult { newly_marked: all_marked, iterations })
    }
}

/// The seven propagation rules of `spec.md` §5, each as a query selecting
/// the ids that should become changed given the *current* `changed` state
/// (evaluated once per iteration, before any of that iteration's updates
/// are applied, so the result doesn't depend on rule evaluation order).
const PROPAGATION_RULE_QUERIES: &[&str] = &[
    // A: CallSite whose RESOLVES_TO target is changed.
    "SELECT e.from_id FROM edges e JOIN nodes n ON e.to_id = n.id
     WHERE e.kind = 'RESOLVES_TO' AND n.changed = 1",
    // B: Function whose CallSite is changed.
    "SELECT e.from_id FROM edges e JOIN nodes n ON e.to_id = n.id
     WHERE e.kind = 'HAS_CALLSITE' AND n.changed = 1",
    // C: Class that INHERITS from a changed Class.
    "SELECT e.from_id FROM edges e JOIN nodes n ON e.to_id = n.id
     WHERE e.kind = 'INHERITS' AND n.changed = 1",
    // D: Function DECLARES'd by a changed Class.
    "SELECT e.to_id FROM edges e JOIN nodes nf ON e.from_id = nf.id JOIN nodes nt ON e.to_id = nt.id
     WHERE e.kind = 'DECLARES' AND nf.changed = 1 AND nf.label = 'Class' AND nt.label = 'Function'",
    // E: Parameter of a changed Function.
    "SELECT e.to_id FROM edges e JOIN nodes n ON e.from_id = n.id
     WHERE e.kind = 'HAS_PARAMETER' AND n.changed = 1",
    // F: Module that IMPORTS a changed Module.
    "SELECT e.from_id FROM edges e JOIN nodes n ON e.to_id = n.id
     WHERE e.kind = 'IMPORTS' AND n.changed = 1",
    // G: Any entity DECLARES'd by a changed Module.
    "SELECT e.to_id FROM edges e JOIN nodes n ON e.from_id = n.id
     WHERE e.kind = 'DECLARES' AND n.changed = 1 AND n.label = 'Module'",
];

impl SqliteGraphStore {
    fn query_edges_one_side(
        conn: &Connection,
        column: &str,
        id: &str,
        kinds: Option<&[&'static str]>,
    ) -> Result<Vec<Edge>> {
        let sql = match kinds {
            Some(ks) if !ks.is_empty() => {
                let placeholders = ks.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                format!(
                    "SELECT from_id, to_id, kind, properties_json FROM edges WHERE {column} = ? AND kind IN ({placeholders})"
                )
            }
            _ => format!("SELECT from_id, to_id, kind, properties_json FROM edges WHERE {column} = ?"),
        };
        let mut stmt = conn.prepare(&sql)?;
        let mut bound: Vec<&str> = vec![id];
        if let Some(ks) = kinds {
            if !ks.is_empty() {
                bound.extend(ks.iter().copied());
            }
        }
        let rows = stmt.query_map(params_from_iter(bound.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        rows.map(|r| {
            let (from_id, to_id, kind, props) = r?;
            Self::row_to_edge(from_id, to_id, kind, props)
        })
        .collect()
    }

    async fn bfs_subgraph(
        &self,
        start: &str,
        depth: usize,
        direction: Direction,
        kind_filter: Option<&[EdgeKind]>,
    ) -> Result<Subgraph> {
        let mut visited = HashSet::new();
        visited.insert(start.to_string());
        let mut frontier = vec![start.to_string()];
        let mut edges = Vec::new();
        let mut nodes = Vec::new();

        if let Some(n) = self.node_by_id(start).await? {
            nodes.push(n);
        }

        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let mut next_frontier = Vec::new();
            for id in &frontier {
                let incident = self.node_edges(id, kind_filter, direction).await?;
                for edge in incident {
                    let other = if edge.from_id == *id { edge.to_id.clone() } else { edge.from_id.clone() };
                    edges.push(edge);
                    if visited.insert(other.clone()) {
                        if let Some(n) = self.node_by_id(&other).await? {
                            nodes.push(n);
                        }
                        next_frontier.push(other);
                    }
                }
            }
            frontier = next_frontier;
        }

        edges.sort_by(|a, b| (&a.from_id, &a.to_id, a.kind.as_str()).cmp(&(&b.from_id, &b.to_id, b.kind.as_str())));
        edges.dedup_by(|a, b| a.from_id == b.from_id && a.to_id == b.to_id && a.kind == b.kind);

        Ok(Subgraph { nodes, edges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semgraph_ir::{FunctionNode, NodeKind, Visibility};

    fn function_node(id: &str, qualified_name: &str) -> Node {
        Node::new(
            id,
            qualified_name.rsplit('.').next().unwrap(),
            NodeKind::Function(FunctionNode {
                qualified_name: qualified_name.to_string(),
                signature: format!("{qualified_name}()"),
                return_type: None,
                visibility: Visibility::Public,
                is_async: false,
                is_generator: false,
                is_staticmethod: false,
                is_classmethod: false,
                is_property: false,
                decorators: vec![],
            }),
        )
        .with_location(format!("/repo/a.py:{}:0", id.len()))
    }

    #[tokio::test]
    async fn test_upsert_and_fetch_node() {
        let store = SqliteGraphStore::new_in_memory().unwrap();
        store.initialize_schema().await.unwrap();
        let node = function_node("f1", "pkg.f");
        store.upsert_node(&node).await.unwrap();
        let fetched = store.node_by_id("f1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "f1");
    }

    #[tokio::test]
    async fn test_delete_by_location_prefix_idempotent_p6() {
        let store = SqliteGraphStore::new_in_memory().unwrap();
        store.initialize_schema().await.unwrap();
        let node = function_node("f1", "pkg.f").with_location("/repo/a.py:1:0");
        store.upsert_node(&node).await.unwrap();
        let deleted = store.delete_nodes_by_location_prefix("/repo/a.py").await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.node_by_id("f1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_function_id_tie_break_order() {
        let store = SqliteGraphStore::new_in_memory().unwrap();
        store.initialize_schema().await.unwrap();
        store.upsert_node(&function_node("f1", "pkg.sub.greet")).await.unwrap();
        store.upsert_node(&function_node("f2", "other.greet")).await.unwrap();
        // No exact match for "greet" alone, but two qualified-suffix
        // matches; shortest qualified_name wins.
        let resolved = store.resolve_function_id("greet").await.unwrap();
        assert_eq!(resolved, Some("f2".to_string()));
    }

    #[tokio::test]
    async fn test_propagate_changed_flag_bounded() {
        let store = SqliteGraphStore::new_in_memory().unwrap();
        store.initialize_schema().await.unwrap();
        let caller = function_node("caller", "pkg.caller");
        let callee = function_node("callee", "pkg.callee");
        store.upsert_node(&caller).await.unwrap();
        store.upsert_node(&callee).await.unwrap();
        store.mark_nodes_changed(&["callee".to_string()]).await.unwrap();

        let call_site = Node::new(
            "cs1",
            "callee",
            NodeKind::CallSite(semgraph_ir::CallSiteNode {
                caller_id: "caller".to_string(),
                arg_count: 0,
                has_args: false,
                has_kwargs: false,
                lineno: 1,
                col_offset: 0,
                arg_types: vec![],
                resolution_status: semgraph_ir::ResolutionStatus::Resolved,
                unresolved_callee: None,
            }),
        );
        store.upsert_node(&call_site).await.unwrap();
        store
            .upsert_edge(&Edge::new("caller", "cs1", EdgeKind::HasCallsite))
            .await
            .unwrap();
        store
            .upsert_edge(&Edge::new("cs1", "callee", EdgeKind::ResolvesTo))
            .await
            .unwrap();

        let result = store.propagate_changed_flag().await.unwrap();
        assert!(result.newly_marked.contains(&"cs1".to_string()));
        assert!(result.newly_marked.contains(&"caller".to_string()));
        assert!(result.iterations <= MAX_PROPAGATION_ITERATIONS);
    }
}
