//! The four conservation laws, `spec.md` §4.6: Signature, Referential,
//! Type-flow, Structural. Each can run over the whole graph (full) or
//! restricted to nodes whose `changed` flag is set (incremental), the
//! local-to-global bridge `spec.md` §9 calls the incremental validator.

use std::collections::{BTreeMap, HashSet, VecDeque};

use semgraph_ir::{EdgeKind, NodeKind, ParamKind};
use semgraph_storage::{query, Direction, GraphStore};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::ValidatorConfig;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    SignatureMismatch,
    ReferenceBroken,
    DataFlowInvalid,
    StructuralInvalid,
}

impl ViolationKind {
    fn law_name(&self) -> &'static str {
        match self {
            ViolationKind::SignatureMismatch => "signature",
            ViolationKind::ReferenceBroken => "referential",
            ViolationKind::DataFlowInvalid => "type_flow",
            ViolationKind::StructuralInvalid => "structural",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub lines: Vec<String>,
    pub offending_line: usize,
}

/// ±2 lines of context around `line` (1-indexed), the offending line
/// marked by `CodeSnippet::offending_line`. `None` if the file can't be
/// read, `spec.md` §4.6.
fn read_code_snippet(path: &str, line: u32) -> Option<CodeSnippet> {
    const CONTEXT: usize = 2;
    let text = std::fs::read_to_string(path).ok()?;
    let all_lines: Vec<&str> = text.lines().collect();
    let line = line as usize;
    if line == 0 || line > all_lines.len() {
        return None;
    }
    let start = line.saturating_sub(CONTEXT + 1);
    let end = (line + CONTEXT).min(all_lines.len());
    Some(CodeSnippet {
        lines: all_lines[start..end].iter().map(|s| s.to_string()).collect(),
        offending_line: line,
    })
}

/// `spec.md` §4.6's violation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub entity_id: String,
    pub message: String,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
    pub column_number: Option<u32>,
    pub old_value: Option<JsonValue>,
    pub new_value: Option<JsonValue>,
    pub code_snippet: Option<CodeSnippet>,
}

impl Violation {
    fn new(kind: ViolationKind, severity: Severity, entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            entity_id: entity_id.into(),
            message: message.into(),
            details: BTreeMap::new(),
            file_path: None,
            line_number: None,
            column_number: None,
            old_value: None,
            new_value: None,
            code_snippet: None,
        }
    }

    fn at_location(mut self, location: Option<&str>) -> Self {
        if let Some(loc) = location {
            let (path, line, col) = semgraph_ir::parse_location(loc);
            if let (Some(path), Some(line)) = (&path, line) {
                self.code_snippet = read_code_snippet(path, line);
            }
            self.file_path = path;
            self.line_number = line;
            self.column_number = col;
        }
        self
    }

    fn with_old_new(mut self, old: JsonValue, new: JsonValue) -> Self {
        self.old_value = Some(old);
        self.new_value = Some(new);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct LawSummary {
    pub errors: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        !self.violations.iter().any(|v| v.severity == Severity::Error)
    }

    /// Counts grouped by law and severity — additive over the flat list
    /// `spec.md` §4.6 requires, per `SPEC_FULL.md` §10.
    pub fn summary_by_law(&self) -> BTreeMap<&'static str, LawSummary> {
        let mut summary: BTreeMap<&'static str, LawSummary> = BTreeMap::new();
        for v in &self.violations {
            let entry = summary.entry(v.kind.law_name()).or_default();
            match v.severity {
                Severity::Error => entry.errors += 1,
                Severity::Warning => entry.warnings += 1,
            }
        }
        summary
    }
}

enum Scope {
    Full,
    Changed(HashSet<String>),
}

impl Scope {
    fn includes(&self, id: &str) -> bool {
        match self {
            Scope::Full => true,
            Scope::Changed(ids) => ids.contains(id),
        }
    }
}

pub struct Validator<'a> {
    store: &'a dyn GraphStore,
    config: &'a ValidatorConfig,
}

impl<'a> Validator<'a> {
    pub fn new(store: &'a dyn GraphStore, config: &'a ValidatorConfig) -> Self {
        Self { store, config }
    }

    pub async fn validate_all(&self) -> Result<ValidationReport> {
        self.run(Scope::Full).await
    }

    /// Restricts every law to nodes whose `changed` flag is set — the
    /// "light cone" `spec.md` §9's glossary names.
    pub async fn validate_incremental(&self) -> Result<ValidationReport> {
        let changed = self.store.get_changed_ids().await?;
        self.run(Scope::Changed(changed.into_iter().collect())).await
    }

    async fn run(&self, scope: Scope) -> Result<ValidationReport> {
        let mut violations = Vec::new();
        violations.extend(self.check_signature(&scope).await?);
        violations.extend(self.check_referential(&scope).await?);
        violations.extend(self.check_type_flow(&scope).await?);
        violations.extend(self.check_structural(&scope).await?);
        Ok(ValidationReport { violations })
    }

    fn decorator_is_transforming(&self, decorator: &str) -> bool {
        self.config.signature_transforming_decorators.iter().any(|cfg| {
            decorator == cfg || decorator.rsplit('.').next() == cfg.rsplit('.').next()
        })
    }

    // ---- S: Signature conservation --------------------------------

    async fn check_signature(&self, scope: &Scope) -> Result<Vec<Violation>> {
        let mut out = Vec::new();
        let functions = self.store.all_nodes(usize::MAX).await?;
        for node in functions {
            let NodeKind::Function(f) = &node.kind else { continue };
            if !scope.includes(&node.id) {
                continue;
            }
            if f.decorators.iter().any(|d| self.decorator_is_transforming(d)) {
                continue;
            }

            let params = self.ordered_parameters(&node.id).await?;
            let is_method = self.is_method(&node.id).await?;
            let mut checkable: Vec<_> = params
                .iter()
                .filter(|p| matches!(p.kind, ParamKind::Positional))
                .collect();
            if is_method && checkable.first().map(|p| p.name == "self" || p.name == "cls").unwrap_or(false) {
                checkable.remove(0);
            }
            let total = checkable.len();
            let required = checkable.iter().filter(|p| p.default_value.is_none()).count();

            let call_sites = self.store.node_edges(&node.id, Some(&[EdgeKind::ResolvesTo]), Direction::Incoming).await?;
            for cs_edge in call_sites {
                let Some(cs_node) = self.store.node_by_id(&cs_edge.from_id).await? else { continue };
                let NodeKind::CallSite(cs) = &cs_node.kind else { continue };
                let k = cs.arg_count;
                if k < required || k > total {
                    let message = if required == total {
                        format!("Function {} expects {} arguments but is called with {}", node.name, required, k)
                    } else {
                        format!("Function {} expects {}-{} arguments but is called with {}", node.name, required, total, k)
                    };
                    let bound = if k < required { required } else { total };
                    out.push(
                        Violation::new(ViolationKind::SignatureMismatch, Severity::Error, node.id.clone(), message)
                            .at_location(cs_node.location.as_deref())
                            .with_old_new(JsonValue::from(k), JsonValue::from(bound)),
                    );
                }
            }

            if f.visibility == semgraph_ir::Visibility::Private {
                let self_module = f.qualified_name.rsplit_once('.').map(|(m, _)| m.to_string());
                for cs_edge in self.store.node_edges(&node.id, Some(&[EdgeKind::ResolvesTo]), Direction::Incoming).await? {
                    let Some(cs_node) = self.store.node_by_id(&cs_edge.from_id).await? else { continue };
                    let Some(owner_edge) = self
                        .store
                        .node_edges(&cs_node.id, Some(&[EdgeKind::HasCallsite]), Direction::Incoming)
                        .await?
                        .into_iter()
                        .next()
                    else {
                        continue;
                    };
                    let Some(caller) = self.store.node_by_id(&owner_edge.from_id).await? else { continue };
                    let NodeKind::Function(caller_fn) = &caller.kind else { continue };
                    let caller_module = caller_fn.qualified_name.rsplit_once('.').map(|(m, _)| m.to_string());
                    if caller_module != self_module {
                        out.push(
                            Violation::new(
                                ViolationKind::SignatureMismatch,
                                Severity::Warning,
                                node.id.clone(),
                                format!("Private function {} called from a different module", node.name),
                            )
                            .at_location(cs_node.location.as_deref()),
                        );
                    }
                }
            }
        }
        Ok(out)
    }

    async fn ordered_parameters(&self, function_id: &str) -> Result<Vec<semgraph_ir::ParameterNode>> {
        let edges = self.store.node_edges(function_id, Some(&[EdgeKind::HasParameter]), Direction::Outgoing).await?;
        let mut params = Vec::new();
        for e in edges {
            if let Some(node) = self.store.node_by_id(&e.to_id).await? {
                if let NodeKind::Parameter(p) = node.kind {
                    params.push(p);
                }
            }
        }
        params.sort_by_key(|p| p.position);
        Ok(params)
    }

    async fn is_method(&self, function_id: &str) -> Result<bool> {
        let incoming = self.store.node_edges(function_id, Some(&[EdgeKind::Declares]), Direction::Incoming).await?;
        for e in incoming {
            if let Some(owner) = self.store.node_by_id(&e.from_id).await? {
                if owner.label() == "Class" {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    // ---- R: Referential integrity ----------------------------------

    async fn check_referential(&self, scope: &Scope) -> Result<Vec<Violation>> {
        let mut out = Vec::new();

        for node in query::find_orphaned_nodes(self.store).await? {
            if !scope.includes(&node.id) {
                continue;
            }
            out.push(
                Violation::new(
                    ViolationKind::ReferenceBroken,
                    Severity::Warning,
                    node.id.clone(),
                    format!("{} '{}' has no incident edges", node.label(), node.name),
                )
                .at_location(node.location.as_deref()),
            );
        }

        let all_nodes = self.store.all_nodes(usize::MAX).await?;
        for node in &all_nodes {
            if !scope.includes(&node.id) {
                continue;
            }
            match &node.kind {
                NodeKind::CallSite(cs) => {
                    let resolves = self.store.node_edges(&node.id, Some(&[EdgeKind::ResolvesTo]), Direction::Outgoing).await?;
                    match cs.resolution_status {
                        semgraph_ir::ResolutionStatus::Unresolved => {
                            let callee = cs.unresolved_callee.clone().unwrap_or_default();
                            out.push(
                                Violation::new(
                                    ViolationKind::ReferenceBroken,
                                    Severity::Error,
                                    node.id.clone(),
                                    format!("Unresolved call to: {callee}"),
                                )
                                .at_location(node.location.as_deref()),
                            );
                        }
                        _ => {
                            if resolves.len() != 1 {
                                out.push(
                                    Violation::new(
                                        ViolationKind::ReferenceBroken,
                                        Severity::Error,
                                        node.id.clone(),
                                        format!("CallSite has {} RESOLVES_TO edges, expected 1", resolves.len()),
                                    )
                                    .at_location(node.location.as_deref()),
                                );
                            }
                        }
                    }
                }
                NodeKind::Unresolved(u) => {
                    let origin = self.store.node_by_id(&u.source_id).await?;
                    out.push(
                        Violation::new(
                            ViolationKind::ReferenceBroken,
                            Severity::Error,
                            node.id.clone(),
                            format!("Unresolved {} reference", u.reference_kind),
                        )
                        .at_location(origin.and_then(|o| o.location).as_deref().or(node.location.as_deref())),
                    );
                }
                _ => {}
            }

            let references = self.store.node_edges(&node.id, Some(&[EdgeKind::References]), Direction::Outgoing).await?;
            for r in references {
                if self.store.node_by_id(&r.to_id).await?.is_none() {
                    out.push(
                        Violation::new(
                            ViolationKind::ReferenceBroken,
                            Severity::Error,
                            node.id.clone(),
                            format!("Dangling REFERENCES edge to missing id {}", r.to_id),
                        )
                        .at_location(node.location.as_deref()),
                    );
                }
            }
        }

        Ok(out)
    }

    // ---- T: Data-flow consistency -----------------------------------

    async fn check_type_flow(&self, scope: &Scope) -> Result<Vec<Violation>> {
        let mut out = Vec::new();
        let all_nodes = self.store.all_nodes(usize::MAX).await?;

        for node in &all_nodes {
            if !scope.includes(&node.id) {
                continue;
            }
            let NodeKind::Function(f) = &node.kind else { continue };

            if f.visibility == semgraph_ir::Visibility::Public {
                let params = self.ordered_parameters(&node.id).await?;
                if params.iter().any(|p| p.type_annotation.is_none()) {
                    out.push(Violation::new(
                        ViolationKind::DataFlowInvalid,
                        Severity::Warning,
                        node.id.clone(),
                        format!("Function {} is missing parameter annotations", node.name),
                    ));
                }
                if f.return_type.is_none() {
                    out.push(Violation::new(
                        ViolationKind::DataFlowInvalid,
                        Severity::Warning,
                        node.id.clone(),
                        format!("Function {} is missing a return type annotation", node.name),
                    ));
                }
            }

            let returns = self.store.node_edges(&node.id, Some(&[EdgeKind::ReturnsType]), Direction::Outgoing).await?;
            if returns.len() > 1 {
                out.push(Violation::new(
                    ViolationKind::DataFlowInvalid,
                    Severity::Warning,
                    node.id.clone(),
                    format!("Function {} has {} RETURNS_TYPE targets", node.name, returns.len()),
                ));
            }

            let params = self.ordered_parameters(&node.id).await?;
            let call_sites = self.store.node_edges(&node.id, Some(&[EdgeKind::ResolvesTo]), Direction::Incoming).await?;
            for cs_edge in call_sites {
                let Some(cs_node) = self.store.node_by_id(&cs_edge.from_id).await? else { continue };
                let NodeKind::CallSite(cs) = &cs_node.kind else { continue };
                for (i, actual) in cs.arg_types.iter().enumerate() {
                    let Some(param) = params.get(i) else { break };
                    let Some(expected) = &param.type_annotation else { continue };
                    if !self.types_compatible(actual, expected).await? {
                        out.push(
                            Violation::new(
                                ViolationKind::DataFlowInvalid,
                                Severity::Error,
                                node.id.clone(),
                                format!(
                                    "Type mismatch: argument {} is '{}' but parameter '{}' expects '{}'",
                                    i + 1,
                                    actual,
                                    param.name,
                                    expected
                                ),
                            )
                            .at_location(cs_node.location.as_deref()),
                        );
                    }
                }
            }

            if let NodeKind::Variable(v) = &node.kind {
                if let Some(declared) = &v.type_annotation {
                    let assigned = self.store.node_edges(&node.id, Some(&[EdgeKind::AssignedType]), Direction::Outgoing).await?;
                    for a in assigned {
                        if let Some(type_node) = self.store.node_by_id(&a.to_id).await? {
                            if !self.types_compatible(&type_node.name, declared).await? {
                                out.push(Violation::new(
                                    ViolationKind::DataFlowInvalid,
                                    Severity::Error,
                                    node.id.clone(),
                                    format!(
                                        "Variable {} declared as '{}' but assigned '{}'",
                                        v.name, declared, type_node.name
                                    ),
                                ));
                            }
                        }
                    }
                }
            }
        }

        for node in &all_nodes {
            if node.label() != "Type" || !scope.includes(&node.id) {
                continue;
            }
            if self.has_subtype_cycle(&node.id).await? {
                out.push(Violation::new(
                    ViolationKind::DataFlowInvalid,
                    Severity::Error,
                    node.id.clone(),
                    format!("IS_SUBTYPE_OF cycle detected at type {}", node.name),
                ));
            }
        }

        Ok(out)
    }

    async fn has_subtype_cycle(&self, start: &str) -> Result<bool> {
        let mut visited = HashSet::new();
        let mut stack = vec![start.to_string()];
        while let Some(id) = stack.pop() {
            for e in self.store.node_edges(&id, Some(&[EdgeKind::IsSubtypeOf]), Direction::Outgoing).await? {
                if e.to_id == start {
                    return Ok(true);
                }
                if visited.insert(e.to_id.clone()) {
                    stack.push(e.to_id);
                }
            }
        }
        Ok(false)
    }

    /// `types_compatible(actual, expected)`, `spec.md` §4.6.
    async fn types_compatible(&self, actual: &str, expected: &str) -> Result<bool> {
        if actual == expected {
            return Ok(true);
        }
        if actual == "Any" || expected == "Any" {
            return Ok(true);
        }
        if actual == "None" && (expected.starts_with("Optional[") || expected.contains("None")) {
            return Ok(true);
        }
        const NUMERIC_LATTICE: [&str; 4] = ["bool", "int", "float", "complex"];
        if let (Some(a_rank), Some(e_rank)) = (
            NUMERIC_LATTICE.iter().position(|t| *t == actual),
            NUMERIC_LATTICE.iter().position(|t| *t == expected),
        ) {
            return Ok(a_rank <= e_rank);
        }
        if matches!((actual, expected), ("str", "bytes") | ("bytes", "str")) {
            return Ok(true);
        }
        let base = |s: &str| s.split('[').next().unwrap_or(s).to_string();
        if base(actual) == base(expected) && (actual.contains('[') || expected.contains('[')) {
            return Ok(true);
        }

        // Fall back to a bounded IS_SUBTYPE_OF path search of at most 5 hops.
        let Some(actual_ids) = self.find_type_ids_by_name(actual).await? else { return Ok(false) };
        let Some(expected_id) = self.find_type_ids_by_name(expected).await?.and_then(|ids| ids.into_iter().next()) else {
            return Ok(false);
        };
        for start in actual_ids {
            if self.subtype_reachable(&start, &expected_id, 5).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn find_type_ids_by_name(&self, name: &str) -> Result<Option<Vec<String>>> {
        let matches = self.store.search(name, Some("Type"), 10).await?;
        let ids: Vec<String> = matches.into_iter().filter(|n| n.name == name).map(|n| n.id).collect();
        Ok(if ids.is_empty() { None } else { Some(ids) })
    }

    async fn subtype_reachable(&self, from: &str, to: &str, max_depth: usize) -> Result<bool> {
        let mut frontier = VecDeque::from([(from.to_string(), 0usize)]);
        let mut visited = HashSet::new();
        visited.insert(from.to_string());
        while let Some((id, depth)) = frontier.pop_front() {
            if id == to {
                return Ok(true);
            }
            if depth >= max_depth {
                continue;
            }
            for e in self.store.node_edges(&id, Some(&[EdgeKind::IsSubtypeOf]), Direction::Outgoing).await? {
                if visited.insert(e.to_id.clone()) {
                    frontier.push_back((e.to_id, depth + 1));
                }
            }
        }
        Ok(false)
    }

    // ---- Structural integrity ---------------------------------------

    async fn check_structural(&self, scope: &Scope) -> Result<Vec<Violation>> {
        let mut out = Vec::new();
        let all_nodes = self.store.all_nodes(usize::MAX).await?;

        for node in &all_nodes {
            let NodeKind::Function(_) = &node.kind else { continue };
            if !scope.includes(&node.id) {
                continue;
            }
            let params = self.ordered_parameters(&node.id).await?;
            let positions: Vec<i64> = params.iter().map(|p| p.position as i64).collect();
            let expected: Vec<i64> = (0..positions.len() as i64).collect();
            if positions != expected {
                out.push(
                    Violation::new(
                        ViolationKind::StructuralInvalid,
                        Severity::Error,
                        node.id.clone(),
                        format!("Function {} has non-sequential parameter positions", node.name),
                    )
                    .with_old_new(serde_json::json!(positions), serde_json::json!(expected)),
                );
            }
        }

        for node in &all_nodes {
            if node.label() != "Parameter" || !scope.includes(&node.id) {
                continue;
            }
            let incoming = self.store.node_edges(&node.id, Some(&[EdgeKind::HasParameter]), Direction::Incoming).await?;
            if incoming.len() != 1 {
                out.push(Violation::new(
                    ViolationKind::StructuralInvalid,
                    Severity::Error,
                    node.id.clone(),
                    format!("Parameter {} has {} HAS_PARAMETER predecessors, expected 1", node.name, incoming.len()),
                ));
            }
        }

        for cycle in query::find_circular_inheritance(self.store).await? {
            if cycle.iter().any(|id| scope.includes(id)) {
                out.push(Violation::new(
                    ViolationKind::StructuralInvalid,
                    Severity::Error,
                    cycle.first().cloned().unwrap_or_default(),
                    format!("Inheritance cycle detected among classes: {}", cycle.join(", ")),
                ));
            }
        }

        for diamond in query::find_diamond_inheritance(self.store).await? {
            if scope.includes(&diamond.class_id) {
                out.push(Violation::new(
                    ViolationKind::StructuralInvalid,
                    Severity::Warning,
                    diamond.class_id.clone(),
                    format!(
                        "Diamond inheritance: class {} reaches a common ancestor via {} distinct bases",
                        diamond.class_id,
                        diamond.common_ancestors.len().max(2)
                    ),
                ));
            }
        }

        let all_edges = self.store.all_edges(usize::MAX).await?;
        for edge in all_edges {
            if !scope.includes(&edge.from_id) && !scope.includes(&edge.to_id) {
                continue;
            }
            let from_label = self.store.node_by_id(&edge.from_id).await?.map(|n| n.label());
            let to_label = self.store.node_by_id(&edge.to_id).await?.map(|n| n.label());
            if let (Some(from_label), Some(to_label)) = (from_label, to_label) {
                if !edge.kind.endpoints_admissible(from_label, to_label) {
                    out.push(Violation::new(
                        ViolationKind::StructuralInvalid,
                        Severity::Error,
                        edge.from_id.clone(),
                        format!("Invalid {}: {} → {}", edge.kind.as_str(), from_label, to_label),
                    ));
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semgraph_ir::{CallSiteNode, Edge, FunctionNode, Node, ParamKind, ParameterNode, ResolutionStatus, Visibility};
    use semgraph_storage::SqliteGraphStore;

    fn function(id: &str, name: &str) -> Node {
        Node::new(
            id,
            name,
            NodeKind::Function(FunctionNode {
                qualified_name: format!("m.{name}"),
                signature: format!("{name}()"),
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
    }

    fn parameter(id: &str, name: &str, position: usize, default: Option<&str>) -> Node {
        Node::new(
            id,
            name,
            NodeKind::Parameter(ParameterNode {
                name: name.to_string(),
                position,
                kind: ParamKind::Positional,
                type_annotation: None,
                default_value: default.map(str::to_string),
            }),
        )
    }

    #[tokio::test]
    async fn test_signature_mismatch_scenario_1() {
        let store = SqliteGraphStore::new_in_memory().unwrap();
        store.initialize_schema().await.unwrap();

        store.upsert_node(&function("f1", "greet")).await.unwrap();
        store.upsert_node(&parameter("p1", "name", 0, None)).await.unwrap();
        store.upsert_node(&parameter("p2", "greeting", 1, None)).await.unwrap();
        store.upsert_edge(&Edge::new("f1", "p1", EdgeKind::HasParameter)).await.unwrap();
        store.upsert_edge(&Edge::new("f1", "p2", EdgeKind::HasParameter)).await.unwrap();

        store.upsert_node(&function("caller", "caller")).await.unwrap();
        let call_site = Node::new(
            "cs1",
            "greet",
            NodeKind::CallSite(CallSiteNode {
                caller_id: "caller".to_string(),
                arg_count: 1,
                has_args: false,
                has_kwargs: false,
                lineno: 5,
                col_offset: 0,
                arg_types: vec![],
                resolution_status: ResolutionStatus::Resolved,
                unresolved_callee: None,
            }),
        )
        .with_location("/repo/a.py:5:0");
        store.upsert_node(&call_site).await.unwrap();
        store.upsert_edge(&Edge::new("caller", "cs1", EdgeKind::HasCallsite)).await.unwrap();
        store.upsert_edge(&Edge::new("cs1", "f1", EdgeKind::ResolvesTo)).await.unwrap();

        let config = ValidatorConfig::default();
        let validator = Validator::new(&store, &config);
        let report = validator.validate_all().await.unwrap();

        let mismatch = report
            .violations
            .iter()
            .find(|v| matches!(v.kind, ViolationKind::SignatureMismatch))
            .expect("expected a signature mismatch violation");
        assert_eq!(mismatch.message, "Function greet expects 2 arguments but is called with 1");
        assert_eq!(mismatch.old_value, Some(serde_json::json!(1)));
        assert_eq!(mismatch.new_value, Some(serde_json::json!(2)));
    }

    #[tokio::test]
    async fn test_unresolved_call_scenario_2() {
        let store = SqliteGraphStore::new_in_memory().unwrap();
        store.initialize_schema().await.unwrap();
        store.upsert_node(&function("caller", "caller")).await.unwrap();
        let call_site = Node::new(
            "cs1",
            "undefined_function",
            NodeKind::CallSite(CallSiteNode {
                caller_id: "caller".to_string(),
                arg_count: 1,
                has_args: false,
                has_kwargs: false,
                lineno: 3,
                col_offset: 9,
                arg_types: vec![],
                resolution_status: ResolutionStatus::Unresolved,
                unresolved_callee: Some("undefined_function".to_string()),
            }),
        );
        store.upsert_node(&call_site).await.unwrap();
        store.upsert_edge(&Edge::new("caller", "cs1", EdgeKind::HasCallsite)).await.unwrap();

        let config = ValidatorConfig::default();
        let validator = Validator::new(&store, &config);
        let report = validator.validate_all().await.unwrap();

        assert!(report.violations.iter().any(|v| v.message == "Unresolved call to: undefined_function"));
    }

    #[tokio::test]
    async fn test_structural_non_sequential_positions_scenario_3() {
        let store = SqliteGraphStore::new_in_memory().unwrap();
        store.initialize_schema().await.unwrap();
        store.upsert_node(&function("f1", "broken")).await.unwrap();
        store.upsert_node(&parameter("p1", "a", 0, None)).await.unwrap();
        store.upsert_node(&parameter("p2", "b", 2, None)).await.unwrap();
        store.upsert_edge(&Edge::new("f1", "p1", EdgeKind::HasParameter)).await.unwrap();
        store.upsert_edge(&Edge::new("f1", "p2", EdgeKind::HasParameter)).await.unwrap();

        let config = ValidatorConfig::default();
        let validator = Validator::new(&store, &config);
        let report = validator.validate_all().await.unwrap();

        let violation = report
            .violations
            .iter()
            .find(|v| matches!(v.kind, ViolationKind::StructuralInvalid) && v.message.contains("non-sequential"))
            .expect("expected a structural violation");
        assert_eq!(violation.old_value, Some(serde_json::json!([0, 2])));
        assert_eq!(violation.new_value, Some(serde_json::json!([0, 1])));
    }

    #[tokio::test]
    async fn test_at_location_populates_code_snippet() {
        let mut file = tempfile::NamedTempFile::with_suffix(".py").unwrap();
        use std::io::Write;
        writeln!(file, "line1\nline2\nline3\nline4\nline5\nline6\nline7").unwrap();
        let path = file.path().to_str().unwrap();

        let store = SqliteGraphStore::new_in_memory().unwrap();
        store.initialize_schema().await.unwrap();
        store.upsert_node(&function("f1", "greet")).await.unwrap();
        let call_site = Node::new(
            "cs1",
            "greet",
            NodeKind::CallSite(CallSiteNode {
                caller_id: "f1".to_string(),
                arg_count: 0,
                has_args: false,
                has_kwargs: false,
                lineno: 4,
                col_offset: 0,
                arg_types: vec![],
                resolution_status: ResolutionStatus::Resolved,
                unresolved_callee: None,
            }),
        )
        .with_location(format!("{path}:4:0"));
        store.upsert_node(&call_site).await.unwrap();
        store.upsert_edge(&Edge::new("cs1", "f1", EdgeKind::ResolvesTo)).await.unwrap();

        let violation = Violation::new(ViolationKind::ReferenceBroken, Severity::Warning, "cs1", "irrelevant")
            .at_location(Some(&format!("{path}:4:0")));

        let snippet = violation.code_snippet.expect("expected a code snippet");
        assert_eq!(snippet.offending_line, 4);
        assert_eq!(snippet.lines, vec!["line2", "line3", "line4", "line5", "line6"]);
    }
}
