//! End-to-end scenarios and cross-crate properties, `spec.md` §8.
//!
//! Scenarios 1–4 (signature mismatch, unresolved call, structural
//! non-sequential positions, idempotent rebuild) are covered at the unit
//! level next to the code that implements them; this file covers the
//! remaining scenarios plus the P/R/B properties that only show up once
//! the full builder → store → validator pipeline is wired together.

use semgraph_ir::{parse_source, NodeKind};
use semgraph_orchestration::{builder::Builder, config::ValidatorConfig, validator::Validator};
use semgraph_storage::{query, GraphStore, SqliteGraphStore};

async fn build(store: &SqliteGraphStore, path: &str, src: &str) {
    store.initialize_schema().await.unwrap();
    let builder = Builder::new(store);
    builder.build_file(path, parse_source(src, path)).await.unwrap();
}

/// Scenario 5: calling a function with an argument of the wrong type.
#[tokio::test]
async fn scenario_5_type_mismatch_at_call() {
    let store = SqliteGraphStore::new_in_memory().unwrap();
    let src = "def f(x: int) -> int:\n    return x\n\ndef caller():\n    f(\"hello\")\n";
    build(&store, "/repo/s5.py", src).await;

    let config = ValidatorConfig::default();
    let validator = Validator::new(&store, &config);
    let report = validator.validate_all().await.unwrap();

    let violation = report
        .violations
        .iter()
        .find(|v| v.message.contains("Type mismatch"))
        .expect("expected a data-flow-invalid violation for the string argument");
    assert_eq!(violation.message, "Type mismatch: argument 1 is 'str' but parameter 'x' expects 'int'");
}

/// Scenario 6: diamond inheritance is both surfaced by the query façade
/// and flagged as a structural warning.
#[tokio::test]
async fn scenario_6_diamond_inheritance() {
    let store = SqliteGraphStore::new_in_memory().unwrap();
    let src = "class A:\n    pass\n\nclass B(A):\n    pass\n\nclass C(A):\n    pass\n\nclass D(B, C):\n    pass\n";
    build(&store, "/repo/s6.py", src).await;

    let diamonds = query::find_diamond_inheritance(&store).await.unwrap();
    assert!(!diamonds.is_empty(), "expected at least one diamond converging on A");

    let config = ValidatorConfig::default();
    let validator = Validator::new(&store, &config);
    let report = validator.validate_all().await.unwrap();
    assert!(report.violations.iter().any(|v| v.message.contains("Diamond inheritance")));
}

/// P1: every Parameter has exactly one HAS_PARAMETER owner and parameter
/// positions are contiguous from 0.
#[tokio::test]
async fn p1_parameter_ownership_and_contiguous_positions() {
    let store = SqliteGraphStore::new_in_memory().unwrap();
    let src = "def f(a, b, c):\n    return a\n";
    build(&store, "/repo/p1.py", src).await;

    let config = ValidatorConfig::default();
    let validator = Validator::new(&store, &config);
    let report = validator.validate_all().await.unwrap();
    assert!(!report.violations.iter().any(|v| v.message.contains("HAS_PARAMETER predecessors")));
    assert!(!report.violations.iter().any(|v| v.message.contains("non-sequential")));
}

/// P2: a resolved CallSite has exactly one RESOLVES_TO edge; an
/// unresolved one has zero.
#[tokio::test]
async fn p2_call_site_resolves_to_out_degree() {
    let store = SqliteGraphStore::new_in_memory().unwrap();
    let src = "def f():\n    pass\n\ndef caller():\n    f()\n    missing()\n";
    build(&store, "/repo/p2.py", src).await;

    let nodes = store.all_nodes(usize::MAX).await.unwrap();
    for node in &nodes {
        if let NodeKind::CallSite(_) = &node.kind {
            let resolves = store.node_edges(&node.id, Some(&[semgraph_ir::EdgeKind::ResolvesTo]), semgraph_storage::Direction::Outgoing).await.unwrap();
            assert!(resolves.len() <= 1, "call site {} had {} RESOLVES_TO edges", node.id, resolves.len());
        }
    }
}

/// P3: IS_SUBTYPE_OF never cycles back to its origin.
#[tokio::test]
async fn p3_is_subtype_of_acyclic() {
    use semgraph_ir::{Edge, EdgeKind, Node, TypeKind, TypeNode};

    let store = SqliteGraphStore::new_in_memory().unwrap();
    store.initialize_schema().await.unwrap();
    let t1 = Node::new("t1", "int", NodeKind::Type(TypeNode { name: "int".into(), module: None, kind: TypeKind::Builtin, base_types: vec![] }));
    let t2 = Node::new("t2", "bool", NodeKind::Type(TypeNode { name: "bool".into(), module: None, kind: TypeKind::Builtin, base_types: vec![] }));
    store.upsert_node(&t1).await.unwrap();
    store.upsert_node(&t2).await.unwrap();
    store.upsert_edge(&Edge::new("t2", "t1", EdgeKind::IsSubtypeOf)).await.unwrap();

    let config = ValidatorConfig::default();
    let validator = Validator::new(&store, &config);
    let report = validator.validate_all().await.unwrap();
    assert!(!report.violations.iter().any(|v| v.message.contains("IS_SUBTYPE_OF cycle")));
}

/// P4: every edge's endpoint label pair is admissible for its kind.
#[tokio::test]
async fn p4_edge_endpoint_admissibility() {
    let store = SqliteGraphStore::new_in_memory().unwrap();
    let src = "class Base:\n    pass\n\nclass Sub(Base):\n    def method(self, x: int) -> int:\n        return x\n";
    build(&store, "/repo/p4.py", src).await;

    let edges = store.all_edges(usize::MAX).await.unwrap();
    for edge in &edges {
        let from = store.node_by_id(&edge.from_id).await.unwrap().map(|n| n.label());
        let to = store.node_by_id(&edge.to_id).await.unwrap().map(|n| n.label());
        if let (Some(from), Some(to)) = (from, to) {
            assert!(edge.kind.endpoints_admissible(from, to), "{:?} edge {} -> {} is inadmissible", edge.kind, from, to);
        }
    }
}

/// P5: re-indexing an unchanged file at the full-pipeline level writes
/// the same counts as the first pass and leaves no duplicate nodes.
#[tokio::test]
async fn p5_idempotent_reindex_full_pipeline() {
    let store = SqliteGraphStore::new_in_memory().unwrap();
    let src = "def f(x):\n    return x\n\ndef caller():\n    f(1)\n";
    build(&store, "/repo/p5.py", src).await;
    let first_stats = store.statistics().await.unwrap();

    build(&store, "/repo/p5.py", src).await;
    let second_stats = store.statistics().await.unwrap();

    assert_eq!(first_stats.nodes_by_label, second_stats.nodes_by_label);
    assert_eq!(first_stats.total_edges, second_stats.total_edges);
}

/// P6: deleting a file's slice and re-extracting leaves no stale nodes
/// under that path once the function it used to declare is removed.
#[tokio::test]
async fn p6_delete_by_prefix_leaves_no_stale_nodes() {
    let store = SqliteGraphStore::new_in_memory().unwrap();
    build(&store, "/repo/p6.py", "def old_name():\n    pass\n").await;
    build(&store, "/repo/p6.py", "def new_name():\n    pass\n").await;

    let nodes = store.all_nodes(usize::MAX).await.unwrap();
    assert!(!nodes.iter().any(|n| n.name == "old_name"));
    assert!(nodes.iter().any(|n| n.name == "new_name"));
}

/// P7: a signature mismatch is flagged if and only if the call's argument
/// count falls outside [required, total].
#[tokio::test]
async fn p7_signature_mismatch_iff_arity_out_of_bounds() {
    let store = SqliteGraphStore::new_in_memory().unwrap();
    let src = "def f(a, b=2):\n    return a\n\ndef caller():\n    f(1)\n    f(1, 2)\n";
    build(&store, "/repo/p7.py", src).await;

    let config = ValidatorConfig::default();
    let validator = Validator::new(&store, &config);
    let report = validator.validate_all().await.unwrap();
    assert!(!report.violations.iter().any(|v| matches!(v.kind, semgraph_orchestration::validator::ViolationKind::SignatureMismatch)));

    let store2 = SqliteGraphStore::new_in_memory().unwrap();
    let src2 = "def f(a, b=2):\n    return a\n\ndef caller():\n    f()\n";
    build(&store2, "/repo/p7b.py", src2).await;
    let validator2 = Validator::new(&store2, &config);
    let report2 = validator2.validate_all().await.unwrap();
    assert!(report2.violations.iter().any(|v| matches!(v.kind, semgraph_orchestration::validator::ViolationKind::SignatureMismatch)));
}

/// P8: propagation terminates within the bounded iteration cap.
#[tokio::test]
async fn p8_propagation_bounded() {
    let store = SqliteGraphStore::new_in_memory().unwrap();
    let src = "def f(x):\n    return x\n\ndef g():\n    f(1)\n\ndef h():\n    g()\n";
    build(&store, "/repo/p8.py", src).await;

    let nodes = store.all_nodes(usize::MAX).await.unwrap();
    let f = nodes.iter().find(|n| n.name == "f").unwrap();
    store.mark_nodes_changed(&[f.id.clone()]).await.unwrap();

    let result = store.propagate_changed_flag().await.unwrap();
    assert!(result.iterations <= 10);
}

/// R1: extracting and building the same source twice produces the same
/// node ids and properties (determinism through the full pipeline).
#[tokio::test]
async fn r1_extract_build_round_trip_identity() {
    let store1 = SqliteGraphStore::new_in_memory().unwrap();
    let store2 = SqliteGraphStore::new_in_memory().unwrap();
    let src = "class Greeter:\n    def greet(self, name: str) -> str:\n        return name\n";
    build(&store1, "/repo/r1.py", src).await;
    build(&store2, "/repo/r1.py", src).await;

    let mut nodes1 = store1.all_nodes(usize::MAX).await.unwrap();
    let mut nodes2 = store2.all_nodes(usize::MAX).await.unwrap();
    nodes1.sort_by(|a, b| a.id.cmp(&b.id));
    nodes2.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(nodes1.len(), nodes2.len());
    for (a, b) in nodes1.iter().zip(nodes2.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.name, b.name);
        assert_eq!(a.kind, b.kind);
    }
}

/// R2: running validate_all twice without mutating the graph produces
/// the same violation set, modulo ordering.
#[tokio::test]
async fn r2_validate_all_stable_across_repeated_runs() {
    let store = SqliteGraphStore::new_in_memory().unwrap();
    let src = "def f(x: int) -> int:\n    return x\n\ndef caller():\n    f(\"bad\")\n";
    build(&store, "/repo/r2.py", src).await;

    let config = ValidatorConfig::default();
    let validator = Validator::new(&store, &config);
    let mut first: Vec<String> = validator.validate_all().await.unwrap().violations.into_iter().map(|v| v.message).collect();
    let mut second: Vec<String> = validator.validate_all().await.unwrap().violations.into_iter().map(|v| v.message).collect();
    first.sort();
    second.sort();
    assert_eq!(first, second);
}

/// B1: an empty file produces exactly one Module node and no violations.
#[tokio::test]
async fn b1_empty_file_yields_one_module_node() {
    let store = SqliteGraphStore::new_in_memory().unwrap();
    build(&store, "/repo/b1.py", "").await;

    let nodes = store.all_nodes(usize::MAX).await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert!(matches!(&nodes[0].kind, NodeKind::Module(_)));

    let config = ValidatorConfig::default();
    let validator = Validator::new(&store, &config);
    let report = validator.validate_all().await.unwrap();
    assert!(report.is_valid());
}

/// B2: a function with only *args/**kwargs has required == total == 0,
/// so any call arity satisfies the signature law.
#[tokio::test]
async fn b2_var_args_only_function_any_arity_satisfies_signature() {
    let store = SqliteGraphStore::new_in_memory().unwrap();
    let src = "def f(*args, **kwargs):\n    pass\n\ndef caller():\n    f(1, 2, 3, x=4)\n";
    build(&store, "/repo/b2.py", src).await;

    let config = ValidatorConfig::default();
    let validator = Validator::new(&store, &config);
    let report = validator.validate_all().await.unwrap();
    assert!(!report.violations.iter().any(|v| matches!(v.kind, semgraph_orchestration::validator::ViolationKind::SignatureMismatch)));
}

/// B3: a class with an unresolvable base does not crash the builder and
/// does not leave a dangling INHERITS edge to a missing node.
#[tokio::test]
async fn b3_unresolvable_base_class_does_not_crash() {
    let store = SqliteGraphStore::new_in_memory().unwrap();
    let src = "class Sub(SomeExternalBase):\n    pass\n";
    build(&store, "/repo/b3.py", src).await;

    let edges = store.all_edges(usize::MAX).await.unwrap();
    for edge in edges.iter().filter(|e| e.kind == semgraph_ir::EdgeKind::Inherits) {
        let to = store.node_by_id(&edge.to_id).await.unwrap();
        assert!(to.is_some(), "INHERITS edge points at a missing node");
    }
}
