use super::*;

fn graph_with(nodes: &[&str], edges: &[(&str, &str)]) -> Graph<()> {
    let mut g = Graph::new();
    for n in nodes {
        g.add_node(*n, ());
    }
    for (p, c) in edges {
        g.add_edge(p, c).unwrap();
    }
    g
}

#[test]
fn test_add_node_is_idempotent() {
    let mut g: Graph<i32> = Graph::new();
    g.add_node("a", 1);
    g.add_node("b", 2);
    g.add_edge("a", "b").unwrap();

    // Upsert replaces the payload but keeps edges
    g.add_node("a", 10);
    assert_eq!(g.node_data("a"), Some(&10));
    assert_eq!(g.children("a"), vec!["b".to_string()]);
    assert_eq!(g.len(), 2);
}

#[test]
fn test_add_edge_unknown_node() {
    let mut g = graph_with(&["a"], &[]);
    let err = g.add_edge("a", "missing").unwrap_err();
    assert!(matches!(err, CoreError::UnknownNode { .. }));
    let err = g.add_edge("missing", "a").unwrap_err();
    assert!(matches!(err, CoreError::UnknownNode { .. }));
}

#[test]
fn test_add_edge_self_loop() {
    let mut g = graph_with(&["a"], &[]);
    let err = g.add_edge("a", "a").unwrap_err();
    assert!(matches!(err, CoreError::SelfLoop { .. }));
}

#[test]
fn test_duplicate_edge_is_single() {
    let mut g = graph_with(&["a", "b"], &[("a", "b")]);
    g.add_edge("a", "b").unwrap();
    assert_eq!(g.children("a").len(), 1);
    assert_eq!(g.parents("b").len(), 1);
}

#[test]
fn test_parents_children_absent_id() {
    let g = graph_with(&["a"], &[]);
    assert!(g.parents("nope").is_empty());
    assert!(g.children("nope").is_empty());
}

#[test]
fn test_topological_sort_respects_edges() {
    let g = graph_with(
        &["stg_orders", "stg_customers", "fct_orders"],
        &[
            ("stg_orders", "fct_orders"),
            ("stg_customers", "fct_orders"),
        ],
    );
    let order = g.topological_sort().unwrap();

    let pos = |name: &str| order.iter().position(|m| m == name).unwrap();
    assert!(pos("fct_orders") > pos("stg_orders"));
    assert!(pos("fct_orders") > pos("stg_customers"));
    assert_eq!(order.len(), 3);
}

#[test]
fn test_topological_sort_is_deterministic() {
    let build = || {
        graph_with(
            &["d", "c", "b", "a", "e"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        )
    };
    let first = build().topological_sort().unwrap();
    for _ in 0..10 {
        assert_eq!(build().topological_sort().unwrap(), first);
    }
    // Lexicographic visiting puts independent `e` deterministically
    assert_eq!(first, vec!["a", "b", "c", "d", "e"]);
}

#[test]
fn test_cycle_detection_reports_path() {
    let g = graph_with(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
    let cycle = g.find_cycle().expect("cycle expected");
    assert!(!cycle.is_empty());
    for n in ["a", "b", "c"] {
        assert!(cycle.contains(&n.to_string()), "{n} missing from {cycle:?}");
    }
    assert!(g.has_cycle());

    let err = g.topological_sort().unwrap_err();
    assert!(matches!(err, CoreError::CyclicGraph { .. }));
    let err = g.execution_levels().unwrap_err();
    assert!(matches!(err, CoreError::CyclicGraph { .. }));
}

#[test]
fn test_acyclic_graph_has_no_cycle() {
    let g = graph_with(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
    assert!(g.find_cycle().is_none());
}

#[test]
fn test_diamond_execution_levels() {
    let g = graph_with(
        &["a", "b", "c", "d"],
        &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
    );
    let levels = g.execution_levels().unwrap();
    assert_eq!(
        levels,
        vec![
            vec!["a".to_string()],
            vec!["b".to_string(), "c".to_string()],
            vec!["d".to_string()],
        ]
    );
}

#[test]
fn test_execution_levels_empty_graph() {
    let g: Graph<()> = Graph::new();
    assert!(g.execution_levels().unwrap().is_empty());
}

#[test]
fn test_affected_nodes_chain() {
    // a -> b -> c, d independent
    let g = graph_with(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c")]);
    let affected = g.affected_nodes(&["a".to_string()]);
    assert_eq!(affected, vec!["a", "b", "c"]);
}

#[test]
fn test_affected_nodes_unknown_seed() {
    let g = graph_with(&["a"], &[]);
    assert!(g.affected_nodes(&["ghost".to_string()]).is_empty());
}

#[test]
fn test_upstream_nodes_excludes_self() {
    let g = graph_with(
        &["raw", "stg", "int", "fct"],
        &[("raw", "stg"), ("stg", "int"), ("int", "fct")],
    );
    assert_eq!(g.upstream_nodes("fct"), vec!["int", "raw", "stg"]);
    assert!(g.upstream_nodes("raw").is_empty());
}

#[test]
fn test_roots_and_leaves() {
    let g = graph_with(
        &["a", "b", "c", "d"],
        &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
    );
    assert_eq!(g.roots(), vec!["a"]);
    assert_eq!(g.leaves(), vec!["d"]);
}

#[test]
fn test_subgraph_induced_edges() {
    let g = graph_with(
        &["a", "b", "c", "d"],
        &[("a", "b"), ("b", "c"), ("c", "d")],
    );
    let ids: HashSet<String> = ["b", "c"].iter().map(|s| s.to_string()).collect();
    let sub = g.subgraph(&ids);

    assert_eq!(sub.len(), 2);
    assert_eq!(sub.children("b"), vec!["c".to_string()]);
    // Edges to nodes outside the set are dropped
    assert!(sub.parents("b").is_empty());
    assert!(sub.children("c").is_empty());
}

#[test]
fn test_clear_resets_everything() {
    let mut g = graph_with(&["a", "b"], &[("a", "b")]);
    g.clear();
    assert!(g.is_empty());
    assert!(g.children("a").is_empty());
}
