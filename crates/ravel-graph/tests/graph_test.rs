use ravel_graph::{Graph, alg};

#[test]
fn set_edge_creates_endpoints_once() {
    let mut g: Graph<u32> = Graph::new();
    assert!(g.set_edge(1, 2));
    assert!(!g.set_edge(1, 2));
    assert_eq!(g.node_count(), 2);
    assert_eq!(g.edge_count(), 1);
    assert!(g.has_edge(1, 2));
    assert!(!g.has_edge(2, 1));
}

#[test]
fn neighbors_keep_insertion_order() {
    let mut g: Graph<u32> = Graph::new();
    g.set_edge(1, 5);
    g.set_edge(1, 3);
    g.set_edge(1, 4);
    g.set_edge(9, 3);

    assert_eq!(g.successors(1).collect::<Vec<_>>(), vec![5, 3, 4]);
    assert_eq!(g.predecessors(3).collect::<Vec<_>>(), vec![1, 9]);
}

#[test]
fn remove_in_edges_returns_former_predecessors() {
    let mut g: Graph<u32> = Graph::new();
    g.set_edge(1, 3);
    g.set_edge(2, 3);
    g.set_edge(3, 4);

    let preds = g.remove_in_edges(3);
    assert_eq!(preds, vec![1, 2]);
    assert_eq!(g.edge_count(), 1);
    assert_eq!(g.successors(1).count(), 0);
    assert!(g.has_edge(3, 4));
}

#[test]
fn remove_node_drops_incident_edges_including_self_loops() {
    let mut g: Graph<u32> = Graph::new();
    g.set_edge(1, 2);
    g.set_edge(2, 2);
    g.set_edge(2, 3);
    assert_eq!(g.edge_count(), 3);

    assert!(g.remove_node(2));
    assert_eq!(g.edge_count(), 0);
    assert_eq!(g.nodes().collect::<Vec<_>>(), vec![1, 3]);
    assert!(!g.remove_node(2));
}

#[test]
fn reachable_is_transitive_and_excludes_unrelated_nodes() {
    let mut g: Graph<u32> = Graph::new();
    g.set_edge(1, 2);
    g.set_edge(2, 3);
    g.set_edge(1, 4);
    g.set_edge(5, 6);

    assert_eq!(alg::reachable(&g, &[1]), vec![2, 4, 3]);
    assert_eq!(alg::reachable(&g, &[3]), Vec::<u32>::new());
    assert_eq!(alg::reachable_reverse(&g, &[3]), vec![2, 1]);
}

#[test]
fn topsort_orders_dependencies_first() {
    let mut g: Graph<u32> = Graph::new();
    g.set_edge(3, 1);
    g.set_edge(2, 1);
    g.set_edge(3, 2);

    let order = alg::topsort(&g).unwrap();
    let pos = |v: u32| order.iter().position(|&x| x == v).unwrap();
    assert!(pos(3) < pos(2));
    assert!(pos(2) < pos(1));

    g.set_edge(1, 3);
    assert!(alg::topsort(&g).is_none());
}

#[test]
fn find_cycles_reports_sccs_and_self_loops() {
    let mut g: Graph<u32> = Graph::new();
    g.set_edge(1, 2);
    g.set_edge(2, 3);
    g.set_edge(3, 1);
    g.set_edge(4, 4);
    g.set_edge(5, 6);

    let cycles = alg::find_cycles(&g);
    assert_eq!(cycles, vec![vec![1, 2, 3], vec![4]]);
}

#[test]
fn postorder_visits_children_before_parents() {
    let mut g: Graph<u32> = Graph::new();
    g.set_path(&[1, 2, 3]);
    assert_eq!(alg::postorder(&g, &[1]), vec![3, 2, 1]);
    assert_eq!(alg::preorder(&g, &[1]), vec![1, 2, 3]);
}
