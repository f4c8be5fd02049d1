//! Helper algorithms over [`Graph`].

use super::{Graph, GraphKey};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Every node reachable from `roots` along outgoing edges, excluding the roots themselves unless
/// a path leads back to them. Breadth-first, so the result is ordered by distance.
pub fn reachable<K: GraphKey>(g: &Graph<K>, roots: &[K]) -> Vec<K> {
    let mut seen: BTreeSet<K> = BTreeSet::new();
    let mut out: Vec<K> = Vec::new();
    let mut q: VecDeque<K> = roots.iter().copied().collect();
    while let Some(v) = q.pop_front() {
        for w in g.successors(v) {
            if seen.insert(w) {
                out.push(w);
                q.push_back(w);
            }
        }
    }
    out
}

/// Like [`reachable`] but walks incoming edges.
pub fn reachable_reverse<K: GraphKey>(g: &Graph<K>, roots: &[K]) -> Vec<K> {
    let mut seen: BTreeSet<K> = BTreeSet::new();
    let mut out: Vec<K> = Vec::new();
    let mut q: VecDeque<K> = roots.iter().copied().collect();
    while let Some(v) = q.pop_front() {
        for w in g.predecessors(v) {
            if seen.insert(w) {
                out.push(w);
                q.push_back(w);
            }
        }
    }
    out
}

pub fn preorder<K: GraphKey>(g: &Graph<K>, roots: &[K]) -> Vec<K> {
    fn dfs<K: GraphKey>(g: &Graph<K>, v: K, visited: &mut BTreeSet<K>, out: &mut Vec<K>) {
        if !visited.insert(v) {
            return;
        }
        out.push(v);
        for w in g.successors(v) {
            dfs(g, w, visited, out);
        }
    }

    let mut visited: BTreeSet<K> = BTreeSet::new();
    let mut out: Vec<K> = Vec::new();
    for &r in roots {
        dfs(g, r, &mut visited, &mut out);
    }
    out
}

pub fn postorder<K: GraphKey>(g: &Graph<K>, roots: &[K]) -> Vec<K> {
    fn dfs<K: GraphKey>(g: &Graph<K>, v: K, visited: &mut BTreeSet<K>, out: &mut Vec<K>) {
        if !visited.insert(v) {
            return;
        }
        for w in g.successors(v) {
            dfs(g, w, visited, out);
        }
        out.push(v);
    }

    let mut visited: BTreeSet<K> = BTreeSet::new();
    let mut out: Vec<K> = Vec::new();
    for &r in roots {
        dfs(g, r, &mut visited, &mut out);
    }
    out
}

/// Kahn's algorithm. Returns `None` when the graph has a cycle.
pub fn topsort<K: GraphKey>(g: &Graph<K>) -> Option<Vec<K>> {
    let mut in_degree: BTreeMap<K, usize> = g.nodes().map(|v| (v, g.in_degree(v))).collect();
    let mut q: VecDeque<K> = g.nodes().filter(|v| in_degree[v] == 0).collect();
    let mut out: Vec<K> = Vec::with_capacity(g.node_count());
    while let Some(v) = q.pop_front() {
        out.push(v);
        for w in g.successors(v) {
            let Some(d) = in_degree.get_mut(&w) else {
                continue;
            };
            *d -= 1;
            if *d == 0 {
                q.push_back(w);
            }
        }
    }
    (out.len() == g.node_count()).then_some(out)
}

/// Strongly connected components (Tarjan) with more than one node, plus self-loops.
///
/// Each cycle lists its nodes in graph insertion order; cycles are sorted by their first node.
pub fn find_cycles<K: GraphKey>(g: &Graph<K>) -> Vec<Vec<K>> {
    struct Tarjan<'a, K: GraphKey> {
        g: &'a Graph<K>,
        index: usize,
        stack: Vec<K>,
        on_stack: BTreeSet<K>,
        indices: BTreeMap<K, usize>,
        lowlink: BTreeMap<K, usize>,
        sccs: Vec<Vec<K>>,
    }

    impl<K: GraphKey> Tarjan<'_, K> {
        fn strongconnect(&mut self, v: K) {
            self.indices.insert(v, self.index);
            self.lowlink.insert(v, self.index);
            self.index += 1;
            self.stack.push(v);
            self.on_stack.insert(v);

            let succs: Vec<K> = self.g.successors(v).collect();
            for w in succs {
                if !self.indices.contains_key(&w) {
                    self.strongconnect(w);
                    let (Some(v_low), Some(w_low)) =
                        (self.lowlink.get(&v).copied(), self.lowlink.get(&w).copied())
                    else {
                        debug_assert!(false, "tarjan lowlink missing");
                        continue;
                    };
                    self.lowlink.insert(v, v_low.min(w_low));
                } else if self.on_stack.contains(&w) {
                    let (Some(v_low), Some(w_idx)) =
                        (self.lowlink.get(&v).copied(), self.indices.get(&w).copied())
                    else {
                        debug_assert!(false, "tarjan index missing");
                        continue;
                    };
                    self.lowlink.insert(v, v_low.min(w_idx));
                }
            }

            let (Some(v_low), Some(v_idx)) =
                (self.lowlink.get(&v).copied(), self.indices.get(&v).copied())
            else {
                debug_assert!(false, "tarjan index missing for v");
                return;
            };
            if v_low == v_idx {
                let mut scc: Vec<K> = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack.remove(&w);
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }
                self.sccs.push(scc);
            }
        }
    }

    let node_ids: Vec<K> = g.nodes().collect();
    let mut tarjan = Tarjan {
        g,
        index: 0,
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        indices: BTreeMap::new(),
        lowlink: BTreeMap::new(),
        sccs: Vec::new(),
    };

    for &v in &node_ids {
        if !tarjan.indices.contains_key(&v) {
            tarjan.strongconnect(v);
        }
    }

    let order: BTreeMap<K, usize> = node_ids.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    let mut cycles: Vec<Vec<K>> = Vec::new();
    for mut scc in tarjan.sccs {
        if scc.len() > 1 {
            scc.sort_by_key(|v| order.get(v).copied().unwrap_or(usize::MAX));
            cycles.push(scc);
        } else if g.has_edge(scc[0], scc[0]) {
            cycles.push(scc);
        }
    }

    cycles.sort_by(|a, b| a.first().cmp(&b.first()));
    cycles
}
