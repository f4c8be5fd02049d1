//! Graph container APIs used by `ravel-core`.
//!
//! The graph stores *dependency -> dependent* edges between small copyable keys (in the engine:
//! `(node id, variable slot)` pairs). Neighbor sets keep insertion order so every traversal is
//! deterministic, which the engine relies on for reproducible invalidation and diagnostics.

use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;
use std::hash::Hash;

pub mod alg;

type HashMap<K, V> = hashbrown::HashMap<K, V, FxBuildHasher>;
type NeighborSet<K> = IndexSet<K, FxBuildHasher>;

/// Marker trait for graph keys.
pub trait GraphKey: Copy + Eq + Hash + Ord + std::fmt::Debug {}

impl<T> GraphKey for T where T: Copy + Eq + Hash + Ord + std::fmt::Debug {}

#[derive(Debug, Clone)]
struct NodeEntry<K> {
    out: NeighborSet<K>,
    in_: NeighborSet<K>,
}

impl<K: GraphKey> Default for NodeEntry<K> {
    fn default() -> Self {
        Self {
            out: NeighborSet::default(),
            in_: NeighborSet::default(),
        }
    }
}

/// A directed graph keyed by `K`.
///
/// Unlike a general-purpose graph library there are no labels: the engine keeps all payload in
/// its own arenas and uses the graph purely for reachability.
#[derive(Debug, Clone)]
pub struct Graph<K: GraphKey> {
    order: NeighborSet<K>,
    nodes: HashMap<K, NodeEntry<K>>,
    edge_count: usize,
}

impl<K: GraphKey> Default for Graph<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: GraphKey> Graph<K> {
    pub fn new() -> Self {
        Self {
            order: NeighborSet::default(),
            nodes: HashMap::default(),
            edge_count: 0,
        }
    }

    pub fn has_node(&self, id: K) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn ensure_node(&mut self, id: K) -> &mut Self {
        if !self.nodes.contains_key(&id) {
            self.nodes.insert(id, NodeEntry::default());
            self.order.insert(id);
        }
        self
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = K> + '_ {
        self.order.iter().copied()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Adds the edge `v -> w`, creating both endpoints as needed. Returns `true` if the edge is
    /// new.
    pub fn set_edge(&mut self, v: K, w: K) -> bool {
        self.ensure_node(v);
        self.ensure_node(w);
        let inserted = self
            .nodes
            .get_mut(&v)
            .map(|entry| entry.out.insert(w))
            .unwrap_or(false);
        if inserted {
            if let Some(entry) = self.nodes.get_mut(&w) {
                entry.in_.insert(v);
            }
            self.edge_count += 1;
        }
        inserted
    }

    pub fn set_path(&mut self, nodes: &[K]) -> &mut Self {
        for pair in nodes.windows(2) {
            self.set_edge(pair[0], pair[1]);
        }
        self
    }

    pub fn has_edge(&self, v: K, w: K) -> bool {
        self.nodes.get(&v).is_some_and(|entry| entry.out.contains(&w))
    }

    pub fn remove_edge(&mut self, v: K, w: K) -> bool {
        let removed = self
            .nodes
            .get_mut(&v)
            .map(|entry| entry.out.shift_remove(&w))
            .unwrap_or(false);
        if removed {
            if let Some(entry) = self.nodes.get_mut(&w) {
                entry.in_.shift_remove(&v);
            }
            self.edge_count -= 1;
        }
        removed
    }

    /// Removes every edge that points at `w` and returns the former predecessors.
    ///
    /// The engine calls this before re-declaring a variable's dependencies.
    pub fn remove_in_edges(&mut self, w: K) -> Vec<K> {
        let Some(entry) = self.nodes.get_mut(&w) else {
            return Vec::new();
        };
        let preds: Vec<K> = entry.in_.drain(..).collect();
        for v in &preds {
            if let Some(v_entry) = self.nodes.get_mut(v) {
                v_entry.out.shift_remove(&w);
            }
        }
        self.edge_count -= preds.len();
        preds
    }

    /// Removes a node and all incident edges.
    pub fn remove_node(&mut self, id: K) -> bool {
        let Some(entry) = self.nodes.remove(&id) else {
            return false;
        };
        self.order.shift_remove(&id);
        for w in &entry.out {
            if let Some(w_entry) = self.nodes.get_mut(w) {
                w_entry.in_.shift_remove(&id);
            }
        }
        for v in &entry.in_ {
            if let Some(v_entry) = self.nodes.get_mut(v) {
                v_entry.out.shift_remove(&id);
            }
        }
        // A self-loop is present in both sets but is a single edge.
        let self_loop = usize::from(entry.out.contains(&id));
        self.edge_count -= entry.out.len() + entry.in_.len() - self_loop;
        true
    }

    pub fn successors(&self, v: K) -> impl Iterator<Item = K> + '_ {
        self.nodes
            .get(&v)
            .into_iter()
            .flat_map(|entry| entry.out.iter().copied())
    }

    pub fn predecessors(&self, v: K) -> impl Iterator<Item = K> + '_ {
        self.nodes
            .get(&v)
            .into_iter()
            .flat_map(|entry| entry.in_.iter().copied())
    }

    pub fn out_degree(&self, v: K) -> usize {
        self.nodes.get(&v).map(|entry| entry.out.len()).unwrap_or(0)
    }

    pub fn in_degree(&self, v: K) -> usize {
        self.nodes.get(&v).map(|entry| entry.in_.len()).unwrap_or(0)
    }

    /// Nodes without predecessors, in insertion order.
    pub fn sources(&self) -> Vec<K> {
        self.nodes().filter(|&v| self.in_degree(v) == 0).collect()
    }
}
