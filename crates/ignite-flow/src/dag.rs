//! Directed acyclic graph backing the step dependency graph.
//!
//! Unlike a plain graph that is checked for cycles when sorted, this DAG
//! refuses any edge that would close a cycle at the moment it is added, so
//! a successfully built graph is always sortable.
//!
//! **Note:** This module is internal to `ignite-flow` to preserve freedom to change internals.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Display;
use std::hash::Hash;

use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};

/// Rejected edge: adding it would close the contained path into a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRejected<T> {
    /// The cycle, starting and ending at the edge's source node.
    pub path: Vec<T>,
}

/// A directed acyclic graph with declaration-order tie-breaking.
///
/// Nodes are never removed, so a node's `NodeIndex` doubles as its
/// declaration position.
#[derive(Debug, Clone)]
pub struct Dag<T>
where
    T: Clone + Eq + Hash + Display,
{
    graph: DiGraph<T, ()>,
    index_map: HashMap<T, NodeIndex>,
}

impl<T> Dag<T>
where
    T: Clone + Eq + Hash + Display,
{
    /// Creates a new empty DAG.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index_map: HashMap::new(),
        }
    }

    /// Returns the number of nodes in the DAG.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the DAG.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Adds a node, returning its index. Returns `None` if the node exists.
    pub fn add_node(&mut self, value: T) -> Option<NodeIndex> {
        if self.index_map.contains_key(&value) {
            return None;
        }
        let idx = self.graph.add_node(value.clone());
        self.index_map.insert(value, idx);
        Some(idx)
    }

    /// Adds a directed edge `from -> to`.
    ///
    /// Re-adding an existing edge is a no-op. The graph is left untouched
    /// when the edge is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CycleRejected`] if `to` already reaches `from` (including
    /// the self-edge case).
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) -> Result<(), CycleRejected<T>> {
        if from == to || has_path_connecting(&self.graph, to, from, None) {
            let mut path = vec![self.weight(from)];
            path.extend(self.path_between(to, from));
            return Err(CycleRejected { path });
        }
        self.graph.update_edge(from, to, ());
        Ok(())
    }

    /// Returns the nodes in a deterministic topological order.
    ///
    /// Kahn's algorithm; among the nodes whose dependencies are all
    /// satisfied, the one declared first always goes next.
    #[must_use]
    pub fn toposort(&self) -> Vec<T> {
        let node_count = self.graph.node_count();
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(pos, _)| pos)
            .collect();

        let mut result = Vec::with_capacity(node_count);
        while let Some(pos) = ready.pop_first() {
            let idx = NodeIndex::new(pos);
            if let Some(node) = self.graph.node_weight(idx) {
                result.push(node.clone());
            }
            for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(deg) = in_degree.get_mut(neighbor.index()) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.insert(neighbor.index());
                    }
                }
            }
        }
        result
    }

    /// Returns the direct upstream dependencies of a node, in declaration order.
    #[must_use]
    pub fn upstream(&self, node: NodeIndex) -> Vec<T> {
        let mut neighbors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .collect();
        neighbors.sort_unstable();
        neighbors.dedup();
        neighbors
            .into_iter()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect()
    }

    /// Returns true if `to` is reachable from `from`.
    #[must_use]
    pub fn reaches(&self, from: NodeIndex, to: NodeIndex) -> bool {
        has_path_connecting(&self.graph, from, to, None)
    }

    /// Returns the node index for a value, if it exists.
    #[must_use]
    pub fn get_index(&self, value: &T) -> Option<NodeIndex> {
        self.index_map.get(value).copied()
    }

    fn weight(&self, idx: NodeIndex) -> T {
        // Indices handed to callers always come from `add_node`.
        self.graph[idx].clone()
    }

    /// Shortest path `start ..= goal` by breadth-first search.
    fn path_between(&self, start: NodeIndex, goal: NodeIndex) -> Vec<T> {
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            if idx == goal {
                break;
            }
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if next != start && !parent.contains_key(&next) {
                    parent.insert(next, idx);
                    queue.push_back(next);
                }
            }
        }

        let mut path = vec![self.weight(goal)];
        let mut cursor = goal;
        while cursor != start {
            match parent.get(&cursor) {
                Some(&prev) => {
                    path.push(self.weight(prev));
                    cursor = prev;
                }
                None => break,
            }
        }
        path.reverse();
        path
    }
}

impl<T> Default for Dag<T>
where
    T: Clone + Eq + Hash + Display,
{
    fn default() -> Self {
        Self::new()
    }
}
