//! Identity-keyed directed graph using petgraph.
//!
//! Nodes are keyed by a string identity and deduplicated on insertion, so the
//! first node added under a key wins. Edges point from a dependency to its
//! dependant, which keeps "who waits on me" a single outgoing-edge walk.

use crate::{Error, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::ops::Index;
use tracing::debug;

/// A node in the graph.
#[derive(Debug, Clone)]
pub struct GraphNode<T> {
    /// Identity key of the node.
    pub key: String,
    /// The node payload.
    pub data: T,
}

/// Directed graph keyed by node identity.
///
/// Node indices are assigned in insertion order and are never removed, so
/// iterating by index reproduces the order in which nodes were first seen.
#[derive(Debug, Clone)]
pub struct TaskGraph<T> {
    /// The directed graph. Edges run dependency -> dependant.
    graph: DiGraph<GraphNode<T>, ()>,
    /// Map from node keys to node indices.
    key_to_node: HashMap<String, NodeIndex>,
}

impl<T> Default for TaskGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<NodeIndex> for TaskGraph<T> {
    type Output = GraphNode<T>;

    fn index(&self, index: NodeIndex) -> &Self::Output {
        &self.graph[index]
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Grey,
    Black,
}

impl<T> TaskGraph<T> {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            key_to_node: HashMap::new(),
        }
    }

    /// Add a node under `key`.
    ///
    /// Returns the node index and whether the node was newly inserted. If a
    /// node with the same key already exists, `data` is dropped and the
    /// existing index is returned.
    pub fn add_node(&mut self, key: impl Into<String>, data: T) -> (NodeIndex, bool) {
        let key = key.into();
        if let Some(&node) = self.key_to_node.get(&key) {
            return (node, false);
        }

        let node = self.graph.add_node(GraphNode {
            key: key.clone(),
            data,
        });
        debug!(key = %key, "Added graph node");
        self.key_to_node.insert(key, node);
        (node, true)
    }

    /// Record that `dependant` depends on `dependency`.
    ///
    /// Adding the same edge twice is a no-op.
    pub fn add_dependency(&mut self, dependant: NodeIndex, dependency: NodeIndex) {
        if !self.graph.contains_edge(dependency, dependant) {
            self.graph.add_edge(dependency, dependant, ());
        }
    }

    /// Record a dependency between two nodes identified by key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingNode`] if either key is unknown.
    pub fn add_dependency_by_key(&mut self, dependant: &str, dependency: &str) -> Result<()> {
        let from = self.require(dependant)?;
        let to = self.require(dependency)?;
        self.add_dependency(from, to);
        Ok(())
    }

    fn require(&self, key: &str) -> Result<NodeIndex> {
        self.index_of(key).ok_or_else(|| Error::MissingNode {
            key: key.to_string(),
        })
    }

    /// Get a node by index.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> Option<&GraphNode<T>> {
        self.graph.node_weight(index)
    }

    /// Get a node by key.
    #[must_use]
    pub fn node_by_key(&self, key: &str) -> Option<&GraphNode<T>> {
        self.index_of(key).and_then(|idx| self.graph.node_weight(idx))
    }

    /// Look up the index of a key.
    #[must_use]
    pub fn index_of(&self, key: &str) -> Option<NodeIndex> {
        self.key_to_node.get(key).copied()
    }

    /// Whether a node exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.key_to_node.contains_key(key)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterate node indices in insertion order.
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// Iterate nodes in insertion order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = (NodeIndex, &GraphNode<T>)> + '_ {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx).map(|node| (idx, node)))
    }

    /// Direct dependencies of `index`, in insertion order.
    #[must_use]
    pub fn dependencies_of(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.sorted_neighbors(index, Direction::Incoming)
    }

    /// Direct dependants of `index`, in insertion order.
    #[must_use]
    pub fn dependants_of(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.sorted_neighbors(index, Direction::Outgoing)
    }

    fn sorted_neighbors(&self, index: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self.graph.neighbors_directed(index, direction).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Every node that transitively depends on `index`, in insertion order.
    ///
    /// `index` itself is excluded unless it sits on a cycle.
    #[must_use]
    pub fn dependants_closure(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([index]);
        while let Some(current) = queue.pop_front() {
            for next in self.graph.neighbors_directed(current, Direction::Outgoing) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        let mut out: Vec<NodeIndex> = seen.into_iter().collect();
        out.sort_unstable();
        out
    }

    /// Find a dependency cycle.
    ///
    /// Walks dependencies depth-first with an explicit stack, starting from
    /// each node in insertion order. The returned path starts and ends with
    /// the same key, e.g. `["a", "b", "a"]` when `a` depends on `b` and `b`
    /// depends on `a`.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks = vec![Mark::White; self.graph.node_count()];

        for start in self.graph.node_indices() {
            if marks[start.index()] != Mark::White {
                continue;
            }

            // Each frame holds the node, its dependencies and the next position to visit.
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> =
                vec![(start, self.dependencies_of(start), 0)];
            marks[start.index()] = Mark::Grey;

            while let Some(frame) = stack.last_mut() {
                let next = frame.1.get(frame.2).copied();
                frame.2 += 1;

                match next {
                    None => {
                        marks[frame.0.index()] = Mark::Black;
                        stack.pop();
                    }
                    Some(dep) => match marks[dep.index()] {
                        Mark::White => {
                            marks[dep.index()] = Mark::Grey;
                            stack.push((dep, self.dependencies_of(dep), 0));
                        }
                        Mark::Grey => {
                            let begin = stack
                                .iter()
                                .position(|(node, _, _)| *node == dep)
                                .unwrap_or(0);
                            let mut path: Vec<String> = stack[begin..]
                                .iter()
                                .map(|(node, _, _)| self.graph[*node].key.clone())
                                .collect();
                            path.push(self.graph[dep].key.clone());
                            return Some(path);
                        }
                        Mark::Black => {}
                    },
                }
            }
        }

        None
    }

    /// Check if the graph has cycles.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// Node indices in dependency order.
    ///
    /// Ties are broken by insertion order, so the result is deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] if the graph contains a cycle.
    pub fn topological_sort(&self) -> Result<Vec<NodeIndex>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.dependencies_of(idx).len())
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(idx);
            for dependant in self.dependants_of(idx) {
                let degree = &mut in_degree[dependant.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(dependant));
                }
            }
        }

        if order.len() == self.graph.node_count() {
            Ok(order)
        } else {
            Err(Error::CycleDetected {
                path: self.find_cycle().unwrap_or_default(),
            })
        }
    }

    /// Nodes in dependency order, paired with their keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] if the graph contains a cycle.
    pub fn sorted_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .topological_sort()?
            .into_iter()
            .map(|idx| self.graph[idx].key.clone())
            .collect())
    }

    /// Nodes with no dependencies, in insertion order.
    #[must_use]
    pub fn leaves(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|idx| {
                self.graph
                    .neighbors_directed(*idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect()
    }
}
