//! Dependency Resolver: expand root tasks into the full task graph.
//!
//! Starting from the requested tasks, dependencies are discovered breadth
//! first. Each task key becomes exactly one node; when several tasks share a
//! key the first one discovered is kept and every later occurrence is wired
//! to it. The resolved graph is checked for cycles before anything runs.

use crate::task::{Task, TaskContext};
use crate::{Error, Result};
use actiongraph_task_graph::{NodeIndex, TaskGraph};
use std::collections::VecDeque;
use tracing::{debug, instrument};

/// The deduplicated, acyclic task graph of one run.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    graph: TaskGraph<Task>,
    /// Per node, dependencies in the order they were discovered.
    dependencies: Vec<Vec<NodeIndex>>,
    roots: Vec<NodeIndex>,
}

impl ResolvedGraph {
    /// Number of task nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// Whether the graph is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Root nodes, in request order with duplicates removed.
    #[must_use]
    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    /// Node indices in discovery order.
    pub fn indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// The task stored at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` does not belong to this graph.
    #[must_use]
    pub fn task(&self, index: NodeIndex) -> &Task {
        &self.graph[index].data
    }

    /// Node for a rendered task key.
    #[must_use]
    pub fn index_of(&self, key: &str) -> Option<NodeIndex> {
        self.graph.index_of(key)
    }

    /// Direct dependencies of a node, in discovery order.
    #[must_use]
    pub fn dependencies_of(&self, index: NodeIndex) -> &[NodeIndex] {
        self.dependencies
            .get(index.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Direct dependants of a node.
    #[must_use]
    pub fn dependants_of(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.graph.dependants_of(index)
    }

    /// A dependency-respecting order of all nodes.
    ///
    /// # Errors
    ///
    /// Never fails for a graph returned by [`resolve`]; the graph is checked
    /// for cycles on construction.
    pub fn topological_order(&self) -> Result<Vec<NodeIndex>> {
        Ok(self.graph.topological_sort()?)
    }
}

/// Expand `roots` into the full task graph.
///
/// # Errors
///
/// Returns the first error raised while discovering dependencies, or
/// [`Error::DependencyCycle`] naming the task keys along a cycle.
#[instrument(name = "resolve_tasks", skip_all, fields(roots = roots.len()))]
pub fn resolve(ctx: &TaskContext, roots: Vec<Task>) -> Result<ResolvedGraph> {
    let mut graph = TaskGraph::new();
    let mut dependencies: Vec<Vec<NodeIndex>> = Vec::new();
    let mut root_indices = Vec::with_capacity(roots.len());
    let mut queue = VecDeque::new();

    for task in roots {
        let (index, inserted) = graph.add_node(task.key().to_string(), task);
        if inserted {
            dependencies.push(Vec::new());
            queue.push_back(index);
        }
        if !root_indices.contains(&index) {
            root_indices.push(index);
        }
    }

    while let Some(index) = queue.pop_front() {
        let discovered = graph[index].data.resolve_dependencies(ctx)?;

        for dependency in discovered {
            let (dep_index, inserted) = graph.add_node(dependency.key().to_string(), dependency);
            if inserted {
                dependencies.push(Vec::new());
                queue.push_back(dep_index);
            }
            let edges = &mut dependencies[index.index()];
            if !edges.contains(&dep_index) {
                edges.push(dep_index);
            }
            graph.add_dependency(index, dep_index);
        }
    }

    if let Some(path) = graph.find_cycle() {
        return Err(Error::DependencyCycle { path });
    }

    debug!(
        tasks = graph.len(),
        edges = graph.edge_count(),
        roots = root_indices.len(),
        "Resolved task graph"
    );

    Ok(ResolvedGraph {
        graph,
        dependencies,
        roots: root_indices,
    })
}
