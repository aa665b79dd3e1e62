//! Identity-keyed DAG primitives for actiongraph.
//!
//! This crate provides the directed graph that both the action configuration
//! graph and the task graph are built on. Nodes are identified by a string
//! key, keep the order in which they were first added, and edges always point
//! from a dependency to the node that depends on it.
//!
//! # Key Types
//!
//! - [`TaskGraph`]: The graph structure for building and querying dependencies
//! - [`GraphNode`]: A node in the graph containing its key and data
//! - [`ValidationResult`]: Outcome of a structural validation pass
//!
//! # Example
//!
//! ```ignore
//! use actiongraph_task_graph::TaskGraph;
//!
//! let mut graph = TaskGraph::new();
//! let (build, _) = graph.add_node("build.api", ());
//! let (deploy, _) = graph.add_node("deploy.api", ());
//! graph.add_dependency(deploy, build);
//!
//! let order = graph.topological_sort()?;
//! ```

mod error;
mod graph;
mod validation;

pub use error::{Error, Result};
pub use graph::{GraphNode, TaskGraph};
pub use petgraph::graph::NodeIndex;
pub use validation::ValidationResult;
