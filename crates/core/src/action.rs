//! Configured actions and the action dependency graph.
//!
//! Actions are produced by the configuration layer and are immutable for the
//! duration of a run. The [`ActionGraph`] indexes them by `(kind, name)` and
//! answers the dependency queries tasks use to discover their own
//! dependencies.

use crate::{Error, Result};
use actiongraph_task_graph::TaskGraph;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Kind of configured action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Produces an artifact.
    Build,
    /// Long-running workload.
    Deploy,
    /// One-off job.
    Run,
    /// Test job.
    Test,
}

impl ActionKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 4] = [Self::Build, Self::Deploy, Self::Run, Self::Test];

    /// Lowercase name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Deploy => "deploy",
            Self::Run => "run",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionRef {
    /// Action kind.
    pub kind: ActionKind,
    /// Action name, unique per kind.
    pub name: String,
}

impl ActionRef {
    /// Create a new reference.
    #[must_use]
    pub fn new(kind: ActionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

/// A configured action.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Action kind.
    pub kind: ActionKind,
    /// Action name.
    pub name: String,
    /// Provider-facing type, e.g. `container`.
    pub action_type: String,
    /// Opaque content version.
    pub version: String,
    /// Actions this one depends on.
    pub dependencies: Vec<ActionRef>,
    /// Provider-specific spec.
    pub spec: serde_json::Value,
    /// Per-action operation timeout.
    pub timeout: Option<Duration>,
    /// Disabled actions are resolved but never handed to a provider.
    pub disabled: bool,
}

impl Action {
    /// Create an action with an empty spec and no dependencies.
    #[must_use]
    pub fn new(kind: ActionKind, name: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            action_type: action_type.into(),
            version: String::new(),
            dependencies: Vec::new(),
            spec: serde_json::Value::Null,
            timeout: None,
            disabled: false,
        }
    }

    /// Set the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Add a dependency.
    #[must_use]
    pub fn with_dependency(mut self, kind: ActionKind, name: impl Into<String>) -> Self {
        self.dependencies.push(ActionRef::new(kind, name));
        self
    }

    /// Set the provider spec.
    #[must_use]
    pub fn with_spec(mut self, spec: serde_json::Value) -> Self {
        self.spec = spec;
        self
    }

    /// Set the operation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark the action as disabled.
    #[must_use]
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Reference to this action.
    #[must_use]
    pub fn reference(&self) -> ActionRef {
        ActionRef::new(self.kind, self.name.clone())
    }

    /// Human-readable description, e.g. `deploy api (type container)`.
    #[must_use]
    pub fn long_description(&self) -> String {
        format!("{} {} (type {})", self.kind, self.name, self.action_type)
    }
}

/// Query for [`ActionGraph::dependants_of`].
pub struct DependantsQuery<'a> {
    recursive: bool,
    filter: Option<Box<dyn Fn(&Action) -> bool + Send + Sync + 'a>>,
}

impl<'a> DependantsQuery<'a> {
    /// Direct dependants only.
    #[must_use]
    pub fn direct() -> Self {
        Self {
            recursive: false,
            filter: None,
        }
    }

    /// The transitive closure of dependants.
    #[must_use]
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            filter: None,
        }
    }

    /// Keep only dependants accepted by `filter`.
    #[must_use]
    pub fn filter(mut self, filter: impl Fn(&Action) -> bool + Send + Sync + 'a) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    fn accepts(&self, action: &Action) -> bool {
        self.filter.as_ref().is_none_or(|f| f(action))
    }
}

/// The configured actions of one run, indexed by identity.
#[derive(Debug, Clone, Default)]
pub struct ActionGraph {
    graph: TaskGraph<Arc<Action>>,
}

impl ActionGraph {
    /// Build the graph.
    ///
    /// # Errors
    ///
    /// Returns a configuration-class error for duplicate actions, dependencies
    /// on unknown actions, or dependency cycles.
    pub fn new(actions: Vec<Action>) -> Result<Self> {
        let mut graph = TaskGraph::new();

        for action in actions {
            let reference = action.reference();
            let (_, inserted) = graph.add_node(reference.to_string(), Arc::new(action));
            if !inserted {
                return Err(Error::DuplicateAction {
                    action: reference.to_string(),
                });
            }
        }

        let edges: Vec<(String, String)> = graph
            .iter_nodes()
            .flat_map(|(_, node)| {
                node.data
                    .dependencies
                    .iter()
                    .map(|dep| (node.key.clone(), dep.to_string()))
            })
            .collect();

        for (dependant, dependency) in edges {
            if !graph.contains_key(&dependency) {
                return Err(Error::configuration(format!(
                    "Action '{dependant}' depends on unknown action '{dependency}'"
                )));
            }
            graph.add_dependency_by_key(&dependant, &dependency)?;
        }

        if let Some(path) = graph.find_cycle() {
            return Err(Error::DependencyCycle { path });
        }

        debug!(
            actions = graph.len(),
            edges = graph.edge_count(),
            "Built action graph"
        );
        Ok(Self { graph })
    }

    /// Look up an action.
    #[must_use]
    pub fn get(&self, reference: &ActionRef) -> Option<&Arc<Action>> {
        self.graph
            .node_by_key(&reference.to_string())
            .map(|node| &node.data)
    }

    /// Look up an action, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAction`] if the reference does not resolve.
    pub fn require(&self, reference: &ActionRef) -> Result<&Arc<Action>> {
        self.get(reference).ok_or_else(|| Error::UnknownAction {
            action: reference.to_string(),
        })
    }

    /// All actions in insertion order.
    pub fn actions(&self) -> impl Iterator<Item = &Arc<Action>> + '_ {
        self.graph.iter_nodes().map(|(_, node)| &node.data)
    }

    /// Actions of one kind, in insertion order.
    #[must_use]
    pub fn actions_of_kind(&self, kind: ActionKind) -> Vec<&Arc<Action>> {
        self.actions().filter(|a| a.kind == kind).collect()
    }

    /// Direct dependencies of an action, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAction`] if the reference does not resolve.
    pub fn dependencies_of(&self, reference: &ActionRef) -> Result<Vec<Arc<Action>>> {
        let idx = self.index(reference)?;
        Ok(self
            .graph
            .dependencies_of(idx)
            .into_iter()
            .filter_map(|dep| self.graph.node(dep).map(|n| Arc::clone(&n.data)))
            .collect())
    }

    /// Actions depending on `reference`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAction`] if the reference does not resolve.
    pub fn dependants_of(
        &self,
        reference: &ActionRef,
        query: &DependantsQuery<'_>,
    ) -> Result<Vec<Arc<Action>>> {
        let idx = self.index(reference)?;
        let candidates = if query.recursive {
            self.graph.dependants_closure(idx)
        } else {
            self.graph.dependants_of(idx)
        };

        Ok(candidates
            .into_iter()
            .filter_map(|dep| self.graph.node(dep).map(|n| &n.data))
            .filter(|action| query.accepts(action))
            .cloned()
            .collect())
    }

    /// Number of actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// Whether the graph has no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    fn index(&self, reference: &ActionRef) -> Result<actiongraph_task_graph::NodeIndex> {
        self.graph
            .index_of(&reference.to_string())
            .ok_or_else(|| Error::UnknownAction {
                action: reference.to_string(),
            })
    }
}
