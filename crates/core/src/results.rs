//! Results Store: the append-only record of task outcomes for one run.
//!
//! Every node of the task graph writes exactly one [`GraphResult`], after its
//! own terminal transition. Results are immutable once recorded and are
//! shared as `Arc<GraphResult>` with dependants and the caller.

use crate::action::ActionRef;
use crate::router::{ActionOutcome, ActionState, ActionStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Identity of a task node.
///
/// Two tasks with the same key are the same node: the resolver keeps the
/// first instance and every dependant shares its result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    /// Task type, e.g. `deploy`.
    pub task_type: String,
    /// Task name, the action reference for action tasks.
    pub name: String,
    /// Identity-relevant parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
}

impl TaskKey {
    /// Key without parameters.
    #[must_use]
    pub fn new(task_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Add identity parameters.
    #[must_use]
    pub fn with_params(mut self, params: Vec<String>) -> Self {
        self.params = params;
        self
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.task_type, self.name)?;
        if !self.params.is_empty() {
            write!(f, "[{}]", self.params.join(","))?;
        }
        Ok(())
    }
}

/// Provider result merged with the action version.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Resulting state.
    pub state: ActionState,
    /// Provider-specific detail.
    #[serde(default)]
    pub detail: serde_json::Value,
    /// Named outputs.
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// Version of the action the output belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl TaskOutput {
    /// Merge a provider outcome with a version.
    #[must_use]
    pub fn from_outcome(outcome: ActionOutcome, version: Option<String>) -> Self {
        Self {
            state: outcome.state,
            detail: outcome.detail,
            outputs: outcome.outputs,
            version,
        }
    }

    /// The provider status, without the version.
    #[must_use]
    pub fn status(&self) -> ActionStatus {
        ActionStatus {
            state: self.state,
            detail: self.detail.clone(),
            outputs: self.outputs.clone(),
        }
    }
}

/// Terminal outcome of a task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// `process` ran and succeeded.
    Processed(TaskOutput),
    /// The status probe reported the goal state, `process` did not run.
    AlreadySatisfied(TaskOutput),
    /// The task failed directly.
    Failed(Arc<Error>),
    /// The task was not attempted because dependencies failed.
    DependencyFailed {
        /// Failed dependency keys, in discovery order.
        failed: Vec<TaskKey>,
    },
}

impl TaskOutcome {
    /// Whether the task reached its goal.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Processed(_) | Self::AlreadySatisfied(_))
    }

    /// Whether the task failed, directly or through a dependency.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.succeeded()
    }

    /// The output of a successful task.
    #[must_use]
    pub fn output(&self) -> Option<&TaskOutput> {
        match self {
            Self::Processed(output) | Self::AlreadySatisfied(output) => Some(output),
            Self::Failed(_) | Self::DependencyFailed { .. } => None,
        }
    }

    /// The error of a directly failed task.
    #[must_use]
    pub fn error(&self) -> Option<&Arc<Error>> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Short label for reporting.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Processed(_) => "processed",
            Self::AlreadySatisfied(_) => "already-satisfied",
            Self::Failed(_) => "failed",
            Self::DependencyFailed { .. } => "dependency-failed",
        }
    }
}

/// Recorded outcome of one task node.
#[derive(Debug, Clone)]
pub struct GraphResult {
    /// Task identity.
    pub key: TaskKey,
    /// Action the task operated on.
    pub action: Option<ActionRef>,
    /// Terminal outcome.
    pub outcome: TaskOutcome,
    /// Results of the task's dependencies.
    pub dependency_results: DependencyResults,
    /// Action version the task ran against.
    pub version: Option<String>,
    /// When processing started; `None` if `process` never ran.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached its terminal state.
    pub completed_at: DateTime<Utc>,
}

impl GraphResult {
    /// Task type.
    #[must_use]
    pub fn task_type(&self) -> &str {
        &self.key.task_type
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// Whether the task reached its goal.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome.succeeded()
    }

    /// Output of a successful task.
    #[must_use]
    pub fn output(&self) -> Option<&TaskOutput> {
        self.outcome.output()
    }

    /// Error of a directly failed task.
    #[must_use]
    pub fn error(&self) -> Option<&Arc<Error>> {
        self.outcome.error()
    }
}

/// Results of a task's dependencies, in dependency order.
#[derive(Debug, Clone, Default)]
pub struct DependencyResults {
    results: Vec<Arc<GraphResult>>,
}

impl DependencyResults {
    /// Wrap a list of results.
    #[must_use]
    pub fn new(results: Vec<Arc<GraphResult>>) -> Self {
        Self { results }
    }

    /// Result for a dependency key.
    #[must_use]
    pub fn get(&self, key: &TaskKey) -> Option<&Arc<GraphResult>> {
        self.results.iter().find(|r| &r.key == key)
    }

    /// Results of one task type.
    pub fn of_type<'a>(&'a self, task_type: &'a str) -> impl Iterator<Item = &'a Arc<GraphResult>> {
        self.results.iter().filter(move |r| r.task_type() == task_type)
    }

    /// Failed dependency results.
    #[must_use]
    pub fn failed(&self) -> Vec<&Arc<GraphResult>> {
        self.results.iter().filter(|r| !r.succeeded()).collect()
    }

    /// Whether every dependency succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.succeeded())
    }

    /// Iterate all results.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<GraphResult>> {
        self.results.iter()
    }

    /// Number of dependency results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether there are no dependency results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Whether a result for `key` is present.
    #[must_use]
    pub fn contains(&self, key: &TaskKey) -> bool {
        self.get(key).is_some()
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    results: Vec<Arc<GraphResult>>,
    index: HashMap<TaskKey, usize>,
}

/// Append-only, insertion-ordered collection of task results.
#[derive(Debug, Default)]
pub struct ResultsStore {
    inner: RwLock<StoreInner>,
}

impl ResultsStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateResult`] if the key was already recorded.
    pub fn record(&self, result: GraphResult) -> Result<Arc<GraphResult>> {
        let mut inner = self.inner.write();
        if inner.index.contains_key(&result.key) {
            return Err(Error::DuplicateResult {
                key: result.key.to_string(),
            });
        }
        let result = Arc::new(result);
        let position = inner.results.len();
        inner.index.insert(result.key.clone(), position);
        inner.results.push(Arc::clone(&result));
        Ok(result)
    }

    /// All results in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<GraphResult>> {
        self.inner.read().results.clone()
    }

    /// Results of one task type, in insertion order.
    #[must_use]
    pub fn of_type(&self, task_type: &str) -> Vec<Arc<GraphResult>> {
        self.filtered(|r| r.task_type() == task_type)
    }

    /// Result for a task key.
    #[must_use]
    pub fn get(&self, key: &TaskKey) -> Option<Arc<GraphResult>> {
        let inner = self.inner.read();
        inner
            .index
            .get(key)
            .map(|&position| Arc::clone(&inner.results[position]))
    }

    /// Results whose dependency results include `key`.
    #[must_use]
    pub fn dependants_of(&self, key: &TaskKey) -> Vec<Arc<GraphResult>> {
        self.filtered(|r| r.dependency_results.contains(key))
    }

    /// Successful results.
    #[must_use]
    pub fn succeeded(&self) -> Vec<Arc<GraphResult>> {
        self.filtered(|r| r.succeeded())
    }

    /// Failed results, direct or propagated.
    #[must_use]
    pub fn failed(&self) -> Vec<Arc<GraphResult>> {
        self.filtered(|r| !r.succeeded())
    }

    /// Number of recorded results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().results.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().results.is_empty()
    }

    /// Serializable summary of every result.
    #[must_use]
    pub fn export(&self) -> GraphResultsExport {
        GraphResultsExport {
            results: self.all().iter().map(|r| ResultExport::from(r.as_ref())).collect(),
        }
    }

    fn filtered(&self, predicate: impl Fn(&GraphResult) -> bool) -> Vec<Arc<GraphResult>> {
        self.inner
            .read()
            .results
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }
}

/// JSON-friendly summary of a results store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphResultsExport {
    /// One entry per task, in insertion order.
    pub results: Vec<ResultExport>,
}

/// JSON-friendly summary of one result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultExport {
    /// Task key, rendered.
    pub key: String,
    /// Task type.
    pub task_type: String,
    /// Action reference, rendered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Outcome label.
    pub outcome: String,
    /// Action state of successful tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<ActionState>,
    /// Error message of directly failed tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failed dependencies of dependency-failed tasks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_dependencies: Vec<String>,
    /// Action version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl From<&GraphResult> for ResultExport {
    fn from(result: &GraphResult) -> Self {
        let failed_dependencies = match &result.outcome {
            TaskOutcome::DependencyFailed { failed } => {
                failed.iter().map(ToString::to_string).collect()
            }
            _ => Vec::new(),
        };
        Self {
            key: result.key.to_string(),
            task_type: result.key.task_type.clone(),
            action: result.action.as_ref().map(ToString::to_string),
            outcome: result.outcome.label().to_string(),
            state: result.output().map(|o| o.state),
            error: result.error().map(ToString::to_string),
            failed_dependencies,
            version: result.version.clone(),
        }
    }
}
