//! Schedulable tasks.
//!
//! A [`Task`] is a small bookkeeping value (force flag, concurrency limit,
//! owning action) plus a shared [`TaskLogic`] strategy that knows how to
//! discover dependencies, probe status and perform the work. Tasks are
//! cheap to clone and compared by [`TaskKey`].

mod delete_deploy;
mod execute;
mod prepare_environment;
mod publish;
mod resolve_action;

pub use delete_deploy::{
    DELETE_CONCURRENCY_LIMIT, DELETE_DEPLOY_TASK_TYPE, DeleteDeployTask, delete_deploys,
    deleted_deploy_statuses,
};
pub use execute::{BUILD_CONCURRENCY_LIMIT, DEPLOY_CONCURRENCY_LIMIT, ExecuteTask};
pub use prepare_environment::PrepareEnvironmentTask;
pub use publish::{PUBLISH_CONCURRENCY_LIMIT, PublishTask};
pub use resolve_action::{RESOLVE_ACTION_TASK_TYPE, ResolveActionTask};

use crate::action::{Action, ActionGraph};
use crate::results::{DependencyResults, ResultsStore, TaskKey, TaskOutput};
use crate::router::{
    ActionRouter, ActionStatus, HandlerParams, OperationParams, PluginContext, ResolvedVersions,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Everything a task may consult while resolving or running.
///
/// Passed explicitly to every task; there is no global router or store.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Configured actions.
    pub graph: Arc<ActionGraph>,
    /// Provider dispatch.
    pub router: Arc<ActionRouter>,
    /// Results of the current run.
    pub results: Arc<ResultsStore>,
    /// Current run.
    pub run_id: Uuid,
    /// Timeout applied when an action sets none.
    pub default_timeout: Option<Duration>,
}

impl TaskContext {
    /// Create a context with an empty results store.
    #[must_use]
    pub fn new(graph: Arc<ActionGraph>, router: Arc<ActionRouter>) -> Self {
        Self {
            graph,
            router,
            results: Arc::new(ResultsStore::new()),
            run_id: Uuid::new_v4(),
            default_timeout: None,
        }
    }

    /// Set the default operation timeout.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// A copy of this context bound to a fresh run.
    #[must_use]
    pub fn for_run(&self, run_id: Uuid, results: Arc<ResultsStore>) -> Self {
        Self {
            run_id,
            results,
            ..self.clone()
        }
    }

    /// Provider context for `provider`.
    #[must_use]
    pub fn plugin_ctx_for(&self, provider: &str) -> Option<&PluginContext> {
        self.router.plugin_context(provider)
    }

    /// Effective timeout for an action.
    #[must_use]
    pub fn timeout_for(&self, action: &Action) -> Option<Duration> {
        action.timeout.or(self.default_timeout)
    }

    /// Handler parameters for an operation on `action`.
    ///
    /// `dependencies` are the calling task's dependency results; the
    /// versions settled by the action's `resolve-action` dependency are
    /// passed on to the handler.
    #[must_use]
    pub fn handler_params(
        &self,
        action: &Arc<Action>,
        force: bool,
        dependencies: &DependencyResults,
    ) -> HandlerParams {
        self.router.params(
            Arc::clone(action),
            Arc::clone(&self.graph),
            OperationParams {
                force,
                timeout: self.timeout_for(action),
                run_id: Some(self.run_id),
                resolved: resolved_versions(action, dependencies),
                args: serde_json::Value::Null,
            },
        )
    }
}

/// Per-variant task behaviour.
#[async_trait]
pub trait TaskLogic: Send + Sync + fmt::Debug {
    /// Task type discriminator, e.g. `deploy`.
    fn task_type(&self) -> &'static str;

    /// Name component of the task key.
    fn name(&self, task: &Task) -> String {
        task.action()
            .map(|action| action.reference().to_string())
            .unwrap_or_default()
    }

    /// Identity-relevant parameters beyond type and name.
    fn key_params(&self) -> Vec<String> {
        Vec::new()
    }

    /// Default per-type concurrency limit; `None` is unlimited.
    fn default_concurrency_limit(&self) -> Option<usize>;

    /// Tasks that must reach a terminal state before this one runs.
    ///
    /// Must be free of external side effects and must not block on I/O.
    ///
    /// # Errors
    ///
    /// Errors abort the run as configuration errors.
    fn resolve_dependencies(&self, ctx: &TaskContext, task: &Task) -> Result<Vec<Task>>;

    /// Read-only probe of the current state; `None` means no fast path.
    async fn get_status(
        &self,
        _ctx: &TaskContext,
        _task: &Task,
        _dependencies: &DependencyResults,
    ) -> Result<Option<ActionStatus>> {
        Ok(None)
    }

    /// Perform the work.
    async fn process(
        &self,
        ctx: &TaskContext,
        task: &Task,
        dependencies: &DependencyResults,
    ) -> Result<TaskOutput>;

    /// Perform the work after a status probe that found work to do.
    ///
    /// `status` is what [`Self::get_status`] returned; it is `None` for
    /// forced tasks and probes without a fast path.
    async fn process_probed(
        &self,
        ctx: &TaskContext,
        task: &Task,
        dependencies: &DependencyResults,
        _status: Option<&ActionStatus>,
    ) -> Result<TaskOutput> {
        self.process(ctx, task, dependencies).await
    }

    /// Whether the task still runs when a dependency failed.
    fn tolerates_dependency_failure(&self) -> bool {
        false
    }

    /// Human-readable description.
    fn description(&self, task: &Task) -> String {
        match task.action() {
            Some(action) => format!("{} {}", self.task_type(), action.long_description()),
            None => format!("{} {}", self.task_type(), self.name(task)),
        }
    }
}

/// A schedulable unit of work.
#[derive(Clone)]
pub struct Task {
    force: bool,
    concurrency_limit: Option<usize>,
    action: Option<Arc<Action>>,
    logic: Arc<dyn TaskLogic>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("key", &self.key().to_string())
            .field("force", &self.force)
            .field("concurrency_limit", &self.concurrency_limit)
            .finish_non_exhaustive()
    }
}

impl Task {
    /// Create a task with the logic's default concurrency limit.
    pub fn new(logic: impl TaskLogic + 'static, action: Option<Arc<Action>>, force: bool) -> Self {
        let concurrency_limit = logic.default_concurrency_limit();
        Self {
            force,
            concurrency_limit,
            action,
            logic: Arc::new(logic),
        }
    }

    /// Task identity.
    #[must_use]
    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.logic.task_type(), self.logic.name(self))
            .with_params(self.logic.key_params())
    }

    /// Task type.
    #[must_use]
    pub fn task_type(&self) -> &'static str {
        self.logic.task_type()
    }

    /// Whether cached status is bypassed.
    #[must_use]
    pub fn force(&self) -> bool {
        self.force
    }

    /// Per-type concurrency limit; `None` is unlimited.
    #[must_use]
    pub fn concurrency_limit(&self) -> Option<usize> {
        self.concurrency_limit
    }

    /// The action this task operates on.
    #[must_use]
    pub fn action(&self) -> Option<&Arc<Action>> {
        self.action.as_ref()
    }

    /// The action, failing for coordination tasks.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the task has no action.
    pub fn require_action(&self) -> Result<&Arc<Action>> {
        self.action.as_ref().ok_or_else(|| {
            Error::configuration(format!(
                "{} task '{}' requires an action",
                self.task_type(),
                self.logic.name(self)
            ))
        })
    }

    /// Action version, if the task has an action.
    #[must_use]
    pub fn version(&self) -> Option<String> {
        self.action.as_ref().map(|a| a.version.clone())
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> String {
        self.logic.description(self)
    }

    /// Whether the task still runs when a dependency failed.
    #[must_use]
    pub fn tolerates_dependency_failure(&self) -> bool {
        self.logic.tolerates_dependency_failure()
    }

    /// Discover dependencies.
    ///
    /// # Errors
    ///
    /// See [`TaskLogic::resolve_dependencies`].
    pub fn resolve_dependencies(&self, ctx: &TaskContext) -> Result<Vec<Task>> {
        self.logic.resolve_dependencies(ctx, self)
    }

    /// Probe status.
    ///
    /// # Errors
    ///
    /// Probe errors are returned unmodified.
    pub async fn get_status(
        &self,
        ctx: &TaskContext,
        dependencies: &DependencyResults,
    ) -> Result<Option<ActionStatus>> {
        self.logic.get_status(ctx, self, dependencies).await
    }

    /// Perform the work, given the status an earlier probe reported.
    ///
    /// # Errors
    ///
    /// Processing errors are returned unmodified.
    pub async fn process(
        &self,
        ctx: &TaskContext,
        dependencies: &DependencyResults,
        status: Option<&ActionStatus>,
    ) -> Result<TaskOutput> {
        self.logic
            .process_probed(ctx, self, dependencies, status)
            .await
    }

    /// Whether a probed status lets the task skip `process`.
    ///
    /// The status must be ready, and a reported version must match the
    /// action version.
    #[must_use]
    pub fn is_satisfied_by(&self, status: &ActionStatus) -> bool {
        if !status.ready() {
            return false;
        }
        match (status.version(), self.action.as_ref()) {
            (Some(reported), Some(action)) => reported == action.version,
            _ => true,
        }
    }
}

/// The task that brings a dependency action into its goal state.
#[must_use]
pub fn execution_task_for(action: Arc<Action>, force: bool) -> Task {
    let kind = action.kind;
    Task::new(ExecuteTask::new(kind), Some(action), force)
}

/// Build task for an action.
#[must_use]
pub fn build_task(action: Arc<Action>, force: bool) -> Task {
    Task::new(ExecuteTask::build(), Some(action), force)
}

/// Deploy task for an action.
#[must_use]
pub fn deploy_task(action: Arc<Action>, force: bool) -> Task {
    Task::new(ExecuteTask::deploy(), Some(action), force)
}

/// Run task for an action.
#[must_use]
pub fn run_task(action: Arc<Action>, force: bool) -> Task {
    Task::new(ExecuteTask::run(), Some(action), force)
}

/// Test task for an action.
#[must_use]
pub fn test_task(action: Arc<Action>, force: bool) -> Task {
    Task::new(ExecuteTask::test(), Some(action), force)
}

/// Resolve task for an action.
#[must_use]
pub fn resolve_action_task(action: Arc<Action>) -> Task {
    Task::new(ResolveActionTask, Some(action), false)
}

/// Dependencies shared by every action-executing task: the action's own
/// resolve task, then the execution task of each action dependency.
pub(crate) fn action_execution_dependencies(ctx: &TaskContext, task: &Task) -> Result<Vec<Task>> {
    let action = task.require_action()?;
    let mut deps = vec![resolve_action_task(Arc::clone(action))];
    for dependency in ctx.graph.dependencies_of(&action.reference())? {
        deps.push(execution_task_for(dependency, false));
    }
    Ok(deps)
}

/// Versions settled by the `resolve-action` result for `action`, when one
/// is among `dependencies` and succeeded.
#[must_use]
pub fn resolved_versions(
    action: &Action,
    dependencies: &DependencyResults,
) -> Option<ResolvedVersions> {
    let key = TaskKey::new(RESOLVE_ACTION_TASK_TYPE, action.reference().to_string());
    let output = dependencies.get(&key)?.output()?;
    let version = output.version.clone()?;
    let dependency_versions = output
        .outputs
        .get("dependencyVersions")
        .and_then(serde_json::Value::as_object)
        .map(|versions| {
            versions
                .iter()
                .filter_map(|(name, value)| Some((name.clone(), value.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default();
    Some(ResolvedVersions {
        version,
        dependencies: dependency_versions,
    })
}
