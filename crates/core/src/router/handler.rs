//! Provider handler contract.
//!
//! Providers implement [`ActionHandler`] for mutating operations,
//! [`StatusHandler`] for read-only status probes and optionally
//! [`EnvironmentHandler`] for provider-level environment preparation.
//! Handlers are stored as `Arc<dyn …>` and shared by every task of a run.

use crate::Result;
use crate::action::{Action, ActionGraph, ActionKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Mutating operations a provider can handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Build an artifact.
    Build,
    /// Publish a built artifact.
    Publish,
    /// Deploy a workload.
    Deploy,
    /// Delete a deployed workload.
    Delete,
    /// Execute a one-off job.
    Run,
    /// Execute a test job.
    Test,
}

impl Operation {
    /// Name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Publish => "publish",
            Self::Deploy => "deploy",
            Self::Delete => "delete",
            Self::Run => "run",
            Self::Test => "test",
        }
    }

    /// The operation that brings an action of `kind` into its goal state.
    #[must_use]
    pub const fn execute_for(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Build => Self::Build,
            ActionKind::Deploy => Self::Deploy,
            ActionKind::Run => Self::Run,
            ActionKind::Test => Self::Test,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only status probes, one per action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusOperation {
    /// Status of a build.
    GetBuildStatus,
    /// Status of a deployment.
    GetDeployStatus,
    /// Cached result of a run.
    GetRunResult,
    /// Cached result of a test.
    GetTestResult,
}

impl StatusOperation {
    /// The probe for actions of `kind`.
    #[must_use]
    pub const fn for_kind(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Build => Self::GetBuildStatus,
            ActionKind::Deploy => Self::GetDeployStatus,
            ActionKind::Run => Self::GetRunResult,
            ActionKind::Test => Self::GetTestResult,
        }
    }

    /// Name of the probe.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetBuildStatus => "getBuildStatus",
            Self::GetDeployStatus => "getDeployStatus",
            Self::GetRunResult => "getRunResult",
            Self::GetTestResult => "getTestResult",
        }
    }
}

impl fmt::Display for StatusOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of an action as reported by its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionState {
    /// The goal state holds.
    Ready,
    /// The action exists but is not in its goal state.
    NotReady,
    /// The action exists with a different version.
    Outdated,
    /// State could not be determined.
    #[default]
    Unknown,
    /// The last operation failed.
    Failed,
    /// The action was removed.
    Deleted,
}

impl ActionState {
    /// Kebab-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::NotReady => "not-ready",
            Self::Outdated => "outdated",
            Self::Unknown => "unknown",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a handler or status probe.
///
/// `detail` and `outputs` are passed through without interpretation, except
/// for the conventional `version` output compared against the action version.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Resulting state.
    pub state: ActionState,
    /// Provider-specific detail.
    #[serde(default)]
    pub detail: serde_json::Value,
    /// Named outputs readable by dependants.
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

/// Status probes return the same shape as handlers.
pub type ActionStatus = ActionOutcome;

impl ActionOutcome {
    /// Create an outcome with the given state.
    #[must_use]
    pub fn new(state: ActionState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// Set the detail.
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    /// Add an output.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }

    /// Whether the goal state holds.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.state == ActionState::Ready
    }

    /// The `version` output, if the provider reported one.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.outputs.get("version").and_then(serde_json::Value::as_str)
    }
}

/// Per-provider context handed to every handler.
#[derive(Debug, Clone, Default)]
pub struct PluginContext {
    /// Provider name.
    pub provider: String,
    /// Resolved provider mode.
    pub mode: Option<String>,
    /// Provider configuration.
    pub config: Arc<serde_json::Value>,
}

/// Operation-specific parameters.
#[derive(Debug, Clone, Default)]
pub struct OperationParams {
    /// Bypass cached state.
    pub force: bool,
    /// Operation timeout the handler should respect.
    pub timeout: Option<Duration>,
    /// Run the operation belongs to.
    pub run_id: Option<Uuid>,
    /// Versions the action resolved to before the operation.
    pub resolved: Option<ResolvedVersions>,
    /// Free-form extra arguments.
    pub args: serde_json::Value,
}

/// Versions settled when an action was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedVersions {
    /// Version of the action itself.
    pub version: String,
    /// Versions of its dependencies, keyed by action reference.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

/// Parameter bundle passed to every handler.
#[derive(Debug, Clone)]
pub struct HandlerParams {
    /// Provider context.
    pub ctx: PluginContext,
    /// Span scoped to this action and operation.
    pub log: tracing::Span,
    /// The action being operated on.
    pub action: Arc<Action>,
    /// The full action graph.
    pub graph: Arc<ActionGraph>,
    /// Operation-specific values.
    pub extra: OperationParams,
}

/// Provider-level environment state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvironmentStatus {
    /// Whether the environment is ready for actions.
    pub ready: bool,
    /// Outputs exposed to actions.
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

/// Handler for a mutating operation.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Perform the operation.
    async fn handle(&self, params: HandlerParams) -> Result<ActionOutcome>;
}

/// Handler for a status probe.
///
/// `Ok(None)` means no fast path is available.
#[async_trait]
pub trait StatusHandler: Send + Sync {
    /// Probe the current status.
    async fn status(&self, params: HandlerParams) -> Result<Option<ActionStatus>>;
}

/// Provider-level environment preparation.
#[async_trait]
pub trait EnvironmentHandler: Send + Sync {
    /// Report whether the environment is ready.
    async fn get_environment_status(&self, ctx: &PluginContext) -> Result<EnvironmentStatus>;

    /// Bring the environment into a ready state.
    async fn prepare_environment(
        &self,
        ctx: &PluginContext,
        status: &EnvironmentStatus,
        force: bool,
    ) -> Result<EnvironmentStatus>;
}

#[async_trait]
impl<F, Fut> ActionHandler for F
where
    F: Fn(HandlerParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ActionOutcome>> + Send + 'static,
{
    async fn handle(&self, params: HandlerParams) -> Result<ActionOutcome> {
        self(params).await
    }
}

#[async_trait]
impl<F, Fut> StatusHandler for F
where
    F: Fn(HandlerParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<ActionStatus>>> + Send + 'static,
{
    async fn status(&self, params: HandlerParams) -> Result<Option<ActionStatus>> {
        self(params).await
    }
}
