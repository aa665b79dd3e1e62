//! Build, deploy, run and test tasks.
//!
//! All four bring one action into its goal state through the router and only
//! differ in operation, status probe, concurrency limit and whether the
//! operation is bounded by a timeout.

use super::{Task, TaskContext, TaskLogic, action_execution_dependencies};
use crate::action::ActionKind;
use crate::results::{DependencyResults, TaskOutput};
use crate::router::{ActionOutcome, ActionState, ActionStatus, Operation};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::{Instrument, debug};

/// Default limit for build tasks.
pub const BUILD_CONCURRENCY_LIMIT: usize = 5;

/// Default limit for deploy, run and test tasks.
pub const DEPLOY_CONCURRENCY_LIMIT: usize = 10;

/// Executes the operation matching the action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteTask {
    kind: ActionKind,
}

impl ExecuteTask {
    /// Task for actions of `kind`.
    #[must_use]
    pub const fn new(kind: ActionKind) -> Self {
        Self { kind }
    }

    /// Build task.
    #[must_use]
    pub const fn build() -> Self {
        Self::new(ActionKind::Build)
    }

    /// Deploy task.
    #[must_use]
    pub const fn deploy() -> Self {
        Self::new(ActionKind::Deploy)
    }

    /// Run task.
    #[must_use]
    pub const fn run() -> Self {
        Self::new(ActionKind::Run)
    }

    /// Test task.
    #[must_use]
    pub const fn test() -> Self {
        Self::new(ActionKind::Test)
    }

    fn operation(self) -> Operation {
        Operation::execute_for(self.kind)
    }

    fn enforces_timeout(self) -> bool {
        matches!(self.kind, ActionKind::Run | ActionKind::Test)
    }
}

#[async_trait]
impl TaskLogic for ExecuteTask {
    fn task_type(&self) -> &'static str {
        self.kind.as_str()
    }

    fn default_concurrency_limit(&self) -> Option<usize> {
        match self.kind {
            ActionKind::Build => Some(BUILD_CONCURRENCY_LIMIT),
            ActionKind::Deploy | ActionKind::Run | ActionKind::Test => {
                Some(DEPLOY_CONCURRENCY_LIMIT)
            }
        }
    }

    fn resolve_dependencies(&self, ctx: &TaskContext, task: &Task) -> Result<Vec<Task>> {
        let action = task.require_action()?;
        if action.kind != self.kind {
            return Err(Error::configuration(format!(
                "{} task cannot operate on {}",
                self.kind,
                action.reference()
            )));
        }
        action_execution_dependencies(ctx, task)
    }

    async fn get_status(
        &self,
        ctx: &TaskContext,
        task: &Task,
        dependencies: &DependencyResults,
    ) -> Result<Option<ActionStatus>> {
        let action = task.require_action()?;
        if action.disabled {
            return Ok(None);
        }
        ctx.router
            .get_status(ctx.handler_params(action, task.force(), dependencies))
            .await
    }

    async fn process(
        &self,
        ctx: &TaskContext,
        task: &Task,
        dependencies: &DependencyResults,
    ) -> Result<TaskOutput> {
        let action = task.require_action()?;
        if action.disabled {
            debug!(action = %action.reference(), "Action is disabled, nothing to do");
            return Ok(TaskOutput::from_outcome(
                ActionOutcome::new(ActionState::Unknown).with_detail(json!({ "disabled": true })),
                Some(action.version.clone()),
            ));
        }

        let operation = self.operation();
        let params = ctx.handler_params(action, task.force(), dependencies);
        let version = params
            .extra
            .resolved
            .as_ref()
            .map_or_else(|| action.version.clone(), |resolved| resolved.version.clone());
        let span = params.log.clone();
        let call = ctx.router.call(operation, params);

        let outcome = match ctx.timeout_for(action).filter(|_| self.enforces_timeout()) {
            Some(limit) => tokio::time::timeout(limit, call)
                .instrument(span)
                .await
                .map_err(|_| {
                    Error::timeout(format!("{operation} {}", action.reference()), limit)
                })??,
            None => call.instrument(span).await?,
        };

        if outcome.state == ActionState::Failed {
            return Err(Error::operation(
                action.reference().to_string(),
                operation.as_str(),
                failure_message(&outcome),
            ));
        }

        Ok(TaskOutput::from_outcome(outcome, Some(version)))
    }
}

fn failure_message(outcome: &ActionOutcome) -> String {
    match &outcome.detail {
        serde_json::Value::String(message) => message.clone(),
        serde_json::Value::Null => "provider reported a failed state".to_string(),
        other => other.to_string(),
    }
}
