//! Provider environment preparation.

use super::{Task, TaskContext, TaskLogic};
use crate::results::{DependencyResults, TaskOutput};
use crate::router::{
    ActionOutcome, ActionState, ActionStatus, EnvironmentHandler, EnvironmentStatus, PluginContext,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Prepares the environment of one provider.
///
/// Coordination task: it has no action and is keyed by provider name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareEnvironmentTask {
    provider: String,
}

impl PrepareEnvironmentTask {
    /// Task for the named provider.
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }

    fn handler(&self, ctx: &TaskContext) -> Result<(Arc<dyn EnvironmentHandler>, PluginContext)> {
        let handler = ctx.router.environment(&self.provider).ok_or_else(|| {
            Error::configuration(format!(
                "Provider '{}' has no environment handler",
                self.provider
            ))
        })?;
        let plugin_ctx = ctx.plugin_ctx_for(&self.provider).cloned().unwrap_or_default();
        Ok((handler, plugin_ctx))
    }
}

#[async_trait]
impl TaskLogic for PrepareEnvironmentTask {
    fn task_type(&self) -> &'static str {
        "prepare-environment"
    }

    fn name(&self, _task: &Task) -> String {
        self.provider.clone()
    }

    fn default_concurrency_limit(&self) -> Option<usize> {
        None
    }

    fn resolve_dependencies(&self, _ctx: &TaskContext, _task: &Task) -> Result<Vec<Task>> {
        Ok(Vec::new())
    }

    async fn get_status(
        &self,
        ctx: &TaskContext,
        _task: &Task,
        _dependencies: &DependencyResults,
    ) -> Result<Option<ActionStatus>> {
        let (handler, plugin_ctx) = self.handler(ctx)?;
        let status = handler.get_environment_status(&plugin_ctx).await?;
        let state = if status.ready {
            ActionState::Ready
        } else {
            ActionState::NotReady
        };
        Ok(Some(ActionOutcome {
            state,
            outputs: status.outputs,
            ..ActionOutcome::default()
        }))
    }

    async fn process(
        &self,
        ctx: &TaskContext,
        task: &Task,
        dependencies: &DependencyResults,
    ) -> Result<TaskOutput> {
        self.process_probed(ctx, task, dependencies, None).await
    }

    async fn process_probed(
        &self,
        ctx: &TaskContext,
        task: &Task,
        _dependencies: &DependencyResults,
        status: Option<&ActionStatus>,
    ) -> Result<TaskOutput> {
        let (handler, plugin_ctx) = self.handler(ctx)?;
        let current = match status {
            Some(probed) => EnvironmentStatus {
                ready: probed.ready(),
                outputs: probed.outputs.clone(),
            },
            None => handler.get_environment_status(&plugin_ctx).await?,
        };

        info!(provider = %self.provider, force = task.force(), "Preparing environment");
        let prepared = handler
            .prepare_environment(&plugin_ctx, &current, task.force())
            .await?;

        if !prepared.ready {
            return Err(Error::operation(
                self.provider.clone(),
                "prepareEnvironment",
                "environment is not ready after preparation",
            ));
        }

        Ok(TaskOutput {
            state: ActionState::Ready,
            outputs: prepared.outputs,
            ..TaskOutput::default()
        })
    }
}
