//! Publish a built artifact.

use super::{Task, TaskContext, TaskLogic, build_task};
use crate::action::ActionKind;
use crate::results::{DependencyResults, TaskOutput};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Default limit for publish tasks.
pub const PUBLISH_CONCURRENCY_LIMIT: usize = 5;

/// Publishes the artifact of a build action once the build succeeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishTask;

#[async_trait]
impl TaskLogic for PublishTask {
    fn task_type(&self) -> &'static str {
        "publish"
    }

    fn default_concurrency_limit(&self) -> Option<usize> {
        Some(PUBLISH_CONCURRENCY_LIMIT)
    }

    fn resolve_dependencies(&self, _ctx: &TaskContext, task: &Task) -> Result<Vec<Task>> {
        let action = task.require_action()?;
        if action.kind != ActionKind::Build {
            return Err(Error::configuration(format!(
                "Only build actions can be published, got {}",
                action.reference()
            )));
        }
        Ok(vec![build_task(Arc::clone(action), false)])
    }

    async fn process(
        &self,
        ctx: &TaskContext,
        task: &Task,
        dependencies: &DependencyResults,
    ) -> Result<TaskOutput> {
        let action = task.require_action()?;
        let outcome = ctx
            .router
            .publish(ctx.handler_params(action, task.force(), dependencies))
            .await?;
        Ok(TaskOutput::from_outcome(outcome, Some(action.version.clone())))
    }
}
