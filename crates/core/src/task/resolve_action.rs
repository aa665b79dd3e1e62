//! Resolve an action's final configuration before anything operates on it.

use super::{PrepareEnvironmentTask, Task, TaskContext, TaskLogic, resolve_action_task};
use crate::results::{DependencyResults, TaskOutput};
use crate::Result;
use crate::router::ActionState;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Task type of resolve tasks.
pub const RESOLVE_ACTION_TASK_TYPE: &str = "resolve-action";

/// Resolves one action.
///
/// Depends on the owning provider's environment (when the provider has an
/// environment handler) and on the resolve tasks of every action dependency.
/// Processing is pure: it summarises the action and the versions its
/// dependencies resolved to.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveActionTask;

#[async_trait]
impl TaskLogic for ResolveActionTask {
    fn task_type(&self) -> &'static str {
        RESOLVE_ACTION_TASK_TYPE
    }

    fn default_concurrency_limit(&self) -> Option<usize> {
        None
    }

    fn resolve_dependencies(&self, ctx: &TaskContext, task: &Task) -> Result<Vec<Task>> {
        let action = task.require_action()?;
        let mut deps = Vec::new();

        if let Some(provider) = ctx.router.provider_for(action.kind, &action.action_type)
            && ctx.router.environment(provider).is_some()
        {
            deps.push(Task::new(
                PrepareEnvironmentTask::new(provider),
                None,
                false,
            ));
        }

        for dependency in ctx.graph.dependencies_of(&action.reference())? {
            deps.push(resolve_action_task(dependency));
        }
        Ok(deps)
    }

    async fn process(
        &self,
        _ctx: &TaskContext,
        task: &Task,
        dependencies: &DependencyResults,
    ) -> Result<TaskOutput> {
        let action = task.require_action()?;

        let dependency_versions: Map<String, Value> = dependencies
            .of_type(self.task_type())
            .filter_map(|result| {
                let version = result.output()?.version.clone()?;
                Some((result.name().to_string(), Value::String(version)))
            })
            .collect();

        let mut outputs = BTreeMap::new();
        outputs.insert("version".to_string(), Value::String(action.version.clone()));
        outputs.insert(
            "dependencyVersions".to_string(),
            Value::Object(dependency_versions),
        );

        Ok(TaskOutput {
            state: ActionState::Ready,
            detail: json!({
                "action": action.reference().to_string(),
                "type": action.action_type,
                "disabled": action.disabled,
                "spec": action.spec,
            }),
            outputs,
            version: Some(action.version.clone()),
        })
    }
}
