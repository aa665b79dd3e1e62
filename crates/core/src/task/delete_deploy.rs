//! Deployment teardown.
//!
//! With `dependants_first`, deleting a deploy first deletes every deploy in
//! the deletion set that depends on it, so teardown runs in reverse
//! dependency order.

use super::{Task, TaskContext, TaskLogic, resolve_action_task};
use crate::action::{ActionGraph, ActionKind, ActionRef, DependantsQuery};
use crate::results::{DependencyResults, ResultsStore, TaskOutput};
use crate::router::ActionStatus;
use crate::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::error;

/// Default limit for delete tasks.
pub const DELETE_CONCURRENCY_LIMIT: usize = 10;

/// Task type of delete tasks.
pub const DELETE_DEPLOY_TASK_TYPE: &str = "delete-deploy";

/// Deletes one deploy action.
#[derive(Debug, Clone)]
pub struct DeleteDeployTask {
    delete_deploy_names: Arc<BTreeSet<String>>,
    dependants_first: bool,
}

impl DeleteDeployTask {
    /// Task deleting within the given set of deploy names.
    #[must_use]
    pub fn new(delete_deploy_names: Arc<BTreeSet<String>>, dependants_first: bool) -> Self {
        Self {
            delete_deploy_names,
            dependants_first,
        }
    }
}

#[async_trait]
impl TaskLogic for DeleteDeployTask {
    fn task_type(&self) -> &'static str {
        DELETE_DEPLOY_TASK_TYPE
    }

    fn default_concurrency_limit(&self) -> Option<usize> {
        Some(DELETE_CONCURRENCY_LIMIT)
    }

    fn resolve_dependencies(&self, ctx: &TaskContext, task: &Task) -> Result<Vec<Task>> {
        let action = task.require_action()?;
        let mut deps = vec![resolve_action_task(Arc::clone(action))];

        if self.dependants_first {
            let names = Arc::clone(&self.delete_deploy_names);
            let query = DependantsQuery::direct().filter(move |dependant| {
                dependant.kind == ActionKind::Deploy && names.contains(&dependant.name)
            });

            for dependant in ctx.graph.dependants_of(&action.reference(), &query)? {
                deps.push(Task::new(
                    Self::new(Arc::clone(&self.delete_deploy_names), true),
                    Some(dependant),
                    task.force(),
                ));
            }
        }

        Ok(deps)
    }

    async fn process(
        &self,
        ctx: &TaskContext,
        task: &Task,
        dependencies: &DependencyResults,
    ) -> Result<TaskOutput> {
        let action = task.require_action()?;
        let params = ctx.handler_params(action, task.force(), dependencies);

        match ctx.router.delete(params).await {
            Ok(status) => Ok(TaskOutput::from_outcome(status, Some(action.version.clone()))),
            Err(err) => {
                error!(
                    action = %action.reference(),
                    error = %err,
                    "Failed deleting {}",
                    action.name
                );
                Err(err)
            }
        }
    }
}

/// Delete tasks for the named deploys sharing one deletion set.
///
/// # Errors
///
/// Returns [`crate::Error::UnknownAction`] if a name is not a configured
/// deploy.
pub fn delete_deploys(
    graph: &ActionGraph,
    names: &[String],
    dependants_first: bool,
    force: bool,
) -> Result<Vec<Task>> {
    let set: Arc<BTreeSet<String>> = Arc::new(names.iter().cloned().collect());
    names
        .iter()
        .map(|name| {
            let action = graph.require(&ActionRef::new(ActionKind::Deploy, name.clone()))?;
            Ok(Task::new(
                DeleteDeployTask::new(Arc::clone(&set), dependants_first),
                Some(Arc::clone(action)),
                force,
            ))
        })
        .collect()
}

/// Teardown summary: deploy name to the status its deletion reported.
///
/// Only successful delete results carry a status. The version is not part
/// of the returned status.
#[must_use]
pub fn deleted_deploy_statuses(results: &ResultsStore) -> BTreeMap<String, ActionStatus> {
    results
        .of_type(DELETE_DEPLOY_TASK_TYPE)
        .iter()
        .filter_map(|result| {
            let output = result.output()?;
            let name = result
                .action
                .as_ref()
                .map_or_else(|| result.name().to_string(), |a| a.name.clone());
            Some((name, output.status()))
        })
        .collect()
}
