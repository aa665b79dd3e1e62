//! Action task graph engine.
//!
//! Turns requests such as "deploy these services" or "tear down these
//! deploys" into a graph of tasks, resolves their dependencies, dispatches
//! each task's work to the provider handling its action type, and runs the
//! graph with per-task-type concurrency limits.
//!
//! # Key Types
//!
//! - [`ActionGraph`]: configured actions and their dependencies
//! - [`ActionRouter`]: dispatch from action kind, type and operation to provider handlers
//! - [`Task`]: a schedulable unit of work backed by a [`TaskLogic`] strategy
//! - [`GraphSolver`]: resolves requested tasks and runs the resulting graph
//! - [`ResultsStore`]: append-only record of every task's terminal outcome
//!
//! # Example
//!
//! ```ignore
//! use actiongraph_core::{
//!     ActionGraph, ActionKind, ActionRouter, GraphSolver, SolverConfig, TaskContext, deploy_task,
//! };
//! use std::sync::Arc;
//!
//! let config = SolverConfig::load("actiongraph.toml")?;
//! let graph = Arc::new(ActionGraph::new(actions)?);
//! let router = Arc::new(ActionRouter::new(providers, config.providers.clone())?);
//!
//! let solver = GraphSolver::new(TaskContext::new(Arc::clone(&graph), router), config);
//! let requests = graph
//!     .actions_of_kind(ActionKind::Deploy)
//!     .into_iter()
//!     .map(|action| deploy_task(Arc::clone(action), false))
//!     .collect();
//!
//! let result = solver.solve(requests).await?;
//! if let Some(summary) = result.error_summary() {
//!     eprintln!("{summary}");
//! }
//! ```

pub mod action;
pub mod config;
pub mod error;
pub mod resolver;
pub mod results;
pub mod router;
pub mod solver;
pub mod task;

pub use action::{Action, ActionGraph, ActionKind, ActionRef, DependantsQuery};
pub use config::{LogConfig, SolverConfig};
pub use error::{Error, Result};
pub use resolver::{ResolvedGraph, resolve};
pub use results::{
    DependencyResults, GraphResult, GraphResultsExport, ResultExport, ResultsStore, TaskKey,
    TaskOutcome, TaskOutput,
};
pub use router::{
    ActionHandler, ActionOutcome, ActionRouter, ActionState, ActionStatus, EnvironmentHandler,
    EnvironmentStatus, HandlerParams, Operation, OperationParams, PluginContext, ProviderConfig,
    ProviderRegistration, ResolvedVersions, StatusHandler, StatusOperation,
};
pub use solver::{GraphSolver, SolveResult};
pub use task::{
    DeleteDeployTask, ExecuteTask, PrepareEnvironmentTask, PublishTask,
    RESOLVE_ACTION_TASK_TYPE, ResolveActionTask, Task, TaskContext, TaskLogic, build_task,
    delete_deploys, deleted_deploy_statuses, deploy_task, execution_task_for,
    resolve_action_task, resolved_versions, run_task, test_task,
};
