//! Graph Scheduler: run a resolved task graph to completion.
//!
//! A single coordinator loop owns all scheduling state. Task futures run on
//! a [`JoinSet`] and report back to the coordinator, which records their
//! result, releases their concurrency slot and readies their dependants.
//!
//! Each node moves through
//! `Pending -> Ready -> [Probing] -> Runnable -> Running -> Succeeded | Failed`.
//! Probing calls `get_status` without taking a concurrency slot; only
//! `process` counts against the per-type limit. A node whose dependency
//! failed short-circuits to a dependency failure unless its task tolerates
//! failed dependencies.

use crate::config::SolverConfig;
use crate::resolver::{self, ResolvedGraph};
use crate::results::{
    DependencyResults, GraphResult, GraphResultsExport, ResultsStore, TaskKey, TaskOutcome,
    TaskOutput,
};
use crate::router::ActionStatus;
use crate::task::{Task, TaskContext};
use crate::{Error, Result};
use actiongraph_events::{
    emit_graph_completed, emit_graph_resolved, emit_task_completed, emit_task_dependency_failed,
    emit_task_failed, emit_task_skipped, emit_task_started,
};
use actiongraph_task_graph::NodeIndex;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{Instrument, Span, debug, info, info_span, instrument};
use uuid::Uuid;

/// Outcome of one solve.
#[derive(Debug, Clone)]
pub struct SolveResult {
    /// Identifier of the run.
    pub run_id: Uuid,
    /// Every node's result, in completion order.
    pub results: Arc<ResultsStore>,
    /// Keys of the requested tasks, duplicates removed.
    pub roots: Vec<TaskKey>,
    /// Whether every requested task succeeded.
    pub success: bool,
}

impl SolveResult {
    /// Results of the requested tasks, in request order.
    #[must_use]
    pub fn root_results(&self) -> Vec<Arc<GraphResult>> {
        self.roots
            .iter()
            .filter_map(|key| self.results.get(key))
            .collect()
    }

    /// One line per failed node, `None` when nothing failed.
    ///
    /// Direct failures carry their error, propagated failures name the
    /// dependencies they were waiting on.
    #[must_use]
    pub fn error_summary(&self) -> Option<String> {
        let failed = self.results.failed();
        if failed.is_empty() {
            return None;
        }

        let mut summary = String::new();
        for result in failed {
            match &result.outcome {
                TaskOutcome::Failed(err) => {
                    let _ = writeln!(summary, "{}: {err}", result.key);
                }
                TaskOutcome::DependencyFailed { failed } => {
                    let _ = writeln!(
                        summary,
                        "{}: skipped, dependency failed ({})",
                        result.key,
                        join_keys(failed)
                    );
                }
                TaskOutcome::Processed(_) | TaskOutcome::AlreadySatisfied(_) => {}
            }
        }
        Some(summary.trim_end().to_string())
    }

    /// Serializable summary of all results.
    #[must_use]
    pub fn export(&self) -> GraphResultsExport {
        self.results.export()
    }
}

/// Runs task graphs against one action graph and router.
#[derive(Debug, Clone)]
pub struct GraphSolver {
    ctx: TaskContext,
    config: SolverConfig,
}

impl GraphSolver {
    /// Create a solver. The configured default timeout, if any, replaces the
    /// context's.
    #[must_use]
    pub fn new(ctx: TaskContext, config: SolverConfig) -> Self {
        let ctx = match config.default_timeout() {
            Some(timeout) => ctx.with_default_timeout(Some(timeout)),
            None => ctx,
        };
        Self { ctx, config }
    }

    /// The context tasks are run with.
    #[must_use]
    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    /// Solver configuration.
    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Resolve `tasks` into a graph and run every node to a terminal state.
    ///
    /// Every solve gets a fresh run id and results store.
    ///
    /// # Errors
    ///
    /// Only configuration-class problems abort the solve: invalid limits,
    /// dependency discovery errors and dependency cycles. These are raised
    /// before any task runs. Task failures are recorded in the results.
    #[instrument(
        name = "solve",
        skip_all,
        fields(requested = tasks.len(), run_id = tracing::field::Empty)
    )]
    pub async fn solve(&self, tasks: Vec<Task>) -> Result<SolveResult> {
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        Span::current().record("run_id", tracing::field::display(run_id));
        let results = Arc::new(ResultsStore::new());
        let ctx = self.ctx.for_run(run_id, Arc::clone(&results));

        let graph = resolver::resolve(&ctx, tasks)?;
        emit_graph_resolved!(run_id, graph.len(), graph.roots().len());

        let started = Instant::now();
        let recorded = Run::new(ctx, &graph, &self.config)?.execute().await?;

        let roots: Vec<TaskKey> = graph
            .roots()
            .iter()
            .map(|&index| graph.task(index).key())
            .collect();
        let success = graph
            .roots()
            .iter()
            .all(|&index| recorded[index.index()].as_ref().is_some_and(|r| r.succeeded()));

        emit_graph_completed!(run_id, success, elapsed_ms(started));
        info!(
            tasks = results.len(),
            failed = results.failed().len(),
            success,
            "Solve finished"
        );

        Ok(SolveResult {
            run_id,
            results,
            roots,
            success,
        })
    }
}

/// What a spawned task future reports back.
enum Finished {
    Probed(Result<Option<ActionStatus>>),
    Processed {
        started_at: DateTime<Utc>,
        result: Result<TaskOutput>,
    },
}

struct InFlight {
    index: NodeIndex,
    holds_slot: bool,
    started: Instant,
}

/// Scheduling state of one solve.
struct Run<'a> {
    ctx: TaskContext,
    graph: &'a ResolvedGraph,
    keys: Vec<TaskKey>,
    limits: Vec<Option<usize>>,
    /// Unfinished dependencies per node.
    remaining: Vec<usize>,
    recorded: Vec<Option<Arc<GraphResult>>>,
    dependency_results: Vec<DependencyResults>,
    /// Nodes whose dependencies are all terminal, not yet evaluated.
    ready: VecDeque<NodeIndex>,
    /// Nodes waiting for a concurrency slot, in discovery order.
    runnable: Vec<NodeIndex>,
    /// Status returned by a probe that found work to do.
    probed: Vec<Option<ActionStatus>>,
    /// Running `process` calls per task type.
    running: HashMap<&'static str, usize>,
    in_flight: HashMap<Id, InFlight>,
    join_set: JoinSet<Finished>,
}

impl<'a> Run<'a> {
    /// A node whose effective limit is zero could never start, so it is
    /// rejected before anything runs.
    fn new(ctx: TaskContext, graph: &'a ResolvedGraph, config: &SolverConfig) -> Result<Self> {
        let len = graph.len();
        let mut keys = Vec::with_capacity(len);
        let mut limits = Vec::with_capacity(len);
        let mut remaining = Vec::with_capacity(len);

        for index in graph.indices() {
            let task = graph.task(index);
            let limit = config.concurrency_limit_for(task.task_type(), task.concurrency_limit());
            if limit == Some(0) {
                return Err(Error::configuration(format!(
                    "Concurrency limit must be at least 1 for: {}",
                    task.task_type()
                )));
            }
            keys.push(task.key());
            limits.push(limit);
            remaining.push(graph.dependencies_of(index).len());
        }

        let ready = graph
            .indices()
            .filter(|index| remaining[index.index()] == 0)
            .collect();

        Ok(Self {
            ctx,
            graph,
            keys,
            limits,
            remaining,
            recorded: vec![None; len],
            dependency_results: vec![DependencyResults::default(); len],
            ready,
            runnable: Vec::new(),
            probed: vec![None; len],
            running: HashMap::new(),
            in_flight: HashMap::new(),
            join_set: JoinSet::new(),
        })
    }

    async fn execute(mut self) -> Result<Vec<Option<Arc<GraphResult>>>> {
        loop {
            self.evaluate_ready()?;
            self.start_runnable();

            let Some(joined) = self.join_set.join_next_with_id().await else {
                break;
            };
            self.on_joined(joined)?;
        }

        debug_assert!(self.recorded.iter().all(Option::is_some));
        Ok(self.recorded)
    }

    /// Short-circuit, probe or queue every ready node.
    fn evaluate_ready(&mut self) -> Result<()> {
        while let Some(index) = self.ready.pop_front() {
            let dependencies = DependencyResults::new(
                self.graph
                    .dependencies_of(index)
                    .iter()
                    .filter_map(|dep| self.recorded[dep.index()].clone())
                    .collect(),
            );
            let task = self.graph.task(index);

            if !dependencies.all_succeeded() && !task.tolerates_dependency_failure() {
                let failed: Vec<TaskKey> = dependencies
                    .failed()
                    .iter()
                    .map(|result| result.key.clone())
                    .collect();
                emit_task_dependency_failed!(self.keys[index.index()], join_keys(&failed));
                self.dependency_results[index.index()] = dependencies;
                self.complete(index, TaskOutcome::DependencyFailed { failed }, None)?;
                continue;
            }

            let force = task.force();
            self.dependency_results[index.index()] = dependencies;
            if force {
                self.queue_runnable(index);
            } else {
                self.spawn_probe(index);
            }
        }
        Ok(())
    }

    fn queue_runnable(&mut self, index: NodeIndex) {
        let position = self.runnable.partition_point(|queued| *queued < index);
        self.runnable.insert(position, index);
    }

    /// Start queued nodes whose type has a free slot, in discovery order.
    fn start_runnable(&mut self) {
        let queued = std::mem::take(&mut self.runnable);
        for index in queued {
            let task_type = self.graph.task(index).task_type();
            let running = self.running.get(task_type).copied().unwrap_or(0);
            if self.limits[index.index()].is_some_and(|limit| running >= limit) {
                self.runnable.push(index);
            } else {
                *self.running.entry(task_type).or_insert(0) += 1;
                self.spawn_process(index);
            }
        }
    }

    fn span_for(&self, index: NodeIndex) -> Span {
        info_span!(
            "task",
            key = %self.keys[index.index()],
            task_type = self.graph.task(index).task_type(),
        )
    }

    fn spawn_probe(&mut self, index: NodeIndex) {
        let task = self.graph.task(index).clone();
        let ctx = self.ctx.clone();
        let dependencies = self.dependency_results[index.index()].clone();

        let handle = self.join_set.spawn(
            async move { Finished::Probed(task.get_status(&ctx, &dependencies).await) }
                .instrument(self.span_for(index)),
        );
        self.in_flight.insert(
            handle.id(),
            InFlight {
                index,
                holds_slot: false,
                started: Instant::now(),
            },
        );
    }

    fn spawn_process(&mut self, index: NodeIndex) {
        let task = self.graph.task(index).clone();
        let ctx = self.ctx.clone();
        let dependencies = self.dependency_results[index.index()].clone();
        let status = self.probed[index.index()].take();
        emit_task_started!(self.keys[index.index()], task.task_type());

        let handle = self.join_set.spawn(
            async move {
                let started_at = Utc::now();
                let result = task.process(&ctx, &dependencies, status.as_ref()).await;
                Finished::Processed { started_at, result }
            }
            .instrument(self.span_for(index)),
        );
        self.in_flight.insert(
            handle.id(),
            InFlight {
                index,
                holds_slot: true,
                started: Instant::now(),
            },
        );
    }

    fn on_joined(&mut self, joined: std::result::Result<(Id, Finished), JoinError>) -> Result<()> {
        let (id, finished) = match joined {
            Ok((id, finished)) => (id, Ok(finished)),
            Err(err) => (err.id(), Err(panic_message(err))),
        };
        let Some(flight) = self.in_flight.remove(&id) else {
            return Ok(());
        };
        let index = flight.index;
        let task_type = self.graph.task(index).task_type();
        if flight.holds_slot
            && let Some(running) = self.running.get_mut(task_type)
        {
            *running = running.saturating_sub(1);
        }

        let key = &self.keys[index.index()];
        let duration_ms = elapsed_ms(flight.started);

        match finished {
            Ok(Finished::Probed(Ok(Some(status))))
                if self.graph.task(index).is_satisfied_by(&status) =>
            {
                emit_task_skipped!(key, "already satisfied");
                let output = TaskOutput::from_outcome(status, self.graph.task(index).version());
                self.complete(index, TaskOutcome::AlreadySatisfied(output), None)
            }
            Ok(Finished::Probed(Ok(status))) => {
                debug!(key = %key, "Status probe found work to do");
                self.probed[index.index()] = status;
                self.queue_runnable(index);
                Ok(())
            }
            Ok(Finished::Probed(Err(err))) => {
                emit_task_failed!(key, err, duration_ms);
                self.complete(index, TaskOutcome::Failed(Arc::new(err)), None)
            }
            Ok(Finished::Processed {
                started_at,
                result: Ok(output),
            }) => {
                emit_task_completed!(key, output.state, duration_ms);
                self.complete(index, TaskOutcome::Processed(output), Some(started_at))
            }
            Ok(Finished::Processed {
                started_at,
                result: Err(err),
            }) => {
                emit_task_failed!(key, err, duration_ms);
                self.complete(index, TaskOutcome::Failed(Arc::new(err)), Some(started_at))
            }
            Err(message) => {
                let err = Error::TaskPanicked {
                    key: key.to_string(),
                    message,
                };
                emit_task_failed!(key, err, duration_ms);
                self.complete(index, TaskOutcome::Failed(Arc::new(err)), None)
            }
        }
    }

    /// Record a terminal outcome and ready dependants whose dependencies
    /// are now all terminal.
    fn complete(
        &mut self,
        index: NodeIndex,
        outcome: TaskOutcome,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let task = self.graph.task(index);
        let result = self.ctx.results.record(GraphResult {
            key: self.keys[index.index()].clone(),
            action: task.action().map(|action| action.reference()),
            outcome,
            dependency_results: std::mem::take(&mut self.dependency_results[index.index()]),
            version: task.version(),
            started_at,
            completed_at: Utc::now(),
        })?;
        self.recorded[index.index()] = Some(result);

        for dependant in self.graph.dependants_of(index) {
            let remaining = &mut self.remaining[dependant.index()];
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.ready.push_back(dependant);
            }
        }
        Ok(())
    }
}

fn join_keys(keys: &[TaskKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
