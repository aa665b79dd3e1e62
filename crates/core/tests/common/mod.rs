//! Fake provider shared by the integration tests.
//!
//! Every operation is recorded as `start <op> <action>` / `end <op> <action>`
//! lines, live calls are counted per operation, and a small in-memory state
//! (action -> deployed version) backs the status probes so re-running a
//! graph can be observed to do nothing.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]

use actiongraph_core::{
    Action, ActionGraph, ActionHandler, ActionKind, ActionOutcome, ActionRef, ActionRouter,
    ActionState, ActionStatus, EnvironmentHandler, EnvironmentStatus, Error, GraphSolver,
    HandlerParams, Operation, PluginContext, ProviderConfig, ProviderRegistration, Result,
    SolverConfig, StatusHandler, TaskContext,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Action type every fake handler is registered for.
pub const FAKE_TYPE: &str = "fake";

/// Shared record of everything the fake provider was asked to do.
#[derive(Debug, Default)]
pub struct Recorder {
    delay: Mutex<Duration>,
    failing: Mutex<HashSet<String>>,
    probe_failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    /// Action reference to deployed version.
    state: Mutex<HashMap<String, String>>,
    log: Mutex<Vec<String>>,
    live: Mutex<HashMap<Operation, usize>>,
    peak: Mutex<HashMap<Operation, usize>>,
    probes: AtomicUsize,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let recorder = Self::default();
        *recorder.delay.lock() = delay;
        Arc::new(recorder)
    }

    /// Make every operation on `action` fail.
    pub fn fail(&self, action: &str) {
        self.failing.lock().insert(action.to_string());
    }

    /// Make the status probe of `action` fail.
    pub fn fail_probe(&self, action: &str) {
        self.probe_failing.lock().insert(action.to_string());
    }

    /// Make operations on `action` never finish.
    pub fn hang(&self, action: &str) {
        self.hanging.lock().insert(action.to_string());
    }

    /// Pretend `action` is already at `version`.
    pub fn set_state(&self, action: &str, version: &str) {
        self.state
            .lock()
            .insert(action.to_string(), version.to_string());
    }

    pub fn state_of(&self, action: &str) -> Option<String> {
        self.state.lock().get(action).cloned()
    }

    /// All recorded lines.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Completed calls of one operation, as action references in completion order.
    pub fn completed(&self, operation: Operation) -> Vec<String> {
        let prefix = format!("end {operation} ");
        self.log
            .lock()
            .iter()
            .filter_map(|line| line.strip_prefix(&prefix).map(ToString::to_string))
            .collect()
    }

    /// Number of started mutating calls.
    pub fn mutations(&self) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|line| line.starts_with("start "))
            .count()
    }

    /// Position of a log line.
    pub fn position(&self, line: &str) -> usize {
        let log = self.log();
        log.iter()
            .position(|l| l == line)
            .unwrap_or_else(|| panic!("'{line}' not in log: {log:?}"))
    }

    /// Highest number of simultaneous calls of one operation.
    pub fn peak(&self, operation: Operation) -> usize {
        self.peak.lock().get(&operation).copied().unwrap_or(0)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn enter(&self, operation: Operation, action: &str) {
        self.log.lock().push(format!("start {operation} {action}"));
        let mut live = self.live.lock();
        let count = live.entry(operation).or_insert(0);
        *count += 1;
        let mut peak = self.peak.lock();
        let max = peak.entry(operation).or_insert(0);
        *max = (*max).max(*count);
    }

    fn exit(&self, operation: Operation, action: &str, succeeded: bool) {
        if let Some(count) = self.live.lock().get_mut(&operation) {
            *count -= 1;
        }
        let verb = if succeeded { "end" } else { "fail" };
        self.log.lock().push(format!("{verb} {operation} {action}"));
    }

    fn apply(&self, operation: Operation, action: &Action) -> Result<ActionOutcome> {
        let reference = action.reference().to_string();
        if self.failing.lock().contains(&reference) {
            return Err(Error::operation(
                reference,
                operation.as_str(),
                "simulated failure",
            ));
        }

        if operation == Operation::Delete {
            self.state.lock().remove(&reference);
            return Ok(ActionOutcome::new(ActionState::Deleted));
        }

        self.state.lock().insert(reference, action.version.clone());
        Ok(ActionOutcome::new(ActionState::Ready)
            .with_detail(json!({ "operation": operation.as_str() }))
            .with_output("version", json!(action.version)))
    }
}

struct OperationHandler {
    operation: Operation,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl ActionHandler for OperationHandler {
    async fn handle(&self, params: HandlerParams) -> Result<ActionOutcome> {
        let reference = params.action.reference().to_string();
        self.recorder.enter(self.operation, &reference);

        let hang = self.recorder.hanging.lock().contains(&reference);
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let delay = *self.recorder.delay.lock();
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }

        let result = self.recorder.apply(self.operation, &params.action);
        self.recorder
            .exit(self.operation, &reference, result.is_ok());
        result
    }
}

struct StatusProbe {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl StatusHandler for StatusProbe {
    async fn status(&self, params: HandlerParams) -> Result<Option<ActionStatus>> {
        self.recorder.probes.fetch_add(1, Ordering::SeqCst);
        let reference = params.action.reference().to_string();
        if self.recorder.probe_failing.lock().contains(&reference) {
            return Err(Error::operation(reference, "getStatus", "probe unavailable"));
        }

        // Reports whatever version is deployed; the task decides if it matches.
        Ok(Some(match self.recorder.state_of(&reference) {
            Some(version) => {
                ActionStatus::new(ActionState::Ready).with_output("version", json!(version))
            }
            None => ActionStatus::new(ActionState::NotReady),
        }))
    }
}

/// Environment handler counting preparations. Clones share their counters.
#[derive(Debug, Clone, Default)]
pub struct FakeEnvironment {
    ready: Arc<AtomicBool>,
    checks: Arc<AtomicUsize>,
    prepared: Arc<AtomicUsize>,
    /// Status handed to the last `prepare_environment` call.
    seen: Arc<Mutex<Option<EnvironmentStatus>>>,
}

impl FakeEnvironment {
    pub fn ready() -> Self {
        let env = Self::default();
        env.ready.store(true, Ordering::SeqCst);
        env
    }

    pub fn prepared(&self) -> usize {
        self.prepared.load(Ordering::SeqCst)
    }

    /// Number of `get_environment_status` calls.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Option<EnvironmentStatus> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl EnvironmentHandler for FakeEnvironment {
    async fn get_environment_status(&self, _ctx: &PluginContext) -> Result<EnvironmentStatus> {
        let check = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        let mut status = EnvironmentStatus {
            ready: self.ready.load(Ordering::SeqCst),
            ..EnvironmentStatus::default()
        };
        status.outputs.insert("check".to_string(), json!(check));
        Ok(status)
    }

    async fn prepare_environment(
        &self,
        ctx: &PluginContext,
        status: &EnvironmentStatus,
        _force: bool,
    ) -> Result<EnvironmentStatus> {
        *self.seen.lock() = Some(status.clone());
        self.prepared.fetch_add(1, Ordering::SeqCst);
        self.ready.store(true, Ordering::SeqCst);
        let mut status = EnvironmentStatus {
            ready: true,
            ..EnvironmentStatus::default()
        };
        status
            .outputs
            .insert("provider".to_string(), json!(ctx.provider));
        Ok(status)
    }
}

fn operations_for(kind: ActionKind) -> &'static [Operation] {
    match kind {
        ActionKind::Build => &[Operation::Build, Operation::Publish],
        ActionKind::Deploy => &[Operation::Deploy, Operation::Delete],
        ActionKind::Run => &[Operation::Run],
        ActionKind::Test => &[Operation::Test],
    }
}

/// A provider handling every operation on [`FAKE_TYPE`] actions.
pub fn fake_provider(name: &str, recorder: &Arc<Recorder>) -> ProviderRegistration {
    let mut registration = ProviderRegistration::new(name);
    for kind in ActionKind::ALL {
        for &operation in operations_for(kind) {
            registration = registration.handler(
                kind,
                FAKE_TYPE,
                operation,
                OperationHandler {
                    operation,
                    recorder: Arc::clone(recorder),
                },
            );
        }
        registration = registration.status(
            kind,
            FAKE_TYPE,
            StatusProbe {
                recorder: Arc::clone(recorder),
            },
        );
    }
    registration
}

/// An action of the fake type.
pub fn fake(kind: ActionKind, name: &str) -> Action {
    Action::new(kind, name, FAKE_TYPE).with_version(format!("v-{name}"))
}

/// Test harness owning the solver and the action graph.
pub struct Harness {
    pub graph: Arc<ActionGraph>,
    pub solver: GraphSolver,
}

impl Harness {
    pub fn new(actions: Vec<Action>, recorder: &Arc<Recorder>) -> Self {
        Self::with(
            actions,
            vec![fake_provider("fake", recorder)],
            SolverConfig::default(),
        )
    }

    pub fn with(
        actions: Vec<Action>,
        registrations: Vec<ProviderRegistration>,
        config: SolverConfig,
    ) -> Self {
        let providers: Vec<ProviderConfig> = config.providers.clone();
        let graph = Arc::new(ActionGraph::new(actions).unwrap());
        let router = Arc::new(ActionRouter::new(registrations, providers).unwrap());
        let solver = GraphSolver::new(TaskContext::new(Arc::clone(&graph), router), config);
        Self { graph, solver }
    }

    pub fn action(&self, kind: ActionKind, name: &str) -> Arc<Action> {
        Arc::clone(self.graph.require(&ActionRef::new(kind, name)).unwrap())
    }
}
