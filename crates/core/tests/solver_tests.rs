//! End-to-end scheduling tests against a fake provider.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::too_many_lines)]

mod common;

use actiongraph_core::{
    ActionKind, ActionOutcome, ActionRouter, ActionState, DeleteDeployTask, DependencyResults,
    Error, HandlerParams, Operation, ProviderConfig, ProviderRegistration, Result, SolverConfig,
    Task, TaskContext, TaskKey, TaskLogic, TaskOutcome, TaskOutput, build_task, delete_deploys,
    deleted_deploy_statuses, deploy_task, run_task,
};
use actiongraph_events::{ActionGraphEventLayer, EventCategory, GraphEvent, TaskEvent};
use async_trait::async_trait;
use common::{FAKE_TYPE, FakeEnvironment, Harness, Recorder, fake, fake_provider};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;

fn key(task_type: &str, name: &str) -> TaskKey {
    TaskKey::new(task_type, name)
}

fn api_stack() -> Vec<actiongraph_core::Action> {
    vec![
        fake(ActionKind::Build, "api"),
        fake(ActionKind::Deploy, "db"),
        fake(ActionKind::Deploy, "api")
            .with_dependency(ActionKind::Build, "api")
            .with_dependency(ActionKind::Deploy, "db"),
    ]
}

#[tokio::test]
async fn test_dependencies_finish_before_dependants_start() {
    let recorder = Recorder::new();
    let harness = Harness::new(api_stack(), &recorder);

    let result = harness
        .solver
        .solve(vec![deploy_task(harness.action(ActionKind::Deploy, "api"), false)])
        .await
        .unwrap();

    assert!(result.success);
    let start_deploy = recorder.position("start deploy deploy.api");
    assert!(recorder.position("end build build.api") < start_deploy);
    assert!(recorder.position("end deploy deploy.db") < start_deploy);

    // deploy.api, resolve x3, build.api, deploy.db
    assert_eq!(result.results.len(), 6);
    let keys: BTreeSet<String> = result
        .results
        .all()
        .iter()
        .map(|r| r.key.to_string())
        .collect();
    assert_eq!(keys.len(), 6, "every node is recorded exactly once");

    let root = &result.root_results()[0];
    assert_eq!(root.key, key("deploy", "deploy.api"));
    assert!(matches!(root.outcome, TaskOutcome::Processed(_)));
    assert_eq!(root.version.as_deref(), Some("v-api"));
    assert!(root.started_at.is_some());
    assert_eq!(root.dependency_results.len(), 3);
}

#[tokio::test]
async fn test_concurrency_limit_per_task_type() {
    let recorder = Recorder::with_delay(Duration::from_millis(20));
    let mut actions = Vec::new();
    for i in 0..8 {
        actions.push(fake(ActionKind::Deploy, &format!("svc{i}")));
        actions.push(fake(ActionKind::Build, &format!("img{i}")));
    }
    let mut config = SolverConfig::default();
    config.concurrency.insert("deploy".to_string(), 2);
    let harness = Harness::with(actions, vec![fake_provider("fake", &recorder)], config);

    let mut requests = Vec::new();
    for i in 0..8 {
        requests.push(deploy_task(
            harness.action(ActionKind::Deploy, &format!("svc{i}")),
            false,
        ));
        requests.push(build_task(
            harness.action(ActionKind::Build, &format!("img{i}")),
            false,
        ));
    }

    let result = harness.solver.solve(requests).await.unwrap();
    assert!(result.success);
    assert_eq!(recorder.completed(Operation::Deploy).len(), 8);
    assert_eq!(recorder.completed(Operation::Build).len(), 8);
    assert!(recorder.peak(Operation::Deploy) <= 2);
    assert!(recorder.peak(Operation::Build) <= 5);
    // Builds and deploys are limited independently.
    assert!(recorder.peak(Operation::Build) > 2);
}

#[tokio::test]
async fn test_rerun_against_satisfied_state_mutates_nothing() {
    let recorder = Recorder::new();
    let harness = Harness::new(api_stack(), &recorder);
    let request = || vec![deploy_task(harness.action(ActionKind::Deploy, "api"), false)];

    let first = harness.solver.solve(request()).await.unwrap();
    assert!(first.success);
    let mutations = recorder.mutations();
    assert_eq!(mutations, 3);

    let second = harness.solver.solve(request()).await.unwrap();
    assert!(second.success);
    assert_eq!(recorder.mutations(), mutations);
    assert!(
        second
            .results
            .of_type("deploy")
            .iter()
            .all(|r| matches!(r.outcome, TaskOutcome::AlreadySatisfied(_)))
    );
    let build = second.results.get(&key("build", "build.api")).unwrap();
    assert!(matches!(build.outcome, TaskOutcome::AlreadySatisfied(_)));
    assert!(build.started_at.is_none());
}

#[tokio::test]
async fn test_force_bypasses_status_probe() {
    let recorder = Recorder::new();
    let harness = Harness::new(api_stack(), &recorder);
    recorder.set_state("deploy.api", "v-api");

    let result = harness
        .solver
        .solve(vec![deploy_task(harness.action(ActionKind::Deploy, "api"), true)])
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(recorder.completed(Operation::Deploy), vec!["deploy.db", "deploy.api"]);
    let root = result.results.get(&key("deploy", "deploy.api")).unwrap();
    assert!(matches!(root.outcome, TaskOutcome::Processed(_)));
}

#[tokio::test]
async fn test_version_mismatch_is_not_satisfied() {
    let recorder = Recorder::new();
    let harness = Harness::new(vec![fake(ActionKind::Deploy, "web")], &recorder);
    recorder.set_state("deploy.web", "v-old");

    let result = harness
        .solver
        .solve(vec![deploy_task(harness.action(ActionKind::Deploy, "web"), false)])
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(recorder.completed(Operation::Deploy), vec!["deploy.web"]);
    assert_eq!(recorder.state_of("deploy.web").as_deref(), Some("v-web"));
}

#[tokio::test]
async fn test_shared_dependency_runs_once() {
    let recorder = Recorder::new();
    let harness = Harness::new(
        vec![
            fake(ActionKind::Build, "base"),
            fake(ActionKind::Deploy, "a").with_dependency(ActionKind::Build, "base"),
            fake(ActionKind::Deploy, "b").with_dependency(ActionKind::Build, "base"),
        ],
        &recorder,
    );

    let result = harness
        .solver
        .solve(vec![
            deploy_task(harness.action(ActionKind::Deploy, "a"), false),
            deploy_task(harness.action(ActionKind::Deploy, "b"), false),
        ])
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(recorder.completed(Operation::Build), vec!["build.base"]);

    let build_key = key("build", "build.base");
    let a = result.results.get(&key("deploy", "deploy.a")).unwrap();
    let b = result.results.get(&key("deploy", "deploy.b")).unwrap();
    assert!(Arc::ptr_eq(
        a.dependency_results.get(&build_key).unwrap(),
        b.dependency_results.get(&build_key).unwrap()
    ));
    assert_eq!(result.results.dependants_of(&build_key).len(), 2);
}

#[tokio::test]
async fn test_failure_propagates_and_siblings_complete() {
    let recorder = Recorder::new();
    recorder.fail("build.api");
    let harness = Harness::new(
        vec![
            fake(ActionKind::Build, "api"),
            fake(ActionKind::Deploy, "api").with_dependency(ActionKind::Build, "api"),
            fake(ActionKind::Deploy, "docs"),
        ],
        &recorder,
    );

    let result = harness
        .solver
        .solve(vec![
            deploy_task(harness.action(ActionKind::Deploy, "api"), false),
            deploy_task(harness.action(ActionKind::Deploy, "docs"), false),
        ])
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(recorder.completed(Operation::Deploy), vec!["deploy.docs"]);

    let build = result.results.get(&key("build", "build.api")).unwrap();
    assert!(matches!(
        build.error().unwrap().as_ref(),
        Error::Operation { message, .. } if message == "simulated failure"
    ));

    let api = result.results.get(&key("deploy", "deploy.api")).unwrap();
    match &api.outcome {
        TaskOutcome::DependencyFailed { failed } => {
            assert_eq!(failed, &vec![key("build", "build.api")]);
        }
        other => panic!("expected dependency failure, got {other:?}"),
    }
    assert!(api.started_at.is_none());

    let docs = result.results.get(&key("deploy", "deploy.docs")).unwrap();
    assert!(docs.succeeded());

    let summary = result.error_summary().unwrap();
    assert!(summary.contains("build.build.api: build failed for build.api: simulated failure"));
    assert!(summary.contains("deploy.deploy.api: skipped, dependency failed (build.build.api)"));

    let export = serde_json::to_value(result.export()).unwrap();
    let outcomes: Vec<&str> = export["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["outcome"].as_str().unwrap())
        .collect();
    assert!(outcomes.contains(&"failed"));
    assert!(outcomes.contains(&"dependency-failed"));
}

/// Coordination task depending on other tasks by name.
#[derive(Debug)]
struct Step {
    name: &'static str,
    deps: Vec<&'static str>,
    graph: &'static [(&'static str, &'static [&'static str])],
    panics: bool,
    tolerant: bool,
}

fn step(name: &'static str, graph: &'static [(&'static str, &'static [&'static str])]) -> Task {
    let deps = graph
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, d)| d.to_vec())
        .unwrap_or_default();
    Task::new(
        Step {
            name,
            deps,
            graph,
            panics: false,
            tolerant: false,
        },
        None,
        false,
    )
}

#[async_trait]
impl TaskLogic for Step {
    fn task_type(&self) -> &'static str {
        "step"
    }

    fn name(&self, _task: &Task) -> String {
        self.name.to_string()
    }

    fn default_concurrency_limit(&self) -> Option<usize> {
        None
    }

    fn resolve_dependencies(&self, _ctx: &TaskContext, _task: &Task) -> Result<Vec<Task>> {
        Ok(self.deps.iter().map(|d| step(d, self.graph)).collect())
    }

    fn tolerates_dependency_failure(&self) -> bool {
        self.tolerant
    }

    async fn process(
        &self,
        _ctx: &TaskContext,
        _task: &Task,
        dependencies: &DependencyResults,
    ) -> Result<TaskOutput> {
        assert!(!self.panics, "step {} exploded", self.name);
        Ok(TaskOutput {
            state: ActionState::Ready,
            detail: json!({ "failedDependencies": dependencies.failed().len() }),
            ..TaskOutput::default()
        })
    }
}

#[tokio::test]
async fn test_cycle_rejected_before_any_execution() {
    const CYCLE: &[(&str, &[&str])] = &[("a", &["b"]), ("b", &["a"])];
    let recorder = Recorder::new();
    let harness = Harness::new(vec![fake(ActionKind::Deploy, "web")], &recorder);

    let err = harness
        .solver
        .solve(vec![
            deploy_task(harness.action(ActionKind::Deploy, "web"), false),
            step("a", CYCLE),
        ])
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    let Error::DependencyCycle { path } = &err else {
        panic!("expected cycle, got {err:?}");
    };
    assert_eq!(path.len(), 3);
    assert_eq!(path.first(), path.last());
    assert!(err.to_string().starts_with("Dependency cycle detected: step."));
    assert!(recorder.log().is_empty());
    assert_eq!(recorder.probe_count(), 0);
}

#[test]
fn test_action_cycle_rejected_at_configuration() {
    let err = actiongraph_core::ActionGraph::new(vec![
        fake(ActionKind::Deploy, "a").with_dependency(ActionKind::Deploy, "b"),
        fake(ActionKind::Deploy, "b").with_dependency(ActionKind::Deploy, "a"),
    ])
    .unwrap_err();
    assert!(matches!(err, Error::DependencyCycle { .. }));
}

fn deploy_chain() -> Vec<actiongraph_core::Action> {
    vec![
        fake(ActionKind::Deploy, "a"),
        fake(ActionKind::Deploy, "b").with_dependency(ActionKind::Deploy, "a"),
        fake(ActionKind::Deploy, "c").with_dependency(ActionKind::Deploy, "b"),
    ]
}

#[tokio::test]
async fn test_teardown_runs_in_reverse_dependency_order() {
    let recorder = Recorder::with_delay(Duration::from_millis(5));
    let harness = Harness::new(deploy_chain(), &recorder);
    for name in ["deploy.a", "deploy.b", "deploy.c"] {
        recorder.set_state(name, "v");
    }

    let names: BTreeSet<String> = ["a", "b", "c"].iter().map(ToString::to_string).collect();
    let delete_a = Task::new(
        DeleteDeployTask::new(Arc::new(names), true),
        Some(harness.action(ActionKind::Deploy, "a")),
        false,
    );

    let result = harness.solver.solve(vec![delete_a]).await.unwrap();
    assert!(result.success);
    assert_eq!(
        recorder.completed(Operation::Delete),
        vec!["deploy.c", "deploy.b", "deploy.a"]
    );

    let summary = deleted_deploy_statuses(&result.results);
    assert_eq!(summary.len(), 3);
    assert!(summary.values().all(|s| s.state == ActionState::Deleted));
    assert!(summary.values().all(|s| s.version().is_none()));
    assert!(recorder.state_of("deploy.a").is_none());
}

#[tokio::test]
async fn test_teardown_of_every_name_shares_nodes() {
    let recorder = Recorder::new();
    let harness = Harness::new(deploy_chain(), &recorder);
    let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    let tasks = delete_deploys(&harness.graph, &names, true, false).unwrap();
    let result = harness.solver.solve(tasks).await.unwrap();

    assert!(result.success);
    assert_eq!(result.roots.len(), 3);
    assert_eq!(
        recorder.completed(Operation::Delete),
        vec!["deploy.c", "deploy.b", "deploy.a"]
    );
}

#[tokio::test]
async fn test_teardown_without_dependants_first_ignores_order() {
    let recorder = Recorder::new();
    let harness = Harness::new(deploy_chain(), &recorder);

    let tasks = delete_deploys(&harness.graph, &["a".to_string()], false, false).unwrap();
    let result = harness.solver.solve(tasks).await.unwrap();

    assert!(result.success);
    assert_eq!(recorder.completed(Operation::Delete), vec!["deploy.a"]);
}

#[tokio::test]
async fn test_failed_delete_is_recorded_and_dependency_blocked() {
    let recorder = Recorder::new();
    recorder.fail("deploy.c");
    let harness = Harness::new(deploy_chain(), &recorder);
    let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    let tasks = delete_deploys(&harness.graph, &names, true, false).unwrap();
    let result = harness.solver.solve(tasks).await.unwrap();

    assert!(!result.success);
    assert!(recorder.completed(Operation::Delete).is_empty());
    let b = result.results.get(&key("delete-deploy", "deploy.b")).unwrap();
    assert!(matches!(b.outcome, TaskOutcome::DependencyFailed { .. }));
    assert!(deleted_deploy_statuses(&result.results).is_empty());
}

#[tokio::test]
async fn test_probe_failure_counts_as_execution_failure() {
    let recorder = Recorder::new();
    recorder.fail_probe("build.api");
    let harness = Harness::new(api_stack(), &recorder);

    let result = harness
        .solver
        .solve(vec![deploy_task(harness.action(ActionKind::Deploy, "api"), false)])
        .await
        .unwrap();

    assert!(!result.success);
    let build = result.results.get(&key("build", "build.api")).unwrap();
    assert!(
        build
            .error()
            .unwrap()
            .to_string()
            .contains("probe unavailable")
    );
    assert!(recorder.completed(Operation::Build).is_empty());
    let deploy = result.results.get(&key("deploy", "deploy.api")).unwrap();
    assert!(matches!(deploy.outcome, TaskOutcome::DependencyFailed { .. }));
}

fn moded_provider() -> ProviderRegistration {
    let handler = |mode: &'static str| {
        move |_params: HandlerParams| async move {
            Ok::<_, Error>(
                ActionOutcome::new(ActionState::Ready).with_detail(json!({ "mode": mode })),
            )
        }
    };
    ProviderRegistration::new("builder")
        .mode_handler(ActionKind::Build, "image", Operation::Build, "local", handler("local"))
        .mode_handler(ActionKind::Build, "image", Operation::Build, "cluster", handler("cluster"))
}

#[tokio::test]
async fn test_provider_mode_selects_handler() {
    let mut config = SolverConfig::default();
    config
        .providers
        .push(ProviderConfig::new("builder").with_mode("cluster"));
    let harness = Harness::with(
        vec![actiongraph_core::Action::new(ActionKind::Build, "api", "image").with_version("v1")],
        vec![moded_provider()],
        config,
    );

    let result = harness
        .solver
        .solve(vec![build_task(harness.action(ActionKind::Build, "api"), false)])
        .await
        .unwrap();

    let build = result.results.get(&key("build", "build.api")).unwrap();
    assert_eq!(build.output().unwrap().detail["mode"], "cluster");
    assert_eq!(build.output().unwrap().version.as_deref(), Some("v1"));
}

#[test]
fn test_unknown_provider_mode_is_configuration_error() {
    let err = ActionRouter::new(
        vec![moded_provider()],
        vec![ProviderConfig::new("builder").with_mode("remote")],
    )
    .unwrap_err();

    assert!(err.is_configuration());
    match err {
        Error::UnknownProviderMode {
            provider,
            mode,
            available,
        } => {
            assert_eq!(provider, "builder");
            assert_eq!(mode, "remote");
            assert_eq!(available, vec!["cluster", "local"]);
        }
        other => panic!("expected unknown mode, got {other:?}"),
    }
}

#[tokio::test]
async fn test_run_timeout_fails_the_task() {
    let recorder = Recorder::new();
    recorder.hang("run.migrate");
    let harness = Harness::new(
        vec![fake(ActionKind::Run, "migrate").with_timeout(Duration::from_millis(50))],
        &recorder,
    );

    let result = harness
        .solver
        .solve(vec![run_task(harness.action(ActionKind::Run, "migrate"), false)])
        .await
        .unwrap();

    assert!(!result.success);
    let run = result.results.get(&key("run", "run.migrate")).unwrap();
    assert!(matches!(
        run.error().unwrap().as_ref(),
        Error::Timeout { millis: 50, .. }
    ));
    assert!(recorder.completed(Operation::Run).is_empty());
}

#[tokio::test]
async fn test_disabled_action_is_not_dispatched() {
    let recorder = Recorder::new();
    let harness = Harness::new(
        vec![fake(ActionKind::Deploy, "legacy").with_disabled(true)],
        &recorder,
    );

    let result = harness
        .solver
        .solve(vec![deploy_task(harness.action(ActionKind::Deploy, "legacy"), false)])
        .await
        .unwrap();

    assert!(result.success);
    assert!(recorder.log().is_empty());
    assert_eq!(recorder.probe_count(), 0);
    let deploy = result.results.get(&key("deploy", "deploy.legacy")).unwrap();
    let output = deploy.output().unwrap();
    assert_eq!(output.state, ActionState::Unknown);
    assert_eq!(output.detail["disabled"], true);
}

#[tokio::test]
async fn test_environment_prepared_once_per_provider() {
    let recorder = Recorder::new();
    let env = FakeEnvironment::default();
    let harness = Harness::with(
        vec![fake(ActionKind::Deploy, "a"), fake(ActionKind::Deploy, "b")],
        vec![fake_provider("fake", &recorder).environment(env.clone())],
        SolverConfig::default(),
    );

    let result = harness
        .solver
        .solve(vec![
            deploy_task(harness.action(ActionKind::Deploy, "a"), false),
            deploy_task(harness.action(ActionKind::Deploy, "b"), false),
        ])
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(env.prepared(), 1);
    let prepared = result
        .results
        .get(&key("prepare-environment", "fake"))
        .unwrap();
    assert_eq!(prepared.output().unwrap().outputs["provider"], "fake");

    let resolve = result
        .results
        .get(&key("resolve-action", "deploy.a"))
        .unwrap();
    assert!(
        resolve
            .dependency_results
            .contains(&key("prepare-environment", "fake"))
    );
}

#[tokio::test]
async fn test_ready_environment_is_not_prepared() {
    let recorder = Recorder::new();
    let env = FakeEnvironment::ready();
    let harness = Harness::with(
        vec![fake(ActionKind::Deploy, "a")],
        vec![fake_provider("fake", &recorder).environment(env.clone())],
        SolverConfig::default(),
    );

    let result = harness
        .solver
        .solve(vec![deploy_task(harness.action(ActionKind::Deploy, "a"), false)])
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(env.prepared(), 0);
    let prepared = result
        .results
        .get(&key("prepare-environment", "fake"))
        .unwrap();
    assert!(matches!(prepared.outcome, TaskOutcome::AlreadySatisfied(_)));
}

#[tokio::test]
async fn test_prepare_reuses_probed_environment_status() {
    let recorder = Recorder::new();
    let env = FakeEnvironment::default();
    let harness = Harness::with(
        vec![fake(ActionKind::Deploy, "a")],
        vec![fake_provider("fake", &recorder).environment(env.clone())],
        SolverConfig::default(),
    );

    let result = harness
        .solver
        .solve(vec![deploy_task(harness.action(ActionKind::Deploy, "a"), false)])
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(env.checks(), 1);
    assert_eq!(env.prepared(), 1);
    let seen = env.seen().unwrap();
    assert!(!seen.ready);
    assert_eq!(seen.outputs["check"], 1);
}

#[tokio::test]
async fn test_forced_prepare_checks_environment_itself() {
    let recorder = Recorder::new();
    let env = FakeEnvironment::ready();
    let harness = Harness::with(
        vec![],
        vec![fake_provider("fake", &recorder).environment(env.clone())],
        SolverConfig::default(),
    );

    let prepare = Task::new(actiongraph_core::PrepareEnvironmentTask::new("fake"), None, true);
    let result = harness.solver.solve(vec![prepare]).await.unwrap();

    assert!(result.success);
    assert_eq!(env.checks(), 1);
    assert_eq!(env.prepared(), 1);
    assert!(env.seen().unwrap().ready);
}

#[tokio::test]
async fn test_handlers_receive_resolved_versions() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let capture = {
        let seen = Arc::clone(&seen);
        move |params: HandlerParams| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().push((
                    params.action.reference().to_string(),
                    params.extra.resolved.clone(),
                ));
                Ok::<_, Error>(ActionOutcome::new(ActionState::Ready))
            }
        }
    };
    let provider = ProviderRegistration::new("capture")
        .handler(ActionKind::Build, FAKE_TYPE, Operation::Build, capture.clone())
        .handler(ActionKind::Deploy, FAKE_TYPE, Operation::Deploy, capture);
    let harness = Harness::with(
        vec![
            fake(ActionKind::Build, "api"),
            fake(ActionKind::Deploy, "api").with_dependency(ActionKind::Build, "api"),
        ],
        vec![provider],
        SolverConfig::default(),
    );

    let result = harness
        .solver
        .solve(vec![deploy_task(harness.action(ActionKind::Deploy, "api"), false)])
        .await
        .unwrap();
    assert!(result.success);

    let seen = seen.lock().clone();
    let (_, deploy) = seen
        .iter()
        .find(|(action, _)| action == "deploy.api")
        .unwrap();
    let deploy = deploy.as_ref().unwrap();
    assert_eq!(deploy.version, "v-api");
    assert_eq!(deploy.dependencies["build.api"], "v-api");

    let (_, build) = seen.iter().find(|(action, _)| action == "build.api").unwrap();
    assert!(build.as_ref().unwrap().dependencies.is_empty());

    let roots = result.root_results();
    assert_eq!(roots[0].output().unwrap().version.as_deref(), Some("v-api"));
}

#[tokio::test]
async fn test_resolve_summarises_dependency_versions() {
    let recorder = Recorder::new();
    let harness = Harness::new(api_stack(), &recorder);

    let result = harness
        .solver
        .solve(vec![deploy_task(harness.action(ActionKind::Deploy, "api"), false)])
        .await
        .unwrap();

    let resolved = result
        .results
        .get(&key("resolve-action", "deploy.api"))
        .unwrap();
    let output = resolved.output().unwrap();
    assert_eq!(output.outputs["version"], "v-api");
    assert_eq!(output.outputs["dependencyVersions"]["build.api"], "v-api");
    assert_eq!(output.outputs["dependencyVersions"]["deploy.db"], "v-db");
    assert_eq!(output.detail["type"], FAKE_TYPE);
}

#[tokio::test]
async fn test_publish_waits_for_build() {
    let recorder = Recorder::new();
    let harness = Harness::new(vec![fake(ActionKind::Build, "api")], &recorder);

    let publish = Task::new(
        actiongraph_core::PublishTask,
        Some(harness.action(ActionKind::Build, "api")),
        false,
    );
    let result = harness.solver.solve(vec![publish]).await.unwrap();

    assert!(result.success);
    assert!(
        recorder.position("end build build.api") < recorder.position("start publish build.api")
    );
}

#[tokio::test]
async fn test_panicking_task_is_recorded_as_failure() {
    const GRAPH: &[(&str, &[&str])] = &[("boom", &[]), ("after", &["boom"]), ("other", &[])];
    let recorder = Recorder::new();
    let harness = Harness::new(vec![], &recorder);

    let boom = Task::new(
        Step {
            name: "boom",
            deps: vec![],
            graph: GRAPH,
            panics: true,
            tolerant: false,
        },
        None,
        false,
    );
    let result = harness
        .solver
        .solve(vec![boom, step("after", GRAPH), step("other", GRAPH)])
        .await
        .unwrap();

    assert!(!result.success);
    let failed = result.results.get(&key("step", "boom")).unwrap();
    match failed.error().unwrap().as_ref() {
        Error::TaskPanicked { key, message } => {
            assert_eq!(key, "step.boom");
            assert_eq!(message, "step boom exploded");
        }
        other => panic!("expected panic error, got {other:?}"),
    }
    assert!(matches!(
        result.results.get(&key("step", "after")).unwrap().outcome,
        TaskOutcome::DependencyFailed { .. }
    ));
    assert!(result.results.get(&key("step", "other")).unwrap().succeeded());
}

#[tokio::test]
async fn test_tolerant_task_runs_after_failed_dependency() {
    const GRAPH: &[(&str, &[&str])] = &[("report", &["boom"]), ("boom", &[])];
    let recorder = Recorder::new();
    let harness = Harness::new(vec![], &recorder);

    let report = Task::new(
        Step {
            name: "report",
            deps: vec!["boom"],
            graph: GRAPH,
            panics: false,
            tolerant: true,
        },
        None,
        false,
    );
    let boom = Task::new(
        Step {
            name: "boom",
            deps: vec![],
            graph: GRAPH,
            panics: true,
            tolerant: false,
        },
        None,
        false,
    );

    // The failing instance is requested first so it wins deduplication.
    let result = harness.solver.solve(vec![boom, report]).await.unwrap();

    let report = result.results.get(&key("step", "report")).unwrap();
    assert!(report.succeeded());
    assert_eq!(report.output().unwrap().detail["failedDependencies"], 1);
}

#[tokio::test]
async fn test_lifecycle_events_are_emitted() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let subscriber = tracing_subscriber::registry().with(ActionGraphEventLayer::new(tx));
    let _guard = tracing::subscriber::set_default(subscriber);

    let recorder = Recorder::new();
    recorder.fail("build.api");
    let harness = Harness::new(api_stack(), &recorder);
    harness
        .solver
        .solve(vec![deploy_task(harness.action(ActionKind::Deploy, "api"), false)])
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event.category);
    }

    assert!(events.iter().any(|e| matches!(
        e,
        EventCategory::Graph(GraphEvent::Resolved { task_count: 6, root_count: 1, .. })
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        EventCategory::Task(TaskEvent::Started { key, .. }) if key == "build.build.api"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        EventCategory::Task(TaskEvent::Failed { key, .. }) if key == "build.build.api"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        EventCategory::Task(TaskEvent::DependencyFailed { key, failed })
            if key == "deploy.deploy.api" && failed == "build.build.api"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        EventCategory::Graph(GraphEvent::Completed { success: false, .. })
    )));
}
