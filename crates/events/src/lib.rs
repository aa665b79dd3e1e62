//! Structured event system for actiongraph.
//!
//! Task graph lifecycle events are emitted with the `emit_*` macros below as
//! ordinary tracing events carrying an `event_type` field. Any subscriber sees
//! them as structured logs; [`ActionGraphEventLayer`] additionally turns them
//! back into typed [`ActionGraphEvent`] values for programmatic consumers.
//!
//! # Usage
//!
//! ```rust,ignore
//! use actiongraph_events::{TracingConfig, emit_task_started, init_tracing};
//!
//! init_tracing(TracingConfig::default())?;
//! emit_task_started!("deploy.api", "deploy");
//! ```

pub mod event;
pub mod layer;
pub mod subscriber;

pub use event::{ActionGraphEvent, EventCategory, EventSource, GraphEvent, TaskEvent};
pub use layer::ActionGraphEventLayer;
pub use subscriber::{LOG_ENV_VAR, Level, TracingConfig, TracingError, TracingFormat, init_tracing};

// ============================================================================
// Task Events
// ============================================================================

/// Emit a task started event.
///
/// # Example
/// ```rust,ignore
/// emit_task_started!("deploy.api", "deploy");
/// ```
#[macro_export]
macro_rules! emit_task_started {
    ($key:expr, $task_type:expr) => {
        ::tracing::info!(
            target: "actiongraph::task",
            event_type = "task.started",
            key = %$key,
            task_type = %$task_type,
        )
    };
}

/// Emit a task skipped event (status probe reported the goal state).
#[macro_export]
macro_rules! emit_task_skipped {
    ($key:expr, $reason:expr) => {
        ::tracing::info!(
            target: "actiongraph::task",
            event_type = "task.skipped",
            key = %$key,
            reason = %$reason,
        )
    };
}

/// Emit a task completed event.
///
/// # Example
/// ```rust,ignore
/// emit_task_completed!("deploy.api", "ready", 1234_u64);
/// ```
#[macro_export]
macro_rules! emit_task_completed {
    ($key:expr, $state:expr, $duration_ms:expr) => {
        ::tracing::info!(
            target: "actiongraph::task",
            event_type = "task.completed",
            key = %$key,
            state = %$state,
            duration_ms = $duration_ms,
        )
    };
}

/// Emit a task failed event.
#[macro_export]
macro_rules! emit_task_failed {
    ($key:expr, $error:expr, $duration_ms:expr) => {
        ::tracing::warn!(
            target: "actiongraph::task",
            event_type = "task.failed",
            key = %$key,
            error = %$error,
            duration_ms = $duration_ms,
        )
    };
}

/// Emit a dependency failed event.
///
/// `$failed` is any `Display` value listing the failed dependency keys.
#[macro_export]
macro_rules! emit_task_dependency_failed {
    ($key:expr, $failed:expr) => {
        ::tracing::warn!(
            target: "actiongraph::task",
            event_type = "task.dependency_failed",
            key = %$key,
            failed = %$failed,
        )
    };
}

// ============================================================================
// Graph Events
// ============================================================================

/// Emit a graph resolved event.
#[macro_export]
macro_rules! emit_graph_resolved {
    ($run_id:expr, $task_count:expr, $root_count:expr) => {
        ::tracing::info!(
            target: "actiongraph::graph",
            event_type = "graph.resolved",
            run_id = %$run_id,
            task_count = $task_count,
            root_count = $root_count,
        )
    };
}

/// Emit a graph completed event.
#[macro_export]
macro_rules! emit_graph_completed {
    ($run_id:expr, $success:expr, $duration_ms:expr) => {
        ::tracing::info!(
            target: "actiongraph::graph",
            event_type = "graph.completed",
            run_id = %$run_id,
            success = $success,
            duration_ms = $duration_ms,
        )
    };
}
