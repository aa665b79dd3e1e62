//! Custom tracing Layer for capturing actiongraph events.
//!
//! This layer intercepts tracing events with an `actiongraph` target and an
//! `event_type` field, converts them to [`ActionGraphEvent`] values, and sends
//! them down a channel.

#![allow(clippy::cast_possible_truncation)]

use crate::event::{ActionGraphEvent, EventCategory, EventSource, GraphEvent, TaskEvent};
use tokio::sync::mpsc;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// A tracing Layer that captures actiongraph events.
pub struct ActionGraphEventLayer {
    sender: mpsc::UnboundedSender<ActionGraphEvent>,
}

impl ActionGraphEventLayer {
    /// Create a new layer that sends events to the given channel.
    #[must_use]
    pub fn new(sender: mpsc::UnboundedSender<ActionGraphEvent>) -> Self {
        Self { sender }
    }
}

impl<S> Layer<S> for ActionGraphEventLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let target = event.metadata().target();
        if !target.starts_with("actiongraph::") {
            return;
        }

        let mut visitor = EventVisitor::new(target);
        event.record(&mut visitor);

        if let Some(captured) = visitor.build() {
            // A dropped receiver only means nobody is listening anymore.
            let _ = self.sender.send(captured);
        }
    }
}

/// Visitor for extracting typed fields from tracing events.
#[derive(Default)]
struct EventVisitor {
    target: String,
    event_type: Option<String>,
    key: Option<String>,
    task_type: Option<String>,
    reason: Option<String>,
    state: Option<String>,
    error: Option<String>,
    failed: Option<String>,
    run_id: Option<String>,
    duration_ms: Option<u64>,
    task_count: Option<usize>,
    root_count: Option<usize>,
    success: Option<bool>,
}

impl EventVisitor {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..Self::default()
        }
    }

    fn build(self) -> Option<ActionGraphEvent> {
        let event_type = self.event_type.as_deref()?;
        let source = EventSource::new(&self.target);

        let category = match event_type {
            "task.started" => EventCategory::Task(TaskEvent::Started {
                key: self.key?,
                task_type: self.task_type?,
            }),
            "task.skipped" => EventCategory::Task(TaskEvent::Skipped {
                key: self.key?,
                reason: self.reason.unwrap_or_default(),
            }),
            "task.completed" => EventCategory::Task(TaskEvent::Completed {
                key: self.key?,
                state: self.state?,
                duration_ms: self.duration_ms.unwrap_or(0),
            }),
            "task.failed" => EventCategory::Task(TaskEvent::Failed {
                key: self.key?,
                error: self.error?,
                duration_ms: self.duration_ms.unwrap_or(0),
            }),
            "task.dependency_failed" => EventCategory::Task(TaskEvent::DependencyFailed {
                key: self.key?,
                failed: self.failed.unwrap_or_default(),
            }),
            "graph.resolved" => EventCategory::Graph(GraphEvent::Resolved {
                run_id: self.run_id?,
                task_count: self.task_count.unwrap_or(0),
                root_count: self.root_count.unwrap_or(0),
            }),
            "graph.completed" => EventCategory::Graph(GraphEvent::Completed {
                run_id: self.run_id?,
                success: self.success?,
                duration_ms: self.duration_ms.unwrap_or(0),
            }),
            _ => return None,
        };

        Some(ActionGraphEvent::new(source, category))
    }

    fn record_string(&mut self, field: &Field, value: String) {
        match field.name() {
            "event_type" => self.event_type = Some(value),
            "key" => self.key = Some(value),
            "task_type" => self.task_type = Some(value),
            "reason" => self.reason = Some(value),
            "state" => self.state = Some(value),
            "error" => self.error = Some(value),
            "failed" => self.failed = Some(value),
            "run_id" => self.run_id = Some(value),
            _ => {}
        }
    }

    fn record_count(&mut self, field: &Field, value: u64) {
        match field.name() {
            "duration_ms" => self.duration_ms = Some(value),
            "task_count" => self.task_count = Some(value as usize),
            "root_count" => self.root_count = Some(value as usize),
            _ => {}
        }
    }
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_string(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if let Ok(value) = u64::try_from(value) {
            self.record_count(field, value);
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_count(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "success" {
            self.success = Some(value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // `%value` fields arrive here already Display-formatted.
        self.record_string(field, format!("{value:?}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[tokio::test]
    async fn test_layer_captures_task_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(ActionGraphEventLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(
                target: "actiongraph::task",
                event_type = "task.started",
                key = "deploy.api",
                task_type = "deploy",
                "Task started"
            );
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event.category_task(),
            Some(TaskEvent::Started {
                key: "deploy.api".to_string(),
                task_type: "deploy".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_layer_ignores_foreign_targets() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(ActionGraphEventLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(
                target: "other::target",
                event_type = "task.started",
                key = "deploy.api",
                task_type = "deploy",
            );
        });

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_layer_ignores_events_without_type() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(ActionGraphEventLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "actiongraph::task", key = "deploy.api", "plain log line");
        });

        assert!(rx.try_recv().is_err());
    }

    impl ActionGraphEvent {
        fn category_task(&self) -> Option<TaskEvent> {
            match &self.category {
                EventCategory::Task(task) => Some(task.clone()),
                EventCategory::Graph(_) => None,
            }
        }
    }
}
