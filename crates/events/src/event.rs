//! Event type definitions for structured actiongraph events.
//!
//! Events are categorized by domain (task lifecycle, whole-graph lifecycle)
//! and carry an identifier, timestamp and source target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A structured actiongraph event with full metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionGraphEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Source information for the event.
    pub source: EventSource,
    /// The event category and data.
    pub category: EventCategory,
}

impl ActionGraphEvent {
    /// Create a new event with the given category.
    #[must_use]
    pub fn new(source: EventSource, category: EventCategory) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source,
            category,
        }
    }
}

/// Source information for an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSource {
    /// The tracing target (e.g. "`actiongraph::task`").
    pub target: String,
}

impl EventSource {
    /// Create a new event source.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

/// Event categories organized by domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventCategory {
    /// Per-task lifecycle events.
    Task(TaskEvent),
    /// Whole-graph lifecycle events.
    Graph(GraphEvent),
}

/// Per-task lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum TaskEvent {
    /// Task took a concurrency slot and started processing.
    Started {
        /// Task key.
        key: String,
        /// Task type.
        task_type: String,
    },
    /// Task was satisfied by its status probe and not processed.
    Skipped {
        /// Task key.
        key: String,
        /// Why the task was skipped.
        reason: String,
    },
    /// Task processed successfully.
    Completed {
        /// Task key.
        key: String,
        /// Resulting action state.
        state: String,
        /// Duration in milliseconds.
        duration_ms: u64,
    },
    /// Task failed directly.
    Failed {
        /// Task key.
        key: String,
        /// Error message.
        error: String,
        /// Duration in milliseconds.
        duration_ms: u64,
    },
    /// Task was not attempted because dependencies failed.
    DependencyFailed {
        /// Task key.
        key: String,
        /// Comma-separated keys of the failed dependencies.
        failed: String,
    },
}

/// Whole-graph lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum GraphEvent {
    /// Requested tasks were expanded into a graph.
    Resolved {
        /// Run identifier.
        run_id: String,
        /// Number of nodes in the graph.
        task_count: usize,
        /// Number of requested root tasks.
        root_count: usize,
    },
    /// Every node reached a terminal state.
    Completed {
        /// Run identifier.
        run_id: String,
        /// Whether every root succeeded.
        success: bool,
        /// Duration in milliseconds.
        duration_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = ActionGraphEvent::new(
            EventSource::new("actiongraph::task"),
            EventCategory::Task(TaskEvent::Started {
                key: "deploy.api".to_string(),
                task_type: "deploy".to_string(),
            }),
        );

        assert!(!event.id.is_nil());
        assert_eq!(event.source.target, "actiongraph::task");
    }

    #[test]
    fn test_event_serialization() {
        let event = ActionGraphEvent::new(
            EventSource::new("actiongraph::graph"),
            EventCategory::Graph(GraphEvent::Resolved {
                run_id: "r1".to_string(),
                task_count: 4,
                root_count: 1,
            }),
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("actiongraph::graph"));
        assert!(json.contains("Resolved"));

        let parsed: ActionGraphEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, event.id);
        assert!(matches!(
            parsed.category,
            EventCategory::Graph(GraphEvent::Resolved { task_count: 4, .. })
        ));
    }

    #[test]
    fn test_task_event_dependency_failed() {
        let event = TaskEvent::DependencyFailed {
            key: "deploy.web".to_string(),
            failed: "build.web".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "DependencyFailed");
        assert_eq!(json["data"]["failed"], "build.web");
    }
}
