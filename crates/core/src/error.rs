//! Error types for the action task graph engine.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the task graph engine.
///
/// Configuration-class errors abort a run before any task executes. All
/// other errors are recorded against the task that raised them.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(actiongraph::configuration))]
    Configuration {
        /// Error message
        message: String,
    },

    /// Task or action dependencies form a cycle.
    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    #[diagnostic(
        code(actiongraph::dependency_cycle),
        help("Remove one of the dependencies along the reported path")
    )]
    DependencyCycle {
        /// Keys along the cycle, first and last are equal
        path: Vec<String>,
    },

    /// A provider is configured with a mode none of its tables know.
    #[error(
        "Unknown mode '{mode}' for provider '{provider}' (supported: {})",
        available.join(", ")
    )]
    #[diagnostic(
        code(actiongraph::unknown_provider_mode),
        help("Set the provider mode to one of the supported modes")
    )]
    UnknownProviderMode {
        /// Provider name
        provider: String,
        /// Configured mode, `<unset>` when missing
        mode: String,
        /// Modes the provider registered handlers for
        available: Vec<String>,
    },

    /// No handler is registered for an operation.
    #[error("No handler registered for {operation} on {kind} actions of type '{action_type}'")]
    #[diagnostic(
        code(actiongraph::missing_handler),
        help("Register a provider that handles this action type")
    )]
    MissingHandler {
        /// Action kind
        kind: String,
        /// Provider-facing action type
        action_type: String,
        /// Requested operation
        operation: String,
    },

    /// An action reference does not resolve.
    #[error("Unknown action: {action}")]
    #[diagnostic(code(actiongraph::unknown_action))]
    UnknownAction {
        /// Action reference
        action: String,
    },

    /// Two actions share the same kind and name.
    #[error("Duplicate action: {action}")]
    #[diagnostic(code(actiongraph::duplicate_action))]
    DuplicateAction {
        /// Action reference
        action: String,
    },

    /// A task result was recorded twice.
    #[error("Result for task {key} was already recorded")]
    #[diagnostic(code(actiongraph::duplicate_result))]
    DuplicateResult {
        /// Task key
        key: String,
    },

    /// A provider operation failed.
    #[error("{operation} failed for {action}: {message}")]
    #[diagnostic(code(actiongraph::operation_failed))]
    Operation {
        /// Action reference
        action: String,
        /// Operation name
        operation: String,
        /// Error message
        message: String,
    },

    /// An operation exceeded its timeout.
    #[error("{operation} timed out after {millis}ms")]
    #[diagnostic(code(actiongraph::timeout))]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Timeout in milliseconds
        millis: u64,
    },

    /// A task future panicked.
    #[error("Task {key} panicked: {message}")]
    #[diagnostic(code(actiongraph::task_panicked))]
    TaskPanicked {
        /// Task key
        key: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    #[diagnostic(code(actiongraph::io_error))]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(actiongraph::toml_error))]
    Toml(#[from] toml::de::Error),

    /// JSON parse error.
    #[error("JSON error: {0}")]
    #[diagnostic(code(actiongraph::json_error))]
    Json(#[from] serde_json::Error),

    /// Graph structure error.
    #[error("Graph error: {0}")]
    #[diagnostic(code(actiongraph::graph_error))]
    Graph(#[from] actiongraph_task_graph::Error),
}

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a provider operation error.
    #[must_use]
    pub fn operation(
        action: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Operation {
            action: action.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Whether this error belongs to the configuration class.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::DependencyCycle { .. }
                | Self::UnknownProviderMode { .. }
                | Self::UnknownAction { .. }
                | Self::DuplicateAction { .. }
                | Self::Toml(_)
                | Self::Json(_)
                | Self::Graph(_)
        )
    }
}

impl From<actiongraph_events::TracingError> for Error {
    fn from(err: actiongraph_events::TracingError) -> Self {
        Self::configuration(err.to_string())
    }
}
