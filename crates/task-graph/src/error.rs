//! Error types for task graph operations.

use std::fmt;

/// Result type for task graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during task graph operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A dependency cycle was detected in the graph.
    CycleDetected {
        /// Keys along the cycle, starting and ending with the same key.
        path: Vec<String>,
    },

    /// A node key was referenced that is not part of the graph.
    MissingNode {
        /// The key that could not be found.
        key: String,
    },
}

impl Error {
    /// Render a cycle path as `a -> b -> a`.
    #[must_use]
    pub fn format_path(path: &[String]) -> String {
        path.join(" -> ")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CycleDetected { path } => {
                write!(f, "Dependency cycle detected: {}", Self::format_path(path))
            }
            Self::MissingNode { key } => write!(f, "Node '{key}' is not part of the graph"),
        }
    }
}

impl std::error::Error for Error {}
