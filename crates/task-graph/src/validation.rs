//! Validation utilities for task graphs.

use crate::{Error, TaskGraph};

/// Result of graph validation.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the graph is valid (no cycles).
    pub is_valid: bool,
    /// List of validation errors, if any.
    pub errors: Vec<Error>,
}

impl ValidationResult {
    /// Create a valid result.
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: vec![],
        }
    }

    /// Create an invalid result with errors.
    #[must_use]
    pub fn invalid(errors: Vec<Error>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }

    /// Convert into a `Result`, yielding the first error.
    ///
    /// # Errors
    ///
    /// Returns the first recorded error when the graph is invalid.
    pub fn into_result(self) -> crate::Result<()> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<T> TaskGraph<T> {
    /// Validate the graph structure.
    ///
    /// Edges can only be added between existing nodes, so the remaining
    /// structural failure is a cycle.
    #[must_use]
    pub fn validate(&self) -> ValidationResult {
        match self.find_cycle() {
            Some(path) => ValidationResult::invalid(vec![Error::CycleDetected { path }]),
            None => ValidationResult::valid(),
        }
    }
}
