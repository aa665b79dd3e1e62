//! Tracing subscriber setup.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] read from
//! `ACTIONGRAPH_LOG`, a text or JSON formatting layer on stderr, and an
//! optional [`ActionGraphEventLayer`] forwarding typed events to a channel.

use crate::event::ActionGraphEvent;
use crate::layer::ActionGraphEventLayer;
use serde::{Deserialize, Serialize};
use std::io;
use tokio::sync::mpsc;
pub use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV_VAR: &str = "ACTIONGRAPH_LOG";

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    /// The filter directive could not be parsed.
    #[error("Invalid tracing filter '{filter}': {reason}")]
    InvalidFilter {
        /// The rejected directive.
        filter: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("Tracing subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Tracing output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracingFormat {
    /// Human-readable single-line format.
    #[default]
    Text,
    /// Multi-line pretty format.
    Pretty,
    /// Structured JSON format.
    Json,
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "compact" => Ok(Self::Text),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown tracing format: {s}")),
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Output format.
    pub format: TracingFormat,
    /// Level used when neither `filter` nor `ACTIONGRAPH_LOG` is set.
    pub level: Level,
    /// Explicit filter directive, overriding the environment.
    pub filter: Option<String>,
    /// Channel receiving typed events, if any.
    pub events: Option<mpsc::UnboundedSender<ActionGraphEvent>>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Text,
            level: Level::INFO,
            filter: None,
            events: None,
        }
    }
}

impl TracingConfig {
    /// Resolve the effective filter directive.
    #[must_use]
    pub fn filter_directive(&self) -> String {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }
        std::env::var(LOG_ENV_VAR)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.level.as_str().to_lowercase())
    }
}

/// Initialize the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a global
/// subscriber has already been installed.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let directive = config.filter_directive();
    let env_filter =
        EnvFilter::try_new(&directive).map_err(|e| TracingError::InvalidFilter {
            filter: directive.clone(),
            reason: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(config.events.map(ActionGraphEventLayer::new));

    let installed = match config.format {
        TracingFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(io::stderr)
                    .with_target(true),
            )
            .try_init(),
        TracingFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init(),
        TracingFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
    };
    installed.map_err(|e| TracingError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        filter = %directive,
        "Tracing initialized"
    );

    Ok(())
}
