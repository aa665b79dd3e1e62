//! Solver configuration.
//!
//! Loaded from TOML or JSON, with camelCase keys in both:
//!
//! ```toml
//! defaultTimeoutSecs = 600
//!
//! [concurrency]
//! build = 2
//! delete-deploy = 4
//!
//! [[providers]]
//! name = "kubernetes"
//! mode = "cluster-build"
//!
//! [log]
//! format = "json"
//! level = "debug"
//! ```

use crate::router::ProviderConfig;
use crate::{Error, Result};
use actiongraph_events::{Level, TracingConfig, TracingFormat, init_tracing};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for a solve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SolverConfig {
    /// Per task type concurrency limits, overriding the task defaults.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub concurrency: HashMap<String, usize>,

    /// Timeout for run and test operations when the action sets none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout_secs: Option<u64>,

    /// Provider modes and settings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderConfig>,

    /// Logging setup.
    #[serde(default)]
    pub log: LogConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// Output format.
    #[serde(default)]
    pub format: TracingFormat,

    /// Default level (`trace`, `debug`, `info`, `warn`, `error`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Explicit filter directive; `ACTIONGRAPH_LOG` is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::default(),
            level: default_log_level(),
            filter: None,
        }
    }
}

impl LogConfig {
    /// Convert into the subscriber configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown level.
    pub fn tracing_config(&self) -> Result<TracingConfig> {
        let level: Level = self
            .level
            .parse()
            .map_err(|_| Error::configuration(format!("Unknown log level '{}'", self.level)))?;
        Ok(TracingConfig {
            format: self.format,
            level,
            filter: self.filter.clone(),
            events: None,
        })
    }
}

impl SolverConfig {
    /// Parse TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Toml`] on malformed input, or a configuration error if
    /// the parsed values are invalid.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] on malformed input, or a configuration error if
    /// the parsed values are invalid.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, a configuration error
    /// for other extensions, and parse errors as for the string loaders.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            Some("json") => Self::from_json_str(&contents),
            _ => Err(Error::configuration(format!(
                "Unsupported configuration file '{}': expected .toml or .json",
                path.display()
            ))),
        }
    }

    /// Check invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero concurrency limit, a zero
    /// default timeout, or a provider configured twice.
    pub fn validate(&self) -> Result<()> {
        let mut zero: Vec<&str> = self
            .concurrency
            .iter()
            .filter(|(_, limit)| **limit == 0)
            .map(|(task_type, _)| task_type.as_str())
            .collect();
        if !zero.is_empty() {
            zero.sort_unstable();
            return Err(Error::configuration(format!(
                "Concurrency limit must be at least 1 for: {}",
                zero.join(", ")
            )));
        }

        if self.default_timeout_secs == Some(0) {
            return Err(Error::configuration("defaultTimeoutSecs must be at least 1"));
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name.as_str()) {
                return Err(Error::configuration(format!(
                    "Provider '{}' is configured more than once",
                    provider.name
                )));
            }
        }
        Ok(())
    }

    /// Effective limit for `task_type`: the configured override, else
    /// `default`. `None` is unlimited.
    #[must_use]
    pub fn concurrency_limit_for(&self, task_type: &str, default: Option<usize>) -> Option<usize> {
        self.concurrency.get(task_type).copied().or(default)
    }

    /// Default operation timeout.
    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }

    /// Install the global tracing subscriber described by [`Self::log`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid level or filter, or when
    /// a subscriber is already installed.
    pub fn init_logging(&self) -> Result<()> {
        init_tracing(self.log.tracing_config()?)?;
        Ok(())
    }
}
