//! Provider registrations and provider configuration.

use super::handler::{ActionHandler, EnvironmentHandler, Operation, StatusHandler};
use crate::action::ActionKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Dispatch key for mutating operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct HandlerKey {
    pub kind: ActionKind,
    pub action_type: String,
    pub operation: Operation,
}

/// Dispatch key for status probes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct StatusKey {
    pub kind: ActionKind,
    pub action_type: String,
}

/// Handlers a provider contributes to the router.
///
/// Mode handlers form per-key tables; the provider's configured mode picks
/// one entry from every table when the router is built.
///
/// # Example
///
/// ```ignore
/// let registration = ProviderRegistration::new("kubernetes")
///     .mode_handler(ActionKind::Build, "container", Operation::Build, "kaniko", kaniko_build)
///     .mode_handler(ActionKind::Build, "container", Operation::Build, "local-docker", docker_build)
///     .handler(ActionKind::Deploy, "container", Operation::Deploy, deploy)
///     .status(ActionKind::Deploy, "container", deploy_status);
/// ```
#[derive(Clone)]
pub struct ProviderRegistration {
    pub(crate) name: String,
    pub(crate) handlers: Vec<(HandlerKey, Arc<dyn ActionHandler>)>,
    pub(crate) mode_handlers: Vec<(HandlerKey, String, Arc<dyn ActionHandler>)>,
    pub(crate) statuses: Vec<(StatusKey, Arc<dyn StatusHandler>)>,
    pub(crate) mode_statuses: Vec<(StatusKey, String, Arc<dyn StatusHandler>)>,
    pub(crate) environment: Option<Arc<dyn EnvironmentHandler>>,
}

impl ProviderRegistration {
    /// Start a registration for the named provider.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: Vec::new(),
            mode_handlers: Vec::new(),
            statuses: Vec::new(),
            mode_statuses: Vec::new(),
            environment: None,
        }
    }

    /// Provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a handler for one operation on one action type.
    #[must_use]
    pub fn handler<H>(
        mut self,
        kind: ActionKind,
        action_type: impl Into<String>,
        operation: Operation,
        handler: H,
    ) -> Self
    where
        H: ActionHandler + 'static,
    {
        self.handlers.push((
            HandlerKey {
                kind,
                action_type: action_type.into(),
                operation,
            },
            Arc::new(handler),
        ));
        self
    }

    /// Register one mode-table entry.
    #[must_use]
    pub fn mode_handler<H>(
        mut self,
        kind: ActionKind,
        action_type: impl Into<String>,
        operation: Operation,
        mode: impl Into<String>,
        handler: H,
    ) -> Self
    where
        H: ActionHandler + 'static,
    {
        self.mode_handlers.push((
            HandlerKey {
                kind,
                action_type: action_type.into(),
                operation,
            },
            mode.into(),
            Arc::new(handler),
        ));
        self
    }

    /// Register a status probe.
    #[must_use]
    pub fn status<H>(mut self, kind: ActionKind, action_type: impl Into<String>, handler: H) -> Self
    where
        H: StatusHandler + 'static,
    {
        self.statuses.push((
            StatusKey {
                kind,
                action_type: action_type.into(),
            },
            Arc::new(handler),
        ));
        self
    }

    /// Register one status mode-table entry.
    #[must_use]
    pub fn mode_status<H>(
        mut self,
        kind: ActionKind,
        action_type: impl Into<String>,
        mode: impl Into<String>,
        handler: H,
    ) -> Self
    where
        H: StatusHandler + 'static,
    {
        self.mode_statuses.push((
            StatusKey {
                kind,
                action_type: action_type.into(),
            },
            mode.into(),
            Arc::new(handler),
        ));
        self
    }

    /// Register the provider's environment handler.
    #[must_use]
    pub fn environment<H>(mut self, handler: H) -> Self
    where
        H: EnvironmentHandler + 'static,
    {
        self.environment = Some(Arc::new(handler));
        self
    }

    /// Whether the provider declares any mode table.
    #[must_use]
    pub fn has_modes(&self) -> bool {
        !self.mode_handlers.is_empty() || !self.mode_statuses.is_empty()
    }
}

/// Configuration of one provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Provider name.
    pub name: String,
    /// Selected mode for providers with mode tables.
    #[serde(default)]
    pub mode: Option<String>,
    /// Provider-specific configuration.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ProviderConfig {
    /// Configuration for `name` with no mode.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Select a mode.
    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Attach provider configuration.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}
