//! Action Router: dispatch from `(kind, action type, operation)` to the
//! provider handler that performs it.
//!
//! The router is built once per run from provider registrations and provider
//! configuration. Mode tables are resolved during construction, so an unknown
//! mode fails before any task runs and dispatch afterwards is a single map
//! lookup. The router holds no mutable state and is shared by reference
//! (`Arc<ActionRouter>`) with every task.

mod handler;
mod registration;

pub use handler::{
    ActionHandler, ActionOutcome, ActionState, ActionStatus, EnvironmentHandler,
    EnvironmentStatus, HandlerParams, Operation, OperationParams, PluginContext,
    ResolvedVersions, StatusHandler, StatusOperation,
};
pub use registration::{ProviderConfig, ProviderRegistration};

use crate::action::{Action, ActionGraph, ActionKind};
use crate::{Error, Result};
use registration::{HandlerKey, StatusKey};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, debug, info_span, instrument};

/// Dispatch table for provider handlers.
pub struct ActionRouter {
    handlers: HashMap<HandlerKey, Arc<dyn ActionHandler>>,
    statuses: HashMap<StatusKey, Arc<dyn StatusHandler>>,
    environments: HashMap<String, Arc<dyn EnvironmentHandler>>,
    /// `(kind, action_type)` to owning provider.
    owners: HashMap<(ActionKind, String), String>,
    contexts: HashMap<String, PluginContext>,
    /// Provider names in registration order.
    providers: Vec<String>,
}

impl fmt::Debug for ActionRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRouter")
            .field("providers", &self.providers)
            .field("handlers", &self.handlers.len())
            .field("statuses", &self.statuses.len())
            .finish_non_exhaustive()
    }
}

/// Pick the entry for `mode` out of every table in `entries`.
///
/// Entries sharing a key form one table. Every table must contain the mode.
fn resolve_mode_tables<K, H>(
    provider: &str,
    mode: Option<&str>,
    entries: Vec<(K, String, H)>,
) -> Result<Vec<(K, H)>>
where
    K: Eq + std::hash::Hash + Clone,
{
    let mut tables: Vec<(K, BTreeMap<String, H>)> = Vec::new();
    for (key, entry_mode, handler) in entries {
        if let Some((_, table)) = tables.iter_mut().find(|(k, _)| *k == key) {
            table.insert(entry_mode, handler);
        } else {
            tables.push((key, BTreeMap::from([(entry_mode, handler)])));
        }
    }

    let mut resolved = Vec::with_capacity(tables.len());
    for (key, mut table) in tables {
        let selected = mode.and_then(|m| table.remove(m));
        match selected {
            Some(handler) => resolved.push((key, handler)),
            None => {
                return Err(Error::UnknownProviderMode {
                    provider: provider.to_string(),
                    mode: mode.unwrap_or("<unset>").to_string(),
                    available: table.into_keys().collect(),
                });
            }
        }
    }
    Ok(resolved)
}

impl ActionRouter {
    /// Build the router.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProviderMode`] when a provider with mode tables
    /// has no mode configured or a mode missing from one of its tables, and a
    /// configuration error when two providers claim the same action type, a
    /// handler key is registered twice, or configuration names an unregistered
    /// provider.
    #[instrument(name = "router_new", skip_all, fields(providers = registrations.len()))]
    pub fn new(
        registrations: Vec<ProviderRegistration>,
        configs: Vec<ProviderConfig>,
    ) -> Result<Self> {
        let mut configs: HashMap<String, ProviderConfig> = configs
            .into_iter()
            .map(|config| (config.name.clone(), config))
            .collect();

        let mut router = Self {
            handlers: HashMap::new(),
            statuses: HashMap::new(),
            environments: HashMap::new(),
            owners: HashMap::new(),
            contexts: HashMap::new(),
            providers: Vec::new(),
        };

        for registration in registrations {
            let ProviderRegistration {
                name,
                handlers,
                mode_handlers,
                statuses,
                mode_statuses,
                environment,
            } = registration;

            if router.contexts.contains_key(&name) {
                return Err(Error::configuration(format!(
                    "Provider '{name}' is registered more than once"
                )));
            }

            let config = configs
                .remove(&name)
                .unwrap_or_else(|| ProviderConfig::new(name.clone()));
            let has_modes = !mode_handlers.is_empty() || !mode_statuses.is_empty();
            let mode = config.mode.clone();

            let mut all_handlers = handlers;
            all_handlers.extend(resolve_mode_tables(&name, mode.as_deref(), mode_handlers)?);
            let mut all_statuses = statuses;
            all_statuses.extend(resolve_mode_tables(&name, mode.as_deref(), mode_statuses)?);

            for (key, handler) in all_handlers {
                router.claim(&name, key.kind, &key.action_type)?;
                if router.handlers.contains_key(&key) {
                    return Err(Error::configuration(format!(
                        "Provider '{name}' registers {} for {} '{}' twice",
                        key.operation, key.kind, key.action_type
                    )));
                }
                router.handlers.insert(key, handler);
            }

            for (key, handler) in all_statuses {
                router.claim(&name, key.kind, &key.action_type)?;
                if router.statuses.contains_key(&key) {
                    return Err(Error::configuration(format!(
                        "Provider '{name}' registers a status probe for {} '{}' twice",
                        key.kind, key.action_type
                    )));
                }
                router.statuses.insert(key, handler);
            }

            if let Some(environment) = environment {
                router.environments.insert(name.clone(), environment);
            }

            debug!(
                provider = %name,
                mode = ?mode,
                has_modes,
                "Registered provider"
            );
            router.contexts.insert(
                name.clone(),
                PluginContext {
                    provider: name.clone(),
                    mode,
                    config: Arc::new(config.config),
                },
            );
            router.providers.push(name);
        }

        if let Some(unknown) = configs.keys().min() {
            return Err(Error::configuration(format!(
                "Provider '{unknown}' is configured but not registered"
            )));
        }

        Ok(router)
    }

    fn claim(&mut self, provider: &str, kind: ActionKind, action_type: &str) -> Result<()> {
        let owner = self
            .owners
            .entry((kind, action_type.to_string()))
            .or_insert_with(|| provider.to_string());
        if owner == provider {
            Ok(())
        } else {
            Err(Error::configuration(format!(
                "{kind} actions of type '{action_type}' are handled by both '{owner}' and '{provider}'"
            )))
        }
    }

    /// Provider owning actions of this kind and type.
    #[must_use]
    pub fn provider_for(&self, kind: ActionKind, action_type: &str) -> Option<&str> {
        self.owners
            .get(&(kind, action_type.to_string()))
            .map(String::as_str)
    }

    /// Registered provider names, in registration order.
    #[must_use]
    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    /// Context for a provider.
    #[must_use]
    pub fn plugin_context(&self, provider: &str) -> Option<&PluginContext> {
        self.contexts.get(provider)
    }

    /// Environment handler of a provider.
    #[must_use]
    pub fn environment(&self, provider: &str) -> Option<Arc<dyn EnvironmentHandler>> {
        self.environments.get(provider).cloned()
    }

    /// Assemble the parameter bundle for an action.
    ///
    /// Actions whose type no provider claims get an empty context; dispatch
    /// on them fails with [`Error::MissingHandler`].
    #[must_use]
    pub fn params(
        &self,
        action: Arc<Action>,
        graph: Arc<ActionGraph>,
        extra: OperationParams,
    ) -> HandlerParams {
        let ctx = self
            .provider_for(action.kind, &action.action_type)
            .and_then(|provider| self.contexts.get(provider))
            .cloned()
            .unwrap_or_default();
        let log = info_span!(
            "action",
            action = %action.reference(),
            action_type = %action.action_type,
            provider = %ctx.provider,
        );
        HandlerParams {
            ctx,
            log,
            action,
            graph,
            extra,
        }
    }

    /// Dispatch a mutating operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHandler`] if nothing handles the operation for
    /// this action type. Handler errors are returned unmodified.
    pub async fn call(&self, operation: Operation, params: HandlerParams) -> Result<ActionOutcome> {
        let key = HandlerKey {
            kind: params.action.kind,
            action_type: params.action.action_type.clone(),
            operation,
        };
        let Some(handler) = self.handlers.get(&key) else {
            return Err(Error::MissingHandler {
                kind: key.kind.to_string(),
                action_type: key.action_type,
                operation: operation.to_string(),
            });
        };

        let span = params.log.clone();
        async {
            debug!(operation = %operation, "Dispatching to provider");
            handler.handle(params).await
        }
        .instrument(span)
        .await
    }

    /// Probe the status of an action.
    ///
    /// Returns `Ok(None)` when no status probe is registered for the action
    /// type, which callers treat as "no fast path".
    ///
    /// # Errors
    ///
    /// Probe errors are returned unmodified.
    pub async fn get_status(&self, params: HandlerParams) -> Result<Option<ActionStatus>> {
        let key = StatusKey {
            kind: params.action.kind,
            action_type: params.action.action_type.clone(),
        };
        let Some(handler) = self.statuses.get(&key) else {
            return Ok(None);
        };

        let span = params.log.clone();
        let probe = StatusOperation::for_kind(key.kind);
        async {
            debug!(probe = %probe, "Probing status");
            handler.status(params).await
        }
        .instrument(span)
        .await
    }

    /// Build an artifact.
    ///
    /// # Errors
    ///
    /// See [`ActionRouter::call`].
    pub async fn build(&self, params: HandlerParams) -> Result<ActionOutcome> {
        self.call(Operation::Build, params).await
    }

    /// Publish a built artifact.
    ///
    /// # Errors
    ///
    /// See [`ActionRouter::call`].
    pub async fn publish(&self, params: HandlerParams) -> Result<ActionOutcome> {
        self.call(Operation::Publish, params).await
    }

    /// Deploy a workload.
    ///
    /// # Errors
    ///
    /// See [`ActionRouter::call`].
    pub async fn deploy(&self, params: HandlerParams) -> Result<ActionOutcome> {
        self.call(Operation::Deploy, params).await
    }

    /// Delete a workload.
    ///
    /// # Errors
    ///
    /// See [`ActionRouter::call`].
    pub async fn delete(&self, params: HandlerParams) -> Result<ActionOutcome> {
        self.call(Operation::Delete, params).await
    }

    /// Execute a one-off job.
    ///
    /// # Errors
    ///
    /// See [`ActionRouter::call`].
    pub async fn run(&self, params: HandlerParams) -> Result<ActionOutcome> {
        self.call(Operation::Run, params).await
    }

    /// Execute a test job.
    ///
    /// # Errors
    ///
    /// See [`ActionRouter::call`].
    pub async fn test(&self, params: HandlerParams) -> Result<ActionOutcome> {
        self.call(Operation::Test, params).await
    }
}
