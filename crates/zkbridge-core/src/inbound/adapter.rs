//! Inbound adapter: activations keyed by name.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use super::{endpoint::EndpointFactory, supervisor::WatchSessionSupervisor};
use crate::{
    client::Connector,
    config::{ActivationSpec, BridgeConfig},
    scheduler::WorkScheduler,
    Error, Result,
};

/// Starts and stops watch subscriptions on behalf of consumers.
pub struct WatchAdapter {
    connector: Arc<dyn Connector>,
    scheduler: Arc<dyn WorkScheduler>,
    activations: Mutex<HashMap<String, Arc<WatchSessionSupervisor>>>,
}

impl WatchAdapter {
    pub fn new(connector: Arc<dyn Connector>, scheduler: Arc<dyn WorkScheduler>) -> Self {
        Self {
            connector,
            scheduler,
            activations: Mutex::new(HashMap::new()),
        }
    }

    /// Register a consumer and start its subscription in the background.
    ///
    /// Returns once the connect work is scheduled; connect failures are
    /// logged by the work itself.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if `spec` is invalid or its name is already active
    /// - `Unavailable` if the scheduler refuses the connect work
    pub fn endpoint_activation(
        &self,
        factory: Arc<dyn EndpointFactory>,
        spec: ActivationSpec,
    ) -> Result<()> {
        let name = spec.name.clone();
        let mut activations = self.activations.lock();
        if activations.contains_key(&name) {
            return Err(Error::invalid_config(format!(
                "activation '{name}' is already active"
            )));
        }
        let supervisor = WatchSessionSupervisor::new(
            spec,
            Arc::clone(&self.connector),
            Arc::clone(&self.scheduler),
            factory,
        )?;
        self.scheduler.submit(supervisor.start_work())?;
        activations.insert(name.clone(), supervisor);
        tracing::info!(activation = %name, "endpoint activated");
        Ok(())
    }

    /// Activate every inbound entry of `config`, stopping at the first
    /// failure. `factory_for` maps an activation name to its consumer.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if no consumer exists for an activation
    /// - any error of [`endpoint_activation`](Self::endpoint_activation)
    pub fn activate_all<F>(&self, config: &BridgeConfig, factory_for: F) -> Result<()>
    where
        F: Fn(&str) -> Option<Arc<dyn EndpointFactory>>,
    {
        config.inbound.iter().try_for_each(|spec| {
            let factory = factory_for(&spec.name).ok_or_else(|| {
                Error::invalid_config(format!("no consumer for activation '{}'", spec.name))
            })?;
            self.endpoint_activation(factory, spec.clone())
        })
    }

    /// Stop and forget the named activation. Unknown names are a no-op.
    /// Returns whether an activation was stopped.
    pub async fn endpoint_deactivation(&self, name: &str) -> bool {
        let Some(supervisor) = self.activations.lock().remove(name) else {
            tracing::debug!(activation = name, "deactivation of unknown activation ignored");
            return false;
        };
        if let Err(e) = supervisor.close().await {
            tracing::error!(activation = name, error = %e, "error closing activation");
        }
        tracing::info!(activation = name, "endpoint deactivated");
        true
    }

    /// Close every activation. Failures are logged, never propagated.
    pub async fn stop(&self) {
        let all: Vec<(String, Arc<WatchSessionSupervisor>)> =
            self.activations.lock().drain().collect();
        for (name, supervisor) in all {
            if let Err(e) = supervisor.close().await {
                tracing::error!(activation = %name, error = %e, "error closing activation");
            }
        }
        tracing::info!("watch adapter stopped");
    }

    pub fn activation(&self, name: &str) -> Option<Arc<WatchSessionSupervisor>> {
        self.activations.lock().get(name).cloned()
    }

    pub fn active_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.activations.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Distributed transaction resources are not offered.
    ///
    /// # Errors
    ///
    /// Always returns `Unsupported`.
    pub fn xa_resources(&self) -> Result<()> {
        Err(Error::unsupported("XA resources are not supported"))
    }
}
