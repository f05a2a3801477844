//! Session and connection factories.

use std::sync::Arc;

use super::{
    handle::ConnectionHandle,
    pool::ConnectionManager,
    registry::HandleRegistry,
    session::PhysicalSession,
};
use crate::{client::Connector, config::OutboundConfig, Error, Result};

/// Creates physical sessions for one outbound configuration and recognises
/// pooled sessions it can reuse.
pub struct SessionFactory {
    config: OutboundConfig,
    connector: Arc<dyn Connector>,
    registry: Arc<HandleRegistry>,
}

impl SessionFactory {
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `config` fails validation.
    pub fn new(config: OutboundConfig, connector: Arc<dyn Connector>) -> Result<Arc<Self>> {
        Self::with_registry(config, connector, HandleRegistry::new())
    }

    /// Factory sharing an existing registry, so its sessions can take over
    /// handles issued by another factory on the same registry.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `config` fails validation.
    pub fn with_registry(
        config: OutboundConfig,
        connector: Arc<dyn Connector>,
        registry: Arc<HandleRegistry>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            connector,
            registry,
        }))
    }

    pub const fn config(&self) -> &OutboundConfig {
        &self.config
    }

    pub const fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// Open a new session on behalf of `manager`.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the client cannot create a session.
    pub fn create_session(
        self: &Arc<Self>,
        manager: &Arc<dyn ConnectionManager>,
    ) -> Result<Arc<PhysicalSession>> {
        let client = self
            .connector
            .connect(&self.config.session_params(), None)
            .map_err(|e| {
                Error::Unavailable(format!(
                    "Unable to create the coordination client connection: {e}"
                ))
            })?;
        let session = PhysicalSession::new(Arc::clone(self), Arc::downgrade(manager), client);
        tracing::debug!(
            session = %session.id(),
            connect_string = %self.config.connect_string,
            "physical session created"
        );
        Ok(session)
    }

    /// First live candidate created for this registry with an equal
    /// configuration.
    pub fn match_session(
        &self,
        candidates: &[Arc<PhysicalSession>],
    ) -> Option<Arc<PhysicalSession>> {
        candidates
            .iter()
            .find(|s| {
                !s.is_destroyed()
                    && Arc::ptr_eq(s.registry(), &self.registry)
                    && s.config() == &self.config
            })
            .cloned()
    }

    /// Application-facing factory backed by `manager`.
    pub fn create_connection_factory(
        self: &Arc<Self>,
        manager: Arc<dyn ConnectionManager>,
    ) -> ConnectionFactory {
        ConnectionFactory {
            factory: Arc::clone(self),
            manager,
        }
    }

    /// # Errors
    ///
    /// Always `Unsupported`: handles only exist under a connection manager.
    pub fn create_unmanaged_connection_factory(&self) -> Result<ConnectionFactory> {
        Err(Error::unsupported(
            "This bridge doesn't support a non-managed environment",
        ))
    }
}

/// What applications hold to obtain handles.
#[derive(Clone)]
pub struct ConnectionFactory {
    factory: Arc<SessionFactory>,
    manager: Arc<dyn ConnectionManager>,
}

impl ConnectionFactory {
    /// Obtain a handle from the pool.
    ///
    /// # Errors
    ///
    /// Whatever the pool reports, typically `Unavailable`.
    pub fn get_connection(&self) -> Result<ConnectionHandle> {
        self.manager.allocate_connection(&self.factory)
    }

    pub fn session_factory(&self) -> &Arc<SessionFactory> {
        &self.factory
    }
}
