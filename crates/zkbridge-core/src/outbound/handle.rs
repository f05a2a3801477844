//! Application-facing connection handle.

use std::{fmt, sync::Arc, time::Duration};

use super::{
    factory::SessionFactory,
    pool::ConnectionManager,
    registry::{CloseOutcome, HandleId, HandleState},
    session::PhysicalSession,
};
use crate::{
    client::{Acl, CreateMode, Stat, Version},
    Error, Result,
};

/// Handle returned to application code.
///
/// Every operation runs on the session the handle is bound to when the call
/// starts. An inactive handle asks a lazy-association pool for a session
/// first; without one the call fails with `IllegalState`. A closed handle
/// rejects everything. Dropping the handle closes it.
pub struct ConnectionHandle {
    id: HandleId,
    factory: Arc<SessionFactory>,
    manager: Arc<dyn ConnectionManager>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    pub(crate) fn new(
        id: HandleId,
        factory: Arc<SessionFactory>,
        manager: Arc<dyn ConnectionManager>,
    ) -> Self {
        Self {
            id,
            factory,
            manager,
        }
    }

    pub const fn id(&self) -> HandleId {
        self.id
    }

    pub fn factory(&self) -> &Arc<SessionFactory> {
        &self.factory
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self.factory.registry().lookup(self.id),
            HandleState::Closed | HandleState::Unknown
        )
    }

    /// Session currently bound, if any. Does not trigger association.
    pub fn session(&self) -> Option<Arc<PhysicalSession>> {
        match self.factory.registry().lookup(self.id) {
            HandleState::Bound(session) => Some(session),
            _ => None,
        }
    }

    /// Close the handle. Idempotent and infallible: the first call notifies
    /// the pool, later calls do nothing.
    pub fn close(&self) {
        match self.factory.registry().close(self.id) {
            CloseOutcome::AlreadyClosed => {}
            CloseOutcome::Bound(session) => {
                tracing::trace!(handle = %self.id, session = %session.id(), "closing bound handle");
                session.close_handle(self.id);
            }
            CloseOutcome::Inactive => {
                tracing::trace!(handle = %self.id, "closing inactive handle");
                if let Some(lazy) = self.manager.lazy() {
                    lazy.inactive_connection_closed(self.id, &self.factory);
                }
            }
        }
    }

    /// Detach from the current session without closing. The next operation
    /// re-associates through the pool.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if the handle is closed or the pool does not
    /// support lazy association.
    pub fn disassociate(&self) -> Result<()> {
        if self.manager.lazy().is_none() {
            return Err(Error::illegal_state(
                "the connection manager does not support lazy association",
            ));
        }
        self.factory.registry().rebind(self.id, None)
    }

    /// Resolve the session for one operation.
    fn bound_session(&self) -> Result<Arc<PhysicalSession>> {
        match self.factory.registry().lookup(self.id) {
            HandleState::Bound(session) => Ok(session),
            HandleState::Closed | HandleState::Unknown => Err(Error::illegal_state(
                "Cannot perform operation on a closed connection",
            )),
            HandleState::Inactive => self.associate_lazily(),
        }
    }

    fn associate_lazily(&self) -> Result<Arc<PhysicalSession>> {
        let lazy = self.manager.lazy().ok_or_else(|| {
            Error::illegal_state("connection handle is not associated with a session")
        })?;
        lazy.associate_connection(self, &self.factory)?;
        match self.factory.registry().lookup(self.id) {
            HandleState::Bound(session) => Ok(session),
            HandleState::Closed | HandleState::Unknown => Err(Error::illegal_state(
                "Cannot perform operation on a closed connection",
            )),
            HandleState::Inactive => Err(Error::illegal_state(
                "connection manager did not associate the handle",
            )),
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Node operations
    // ───────────────────────────────────────────────────────────────────────

    /// Create a node and return its actual path.
    pub async fn create(
        &self,
        path: &str,
        data: &[u8],
        acl: &[Acl],
        mode: CreateMode,
    ) -> Result<String> {
        self.create_with_stat(path, data, acl, mode)
            .await
            .map(|(actual, _)| actual)
    }

    pub async fn create_with_stat(
        &self,
        path: &str,
        data: &[u8],
        acl: &[Acl],
        mode: CreateMode,
    ) -> Result<(String, Stat)> {
        self.bound_session()?
            .create(path, data, acl, mode, None)
            .await
    }

    /// Create a TTL node; `mode` must be one of the TTL modes.
    pub async fn create_with_ttl(
        &self,
        path: &str,
        data: &[u8],
        acl: &[Acl],
        mode: CreateMode,
        ttl: Duration,
    ) -> Result<(String, Stat)> {
        self.bound_session()?
            .create(path, data, acl, mode, Some(ttl))
            .await
    }

    pub async fn delete(&self, path: &str, version: Version) -> Result<()> {
        self.bound_session()?.delete(path, version).await
    }

    /// Metadata of `path`, `None` when the node does not exist.
    pub async fn exists(&self, path: &str) -> Result<Option<Stat>> {
        self.bound_session()?.exists(path).await
    }

    pub async fn get_acl(&self, path: &str) -> Result<Vec<Acl>> {
        self.get_acl_with_stat(path).await.map(|(acl, _)| acl)
    }

    pub async fn get_acl_with_stat(&self, path: &str) -> Result<(Vec<Acl>, Stat)> {
        self.bound_session()?.get_acl(path).await
    }

    pub async fn set_acl(&self, path: &str, acl: &[Acl], version: Version) -> Result<Stat> {
        self.bound_session()?.set_acl(path, acl, version).await
    }

    pub async fn get_all_children_number(&self, path: &str) -> Result<i32> {
        self.bound_session()?.get_all_children_number(path).await
    }

    pub async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        self.get_children_with_stat(path)
            .await
            .map(|(children, _)| children)
    }

    pub async fn get_children_with_stat(&self, path: &str) -> Result<(Vec<String>, Stat)> {
        self.bound_session()?.get_children(path).await
    }

    pub async fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        self.get_data_with_stat(path).await.map(|(data, _)| data)
    }

    pub async fn get_data_with_stat(&self, path: &str) -> Result<(Vec<u8>, Stat)> {
        self.bound_session()?.get_data(path).await
    }

    pub async fn set_data(&self, path: &str, data: &[u8], version: Version) -> Result<Stat> {
        self.bound_session()?.set_data(path, data, version).await
    }

    /// Ephemeral nodes owned by the bound session.
    pub async fn get_ephemerals(&self) -> Result<Vec<String>> {
        self.bound_session()?.get_ephemerals(None).await
    }

    pub async fn get_ephemerals_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.bound_session()?.get_ephemerals(Some(prefix)).await
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
        self.factory.registry().forget(self.id);
    }
}
