//! Physical session: one live client session owned by the pool.
//!
//! A [`PhysicalSession`] executes node operations for whichever handles are
//! bound to it, and turns client failures into the crate error taxonomy with
//! an operation-specific message. Destroying it is irreversible.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use parking_lot::Mutex;

use super::{
    factory::SessionFactory,
    handle::ConnectionHandle,
    pool::ConnectionManager,
    registry::{HandleId, HandleRegistry, SessionId},
};
use crate::{
    client::{Acl, ClientError, CoordinationClient, CreateMode, ErrorCode, Stat, Version},
    config::OutboundConfig,
    Error, Result,
};

// ═══════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════

/// Notification sent to the pool when an application closes a bound handle.
#[derive(Clone)]
pub struct ConnectionEvent {
    pub session: Arc<PhysicalSession>,
    pub handle: HandleId,
}

/// Pool-side observer of session events.
pub trait ConnectionEventListener: Send + Sync {
    fn connection_closed(&self, event: &ConnectionEvent);
}

// ═══════════════════════════════════════════════════════════════════════════
// SESSION
// ═══════════════════════════════════════════════════════════════════════════

pub struct PhysicalSession {
    id: SessionId,
    factory: Arc<SessionFactory>,
    manager: Weak<dyn ConnectionManager>,
    client: Arc<dyn CoordinationClient>,
    listeners: Mutex<Vec<Arc<dyn ConnectionEventListener>>>,
    destroyed: AtomicBool,
}

impl fmt::Debug for PhysicalSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalSession")
            .field("id", &self.id)
            .field("connect_string", &self.config().connect_string)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

impl PhysicalSession {
    pub(crate) fn new(
        factory: Arc<SessionFactory>,
        manager: Weak<dyn ConnectionManager>,
        client: Arc<dyn CoordinationClient>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            id: factory.registry().register_session(me.clone()),
            factory,
            manager,
            client,
            listeners: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        })
    }

    pub const fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &OutboundConfig {
        self.factory.config()
    }

    pub fn factory(&self) -> &Arc<SessionFactory> {
        &self.factory
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        self.factory.registry()
    }

    /// Session id assigned by the service, zero until connected.
    pub fn client_session_id(&self) -> i64 {
        self.client.session_id()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn check_live(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(Error::illegal_state(format!("{} has been destroyed", self.id)))
        } else {
            Ok(())
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ───────────────────────────────────────────────────────────────────────

    /// Hand out a new handle bound to this session. Handles previously bound
    /// here become inactive.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if the session is destroyed or the pool that
    /// created it is gone.
    pub fn get_connection(&self) -> Result<ConnectionHandle> {
        self.check_live()?;
        let manager = self
            .manager
            .upgrade()
            .ok_or_else(|| Error::illegal_state("connection manager has been dropped"))?;
        let handle = self.registry().bind_new(self.id)?;
        tracing::trace!(session = %self.id, %handle, "handle created");
        Ok(ConnectionHandle::new(
            handle,
            Arc::clone(&self.factory),
            manager,
        ))
    }

    /// Bind `handle` here, taking it from whatever session held it.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if the session is destroyed or the handle is
    /// closed or foreign to this session's registry.
    pub fn associate_connection(&self, handle: HandleId) -> Result<()> {
        self.check_live()?;
        self.registry().associate(handle, self.id)?;
        tracing::trace!(session = %self.id, %handle, "handle associated");
        Ok(())
    }

    /// Make every bound handle inactive without closing it.
    pub fn cleanup(&self) {
        let dissociated = self.registry().dissociate_all(self.id);
        tracing::trace!(session = %self.id, dissociated, "session cleaned up");
    }

    /// Close the underlying client. Bound handles are forced inactive first.
    /// Further calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns `Communication` if the client fails to close.
    pub async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let inactivated = self.registry().unregister_session(self.id);
        tracing::debug!(session = %self.id, inactivated, "destroying session");
        self.client.close().await.map_err(|e| {
            Error::Communication(format!(
                "Unable to close the coordination client connection: {e}"
            ))
        })
    }

    pub fn add_connection_event_listener(&self, listener: Arc<dyn ConnectionEventListener>) {
        let mut listeners = self.listeners.lock();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove_connection_event_listener(&self, listener: &Arc<dyn ConnectionEventListener>) {
        self.listeners.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Tell listeners `handle` was closed, then detach it.
    pub(crate) fn close_handle(self: &Arc<Self>, handle: HandleId) {
        let event = ConnectionEvent {
            session: Arc::clone(self),
            handle,
        };
        let listeners = self.listeners.lock().clone();
        listeners.iter().for_each(|l| l.connection_closed(&event));
        self.registry().detach(handle);
    }

    /// # Errors
    ///
    /// Always `Unsupported`.
    pub fn xa_resource(&self) -> Result<()> {
        Err(Error::unsupported("XA transactions are not supported"))
    }

    /// # Errors
    ///
    /// Always `Unsupported`.
    pub fn local_transaction(&self) -> Result<()> {
        Err(Error::unsupported("local transactions are not supported"))
    }

    // ───────────────────────────────────────────────────────────────────────
    // Node operations
    // ───────────────────────────────────────────────────────────────────────

    pub async fn create(
        &self,
        path: &str,
        data: &[u8],
        acl: &[Acl],
        mode: CreateMode,
        ttl: Option<Duration>,
    ) -> Result<(String, Stat)> {
        self.check_live()?;
        self.client
            .create(path, data, acl, mode, ttl)
            .await
            .map_err(|e| translate(&format!("Cannot create node {path}"), e))
    }

    pub async fn delete(&self, path: &str, version: Version) -> Result<()> {
        self.check_live()?;
        self.client
            .delete(path, version)
            .await
            .map_err(|e| translate(&format!("Cannot delete node {path}"), e))
    }

    pub async fn exists(&self, path: &str) -> Result<Option<Stat>> {
        self.check_live()?;
        self.client
            .exists(path)
            .await
            .map_err(|e| translate(&format!("Cannot check if node {path} exists"), e))
    }

    pub async fn get_acl(&self, path: &str) -> Result<(Vec<Acl>, Stat)> {
        self.check_live()?;
        self.client
            .get_acl(path)
            .await
            .map_err(|e| translate(&format!("Cannot get ACL for node {path}"), e))
    }

    pub async fn set_acl(&self, path: &str, acl: &[Acl], version: Version) -> Result<Stat> {
        self.check_live()?;
        self.client
            .set_acl(path, acl, version)
            .await
            .map_err(|e| translate(&format!("Cannot set ACL for node {path}"), e))
    }

    pub async fn get_all_children_number(&self, path: &str) -> Result<i32> {
        self.check_live()?;
        self.client
            .get_all_children_number(path)
            .await
            .map_err(|e| translate(&format!("Cannot get children number for node {path}"), e))
    }

    pub async fn get_children(&self, path: &str) -> Result<(Vec<String>, Stat)> {
        self.check_live()?;
        self.client
            .get_children(path)
            .await
            .map_err(|e| translate(&format!("Cannot get children for node {path}"), e))
    }

    pub async fn get_data(&self, path: &str) -> Result<(Vec<u8>, Stat)> {
        self.check_live()?;
        self.client
            .get_data(path)
            .await
            .map_err(|e| translate(&format!("Cannot get data for node {path}"), e))
    }

    pub async fn set_data(&self, path: &str, data: &[u8], version: Version) -> Result<Stat> {
        self.check_live()?;
        self.client
            .set_data(path, data, version)
            .await
            .map_err(|e| translate(&format!("Cannot set data for node {path}"), e))
    }

    /// Ephemeral nodes of this session, optionally limited to a path prefix.
    pub async fn get_ephemerals(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        self.check_live()?;
        self.client
            .get_ephemerals(prefix.unwrap_or("/"))
            .await
            .map_err(|e| {
                let session = self.client.session_id();
                let context = prefix.map_or_else(
                    || format!("Cannot get ephemeral nodes for session {session}"),
                    |p| format!("Cannot get ephemeral nodes with prefix {p} for session {session}"),
                );
                translate(&context, e)
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TRANSLATION
// ═══════════════════════════════════════════════════════════════════════════

/// Map a client failure to a crate error, prefixing `context`.
pub(crate) fn translate(context: &str, err: ClientError) -> Error {
    match err {
        ClientError::Interrupted => {
            Error::Interrupted(format!("{context}: operation has been interrupted"))
        }
        ClientError::Io(msg) => Error::Communication(format!("{context}: {msg}")),
        ClientError::Keeper { code, .. } => {
            let detail = match code {
                ErrorCode::NoNode => "node does not exist".to_string(),
                ErrorCode::NodeExists => "the node already exists".to_string(),
                ErrorCode::NoChildrenForEphemerals => {
                    "ephemeral nodes may not have children".to_string()
                }
                ErrorCode::InvalidAcl => "invalid ACL specified".to_string(),
                ErrorCode::BadVersion => "version conflict".to_string(),
                ErrorCode::NotEmpty => "the node has children".to_string(),
                _ => err.to_string(),
            };
            Error::service(code, format!("{context}: {detail}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{
        client::{Connector, InMemoryEnsemble},
        outbound::SimplePool,
    };

    #[derive(Default)]
    struct CountingListener {
        closed: AtomicUsize,
    }

    impl ConnectionEventListener for CountingListener {
        fn connection_closed(&self, _event: &ConnectionEvent) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pooled(ensemble: &InMemoryEnsemble) -> Result<(Arc<SimplePool>, Arc<SessionFactory>)> {
        let connector: Arc<dyn Connector> = Arc::new(ensemble.clone());
        Ok((SimplePool::new(), SessionFactory::new(OutboundConfig::default(), connector)?))
    }

    #[test]
    fn test_removed_listener_is_not_notified() -> Result<()> {
        let ensemble = InMemoryEnsemble::new();
        let (pool, factory) = pooled(&ensemble)?;
        let first = pool.allocate_connection(&factory)?;
        let session = first
            .session()
            .ok_or_else(|| Error::illegal_state("handle not bound"))?;

        let counting = Arc::new(CountingListener::default());
        let listener: Arc<dyn ConnectionEventListener> = counting.clone();
        session.add_connection_event_listener(Arc::clone(&listener));
        session.add_connection_event_listener(Arc::clone(&listener));
        first.close();
        assert_eq!(counting.closed.load(Ordering::SeqCst), 1);

        session.remove_connection_event_listener(&listener);
        let second = session.get_connection()?;
        second.close();
        assert_eq!(counting.closed.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn test_session_identity_and_transactions() -> Result<()> {
        let ensemble = InMemoryEnsemble::new();
        let (pool, factory) = pooled(&ensemble)?;
        let handle = pool.allocate_connection(&factory)?;
        let session = handle
            .session()
            .ok_or_else(|| Error::illegal_state("handle not bound"))?;

        assert_eq!(ensemble.live_sessions(), vec![session.client_session_id()]);
        assert!(matches!(session.local_transaction(), Err(Error::Unsupported(_))));
        assert!(matches!(session.xa_resource(), Err(Error::Unsupported(_))));
        Ok(())
    }

    #[test]
    fn test_translate_known_codes() {
        let err = translate(
            "Cannot create node /a",
            ClientError::keeper(ErrorCode::NodeExists, "/a"),
        );
        assert_eq!(err.to_string(), "Cannot create node /a: the node already exists");
        assert_eq!(err.code(), Some(ErrorCode::NodeExists));

        let err = translate(
            "Cannot delete node /a",
            ClientError::keeper(ErrorCode::BadVersion, "/a"),
        );
        assert_eq!(err.to_string(), "Cannot delete node /a: version conflict");
    }

    #[test]
    fn test_translate_falls_back_to_client_message() {
        let err = translate(
            "Cannot get data for node /a",
            ClientError::keeper(ErrorCode::ConnectionLoss, "/a"),
        );
        assert_eq!(err.code(), Some(ErrorCode::ConnectionLoss));
        assert!(err.to_string().starts_with("Cannot get data for node /a: KeeperErrorCode = "));
    }

    #[test]
    fn test_translate_interrupt_and_io() {
        let err = translate("Cannot set data for node /a", ClientError::Interrupted);
        assert_eq!(
            err,
            Error::Interrupted(
                "Cannot set data for node /a: operation has been interrupted".to_string()
            )
        );
        let err = translate("ctx", ClientError::Io("broken pipe".to_string()));
        assert_eq!(err, Error::Communication("ctx: broken pipe".to_string()));
    }
}
