//! Host pool boundary and the bundled reference pool.
//!
//! The bridge never pools sessions itself; it asks a [`ConnectionManager`]
//! for handles. Hosts that can re-bind handles on demand also implement
//! [`LazyAssociation`]. [`SimplePool`] covers both for hosts without a pool
//! of their own.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Weak,
};

use parking_lot::Mutex;

use super::{
    factory::SessionFactory,
    handle::ConnectionHandle,
    registry::HandleId,
    session::{ConnectionEvent, ConnectionEventListener, PhysicalSession},
};
use crate::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════
// TRAITS
// ═══════════════════════════════════════════════════════════════════════════

/// Allocates handles out of pooled sessions.
pub trait ConnectionManager: Send + Sync {
    /// Match an idle session for `factory` or create one, and return a new
    /// handle bound to it.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` when no session can be created.
    fn allocate_connection(&self, factory: &Arc<SessionFactory>) -> Result<ConnectionHandle>;

    /// Lazy association support, when the host has it.
    fn lazy(&self) -> Option<&dyn LazyAssociation> {
        None
    }
}

/// Re-binding of inactive handles on demand.
pub trait LazyAssociation: Send + Sync {
    /// Bind `handle` to a suitable session.
    ///
    /// # Errors
    ///
    /// Returns an error when no session can be found or created.
    fn associate_connection(
        &self,
        handle: &ConnectionHandle,
        factory: &Arc<SessionFactory>,
    ) -> Result<()>;

    /// An inactive handle was closed by the application.
    fn inactive_connection_closed(&self, handle: HandleId, factory: &Arc<SessionFactory>);
}

// ═══════════════════════════════════════════════════════════════════════════
// SIMPLE POOL
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct PoolState {
    idle: Vec<Arc<PhysicalSession>>,
    in_use: Vec<Arc<PhysicalSession>>,
}

impl PoolState {
    fn move_to_idle(&mut self, session: &Arc<PhysicalSession>) -> bool {
        let before = self.in_use.len();
        self.in_use.retain(|s| !Arc::ptr_eq(s, session));
        let moved = self.in_use.len() != before;
        if moved && !session.is_destroyed() {
            self.idle.push(Arc::clone(session));
        }
        moved
    }

    /// In-use sessions that no longer have any handle go back to idle.
    fn sweep_unbound(&mut self) {
        let (unbound, bound): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_use)
            .into_iter()
            .partition(|s| s.registry().handles_of(s.id()).is_empty());
        self.in_use = bound;
        self.idle
            .extend(unbound.into_iter().filter(|s| !s.is_destroyed()));
    }
}

/// Reference pool: one handle per in-use session, idle sessions reused by
/// configuration match, optional lazy association.
pub struct SimplePool {
    me: Weak<SimplePool>,
    lazy_association: bool,
    state: Mutex<PoolState>,
    inactive_closed: AtomicUsize,
}

/// Session listener that does not keep the pool alive.
struct PoolListener(Weak<SimplePool>);

impl ConnectionEventListener for PoolListener {
    fn connection_closed(&self, event: &ConnectionEvent) {
        if let Some(pool) = self.0.upgrade() {
            pool.recycle(&event.session);
        }
    }
}

impl SimplePool {
    /// Pool without lazy association: inactive handles are unusable.
    pub fn new() -> Arc<Self> {
        Self::build(false)
    }

    pub fn with_lazy_association() -> Arc<Self> {
        Self::build(true)
    }

    fn build(lazy_association: bool) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            lazy_association,
            state: Mutex::new(PoolState::default()),
            inactive_closed: AtomicUsize::new(0),
        })
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.state.lock().in_use.len()
    }

    /// How many inactive handles were closed under lazy association.
    pub fn inactive_closed_count(&self) -> usize {
        self.inactive_closed.load(Ordering::Acquire)
    }

    fn recycle(&self, session: &Arc<PhysicalSession>) {
        if self.state.lock().move_to_idle(session) {
            tracing::trace!(session = %session.id(), "session returned to pool");
        }
    }

    /// Take a matching idle session or create a new one, mark it in use and
    /// run `bind` on it, all under the pool lock. A session whose `bind`
    /// failed is swept back to idle on the next checkout.
    fn with_session<T>(
        &self,
        factory: &Arc<SessionFactory>,
        bind: impl FnOnce(&Arc<PhysicalSession>) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.lock();
        state.sweep_unbound();
        let session = match factory.match_session(&state.idle) {
            Some(session) => {
                state.idle.retain(|s| !Arc::ptr_eq(s, &session));
                tracing::trace!(session = %session.id(), "reusing pooled session");
                session
            }
            None => {
                let pool = self.me.upgrade().ok_or_else(|| {
                    Error::Unavailable("connection pool has been dropped".to_string())
                })?;
                let manager: Arc<dyn ConnectionManager> = pool;
                let session = factory.create_session(&manager)?;
                session.add_connection_event_listener(Arc::new(PoolListener(self.me.clone())));
                session
            }
        };
        state.in_use.push(Arc::clone(&session));
        bind(&session)
    }

    /// Destroy every idle session. Returns how many were destroyed.
    pub async fn evict_idle(&self) -> usize {
        let idle = std::mem::take(&mut self.state.lock().idle);
        destroy_all(&idle).await
    }

    /// Destroy every session, idle or in use.
    pub async fn shutdown(&self) -> usize {
        let sessions: Vec<_> = {
            let mut state = self.state.lock();
            let mut all = std::mem::take(&mut state.idle);
            all.append(&mut state.in_use);
            all
        };
        let destroyed = destroy_all(&sessions).await;
        tracing::info!(destroyed, "connection pool shut down");
        destroyed
    }
}

async fn destroy_all(sessions: &[Arc<PhysicalSession>]) -> usize {
    let mut destroyed = 0;
    for session in sessions {
        match session.destroy().await {
            Ok(()) => destroyed += 1,
            Err(e) => tracing::warn!(session = %session.id(), error = %e, "failed to destroy session"),
        }
    }
    destroyed
}

impl ConnectionManager for SimplePool {
    fn allocate_connection(&self, factory: &Arc<SessionFactory>) -> Result<ConnectionHandle> {
        self.with_session(factory, |session| session.get_connection())
    }

    fn lazy(&self) -> Option<&dyn LazyAssociation> {
        if self.lazy_association {
            Some(self)
        } else {
            None
        }
    }
}

impl LazyAssociation for SimplePool {
    fn associate_connection(
        &self,
        handle: &ConnectionHandle,
        factory: &Arc<SessionFactory>,
    ) -> Result<()> {
        let id = handle.id();
        self.with_session(factory, |session| session.associate_connection(id))
    }

    fn inactive_connection_closed(&self, handle: HandleId, _factory: &Arc<SessionFactory>) {
        self.inactive_closed.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(%handle, "inactive handle closed");
    }
}
