//! Handle/session association table.
//!
//! One [`HandleRegistry`] is shared by a session factory, its sessions and
//! every handle they hand out. It maps each handle to the session it is bound
//! to and each session to the set of handles bound to it. Both maps live
//! behind a single mutex, so a rebind is one atomic step and no observer ever
//! sees a handle half-bound or in two sets.
//!
//! Handle sets are persistent (`im::HashSet`): a snapshot for iteration is a
//! cheap clone that stays valid while other handles are closed or rebound.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;

use super::session::PhysicalSession;
use crate::{Error, Result};

/// Identity of an application-level handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

/// Identity of a physical session within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// What a handle currently points at.
pub enum HandleState {
    Bound(Arc<PhysicalSession>),
    /// Open but not bound to any live session.
    Inactive,
    Closed,
    /// Never issued by this registry, or already forgotten.
    Unknown,
}

/// Result of [`HandleRegistry::close`].
pub enum CloseOutcome {
    AlreadyClosed,
    /// The handle was bound; it stays in the session's set until the session
    /// has notified its listeners and detached it.
    Bound(Arc<PhysicalSession>),
    Inactive,
}

struct HandleEntry {
    session: Option<SessionId>,
    closed: bool,
}

struct SessionEntry {
    session: Weak<PhysicalSession>,
    handles: im::HashSet<HandleId>,
}

#[derive(Default)]
struct Table {
    handles: HashMap<HandleId, HandleEntry>,
    sessions: HashMap<SessionId, SessionEntry>,
}

impl Table {
    /// Remove `handle` from whatever set holds it and clear its reference.
    fn unbind(&mut self, handle: HandleId) {
        let old = self
            .handles
            .get_mut(&handle)
            .and_then(|entry| entry.session.take());
        if let Some(entry) = old.and_then(|sid| self.sessions.get_mut(&sid)) {
            entry.handles.remove(&handle);
        }
    }

    /// Make every handle bound to `session` inactive.
    fn inactivate_all(&mut self, session: SessionId) -> usize {
        let Some(entry) = self.sessions.get_mut(&session) else {
            return 0;
        };
        let bound = std::mem::take(&mut entry.handles);
        for handle in bound.iter() {
            if let Some(h) = self.handles.get_mut(handle) {
                h.session = None;
            }
        }
        bound.len()
    }

    fn bind(&mut self, handle: HandleId, session: SessionId) -> Result<()> {
        let Some(entry) = self.sessions.get_mut(&session) else {
            return Err(Error::illegal_state(format!("{session} has been destroyed")));
        };
        entry.handles.insert(handle);
        if let Some(h) = self.handles.get_mut(&handle) {
            h.session = Some(session);
        }
        Ok(())
    }

    fn open_handle(&self, handle: HandleId) -> Result<()> {
        match self.handles.get(&handle) {
            Some(entry) if entry.closed => Err(Error::illegal_state(format!(
                "{handle} is closed"
            ))),
            Some(_) => Ok(()),
            None => Err(Error::illegal_state(format!(
                "{handle} is not known to this registry"
            ))),
        }
    }
}

/// Association table shared by one factory's sessions and handles.
#[derive(Default)]
pub struct HandleRegistry {
    table: Mutex<Table>,
    next_handle: AtomicU64,
    next_session: AtomicU64,
}

impl HandleRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // ───────────────────────────────────────────────────────────────────────
    // Sessions
    // ───────────────────────────────────────────────────────────────────────

    pub fn register_session(&self, session: Weak<PhysicalSession>) -> SessionId {
        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        self.table.lock().sessions.insert(
            id,
            SessionEntry {
                session,
                handles: im::HashSet::new(),
            },
        );
        id
    }

    /// Force every bound handle inactive, then forget the session.
    /// Returns how many handles were inactivated.
    pub fn unregister_session(&self, session: SessionId) -> usize {
        let mut table = self.table.lock();
        let inactivated = table.inactivate_all(session);
        table.sessions.remove(&session);
        inactivated
    }

    /// Inactivate the session's handles and bind a fresh handle to it.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if the session is not registered.
    pub fn bind_new(&self, session: SessionId) -> Result<HandleId> {
        let handle = HandleId(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut table = self.table.lock();
        if !table.sessions.contains_key(&session) {
            return Err(Error::illegal_state(format!("{session} has been destroyed")));
        }
        table.inactivate_all(session);
        table.handles.insert(
            handle,
            HandleEntry {
                session: None,
                closed: false,
            },
        );
        table.bind(handle, session)?;
        Ok(handle)
    }

    /// Inactivate every handle bound to `session`; they stay open.
    pub fn dissociate_all(&self, session: SessionId) -> usize {
        self.table.lock().inactivate_all(session)
    }

    /// Handles currently bound to `session`.
    pub fn handles_of(&self, session: SessionId) -> im::HashSet<HandleId> {
        self.table
            .lock()
            .sessions
            .get(&session)
            .map(|entry| entry.handles.clone())
            .unwrap_or_default()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Handles
    // ───────────────────────────────────────────────────────────────────────

    /// Move `handle` to `target`, or make it inactive with `None`.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` for a closed or unknown handle, or when the
    /// target session is no longer registered. The handle is left untouched.
    pub fn rebind(&self, handle: HandleId, target: Option<SessionId>) -> Result<()> {
        let mut table = self.table.lock();
        table.open_handle(handle)?;
        if let Some(session) = target {
            if !table.sessions.contains_key(&session) {
                return Err(Error::illegal_state(format!("{session} has been destroyed")));
            }
        }
        table.unbind(handle);
        target.map_or(Ok(()), |session| table.bind(handle, session))
    }

    /// Make `session` the sole owner of `handle`: every other handle bound
    /// to it becomes inactive, then `handle` moves over from its old session.
    ///
    /// # Errors
    ///
    /// Same as [`rebind`](Self::rebind).
    pub fn associate(&self, handle: HandleId, session: SessionId) -> Result<()> {
        let mut table = self.table.lock();
        table.open_handle(handle)?;
        if !table.sessions.contains_key(&session) {
            return Err(Error::illegal_state(format!("{session} has been destroyed")));
        }
        table.inactivate_all(session);
        table.unbind(handle);
        table.bind(handle, session)
    }

    /// Detach `handle` from its session whether or not it is closed.
    pub fn detach(&self, handle: HandleId) {
        self.table.lock().unbind(handle);
    }

    pub fn lookup(&self, handle: HandleId) -> HandleState {
        let table = self.table.lock();
        match table.handles.get(&handle) {
            None => HandleState::Unknown,
            Some(entry) if entry.closed => HandleState::Closed,
            Some(entry) => entry
                .session
                .and_then(|sid| table.sessions.get(&sid))
                .and_then(|s| s.session.upgrade())
                .map_or(HandleState::Inactive, HandleState::Bound),
        }
    }

    /// Mark `handle` closed. Only the first call reports anything other than
    /// `AlreadyClosed`.
    pub fn close(&self, handle: HandleId) -> CloseOutcome {
        let mut table = self.table.lock();
        let session = match table.handles.get_mut(&handle) {
            None => return CloseOutcome::AlreadyClosed,
            Some(entry) if entry.closed => return CloseOutcome::AlreadyClosed,
            Some(entry) => {
                entry.closed = true;
                entry.session
            }
        };
        let bound = session
            .and_then(|sid| table.sessions.get(&sid))
            .and_then(|s| s.session.upgrade());
        match bound {
            Some(session) => CloseOutcome::Bound(session),
            None => {
                table.unbind(handle);
                CloseOutcome::Inactive
            }
        }
    }

    /// Drop all bookkeeping for `handle`.
    pub fn forget(&self, handle: HandleId) {
        let mut table = self.table.lock();
        table.unbind(handle);
        table.handles.remove(&handle);
    }

    /// Number of session sets containing `handle`.
    pub fn memberships(&self, handle: HandleId) -> usize {
        self.table
            .lock()
            .sessions
            .values()
            .filter(|entry| entry.handles.contains(&handle))
            .count()
    }

    /// Both directions of the table agree: every bound handle sits in exactly
    /// its session's set and every set member points back at that session.
    pub fn is_consistent(&self) -> bool {
        let table = self.table.lock();
        let forward = table.handles.iter().all(|(id, entry)| {
            let holders: Vec<SessionId> = table
                .sessions
                .iter()
                .filter(|(_, s)| s.handles.contains(id))
                .map(|(sid, _)| *sid)
                .collect();
            match entry.session {
                Some(sid) => holders == [sid],
                None => holders.is_empty(),
            }
        });
        let backward = table.sessions.iter().all(|(sid, s)| {
            s.handles.iter().all(|h| {
                table
                    .handles
                    .get(h)
                    .is_some_and(|entry| entry.session == Some(*sid))
            })
        });
        forward && backward
    }
}
