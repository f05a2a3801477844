//! In-process coordination service.
//!
//! [`InMemoryEnsemble`] keeps the whole node tree in memory and hands out
//! sessions through the [`Connector`] trait. It follows the service's rules
//! for versions, sequential names, ephemeral ownership and persistent watch
//! firing closely enough to run the bridge against it in tests and demos.
//!
//! Faults are injected explicitly: [`InMemoryEnsemble::set_reachable`],
//! [`InMemoryEnsemble::expire_session`],
//! [`InMemoryEnsemble::disconnect_session`] and
//! [`InMemoryEnsemble::reconnect_session`].
//!
//! Notifications are delivered synchronously on the thread that caused them,
//! after the tree lock is released.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use parking_lot::Mutex;

use super::{
    types::{Acl, CreateMode, ErrorCode, EventType, KeeperState, Stat, Version, WatchMode, WatchedEvent},
    ClientError, ClientResult, Connector, CoordinationClient, SessionParams, Watcher,
};

// ═══════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    /// Created while the service was unreachable; waiting to connect.
    Pending,
    Connected,
    Disconnected,
    Expired,
    Closed,
}

struct PersistentWatch {
    path: String,
    mode: WatchMode,
    watcher: Arc<dyn Watcher>,
}

struct SessionEntry {
    status: SessionStatus,
    default_watcher: Option<Arc<dyn Watcher>>,
    watches: Vec<PersistentWatch>,
}

impl SessionEntry {
    /// Default watcher plus every distinct persistent watcher.
    fn all_watchers(&self) -> Vec<Arc<dyn Watcher>> {
        let mut watchers: Vec<Arc<dyn Watcher>> = Vec::new();
        self.default_watcher
            .iter()
            .chain(self.watches.iter().map(|w| &w.watcher))
            .for_each(|watcher| push_distinct(&mut watchers, watcher));
        watchers
    }
}

#[derive(Clone)]
struct Node {
    data: Vec<u8>,
    acl: Vec<Acl>,
    stat: Stat,
    mode: CreateMode,
    ttl: Option<Duration>,
    /// Containers are only reaped once they had at least one child.
    had_children: bool,
}

struct Tree {
    nodes: BTreeMap<String, Node>,
    sessions: HashMap<i64, SessionEntry>,
    zxid: i64,
    next_session_id: i64,
    reachable: bool,
}

type Delivery = (Arc<dyn Watcher>, WatchedEvent);

struct EnsembleInner {
    tree: Mutex<Tree>,
}

/// A whole coordination service living in this process.
#[derive(Clone)]
pub struct InMemoryEnsemble {
    inner: Arc<EnsembleInner>,
}

impl Default for InMemoryEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

impl InMemoryEnsemble {
    /// A reachable ensemble holding only the root node.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                data: Vec::new(),
                acl: Acl::open_unsafe(),
                stat: Stat::default(),
                mode: CreateMode::Persistent,
                ttl: None,
                had_children: false,
            },
        );
        Self {
            inner: Arc::new(EnsembleInner {
                tree: Mutex::new(Tree {
                    nodes,
                    sessions: HashMap::new(),
                    zxid: 0,
                    next_session_id: 0x1000,
                    reachable: true,
                }),
            }),
        }
    }

    /// An ensemble that accepts sessions but never lets them connect until
    /// [`set_reachable(true)`](Self::set_reachable) is called.
    pub fn unreachable() -> Self {
        let ensemble = Self::new();
        ensemble.inner.tree.lock().reachable = false;
        ensemble
    }

    /// Toggle network reachability.
    ///
    /// Going down disconnects every connected session; coming back connects
    /// pending sessions and resumes disconnected ones.
    pub fn set_reachable(&self, reachable: bool) {
        let deliveries = {
            let mut tree = self.inner.tree.lock();
            tree.reachable = reachable;
            let mut deliveries = Vec::new();
            for session in tree.sessions.values_mut() {
                let signal = match (session.status, reachable) {
                    (SessionStatus::Connected, false) => {
                        session.status = SessionStatus::Disconnected;
                        Some(KeeperState::Disconnected)
                    }
                    (SessionStatus::Pending | SessionStatus::Disconnected, true) => {
                        session.status = SessionStatus::Connected;
                        Some(KeeperState::SyncConnected)
                    }
                    _ => None,
                };
                if let Some(state) = signal {
                    let event = WatchedEvent::session(state);
                    deliveries.extend(
                        session
                            .all_watchers()
                            .into_iter()
                            .map(|w| (w, event.clone())),
                    );
                }
            }
            deliveries
        };
        deliver(deliveries);
    }

    /// Expire a session the way the service does after prolonged silence:
    /// its ephemeral nodes go away, its watches are dropped and its watchers
    /// receive `Expired`.
    pub fn expire_session(&self, session_id: i64) -> bool {
        let deliveries = {
            let mut tree = self.inner.tree.lock();
            let Some(session) = tree.sessions.get_mut(&session_id) else {
                return false;
            };
            if matches!(session.status, SessionStatus::Expired | SessionStatus::Closed) {
                return false;
            }
            session.status = SessionStatus::Expired;
            let event = WatchedEvent::session(KeeperState::Expired);
            let mut deliveries: Vec<Delivery> = session
                .all_watchers()
                .into_iter()
                .map(|w| (w, event.clone()))
                .collect();
            session.watches.clear();
            session.default_watcher = None;
            deliveries.extend(tree.remove_ephemerals(session_id));
            deliveries
        };
        deliver(deliveries);
        true
    }

    /// Drop the connection of a session without expiring it.
    pub fn disconnect_session(&self, session_id: i64) -> bool {
        self.switch_connection(session_id, SessionStatus::Connected, SessionStatus::Disconnected)
    }

    /// Restore a disconnected session; its watches stay registered.
    pub fn reconnect_session(&self, session_id: i64) -> bool {
        self.switch_connection(session_id, SessionStatus::Disconnected, SessionStatus::Connected)
    }

    /// Ids of sessions that are neither expired nor closed.
    pub fn live_sessions(&self) -> Vec<i64> {
        let tree = self.inner.tree.lock();
        let mut ids: Vec<i64> = tree
            .sessions
            .iter()
            .filter(|(_, s)| !matches!(s.status, SessionStatus::Expired | SessionStatus::Closed))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of persistent watches a session holds.
    pub fn watch_count(&self, session_id: i64) -> usize {
        self.inner
            .tree
            .lock()
            .sessions
            .get(&session_id)
            .map_or(0, |s| s.watches.len())
    }

    /// Delete empty containers that once had children and TTL nodes whose
    /// time to live has passed without children. Returns the removed paths.
    pub fn reap_expired(&self) -> Vec<String> {
        let (removed, deliveries) = {
            let mut tree = self.inner.tree.lock();
            let now = Utc::now().timestamp_millis();
            let candidates: Vec<String> = tree
                .nodes
                .iter()
                .filter(|(_, node)| node.stat.num_children == 0)
                .filter(|(_, node)| {
                    (node.mode.is_container() && node.had_children)
                        || node.ttl.is_some_and(|ttl| {
                            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
                            node.stat.mtime.saturating_add(ttl_ms) <= now
                        })
                })
                .map(|(path, _)| path.clone())
                .collect();
            let deliveries: Vec<Delivery> = candidates
                .iter()
                .flat_map(|path| tree.remove_node(path))
                .collect();
            (candidates, deliveries)
        };
        deliver(deliveries);
        removed
    }

    fn switch_connection(&self, session_id: i64, from: SessionStatus, to: SessionStatus) -> bool {
        let deliveries = {
            let mut tree = self.inner.tree.lock();
            let Some(session) = tree.sessions.get_mut(&session_id) else {
                return false;
            };
            if session.status != from {
                return false;
            }
            session.status = to;
            let state = if to == SessionStatus::Connected {
                KeeperState::SyncConnected
            } else {
                KeeperState::Disconnected
            };
            let event = WatchedEvent::session(state);
            session
                .all_watchers()
                .into_iter()
                .map(|w| (w, event.clone()))
                .collect::<Vec<_>>()
        };
        deliver(deliveries);
        true
    }
}

impl Connector for InMemoryEnsemble {
    fn connect(
        &self,
        params: &SessionParams,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> ClientResult<Arc<dyn CoordinationClient>> {
        if params.connect_string.trim().is_empty() {
            return Err(ClientError::Io("empty connect string".to_string()));
        }
        let (session_id, deliveries) = {
            let mut tree = self.inner.tree.lock();
            let session_id = tree.next_session_id;
            tree.next_session_id += 1;
            let status = if tree.reachable {
                SessionStatus::Connected
            } else {
                SessionStatus::Pending
            };
            let deliveries: Vec<Delivery> = match (&watcher, status) {
                (Some(w), SessionStatus::Connected) => vec![(
                    Arc::clone(w),
                    WatchedEvent::session(KeeperState::SyncConnected),
                )],
                _ => Vec::new(),
            };
            tree.sessions.insert(
                session_id,
                SessionEntry {
                    status,
                    default_watcher: watcher,
                    watches: Vec::new(),
                },
            );
            (session_id, deliveries)
        };
        tracing::trace!(session_id, connect_string = %params.connect_string, "in-memory session opened");
        deliver(deliveries);
        Ok(Arc::new(MemoryClient {
            ensemble: Arc::clone(&self.inner),
            session_id,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TREE OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════

impl Tree {
    fn next_zxid(&mut self) -> i64 {
        self.zxid += 1;
        self.zxid
    }

    fn check_session(&self, session_id: i64) -> ClientResult<()> {
        match self.sessions.get(&session_id).map(|s| s.status) {
            Some(SessionStatus::Connected) => Ok(()),
            Some(SessionStatus::Expired) => Err(ClientError::Keeper {
                code: ErrorCode::SessionExpired,
                path: None,
            }),
            _ => Err(ClientError::Keeper {
                code: ErrorCode::ConnectionLoss,
                path: None,
            }),
        }
    }

    fn node(&self, path: &str) -> ClientResult<&Node> {
        self.nodes
            .get(path)
            .ok_or_else(|| ClientError::keeper(ErrorCode::NoNode, path))
    }

    fn node_mut(&mut self, path: &str) -> ClientResult<&mut Node> {
        self.nodes
            .get_mut(path)
            .ok_or_else(|| ClientError::keeper(ErrorCode::NoNode, path))
    }

    /// Persistent watches that fire for `event_type` on `path`.
    fn watchers_for(&self, event_type: EventType, path: &str) -> Vec<Delivery> {
        let event = WatchedEvent::node(event_type, path);
        let mut watchers: Vec<Arc<dyn Watcher>> = Vec::new();
        self.sessions
            .values()
            .filter(|s| s.status == SessionStatus::Connected)
            .flat_map(|s| s.watches.iter())
            .filter(|w| watch_fires(w, event_type, path))
            .for_each(|w| push_distinct(&mut watchers, &w.watcher));
        watchers.into_iter().map(|w| (w, event.clone())).collect()
    }

    fn create(
        &mut self,
        session_id: i64,
        path: &str,
        data: &[u8],
        acl: &[Acl],
        mode: CreateMode,
        ttl: Option<Duration>,
    ) -> ClientResult<(String, Stat, Vec<Delivery>)> {
        validate_path(path)?;
        if acl.is_empty() {
            return Err(ClientError::keeper(ErrorCode::InvalidAcl, path));
        }
        match (mode.is_ttl(), ttl) {
            (true, Some(ttl)) if !ttl.is_zero() => {}
            (false, None) => {}
            _ => return Err(ClientError::keeper(ErrorCode::BadArguments, path)),
        }
        if path == "/" {
            return Err(ClientError::keeper(ErrorCode::NodeExists, path));
        }
        let parent_path = parent_of(path);
        let parent = self.node(parent_path)?;
        if parent.stat.ephemeral_owner != 0 {
            return Err(ClientError::keeper(ErrorCode::NoChildrenForEphemerals, path));
        }
        let actual = if mode.is_sequential() {
            format!("{path}{:010}", parent.stat.cversion)
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&actual) {
            return Err(ClientError::keeper(ErrorCode::NodeExists, actual));
        }

        let zxid = self.next_zxid();
        let now = Utc::now().timestamp_millis();
        let stat = Stat {
            czxid: zxid,
            mzxid: zxid,
            ctime: now,
            mtime: now,
            version: 0,
            cversion: 0,
            aversion: 0,
            ephemeral_owner: if mode.is_ephemeral() { session_id } else { 0 },
            data_length: len_i32(data.len()),
            num_children: 0,
            pzxid: zxid,
        };
        let parent = self.node_mut(parent_path)?;
        parent.stat.cversion += 1;
        parent.stat.num_children += 1;
        parent.stat.pzxid = zxid;
        parent.had_children = true;
        self.nodes.insert(
            actual.clone(),
            Node {
                data: data.to_vec(),
                acl: acl.to_vec(),
                stat,
                mode,
                ttl,
                had_children: false,
            },
        );

        let mut deliveries = self.watchers_for(EventType::NodeCreated, &actual);
        deliveries.extend(self.watchers_for(EventType::NodeChildrenChanged, parent_path));
        Ok((actual, stat, deliveries))
    }

    fn delete(&mut self, path: &str, version: Version) -> ClientResult<Vec<Delivery>> {
        validate_path(path)?;
        if path == "/" {
            return Err(ClientError::keeper(ErrorCode::BadArguments, path));
        }
        let node = self.node(path)?;
        if !version.matches(node.stat.version) {
            return Err(ClientError::keeper(ErrorCode::BadVersion, path));
        }
        if node.stat.num_children > 0 {
            return Err(ClientError::keeper(ErrorCode::NotEmpty, path));
        }
        Ok(self.remove_node(path))
    }

    /// Unconditionally remove a childless node and notify watchers.
    fn remove_node(&mut self, path: &str) -> Vec<Delivery> {
        if self.nodes.remove(path).is_none() {
            return Vec::new();
        }
        let zxid = self.next_zxid();
        let parent_path = parent_of(path);
        if let Some(parent) = self.nodes.get_mut(parent_path) {
            parent.stat.cversion += 1;
            parent.stat.num_children -= 1;
            parent.stat.pzxid = zxid;
        }
        let mut deliveries = self.watchers_for(EventType::NodeDeleted, path);
        deliveries.extend(self.watchers_for(EventType::NodeChildrenChanged, parent_path));
        deliveries
    }

    fn remove_ephemerals(&mut self, session_id: i64) -> Vec<Delivery> {
        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.stat.ephemeral_owner == session_id)
            .map(|(p, _)| p.clone())
            .collect();
        owned.iter().flat_map(|p| self.remove_node(p)).collect()
    }

    fn set_data(&mut self, path: &str, data: &[u8], version: Version) -> ClientResult<(Stat, Vec<Delivery>)> {
        validate_path(path)?;
        let zxid = self.zxid + 1;
        let node = self.node_mut(path)?;
        if !version.matches(node.stat.version) {
            return Err(ClientError::keeper(ErrorCode::BadVersion, path));
        }
        node.data = data.to_vec();
        node.stat.version += 1;
        node.stat.mzxid = zxid;
        node.stat.mtime = Utc::now().timestamp_millis();
        node.stat.data_length = len_i32(data.len());
        let stat = node.stat;
        self.zxid = zxid;
        Ok((stat, self.watchers_for(EventType::NodeDataChanged, path)))
    }

    fn set_acl(&mut self, path: &str, acl: &[Acl], version: Version) -> ClientResult<Stat> {
        validate_path(path)?;
        if acl.is_empty() {
            return Err(ClientError::keeper(ErrorCode::InvalidAcl, path));
        }
        let zxid = self.zxid + 1;
        let node = self.node_mut(path)?;
        if !version.matches(node.stat.aversion) {
            return Err(ClientError::keeper(ErrorCode::BadVersion, path));
        }
        node.acl = acl.to_vec();
        node.stat.aversion += 1;
        let stat = node.stat;
        self.zxid = zxid;
        Ok(stat)
    }

    fn children_of(&self, path: &str) -> Vec<String> {
        let prefix = child_prefix(path);
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter(|(p, _)| p.as_str() != path && !p[prefix.len()..].contains('/'))
            .map(|(p, _)| p[prefix.len()..].to_string())
            .collect()
    }

    fn descendant_count(&self, path: &str) -> usize {
        let prefix = child_prefix(path);
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter(|(p, _)| p.as_str() != path)
            .count()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CLIENT
// ═══════════════════════════════════════════════════════════════════════════

/// A session handed out by [`InMemoryEnsemble`].
struct MemoryClient {
    ensemble: Arc<EnsembleInner>,
    session_id: i64,
}

impl MemoryClient {
    /// Run `op` against a connected session, then deliver its notifications.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Tree) -> ClientResult<(T, Vec<Delivery>)>,
    ) -> ClientResult<T> {
        let (value, deliveries) = {
            let mut tree = self.ensemble.tree.lock();
            tree.check_session(self.session_id)?;
            op(&mut tree)?
        };
        deliver(deliveries);
        Ok(value)
    }

    fn read<T>(&self, op: impl FnOnce(&Tree) -> ClientResult<T>) -> ClientResult<T> {
        let tree = self.ensemble.tree.lock();
        tree.check_session(self.session_id)?;
        op(&tree)
    }
}

#[async_trait::async_trait]
impl CoordinationClient for MemoryClient {
    fn session_id(&self) -> i64 {
        let tree = self.ensemble.tree.lock();
        match tree.sessions.get(&self.session_id).map(|s| s.status) {
            Some(SessionStatus::Pending) | None => 0,
            Some(_) => self.session_id,
        }
    }

    fn register(&self, watcher: Option<Arc<dyn Watcher>>) {
        if let Some(session) = self.ensemble.tree.lock().sessions.get_mut(&self.session_id) {
            session.default_watcher = watcher;
        }
    }

    async fn create(
        &self,
        path: &str,
        data: &[u8],
        acl: &[Acl],
        mode: CreateMode,
        ttl: Option<Duration>,
    ) -> ClientResult<(String, Stat)> {
        let session_id = self.session_id;
        self.mutate(|tree| {
            tree.create(session_id, path, data, acl, mode, ttl)
                .map(|(actual, stat, deliveries)| ((actual, stat), deliveries))
        })
    }

    async fn delete(&self, path: &str, version: Version) -> ClientResult<()> {
        self.mutate(|tree| tree.delete(path, version).map(|d| ((), d)))
    }

    async fn exists(&self, path: &str) -> ClientResult<Option<Stat>> {
        self.read(|tree| {
            validate_path(path)?;
            Ok(tree.nodes.get(path).map(|n| n.stat))
        })
    }

    async fn get_acl(&self, path: &str) -> ClientResult<(Vec<Acl>, Stat)> {
        self.read(|tree| {
            validate_path(path)?;
            tree.node(path).map(|n| (n.acl.clone(), n.stat))
        })
    }

    async fn set_acl(&self, path: &str, acl: &[Acl], version: Version) -> ClientResult<Stat> {
        self.mutate(|tree| tree.set_acl(path, acl, version).map(|s| (s, Vec::new())))
    }

    async fn get_data(&self, path: &str) -> ClientResult<(Vec<u8>, Stat)> {
        self.read(|tree| {
            validate_path(path)?;
            tree.node(path).map(|n| (n.data.clone(), n.stat))
        })
    }

    async fn set_data(&self, path: &str, data: &[u8], version: Version) -> ClientResult<Stat> {
        self.mutate(|tree| tree.set_data(path, data, version))
    }

    async fn get_children(&self, path: &str) -> ClientResult<(Vec<String>, Stat)> {
        self.read(|tree| {
            validate_path(path)?;
            let stat = tree.node(path)?.stat;
            Ok((tree.children_of(path), stat))
        })
    }

    async fn get_all_children_number(&self, path: &str) -> ClientResult<i32> {
        self.read(|tree| {
            validate_path(path)?;
            tree.node(path)?;
            Ok(len_i32(tree.descendant_count(path)))
        })
    }

    async fn get_ephemerals(&self, prefix: &str) -> ClientResult<Vec<String>> {
        let session_id = self.session_id;
        self.read(|tree| {
            Ok(tree
                .nodes
                .iter()
                .filter(|(p, n)| n.stat.ephemeral_owner == session_id && p.starts_with(prefix))
                .map(|(p, _)| p.clone())
                .collect())
        })
    }

    async fn add_watch(
        &self,
        path: &str,
        mode: WatchMode,
        watcher: Arc<dyn Watcher>,
    ) -> ClientResult<()> {
        validate_path(path)?;
        let mut tree = self.ensemble.tree.lock();
        tree.check_session(self.session_id)?;
        if let Some(session) = tree.sessions.get_mut(&self.session_id) {
            session.watches.push(PersistentWatch {
                path: path.to_string(),
                mode,
                watcher,
            });
        }
        Ok(())
    }

    async fn remove_all_watches(&self, path: &str) -> ClientResult<()> {
        validate_path(path)?;
        let mut tree = self.ensemble.tree.lock();
        tree.check_session(self.session_id)?;
        let removed = tree.sessions.get_mut(&self.session_id).map_or(0, |session| {
            let before = session.watches.len();
            session.watches.retain(|w| w.path != path);
            before - session.watches.len()
        });
        if removed == 0 {
            return Err(ClientError::keeper(ErrorCode::NoWatcher, path));
        }
        Ok(())
    }

    async fn close(&self) -> ClientResult<()> {
        let deliveries = {
            let mut tree = self.ensemble.tree.lock();
            let Some(session) = tree.sessions.get_mut(&self.session_id) else {
                return Ok(());
            };
            if matches!(session.status, SessionStatus::Closed | SessionStatus::Expired) {
                return Ok(());
            }
            session.status = SessionStatus::Closed;
            session.watches.clear();
            let mut deliveries: Vec<Delivery> = session
                .default_watcher
                .take()
                .map(|w| (w, WatchedEvent::session(KeeperState::Closed)))
                .into_iter()
                .collect();
            deliveries.extend(tree.remove_ephemerals(self.session_id));
            deliveries
        };
        tracing::trace!(session_id = self.session_id, "in-memory session closed");
        deliver(deliveries);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════

fn deliver(deliveries: Vec<Delivery>) {
    deliveries
        .into_iter()
        .for_each(|(watcher, event)| watcher.process(event));
}

fn push_distinct(watchers: &mut Vec<Arc<dyn Watcher>>, watcher: &Arc<dyn Watcher>) {
    if !watchers.iter().any(|w| Arc::ptr_eq(w, watcher)) {
        watchers.push(Arc::clone(watcher));
    }
}

fn watch_fires(watch: &PersistentWatch, event_type: EventType, path: &str) -> bool {
    match watch.mode {
        WatchMode::Persistent => {
            watch.path == path
                && matches!(
                    event_type,
                    EventType::NodeCreated
                        | EventType::NodeDeleted
                        | EventType::NodeDataChanged
                        | EventType::NodeChildrenChanged
                )
        }
        WatchMode::PersistentRecursive => {
            is_within(&watch.path, path)
                && matches!(
                    event_type,
                    EventType::NodeCreated | EventType::NodeDeleted | EventType::NodeDataChanged
                )
        }
    }
}

/// True when `path` equals `root` or lies below it.
fn is_within(root: &str, path: &str) -> bool {
    root == "/" || path == root || path.starts_with(&child_prefix(root))
}

fn child_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{path}/")
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn validate_path(path: &str) -> ClientResult<()> {
    let valid = path.starts_with('/')
        && (path == "/" || !path.ends_with('/'))
        && !path.contains("//")
        && !path.contains('\0')
        && path.split('/').skip(1).all(|seg| seg != "." && seg != "..");
    if valid {
        Ok(())
    } else {
        Err(ClientError::keeper(ErrorCode::BadArguments, path))
    }
}

fn len_i32(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
