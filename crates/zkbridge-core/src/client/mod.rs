//! Boundary to the coordination-service client.
//!
//! The wire protocol lives behind two traits: [`Connector`] opens sessions and
//! [`CoordinationClient`] runs node operations inside one. Everything above
//! this module talks to the service only through them.
//!
//! Implementations must keep persistent watches registered across a transient
//! disconnect within the same session: after a `Disconnected` signal followed
//! by a `SyncConnected` one, watch delivery resumes without re-registration.

// ═══════════════════════════════════════════════════════════════════════════
// MODULE DEFINITIONS
// ═══════════════════════════════════════════════════════════════════════════

pub mod memory;
pub mod types;

// ═══════════════════════════════════════════════════════════════════════════
// RE-EXPORTS
// ═══════════════════════════════════════════════════════════════════════════

use std::{sync::Arc, time::Duration};

pub use memory::InMemoryEnsemble;
pub use types::{
    Acl, CreateMode, ErrorCode, EventType, Id, KeeperState, Perms, Stat, Version, WatchMode,
    WatchedEvent,
};

// ═══════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════

/// Failure reported by the client library itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The service answered with a non-zero status.
    #[error("KeeperErrorCode = {code}{}", path_suffix(.path))]
    Keeper {
        code: ErrorCode,
        path: Option<String>,
    },
    /// The caller was interrupted while waiting for the reply.
    #[error("operation has been interrupted")]
    Interrupted,
    /// Transport-level failure below the protocol.
    #[error("I/O error: {0}")]
    Io(String),
}

impl ClientError {
    pub fn keeper(code: ErrorCode, path: impl Into<String>) -> Self {
        Self::Keeper {
            code,
            path: Some(path.into()),
        }
    }

    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Keeper { code, .. } => Some(*code),
            Self::Interrupted | Self::Io(_) => None,
        }
    }
}

fn path_suffix(path: &Option<String>) -> String {
    path.as_deref()
        .map(|p| format!(" for {p}"))
        .unwrap_or_default()
}

/// Result of a client call.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

// ═══════════════════════════════════════════════════════════════════════════
// WATCHERS
// ═══════════════════════════════════════════════════════════════════════════

/// Receiver of service notifications.
///
/// Called on the client's event thread; implementations must not block.
pub trait Watcher: Send + Sync {
    fn process(&self, event: WatchedEvent);
}

impl<F> Watcher for F
where
    F: Fn(WatchedEvent) + Send + Sync,
{
    fn process(&self, event: WatchedEvent) {
        self(event);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SESSIONS
// ═══════════════════════════════════════════════════════════════════════════

/// Parameters for opening a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionParams {
    /// Comma separated `host:port` list with an optional chroot suffix.
    pub connect_string: String,
    pub session_timeout: Duration,
    /// Allow falling back to a read-only server during a partition.
    pub can_be_read_only: bool,
}

/// Opens sessions against the service.
pub trait Connector: Send + Sync {
    /// Start a new session.
    ///
    /// Returns immediately; `watcher` receives `SyncConnected` once the
    /// session is established, which may be never for an unreachable service.
    fn connect(
        &self,
        params: &SessionParams,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> ClientResult<Arc<dyn CoordinationClient>>;
}

/// One live session with the service.
#[async_trait::async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Service-assigned session id, zero until connected.
    fn session_id(&self) -> i64;

    /// Replace the default watcher; `None` removes it.
    fn register(&self, watcher: Option<Arc<dyn Watcher>>);

    /// Create a node, returning its actual path (sequential nodes get a
    /// suffix) and its metadata.
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        acl: &[Acl],
        mode: CreateMode,
        ttl: Option<Duration>,
    ) -> ClientResult<(String, Stat)>;

    async fn delete(&self, path: &str, version: Version) -> ClientResult<()>;

    /// `None` when the node does not exist.
    async fn exists(&self, path: &str) -> ClientResult<Option<Stat>>;

    async fn get_acl(&self, path: &str) -> ClientResult<(Vec<Acl>, Stat)>;

    async fn set_acl(&self, path: &str, acl: &[Acl], version: Version) -> ClientResult<Stat>;

    async fn get_data(&self, path: &str) -> ClientResult<(Vec<u8>, Stat)>;

    async fn set_data(&self, path: &str, data: &[u8], version: Version) -> ClientResult<Stat>;

    async fn get_children(&self, path: &str) -> ClientResult<(Vec<String>, Stat)>;

    /// Number of descendants of `path`, all levels.
    async fn get_all_children_number(&self, path: &str) -> ClientResult<i32>;

    /// Ephemeral nodes owned by this session whose path starts with `prefix`.
    async fn get_ephemerals(&self, prefix: &str) -> ClientResult<Vec<String>>;

    /// Install a persistent watch rooted at `path`.
    async fn add_watch(
        &self,
        path: &str,
        mode: WatchMode,
        watcher: Arc<dyn Watcher>,
    ) -> ClientResult<()>;

    /// Remove every watch this session holds on `path`.
    async fn remove_all_watches(&self, path: &str) -> ClientResult<()>;

    /// Close the session. Ephemeral nodes it owns are deleted.
    async fn close(&self) -> ClientResult<()>;
}
