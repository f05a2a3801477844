//! Vocabulary shared with the coordination service: node metadata, ACLs,
//! create modes, watch events and the service's stable error codes.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

// ═══════════════════════════════════════════════════════════════════════════
// NODE METADATA
// ═══════════════════════════════════════════════════════════════════════════

/// Metadata the service keeps for every node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stat {
    /// Transaction id that created the node.
    pub czxid: i64,
    /// Transaction id that last modified the node's data.
    pub mzxid: i64,
    /// Creation time in milliseconds since the epoch.
    pub ctime: i64,
    /// Last modification time in milliseconds since the epoch.
    pub mtime: i64,
    /// Number of changes to the node's data.
    pub version: i32,
    /// Number of changes to the node's children.
    pub cversion: i32,
    /// Number of changes to the node's ACL.
    pub aversion: i32,
    /// Session id of the owner if the node is ephemeral, zero otherwise.
    pub ephemeral_owner: i64,
    /// Length of the node's data.
    pub data_length: i32,
    /// Number of direct children.
    pub num_children: i32,
    /// Transaction id that last modified the node's children.
    pub pzxid: i64,
}

/// Expected version for conditional writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    /// Match any version (the service's `-1`).
    #[default]
    Any,
    /// Match exactly this version.
    Exact(i32),
}

impl Version {
    /// Check a node's current version against this expectation.
    pub const fn matches(self, actual: i32) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == actual,
        }
    }

    /// Wire representation, `-1` for any version.
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::Any => -1,
            Self::Exact(v) => v,
        }
    }
}

impl From<i32> for Version {
    fn from(raw: i32) -> Self {
        if raw == -1 {
            Self::Any
        } else {
            Self::Exact(raw)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ACCESS CONTROL
// ═══════════════════════════════════════════════════════════════════════════

/// Permission bits of an ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Perms(u32);

impl Perms {
    pub const READ: Self = Self(1);
    pub const WRITE: Self = Self(1 << 1);
    pub const CREATE: Self = Self(1 << 2);
    pub const DELETE: Self = Self(1 << 3);
    pub const ADMIN: Self = Self(1 << 4);
    pub const ALL: Self = Self(0b1_1111);

    /// Raw permission mask.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from a raw mask, dropping unknown bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// True when every bit of `other` is granted.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two permission sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Authentication identity an ACL entry applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id {
    pub scheme: String,
    pub id: String,
}

impl Id {
    pub fn new(scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            id: id.into(),
        }
    }

    /// The `world:anyone` identity.
    pub fn anyone() -> Self {
        Self::new("world", "anyone")
    }
}

/// One ACL entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acl {
    pub perms: Perms,
    pub id: Id,
}

impl Acl {
    pub const fn new(perms: Perms, id: Id) -> Self {
        Self { perms, id }
    }

    /// Completely open ACL: everyone may do anything.
    pub fn open_unsafe() -> Vec<Self> {
        vec![Self::new(Perms::ALL, Id::anyone())]
    }

    /// Everyone may read, nobody may write.
    pub fn read_unsafe() -> Vec<Self> {
        vec![Self::new(Perms::READ, Id::anyone())]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CREATE MODES
// ═══════════════════════════════════════════════════════════════════════════

/// How a node is created.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    Persistent,
    PersistentSequential,
    Ephemeral,
    EphemeralSequential,
    Container,
    PersistentWithTtl,
    PersistentSequentialWithTtl,
}

impl CreateMode {
    pub const fn is_ephemeral(self) -> bool {
        matches!(self, Self::Ephemeral | Self::EphemeralSequential)
    }

    pub const fn is_sequential(self) -> bool {
        matches!(
            self,
            Self::PersistentSequential
                | Self::EphemeralSequential
                | Self::PersistentSequentialWithTtl
        )
    }

    pub const fn is_container(self) -> bool {
        matches!(self, Self::Container)
    }

    pub const fn is_ttl(self) -> bool {
        matches!(
            self,
            Self::PersistentWithTtl | Self::PersistentSequentialWithTtl
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// WATCH EVENTS
// ═══════════════════════════════════════════════════════════════════════════

/// What happened to a watched node. `None` marks a pure session-state signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum EventType {
    None,
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
    DataWatchRemoved,
    ChildWatchRemoved,
    PersistentWatchRemoved,
}

/// Session state carried by every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum KeeperState {
    Disconnected,
    SyncConnected,
    AuthFailed,
    ConnectedReadOnly,
    SaslAuthenticated,
    Expired,
    Closed,
}

/// A notification delivered by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchedEvent {
    pub event_type: EventType,
    pub state: KeeperState,
    pub path: Option<String>,
}

impl WatchedEvent {
    /// A change event on `path` within a connected session.
    pub fn node(event_type: EventType, path: impl Into<String>) -> Self {
        Self {
            event_type,
            state: KeeperState::SyncConnected,
            path: Some(path.into()),
        }
    }

    /// A pure session-state signal.
    pub const fn session(state: KeeperState) -> Self {
        Self {
            event_type: EventType::None,
            state,
            path: None,
        }
    }

    /// True for events that describe a node change rather than the session.
    pub fn is_node_event(&self) -> bool {
        self.event_type != EventType::None
    }
}

impl fmt::Display for WatchedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WatchedEvent state:{} type:{} path:{}",
            self.state,
            self.event_type,
            self.path.as_deref().unwrap_or("null")
        )
    }
}

/// Persistent watch flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum WatchMode {
    /// Fires for data and children changes of the path itself.
    Persistent,
    /// Fires for creation, deletion and data changes of the path and every
    /// descendant.
    PersistentRecursive,
}

impl WatchMode {
    pub const fn from_recursive(recursive: bool) -> Self {
        if recursive {
            Self::PersistentRecursive
        } else {
            Self::Persistent
        }
    }

    pub const fn is_recursive(self) -> bool {
        matches!(self, Self::PersistentRecursive)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════

/// Stable status codes returned by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
pub enum ErrorCode {
    SystemError,
    RuntimeInconsistency,
    DataInconsistency,
    ConnectionLoss,
    MarshallingError,
    Unimplemented,
    OperationTimeout,
    BadArguments,
    NewConfigNoQuorum,
    ReconfigInProgress,
    UnknownSession,
    ApiError,
    NoNode,
    NoAuth,
    BadVersion,
    NoChildrenForEphemerals,
    NodeExists,
    NotEmpty,
    SessionExpired,
    InvalidCallback,
    InvalidAcl,
    AuthFailed,
    SessionMoved,
    NotReadOnly,
    EphemeralOnLocalSession,
    NoWatcher,
    RequestTimeout,
    ReconfigDisabled,
    SessionClosedRequireSaslAuth,
    QuotaExceeded,
    Throttled,
}

impl ErrorCode {
    /// Numeric code as sent on the wire.
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::SystemError => -1,
            Self::RuntimeInconsistency => -2,
            Self::DataInconsistency => -3,
            Self::ConnectionLoss => -4,
            Self::MarshallingError => -5,
            Self::Unimplemented => -6,
            Self::OperationTimeout => -7,
            Self::BadArguments => -8,
            Self::NewConfigNoQuorum => -13,
            Self::ReconfigInProgress => -14,
            Self::UnknownSession => -12,
            Self::ApiError => -100,
            Self::NoNode => -101,
            Self::NoAuth => -102,
            Self::BadVersion => -103,
            Self::NoChildrenForEphemerals => -108,
            Self::NodeExists => -110,
            Self::NotEmpty => -111,
            Self::SessionExpired => -112,
            Self::InvalidCallback => -113,
            Self::InvalidAcl => -114,
            Self::AuthFailed => -115,
            Self::SessionMoved => -118,
            Self::NotReadOnly => -119,
            Self::EphemeralOnLocalSession => -120,
            Self::NoWatcher => -121,
            Self::RequestTimeout => -122,
            Self::ReconfigDisabled => -123,
            Self::SessionClosedRequireSaslAuth => -124,
            Self::QuotaExceeded => -125,
            Self::Throttled => -127,
        }
    }

    /// Look up a code by its wire value.
    pub fn from_i32(raw: i32) -> Option<Self> {
        use strum::IntoEnumIterator;
        Self::iter().find(|code| code.as_i32() == raw)
    }

    /// Short human description used in service error messages.
    pub const fn description(self) -> &'static str {
        match self {
            Self::SystemError => "system error",
            Self::RuntimeInconsistency => "runtime inconsistency",
            Self::DataInconsistency => "data inconsistency",
            Self::ConnectionLoss => "connection loss",
            Self::MarshallingError => "marshalling error",
            Self::Unimplemented => "unimplemented",
            Self::OperationTimeout => "operation timeout",
            Self::BadArguments => "bad arguments",
            Self::NewConfigNoQuorum => "new config has no quorum",
            Self::ReconfigInProgress => "reconfig in progress",
            Self::UnknownSession => "unknown session",
            Self::ApiError => "API error",
            Self::NoNode => "no node",
            Self::NoAuth => "not authenticated",
            Self::BadVersion => "bad version",
            Self::NoChildrenForEphemerals => "no children for ephemerals",
            Self::NodeExists => "node exists",
            Self::NotEmpty => "directory not empty",
            Self::SessionExpired => "session expired",
            Self::InvalidCallback => "invalid callback",
            Self::InvalidAcl => "invalid ACL",
            Self::AuthFailed => "authentication failed",
            Self::SessionMoved => "session moved",
            Self::NotReadOnly => "not a read-only call",
            Self::EphemeralOnLocalSession => "ephemeral node on local session",
            Self::NoWatcher => "no watcher",
            Self::RequestTimeout => "request timeout",
            Self::ReconfigDisabled => "reconfig disabled",
            Self::SessionClosedRequireSaslAuth => "session closed, SASL auth required",
            Self::QuotaExceeded => "quota exceeded",
            Self::Throttled => "throttled",
        }
    }
}
