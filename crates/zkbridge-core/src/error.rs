//! Error taxonomy for the bridge.
//!
//! Every failure surfaced to an application or to an adapter owner is one of
//! the [`Error`] variants below:
//!
//! - **IllegalState**: closed or unbound handle, destroyed session. Never retried.
//! - **Interrupted / Communication**: the wait or the transport failed.
//! - **Service**: the coordination service answered with a non-zero status.
//! - **ConnectTimeout**: the connect wait of a watch subscription ran out.
//! - **Unsupported**: transactional operations and non-managed factories.

use std::time::Duration;

use strum::{Display, EnumIter};

use crate::client::{ClientError, ErrorCode};

/// Top-level error type of the crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Operation on a closed handle, an unbound handle without lazy
    /// association, or a destroyed session.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A wait was interrupted before the service replied.
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Transport failure below the service protocol.
    #[error("Communication failure: {0}")]
    Communication(String),

    /// Non-zero service status, with the original code preserved.
    #[error("{message}")]
    Service { code: ErrorCode, message: String },

    /// The session did not reach the connected state in time.
    #[error("Timed out after {timeout:?} connecting to {connect_string}")]
    ConnectTimeout {
        connect_string: String,
        timeout: Duration,
    },

    #[error("Not supported: {0}")]
    Unsupported(String),

    /// A session could not be created at all.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A consumer failed while handling a notification.
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Coarse category of an [`Error`], for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    IllegalState,
    Interrupted,
    Communication,
    Service,
    ConnectTimeout,
    Unsupported,
    Unavailable,
    InvalidConfig,
    Delivery,
}

impl Error {
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    pub fn service(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Service {
            code,
            message: message.into(),
        }
    }

    /// Category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::IllegalState(_) => ErrorKind::IllegalState,
            Self::Interrupted(_) => ErrorKind::Interrupted,
            Self::Communication(_) => ErrorKind::Communication,
            Self::Service { .. } => ErrorKind::Service,
            Self::ConnectTimeout { .. } => ErrorKind::ConnectTimeout,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Delivery(_) => ErrorKind::Delivery,
        }
    }

    /// Service status code, for [`Error::Service`] only.
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Service { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True when retrying the same call can never succeed.
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::IllegalState | ErrorKind::Unsupported | ErrorKind::InvalidConfig
        )
    }
}

/// Generic conversion; operations that know their context use
/// `session::translate` for a descriptive message instead.
impl From<ClientError> for Error {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Keeper { code, .. } => Self::service(code, err.to_string()),
            ClientError::Interrupted => Self::Interrupted(err.to_string()),
            ClientError::Io(msg) => Self::Communication(msg),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_config(format!("Failed to parse config: {err}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Communication(err.to_string())
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;
