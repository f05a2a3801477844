//! Bridge configuration
//!
//! Loaded in layers:
//! 1. Built-in defaults
//! 2. A TOML file
//! 3. Environment variables: `ZKBRIDGE_*` (outbound settings only)
//! 4. Validation
//!
//! ```toml
//! [outbound]
//! connect_string = "zk1:2181,zk2:2181/app"
//! session_timeout_ms = 6000
//!
//! [[inbound]]
//! name = "orders"
//! base_path = "/orders"
//! recursive = true
//! connect_timeout_ms = 5000
//! ```

use std::{collections::HashSet, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    client::{SessionParams, WatchMode},
    Error, Result,
};

pub const DEFAULT_CONNECT_STRING: &str = "localhost:2181";

/// Twice the service's default tick time of 3000 ms.
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 6000;

// ═══════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// Full configuration: one outbound factory and any number of watch
/// activations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    pub outbound: OutboundConfig,
    pub inbound: Vec<ActivationSpec>,
}

/// Settings of an outbound connection factory.
///
/// Two sessions are interchangeable exactly when their configs compare
/// equal; the pool matches on this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct OutboundConfig {
    /// Comma separated `host:port` pairs with an optional chroot suffix.
    pub connect_string: String,
    pub session_timeout_ms: u64,
    pub can_be_read_only: bool,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            connect_string: DEFAULT_CONNECT_STRING.to_string(),
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            can_be_read_only: false,
        }
    }
}

impl OutboundConfig {
    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            connect_string: self.connect_string.clone(),
            session_timeout: Duration::from_millis(self.session_timeout_ms),
            can_be_read_only: self.can_be_read_only,
        }
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty connect string or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        validate_connection("outbound", &self.connect_string, self.session_timeout_ms)
    }
}

/// One watch subscription: which subtree to observe and how to connect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivationSpec {
    /// Unique name of the activation within an adapter.
    pub name: String,
    #[serde(default = "default_connect_string")]
    pub connect_string: String,
    /// Bound on each connect wait; absent means wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default)]
    pub can_be_read_only: bool,
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Watch the whole subtree instead of the base node alone.
    #[serde(default)]
    pub recursive: bool,
}

impl ActivationSpec {
    /// Defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connect_string: default_connect_string(),
            connect_timeout_ms: None,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            can_be_read_only: false,
            base_path: default_base_path(),
            recursive: false,
        }
    }

    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    #[must_use]
    pub const fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub const fn with_session_timeout_ms(mut self, ms: u64) -> Self {
        self.session_timeout_ms = ms;
        self
    }

    pub const fn watch_mode(&self) -> WatchMode {
        WatchMode::from_recursive(self.recursive)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            connect_string: self.connect_string.clone(),
            session_timeout: Duration::from_millis(self.session_timeout_ms),
            can_be_read_only: self.can_be_read_only,
        }
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` when any field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_config("activation name cannot be empty"));
        }
        let scope = format!("activation '{}'", self.name);
        validate_connection(&scope, &self.connect_string, self.session_timeout_ms)?;
        if self.connect_timeout_ms == Some(0) {
            return Err(Error::invalid_config(format!(
                "{scope}: connect_timeout_ms must be greater than zero when set"
            )));
        }
        if !self.base_path.starts_with('/') {
            return Err(Error::invalid_config(format!(
                "{scope}: base_path must start with '/', got '{}'",
                self.base_path
            )));
        }
        Ok(())
    }
}

fn default_connect_string() -> String {
    DEFAULT_CONNECT_STRING.to_string()
}

const fn default_session_timeout_ms() -> u64 {
    DEFAULT_SESSION_TIMEOUT_MS
}

fn default_base_path() -> String {
    "/".to_string()
}

fn validate_connection(scope: &str, connect_string: &str, session_timeout_ms: u64) -> Result<()> {
    if connect_string.trim().is_empty() {
        return Err(Error::invalid_config(format!(
            "{scope}: connect_string cannot be empty"
        )));
    }
    if session_timeout_ms == 0 {
        return Err(Error::invalid_config(format!(
            "{scope}: session_timeout_ms must be greater than zero"
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// LOADING
// ═══════════════════════════════════════════════════════════════════════════

impl BridgeConfig {
    /// Load from a TOML file, apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is malformed TOML, an
    /// environment override does not parse, or validation fails.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Err(Error::invalid_config(format!(
                "Config path is a directory, not a file: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?.apply_env_vars()?;
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            activations = config.inbound.len(),
            "loaded bridge configuration"
        );
        Ok(config)
    }

    /// Parse TOML without overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on malformed TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::from)
    }

    /// Apply `ZKBRIDGE_*` overrides to the outbound settings.
    ///
    /// # Errors
    ///
    /// Returns error if an environment variable value is invalid.
    pub fn apply_env_vars(mut self) -> Result<Self> {
        if let Ok(value) = std::env::var("ZKBRIDGE_CONNECT_STRING") {
            if value.trim().is_empty() {
                return Err(Error::invalid_config(
                    "ZKBRIDGE_CONNECT_STRING cannot be empty - unset the variable or provide host:port pairs",
                ));
            }
            self.outbound.connect_string = value;
        }

        if let Ok(value) = std::env::var("ZKBRIDGE_SESSION_TIMEOUT_MS") {
            self.outbound.session_timeout_ms = value.parse().map_err(|e| {
                Error::invalid_config(format!("Invalid ZKBRIDGE_SESSION_TIMEOUT_MS value: {e}"))
            })?;
        }

        if let Ok(value) = std::env::var("ZKBRIDGE_CAN_BE_READ_ONLY") {
            self.outbound.can_be_read_only = value.parse().map_err(|e| {
                Error::invalid_config(format!("Invalid ZKBRIDGE_CAN_BE_READ_ONLY value: {e}"))
            })?;
        }

        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` for the first offending setting.
    pub fn validate(&self) -> Result<()> {
        self.outbound.validate()?;
        let mut seen = HashSet::new();
        self.inbound.iter().try_for_each(|spec| {
            spec.validate()?;
            if seen.insert(spec.name.as_str()) {
                Ok(())
            } else {
                Err(Error::invalid_config(format!(
                    "duplicate activation name '{}'",
                    spec.name
                )))
            }
        })
    }
}
