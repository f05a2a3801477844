//! # zkbridge core
//!
//! Bridge between application components and a hierarchical coordination
//! service (ZooKeeper-style znodes, sessions and watches).
//!
//! - [`outbound`]: pooled, shareable connection handles for node operations
//! - [`inbound`]: persistent watches delivered to consumer endpoints, kept
//!   alive across session expiry
//! - [`client`]: the coordination client boundary and an in-memory ensemble
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only
//!
//! ## Error Handling
//!
//! All fallible operations return `Result<T, Error>`. Service failures keep
//! their [`client::ErrorCode`] so callers can branch on it.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod client;
pub mod config;
mod error;
pub mod inbound;
pub mod logging;
pub mod outbound;
pub mod scheduler;

pub use config::{ActivationSpec, BridgeConfig, OutboundConfig};
pub use error::{Error, ErrorKind, Result};
pub use inbound::{Endpoint, EndpointFactory, WatchAdapter};
pub use outbound::{ConnectionFactory, ConnectionHandle, SessionFactory, SimplePool};
pub use scheduler::{TokioScheduler, Work, WorkHandle, WorkScheduler};
