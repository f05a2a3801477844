//! Inbound notifications: persistent watches delivered to consumers.
//!
//! ```text
//! WatchAdapter ─activate─► WatchSessionSupervisor ─► client (persistent watch)
//!                                  │ node event
//!                                  ▼
//!                          NotificationDispatcher ─► DeliveryWork ─► Endpoint
//! ```
//!
//! The supervisor survives session expiry by creating a new session and
//! re-installing the same watch. Transient disconnects are left to the
//! client.

pub mod adapter;
pub mod dispatcher;
pub mod endpoint;
pub mod supervisor;

pub use adapter::WatchAdapter;
pub use dispatcher::{DeliveryWork, NotificationDispatcher};
pub use endpoint::{Endpoint, EndpointFactory};
pub use supervisor::{StateTransition, SubscriptionState, WatchSessionSupervisor};
