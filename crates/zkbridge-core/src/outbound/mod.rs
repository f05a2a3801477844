//! Outbound connections: application handles over pooled sessions.
//!
//! ```text
//! application ─► ConnectionFactory ─► ConnectionManager (pool)
//!                                          │ allocate / match
//!                                          ▼
//!                ConnectionHandle ──bound──► PhysicalSession ─► client
//!                        ▲                        │
//!                        └──── HandleRegistry ────┘
//! ```
//!
//! A handle is bound to at most one session at a time. The pool may move it
//! between sessions, make it inactive, or (with lazy association) bind it
//! again when the application next uses it.

pub mod factory;
pub mod handle;
pub mod pool;
pub mod registry;
pub mod session;

pub use factory::{ConnectionFactory, SessionFactory};
pub use handle::ConnectionHandle;
pub use pool::{ConnectionManager, LazyAssociation, SimplePool};
pub use registry::{CloseOutcome, HandleId, HandleRegistry, HandleState, SessionId};
pub use session::{ConnectionEvent, ConnectionEventListener, PhysicalSession};
