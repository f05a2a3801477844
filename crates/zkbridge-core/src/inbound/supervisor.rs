//! Watch subscription supervisor.
//!
//! One [`WatchSessionSupervisor`] owns one long-lived subscription:
//!
//! ```text
//!   Disconnected ──start/expiry──► Connecting ──connected──► Watching
//!        ▲                            │                         │
//!        └────────timeout/failure─────┘◄───────expiry───────────┘
//!
//!   any state ──close──► Closed (terminal)
//! ```
//!
//! Every session gets a generation number. Watchers carry the generation
//! they were installed under, so events from a discarded session are
//! ignored. Expiry is handled off the client's event thread: the watcher
//! submits a reconnect [`Work`] and returns.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::{watch, Notify};

use super::{dispatcher::NotificationDispatcher, endpoint::EndpointFactory};
use crate::{
    client::{Connector, CoordinationClient, KeeperState, WatchedEvent, Watcher},
    config::ActivationSpec,
    outbound::session::translate,
    scheduler::{Work, WorkScheduler},
    Error, Result,
};

// ═══════════════════════════════════════════════════════════════════════════
// STATE TYPES & TRANSITIONS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionState {
    Disconnected,
    Connecting,
    Watching,
    Closed,
}

impl SubscriptionState {
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Watching | Self::Disconnected)
                | (Self::Watching, Self::Disconnected)
                | (
                    Self::Disconnected | Self::Connecting | Self::Watching,
                    Self::Closed
                )
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: SubscriptionState,
    pub to: SubscriptionState,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

impl StateTransition {
    pub fn new(from: SubscriptionState, to: SubscriptionState, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            timestamp: Utc::now(),
            reason: reason.into(),
        }
    }
}

struct Subscription {
    state: SubscriptionState,
    client: Option<Arc<dyn CoordinationClient>>,
    generation: u64,
    history: Vec<StateTransition>,
}

impl Subscription {
    /// The only place the state changes.
    fn transition(&mut self, to: SubscriptionState, reason: &str) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(Error::illegal_state(format!(
                "Invalid subscription transition: {} -> {to}",
                self.state
            )));
        }
        tracing::debug!(from = %self.state, %to, reason, "subscription transition");
        self.history.push(StateTransition::new(self.state, to, reason));
        self.state = to;
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && !self.state.is_terminal()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SUPERVISOR
// ═══════════════════════════════════════════════════════════════════════════

/// Keeps one persistent watch alive across session expiries.
pub struct WatchSessionSupervisor {
    me: Weak<Self>,
    spec: ActivationSpec,
    connector: Arc<dyn Connector>,
    scheduler: Arc<dyn WorkScheduler>,
    dispatcher: NotificationDispatcher,
    subscription: Mutex<Subscription>,
    closed: watch::Sender<bool>,
}

impl WatchSessionSupervisor {
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `spec` fails validation.
    pub fn new(
        spec: ActivationSpec,
        connector: Arc<dyn Connector>,
        scheduler: Arc<dyn WorkScheduler>,
        factory: Arc<dyn EndpointFactory>,
    ) -> Result<Arc<Self>> {
        spec.validate()?;
        let dispatcher = NotificationDispatcher::new(Arc::clone(&scheduler), factory);
        let (closed, _) = watch::channel(false);
        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            spec,
            connector,
            scheduler,
            dispatcher,
            subscription: Mutex::new(Subscription {
                state: SubscriptionState::Disconnected,
                client: None,
                generation: 0,
                history: Vec::new(),
            }),
            closed,
        }))
    }

    pub const fn spec(&self) -> &ActivationSpec {
        &self.spec
    }

    pub const fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn state(&self) -> SubscriptionState {
        self.subscription.lock().state
    }

    pub fn history(&self) -> Vec<StateTransition> {
        self.subscription.lock().history.clone()
    }

    /// Service session id of the current session; `None` while not ready.
    pub fn session_id(&self) -> Option<i64> {
        self.subscription
            .lock()
            .client
            .as_ref()
            .map(|c| c.session_id())
            .filter(|id| *id != 0)
    }

    /// Work item that runs [`start`](Self::start) and logs a failure.
    pub fn start_work(self: &Arc<Self>) -> Arc<dyn Work> {
        Arc::new(ConnectWork {
            supervisor: Arc::clone(self),
            expired: None,
        })
    }

    /// Connect and install the watch. Waits for the connected signal for at
    /// most the configured connect timeout, or forever without one.
    ///
    /// # Errors
    ///
    /// - `ConnectTimeout` if the session did not connect in time
    /// - `Unavailable` if the client could not create a session
    /// - `Service` if the watch could not be installed
    /// - `IllegalState` if the subscription is closed or already active
    /// - `Interrupted` if the subscription was closed while connecting
    pub async fn start(&self) -> Result<()> {
        self.connect_and_watch("start").await
    }

    async fn connect_and_watch(&self, reason: &str) -> Result<()> {
        let generation = {
            let mut sub = self.subscription.lock();
            if sub.state != SubscriptionState::Disconnected {
                return Err(Error::illegal_state(format!(
                    "cannot connect a subscription in state {}",
                    sub.state
                )));
            }
            sub.transition(SubscriptionState::Connecting, reason)?;
            sub.generation += 1;
            sub.generation
        };

        let connected = Arc::new(Notify::new());
        let signal = Arc::clone(&connected);
        let bootstrap: Arc<dyn Watcher> = Arc::new(move |event: WatchedEvent| {
            if event.state == KeeperState::SyncConnected {
                signal.notify_one();
            }
        });

        let client = match self.connector.connect(&self.spec.session_params(), Some(bootstrap)) {
            Ok(client) => client,
            Err(e) => {
                self.fall_back(generation, "session creation failed");
                return Err(Error::Unavailable(format!(
                    "Unable to create the coordination client connection: {e}"
                )));
            }
        };
        let stored = {
            let mut sub = self.subscription.lock();
            let current = sub.is_current(generation);
            if current {
                sub.client = Some(Arc::clone(&client));
            }
            current
        };
        if !stored {
            close_quietly(&client).await;
            return Err(Error::Interrupted(
                "subscription closed while connecting".to_string(),
            ));
        }

        let timeout = self.spec.connect_timeout();
        let mut closed = self.closed.subscribe();
        let outcome = tokio::select! {
            ready = wait_connected(&connected, timeout) => ready,
            _ = closed.wait_for(|closed| *closed) => {
                return Err(Error::Interrupted(
                    "subscription closed while connecting".to_string(),
                ));
            }
        };
        if !outcome {
            self.fall_back(generation, "connect timeout");
            close_quietly(&client).await;
            let timeout = timeout.unwrap_or_default();
            tracing::error!(
                activation = %self.spec.name,
                connect_string = %self.spec.connect_string,
                ?timeout,
                "timed out waiting for the coordination service"
            );
            return Err(Error::ConnectTimeout {
                connect_string: self.spec.connect_string.clone(),
                timeout,
            });
        }

        client.register(None);
        let watcher: Arc<dyn Watcher> = Arc::new(SubscriptionWatcher {
            supervisor: self.me.clone(),
            generation,
        });
        let base_path = &self.spec.base_path;
        if let Err(e) = client
            .add_watch(base_path, self.spec.watch_mode(), watcher)
            .await
        {
            let current = self.subscription.lock().is_current(generation);
            if !current {
                return Err(Error::Interrupted(
                    "subscription closed while installing the watch".to_string(),
                ));
            }
            self.fall_back(generation, "watch installation failed");
            close_quietly(&client).await;
            return Err(translate(&format!("Cannot add watch on {base_path}"), e));
        }

        let mut sub = self.subscription.lock();
        if !sub.is_current(generation) {
            return Err(Error::Interrupted(
                "subscription closed while installing the watch".to_string(),
            ));
        }
        sub.transition(SubscriptionState::Watching, "watch installed")?;
        tracing::info!(
            activation = %self.spec.name,
            base_path = %base_path,
            recursive = self.spec.recursive,
            session_id = client.session_id(),
            "watching"
        );
        Ok(())
    }

    /// Return to `Disconnected` after a failed connect of `generation`.
    fn fall_back(&self, generation: u64, reason: &str) {
        let mut sub = self.subscription.lock();
        if sub.is_current(generation) && sub.state == SubscriptionState::Connecting {
            sub.client = None;
            if let Err(e) = sub.transition(SubscriptionState::Disconnected, reason) {
                tracing::error!(error = %e, "subscription state corrupted");
            }
        }
    }

    /// Entry point for events from the watch installed under `generation`.
    fn on_event(&self, generation: u64, event: WatchedEvent) {
        match event.state {
            KeeperState::SyncConnected if event.is_node_event() => {
                let watching = {
                    let sub = self.subscription.lock();
                    sub.is_current(generation) && sub.state == SubscriptionState::Watching
                };
                if !watching {
                    tracing::trace!(%event, "event from a stale session ignored");
                    return;
                }
                if let Err(e) = self.dispatcher.dispatch(event) {
                    tracing::error!(activation = %self.spec.name, error = %e, "cannot dispatch notification");
                }
            }
            KeeperState::SyncConnected => {
                tracing::debug!(activation = %self.spec.name, "connection re-established within the session");
            }
            KeeperState::Disconnected => {
                tracing::warn!(activation = %self.spec.name, "connection lost, waiting for the client to reconnect");
            }
            KeeperState::Expired => self.on_expired(generation),
            _ => tracing::trace!(%event, "lifecycle event ignored"),
        }
    }

    fn on_expired(&self, generation: u64) {
        let expired = {
            let mut sub = self.subscription.lock();
            if !sub.is_current(generation) || sub.state != SubscriptionState::Watching {
                return;
            }
            if let Err(e) = sub.transition(SubscriptionState::Disconnected, "session expired") {
                tracing::error!(error = %e, "subscription state corrupted");
                return;
            }
            sub.client.take()
        };
        tracing::warn!(activation = %self.spec.name, "session expired, creating a new session");
        let Some(supervisor) = self.me.upgrade() else {
            return;
        };
        let work = Arc::new(ConnectWork {
            supervisor,
            expired,
        });
        if let Err(e) = self.scheduler.submit(work) {
            tracing::error!(activation = %self.spec.name, error = %e, "cannot schedule reconnect");
        }
    }

    /// Remove the watch (best effort) and close the session. Terminal and
    /// idempotent.
    ///
    /// # Errors
    ///
    /// Returns `Communication` if the client fails to close.
    pub async fn close(&self) -> Result<()> {
        let client = {
            let mut sub = self.subscription.lock();
            if sub.state.is_terminal() {
                return Ok(());
            }
            sub.transition(SubscriptionState::Closed, "closed")?;
            sub.generation += 1;
            sub.client.take()
        };
        self.closed.send_replace(true);
        self.dispatcher.cancel_pending().await;

        let Some(client) = client else {
            return Ok(());
        };
        if let Err(e) = client.remove_all_watches(&self.spec.base_path).await {
            tracing::debug!(error = %e, "watch removal failed");
        }
        client.close().await.map_err(|e| {
            Error::Communication(format!(
                "Unable to close the coordination client connection: {e}"
            ))
        })?;
        tracing::info!(activation = %self.spec.name, "subscription closed");
        Ok(())
    }
}

async fn wait_connected(connected: &Notify, timeout: Option<Duration>) -> bool {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, connected.notified())
            .await
            .is_ok(),
        None => {
            connected.notified().await;
            true
        }
    }
}

async fn close_quietly(client: &Arc<dyn CoordinationClient>) {
    if let Err(e) = client.close().await {
        tracing::debug!(error = %e, "closing discarded session failed");
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// WATCHER & WORK
// ═══════════════════════════════════════════════════════════════════════════

struct SubscriptionWatcher {
    supervisor: Weak<WatchSessionSupervisor>,
    generation: u64,
}

impl Watcher for SubscriptionWatcher {
    fn process(&self, event: WatchedEvent) {
        if let Some(supervisor) = self.supervisor.upgrade() {
            supervisor.on_event(self.generation, event);
        }
    }
}

/// Start or post-expiry reconnect, run on the scheduler.
struct ConnectWork {
    supervisor: Arc<WatchSessionSupervisor>,
    /// Session discarded by the expiry, closed before reconnecting.
    expired: Option<Arc<dyn CoordinationClient>>,
}

#[async_trait::async_trait]
impl Work for ConnectWork {
    async fn run(&self) {
        let reason = if let Some(dead) = &self.expired {
            close_quietly(dead).await;
            "session expired"
        } else {
            "start"
        };
        match self.supervisor.connect_and_watch(reason).await {
            Ok(()) => {}
            Err(e) if self.supervisor.state().is_terminal() => {
                tracing::debug!(
                    activation = %self.supervisor.spec.name,
                    error = %e,
                    "subscription closed, reconnect abandoned"
                );
            }
            Err(e) => {
                tracing::error!(
                    activation = %self.supervisor.spec.name,
                    error = %e,
                    "cannot establish watch subscription"
                );
            }
        }
    }
}
