//! Notification fan-out.
//!
//! Each notification becomes one [`DeliveryWork`] on the scheduler. The work
//! leases a consumer instance from the endpoint factory, runs the delivery
//! hooks and gives the instance back. The lease lives under a per-delivery
//! lock shared with [`Work::release`], so a cancel racing the delivery
//! releases the instance exactly once and never while it is still in use.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use super::endpoint::{Endpoint, EndpointFactory};
use crate::{
    client::WatchedEvent,
    scheduler::{Work, WorkHandle, WorkScheduler},
    Error, Result,
};

// ═══════════════════════════════════════════════════════════════════════════
// DELIVERY WORK
// ═══════════════════════════════════════════════════════════════════════════

enum Slot {
    /// Not started; an instance may still be leased.
    Idle,
    Active(Box<dyn Endpoint>),
    /// Released or never to be leased.
    Released,
}

/// Holds the leased instance; dropping it releases the instance on every
/// exit path, including abort of the surrounding task.
struct Lease<'a> {
    slot: MutexGuard<'a, Slot>,
}

impl Lease<'_> {
    fn endpoint(&mut self) -> Option<&mut Box<dyn Endpoint>> {
        match &mut *self.slot {
            Slot::Active(endpoint) => Some(endpoint),
            Slot::Idle | Slot::Released => None,
        }
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        release_slot(&mut self.slot);
    }
}

fn release_slot(slot: &mut Slot) {
    if let Slot::Active(endpoint) = std::mem::replace(slot, Slot::Released) {
        endpoint.release();
    }
}

/// One notification for one consumer.
pub struct DeliveryWork {
    event: WatchedEvent,
    factory: Arc<dyn EndpointFactory>,
    slot: AsyncMutex<Slot>,
}

impl DeliveryWork {
    pub fn new(event: WatchedEvent, factory: Arc<dyn EndpointFactory>) -> Self {
        Self {
            event,
            factory,
            slot: AsyncMutex::new(Slot::Idle),
        }
    }

    pub const fn event(&self) -> &WatchedEvent {
        &self.event
    }

    async fn deliver(&self, lease: &mut Lease<'_>) -> Result<()> {
        let Some(endpoint) = lease.endpoint() else {
            return Ok(());
        };
        endpoint.before_delivery().await?;
        endpoint.on_event(&self.event).await?;
        endpoint.after_delivery().await
    }
}

#[async_trait::async_trait]
impl Work for DeliveryWork {
    async fn run(&self) {
        let mut slot = self.slot.lock().await;
        if !matches!(*slot, Slot::Idle) {
            tracing::trace!(consumer = self.factory.name(), "delivery released before start");
            return;
        }
        match self.factory.create_endpoint() {
            Ok(endpoint) => *slot = Slot::Active(endpoint),
            Err(e) => {
                *slot = Slot::Released;
                tracing::error!(consumer = self.factory.name(), error = %e, "cannot create consumer instance");
                return;
            }
        }
        let mut lease = Lease { slot };
        if let Err(e) = self.deliver(&mut lease).await {
            let e = Error::delivery(format!("{}: {e}", self.event));
            tracing::error!(consumer = self.factory.name(), error = %e, "consumer failed");
        }
    }

    async fn release(&self) {
        release_slot(&mut *self.slot.lock().await);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DISPATCHER
// ═══════════════════════════════════════════════════════════════════════════

/// Submits one [`DeliveryWork`] per notification.
pub struct NotificationDispatcher {
    scheduler: Arc<dyn WorkScheduler>,
    factory: Arc<dyn EndpointFactory>,
    pending: Mutex<Vec<WorkHandle>>,
    dispatched: AtomicU64,
}

impl NotificationDispatcher {
    pub fn new(scheduler: Arc<dyn WorkScheduler>, factory: Arc<dyn EndpointFactory>) -> Self {
        Self {
            scheduler,
            factory,
            pending: Mutex::new(Vec::new()),
            dispatched: AtomicU64::new(0),
        }
    }

    pub fn factory(&self) -> &Arc<dyn EndpointFactory> {
        &self.factory
    }

    /// Schedule delivery of `event`. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns the scheduler's error when it refuses the work.
    pub fn dispatch(&self, event: WatchedEvent) -> Result<WorkHandle> {
        let work = Arc::new(DeliveryWork::new(event, Arc::clone(&self.factory)));
        let handle = self.scheduler.submit(work)?;
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle.clone());
        Ok(handle)
    }

    /// Notifications handed to the scheduler so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Cancel every delivery that has not finished.
    pub async fn cancel_pending(&self) -> usize {
        let pending: Vec<WorkHandle> = std::mem::take(&mut *self.pending.lock());
        let mut cancelled = 0;
        for handle in pending.iter().filter(|h| !h.is_finished()) {
            handle.cancel().await;
            cancelled += 1;
        }
        if cancelled > 0 {
            tracing::debug!(consumer = self.factory.name(), cancelled, "pending deliveries cancelled");
        }
        cancelled
    }
}
