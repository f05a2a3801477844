//! Consumer boundary for watch notifications.

use crate::{client::WatchedEvent, Result};

/// One consumer instance, used for exactly one delivery.
///
/// The dispatcher calls `before_delivery`, `on_event` and `after_delivery`
/// in that order, then `release`. A failing step skips the remaining hooks
/// but never the release.
#[async_trait::async_trait]
pub trait Endpoint: Send {
    async fn before_delivery(&mut self) -> Result<()> {
        Ok(())
    }

    /// The designated handler.
    async fn on_event(&mut self, event: &WatchedEvent) -> Result<()>;

    async fn after_delivery(&mut self) -> Result<()> {
        Ok(())
    }

    /// Return the instance to its owner. Runs exactly once per instance.
    fn release(self: Box<Self>) {}
}

/// Produces consumer instances for one activation.
pub trait EndpointFactory: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Returns an error if no instance can be provided right now.
    fn create_endpoint(&self) -> Result<Box<dyn Endpoint>>;
}
