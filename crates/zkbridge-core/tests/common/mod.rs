//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use zkbridge_core::{client::WatchedEvent, Endpoint, EndpointFactory, Result};

/// Counts every hook call and keeps the delivered events.
#[derive(Default)]
pub struct Recorder {
    pub created: AtomicUsize,
    pub before: AtomicUsize,
    pub handled: AtomicUsize,
    pub after: AtomicUsize,
    pub released: AtomicUsize,
    pub events: Mutex<Vec<WatchedEvent>>,
}

impl Recorder {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.path.clone())
            .collect()
    }
}

struct RecordingEndpoint(Arc<Recorder>);

#[async_trait::async_trait]
impl Endpoint for RecordingEndpoint {
    async fn before_delivery(&mut self) -> Result<()> {
        self.0.before.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_event(&mut self, event: &WatchedEvent) -> Result<()> {
        self.0.handled.fetch_add(1, Ordering::SeqCst);
        self.0.events.lock().push(event.clone());
        Ok(())
    }

    async fn after_delivery(&mut self) -> Result<()> {
        self.0.after.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(self: Box<Self>) {
        self.0.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct RecordingFactory(pub Arc<Recorder>);

impl EndpointFactory for RecordingFactory {
    fn name(&self) -> &str {
        "recorder"
    }

    fn create_endpoint(&self) -> Result<Box<dyn Endpoint>> {
        self.0.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingEndpoint(Arc::clone(&self.0))))
    }
}

pub fn recorder() -> (Arc<Recorder>, Arc<dyn EndpointFactory>) {
    let recorder = Arc::new(Recorder::default());
    let factory: Arc<dyn EndpointFactory> = Arc::new(RecordingFactory(Arc::clone(&recorder)));
    (recorder, factory)
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
