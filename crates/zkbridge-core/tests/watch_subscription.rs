//! Watch subscription lifecycle against the in-memory ensemble.
//!
//! Covers:
//! - connect, install watch, deliver node events
//! - session expiry leads to exactly one reconnect with the same watch
//! - transient disconnect keeps the subscription untouched
//! - bounded connect wait against an unreachable service
//! - close is terminal and idempotent

mod common;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{eventually, recorder, Recorder};
use zkbridge_core::{
    client::{Acl, Connector, CoordinationClient, CreateMode, InMemoryEnsemble, SessionParams},
    inbound::{SubscriptionState, WatchSessionSupervisor},
    ActivationSpec, Error, Result, TokioScheduler, WatchAdapter,
};

use SubscriptionState::{Closed, Connecting, Disconnected, Watching};

fn supervisor(
    ensemble: &InMemoryEnsemble,
    scheduler: &TokioScheduler,
    spec: ActivationSpec,
) -> Result<(Arc<Recorder>, Arc<WatchSessionSupervisor>)> {
    let (recorder, factory) = recorder();
    let supervisor = WatchSessionSupervisor::new(
        spec,
        Arc::new(ensemble.clone()),
        Arc::new(scheduler.clone()),
        factory,
    )?;
    Ok((recorder, supervisor))
}

fn writer(ensemble: &InMemoryEnsemble) -> Result<Arc<dyn CoordinationClient>> {
    let params = SessionParams {
        connect_string: "127.0.0.1:2181".to_string(),
        session_timeout: Duration::from_secs(6),
        can_be_read_only: false,
    };
    Ok(ensemble.connect(&params, None)?)
}

async fn create(client: &Arc<dyn CoordinationClient>, path: &str) -> Result<()> {
    client
        .create(path, b"", &Acl::open_unsafe(), CreateMode::Persistent, None)
        .await?;
    Ok(())
}

fn transitions(supervisor: &WatchSessionSupervisor) -> Vec<(SubscriptionState, SubscriptionState)> {
    supervisor
        .history()
        .iter()
        .map(|t| (t.from, t.to))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// CONNECT & DELIVER
// ═══════════════════════════════════════════════════════════════════════════

/// GIVEN: a reachable ensemble and a recursive activation on /app
/// WHEN: nodes are created under /app
/// THEN: every change reaches a fresh consumer instance, one cycle each
#[tokio::test]
async fn test_recursive_watch_delivers_descendant_events() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let scheduler = TokioScheduler::current()?;
    let spec = ActivationSpec::new("app")
        .with_base_path("/app")
        .with_recursive(true);
    let (recorder, supervisor) = supervisor(&ensemble, &scheduler, spec)?;

    supervisor.start().await?;
    assert_eq!(supervisor.state(), Watching);

    let client = writer(&ensemble)?;
    create(&client, "/app").await?;
    create(&client, "/app/a").await?;
    create(&client, "/app/a/b").await?;
    scheduler.drain().await;

    assert_eq!(supervisor.dispatcher().dispatched(), 3);
    assert_eq!(Recorder::count(&recorder.created), 3);
    assert_eq!(Recorder::count(&recorder.before), 3);
    assert_eq!(Recorder::count(&recorder.after), 3);
    assert_eq!(Recorder::count(&recorder.released), 3);
    let mut paths = recorder.paths();
    paths.sort();
    assert_eq!(paths, vec!["/app", "/app/a", "/app/a/b"]);

    supervisor.close().await?;
    Ok(())
}

/// GIVEN: a non-recursive activation on /app
/// WHEN: a grandchild is created
/// THEN: only the events of /app itself are delivered
#[tokio::test]
async fn test_plain_watch_ignores_grandchildren() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let scheduler = TokioScheduler::current()?;
    let spec = ActivationSpec::new("app").with_base_path("/app");
    let (recorder, supervisor) = supervisor(&ensemble, &scheduler, spec)?;
    supervisor.start().await?;

    let client = writer(&ensemble)?;
    create(&client, "/app").await?;
    create(&client, "/app/a").await?;
    create(&client, "/app/a/b").await?;
    scheduler.drain().await;

    // Created on /app, then ChildrenChanged on /app
    assert_eq!(recorder.paths(), vec!["/app", "/app"]);
    supervisor.close().await?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// EXPIRY & RECONNECT
// ═══════════════════════════════════════════════════════════════════════════

/// GIVEN: a watching subscription
/// WHEN: its session expires
/// THEN: exactly one new session is created with the same recursive watch
#[tokio::test]
async fn test_expiry_reconnects_once_with_same_watch() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let scheduler = TokioScheduler::current()?;
    let spec = ActivationSpec::new("app")
        .with_base_path("/app")
        .with_recursive(true);
    let (recorder, supervisor) = supervisor(&ensemble, &scheduler, spec)?;
    supervisor.start().await?;

    let first = supervisor
        .session_id()
        .ok_or_else(|| Error::illegal_state("no session after start"))?;
    assert!(ensemble.expire_session(first));
    scheduler.drain().await;

    assert_eq!(supervisor.state(), Watching);
    let second = supervisor
        .session_id()
        .ok_or_else(|| Error::illegal_state("no session after reconnect"))?;
    assert_ne!(first, second);
    assert_eq!(ensemble.watch_count(second), 1);
    assert_eq!(
        transitions(&supervisor),
        vec![
            (Disconnected, Connecting),
            (Connecting, Watching),
            (Watching, Disconnected),
            (Disconnected, Connecting),
            (Connecting, Watching),
        ]
    );

    let client = writer(&ensemble)?;
    create(&client, "/app").await?;
    create(&client, "/app/deep").await?;
    scheduler.drain().await;
    assert_eq!(recorder.paths().len(), 2);

    supervisor.close().await?;
    Ok(())
}

/// GIVEN: a watching subscription whose session just expired
/// WHEN: it is closed before the scheduled reconnect runs
/// THEN: the reconnect gives up quietly and the subscription stays Closed
#[tokio::test]
async fn test_close_before_reconnect_stays_closed() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let scheduler = TokioScheduler::current()?;
    let spec = ActivationSpec::new("app").with_base_path("/app");
    let (recorder, supervisor) = supervisor(&ensemble, &scheduler, spec)?;
    supervisor.start().await?;

    let first = supervisor
        .session_id()
        .ok_or_else(|| Error::illegal_state("no session after start"))?;
    assert!(ensemble.expire_session(first));
    supervisor.close().await?;
    scheduler.drain().await;

    assert_eq!(supervisor.state(), Closed);
    assert_eq!(supervisor.session_id(), None);
    assert!(ensemble.live_sessions().is_empty());
    assert_eq!(transitions(&supervisor).last(), Some(&(Disconnected, Closed)));

    let client = writer(&ensemble)?;
    create(&client, "/app").await?;
    scheduler.drain().await;
    assert!(recorder.paths().is_empty());
    Ok(())
}

/// GIVEN: a watching subscription
/// WHEN: the connection drops and comes back within the session
/// THEN: no state change and no new session
#[tokio::test]
async fn test_transient_disconnect_keeps_subscription() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let scheduler = TokioScheduler::current()?;
    let spec = ActivationSpec::new("app").with_base_path("/app");
    let (recorder, supervisor) = supervisor(&ensemble, &scheduler, spec)?;
    supervisor.start().await?;
    let session = supervisor
        .session_id()
        .ok_or_else(|| Error::illegal_state("no session after start"))?;
    let before = supervisor.history().len();

    assert!(ensemble.disconnect_session(session));
    assert!(ensemble.reconnect_session(session));
    scheduler.drain().await;

    assert_eq!(supervisor.state(), Watching);
    assert_eq!(supervisor.history().len(), before);
    assert_eq!(supervisor.session_id(), Some(session));

    let client = writer(&ensemble)?;
    create(&client, "/app").await?;
    scheduler.drain().await;
    assert_eq!(recorder.paths(), vec!["/app"]);

    supervisor.close().await?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// CONNECT TIMEOUT
// ═══════════════════════════════════════════════════════════════════════════

/// GIVEN: an unreachable ensemble and a 50ms connect timeout
/// WHEN: the subscription starts
/// THEN: it fails with ConnectTimeout and falls back to Disconnected
#[tokio::test]
async fn test_connect_timeout_against_unreachable_service() -> Result<()> {
    let ensemble = InMemoryEnsemble::unreachable();
    let scheduler = TokioScheduler::current()?;
    let spec = ActivationSpec::new("app").with_connect_timeout(Duration::from_millis(50));
    let (_recorder, supervisor) = supervisor(&ensemble, &scheduler, spec)?;

    let started = Instant::now();
    let result = supervisor.start().await;
    let elapsed = started.elapsed();
    match result {
        Err(Error::ConnectTimeout { timeout, .. }) => {
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("expected ConnectTimeout, got {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(50), "gave up after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "waited {elapsed:?}");
    assert_eq!(supervisor.state(), Disconnected);
    assert!(ensemble.live_sessions().is_empty());
    Ok(())
}

/// GIVEN: an unreachable ensemble and no connect timeout
/// WHEN: the service becomes reachable later
/// THEN: the waiting start completes and the watch is installed
#[tokio::test]
async fn test_unbounded_wait_completes_when_reachable() -> Result<()> {
    let ensemble = InMemoryEnsemble::unreachable();
    let scheduler = TokioScheduler::current()?;
    let (_recorder, supervisor) = supervisor(&ensemble, &scheduler, ActivationSpec::new("app"))?;

    let task = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.start().await })
    };
    assert!(eventually(|| supervisor.state() == Connecting).await);
    ensemble.set_reachable(true);

    task.await
        .map_err(|e| Error::illegal_state(e.to_string()))??;
    assert_eq!(supervisor.state(), Watching);
    supervisor.close().await?;
    Ok(())
}

/// GIVEN: a subscription waiting forever on an unreachable ensemble
/// WHEN: it is closed
/// THEN: the wait is interrupted and the state is Closed
#[tokio::test]
async fn test_close_interrupts_pending_connect() -> Result<()> {
    let ensemble = InMemoryEnsemble::unreachable();
    let scheduler = TokioScheduler::current()?;
    let (_recorder, supervisor) = supervisor(&ensemble, &scheduler, ActivationSpec::new("app"))?;

    let task = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.start().await })
    };
    assert!(eventually(|| supervisor.state() == Connecting).await);
    supervisor.close().await?;

    let result = task
        .await
        .map_err(|e| Error::illegal_state(e.to_string()))?;
    assert!(matches!(result, Err(Error::Interrupted(_))));
    assert_eq!(supervisor.state(), Closed);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// CLOSE & ADAPTER
// ═══════════════════════════════════════════════════════════════════════════

/// GIVEN: a watching subscription
/// WHEN: it is closed twice
/// THEN: the session is gone, later events are not delivered
#[tokio::test]
async fn test_close_is_terminal_and_idempotent() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let scheduler = TokioScheduler::current()?;
    let spec = ActivationSpec::new("app").with_base_path("/app");
    let (recorder, supervisor) = supervisor(&ensemble, &scheduler, spec)?;
    supervisor.start().await?;

    supervisor.close().await?;
    supervisor.close().await?;
    assert_eq!(supervisor.state(), Closed);
    assert_eq!(supervisor.session_id(), None);
    assert!(ensemble.live_sessions().is_empty());

    let client = writer(&ensemble)?;
    create(&client, "/app").await?;
    scheduler.drain().await;
    assert!(recorder.paths().is_empty());
    assert!(supervisor.start().await.is_err());
    Ok(())
}

/// GIVEN: an adapter with one activation
/// WHEN: it is deactivated
/// THEN: the activation's session is closed and the name is free again
#[tokio::test]
async fn test_adapter_activation_lifecycle() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let scheduler = TokioScheduler::current()?;
    let adapter = WatchAdapter::new(Arc::new(ensemble.clone()), Arc::new(scheduler.clone()));
    let (recorder, factory) = recorder();

    let spec = ActivationSpec::new("orders").with_base_path("/orders");
    adapter.endpoint_activation(Arc::clone(&factory), spec.clone())?;
    scheduler.drain().await;
    let supervisor = adapter
        .activation("orders")
        .ok_or_else(|| Error::illegal_state("activation missing"))?;
    assert_eq!(supervisor.state(), Watching);
    assert_eq!(supervisor.spec().name, "orders");
    assert_eq!(supervisor.spec().base_path, "/orders");

    let client = writer(&ensemble)?;
    create(&client, "/orders").await?;
    scheduler.drain().await;
    assert_eq!(recorder.paths(), vec!["/orders"]);

    assert!(adapter.endpoint_deactivation("orders").await);
    assert_eq!(supervisor.state(), Closed);
    assert_eq!(ensemble.live_sessions().len(), 1);

    adapter.endpoint_activation(factory, spec)?;
    scheduler.drain().await;
    adapter.stop().await;
    assert_eq!(ensemble.live_sessions().len(), 1);
    Ok(())
}
