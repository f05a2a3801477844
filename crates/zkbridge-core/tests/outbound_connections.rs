//! Outbound connection handles over pooled sessions.
//!
//! Covers:
//! - node operations and their service error codes
//! - handle close semantics and pool recycling
//! - lazy association vs. a pool without it
//! - pool shutdown closes the underlying sessions

use std::sync::Arc;

use zkbridge_core::{
    client::{Acl, Connector, CreateMode, ErrorCode, InMemoryEnsemble, Version},
    outbound::{ConnectionManager, SessionFactory},
    ConnectionFactory, ConnectionHandle, Error, ErrorKind, OutboundConfig, Result, SimplePool,
};

fn connection_factory(
    ensemble: &InMemoryEnsemble,
    pool: &Arc<SimplePool>,
) -> Result<ConnectionFactory> {
    let connector: Arc<dyn Connector> = Arc::new(ensemble.clone());
    let factory = SessionFactory::new(OutboundConfig::default(), connector)?;
    let manager: Arc<dyn ConnectionManager> = pool.clone();
    Ok(factory.create_connection_factory(manager))
}

async fn create(handle: &ConnectionHandle, path: &str, mode: CreateMode) -> Result<String> {
    handle.create(path, b"v0", &Acl::open_unsafe(), mode).await
}

fn code_of<T>(result: &Result<T>) -> Option<ErrorCode> {
    result.as_ref().err().and_then(Error::code)
}

// ═══════════════════════════════════════════════════════════════════════════
// NODE OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════

/// GIVEN: a pooled handle
/// WHEN: the same node is created twice
/// THEN: the second create reports NodeExists
#[tokio::test]
async fn test_double_create_reports_node_exists() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let pool = SimplePool::new();
    let handle = connection_factory(&ensemble, &pool)?.get_connection()?;

    assert_eq!(create(&handle, "/a", CreateMode::Persistent).await?, "/a");
    let again = create(&handle, "/a", CreateMode::Persistent).await;
    assert_eq!(code_of(&again), Some(ErrorCode::NodeExists));
    assert!(matches!(again, Err(Error::Service { .. })));
    Ok(())
}

/// GIVEN: a node at version 1
/// WHEN: deleting with a stale version, then the right one
/// THEN: BadVersion first, success second, and the node is gone
#[tokio::test]
async fn test_versioned_delete() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let pool = SimplePool::new();
    let handle = connection_factory(&ensemble, &pool)?.get_connection()?;

    create(&handle, "/a", CreateMode::Persistent).await?;
    let stat = handle.set_data("/a", b"v1", Version::Any).await?;
    assert_eq!(stat.version, 1);

    let stale = handle.delete("/a", Version::Exact(0)).await;
    assert_eq!(code_of(&stale), Some(ErrorCode::BadVersion));
    handle.delete("/a", Version::Exact(1)).await?;
    assert!(handle.exists("/a").await?.is_none());
    Ok(())
}

/// GIVEN: an empty tree
/// WHEN: reading, deleting and creating below a missing node
/// THEN: exists is None and the others report NoNode
#[tokio::test]
async fn test_missing_nodes() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let pool = SimplePool::new();
    let handle = connection_factory(&ensemble, &pool)?.get_connection()?;

    assert!(handle.exists("/missing").await?.is_none());
    assert_eq!(
        code_of(&handle.get_data("/missing").await),
        Some(ErrorCode::NoNode)
    );
    assert_eq!(
        code_of(&handle.delete("/missing", Version::Any).await),
        Some(ErrorCode::NoNode)
    );
    assert_eq!(
        code_of(&create(&handle, "/missing/child", CreateMode::Persistent).await),
        Some(ErrorCode::NoNode)
    );
    Ok(())
}

/// GIVEN: a parent with children
/// WHEN: listing, counting and deleting the parent
/// THEN: children are listed, counted, and the parent is NotEmpty
#[tokio::test]
async fn test_children_and_not_empty() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let pool = SimplePool::new();
    let handle = connection_factory(&ensemble, &pool)?.get_connection()?;

    create(&handle, "/p", CreateMode::Persistent).await?;
    create(&handle, "/p/x", CreateMode::Persistent).await?;
    create(&handle, "/p/x/y", CreateMode::Persistent).await?;
    let first = create(&handle, "/p/seq-", CreateMode::PersistentSequential).await?;
    let second = create(&handle, "/p/seq-", CreateMode::PersistentSequential).await?;
    assert!(first.starts_with("/p/seq-"));
    assert!(first < second);

    let mut children = handle.get_children("/p").await?;
    children.sort();
    assert_eq!(children.len(), 3);
    assert_eq!(children[2], "x");
    assert_eq!(handle.get_all_children_number("/p").await?, 4);
    assert_eq!(
        code_of(&handle.delete("/p", Version::Any).await),
        Some(ErrorCode::NotEmpty)
    );
    Ok(())
}

/// GIVEN: a single node directly under the root
/// WHEN: listing and counting the root's children
/// THEN: only that node is reported, never the root itself
#[tokio::test]
async fn test_root_children_exclude_root() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let pool = SimplePool::new();
    let handle = connection_factory(&ensemble, &pool)?.get_connection()?;

    create(&handle, "/a", CreateMode::Persistent).await?;
    assert_eq!(handle.get_children("/").await?, vec!["a".to_string()]);
    assert_eq!(handle.get_all_children_number("/").await?, 1);

    create(&handle, "/a/b", CreateMode::Persistent).await?;
    assert_eq!(handle.get_children("/").await?, vec!["a".to_string()]);
    assert_eq!(handle.get_all_children_number("/").await?, 2);
    Ok(())
}

/// GIVEN: ephemeral nodes owned by a pooled session
/// WHEN: the pool shuts down
/// THEN: the session is closed and its ephemerals disappear
#[tokio::test]
async fn test_shutdown_removes_ephemerals() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let pool = SimplePool::new();
    let factory = connection_factory(&ensemble, &pool)?;
    let handle = factory.get_connection()?;

    create(&handle, "/e1", CreateMode::Ephemeral).await?;
    create(&handle, "/e2", CreateMode::Ephemeral).await?;
    let mut owned = handle.get_ephemerals().await?;
    owned.sort();
    assert_eq!(owned, vec!["/e1", "/e2"]);
    assert_eq!(handle.get_ephemerals_with_prefix("/e1").await?, vec!["/e1"]);

    assert_eq!(pool.shutdown().await, 1);
    assert!(ensemble.live_sessions().is_empty());

    let observer = connection_factory(&ensemble, &SimplePool::new())?.get_connection()?;
    assert!(observer.exists("/e1").await?.is_none());
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// HANDLE LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════

/// GIVEN: an open handle
/// WHEN: it is closed twice
/// THEN: the session is recycled once and operations fail with IllegalState
#[tokio::test]
async fn test_closed_handle_rejects_operations() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let pool = SimplePool::new();
    let handle = connection_factory(&ensemble, &pool)?.get_connection()?;
    assert_eq!(pool.in_use_count(), 1);

    handle.close();
    handle.close();
    assert!(handle.is_closed());
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.idle_count(), 1);

    let result = handle.exists("/").await;
    assert!(matches!(result, Err(Error::IllegalState(_))));
    assert_eq!(result.err().map(|e| e.kind()), Some(ErrorKind::IllegalState));
    Ok(())
}

/// GIVEN: a closed handle's session back in the pool
/// WHEN: a new handle is requested
/// THEN: the idle session is reused instead of opening another
#[tokio::test]
async fn test_idle_session_reused() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let pool = SimplePool::new();
    let factory = connection_factory(&ensemble, &pool)?;

    let first = factory.get_connection()?;
    let session = first.session().map(|s| s.id());
    drop(first);

    let second = factory.get_connection()?;
    assert_eq!(second.session().map(|s| s.id()), session);
    assert_eq!(ensemble.live_sessions().len(), 1);
    Ok(())
}

/// GIVEN: a pool with lazy association
/// WHEN: a handle is disassociated and then used
/// THEN: the pool binds it again transparently
#[tokio::test]
async fn test_lazy_association_rebinds_on_use() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let pool = SimplePool::with_lazy_association();
    let handle = connection_factory(&ensemble, &pool)?.get_connection()?;

    handle.disassociate()?;
    assert!(handle.session().is_none());
    assert!(!handle.is_closed());

    create(&handle, "/lazy", CreateMode::Persistent).await?;
    assert!(handle.session().is_some());
    assert!(handle.exists("/lazy").await?.is_some());
    Ok(())
}

/// GIVEN: a pool with lazy association
/// WHEN: an inactive handle is closed
/// THEN: the pool is told about it once
#[tokio::test]
async fn test_inactive_close_notifies_lazy_pool() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let pool = SimplePool::with_lazy_association();
    let handle = connection_factory(&ensemble, &pool)?.get_connection()?;

    handle.disassociate()?;
    handle.close();
    handle.close();
    assert_eq!(pool.inactive_closed_count(), 1);
    Ok(())
}

/// GIVEN: a pool without lazy association
/// WHEN: a handle is disassociated
/// THEN: IllegalState, and the handle stays bound
#[tokio::test]
async fn test_disassociate_requires_lazy_pool() -> Result<()> {
    let ensemble = InMemoryEnsemble::new();
    let pool = SimplePool::new();
    let handle = connection_factory(&ensemble, &pool)?.get_connection()?;

    assert!(matches!(handle.disassociate(), Err(Error::IllegalState(_))));
    assert!(handle.session().is_some());
    Ok(())
}

#[test]
fn test_unmanaged_factory_unsupported() -> Result<()> {
    let connector: Arc<dyn Connector> = Arc::new(InMemoryEnsemble::new());
    let factory = SessionFactory::new(OutboundConfig::default(), connector)?;
    assert!(matches!(
        factory.create_unmanaged_connection_factory(),
        Err(Error::Unsupported(_))
    ));
    Ok(())
}
