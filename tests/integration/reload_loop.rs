//! Integration tests for the store-driven reload loop
//!
//! These tests verify that:
//! - A change notification replaces the running generation
//! - A failed fetch keeps the current generation running
//! - Notifications queued during a reload collapse into one reload

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio::sync::mpsc;
use tokio_test::assert_ok;
use urlmon::actors::manager::GenerationManager;
use urlmon::actors::reloader::{reload_from_store, run_reload_loop};
use urlmon::store::memory::MemoryStore;
use urlmon::store::{ChangeEvent, ConfigStore, StoreError};

use super::helpers::*;

const CHECKS: &str = "/urlmon/checks";

async fn seeded_store(ids: &[&str]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.put(CHECKS, checks_tree(ids)).await;
    store
}

fn checks_tree(ids: &[&str]) -> urlmon::store::Node {
    create_checks_dir(
        ids.iter()
            .map(|id| create_check_node(id, &[("URL", "http://example.invalid")]))
            .collect(),
    )
}

/// Wait until the manager publishes generation `number`
async fn wait_for_generation(manager: &GenerationManager, number: u64) -> bool {
    for _ in 0..200 {
        if manager.current().load().await.number() >= number {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_change_triggers_reload() {
    let store = seeded_store(&["a"]).await;
    let manager = create_test_manager(Arc::new(RecordingSink::default()));
    let changes = store.watch("/urlmon").await.unwrap();

    let first = reload_from_store(store.as_ref(), &manager, CHECKS).await.unwrap();
    assert_eq!(first.snapshot().ids(), vec!["a"]);

    let dyn_store: Arc<dyn ConfigStore> = store.clone();
    let reloader = tokio::spawn(run_reload_loop(
        dyn_store,
        manager.clone(),
        CHECKS.to_string(),
        changes,
    ));

    store.put(CHECKS, checks_tree(&["b", "c"])).await;

    assert!(wait_for_generation(&manager, 2).await);
    let current = manager.current().load().await;
    assert_eq!(current.snapshot().ids(), vec!["b", "c"]);

    reloader.abort();
    manager.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_store_keeps_generation() {
    let store = seeded_store(&["a"]).await;
    let manager = create_test_manager(Arc::new(RecordingSink::default()));
    let changes = store.watch("/urlmon").await.unwrap();
    reload_from_store(store.as_ref(), &manager, CHECKS).await.unwrap();

    let dyn_store: Arc<dyn ConfigStore> = store.clone();
    let reloader = tokio::spawn(run_reload_loop(
        dyn_store,
        manager.clone(),
        CHECKS.to_string(),
        changes,
    ));

    store.set_reachable(false);
    store.notify("/urlmon/checks/a/URL", "set").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let current = manager.current().load().await;
    assert_eq!(current.number(), 1);
    assert_eq!(current.snapshot().ids(), vec!["a"]);
    assert_eq!(manager.monitor_states().await.len(), 1);

    // The next notification after recovery reloads normally.
    store.set_reachable(true);
    store.notify("/urlmon/checks/a/URL", "set").await;
    assert!(wait_for_generation(&manager, 2).await);

    reloader.abort();
    manager.shutdown().await;
}

#[tokio::test]
async fn test_queued_notifications_coalesce() {
    let store = seeded_store(&["a", "b"]).await;
    let manager = create_test_manager(Arc::new(RecordingSink::default()));
    let (tx, rx) = mpsc::channel(16);

    for i in 0..5 {
        tx.send(ChangeEvent {
            action: "set".to_string(),
            key: format!("/urlmon/checks/a/{i}"),
            value: None,
        })
        .await
        .unwrap();
    }

    let dyn_store: Arc<dyn ConfigStore> = store.clone();
    let reloader = tokio::spawn(run_reload_loop(
        dyn_store,
        manager.clone(),
        CHECKS.to_string(),
        rx,
    ));

    assert!(wait_for_generation(&manager, 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.current().load().await.number(), 1);

    drop(tx);
    tokio::time::timeout(Duration::from_secs(2), reloader)
        .await
        .expect("loop should end with its notification stream")
        .unwrap();

    manager.shutdown().await;
}

#[tokio::test]
async fn test_reload_from_store_errors() {
    let manager = create_test_manager(Arc::new(RecordingSink::default()));

    let store = MemoryStore::new();
    assert_matches!(
        reload_from_store(&store, &manager, CHECKS).await,
        Err(StoreError::NotFound(path)) if path == CHECKS
    );

    store.set_reachable(false);
    assert_matches!(
        reload_from_store(&store, &manager, CHECKS).await,
        Err(StoreError::Unreachable(_))
    );

    assert_eq!(manager.current().load().await.number(), 0);
}

#[tokio::test]
async fn test_ensure_dirs_creates_empty_checks_dir() {
    let store = MemoryStore::new();
    assert_ok!(
        store
            .ensure_dirs(&["/urlmon".to_string(), CHECKS.to_string()])
            .await
    );

    let manager = create_test_manager(Arc::new(RecordingSink::default()));
    let generation = reload_from_store(&store, &manager, CHECKS).await.unwrap();

    assert_eq!(generation.number(), 1);
    assert!(generation.checks().is_empty());
    assert!(manager.monitor_states().await.is_empty());
}
