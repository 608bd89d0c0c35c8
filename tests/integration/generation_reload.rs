//! Integration tests for GenerationManager reloads
//!
//! These tests verify that:
//! - Bad entries are skipped without blocking the rest
//! - Every reload replaces the whole generation
//! - Stale ids disappear from the status snapshot
//! - Overlapping reloads never leave two generations running

use std::sync::Arc;
use std::time::Duration;

use urlmon::actors::messages::MonitorState;
use urlmon::probe::Severity;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::helpers::*;

fn ids_of(states: &[(String, MonitorState)]) -> Vec<&str> {
    states.iter().map(|(id, _)| id.as_str()).collect()
}

#[tokio::test]
async fn test_reload_skips_invalid_entries() {
    let manager = create_test_manager(Arc::new(RecordingSink::default()));
    let root = create_checks_dir(vec![
        create_check_node("a", &[("URL", "http://x")]),
        create_check_node("b", &[("URL", "http://y"), ("REGEX", "(")]),
        create_check_node("c", &[("URL", "http://z"), ("LEVEL", "CRITICAL")]),
    ]);

    let generation = manager.reload(&root).await;

    assert_eq!(generation.number(), 1);
    assert_eq!(generation.snapshot().ids(), vec!["a", "c"]);
    assert!(!generation.snapshot().contains("b"));
    assert_eq!(ids_of(&manager.monitor_states().await), vec!["a", "c"]);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_reload_drops_stale_ids() {
    let manager = create_test_manager(Arc::new(RecordingSink::default()));

    manager
        .reload(&create_checks_dir(vec![
            create_check_node("a", &[("URL", "http://x")]),
            create_check_node("b", &[("URL", "http://y")]),
        ]))
        .await;

    let generation = manager
        .reload(&create_checks_dir(vec![
            create_check_node("b", &[("URL", "http://y")]),
            create_check_node("c", &[("URL", "http://z")]),
        ]))
        .await;

    assert_eq!(generation.number(), 2);
    assert_eq!(generation.snapshot().ids(), vec!["b", "c"]);
    assert!(generation.snapshot().get("a").await.is_none());
    assert!(generation.check("a").is_none());
    assert_eq!(ids_of(&manager.monitor_states().await), vec!["b", "c"]);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_identical_reload_restarts_every_monitor() {
    let manager = create_test_manager(Arc::new(RecordingSink::default()));
    let root = create_checks_dir(vec![
        create_check_node("a", &[("URL", "http://x")]),
        create_check_node("b", &[("URL", "http://y")]),
    ]);

    manager.reload(&root).await;
    let previous = manager.watch_states().await;
    assert_eq!(previous.len(), 2);

    let generation = manager.reload(&root).await;
    assert_eq!(generation.number(), 2);

    for (id, state) in &previous {
        assert_eq!(*state.borrow(), MonitorState::Stopped, "{id} still live");
    }

    let current = manager.monitor_states().await;
    assert_eq!(ids_of(&current), vec!["a", "b"]);
    assert!(current.iter().all(|(_, state)| state.is_live()));

    let last = manager.watch_states().await;
    manager.shutdown().await;
    for (_, state) in &last {
        assert_eq!(*state.borrow(), MonitorState::Stopped);
    }
}

#[tokio::test]
async fn test_overlapping_reloads_are_serialized() {
    let manager = create_test_manager(Arc::new(RecordingSink::default()));
    let first = create_checks_dir(vec![
        create_check_node("a", &[("URL", "http://x")]),
        create_check_node("b", &[("URL", "http://y")]),
    ]);
    let second = create_checks_dir(vec![
        create_check_node("c", &[("URL", "http://z")]),
        create_check_node("d", &[("URL", "http://w")]),
        create_check_node("e", &[("URL", "http://v")]),
    ]);

    let (one, two) = tokio::join!(manager.reload(&first), manager.reload(&second));

    let mut numbers = vec![one.number(), two.number()];
    numbers.sort();
    assert_eq!(numbers, vec![1, 2]);

    let latest = manager.current().load().await;
    assert_eq!(latest.number(), 2);

    let running = manager.monitor_states().await;
    assert_eq!(ids_of(&running), latest.snapshot().ids());
    assert!(running.len() == 2 || running.len() == 3);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_new_generation_starts_without_results() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let manager = create_test_manager(sink.clone());

    let first = manager
        .reload_checks(vec![create_fast_check("a", &mock_server.uri())])
        .await;
    assert!(sink.wait_for(1, 2000).await);
    assert_eq!(
        first.snapshot().get("a").await.unwrap().status,
        Some(Severity::Ok)
    );

    let slow = create_fast_check("a", &mock_server.uri()).with_interval(Duration::from_secs(60));
    let second = manager.reload_checks(vec![slow]).await;

    assert_eq!(second.number(), 2);
    let fresh = second.snapshot().get("a").await.unwrap();
    assert_eq!(fresh.status, None);
    assert_eq!(fresh.message, None);
    assert!(fresh.last_checked.is_none());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_reload_checks_keeps_first_duplicate() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let manager = create_test_manager(sink.clone());

    let generation = manager
        .reload_checks(vec![
            create_fast_check("dup", &format!("{}/first", mock_server.uri())),
            create_fast_check("dup", &format!("{}/second", mock_server.uri())),
        ])
        .await;

    assert_eq!(generation.checks().len(), 1);
    assert!(sink.wait_for(2, 2000).await);
    manager.shutdown().await;

    for event in sink.events_for("dup").await {
        assert_eq!(event.url.path(), "/first");
    }
}
