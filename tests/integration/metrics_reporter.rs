//! Integration tests for the Librato metrics reporter
//!
//! These tests verify that:
//! - Batches carry the source and one complex gauge per check
//! - Pushes authenticate with basic auth
//! - Empty batches are never sent
//! - A failed push is dropped without stopping the reporter
//! - Shutdown waits for the final push

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use urlmon::actors::manager::GenerationManager;
use urlmon::actors::metrics::{MetricsHandle, MetricsRegistry, ReporterConfig};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::helpers::*;

/// Basic auth header for `me:secret`
const AUTHORIZATION: &str = "Basic bWU6c2VjcmV0";

fn reporter_config(server: &MockServer) -> ReporterConfig {
    ReporterConfig {
        endpoint: format!("{}/v1/metrics", server.uri()),
        // Long enough that only explicit flushes push during a test.
        interval: Duration::from_secs(3600),
        ..ReporterConfig::librato("me", "secret", "test-host")
    }
}

async fn accept_metrics(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/metrics"))
        .and(header("authorization", AUTHORIZATION))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

async fn pushed_batches(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| request.body_json::<Value>().unwrap())
        .collect()
}

#[tokio::test]
async fn test_flush_pushes_complex_gauges() {
    let mock_server = MockServer::start().await;
    accept_metrics(&mock_server).await;

    let registry = MetricsRegistry::new();
    let homepage = registry.register("homepage");
    let _idle = registry.register("idle");
    homepage.record(Duration::from_millis(10));
    homepage.record(Duration::from_millis(30));

    let handle = MetricsHandle::spawn(registry, reporter_config(&mock_server));
    assert_eq!(handle.flush().await.unwrap(), 1);

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].headers.get("authorization").unwrap(),
        AUTHORIZATION
    );

    let batch: Value = requests[0].body_json().unwrap();
    assert_eq!(batch["source"], "test-host");

    let gauges = batch["gauges"].as_array().unwrap();
    assert_eq!(gauges.len(), 1);
    assert_eq!(gauges[0]["name"], "urlmon.request.homepage");
    assert_eq!(gauges[0]["count"], 2);
    assert_eq!(gauges[0]["sum"], 40.0);
    assert_eq!(gauges[0]["min"], 10.0);
    assert_eq!(gauges[0]["max"], 30.0);
    assert_eq!(gauges[0]["sum_squares"], 1000.0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_batch_is_not_sent() {
    let mock_server = MockServer::start().await;
    accept_metrics(&mock_server).await;

    let registry = MetricsRegistry::new();
    let _gauge = registry.register("quiet");

    let handle = MetricsHandle::spawn(registry, reporter_config(&mock_server));
    assert_eq!(handle.flush().await.unwrap(), 0);
    assert_eq!(handle.shutdown().await.unwrap(), 0);

    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_push_is_dropped() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    accept_metrics(&mock_server).await;

    let registry = MetricsRegistry::new();
    let gauge = registry.register("a");
    gauge.record(Duration::from_millis(1));

    let handle = MetricsHandle::spawn(registry, reporter_config(&mock_server));
    assert!(handle.flush().await.is_err());

    // The rejected samples are gone; the reporter keeps working.
    gauge.record(Duration::from_millis(2));
    assert_eq!(handle.flush().await.unwrap(), 1);

    let batches = pushed_batches(&mock_server).await;
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1]["gauges"][0]["count"], 1);
    assert_eq!(batches[1]["gauges"][0]["sum"], 2.0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_endpoint_reports_error() {
    let addr = closed_addr().await;
    let registry = MetricsRegistry::new();
    let gauge = registry.register("a");
    gauge.record(Duration::from_millis(1));

    let config = ReporterConfig {
        endpoint: format!("http://{addr}/v1/metrics"),
        interval: Duration::from_secs(3600),
        ..ReporterConfig::librato("me", "secret", "test-host")
    };
    let handle = MetricsHandle::spawn(registry, config);

    assert!(handle.flush().await.is_err());
    assert_eq!(handle.shutdown().await.unwrap(), 0);
}

#[tokio::test]
async fn test_shutdown_waits_for_final_push() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
        .mount(&mock_server)
        .await;

    let registry = MetricsRegistry::new();
    let gauge = registry.register("a");
    gauge.record(Duration::from_millis(5));

    let handle = MetricsHandle::spawn(registry, reporter_config(&mock_server));
    assert_eq!(handle.shutdown().await.unwrap(), 1);

    let batches = pushed_batches(&mock_server).await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0]["gauges"][0]["name"], "urlmon.request.a");
}

#[tokio::test]
async fn test_samples_survive_reload() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let context = create_test_context(sink.clone());
    let registry = context.metrics.clone();
    let manager = GenerationManager::new(context);

    manager
        .reload_checks(vec![create_fast_check("a", &mock_server.uri())])
        .await;
    assert!(sink.wait_for(1, 2000).await);

    // Replacing the generation drops the old monitor and its gauge.
    manager
        .reload_checks(vec![
            create_fast_check("a", &mock_server.uri()).with_interval(Duration::from_secs(60)),
        ])
        .await;

    let recorded = sink.events_for("a").await.len();
    let drained = registry.drain();
    assert_eq!(drained["urlmon.request.a"].len(), recorded);
    assert_eq!(registry.registered(), vec!["urlmon.request.a"]);

    manager.shutdown().await;
}
