use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use urlmon::{
    actors::{
        manager::GenerationManager,
        metrics::{MetricsHandle, MetricsRegistry, ReporterConfig},
        monitor::MonitorContext,
        reloader::{reload_from_store, run_reload_loop},
    },
    alerts::SensuSink,
    api::{ApiConfig, ApiState, spawn_api_server},
    config::Options,
    store::{ConfigStore, etcd::EtcdStore},
    util::hostname,
};

fn init(level: LevelFilter) {
    let http_level = if level >= LevelFilter::DEBUG {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("urlmon", level),
        ("tower_http", http_level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let opts = Options::parse();
    init(opts.log_level);
    trace!("started with options: {opts:?}");

    let store: Arc<dyn ConfigStore> =
        Arc::new(EtcdStore::new(&opts.etcd).context("invalid etcd configuration")?);
    let prefix = opts.prefix_path();
    let checks_path = opts.checks_path();

    store
        .ensure_dirs(&[prefix.clone(), checks_path.clone()])
        .await
        .context("couldn't create etcd dirs")?;

    // Subscribe before the first load so no change slips in between.
    let changes = store
        .watch(&prefix)
        .await
        .context("couldn't watch etcd prefix")?;

    let metrics = MetricsRegistry::new();
    let alerts = Arc::new(SensuSink::new(opts.sensu.clone(), opts.handler_names()));
    let manager = Arc::new(GenerationManager::new(MonitorContext::new(
        alerts,
        metrics.clone(),
    )));

    reload_from_store(store.as_ref(), &manager, &checks_path)
        .await
        .context("problem fetching checks from etcd")?;

    let api_config = ApiConfig {
        bind_addr: opts.status_addr(),
        ..Default::default()
    };
    spawn_api_server(api_config, ApiState::new(manager.current())).await?;

    let reporter = match opts.metrics_credentials() {
        Some((user, token)) => {
            info!("starting metrics");
            Some(MetricsHandle::spawn(
                metrics,
                ReporterConfig::librato(user, token, hostname()),
            ))
        }
        None => {
            warn!("no metrics credentials, latency is not reported");
            None
        }
    };

    tokio::select! {
        _ = run_reload_loop(store.clone(), manager.clone(), checks_path, changes) => {
            error!("reload loop ended, shutting down");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("failed to listen for shutdown signal: {e}");
            }
            info!("shutdown requested");
        }
    }

    manager.shutdown().await;
    if let Some(reporter) = reporter {
        match reporter.shutdown().await {
            Ok(count) => info!("pushed {count} gauges before exit"),
            Err(e) => error!("final metrics push failed: {e:#}"),
        }
    }

    Ok(())
}
