use anyhow::Result;
use axum::serve;
use sanctos_core::{
    config::AppConfig,
    indexer::IndexerProxy,
    metrics::MetricsCollector,
    proxy::ProxyEngineBuilder,
    stats::{spawn_stats_actor, storage_from_config},
    upstream::{HttpClient, UpstreamRegistry},
    utils::{SharedClock, SystemClock},
};
use server::{create_app, AppState};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for the stats actor to apply queued events.
const STATS_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging(config: &AppConfig) {
    let filter = match std::env::var("RUST_LOG").as_deref() {
        Ok("debug") => EnvFilter::new("warn,sanctos_core=debug,server=debug"),
        Ok("trace") => EnvFilter::new("warn,sanctos_core=trace,server=trace"),
        Ok(_) => EnvFilter::try_from_env("RUST_LOG")
            .unwrap_or_else(|_| EnvFilter::new("warn,sanctos_core=info,server=info")),
        Err(_) => EnvFilter::new(format!(
            "warn,sanctos_core={level},server={level}",
            level = config.logging.level
        )),
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        // "pretty" and any other format default to pretty logging
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        AppConfig::load().map_err(|e| anyhow::anyhow!("Configuration load failed: {e}"))?;
    config.validate().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    init_logging(&config);
    info!(build = sanctos_core::types::BUILD_ID, "Starting SanctOS RPC edge node");

    let clock: SharedClock = Arc::new(SystemClock);
    let metrics = Arc::new(
        MetricsCollector::new().map_err(|e| anyhow::anyhow!("Failed to initialize metrics: {e}"))?,
    );
    let http_client = Arc::new(
        HttpClient::with_concurrency_limit(config.upstreams.concurrent_limit)
            .map_err(|e| anyhow::anyhow!("HTTP client initialization failed: {e}"))?,
    );

    let registry =
        Arc::new(UpstreamRegistry::resolve(&config.upstreams, |name| std::env::var(name).ok()));
    info!(upstreams = ?registry.labels(), "Upstreams resolved");
    debug!(urls = ?registry.redacted_urls(), "Upstream endpoints");

    let (stats, stats_task) =
        spawn_stats_actor(storage_from_config(&config.stats), Arc::clone(&clock), &config.stats);

    let engine = ProxyEngineBuilder::new()
        .registry(registry)
        .http_client(Arc::clone(&http_client))
        .upstreams_config(&config.upstreams)
        .cache_config(config.cache.clone())
        .stats(stats)
        .clock(Arc::clone(&clock))
        .metrics(Arc::clone(&metrics))
        .build()
        .map_err(|e| anyhow::anyhow!("Proxy engine initialization failed: {e}"))?;

    let indexer = Arc::new(IndexerProxy::new(config.indexer.clone(), http_client, metrics));
    if config.indexer.is_enabled() {
        let timeout_ms = config.indexer.timeout().as_millis() as u64;
        info!(timeout_ms, "Indexer passthrough enabled");
    }

    let addr: SocketAddr =
        config.socket_addr().map_err(|e| anyhow::anyhow!("Invalid bind address: {e}"))?;
    let state = AppState::new(engine, indexer, Arc::new(config), clock);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "RPC edge node listening");

    if let Err(e) = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error occurred");
    }

    // The actor exits once every handle is gone and its queue is drained.
    match tokio::time::timeout(STATS_DRAIN_TIMEOUT, stats_task).await {
        Ok(Ok(())) => debug!("Stats actor drained"),
        Ok(Err(e)) => warn!(error = %e, "Stats actor task failed"),
        Err(_) => warn!("Stats actor still busy at shutdown, queued events may be lost"),
    }
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
