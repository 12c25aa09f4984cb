//! HealthSphere Server
//!
//! Disease prediction over HTTP. Model artifacts are fetched on first use,
//! decoded once and kept in memory for subsequent requests.

use anyhow::Result;
use clap::Parser;
use healthsphere_server::{create_router, AppState, Cli, ServiceConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("Starting HealthSphere disease prediction service");

    let config = ServiceConfig::load(&cli)?;
    info!("Configuration loaded successfully");

    let metrics_handle = init_metrics()?;

    let state = AppState::from_config(&config, Some(metrics_handle))?;
    info!(
        "Available models: {}",
        state.available_models().join(", ")
    );

    if !config.preload.is_empty() {
        state.dispatcher.store().preload(&config.preload).await;
    }

    let addr: SocketAddr = format!("{}:{}", config.listen, config.port).parse()?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("healthsphere=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("healthsphere=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "healthsphere_predictions_total",
        "Prediction requests by model and outcome"
    );
    metrics::describe_counter!(
        "healthsphere_artifact_downloads_total",
        "Artifact download attempts by model and outcome"
    );
    metrics::describe_counter!(
        "healthsphere_cache_lookups_total",
        "Model cache lookups by model and hit/miss"
    );
    metrics::describe_histogram!(
        "healthsphere_prediction_latency_us",
        metrics::Unit::Microseconds,
        "End-to-end prediction latency in microseconds"
    );
    metrics::describe_histogram!(
        "healthsphere_inference_latency_us",
        metrics::Unit::Microseconds,
        "Model forward pass latency in microseconds"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
