//! Scrape gateway binary.
//!
//! Serves the exporter's metrics over HTTP:
//!
//! - `GET /metrics` refreshes node metrics (rate-limited) and returns them
//!   in the Prometheus text format,
//! - `GET /health` answers liveness probes.
//!
//! There is no background polling; every refresh is triggered by a scrape.
//! A fatal refresh error (the node answered with something that is not
//! JSON-RPC) terminates the process with status 1.

mod routes;
mod state;

use std::sync::Arc;

use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use exporter::{Exporter, ExporterConfig};
use state::{AppState, SharedState};

#[tokio::main]
async fn main() {
    let cfg = match ExporterConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("fatal error: invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let directive = cfg.log_directive();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("scrape_gateway={directive},exporter={directive}"))
        }))
        .init();

    if let Err(e) = run(cfg).await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: ExporterConfig) -> Result<(), String> {
    let exporter =
        Exporter::from_config(&cfg).map_err(|e| format!("failed to initialise exporter: {e}"))?;
    info!(
        blockchain = %cfg.blockchain,
        tasks = ?exporter.coordinator.tasks().names(),
        "enabled fetch tasks"
    );

    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
    let app_state: SharedState = Arc::new(AppState {
        registry: exporter.registry,
        coordinator: exporter.coordinator,
        fatal_tx,
    });
    let app = routes::router(app_state);

    let addr = cfg.metrics.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("failed to bind {addr}: {e}"))?;
    info!("exporter listening on http://{addr}/metrics");

    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };

    tokio::select! {
        res = server => res.map_err(|e| format!("metrics server error: {e}")),
        Some(fatal) = fatal_rx.recv() => {
            error!(task = fatal.task, "shutting down after fatal error");
            Err(fatal.to_string())
        }
    }
}

/// Waits for Ctrl-C or SIGTERM, used for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
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
    info!("shutdown signal received");
}
