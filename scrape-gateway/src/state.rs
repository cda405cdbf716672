//! Shared application state.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use exporter::{FatalError, MetricsRegistry, RefreshCoordinator};

/// State shared by all request handlers.
///
/// This is wrapped in an [`Arc`] and passed to request handlers via Axum's
/// `State` extractor.
pub struct AppState {
    /// Registry serialized on every scrape.
    pub registry: Arc<MetricsRegistry>,
    /// Rate-limited refresh of all enabled fetch tasks.
    pub coordinator: Arc<RefreshCoordinator>,
    /// Fatal refresh errors go to the driver, which ends the process.
    pub fatal_tx: UnboundedSender<FatalError>,
}

/// Thread-safe alias for `AppState`.
pub type SharedState = Arc<AppState>;
