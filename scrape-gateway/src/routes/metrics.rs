use std::time::Instant;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::state::SharedState;

/// Content type of the Prometheus text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// `GET /metrics`
///
/// Refreshes node metrics (subject to the rate limit) on a blocking worker
/// and returns the whole registry. Task failures never change the response;
/// a fatal error is handed to the driver and this request is never answered.
pub async fn metrics(State(state): State<SharedState>) -> Response {
    let now = Instant::now();
    let coordinator = state.coordinator.clone();

    match tokio::task::spawn_blocking(move || coordinator.maybe_refresh(now)).await {
        Ok(Ok(_)) => {}
        Ok(Err(fatal)) => {
            if state.fatal_tx.send(fatal).is_err() {
                error!("fatal refresh error but the driver is gone");
            }
            return std::future::pending().await;
        }
        Err(e) => error!("refresh worker failed: {e}"),
    }

    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.registry.gather_text(),
    )
        .into_response()
}
