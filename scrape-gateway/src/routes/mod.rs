//! HTTP routes.

pub mod health;
pub mod metrics;

use axum::{Router, routing::get};

use crate::state::SharedState;

/// Builds the gateway router: `GET /metrics` and `GET /health`.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/metrics", get(metrics::metrics))
        .route("/health", get(health::health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use tower::ServiceExt;

    use exporter::metrics::catalog;
    use exporter::tasks::FetchTask;
    use exporter::{
        FatalError, MetricSink, MetricsRegistry, RefreshCoordinator, RpcError, SinkError,
        TaskError, TaskRegistry,
    };

    fn app(
        rate_limit: Duration,
        tasks: impl FnOnce(Arc<MetricsRegistry>) -> Vec<FetchTask>,
    ) -> (Router, UnboundedReceiver<FatalError>) {
        let registry = Arc::new(MetricsRegistry::new("bitcoin", &[120], &[2]).unwrap());
        let tasks = TaskRegistry::from_tasks(tasks(registry.clone()));
        let coordinator = Arc::new(RefreshCoordinator::new(tasks, registry.clone(), rate_limit));
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AppState {
            registry,
            coordinator,
            fatal_tx,
        });
        (router(state), fatal_rx)
    }

    fn uptime_task(registry: Arc<MetricsRegistry>, runs: Arc<AtomicUsize>) -> FetchTask {
        FetchTask::new("uptime", move || {
            let n = runs.fetch_add(1, Ordering::SeqCst) + 1;
            registry
                .set_gauge(catalog::UPTIME, &[], 40.0 + n as f64)
                .map_err(SinkError::from)?;
            Ok(())
        })
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _fatal_rx) = app(Duration::from_secs(5), |_| Vec::new());
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (app, _fatal_rx) = app(Duration::from_secs(5), |_| Vec::new());
        let response = app.oneshot(get("/models")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn scrape_refreshes_and_serves_text_format() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task_runs = runs.clone();
        let (app, _fatal_rx) = app(Duration::from_secs(5), move |registry| {
            vec![uptime_task(registry, task_runs)]
        });

        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            metrics::PROMETHEUS_CONTENT_TYPE
        );
        let body = body_text(response).await;
        assert!(body.contains(r#"utxo_node_uptime{blockchain="bitcoin"} 41"#), "{body}");
        assert!(body.contains("utxo_node_exporter_process_time_total"), "{body}");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn scrapes_inside_rate_limit_serve_same_values() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task_runs = runs.clone();
        let (app, _fatal_rx) = app(Duration::from_secs(60), move |registry| {
            vec![uptime_task(registry, task_runs)]
        });

        let first = body_text(app.clone().oneshot(get("/metrics")).await.unwrap()).await;
        let second = body_text(app.oneshot(get("/metrics")).await.unwrap()).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(second.contains(r#"utxo_node_uptime{blockchain="bitcoin"} 41"#));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failing_tasks_still_answer_200() {
        let (app, mut fatal_rx) = app(Duration::from_secs(5), |_| {
            vec![FetchTask::new("uptime", || {
                Err(TaskError::Rpc(RpcError::RetryExhausted {
                    attempts: 5,
                    last: Box::new(RpcError::Timeout("timed out".into())),
                }))
            })]
        });

        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(
            body.contains(
                r#"utxo_node_exporter_errors_total{blockchain="bitcoin",type="rpc.RetryExhausted"} 1"#
            ),
            "{body}"
        );
        assert!(fatal_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fatal_error_goes_to_driver_without_answer() {
        let (app, mut fatal_rx) = app(Duration::from_secs(5), |_| {
            vec![FetchTask::new("meminfo", || {
                Err(TaskError::Rpc(RpcError::Decode("not JSON".into())))
            })]
        });

        let pending = tokio::time::timeout(Duration::from_millis(200), app.oneshot(get("/metrics")));
        assert!(pending.await.is_err(), "fatal scrape must not be answered");

        let fatal = fatal_rx.recv().await.unwrap();
        assert_eq!(fatal.task, "meminfo");
        assert!(fatal.source.is_fatal());
    }
}
