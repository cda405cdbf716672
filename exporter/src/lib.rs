//! UTXO node exporter library crate.
//!
//! Polls a UTXO-model blockchain node over JSON-RPC and publishes what it
//! finds as Prometheus metrics. Polling is driven by scrapes: each scrape
//! triggers at most one rate-limited refresh pass.
//!
//! - configuration from the environment (`config`),
//! - JSON-RPC transport and bounded retry (`rpc`),
//! - metric catalog and Prometheus registry (`metrics`),
//! - payload-to-metric mapping (`sink`),
//! - fetch tasks and the ordered task registry (`tasks`),
//! - the refresh coordinator (`refresh`).
//!
//! The HTTP surface lives in the `scrape-gateway` binary.

pub mod config;
pub mod metrics;
pub mod refresh;
pub mod rpc;
pub mod sink;
pub mod tasks;

pub use config::{ConfigError, ExporterConfig, MetricsConfig, RpcConfig, RpcEndpoint};
pub use metrics::{MetricSink, MetricsError, MetricsRegistry};
pub use refresh::{FatalError, RefreshCoordinator, RefreshOutcome, RefreshReport};
pub use rpc::{HttpRpcClient, RetryPolicy, RpcCredentials, RpcError, RpcInvoker, RpcTransport};
pub use sink::{MetricSinkAdapter, Payload, SinkError};
pub use tasks::{Fetcher, TaskError, TaskFlags, TaskKind, TaskRegistry};

use std::sync::Arc;

/// Production refresh stack: the Prometheus registry plus a coordinator
/// whose tasks talk to the node over HTTP.
pub struct Exporter {
    pub registry: Arc<MetricsRegistry>,
    pub coordinator: Arc<RefreshCoordinator>,
}

/// Errors raised while assembling the [`Exporter`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl Exporter {
    /// Wires registry, HTTP client, invoker, adapter and tasks from `cfg`.
    pub fn from_config(cfg: &ExporterConfig) -> Result<Self, BuildError> {
        let endpoint = cfg.rpc.endpoint()?;
        let client = HttpRpcClient::new(endpoint.url, endpoint.credentials, cfg.timeout)?;
        Self::with_transport(cfg, client)
    }

    /// Same as [`Exporter::from_config`] but over an arbitrary transport.
    pub fn with_transport<T>(cfg: &ExporterConfig, transport: T) -> Result<Self, BuildError>
    where
        T: RpcTransport + 'static,
    {
        let registry = Arc::new(MetricsRegistry::new(
            &cfg.blockchain,
            &cfg.hashps_windows,
            &cfg.smartfee_windows,
        )?);
        let sink: Arc<dyn MetricSink> = registry.clone();

        let invoker = RpcInvoker::new(transport, cfg.retry_policy(), sink.clone());
        let adapter =
            MetricSinkAdapter::new(sink.clone()).with_ban_reason_default(&cfg.ban_reason_default);
        let fetcher = Arc::new(Fetcher::new(
            invoker,
            adapter,
            cfg.hashps_windows.clone(),
            cfg.smartfee_windows.clone(),
        ));

        let tasks = TaskRegistry::for_fetcher(&cfg.tasks, fetcher);
        let coordinator = Arc::new(RefreshCoordinator::new(tasks, sink, cfg.rate_limit));

        Ok(Self {
            registry,
            coordinator,
        })
    }
}
