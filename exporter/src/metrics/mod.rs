//! Metrics sink and Prometheus registry.
//!
//! Everything that writes metrics goes through the name-keyed
//! [`MetricSink`] trait. The production implementation is
//! [`MetricsRegistry`], which also renders the Prometheus text exposition
//! served on `/metrics`.
//!
//! ```ignore
//! use std::sync::Arc;
//! use exporter::metrics::{MetricSink, MetricsRegistry, catalog};
//!
//! let registry = Arc::new(MetricsRegistry::new("bitcoin", &[-1, 1, 120], &[2, 3, 5, 20])?);
//! registry.set_gauge(catalog::BLOCKS, &[], 840_000.0)?;
//! let body = registry.gather_text();
//! ```

pub mod catalog;
pub mod prometheus;

use thiserror::Error;
use tracing::warn;

pub use self::prometheus::MetricsRegistry;

/// Errors raised when writing to the metric sink.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("unknown metric `{0}`")]
    UnknownMetric(String),
    #[error("counter `{name}` cannot be incremented by {delta}")]
    NegativeDelta { name: String, delta: f64 },
    #[error(transparent)]
    Prometheus(#[from] ::prometheus::Error),
}

/// Write-only view of the metric registry.
///
/// `labels` are the metric-specific label values in catalog order; the
/// `blockchain` label is supplied by the sink itself.
pub trait MetricSink: Send + Sync {
    fn set_gauge(&self, name: &str, labels: &[&str], value: f64) -> Result<(), MetricsError>;
    fn inc_counter(&self, name: &str, labels: &[&str], delta: f64) -> Result<(), MetricsError>;
}

/// Bumps the exporter error counter for `kind`.
///
/// A failure to count is only logged: losing one increment must never turn
/// into a failed task.
pub fn count_error(sink: &dyn MetricSink, kind: &str) {
    if let Err(e) = sink.inc_counter(catalog::EXPORTER_ERRORS, &[kind], 1.0) {
        warn!(kind, "failed to count exporter error: {e}");
    }
}

#[cfg(test)]
pub(crate) use recording::RecordingSink;
