//! Prometheus-backed metric registry.
//!
//! [`MetricsRegistry`] owns a Prometheus registry holding every family in
//! the catalog, keyed by name so the sink adapter can write through the
//! name-based [`MetricSink`] interface. The `blockchain` label is a registry
//! constant label, so it is present on every sample without callers passing
//! it.

use std::collections::{BTreeSet, HashMap};

use prometheus::proto::MetricType;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::error;

use super::catalog::{
    self, BLOCKCHAIN_LABEL, MetricDef, NAMESPACE, hashps_gauge_help, hashps_gauge_name,
    smartfee_gauge_help, smartfee_gauge_name,
};
use super::{MetricSink, MetricsError};

/// Wrapper around a Prometheus registry and the exporter's metric families.
///
/// This is the handle the entry point creates once and shares (behind an
/// `Arc`) with the invoker, the sink adapter and the scrape handler.
pub struct MetricsRegistry {
    registry: Registry,
    blockchain: String,
    gauges: HashMap<String, GaugeVec>,
    counters: HashMap<String, CounterVec>,
}

impl MetricsRegistry {
    /// Creates a registry with every catalog metric plus one hash-rate gauge
    /// per entry of `hashps_windows` and one smart-fee gauge per entry of
    /// `smartfee_windows`.
    pub fn new(
        blockchain: &str,
        hashps_windows: &[i64],
        smartfee_windows: &[i64],
    ) -> Result<Self, MetricsError> {
        let const_labels = HashMap::from([(BLOCKCHAIN_LABEL.to_string(), blockchain.to_string())]);
        let registry = Registry::new_custom(Some(NAMESPACE.to_string()), Some(const_labels))?;

        let mut this = Self {
            registry,
            blockchain: blockchain.to_string(),
            gauges: HashMap::new(),
            counters: HashMap::new(),
        };

        for def in catalog::GAUGES {
            this.register_gauge(def.name.to_string(), def.help.to_string(), def.labels)?;
        }
        for def in catalog::COUNTERS {
            this.register_counter(def)?;
        }

        let hashps: BTreeSet<i64> = hashps_windows.iter().copied().collect();
        for n in hashps {
            this.register_gauge(hashps_gauge_name(n), hashps_gauge_help(n), &[])?;
        }
        let smartfee: BTreeSet<i64> = smartfee_windows.iter().copied().collect();
        for n in smartfee {
            this.register_gauge(smartfee_gauge_name(n), smartfee_gauge_help(n), &[])?;
        }

        Ok(this)
    }

    fn register_gauge(
        &mut self,
        name: String,
        help: String,
        labels: &[&str],
    ) -> Result<(), MetricsError> {
        let gauge = GaugeVec::new(Opts::new(name.clone(), help), labels)?;
        self.registry.register(Box::new(gauge.clone()))?;
        self.gauges.insert(name, gauge);
        Ok(())
    }

    fn register_counter(&mut self, def: &MetricDef) -> Result<(), MetricsError> {
        let counter = CounterVec::new(Opts::new(def.name, def.help), def.labels)?;
        self.registry.register(Box::new(counter.clone()))?;
        self.counters.insert(def.name.to_string(), counter);
        Ok(())
    }

    /// Value of the `blockchain` label attached to every sample.
    pub fn blockchain(&self) -> &str {
        &self.blockchain
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Reads back the current value of a gauge or counter sample, if it has
    /// ever been written. `labels` are the metric-specific label pairs.
    pub fn sample(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let full_name = format!("{NAMESPACE}_{name}");
        let family = self
            .registry
            .gather()
            .into_iter()
            .find(|mf| mf.get_name() == full_name)?;

        family
            .get_metric()
            .iter()
            .find(|m| {
                let pairs = m.get_label();
                labels.iter().all(|(k, v)| {
                    pairs
                        .iter()
                        .any(|lp| lp.get_name() == *k && lp.get_value() == *v)
                })
            })
            .map(|m| match family.get_field_type() {
                MetricType::COUNTER => m.get_counter().get_value(),
                _ => m.get_gauge().get_value(),
            })
    }
}

impl MetricSink for MetricsRegistry {
    fn set_gauge(&self, name: &str, labels: &[&str], value: f64) -> Result<(), MetricsError> {
        let gauge = self
            .gauges
            .get(name)
            .ok_or_else(|| MetricsError::UnknownMetric(name.to_string()))?;
        gauge.get_metric_with_label_values(labels)?.set(value);
        Ok(())
    }

    fn inc_counter(&self, name: &str, labels: &[&str], delta: f64) -> Result<(), MetricsError> {
        let counter = self
            .counters
            .get(name)
            .ok_or_else(|| MetricsError::UnknownMetric(name.to_string()))?;
        if !(delta >= 0.0) {
            return Err(MetricsError::NegativeDelta {
                name: name.to_string(),
                delta,
            });
        }
        counter.get_metric_with_label_values(labels)?.inc_by(delta);
        Ok(())
    }
}
