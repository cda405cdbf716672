//! Task bodies: which RPC calls each task makes and how results flow into
//! the sink adapter.

use std::sync::{Mutex, PoisonError};

use serde_json::{Value, json};
use tracing::error;

use super::error::TaskError;
use super::registry::TaskKind;
use crate::metrics::count_error;
use crate::rpc::{RpcInvoker, RpcTransport};
use crate::sink::{MetricSinkAdapter, Payload, SinkError};

/// Fields requested from `getblockstats`.
pub const BLOCKSTATS_FIELDS: [&str; 8] = [
    "total_size",
    "total_weight",
    "totalfee",
    "txs",
    "height",
    "ins",
    "outs",
    "total_out",
];

/// Runs fetch tasks against one node.
pub struct Fetcher<T> {
    invoker: RpcInvoker<T>,
    adapter: MetricSinkAdapter,
    hashps_windows: Vec<i64>,
    smartfee_windows: Vec<i64>,
    /// Stats of the last best block, keyed by block hash.
    blockstats_cache: Mutex<Option<(String, Value)>>,
}

impl<T: RpcTransport> Fetcher<T> {
    pub fn new(
        invoker: RpcInvoker<T>,
        adapter: MetricSinkAdapter,
        hashps_windows: Vec<i64>,
        smartfee_windows: Vec<i64>,
    ) -> Self {
        Self {
            invoker,
            adapter,
            hashps_windows,
            smartfee_windows,
            blockstats_cache: Mutex::new(None),
        }
    }

    pub fn invoker(&self) -> &RpcInvoker<T> {
        &self.invoker
    }

    /// Runs the task `kind` once.
    pub fn fetch(&self, kind: TaskKind) -> Result<(), TaskError> {
        match kind {
            TaskKind::Uptime => self.simple(Payload::Uptime, &[]),
            TaskKind::MemInfo => self.simple(Payload::MemInfo, &[json!("stats")]),
            TaskKind::BlockchainInfo => self.simple(Payload::BlockchainInfo, &[]),
            TaskKind::BlockStats => self.fetch_blockstats(),
            TaskKind::NetworkInfo => self.simple(Payload::NetworkInfo, &[]),
            TaskKind::ChainTips => self.simple(Payload::ChainTips, &[]),
            TaskKind::MempoolInfo => self.simple(Payload::MempoolInfo, &[]),
            TaskKind::NetTotals => self.simple(Payload::NetTotals, &[]),
            TaskKind::RpcInfo => self.simple(Payload::RpcInfo, &[]),
            TaskKind::TxStats => self.simple(Payload::TxStats, &[]),
            TaskKind::Banned => self.simple(Payload::Banned, &[]),
            TaskKind::SmartFees => {
                for &n in &self.smartfee_windows {
                    self.simple(Payload::SmartFee(n), &[json!(n)])?;
                }
                Ok(())
            }
            TaskKind::HashpBlocks => {
                for &n in &self.hashps_windows {
                    self.simple(Payload::NetworkHashps(n), &[json!(n)])?;
                }
                Ok(())
            }
        }
    }

    fn simple(&self, payload: Payload, params: &[Value]) -> Result<(), TaskError> {
        let result = self.invoker.invoke(payload.method(), params)?;
        self.adapter.apply(payload, &result)?;
        Ok(())
    }

    fn fetch_blockstats(&self) -> Result<(), TaskError> {
        let info = self.invoker.invoke("getblockchaininfo", &[])?;
        if info.is_null() {
            return Ok(());
        }
        let hash = info
            .get("bestblockhash")
            .and_then(Value::as_str)
            .ok_or(SinkError::MissingField {
                payload: "getblockchaininfo",
                field: "bestblockhash",
            })?;

        let Some(stats) = self.blockstats(hash)? else {
            return Ok(());
        };
        self.adapter.apply(Payload::BlockStats, &stats)?;
        Ok(())
    }

    /// Stats for `hash`, served from the one-entry cache when the best block
    /// has not changed. A non-fatal failure is logged and counted and yields
    /// `None` so the task skips its writes.
    fn blockstats(&self, hash: &str) -> Result<Option<Value>, TaskError> {
        let mut cache = self
            .blockstats_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some((cached_hash, stats)) = cache.as_ref() {
            if cached_hash == hash {
                return Ok(Some(stats.clone()));
            }
        }

        let params = [json!(hash), json!(BLOCKSTATS_FIELDS)];
        match self.invoker.invoke("getblockstats", &params) {
            Ok(stats) => {
                *cache = Some((hash.to_string(), stats.clone()));
                Ok(Some(stats))
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                error!(block = hash, "failed to retrieve block statistics from node: {e}");
                count_error(self.adapter.sink().as_ref(), e.kind());
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingSink;
    use crate::metrics::catalog;
    use crate::rpc::{RetryPolicy, RpcError};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    /// Transport answering from a method → result table and logging calls.
    #[derive(Default)]
    struct TableTransport {
        answers: HashMap<String, Value>,
        failures: HashMap<String, i64>,
        calls: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl TableTransport {
        fn answer(mut self, method: &str, result: Value) -> Self {
            self.answers.insert(method.to_string(), result);
            self
        }

        fn fail(mut self, method: &str, code: i64) -> Self {
            self.failures.insert(method.to_string(), code);
            self
        }

        fn calls_to(&self, method: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, _)| m == method)
                .count()
        }
    }

    impl RpcTransport for TableTransport {
        fn call(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params.to_vec()));
            if let Some(code) = self.failures.get(method) {
                return Err(RpcError::Rpc {
                    code: *code,
                    message: format!("{method} failed"),
                });
            }
            Ok(self.answers.get(method).cloned().unwrap_or(Value::Null))
        }
    }

    fn fetcher(transport: TableTransport) -> (Arc<RecordingSink>, Fetcher<TableTransport>) {
        let sink = Arc::new(RecordingSink::default());
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        let invoker = RpcInvoker::new(transport, policy, sink.clone());
        let adapter = MetricSinkAdapter::new(sink.clone());
        (sink, Fetcher::new(invoker, adapter, vec![-1, 120], vec![2, 20]))
    }

    fn blockstats_json() -> Value {
        json!({
            "total_size": 1000, "total_weight": 4000, "totalfee": 5000, "txs": 3,
            "height": 100, "ins": 4, "outs": 6, "total_out": 250_000_000i64
        })
    }

    #[test]
    fn meminfo_requests_stats_mode() {
        let (_sink, fetcher) = fetcher(TableTransport::default());
        fetcher.fetch(TaskKind::MemInfo).unwrap();
        let calls = fetcher.invoker().transport().calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("getmemoryinfo".to_string(), vec![json!("stats")])]);
    }

    #[test]
    fn hashp_blocks_fans_out_over_windows() {
        let transport = TableTransport::default().answer("getnetworkhashps", json!(1.0e20));
        let (sink, fetcher) = fetcher(transport);
        fetcher.fetch(TaskKind::HashpBlocks).unwrap();

        let calls = fetcher.invoker().transport().calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("getnetworkhashps".to_string(), vec![json!(-1)]),
                ("getnetworkhashps".to_string(), vec![json!(120)]),
            ]
        );
        assert_eq!(sink.gauge("hashps_neg1", &[]), Some(1.0e20));
        assert_eq!(sink.gauge("hashps", &[]), Some(1.0e20));
    }

    #[test]
    fn smart_fees_fan_out_over_windows() {
        let transport =
            TableTransport::default().answer("estimatesmartfee", json!({"feerate": 0.0002}));
        let (sink, fetcher) = fetcher(transport);
        fetcher.fetch(TaskKind::SmartFees).unwrap();
        assert_eq!(sink.gauge("est_smart_fee_2", &[]), Some(0.0002));
        assert_eq!(sink.gauge("est_smart_fee_20", &[]), Some(0.0002));
    }

    #[test]
    fn blockstats_are_cached_per_block_hash() {
        let transport = TableTransport::default()
            .answer("getblockchaininfo", json!({"bestblockhash": "00ab"}))
            .answer("getblockstats", blockstats_json());
        let (sink, fetcher) = fetcher(transport);

        fetcher.fetch(TaskKind::BlockStats).unwrap();
        fetcher.fetch(TaskKind::BlockStats).unwrap();

        let transport = fetcher.invoker().transport();
        assert_eq!(transport.calls_to("getblockchaininfo"), 2);
        assert_eq!(transport.calls_to("getblockstats"), 1);
        assert_eq!(sink.gauge(catalog::LATEST_BLOCK_VALUE, &[]), Some(2.5));
    }

    #[test]
    fn blockstats_failure_is_counted_and_skipped() {
        let transport = TableTransport::default()
            .answer("getblockchaininfo", json!({"bestblockhash": "00ab"}))
            .fail("getblockstats", -5);
        let (sink, fetcher) = fetcher(transport);

        fetcher
            .fetch(TaskKind::BlockStats)
            .expect("blockstats failure is not a task failure");
        assert_eq!(sink.gauge(catalog::LATEST_BLOCK_HEIGHT, &[]), None);
        assert_eq!(sink.counter(catalog::EXPORTER_ERRORS, &["rpc.Rpc"]), 1.0);
    }

    #[test]
    fn missing_best_block_hash_fails_task() {
        let transport = TableTransport::default().answer("getblockchaininfo", json!({"blocks": 1}));
        let (_sink, fetcher) = fetcher(transport);
        let err = fetcher.fetch(TaskKind::BlockStats).unwrap_err();
        assert!(matches!(err, TaskError::Sink(SinkError::MissingField { .. })));
        assert!(!err.is_fatal());
    }

    #[test]
    fn application_error_surfaces_as_task_error() {
        let transport = TableTransport::default().fail("getchaintxstats", -1);
        let (_sink, fetcher) = fetcher(transport);
        let err = fetcher.fetch(TaskKind::TxStats).unwrap_err();
        assert_eq!(err.kind(), "rpc.Rpc");
        assert!(!err.is_fatal());
    }
}
