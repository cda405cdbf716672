//! Bounded retry around a single upstream call.
//!
//! Only transient failures (warm-up, connection, timeout) are retried. The
//! whole sequence is bounded both by a maximum attempt count and by one
//! overall deadline; whichever is hit first ends it with
//! [`RpcError::RetryExhausted`].

use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::Value;
use tracing::{Level, debug, enabled, error};

use super::RpcTransport;
use super::error::RpcError;
use crate::metrics::{MetricSink, count_error};

/// Retry policy applied to every upstream call.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Deadline for the whole retry sequence, not per attempt.
    pub timeout: Duration,
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Upper bound for a single delay (before jitter).
    pub max_backoff: Duration,
    /// Each delay is scaled by a random factor in `1 ± jitter`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(5),
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let base = self.initial_backoff.as_secs_f64() * exp;
        let capped = base.min(self.max_backoff.as_secs_f64());
        let factor = if self.jitter > 0.0 {
            rand::thread_rng().gen_range((1.0 - self.jitter).max(0.0)..=1.0 + self.jitter)
        } else {
            1.0
        };
        Duration::from_secs_f64(capped * factor)
    }
}

/// Issues upstream calls through a transport, retrying transient failures.
pub struct RpcInvoker<T> {
    transport: T,
    policy: RetryPolicy,
    sink: Arc<dyn MetricSink>,
}

impl<T: RpcTransport> RpcInvoker<T> {
    pub fn new(transport: T, policy: RetryPolicy, sink: Arc<dyn MetricSink>) -> Self {
        Self {
            transport,
            policy,
            sink,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Calls `method` with positional `params`.
    ///
    /// Every failed transient attempt is logged and counted under its own
    /// error kind, whether or not a later attempt succeeds. Each attempt is
    /// given only what is left of the overall timeout.
    pub fn invoke(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        if enabled!(Level::DEBUG) {
            let args: Vec<String> = params.iter().map(Value::to_string).collect();
            debug!("RPC call: {method} {}", args.join(" "));
        }

        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let remaining = self.policy.timeout.saturating_sub(started.elapsed());
            let err = match self.transport.call_within(method, params, remaining) {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            count_error(self.sink.as_ref(), err.kind());

            let elapsed = started.elapsed();
            let delay = self.policy.backoff(attempt);
            let out_of_attempts = attempt >= self.policy.max_attempts;
            let out_of_time = elapsed + delay >= self.policy.timeout;

            if out_of_attempts || out_of_time {
                error!(
                    method,
                    attempt,
                    elapsed = ?elapsed,
                    kind = err.kind(),
                    "giving up after exception: {err}"
                );
                return Err(RpcError::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            error!(
                method,
                attempt,
                next_try = ?delay,
                kind = err.kind(),
                "retry after exception: {err}"
            );
            sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingSink;
    use crate::metrics::catalog::EXPORTER_ERRORS;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport replaying a scripted sequence of outcomes.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<Value, RpcError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<Value, RpcError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RpcTransport for ScriptedTransport {
        fn call(&self, _method: &str, _params: &[Value]) -> Result<Value, RpcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RpcError::Connection("script exhausted".into())))
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(4),
            jitter: 0.0,
        }
    }

    fn timeout() -> RpcError {
        RpcError::Timeout("timed out".into())
    }

    #[test]
    fn transient_failures_then_success_counts_each_attempt() {
        let sink = Arc::new(RecordingSink::default());
        let transport = ScriptedTransport::new(vec![
            Err(timeout()),
            Err(timeout()),
            Err(timeout()),
            Ok(json!(42)),
        ]);
        let invoker = RpcInvoker::new(transport, fast_policy(5), sink.clone());

        let result = invoker.invoke("uptime", &[]).expect("call should succeed");
        assert_eq!(result, json!(42));
        assert_eq!(invoker.transport().calls.load(Ordering::SeqCst), 4);
        assert_eq!(sink.counter(EXPORTER_ERRORS, &["rpc.Timeout"]), 3.0);
    }

    /// Transport that records the per-attempt budget it was given.
    struct BudgetTransport {
        inner: ScriptedTransport,
        budgets: Mutex<Vec<Duration>>,
    }

    impl RpcTransport for BudgetTransport {
        fn call(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
            self.inner.call(method, params)
        }

        fn call_within(
            &self,
            method: &str,
            params: &[Value],
            timeout: Duration,
        ) -> Result<Value, RpcError> {
            self.budgets.lock().unwrap().push(timeout);
            self.inner.call(method, params)
        }
    }

    #[test]
    fn each_attempt_gets_only_the_remaining_budget() {
        let sink = Arc::new(RecordingSink::default());
        let transport = BudgetTransport {
            inner: ScriptedTransport::new(vec![Err(timeout()), Err(timeout()), Ok(json!(1))]),
            budgets: Mutex::new(Vec::new()),
        };
        let policy = fast_policy(5);
        let overall = policy.timeout;
        let invoker = RpcInvoker::new(transport, policy, sink);

        invoker.invoke("uptime", &[]).expect("call should succeed");

        let budgets = invoker.transport().budgets.lock().unwrap().clone();
        assert_eq!(budgets.len(), 3);
        assert!(budgets[0] <= overall);
        assert!(budgets[1] < budgets[0], "{budgets:?}");
        assert!(budgets[2] < budgets[1], "{budgets:?}");
    }

    #[test]
    fn attempt_bound_ends_in_retry_exhausted() {
        let sink = Arc::new(RecordingSink::default());
        let transport = ScriptedTransport::new(vec![
            Err(RpcError::Connection("refused".into())),
            Err(RpcError::Connection("refused".into())),
            Err(RpcError::Connection("refused".into())),
        ]);
        let invoker = RpcInvoker::new(transport, fast_policy(3), sink.clone());

        match invoker.invoke("getblockchaininfo", &[]).unwrap_err() {
            RpcError::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, RpcError::Connection(_)));
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
        assert_eq!(invoker.transport().calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.counter(EXPORTER_ERRORS, &["rpc.Connection"]), 3.0);
    }

    #[test]
    fn overall_timeout_ends_sequence_before_attempt_bound() {
        let sink = Arc::new(RecordingSink::default());
        let transport = ScriptedTransport::new(Vec::new());
        let policy = RetryPolicy {
            timeout: Duration::from_millis(30),
            max_attempts: 1_000,
            initial_backoff: Duration::from_millis(10),
            multiplier: 1.0,
            max_backoff: Duration::from_millis(10),
            jitter: 0.0,
        };
        let invoker = RpcInvoker::new(transport, policy, sink);

        let err = invoker.invoke("uptime", &[]).unwrap_err();
        match err {
            RpcError::RetryExhausted { attempts, .. } => assert!(attempts < 10),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn application_error_is_not_retried_or_counted() {
        let sink = Arc::new(RecordingSink::default());
        let transport = ScriptedTransport::new(vec![Err(RpcError::Rpc {
            code: -8,
            message: "Invalid parameter".into(),
        })]);
        let invoker = RpcInvoker::new(transport, fast_policy(5), sink.clone());

        let err = invoker.invoke("getnetworkhashps", &[json!(0)]).unwrap_err();
        assert!(matches!(err, RpcError::Rpc { code: -8, .. }));
        assert_eq!(invoker.transport().calls.load(Ordering::SeqCst), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn decode_error_propagates_immediately() {
        let sink = Arc::new(RecordingSink::default());
        let transport =
            ScriptedTransport::new(vec![Err(RpcError::Decode("expected value".into()))]);
        let invoker = RpcInvoker::new(transport, fast_policy(5), sink);

        let err = invoker.invoke("uptime", &[]).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(invoker.transport().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = fast_policy(5);
        assert_eq!(policy.backoff(1), Duration::from_millis(1));
        assert_eq!(policy.backoff(2), Duration::from_millis(2));
        assert_eq!(policy.backoff(3), Duration::from_millis(4));
        assert_eq!(policy.backoff(10), Duration::from_millis(4));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            jitter: 0.5,
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            let d = policy.backoff(1);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(150));
        }
    }
}
