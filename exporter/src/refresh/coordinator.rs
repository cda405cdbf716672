//! Scrape-triggered refresh coordinator.
//!
//! On each trigger the coordinator either runs the whole task registry or,
//! when the previous pass is younger than the rate-limit interval, does
//! nothing so the caller serves the metrics it already has. The refresh
//! state lock is held for the whole pass, which keeps at most one pass in
//! flight; a trigger that waited on the lock then sees the fresh timestamp
//! and falls through without refreshing again. After a fatal failure no
//! task ever runs again; every trigger gets the same error back.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::error::FatalError;
use crate::metrics::{MetricSink, catalog, count_error};
use crate::rpc::RpcError;
use crate::tasks::{TaskError, TaskRegistry};

/// Mutable refresh bookkeeping, guarded by the coordinator's lock.
#[derive(Debug, Default)]
pub struct RefreshState {
    /// Start of the last completed pass; `None` until the first one.
    last_refresh: Option<Instant>,
    /// Set by a fatal task failure; no task runs again once it is set.
    fatal: Option<FatalError>,
}

impl RefreshState {
    pub fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }

    pub fn fatal(&self) -> Option<&FatalError> {
        self.fatal.as_ref()
    }
}

/// Summary of one refresh pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshReport {
    pub duration: Duration,
    pub tasks_run: usize,
    pub tasks_failed: usize,
}

/// What a trigger did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Inside the rate-limit window; existing metrics are served as-is.
    Skipped,
    Refreshed(RefreshReport),
}

pub struct RefreshCoordinator {
    tasks: TaskRegistry,
    sink: Arc<dyn MetricSink>,
    rate_limit: Duration,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(tasks: TaskRegistry, sink: Arc<dyn MetricSink>, rate_limit: Duration) -> Self {
        Self {
            tasks,
            sink,
            rate_limit,
            state: Mutex::new(RefreshState::default()),
        }
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn rate_limit(&self) -> Duration {
        self.rate_limit
    }

    /// Start of the last completed pass.
    pub fn last_refresh(&self) -> Option<Instant> {
        self.lock_state().last_refresh()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a refresh pass unless one started less than the rate-limit
    /// interval before `now`.
    ///
    /// Non-fatal task failures are counted and logged and never reach the
    /// caller. A fatal failure aborts the pass and is returned.
    pub fn maybe_refresh(&self, now: Instant) -> Result<RefreshOutcome, FatalError> {
        let mut state = self.lock_state();

        if let Some(fatal) = &state.fatal {
            debug!(task = fatal.task, "refresh disabled by earlier fatal error");
            return Err(fatal.clone());
        }

        if let Some(last) = state.last_refresh {
            if now.saturating_duration_since(last) < self.rate_limit {
                debug!("inside rate-limit window, serving cached metrics");
                return Ok(RefreshOutcome::Skipped);
            }
        }

        let started = Instant::now();
        let mut tasks_failed = 0;

        for task in self.tasks.iter() {
            debug!(task = task.name(), "fetching metric");
            let err = match task.run() {
                Ok(()) => continue,
                Err(e) => e,
            };

            if err.is_fatal() {
                error!(
                    task = task.name(),
                    kind = err.kind(),
                    "RPC call did not return JSON. Bad credentials? {err}"
                );
                let fatal = FatalError {
                    task: task.name(),
                    source: Arc::new(err),
                };
                state.fatal = Some(fatal.clone());
                return Err(fatal);
            }

            tasks_failed += 1;
            match &err {
                TaskError::Rpc(RpcError::RetryExhausted { .. }) => {
                    error!(task = task.name(), "fetch failed during retry: {err}");
                }
                TaskError::Rpc(RpcError::Rpc { .. }) => {
                    debug!(task = task.name(), "RPC error during refresh: {err}");
                }
                _ => warn!(task = task.name(), kind = err.kind(), "fetch failed: {err}"),
            }
            count_error(self.sink.as_ref(), err.kind());
        }

        let duration = started.elapsed();
        if let Err(e) = self
            .sink
            .inc_counter(catalog::PROCESS_TIME, &[], duration.as_secs_f64())
        {
            warn!("failed to record refresh duration: {e}");
        }
        info!(
            duration = ?duration,
            tasks = self.tasks.len(),
            failed = tasks_failed,
            "fetch took {:.3} seconds",
            duration.as_secs_f64()
        );

        state.last_refresh = Some(now);
        Ok(RefreshOutcome::Refreshed(RefreshReport {
            duration,
            tasks_run: self.tasks.len(),
            tasks_failed,
        }))
    }
}
