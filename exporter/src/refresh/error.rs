use std::sync::Arc;

use thiserror::Error;

use crate::tasks::TaskError;

/// A task failure that must terminate the process.
///
/// Returned by [`crate::refresh::RefreshCoordinator::maybe_refresh`] when the
/// node's response could not be decoded at all (bad credentials, wrong
/// endpoint). The refresh pass stops at the failing task, and every later
/// trigger returns the same error without running any task.
#[derive(Clone, Debug, Error)]
#[error("fatal error in task `{task}`: {source}")]
pub struct FatalError {
    pub task: &'static str,
    #[source]
    pub source: Arc<TaskError>,
}
