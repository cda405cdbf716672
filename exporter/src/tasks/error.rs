use thiserror::Error;

use crate::rpc::RpcError;
use crate::sink::SinkError;

/// Failure of one fetch task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl TaskError {
    /// Whether the failure must stop the process rather than the task.
    pub fn is_fatal(&self) -> bool {
        match self {
            TaskError::Rpc(e) => e.is_fatal(),
            TaskError::Sink(_) => false,
        }
    }

    /// Qualified kind name for the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Rpc(e) => e.kind(),
            TaskError::Sink(e) => e.kind(),
        }
    }
}
