use thiserror::Error;

/// JSON-RPC error code the node returns while it is still loading the
/// block index, verifying blocks, etc.
pub const RPC_IN_WARMUP: i64 = -28;

/// Errors produced by the upstream RPC boundary and the retrying invoker.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The node is up but still starting (loading block index, rescanning).
    #[error("node is warming up ({code}): {message}")]
    Warmup { code: i64, message: String },
    /// The connection to the node could not be established or was dropped.
    #[error("connection to node failed: {0}")]
    Connection(String),
    /// The request did not complete within the transport timeout.
    #[error("RPC request timed out: {0}")]
    Timeout(String),
    /// The response body was not a structured JSON-RPC envelope.
    #[error("RPC response is not valid JSON: {0}")]
    Decode(String),
    /// The node rejected the credentials.
    #[error("node rejected RPC credentials (HTTP {status})")]
    Unauthorized { status: u16 },
    /// The node answered with a JSON-RPC application error.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// Transient failures persisted past the attempt or time bound.
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<RpcError> },
}

impl RpcError {
    /// Whether the invoker may retry this failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RpcError::Warmup { .. } | RpcError::Connection(_) | RpcError::Timeout(_)
        )
    }

    /// Whether this failure means the endpoint is fundamentally misconfigured
    /// and the process must stop serving metrics.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RpcError::Decode(_) | RpcError::Unauthorized { .. })
    }

    /// Qualified kind name, used as the `type` label of the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Warmup { .. } => "rpc.Warmup",
            RpcError::Connection(_) => "rpc.Connection",
            RpcError::Timeout(_) => "rpc.Timeout",
            RpcError::Decode(_) => "rpc.Decode",
            RpcError::Unauthorized { .. } => "rpc.Unauthorized",
            RpcError::Rpc { .. } => "rpc.Rpc",
            RpcError::RetryExhausted { .. } => "rpc.RetryExhausted",
        }
    }
}
