//! Upstream RPC boundary.
//!
//! The rest of the crate only ever sees [`RpcTransport`]: a method name,
//! positional JSON parameters, and either a JSON result or an [`RpcError`].
//!
//! - [`HttpRpcClient`] talks JSON-RPC to the node over HTTP,
//! - [`RpcInvoker`] wraps any transport with the bounded retry policy and
//!   counts every failed transient attempt.

pub mod error;
pub mod http;
pub mod invoker;

use std::time::Duration;

use serde_json::Value;

pub use error::{RPC_IN_WARMUP, RpcError};
pub use http::{HttpRpcClient, RpcCredentials};
pub use invoker::{RetryPolicy, RpcInvoker};

/// A single upstream call, without any retry behaviour.
///
/// Implementations must be thread-safe so the same client can be shared by
/// the refresh pass and by tests driving it from several threads.
pub trait RpcTransport: Send + Sync {
    fn call(&self, method: &str, params: &[Value]) -> Result<Value, RpcError>;

    /// Like [`RpcTransport::call`], but the exchange must finish within
    /// `timeout`. Transports without their own deadline ignore it.
    fn call_within(
        &self,
        method: &str,
        params: &[Value],
        _timeout: Duration,
    ) -> Result<Value, RpcError> {
        self.call(method, params)
    }
}
