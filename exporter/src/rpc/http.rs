//! HTTP JSON-RPC client for the node daemon.
//!
//! Requests use the JSON-RPC 1.0 envelope the node understands:
//!
//! ```json
//! POST /
//! { "jsonrpc": "1.0", "id": 7, "method": "getblockstats", "params": ["<hash>", ["txs"]] }
//!
//! Response:
//! { "result": { "txs": 3124 }, "error": null, "id": 7 }
//! ```
//!
//! Application errors come back as `{"result": null, "error": {"code": .., "message": ..}}`,
//! usually with HTTP status 500. A rejected login returns 401 with an empty body.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::RpcTransport;
use super::error::{RPC_IN_WARMUP, RpcError};

/// Basic-auth credentials for the node's RPC server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcCredentials {
    pub user: String,
    pub password: String,
}

/// Blocking JSON-RPC client.
///
/// Thread-safe; the refresh pass runs on a blocking worker thread so the
/// blocking `reqwest` client is used directly.
pub struct HttpRpcClient {
    url: String,
    credentials: Option<RpcCredentials>,
    client: Client,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    /// Builds a client for `url` (e.g. `"http://localhost:8332"`).
    ///
    /// `timeout` bounds a single HTTP exchange.
    pub fn new(
        url: impl Into<String>,
        credentials: Option<RpcCredentials>,
        timeout: Duration,
    ) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Connection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            credentials,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Serialize)]
struct RequestEnvelope<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

/// Turns an HTTP status and body into the call result.
fn decode_response(status: u16, body: &str) -> Result<Value, RpcError> {
    if status == 401 || status == 403 {
        return Err(RpcError::Unauthorized { status });
    }

    let envelope: ResponseEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        // The node answers 503 with a plain-text body when its work queue is full.
        Err(_) if status == 503 => {
            return Err(RpcError::Connection(format!(
                "node unavailable (HTTP 503): {}",
                body.trim()
            )));
        }
        Err(e) => return Err(RpcError::Decode(format!("HTTP {status}: {e}"))),
    };

    match envelope.error {
        Some(err) if err.code == RPC_IN_WARMUP => Err(RpcError::Warmup {
            code: err.code,
            message: err.message,
        }),
        Some(err) => Err(RpcError::Rpc {
            code: err.code,
            message: err.message,
        }),
        None => Ok(envelope.result),
    }
}

impl HttpRpcClient {
    fn send(
        &self,
        method: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        let request = RequestEnvelope {
            jsonrpc: "1.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(creds) = &self.credentials {
            builder = builder.basic_auth(&creds.user, Some(&creds.password));
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let resp = builder.send().map_err(|e| {
            if e.is_timeout() {
                RpcError::Timeout(format!("{method}: {e}"))
            } else {
                RpcError::Connection(format!("POST {} failed: {e}", self.url))
            }
        })?;

        let status = resp.status().as_u16();
        let body = resp.text().map_err(|e| {
            if e.is_timeout() {
                RpcError::Timeout(format!("{method}: reading body: {e}"))
            } else {
                RpcError::Connection(format!("{method}: reading body: {e}"))
            }
        })?;

        debug!(method, status, body = %body, "RPC response");
        decode_response(status, &body)
    }
}

impl RpcTransport for HttpRpcClient {
    fn call(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        self.send(method, params, None)
    }

    /// Overrides the client-wide timeout for this request only.
    fn call_within(
        &self,
        method: &str,
        params: &[Value],
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        self.send(method, params, Some(timeout))
    }
}
