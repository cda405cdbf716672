//! Mapping of node RPC payloads onto metric writes.
//!
//! Each payload is first translated into a list of pending writes and only
//! then flushed to the sink, so a malformed payload never leaves half of its
//! metrics updated.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::amount::{coins_to_gauge, subunits_to_coins};
use super::error::SinkError;
use crate::metrics::MetricSink;
use crate::metrics::catalog::{self, hashps_gauge_name, smartfee_gauge_name};

/// Reason label used when a ban entry carries no `ban_reason`.
pub const DEFAULT_BAN_REASON: &str = "manually added";

/// Shape of one upstream result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Payload {
    Uptime,
    MemInfo,
    BlockchainInfo,
    BlockStats,
    NetworkInfo,
    ChainTips,
    MempoolInfo,
    NetTotals,
    RpcInfo,
    TxStats,
    Banned,
    SmartFee(i64),
    NetworkHashps(i64),
}

impl Payload {
    /// RPC method whose result has this shape.
    pub fn method(self) -> &'static str {
        match self {
            Payload::Uptime => "uptime",
            Payload::MemInfo => "getmemoryinfo",
            Payload::BlockchainInfo => "getblockchaininfo",
            Payload::BlockStats => "getblockstats",
            Payload::NetworkInfo => "getnetworkinfo",
            Payload::ChainTips => "getchaintips",
            Payload::MempoolInfo => "getmempoolinfo",
            Payload::NetTotals => "getnettotals",
            Payload::RpcInfo => "getrpcinfo",
            Payload::TxStats => "getchaintxstats",
            Payload::Banned => "listbanned",
            Payload::SmartFee(_) => "estimatesmartfee",
            Payload::NetworkHashps(_) => "getnetworkhashps",
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::SmartFee(n) | Payload::NetworkHashps(n) => {
                write!(f, "{}({n})", self.method())
            }
            _ => f.write_str(self.method()),
        }
    }
}

enum PendingWrite {
    Gauge {
        name: String,
        labels: Vec<String>,
        value: f64,
    },
    Counter {
        name: &'static str,
        delta: f64,
    },
}

fn gauge(name: impl Into<String>, value: f64) -> PendingWrite {
    PendingWrite::Gauge {
        name: name.into(),
        labels: Vec::new(),
        value,
    }
}

/// Translates payloads into writes on a [`MetricSink`].
#[derive(Clone)]
pub struct MetricSinkAdapter {
    sink: Arc<dyn MetricSink>,
    ban_reason_default: String,
}

impl MetricSinkAdapter {
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self {
            sink,
            ban_reason_default: DEFAULT_BAN_REASON.to_string(),
        }
    }

    /// Overrides the reason label used for bans without `ban_reason`.
    pub fn with_ban_reason_default(mut self, reason: impl Into<String>) -> Self {
        self.ban_reason_default = reason.into();
        self
    }

    pub fn sink(&self) -> &Arc<dyn MetricSink> {
        &self.sink
    }

    /// Applies one upstream result. A `null` result means "no data" and
    /// writes nothing.
    pub fn apply(&self, payload: Payload, raw: &Value) -> Result<(), SinkError> {
        if raw.is_null() {
            debug!(%payload, "no data, skipping metric writes");
            return Ok(());
        }

        let writes = self.plan(payload, raw)?;
        for write in writes {
            match write {
                PendingWrite::Gauge {
                    name,
                    labels,
                    value,
                } => {
                    let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
                    self.sink.set_gauge(&name, &labels, value)?;
                }
                PendingWrite::Counter { name, delta } => self.sink.inc_counter(name, &[], delta)?,
            }
        }
        Ok(())
    }

    fn plan(&self, payload: Payload, raw: &Value) -> Result<Vec<PendingWrite>, SinkError> {
        let p = PayloadView {
            name: payload.method(),
        };

        let writes = match payload {
            Payload::Uptime => vec![gauge(catalog::UPTIME, p.number(raw, "uptime")?)],
            Payload::MemInfo => {
                let info = p.object(raw, "getmemoryinfo")?;
                let locked = p.object(p.required(info, "locked")?, "locked")?;
                vec![
                    gauge(catalog::MEMINFO_USED, p.number_field(locked, "used")?),
                    gauge(catalog::MEMINFO_FREE, p.number_field(locked, "free")?),
                    gauge(catalog::MEMINFO_TOTAL, p.number_field(locked, "total")?),
                    gauge(catalog::MEMINFO_LOCKED, p.number_field(locked, "locked")?),
                    gauge(
                        catalog::MEMINFO_CHUNKS_USED,
                        p.number_field(locked, "chunks_used")?,
                    ),
                    gauge(
                        catalog::MEMINFO_CHUNKS_FREE,
                        p.number_field(locked, "chunks_free")?,
                    ),
                ]
            }
            Payload::BlockchainInfo => {
                let info = p.object(raw, "getblockchaininfo")?;
                vec![
                    gauge(catalog::BLOCKS, p.number_field(info, "blocks")?),
                    gauge(catalog::DIFFICULTY, p.number_field(info, "difficulty")?),
                    gauge(catalog::SIZE_ON_DISK, p.number_field(info, "size_on_disk")?),
                    gauge(
                        catalog::VERIFICATION_PROGRESS,
                        p.number_field(info, "verificationprogress")?,
                    ),
                ]
            }
            Payload::BlockStats => {
                let stats = p.object(raw, "getblockstats")?;
                vec![
                    gauge(catalog::LATEST_BLOCK_SIZE, p.number_field(stats, "total_size")?),
                    gauge(catalog::LATEST_BLOCK_TXS, p.number_field(stats, "txs")?),
                    gauge(catalog::LATEST_BLOCK_HEIGHT, p.number_field(stats, "height")?),
                    gauge(
                        catalog::LATEST_BLOCK_WEIGHT,
                        p.number_field(stats, "total_weight")?,
                    ),
                    gauge(catalog::LATEST_BLOCK_INPUTS, p.number_field(stats, "ins")?),
                    gauge(catalog::LATEST_BLOCK_OUTPUTS, p.number_field(stats, "outs")?),
                    gauge(catalog::LATEST_BLOCK_VALUE, p.coins_field(stats, "total_out")?),
                    gauge(catalog::LATEST_BLOCK_FEE, p.coins_field(stats, "totalfee")?),
                ]
            }
            Payload::NetworkInfo => {
                let info = p.object(raw, "getnetworkinfo")?;
                let mut writes = vec![gauge(catalog::PEERS, p.number_field(info, "connections")?)];
                if let Some(v) = p.optional_number(info, "connections_in")? {
                    writes.push(gauge(catalog::CONN_IN, v));
                }
                if let Some(v) = p.optional_number(info, "connections_out")? {
                    writes.push(gauge(catalog::CONN_OUT, v));
                }
                writes.push(gauge(catalog::SERVER_VERSION, p.number_field(info, "version")?));
                writes.push(gauge(
                    catalog::PROTOCOL_VERSION,
                    p.number_field(info, "protocolversion")?,
                ));
                if has_warnings(info.get("warnings")) {
                    writes.push(PendingWrite::Counter {
                        name: catalog::WARNINGS,
                        delta: 1.0,
                    });
                }
                writes
            }
            Payload::ChainTips => {
                let tips = p.array(raw, "getchaintips")?;
                vec![gauge(catalog::NUM_CHAINTIPS, tips.len() as f64)]
            }
            Payload::MempoolInfo => {
                let mempool = p.object(raw, "getmempoolinfo")?;
                let mut writes = vec![
                    gauge(catalog::MEMPOOL_BYTES, p.number_field(mempool, "bytes")?),
                    gauge(catalog::MEMPOOL_SIZE, p.number_field(mempool, "size")?),
                    gauge(catalog::MEMPOOL_USAGE, p.number_field(mempool, "usage")?),
                ];
                if let Some(v) = p.optional_number(mempool, "unbroadcastcount")? {
                    writes.push(gauge(catalog::MEMPOOL_UNBROADCAST, v));
                }
                writes
            }
            Payload::NetTotals => {
                let totals = p.object(raw, "getnettotals")?;
                vec![
                    gauge(
                        catalog::TOTAL_BYTES_RECV,
                        p.number_field(totals, "totalbytesrecv")?,
                    ),
                    gauge(
                        catalog::TOTAL_BYTES_SENT,
                        p.number_field(totals, "totalbytessent")?,
                    ),
                ]
            }
            Payload::RpcInfo => {
                let info = p.object(raw, "getrpcinfo")?;
                let active = p.array(p.required(info, "active_commands")?, "active_commands")?;
                // The getrpcinfo call itself is always among the active commands.
                vec![gauge(catalog::RPC_ACTIVE, active.len().saturating_sub(1) as f64)]
            }
            Payload::TxStats => {
                let stats = p.object(raw, "getchaintxstats")?;
                vec![gauge(catalog::TXCOUNT, p.number_field(stats, "txcount")?)]
            }
            Payload::Banned => {
                let bans = p.array(raw, "listbanned")?;
                let mut writes = Vec::with_capacity(bans.len() * 2);
                for ban in bans {
                    let ban = p.object(ban, "listbanned[]")?;
                    let address = p.string_field(ban, "address")?;
                    let reason = match ban.get("ban_reason") {
                        Some(Value::String(reason)) => reason.clone(),
                        _ => self.ban_reason_default.clone(),
                    };
                    let labels = vec![address.to_string(), reason];
                    writes.push(PendingWrite::Gauge {
                        name: catalog::BAN_CREATED.to_string(),
                        labels: labels.clone(),
                        value: p.number_field(ban, "ban_created")?,
                    });
                    writes.push(PendingWrite::Gauge {
                        name: catalog::BANNED_UNTIL.to_string(),
                        labels,
                        value: p.number_field(ban, "banned_until")?,
                    });
                }
                writes
            }
            Payload::SmartFee(n) => {
                let estimate = p.object(raw, "estimatesmartfee")?;
                match p.optional_number(estimate, "feerate")? {
                    Some(feerate) => vec![gauge(smartfee_gauge_name(n), feerate)],
                    None => Vec::new(),
                }
            }
            Payload::NetworkHashps(n) => {
                vec![gauge(hashps_gauge_name(n), p.number(raw, "getnetworkhashps")?)]
            }
        };

        Ok(writes)
    }
}

/// `warnings` is a string in older nodes and a list of strings in newer ones.
fn has_warnings(warnings: Option<&Value>) -> bool {
    match warnings {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        _ => false,
    }
}

/// Field accessors that report errors against one payload name.
struct PayloadView {
    name: &'static str,
}

impl PayloadView {
    fn wrong_type(&self, field: &'static str, expected: &'static str) -> SinkError {
        SinkError::WrongType {
            payload: self.name,
            field,
            expected,
        }
    }

    fn object<'a>(
        &self,
        v: &'a Value,
        field: &'static str,
    ) -> Result<&'a Map<String, Value>, SinkError> {
        v.as_object().ok_or_else(|| self.wrong_type(field, "an object"))
    }

    fn array<'a>(&self, v: &'a Value, field: &'static str) -> Result<&'a Vec<Value>, SinkError> {
        v.as_array().ok_or_else(|| self.wrong_type(field, "an array"))
    }

    fn number(&self, v: &Value, field: &'static str) -> Result<f64, SinkError> {
        v.as_f64().ok_or_else(|| self.wrong_type(field, "a number"))
    }

    fn required<'a>(
        &self,
        obj: &'a Map<String, Value>,
        field: &'static str,
    ) -> Result<&'a Value, SinkError> {
        match obj.get(field) {
            Some(v) if !v.is_null() => Ok(v),
            _ => Err(SinkError::MissingField {
                payload: self.name,
                field,
            }),
        }
    }

    fn number_field(
        &self,
        obj: &Map<String, Value>,
        field: &'static str,
    ) -> Result<f64, SinkError> {
        self.number(self.required(obj, field)?, field)
    }

    fn optional_number(
        &self,
        obj: &Map<String, Value>,
        field: &'static str,
    ) -> Result<Option<f64>, SinkError> {
        match obj.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => self.number(v, field).map(Some),
        }
    }

    fn string_field<'a>(
        &self,
        obj: &'a Map<String, Value>,
        field: &'static str,
    ) -> Result<&'a str, SinkError> {
        self.required(obj, field)?
            .as_str()
            .ok_or_else(|| self.wrong_type(field, "a string"))
    }

    /// Integer subunit amount scaled to coins.
    fn coins_field(&self, obj: &Map<String, Value>, field: &'static str) -> Result<f64, SinkError> {
        let subunits = self
            .required(obj, field)?
            .as_i64()
            .ok_or_else(|| self.wrong_type(field, "an integer amount"))?;
        Ok(coins_to_gauge(subunits_to_coins(subunits)))
    }
}
