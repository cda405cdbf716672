//! Names, help strings and label keys of every exported metric.
//!
//! Every name is relative to [`NAMESPACE`]; the registry prefixes it and
//! adds the `blockchain` label to every sample.

pub const NAMESPACE: &str = "utxo_node";
pub const BLOCKCHAIN_LABEL: &str = "blockchain";

/// Static description of one metric family.
#[derive(Clone, Copy, Debug)]
pub struct MetricDef {
    pub name: &'static str,
    pub help: &'static str,
    /// Metric-specific label keys, in the order values are passed to the sink.
    pub labels: &'static [&'static str],
}

const fn plain(name: &'static str, help: &'static str) -> MetricDef {
    MetricDef {
        name,
        help,
        labels: &[],
    }
}

pub const BLOCKS: &str = "blocks";
pub const DIFFICULTY: &str = "difficulty";
pub const PEERS: &str = "peers";
pub const CONN_IN: &str = "conn_in";
pub const CONN_OUT: &str = "conn_out";
pub const UPTIME: &str = "uptime";
pub const MEMINFO_USED: &str = "meminfo_used";
pub const MEMINFO_FREE: &str = "meminfo_free";
pub const MEMINFO_TOTAL: &str = "meminfo_total";
pub const MEMINFO_LOCKED: &str = "meminfo_locked";
pub const MEMINFO_CHUNKS_USED: &str = "meminfo_chunks_used";
pub const MEMINFO_CHUNKS_FREE: &str = "meminfo_chunks_free";
pub const MEMPOOL_BYTES: &str = "mempool_bytes";
pub const MEMPOOL_SIZE: &str = "mempool_size";
pub const MEMPOOL_USAGE: &str = "mempool_usage";
pub const MEMPOOL_UNBROADCAST: &str = "mempool_unbroadcast";
pub const LATEST_BLOCK_HEIGHT: &str = "latest_block_height";
pub const LATEST_BLOCK_WEIGHT: &str = "latest_block_weight";
pub const LATEST_BLOCK_SIZE: &str = "latest_block_size";
pub const LATEST_BLOCK_TXS: &str = "latest_block_txs";
pub const LATEST_BLOCK_INPUTS: &str = "latest_block_inputs";
pub const LATEST_BLOCK_OUTPUTS: &str = "latest_block_outputs";
pub const LATEST_BLOCK_VALUE: &str = "latest_block_value";
pub const LATEST_BLOCK_FEE: &str = "latest_block_fee";
pub const TXCOUNT: &str = "txcount";
pub const NUM_CHAINTIPS: &str = "num_chaintips";
pub const TOTAL_BYTES_RECV: &str = "total_bytes_recv";
pub const TOTAL_BYTES_SENT: &str = "total_bytes_sent";
pub const SERVER_VERSION: &str = "server_version";
pub const PROTOCOL_VERSION: &str = "protocol_version";
pub const SIZE_ON_DISK: &str = "size_on_disk";
pub const VERIFICATION_PROGRESS: &str = "verification_progress";
pub const RPC_ACTIVE: &str = "rpc_active";
pub const BAN_CREATED: &str = "ban_created";
pub const BANNED_UNTIL: &str = "banned_until";

pub const WARNINGS: &str = "warnings_total";
pub const EXPORTER_ERRORS: &str = "exporter_errors_total";
pub const PROCESS_TIME: &str = "exporter_process_time_total";

pub const GAUGES: &[MetricDef] = &[
    plain(BLOCKS, "Block height"),
    plain(DIFFICULTY, "Difficulty"),
    plain(PEERS, "Number of peers"),
    plain(CONN_IN, "Number of connections in"),
    plain(CONN_OUT, "Number of connections out"),
    plain(UPTIME, "Number of seconds the node has been running"),
    plain(MEMINFO_USED, "Number of bytes used"),
    plain(MEMINFO_FREE, "Number of bytes available"),
    plain(MEMINFO_TOTAL, "Number of bytes managed"),
    plain(MEMINFO_LOCKED, "Number of bytes locked"),
    plain(MEMINFO_CHUNKS_USED, "Number of allocated chunks"),
    plain(MEMINFO_CHUNKS_FREE, "Number of unused chunks"),
    plain(MEMPOOL_BYTES, "Size of mempool in bytes"),
    plain(MEMPOOL_SIZE, "Number of unconfirmed transactions in mempool"),
    plain(MEMPOOL_USAGE, "Total memory usage for the mempool"),
    plain(
        MEMPOOL_UNBROADCAST,
        "Number of transactions waiting for acknowledgment",
    ),
    plain(LATEST_BLOCK_HEIGHT, "Height or index of latest block"),
    plain(
        LATEST_BLOCK_WEIGHT,
        "Weight of latest block according to BIP 141",
    ),
    plain(LATEST_BLOCK_SIZE, "Size of latest block in bytes"),
    plain(LATEST_BLOCK_TXS, "Number of transactions in latest block"),
    plain(
        LATEST_BLOCK_INPUTS,
        "Number of inputs in transactions of latest block",
    ),
    plain(
        LATEST_BLOCK_OUTPUTS,
        "Number of outputs in transactions of latest block",
    ),
    plain(
        LATEST_BLOCK_VALUE,
        "Coin value of all transactions in the latest block",
    ),
    plain(LATEST_BLOCK_FEE, "Total fee to process the latest block"),
    plain(TXCOUNT, "Number of TX since the genesis block"),
    plain(NUM_CHAINTIPS, "Number of known blockchain branches"),
    plain(TOTAL_BYTES_RECV, "Total bytes received"),
    plain(TOTAL_BYTES_SENT, "Total bytes sent"),
    plain(SERVER_VERSION, "The server version"),
    plain(PROTOCOL_VERSION, "The protocol version of the server"),
    plain(SIZE_ON_DISK, "Estimated size of the block and undo files"),
    plain(
        VERIFICATION_PROGRESS,
        "Estimate of verification progress [0..1]",
    ),
    plain(RPC_ACTIVE, "Number of RPC calls being processed"),
    MetricDef {
        name: BAN_CREATED,
        help: "Time the ban was created",
        labels: &["address", "reason"],
    },
    MetricDef {
        name: BANNED_UNTIL,
        help: "Time the ban expires",
        labels: &["address", "reason"],
    },
];

pub const COUNTERS: &[MetricDef] = &[
    plain(WARNINGS, "Number of network or blockchain warnings detected"),
    MetricDef {
        name: EXPORTER_ERRORS,
        help: "Number of errors encountered by the exporter",
        labels: &["type"],
    },
    plain(PROCESS_TIME, "Time spent processing metrics from node"),
];

/// Gauge name for the network hash rate over `num_blocks` blocks.
///
/// 120 blocks is the node's default window and keeps the bare `hashps` name;
/// negative windows (since the last difficulty change) become `hashps_neg<n>`.
pub fn hashps_gauge_name(num_blocks: i64) -> String {
    match num_blocks {
        120 => "hashps".to_string(),
        n if n < 0 => format!("hashps_neg{}", n.unsigned_abs()),
        n => format!("hashps_{n}"),
    }
}

pub fn hashps_gauge_help(num_blocks: i64) -> String {
    if num_blocks == -1 {
        "Estimated network hash rate per second since the last difficulty change".to_string()
    } else {
        format!("Estimated network hash rate per second for the last {num_blocks} blocks")
    }
}

pub fn smartfee_gauge_name(num_blocks: i64) -> String {
    format!("est_smart_fee_{num_blocks}")
}

pub fn smartfee_gauge_help(num_blocks: i64) -> String {
    format!("Estimated smart fee per kilobyte for confirmation in {num_blocks} blocks")
}
