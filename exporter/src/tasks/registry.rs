//! Ordered set of enabled fetch tasks.

use std::fmt;
use std::sync::Arc;

use super::error::TaskError;
use super::fetch::Fetcher;
use crate::rpc::RpcTransport;

/// Every fetch task the exporter knows, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
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
    SmartFees,
    HashpBlocks,
}

impl TaskKind {
    /// Declaration order; the registry always runs tasks in this order.
    pub const ALL: [TaskKind; 13] = [
        TaskKind::Uptime,
        TaskKind::MemInfo,
        TaskKind::BlockchainInfo,
        TaskKind::BlockStats,
        TaskKind::NetworkInfo,
        TaskKind::ChainTips,
        TaskKind::MempoolInfo,
        TaskKind::NetTotals,
        TaskKind::RpcInfo,
        TaskKind::TxStats,
        TaskKind::Banned,
        TaskKind::SmartFees,
        TaskKind::HashpBlocks,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskKind::Uptime => "uptime",
            TaskKind::MemInfo => "meminfo",
            TaskKind::BlockchainInfo => "blockchaininfo",
            TaskKind::BlockStats => "blockstats",
            TaskKind::NetworkInfo => "networkinfo",
            TaskKind::ChainTips => "chaintips",
            TaskKind::MempoolInfo => "mempoolinfo",
            TaskKind::NetTotals => "nettotals",
            TaskKind::RpcInfo => "rpcinfo",
            TaskKind::TxStats => "txstats",
            TaskKind::Banned => "banned",
            TaskKind::SmartFees => "smart_fees",
            TaskKind::HashpBlocks => "hashp_blocks",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-task enable flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskFlags {
    pub uptime: bool,
    pub meminfo: bool,
    pub blockchaininfo: bool,
    pub blockstats: bool,
    pub networkinfo: bool,
    pub chaintips: bool,
    pub mempoolinfo: bool,
    pub nettotals: bool,
    pub rpcinfo: bool,
    pub txstats: bool,
    pub banned: bool,
    pub smart_fees: bool,
    pub hashp_blocks: bool,
}

impl Default for TaskFlags {
    fn default() -> Self {
        Self::all(true)
    }
}

impl TaskFlags {
    /// Flags with every task set to `enabled`.
    pub fn all(enabled: bool) -> Self {
        Self {
            uptime: enabled,
            meminfo: enabled,
            blockchaininfo: enabled,
            blockstats: enabled,
            networkinfo: enabled,
            chaintips: enabled,
            mempoolinfo: enabled,
            nettotals: enabled,
            rpcinfo: enabled,
            txstats: enabled,
            banned: enabled,
            smart_fees: enabled,
            hashp_blocks: enabled,
        }
    }

    pub fn is_enabled(&self, kind: TaskKind) -> bool {
        match kind {
            TaskKind::Uptime => self.uptime,
            TaskKind::MemInfo => self.meminfo,
            TaskKind::BlockchainInfo => self.blockchaininfo,
            TaskKind::BlockStats => self.blockstats,
            TaskKind::NetworkInfo => self.networkinfo,
            TaskKind::ChainTips => self.chaintips,
            TaskKind::MempoolInfo => self.mempoolinfo,
            TaskKind::NetTotals => self.nettotals,
            TaskKind::RpcInfo => self.rpcinfo,
            TaskKind::TxStats => self.txstats,
            TaskKind::Banned => self.banned,
            TaskKind::SmartFees => self.smart_fees,
            TaskKind::HashpBlocks => self.hashp_blocks,
        }
    }

    pub fn set(&mut self, kind: TaskKind, enabled: bool) {
        let flag = match kind {
            TaskKind::Uptime => &mut self.uptime,
            TaskKind::MemInfo => &mut self.meminfo,
            TaskKind::BlockchainInfo => &mut self.blockchaininfo,
            TaskKind::BlockStats => &mut self.blockstats,
            TaskKind::NetworkInfo => &mut self.networkinfo,
            TaskKind::ChainTips => &mut self.chaintips,
            TaskKind::MempoolInfo => &mut self.mempoolinfo,
            TaskKind::NetTotals => &mut self.nettotals,
            TaskKind::RpcInfo => &mut self.rpcinfo,
            TaskKind::TxStats => &mut self.txstats,
            TaskKind::Banned => &mut self.banned,
            TaskKind::SmartFees => &mut self.smart_fees,
            TaskKind::HashpBlocks => &mut self.hashp_blocks,
        };
        *flag = enabled;
    }
}

/// Zero-argument operation whose only output is its effect on the sink.
pub type TaskOperation = Box<dyn Fn() -> Result<(), TaskError> + Send + Sync>;

/// A named fetch task.
pub struct FetchTask {
    name: &'static str,
    operation: TaskOperation,
}

impl FetchTask {
    pub fn new<F>(name: &'static str, operation: F) -> Self
    where
        F: Fn() -> Result<(), TaskError> + Send + Sync + 'static,
    {
        Self {
            name,
            operation: Box::new(operation),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn run(&self) -> Result<(), TaskError> {
        (self.operation)()
    }
}

impl fmt::Debug for FetchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchTask").field("name", &self.name).finish()
    }
}

/// Ordered list of enabled tasks. Immutable once built.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<FetchTask>,
}

impl TaskRegistry {
    /// Builds the registry from `flags`, asking `make` for the operation of
    /// each enabled task. Order follows [`TaskKind::ALL`], never flag order.
    pub fn build<M>(flags: &TaskFlags, mut make: M) -> Self
    where
        M: FnMut(TaskKind) -> TaskOperation,
    {
        let tasks = TaskKind::ALL
            .into_iter()
            .filter(|kind| flags.is_enabled(*kind))
            .map(|kind| FetchTask {
                name: kind.name(),
                operation: make(kind),
            })
            .collect();
        Self { tasks }
    }

    /// Builds the registry with operations backed by `fetcher`.
    pub fn for_fetcher<T>(flags: &TaskFlags, fetcher: Arc<Fetcher<T>>) -> Self
    where
        T: RpcTransport + 'static,
    {
        Self::build(flags, |kind| {
            let fetcher = fetcher.clone();
            Box::new(move || fetcher.fetch(kind))
        })
    }

    /// Registry made of arbitrary tasks, run in the given order.
    pub fn from_tasks(tasks: Vec<FetchTask>) -> Self {
        Self { tasks }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FetchTask> {
        self.tasks.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(FetchTask::name).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
