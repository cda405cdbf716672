//! Exporter configuration.
//!
//! Everything is read from environment variables once at startup:
//!
//! - node RPC endpoint and credentials (`RpcConfig`), optionally taken from
//!   the node's own configuration file and `.cookie`,
//! - the scrape listener (`MetricsConfig`),
//! - retry and rate-limit tuning,
//! - per-task enable flags and the hashrate / smart-fee windows.
//!
//! [`ExporterConfig::from_lookup`] takes the variable source as a function so
//! tests never touch the process environment.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::rpc::{RetryPolicy, RpcCredentials};
use crate::sink::DEFAULT_BAN_REASON;
use crate::tasks::{TaskFlags, TaskKind};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: `{value}` is not a valid integer")]
    InvalidInteger { var: &'static str, value: String },

    #[error("{var}: `{value}` is not a valid boolean")]
    InvalidBool { var: String, value: String },

    #[error("{var}: `{value}` is not a valid port")]
    InvalidPort { var: &'static str, value: String },

    #[error("RETRIES must allow at least one attempt")]
    ZeroAttempts,

    #[error("failed to read node config {}: {source}", path.display())]
    NodeConf {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed RPC cookie file {}", path.display())]
    MalformedCookie { path: PathBuf },
}

/// Where and how to reach the node's RPC server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Explicit node configuration file (`UTXO_NODE_CONF_PATH`).
    pub conf_path: Option<PathBuf>,
    /// Fallback node configuration file, used only when no explicit file is
    /// given and the credentials are incomplete.
    pub default_conf_path: Option<PathBuf>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 8332,
            user: None,
            password: None,
            conf_path: None,
            default_conf_path: None,
        }
    }
}

/// Resolved RPC endpoint: URL plus optional basic-auth credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcEndpoint {
    pub url: String,
    pub credentials: Option<RpcCredentials>,
}

impl RpcConfig {
    /// Whether the node configuration file takes precedence over the
    /// environment.
    pub fn uses_conf_file(&self) -> bool {
        self.conf_path.is_some() || self.user.is_none() || self.password.is_none()
    }

    /// Resolves URL and credentials.
    ///
    /// Precedence: an explicit config file, then user and password from the
    /// environment, then the default config file if it exists.
    pub fn endpoint(&self) -> Result<RpcEndpoint, ConfigError> {
        if !self.uses_conf_file() {
            info!("Using environment configuration");
            return Ok(RpcEndpoint {
                url: format!("{}://{}:{}", self.scheme, self.host, self.port),
                credentials: match (&self.user, &self.password) {
                    (Some(user), Some(password)) => Some(RpcCredentials {
                        user: user.clone(),
                        password: password.clone(),
                    }),
                    _ => None,
                },
            });
        }

        let path = match (&self.conf_path, &self.default_conf_path) {
            (Some(path), _) => path.clone(),
            (None, Some(path)) if path.exists() => path.clone(),
            _ => {
                warn!("no node config file found, connecting without credentials");
                return Ok(RpcEndpoint {
                    url: format!("{}://{}:{}", self.scheme, self.host, self.port),
                    credentials: None,
                });
            }
        };
        info!(path = %path.display(), "Using config file");

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::NodeConf {
            path: path.clone(),
            source,
        })?;
        let conf = parse_node_conf(&text);

        let host = conf.get("rpcconnect").cloned().unwrap_or_else(|| self.host.clone());
        let port = match conf.get("rpcport") {
            Some(raw) => parse_port("rpcport", raw)?,
            None => self.port,
        };

        let credentials = match (conf.get("rpcuser"), conf.get("rpcpassword")) {
            (Some(user), Some(password)) => Some(RpcCredentials {
                user: user.clone(),
                password: password.clone(),
            }),
            _ => read_cookie(&cookie_path(&path))?,
        };

        Ok(RpcEndpoint {
            url: format!("{}://{}:{}", self.scheme, host, port),
            credentials,
        })
    }
}

/// Scrape listener address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Bind host; empty means all interfaces.
    pub addr: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            addr: String::new(),
            port: 9332,
        }
    }
}

impl MetricsConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn listen_addr(&self) -> String {
        match self.addr.as_str() {
            "" => format!("0.0.0.0:{}", self.port),
            host if host.contains(':') && !host.starts_with('[') => {
                format!("[{host}]:{}", self.port)
            }
            host => format!("{host}:{}", self.port),
        }
    }
}

/// Top-level exporter configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExporterConfig {
    /// Value of the `blockchain` label on every metric.
    pub blockchain: String,
    pub rpc: RpcConfig,
    pub metrics: MetricsConfig,
    pub hashps_windows: Vec<i64>,
    pub smartfee_windows: Vec<i64>,
    /// Maximum attempts per upstream call, including the first.
    pub retries: u32,
    /// Per-call overall deadline, retries included.
    pub timeout: Duration,
    /// Minimum spacing between refresh passes.
    pub rate_limit: Duration,
    pub log_level: String,
    pub tasks: TaskFlags,
    pub ban_reason_default: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            blockchain: "bitcoin".to_string(),
            rpc: RpcConfig::default(),
            metrics: MetricsConfig::default(),
            hashps_windows: vec![-1, 1, 120],
            smartfee_windows: vec![2, 3, 5, 20],
            retries: 5,
            timeout: Duration::from_secs(30),
            rate_limit: Duration::from_secs(5),
            log_level: "INFO".to_string(),
            tasks: TaskFlags::default(),
            ban_reason_default: DEFAULT_BAN_REASON.to_string(),
        }
    }
}

impl ExporterConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from `lookup`, falling back to defaults for
    /// unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("UTXO_NODE_BLOCKCHAIN_NAME") {
            cfg.blockchain = v;
        }
        if let Some(v) = lookup("UTXO_NODE_RPC_SCHEME") {
            cfg.rpc.scheme = v;
        }
        if let Some(v) = lookup("UTXO_NODE_RPC_HOST") {
            cfg.rpc.host = v;
        }
        if let Some(v) = lookup("UTXO_NODE_RPC_PORT") {
            cfg.rpc.port = parse_port("UTXO_NODE_RPC_PORT", &v)?;
        }
        cfg.rpc.user = lookup("UTXO_NODE_RPC_USER");
        cfg.rpc.password = lookup("UTXO_NODE_RPC_PASSWORD");
        cfg.rpc.conf_path = lookup("UTXO_NODE_CONF_PATH").map(PathBuf::from);
        cfg.rpc.default_conf_path =
            lookup("HOME").map(|home| Path::new(&home).join(".bitcoin").join("bitcoin.conf"));

        if let Some(v) = lookup("HASHPS_BLOCKS") {
            cfg.hashps_windows = parse_windows("HASHPS_BLOCKS", &v)?;
        }
        if let Some(v) = lookup("SMARTFEE_BLOCKS") {
            cfg.smartfee_windows = parse_windows("SMARTFEE_BLOCKS", &v)?;
        }

        if let Some(v) = lookup("METRICS_ADDR") {
            cfg.metrics.addr = v;
        }
        if let Some(v) = lookup("METRICS_PORT") {
            cfg.metrics.port = parse_port("METRICS_PORT", &v)?;
        }

        if let Some(v) = lookup("RETRIES") {
            cfg.retries = parse_int("RETRIES", &v)?;
            if cfg.retries == 0 {
                return Err(ConfigError::ZeroAttempts);
            }
        }
        if let Some(v) = lookup("TIMEOUT") {
            cfg.timeout = Duration::from_secs(parse_int("TIMEOUT", &v)?);
        }
        if let Some(v) = lookup("RATE_LIMIT") {
            cfg.rate_limit = Duration::from_secs(parse_int("RATE_LIMIT", &v)?);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            cfg.log_level = v;
        }
        if let Some(v) = lookup("BAN_REASON_DEFAULT") {
            cfg.ban_reason_default = v;
        }

        for kind in TaskKind::ALL {
            let var = task_flag_var(kind);
            if let Some(v) = lookup(&var) {
                let enabled = parse_bool(&v).ok_or(ConfigError::InvalidBool { var, value: v })?;
                cfg.tasks.set(kind, enabled);
            }
        }

        Ok(cfg)
    }

    /// Retry policy for upstream calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.timeout,
            max_attempts: self.retries,
            ..RetryPolicy::default()
        }
    }

    /// `tracing` filter directive equivalent to `LOG_LEVEL`.
    pub fn log_directive(&self) -> &'static str {
        match self.log_level.to_ascii_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "warn" | "warning" => "warn",
            "error" | "critical" | "fatal" => "error",
            _ => "info",
        }
    }
}

/// Environment variable controlling `kind`, e.g. `FETCH_SMART_FEES`.
pub fn task_flag_var(kind: TaskKind) -> String {
    format!("FETCH_{}", kind.name().to_ascii_uppercase())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Some(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn parse_int<N: std::str::FromStr>(var: &'static str, raw: &str) -> Result<N, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidInteger {
        var,
        value: raw.to_string(),
    })
}

fn parse_port(var: &'static str, raw: &str) -> Result<u16, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidPort {
        var,
        value: raw.to_string(),
    })
}

/// Comma-separated integer list; empty entries are skipped.
fn parse_windows(var: &'static str, raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_int(var, s))
        .collect()
}

/// `key=value` pairs of a node config file. Comments and section headers are
/// ignored; later keys override earlier ones.
fn parse_node_conf(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty() && !line.starts_with('['))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn cookie_path(conf_path: &Path) -> PathBuf {
    conf_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(".cookie")
}

/// Reads `user:password` from the node's cookie file. A missing file means
/// no credentials.
fn read_cookie(path: &Path) -> Result<Option<RpcCredentials>, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::NodeConf {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let (user, password) = text
        .trim()
        .split_once(':')
        .ok_or_else(|| ConfigError::MalformedCookie {
            path: path.to_path_buf(),
        })?;
    Ok(Some(RpcCredentials {
        user: user.to_string(),
        password: password.to_string(),
    }))
}
