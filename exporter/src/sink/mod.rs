//! Metric sink adapter.
//!
//! Pure mapping from node RPC payloads to named, labelled metric writes:
//!
//! - `null` results are "no data" and write nothing,
//! - optional fields that are absent are skipped silently,
//! - subunit amounts are scaled to coins with exact decimal arithmetic.

pub mod adapter;
pub mod amount;
pub mod error;

pub use adapter::{DEFAULT_BAN_REASON, MetricSinkAdapter, Payload};
pub use amount::{coins_to_gauge, subunits_to_coins};
pub use error::SinkError;
