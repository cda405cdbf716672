//! Fetch tasks.
//!
//! A task is a named, zero-argument operation whose only effect is on the
//! metric sink. [`TaskRegistry`] builds the enabled subset from
//! [`TaskFlags`] in a fixed declaration order; [`Fetcher`] provides the
//! operations that talk to the node.

pub mod error;
pub mod fetch;
pub mod registry;

pub use error::TaskError;
pub use fetch::{BLOCKSTATS_FIELDS, Fetcher};
pub use registry::{FetchTask, TaskFlags, TaskKind, TaskOperation, TaskRegistry};
