//! Rate-limited, scrape-triggered refresh of all fetch tasks.

pub mod coordinator;
pub mod error;

pub use coordinator::{RefreshCoordinator, RefreshOutcome, RefreshReport, RefreshState};
pub use error::FatalError;
