use thiserror::Error;

use crate::metrics::MetricsError;

/// Errors raised while mapping an upstream payload onto metrics.
#[derive(Debug, Error)]
pub enum SinkError {
    /// A field the mapping cannot do without is absent.
    #[error("{payload}: missing required field `{field}`")]
    MissingField {
        payload: &'static str,
        field: &'static str,
    },
    /// A field is present but has an unexpected JSON type.
    #[error("{payload}: field `{field}` is not {expected}")]
    WrongType {
        payload: &'static str,
        field: &'static str,
        expected: &'static str,
    },
    #[error("metric write failed: {0}")]
    Metrics(#[from] MetricsError),
}

impl SinkError {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkError::MissingField { .. } => "sink.MissingField",
            SinkError::WrongType { .. } => "sink.WrongType",
            SinkError::Metrics(_) => "sink.Metrics",
        }
    }
}
