//! Structured error types shared by every pipeline stage.
//!
//! Each stage runs one independent unit of work (one source, one request, one
//! snapshot). An `IngestError` always belongs to exactly one such unit.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Missing or malformed source definitions or settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A raw snapshot or its object key cannot be normalized.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// The chart API answered with a non-success status.
    #[error("chart API returned HTTP {status} for {symbol}")]
    UpstreamApi { symbol: String, status: u16 },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("object not found: {key}")]
    ObjectNotFound { key: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("event publish failed: {0}")]
    Publish(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),
}

impl IngestError {
    /// True for errors caused by the input itself rather than the environment.
    pub fn is_input_validation(&self) -> bool {
        matches!(self, IngestError::InputValidation(_))
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
