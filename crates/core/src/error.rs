//! Payload error model.

use thiserror::Error;

/// Result type used across the payload layer.
pub type PayloadResult<T> = Result<T, PayloadError>;

/// Payload-level error.
///
/// Construction errors (`Decode`, `JobDeserialization`) mean no envelope was
/// produced. Signal errors (`FairSignalJobMalformed`, `StoreUnavailable`) are
/// only raised when fairness signals are configured.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// The raw payload is not a JSON object.
    #[error("payload decode failed: {0}")]
    Decode(String),

    /// The nested `data.command` could not be reconstituted.
    #[error("job deserialization failed: {0}")]
    JobDeserialization(String),

    /// Neither `uuid` nor `id` is present.
    #[error("payload has no job identity (missing `uuid` and `id`)")]
    MissingIdentity,

    /// A fair-signal job lacks one of its routing fields.
    #[error("fair-signal job is missing `{0}`")]
    FairSignalJobMalformed(&'static str),

    /// The signal store could not be reached (connection or timeout).
    #[error("signal store unavailable: {0}")]
    StoreUnavailable(String),

    /// Re-encoding the patched payload failed; the prior state was kept.
    #[error("payload encode failed: {0}")]
    Encode(String),
}

impl PayloadError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn job(msg: impl Into<String>) -> Self {
        Self::JobDeserialization(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// True for errors that abort envelope construction.
    pub fn is_construction(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::JobDeserialization(_))
    }
}
