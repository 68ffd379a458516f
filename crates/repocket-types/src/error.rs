use thiserror::Error;

/// Errors produced by wire-type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid decimal: {0:?}")]
    InvalidDecimal(String),

    #[error("unrecognized date/time: {0:?}")]
    InvalidTimestamp(String),

    #[error("invalid storage key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
