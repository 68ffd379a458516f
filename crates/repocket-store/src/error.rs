/// Errors from key-value store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A hash operation hit a string entry, or the reverse.
    #[error("wrong type for key {key}: expected {expected}")]
    WrongType { key: String, expected: &'static str },

    /// A key pattern could not be interpreted.
    #[error("invalid key pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl StoreError {
    /// Returns `true` for connectivity failures, as opposed to misuse.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
