use thiserror::Error;

/// Errors raised by record definition, casting, persistence and lookup.
#[derive(Debug, Error)]
pub enum RepocketError {
    /// A record type declaration is inconsistent (e.g. two primary keys).
    #[error("definition error: {0}")]
    Definition(String),

    /// A raw value cannot be coerced into an attribute's type.
    #[error("cannot cast {value} to {attribute}: {reason}")]
    Cast {
        attribute: &'static str,
        value: String,
        reason: String,
    },

    /// A value cannot be rendered into its envelope.
    #[error("cannot serialize {attribute} value: {reason}")]
    Serialization {
        attribute: &'static str,
        reason: String,
    },

    /// An envelope or pointer names a type that cannot be located.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// A pointer cannot be written or followed.
    #[error("reference error: {0}")]
    Reference(String),

    /// Assignment or lookup of a field the record type does not declare.
    #[error("{record} has no field {field:?}; fields are {available:?}")]
    UnknownField {
        record: String,
        field: String,
        available: Vec<String>,
    },

    /// Direct assignment of the primary key.
    #[error("field {field:?} of {record} is the primary key and cannot be set")]
    ReadOnlyField { record: String, field: String },

    /// Comparison between records of different types.
    #[error("cannot compare {left} with {right}")]
    TypeMismatch { left: String, right: String },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] repocket_store::StoreError),

    #[error("type error: {0}")]
    Type(#[from] repocket_types::TypeError),
}

/// Result alias for Repocket operations.
pub type RepocketResult<T> = Result<T, RepocketError>;
