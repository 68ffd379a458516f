//! Wire primitives for Repocket.
//!
//! Everything in this crate is independent of record types and stores: it
//! describes the exact bytes Repocket writes, so that any implementation
//! reading the same store sees the same data.
//!
//! # Key Types
//!
//! - [`Envelope`] -- self-describing serialized form of one attribute value
//! - [`HashKey`] -- storage key addressing a record's primary hash entry
//! - [`Decimal`] -- exact decimal number kept in canonical text form
//! - [`parse_timestamp`] -- permissive date/time parser

pub mod decimal;
pub mod envelope;
pub mod error;
pub mod key;
pub mod timestamp;

pub use decimal::Decimal;
pub use envelope::{to_python_json, Envelope, ATTRIBUTES_MODULE};
pub use error::TypeError;
pub use key::{escape_pattern, is_field_key, HashKey, FIELD_SEGMENT, KEY_NAMESPACE};
pub use timestamp::{format_timestamp, parse_timestamp, timestamp_from_epoch};
