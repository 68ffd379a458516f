//! Key-value store abstraction for Repocket.
//!
//! Repocket persists each record as one hash entry plus one string entry per
//! streaming field. This crate defines the small store surface that layout
//! needs, independent of any particular server.
//!
//! # Operations
//!
//! - hashes: [`KeyValueStore::hash_set`], [`KeyValueStore::hash_get_all`]
//! - strings: [`KeyValueStore::string_set`], [`KeyValueStore::string_get`],
//!   [`KeyValueStore::string_append`]
//! - keys: [`KeyValueStore::keys_matching`], [`KeyValueStore::exists`],
//!   [`KeyValueStore::delete`]
//! - batching: [`KeyValueStore::execute`] runs a [`Pipeline`] in one round-trip
//!
//! # Storage Backends
//!
//! - [`InMemoryStore`] -- `BTreeMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. The store never interprets values -- it is a pure key-value store.
//! 2. Reads of missing keys return `Ok(None)`, never an error.
//! 3. Connectivity failures surface as [`StoreError::Unavailable`].
//! 4. A pipeline is applied as a unit by backends that can do so.

pub mod error;
pub mod memory;
pub mod pattern;
pub mod pipeline;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use pattern::KeyPattern;
pub use pipeline::{Command, Pipeline, Reply};
pub use traits::{HashEntry, KeyValueStore};
