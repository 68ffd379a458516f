use std::collections::BTreeMap;

use crate::error::StoreResult;
use crate::pipeline::{Command, Pipeline, Reply};

/// Field/value pairs of one hash entry.
pub type HashEntry = BTreeMap<String, String>;

/// A key-value store holding hash and string entries.
///
/// All implementations must satisfy these invariants:
/// - Reading a missing key returns `Ok(None)`, not an error.
/// - `hash_set` merges fields into an existing hash; it never drops fields
///   that are not mentioned.
/// - Hash operations on a string entry (or the reverse) fail with
///   [`StoreError::WrongType`](crate::StoreError::WrongType).
/// - Connectivity failures surface as
///   [`StoreError::Unavailable`](crate::StoreError::Unavailable). Timeouts
///   and retries are the backend's own business.
pub trait KeyValueStore: Send + Sync {
    /// Merge `fields` into the hash stored at `key`, creating it if absent.
    fn hash_set(&self, key: &str, fields: &HashEntry) -> StoreResult<()>;

    /// Read every field of the hash stored at `key`.
    fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashEntry>>;

    /// List keys matching a glob pattern (`*`, `?`, `[...]`, `\` escapes).
    ///
    /// The listing is not a snapshot: keys written or removed concurrently
    /// may or may not appear.
    fn keys_matching(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Replace the string stored at `key`.
    fn string_set(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Read the string stored at `key`.
    fn string_get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Append to the string at `key`, creating it if absent. Returns the
    /// new length.
    fn string_append(&self, key: &str, value: &[u8]) -> StoreResult<usize>;

    /// Remove every listed key. Returns how many existed.
    fn delete(&self, keys: &[String]) -> StoreResult<usize>;

    /// Check whether any entry exists at `key`.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Execute a pipeline in one round-trip, returning one reply per command.
    ///
    /// Default implementation runs the commands one by one. Backends that
    /// can batch (or apply atomically) should override it.
    fn execute(&self, pipeline: Pipeline) -> StoreResult<Vec<Reply>> {
        pipeline
            .into_commands()
            .into_iter()
            .map(|command| match command {
                Command::HashSet { key, fields } => {
                    self.hash_set(&key, &fields).map(|()| Reply::Ok)
                }
                Command::StringSet { key, value } => {
                    self.string_set(&key, &value).map(|()| Reply::Ok)
                }
                Command::StringAppend { key, value } => {
                    self.string_append(&key, &value).map(Reply::Length)
                }
                Command::Delete { keys } => self.delete(&keys).map(Reply::Deleted),
            })
            .collect()
    }
}
