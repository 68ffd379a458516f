use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::pattern::KeyPattern;
use crate::pipeline::{Command, Pipeline, Reply};
use crate::traits::{HashEntry, KeyValueStore};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Entry {
    Hash(HashEntry),
    Str(Vec<u8>),
}

type Entries = BTreeMap<String, Entry>;

/// In-memory, `BTreeMap`-based key-value store.
///
/// Intended for tests and embedding. Entries live behind a `RwLock`; key
/// scans return keys in lexicographic order. Pipelines are applied under a
/// single write lock and rolled back if any command fails.
///
/// The store can be switched offline with [`set_available`] to exercise
/// connectivity-failure paths.
///
/// [`set_available`]: InMemoryStore::set_available
pub struct InMemoryStore {
    entries: RwLock<Entries>,
    available: AtomicBool,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// Remove all entries from the store.
    pub fn clear(&self) {
        self.entries.write().expect("lock poisoned").clear();
    }

    /// Sorted list of every key in the store.
    pub fn all_keys(&self) -> Vec<String> {
        self.entries
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Simulate the store going offline (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store is offline".into()))
        }
    }

    fn read_entries(&self) -> StoreResult<RwLockReadGuard<'_, Entries>> {
        self.check_available()?;
        self.entries
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write_entries(&self) -> StoreResult<RwLockWriteGuard<'_, Entries>> {
        self.check_available()?;
        self.entries
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type(key: &str, expected: &'static str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
    }
}

fn apply_hash_set(entries: &mut Entries, key: &str, fields: &HashEntry) -> StoreResult<()> {
    let entry = entries
        .entry(key.to_string())
        .or_insert_with(|| Entry::Hash(HashEntry::new()));
    match entry {
        Entry::Hash(existing) => {
            existing.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(())
        }
        Entry::Str(_) => Err(wrong_type(key, "hash")),
    }
}

fn apply_string_set(entries: &mut Entries, key: &str, value: &[u8]) -> StoreResult<()> {
    // Like SET, replaces whatever was there, hash or string.
    entries.insert(key.to_string(), Entry::Str(value.to_vec()));
    Ok(())
}

fn apply_string_append(entries: &mut Entries, key: &str, value: &[u8]) -> StoreResult<usize> {
    let entry = entries
        .entry(key.to_string())
        .or_insert_with(|| Entry::Str(Vec::new()));
    match entry {
        Entry::Str(existing) => {
            existing.extend_from_slice(value);
            Ok(existing.len())
        }
        Entry::Hash(_) => Err(wrong_type(key, "string")),
    }
}

fn apply_delete(entries: &mut Entries, keys: &[String]) -> usize {
    keys.iter().filter(|k| entries.remove(k.as_str()).is_some()).count()
}

fn apply(entries: &mut Entries, command: &Command) -> StoreResult<Reply> {
    match command {
        Command::HashSet { key, fields } => apply_hash_set(entries, key, fields).map(|()| Reply::Ok),
        Command::StringSet { key, value } => {
            apply_string_set(entries, key, value).map(|()| Reply::Ok)
        }
        Command::StringAppend { key, value } => {
            apply_string_append(entries, key, value).map(Reply::Length)
        }
        Command::Delete { keys } => Ok(Reply::Deleted(apply_delete(entries, keys))),
    }
}

impl KeyValueStore for InMemoryStore {
    fn hash_set(&self, key: &str, fields: &HashEntry) -> StoreResult<()> {
        let mut entries = self.write_entries()?;
        apply_hash_set(&mut entries, key, fields)
    }

    fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashEntry>> {
        let entries = self.read_entries()?;
        match entries.get(key) {
            None => Ok(None),
            Some(Entry::Hash(fields)) => Ok(Some(fields.clone())),
            Some(Entry::Str(_)) => Err(wrong_type(key, "hash")),
        }
    }

    fn keys_matching(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let compiled = KeyPattern::parse(pattern)?;
        let entries = self.read_entries()?;
        Ok(entries
            .keys()
            .filter(|k| compiled.matches(k))
            .cloned()
            .collect())
    }

    fn string_set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut entries = self.write_entries()?;
        apply_string_set(&mut entries, key, value)
    }

    fn string_get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let entries = self.read_entries()?;
        match entries.get(key) {
            None => Ok(None),
            Some(Entry::Str(value)) => Ok(Some(value.clone())),
            Some(Entry::Hash(_)) => Err(wrong_type(key, "string")),
        }
    }

    fn string_append(&self, key: &str, value: &[u8]) -> StoreResult<usize> {
        let mut entries = self.write_entries()?;
        apply_string_append(&mut entries, key, value)
    }

    fn delete(&self, keys: &[String]) -> StoreResult<usize> {
        let mut entries = self.write_entries()?;
        Ok(apply_delete(&mut entries, keys))
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.read_entries()?.contains_key(key))
    }

    fn execute(&self, pipeline: Pipeline) -> StoreResult<Vec<Reply>> {
        let mut entries = self.write_entries()?;

        // Snapshot every key the pipeline touches so a failure part-way
        // through leaves the store as it was.
        let mut snapshot: BTreeMap<String, Option<Entry>> = BTreeMap::new();
        for command in pipeline.commands() {
            for key in command.keys() {
                snapshot
                    .entry(key.to_string())
                    .or_insert_with(|| entries.get(key).cloned());
            }
        }

        let mut replies = Vec::with_capacity(pipeline.len());
        for command in pipeline.commands() {
            match apply(&mut entries, command) {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    for (key, previous) in snapshot {
                        match previous {
                            Some(entry) => entries.insert(key, entry),
                            None => entries.remove(&key),
                        };
                    }
                    return Err(e);
                }
            }
        }

        debug!(commands = replies.len(), "executed pipeline");
        Ok(replies)
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryStore")
            .field("key_count", &count)
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashEntry {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Hashes
    // -----------------------------------------------------------------------

    #[test]
    fn hash_set_and_get_all() {
        let store = InMemoryStore::new();
        store.hash_set("h", &fields(&[("a", "1"), ("b", "2")])).unwrap();
        let read_back = store.hash_get_all("h").unwrap().expect("should exist");
        assert_eq!(read_back, fields(&[("a", "1"), ("b", "2")]));
    }

    #[test]
    fn hash_set_merges_fields() {
        let store = InMemoryStore::new();
        store.hash_set("h", &fields(&[("a", "1"), ("b", "2")])).unwrap();
        store.hash_set("h", &fields(&[("b", "3"), ("c", "4")])).unwrap();
        let read_back = store.hash_get_all("h").unwrap().unwrap();
        assert_eq!(read_back, fields(&[("a", "1"), ("b", "3"), ("c", "4")]));
    }

    #[test]
    fn hash_get_all_missing_returns_none() {
        let store = InMemoryStore::new();
        assert!(store.hash_get_all("missing").unwrap().is_none());
    }

    #[test]
    fn hash_ops_on_strings_fail() {
        let store = InMemoryStore::new();
        store.string_set("s", b"x").unwrap();
        assert!(matches!(
            store.hash_get_all("s"),
            Err(StoreError::WrongType { expected: "hash", .. })
        ));
        assert!(store.hash_set("s", &fields(&[("a", "1")])).is_err());
    }

    // -----------------------------------------------------------------------
    // Strings
    // -----------------------------------------------------------------------

    #[test]
    fn string_set_get_and_append() {
        let store = InMemoryStore::new();
        store.string_set("s", b"hello\n").unwrap();
        assert_eq!(store.string_append("s", b"world\n").unwrap(), 12);
        assert_eq!(store.string_get("s").unwrap().unwrap(), b"hello\nworld\n");
    }

    #[test]
    fn append_creates_missing_string() {
        let store = InMemoryStore::new();
        assert_eq!(store.string_append("s", b"abc").unwrap(), 3);
        assert_eq!(store.string_get("s").unwrap().unwrap(), b"abc");
    }

    #[test]
    fn string_get_on_hash_fails() {
        let store = InMemoryStore::new();
        store.hash_set("h", &fields(&[("a", "1")])).unwrap();
        assert!(store.string_get("h").is_err());
        assert!(store.string_append("h", b"x").is_err());
    }

    // -----------------------------------------------------------------------
    // Keys
    // -----------------------------------------------------------------------

    #[test]
    fn keys_matching_filters_and_sorts() {
        let store = InMemoryStore::new();
        store.string_set("repocket:App:User:2", b"").unwrap();
        store.string_set("repocket:App:User:1", b"").unwrap();
        store.string_set("repocket:App:Post:1", b"").unwrap();
        let keys = store.keys_matching("repocket:App:User:*").unwrap();
        assert_eq!(keys, vec!["repocket:App:User:1", "repocket:App:User:2"]);
    }

    #[test]
    fn keys_matching_rejects_bad_pattern() {
        let store = InMemoryStore::new();
        assert!(store.keys_matching("[oops").is_err());
    }

    #[test]
    fn delete_counts_existing_keys() {
        let store = InMemoryStore::new();
        store.string_set("a", b"1").unwrap();
        store.hash_set("b", &fields(&[("x", "y")])).unwrap();
        let removed = store
            .delete(&["a".to_string(), "b".to_string(), "c".to_string()])
            .unwrap();
        assert_eq!(removed, 2);
        assert!(!store.exists("a").unwrap());
        assert!(!store.exists("b").unwrap());
        assert!(store.is_empty());
    }

    // -----------------------------------------------------------------------
    // Pipelines
    // -----------------------------------------------------------------------

    #[test]
    fn pipeline_applies_in_order() {
        let store = InMemoryStore::new();
        let mut pipe = Pipeline::new();
        pipe.hash_set("h", fields(&[("a", "1")]))
            .string_set("s", b"ab".to_vec())
            .string_append("s", b"cd".to_vec())
            .delete(["missing"]);
        let replies = store.execute(pipe).unwrap();
        assert_eq!(
            replies,
            vec![Reply::Ok, Reply::Ok, Reply::Length(4), Reply::Deleted(0)]
        );
        assert_eq!(store.string_get("s").unwrap().unwrap(), b"abcd");
    }

    #[test]
    fn failed_pipeline_rolls_back() {
        let store = InMemoryStore::new();
        store.string_set("s", b"keep").unwrap();

        let mut pipe = Pipeline::new();
        pipe.hash_set("h", fields(&[("a", "1")]))
            .string_set("t", b"new".to_vec())
            .hash_set("s", fields(&[("a", "1")]));
        assert!(store.execute(pipe).is_err());

        assert!(!store.exists("h").unwrap());
        assert!(!store.exists("t").unwrap());
        assert_eq!(store.string_get("s").unwrap().unwrap(), b"keep");
    }

    #[test]
    fn default_execute_runs_sequentially() {
        // Exercise the trait's default implementation through a thin wrapper.
        struct Passthrough(InMemoryStore);
        impl KeyValueStore for Passthrough {
            fn hash_set(&self, key: &str, fields: &HashEntry) -> StoreResult<()> {
                self.0.hash_set(key, fields)
            }
            fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashEntry>> {
                self.0.hash_get_all(key)
            }
            fn keys_matching(&self, pattern: &str) -> StoreResult<Vec<String>> {
                self.0.keys_matching(pattern)
            }
            fn string_set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
                self.0.string_set(key, value)
            }
            fn string_get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
                self.0.string_get(key)
            }
            fn string_append(&self, key: &str, value: &[u8]) -> StoreResult<usize> {
                self.0.string_append(key, value)
            }
            fn delete(&self, keys: &[String]) -> StoreResult<usize> {
                self.0.delete(keys)
            }
            fn exists(&self, key: &str) -> StoreResult<bool> {
                self.0.exists(key)
            }
        }

        let store = Passthrough(InMemoryStore::new());
        let mut pipe = Pipeline::new();
        pipe.string_append("s", b"x".to_vec())
            .string_append("s", b"y".to_vec());
        let replies = store.execute(pipe).unwrap();
        assert_eq!(replies, vec![Reply::Length(1), Reply::Length(2)]);
    }

    // -----------------------------------------------------------------------
    // Availability
    // -----------------------------------------------------------------------

    #[test]
    fn offline_store_reports_unavailable() {
        let store = InMemoryStore::new();
        store.string_set("s", b"x").unwrap();
        store.set_available(false);

        let err = store.string_get("s").unwrap_err();
        assert!(err.is_unavailable());
        assert!(store.execute(Pipeline::new()).unwrap_err().is_unavailable());

        store.set_available(true);
        assert_eq!(store.string_get("s").unwrap().unwrap(), b"x");
    }

    #[test]
    fn concurrent_appends_are_all_applied() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..10 {
                        store.string_append("log", b".").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(store.string_get("log").unwrap().unwrap().len(), 80);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryStore::new();
        store.string_set("x", b"1").unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryStore"));
        assert!(debug.contains("key_count"));
    }
}
