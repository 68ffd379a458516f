//! Per-type access to stored records.

use std::fmt;
use std::sync::Arc;

use repocket_store::KeyValueStore;
use repocket_types::{escape_pattern, is_field_key, HashKey};

use crate::config::RepocketConfig;
use crate::error::{RepocketError, RepocketResult};
use crate::record::{Record, SavedKeys};
use crate::registry::Registry;
use crate::resolve::Loader;
use crate::schema::RecordType;
use crate::value::Value;

/// Loads, lists, filters and writes records of one type.
///
/// Cheap to clone; every clone shares the same store and registry.
#[derive(Clone)]
pub struct Manager {
    record_type: Arc<RecordType>,
    registry: Arc<Registry>,
    store: Arc<dyn KeyValueStore>,
    config: Arc<RepocketConfig>,
}

impl Manager {
    pub fn new(
        record_type: Arc<RecordType>,
        registry: Arc<Registry>,
        store: Arc<dyn KeyValueStore>,
        config: Arc<RepocketConfig>,
    ) -> Self {
        Self {
            record_type,
            registry,
            store,
            config,
        }
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    fn loader(&self) -> Loader<'_> {
        Loader::new(&self.registry, self.store.as_ref(), &self.config)
    }

    fn check_type(&self, record: &Record) -> RepocketResult<()> {
        if record.record_type().compound_name() == self.record_type.compound_name() {
            Ok(())
        } else {
            Err(RepocketError::TypeMismatch {
                left: self.record_type.compound_name(),
                right: record.to_string(),
            })
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Load the record with primary key `pk`. Absent records (and store
    /// read failures) yield `Ok(None)`.
    pub fn get(&self, pk: impl Into<Value>) -> RepocketResult<Option<Record>> {
        let attribute = self.record_type.primary_key().attribute();
        let pk = attribute.cast(pk)?;
        let Some(pk) = attribute.to_string(&pk)? else {
            return Ok(None);
        };
        self.loader().load(&self.record_type, &self.record_type.hash_key(&pk))
    }

    /// Hash keys of every stored record of this type.
    fn scan(&self) -> Vec<HashKey> {
        let pattern = format!("{}:*", escape_pattern(&self.record_type.key_prefix()));
        let keys = match self.store.keys_matching(&pattern) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "key scan failed; no records listed");
                return Vec::new();
            }
        };
        let compound = self.record_type.compound_name();
        keys.iter()
            .filter(|key| !is_field_key(key))
            .filter_map(|key| HashKey::parse(key).ok())
            .filter(|key| key.compound_name() == compound)
            .collect()
    }

    /// Every stored record of this type. Records removed between the scan
    /// and their load are skipped.
    pub fn all(&self) -> RepocketResult<Vec<Record>> {
        let loader = self.loader();
        let mut records = Vec::new();
        for key in self.scan() {
            match loader.load(&self.record_type, &key)? {
                Some(record) => records.push(record),
                None => tracing::debug!(key = %key, "record vanished during scan"),
            }
        }
        Ok(records)
    }

    /// Records whose fields all equal the given values.
    pub fn filter<I, K, V>(&self, criteria: I) -> RepocketResult<Vec<Record>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let criteria: Vec<(String, Value)> = criteria
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .collect();
        for (name, expected) in &criteria {
            let field = self
                .record_type
                .field(name)
                .ok_or_else(|| self.record_type.unknown_field(name))?;
            // Reject criteria that can never be compared, even on an empty store.
            field.attribute().matches(&Value::Null, expected.clone())?;
        }

        let mut matching = Vec::new();
        for record in self.all()? {
            if record.matches(criteria.iter().map(|(k, v)| (k.as_str(), v.clone())))? {
                matching.push(record);
            }
        }
        Ok(matching)
    }

    /// Number of stored records, without loading them.
    pub fn count(&self) -> usize {
        self.scan().len()
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// An unsaved record.
    pub fn build<I, K, V>(&self, fields: I) -> RepocketResult<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let loader = self.loader();
        Record::new_with(Arc::clone(&self.record_type), fields, Some(&loader))
    }

    /// Build and save a record.
    pub fn create<I, K, V>(&self, fields: I) -> RepocketResult<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = self.build(fields)?;
        record.save(self.store.as_ref())?;
        Ok(record)
    }

    pub fn save(&self, record: &mut Record) -> RepocketResult<SavedKeys> {
        self.check_type(record)?;
        record.save(self.store.as_ref())
    }

    pub fn delete(&self, record: &Record) -> RepocketResult<usize> {
        self.check_type(record)?;
        record.delete(self.store.as_ref())
    }

    /// Append to a streaming field of a saved record.
    pub fn append(
        &self,
        record: &mut Record,
        field: &str,
        value: impl Into<Value>,
    ) -> RepocketResult<String> {
        self.check_type(record)?;
        record.append(self.store.as_ref(), field, value)
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("record_type", &self.record_type.compound_name())
            .finish()
    }
}
