//! Record instances: one typed value per declared field.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use repocket_store::{HashEntry, KeyValueStore, Pipeline};
use repocket_types::HashKey;
use uuid::Uuid;

use crate::attribute::AttributeKind;
use crate::error::{RepocketError, RepocketResult};
use crate::resolve::PointerResolver;
use crate::schema::{Field, RecordType};
use crate::value::Value;

/// The storage form of a record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SerializedRecord {
    /// Hash field name to envelope JSON text.
    pub hash: HashEntry,
    /// Streaming field name to raw bytes.
    pub strings: BTreeMap<String, Vec<u8>>,
}

/// Keys written by [`Record::save`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedKeys {
    pub hash: String,
    /// Streaming field name to its string key.
    pub strings: BTreeMap<String, String>,
}

/// An instance of a [`RecordType`].
///
/// Every declared field always holds a value that has been cast through
/// the field's attribute. The primary key is null until the first save
/// (unless given at construction) and cannot be reassigned through
/// [`set`](Self::set).
#[derive(Clone)]
pub struct Record {
    record_type: Arc<RecordType>,
    values: Vec<Value>,
}

impl Record {
    /// Build a record from `(field, raw value)` pairs. Omitted fields take
    /// their attribute's empty value.
    ///
    /// Pointer fields accept records only; use [`new_with`](Self::new_with)
    /// to follow hash-key strings.
    pub fn new<I, K, V>(record_type: Arc<RecordType>, fields: I) -> RepocketResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        Self::new_with(record_type, fields, None)
    }

    /// Build a record, resolving pointer hash keys through `resolver`.
    pub fn new_with<I, K, V>(
        record_type: Arc<RecordType>,
        fields: I,
        resolver: Option<&dyn PointerResolver>,
    ) -> RepocketResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = Self::empty(record_type);
        for (name, raw) in fields {
            let name = name.as_ref();
            let index = record
                .record_type
                .field_index(name)
                .ok_or_else(|| record.record_type.unknown_field(name))?;
            record.values[index] = record
                .record_type
                .field_at(index)
                .attribute()
                .cast_with(raw.into(), resolver)?;
        }
        Ok(record)
    }

    /// A record holding only empty values.
    pub fn empty(record_type: Arc<RecordType>) -> Self {
        let values = record_type
            .fields()
            .iter()
            .map(|f| f.attribute().empty_value())
            .collect();
        Self {
            record_type,
            values,
        }
    }

    /// Assemble a loaded record. Missing values take their empty value.
    pub(crate) fn from_parts(record_type: Arc<RecordType>, values: Vec<Option<Value>>) -> Self {
        let values = values
            .into_iter()
            .zip(record_type.fields())
            .map(|(v, f)| v.unwrap_or_else(|| f.attribute().empty_value()))
            .collect();
        Self {
            record_type,
            values,
        }
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    fn index_of(&self, name: &str) -> RepocketResult<usize> {
        self.record_type
            .field_index(name)
            .ok_or_else(|| self.record_type.unknown_field(name))
    }

    pub fn get(&self, name: &str) -> RepocketResult<&Value> {
        Ok(&self.values[self.index_of(name)?])
    }

    /// Assign a field. Streaming fields concatenate instead of replacing.
    pub fn set(&mut self, name: &str, raw: impl Into<Value>) -> RepocketResult<()> {
        let index = self.index_of(name)?;
        if index == self.record_type.primary_key_index() {
            return Err(RepocketError::ReadOnlyField {
                record: self.record_type.compound_name(),
                field: name.to_string(),
            });
        }
        let field = self.record_type.field_at(index);
        let value = field.attribute().cast(raw)?;
        if field.is_streaming() {
            if let (Value::Bytes(current), Some(more)) = (&mut self.values[index], value.as_bytes()) {
                current.extend_from_slice(more);
                return Ok(());
            }
        }
        self.values[index] = value;
        Ok(())
    }

    /// The primary key value (null before the first save).
    pub fn get_id(&self) -> &Value {
        &self.values[self.record_type.primary_key_index()]
    }

    pub fn id(&self) -> Option<Uuid> {
        self.get_id().as_uuid().copied()
    }

    pub fn is_saved(&self) -> bool {
        !self.get_id().is_null()
    }

    /// Assign a fresh primary key if the record has none. Returns whether
    /// one was generated.
    fn ensure_id(&mut self) -> bool {
        let index = self.record_type.primary_key_index();
        if !self.values[index].is_null() {
            return false;
        }
        match self.record_type.field_at(index).attribute().generate() {
            Some(id) => {
                self.values[index] = id;
                true
            }
            None => false,
        }
    }

    pub fn hash_key(&self) -> RepocketResult<HashKey> {
        let pk_field = self.record_type.primary_key();
        let pk = pk_field
            .attribute()
            .to_string(self.get_id())?
            .ok_or_else(|| {
                RepocketError::Reference(format!(
                    "{} has no primary key yet",
                    self.record_type.compound_name()
                ))
            })?;
        Ok(self.record_type.hash_key(&pk))
    }

    /// Key of the string entry holding a streaming field.
    pub fn field_key(&self, name: &str) -> RepocketResult<String> {
        self.index_of(name)?;
        Ok(self.hash_key()?.field_key(name))
    }

    pub fn key_prefix(&self) -> String {
        self.record_type.key_prefix()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Render every field into its storage form.
    ///
    /// A hash field that cannot be rendered is logged and stored as its
    /// empty value; pointer failures are returned.
    pub fn serialize(&self) -> RepocketResult<SerializedRecord> {
        let mut out = SerializedRecord::default();
        for (field, value) in self.record_type.fields().iter().zip(&self.values) {
            if field.is_streaming() {
                let bytes = value.as_bytes().unwrap_or_default().to_vec();
                out.strings.insert(field.name().to_string(), bytes);
                continue;
            }
            let attribute = field.attribute();
            let json = match attribute.to_json(value) {
                Ok(json) => json,
                Err(e @ RepocketError::Reference(_)) => return Err(e),
                Err(e) => {
                    tracing::error!(
                        record_type = %self.record_type,
                        field = field.name(),
                        value = %value,
                        error = %e,
                        "cannot serialize field; storing its empty value"
                    );
                    attribute.to_json(&attribute.empty_value())?
                }
            };
            out.hash.insert(field.name().to_string(), json);
        }
        Ok(out)
    }

    /// Write the record: one hash entry plus one string per streaming field,
    /// sent as a single pipeline. Assigns the primary key when missing; a
    /// failed save leaves it unassigned.
    pub fn save(&mut self, store: &dyn KeyValueStore) -> RepocketResult<SavedKeys> {
        let generated = self.ensure_id();
        let result = self.write(store);
        if result.is_err() && generated {
            self.values[self.record_type.primary_key_index()] = Value::Null;
        }
        result
    }

    fn write(&self, store: &dyn KeyValueStore) -> RepocketResult<SavedKeys> {
        let key = self.hash_key()?;
        let serialized = self.serialize()?;

        let hash = key.to_string();
        let mut pipeline = Pipeline::new();
        pipeline.hash_set(&hash, serialized.hash);
        let mut strings = BTreeMap::new();
        for (name, bytes) in serialized.strings {
            let field_key = key.field_key(&name);
            pipeline.string_set(&field_key, bytes);
            strings.insert(name, field_key);
        }
        store.execute(pipeline)?;

        tracing::debug!(key = %hash, streams = strings.len(), "saved record");
        Ok(SavedKeys { hash, strings })
    }

    /// Remove the hash entry and every streaming entry. Returns how many
    /// keys existed.
    pub fn delete(&self, store: &dyn KeyValueStore) -> RepocketResult<usize> {
        let key = self.hash_key()?;
        let mut keys = vec![key.to_string()];
        keys.extend(self.record_type.stream_fields().map(|f| key.field_key(f.name())));
        let removed = store.delete(&keys)?;
        tracing::debug!(key = %key, removed, "deleted record");
        Ok(removed)
    }

    /// Append to a streaming field in the store and in memory. Returns the
    /// streaming key.
    pub fn append(
        &mut self,
        store: &dyn KeyValueStore,
        name: &str,
        raw: impl Into<Value>,
    ) -> RepocketResult<String> {
        let index = self.index_of(name)?;
        let field = self.record_type.field_at(index);
        let raw = raw.into();
        if !field.is_streaming() {
            return Err(RepocketError::Cast {
                attribute: field.attribute().type_name(),
                value: raw.to_string(),
                reason: format!("{name} is not a streaming field"),
            });
        }
        let value = field.attribute().cast(raw)?;
        let chunk = value.as_bytes().unwrap_or_default();

        let key = self.field_key(name)?;
        let length = store.string_append(&key, chunk)?;
        if let Value::Bytes(current) = &mut self.values[index] {
            current.extend_from_slice(chunk);
        }
        tracing::debug!(key = %key, length, "appended to stream");
        Ok(key)
    }

    // -----------------------------------------------------------------------
    // Comparison
    // -----------------------------------------------------------------------

    /// Whether every `(field, expected)` pair matches. Expected values are
    /// cast through the field's attribute first.
    pub fn matches<I, K, V>(&self, criteria: I) -> RepocketResult<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, expected) in criteria {
            let index = self.index_of(name.as_ref())?;
            let attribute = self.record_type.field_at(index).attribute();
            if !attribute.matches(&self.values[index], expected.into())? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Equality that refuses to compare records of different types.
    pub fn try_eq(&self, other: &Record) -> RepocketResult<bool> {
        if !self.same_type(other) {
            return Err(RepocketError::TypeMismatch {
                left: self.to_string(),
                right: other.to_string(),
            });
        }
        Ok(self.same_values(other))
    }

    fn same_type(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.record_type, &other.record_type)
            || self.record_type.compound_name() == other.record_type.compound_name()
    }

    fn same_values(&self, other: &Record) -> bool {
        self.record_type
            .fields()
            .iter()
            .zip(self.values.iter().zip(&other.values))
            .all(|(field, (a, b))| match field.attribute().kind() {
                AttributeKind::Pointer { .. } => pointer_identity(a) == pointer_identity(b),
                _ => a == b,
            })
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Plain JSON object of the field values.
    pub fn to_simple(&self) -> serde_json::Value {
        let map = self
            .record_type
            .fields()
            .iter()
            .zip(&self.values)
            .map(|(f, v)| (f.name().to_string(), v.to_simple()))
            .collect();
        serde_json::Value::Object(map)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&Field, &Value)> + '_ {
        self.record_type.fields().iter().zip(&self.values)
    }
}

/// What identifies a pointer target: its hash key when saved, else itself.
fn pointer_identity(value: &Value) -> Result<String, &Value> {
    match value {
        Value::Record(r) => r.hash_key().map(|k| k.to_string()).map_err(|_| value),
        other => Err(other),
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.same_type(other) && self.same_values(other)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.record_type)?;
        let mut first = true;
        for (field, value) in self.fields() {
            if value.is_blank() {
                continue;
            }
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            match value {
                Value::Record(r) => match r.hash_key() {
                    Ok(key) => write!(f, "{}={key}", field.name())?,
                    Err(_) => write!(f, "{}={r}", field.name())?,
                },
                other => write!(f, "{}={other}", field.name())?,
            }
        }
        f.write_str(")")
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
