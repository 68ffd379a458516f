//! Record type declarations.
//!
//! A [`RecordType`] is built once, validated, and then shared immutably
//! (behind an `Arc`) by every record and manager of that type.

use std::fmt;

use repocket_types::HashKey;

use crate::attribute::Attribute;
use crate::error::{RepocketError, RepocketResult};

/// Name of the primary key synthesized when a type declares none.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// One declared field.
#[derive(Clone, Debug)]
pub struct Field {
    name: String,
    attribute: Attribute,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    pub fn is_streaming(&self) -> bool {
        self.attribute.kind().is_streaming()
    }
}

/// Immutable descriptor of a record type: namespace, name, fields, and
/// the partition of those fields into hash and streaming storage.
#[derive(Clone, Debug)]
pub struct RecordType {
    namespace: String,
    name: String,
    fields: Vec<Field>,
    primary_key: usize,
    hash_fields: Vec<usize>,
    stream_fields: Vec<usize>,
}

impl RecordType {
    pub fn builder(namespace: impl Into<String>, name: impl Into<String>) -> RecordTypeBuilder {
        RecordTypeBuilder {
            namespace: namespace.into(),
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry name: `<namespace>.<TypeName>`.
    pub fn compound_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Key prefix shared by all records of this type.
    pub fn key_prefix(&self) -> String {
        HashKey::prefix(&self.namespace, &self.name)
    }

    /// Hash key of the record whose primary key renders as `pk`.
    pub fn hash_key(&self, pk: &str) -> HashKey {
        HashKey::new(&self.namespace, &self.name, pk)
    }

    /// All fields, in declaration order (a synthesized primary key first).
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub(crate) fn field_at(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    pub fn primary_key(&self) -> &Field {
        &self.fields[self.primary_key]
    }

    pub(crate) fn primary_key_index(&self) -> usize {
        self.primary_key
    }

    /// Fields stored inside the hash entry.
    pub fn hash_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.hash_fields.iter().map(|i| &self.fields[*i])
    }

    /// Fields stored as separate append-only strings.
    pub fn stream_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.stream_fields.iter().map(|i| &self.fields[*i])
    }

    /// `UnknownField` error for `field` on this type.
    pub(crate) fn unknown_field(&self, field: &str) -> RepocketError {
        RepocketError::UnknownField {
            record: self.compound_name(),
            field: field.to_string(),
            available: self.field_names(),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// Collects field declarations and validates them in [`build`](Self::build).
#[derive(Debug)]
pub struct RecordTypeBuilder {
    namespace: String,
    name: String,
    fields: Vec<Field>,
}

impl RecordTypeBuilder {
    pub fn field(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.fields.push(Field {
            name: name.into(),
            attribute,
        });
        self
    }

    /// Validate the declaration and partition its fields.
    ///
    /// Fails when the namespace or name is empty, when the name contains
    /// `:` or `.`, when a field name is empty or repeated, or when more than
    /// one field is an AutoUUID. Without an AutoUUID field an `id` primary
    /// key is added.
    pub fn build(self) -> RepocketResult<RecordType> {
        let Self {
            namespace,
            name,
            mut fields,
        } = self;

        if namespace.is_empty() || name.is_empty() {
            return Err(RepocketError::Definition(
                "record types need a namespace and a name".into(),
            ));
        }
        if name.contains(':') || name.contains('.') {
            return Err(RepocketError::Definition(format!(
                "type name {name:?} may not contain ':' or '.'"
            )));
        }

        for (i, field) in fields.iter().enumerate() {
            if field.name.is_empty() || field.name.contains(':') {
                return Err(RepocketError::Definition(format!(
                    "{namespace}.{name} has an invalid field name {:?}",
                    field.name
                )));
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(RepocketError::Definition(format!(
                    "{namespace}.{name} declares field {:?} twice",
                    field.name
                )));
            }
        }

        let keys: Vec<String> = fields
            .iter()
            .filter(|f| f.attribute.kind().is_primary_key())
            .map(|f| f.name.clone())
            .collect();
        let primary_key = match keys.as_slice() {
            [] => {
                if fields.iter().any(|f| f.name == DEFAULT_PRIMARY_KEY) {
                    return Err(RepocketError::Definition(format!(
                        "{namespace}.{name} declares {DEFAULT_PRIMARY_KEY:?} but not as an AutoUUID"
                    )));
                }
                fields.insert(
                    0,
                    Field {
                        name: DEFAULT_PRIMARY_KEY.to_string(),
                        attribute: Attribute::auto_uuid(),
                    },
                );
                0
            }
            [_] => fields
                .iter()
                .position(|f| f.attribute.kind().is_primary_key())
                .unwrap_or_default(),
            [first, second, ..] => {
                return Err(RepocketError::Definition(format!(
                    "{namespace}.{name} has two primary keys: {first:?} and {second:?}"
                )));
            }
        };

        let (stream_fields, hash_fields): (Vec<usize>, Vec<usize>) =
            (0..fields.len()).partition(|i| fields[*i].is_streaming());

        Ok(RecordType {
            namespace,
            name,
            fields,
            primary_key,
            hash_fields,
            stream_fields,
        })
    }
}
