//! Attribute descriptors: the type system of record fields.
//!
//! An [`Attribute`] is a field descriptor, not a value. It knows how to
//! coerce raw input into its base type ([`Attribute::cast`]), how to render
//! a value as text ([`Attribute::to_string`]), and how to wrap that text in a
//! self-describing [`Envelope`] that can be decoded without any schema
//! ([`Attribute::from_envelope`]).
//!
//! # Invariants
//!
//! - `cast(cast(v)) == cast(v)` for every attribute and input.
//! - `from_envelope(to_envelope(v)) == cast(v)` for every non-null `v` the
//!   attribute can render.

use std::fmt;

use repocket_types::envelope::to_python_json;
use repocket_types::timestamp::{now, timestamp_from_epoch};
use repocket_types::{format_timestamp, parse_timestamp, Decimal, Envelope, HashKey, ATTRIBUTES_MODULE};
use uuid::Uuid;

use crate::error::{RepocketError, RepocketResult};
use crate::resolve::PointerResolver;
use crate::value::Value;

/// Strings treated as null by nullable attributes (compared case-insensitively).
const NULL_SENTINELS: &[&str] = &["null", "none"];

/// Attribute type names understood in envelopes, and the kind each decodes to.
///
/// `Attribute` is the legacy name of the untyped base attribute, which
/// stored raw bytes.
static ENVELOPE_TYPES: &[(&str, fn() -> AttributeKind)] = &[
    ("Attribute", || AttributeKind::Bytes),
    ("Bytes", || AttributeKind::Bytes),
    ("Unicode", || AttributeKind::Unicode),
    ("Integer", || AttributeKind::Integer),
    ("Float", || AttributeKind::Float),
    ("Decimal", || AttributeKind::Decimal),
    ("DateTime", || AttributeKind::DateTime),
    ("UUID", || AttributeKind::Uuid),
    ("AutoUUID", || AttributeKind::AutoUuid),
    ("JSON", || AttributeKind::Json),
    ("Pointer", || AttributeKind::Pointer { target: None }),
    ("ByteStream", || AttributeKind::ByteStream),
];

/// Text encoding applied when converting between bytes and text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

impl TextEncoding {
    pub fn decode(self, bytes: &[u8]) -> Result<String, String> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string()),
            Self::Latin1 => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
        }
    }

    pub fn encode(self, text: &str) -> Result<Vec<u8>, String> {
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| format!("{c:?} is not latin-1")))
                .collect(),
        }
    }
}

/// The semantic type an attribute enforces.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Bytes,
    Unicode,
    Integer,
    Float,
    Decimal,
    DateTime,
    Uuid,
    /// UUID that doubles as the record's primary key.
    AutoUuid,
    Json,
    /// Soft reference to a record of the `<namespace>.<TypeName>` target.
    /// `None` accepts any registered type (used when decoding envelopes).
    Pointer { target: Option<String> },
    /// Append-only bytes persisted outside the hash entry.
    ByteStream,
}

impl AttributeKind {
    /// Type name written into envelopes.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bytes => "Bytes",
            Self::Unicode => "Unicode",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Decimal => "Decimal",
            Self::DateTime => "DateTime",
            Self::Uuid => "UUID",
            Self::AutoUuid => "AutoUUID",
            Self::Json => "JSON",
            Self::Pointer { .. } => "Pointer",
            Self::ByteStream => "ByteStream",
        }
    }

    /// Look up the kind named by an envelope's module and type.
    pub fn from_envelope_names(module: &str, type_name: &str) -> Option<Self> {
        if module != ATTRIBUTES_MODULE {
            return None;
        }
        ENVELOPE_TYPES
            .iter()
            .find(|(name, _)| *name == type_name)
            .map(|(_, make)| make())
    }

    pub fn is_primary_key(&self) -> bool {
        matches!(self, Self::AutoUuid)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::ByteStream)
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pointer { target: Some(t) } => write!(f, "Pointer({t})"),
            other => f.write_str(other.type_name()),
        }
    }
}

/// Where an attribute's empty value comes from.
#[derive(Clone)]
pub enum EmptyValue {
    /// The kind's own empty value (`""`, empty bytes, zero, or null).
    Natural,
    Static(Value),
    /// Computed on every request, e.g. "now".
    Lazy(fn() -> Value),
}

impl fmt::Debug for EmptyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Natural => f.write_str("Natural"),
            Self::Static(v) => f.debug_tuple("Static").field(v).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

/// A typed field descriptor.
#[derive(Clone, Debug)]
pub struct Attribute {
    kind: AttributeKind,
    nullable: bool,
    empty: EmptyValue,
    encoding: TextEncoding,
}

impl Attribute {
    pub fn new(kind: AttributeKind) -> Self {
        Self {
            kind,
            nullable: false,
            empty: EmptyValue::Natural,
            encoding: TextEncoding::Utf8,
        }
    }

    pub fn bytes() -> Self {
        Self::new(AttributeKind::Bytes)
    }

    /// Unicode text.
    pub fn text() -> Self {
        Self::new(AttributeKind::Unicode)
    }

    pub fn integer() -> Self {
        Self::new(AttributeKind::Integer)
    }

    pub fn float() -> Self {
        Self::new(AttributeKind::Float)
    }

    pub fn decimal() -> Self {
        Self::new(AttributeKind::Decimal)
    }

    pub fn datetime() -> Self {
        Self::new(AttributeKind::DateTime)
    }

    pub fn uuid() -> Self {
        Self::new(AttributeKind::Uuid)
    }

    /// Primary-key UUID, generated on first save.
    pub fn auto_uuid() -> Self {
        Self::new(AttributeKind::AutoUuid)
    }

    pub fn json() -> Self {
        Self::new(AttributeKind::Json)
    }

    /// Soft reference to records of type `target` (`<namespace>.<TypeName>`).
    pub fn pointer(target: impl Into<String>) -> Self {
        Self::new(AttributeKind::Pointer {
            target: Some(target.into()),
        })
    }

    /// Append-only bytes stored in their own string entry.
    pub fn byte_stream() -> Self {
        Self::new(AttributeKind::ByteStream)
    }

    /// Accept null (and the `"null"`/`"none"` sentinels) as a cast result.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Substitute `value` when no input is given.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.empty = EmptyValue::Static(value.into());
        self
    }

    /// Compute the empty value on demand.
    pub fn lazy_default(mut self, make: fn() -> Value) -> Self {
        self.empty = EmptyValue::Lazy(make);
        self
    }

    /// Default to the current time (date/time attributes).
    pub fn auto_now(self) -> Self {
        self.lazy_default(|| Value::Timestamp(now()))
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn text_encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Target record type of a pointer attribute.
    pub fn pointer_target(&self) -> Option<&str> {
        match &self.kind {
            AttributeKind::Pointer { target } => target.as_deref(),
            _ => None,
        }
    }

    /// The value substituted when no input is given.
    pub fn empty_value(&self) -> Value {
        match &self.empty {
            EmptyValue::Static(v) => v.clone(),
            EmptyValue::Lazy(make) => make(),
            EmptyValue::Natural => match self.kind {
                AttributeKind::Bytes | AttributeKind::ByteStream => Value::Bytes(Vec::new()),
                AttributeKind::Unicode => Value::Text(String::new()),
                AttributeKind::Integer => Value::Integer(0),
                AttributeKind::Float => Value::Float(0.0),
                AttributeKind::Decimal => Value::Decimal(Decimal::zero()),
                _ => Value::Null,
            },
        }
    }

    /// A fresh time-ordered identifier for primary-key attributes.
    pub fn generate(&self) -> Option<Value> {
        self.kind
            .is_primary_key()
            .then(|| Value::Uuid(Uuid::now_v7()))
    }

    // -----------------------------------------------------------------------
    // Casting
    // -----------------------------------------------------------------------

    /// Coerce a raw value into this attribute's base type.
    ///
    /// Pointer attributes can only follow hash-key strings through
    /// [`cast_with`](Self::cast_with); here such input is a reference error.
    pub fn cast(&self, raw: impl Into<Value>) -> RepocketResult<Value> {
        self.cast_with(raw.into(), None)
    }

    /// Coerce a raw value, resolving pointer keys through `resolver`.
    pub fn cast_with(
        &self,
        raw: Value,
        resolver: Option<&dyn PointerResolver>,
    ) -> RepocketResult<Value> {
        self.cast_value(raw, resolver, true)
    }

    fn cast_value(
        &self,
        raw: Value,
        resolver: Option<&dyn PointerResolver>,
        sentinels: bool,
    ) -> RepocketResult<Value> {
        if self.nullable && sentinels {
            if let Value::Text(s) = &raw {
                if is_null_sentinel(s) {
                    return Ok(Value::Null);
                }
            }
        }
        if raw.is_null() {
            return Ok(if self.nullable {
                Value::Null
            } else {
                self.empty_value()
            });
        }

        match &self.kind {
            AttributeKind::Bytes | AttributeKind::ByteStream => self.cast_bytes(raw),
            AttributeKind::Unicode => self.cast_text(raw),
            AttributeKind::Integer => self.cast_integer(raw),
            AttributeKind::Float => self.cast_float(raw),
            AttributeKind::Decimal => self.cast_decimal(raw),
            AttributeKind::DateTime => self.cast_datetime(raw),
            AttributeKind::Uuid | AttributeKind::AutoUuid => self.cast_uuid(raw),
            AttributeKind::Json => self.cast_json(raw),
            AttributeKind::Pointer { target } => self.cast_pointer(raw, target.as_deref(), resolver),
        }
    }

    fn cast_error(&self, raw: &Value, reason: impl Into<String>) -> RepocketError {
        RepocketError::Cast {
            attribute: self.type_name(),
            value: raw.to_string(),
            reason: reason.into(),
        }
    }

    /// Text form of scalar values shared by the text and bytes casts.
    fn scalar_text(&self, raw: &Value) -> RepocketResult<String> {
        match raw {
            Value::Text(s) => Ok(s.clone()),
            Value::Bytes(b) => self.encoding.decode(b).map_err(|e| self.cast_error(raw, e)),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(format!("{f:?}")),
            Value::Decimal(d) => Ok(d.to_string()),
            Value::Timestamp(t) => Ok(format_timestamp(t)),
            Value::Uuid(u) => Ok(u.to_string()),
            Value::Json(j) => to_python_json(j).map_err(|e| self.cast_error(raw, e.to_string())),
            Value::Record(_) | Value::Null => Err(self.cast_error(raw, "not a scalar value")),
        }
    }

    fn cast_bytes(&self, raw: Value) -> RepocketResult<Value> {
        match raw {
            Value::Bytes(b) => Ok(Value::Bytes(b)),
            other => {
                let text = self.scalar_text(&other)?;
                let bytes = self
                    .encoding
                    .encode(&text)
                    .map_err(|e| self.cast_error(&other, e))?;
                Ok(Value::Bytes(bytes))
            }
        }
    }

    fn cast_text(&self, raw: Value) -> RepocketResult<Value> {
        match raw {
            Value::Text(s) => Ok(Value::Text(s)),
            other => self.scalar_text(&other).map(Value::Text),
        }
    }

    fn cast_integer(&self, raw: Value) -> RepocketResult<Value> {
        match &raw {
            Value::Integer(i) => Ok(Value::Integer(*i)),
            Value::Text(s) => s
                .trim()
                .parse()
                .map(Value::Integer)
                .map_err(|e| self.cast_error(&raw, e.to_string())),
            Value::Float(f) => {
                let truncated = f.trunc();
                if truncated.is_finite()
                    && truncated >= i64::MIN as f64
                    && truncated <= i64::MAX as f64
                {
                    Ok(Value::Integer(truncated as i64))
                } else {
                    Err(self.cast_error(&raw, "out of integer range"))
                }
            }
            Value::Decimal(d) => d
                .trunc_i64()
                .map(Value::Integer)
                .ok_or_else(|| self.cast_error(&raw, "out of integer range")),
            _ => Err(self.cast_error(&raw, "not a number")),
        }
    }

    fn cast_float(&self, raw: Value) -> RepocketResult<Value> {
        match &raw {
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Integer(i) => Ok(Value::Float(*i as f64)),
            Value::Decimal(d) => Ok(Value::Float(d.to_f64())),
            Value::Text(s) => s
                .trim()
                .parse()
                .map(Value::Float)
                .map_err(|e| self.cast_error(&raw, e.to_string())),
            _ => Err(self.cast_error(&raw, "not a number")),
        }
    }

    fn cast_decimal(&self, raw: Value) -> RepocketResult<Value> {
        let parsed = match &raw {
            Value::Decimal(d) => Ok(d.clone()),
            Value::Integer(i) => Ok(Decimal::from(*i)),
            Value::Float(f) => Decimal::from_f64(*f),
            Value::Text(s) => Decimal::parse(s),
            _ => return Err(self.cast_error(&raw, "not a number")),
        };
        parsed
            .map(Value::Decimal)
            .map_err(|e| self.cast_error(&raw, e.to_string()))
    }

    fn cast_datetime(&self, raw: Value) -> RepocketResult<Value> {
        let parsed = match &raw {
            Value::Timestamp(t) => Ok(*t),
            Value::Text(s) => parse_timestamp(s),
            Value::Integer(secs) => timestamp_from_epoch(*secs),
            Value::Bytes(b) => {
                let text = self.encoding.decode(b).map_err(|e| self.cast_error(&raw, e))?;
                parse_timestamp(&text)
            }
            _ => return Err(self.cast_error(&raw, "not a date/time")),
        };
        parsed
            .map(Value::Timestamp)
            .map_err(|e| self.cast_error(&raw, e.to_string()))
    }

    fn cast_uuid(&self, raw: Value) -> RepocketResult<Value> {
        let parsed = match &raw {
            Value::Uuid(u) => Ok(*u),
            Value::Text(s) => Uuid::parse_str(s.trim()),
            Value::Bytes(b) if b.len() == 16 => Uuid::from_slice(b),
            Value::Bytes(b) => {
                let text = self.encoding.decode(b).map_err(|e| self.cast_error(&raw, e))?;
                Uuid::parse_str(text.trim())
            }
            _ => return Err(self.cast_error(&raw, "not a UUID")),
        };
        parsed
            .map(Value::Uuid)
            .map_err(|e| self.cast_error(&raw, e.to_string()))
    }

    fn cast_json(&self, raw: Value) -> RepocketResult<Value> {
        use serde_json::Value as J;
        let json = match raw {
            Value::Json(j) => j,
            // Text that is not valid JSON is kept as a JSON string.
            Value::Text(s) => serde_json::from_str(&s).unwrap_or(J::String(s)),
            Value::Bytes(b) => {
                let text = self
                    .encoding
                    .decode(&b)
                    .map_err(|e| self.cast_error(&Value::Bytes(b.clone()), e))?;
                serde_json::from_str(&text).unwrap_or(J::String(text))
            }
            Value::Integer(i) => J::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(J::Number)
                .ok_or_else(|| self.cast_error(&Value::Float(f), "not representable in JSON"))?,
            Value::Record(r) => r.to_simple(),
            other => other.to_simple(),
        };
        Ok(Value::Json(json))
    }

    fn cast_pointer(
        &self,
        raw: Value,
        target: Option<&str>,
        resolver: Option<&dyn PointerResolver>,
    ) -> RepocketResult<Value> {
        let key_text = match raw {
            Value::Record(record) => {
                let name = record.record_type().compound_name();
                if target.is_some_and(|t| t != name) {
                    return Err(self.cast_error(
                        &Value::Record(record.clone()),
                        format!("expected a {}", target.unwrap_or_default()),
                    ));
                }
                return Ok(Value::Record(record));
            }
            Value::Text(s) => s,
            Value::Bytes(b) => match self.encoding.decode(&b) {
                Ok(text) => text,
                Err(e) => return Err(self.cast_error(&Value::Bytes(b), e)),
            },
            other => return Err(self.cast_error(&other, "not a record or hash key")),
        };

        let key = HashKey::parse(&key_text)
            .map_err(|e| self.cast_error(&Value::Text(key_text.clone()), e.to_string()))?;
        if let Some(t) = target {
            if key.compound_name() != t {
                return Err(self.cast_error(
                    &Value::Text(key_text),
                    format!("expected a {t}"),
                ));
            }
        }

        let resolver = resolver.ok_or_else(|| {
            RepocketError::Reference(format!("cannot follow pointer {key} without a store"))
        })?;
        match resolver.resolve_pointer(&key)? {
            Some(record) => Ok(Value::Record(Box::new(record))),
            None => {
                tracing::warn!(key = %key, "pointer target does not exist; resolving to null");
                Ok(Value::Null)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Render a value as stable text. Null renders as `None`.
    pub fn to_string(&self, value: &Value) -> RepocketResult<Option<String>> {
        if value.is_null() {
            return Ok(None);
        }
        let serialization_error = |reason: String| RepocketError::Serialization {
            attribute: self.type_name(),
            reason,
        };

        if let AttributeKind::Pointer { .. } = self.kind {
            return match value {
                Value::Record(record) => {
                    if record.get_id().is_null() {
                        return Err(RepocketError::Reference(format!(
                            "cannot point to an unsaved {}",
                            record.record_type().compound_name()
                        )));
                    }
                    Ok(Some(record.hash_key()?.to_string()))
                }
                Value::Text(s) => HashKey::parse(s)
                    .map(|k| Some(k.to_string()))
                    .map_err(|e| serialization_error(e.to_string())),
                other => Err(serialization_error(format!(
                    "pointer holds a {} value",
                    other.kind_name()
                ))),
            };
        }

        let value = self
            .cast_value(value.clone(), None, false)
            .map_err(|e| serialization_error(e.to_string()))?;
        let text = match &value {
            Value::Null => return Ok(None),
            Value::Bytes(b) => self
                .encoding
                .decode(b)
                .map_err(|e| serialization_error(e))?,
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format!("{f:?}"),
            Value::Decimal(d) => d.to_string(),
            Value::Timestamp(t) => format_timestamp(t),
            Value::Uuid(u) => u.to_string(),
            Value::Json(j) => to_python_json(j).map_err(|e| serialization_error(e.to_string()))?,
            Value::Record(_) => return Err(serialization_error("unexpected record".into())),
        };
        Ok(Some(text))
    }

    /// Wrap a value in its self-describing envelope.
    pub fn to_envelope(&self, value: &Value) -> RepocketResult<Envelope> {
        Ok(Envelope::new(self.type_name(), self.to_string(value)?))
    }

    /// Envelope JSON text, as stored in a record's hash entry.
    pub fn to_json(&self, value: &Value) -> RepocketResult<String> {
        Ok(self.to_envelope(value)?.to_json()?)
    }

    /// Decode an envelope using the attribute type it names.
    ///
    /// Fails with a resolution error when the named type is unknown.
    pub fn from_envelope(
        envelope: &Envelope,
        resolver: Option<&dyn PointerResolver>,
    ) -> RepocketResult<Value> {
        let kind = AttributeKind::from_envelope_names(&envelope.module, &envelope.type_name)
            .ok_or_else(|| {
                RepocketError::Resolution(format!(
                    "unknown attribute type {}",
                    envelope.qualified_type()
                ))
            })?;
        match &envelope.value {
            None => Ok(Value::Null),
            Some(text) => Attribute::new(kind).cast_with(Value::Text(text.clone()), resolver),
        }
    }

    /// Decode envelope JSON text.
    pub fn from_json(text: &str, resolver: Option<&dyn PointerResolver>) -> RepocketResult<Value> {
        Self::from_envelope(&Envelope::from_json(text)?, resolver)
    }

    /// Decode an envelope into a value for this attribute's field.
    ///
    /// Envelopes naming this attribute's own type are decoded with this
    /// attribute (so its encoding and pointer target apply); any other
    /// known type is decoded by that type and then cast.
    pub fn decode_envelope(
        &self,
        envelope: &Envelope,
        resolver: Option<&dyn PointerResolver>,
    ) -> RepocketResult<Value> {
        let own_type =
            envelope.module == ATTRIBUTES_MODULE && envelope.type_name == self.type_name();
        let raw = match (&envelope.value, own_type) {
            (None, _) => Value::Null,
            (Some(text), true) => Value::Text(text.clone()),
            (Some(_), false) => Self::from_envelope(envelope, resolver)?,
        };
        // Stored text is never a null sentinel: "null" saved in a text
        // field stays text.
        self.cast_value(raw, resolver, false)
    }

    // -----------------------------------------------------------------------
    // Matching
    // -----------------------------------------------------------------------

    /// Compare a stored value against an expected raw value.
    ///
    /// Pointers compare by the referenced hash key, so matching never needs
    /// to load the target. An expected record that was never saved has no
    /// key to compare and is a reference error.
    pub fn matches(&self, current: &Value, expected: Value) -> RepocketResult<bool> {
        if let AttributeKind::Pointer { .. } = self.kind {
            let expected = match expected {
                Value::Null => None,
                Value::Record(record) => {
                    if record.get_id().is_null() {
                        return Err(RepocketError::Reference(format!(
                            "cannot match against an unsaved {}",
                            record.record_type().compound_name()
                        )));
                    }
                    Some(record.hash_key()?)
                }
                Value::Text(s) => Some(
                    HashKey::parse(&s)
                        .map_err(|e| self.cast_error(&Value::Text(s.clone()), e.to_string()))?,
                ),
                other => return Err(self.cast_error(&other, "not a record or hash key")),
            };
            return Ok(pointer_key(current) == expected);
        }
        Ok(self.cast(expected)? == *current)
    }
}

fn pointer_key(value: &Value) -> Option<HashKey> {
    match value {
        Value::Record(r) if !r.get_id().is_null() => r.hash_key().ok(),
        Value::Text(s) => HashKey::parse(s).ok(),
        _ => None,
    }
}

fn is_null_sentinel(s: &str) -> bool {
    let trimmed = s.trim();
    NULL_SENTINELS.iter().any(|n| trimmed.eq_ignore_ascii_case(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use proptest::prelude::*;

    const TEST_UUID: &str = "3112edba-4b5d-11e5-b02e-6c4008a70392";

    fn roundtrip(attr: &Attribute, raw: Value) {
        let cast = attr.cast(raw.clone()).unwrap();
        let json = attr.to_json(&raw).unwrap();
        let back = Attribute::from_json(&json, None).unwrap();
        assert_eq!(back, cast, "round-trip through {json}");
    }

    // -----------------------------------------------------------------------
    // Envelopes
    // -----------------------------------------------------------------------

    #[test]
    fn unicode_envelope_layout() {
        let json = Attribute::text().to_json(&Value::from("chucknorris")).unwrap();
        assert_eq!(
            json,
            r#"{"module": "repocket.attributes", "type": "Unicode", "value": "chucknorris"}"#
        );
    }

    #[test]
    fn auto_uuid_envelope_layout() {
        let env = Attribute::auto_uuid().to_envelope(&Value::from(TEST_UUID)).unwrap();
        assert_eq!(env, Envelope::new("AutoUUID", Some(TEST_UUID.into())));
    }

    #[test]
    fn datetime_envelope_uses_iso_8601() {
        let env = Attribute::datetime()
            .to_envelope(&Value::from("Tue Aug 25 15:57:37 EDT 2015"))
            .unwrap();
        assert_eq!(env.type_name, "DateTime");
        assert_eq!(env.value.as_deref(), Some("2015-08-25T15:57:37-04:00"));
    }

    #[test]
    fn datetime_null_serializes_to_null() {
        let env = Attribute::datetime().nullable().to_envelope(&Value::Null).unwrap();
        assert_eq!(env.value, None);
        assert_eq!(Attribute::from_envelope(&env, None).unwrap(), Value::Null);
    }

    #[test]
    fn legacy_base_attribute_decodes_to_bytes() {
        let value = Attribute::from_json(
            r#"{"module": "repocket.attributes", "type": "Attribute", "value": "foobar"}"#,
            None,
        )
        .unwrap();
        assert_eq!(value, Value::Bytes(b"foobar".to_vec()));
    }

    #[test]
    fn from_envelope_decodes_datetime_text() {
        let env = Envelope::new("DateTime", Some("Tue Aug 25 15:57:37 EDT 2015".into()));
        let value = Attribute::from_envelope(&env, None).unwrap();
        let ts = value.as_timestamp().unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2015, 8, 25));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (15, 57, 37));
    }

    #[test]
    fn unknown_type_is_a_resolution_error() {
        let env = Envelope::new("Complex", Some("1+2j".into()));
        assert!(matches!(
            Attribute::from_envelope(&env, None),
            Err(RepocketError::Resolution(_))
        ));

        let foreign = Envelope {
            module: "someone.else".into(),
            type_name: "Unicode".into(),
            value: Some("x".into()),
        };
        assert!(matches!(
            Attribute::from_envelope(&foreign, None),
            Err(RepocketError::Resolution(_))
        ));
    }

    #[test]
    fn roundtrips_for_every_scalar_kind() {
        roundtrip(&Attribute::bytes(), Value::from(b"sometoken"));
        roundtrip(&Attribute::text(), Value::from("foo@bar.com"));
        roundtrip(&Attribute::integer(), Value::from(-42));
        roundtrip(&Attribute::float(), Value::from(2.5));
        roundtrip(&Attribute::float(), Value::from(1.0));
        roundtrip(&Attribute::decimal(), Value::from("19.990"));
        roundtrip(&Attribute::datetime(), Value::from("2015-08-25 15:57:37-04:00"));
        roundtrip(&Attribute::uuid(), Value::from(TEST_UUID));
        roundtrip(&Attribute::auto_uuid(), Value::from(TEST_UUID));
        roundtrip(
            &Attribute::json(),
            Value::Json(serde_json::json!({"yay": "this is json baby!", "n": [1, 2.5]})),
        );
        roundtrip(&Attribute::json(), Value::from("plain text, not json"));
        roundtrip(&Attribute::byte_stream(), Value::from("hello\n"));
    }

    #[test]
    fn decode_envelope_keeps_null_text_as_text() {
        let attr = Attribute::text().nullable();
        assert_eq!(attr.cast("null").unwrap(), Value::Null);
        // Text already held by a field is rendered as-is.
        let env = attr.to_envelope(&Value::from("null")).unwrap();
        assert_eq!(env.value.as_deref(), Some("null"));
        assert_eq!(attr.decode_envelope(&env, None).unwrap(), Value::from("null"));

        let stored = Envelope::new("Unicode", Some("None".into()));
        assert_eq!(
            attr.decode_envelope(&stored, None).unwrap(),
            Value::from("None")
        );
    }

    #[test]
    fn decode_envelope_uses_field_encoding() {
        let attr = Attribute::bytes().encoding(TextEncoding::Latin1);
        let raw = Value::Bytes(vec![0x63, 0x61, 0x66, 0xe9]);
        let env = attr.to_envelope(&raw).unwrap();
        assert_eq!(env.value.as_deref(), Some("café"));
        assert_eq!(attr.decode_envelope(&env, None).unwrap(), raw);
    }

    #[test]
    fn decode_envelope_casts_other_types() {
        let env = Attribute::integer().to_envelope(&Value::from(7)).unwrap();
        let value = Attribute::text().decode_envelope(&env, None).unwrap();
        assert_eq!(value, Value::from("7"));
    }

    // -----------------------------------------------------------------------
    // Casting
    // -----------------------------------------------------------------------

    #[test]
    fn uuid_cast_accepts_typed_text_and_raw_bytes() {
        let id = Uuid::parse_str(TEST_UUID).unwrap();
        let attr = Attribute::auto_uuid();
        assert_eq!(attr.cast(id).unwrap(), Value::Uuid(id));
        assert_eq!(attr.cast(TEST_UUID).unwrap(), Value::Uuid(id));
        assert_eq!(attr.cast(id.as_bytes().to_vec()).unwrap(), Value::Uuid(id));
    }

    #[test]
    fn malformed_uuid_is_a_cast_error() {
        let err = Attribute::uuid().cast("not-a-uuid").unwrap_err();
        assert!(matches!(err, RepocketError::Cast { attribute: "UUID", .. }));
    }

    #[test]
    fn null_sentinels_only_for_nullable() {
        let nullable = Attribute::text().nullable();
        assert_eq!(nullable.cast("NULL").unwrap(), Value::Null);
        assert_eq!(nullable.cast(" None ").unwrap(), Value::Null);
        assert_eq!(Attribute::text().cast("null").unwrap(), Value::from("null"));
        assert_eq!(
            Attribute::uuid().nullable().cast("none").unwrap(),
            Value::Null
        );
    }

    #[test]
    fn null_for_non_nullable_yields_empty_value() {
        assert_eq!(Attribute::text().cast(Value::Null).unwrap(), Value::from(""));
        assert_eq!(Attribute::integer().cast(Value::Null).unwrap(), Value::Integer(0));
        assert_eq!(
            Attribute::integer().default_value(5).cast(Value::Null).unwrap(),
            Value::Integer(5)
        );
    }

    #[test]
    fn numeric_casts() {
        assert_eq!(Attribute::integer().cast(" 12 ").unwrap(), Value::Integer(12));
        assert_eq!(Attribute::integer().cast(-7.9).unwrap(), Value::Integer(-7));
        assert!(Attribute::integer().cast("12.5").is_err());
        assert!(Attribute::integer().cast(f64::NAN).is_err());
        assert_eq!(Attribute::float().cast(3).unwrap(), Value::Float(3.0));
        assert_eq!(Attribute::float().cast("1e3").unwrap(), Value::Float(1000.0));
        assert_eq!(
            Attribute::decimal().cast(2).unwrap(),
            Value::Decimal(Decimal::from(2))
        );
        assert!(Attribute::decimal().cast("abc").is_err());
    }

    #[test]
    fn text_and_bytes_casts() {
        assert_eq!(Attribute::text().cast(b"abc").unwrap(), Value::from("abc"));
        assert_eq!(Attribute::text().cast(100).unwrap(), Value::from("100"));
        assert_eq!(Attribute::bytes().cast("abc").unwrap(), Value::from(b"abc"));
        assert!(Attribute::text().cast(vec![0xff, 0xfe]).is_err());
        assert!(Attribute::bytes()
            .encoding(TextEncoding::Latin1)
            .cast("日本")
            .is_err());
    }

    #[test]
    fn json_casts() {
        let attr = Attribute::json();
        assert_eq!(
            attr.cast(r#"{"a": 1}"#).unwrap(),
            Value::Json(serde_json::json!({"a": 1}))
        );
        assert_eq!(attr.cast(5).unwrap(), Value::Json(serde_json::json!(5)));
        assert_eq!(
            attr.cast("not json").unwrap(),
            Value::Json(serde_json::json!("not json"))
        );
    }

    #[test]
    fn json_to_string_is_canonical_text() {
        let text = Attribute::json()
            .to_string(&Value::Json(serde_json::json!({"b": 1, "a": [true, null]})))
            .unwrap();
        assert_eq!(text.as_deref(), Some(r#"{"a": [true, null], "b": 1}"#));
    }

    #[test]
    fn datetime_auto_now_and_epoch() {
        let attr = Attribute::datetime().auto_now();
        assert!(attr.empty_value().as_timestamp().is_some());
        let epoch = Attribute::datetime().cast(86_400).unwrap();
        assert_eq!(epoch.as_timestamp().unwrap().day(), 2);
        assert!(Attribute::datetime().cast("whenever").is_err());
    }

    #[test]
    fn pointer_cast_without_resolver_is_a_reference_error() {
        let attr = Attribute::pointer("App.User");
        let key = format!("repocket:App:User:{TEST_UUID}");
        assert!(matches!(attr.cast(key), Err(RepocketError::Reference(_))));
    }

    #[test]
    fn pointer_matching_canonicalizes_keys() {
        let attr = Attribute::pointer("App.User").nullable();
        let key = format!("repocket:App:User:{TEST_UUID}");
        let current = Value::from(key.clone());
        assert!(attr.matches(&current, Value::from(key)).unwrap());
        assert!(!attr.matches(&current, Value::Null).unwrap());
        assert!(attr.matches(&Value::Null, Value::Null).unwrap());
        assert!(matches!(
            attr.matches(&current, Value::from("garbage")),
            Err(RepocketError::Cast { .. })
        ));
        assert!(matches!(
            attr.matches(&current, Value::Integer(1)),
            Err(RepocketError::Cast { .. })
        ));
    }

    #[test]
    fn pointer_cast_rejects_wrong_target_and_garbage() {
        let attr = Attribute::pointer("App.User");
        let other = format!("repocket:App:Post:{TEST_UUID}");
        assert!(matches!(attr.cast(other), Err(RepocketError::Cast { .. })));
        assert!(matches!(attr.cast("garbage"), Err(RepocketError::Cast { .. })));
        assert!(matches!(attr.cast(12), Err(RepocketError::Cast { .. })));
    }

    #[test]
    fn empty_values() {
        assert_eq!(Attribute::bytes().empty_value(), Value::Bytes(Vec::new()));
        assert_eq!(Attribute::byte_stream().empty_value(), Value::Bytes(Vec::new()));
        assert_eq!(Attribute::text().empty_value(), Value::from(""));
        assert_eq!(Attribute::auto_uuid().empty_value(), Value::Null);
        assert_eq!(Attribute::pointer("App.User").empty_value(), Value::Null);
        assert_eq!(Attribute::text().default_value("anon").empty_value(), Value::from("anon"));
    }

    #[test]
    fn generate_only_for_primary_keys() {
        let first = Attribute::auto_uuid().generate().unwrap();
        let second = Attribute::auto_uuid().generate().unwrap();
        assert_ne!(first, second);
        assert!(Attribute::uuid().generate().is_none());
    }

    #[test]
    fn kind_lookup_table() {
        for name in ["Bytes", "Unicode", "Integer", "Float", "Decimal", "DateTime", "UUID",
                     "AutoUUID", "JSON", "Pointer", "ByteStream"] {
            let kind = AttributeKind::from_envelope_names(ATTRIBUTES_MODULE, name).unwrap();
            assert_eq!(kind.type_name(), name);
        }
        assert!(AttributeKind::from_envelope_names(ATTRIBUTES_MODULE, "Nope").is_none());
    }

    #[test]
    fn matches_casts_expected_value() {
        let attr = Attribute::integer();
        assert!(attr.matches(&Value::Integer(3), Value::from("3")).unwrap());
        assert!(!attr.matches(&Value::Integer(3), Value::from("4")).unwrap());
        assert!(attr.matches(&Value::Integer(3), Value::from("x")).is_err());
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    fn scalar_attributes() -> Vec<Attribute> {
        vec![
            Attribute::bytes(),
            Attribute::text(),
            Attribute::text().nullable(),
            Attribute::integer(),
            Attribute::float(),
            Attribute::decimal(),
            Attribute::json(),
            Attribute::byte_stream(),
        ]
    }

    proptest! {
        #[test]
        fn cast_is_idempotent_for_text(s in "\\PC{0,24}") {
            for attr in scalar_attributes() {
                if let Ok(once) = attr.cast(s.as_str()) {
                    let twice = attr.cast(once.clone()).unwrap();
                    prop_assert_eq!(twice, once);
                }
            }
        }

        #[test]
        fn cast_is_idempotent_for_numbers(i in any::<i64>(), f in -1.0e12f64..1.0e12) {
            for attr in scalar_attributes() {
                for raw in [Value::Integer(i), Value::Float(f)] {
                    if let Ok(once) = attr.cast(raw) {
                        let twice = attr.cast(once.clone()).unwrap();
                        prop_assert_eq!(twice, once);
                    }
                }
            }
        }

        #[test]
        fn envelope_roundtrip_for_text(s in "\\PC{0,24}") {
            for attr in scalar_attributes() {
                if let Ok(cast) = attr.cast(s.as_str()) {
                    let json = attr.to_json(&cast).unwrap();
                    let decoded = attr.decode_envelope(&Envelope::from_json(&json).unwrap(), None).unwrap();
                    prop_assert_eq!(decoded, cast);
                }
            }
        }

        #[test]
        fn envelope_roundtrip_for_uuids(bytes in any::<[u8; 16]>()) {
            let attr = Attribute::uuid();
            let raw = Value::Uuid(Uuid::from_bytes(bytes));
            let json = attr.to_json(&raw).unwrap();
            prop_assert_eq!(Attribute::from_json(&json, None).unwrap(), attr.cast(raw).unwrap());
        }

        #[test]
        fn envelope_roundtrip_for_epoch_times(secs in 0i64..4_000_000_000) {
            let attr = Attribute::datetime();
            let raw = Value::Integer(secs);
            let json = attr.to_json(&raw).unwrap();
            prop_assert_eq!(Attribute::from_json(&json, None).unwrap(), attr.cast(raw).unwrap());
        }
    }
}
