//! Storage key layout.
//!
//! Every record occupies one hash entry and one string entry per streaming
//! field:
//!
//! ```text
//! repocket:<namespace>:<TypeName>:<primary key>                    (hash)
//! repocket:<namespace>:<TypeName>:<primary key>:field:<field name> (string)
//! ```
//!
//! Two records of the same type with the same primary key address the same
//! entries.

use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;

/// Literal first segment of every key Repocket writes.
pub const KEY_NAMESPACE: &str = "repocket";

/// Segment separating a hash key from a streaming field name.
pub const FIELD_SEGMENT: &str = "field";

/// Characters with special meaning in store key patterns.
const PATTERN_META: &[char] = &['*', '?', '[', ']', '\\'];

/// Address of a record's primary hash entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashKey {
    namespace: String,
    type_name: String,
    primary_key: String,
}

impl HashKey {
    pub fn new(
        namespace: impl Into<String>,
        type_name: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            type_name: type_name.into(),
            primary_key: primary_key.into(),
        }
    }

    /// Key prefix shared by every record of one type:
    /// `repocket:<namespace>:<TypeName>`.
    pub fn prefix(namespace: &str, type_name: &str) -> String {
        format!("{KEY_NAMESPACE}:{namespace}:{type_name}")
    }

    /// Parse a hash key of the form `repocket:<namespace>:<TypeName>:<pk>`.
    ///
    /// The namespace may itself contain `:`; the type name and primary key
    /// may not. Streaming field keys are rejected.
    pub fn parse(key: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let rest = key
            .strip_prefix(KEY_NAMESPACE)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(|| invalid("missing 'repocket:' prefix"))?;
        if rest.contains(&format!(":{FIELD_SEGMENT}:")) {
            return Err(invalid("streaming field keys do not address a record"));
        }

        let mut parts = rest.rsplitn(3, ':');
        let primary_key = parts.next().unwrap_or_default();
        let type_name = parts.next().ok_or_else(|| invalid("missing type name"))?;
        let namespace = parts.next().ok_or_else(|| invalid("missing namespace"))?;

        if namespace.is_empty() || type_name.is_empty() || primary_key.is_empty() {
            return Err(invalid("empty key segment"));
        }

        Ok(Self::new(namespace, type_name, primary_key))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Registry name of the record type: `<namespace>.<TypeName>`.
    pub fn compound_name(&self) -> String {
        format!("{}.{}", self.namespace, self.type_name)
    }

    /// Key of the string entry holding a streaming field.
    pub fn field_key(&self, field: &str) -> String {
        format!("{self}:{FIELD_SEGMENT}:{field}")
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            Self::prefix(&self.namespace, &self.type_name),
            self.primary_key
        )
    }
}

impl FromStr for HashKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Escape pattern metacharacters so `literal` matches only itself.
pub fn escape_pattern(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if PATTERN_META.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Returns `true` if `key` addresses a streaming field entry.
pub fn is_field_key(key: &str) -> bool {
    key.contains(&format!(":{FIELD_SEGMENT}:"))
}
