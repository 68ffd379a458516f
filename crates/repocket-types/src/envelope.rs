//! The self-describing envelope that wraps every persisted attribute value.
//!
//! On the wire an envelope is a JSON object with exactly three entries:
//!
//! ```text
//! {"module": "repocket.attributes", "type": "Unicode", "value": "foo@bar.com"}
//! ```
//!
//! Stores written by other Repocket implementations contain envelopes in the
//! layout produced by Python's `json.dumps` (`", "` and `": "` separators,
//! non-ASCII escaped as `\uXXXX`). [`Envelope::to_json`] reproduces that
//! layout exactly; [`Envelope::from_json`] accepts any valid JSON object.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;

use crate::error::TypeError;

/// Namespace carried in the `module` entry of every built-in attribute.
pub const ATTRIBUTES_MODULE: &str = "repocket.attributes";

/// Serialized form of one attribute value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Namespace defining the attribute type.
    pub module: String,
    /// Attribute type name within `module`.
    #[serde(rename = "type")]
    pub type_name: String,
    /// String-encoded value; `None` encodes null.
    pub value: Option<String>,
}

impl Envelope {
    /// Build an envelope for a built-in attribute type.
    pub fn new(type_name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            module: ATTRIBUTES_MODULE.to_string(),
            type_name: type_name.into(),
            value,
        }
    }

    /// Encode as JSON text in the canonical interoperable layout.
    pub fn to_json(&self) -> Result<String, TypeError> {
        to_python_json(self)
    }

    /// Decode from JSON text. Entry order and whitespace are irrelevant.
    pub fn from_json(text: &str) -> Result<Self, TypeError> {
        serde_json::from_str(text).map_err(|e| TypeError::MalformedEnvelope(e.to_string()))
    }

    /// Fully-qualified attribute type name, e.g. `repocket.attributes.Unicode`.
    pub fn qualified_type(&self) -> String {
        format!("{}.{}", self.module, self.type_name)
    }
}

/// Serialize any value as JSON text using the `json.dumps` layout.
pub fn to_python_json<T: Serialize + ?Sized>(value: &T) -> Result<String, TypeError> {
    let mut buf = Vec::with_capacity(64);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PythonFormatter);
    value
        .serialize(&mut ser)
        .map_err(|e| TypeError::Serialization(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| TypeError::Serialization(e.to_string()))
}

/// `serde_json` formatter matching Python's default `json.dumps` output.
struct PythonFormatter;

impl Formatter for PythonFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    // serde_json has already escaped quotes, backslashes and control
    // characters; everything left outside printable ASCII becomes \uXXXX.
    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        if fragment.bytes().all(|b| b < 0x7f) {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if (ch as u32) < 0x7f {
                let mut byte = [0u8; 4];
                writer.write_all(ch.encode_utf8(&mut byte).as_bytes())?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}
