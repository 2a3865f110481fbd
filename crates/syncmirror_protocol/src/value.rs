//! Field values and their declared kinds.

use serde::{Deserialize, Serialize};

/// The primitive kind of an entity field, as declared in a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// UTF-8 text.
    String,
    /// 64-bit float.
    Number,
    /// Boolean flag.
    Boolean,
    /// Instant, milliseconds since the Unix epoch.
    Date,
    /// Ordered list of values.
    Array,
    /// Arbitrary JSON document.
    Json,
    /// 64-bit integer.
    BigInt,
    /// Raw bytes.
    Binary,
    /// Server-defined value the client stores but never interprets.
    Opaque,
}

impl FieldKind {
    /// Returns the wire name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Array => "array",
            FieldKind::Json => "json",
            FieldKind::BigInt => "bigint",
            FieldKind::Binary => "binary",
            FieldKind::Opaque => "opaque",
        }
    }

    /// Parses a wire name into a kind.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(FieldKind::String),
            "number" => Some(FieldKind::Number),
            "boolean" => Some(FieldKind::Boolean),
            "date" => Some(FieldKind::Date),
            "array" => Some(FieldKind::Array),
            "json" => Some(FieldKind::Json),
            "bigint" => Some(FieldKind::BigInt),
            "binary" => Some(FieldKind::Binary),
            "opaque" => Some(FieldKind::Opaque),
            _ => None,
        }
    }
}

/// A single field value carried by a record.
///
/// Values are tagged so that kinds survive a round trip through the durable
/// store even where the underlying encodings overlap (`Number` vs `Date` vs
/// `BigInt`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// UTF-8 text.
    Text(String),
    /// 64-bit float.
    Number(f64),
    /// Boolean flag.
    Boolean(bool),
    /// Instant, milliseconds since the Unix epoch.
    Date(i64),
    /// Ordered list of values.
    Array(Vec<FieldValue>),
    /// Arbitrary JSON document.
    Json(serde_json::Value),
    /// 64-bit integer.
    BigInt(i64),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Server-defined value the client stores but never interprets.
    Opaque(String),
}

impl FieldValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::String,
            FieldValue::Number(_) => FieldKind::Number,
            FieldValue::Boolean(_) => FieldKind::Boolean,
            FieldValue::Date(_) => FieldKind::Date,
            FieldValue::Array(_) => FieldKind::Array,
            FieldValue::Json(_) => FieldKind::Json,
            FieldValue::BigInt(_) => FieldKind::BigInt,
            FieldValue::Binary(_) => FieldKind::Binary,
            FieldValue::Opaque(_) => FieldKind::Opaque,
        }
    }

    /// Returns true if this value matches the declared kind.
    pub fn matches(&self, kind: FieldKind) -> bool {
        self.kind() == kind
    }

    /// Returns the text content, if this is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric content, if this is a `Number` value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a `Boolean` value.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the epoch-millisecond instant, if this is a `Date` value.
    pub fn as_date(&self) -> Option<i64> {
        match self {
            FieldValue::Date(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Returns the integer content, if this is a `BigInt` value.
    pub fn as_bigint(&self) -> Option<i64> {
        match self {
            FieldValue::BigInt(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}
