//! Dynamically typed field values.
//!
//! [`Value`] is the cell type of a [`Record`](crate::Record). It covers
//! everything a row can carry without a schema: scalars, timestamps, nested
//! JSON, and raw bytes (typically JSON that has not been decoded yet).
//!
//! [`SqlArg`] is the driver-ready form of a value, produced when a record or
//! filter is compiled. Complex values are JSON-marshaled to strings there.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StoreError;

/// A single dynamically typed field value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL `NULL` / JSON `null`.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// A point in time, always UTC.
    Timestamp(DateTime<Utc>),
    /// Nested JSON (objects and arrays).
    Json(serde_json::Value),
    /// Raw bytes; JSON payloads stay here until [`Record::normalise`](crate::Record::normalise).
    Bytes(Vec<u8>),
}

impl Value {
    /// Whether the value is [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, used in validation messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::Json(_) => "json",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Borrow the text, if this is [`Value::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert into the JSON representation used by
    /// [`Record::decode`](crate::Record::decode).
    ///
    /// Timestamps become RFC 3339 strings. Bytes become the JSON they
    /// contain, or a UTF-8 string when they are not JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for a NaN or infinite float, which
    /// JSON cannot represent.
    pub fn to_json(&self) -> Result<serde_json::Value, StoreError> {
        Ok(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::Number(finite_number(*f)?),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Timestamp(t) => serde_json::Value::String(format_timestamp(t)),
            Self::Json(v) => v.clone(),
            Self::Bytes(b) => serde_json::from_slice(b).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(b).into_owned())
            }),
        })
    }

    /// Convert into a driver-ready argument.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if a nested value cannot be
    /// marshaled and [`StoreError::Validation`] for a NaN or infinite float.
    pub fn to_sql_arg(&self) -> Result<SqlArg, StoreError> {
        Ok(match self {
            Self::Null => SqlArg::Null,
            Self::Bool(b) => SqlArg::Bool(*b),
            Self::Int(i) => SqlArg::Int(*i),
            Self::Float(f) => {
                finite_number(*f)?;
                SqlArg::Float(*f)
            }
            Self::Text(s) => SqlArg::Text(s.clone()),
            Self::Timestamp(t) => SqlArg::Timestamp(*t),
            Self::Json(v) => SqlArg::Json(serde_json::to_string(v)?),
            Self::Bytes(b) => SqlArg::Bytes(b.clone()),
        })
    }
}

/// Fixed-width RFC 3339: always six fractional digits and a `Z` suffix.
///
/// SQLite compares timestamps as text, so every stored value must have the
/// same width for lexical order to match chronological order.
pub(crate) fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn finite_number(f: f64) -> Result<serde_json::Number, StoreError> {
    serde_json::Number::from_f64(f)
        .ok_or_else(|| StoreError::Validation(format!("float {f} is not finite")))
}

/// Parse the timestamp formats the supported drivers hand back as text.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::Text(s),
            nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::Json(nested)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(id: uuid::Uuid) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Self>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) if !f.is_finite() => Err(serde::ser::Error::custom(format!(
                "float {f} is not finite"
            ))),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Timestamp(t) => serializer.serialize_str(&format_timestamp(t)),
            Self::Json(v) => v.serialize(serializer),
            Self::Bytes(_) => self
                .to_json()
                .map_err(serde::ser::Error::custom)?
                .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

/// A driver-ready query argument.
///
/// Values are never interpolated into SQL text; they travel to the driver
/// as one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    /// SQL `NULL`, left for the server to type.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Text.
    Text(String),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// A JSON document, already marshaled.
    Json(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}
