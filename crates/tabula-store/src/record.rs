//! Schema-less row representation.
//!
//! A [`Record`] maps field names to [`Value`]s. Keys are kept in a
//! [`BTreeMap`] so iteration (and therefore compiled SQL) is deterministic.
//! Records are plain owned data: clone before handing one to another task.

use std::collections::BTreeMap;
use std::collections::btree_map;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dialect::{Dialect, validate_identifier};
use crate::error::StoreError;
use crate::value::{SqlArg, Value, format_timestamp, parse_timestamp};

/// A row: field name to dynamically typed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

/// Parallel arrays produced by [`Record::prepare_for_db`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRecord {
    /// Column names, in sorted order.
    pub keys: Vec<String>,
    /// Driver-ready values, matching `keys`.
    pub values: Vec<SqlArg>,
    /// Positional placeholders (`$1`, `$2`, ... or `?`), matching `keys`.
    pub placeholders: Vec<String>,
}

impl Record {
    /// Create an empty record.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Borrow a field. Absent fields are `None`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the field is present and not null.
    pub fn has(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|v| !v.is_null())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Field names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate over fields in sorted key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Overlay `other` onto this record; fields in `other` win.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Unwrap into the underlying map.
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }

    // =====================================================================
    // Typed accessors. Absent or unconvertible fields yield the zero value.
    // =====================================================================

    /// Text form of a field, or `""`.
    pub fn string(&self, key: &str) -> String {
        match self.0.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::Text(s)) => s.clone(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Int(i)) => i.to_string(),
            Some(Value::Float(f)) => f.to_string(),
            Some(Value::Timestamp(t)) => format_timestamp(t),
            Some(Value::Json(serde_json::Value::String(s))) => s.clone(),
            Some(Value::Json(v)) => v.to_string(),
            Some(Value::Bytes(b)) => String::from_utf8(b.clone()).unwrap_or_default(),
        }
    }

    /// Integer form of a field, or `0`. Fails to `0` when out of `i32` range.
    pub fn int(&self, key: &str) -> i32 {
        i32::try_from(self.int64(key)).unwrap_or(0)
    }

    /// 64-bit integer form of a field, or `0`.
    ///
    /// Floats are truncated; numeric strings are parsed.
    pub fn int64(&self, key: &str) -> i64 {
        match self.0.get(key) {
            Some(Value::Int(i)) => *i,
            Some(Value::Float(f)) => float_to_i64(*f),
            Some(Value::Bool(b)) => i64::from(*b),
            Some(Value::Text(s)) => parse_i64(s),
            Some(Value::Json(serde_json::Value::Number(n))) => n
                .as_i64()
                .or_else(|| n.as_f64().map(float_to_i64))
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Float form of a field, or `0.0`.
    #[allow(clippy::cast_precision_loss)]
    pub fn float(&self, key: &str) -> f64 {
        match self.0.get(key) {
            Some(Value::Float(f)) => *f,
            Some(Value::Int(i)) => *i as f64,
            Some(Value::Bool(b)) => f64::from(u8::from(*b)),
            Some(Value::Text(s)) => s.trim().parse().unwrap_or(0.0),
            Some(Value::Json(serde_json::Value::Number(n))) => n.as_f64().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Boolean form of a field, or `false`.
    ///
    /// Accepts `1`/`t`/`true` and `0`/`f`/`false` in any case for text.
    pub fn bool(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Int(i)) => *i != 0,
            Some(Value::Float(f)) => *f != 0.0,
            Some(Value::Text(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "t" | "true"),
            Some(Value::Json(serde_json::Value::Bool(b))) => *b,
            _ => false,
        }
    }

    /// Timestamp form of a field, or the Unix epoch.
    ///
    /// Text is parsed as RFC 3339 (or the SQLite `YYYY-MM-DD HH:MM:SS`
    /// form); integers are read as Unix seconds.
    pub fn time(&self, key: &str) -> DateTime<Utc> {
        let parsed = match self.0.get(key) {
            Some(Value::Timestamp(t)) => Some(*t),
            Some(Value::Text(s)) => parse_timestamp(s),
            Some(Value::Int(secs)) => DateTime::from_timestamp(*secs, 0),
            _ => None,
        };
        parsed.unwrap_or_default()
    }

    // =====================================================================
    // Conversion
    // =====================================================================

    /// Decode byte-encoded JSON and stringify timestamps, in place.
    ///
    /// Bytes that are not valid JSON and all other variants are left as
    /// they are. Running it twice changes nothing further.
    pub fn normalise(&mut self) {
        for value in self.0.values_mut() {
            match value {
                Value::Bytes(bytes) => {
                    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(bytes) {
                        *value = Value::from(json);
                    }
                }
                Value::Timestamp(t) => {
                    *value = Value::Text(format_timestamp(t));
                }
                _ => {}
            }
        }
    }

    /// Produce column names, driver values, and placeholders for an
    /// `INSERT`. Does not modify the record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for a key that is not a valid
    /// identifier or a non-finite float, and [`StoreError::Serialization`]
    /// if a nested value cannot be marshaled.
    pub fn prepare_for_db(&self, dialect: Dialect) -> Result<PreparedRecord, StoreError> {
        let mut prepared = PreparedRecord {
            keys: Vec::with_capacity(self.0.len()),
            values: Vec::with_capacity(self.0.len()),
            placeholders: Vec::with_capacity(self.0.len()),
        };

        for (position, (key, value)) in (1_usize..).zip(&self.0) {
            validate_identifier(key)?;
            prepared.keys.push(key.clone());
            prepared.values.push(value.to_sql_arg()?);
            prepared.placeholders.push(dialect.placeholder(position));
        }

        Ok(prepared)
    }

    /// Decode into a typed value through a JSON round-trip.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if `T` cannot represent the record and
    /// [`StoreError::Validation`] for a non-finite float field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.to_json()?).map_err(StoreError::Decode)
    }

    /// Encode a serializable value into a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the value cannot be
    /// serialized and [`StoreError::Validation`] if it is not a JSON object.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(value)? {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)))
                .collect()),
            other => Err(StoreError::Validation(format!(
                "expected an object to build a record, got {other}"
            ))),
        }
    }

    /// JSON object view of the record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for a NaN or infinite float.
    pub fn to_json(&self) -> Result<serde_json::Value, StoreError> {
        self.0
            .iter()
            .map(|(key, value)| Ok((key.clone(), value.to_json()?)))
            .collect::<Result<serde_json::Map<_, _>, StoreError>>()
            .map(serde_json::Value::Object)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_i64(f: f64) -> i64 {
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        f.trunc() as i64
    } else {
        0
    }
}

fn parse_i64(s: &str) -> i64 {
    let trimmed = s.trim();
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().map(float_to_i64))
        .unwrap_or(0)
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
