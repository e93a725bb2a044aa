//! Dynamic value model for tracked arguments and results
//!
//! Tracked functions exchange values through a small JSON-shaped union
//! instead of concrete Rust types, so calls with arbitrary payloads can be
//! compared against history and persisted with one codec. Maps preserve
//! insertion order; the codec never canonicalizes key order.

mod codec;

pub use codec::{decode, encode, encode_args, SerializationError, OPAQUE_KEY};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Number;

/// A value passed to or returned from a tracked function.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Ordered string-keyed map. Key order is significant for comparison.
    Map(Vec<(String, Value)>),
    /// Placeholder for a value exempt from comparison and persistence.
    /// Stored as a sentinel token and restored as this marker on replay.
    Opaque,
}

impl Value {
    /// Convert any serde-serializable value into the union.
    ///
    /// Goes through `serde_json`, so map keys end up in that crate's
    /// (sorted) order. Deterministic across runs, which is all the
    /// comparison logic needs.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, SerializationError> {
        Ok(serde_json::to_value(value)?.into())
    }

    /// Convert the value back into a concrete type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, SerializationError> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Value::Opaque)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a key in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("<unencodable>"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(Number::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(Number::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(Number::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        // Non-finite floats have no JSON form; store them as null,
        // matching serde_json's own conversion.
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// A live call argument: the real value plus whether it is exempt from
/// comparison against history.
#[derive(Debug, Clone)]
pub struct Arg {
    value: Value,
    opaque: bool,
}

impl Arg {
    /// An ordinary argument, compared against history by encoded form.
    pub fn plain(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            opaque: false,
        }
    }

    /// An argument exempt from comparison. The real value is still handed
    /// to the wrapped function; a recorded call at this position matches
    /// regardless of what was stored there.
    pub fn opaque(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            opaque: true,
        }
    }

    /// Build a plain argument from any serde-serializable value.
    pub fn serialize<T: Serialize>(value: &T) -> Result<Self, SerializationError> {
        Ok(Self::plain(Value::from_serialize(value)?))
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::plain(value)
    }
}

/// Shorthand for [`Arg::opaque`].
pub fn opaque(value: impl Into<Value>) -> Arg {
    Arg::opaque(value)
}
