//! Canonical text encoding for tracked values
//!
//! Values are stored and compared as JSON text. Encoding is
//! order-preserving: a map serializes its entries in the order they were
//! built, so two structurally-equal maps with different key order encode
//! differently and will not match. [`Value::Opaque`] encodes as the
//! sentinel object `{"__opaque__": true}` and decodes back to the marker;
//! the original value is not recoverable.

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;
use thiserror::Error;

use super::Value;

/// Reserved map key marking a stored opaque sentinel.
pub const OPAQUE_KEY: &str = "__opaque__";

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("map key {OPAQUE_KEY:?} is reserved for opaque sentinels")]
    ReservedKey,
}

/// Encode a value to its canonical storage text.
///
/// Fails if a real map uses the reserved sentinel key, which keeps the
/// sentinel distinguishable from every representable value.
pub fn encode(value: &Value) -> Result<String, SerializationError> {
    check_reserved(value)?;
    Ok(serde_json::to_string(value)?)
}

/// Encode an argument list as one ordered JSON array.
pub fn encode_args(args: &[Value]) -> Result<String, SerializationError> {
    for arg in args {
        check_reserved(arg)?;
    }
    Ok(serde_json::to_string(args)?)
}

/// Decode storage text back into a value, restoring opaque markers.
pub fn decode(text: &str) -> Result<Value, SerializationError> {
    Ok(serde_json::from_str(text)?)
}

fn check_reserved(value: &Value) -> Result<(), SerializationError> {
    match value {
        Value::List(items) => items.iter().try_for_each(check_reserved),
        Value::Map(entries) => {
            for (key, nested) in entries {
                if key.as_str() == OPAQUE_KEY {
                    return Err(SerializationError::ReservedKey);
                }
                check_reserved(nested)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Opaque => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(OPAQUE_KEY, &true)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("any JSON value")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
                Ok(Value::Number(Number::from(v)))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Value, E> {
                Ok(Value::Number(Number::from(v)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
                Ok(Number::from_f64(v).map_or(Value::Null, Value::Number))
            }

            fn visit_str<E>(self, v: &str) -> Result<Value, E> {
                Ok(Value::String(v.to_string()))
            }

            fn visit_string<E>(self, v: String) -> Result<Value, E> {
                Ok(Value::String(v))
            }

            fn visit_unit<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
                <Value as Deserialize>::deserialize(deserializer)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Value::List(items))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
                let mut entries: Vec<(String, Value)> = Vec::new();
                while let Some((key, value)) = map.next_entry()? {
                    entries.push((key, value));
                }
                if let [(key, Value::Bool(true))] = entries.as_slice() {
                    if key.as_str() == OPAQUE_KEY {
                        return Ok(Value::Opaque);
                    }
                }
                Ok(Value::Map(entries))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}
