//! Generic tree value shared by both sides of the codec.

use std::collections::BTreeMap;

use indexmap::IndexMap;

/// The universal in-memory representation of a protobuf message tree.
///
/// Both the encoder and the decoder work on this type; no generated code is
/// involved. String and bytes fields are both carried as [`Value::Bytes`];
/// the codec treats string contents as opaque and never re-validates UTF-8.
///
/// [`Value::Absent`] is an explicit "field not present" marker, distinct
/// from a zero or empty value. It is what a never-set `oneof` member decodes
/// to, and on encode it elides the field entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Field not present. Never confused with a zero scalar.
    Absent,
    /// Boolean scalar.
    Bool(bool),
    /// Signed integer scalar (int32/int64/sint*/sfixed*, enum numbers).
    Int(i64),
    /// Unsigned integer scalar (uint32/uint64/fixed*).
    UInt(u64),
    /// Floating point scalar; `float` fields are widened to f64.
    Float(f64),
    /// Byte string; used for both `string` and `bytes` fields.
    Bytes(Vec<u8>),
    /// Ordered sequence; used for `repeated` fields.
    List(Vec<Value>),
    /// Scalar-keyed mapping; used for `map<K, V>` fields. `BTreeMap` keeps
    /// the encode-side iteration order stable.
    Map(BTreeMap<MapKey, Value>),
    /// Field-name-keyed mapping; used for message-typed values.
    Record(IndexMap<String, Value>),
}

/// A map key: the subset of scalars protobuf allows as `map<K, V>` keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Bytes(Vec<u8>),
}

impl Value {
    /// Builds a byte-string value from UTF-8 text.
    pub fn str(text: &str) -> Value {
        Value::Bytes(text.as_bytes().to_vec())
    }

    /// Builds a record from `(name, value)` pairs.
    pub fn record<K, I>(fields: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Record(
            fields
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Builds a map from `(key, value)` pairs.
    pub fn map<I>(entries: I) -> Value
    where
        I: IntoIterator<Item = (MapKey, Value)>,
    {
        Value::Map(entries.into_iter().collect())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Absent => "absent",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
        }
    }

    pub fn as_record(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }
}

impl MapKey {
    /// Converts the key back into a plain [`Value`] for scalar encoding.
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Int(*i),
            MapKey::UInt(u) => Value::UInt(*u),
            MapKey::Bytes(b) => Value::Bytes(b.clone()),
        }
    }

    /// Converts a decoded scalar into a map key. Returns `None` for value
    /// shapes that cannot key a protobuf map.
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Int(i) => Some(MapKey::Int(*i)),
            Value::UInt(u) => Some(MapKey::UInt(*u)),
            Value::Bytes(b) => Some(MapKey::Bytes(b.clone())),
            _ => None,
        }
    }

    /// Builds a byte-string key from UTF-8 text.
    pub fn str(text: &str) -> MapKey {
        MapKey::Bytes(text.as_bytes().to_vec())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::str(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_builder_keeps_order() {
        let value = Value::record([("b", Value::Int(1)), ("a", Value::Int(2))]);
        let record = value.as_record().unwrap();
        let names: Vec<&str> = record.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn map_key_round_trip() {
        let keys = [
            MapKey::Bool(true),
            MapKey::Int(-5),
            MapKey::UInt(7),
            MapKey::str("k"),
        ];
        for key in keys {
            assert_eq!(MapKey::from_value(&key.to_value()).unwrap(), key);
        }
        assert_eq!(MapKey::from_value(&Value::Float(1.0)), None);
        assert_eq!(MapKey::from_value(&Value::Absent), None);
    }

    #[test]
    fn kind_names() {
        assert_eq!(Value::Absent.kind(), "absent");
        assert_eq!(Value::List(vec![]).kind(), "list");
        assert_eq!(Value::str("x").kind(), "bytes");
    }
}
