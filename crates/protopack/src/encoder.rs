//! Schema-guided encoding of [`Value`] trees into wire bytes.

use protopack_buffers::Writer;

use crate::error::CodecError;
use crate::schema::{scalar_default, FieldSchema, FieldType, Label, MessageSchema, SchemaRegistry};
use crate::value::Value;
use crate::wire::{make_tag, zigzag_encode32, zigzag_encode64, WireType};
use crate::{CodecOptions, MissingRequired};

/// Encodes [`Value::Record`] trees into wire bytes, guided by a schema
/// registry.
///
/// Fields are emitted in ascending field-number order. Singular scalars
/// equal to their default are elided; `oneof` members are emitted whenever
/// present, even when zero-valued, so presence survives a round trip.
/// Nested messages, packed runs and map entries are framed with a reserved
/// length prefix that is patched once the payload size is known, so the
/// tree is serialized in a single pass.
pub struct Encoder<'a> {
    registry: &'a SchemaRegistry,
    options: CodecOptions,
    writer: Writer,
}

impl<'a> Encoder<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self::with_options(registry, CodecOptions::default())
    }

    pub fn with_options(registry: &'a SchemaRegistry, options: CodecOptions) -> Self {
        Self {
            registry,
            options,
            writer: Writer::new(),
        }
    }

    /// Encodes `value`, which must be a record, as one `message`.
    pub fn encode(&mut self, message: &str, value: &Value) -> Result<Vec<u8>, CodecError> {
        let registry = self.registry;
        let schema = registry.expect_message(message)?;
        self.writer.reset();
        self.encode_record(schema, value, &schema.full_name)?;
        Ok(self.writer.flush())
    }

    /// Encodes a positional list of values, bound to the message's fields
    /// in ascending field-number order. Missing trailing values are treated
    /// as absent; supplying more values than fields is a fault.
    pub fn pack(&mut self, message: &str, values: &[Value]) -> Result<Vec<u8>, CodecError> {
        let registry = self.registry;
        let schema = registry.expect_message(message)?;
        if values.len() > schema.fields.len() {
            return Err(CodecError::TooManyValues {
                message: schema.full_name.clone(),
                given: values.len(),
                fields: schema.fields.len(),
            });
        }
        self.writer.reset();
        let slots = values.iter().chain(std::iter::repeat(&Value::Absent));
        for (field, value) in schema.fields_by_number().zip(slots) {
            let field_path = join_path(&schema.full_name, &field.name);
            self.encode_field(field, value, &field_path)?;
        }
        Ok(self.writer.flush())
    }

    fn encode_record(
        &mut self,
        schema: &MessageSchema,
        value: &Value,
        path: &str,
    ) -> Result<(), CodecError> {
        let record = value.as_record().ok_or_else(|| CodecError::ValueShape {
            path: path.to_owned(),
            expected: "record",
            actual: value.kind(),
        })?;
        for field in schema.fields_by_number() {
            let field_value = record.get(&field.name).unwrap_or(&Value::Absent);
            let field_path = join_path(path, &field.name);
            self.encode_field(field, field_value, &field_path)?;
        }
        Ok(())
    }

    fn encode_field(
        &mut self,
        field: &FieldSchema,
        value: &Value,
        path: &str,
    ) -> Result<(), CodecError> {
        let registry = self.registry;
        if let Some(entry) = registry.map_entry_schema(field)? {
            return self.encode_map(field, entry, value, path);
        }
        if field.label == Label::Repeated {
            return self.encode_repeated(field, value, path);
        }
        if value.is_absent() {
            if field.label == Label::Required {
                match self.options.missing_required {
                    MissingRequired::Error => {
                        return Err(CodecError::MissingRequired(path.to_owned()));
                    }
                    MissingRequired::Warn => {
                        log::warn!("required field {path} is missing; leaving it unset");
                    }
                }
            }
            return Ok(());
        }
        if field.oneof.is_none() && self.is_default(field, value)? {
            return Ok(());
        }
        self.write_single(field, value, path)
    }

    /// Whether a present singular value equals the field's default and can
    /// be elided. Message values are never elided.
    fn is_default(&self, field: &FieldSchema, value: &Value) -> Result<bool, CodecError> {
        if field.message_type().is_some() {
            return Ok(false);
        }
        let default = scalar_default(field, self.registry)?;
        Ok(values_equal(&default, value))
    }

    /// One tagged occurrence: either a length-framed submessage or a tagged
    /// scalar.
    fn write_single(
        &mut self,
        field: &FieldSchema,
        value: &Value,
        path: &str,
    ) -> Result<(), CodecError> {
        match field.message_type() {
            Some(name) => {
                let registry = self.registry;
                let schema = registry.expect_message(name)?;
                self.writer.varint(make_tag(field.number, WireType::Len));
                let mark = self.writer.reserve_len();
                self.encode_record(schema, value, path)?;
                self.writer.patch_len(mark);
                Ok(())
            }
            None => {
                self.writer.varint(make_tag(field.number, field.wire_type()));
                self.write_scalar(field, value, path)
            }
        }
    }

    /// One untagged scalar payload: the element of a packed run, a map
    /// entry key/value, or the payload following a scalar tag.
    fn write_scalar(
        &mut self,
        field: &FieldSchema,
        value: &Value,
        path: &str,
    ) -> Result<(), CodecError> {
        let shape = |expected: &'static str| CodecError::ValueShape {
            path: path.to_owned(),
            expected,
            actual: value.kind(),
        };
        match &field.ty {
            FieldType::Double => {
                self.writer.f64(as_f64(value).ok_or_else(|| shape("number"))?);
            }
            FieldType::Float => {
                self.writer
                    .f32(as_f64(value).ok_or_else(|| shape("number"))? as f32);
            }
            // 32-bit varint fields truncate to 32 bits, then negative
            // values are sign-extended back to the full ten-byte varint.
            FieldType::Int32 => {
                let truncated = as_i64(value).ok_or_else(|| shape("integer"))? as i32;
                self.writer.varint(truncated as i64 as u64);
            }
            FieldType::Int64 => {
                self.writer
                    .varint(as_i64(value).ok_or_else(|| shape("integer"))? as u64);
            }
            FieldType::UInt32 => {
                let truncated = as_u64(value).ok_or_else(|| shape("unsigned integer"))? as u32;
                self.writer.varint(truncated as u64);
            }
            FieldType::UInt64 => {
                self.writer
                    .varint(as_u64(value).ok_or_else(|| shape("unsigned integer"))?);
            }
            FieldType::SInt32 => {
                let truncated = as_i64(value).ok_or_else(|| shape("integer"))? as i32;
                self.writer.varint(zigzag_encode32(truncated) as u64);
            }
            FieldType::SInt64 => {
                self.writer
                    .varint(zigzag_encode64(as_i64(value).ok_or_else(|| shape("integer"))?));
            }
            FieldType::Fixed32 => {
                self.writer
                    .u32(as_u64(value).ok_or_else(|| shape("unsigned integer"))? as u32);
            }
            FieldType::Fixed64 => {
                self.writer
                    .u64(as_u64(value).ok_or_else(|| shape("unsigned integer"))?);
            }
            FieldType::SFixed32 => {
                let truncated = as_i64(value).ok_or_else(|| shape("integer"))? as i32;
                self.writer.u32(truncated as u32);
            }
            FieldType::SFixed64 => {
                self.writer
                    .u64(as_i64(value).ok_or_else(|| shape("integer"))? as u64);
            }
            FieldType::Bool => {
                let flag = match value {
                    Value::Bool(flag) => *flag,
                    _ => return Err(shape("bool")),
                };
                self.writer.u8(flag as u8);
            }
            FieldType::String | FieldType::Bytes => {
                let bytes = match value {
                    Value::Bytes(bytes) => bytes,
                    _ => return Err(shape("bytes")),
                };
                self.writer.varint(bytes.len() as u64);
                self.writer.buf(bytes);
            }
            FieldType::Enum(_) => {
                let truncated = as_i64(value).ok_or_else(|| shape("integer"))? as i32;
                self.writer.varint(truncated as i64 as u64);
            }
            FieldType::Message(_) => unreachable!("message values are framed by write_single"),
        }
        Ok(())
    }

    fn encode_repeated(
        &mut self,
        field: &FieldSchema,
        value: &Value,
        path: &str,
    ) -> Result<(), CodecError> {
        let items = match value {
            Value::Absent => return Ok(()),
            Value::List(items) => items,
            _ => {
                return Err(CodecError::ValueShape {
                    path: path.to_owned(),
                    expected: "list",
                    actual: value.kind(),
                })
            }
        };
        if items.is_empty() {
            return Ok(());
        }
        if field.packed {
            if !field.is_packable() {
                return Err(CodecError::NotPackable(path.to_owned()));
            }
            self.writer.varint(make_tag(field.number, WireType::Len));
            let mark = self.writer.reserve_len();
            for item in items {
                self.write_scalar(field, item, path)?;
            }
            self.writer.patch_len(mark);
        } else {
            for item in items {
                self.write_single(field, item, path)?;
            }
        }
        Ok(())
    }

    /// One length-framed entry message per map pair. Entry keys and values
    /// go through the regular field path, so default-valued entries elide
    /// the corresponding entry field.
    fn encode_map(
        &mut self,
        field: &FieldSchema,
        entry: &MessageSchema,
        value: &Value,
        path: &str,
    ) -> Result<(), CodecError> {
        let map = match value {
            Value::Absent => return Ok(()),
            Value::Map(map) => map,
            _ => {
                return Err(CodecError::ValueShape {
                    path: path.to_owned(),
                    expected: "map",
                    actual: value.kind(),
                })
            }
        };
        let (key_field, value_field) = entry.map_key_value()?;
        for (key, item) in map {
            self.writer.varint(make_tag(field.number, WireType::Len));
            let mark = self.writer.reserve_len();
            let key_path = join_path(path, &key_field.name);
            self.encode_field(key_field, &key.to_value(), &key_path)?;
            let value_path = join_path(path, &value_field.name);
            self.encode_field(value_field, item, &value_path)?;
            self.writer.patch_len(mark);
        }
        Ok(())
    }
}

fn join_path(path: &str, name: &str) -> String {
    format!("{path}.{name}")
}

/// Numeric equality across value variants, for default elision.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::UInt(x), Value::UInt(y)) => x == y,
        (Value::Int(x), Value::UInt(y)) | (Value::UInt(y), Value::Int(x)) => {
            *x >= 0 && *x as u64 == *y
        }
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Float(x), Value::Int(y)) | (Value::Int(y), Value::Float(x)) => *x == *y as f64,
        (Value::Float(x), Value::UInt(y)) | (Value::UInt(y), Value::Float(x)) => *x == *y as f64,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        _ => false,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float(v) => Some(*v),
        Value::Int(v) => Some(*v as f64),
        Value::UInt(v) => Some(*v as f64),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(*v),
        Value::UInt(v) if *v <= i64::MAX as u64 => Some(*v as i64),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::UInt(v) => Some(*v),
        Value::Int(v) if *v >= 0 => Some(*v as u64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MapKey;
    use crate::SchemaRegistry;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::parse(&[r#"
            syntax = "proto3";
            message Person {
                string name = 1;
                int32 id = 2;
                repeated int32 scores = 3;
                map<string, int32> tags = 4;
                oneof extra {
                    string nickname = 5;
                }
            }
        "#])
        .unwrap()
    }

    #[test]
    fn defaults_are_elided() {
        let registry = registry();
        let mut encoder = Encoder::new(&registry);
        let value = Value::record([
            ("name", Value::str("Alice")),
            ("id", Value::Int(0)),
            ("scores", Value::List(vec![])),
        ]);
        assert_eq!(encoder.encode("Person", &value).unwrap(), b"\x0a\x05Alice");
    }

    #[test]
    fn oneof_member_encodes_even_when_zero_valued() {
        let registry = registry();
        let mut encoder = Encoder::new(&registry);
        let value = Value::record([("nickname", Value::str(""))]);
        assert_eq!(encoder.encode("Person", &value).unwrap(), b"\x2a\x00");
    }

    #[test]
    fn packed_run_uses_reserved_length() {
        let registry = registry();
        let mut encoder = Encoder::new(&registry);
        let value = Value::record([(
            "scores",
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        )]);
        assert_eq!(
            encoder.encode("Person", &value).unwrap(),
            b"\x1a\x83\x80\x80\x00\x01\x02\x03"
        );
    }

    #[test]
    fn map_entries_encode_in_key_order() {
        let registry = registry();
        let mut encoder = Encoder::new(&registry);
        let value = Value::record([(
            "tags",
            Value::map([
                (MapKey::str("b"), Value::Int(2)),
                (MapKey::str("a"), Value::Int(1)),
            ]),
        )]);
        assert_eq!(
            encoder.encode("Person", &value).unwrap(),
            b"\x22\x85\x80\x80\x00\x0a\x01a\x10\x01\x22\x85\x80\x80\x00\x0a\x01b\x10\x02"
        );
    }

    #[test]
    fn negative_int32_sign_extends() {
        let registry = registry();
        let mut encoder = Encoder::new(&registry);
        let value = Value::record([("id", Value::Int(-1))]);
        assert_eq!(
            encoder.encode("Person", &value).unwrap(),
            b"\x10\xff\xff\xff\xff\xff\xff\xff\xff\xff\x01"
        );
    }

    #[test]
    fn missing_required_policy() {
        let registry = SchemaRegistry::parse(&[r#"
            syntax = "proto2";
            message M { required int32 a = 1; }
        "#])
        .unwrap();
        let value = Value::record(Vec::<(&str, Value)>::new());

        let mut lenient = Encoder::new(&registry);
        assert_eq!(lenient.encode("M", &value).unwrap(), b"");

        let mut strict = Encoder::with_options(
            &registry,
            CodecOptions {
                missing_required: MissingRequired::Error,
            },
        );
        assert_eq!(
            strict.encode("M", &value),
            Err(CodecError::MissingRequired("M.a".to_owned()))
        );
    }

    #[test]
    fn pack_binds_by_field_number() {
        let registry = registry();
        let mut encoder = Encoder::new(&registry);
        let bytes = encoder
            .pack("Person", &[Value::str("Bob"), Value::Int(9)])
            .unwrap();
        assert_eq!(bytes, b"\x0a\x03Bob\x10\x09");

        let too_many = vec![Value::Absent; 6];
        assert!(matches!(
            encoder.pack("Person", &too_many),
            Err(CodecError::TooManyValues { given: 6, .. })
        ));
    }

    #[test]
    fn wrong_shape_is_a_fault() {
        let registry = registry();
        let mut encoder = Encoder::new(&registry);
        let value = Value::record([("id", Value::str("nope"))]);
        assert_eq!(
            encoder.encode("Person", &value),
            Err(CodecError::ValueShape {
                path: "Person.id".to_owned(),
                expected: "integer",
                actual: "bytes",
            })
        );
    }
}
