//! Schema-guided wire decoding into [`Value`] trees.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;

use protopack_buffers::Reader;

use crate::error::CodecError;
use crate::schema::{scalar_default, FieldSchema, FieldType, Label, MessageSchema, SchemaRegistry};
use crate::value::{MapKey, Value};
use crate::wire::{make_tag, split_tag, zigzag_decode32, zigzag_decode64, WireType};
use crate::{CodecOptions, MissingRequired};

/// Decodes wire bytes into [`Value::Record`] trees, guided by a schema
/// registry.
///
/// Decoding is tolerant of unknown fields (they are skipped, including
/// nested groups) and strict about structure: truncation, malformed
/// varints, zero field numbers and wire-type mismatches on known fields
/// are all faults.
pub struct Decoder<'a> {
    registry: &'a SchemaRegistry,
    options: CodecOptions,
}

impl<'a> Decoder<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self::with_options(registry, CodecOptions::default())
    }

    pub fn with_options(registry: &'a SchemaRegistry, options: CodecOptions) -> Self {
        Self { registry, options }
    }

    /// Decodes `bytes` as one `message` and returns the full record: every
    /// declared field is present, with defaults synthesized for fields the
    /// wire did not carry.
    pub fn decode(&self, message: &str, bytes: &[u8]) -> Result<Value, CodecError> {
        let schema = self.registry.expect_message(message)?;
        let mut reader = Reader::new(bytes);
        let record = self.decode_record(schema, &mut reader, &schema.full_name)?;
        Ok(Value::Record(record))
    }

    /// Decodes `bytes` and projects the record onto a positional list, one
    /// slot per declared field in ascending field-number order.
    pub fn unpack(&self, message: &str, bytes: &[u8]) -> Result<Vec<Value>, CodecError> {
        let schema = self.registry.expect_message(message)?;
        let mut reader = Reader::new(bytes);
        let record = self.decode_record(schema, &mut reader, &schema.full_name)?;
        Ok(schema
            .fields_by_number()
            .map(|field| record.get(&field.name).cloned().unwrap_or(Value::Absent))
            .collect())
    }

    fn decode_record(
        &self,
        schema: &MessageSchema,
        reader: &mut Reader<'_>,
        path: &str,
    ) -> Result<IndexMap<String, Value>, CodecError> {
        let mut seen: HashMap<u32, Value> = HashMap::new();
        while reader.x < reader.end {
            let tag = reader.varint()?;
            let (number, raw_wire) = split_tag(tag);
            if number == 0 {
                return Err(CodecError::ZeroFieldNumber);
            }
            let wire = WireType::from_raw(raw_wire)
                .ok_or(CodecError::InvalidWireType(raw_wire))?;
            match schema.field_by_number(number) {
                None => skip_field(reader, number, wire)?,
                Some(field) => {
                    let field_path = join_path(path, &field.name);
                    self.decode_field(field, wire, reader, &field_path, &mut seen)?;
                }
            }
        }

        // Project the accumulator onto the declared field list, in
        // declaration order, filling in defaults.
        let mut record = IndexMap::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let value = match seen.remove(&field.number) {
                Some(value) => value,
                None => self.default_for(field, path)?,
            };
            record.insert(field.name.clone(), value);
        }
        Ok(record)
    }

    fn decode_field(
        &self,
        field: &FieldSchema,
        wire: WireType,
        reader: &mut Reader<'_>,
        path: &str,
        seen: &mut HashMap<u32, Value>,
    ) -> Result<(), CodecError> {
        if let Some(entry) = self.registry.map_entry_schema(field)? {
            if wire != WireType::Len {
                return Err(unexpected_wire(path, wire));
            }
            let len = reader.varint()? as usize;
            let mut sub = reader.cut(len)?;
            let (key, value) = self.decode_map_entry(entry, &mut sub, path)?;
            let slot = seen
                .entry(field.number)
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            if let Value::Map(map) = slot {
                map.insert(key, value);
            }
            return Ok(());
        }
        if field.label == Label::Repeated {
            return self.decode_repeated(field, wire, reader, path, seen);
        }
        let value = self.decode_single(field, wire, reader, path)?;
        seen.insert(field.number, value);
        Ok(())
    }

    /// One or more occurrences of a repeated field. A packable field whose
    /// occurrence arrives length-delimited is a packed run; otherwise each
    /// occurrence carries the element wire type, and consecutive identical
    /// tags are consumed in one visit.
    fn decode_repeated(
        &self,
        field: &FieldSchema,
        wire: WireType,
        reader: &mut Reader<'_>,
        path: &str,
        seen: &mut HashMap<u32, Value>,
    ) -> Result<(), CodecError> {
        let mut items = Vec::new();
        if field.is_packable() && wire == WireType::Len {
            let len = reader.varint()? as usize;
            let mut sub = reader.cut(len)?;
            while sub.x < sub.end {
                items.push(self.decode_scalar(field, &mut sub, path)?);
            }
        } else {
            items.push(self.decode_single(field, wire, reader, path)?);
            let tag = make_tag(field.number, wire);
            loop {
                let mark = reader.x;
                match reader.varint() {
                    Ok(next) if next == tag => {
                        items.push(self.decode_single(field, wire, reader, path)?);
                    }
                    _ => {
                        reader.x = mark;
                        break;
                    }
                }
            }
        }
        let slot = seen
            .entry(field.number)
            .or_insert_with(|| Value::List(Vec::new()));
        if let Value::List(list) = slot {
            list.extend(items);
        }
        Ok(())
    }

    fn decode_single(
        &self,
        field: &FieldSchema,
        wire: WireType,
        reader: &mut Reader<'_>,
        path: &str,
    ) -> Result<Value, CodecError> {
        if wire != field.wire_type() {
            return Err(unexpected_wire(path, wire));
        }
        self.decode_scalar(field, reader, path)
    }

    /// One value with no tag: the element of a packed run, a map entry
    /// key/value, or the payload of a singular field.
    fn decode_scalar(
        &self,
        field: &FieldSchema,
        reader: &mut Reader<'_>,
        path: &str,
    ) -> Result<Value, CodecError> {
        Ok(match &field.ty {
            FieldType::Double => Value::Float(reader.f64()?),
            FieldType::Float => Value::Float(reader.f32()? as f64),
            // int32 is transmitted as a 64-bit varint; negative values use
            // all ten bytes and truncate back to 32 bits with their sign.
            FieldType::Int32 => Value::Int(reader.varint()? as i32 as i64),
            FieldType::Int64 => Value::Int(reader.varint()? as i64),
            FieldType::UInt32 => Value::UInt(reader.varint()? as u32 as u64),
            FieldType::UInt64 => Value::UInt(reader.varint()?),
            FieldType::SInt32 => Value::Int(zigzag_decode32(reader.varint()? as u32) as i64),
            FieldType::SInt64 => Value::Int(zigzag_decode64(reader.varint()?)),
            FieldType::Fixed32 => Value::UInt(reader.u32()? as u64),
            FieldType::Fixed64 => Value::UInt(reader.u64()?),
            FieldType::SFixed32 => Value::Int(reader.u32()? as i32 as i64),
            FieldType::SFixed64 => Value::Int(reader.u64()? as i64),
            FieldType::Bool => Value::Bool(reader.varint()? != 0),
            FieldType::String | FieldType::Bytes => {
                let len = reader.varint()? as usize;
                Value::Bytes(reader.buf(len)?.to_vec())
            }
            FieldType::Enum(_) => Value::Int(reader.varint()? as i32 as i64),
            FieldType::Message(name) => {
                let schema = self.registry.expect_message(name)?;
                let len = reader.varint()? as usize;
                let mut sub = reader.cut(len)?;
                Value::Record(self.decode_record(schema, &mut sub, path)?)
            }
        })
    }

    /// Decodes one map entry submessage. Keys and values may appear in any
    /// order, repeat (last wins) or be missing (defaults apply); unknown
    /// numbers inside the entry are skipped.
    fn decode_map_entry(
        &self,
        entry: &MessageSchema,
        reader: &mut Reader<'_>,
        path: &str,
    ) -> Result<(MapKey, Value), CodecError> {
        let (key_field, value_field) = entry.map_key_value()?;
        let mut key = None;
        let mut value = None;
        while reader.x < reader.end {
            let tag = reader.varint()?;
            let (number, raw_wire) = split_tag(tag);
            if number == 0 {
                return Err(CodecError::ZeroFieldNumber);
            }
            let wire = WireType::from_raw(raw_wire)
                .ok_or(CodecError::InvalidWireType(raw_wire))?;
            match number {
                1 => {
                    let key_path = join_path(path, &key_field.name);
                    key = Some(self.decode_single(key_field, wire, reader, &key_path)?);
                }
                2 => {
                    let value_path = join_path(path, &value_field.name);
                    value = Some(self.decode_single(value_field, wire, reader, &value_path)?);
                }
                _ => skip_field(reader, number, wire)?,
            }
        }
        let key = match key {
            Some(key) => key,
            None => scalar_default(key_field, self.registry)?,
        };
        let value = match value {
            Some(value) => value,
            None => scalar_default(value_field, self.registry)?,
        };
        let key = MapKey::from_value(&key).ok_or_else(|| CodecError::ValueShape {
            path: join_path(path, &key_field.name),
            expected: "map key scalar",
            actual: key.kind(),
        })?;
        Ok((key, value))
    }

    /// The value a field takes when the wire carried no occurrence of it.
    fn default_for(&self, field: &FieldSchema, path: &str) -> Result<Value, CodecError> {
        if field.label == Label::Required {
            let field_path = join_path(path, &field.name);
            match self.options.missing_required {
                MissingRequired::Error => {
                    return Err(CodecError::MissingRequired(field_path));
                }
                MissingRequired::Warn => {
                    log::warn!("required field {field_path} is missing; substituting its default");
                }
            }
        }
        if self.registry.map_entry_schema(field)?.is_some() {
            return Ok(Value::Map(BTreeMap::new()));
        }
        if field.label == Label::Repeated {
            return Ok(Value::List(Vec::new()));
        }
        if field.oneof.is_some() {
            return Ok(Value::Absent);
        }
        scalar_default(field, self.registry)
    }
}

fn join_path(path: &str, name: &str) -> String {
    format!("{path}.{name}")
}

fn unexpected_wire(path: &str, wire: WireType) -> CodecError {
    CodecError::UnexpectedWireType {
        path: path.to_owned(),
        wire: wire as u8,
    }
}

/// Skips one field payload of the given wire type. Used for unknown fields
/// and inside skipped groups.
fn skip_field(reader: &mut Reader<'_>, number: u32, wire: WireType) -> Result<(), CodecError> {
    match wire {
        WireType::Varint => {
            reader.varint()?;
        }
        WireType::Fixed64 => reader.skip(8)?,
        WireType::Fixed32 => reader.skip(4)?,
        WireType::Len => {
            let len = reader.varint()? as usize;
            reader.skip(len)?;
        }
        WireType::StartGroup => skip_group(reader, number)?,
        WireType::EndGroup => return Err(CodecError::UnmatchedEndGroup(number)),
    }
    Ok(())
}

/// Consumes tags until the end-group tag matching `start_number`, recursing
/// through nested groups.
fn skip_group(reader: &mut Reader<'_>, start_number: u32) -> Result<(), CodecError> {
    loop {
        let tag = reader.varint()?;
        let (number, raw_wire) = split_tag(tag);
        if number == 0 {
            return Err(CodecError::ZeroFieldNumber);
        }
        let wire = WireType::from_raw(raw_wire).ok_or(CodecError::InvalidWireType(raw_wire))?;
        if wire == WireType::EndGroup {
            if number == start_number {
                return Ok(());
            }
            return Err(CodecError::UnmatchedEndGroup(number));
        }
        skip_field(reader, number, wire)?;
    }
}
