//! Schema entities and the registry resolving them at runtime.
//!
//! Schemas are loaded from `.proto` text (see [`parser`]) into an immutable
//! [`SchemaRegistry`] snapshot. The codec only ever reads the registry; to
//! reload schemas, build a new registry from the updated sources and swap it
//! at the call site.

pub mod parser;

use std::collections::HashMap;
use std::path::Path;

use crate::error::CodecError;
use crate::value::Value;
use crate::wire::WireType;

pub use parser::ParseError;

/// The `.proto` syntax revision a file was declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Proto2,
    Proto3,
}

/// Field cardinality. Map fields are carried as `Repeated` fields of their
/// hidden entry message, the way descriptors model them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Optional,
    Required,
    Repeated,
}

/// Declared field type. Message and enum types reference their target by
/// full dotted name, resolved against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Double,
    Float,
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Bool,
    String,
    Bytes,
    Enum(String),
    Message(String),
}

/// A single field of a message schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub number: u32,
    pub label: Label,
    pub ty: FieldType,
    /// Whether repeated occurrences are encoded as one length-delimited
    /// block. Only ever true for packable (scalar) field types.
    pub packed: bool,
    /// Index into the owning message's `oneofs` list, if any.
    pub oneof: Option<usize>,
    /// Declared `[default = ...]` value (proto2), already resolved to a
    /// scalar `Value` (enum name defaults become their number).
    pub default: Option<Value>,
}

impl FieldSchema {
    /// The wire type a single value of this field occupies.
    pub fn wire_type(&self) -> WireType {
        match self.ty {
            FieldType::Double | FieldType::Fixed64 | FieldType::SFixed64 => WireType::Fixed64,
            FieldType::Float | FieldType::Fixed32 | FieldType::SFixed32 => WireType::Fixed32,
            FieldType::String | FieldType::Bytes | FieldType::Message(_) => WireType::Len,
            _ => WireType::Varint,
        }
    }

    /// Whether the field type is legal inside a packed run. Strings, bytes
    /// and messages are not.
    pub fn is_packable(&self) -> bool {
        self.wire_type() != WireType::Len
    }

    /// Full name of the message type, for message-typed fields.
    pub fn message_type(&self) -> Option<&str> {
        match &self.ty {
            FieldType::Message(name) => Some(name),
            _ => None,
        }
    }
}

/// A message schema: ordered field list plus oneof bookkeeping.
#[derive(Debug, Clone)]
pub struct MessageSchema {
    pub full_name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldSchema>,
    /// Oneof group names; fields point into this list by index.
    pub oneofs: Vec<String>,
    /// True for the hidden two-field entry message behind a `map<K, V>`
    /// field.
    pub map_entry: bool,
    by_number: HashMap<u32, usize>,
    number_order: Vec<usize>,
}

impl MessageSchema {
    pub(crate) fn new(
        full_name: String,
        fields: Vec<FieldSchema>,
        oneofs: Vec<String>,
        map_entry: bool,
    ) -> Self {
        let by_number = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.number, i))
            .collect();
        let mut number_order: Vec<usize> = (0..fields.len()).collect();
        number_order.sort_by_key(|&i| fields[i].number);
        Self {
            full_name,
            fields,
            oneofs,
            map_entry,
            by_number,
            number_order,
        }
    }

    /// Looks a field up by its wire identity.
    pub fn field_by_number(&self, number: u32) -> Option<&FieldSchema> {
        self.by_number.get(&number).map(|&i| &self.fields[i])
    }

    /// Fields in ascending field-number order; the order the encoder emits
    /// them in and the order `pack`/`unpack` bind positional values.
    pub fn fields_by_number(&self) -> impl Iterator<Item = &FieldSchema> + '_ {
        self.number_order.iter().map(move |&i| &self.fields[i])
    }

    /// Key and value fields of a map entry message. Anything other than
    /// exactly `key = 1` and `value = 2` is a schema-integrity fault.
    pub(crate) fn map_key_value(&self) -> Result<(&FieldSchema, &FieldSchema), CodecError> {
        if self.fields.len() == 2 {
            if let (Some(key), Some(value)) = (self.field_by_number(1), self.field_by_number(2)) {
                return Ok((key, value));
            }
        }
        Err(CodecError::BadMapEntry(self.full_name.clone()))
    }
}

/// An enum schema: name/number pairs in declaration order.
#[derive(Debug, Clone)]
pub struct EnumSchema {
    pub full_name: String,
    pub values: Vec<(String, i32)>,
}

impl EnumSchema {
    /// Number of a value by name.
    pub fn number(&self, name: &str) -> Option<i32> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, number)| number)
    }

    /// The default value number: the first declared value (proto3 requires
    /// it to be zero; proto2 lets it be anything).
    pub fn default_number(&self) -> i32 {
        self.values.first().map(|&(_, n)| n).unwrap_or(0)
    }
}

/// Read-only store of message and enum schemas, keyed by full dotted name.
///
/// A registry is an immutable snapshot: build it once with
/// [`SchemaRegistry::parse`] or [`SchemaRegistry::load_file`] and share it
/// by reference. Reloading means building a new snapshot and swapping the
/// reference, so in-flight codec calls never observe partial state.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    pub(crate) messages: HashMap<String, MessageSchema>,
    pub(crate) enums: HashMap<String, EnumSchema>,
}

impl SchemaRegistry {
    /// Parses one or more `.proto` sources into a registry. `import`
    /// statements are ignored; hand every file to this call directly.
    pub fn parse(sources: &[&str]) -> Result<SchemaRegistry, ParseError> {
        parser::parse_sources(sources)
    }

    /// Reads a `.proto` file and follows its `import` statements, resolved
    /// relative to the importing file's directory.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<SchemaRegistry, ParseError> {
        parser::parse_files(path.as_ref())
    }

    /// Looks up a message schema by full dotted name.
    pub fn message(&self, full_name: &str) -> Option<&MessageSchema> {
        self.messages.get(full_name)
    }

    /// Looks up an enum schema by full dotted name.
    pub fn enum_type(&self, full_name: &str) -> Option<&EnumSchema> {
        self.enums.get(full_name)
    }

    pub(crate) fn expect_message(&self, full_name: &str) -> Result<&MessageSchema, CodecError> {
        self.message(full_name)
            .ok_or_else(|| CodecError::MessageNotFound(full_name.to_owned()))
    }

    pub(crate) fn expect_enum(&self, full_name: &str) -> Result<&EnumSchema, CodecError> {
        self.enum_type(full_name)
            .ok_or_else(|| CodecError::EnumNotFound(full_name.to_owned()))
    }

    /// The entry message behind a map field, or `None` when the field is
    /// not a map.
    pub(crate) fn map_entry_schema(
        &self,
        field: &FieldSchema,
    ) -> Result<Option<&MessageSchema>, CodecError> {
        match field.message_type() {
            Some(name) => {
                let schema = self.expect_message(name)?;
                Ok(schema.map_entry.then_some(schema))
            }
            None => Ok(None),
        }
    }
}

/// The scalar default for a field: its declared `[default = ...]`, the enum
/// type's first value, or the type's zero. Container and presence handling
/// is layered on top by the decoder.
pub(crate) fn scalar_default(
    field: &FieldSchema,
    registry: &SchemaRegistry,
) -> Result<Value, CodecError> {
    if let Some(default) = &field.default {
        return Ok(default.clone());
    }
    Ok(match &field.ty {
        FieldType::Double | FieldType::Float => Value::Float(0.0),
        FieldType::Int32
        | FieldType::Int64
        | FieldType::SInt32
        | FieldType::SInt64
        | FieldType::SFixed32
        | FieldType::SFixed64 => Value::Int(0),
        FieldType::UInt32 | FieldType::UInt64 | FieldType::Fixed32 | FieldType::Fixed64 => {
            Value::UInt(0)
        }
        FieldType::Bool => Value::Bool(false),
        FieldType::String | FieldType::Bytes => Value::Bytes(Vec::new()),
        FieldType::Enum(name) => {
            Value::Int(registry.expect_enum(name)?.default_number() as i64)
        }
        // Singular message defaults are `Absent`.
        FieldType::Message(_) => Value::Absent,
    })
}
