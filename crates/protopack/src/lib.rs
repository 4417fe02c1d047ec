//! Schema-driven dynamic Protocol Buffers wire codec.
//!
//! No code generation: schemas are parsed from `.proto` text at runtime
//! into a [`SchemaRegistry`], and messages travel as generic [`Value`]
//! trees. The [`Encoder`] and [`Decoder`] walk the tree and the schema in
//! lockstep, so the same binary can speak any message shape its registry
//! describes.
//!
//! ```
//! use protopack::{decode, encode, SchemaRegistry, Value};
//!
//! let registry = SchemaRegistry::parse(&[r#"
//!     syntax = "proto3";
//!     message Person {
//!         string name = 1;
//!         int32 id = 2;
//!     }
//! "#])
//! .unwrap();
//!
//! let person = Value::record([
//!     ("name", Value::str("Alice")),
//!     ("id", Value::Int(0)),
//! ]);
//! let bytes = encode(&registry, "Person", &person).unwrap();
//! assert_eq!(bytes, b"\x0a\x05Alice");
//!
//! let decoded = decode(&registry, "Person", &bytes).unwrap();
//! assert_eq!(decoded, person);
//! ```

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod schema;
pub mod value;
pub mod wire;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::CodecError;
pub use schema::{
    EnumSchema, FieldSchema, FieldType, Label, MessageSchema, ParseError, SchemaRegistry, Syntax,
};
pub use value::{MapKey, Value};

/// Behaviour toggles shared by the encoder and the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecOptions {
    /// What to do when a proto2 `required` field is absent.
    pub missing_required: MissingRequired,
}

/// Policy for absent `required` fields, applied symmetrically: on encode
/// the field is left out, on decode its default is substituted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingRequired {
    /// Log a warning and carry on. The default, matching how most dynamic
    /// runtimes treat stale proto2 schemas.
    #[default]
    Warn,
    /// Fail the operation with [`CodecError::MissingRequired`].
    Error,
}

/// Encodes a record as one message, with default options.
pub fn encode(
    registry: &SchemaRegistry,
    message: &str,
    value: &Value,
) -> Result<Vec<u8>, CodecError> {
    Encoder::new(registry).encode(message, value)
}

/// Decodes bytes into a full record, with default options.
pub fn decode(registry: &SchemaRegistry, message: &str, bytes: &[u8]) -> Result<Value, CodecError> {
    Decoder::new(registry).decode(message, bytes)
}

/// Encodes positional values bound to fields in ascending field-number
/// order, with default options.
pub fn pack(
    registry: &SchemaRegistry,
    message: &str,
    values: &[Value],
) -> Result<Vec<u8>, CodecError> {
    Encoder::new(registry).pack(message, values)
}

/// Decodes bytes into positional values in ascending field-number order,
/// with default options.
pub fn unpack(
    registry: &SchemaRegistry,
    message: &str,
    bytes: &[u8],
) -> Result<Vec<Value>, CodecError> {
    Decoder::new(registry).unpack(message, bytes)
}
