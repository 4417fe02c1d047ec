//! Codec fault taxonomy.

use protopack_buffers::BufferError;
use thiserror::Error;

/// Error type for encode/decode/pack/unpack operations.
///
/// Faults raised while visiting a field carry the full dotted field path
/// from the root message, e.g. `tutorial.Person.phones.number`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Input ended mid-value (truncated varint, short fixed-width read, or
    /// a length prefix overrunning the remaining buffer).
    #[error("truncated input")]
    Truncated,
    /// A varint did not terminate within ten bytes.
    #[error("malformed varint")]
    MalformedVarint,
    /// A tag carried field number zero.
    #[error("tag with field number zero")]
    ZeroFieldNumber,
    /// A tag carried wire-type bits 6 or 7, which the format does not
    /// define.
    #[error("invalid wire type {0}")]
    InvalidWireType(u8),
    /// A known field arrived with a wire type other than its declared one.
    #[error("unexpected wire type {wire} for field {path}")]
    UnexpectedWireType { path: String, wire: u8 },
    /// An end-group tag with no matching start-group.
    #[error("unmatched end-group tag for field number {0}")]
    UnmatchedEndGroup(u32),
    /// Message type not present in the registry.
    #[error("message type not found: {0}")]
    MessageNotFound(String),
    /// Enum type not present in the registry.
    #[error("enum type not found: {0}")]
    EnumNotFound(String),
    /// A map field's entry message does not declare exactly key = 1 and
    /// value = 2. Schema-integrity fault, not a data fault.
    #[error("map entry type {0} must declare exactly key = 1 and value = 2")]
    BadMapEntry(String),
    /// Caller supplied a value of the wrong shape for a field.
    #[error("field {path} expects {expected}, got {actual}")]
    ValueShape {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },
    /// A `required` field was absent and the codec is configured with
    /// [`MissingRequired::Error`](crate::MissingRequired::Error).
    #[error("required field {0} is missing")]
    MissingRequired(String),
    /// Packed encoding requested for a field whose type cannot be packed.
    #[error("field {0} cannot be packed")]
    NotPackable(String),
    /// More positional values than declared fields in a `pack` call.
    #[error("{given} values supplied but {message} declares {fields} fields")]
    TooManyValues {
        message: String,
        given: usize,
        fields: usize,
    },
}

impl From<BufferError> for CodecError {
    fn from(error: BufferError) -> Self {
        match error {
            BufferError::EndOfBuffer => CodecError::Truncated,
            BufferError::VarintOverflow => CodecError::MalformedVarint,
        }
    }
}
