//! Binary buffer utilities for protopack.
//!
//! This crate provides the low-level buffer plumbing the wire codec is built
//! on: a bounds-checked little-endian reader over a byte slice and an
//! auto-growing writer with support for deferred length patching.
//!
//! # Overview
//!
//! - [`Reader`] - Reads binary data from a byte slice with cursor tracking.
//!   Every read is checked; running off the end of the buffer is reported as
//!   [`BufferError::EndOfBuffer`] rather than a panic.
//! - [`Writer`] - Writes binary data to an auto-growing buffer. A length
//!   prefix whose value is not known up front can be reserved with
//!   [`Writer::reserve_len`] and patched after the payload with
//!   [`Writer::patch_len`].
//!
//! # Example
//!
//! ```
//! use protopack_buffers::{Reader, Writer};
//!
//! let mut writer = Writer::new();
//! writer.u8(0x01);
//! writer.u32(0x0203_0405);
//! writer.varint(300);
//! let data = writer.flush();
//!
//! let mut reader = Reader::new(&data);
//! assert_eq!(reader.u8().unwrap(), 0x01);
//! assert_eq!(reader.u32().unwrap(), 0x0203_0405);
//! assert_eq!(reader.varint().unwrap(), 300);
//! ```

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

/// Error type for buffer operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Attempted to read past the end of the buffer.
    EndOfBuffer,
    /// A varint did not terminate within ten bytes.
    VarintOverflow,
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::EndOfBuffer => write!(f, "end of buffer"),
            BufferError::VarintOverflow => write!(f, "varint exceeds ten bytes"),
        }
    }
}

impl std::error::Error for BufferError {}
