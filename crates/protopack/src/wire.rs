//! Primitive wire-format arithmetic: wire types, tags and zigzag.
//!
//! Varint and fixed-width primitives live on the buffer [`Reader`] and
//! [`Writer`]; this module covers the protobuf-specific framing on top of
//! them.
//!
//! [`Reader`]: protopack_buffers::Reader
//! [`Writer`]: protopack_buffers::Writer

/// The four supported protobuf wire types, plus the deprecated group
/// delimiters which the codec only ever skips over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    Len = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    /// Decodes the low three bits of a tag. Returns `None` for the two
    /// values the wire format does not define (6 and 7).
    pub fn from_raw(raw: u8) -> Option<WireType> {
        match raw {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::Len),
            3 => Some(WireType::StartGroup),
            4 => Some(WireType::EndGroup),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

/// Packs a field number and wire type into a tag.
pub fn make_tag(number: u32, wire: WireType) -> u64 {
    ((number as u64) << 3) | wire as u64
}

/// Splits a tag into field number and raw wire-type bits.
pub fn split_tag(tag: u64) -> (u32, u8) {
    ((tag >> 3) as u32, (tag & 0x7) as u8)
}

/// Maps a signed 32-bit integer to its zigzag representation.
pub fn zigzag_encode32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Inverse of [`zigzag_encode32`].
pub fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Maps a signed 64-bit integer to its zigzag representation.
pub fn zigzag_encode64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode64`].
pub fn zigzag_decode64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}
