//! Auto-growing binary buffer writer.

/// A binary buffer writer that appends to an auto-growing buffer.
///
/// All multi-byte writes are little-endian. Length prefixes whose value is
/// only known after the payload has been written are handled with
/// [`Writer::reserve_len`] / [`Writer::patch_len`]: reserve a fixed-width
/// slot, write the payload, then patch the slot in place.
///
/// # Example
///
/// ```
/// use protopack_buffers::Writer;
///
/// let mut writer = Writer::new();
/// let mark = writer.reserve_len();
/// writer.buf(b"hello");
/// writer.patch_len(mark);
/// // 4-byte non-minimal varint "5" followed by the payload:
/// assert_eq!(writer.flush(), b"\x85\x80\x80\x00hello");
/// ```
pub struct Writer {
    /// The underlying byte buffer; the logical length is `uint8.len()`.
    pub uint8: Vec<u8>,
}

/// Width of a reserved length slot, in bytes.
const LEN_RESERVE: usize = 4;

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    /// Creates a new empty writer.
    pub fn new() -> Self {
        Self { uint8: Vec::new() }
    }

    /// Creates a new writer with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            uint8: Vec::with_capacity(capacity),
        }
    }

    /// Clears the buffer, keeping its allocation.
    pub fn reset(&mut self) {
        self.uint8.clear();
    }

    /// Current write position (number of bytes written so far).
    pub fn pos(&self) -> usize {
        self.uint8.len()
    }

    /// Returns the written bytes and leaves the writer empty.
    pub fn flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.uint8)
    }

    /// Writes a single byte.
    #[inline]
    pub fn u8(&mut self, value: u8) {
        self.uint8.push(value);
    }

    /// Writes an unsigned 32-bit integer (little-endian).
    #[inline]
    pub fn u32(&mut self, value: u32) {
        self.uint8.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an unsigned 64-bit integer (little-endian).
    #[inline]
    pub fn u64(&mut self, value: u64) {
        self.uint8.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a 32-bit floating point number (little-endian).
    #[inline]
    pub fn f32(&mut self, value: f32) {
        self.uint8.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a 64-bit floating point number (little-endian).
    #[inline]
    pub fn f64(&mut self, value: f64) {
        self.uint8.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes raw bytes.
    #[inline]
    pub fn buf(&mut self, bytes: &[u8]) {
        self.uint8.extend_from_slice(bytes);
    }

    /// Writes a minimal base-128 varint.
    pub fn varint(&mut self, mut value: u64) {
        loop {
            if value < 0x80 {
                self.uint8.push(value as u8);
                return;
            }
            self.uint8.push(value as u8 | 0x80);
            value >>= 7;
        }
    }

    /// Reserves a fixed-width length slot and returns its offset.
    ///
    /// The slot is later rewritten by [`Writer::patch_len`] with the number
    /// of bytes written between the two calls.
    pub fn reserve_len(&mut self) -> usize {
        let mark = self.uint8.len();
        self.uint8.extend_from_slice(&[0x80; LEN_RESERVE]);
        mark
    }

    /// Patches a slot from [`Writer::reserve_len`] with the payload length.
    ///
    /// The length is written as a fixed-width non-minimal varint: the
    /// continuation bit stays set on all but the final reserved byte, which
    /// any compliant varint reader accepts. A payload too long for the
    /// reserved width (2^28 bytes or more) falls back to splicing in a
    /// minimal varint of the true length, shifting the payload.
    ///
    /// # Panics
    ///
    /// Panics if `mark` does not point at a reserved slot inside the buffer.
    pub fn patch_len(&mut self, mark: usize) {
        assert!(mark + LEN_RESERVE <= self.uint8.len());
        let length = self.uint8.len() - mark - LEN_RESERVE;
        if length < 1 << (7 * LEN_RESERVE) {
            for i in 0..LEN_RESERVE {
                self.uint8[mark + i] = (length >> (7 * i)) as u8 | 0x80;
            }
            self.uint8[mark + LEN_RESERVE - 1] &= 0x7f;
        } else {
            let mut prefix = [0u8; 10];
            let mut n = 0;
            let mut value = length as u64;
            while value >= 0x80 {
                prefix[n] = value as u8 | 0x80;
                value >>= 7;
                n += 1;
            }
            prefix[n] = value as u8;
            n += 1;
            self.uint8.splice(mark..mark + LEN_RESERVE, prefix[..n].iter().copied());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_le() {
        let mut writer = Writer::new();
        writer.u8(0x01);
        writer.u32(0x1234_5678);
        writer.u64(2);
        writer.f32(1.0);
        writer.f64(-2.0);
        assert_eq!(
            writer.flush(),
            [
                0x01, // u8
                0x78, 0x56, 0x34, 0x12, // u32
                0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // u64
                0x00, 0x00, 0x80, 0x3f, // f32 1.0
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xc0, // f64 -2.0
            ]
        );
    }

    #[test]
    fn test_varint() {
        let mut writer = Writer::new();
        writer.varint(0);
        writer.varint(1);
        writer.varint(127);
        writer.varint(128);
        writer.varint(300);
        assert_eq!(writer.flush(), [0x00, 0x01, 0x7f, 0x80, 0x01, 0xac, 0x02]);

        let mut writer = Writer::new();
        writer.varint(u64::MAX);
        assert_eq!(
            writer.flush(),
            [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]
        );
    }

    #[test]
    fn test_reserve_and_patch() {
        let mut writer = Writer::new();
        let mark = writer.reserve_len();
        writer.buf(b"Alice");
        writer.patch_len(mark);
        assert_eq!(writer.flush(), b"\x85\x80\x80\x00Alice");
    }

    #[test]
    fn test_patch_empty_payload() {
        let mut writer = Writer::new();
        let mark = writer.reserve_len();
        writer.patch_len(mark);
        assert_eq!(writer.flush(), [0x80, 0x80, 0x80, 0x00]);
    }

    #[test]
    fn test_patch_nested() {
        let mut writer = Writer::new();
        let outer = writer.reserve_len();
        let inner = writer.reserve_len();
        writer.u8(0xaa);
        writer.patch_len(inner);
        writer.patch_len(outer);
        // inner: length 1; outer: 4 reserved bytes + 1 payload byte = 5.
        assert_eq!(
            writer.flush(),
            [0x85, 0x80, 0x80, 0x00, 0x81, 0x80, 0x80, 0x00, 0xaa]
        );
    }

    #[test]
    fn test_flush_resets() {
        let mut writer = Writer::new();
        writer.u8(1);
        assert_eq!(writer.flush(), [1]);
        assert_eq!(writer.pos(), 0);
        writer.u8(2);
        assert_eq!(writer.flush(), [2]);
    }
}
