//! Payload cursors.
//!
//! [`PayloadWriter`] and [`PayloadReader`] are the only primitives the wire
//! format is built from. Integers are fixed-width little-endian, booleans are
//! one byte, and strings and blobs carry an `i32` byte-length prefix:
//!
//! ```text
//! +----------------+-------------------+
//! | length (i32 LE)|  UTF-8 / raw bytes|
//! +----------------+-------------------+
//! ```
//!
//! Both cursors are incremental: a caller can read the frame header, act on
//! it, and keep reading request-specific fields from the same reader. Handlers
//! registered in the "structured" style receive a reader positioned at their
//! payload and answer with a writer.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Growable write cursor.
#[derive(Debug, Clone, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(u8::from(value));
        self
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32_le(value);
        self
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    pub fn write_i64(&mut self, value: i64) -> &mut Self {
        self.buf.put_i64_le(value);
        self
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64_le(value);
        self
    }

    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.buf.put_f32_le(value);
        self
    }

    pub fn write_f64(&mut self, value: f64) -> &mut Self {
        self.buf.put_f64_le(value);
        self
    }

    /// Writes a length-prefixed UTF-8 string.
    ///
    /// # Panics
    ///
    /// Panics if the string is longer than `i32::MAX` bytes.
    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.write_bytes(value.as_bytes())
    }

    /// Writes a length-prefixed byte blob.
    ///
    /// # Panics
    ///
    /// Panics if the blob is longer than `i32::MAX` bytes.
    pub fn write_bytes(&mut self, value: &[u8]) -> &mut Self {
        let len = i32::try_from(value.len())
            .unwrap_or_else(|_| panic!("blob of {} bytes exceeds i32 length prefix", value.len()));
        self.buf.put_i32_le(len);
        self.buf.put_slice(value);
        self
    }

    /// Appends bytes without a length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_slice(value);
        self
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer and returns an immutable buffer.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

impl From<PayloadWriter> for Bytes {
    fn from(writer: PayloadWriter) -> Self {
        writer.freeze()
    }
}

/// Read cursor over an immutable buffer.
///
/// Blob reads are zero-copy slices of the underlying [`Bytes`].
#[derive(Debug, Clone, Default)]
pub struct PayloadReader {
    buf: Bytes,
}

impl PayloadReader {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self { buf: buf.into() }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, needed: usize) -> ProtocolResult<()> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bool(&mut self) -> ProtocolResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidBool(other)),
        }
    }

    pub fn read_i32(&mut self) -> ProtocolResult<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_i64(&mut self) -> ProtocolResult<i64> {
        self.ensure(8)?;
        Ok(self.buf.get_i64_le())
    }

    pub fn read_u64(&mut self) -> ProtocolResult<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn read_f32(&mut self) -> ProtocolResult<f32> {
        self.ensure(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn read_f64(&mut self) -> ProtocolResult<f64> {
        self.ensure(8)?;
        Ok(self.buf.get_f64_le())
    }

    /// Reads a length-prefixed blob.
    pub fn read_bytes(&mut self) -> ProtocolResult<Bytes> {
        let len = self.read_i32()?;
        let len = usize::try_from(len).map_err(|_| ProtocolError::NegativeLength(len))?;
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> ProtocolResult<String> {
        let raw = self.read_bytes()?;
        Ok(String::from_utf8(raw.to_vec())?)
    }

    /// Takes everything that has not been read yet.
    pub fn read_remaining(&mut self) -> Bytes {
        self.buf.split_off(0)
    }
}

impl From<Bytes> for PayloadReader {
    fn from(buf: Bytes) -> Self {
        Self::new(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_in_order() {
        let mut writer = PayloadWriter::new();
        writer
            .write_u8(7)
            .write_bool(true)
            .write_i32(-42)
            .write_u64(u64::MAX)
            .write_f64(1.5)
            .write_str("héllo")
            .write_bytes(&[9, 8, 7]);

        let mut reader = PayloadReader::new(writer.freeze());
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_i32().unwrap(), -42);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX);
        assert_eq!(reader.read_f64().unwrap(), 1.5);
        assert_eq!(reader.read_string().unwrap(), "héllo");
        assert_eq!(&reader.read_bytes().unwrap()[..], &[9, 8, 7]);
        assert!(reader.is_empty());
    }

    #[test]
    fn integers_are_little_endian() {
        let mut writer = PayloadWriter::new();
        writer.write_i32(1);
        assert_eq!(writer.as_slice(), &[1, 0, 0, 0]);
    }

    #[test]
    fn empty_string_has_zero_prefix() {
        let mut writer = PayloadWriter::new();
        writer.write_str("");
        assert_eq!(writer.as_slice(), &[0, 0, 0, 0]);

        let mut reader = PayloadReader::new(writer.freeze());
        assert_eq!(reader.read_string().unwrap(), "");
    }

    #[test]
    fn truncated_integer() {
        let mut reader = PayloadReader::new(Bytes::from_static(&[1, 2]));
        assert!(matches!(
            reader.read_i32(),
            Err(ProtocolError::Truncated {
                needed: 4,
                remaining: 2
            })
        ));
    }

    #[test]
    fn truncated_blob() {
        // Claims 10 bytes, carries 3.
        let mut writer = PayloadWriter::new();
        writer.write_i32(10).write_raw(&[1, 2, 3]);
        let mut reader = PayloadReader::new(writer.freeze());
        assert!(matches!(
            reader.read_bytes(),
            Err(ProtocolError::Truncated { needed: 10, .. })
        ));
    }

    #[test]
    fn negative_length_prefix() {
        let mut writer = PayloadWriter::new();
        writer.write_i32(-1);
        let mut reader = PayloadReader::new(writer.freeze());
        assert!(matches!(
            reader.read_string(),
            Err(ProtocolError::NegativeLength(-1))
        ));
    }

    #[test]
    fn invalid_bool() {
        let mut reader = PayloadReader::new(Bytes::from_static(&[2]));
        assert!(matches!(
            reader.read_bool(),
            Err(ProtocolError::InvalidBool(2))
        ));
    }

    #[test]
    fn invalid_utf8() {
        let mut writer = PayloadWriter::new();
        writer.write_bytes(&[0xff, 0xfe]);
        let mut reader = PayloadReader::new(writer.freeze());
        assert!(matches!(
            reader.read_string(),
            Err(ProtocolError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn read_remaining_drains() {
        let mut reader = PayloadReader::new(Bytes::from_static(&[5, 1, 2, 3]));
        assert_eq!(reader.read_u8().unwrap(), 5);
        assert_eq!(&reader.read_remaining()[..], &[1, 2, 3]);
        assert_eq!(reader.remaining(), 0);
        assert!(reader.read_remaining().is_empty());
    }
}
