//! Wire encoding primitives.
//!
//! All integers are little-endian; strings and byte runs are
//! length-prefixed; optionals carry a presence byte; UUIDs are 16 raw
//! bytes.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while decoding wire bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The input ended before a value was complete.
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEnd(usize),

    /// A string's bytes were not valid UTF-8.
    #[error("invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// A tag or enum code had no defined meaning.
    #[error("invalid {what} tag {value} at offset {offset}")]
    InvalidTag {
        /// What was being decoded.
        what: &'static str,
        /// The unrecognized code.
        value: u32,
        /// Where it was read.
        offset: usize,
    },
}

/// Appends wire-encoded values to a growing buffer.
pub struct WireWriter {
    pub(crate) buffer: Vec<u8>,
}

impl WireWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        WireWriter { buffer: Vec::new() }
    }

    /// Consume the writer and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// The current length of the encoded output.
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    /// Emit a raw byte.
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a boolean as one byte.
    pub fn emit_bool(&mut self, value: bool) {
        self.emit_u8(value as u8);
    }

    /// Emit a 32-bit unsigned integer.
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit unsigned integer.
    pub fn emit_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer.
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a UUID as 16 raw bytes.
    pub fn emit_uuid(&mut self, uuid: Uuid) {
        self.buffer.extend_from_slice(uuid.as_bytes());
    }

    /// Emit a length-prefixed string.
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Emit a length-prefixed byte run.
    pub fn emit_bytes(&mut self, value: &[u8]) {
        self.emit_u64(value.len() as u64);
        self.buffer.extend_from_slice(value);
    }

    /// Emit an optional 64-bit value as a presence byte plus payload.
    pub fn emit_opt_u64(&mut self, value: Option<u64>) {
        match value {
            Some(v) => {
                self.emit_u8(1);
                self.emit_u64(v);
            }
            None => self.emit_u8(0),
        }
    }

    /// Overwrite a previously emitted 32-bit value at `offset`.
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl Default for WireWriter {
    fn default() -> Self {
        WireWriter::new()
    }
}

/// Reads wire-encoded values from a byte slice.
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Wrap a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        WireReader { data, pos: 0 }
    }

    /// The current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Take `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::UnexpectedEnd(self.pos))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a boolean byte; anything but 0 or 1 is an error.
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        let offset = self.pos;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(DecodeError::InvalidTag {
                what: "bool",
                value: value as u32,
                offset,
            }),
        }
    }

    /// Read a 32-bit unsigned integer.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 64-bit unsigned integer.
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a 64-bit signed integer.
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(i64::from_le_bytes(buf))
    }

    /// Read a UUID from 16 raw bytes.
    pub fn read_uuid(&mut self) -> Result<Uuid, DecodeError> {
        let bytes = self.read_bytes(16)?;
        let mut buf = [0u8; 16];
        buf.copy_from_slice(bytes);
        Ok(Uuid::from_bytes(buf))
    }

    /// Read a length-prefixed string.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        let offset = self.pos;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(offset))
    }

    /// Read a length-prefixed byte run.
    pub fn read_byte_run(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u64()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// Read an optional 64-bit value.
    pub fn read_opt_u64(&mut self) -> Result<Option<u64>, DecodeError> {
        if self.read_bool()? {
            Ok(Some(self.read_u64()?))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_roundtrip() {
        let mut writer = WireWriter::new();
        writer.emit_u8(7);
        writer.emit_bool(true);
        writer.emit_u32(0xdead_beef);
        writer.emit_u64(u64::MAX);
        writer.emit_i64(-42);
        let uuid = Uuid::new_v4();
        writer.emit_uuid(uuid);
        writer.emit_string("hello");
        writer.emit_bytes(&[1, 2, 3]);
        writer.emit_opt_u64(Some(9));
        writer.emit_opt_u64(None);

        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX);
        assert_eq!(reader.read_i64().unwrap(), -42);
        assert_eq!(reader.read_uuid().unwrap(), uuid);
        assert_eq!(reader.read_string().unwrap(), "hello");
        assert_eq!(reader.read_byte_run().unwrap(), vec![1, 2, 3]);
        assert_eq!(reader.read_opt_u64().unwrap(), Some(9));
        assert_eq!(reader.read_opt_u64().unwrap(), None);
        assert_eq!(reader.position(), bytes.len());
    }

    #[test]
    fn test_truncated_input() {
        let mut writer = WireWriter::new();
        writer.emit_u64(1);
        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes[..5]);
        assert!(matches!(
            reader.read_u64(),
            Err(DecodeError::UnexpectedEnd(0))
        ));
    }

    #[test]
    fn test_invalid_bool_tag() {
        let mut reader = WireReader::new(&[9]);
        assert!(matches!(
            reader.read_bool(),
            Err(DecodeError::InvalidTag { what: "bool", value: 9, .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut writer = WireWriter::new();
        writer.emit_u32(2);
        writer.emit_u8(0xff);
        writer.emit_u8(0xfe);
        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes);
        assert!(matches!(
            reader.read_string(),
            Err(DecodeError::InvalidUtf8(4))
        ));
    }

    #[test]
    fn test_patch_u32() {
        let mut writer = WireWriter::new();
        let at = writer.offset();
        writer.emit_u32(0);
        writer.emit_u8(1);
        writer.patch_u32(at, 0x1234_5678);
        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.read_u32().unwrap(), 0x1234_5678);
    }
}
