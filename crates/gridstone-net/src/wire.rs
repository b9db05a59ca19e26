//! Little-endian binary reader/writer primitives.
//!
//! All wire integers are little-endian; floats are IEEE-754 little-endian.
//! The reader is cursor-based and length-checked: running off the end of a
//! payload is a [`WireError::Truncated`], never a panic.

use thiserror::Error;

/// Errors raised while decoding wire payloads.
#[derive(Debug, Error)]
pub enum WireError {
    /// The payload ended before the expected field.
    #[error("payload truncated: needed {needed} more bytes, {remaining} left")]
    Truncated {
        /// Bytes the current field still needed.
        needed: usize,
        /// Bytes remaining in the payload.
        remaining: usize,
    },

    /// The message tag is not one this peer understands.
    #[error("unknown message tag: {0}")]
    UnknownTag(u16),

    /// A type-table name exceeds the 127-byte limit.
    #[error("type name of {0} bytes exceeds the 127-byte limit")]
    NameTooLong(usize),

    /// A type-table name is not valid UTF-8.
    #[error("type name is not valid UTF-8")]
    InvalidName,

    /// A voxel references a type id outside the transmitted table.
    #[error("voxel type id {id} outside table of {table_len} entries")]
    BadTypeId {
        /// The id read from the wire.
        id: u16,
        /// Entries in the session's type table.
        table_len: usize,
    },
}

/// Cursor over a received payload.
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        self.take(n)
    }
}

/// Append-only payload builder.
#[derive(Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
