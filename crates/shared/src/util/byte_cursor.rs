// ByteCursor - positioned little-endian buffer for JMXV file codecs
//
// One cursor serves both directions. Reads are bounds-checked and fail with
// `TruncatedBuffer`. Writes overwrite at the cursor and grow the buffer when
// they run past its end, so a writer can reserve a header, emit sections,
// then seek back and patch the header in place.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{FormatError, Result};
use crate::util::codepage;

/// Length of every JMXV binary signature.
pub const SIGNATURE_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Begin,
    Current,
    End,
}

#[derive(Debug, Clone, Default)]
pub struct ByteCursor {
    data: Vec<u8>,
    pos: usize,
}

macro_rules! read_le {
    ($name:ident, $ty:ty, $size:expr, $conv:path) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.take($size)?;
            Ok($conv(bytes))
        }
    };
}

macro_rules! write_le {
    ($name:ident, $ty:ty, $size:expr, $conv:path) => {
        pub fn $name(&mut self, val: $ty) {
            let mut buf = [0u8; $size];
            $conv(&mut buf, val);
            self.write_bytes(&buf);
        }
    };
}

impl ByteCursor {
    /// Create an empty cursor for writing
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteCursor {
            data: Vec::with_capacity(capacity),
            pos: 0,
        }
    }

    /// Wrap a complete file buffer for reading
    pub fn from_bytes(data: Vec<u8>) -> Self {
        ByteCursor { data, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left between the cursor and the end of the buffer
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Move the cursor. Positions past the end are allowed (a following
    /// write extends the buffer, a following read fails); positions before
    /// the start are not.
    pub fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<usize> {
        let base = match origin {
            SeekOrigin::Begin => 0i64,
            SeekOrigin::Current => self.pos as i64,
            SeekOrigin::End => self.data.len() as i64,
        };
        let target = base + offset;
        if target < 0 {
            return Err(FormatError::constraint(format!(
                "seek to {} lands before the start of the buffer",
                target
            )));
        }
        self.pos = target as usize;
        Ok(self.pos)
    }

    /// Skip `count` bytes on the read side; the skipped bytes must exist.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.ensure(count)?;
        self.pos += count;
        Ok(())
    }

    /// Fail unless `count` bytes can be read from the cursor.
    pub fn ensure(&self, count: usize) -> Result<()> {
        match self.pos.checked_add(count) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(FormatError::TruncatedBuffer {
                offset: self.pos,
                needed: count,
                len: self.data.len(),
            }),
        }
    }

    fn take(&mut self, count: usize) -> Result<&[u8]> {
        self.ensure(count)?;
        let start = self.pos;
        self.pos += count;
        Ok(&self.data[start..start + count])
    }

    // ---- Read operations ----

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    read_le!(read_u16, u16, 2, LittleEndian::read_u16);
    read_le!(read_i16, i16, 2, LittleEndian::read_i16);
    read_le!(read_u32, u32, 4, LittleEndian::read_u32);
    read_le!(read_i32, i32, 4, LittleEndian::read_i32);
    read_le!(read_u64, u64, 8, LittleEndian::read_u64);
    read_le!(read_i64, i64, 8, LittleEndian::read_i64);
    read_le!(read_f32, f32, 4, LittleEndian::read_f32);

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        Ok(self.take(count)?.to_vec())
    }

    /// Read `count` raw bytes as code page 1252 text
    pub fn read_fixed_string(&mut self, count: usize) -> Result<String> {
        Ok(codepage::decode(self.take(count)?))
    }

    /// Read a u32 length followed by that many code page 1252 bytes
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        self.read_fixed_string(len)
    }

    /// Read three floats stored X, Z, Y and return them as X, Y, Z
    pub fn read_vec3_xzy(&mut self) -> Result<[f32; 3]> {
        let x = self.read_f32()?;
        let z = self.read_f32()?;
        let y = self.read_f32()?;
        Ok([x, y, z])
    }

    /// Read the leading signature and compare it with `expected`
    pub fn expect_signature(&mut self, expected: &'static str) -> Result<()> {
        if self.remaining() < SIGNATURE_LEN {
            return Err(FormatError::BadSignature {
                expected,
                found: codepage::decode(&self.data[self.pos.min(self.data.len())..]),
            });
        }
        let found = self.read_fixed_string(SIGNATURE_LEN)?;
        if found != expected {
            return Err(FormatError::BadSignature { expected, found });
        }
        Ok(())
    }

    // ---- Write operations (overwrite at cursor, grow as needed) ----

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    pub fn write_u8(&mut self, val: u8) {
        self.write_bytes(&[val]);
    }

    pub fn write_i8(&mut self, val: i8) {
        self.write_bytes(&[val as u8]);
    }

    write_le!(write_u16, u16, 2, LittleEndian::write_u16);
    write_le!(write_i16, i16, 2, LittleEndian::write_i16);
    write_le!(write_u32, u32, 4, LittleEndian::write_u32);
    write_le!(write_i32, i32, 4, LittleEndian::write_i32);
    write_le!(write_u64, u64, 8, LittleEndian::write_u64);
    write_le!(write_i64, i64, 8, LittleEndian::write_i64);
    write_le!(write_f32, f32, 4, LittleEndian::write_f32);

    pub fn write_bool(&mut self, val: bool) {
        self.write_u8(val as u8);
    }

    /// Write code page 1252 text without a length prefix
    pub fn write_fixed_string(&mut self, text: &str) -> Result<()> {
        let bytes = codepage::encode(text)?;
        self.write_bytes(&bytes);
        Ok(())
    }

    /// Write a u32 length followed by the code page 1252 bytes
    pub fn write_string(&mut self, text: &str) -> Result<()> {
        let bytes = codepage::encode(text)?;
        self.write_u32(bytes.len() as u32);
        self.write_bytes(&bytes);
        Ok(())
    }

    /// Write X, Y, Z as X, Z, Y
    pub fn write_vec3_xzy(&mut self, v: [f32; 3]) {
        self.write_f32(v[0]);
        self.write_f32(v[2]);
        self.write_f32(v[1]);
    }

    /// Remove `count` bytes at the cursor; the cursor stays where it is
    pub fn splice_bytes(&mut self, count: usize) -> Result<()> {
        self.ensure(count)?;
        self.data.drain(self.pos..self.pos + count);
        Ok(())
    }
}

impl std::fmt::Display for ByteCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ByteCursor(size={}, pos={})", self.len(), self.pos)
    }
}
