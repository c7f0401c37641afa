//! Endian-aware binary reader over a borrowed byte slice
//!
//! Serialized files switch byte order between the header (always big-endian)
//! and the metadata/object payloads (usually little-endian), so the reader
//! carries its endianness as runtime state rather than as a type parameter.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Byte order of a stream region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Low-level read failures
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("Unexpected end of data at offset {offset:#x}: need {needed} bytes, have {available}")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Unterminated string at offset {0:#x}")]
    UnterminatedString(usize),
}

pub type Result<T> = std::result::Result<T, ReadError>;

macro_rules! read_endian {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $method:ident, $size:expr) => {
        $(#[$doc])*
        pub fn $name(&mut self) -> Result<$ty> {
            self.ensure($size)?;
            let value = match self.endian {
                Endian::Little => self.cursor.$method::<LittleEndian>(),
                Endian::Big => self.cursor.$method::<BigEndian>(),
            };
            value.map_err(|_| self.eof($size))
        }
    };
}

/// Bounds-checked cursor; every read past the end is an error, never a panic
#[derive(Clone)]
pub struct BinaryReader<'a> {
    cursor: Cursor<&'a [u8]>,
    endian: Endian,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            cursor: Cursor::new(data),
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Current byte position
    #[inline]
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Total length of the underlying slice
    #[inline]
    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes left after the current position
    #[inline]
    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position())
    }

    /// Move to an absolute position (must be within the slice)
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.len() {
            return Err(ReadError::UnexpectedEof {
                offset: pos,
                needed: 0,
                available: self.len(),
            });
        }
        self.cursor.set_position(pos as u64);
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.cursor.set_position((self.position() + n) as u64);
        Ok(())
    }

    /// Advance to the next multiple of `alignment`
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let misalignment = self.position() % alignment;
        if misalignment != 0 {
            // Trailing padding may be cut off at the very end of a payload
            let pad = (alignment - misalignment).min(self.remaining());
            self.skip(pad)?;
        }
        Ok(())
    }

    pub fn ensure(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(self.eof(n));
        }
        Ok(())
    }

    fn eof(&self, needed: usize) -> ReadError {
        ReadError::UnexpectedEof {
            offset: self.position(),
            needed,
            available: self.remaining(),
        }
    }

    /// Borrow `n` bytes without copying
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let start = self.position();
        let data: &'a [u8] = *self.cursor.get_ref();
        self.cursor.set_position((start + n) as u64);
        Ok(&data[start..start + n])
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        self.cursor.read_u8().map_err(|_| self.eof(1))
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.ensure(1)?;
        self.cursor.read_i8().map_err(|_| self.eof(1))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    read_endian!(read_u16, u16, read_u16, 2);
    read_endian!(read_i16, i16, read_i16, 2);
    read_endian!(read_u32, u32, read_u32, 4);
    read_endian!(read_i32, i32, read_i32, 4);
    read_endian!(read_u64, u64, read_u64, 8);
    read_endian!(read_i64, i64, read_i64, 8);
    read_endian!(read_f32, f32, read_f32, 4);
    read_endian!(read_f64, f64, read_f64, 8);

    /// Read a null-terminated string (lossy UTF-8)
    pub fn read_cstring(&mut self) -> Result<String> {
        let start = self.position();
        let data: &'a [u8] = *self.cursor.get_ref();
        let rest = &data[start..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ReadError::UnterminatedString(start))?;
        let value = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.cursor.set_position((start + end + 1) as u64);
        Ok(value)
    }
}
