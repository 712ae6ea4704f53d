//! Big-endian reader for zero-copy parsing of byte slices.
//!
//! This module provides [`ByteReader`], a cursor-like type that reads kbin
//! data from a byte slice without copying. Unlike a plain cursor it carries
//! an `end` bound, so the node stream of a kbin file can be walked without
//! running into the data stream that follows it.

use byteorder::{BigEndian, ByteOrder};
use zerocopy::FromBytes;

use crate::{align_up, Error, Result};

/// A big-endian binary reader over a byte slice.
///
/// # Example
///
/// ```
/// use kbin_common::ByteReader;
///
/// let data = [0x00, 0x00, 0x00, 0x2A, 0x01];
/// let mut reader = ByteReader::new(&data);
///
/// assert_eq!(reader.read_u32().unwrap(), 42);
/// assert_eq!(reader.read_u8().unwrap(), 1);
/// assert!(!reader.has_data());
/// ```
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
    end: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a new reader over the whole slice.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            end: data.len(),
        }
    }

    /// Create a new reader starting at a specific position.
    #[inline]
    pub const fn new_at(data: &'a [u8], position: usize) -> Self {
        Self {
            data,
            position,
            end: data.len(),
        }
    }

    /// Get the current position in the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Get the total length of the underlying buffer.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Check whether the underlying buffer is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the logical end of the readable region.
    #[inline]
    pub const fn end(&self) -> usize {
        self.end
    }

    /// Limit reads to bytes before `end` (clamped to the buffer length).
    #[inline]
    pub fn set_end(&mut self, end: usize) {
        self.end = end.min(self.data.len());
    }

    /// Get the number of bytes remaining before the logical end.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.end.saturating_sub(self.position)
    }

    /// Check if there are bytes left before the logical end.
    #[inline]
    pub const fn has_data(&self) -> bool {
        self.position < self.end
    }

    /// Seek to an absolute position.
    #[inline]
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// Advance the position up to the next multiple of `size`.
    #[inline]
    pub fn realign(&mut self, size: usize) {
        self.position = align_up(self.position, size);
    }

    /// Read bytes at an absolute offset without touching the position.
    ///
    /// This is bounded by the logical end like every other read.
    #[inline]
    pub fn bytes_at(&self, offset: usize, count: usize) -> Result<&'a [u8]> {
        let available = self.end.saturating_sub(offset);
        if available < count {
            return Err(Error::UnexpectedEof {
                offset,
                needed: count,
                available,
            });
        }
        Ok(&self.data[offset..offset + count])
    }

    /// Peek at bytes without advancing the position.
    #[inline]
    pub fn peek_bytes(&self, count: usize) -> Result<&'a [u8]> {
        self.bytes_at(self.position, count)
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_bytes(count)?;
        self.position += count;
        Ok(bytes)
    }

    /// Peek at the next byte without advancing.
    #[inline]
    pub fn peek_u8(&self) -> Result<u8> {
        self.peek_bytes(1).map(|b| b[0])
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    /// Read a signed byte.
    #[inline]
    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_u8().map(|b| b as i8)
    }

    /// Read a big-endian u16.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_bytes(2).map(BigEndian::read_u16)
    }

    /// Read a big-endian i16.
    #[inline]
    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_bytes(2).map(BigEndian::read_i16)
    }

    /// Read a big-endian u32.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_bytes(4).map(BigEndian::read_u32)
    }

    /// Read a big-endian i32.
    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_bytes(4).map(BigEndian::read_i32)
    }

    /// Read a big-endian u64.
    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_bytes(8).map(BigEndian::read_u64)
    }

    /// Read a big-endian i64.
    #[inline]
    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_bytes(8).map(BigEndian::read_i64)
    }

    /// Read a struct using zerocopy.
    ///
    /// The struct must implement `FromBytes` from the zerocopy crate and is
    /// responsible for its own byte order (for example through
    /// `zerocopy::byteorder` field types).
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::InvalidStruct {
            name: std::any::type_name::<T>(),
            available: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives() {
        let data = [
            0x01u8, 0x02, 0x03, 0x04, // u32: 0x01020304
            0xFF, 0xFE, // i16: -2
            0x80, // i8: -128
        ];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_u32().unwrap(), 0x01020304);
        assert_eq!(reader.read_i16().unwrap(), -2);
        assert_eq!(reader.read_i8().unwrap(), -128);
        assert!(!reader.has_data());
    }

    #[test]
    fn test_read_wide() {
        let data = [0xFF; 8];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_i64().unwrap(), -1);
        reader.seek(0);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX);
    }

    #[test]
    fn test_end_bounds_reads() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut reader = ByteReader::new(&data);
        reader.set_end(4);

        assert_eq!(reader.remaining(), 4);
        assert_eq!(reader.read_u16().unwrap(), 0x0102);
        assert!(reader.read_u32().is_err());
        assert!(reader.bytes_at(5, 1).is_err());
    }

    #[test]
    fn test_realign() {
        let data = [0u8; 16];
        let mut reader = ByteReader::new_at(&data, 5);
        reader.realign(4);
        assert_eq!(reader.position(), 8);
        reader.realign(4);
        assert_eq!(reader.position(), 8);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let data = [0x2A, 0x00];
        let reader = ByteReader::new(&data);

        assert_eq!(reader.peek_u8().unwrap(), 0x2A);
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_eof_error_reports_offset() {
        let data = [0x01, 0x02];
        let mut reader = ByteReader::new_at(&data, 1);

        match reader.read_u32() {
            Err(Error::UnexpectedEof {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(offset, 1);
                assert_eq!(needed, 4);
                assert_eq!(available, 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
