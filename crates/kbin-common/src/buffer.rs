//! Growable big-endian byte buffer.
//!
//! [`ByteBuffer`] is the write-side counterpart of [`crate::ByteReader`]. Its
//! write offset is always its length; bytes already written can be patched
//! in place through bounds-checked indexed writes, which is how several
//! cursors share one buffer without owning overlapping slices.

use byteorder::{BigEndian, ByteOrder};

use crate::{align_up, Error, Result};

/// An owned, growable byte buffer with big-endian append operations.
///
/// # Example
///
/// ```
/// use kbin_common::ByteBuffer;
///
/// let mut buf = ByteBuffer::new();
/// buf.append_u8(0xA0);
/// buf.realign_writes(4);
/// buf.append_u32(42);
///
/// assert_eq!(buf.as_slice(), &[0xA0, 0, 0, 0, 0, 0, 0, 42]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    /// Create an empty buffer.
    #[inline]
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Number of bytes written so far (also the write offset).
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check whether nothing has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the written bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer, returning the written bytes.
    #[inline]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Append raw bytes.
    #[inline]
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append a single byte.
    #[inline]
    pub fn append_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Append a big-endian u32.
    #[inline]
    pub fn append_u32(&mut self, value: u32) {
        let mut bytes = [0u8; 4];
        BigEndian::write_u32(&mut bytes, value);
        self.append_bytes(&bytes);
    }

    /// Overwrite bytes that were already written, at an absolute offset.
    ///
    /// Fails instead of growing the buffer: callers reserve the region
    /// first, then fill it.
    pub fn set_bytes_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let size = self.data.len();
        match offset.checked_add(bytes.len()) {
            Some(end) if end <= size => {
                self.data[offset..end].copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(Error::OutOfBounds {
                offset,
                len: bytes.len(),
                size,
            }),
        }
    }

    /// Pad with zero bytes until the length is a multiple of `size`.
    #[inline]
    pub fn realign_writes(&mut self, size: usize) {
        let aligned = align_up(self.data.len(), size);
        self.data.resize(aligned, 0);
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<ByteBuffer> for Vec<u8> {
    fn from(buf: ByteBuffer) -> Self {
        buf.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_big_endian() {
        let mut buf = ByteBuffer::new();
        buf.append_u8(0x01);
        buf.append_u32(0x03040506);

        assert_eq!(buf.as_slice(), &[1, 3, 4, 5, 6]);
    }

    #[test]
    fn test_realign_writes_pads_zero() {
        let mut buf = ByteBuffer::new();
        buf.append_bytes(b"hi\0");
        buf.realign_writes(4);
        assert_eq!(buf.as_slice(), b"hi\0\0");

        // already aligned: no-op
        buf.realign_writes(4);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_set_bytes_at_patches_in_place() {
        let mut buf = ByteBuffer::new();
        buf.append_u32(0);
        buf.set_bytes_at(1, &[0xAB, 0xCD]).unwrap();
        assert_eq!(buf.as_slice(), &[0, 0xAB, 0xCD, 0]);
    }

    #[test]
    fn test_set_bytes_at_out_of_bounds() {
        let mut buf = ByteBuffer::new();
        buf.append_u8(0);
        assert!(matches!(
            buf.set_bytes_at(0, &[1, 2]),
            Err(Error::OutOfBounds { offset: 0, len: 2, size: 1 })
        ));
    }
}
