//! The kbin data stream and its tri-cursor alignment.
//!
//! Values live in a separate stream from the node records. Anything of four
//! bytes or more (and every length-prefixed payload) goes through the
//! primary cursor and is padded to a 4-byte boundary. Values of exactly one
//! or two bytes are packed more densely: a byte cursor and a word cursor each
//! claim a zeroed dword from the primary cursor and then fill it one value at
//! a time, so four `u8` or two `u16` values share a single dword.
//!
//! All three cursors index the same storage. On the write side that storage
//! is a single [`ByteBuffer`]: the primary cursor appends, the secondary
//! cursors patch bytes the primary already reserved.

use kbin_common::{ByteBuffer, ByteReader, ALIGNMENT};
use tracing::trace;

use crate::{Error, Result};

/// Writer for the data stream.
#[derive(Debug, Default)]
pub struct DataWriter {
    buf: ByteBuffer,
    byte_offset: usize,
    word_offset: usize,
}

impl DataWriter {
    /// Create an empty data stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far (the primary cursor's offset).
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the writer, returning the stream bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf.into_inner()
    }

    /// Write a length-prefixed payload through the primary cursor.
    pub fn write_array(&mut self, payload: &[u8]) -> Result<()> {
        self.buf.append_u32(length_word(payload.len())?);
        self.buf.append_bytes(payload);
        self.buf.realign_writes(ALIGNMENT);
        Ok(())
    }

    /// Write a string payload: encoded bytes plus a NUL terminator.
    pub fn write_string(&mut self, encoded: &[u8]) -> Result<()> {
        self.buf.append_u32(length_word(encoded.len() + 1)?);
        self.buf.append_bytes(encoded);
        self.buf.append_u8(0);
        self.buf.realign_writes(ALIGNMENT);
        Ok(())
    }

    /// Write one fixed-size value, packing 1- and 2-byte values.
    pub fn write_aligned(&mut self, value: &[u8]) -> Result<()> {
        let primary = self.buf.len();
        if self.byte_offset % ALIGNMENT == 0 {
            self.byte_offset = primary;
        }
        if self.word_offset % ALIGNMENT == 0 {
            self.word_offset = primary;
        }

        match value.len() {
            1 => {
                if self.byte_offset % ALIGNMENT == 0 {
                    self.buf.append_u32(0);
                }
                self.buf.set_bytes_at(self.byte_offset, value)?;
                self.byte_offset += 1;
            }
            2 => {
                if self.word_offset % ALIGNMENT == 0 {
                    self.buf.append_u32(0);
                }
                self.buf.set_bytes_at(self.word_offset, value)?;
                self.word_offset += 2;
            }
            _ => {
                self.buf.append_bytes(value);
                self.buf.realign_writes(ALIGNMENT);
            }
        }

        // the primary cursor reserved every byte the secondary cursors touch
        debug_assert!(self.buf.len() >= self.byte_offset.max(self.word_offset));
        trace!(
            primary = self.buf.len(),
            byte = self.byte_offset,
            word = self.word_offset,
            size = value.len(),
            "aligned write"
        );
        Ok(())
    }
}

/// Convert a byte length to the u32 stored in front of a payload or stream.
pub fn length_word(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::PayloadTooLarge { length: len })
}

/// Reader for the data stream.
///
/// Offsets are absolute positions in the input blob; the stream itself
/// starts on a 4-byte boundary so alignment is the same either way.
#[derive(Debug, Clone)]
pub struct DataReader<'a> {
    primary: ByteReader<'a>,
    byte_offset: usize,
    word_offset: usize,
}

impl<'a> DataReader<'a> {
    /// Create a reader whose cursors all start at `start`.
    pub fn new(data: &'a [u8], start: usize) -> Self {
        Self {
            primary: ByteReader::new_at(data, start),
            byte_offset: start,
            word_offset: start,
        }
    }

    /// Current offset of the primary cursor.
    pub fn position(&self) -> usize {
        self.primary.position()
    }

    /// Read a 4-byte count or length through the primary cursor.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.primary.read_u32()?)
    }

    /// Read `len` raw bytes through the primary cursor, then realign.
    pub fn read_array(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self.primary.read_bytes(len)?;
        self.primary.realign(ALIGNMENT);
        Ok(bytes)
    }

    /// Read a length-prefixed payload.
    pub fn read_auto(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.read_array(len)
    }

    /// Read one fixed-size value, mirroring [`DataWriter::write_aligned`].
    pub fn read_aligned(&mut self, size: usize) -> Result<&'a [u8]> {
        let primary = self.primary.position();
        if self.byte_offset % ALIGNMENT == 0 {
            self.byte_offset = primary;
        }
        if self.word_offset % ALIGNMENT == 0 {
            self.word_offset = primary;
        }

        let value = match size {
            1 => {
                let value = self.primary.bytes_at(self.byte_offset, 1)?;
                self.byte_offset += 1;
                value
            }
            2 => {
                let value = self.primary.bytes_at(self.word_offset, 2)?;
                self.word_offset += 2;
                value
            }
            _ => {
                let value = self.primary.read_bytes(size)?;
                self.primary.realign(ALIGNMENT);
                value
            }
        };

        let trailing = self.byte_offset.max(self.word_offset);
        if self.primary.position() < trailing {
            self.primary.seek(trailing);
            self.primary.realign(ALIGNMENT);
        }

        trace!(
            primary = self.primary.position(),
            byte = self.byte_offset,
            word = self.word_offset,
            size,
            "aligned read"
        );
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_bytes_share_one_dword() {
        let mut writer = DataWriter::new();
        for b in 1..=4u8 {
            writer.write_aligned(&[b]).unwrap();
        }
        assert_eq!(writer.len(), 4);
        writer.write_aligned(&[5]).unwrap();
        assert_eq!(writer.into_inner(), vec![1, 2, 3, 4, 5, 0, 0, 0]);
    }

    #[test]
    fn test_two_words_share_one_dword() {
        let mut writer = DataWriter::new();
        writer.write_aligned(&[0x12, 0x34]).unwrap();
        writer.write_aligned(&[0x56, 0x78]).unwrap();
        assert_eq!(writer.into_inner(), vec![0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_wide_values_stay_aligned() {
        let mut writer = DataWriter::new();
        writer.write_aligned(&[1, 2, 3]).unwrap();
        assert_eq!(writer.len(), 4);
        writer.write_aligned(&[0xAA; 8]).unwrap();
        assert_eq!(writer.len(), 12);
        writer.write_aligned(&[0xBB; 6]).unwrap();
        assert_eq!(writer.len(), 20);
    }

    #[test]
    fn test_bytes_backfill_earlier_dword() {
        // u8, u32, u8: the second u8 lands next to the first, not after the u32
        let mut writer = DataWriter::new();
        writer.write_aligned(&[0x11]).unwrap();
        writer.write_aligned(&[0, 0, 0, 0x2A]).unwrap();
        writer.write_aligned(&[0x22]).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes, vec![0x11, 0x22, 0, 0, 0, 0, 0, 0x2A]);

        let mut reader = DataReader::new(&bytes, 0);
        assert_eq!(reader.read_aligned(1).unwrap(), &[0x11]);
        assert_eq!(reader.read_aligned(4).unwrap(), &[0, 0, 0, 0x2A]);
        assert_eq!(reader.read_aligned(1).unwrap(), &[0x22]);
        assert_eq!(reader.position(), 8);
    }

    #[test]
    fn test_byte_and_word_regions_interleave() {
        let mut writer = DataWriter::new();
        writer.write_aligned(&[0x01]).unwrap();
        writer.write_aligned(&[0x02, 0x03]).unwrap();
        writer.write_aligned(&[0x04]).unwrap();
        writer.write_aligned(&[0x05, 0x06]).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes, vec![0x01, 0x04, 0, 0, 0x02, 0x03, 0x05, 0x06]);

        let mut reader = DataReader::new(&bytes, 0);
        assert_eq!(reader.read_aligned(1).unwrap(), &[0x01]);
        assert_eq!(reader.read_aligned(2).unwrap(), &[0x02, 0x03]);
        assert_eq!(reader.read_aligned(1).unwrap(), &[0x04]);
        assert_eq!(reader.read_aligned(2).unwrap(), &[0x05, 0x06]);
        assert_eq!(reader.position(), 8);
    }

    #[test]
    fn test_reader_abandons_partial_region() {
        let mut writer = DataWriter::new();
        writer.write_aligned(&[7]).unwrap();
        writer.write_array(b"abc").unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes, vec![7, 0, 0, 0, 0, 0, 0, 3, b'a', b'b', b'c', 0]);

        let mut reader = DataReader::new(&bytes, 0);
        assert_eq!(reader.read_aligned(1).unwrap(), &[7]);
        assert_eq!(reader.position(), 4);
        assert_eq!(reader.read_auto().unwrap(), b"abc");
        assert_eq!(reader.position(), 12);
    }

    #[test]
    fn test_string_payload_padding() {
        let mut writer = DataWriter::new();
        writer.write_string(b"hi").unwrap();
        assert_eq!(writer.into_inner(), vec![0, 0, 0, 3, b'h', b'i', 0, 0]);
    }

    #[test]
    fn test_reader_offset_base() {
        let blob = [0xFF, 0xFF, 0xFF, 0xFF, 9, 0, 0, 0];
        let mut reader = DataReader::new(&blob, 4);
        assert_eq!(reader.read_aligned(1).unwrap(), &[9]);
        assert_eq!(reader.position(), 8);
    }

    #[test]
    fn test_length_word_limit() {
        assert_eq!(length_word(u32::MAX as usize).unwrap(), u32::MAX);

        #[cfg(target_pointer_width = "64")]
        {
            let err = length_word(u32::MAX as usize + 1).unwrap_err();
            assert!(matches!(err, Error::PayloadTooLarge { length } if length == 1 << 32));
            assert_eq!(err.kind(), crate::ErrorKind::Validation);
        }
    }

    #[test]
    fn test_reader_truncated() {
        let mut reader = DataReader::new(&[0, 0, 0, 9, 1], 0);
        assert!(reader.read_auto().is_err());
    }
}
