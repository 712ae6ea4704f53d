//! kbin file header.

use zerocopy::byteorder::{BigEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{Error, Result, TextEncoding};

/// The fixed 8-byte header at the start of every kbin file.
///
/// The node stream follows immediately; its length does not include the
/// 4-byte data-stream length that comes after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct KbinHeader {
    /// Always [`KbinHeader::SIGNATURE`].
    pub signature: u8,
    /// [`KbinHeader::COMPRESSED`] or [`KbinHeader::UNCOMPRESSED`].
    pub compression: u8,
    /// Text encoding id.
    pub encoding: u8,
    /// Bitwise complement of `encoding`.
    pub encoding_check: u8,
    /// Length of the padded node stream.
    pub node_length: U32<BigEndian>,
}

impl KbinHeader {
    /// First byte of every kbin file.
    pub const SIGNATURE: u8 = 0xA0;

    /// Names are six-bit packed.
    pub const COMPRESSED: u8 = 0x42;

    /// Names are stored as raw encoded bytes.
    pub const UNCOMPRESSED: u8 = 0x45;

    /// Size of the header in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Build a header for the given settings.
    pub fn new(encoding: TextEncoding, compressed: bool, node_length: u32) -> Self {
        let id = encoding.id();
        Self {
            signature: Self::SIGNATURE,
            compression: if compressed {
                Self::COMPRESSED
            } else {
                Self::UNCOMPRESSED
            },
            encoding: id,
            encoding_check: 0xFF ^ id,
            node_length: U32::new(node_length),
        }
    }

    /// Check the signature, compression flag and encoding self-check.
    ///
    /// Returns the negotiated encoding and whether names are compressed.
    pub fn validate(&self) -> Result<(TextEncoding, bool)> {
        if self.signature != Self::SIGNATURE {
            return Err(Error::InvalidSignature {
                actual: self.signature,
            });
        }

        let compressed = match self.compression {
            Self::COMPRESSED => true,
            Self::UNCOMPRESSED => false,
            actual => return Err(Error::InvalidCompression { actual }),
        };

        if self.encoding_check != 0xFF ^ self.encoding {
            return Err(Error::EncodingCheck {
                encoding: self.encoding,
                check: self.encoding_check,
            });
        }

        let encoding =
            TextEncoding::from_id(self.encoding).ok_or(Error::UnknownEncoding(self.encoding))?;

        Ok((encoding, compressed))
    }
}

/// Check if data looks like kbin by its first two bytes.
pub fn is_binary_xml(data: &[u8]) -> bool {
    data.len() >= 2
        && data[0] == KbinHeader::SIGNATURE
        && matches!(data[1], KbinHeader::COMPRESSED | KbinHeader::UNCOMPRESSED)
}
