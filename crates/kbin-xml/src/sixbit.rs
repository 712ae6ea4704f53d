//! Six-bit name packing.
//!
//! Compressed kbin files store tag and attribute names as runs of 6-bit
//! indices into a 64-symbol alphabet, packed most-significant-bit first and
//! zero-padded to a whole byte. The run is preceded by a one-byte character
//! count.

use kbin_common::{ByteBuffer, ByteReader};

use crate::{Error, Result};

/// The six-bit alphabet, in index order.
pub const ALPHABET: &[u8; 64] = b"0123456789:ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Longest name representable by the one-byte length prefix.
pub const MAX_LEN: usize = u8::MAX as usize;

/// Alphabet index of a character, if it has one.
fn index_of(ch: char) -> Option<u8> {
    let index = match ch {
        '0'..='9' => ch as u32 - '0' as u32,
        ':' => 10,
        'A'..='Z' => ch as u32 - 'A' as u32 + 11,
        '_' => 37,
        'a'..='z' => ch as u32 - 'a' as u32 + 38,
        _ => return None,
    };
    Some(index as u8)
}

/// Number of bytes occupied by `chars` packed characters.
#[inline]
pub const fn packed_len(chars: usize) -> usize {
    (chars * 6 + 7) / 8
}

/// Pack `name` into `out` as a count byte followed by the bit run.
pub fn pack(name: &str, out: &mut ByteBuffer) -> Result<()> {
    let indices = name
        .chars()
        .map(|ch| {
            index_of(ch).ok_or_else(|| Error::InvalidSixbitChar {
                name: name.to_string(),
                ch,
            })
        })
        .collect::<Result<Vec<u8>>>()?;

    if indices.len() > MAX_LEN {
        return Err(Error::NameLength {
            name: name.to_string(),
            len: indices.len(),
            min: 0,
            max: MAX_LEN,
        });
    }

    out.append_u8(indices.len() as u8);

    let mut bits: u32 = 0;
    let mut pending = 0;
    for index in indices {
        bits = (bits << 6) | u32::from(index);
        pending += 6;
        if pending >= 8 {
            pending -= 8;
            out.append_u8((bits >> pending) as u8);
        }
    }
    if pending > 0 {
        out.append_u8((bits << (8 - pending)) as u8);
    }

    Ok(())
}

/// Unpack a count-prefixed six-bit name.
pub fn unpack(reader: &mut ByteReader<'_>) -> Result<String> {
    let len = reader.read_u8()? as usize;
    let packed = reader.read_bytes(packed_len(len))?;

    let mut name = String::with_capacity(len);
    let mut bits: u32 = 0;
    let mut available = 0;
    let mut bytes = packed.iter();
    while name.len() < len {
        if available < 6 {
            // packed_len guarantees enough bytes for `len` characters
            let Some(&byte) = bytes.next() else { break };
            bits = (bits << 8) | u32::from(byte);
            available += 8;
        }
        available -= 6;
        let index = (bits >> available) & 0x3F;
        name.push(ALPHABET[index as usize] as char);
    }

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(name: &str) -> Vec<u8> {
        let mut buf = ByteBuffer::new();
        pack(name, &mut buf).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_alphabet_indices() {
        for (i, &b) in ALPHABET.iter().enumerate() {
            assert_eq!(index_of(b as char), Some(i as u8));
        }
        assert_eq!(index_of('-'), None);
        assert_eq!(index_of('é'), None);
    }

    #[test]
    fn test_pack_root() {
        // r=55 o=52 o=52 t=57 -> 110111 110100 110100 111001
        assert_eq!(packed("root"), vec![4, 0xDF, 0x4D, 0x39]);
    }

    #[test]
    fn test_pack_pads_last_byte() {
        // "0_A": 000000 100101 001011 + 6 zero bits
        assert_eq!(packed("0_A"), vec![3, 0x02, 0x52, 0xC0]);
        assert_eq!(packed("").as_slice(), &[0]);
    }

    #[test]
    fn test_round_trip_every_symbol() {
        let all = std::str::from_utf8(ALPHABET).unwrap();
        for name in [all, "a", "ab", "abc", "node_1", "xmlns:foo", "ZZZZZZZZZ"] {
            let bytes = packed(name);
            assert_eq!(bytes.len(), 1 + packed_len(name.len()));
            let mut reader = ByteReader::new(&bytes);
            assert_eq!(unpack(&mut reader).unwrap(), name);
            assert!(!reader.has_data());
        }
    }

    #[test]
    fn test_pack_rejects_outside_alphabet() {
        let mut buf = ByteBuffer::new();
        let err = pack("bad-name", &mut buf).unwrap_err();
        assert!(matches!(err, Error::InvalidSixbitChar { ch: '-', .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_pack_rejects_overlong() {
        let name = "a".repeat(MAX_LEN + 1);
        assert!(matches!(
            pack(&name, &mut ByteBuffer::new()),
            Err(Error::NameLength { .. })
        ));
        assert!(pack(&"a".repeat(MAX_LEN), &mut ByteBuffer::new()).is_ok());
    }

    #[test]
    fn test_unpack_truncated() {
        let mut reader = ByteReader::new(&[4, 0xD7]);
        assert!(unpack(&mut reader).is_err());
    }
}
