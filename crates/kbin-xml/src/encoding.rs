//! Text encodings negotiated by the kbin header.
//!
//! The third header byte selects how string payloads (and uncompressed
//! names) are encoded. Only the high three bits are used; `0x00` is an old
//! alias of Shift-JIS that is accepted on read and never written.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use encoding_rs::{EUC_JP, SHIFT_JIS};

/// A text encoding that can appear in a kbin header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextEncoding {
    /// Windows Shift-JIS variant (code page 932).
    #[default]
    ShiftJis,
    /// 7-bit ASCII.
    Ascii,
    /// ISO-8859-1.
    Latin1,
    /// EUC-JP.
    EucJp,
    /// UTF-8.
    Utf8,
}

impl TextEncoding {
    /// All encodings, in header id order.
    pub const ALL: [TextEncoding; 5] = [
        Self::Ascii,
        Self::Latin1,
        Self::EucJp,
        Self::ShiftJis,
        Self::Utf8,
    ];

    /// Parse a header encoding byte.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x00 | 0x80 => Some(Self::ShiftJis),
            0x20 => Some(Self::Ascii),
            0x40 => Some(Self::Latin1),
            0x60 => Some(Self::EucJp),
            0xA0 => Some(Self::Utf8),
            _ => None,
        }
    }

    /// Header byte written for this encoding.
    pub const fn id(self) -> u8 {
        match self {
            Self::Ascii => 0x20,
            Self::Latin1 => 0x40,
            Self::EucJp => 0x60,
            Self::ShiftJis => 0x80,
            Self::Utf8 => 0xA0,
        }
    }

    /// Canonical label.
    pub const fn name(self) -> &'static str {
        match self {
            Self::ShiftJis => "SHIFT_JIS",
            Self::Ascii => "ASCII",
            Self::Latin1 => "ISO-8859-1",
            Self::EucJp => "EUC-JP",
            Self::Utf8 => "UTF-8",
        }
    }

    /// Decode bytes strictly. Returns `None` on malformed input.
    pub fn decode<'a>(self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
            Self::Ascii => {
                if bytes.is_ascii() {
                    std::str::from_utf8(bytes).ok().map(Cow::Borrowed)
                } else {
                    None
                }
            }
            Self::Latin1 => {
                if bytes.is_ascii() {
                    std::str::from_utf8(bytes).ok().map(Cow::Borrowed)
                } else {
                    Some(Cow::Owned(bytes.iter().map(|&b| b as char).collect()))
                }
            }
            Self::ShiftJis => SHIFT_JIS.decode_without_bom_handling_and_without_replacement(bytes),
            Self::EucJp => EUC_JP.decode_without_bom_handling_and_without_replacement(bytes),
        }
    }

    /// Encode text strictly. Returns `None` if any character is unmappable.
    pub fn encode<'a>(self, text: &'a str) -> Option<Cow<'a, [u8]>> {
        match self {
            Self::Utf8 => Some(Cow::Borrowed(text.as_bytes())),
            Self::Ascii => text.is_ascii().then_some(Cow::Borrowed(text.as_bytes())),
            Self::Latin1 => {
                if text.is_ascii() {
                    return Some(Cow::Borrowed(text.as_bytes()));
                }
                text.chars()
                    .map(|c| u8::try_from(u32::from(c)).ok())
                    .collect::<Option<Vec<u8>>>()
                    .map(Cow::Owned)
            }
            Self::ShiftJis | Self::EucJp => {
                let encoding = if self == Self::ShiftJis { SHIFT_JIS } else { EUC_JP };
                let (bytes, _, unmappable) = encoding.encode(text);
                (!unmappable).then_some(bytes)
            }
        }
    }

    /// Encode text, replacing unmappable characters with `?`.
    pub fn encode_lossy<'a>(self, text: &'a str) -> Cow<'a, [u8]> {
        if let Some(bytes) = self.encode(text) {
            return bytes;
        }

        let mut out = Vec::with_capacity(text.len());
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            match self.encode(ch.encode_utf8(&mut buf)) {
                Some(bytes) => out.extend_from_slice(&bytes),
                None => out.push(b'?'),
            }
        }
        Cow::Owned(out)
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "shift-jis" | "shiftjis" | "sjis" | "cp932" | "windows-31j" => Ok(Self::ShiftJis),
            "ascii" | "us-ascii" => Ok(Self::Ascii),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Self::Latin1),
            "euc-jp" | "eucjp" => Ok(Self::EucJp),
            "utf-8" | "utf8" => Ok(Self::Utf8),
            _ => Err(format!("unknown text encoding '{}'", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_ids() {
        for encoding in TextEncoding::ALL {
            assert_eq!(TextEncoding::from_id(encoding.id()), Some(encoding));
        }
        assert_eq!(TextEncoding::from_id(0x00), Some(TextEncoding::ShiftJis));
        assert_eq!(TextEncoding::from_id(0x10), None);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("cp932".parse::<TextEncoding>().unwrap(), TextEncoding::ShiftJis);
        assert_eq!("EUC_JP".parse::<TextEncoding>().unwrap(), TextEncoding::EucJp);
        assert_eq!("utf8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert!("klingon".parse::<TextEncoding>().is_err());
    }

    #[test]
    fn test_shift_jis_round_trip() {
        let text = "日本語テキスト";
        let bytes = TextEncoding::ShiftJis.encode(text).unwrap();
        assert_ne!(bytes.as_ref(), text.as_bytes());
        assert_eq!(TextEncoding::ShiftJis.decode(&bytes).unwrap(), text);
    }

    #[test]
    fn test_latin1() {
        let bytes = TextEncoding::Latin1.encode("café").unwrap();
        assert_eq!(bytes.as_ref(), b"caf\xE9");
        assert_eq!(TextEncoding::Latin1.decode(&bytes).unwrap(), "café");
        assert!(TextEncoding::Latin1.encode("日").is_none());
    }

    #[test]
    fn test_ascii_rejects_high_bytes() {
        assert!(TextEncoding::Ascii.decode(b"ok").is_some());
        assert!(TextEncoding::Ascii.decode(b"\xE9").is_none());
        assert!(TextEncoding::Ascii.encode("é").is_none());
    }

    #[test]
    fn test_malformed_shift_jis() {
        // lone lead byte
        assert!(TextEncoding::ShiftJis.decode(b"\x82").is_none());
    }

    #[test]
    fn test_encode_lossy_replaces() {
        let bytes = TextEncoding::Ascii.encode_lossy("a→b");
        assert_eq!(bytes.as_ref(), b"a?b");
        let bytes = TextEncoding::ShiftJis.encode_lossy("x🎉");
        assert_eq!(bytes.as_ref(), b"x?");
    }
}
