//! Encoder and decoder settings.

use crate::TextEncoding;

/// Settings for producing kbin output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncodeOptions {
    /// Encoding of string payloads and uncompressed names.
    pub encoding: TextEncoding,
    /// Pack names with the six-bit alphabet.
    pub compressed: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::ShiftJis,
            compressed: true,
        }
    }
}

impl EncodeOptions {
    /// Default settings: Shift-JIS strings, compressed names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the text encoding.
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Enable or disable six-bit name compression.
    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }
}

/// Settings for reading kbin input.
///
/// The default is strict: malformed strings and illegal tag names fail the
/// decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodeOptions {
    /// Retry undecodable strings as UTF-8 instead of failing.
    pub lenient_strings: bool,
    /// Prefix illegal tag names with `_` instead of failing.
    pub rename_illegal_nodes: bool,
}

impl DecodeOptions {
    /// Strict settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tolerate malformed strings and illegal tag names.
    pub fn convert_illegal() -> Self {
        Self {
            lenient_strings: true,
            rename_illegal_nodes: true,
        }
    }
}
