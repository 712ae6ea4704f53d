//! Error types for kbin encoding and decoding.

use thiserror::Error;

/// Broad category of an [`Error`].
///
/// Every fatal condition belongs to exactly one category; callers that only
/// care about "was the input broken or was my tree broken" can match on this
/// instead of on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The binary input is malformed.
    Format,
    /// Text could not be converted to or from the declared encoding.
    Encoding,
    /// The tree cannot be encoded as given.
    Validation,
    /// A decoded tag name is not a legal element name.
    Naming,
    /// The markup text could not be parsed or written.
    Xml,
}

/// Errors that can occur when encoding or decoding kbin data.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Truncated input or an out-of-range buffer access.
    #[error("{0}")]
    Common(#[from] kbin_common::Error),

    /// First header byte is not the kbin signature.
    #[error("invalid kbin signature: expected 0xA0, got {actual:#04x}")]
    InvalidSignature { actual: u8 },

    /// Second header byte is neither compressed nor uncompressed.
    #[error("invalid kbin compression flag {actual:#04x}")]
    InvalidCompression { actual: u8 },

    /// Fourth header byte is not the complement of the encoding byte.
    #[error("encoding check byte {check:#04x} does not match encoding {encoding:#04x}")]
    EncodingCheck { encoding: u8, check: u8 },

    /// Encoding byte does not name a known text encoding.
    #[error("unknown text encoding id {0:#04x}")]
    UnknownEncoding(u8),

    /// Node stream contains a type id missing from the type table.
    #[error("unimplemented node type {id} at offset {offset}")]
    UnknownNodeType { id: u8, offset: usize },

    /// Array payload length is not a whole number of elements.
    #[error("payload of {length} bytes for node '{name}' is not a multiple of {stride}")]
    PayloadLength {
        name: String,
        length: usize,
        stride: usize,
    },

    /// Attribute uses a namespace prefix that was never declared.
    #[error("attribute '{name}' uses undeclared namespace prefix '{prefix}'")]
    UndeclaredNamespace { prefix: String, name: String },

    /// Node stream ended without producing a root node.
    #[error("kbin data contains no root node")]
    EmptyDocument,

    /// Bytes are not valid in the declared text encoding.
    #[error("could not decode {encoding} string at data offset {offset}; enable lenient strings to fall back to UTF-8")]
    Decode {
        encoding: &'static str,
        offset: usize,
    },

    /// Text cannot be represented in the declared encoding.
    #[error("could not encode {text:?} as {encoding}")]
    Encode {
        encoding: &'static str,
        text: String,
    },

    /// Declared `__count` does not match the number of parsed elements.
    #[error("node '{name}' declares __count={count} but holds {elements} elements of arity {arity}")]
    CountMismatch {
        name: String,
        count: usize,
        elements: usize,
        arity: usize,
    },

    /// Fixed-arity value has the wrong number of elements.
    #[error("node '{name}' of type {type_name} needs {arity} elements, got {elements}")]
    ArityMismatch {
        name: String,
        type_name: &'static str,
        arity: usize,
        elements: usize,
    },

    /// Payload or stream is longer than a u32 length word can describe.
    #[error("payload of {length} bytes does not fit a 32-bit length")]
    PayloadTooLarge { length: usize },

    /// Name contains a character outside the six-bit alphabet.
    #[error("name '{name}' contains {ch:?}, which is not in the six-bit alphabet")]
    InvalidSixbitChar { name: String, ch: char },

    /// Name is too long (or empty) for the active name encoding.
    #[error("name '{name}' is {len} bytes long, allowed range is {min}..={max}")]
    NameLength {
        name: String,
        len: usize,
        min: usize,
        max: usize,
    },

    /// `__type` names no known type.
    #[error("node '{name}' has unknown __type '{type_name}'")]
    UnknownTypeName { name: String, type_name: String },

    /// Text value cannot be parsed as the node's type.
    #[error("node '{name}': cannot parse {value:?} as {type_name}")]
    InvalidValue {
        name: String,
        value: String,
        type_name: &'static str,
    },

    /// Decoded tag name is not a legal element name.
    #[error("could not create node with name '{name}'; enable node renaming to use '_{name}'")]
    InvalidNodeName { name: String },

    /// UTF-8 decoding error in markup input.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// XML parsing or writing error.
    #[error("XML error: {0}")]
    Xml(String),
}

impl Error {
    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Common(_)
            | Self::InvalidSignature { .. }
            | Self::InvalidCompression { .. }
            | Self::EncodingCheck { .. }
            | Self::UnknownEncoding(_)
            | Self::UnknownNodeType { .. }
            | Self::PayloadLength { .. }
            | Self::UndeclaredNamespace { .. }
            | Self::EmptyDocument => ErrorKind::Format,
            Self::Decode { .. } | Self::Encode { .. } => ErrorKind::Encoding,
            Self::CountMismatch { .. }
            | Self::ArityMismatch { .. }
            | Self::PayloadTooLarge { .. }
            | Self::InvalidSixbitChar { .. }
            | Self::NameLength { .. }
            | Self::UnknownTypeName { .. }
            | Self::InvalidValue { .. } => ErrorKind::Validation,
            Self::InvalidNodeName { .. } => ErrorKind::Naming,
            Self::Io(_) | Self::Utf8(_) | Self::Xml(_) => ErrorKind::Xml,
        }
    }
}

/// Result type for kbin operations.
pub type Result<T> = std::result::Result<T, Error>;
