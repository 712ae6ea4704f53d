//! Error types for kbin-common.

use thiserror::Error;

/// Common error type for kbin byte operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer at offset {offset}: needed {needed} bytes but only {available} available")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Indexed write outside the bytes already present in a buffer.
    #[error("write of {len} bytes at offset {offset} is outside the buffer (size: {size})")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    /// A fixed-layout structure could not be read from the input.
    #[error("could not read {name} from {available} bytes")]
    InvalidStruct { name: &'static str, available: usize },
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
