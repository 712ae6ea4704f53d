//! Common utilities for kbin.
//!
//! This crate provides the byte-level primitives shared by the kbin codec:
//!
//! - [`ByteReader`] - Zero-copy big-endian reading from byte slices
//! - [`ByteBuffer`] - Growable big-endian byte buffer with indexed writes
//!
//! Everything in the kbin format is big-endian, and every independent segment
//! of it is padded to a 4-byte boundary, so both types carry a `realign`
//! operation.

mod buffer;
mod error;
mod reader;

pub use buffer::ByteBuffer;
pub use error::{Error, Result};
pub use reader::ByteReader;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Default alignment of kbin segments, in bytes.
pub const ALIGNMENT: usize = 4;

/// Round `offset` up to the next multiple of `size`.
#[inline]
pub const fn align_up(offset: usize, size: usize) -> usize {
    match offset % size {
        0 => offset,
        rem => offset + (size - rem),
    }
}
