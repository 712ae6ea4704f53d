//! Encoder and decoder for kbin, the binary XML format used by Konami
//! arcade games.
//!
//! A kbin file is an 8-byte header followed by two streams: a node stream
//! of typed records with (usually six-bit packed) names, and a data stream
//! holding every value. Values are strongly typed; the type of each node is
//! carried in the tree as a `__type` attribute, arrays as `__count`.
//!
//! # Example
//!
//! ```
//! use kbin_xml::{DecodeOptions, KbinDocument, KbinType, Node};
//!
//! let root = Node::new("root").child(
//!     Node::new("id")
//!         .with_type(KbinType::from_name("u32").unwrap())
//!         .with_text("42"),
//! );
//!
//! let bytes = KbinDocument::new(root.clone()).to_binary()?;
//! assert!(kbin_xml::is_binary_xml(&bytes));
//!
//! let doc = KbinDocument::from_binary(&bytes, &DecodeOptions::default())?;
//! assert_eq!(doc.root, root);
//! # Ok::<(), kbin_xml::Error>(())
//! ```

pub mod data;
mod document;
mod encoding;
mod error;
pub mod format;
mod header;
mod node;
mod options;
mod reader;
pub mod sixbit;
mod writer;
#[cfg(feature = "xml-output")]
mod xml;

pub use document::KbinDocument;
pub use encoding::TextEncoding;
pub use error::{Error, ErrorKind, Result};
pub use format::{Arity, KbinType, Record, Storage, TextFormat};
pub use header::{is_binary_xml, KbinHeader};
pub use node::{is_valid_tag, Descendants, Node, COUNT_ATTR, SIZE_ATTR, TYPE_ATTR};
pub use options::{DecodeOptions, EncodeOptions};
pub use reader::{from_binary, KbinReader};
pub use writer::{to_binary, KbinWriter};
