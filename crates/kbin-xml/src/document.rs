//! A kbin tree together with the settings it was read with.

use tracing::debug;

use crate::format::{Arity, KbinType};
use crate::node::{Node, COUNT_ATTR, SIZE_ATTR};
use crate::{reader, writer, DecodeOptions, EncodeOptions, Error, Result, TextEncoding};

/// Fixed allocation overhead of a loaded document.
const BASE_MEM_SIZE: usize = 630;
/// Per-node allocation with six-bit names.
const NODE_MEM_SIZE: usize = 52;
/// Per-node allocation with raw names.
const RAW_NODE_MEM_SIZE: usize = 56;

/// A kbin document.
///
/// Decoding remembers the text encoding and name compression of the input,
/// so [`KbinDocument::to_binary`] reproduces the original bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KbinDocument {
    /// The root element.
    pub root: Node,
    /// Encoding of string payloads and raw names.
    pub encoding: TextEncoding,
    /// Whether names are six-bit packed.
    pub compressed: bool,
}

impl KbinDocument {
    /// Wrap a tree with the default settings (Shift-JIS, compressed).
    pub fn new(root: Node) -> Self {
        Self::with_options(root, &EncodeOptions::default())
    }

    /// Wrap a tree with explicit settings.
    pub fn with_options(root: Node, options: &EncodeOptions) -> Self {
        Self {
            root,
            encoding: options.encoding,
            compressed: options.compressed,
        }
    }

    /// Decode kbin bytes.
    pub fn from_binary(data: &[u8], options: &DecodeOptions) -> Result<Self> {
        reader::from_binary(data, options)
    }

    /// Decode kbin bytes or parse XML text, whichever `data` holds.
    #[cfg(feature = "xml-output")]
    pub fn from_bytes(data: &[u8], options: &DecodeOptions) -> Result<Self> {
        if crate::is_binary_xml(data) {
            Self::from_binary(data, options)
        } else {
            Ok(Self::new(Node::from_xml_bytes(data)?))
        }
    }

    /// Parse XML text.
    #[cfg(feature = "xml-output")]
    pub fn from_xml(xml: &str) -> Result<Self> {
        Ok(Self::new(Node::from_xml(xml)?))
    }

    /// Render the tree as indented XML text.
    #[cfg(feature = "xml-output")]
    pub fn to_xml_string(&self) -> Result<String> {
        self.root.to_xml_string()
    }

    /// Encode with the document's own settings.
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        self.to_binary_with(&self.options())
    }

    /// Encode with explicit settings.
    pub fn to_binary_with(&self, options: &EncodeOptions) -> Result<Vec<u8>> {
        writer::to_binary(&self.root, options)
    }

    /// The document's settings as encoder options.
    pub fn options(&self) -> EncodeOptions {
        EncodeOptions::new()
            .encoding(self.encoding)
            .compressed(self.compressed)
    }

    /// Estimate the memory a game runtime allocates to load this document.
    pub fn mem_size(&self) -> Result<usize> {
        let data_len = self.data_mem_size()?;
        let node_count = self.root.descendants().count();

        let size = if self.compressed {
            NODE_MEM_SIZE * node_count + data_len + BASE_MEM_SIZE
        } else {
            let tags_len: usize = self
                .root
                .descendants()
                .map(|node| align4(node.tag.chars().count().max(8)))
                .sum();
            RAW_NODE_MEM_SIZE * node_count + data_len + BASE_MEM_SIZE + tags_len
        };

        debug!(node_count, data_len, size, "memory size estimate");
        Ok((size + 8) & !7)
    }

    fn data_mem_size(&self) -> Result<usize> {
        let mut total = 0;
        for node in self.root.descendants() {
            let Some(type_name) = node.type_name() else {
                continue;
            };
            let ty = KbinType::from_name(type_name).ok_or_else(|| Error::UnknownTypeName {
                name: node.tag.clone(),
                type_name: type_name.to_string(),
            })?;
            if ty.is_void() {
                continue;
            }

            let text = node.text.as_deref().unwrap_or("");
            let size = match ty.arity {
                Arity::Fixed(_) => {
                    let count = annotation(node, COUNT_ATTR)?;
                    let repeat = annotation(node, SIZE_ATTR)?;
                    // a payload length must fit the u32 length word
                    ty.value_size()
                        .and_then(|size| size.checked_mul(count))
                        .and_then(|size| size.checked_mul(repeat))
                        .filter(|&size| u32::try_from(size).is_ok())
                        .ok_or_else(|| Error::InvalidValue {
                            name: node.tag.clone(),
                            value: format!("{} x {}", count, repeat),
                            type_name: COUNT_ATTR,
                        })?
                }
                Arity::Variable if ty.is_binary() => text.len() / 2,
                Arity::Variable => self.encoding.encode_lossy(text).len() + 1,
            };

            if size <= 4 {
                continue;
            }
            total += if ty.is_binary() {
                (size + 1) & !1
            } else {
                align4(size)
            };
        }
        Ok(total)
    }
}

impl From<Node> for KbinDocument {
    fn from(root: Node) -> Self {
        Self::new(root)
    }
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Numeric metadata annotation, 1 when absent.
fn annotation(node: &Node, key: &'static str) -> Result<usize> {
    match node.get_attr(key) {
        Some(raw) => raw.trim().parse().map_err(|_| Error::InvalidValue {
            name: node.tag.clone(),
            value: raw.to_string(),
            type_name: key,
        }),
        None => Ok(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(name: &str) -> &'static KbinType {
        KbinType::from_name(name).unwrap()
    }

    fn sample() -> Node {
        Node::new("root")
            .child(Node::new("a").with_type(ty("u32")).with_text("1"))
            .child(Node::new("s").with_type(ty("str")).with_text("hello world"))
            .child(Node::new("b").with_type(ty("bin")).with_text("0102030405"))
            .child(
                Node::new("arr")
                    .with_type(ty("u16"))
                    .with_count(3)
                    .with_text("1 2 3"),
            )
    }

    #[test]
    fn test_mem_size_compressed() {
        // data: str 12, bin 5 -> 6, u16[3] 6 -> 8; the u32 fits in 4
        let doc = KbinDocument::new(sample());
        assert_eq!(doc.mem_size().unwrap(), 920);
    }

    #[test]
    fn test_mem_size_uncompressed() {
        let doc = KbinDocument::with_options(sample(), &EncodeOptions::new().compressed(false));
        assert_eq!(doc.mem_size().unwrap(), 984);
    }

    #[test]
    fn test_mem_size_bad_count() {
        let root = Node::new("n").with_type(ty("u8")).attr(COUNT_ATTR, "many");
        let err = KbinDocument::new(root).mem_size().unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }

    #[test]
    fn test_mem_size_count_overflow() {
        let root = Node::new("n")
            .with_type(ty("u64"))
            .attr(COUNT_ATTR, usize::MAX.to_string())
            .attr(SIZE_ATTR, "2");
        let err = KbinDocument::new(root).mem_size().unwrap_err();
        assert!(matches!(err, Error::InvalidValue { type_name: COUNT_ATTR, .. }));
    }

    #[test]
    fn test_remembers_settings() {
        let root = Node::new("r").child(Node::new("s").with_text("x"));
        let options = EncodeOptions::new()
            .encoding(TextEncoding::Utf8)
            .compressed(false);
        let bytes = KbinDocument::with_options(root, &options)
            .to_binary()
            .unwrap();

        let doc = KbinDocument::from_binary(&bytes, &DecodeOptions::default()).unwrap();
        assert_eq!(doc.encoding, TextEncoding::Utf8);
        assert!(!doc.compressed);
        assert_eq!(doc.options(), options);
        assert_eq!(doc.to_binary().unwrap(), bytes);
    }

    #[test]
    fn test_to_binary_with_overrides() {
        let doc = KbinDocument::new(Node::new("r"));
        let bytes = doc
            .to_binary_with(&EncodeOptions::new().encoding(TextEncoding::EucJp))
            .unwrap();
        assert_eq!(&bytes[..4], &[0xA0, 0x42, 0x60, 0x9F]);
    }
}
