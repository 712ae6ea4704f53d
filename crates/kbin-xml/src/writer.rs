//! Tree to kbin encoding.
//!
//! The tree is walked depth-first. Each node emits its type byte and name
//! into the node stream and its value into the data stream, then one `attr`
//! record per attribute in key order, then its children, then `nodeEnd`.

use std::borrow::Cow;
use std::collections::BTreeMap;

use kbin_common::{ByteBuffer, ALIGNMENT};
use tracing::{debug, trace};
use zerocopy::IntoBytes;

use crate::data::{length_word, DataWriter};
use crate::format::{Arity, KbinType, ARRAY_FLAG, ATTR, END_SECTION, NODE_END};
use crate::node::{Node, COUNT_ATTR, XMLNS_PREFIX};
use crate::{sixbit, EncodeOptions, Error, KbinHeader, Result};

/// Longest name allowed when names are stored uncompressed.
pub const MAX_RAW_NAME_LEN: usize = 64;

/// Encodes a [`Node`] tree into kbin bytes.
#[derive(Debug)]
pub struct KbinWriter {
    options: EncodeOptions,
    nodes: ByteBuffer,
    data: DataWriter,
}

impl KbinWriter {
    /// Create a writer with the given settings.
    pub fn new(options: EncodeOptions) -> Self {
        Self {
            options,
            nodes: ByteBuffer::new(),
            data: DataWriter::new(),
        }
    }

    /// Encode `root` and everything below it.
    pub fn write(mut self, root: &Node) -> Result<Vec<u8>> {
        self.write_node(root)?;

        self.nodes.append_u8(END_SECTION | ARRAY_FLAG);
        self.nodes.realign_writes(ALIGNMENT);

        let header = KbinHeader::new(
            self.options.encoding,
            self.options.compressed,
            length_word(self.nodes.len())?,
        );
        let nodes = self.nodes.into_inner();
        let data = self.data.into_inner();

        debug!(
            encoding = %self.options.encoding,
            compressed = self.options.compressed,
            node_bytes = nodes.len(),
            data_bytes = data.len(),
            "encoded kbin"
        );

        let data_len = length_word(data.len())?;
        let mut out = Vec::with_capacity(KbinHeader::SIZE + nodes.len() + 4 + data.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&nodes);
        out.extend_from_slice(&data_len.to_be_bytes());
        out.extend_from_slice(&data);
        Ok(out)
    }

    /// Write a node or attribute name in the active name encoding.
    fn write_name(&mut self, name: &str) -> Result<()> {
        if self.options.compressed {
            return sixbit::pack(name, &mut self.nodes);
        }

        let encoded = self.encode_strict(name)?;
        if encoded.is_empty() || encoded.len() > MAX_RAW_NAME_LEN {
            return Err(Error::NameLength {
                name: name.to_string(),
                len: encoded.len(),
                min: 1,
                max: MAX_RAW_NAME_LEN,
            });
        }
        // the length shares its byte with the array flag bit
        self.nodes
            .append_u8((encoded.len() - 1) as u8 | ARRAY_FLAG);
        self.nodes.append_bytes(&encoded);
        Ok(())
    }

    fn encode_strict<'t>(&self, text: &'t str) -> Result<Cow<'t, [u8]>> {
        self.options
            .encoding
            .encode(text)
            .ok_or_else(|| Error::Encode {
                encoding: self.options.encoding.name(),
                text: text.to_string(),
            })
    }

    fn write_node(&mut self, node: &Node) -> Result<()> {
        let ty = resolve_type(node)?;

        let count = match node.count().filter(|c| !c.is_empty()) {
            Some(raw) => Some(raw.trim().parse::<usize>().map_err(|_| Error::InvalidValue {
                name: node.tag.clone(),
                value: raw.to_string(),
                type_name: COUNT_ATTR,
            })?),
            None => None,
        };
        let is_array = count.is_some();

        trace!(tag = %node.tag, ty = %ty, is_array, "node");
        self.nodes
            .append_u8(ty.id | if is_array { ARRAY_FLAG } else { 0 });
        self.write_name(&node.tag)?;

        if !ty.is_void() {
            self.write_value(node, ty, count)?;
        }

        // declarations and data attributes share one key order; a binding
        // wins over an `xmlns:` attribute of the same name
        let mut attributes: BTreeMap<Cow<'_, str>, &str> = node
            .data_attributes()
            .map(|(key, value)| (Cow::Borrowed(key), value))
            .collect();
        for (prefix, uri) in &node.namespaces {
            attributes.insert(Cow::Owned(format!("{}{}", XMLNS_PREFIX, prefix)), uri);
        }
        for (key, value) in attributes {
            self.write_attribute(&key, value)?;
        }

        for child in &node.children {
            self.write_node(child)?;
        }

        self.nodes.append_u8(NODE_END | ARRAY_FLAG);
        Ok(())
    }

    fn write_attribute(&mut self, key: &str, value: &str) -> Result<()> {
        let encoded = self.encode_strict(value)?;
        self.data.write_string(&encoded)?;
        self.nodes.append_u8(ATTR | ARRAY_FLAG);
        self.write_name(key)
    }

    fn write_value(&mut self, node: &Node, ty: &KbinType, count: Option<usize>) -> Result<()> {
        let text = node.text.as_deref().unwrap_or("");

        let payload: Vec<u8> = if ty.is_binary() {
            let digits: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            hex::decode(digits).map_err(|_| invalid_value(node, text, ty))?
        } else if ty.is_string() {
            let mut bytes = self.options.encoding.encode_lossy(text).into_owned();
            bytes.push(0);
            bytes
        } else {
            let mut bytes = Vec::new();
            for element in text.split(' ') {
                ty.parse_element(element, &mut bytes)
                    .ok_or_else(|| invalid_value(node, element, ty))?;
            }
            let elements = bytes.len() / ty.element_size();
            let arity = match ty.arity {
                Arity::Fixed(n) => n,
                Arity::Variable => 1,
            };
            match count {
                Some(count) if elements != count * arity => {
                    return Err(Error::CountMismatch {
                        name: node.tag.clone(),
                        count,
                        elements,
                        arity,
                    });
                }
                None if elements != arity => {
                    return Err(Error::ArityMismatch {
                        name: node.tag.clone(),
                        type_name: ty.name(),
                        arity,
                        elements,
                    });
                }
                _ => {}
            }
            bytes
        };

        if count.is_some() || ty.arity == Arity::Variable {
            self.data.write_array(&payload)?;
        } else {
            self.data.write_aligned(&payload)?;
        }
        Ok(())
    }
}

/// Work out the type a node encodes as.
///
/// Nodes without `__type` become `str` if they hold non-blank text and
/// `void` otherwise.
fn resolve_type(node: &Node) -> Result<&'static KbinType> {
    match node.type_name().filter(|t| !t.is_empty()) {
        Some(name) => KbinType::from_name(name).ok_or_else(|| Error::UnknownTypeName {
            name: node.tag.clone(),
            type_name: name.to_string(),
        }),
        None if node.text.as_deref().is_some_and(|t| !t.trim().is_empty()) => Ok(KbinType::string()),
        None => Ok(KbinType::void_type()),
    }
}

fn invalid_value(node: &Node, value: &str, ty: &KbinType) -> Error {
    Error::InvalidValue {
        name: node.tag.clone(),
        value: value.to_string(),
        type_name: ty.name(),
    }
}

/// Encode a tree into kbin bytes.
pub fn to_binary(root: &Node, options: &EncodeOptions) -> Result<Vec<u8>> {
    KbinWriter::new(*options).write(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{STRING, VOID};
    use crate::TextEncoding;

    fn u32_type() -> &'static KbinType {
        KbinType::from_name("u32").unwrap()
    }

    /// Split an encoded blob into (node stream, data stream).
    fn streams(bytes: &[u8]) -> (&[u8], &[u8]) {
        let node_len = u32::from_be_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let nodes = &bytes[8..8 + node_len];
        let data_len =
            u32::from_be_bytes(bytes[8 + node_len..12 + node_len].try_into().unwrap()) as usize;
        let data = &bytes[12 + node_len..];
        assert_eq!(data.len(), data_len);
        (nodes, data)
    }

    #[test]
    fn test_string_payload() {
        let node = Node::new("s").with_type(KbinType::from_name("str").unwrap()).with_text("hi");
        let bytes = to_binary(&node, &EncodeOptions::default()).unwrap();
        let (_, data) = streams(&bytes);
        assert_eq!(data, &[0, 0, 0, 3, 0x68, 0x69, 0, 0]);
    }

    #[test]
    fn test_typeless_text_becomes_string() {
        let node = Node::new("s").with_text("hi");
        let bytes = to_binary(&node, &EncodeOptions::default()).unwrap();
        let (nodes, _) = streams(&bytes);
        assert_eq!(nodes[0], STRING);
    }

    #[test]
    fn test_blank_text_is_void() {
        let node = Node::new("v").with_text("  \n ");
        let bytes = to_binary(&node, &EncodeOptions::default()).unwrap();
        let (nodes, data) = streams(&bytes);
        assert_eq!(nodes[0], VOID);
        assert!(data.is_empty());
    }

    #[test]
    fn test_array_flag_and_length() {
        let node = Node::new("a")
            .with_type(KbinType::from_name("u16").unwrap())
            .with_count(3)
            .with_text("1 2 3");
        let bytes = to_binary(&node, &EncodeOptions::default()).unwrap();
        let (nodes, data) = streams(&bytes);
        assert_eq!(nodes[0], 5 | ARRAY_FLAG);
        assert_eq!(data, &[0, 0, 0, 6, 0, 1, 0, 2, 0, 3, 0, 0]);
    }

    #[test]
    fn test_count_mismatch() {
        let node = Node::new("a").with_type(u32_type()).with_count(3).with_text("1 2");
        let err = to_binary(&node, &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::CountMismatch { count: 3, elements: 2, .. }));
    }

    #[test]
    fn test_arity_mismatch() {
        let node = Node::new("a")
            .with_type(KbinType::from_name("3u8").unwrap())
            .with_text("1 2");
        let err = to_binary(&node, &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ArityMismatch { arity: 3, elements: 2, .. }));
    }

    #[test]
    fn test_invalid_scalar_text() {
        let node = Node::new("a").with_type(u32_type()).with_text("forty");
        let err = to_binary(&node, &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }

    #[test]
    fn test_unknown_type_name() {
        let node = Node::new("a").attr("__type", "u128").with_text("1");
        let err = to_binary(&node, &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnknownTypeName { .. }));
    }

    #[test]
    fn test_invalid_compressed_name() {
        let err = to_binary(&Node::new("bad-name"), &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidSixbitChar { ch: '-', .. }));
    }

    #[test]
    fn test_uncompressed_names() {
        let options = EncodeOptions::new().compressed(false);
        let bytes = to_binary(&Node::new("bad-name"), &options).unwrap();
        assert_eq!(&bytes[..4], &[0xA0, 0x45, 0x80, 0x7F]);
        let (nodes, _) = streams(&bytes);
        assert_eq!(nodes[0], VOID);
        assert_eq!(nodes[1], 7 | ARRAY_FLAG);
        assert_eq!(&nodes[2..10], b"bad-name");

        let long = Node::new("a".repeat(MAX_RAW_NAME_LEN + 1));
        assert!(matches!(to_binary(&long, &options), Err(Error::NameLength { .. })));
    }

    #[test]
    fn test_attributes_sorted_and_metadata_skipped() {
        let node = Node::new("n").attr("zz", "1").attr("aa", "2").attr("__size", "9");
        let bytes = to_binary(&node, &EncodeOptions::default()).unwrap();
        let (nodes, data) = streams(&bytes);

        // void, "n", attr "aa", attr "zz", nodeEnd, endSection
        assert_eq!(nodes[0], VOID);
        assert_eq!(nodes[3], ATTR | ARRAY_FLAG);
        assert_eq!(&nodes[4..7], &[2, 0x9A, 0x60]);
        assert_eq!(nodes[7], ATTR | ARRAY_FLAG);
        assert_eq!(nodes[11], NODE_END | ARRAY_FLAG);
        assert_eq!(nodes[12], END_SECTION | ARRAY_FLAG);

        // "2" then "1", each length 2 with NUL, padded
        assert_eq!(data, &[0, 0, 0, 2, b'2', 0, 0, 0, 0, 0, 0, 2, b'1', 0, 0, 0]);
    }

    #[test]
    fn test_namespace_declarations_sorted_with_attributes() {
        let node = Node::new("n")
            .attr("a", "x")
            .attr("zz", "y")
            .namespace("foo", "bar");
        let bytes = to_binary(&node, &EncodeOptions::default()).unwrap();
        let (_, data) = streams(&bytes);
        // "a" < "xmlns:foo" < "zz"
        assert_eq!(
            data,
            &[
                0, 0, 0, 2, b'x', 0, 0, 0, 0, 0, 0, 4, b'b', b'a', b'r', 0, 0, 0, 0, 2, b'y', 0,
                0, 0
            ]
        );
    }

    #[test]
    fn test_xmlns_attribute_matches_binding() {
        let mut as_attribute = Node::new("n").attr("a", "x");
        as_attribute.set_attr("xmlns:foo", "bar");
        let as_binding = Node::new("n").attr("a", "x").namespace("foo", "bar");

        let options = EncodeOptions::default();
        assert_eq!(
            to_binary(&as_attribute, &options).unwrap(),
            to_binary(&as_binding, &options).unwrap()
        );
    }

    #[test]
    fn test_binary_payload() {
        let node = Node::new("b")
            .with_type(KbinType::from_name("bin").unwrap())
            .with_text("DE ad be");
        let bytes = to_binary(&node, &EncodeOptions::default()).unwrap();
        let (_, data) = streams(&bytes);
        assert_eq!(data, &[0, 0, 0, 3, 0xDE, 0xAD, 0xBE, 0]);
    }

    #[test]
    fn test_unmappable_attribute_fails() {
        let node = Node::new("n").attr("a", "🎉");
        let options = EncodeOptions::new().encoding(TextEncoding::Ascii);
        assert!(matches!(to_binary(&node, &options), Err(Error::Encode { .. })));
    }

    #[test]
    fn test_unmappable_string_value_is_replaced() {
        let node = Node::new("s").with_text("a🎉");
        let options = EncodeOptions::new().encoding(TextEncoding::Ascii);
        let bytes = to_binary(&node, &options).unwrap();
        let (_, data) = streams(&bytes);
        assert_eq!(data, &[0, 0, 0, 3, b'a', b'?', 0, 0]);
    }
}
