//! kbin to tree decoding.
//!
//! The node stream is a flat sequence of records. Node records open a child
//! of the current node, attribute records attach to the current node, and
//! `nodeEnd` ascends. The tree is collected in an index arena while the
//! stream is walked and assembled into owned [`Node`]s at the end.

use std::borrow::Cow;

use kbin_common::ByteReader;
use tracing::{debug, warn};

use crate::data::DataReader;
use crate::format::{Arity, KbinType, Record, ARRAY_FLAG};
use crate::node::{is_valid_tag, Node, COUNT_ATTR, SIZE_ATTR, TYPE_ATTR, XMLNS_PREFIX};
use crate::{sixbit, DecodeOptions, Error, KbinDocument, KbinHeader, Result, TextEncoding};

#[derive(Debug)]
struct Slot {
    node: Node,
    parent: Option<usize>,
}

/// Arena of nodes under construction.
///
/// Slot 0 is a synthetic container; the document root is its first child.
/// Children are always pushed after their parent, so every parent index is
/// smaller than the indices of its children.
#[derive(Debug)]
struct TreeBuilder {
    slots: Vec<Slot>,
    current: usize,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            slots: vec![Slot {
                node: Node::default(),
                parent: None,
            }],
            current: 0,
        }
    }

    /// Append `node` as the last child of the current node and descend into it.
    fn open(&mut self, node: Node) {
        let index = self.slots.len();
        self.slots.push(Slot {
            node,
            parent: Some(self.current),
        });
        self.current = index;
    }

    /// Ascend to the parent. A no-op at the synthetic container.
    fn close(&mut self) {
        if let Some(parent) = self.slots[self.current].parent {
            self.current = parent;
        }
    }

    fn current_mut(&mut self) -> &mut Node {
        &mut self.slots[self.current].node
    }

    /// Look `prefix` up on the current node and its ancestors.
    fn resolve_namespace(&self, prefix: &str) -> Option<&str> {
        let mut index = Some(self.current);
        while let Some(i) = index {
            let slot = &self.slots[i];
            if let Some(uri) = slot.node.namespace_uri(prefix) {
                return Some(uri);
            }
            index = slot.parent;
        }
        None
    }

    /// Assemble the owned tree and return the first real root.
    fn finish(mut self) -> Result<Node> {
        let mut children: Vec<Vec<Node>> = std::iter::repeat_with(Vec::new)
            .take(self.slots.len())
            .collect();

        // walking backwards finishes every child before its parent is taken
        while self.slots.len() > 1 {
            let index = self.slots.len() - 1;
            let Some(Slot { mut node, parent }) = self.slots.pop() else {
                break;
            };
            let mut own = std::mem::take(&mut children[index]);
            own.reverse();
            node.children = own;
            children[parent.unwrap_or(0)].push(node);
        }

        std::mem::take(&mut children[0])
            .pop()
            .ok_or(Error::EmptyDocument)
    }
}

/// Decodes kbin bytes into a [`KbinDocument`].
#[derive(Debug)]
pub struct KbinReader<'a> {
    options: DecodeOptions,
    encoding: TextEncoding,
    compressed: bool,
    nodes: ByteReader<'a>,
    data: DataReader<'a>,
}

impl<'a> KbinReader<'a> {
    /// Validate the header and position the node and data cursors.
    pub fn new(input: &'a [u8], options: DecodeOptions) -> Result<Self> {
        let mut reader = ByteReader::new(input);
        let header: KbinHeader = reader.read_struct()?;
        let (encoding, compressed) = header.validate()?;

        let node_end = KbinHeader::SIZE + header.node_length.get() as usize;
        let mut nodes = ByteReader::new_at(input, KbinHeader::SIZE);
        nodes.set_end(node_end);

        reader.seek(node_end);
        let data_len = reader.read_u32()? as usize;
        let data_start = reader.position();
        if data_start + data_len != input.len() {
            debug!(
                declared = data_len,
                actual = input.len().saturating_sub(data_start),
                "data stream length does not match input"
            );
        }

        debug!(%encoding, compressed, node_end, data_len, "kbin header");

        Ok(Self {
            options,
            encoding,
            compressed,
            nodes,
            data: DataReader::new(input, data_start),
        })
    }

    /// Walk the node stream and build the document.
    pub fn read(mut self) -> Result<KbinDocument> {
        let mut tree = TreeBuilder::new();
        // qualified attribute names of the current node, checked once its
        // attribute run ends
        let mut qualified: Vec<String> = Vec::new();

        while self.nodes.has_data() {
            if self.nodes.peek_u8()? == 0 {
                debug!(offset = self.nodes.position(), "skipping zero type byte");
                self.nodes.read_u8()?;
                continue;
            }

            let offset = self.nodes.position();
            let raw = self.nodes.read_u8()?;
            let is_array = raw & ARRAY_FLAG != 0;
            let id = raw & !ARRAY_FLAG;
            let record = Record::from_id(id).ok_or(Error::UnknownNodeType { id, offset })?;

            let name = if record.has_name() {
                self.read_name()?
            } else {
                String::new()
            };
            debug!(%record, %name, offset, "record");

            if !matches!(record, Record::Attribute) {
                check_qualified(&tree, &mut qualified)?;
            }

            match record {
                Record::Attribute => {
                    let value = self.read_attribute_value()?;
                    attach_attribute(&mut tree, name, value, &mut qualified);
                }
                Record::NodeEnd => tree.close(),
                Record::EndSection => break,
                Record::Node(ty) => {
                    let tag = self.check_tag(name)?;
                    let node = self.read_node(tag, ty, is_array)?;
                    tree.open(node);
                }
            }
        }

        check_qualified(&tree, &mut qualified)?;

        Ok(KbinDocument {
            root: tree.finish()?,
            encoding: self.encoding,
            compressed: self.compressed,
        })
    }

    fn read_name(&mut self) -> Result<String> {
        if self.compressed {
            return sixbit::unpack(&mut self.nodes);
        }

        let offset = self.nodes.position();
        let len = (self.nodes.read_u8()? & !ARRAY_FLAG) as usize + 1;
        let raw = self.nodes.read_bytes(len)?;
        Ok(self.decode_text(raw, offset)?.into_owned())
    }

    /// Attribute values are plain strings: drop the NUL, keep the rest.
    fn read_attribute_value(&mut self) -> Result<String> {
        let offset = self.data.position();
        let payload = self.data.read_auto()?;
        let raw = &payload[..payload.len().saturating_sub(1)];
        Ok(self.decode_text(raw, offset)?.into_owned())
    }

    fn read_node(&mut self, tag: String, ty: &'static KbinType, is_array: bool) -> Result<Node> {
        let mut node = Node::new(tag);
        if ty.is_void() {
            return Ok(node);
        }
        node.set_attr(TYPE_ATTR, ty.name());

        let offset = self.data.position();
        let payload = match ty.arity {
            // length-prefixed already, the array flag adds nothing
            Arity::Variable => self.data.read_auto()?,
            Arity::Fixed(arity) if is_array => {
                let payload = self.data.read_auto()?;
                let stride = arity * ty.element_size();
                if payload.len() % stride != 0 {
                    return Err(Error::PayloadLength {
                        name: node.tag,
                        length: payload.len(),
                        stride,
                    });
                }
                node.set_attr(COUNT_ATTR, (payload.len() / stride).to_string());
                payload
            }
            Arity::Fixed(arity) => self.data.read_aligned(arity * ty.element_size())?,
        };

        let text = if ty.is_binary() {
            node.set_attr(SIZE_ATTR, payload.len().to_string());
            hex::encode(payload)
        } else if ty.is_string() {
            let raw = &payload[..payload.len().saturating_sub(1)];
            self.decode_text(raw, offset)?
                .trim_matches('\0')
                .to_string()
        } else {
            ty.format_elements(payload)
        };
        node.text = Some(text);

        Ok(node)
    }

    /// Decode in the document encoding, falling back to UTF-8 when lenient.
    fn decode_text<'b>(&self, raw: &'b [u8], offset: usize) -> Result<Cow<'b, str>> {
        if let Some(text) = self.encoding.decode(raw) {
            return Ok(text);
        }
        if !self.options.lenient_strings {
            return Err(Error::Decode {
                encoding: self.encoding.name(),
                offset,
            });
        }

        warn!(
            encoding = %self.encoding,
            offset,
            raw = ?raw,
            "malformed string, attempting UTF-8 decode"
        );
        std::str::from_utf8(raw)
            .map(Cow::Borrowed)
            .map_err(|_| Error::Decode {
                encoding: TextEncoding::Utf8.name(),
                offset,
            })
    }

    fn check_tag(&self, name: String) -> Result<String> {
        if is_valid_tag(&name) {
            return Ok(name);
        }
        if !self.options.rename_illegal_nodes {
            return Err(Error::InvalidNodeName { name });
        }

        let renamed = format!("_{}", name);
        warn!(%name, %renamed, "renaming illegal node");
        Ok(renamed)
    }
}

/// Attach a decoded attribute record to the current node.
///
/// `xmlns:p` records become namespace bindings. Other qualified names are
/// queued in `qualified` until the node's attribute run ends, so a
/// declaration may follow the attributes that use it.
fn attach_attribute(
    tree: &mut TreeBuilder,
    name: String,
    value: String,
    qualified: &mut Vec<String>,
) {
    if let Some(prefix) = name.strip_prefix(XMLNS_PREFIX) {
        tree.current_mut().bind_namespace(prefix, value);
        return;
    }

    if name.contains(':') {
        qualified.push(name.clone());
    }
    tree.current_mut().set_attr(name, value);
}

/// Every queued name must have its prefix bound on the current node or an
/// ancestor.
fn check_qualified(tree: &TreeBuilder, qualified: &mut Vec<String>) -> Result<()> {
    for name in qualified.drain(..) {
        let prefix = name.split_once(':').map_or("", |(prefix, _)| prefix);
        if tree.resolve_namespace(prefix).is_none() {
            return Err(Error::UndeclaredNamespace {
                prefix: prefix.to_string(),
                name,
            });
        }
    }
    Ok(())
}

/// Decode kbin bytes into a document.
pub fn from_binary(input: &[u8], options: &DecodeOptions) -> Result<KbinDocument> {
    KbinReader::new(input, *options)?.read()
}
