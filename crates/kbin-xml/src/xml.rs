//! Conversion between [`Node`] trees and XML text.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::node::{Node, XMLNS_PREFIX};
use crate::{Error, Result};

const BOM: &[u8] = b"\xEF\xBB\xBF";

fn xml_error(e: impl std::fmt::Display) -> Error {
    Error::Xml(e.to_string())
}

impl Node {
    /// Parse XML text into a tree.
    ///
    /// Comments, processing instructions and the declaration are ignored.
    /// Text is kept verbatim up to the first child element; whitespace-only
    /// text of an element with children is dropped.
    ///
    /// # Example
    ///
    /// ```
    /// use kbin_xml::Node;
    ///
    /// let node = Node::from_xml(r#"<root><id __type="u32">7</id></root>"#).unwrap();
    /// assert_eq!(node.children[0].text.as_deref(), Some("7"));
    /// ```
    pub fn from_xml(xml: &str) -> Result<Self> {
        let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Node> = Vec::new();
        let mut root: Option<Node> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(start_node(&e)?),
                Ok(Event::Empty(e)) => {
                    let node = start_node(&e)?;
                    attach(&mut stack, &mut root, node);
                }
                Ok(Event::End(_)) => {
                    if let Some(mut node) = stack.pop() {
                        if !node.children.is_empty()
                            && node.text.as_deref().is_some_and(|t| t.trim().is_empty())
                        {
                            node.text = None;
                        }
                        attach(&mut stack, &mut root, node);
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e.unescape().map_err(xml_error)?;
                    push_text(&mut stack, &text);
                }
                Ok(Event::CData(e)) => {
                    let bytes = e.into_inner();
                    push_text(&mut stack, std::str::from_utf8(&bytes)?);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(Error::Xml(format!("XML parse error: {}", e))),
            }
        }

        if !stack.is_empty() {
            return Err(Error::Xml("unexpected end of XML input".to_string()));
        }
        root.ok_or_else(|| Error::Xml("no root element found in XML".to_string()))
    }

    /// Parse UTF-8 XML bytes, with or without a byte order mark.
    pub fn from_xml_bytes(xml: &[u8]) -> Result<Self> {
        let xml = xml.strip_prefix(BOM).unwrap_or(xml);
        Self::from_xml(std::str::from_utf8(xml)?)
    }

    /// Render as indented UTF-8 XML with a declaration.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut output = Vec::new();
        self.write_xml(&mut output)?;
        String::from_utf8(output).map_err(xml_error)
    }

    /// Write indented UTF-8 XML with a declaration.
    pub fn write_xml<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut xml_writer = Writer::new_with_indent(writer, b' ', 2);

        xml_writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        self.write_element(&mut xml_writer)?;
        xml_writer.get_mut().write_all(b"\n")?;

        Ok(())
    }

    fn write_element<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut elem = BytesStart::new(self.tag.as_str());
        for (prefix, uri) in &self.namespaces {
            let key = format!("{}{}", XMLNS_PREFIX, prefix);
            elem.push_attribute((key.as_str(), uri.as_str()));
        }
        for (key, value) in &self.attributes {
            elem.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.text.is_none() {
            writer.write_event(Event::Empty(elem)).map_err(xml_error)?;
            return Ok(());
        }

        writer.write_event(Event::Start(elem)).map_err(xml_error)?;
        if let Some(text) = &self.text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(xml_error)?;
        }
        for child in &self.children {
            child.write_element(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.tag.as_str())))
            .map_err(xml_error)?;

        Ok(())
    }
}

/// Build a childless node from a start tag.
fn start_node(e: &BytesStart<'_>) -> Result<Node> {
    let name = e.name();
    let tag = std::str::from_utf8(name.as_ref())?;
    let mut node = Node::new(tag);

    for attr in e.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = std::str::from_utf8(attr.key.as_ref())?;
        let value = attr.unescape_value().map_err(xml_error)?;
        match key.strip_prefix(XMLNS_PREFIX) {
            Some(prefix) => node.bind_namespace(prefix, value),
            None => node.set_attr(key, value),
        }
    }

    Ok(node)
}

/// Append a finished node to its parent, or keep it as the first root.
fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

/// Text only counts before an element's first child.
fn push_text(stack: &mut [Node], text: &str) {
    if let Some(node) = stack.last_mut() {
        if node.children.is_empty() {
            node.text.get_or_insert_with(String::new).push_str(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typed_tree() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <!-- comment -->
  <id __type="u32">42</id>
  <name __type="str">  padded  </name>
  <flags __type="u8" __count="3">1 2 3</flags>
</root>
"#;
        let root = Node::from_xml(xml).unwrap();
        assert_eq!(root.tag, "root");
        assert!(root.text.is_none());
        assert_eq!(root.children.len(), 3);
        assert_eq!(root.children[0].type_name(), Some("u32"));
        assert_eq!(root.children[1].text.as_deref(), Some("  padded  "));
        assert_eq!(root.children[2].count(), Some("3"));
    }

    #[test]
    fn test_escapes_round_trip() {
        let node = Node::new("r")
            .attr("q", "a \"b\" & <c>")
            .child(Node::new("t").with_text("1 < 2 & 3"));
        let xml = node.to_xml_string().unwrap();
        assert_eq!(Node::from_xml(&xml).unwrap(), node);
    }

    #[test]
    fn test_output_layout() {
        let node = Node::new("root")
            .child(Node::new("a").with_text("x"))
            .child(Node::new("b"));
        let xml = node.to_xml_string().unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root>\n  <a>x</a>\n  <b/>\n</root>\n"
        );
    }

    #[test]
    fn test_namespace_declarations() {
        let xml = r#"<r xmlns:foo="urn:x" foo:bar="1"/>"#;
        let node = Node::from_xml(xml).unwrap();
        assert_eq!(node.namespace_uri("foo"), Some("urn:x"));
        assert_eq!(node.get_attr("foo:bar"), Some("1"));
        assert!(node.to_xml_string().unwrap().contains(r#"<r xmlns:foo="urn:x" foo:bar="1"/>"#));
    }

    #[test]
    fn test_bom_and_cdata() {
        let mut xml = BOM.to_vec();
        xml.extend_from_slice(b"<r><![CDATA[<raw>]]></r>");
        let node = Node::from_xml_bytes(&xml).unwrap();
        assert_eq!(node.text.as_deref(), Some("<raw>"));
    }

    #[test]
    fn test_rejects_unclosed_and_empty() {
        assert!(matches!(Node::from_xml("<a><b></b>"), Err(Error::Xml(_))));
        assert!(matches!(Node::from_xml("   "), Err(Error::Xml(_))));
    }
}
