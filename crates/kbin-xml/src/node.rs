//! In-memory document tree.
//!
//! A [`Node`] is an element with a tag, ordered attributes, optional text and
//! owned children. Typed values are carried as text plus the reserved
//! metadata attributes `__type`, `__count` and `__size`, which is the same
//! shape the XML text form uses.

use crate::format::KbinType;

/// Attribute holding the node's type name.
pub const TYPE_ATTR: &str = "__type";
/// Attribute holding the repeat count of an array node.
pub const COUNT_ATTR: &str = "__count";
/// Attribute holding the byte size of a binary node.
pub const SIZE_ATTR: &str = "__size";

/// Prefix of attribute names that declare a namespace.
pub const XMLNS_PREFIX: &str = "xmlns:";

/// Whether `key` is one of the reserved metadata attributes.
pub fn is_metadata(key: &str) -> bool {
    matches!(key, TYPE_ATTR | COUNT_ATTR | SIZE_ATTR)
}

/// Whether `tag` can be used as an element name.
///
/// Follows the XML name rules minus namespaces: no `:`, not empty, and the
/// first character must not be a digit, `-` or `.`.
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// An element of a kbin document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// Tag name of the element.
    pub tag: String,
    /// Text content, if any.
    pub text: Option<String>,
    /// Attributes as key-value pairs, keys unique.
    pub attributes: Vec<(String, String)>,
    /// Namespace bindings declared on this element, as prefix-uri pairs.
    pub namespaces: Vec<(String, String)>,
    /// Child elements.
    pub children: Vec<Node>,
}

impl Node {
    /// Create a new node with the given tag name.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Set the `__type` of this node.
    pub fn with_type(mut self, ty: &KbinType) -> Self {
        self.set_attr(TYPE_ATTR, ty.name());
        self
    }

    /// Mark this node as an array of `count` values.
    pub fn with_count(mut self, count: usize) -> Self {
        self.set_attr(COUNT_ATTR, count.to_string());
        self
    }

    /// Set the text content of this node.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Add an attribute to this node.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Declare a namespace binding on this node.
    pub fn namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.bind_namespace(prefix, uri);
        self
    }

    /// Add a child node.
    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Add multiple children.
    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    /// Get an attribute value.
    pub fn get_attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing any existing value under the same key.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Remove an attribute, returning its value.
    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let index = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(index).1)
    }

    /// Bind `prefix` to `uri`, replacing an earlier binding of the prefix.
    pub fn bind_namespace(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        let prefix = prefix.into();
        let uri = uri.into();
        match self.namespaces.iter_mut().find(|(p, _)| *p == prefix) {
            Some(slot) => slot.1 = uri,
            None => self.namespaces.push((prefix, uri)),
        }
    }

    /// Look up a namespace bound directly on this node.
    pub fn namespace_uri(&self, prefix: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// The `__type` annotation, if present.
    pub fn type_name(&self) -> Option<&str> {
        self.get_attr(TYPE_ATTR)
    }

    /// The `__count` annotation, if present.
    pub fn count(&self) -> Option<&str> {
        self.get_attr(COUNT_ATTR)
    }

    /// Attributes that are real data rather than metadata annotations.
    pub fn data_attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .filter(|(k, _)| !is_metadata(k))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Find the first direct child with the given tag.
    pub fn find(&self, tag: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Iterate over this node and all descendants, depth-first.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

/// Depth-first pre-order iterator returned by [`Node::descendants`].
#[derive(Debug)]
pub struct Descendants<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}
