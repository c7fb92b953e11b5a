//! Owned, mutable XML element tree.
//!
//! The tree is deliberately simple: elements own their attributes in
//! document order and a list of child nodes (elements and text). It is the
//! in-memory form that field decoding reads from and that write-back
//! serialization mutates.

/// A child of an element: either a nested element or a run of text.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// One XML element: a name, attributes in document order, and children.
///
/// Element names are stored as written in the source. Lookups go through
/// [`Element::local_name`] comparisons, so `ns:street` and `street` match
/// the same step; namespace handling beyond that is a pass-through concern
/// of the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    /// Create an empty element with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// The element name as written, including any namespace prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The element name with any `prefix:` stripped.
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Attributes in document order.
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Look up an attribute value by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| local_part(k) == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing one of the same local name.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| local_part(k) == name) {
            slot.1 = value;
        } else {
            self.attributes.push((name.to_string(), value));
        }
    }

    /// All child nodes.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Direct child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Direct child elements matching `name` (by local name).
    ///
    /// The returned iterator borrows only `self`, so it outlives the
    /// `name` argument.
    pub fn elements_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Element> + 'a {
        let name = name.to_string();
        self.child_elements().filter(move |e| e.local_name() == name)
    }

    /// Indices into `children` of child elements matching `name`.
    ///
    /// Positions stay valid while the child list is not restructured, which
    /// is what positional collection alignment relies on.
    pub fn element_positions(&self, name: &str) -> Vec<usize> {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(i, n)| match n {
                Node::Element(e) if e.local_name() == name => Some(i),
                _ => None,
            })
            .collect()
    }

    /// Mutable access to the child element at a `children` index.
    pub fn element_at_mut(&mut self, index: usize) -> Option<&mut Element> {
        match self.children.get_mut(index) {
            Some(Node::Element(e)) => Some(e),
            _ => None,
        }
    }

    /// Replace the child node at `index` with an element.
    pub fn replace_at(&mut self, index: usize, element: Element) {
        self.children[index] = Node::Element(element);
    }

    /// Remove the child node at `index`.
    pub fn remove_at(&mut self, index: usize) {
        self.children.remove(index);
    }

    /// Append a child element, returning a mutable handle to it.
    pub fn append_element(&mut self, element: Element) -> &mut Element {
        self.children.push(Node::Element(element));
        match self.children.last_mut() {
            Some(Node::Element(e)) => e,
            _ => unreachable!("just pushed an element"),
        }
    }

    /// Get the first child element named `name`, creating it if missing.
    ///
    /// This is the single step of the auto-vivification walk: repeated over
    /// a path's segments it guarantees a write target exists.
    pub fn ensure_child(&mut self, name: &str) -> &mut Element {
        let existing = self.children.iter().position(|n| match n {
            Node::Element(e) => e.local_name() == name,
            Node::Text(_) => false,
        });
        let index = match existing {
            Some(i) => i,
            None => {
                self.children.push(Node::Element(Element::new(name)));
                self.children.len() - 1
            }
        };
        match &mut self.children[index] {
            Node::Element(e) => e,
            Node::Text(_) => unreachable!("position matched an element"),
        }
    }

    /// Append a text node. Used by the parser; merges nothing.
    pub(crate) fn push_text(&mut self, text: String) {
        self.children.push(Node::Text(text));
    }

    /// Append an attribute without replacing, preserving source order.
    pub(crate) fn push_attr(&mut self, name: String, value: String) {
        self.attributes.push((name, value));
    }

    /// Concatenated direct text content of this element.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    /// Replace all direct text content with `text`.
    ///
    /// Existing text nodes are dropped; element children are kept. An empty
    /// string leaves the element with no text node at all.
    pub fn set_text(&mut self, text: &str) {
        self.children.retain(|n| matches!(n, Node::Element(_)));
        if !text.is_empty() {
            self.children.insert(0, Node::Text(text.to_string()));
        }
    }

    /// First descendant element (excluding self) named `name`, in
    /// document order.
    pub fn find_descendant(&self, name: &str) -> Option<&Element> {
        for child in self.child_elements() {
            if child.local_name() == name {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// True if this element has no child elements.
    pub fn is_leaf(&self) -> bool {
        self.child_elements().next().is_none()
    }
}

/// A parsed document: a single root element.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Wrap an element as a document root.
    pub fn from_root(root: Element) -> Self {
        Document { root }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    pub fn into_root(self) -> Element {
        self.root
    }
}

fn local_part(name: &str) -> &str {
    match name.rsplit_once(':') {
        Some((_, local)) => local,
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_child_creates_missing() {
        let mut root = Element::new("root");
        root.ensure_child("kiddie").ensure_child("value").set_text("hi");
        assert_eq!(
            root.elements_named("kiddie")
                .next()
                .unwrap()
                .elements_named("value")
                .next()
                .unwrap()
                .text(),
            "hi"
        );
    }

    #[test]
    fn ensure_child_reuses_existing() {
        let mut root = Element::new("root");
        root.append_element(Element::new("kiddie"));
        root.ensure_child("kiddie").set_text("once");
        assert_eq!(root.child_elements().count(), 1);
    }

    #[test]
    fn set_text_replaces_but_keeps_elements() {
        let mut el = Element::new("wrap");
        el.children.push(Node::Text("old".to_string()));
        el.append_element(Element::new("inner"));
        el.set_text("new");
        assert_eq!(el.text(), "new");
        assert_eq!(el.child_elements().count(), 1);
    }

    #[test]
    fn attr_matches_local_name() {
        let mut el = Element::new("e");
        el.set_attr("ns:count", "1");
        assert_eq!(el.attr("count"), Some("1"));
        el.set_attr("count", "2");
        assert_eq!(el.attr("count"), Some("2"));
        assert_eq!(el.attributes().len(), 1);
    }

    #[test]
    fn find_descendant_document_order() {
        let mut root = Element::new("root");
        let outer = root.append_element(Element::new("outer"));
        outer.append_element(Element::new("hit")).set_text("first");
        root.append_element(Element::new("hit")).set_text("second");
        assert_eq!(root.find_descendant("hit").unwrap().text(), "first");
    }

    #[test]
    fn elements_named_outlives_the_name_lookup() {
        let mut root = Element::new("root");
        root.append_element(Element::new("sub"));
        root.append_element(Element::new("other"));
        root.append_element(Element::new("sub"));
        let matches: Vec<&Element> = {
            let name = String::from("sub");
            root.elements_named(&name).collect()
        };
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn element_positions_index_all_children() {
        let mut root = Element::new("root");
        root.children.push(Node::Text("pad".to_string()));
        root.append_element(Element::new("a"));
        root.append_element(Element::new("b"));
        root.append_element(Element::new("a"));
        assert_eq!(root.element_positions("a"), vec![1, 3]);
    }
}
