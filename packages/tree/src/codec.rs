//! Text <-> tree conversion on top of quick-xml.

use quick_xml::escape::unescape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::element::{Document, Element, Node};
use crate::error::Error;

impl Document {
    /// Parse well-formed XML text into an owned tree.
    ///
    /// Text content and attribute values are stored unescaped; whitespace
    /// between elements is kept so an untouched document round-trips.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut reader = Reader::from_str(text);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    stack.push(element_from_start(&e)?);
                }
                Event::Empty(e) => {
                    let element = element_from_start(&e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::Malformed("unbalanced closing tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let raw = std::str::from_utf8(e.as_ref())
                            .map_err(|e| Error::Malformed(e.to_string()))?;
                        let text = unescape(raw)
                            .map_err(|e| Error::Malformed(e.to_string()))?
                            .into_owned();
                        parent.push_text(text);
                    }
                }
                Event::CData(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8(e.into_inner().into_owned())
                            .map_err(|e| Error::Malformed(e.to_string()))?;
                        parent.push_text(text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(Error::Malformed("unclosed element".to_string()));
        }
        root.map(Document::from_root).ok_or(Error::NoRoot)
    }

    /// Serialize the whole document back to text.
    pub fn to_xml(&self) -> Result<String, Error> {
        self.root().to_xml()
    }
}

impl Element {
    /// Serialize this element and its subtree to re-parseable text.
    pub fn to_xml(&self) -> Result<String, Error> {
        let mut writer = Writer::new(Vec::new());
        write_into(&mut writer, self)?;
        String::from_utf8(writer.into_inner()).map_err(|e| Error::Malformed(e.to_string()))
    }
}

fn element_from_start(e: &BytesStart) -> Result<Element, Error> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|e| Error::Malformed(e.to_string()))?
        .to_string();
    let mut element = Element::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::Malformed(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| Error::Malformed(e.to_string()))?
            .to_string();
        let raw = std::str::from_utf8(&attr.value).map_err(|e| Error::Malformed(e.to_string()))?;
        let value = unescape(raw)
            .map_err(|e| Error::Malformed(e.to_string()))?
            .into_owned();
        element.push_attr(key, value);
    }
    Ok(element)
}

fn attach(
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), Error> {
    match stack.last_mut() {
        Some(parent) => {
            parent.append_element(element);
        }
        None => {
            if root.is_some() {
                return Err(Error::Malformed("multiple root elements".to_string()));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

fn write_into(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), Error> {
    let mut start = BytesStart::new(element.name());
    for (key, value) in element.attributes() {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children().is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for node in element.children() {
        match node {
            Node::Element(child) => write_into(writer, child)?,
            Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::element::Document;
    use crate::error::Error;

    #[test]
    fn parses_nested_elements_and_attributes() {
        let doc =
            Document::parse(r#"<root><kiddie><char comment="Nice">Muppets rock</char></kiddie></root>"#)
                .unwrap();
        let kiddie = doc.root().elements_named("kiddie").next().unwrap();
        let ch = kiddie.elements_named("char").next().unwrap();
        assert_eq!(ch.text(), "Muppets rock");
        assert_eq!(ch.attr("comment"), Some("Nice"));
    }

    #[test]
    fn untouched_document_round_trips_ignoring_whitespace() {
        let source = "<root>\n  <kiddie>\n    <value>Gonzo</value>\n  </kiddie>\n</root>";
        let doc = Document::parse(source).unwrap();
        let out = doc.to_xml().unwrap();
        assert_eq!(strip_ws(&out), strip_ws(source));
    }

    #[test]
    fn escapes_survive_round_trip() {
        let source = "<root><v a=\"x&amp;y\">1 &lt; 2</v></root>";
        let doc = Document::parse(source).unwrap();
        let v = doc.root().elements_named("v").next().unwrap();
        assert_eq!(v.text(), "1 < 2");
        assert_eq!(v.attr("a"), Some("x&y"));

        let reparsed = Document::parse(&doc.to_xml().unwrap()).unwrap();
        assert_eq!(&reparsed, &doc);
    }

    #[test]
    fn empty_element_serializes_self_closed() {
        let doc = Document::parse("<root><empty/></root>").unwrap();
        assert_eq!(doc.to_xml().unwrap(), "<root><empty/></root>");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(Document::parse("<root>"), Err(Error::Malformed(_))));
        assert!(matches!(Document::parse(""), Err(Error::NoRoot)));
    }

    // Collapses inter-element whitespace, the same normalization the
    // round-trip assertions care about.
    fn strip_ws(xml: &str) -> String {
        let mut out = String::new();
        let mut pending = String::new();
        for c in xml.chars() {
            if c.is_whitespace() {
                pending.push(c);
            } else {
                if c != '<' {
                    out.push_str(&pending);
                }
                pending.clear();
                out.push(c);
            }
        }
        out
    }
}
