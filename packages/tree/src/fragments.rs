//! Streaming extraction of repeated sub-elements from a larger document.
//!
//! A fetched collection document looks like
//! `<elems><root>…</root><root>…</root></elems>`: a wrapper whose repeated
//! children each become one record source. [`Fragments`] owns the input
//! bytes and walks them with a streaming reader, fixes the fragment tag
//! from the first element it meets, and copies out one subtree per `next`
//! call, so work and memory track how far the consumer actually pulls.

use std::io::Cursor;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::Error;

#[derive(Debug, PartialEq)]
enum Phase {
    Init,
    Scan,
    Done,
}

/// Iterator over serialized fragment texts, in document order.
///
/// With a `hint`, sibling content is skipped until an element with the
/// hinted tag opens; the first element after it fixes the fragment tag and
/// extraction ends when that wrapper closes. Without a hint the first
/// child of the document root fixes it. Every later element at the same
/// nesting level with the same tag yields one fragment.
pub struct Fragments {
    reader: Reader<Cursor<Vec<u8>>>,
    buf: Vec<u8>,
    hint: Option<String>,
    phase: Phase,
    fragment_tag: Option<String>,
    parent_depth: usize,
    // Depth of the wrapper being scanned; dropping below it ends the scan.
    stop_depth: usize,
    depth: usize,
}

impl Fragments {
    pub fn new(xml: impl Into<Vec<u8>>, hint: Option<&str>) -> Self {
        Fragments {
            reader: Reader::from_reader(Cursor::new(xml.into())),
            buf: Vec::new(),
            hint: hint.map(str::to_string),
            phase: Phase::Init,
            fragment_tag: None,
            parent_depth: 0,
            stop_depth: 0,
            depth: 0,
        }
    }

    /// Advance past the document root (and the hinted wrapper, if any).
    fn init(&mut self) -> Result<(), Error> {
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) => {
                    let at_root = self.depth == 0;
                    self.depth += 1;
                    let entered = match &self.hint {
                        Some(hint) => local_name(&e) == *hint,
                        None => at_root,
                    };
                    if entered {
                        self.stop_depth = self.depth;
                        self.phase = Phase::Scan;
                        return Ok(());
                    }
                }
                Event::Empty(e) => {
                    let empty_root = self.hint.is_none() && self.depth == 0;
                    let empty_hint = self
                        .hint
                        .as_deref()
                        .is_some_and(|hint| local_name(&e) == hint);
                    if empty_root || empty_hint {
                        self.phase = Phase::Done;
                        return Ok(());
                    }
                }
                Event::End(_) => {
                    self.depth = self.depth.saturating_sub(1);
                }
                Event::Eof => {
                    self.phase = Phase::Done;
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    /// Does an element opening at `parent_depth` start a fragment? The
    /// first candidate ever seen fixes the tag and the level.
    fn starts_fragment(&mut self, name: &str, parent_depth: usize) -> bool {
        match &self.fragment_tag {
            None => {
                self.fragment_tag = Some(name.to_string());
                self.parent_depth = parent_depth;
                true
            }
            Some(tag) => tag == name && parent_depth == self.parent_depth,
        }
    }
}

impl Iterator for Fragments {
    type Item = Result<String, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.phase == Phase::Init {
            if let Err(e) = self.init() {
                self.phase = Phase::Done;
                return Some(Err(e));
            }
        }
        if self.phase == Phase::Done {
            return None;
        }

        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => {
                    self.phase = Phase::Done;
                    return Some(Err(e.into()));
                }
            };
            match event {
                Event::Start(e) => {
                    let name = local_name(&e);
                    let start = e.into_owned();
                    if self.starts_fragment(&name, self.depth) {
                        // Net depth change of a whole subtree is zero, so
                        // self.depth is untouched across the capture.
                        let result = capture(&mut self.reader, start);
                        if result.is_err() {
                            self.phase = Phase::Done;
                        }
                        return Some(result);
                    }
                    self.depth += 1;
                }
                Event::Empty(e) => {
                    let name = local_name(&e);
                    let start = e.into_owned();
                    if self.starts_fragment(&name, self.depth) {
                        return Some(capture_empty(start));
                    }
                }
                Event::End(_) => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth < self.stop_depth {
                        self.phase = Phase::Done;
                        return None;
                    }
                }
                Event::Eof => {
                    self.phase = Phase::Done;
                    return None;
                }
                _ => {}
            }
        }
    }
}

/// Copy the subtree opened by `start` into a fresh buffer.
fn capture(reader: &mut Reader<Cursor<Vec<u8>>>, start: BytesStart<'static>) -> Result<String, Error> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Start(start))?;
    let mut depth = 1usize;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            event @ Event::Start(_) => {
                depth += 1;
                writer.write_event(event)?;
            }
            event @ Event::End(_) => {
                depth -= 1;
                writer.write_event(event)?;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => {
                return Err(Error::Malformed(
                    "unexpected end of input inside fragment".to_string(),
                ));
            }
            event => writer.write_event(event)?,
        }
    }
    String::from_utf8(writer.into_inner()).map_err(|e| Error::Malformed(e.to_string()))
}

fn capture_empty(start: BytesStart<'static>) -> Result<String, Error> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Empty(start))?;
    String::from_utf8(writer.into_inner()).map_err(|e| Error::Malformed(e.to_string()))
}

fn local_name(start: &BytesStart<'_>) -> String {
    let raw = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    match raw.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(xml: &str, hint: Option<&str>) -> Vec<String> {
        Fragments::new(xml, hint)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn yields_repeated_children_in_order() {
        let out = collect(
            "<elems><root><f>hello</f></root><root><f>goodbye</f></root></elems>",
            None,
        );
        assert_eq!(
            out,
            vec![
                "<root><f>hello</f></root>".to_string(),
                "<root><f>goodbye</f></root>".to_string(),
            ]
        );
    }

    #[test]
    fn single_child_yields_one_fragment() {
        let out = collect("<collection><root><f>hello</f></root></collection>", None);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn nested_same_tag_is_not_split() {
        let out = collect(
            "<elems><item><item>inner</item></item><item>b</item></elems>",
            None,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], "<item><item>inner</item></item>");
        assert_eq!(out[1], "<item>b</item>");
    }

    #[test]
    fn other_tags_at_fragment_level_are_skipped() {
        let out = collect(
            "<elems><meta>x</meta><root>a</root><root>b</root></elems>",
            None,
        );
        // The first child fixes the tag; later differently-tagged
        // siblings are ignored.
        assert_eq!(out, vec!["<meta>x</meta>".to_string()]);
    }

    #[test]
    fn hint_skips_leading_wrapper_content() {
        let xml = "<feed><info>meta</info><entries><e>1</e><e>2</e><e>3</e></entries></feed>";
        let out = collect(xml, Some("entries"));
        assert_eq!(
            out,
            vec![
                "<e>1</e>".to_string(),
                "<e>2</e>".to_string(),
                "<e>3</e>".to_string(),
            ]
        );
    }

    #[test]
    fn hinted_extraction_stops_at_the_wrapper_close() {
        let xml = "<feed><entries><e>1</e></entries><more><e>2</e></more></feed>";
        let out = collect(xml, Some("entries"));
        assert_eq!(out, vec!["<e>1</e>".to_string()]);
    }

    #[test]
    fn empty_wrapper_yields_nothing() {
        assert!(collect("<elems/>", None).is_empty());
        assert!(collect("<feed><entries/></feed>", Some("entries")).is_empty());
        assert!(collect("<elems></elems>", None).is_empty());
    }

    #[test]
    fn missing_hint_yields_nothing() {
        assert!(collect("<feed><e>1</e></feed>", Some("entries")).is_empty());
    }

    #[test]
    fn empty_fragment_elements_are_yielded() {
        let out = collect("<elems><e/><e/></elems>", None);
        assert_eq!(out, vec!["<e/>".to_string(), "<e/>".to_string()]);
    }

    #[test]
    fn truncated_input_errors() {
        let mut it = Fragments::new("<elems><root><f>hello</f>", None);
        assert!(it.next().unwrap().is_err());
        assert!(it.next().is_none());
    }

    #[test]
    fn fragments_before_a_malformed_tail_still_yield() {
        let mut it = Fragments::new("<elems><root>ok</root><root>bad", None);
        assert_eq!(it.next().unwrap().unwrap(), "<root>ok</root>");
        assert!(it.next().unwrap().is_err());
    }
}
