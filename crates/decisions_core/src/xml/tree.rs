//! A small owned element tree read with `quick-xml`.
//!
//! Text placement follows the familiar ElementTree model: `text` is the
//! character data before the first child and `tail` the data after the
//! element's end tag, so mixed content (XHTML blocks) can be written back out.

use super::ParseError;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::io::BufRead;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub tail: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Text content with surrounding whitespace removed; `None` when blank.
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|text| !text.is_empty())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn children_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a Element> + use<'a, 'n> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// All elements matching a `/`-separated child path, in document order.
    pub fn findall<'a>(&'a self, path: &str) -> Vec<&'a Element> {
        let mut current = vec![self];
        for step in path.split('/').filter(|step| !step.is_empty()) {
            current = current
                .into_iter()
                .flat_map(|element| element.children.iter().filter(move |child| child.name == step))
                .collect();
        }
        current
    }

    /// First element matching a `/`-separated child path.
    pub fn find(&self, path: &str) -> Option<&Element> {
        self.findall(path).into_iter().next()
    }

    /// Every descendant named `name`, depth first.
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            found.extend(child.descendants(name));
        }
        found
    }

    /// Markup inside this element: its text, then each child with its tail.
    pub fn inner_xml(&self) -> String {
        let mut out = String::new();
        if let Some(text) = &self.text {
            out.push_str(&escape(text.as_str()));
        }
        for child in &self.children {
            child.write_xml(&mut out);
        }
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.text.is_none() && self.children.is_empty() {
            out.push_str("/>");
        } else {
            out.push('>');
            out.push_str(&self.inner_xml());
            out.push_str("</");
            out.push_str(&self.name);
            out.push('>');
        }
        if let Some(tail) = &self.tail {
            out.push_str(&escape(tail.as_str()));
        }
    }
}

/// Reads a whole document and returns its root element.
pub fn read_tree<R: BufRead>(reader: R, filename: &str) -> Result<Element, ParseError> {
    let xml_error = |source| ParseError::Xml {
        filename: filename.to_string(),
        source,
    };
    let malformed = |message: &str| ParseError::Malformed {
        filename: filename.to_string(),
        message: message.to_string(),
    };

    let mut reader = Reader::from_reader(reader);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(start) => stack.push(open_element(&start).map_err(xml_error)?),
            Event::Empty(start) => {
                let element = open_element(&start).map_err(xml_error)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| malformed("unexpected end tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(xml_error)?;
                append_text(&mut stack, &text);
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                append_text(&mut stack, &text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(malformed("unclosed element at end of document"));
    }
    root.ok_or_else(|| malformed("no root element"))
}

fn open_element(start: &BytesStart<'_>) -> Result<Element, quick_xml::Error> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn append_text(stack: &mut [Element], text: &str) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    let slot = match parent.children.last_mut() {
        Some(child) => &mut child.tail,
        None => &mut parent.text,
    };
    slot.get_or_insert_with(String::new).push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(xml: &str) -> Element {
        read_tree(xml.as_bytes(), "test.xml").unwrap()
    }

    #[test]
    fn builds_text_and_tails() {
        let root = tree("<a x=\"1\">head<b>bold</b>tail<c/></a>");
        assert_eq!(root.name, "a");
        assert_eq!(root.attribute("x"), Some("1"));
        assert_eq!(root.text.as_deref(), Some("head"));
        assert_eq!(root.children[0].text.as_deref(), Some("bold"));
        assert_eq!(root.children[0].tail.as_deref(), Some("tail"));
        assert_eq!(root.children[1].text, None);
    }

    #[test]
    fn paths_search_all_branches() {
        let root = tree(
            "<r><L><T><I>1</I></T></L><L><T><I>2</I><I>3</I></T></L><Other><I>x</I></Other></r>",
        );
        let texts: Vec<_> = root.findall("L/T/I").iter().map(|e| e.trimmed_text()).collect();
        assert_eq!(texts, vec![Some("1"), Some("2"), Some("3")]);
        assert_eq!(root.find("L/T/I").and_then(Element::trimmed_text), Some("1"));
        assert!(root.find("L/Missing").is_none());
        assert_eq!(root.descendants("I").len(), 4);
    }

    #[test]
    fn found_elements_outlive_the_path() {
        let root = tree("<r><L><T><I>1</I></T></L></r>");
        let found = {
            let path = ["L", "T", "I"].join("/");
            root.findall(&path)
        };
        assert_eq!(found.len(), 1);
        let step = String::from("T");
        let named: Vec<_> = root.children[0].children_named(&step).collect();
        drop(step);
        assert_eq!(named[0].name, "T");
    }

    #[test]
    fn entities_are_decoded_and_reescaped() {
        let root = tree("<XHTML>a &amp; b<p class=\"q&quot;\">x &lt; y</p>!</XHTML>");
        assert_eq!(root.text.as_deref(), Some("a & b"));
        assert_eq!(root.inner_xml(), "a &amp; b<p class=\"q&quot;\">x &lt; y</p>!");
    }

    #[test]
    fn cdata_is_text() {
        let root = tree("<a><![CDATA[<raw>]]></a>");
        assert_eq!(root.text.as_deref(), Some("<raw>"));
    }

    #[test]
    fn broken_documents_fail() {
        assert!(matches!(read_tree("".as_bytes(), "e.xml"), Err(ParseError::Malformed { .. })));
        assert!(read_tree("<a><b></a>".as_bytes(), "m.xml").is_err());
        assert!(read_tree("<a>".as_bytes(), "u.xml").is_err());
    }
}
