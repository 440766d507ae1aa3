//! Tolerant XML tree and plain-text projection of structured markup.
//!
//! Documents are parsed into a small owned tree so extractors can walk it
//! freely without touching the source text. Flattening produces an immutable
//! text buffer plus an offset map from projection characters back to source
//! byte offsets and enclosing elements.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Elements whose boundaries separate text in the plain-text projection
const BLOCK_ELEMENTS: &[&str] = &[
    "abstract", "ack", "addr-line", "aff", "alt-title", "app", "article-title", "back", "body",
    "boxed-text", "br", "break", "caption", "col", "colgroup", "def", "def-item", "disp-formula",
    "disp-quote", "div", "element-citation", "fig", "fn", "fn-group", "front", "h1", "h2", "h3",
    "h4", "h5", "h6", "kwd", "label", "li", "list", "list-item", "mixed-citation", "p", "ref",
    "ref-list", "sec", "statement", "subtitle", "table", "table-wrap", "table-wrap-foot", "tbody",
    "td", "term", "tfoot", "th", "thead", "title", "tr", "trans-title",
];

/// Problems that make a fragment unparseable as XML
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("malformed markup at byte {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("element <{name}> opened at byte {position} is never closed")]
    Unclosed { name: String, position: usize },
}

/// A node in the parsed tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text { text: String, offset: usize },
}

/// An element with its attributes and children.
///
/// `offset` is the byte position of the start tag in the parsed source.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
    pub offset: usize,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>, offset: usize) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
            offset,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Direct child elements
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text { .. } => None,
        })
    }

    /// First direct child element with this name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// First element with this name at any depth, in document order
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.elements()
            .find_map(|e| if e.name == name { Some(e) } else { e.find(name) })
    }

    /// All elements with this name at any depth, in document order
    pub fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for e in self.elements() {
            if e.name == name {
                out.push(e);
            }
            e.find_all(name, out);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Concatenated descendant text, with block boundaries turned into spaces
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        collapse_whitespace(&out)
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for node in &element.children {
        match node {
            Node::Text { text, .. } => out.push_str(text),
            Node::Element(e) => {
                let block = is_block(&e.name);
                if block {
                    out.push(' ');
                }
                collect_text(e, out);
                if block {
                    out.push(' ');
                }
            }
        }
    }
}

fn is_block(name: &str) -> bool {
    BLOCK_ELEMENTS.binary_search(&name).is_ok()
}

/// Replace every run of whitespace (including thin and no-break spaces) by one space and trim
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending = false;
    for c in s.chars() {
        if c.is_whitespace() {
            pending = true;
        } else {
            if pending && !out.is_empty() {
                out.push(' ');
            }
            pending = false;
            out.push(c);
        }
    }
    out
}

fn element_from(start: &BytesStart<'_>, offset: usize) -> Element {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let attributes = start
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            (key, value)
        })
        .collect();
    Element::new(name, attributes, offset)
}

/// Parse a document or fragment into a tree rooted at a synthetic `#document` element.
///
/// `base_offset` is added to every recorded position, so fragments cut from
/// a larger document report offsets into that document.
pub fn parse(xml: &str, base_offset: usize) -> Result<Element, MarkupError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = true;

    let mut stack = vec![Element::new("#document".to_string(), Vec::new(), base_offset)];
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let position = reader.buffer_position() as usize + base_offset;
        let event = reader.read_event_into(&mut buf).map_err(|e| MarkupError::Syntax {
            position: reader.buffer_position() as usize + base_offset,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(ref e) => stack.push(element_from(e, position)),
            Event::Empty(ref e) => {
                let element = element_from(e, position);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(element));
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(MarkupError::Syntax {
                        position,
                        message: "closing tag without an open element".to_string(),
                    });
                }
                if let (Some(done), Some(parent)) = (stack.pop(), stack.last_mut()) {
                    parent.children.push(Node::Element(done));
                }
            }
            Event::Text(ref t) => {
                let text = t
                    .unescape()
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(t).into_owned());
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text {
                        text,
                        offset: position,
                    });
                }
            }
            Event::CData(ref c) => {
                let text = String::from_utf8_lossy(c).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text {
                        text,
                        offset: position,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() > 1 {
        let unclosed = &stack[stack.len() - 1];
        return Err(MarkupError::Unclosed {
            name: unclosed.name.clone(),
            position: unclosed.offset,
        });
    }

    // stack has exactly the root left
    Ok(stack.remove(0))
}

/// Maps a run of projection characters back to the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    /// First projection character of the run
    pub start: usize,
    /// Byte offset of the originating text in the source
    pub source_offset: usize,
    /// Innermost enclosing element
    pub element: String,
}

/// Plain-text projection of a document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlatText {
    text: String,
    char_len: usize,
    spans: Vec<SourceSpan>,
}

impl FlatText {
    /// Wrap text that has no markup behind it
    pub fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            char_len: text.chars().count(),
            spans: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.char_len
    }

    /// Source span containing projection character `offset`
    pub fn locate(&self, offset: usize) -> Option<&SourceSpan> {
        let index = self.spans.partition_point(|span| span.start <= offset);
        index.checked_sub(1).map(|i| &self.spans[i])
    }
}

struct Flattener {
    out: FlatText,
    pending_space: bool,
}

impl Flattener {
    fn separate(&mut self) {
        self.pending_space = true;
    }

    fn push_text(&mut self, text: &str, source_offset: usize, element: &str) {
        let mut span_recorded = false;
        for c in text.chars() {
            if c.is_whitespace() {
                self.pending_space = true;
                continue;
            }
            if self.pending_space && self.out.char_len > 0 {
                self.out.text.push(' ');
                self.out.char_len += 1;
            }
            self.pending_space = false;
            if !span_recorded {
                self.out.spans.push(SourceSpan {
                    start: self.out.char_len,
                    source_offset,
                    element: element.to_string(),
                });
                span_recorded = true;
            }
            self.out.text.push(c);
            self.out.char_len += 1;
        }
    }

    fn walk(&mut self, element: &Element) {
        for node in &element.children {
            match node {
                Node::Text { text, offset } => self.push_text(text, *offset, &element.name),
                Node::Element(child) => {
                    let block = is_block(&child.name);
                    if block {
                        self.separate();
                    }
                    self.walk(child);
                    if block {
                        self.separate();
                    }
                }
            }
        }
    }
}

/// Flatten a parsed tree into text, block elements becoming single spaces
pub fn flatten(root: &Element) -> FlatText {
    let mut flattener = Flattener {
        out: FlatText::default(),
        pending_space: false,
    };
    flattener.walk(root);
    flattener.out
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<!--.*?-->|<[^>]*>").expect("valid tag pattern"))
}

/// Degraded projection for markup that does not parse: tags become spaces.
///
/// No offset map is produced.
pub fn strip_tags(markup: &str) -> FlatText {
    let stripped = tag_pattern().replace_all(markup, " ");
    let unescaped = quick_xml::escape::unescape(&stripped)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| stripped.into_owned());
    FlatText::plain(&collapse_whitespace(&unescaped))
}
