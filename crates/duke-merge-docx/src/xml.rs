//! Owned XML tree
//!
//! The main document part is small enough to hold in memory as a tree, which
//! makes it possible to rewrite paragraphs and serialize everything else back
//! untouched.

use std::borrow::Cow;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{DocxError, DocxResult};

/// A node in the tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// An element with its children
    Element(Element),
    /// Unescaped character data
    Text(String),
    /// Anything else (comments, processing instructions), written back as read
    Raw(Event<'static>),
}

/// An XML element
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Qualified name, prefix included (e.g. `w:p`)
    pub name: String,
    /// Attributes in document order, values unescaped
    pub attrs: Vec<(String, String)>,
    /// Child nodes
    pub children: Vec<Node>,
}

impl Element {
    /// Create an element without attributes or children
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Name without the namespace prefix
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    /// Namespace prefix, if any
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Name for a sibling element in the same namespace
    pub fn qualified(&self, local: &str) -> String {
        match self.prefix() {
            Some(prefix) => format!("{}:{}", prefix, local),
            None => local.to_string(),
        }
    }

    /// Get an attribute value by qualified name
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing any previous value
    pub fn set_attr(&mut self, key: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((key.to_string(), value.to_string())),
        }
    }

    /// Child elements, in order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    /// Child elements with the given local name
    pub fn children_named_mut(
        &mut self,
        local: &'static str,
    ) -> impl Iterator<Item = &mut Element> + '_ {
        self.children.iter_mut().filter_map(move |node| match node {
            Node::Element(el) if el.local_name() == local => Some(el),
            _ => None,
        })
    }

    /// First child element with the given local name
    pub fn child_named_mut(&mut self, local: &'static str) -> Option<&mut Element> {
        self.children_named_mut(local).next()
    }

    /// Concatenated text of all direct text children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace all children with a single text node
    pub fn set_text(&mut self, text: &str) {
        self.children = vec![Node::Text(text.to_string())];
    }
}

/// A parsed XML part: prolog nodes followed by the root element
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    /// Declaration, comments and processing instructions before the root
    pub prolog: Vec<Node>,
    /// Root element
    pub root: Element,
}

impl XmlDocument {
    /// Parse an XML part
    pub fn parse(bytes: &[u8]) -> DocxResult<Self> {
        let mut reader = Reader::from_reader(bytes);
        // Whitespace inside w:t is significant
        reader.trim_text(false);

        let mut buf = Vec::new();
        let mut prolog = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            let event = reader.read_event_into(&mut buf)?;
            match event {
                Event::Start(e) => stack.push(start_element(&e)?),
                Event::Empty(e) => {
                    let el = start_element(&e)?;
                    attach(&mut stack, &mut prolog, &mut root, Node::Element(el))?;
                }
                Event::End(_) => {
                    let el = stack.pop().ok_or_else(|| {
                        DocxError::InvalidFormat("unbalanced end tag".into())
                    })?;
                    attach(&mut stack, &mut prolog, &mut root, Node::Element(el))?;
                }
                Event::Text(e) => {
                    if !stack.is_empty() {
                        let text = e.unescape()?.into_owned();
                        push_text(&mut stack, text);
                    }
                }
                Event::CData(e) => {
                    if !stack.is_empty() {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        push_text(&mut stack, text);
                    }
                }
                Event::Eof => break,
                other => {
                    let node = Node::Raw(other.into_owned());
                    attach(&mut stack, &mut prolog, &mut root, node)?;
                }
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(DocxError::InvalidFormat("unclosed element".into()));
        }
        let root = root.ok_or_else(|| DocxError::InvalidFormat("no root element".into()))?;

        Ok(Self { prolog, root })
    }

    /// Serialize back to bytes
    pub fn to_bytes(&self) -> DocxResult<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;
        Ok(writer.into_inner())
    }
}

fn start_element(e: &BytesStart<'_>) -> DocxResult<Element> {
    let mut el = Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr.map_err(|err| DocxError::Xml(err.into()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        el.attrs.push((key, value));
    }
    Ok(el)
}

fn push_text(stack: &mut [Element], text: String) {
    if let Some(parent) = stack.last_mut() {
        // Adjacent text (text then CDATA) is merged into one node
        if let Some(Node::Text(prev)) = parent.children.last_mut() {
            prev.push_str(&text);
        } else {
            parent.children.push(Node::Text(text));
        }
    }
}

fn attach(
    stack: &mut [Element],
    prolog: &mut Vec<Node>,
    root: &mut Option<Element>,
    node: Node,
) -> DocxResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }

    match node {
        Node::Element(el) if root.is_none() => *root = Some(el),
        Node::Element(el) => {
            return Err(DocxError::InvalidFormat(format!(
                "second root element <{}>",
                el.name
            )))
        }
        // Trailing comments after the root are dropped
        other if root.is_none() => prolog.push(other),
        _ => {}
    }
    Ok(())
}

fn write_node<W: std::io::Write>(writer: &mut Writer<W>, node: &Node) -> DocxResult<()> {
    match node {
        Node::Element(el) => write_element(writer, el)?,
        Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        Node::Raw(event) => writer.write_event(event)?,
    }
    Ok(())
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, el: &Element) -> DocxResult<()> {
    let mut start = BytesStart::new(Cow::Borrowed(el.name.as_str()));
    for (key, value) in &el.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if el.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &el.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    Ok(())
}
