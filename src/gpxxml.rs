use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::{NsReader, Writer};
use std::io::Write;

use crate::error::XmlError;

pub const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An owned XML element. `name` is the qualified name as written in the
/// source, `namespace` the URI it resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>, namespace: Option<&str>) -> Self {
        Element {
            name: name.into(),
            namespace: namespace.map(str::to_owned),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    pub fn is_gpx(&self, local: &str) -> bool {
        self.local_name() == local && self.namespace.as_deref() == Some(GPX_NAMESPACE)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, key: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_owned(),
            None => self.attributes.push((key.to_owned(), value.to_owned())),
        }
    }

    /// `xmlns` and `xmlns:*` attributes declared directly on this element.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .filter(|(k, _)| k == "xmlns" || k.starts_with("xmlns:"))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Child elements in the GPX namespace with the given local name.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.is_gpx(local))
    }

    pub fn child(&self, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.is_gpx(local))
    }

    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    pub fn child_text(&self, local: &str) -> Option<String> {
        self.child(local).map(Element::text)
    }

    pub fn push_element(&mut self, element: Element) {
        self.children.push(Node::Element(element));
    }

    pub fn push_text(&mut self, text: &str) {
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_owned()));
        }
    }

    /// Drops whitespace-only text sitting between child elements.
    fn strip_layout_whitespace(&mut self) {
        if self.elements().next().is_none() {
            return;
        }
        self.children.retain(|node| match node {
            Node::Text(t) => !t.trim().is_empty(),
            Node::Element(_) => true,
        });
    }
}

fn namespace_of(ns: &ResolveResult) -> Option<String> {
    match ns {
        ResolveResult::Bound(uri) => Some(String::from_utf8_lossy(uri.as_ref()).into_owned()),
        ResolveResult::Unbound | ResolveResult::Unknown(_) => None,
    }
}

fn syntax(position: u64, source: quick_xml::Error) -> XmlError {
    XmlError::Syntax { position, source }
}

pub fn parse_document(input: &[u8]) -> Result<Element, XmlError> {
    let mut reader = NsReader::from_reader(input);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position();
        let (namespace, event) = match reader.read_resolved_event_into(&mut buf) {
            Err(e) => return Err(syntax(position, e)),
            Ok((_, Event::Eof)) => break,
            Ok((ns, event)) => (namespace_of(&ns), event.into_owned()),
        };

        match event {
            Event::Start(ref e) => {
                stack.push(start_element(e, namespace, &reader, position)?);
            }

            Event::Empty(ref e) => {
                let element = start_element(e, namespace, &reader, position)?;
                attach(&mut stack, &mut root, element)?;
            }

            Event::End(_) => {
                // End names are checked by the reader, so the stack is never empty here.
                if let Some(mut element) = stack.pop() {
                    element.strip_layout_whitespace();
                    attach(&mut stack, &mut root, element)?;
                }
            }

            Event::Text(ref e) => {
                let text = e.decode().map_err(|err| syntax(position, err.into()))?;
                push_text(&mut stack, &text)?;
            }

            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                push_text(&mut stack, &text)?;
            }

            Event::GeneralRef(ref e) => {
                let resolved = match e.resolve_char_ref().map_err(|err| syntax(position, err))? {
                    Some(ch) => ch.to_string(),
                    None => {
                        let name = e.decode().map_err(|err| syntax(position, err.into()))?;
                        resolve_predefined_entity(&name)
                            .ok_or_else(|| XmlError::UnknownEntity(name.to_string()))?
                            .to_owned()
                    }
                };
                push_text(&mut stack, &resolved)?;
            }

            _ => {}
        }

        buf.clear();
    }

    root.ok_or(XmlError::NoRoot)
}

fn start_element<R>(
    e: &BytesStart,
    namespace: Option<String>,
    reader: &NsReader<R>,
    position: u64,
) -> Result<Element, XmlError> {
    let mut element = Element {
        name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        namespace,
        attributes: Vec::new(),
        children: Vec::new(),
    };

    for attr in e.attributes() {
        let attr = attr.map_err(|err| syntax(position, err.into()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|err| syntax(position, err))?;
        element.attributes.push((key, value.into_owned()));
    }

    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.push_element(element);
        Ok(())
    } else if root.is_none() {
        *root = Some(element);
        Ok(())
    } else {
        Err(XmlError::OutsideRoot)
    }
}

fn push_text(stack: &mut [Element], text: &str) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push_text(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError::OutsideRoot),
    }
}

/// Writes `root` as a UTF-8 document with an XML declaration.
pub fn write_document<W: Write>(root: &Element, output: W) -> Result<(), XmlError> {
    let mut writer = Writer::new_with_indent(output, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_element(&mut writer, root)?;
    writer.get_mut().write_all(b"\n")?;
    Ok(())
}

fn write_element<W: Write>(writer: &mut Writer<W>, element: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;

    Ok(())
}
