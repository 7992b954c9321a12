//! XML generation and parsing helpers built on quick-xml.
//!
//! All libvirt descriptors (domain, pool, volume) are generated through
//! [`XmlWriter`] rather than string formatting, and live descriptors read
//! back from the hypervisor are parsed into a small DOM with
//! [`parse_document`].

use std::collections::HashMap;
use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{Error, Result};

fn write_err(e: impl std::fmt::Display) -> Error {
    Error::Parse {
        what: "descriptor xml",
        message: e.to_string(),
    }
}

/// Event-based writer for descriptor documents.
pub struct XmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl std::fmt::Debug for XmlWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlWriter").finish_non_exhaustive()
    }
}

impl XmlWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self {
            writer: Writer::new(Cursor::new(Vec::new())),
        }
    }

    /// Open an element with the given attributes.
    pub fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let mut elem = BytesStart::new(name);
        for (key, value) in attributes {
            elem.push_attribute((*key, *value));
        }
        self.writer
            .write_event(Event::Start(elem))
            .map_err(write_err)
    }

    /// Close the element opened last with `name`.
    pub fn close(&mut self, name: &str) -> Result<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(write_err)
    }

    /// Write `<name>text</name>`.
    pub fn leaf(&mut self, name: &str, text: &str) -> Result<()> {
        self.leaf_with_attrs(name, text, &[])
    }

    /// Write `<name attrs...>text</name>`.
    pub fn leaf_with_attrs(
        &mut self,
        name: &str,
        text: &str,
        attributes: &[(&str, &str)],
    ) -> Result<()> {
        self.open(name, attributes)?;
        if !text.is_empty() {
            self.writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(write_err)?;
        }
        self.close(name)
    }

    /// Write a self-closing element.
    pub fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let mut elem = BytesStart::new(name);
        for (key, value) in attributes {
            elem.push_attribute((*key, *value));
        }
        self.writer
            .write_event(Event::Empty(elem))
            .map_err(write_err)
    }

    /// Consume the writer and return the document as a string.
    pub fn finish(self) -> Result<String> {
        let bytes = self.writer.into_inner().into_inner();
        String::from_utf8(bytes).map_err(write_err)
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed XML element.
#[derive(Debug, Clone)]
pub struct XmlNode {
    /// Element name.
    pub name: String,
    /// Attribute map.
    pub attributes: HashMap<String, String>,
    /// Accumulated text content.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Depth-first search for the first element named `element_name`.
    pub fn find(&self, element_name: &str) -> Option<&XmlNode> {
        if self.name == element_name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(element_name))
    }

    /// Depth-first collection of every element named `element_name`.
    pub fn find_all<'a>(&'a self, element_name: &str, out: &mut Vec<&'a XmlNode>) {
        if self.name == element_name {
            out.push(self);
        }
        for child in &self.children {
            child.find_all(element_name, out);
        }
    }

    /// Attribute value, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

fn node_from_start(e: &BytesStart<'_>) -> XmlNode {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = HashMap::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = String::from_utf8_lossy(&attr.value).into_owned();
        attributes.insert(key, value);
    }
    XmlNode {
        name,
        attributes,
        text: String::new(),
        children: Vec::new(),
    }
}

/// Parse an XML document into a DOM rooted at its top element.
pub fn parse_document(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => stack.push(node_from_start(&e)),
            Ok(Event::Empty(e)) => {
                let node = node_from_start(&e);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                } else if root.is_none() {
                    root = Some(node);
                }
            }
            Ok(Event::End(_)) => {
                if let Some(completed) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(completed);
                    } else {
                        root = Some(completed);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Ok(text) = e.unescape() {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Parse {
                    what: "descriptor xml",
                    message: e.to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    root.ok_or(Error::Parse {
        what: "descriptor xml",
        message: "no root element".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_round_trips_nested_elements() {
        let mut w = XmlWriter::new();
        w.open("pool", &[("type", "dir")]).unwrap();
        w.leaf("name", "minivirt-images").unwrap();
        w.open("target", &[]).unwrap();
        w.leaf("path", "/var/lib/libvirt/minivirt-images").unwrap();
        w.close("target").unwrap();
        w.close("pool").unwrap();

        let xml = w.finish().unwrap();
        assert!(xml.contains("<pool type=\"dir\">"));
        assert!(xml.contains("<name>minivirt-images</name>"));
        assert!(xml.contains("<path>/var/lib/libvirt/minivirt-images</path>"));
        assert!(xml.contains("</pool>"));
    }

    #[test]
    fn writer_escapes_attribute_values() {
        let mut w = XmlWriter::new();
        w.empty("source", &[("file", "/isos/a&b.iso")]).unwrap();
        let xml = w.finish().unwrap();
        assert!(xml.contains("a&amp;b.iso"));
    }

    #[test]
    fn parse_finds_graphics_port() {
        let xml = r#"
            <domain type="kvm">
              <devices>
                <graphics type="vnc" port="5901" listen="0.0.0.0"/>
              </devices>
            </domain>
        "#;
        let dom = parse_document(xml).unwrap();
        let graphics = dom.find("graphics").unwrap();
        assert_eq!(graphics.attr("type"), Some("vnc"));
        assert_eq!(graphics.attr("port"), Some("5901"));
    }

    #[test]
    fn find_all_collects_every_disk() {
        let xml = r#"
            <domain>
              <devices>
                <disk device="cdrom"><target dev="hda"/></disk>
                <disk device="disk"><target dev="vda"/></disk>
              </devices>
            </domain>
        "#;
        let dom = parse_document(xml).unwrap();
        let mut disks = Vec::new();
        dom.find_all("disk", &mut disks);
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].attr("device"), Some("cdrom"));
        assert_eq!(disks[1].attr("device"), Some("disk"));
    }

    #[test]
    fn parse_rejects_empty_input() {
        assert!(parse_document("").is_err());
    }
}
