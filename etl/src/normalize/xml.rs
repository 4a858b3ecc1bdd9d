use std::collections::BTreeMap;
use std::str;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};

/// Key prefix of attributes inside an [`XmlNode::Element`].
pub const ATTRIBUTE_PREFIX: char = '@';

/// Key of the text of an element that also has attributes or children.
pub const TEXT_KEY: &str = "#text";

/// Generic XML tree.
///
/// Attributes are stored as `@name` children and mixed text as `#text`. Repeated child elements
/// are collected into an [`XmlNode::List`] in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    /// Element without attributes, children or text.
    Empty,
    /// Element holding only text, or an attribute value.
    Text(String),
    Element(BTreeMap<String, XmlNode>),
    List(Vec<XmlNode>),
}

impl XmlNode {
    /// Returns the child stored under `key` when this node is an element.
    pub fn get(&self, key: &str) -> Option<&XmlNode> {
        match self {
            XmlNode::Element(children) => children.get(key),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            XmlNode::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Converts the node to JSON, keeping the attribute and text key conventions.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            XmlNode::Empty => serde_json::Value::Null,
            XmlNode::Text(text) => serde_json::Value::String(text.clone()),
            XmlNode::Element(children) => serde_json::Value::Object(
                children
                    .iter()
                    .map(|(key, child)| (key.clone(), child.to_json()))
                    .collect(),
            ),
            XmlNode::List(items) => {
                serde_json::Value::Array(items.iter().map(XmlNode::to_json).collect())
            }
        }
    }
}

/// Parsed document: the name of the root element and its content.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root_name: String,
    pub root: XmlNode,
}

#[derive(Debug)]
struct Frame {
    name: String,
    attributes: Vec<(String, String)>,
    children: BTreeMap<String, XmlNode>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> EtlResult<Self> {
        let name = str::from_utf8(start.name().as_ref())?.to_string();

        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(quick_xml::Error::from)?;
            let key = str::from_utf8(attribute.key.as_ref())?;
            let value = attribute.unescape_value()?;
            attributes.push((format!("{ATTRIBUTE_PREFIX}{key}"), value.into_owned()));
        }

        Ok(Self {
            name,
            attributes,
            children: BTreeMap::new(),
            text: String::new(),
        })
    }

    fn push_text(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.text.push_str(text);
        }
    }

    fn add_child(&mut self, name: String, node: XmlNode) {
        match self.children.remove(&name) {
            None => {
                self.children.insert(name, node);
            }
            Some(XmlNode::List(mut items)) => {
                items.push(node);
                self.children.insert(name, XmlNode::List(items));
            }
            Some(existing) => {
                self.children.insert(name, XmlNode::List(vec![existing, node]));
            }
        }
    }

    fn close(self) -> (String, XmlNode) {
        if self.attributes.is_empty() && self.children.is_empty() {
            let node = if self.text.is_empty() {
                XmlNode::Empty
            } else {
                XmlNode::Text(self.text)
            };

            return (self.name, node);
        }

        let mut children = self.children;
        for (key, value) in self.attributes {
            children.insert(key, XmlNode::Text(value));
        }
        if !self.text.is_empty() {
            children.insert(TEXT_KEY.to_string(), XmlNode::Text(self.text));
        }

        (self.name, XmlNode::Element(children))
    }
}

/// Parses `text` into an [`XmlDocument`].
///
/// Fails with [`ErrorKind::MalformedPayload`] on invalid XML, on unclosed elements and on
/// documents without exactly one root element.
pub fn parse_document(text: &str) -> EtlResult<XmlDocument> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Frame> = Vec::new();
    let mut document: Option<XmlDocument> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if stack.is_empty() && document.is_some() {
                    bail!(
                        ErrorKind::MalformedPayload,
                        "XML payload has more than one root element"
                    );
                }
                stack.push(Frame::open(&start)?);
            }
            Event::Empty(start) => {
                let frame = Frame::open(&start)?;
                close_frame(frame, &mut stack, &mut document)?;
            }
            Event::End(_) => {
                let Some(frame) = stack.pop() else {
                    bail!(
                        ErrorKind::MalformedPayload,
                        "XML payload closes an element that was never opened"
                    );
                };
                close_frame(frame, &mut stack, &mut document)?;
            }
            Event::Text(text) => {
                if let Some(frame) = stack.last_mut() {
                    frame.push_text(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(frame) = stack.last_mut() {
                    frame.push_text(str::from_utf8(&data.into_inner())?);
                }
            }
            Event::Eof => break,
            Event::Decl(_)
            | Event::PI(_)
            | Event::Comment(_)
            | Event::DocType(_) => {}
        }
    }

    if let Some(frame) = stack.last() {
        bail!(
            ErrorKind::MalformedPayload,
            "XML payload ends inside an element",
            frame.name.clone()
        );
    }

    match document {
        Some(document) => Ok(document),
        None => bail!(ErrorKind::MalformedPayload, "XML payload has no root element"),
    }
}

fn close_frame(
    frame: Frame,
    stack: &mut [Frame],
    document: &mut Option<XmlDocument>,
) -> EtlResult<()> {
    let (name, node) = frame.close();

    match stack.last_mut() {
        Some(parent) => parent.add_child(name, node),
        None if document.is_none() => {
            *document = Some(XmlDocument {
                root_name: name,
                root: node,
            });
        }
        None => bail!(
            ErrorKind::MalformedPayload,
            "XML payload has more than one root element"
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_and_text_follow_key_conventions() {
        let document = parse_document(
            r#"<response success="true"><message id="7" type="reply">hello <b>there</b></message></response>"#,
        )
        .unwrap();

        assert_eq!(document.root_name, "response");
        assert_eq!(document.root.get("@success").and_then(XmlNode::as_text), Some("true"));

        let message = document.root.get("message").unwrap();
        assert_eq!(message.get("@id").and_then(XmlNode::as_text), Some("7"));
        assert_eq!(message.get(TEXT_KEY).and_then(XmlNode::as_text), Some("hello"));
        assert_eq!(message.get("b").and_then(XmlNode::as_text), Some("there"));
    }

    #[test]
    fn repeated_children_become_a_list() {
        let document =
            parse_document("<response><ids><id>1</id><id>2</id><id>3</id></ids></response>")
                .unwrap();

        let ids = document.root.get("ids").and_then(|ids| ids.get("id")).unwrap();

        assert_eq!(
            ids,
            &XmlNode::List(vec![
                XmlNode::Text("1".to_string()),
                XmlNode::Text("2".to_string()),
                XmlNode::Text("3".to_string()),
            ])
        );
    }

    #[test]
    fn empty_elements_and_entities() {
        let document =
            parse_document("<?xml version=\"1.0\"?><response><a/><b>x &amp; y</b></response>")
                .unwrap();

        assert_eq!(document.root.get("a"), Some(&XmlNode::Empty));
        assert_eq!(document.root.get("b").and_then(XmlNode::as_text), Some("x & y"));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        for payload in [
            "",
            "not xml at all",
            "<response><messages></response>",
            "<response><messages>",
            "<a/><b/>",
        ] {
            let err = parse_document(payload).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedPayload, "payload: {payload}");
        }
    }

    #[test]
    fn nested_elements_convert_to_json() {
        let document =
            parse_document(r#"<response><tag id="1">a</tag><tag id="2">b</tag></response>"#)
                .unwrap();

        let json = document.root.get("tag").unwrap().to_json();

        assert_eq!(
            json,
            serde_json::json!([{"@id": "1", "#text": "a"}, {"@id": "2", "#text": "b"}])
        );
    }
}
