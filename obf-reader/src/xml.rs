//! Minimal XML element tree
//!
//! The file metadata block and many tag dictionary values hold XML documents.
//! This module builds a small owned tree from `quick-xml` events, supports
//! slash-separated path lookups and serializes the tree back to compact XML.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Errors raised while parsing an XML document
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("Malformed XML: {0}")]
    Malformed(String),

    #[error("XML document has no root element")]
    NoRoot,

    #[error("XML document ended with {0} unclosed elements")]
    Unclosed(usize),
}

/// An XML element with its attributes, text content and children
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Concatenated character data directly inside this element
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Parse a complete document and return its root element
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    ensure_single_root(&root)?;
                    stack.push(element_from_start(&e)?);
                }
                Ok(Event::Empty(e)) => {
                    ensure_single_root(&root)?;
                    let element = element_from_start(&e)?;
                    close_element(element, &mut stack, &mut root);
                }
                Ok(Event::End(_)) => {
                    // quick-xml already verified that the end tag matches
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::Malformed("unexpected end tag".to_string()))?;
                    close_element(element, &mut stack, &mut root);
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| XmlError::Malformed(e.to_string()))?;
                    match stack.last_mut() {
                        Some(current) => current.text.push_str(&text),
                        None => {
                            return Err(XmlError::Malformed(
                                "text outside of the root element".to_string(),
                            ))
                        }
                    }
                }
                Ok(Event::CData(c)) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    }
                }
                Ok(Event::Eof) => break,
                // Declarations, comments, processing instructions, doctype
                Ok(_) => {}
                Err(e) => return Err(XmlError::Malformed(e.to_string())),
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Unclosed(stack.len()));
        }
        root.ok_or(XmlError::NoRoot)
    }

    /// Value of an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a slash-separated path of child names ("a/b/c"), starting below this element
    pub fn find(&self, path: &str) -> Option<&XmlElement> {
        path.split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .try_fold(self, |element, segment| element.child(segment))
    }

    /// Serialize without any formatting whitespace
    pub fn to_compact_string(&self, xml_declaration: bool) -> String {
        let mut out = String::new();
        if xml_declaration {
            out.push_str("<?xml version='1.0' encoding='utf-8'?>");
        }
        self.write_compact(&mut out);
        out
    }

    fn write_compact(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.text.is_empty() && self.children.is_empty() {
            out.push_str(" />");
            return;
        }
        out.push('>');
        out.push_str(&escape(self.text.as_str()));
        for child in &self.children {
            child.write_compact(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn ensure_single_root(root: &Option<XmlElement>) -> Result<(), XmlError> {
    if root.is_some() {
        return Err(XmlError::Malformed(
            "more than one root element".to_string(),
        ));
    }
    Ok(())
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let attributes = start
        .attributes()
        .map(|attr_result| {
            let attr = attr_result.map_err(|e| {
                XmlError::Malformed(format!("Failed to parse XML attribute: {}", e))
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| XmlError::Malformed(format!("Failed to decode XML value: {}", e)))?
                .into_owned();
            Ok((key, value))
        })
        .collect::<Result<Vec<_>, XmlError>>()?;

    Ok(XmlElement {
        name,
        attributes,
        ..XmlElement::default()
    })
}

fn close_element(element: XmlElement, stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}
