//! A small namespace-aware XML element tree.
//!
//! `quick_xml`'s serde support matches element names by their literal
//! serialized form, which breaks the moment an IdP chooses a different
//! namespace prefix than the one a `#[serde(rename = "...")]` hard-codes.
//! Real IdP metadata and responses vary prefixes freely (`md:`, `saml2:`,
//! no prefix with a default `xmlns`, ...), so the wire schema and the
//! signature verifier both walk this tree instead, matching elements by
//! resolved namespace URI + local name the way `encoding/xml`'s
//! namespace-qualified tags do in the Go source this was distilled from.
//!
//! Parsing is lenient: unknown attributes and child elements are kept but
//! never required, so schema extensions an IdP adds are not fatal.

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use crate::error::{SamlError, SamlResult};

pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const SAML_ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
pub const SAML_PROTOCOL_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
pub const SAML_METADATA_NS: &str = "urn:oasis:names:tc:SAML:2.0:metadata";

/// One parsed element, with its namespace resolved.
#[derive(Debug, Clone)]
pub struct Element {
    pub local_name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<Attr>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct Attr {
    pub local_name: String,
    pub namespace: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    /// Direct child elements matching `(namespace, local_name)`.
    pub fn children_ns<'a>(&'a self, ns: &'a str, local: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter_map(move |n| match n {
            Node::Element(e) if e.namespace.as_deref() == Some(ns) && e.local_name == local => Some(e),
            _ => None,
        })
    }

    /// First direct child element matching `(namespace, local_name)`.
    pub fn child_ns<'a>(&'a self, ns: &'a str, local: &'a str) -> Option<&'a Element> {
        self.children_ns(ns, local).next()
    }

    /// Attribute value, ignoring namespace (the overwhelming majority of
    /// SAML attributes — `ID`, `Value`, `Binding`, `Location`, ... — are
    /// unprefixed).
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local_name == local)
            .map(|a| a.value.as_str())
    }

    /// Concatenation of this element's direct text-node children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// `true` if this element is `(namespace, local_name)`.
    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.namespace.as_deref() == Some(ns) && self.local_name == local
    }
}

/// Parses a complete document, returning its root element.
pub fn parse(xml: &[u8]) -> SamlResult<Element> {
    let mut reader = NsReader::from_reader(xml);
    reader.trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (resolved, event) = reader
            .read_resolved_event()
            .map_err(|e| SamlError::Encoding(format!("parsing xml: {e}")))?;
        let namespace = match resolved {
            ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.into_inner()).into_owned()),
            _ => None,
        };
        match event {
            Event::Start(start) => {
                let el = build_element(&reader, namespace, &start)?;
                stack.push(el);
            }
            Event::Empty(start) => {
                let el = build_element(&reader, namespace, &start)?;
                push_child(&mut stack, &mut root, el);
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| SamlError::Encoding("unbalanced xml".to_string()))?;
                push_child(&mut stack, &mut root, el);
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| SamlError::Encoding(format!("parsing xml text: {e}")))?
                    .into_owned();
                if let Some(parent) = stack.last_mut() {
                    if !text.is_empty() {
                        parent.children.push(Node::Text(text));
                    }
                }
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or_else(|| SamlError::Encoding("missing xml document".to_string()))
}

fn push_child(stack: &mut [Element], root: &mut Option<Element>, el: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None => *root = Some(el),
    }
}

fn build_element<R>(
    reader: &NsReader<R>,
    namespace: Option<String>,
    start: &quick_xml::events::BytesStart<'_>,
) -> SamlResult<Element> {
    let (_, local) = reader.resolve_element(start.name());
    let local_name = String::from_utf8_lossy(local.into_inner()).into_owned();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| SamlError::Encoding(format!("parsing xml attribute: {e}")))?;
        let key = attr.key;
        let raw = String::from_utf8_lossy(key.as_ref()).into_owned();
        if raw == "xmlns" || raw.starts_with("xmlns:") {
            continue;
        }
        let (resolved_attr, local_attr) = reader.resolve_attribute(key);
        let namespace = match resolved_attr {
            ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.into_inner()).into_owned()),
            _ => None,
        };
        let value = attr
            .decode_and_unescape_value(reader)
            .map_err(|e| SamlError::Encoding(format!("parsing xml attribute value: {e}")))?
            .into_owned();
        attributes.push(Attr {
            local_name: String::from_utf8_lossy(local_attr.into_inner()).into_owned(),
            namespace,
            value,
        });
    }

    Ok(Element {
        local_name,
        namespace,
        attributes,
        children: Vec::new(),
    })
}

/// Serializes a tree back to XML bytes verbatim (no enveloped-signature
/// stripping, no attribute sorting) — used to turn a hand-built `Element`
/// into wire bytes for tests exercising [`crate::signature`].
#[cfg(test)]
pub(crate) fn serialize(el: &Element) -> Vec<u8> {
    let mut buf = Vec::new();
    write_serialized(el, &mut buf);
    buf
}

#[cfg(test)]
fn write_serialized(el: &Element, buf: &mut Vec<u8>) {
    buf.push(b'<');
    buf.extend_from_slice(el.local_name.as_bytes());
    if let Some(ns) = &el.namespace {
        buf.extend_from_slice(b" xmlns=\"");
        buf.extend_from_slice(ns.as_bytes());
        buf.push(b'"');
    }
    for a in &el.attributes {
        buf.push(b' ');
        buf.extend_from_slice(a.local_name.as_bytes());
        buf.extend_from_slice(b"=\"");
        buf.extend_from_slice(a.value.as_bytes());
        buf.push(b'"');
    }
    buf.push(b'>');
    for child in &el.children {
        match child {
            Node::Element(ce) => write_serialized(ce, buf),
            Node::Text(t) => buf.extend_from_slice(t.as_bytes()),
        }
    }
    buf.extend_from_slice(b"</");
    buf.extend_from_slice(el.local_name.as_bytes());
    buf.push(b'>');
}
