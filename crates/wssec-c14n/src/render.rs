#![forbid(unsafe_code)]

//! Shared rendering pieces for canonical output: namespace declarations,
//! attributes in canonical order, and document-level comment/PI framing.

use crate::escape;
use std::cmp::Ordering;
use wssec_core::ns;
use wssec_xml::{Document, NodeId, NodeKind};

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// `""` for the default namespace.
    pub prefix: String,
    pub uri: String,
}

impl NsDecl {
    pub fn render(&self) -> String {
        if self.prefix.is_empty() {
            format!(" xmlns=\"{}\"", escape::escape_attr(&self.uri))
        } else {
            format!(" xmlns:{}=\"{}\"", self.prefix, escape::escape_attr(&self.uri))
        }
    }
}

impl Ord for NsDecl {
    // Default namespace first, then by prefix.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// `""` for no namespace.
    pub ns_uri: String,
    pub local_name: String,
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    pub fn render(&self) -> String {
        format!(" {}=\"{}\"", self.qualified_name, escape::escape_attr(&self.value))
    }
}

impl Ord for Attr {
    // Un-namespaced attributes first, then by (namespace URI, local name).
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then(self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The element's attributes in canonical order.
pub fn element_attrs(doc: &Document, id: NodeId) -> Vec<Attr> {
    let mut attrs: Vec<Attr> = doc
        .element(id)
        .map(|elem| {
            elem.attributes
                .iter()
                .map(|a| {
                    let ns_uri = a.name.namespace_uri.clone().unwrap_or_default();
                    let qualified_name = if ns_uri == ns::XML {
                        format!("xml:{}", a.name.local_name)
                    } else {
                        a.name.qualified()
                    };
                    Attr {
                        ns_uri,
                        local_name: a.name.local_name.clone(),
                        qualified_name,
                        value: a.value.clone(),
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    attrs.sort();
    attrs
}

/// Prefixes visibly used by the element name and its attributes.
pub fn used_prefixes(doc: &Document, id: NodeId) -> Vec<String> {
    let Some(elem) = doc.element(id) else {
        return Vec::new();
    };
    let mut out = vec![elem.name.prefix.clone().unwrap_or_default()];
    for attr in &elem.attributes {
        if attr.name.namespace_uri.as_deref() == Some(ns::XML) {
            continue;
        }
        if let Some(p) = &attr.name.prefix {
            if !p.is_empty() {
                out.push(p.clone());
            }
        }
    }
    out
}

pub fn qualified_element_name(doc: &Document, id: NodeId) -> String {
    doc.element(id).map(|e| e.name.qualified()).unwrap_or_default()
}

fn parent_is_document(doc: &Document, id: NodeId) -> bool {
    doc.parent(id)
        .is_some_and(|p| matches!(doc.node_kind(p), Some(NodeKind::Document)))
}

fn has_preceding_element(doc: &Document, id: NodeId) -> bool {
    let mut sib = doc.previous_sibling(id);
    while let Some(s) = sib {
        if doc.is_element(s) {
            return true;
        }
        sib = doc.previous_sibling(s);
    }
    false
}

fn has_following_element(doc: &Document, id: NodeId) -> bool {
    let mut sib = doc.next_sibling(id);
    while let Some(s) = sib {
        if doc.is_element(s) {
            return true;
        }
        sib = doc.next_sibling(s);
    }
    false
}

/// Emit a comment or PI. Outside the document element these are
/// separated from it by a newline.
pub fn render_misc(doc: &Document, id: NodeId, body: &[u8], output: &mut Vec<u8>) {
    let top_level = parent_is_document(doc, id);
    if top_level && has_preceding_element(doc, id) {
        output.push(b'\n');
    }
    output.extend_from_slice(body);
    if top_level && has_following_element(doc, id) {
        output.push(b'\n');
    }
}

pub fn comment_body(text: &str) -> Vec<u8> {
    format!("<!--{text}-->").into_bytes()
}

pub fn pi_body(target: &str, data: Option<&str>) -> Vec<u8> {
    match data {
        Some(d) if !d.is_empty() => format!("<?{target} {}?>", escape::escape_pi(d)).into_bytes(),
        _ => format!("<?{target}?>").into_bytes(),
    }
}
