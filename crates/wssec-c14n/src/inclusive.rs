#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 (C14N 1.0).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! Every in-scope namespace is rendered on the first visible element that
//! sees it. For a document subset, `xml:*` attributes of invisible
//! ancestors are carried down to the apex element.

use crate::escape;
use crate::render::{self, Attr, NsDecl};
use std::collections::BTreeMap;
use wssec_core::{ns, Error};
use wssec_xml::{Document, NodeId, NodeKind, NodeSet};

/// Canonicalize a document using Inclusive C14N 1.0.
pub fn canonicalize(
    doc: &Document,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    let ctx = C14nContext {
        doc,
        with_comments,
        node_set,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct C14nContext<'a> {
    doc: &'a Document,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
}

impl<'a> C14nContext<'a> {
    fn is_visible(&self, id: NodeId) -> bool {
        self.node_set.map_or(true, |ns| ns.contains_id(id))
    }

    fn process_node(
        &self,
        id: NodeId,
        output: &mut Vec<u8>,
        inherited_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        match self.doc.node_kind(id) {
            Some(NodeKind::Document) => {
                for child in self.doc.children(id) {
                    self.process_node(child, output, inherited_ns)?;
                }
            }
            Some(NodeKind::Element(_)) => self.process_element(id, output, inherited_ns)?,
            Some(NodeKind::Text(text)) => {
                if self.is_visible(id) {
                    output.extend_from_slice(escape::escape_text(text).as_bytes());
                }
            }
            Some(NodeKind::Comment(text)) => {
                if self.with_comments && self.is_visible(id) {
                    render::render_misc(self.doc, id, &render::comment_body(text), output);
                }
            }
            Some(NodeKind::ProcessingInstruction(pi)) => {
                if self.is_visible(id) {
                    let body = render::pi_body(&pi.target, pi.data.as_deref());
                    render::render_misc(self.doc, id, &body, output);
                }
            }
            None => {}
        }
        Ok(())
    }

    fn process_element(
        &self,
        id: NodeId,
        output: &mut Vec<u8>,
        inherited_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if !self.is_visible(id) {
            for child in self.doc.children(id) {
                self.process_node(child, output, inherited_ns)?;
            }
            return Ok(());
        }

        let current_ns = self.doc.in_scope_namespaces(id);

        let mut ns_decls: Vec<NsDecl> = current_ns
            .iter()
            .filter(|(prefix, uri)| prefix.as_str() != "xml" && inherited_ns.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl {
                prefix: prefix.clone(),
                uri: uri.clone(),
            })
            .collect();
        if !current_ns.contains_key("") && inherited_ns.get("").is_some_and(|u| !u.is_empty()) {
            ns_decls.push(NsDecl {
                prefix: String::new(),
                uri: String::new(),
            });
        }
        ns_decls.sort();

        let mut attrs = render::element_attrs(self.doc, id);
        if self.node_set.is_some() {
            let parent_hidden = self
                .doc
                .parent(id)
                .map_or(true, |p| !self.doc.is_element(p) || !self.is_visible(p));
            if parent_hidden {
                let extra = self.collect_inherited_xml_attrs(id, &attrs);
                attrs.extend(extra);
                attrs.sort();
            }
        }

        let elem_name = render::qualified_element_name(self.doc, id);

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for ns_decl in &ns_decls {
            output.extend_from_slice(ns_decl.render().as_bytes());
        }
        for attr in &attrs {
            output.extend_from_slice(attr.render().as_bytes());
        }
        output.push(b'>');

        let mut child_ns = inherited_ns.clone();
        for ns_decl in &ns_decls {
            child_ns.insert(ns_decl.prefix.clone(), ns_decl.uri.clone());
        }

        for child in self.doc.children(id) {
            self.process_node(child, output, &child_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }

    /// `xml:*` attributes of ancestors, nearest first, that the element
    /// does not set itself.
    fn collect_inherited_xml_attrs(&self, id: NodeId, existing: &[Attr]) -> Vec<Attr> {
        let mut inherited: BTreeMap<String, String> = BTreeMap::new();
        let mut current = self.doc.parent(id);
        while let Some(ancestor) = current {
            if let Some(elem) = self.doc.element(ancestor) {
                for attr in &elem.attributes {
                    if attr.name.namespace_uri.as_deref() == Some(ns::XML) {
                        inherited
                            .entry(attr.name.local_name.clone())
                            .or_insert_with(|| attr.value.clone());
                    }
                }
            }
            current = self.doc.parent(ancestor);
        }

        inherited
            .into_iter()
            .filter(|(name, _)| {
                !existing
                    .iter()
                    .any(|a| a.ns_uri == ns::XML && a.local_name == *name)
            })
            .map(|(name, value)| Attr {
                ns_uri: ns::XML.to_owned(),
                qualified_name: format!("xml:{name}"),
                local_name: name,
                value,
            })
            .collect()
    }
}
