#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! Only "visibly utilized" namespace declarations are output. A namespace
//! is visibly utilized if:
//! 1. Its prefix is used by the element's tag name, OR
//! 2. Its prefix is used by one of the element's attributes, OR
//! 3. The prefix appears in the InclusiveNamespaces PrefixList.

use crate::escape;
use crate::render::{self, NsDecl};
use std::collections::{BTreeMap, HashSet};
use wssec_core::Error;
use wssec_xml::{Document, NodeId, NodeKind, NodeSet};

/// Canonicalize using Exclusive C14N 1.0.
pub fn canonicalize(
    doc: &Document,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let prefix_set: HashSet<String> = inclusive_prefixes
        .iter()
        .map(|p| if p == "#default" { String::new() } else { p.clone() })
        .collect();
    let mut output = Vec::new();
    let ctx = ExcC14nContext {
        doc,
        with_comments,
        node_set,
        inclusive_prefixes: prefix_set,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct ExcC14nContext<'a> {
    doc: &'a Document,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: HashSet<String>,
}

impl<'a> ExcC14nContext<'a> {
    fn is_visible(&self, id: NodeId) -> bool {
        self.node_set.map_or(true, |ns| ns.contains_id(id))
    }

    fn process_node(
        &self,
        id: NodeId,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        match self.doc.node_kind(id) {
            Some(NodeKind::Document) => {
                for child in self.doc.children(id) {
                    self.process_node(child, output, rendered_ns)?;
                }
            }
            Some(NodeKind::Element(_)) => self.process_element(id, output, rendered_ns)?,
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
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if !self.is_visible(id) {
            for child in self.doc.children(id) {
                self.process_node(child, output, rendered_ns)?;
            }
            return Ok(());
        }

        let mut utilized: HashSet<String> = render::used_prefixes(self.doc, id).into_iter().collect();
        utilized.extend(self.inclusive_prefixes.iter().cloned());

        let inscope = self.doc.in_scope_namespaces(id);

        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in &utilized {
            if prefix == "xml" {
                continue;
            }
            match inscope.get(prefix) {
                Some(uri) => {
                    if rendered_ns.get(prefix) != Some(uri) {
                        ns_decls.push(NsDecl {
                            prefix: prefix.clone(),
                            uri: uri.clone(),
                        });
                    }
                }
                // Default namespace went out of scope: undeclare it.
                None if prefix.is_empty() => {
                    if rendered_ns.get("").is_some_and(|u| !u.is_empty()) {
                        ns_decls.push(NsDecl {
                            prefix: String::new(),
                            uri: String::new(),
                        });
                    }
                }
                None => {}
            }
        }
        ns_decls.sort();

        let attrs = render::element_attrs(self.doc, id);
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

        let mut child_rendered_ns = rendered_ns.clone();
        for ns_decl in &ns_decls {
            child_rendered_ns.insert(ns_decl.prefix.clone(), ns_decl.uri.clone());
        }

        for child in self.doc.children(id) {
            self.process_node(child, output, &child_rendered_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14n(xml: &str, prefixes: &[&str]) -> String {
        let doc = Document::parse(xml).unwrap();
        let prefixes: Vec<String> = prefixes.iter().map(|p| p.to_string()).collect();
        String::from_utf8(canonicalize(&doc, false, None, &prefixes).unwrap()).unwrap()
    }

    #[test]
    fn test_unused_namespaces_dropped() {
        let out = c14n(r#"<a:r xmlns:a="urn:a" xmlns:b="urn:b"><c/></a:r>"#, &[]);
        assert_eq!(out, r#"<a:r xmlns:a="urn:a"><c></c></a:r>"#);
    }

    #[test]
    fn test_inclusive_prefix_list() {
        let out = c14n(r#"<a:r xmlns:a="urn:a" xmlns:b="urn:b"/>"#, &["b"]);
        assert_eq!(out, r#"<a:r xmlns:a="urn:a" xmlns:b="urn:b"></a:r>"#);
    }

    #[test]
    fn test_attribute_prefix_is_utilized() {
        let out = c14n(
            r#"<r xmlns:wsu="urn:u"><t wsu:Id="x" b="1"/></r>"#,
            &[],
        );
        assert_eq!(out, r#"<r><t xmlns:wsu="urn:u" b="1" wsu:Id="x"></t></r>"#);
    }

    #[test]
    fn test_comments_stripped() {
        let out = c14n("<r><!--x-->y</r>", &[]);
        assert_eq!(out, "<r>y</r>");
    }

    #[test]
    fn test_subset_excludes_node() {
        let doc = Document::parse(r#"<r><keep/><drop><x/></drop></r>"#).unwrap();
        let r = doc.root_element().unwrap();
        let drop = doc.child_elements(r).nth(1).unwrap();
        let mut set = NodeSet::all(&doc);
        set.remove_subtree(drop, &doc);
        let out = canonicalize(&doc, false, Some(&set), &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "<r><keep></keep></r>");
    }
}
