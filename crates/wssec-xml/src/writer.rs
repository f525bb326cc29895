#![forbid(unsafe_code)]

//! Serialization of an arena [`Document`] back to XML text.
//!
//! Output keeps the prefixes and namespace declarations recorded at parse
//! time. It is not canonical; use `wssec-c14n` for digest input.

use crate::document::{Document, NodeId, NodeKind};

/// Serialize the whole document.
pub fn serialize(doc: &Document) -> String {
    let mut out = String::new();
    for child in doc.children(doc.root()) {
        write_node(doc, child, &mut out);
    }
    out
}

/// Serialize one node and its subtree.
///
/// Namespace bindings inherited from ancestors are re-declared on the
/// output root so the result parses standalone.
pub fn serialize_node(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    match doc.element(id) {
        Some(_) => {
            let inherited = doc
                .parent(id)
                .map(|p| doc.in_scope_namespaces(p))
                .unwrap_or_default();
            write_element(doc, id, &inherited, &mut out);
        }
        None => write_node(doc, id, &mut out),
    }
    out
}

fn write_node(doc: &Document, id: NodeId, out: &mut String) {
    match doc.node_kind(id) {
        Some(NodeKind::Element(_)) => write_element(doc, id, &Default::default(), out),
        Some(NodeKind::Text(t)) => out.push_str(&escape_text(t)),
        Some(NodeKind::Comment(c)) => {
            out.push_str("<!--");
            out.push_str(c);
            out.push_str("-->");
        }
        Some(NodeKind::ProcessingInstruction(pi)) => {
            out.push_str("<?");
            out.push_str(&pi.target);
            if let Some(data) = &pi.data {
                out.push(' ');
                out.push_str(data);
            }
            out.push_str("?>");
        }
        Some(NodeKind::Document) => {
            for child in doc.children(id) {
                write_node(doc, child, out);
            }
        }
        None => {}
    }
}

fn write_element(
    doc: &Document,
    id: NodeId,
    extra_ns: &std::collections::BTreeMap<String, String>,
    out: &mut String,
) {
    let Some(elem) = doc.element(id) else {
        return;
    };
    let name = elem.name.qualified();
    out.push('<');
    out.push_str(&name);
    for (prefix, uri) in extra_ns {
        if elem.namespace_declarations.iter().any(|(p, _)| p == prefix) {
            continue;
        }
        write_ns(prefix, uri, out);
    }
    for (prefix, uri) in &elem.namespace_declarations {
        write_ns(prefix, uri, out);
    }
    for attr in &elem.attributes {
        out.push(' ');
        out.push_str(&attr.name.qualified());
        out.push_str("=\"");
        out.push_str(&escape_attr(&attr.value));
        out.push('"');
    }
    if doc.children(id).next().is_none() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in doc.children(id) {
        write_node(doc, child, out);
    }
    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

fn write_ns(prefix: &str, uri: &str, out: &mut String) {
    if prefix.is_empty() {
        out.push_str(" xmlns=\"");
    } else {
        out.push_str(" xmlns:");
        out.push_str(prefix);
        out.push_str("=\"");
    }
    out.push_str(&escape_attr(uri));
    out.push('"');
}

pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            '\t' => out.push_str("&#x9;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_round_trip() {
        let src = r#"<a:r xmlns:a="urn:a" k="v&amp;"><a:c>t &lt; u</a:c><e/><!--n--></a:r>"#;
        let doc = Document::parse(src).unwrap();
        assert_eq!(serialize(&doc), src);
    }

    #[test]
    fn test_serialize_node_redeclares_inherited() {
        let doc = Document::parse(r#"<a:r xmlns:a="urn:a"><a:c/></a:r>"#).unwrap();
        let r = doc.root_element().unwrap();
        let c = doc.child_elements(r).next().unwrap();
        assert_eq!(serialize_node(&doc, c), r#"<a:c xmlns:a="urn:a"/>"#);
    }
}
