#![forbid(unsafe_code)]

//! Arena-backed XML document.
//!
//! The input is parsed once with `roxmltree` and copied into an arena of
//! nodes addressed by [`NodeId`]. Unlike the borrowed `roxmltree` tree the
//! arena can be changed in place: subtrees are detached and decrypted
//! fragments are spliced in, while every previously handed-out `NodeId`
//! keeps pointing at the same node.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use wssec_core::{ns, Error};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one parsed document instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a node in a [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// A namespace-qualified name as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    pub namespace_uri: Option<String>,
    pub prefix: Option<String>,
    pub local_name: String,
}

impl QName {
    /// `prefix:local` or just `local`.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) if !p.is_empty() => format!("{p}:{}", self.local_name),
            _ => self.local_name.clone(),
        }
    }

    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace_uri.as_deref() == Some(namespace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// Element payload: name, attributes and the namespace declarations
/// written on this element (prefix `""` is the default namespace).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub namespace_declarations: Vec<(String, String)>,
}

impl Element {
    /// Value of the un-namespaced attribute `local_name`.
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace_uri.is_none() && a.name.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Value of the attribute `{namespace}local_name`.
    pub fn attribute_ns(&self, namespace: &str, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.is(namespace, local_name))
            .map(|a| a.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingInstruction {
    pub target: String,
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
    ProcessingInstruction(ProcessingInstruction),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A mutable XML document.
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    nodes: Vec<NodeData>,
    generation: u64,
}

impl Document {
    /// Parse a document. DTDs are rejected.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let parsed = roxmltree::Document::parse(text).map_err(|e| Error::XmlParse(e.to_string()))?;
        let mut doc = Self {
            id: DocumentId::next(),
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            generation: 0,
        };
        let root = doc.root();
        for child in parsed.root().children() {
            if let Some(id) = doc.import(text, child) {
                doc.attach(root, id, None);
            }
        }
        Ok(doc)
    }

    /// Parse a document from bytes, which must be UTF-8.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?;
        Self::parse(text)
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Bumped by every mutation. Derived indexes compare against it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ── Navigation ───────────────────────────────────────────────────

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .find(|c| self.element(*c).is_some())
    }

    pub fn node_kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0).map(|n| &n.kind)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.node_kind(id) {
            Some(NodeKind::Element(e)) => Some(e),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).filter(move |c| self.is_element(*c))
    }

    /// All descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).collect();
        stack.reverse();
        while let Some(n) = stack.pop() {
            out.push(n);
            let mark = stack.len();
            stack.extend(self.children(n));
            stack[mark..].reverse();
        }
        out
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (siblings, pos) = self.position_in_parent(id)?;
        pos.checked_sub(1).map(|p| siblings[p])
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (siblings, pos) = self.position_in_parent(id)?;
        siblings.get(pos + 1).copied()
    }

    fn position_in_parent(&self, id: NodeId) -> Option<(&[NodeId], usize)> {
        let parent = self.parent(id)?;
        let siblings = self.nodes.get(parent.0)?.children.as_slice();
        let pos = siblings.iter().position(|c| *c == id)?;
        Some((siblings, pos))
    }

    /// True if `id` is still reachable from the document root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(n) = current {
            if n == self.root() {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// True if `ancestor` is `node` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    // ── Element helpers ──────────────────────────────────────────────

    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.name.local_name.as_str())
    }

    pub fn namespace_uri(&self, id: NodeId) -> Option<&str> {
        self.element(id).and_then(|e| e.name.namespace_uri.as_deref())
    }

    pub fn is_named(&self, id: NodeId, namespace: &str, local_name: &str) -> bool {
        self.element(id).is_some_and(|e| e.name.is(namespace, local_name))
    }

    pub fn attribute(&self, id: NodeId, local_name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attribute(local_name))
    }

    pub fn attribute_ns(&self, id: NodeId, namespace: &str, local_name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attribute_ns(namespace, local_name))
    }

    /// First attribute `local_name` in any of `namespaces`.
    pub fn attribute_in(&self, id: NodeId, namespaces: &[&str], local_name: &str) -> Option<&str> {
        namespaces
            .iter()
            .find_map(|n| self.attribute_ns(id, n, local_name))
    }

    /// First child element named `{namespace}local_name`.
    pub fn find_child(&self, id: NodeId, namespace: &str, local_name: &str) -> Option<NodeId> {
        self.child_elements(id)
            .find(|c| self.is_named(*c, namespace, local_name))
    }

    pub fn find_children(&self, id: NodeId, namespace: &str, local_name: &str) -> Vec<NodeId> {
        self.child_elements(id)
            .filter(|c| self.is_named(*c, namespace, local_name))
            .collect()
    }

    /// First descendant element named `{namespace}local_name`.
    pub fn find_descendant(&self, id: NodeId, namespace: &str, local_name: &str) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|d| self.is_named(*d, namespace, local_name))
    }

    /// The first text child, like `roxmltree::Node::text`.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.children(id).find_map(|c| match self.node_kind(c) {
            Some(NodeKind::Text(t)) => Some(t.as_str()),
            _ => None,
        })
    }

    /// Concatenation of every descendant text node.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for d in self.descendants(id) {
            if let Some(NodeKind::Text(t)) = self.node_kind(d) {
                out.push_str(t);
            }
        }
        out
    }

    /// Namespace bindings in scope at `id`, keyed by prefix (`""` for the
    /// default namespace). Undeclared prefixes are dropped.
    pub fn in_scope_namespaces(&self, id: NodeId) -> BTreeMap<String, String> {
        let mut levels = Vec::new();
        let mut current = Some(id);
        while let Some(n) = current {
            if let Some(elem) = self.element(n) {
                levels.push(&elem.namespace_declarations);
            }
            current = self.parent(n);
        }
        let mut result = BTreeMap::new();
        for level in levels.into_iter().rev() {
            for (prefix, uri) in level {
                if uri.is_empty() {
                    result.remove(prefix);
                } else {
                    result.insert(prefix.clone(), uri.clone());
                }
            }
        }
        result
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Detach `id` (and its subtree) from its parent.
    pub fn remove(&mut self, id: NodeId) -> Result<(), Error> {
        let parent = self
            .parent(id)
            .ok_or_else(|| Error::Processor(format!("node {} has no parent", id.0)))?;
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.retain(|c| *c != id);
        }
        if let Some(n) = self.nodes.get_mut(id.0) {
            n.parent = None;
        }
        self.generation += 1;
        Ok(())
    }

    /// Replace `id` with the nodes parsed from `fragment`.
    ///
    /// The fragment is parsed in the namespace context of `id`'s parent, so
    /// prefixes declared on ancestors resolve as they did in the original
    /// document. Returns the top-level nodes that were inserted.
    pub fn replace_with_fragment(&mut self, id: NodeId, fragment: &str) -> Result<Vec<NodeId>, Error> {
        let parent = self
            .parent(id)
            .ok_or_else(|| Error::Processor(format!("node {} has no parent", id.0)))?;
        let inserted = self.insert_fragment(parent, Some(id), fragment)?;
        self.remove(id)?;
        Ok(inserted)
    }

    /// Parse `fragment` in the context of `parent` and insert its nodes
    /// before `before` (or at the end when `None`).
    pub fn insert_fragment(
        &mut self,
        parent: NodeId,
        before: Option<NodeId>,
        fragment: &str,
    ) -> Result<Vec<NodeId>, Error> {
        let wrapped = self.wrap_fragment(parent, strip_xml_declaration(fragment));
        let parsed = roxmltree::Document::parse(&wrapped)
            .map_err(|e| Error::XmlParse(format!("decrypted fragment: {e}")))?;
        let wrapper = parsed.root_element();

        let mut index = match before {
            Some(b) => self
                .position_in_parent(b)
                .map(|(_, pos)| pos)
                .ok_or_else(|| Error::Processor("insertion point is not a child".into()))?,
            None => self.children(parent).count(),
        };

        let mut inserted = Vec::new();
        for child in wrapper.children() {
            if let Some(new_id) = self.import(&wrapped, child) {
                self.attach(parent, new_id, Some(index));
                index += 1;
                inserted.push(new_id);
            }
        }
        self.generation += 1;
        Ok(inserted)
    }

    fn wrap_fragment(&self, parent: NodeId, fragment: &str) -> String {
        let mut out = String::from("<wssec-fragment");
        for (prefix, uri) in self.in_scope_namespaces(parent) {
            if prefix.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(&prefix);
                out.push_str("=\"");
            }
            out.push_str(&crate::writer::escape_attr(&uri));
            out.push('"');
        }
        out.push('>');
        out.push_str(fragment);
        out.push_str("</wssec-fragment>");
        out
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        if let Some(p) = self.nodes.get_mut(parent.0) {
            match index {
                Some(i) if i <= p.children.len() => p.children.insert(i, child),
                _ => p.children.push(child),
            }
        }
        if let Some(c) = self.nodes.get_mut(child.0) {
            c.parent = Some(parent);
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Copy a `roxmltree` subtree into the arena, returning the detached root.
    fn import(&mut self, source: &str, node: roxmltree::Node<'_, '_>) -> Option<NodeId> {
        let kind = match node.node_type() {
            roxmltree::NodeType::Element => NodeKind::Element(convert_element(source, node)),
            roxmltree::NodeType::Text => NodeKind::Text(node.text().unwrap_or("").to_owned()),
            roxmltree::NodeType::Comment => NodeKind::Comment(node.text().unwrap_or("").to_owned()),
            roxmltree::NodeType::PI => {
                let pi = node.pi()?;
                NodeKind::ProcessingInstruction(ProcessingInstruction {
                    target: pi.target.to_owned(),
                    data: pi.value.map(str::to_owned),
                })
            }
            roxmltree::NodeType::Root => return None,
        };
        let id = self.push(kind);
        for child in node.children() {
            if let Some(child_id) = self.import(source, child) {
                self.attach(id, child_id, None);
            }
        }
        Some(id)
    }
}

fn convert_element(source: &str, node: roxmltree::Node<'_, '_>) -> Element {
    let tag = node.tag_name();
    let name = QName {
        namespace_uri: tag.namespace().map(str::to_owned),
        prefix: element_prefix(source, node),
        local_name: tag.name().to_owned(),
    };

    let attributes = node
        .attributes()
        .map(|a| {
            let prefix = source
                .get(a.range_qname())
                .and_then(|q| q.split_once(':'))
                .map(|(p, _)| p.to_owned());
            Attribute {
                name: QName {
                    namespace_uri: a.namespace().map(str::to_owned),
                    prefix,
                    local_name: a.name().to_owned(),
                },
                value: a.value().to_owned(),
            }
        })
        .collect();

    // roxmltree reports in-scope bindings; keep the ones introduced here.
    let inherited: Vec<(String, String)> = node
        .parent_element()
        .map(|p| {
            p.namespaces()
                .map(|n| (n.name().unwrap_or("").to_owned(), n.uri().to_owned()))
                .collect()
        })
        .unwrap_or_default();
    let mut namespace_declarations = Vec::new();
    let mut has_default = false;
    for n in node.namespaces() {
        let prefix = n.name().unwrap_or("");
        if prefix.is_empty() {
            has_default = true;
        }
        if prefix == "xml" || n.uri() == ns::XML {
            continue;
        }
        if !inherited.iter().any(|(p, u)| p == prefix && u == n.uri()) {
            namespace_declarations.push((prefix.to_owned(), n.uri().to_owned()));
        }
    }
    if !has_default && inherited.iter().any(|(p, _)| p.is_empty()) {
        namespace_declarations.push((String::new(), String::new()));
    }

    Element {
        name,
        attributes,
        namespace_declarations,
    }
}

fn element_prefix(source: &str, node: roxmltree::Node<'_, '_>) -> Option<String> {
    let rest = source.get(node.range().start + 1..)?;
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    rest[..end].split_once(':').map(|(p, _)| p.to_owned())
}

fn strip_xml_declaration(fragment: &str) -> &str {
    let trimmed = fragment.trim_start();
    if trimmed.starts_with("<?xml ") {
        if let Some(end) = trimmed.find("?>") {
            return &trimmed[end + 2..];
        }
    }
    fragment
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Header/><s:Body xmlns:a="urn:a"><a:Op a:x="1" y="2">hi</a:Op></s:Body></s:Envelope>"#;

    #[test]
    fn test_parse_prefixes_and_declarations() {
        let doc = Document::parse(SAMPLE).unwrap();
        let env = doc.root_element().unwrap();
        let e = doc.element(env).unwrap();
        assert_eq!(e.name.prefix.as_deref(), Some("s"));
        assert_eq!(e.name.local_name, "Envelope");
        assert_eq!(e.namespace_declarations.len(), 1);

        let body = doc.find_child(env, ns::SOAP_1_1, "Body").unwrap();
        let op = doc.child_elements(body).next().unwrap();
        let op_elem = doc.element(op).unwrap();
        assert_eq!(op_elem.name.qualified(), "a:Op");
        assert_eq!(op_elem.attribute("y"), Some("2"));
        assert_eq!(op_elem.attribute_ns("urn:a", "x"), Some("1"));
        assert_eq!(op_elem.attributes[0].name.prefix.as_deref(), Some("a"));
        assert!(op_elem.namespace_declarations.is_empty());
        assert_eq!(doc.text(op), Some("hi"));
    }

    #[test]
    fn test_siblings_and_descendants() {
        let doc = Document::parse("<r><a/><b><c/></b><d/></r>").unwrap();
        let r = doc.root_element().unwrap();
        let kids: Vec<_> = doc.children(r).collect();
        assert_eq!(doc.next_sibling(kids[0]), Some(kids[1]));
        assert_eq!(doc.previous_sibling(kids[1]), Some(kids[0]));
        assert_eq!(doc.previous_sibling(kids[0]), None);
        let names: Vec<_> = doc
            .descendants(r)
            .into_iter()
            .filter_map(|d| doc.local_name(d))
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_remove_detaches_and_bumps_generation() {
        let mut doc = Document::parse("<r><a/><b/></r>").unwrap();
        let r = doc.root_element().unwrap();
        let a = doc.child_elements(r).next().unwrap();
        let before = doc.generation();
        doc.remove(a).unwrap();
        assert!(!doc.is_attached(a));
        assert_eq!(doc.child_elements(r).count(), 1);
        assert!(doc.generation() > before);
    }

    #[test]
    fn test_replace_with_fragment_uses_context_namespaces() {
        let mut doc =
            Document::parse(r#"<r xmlns:p="urn:p"><p:slot/><tail/></r>"#).unwrap();
        let r = doc.root_element().unwrap();
        let slot = doc.child_elements(r).next().unwrap();
        let new = doc
            .replace_with_fragment(slot, r#"<p:item v="1">x</p:item>"#)
            .unwrap();
        assert_eq!(new.len(), 1);
        assert!(doc.is_named(new[0], "urn:p", "item"));
        assert!(doc.element(new[0]).unwrap().namespace_declarations.is_empty());
        let names: Vec<_> = doc
            .child_elements(r)
            .filter_map(|c| doc.local_name(c))
            .collect();
        assert_eq!(names, vec!["item", "tail"]);
        assert!(!doc.is_attached(slot));
    }

    #[test]
    fn test_default_namespace_undeclaration() {
        let doc = Document::parse(r#"<r xmlns="urn:d"><c xmlns=""/></r>"#).unwrap();
        let r = doc.root_element().unwrap();
        let c = doc.child_elements(r).next().unwrap();
        assert_eq!(doc.namespace_uri(c), None);
        assert!(doc.in_scope_namespaces(c).is_empty());
    }

    #[test]
    fn test_documents_have_distinct_ids() {
        let a = Document::parse("<a/>").unwrap();
        let b = Document::parse("<a/>").unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_dtd_rejected() {
        let err = Document::parse("<!DOCTYPE r [<!ENTITY e 'x'>]><r>&e;</r>").unwrap_err();
        assert!(matches!(err, Error::XmlParse(_)));
    }
}
