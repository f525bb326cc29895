#![forbid(unsafe_code)]

//! NodeSet type for canonicalization and signature transforms.
//!
//! A `NodeSet` is the document subset a reference selects: the whole
//! document for `URI=""`, or one element subtree for `URI="#id"`, minus
//! whatever an enveloped-signature transform cuts out.

use crate::document::{Document, NodeId, NodeKind};
use std::collections::HashSet;

/// A set of document nodes identified by `NodeId`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    nodes: HashSet<usize>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node in the document, comments included.
    pub fn all(doc: &Document) -> Self {
        let root = doc.root();
        let mut nodes: HashSet<usize> = doc.descendants(root).iter().map(|n| n.index()).collect();
        nodes.insert(root.index());
        Self { nodes }
    }

    /// Every node except comments. `URI=""` selects this.
    pub fn all_without_comments(doc: &Document) -> Self {
        let mut set = Self::new();
        collect_subtree(doc.root(), doc, &mut set.nodes, false);
        set
    }

    /// The subtree rooted at `root_id`, without comments.
    pub fn tree_without_comments(root_id: NodeId, doc: &Document) -> Self {
        let mut set = Self::new();
        collect_subtree(root_id, doc, &mut set.nodes, false);
        set
    }

    /// The subtree rooted at `root_id`, with comments.
    pub fn tree_with_comments(root_id: NodeId, doc: &Document) -> Self {
        let mut set = Self::new();
        collect_subtree(root_id, doc, &mut set.nodes, true);
        set
    }

    pub fn contains_id(&self, id: NodeId) -> bool {
        self.nodes.contains(&id.index())
    }

    pub fn remove_id(&mut self, id: NodeId) {
        self.nodes.remove(&id.index());
    }

    /// Remove `id` and all of its descendants.
    pub fn remove_subtree(&mut self, id: NodeId, doc: &Document) {
        self.remove_id(id);
        for d in doc.descendants(id) {
            self.remove_id(d);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

fn collect_subtree(id: NodeId, doc: &Document, set: &mut HashSet<usize>, include_comments: bool) {
    if !include_comments && matches!(doc.node_kind(id), Some(NodeKind::Comment(_))) {
        return;
    }
    set.insert(id.index());
    for child in doc.children(id) {
        collect_subtree(child, doc, set, include_comments);
    }
}
