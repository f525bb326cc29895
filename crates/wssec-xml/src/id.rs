#![forbid(unsafe_code)]

//! Element index: identifier attribute value to element.
//!
//! The index is a snapshot taken when it is built. Decryption adds and
//! removes elements afterwards, so every lookup validates its hit against
//! the live document and falls back to a full scan on a miss.
//!
//! An identifier carried by more than one element is recorded as a
//! duplicate; [`IdIndex::check_unique`] turns that into an error so that
//! a reference can never be satisfied by a different element than the one
//! that was signed.

use crate::document::{Document, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use wssec_core::{ns, Error};

/// One attribute recognized as carrying an element identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAttribute {
    /// Attribute namespace; `None` for an un-namespaced attribute.
    #[serde(default)]
    pub namespace: Option<String>,
    pub local_name: String,
    /// Restrict to elements in this namespace, if set.
    #[serde(default)]
    pub element_namespace: Option<String>,
}

impl IdAttribute {
    pub fn new(namespace: Option<&str>, local_name: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_owned),
            local_name: local_name.to_owned(),
            element_namespace: None,
        }
    }

    /// An un-namespaced attribute only honored on elements in `element_ns`.
    pub fn on_elements_in(element_ns: &str, local_name: &str) -> Self {
        Self {
            namespace: None,
            local_name: local_name.to_owned(),
            element_namespace: Some(element_ns.to_owned()),
        }
    }

    fn value<'d>(&self, doc: &'d Document, id: NodeId) -> Option<&'d str> {
        if let Some(elem_ns) = &self.element_namespace {
            if doc.namespace_uri(id) != Some(elem_ns.as_str()) {
                return None;
            }
        }
        match &self.namespace {
            Some(n) => doc.attribute_ns(id, n, &self.local_name),
            None => doc.attribute(id, &self.local_name),
        }
    }
}

/// The set of attributes treated as identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAttributeConfig {
    pub attributes: Vec<IdAttribute>,
}

impl IdAttributeConfig {
    pub fn new(attributes: Vec<IdAttribute>) -> Self {
        Self { attributes }
    }

    /// Identifier attributes used by WS-Security, SAML and XML-Sig/Enc.
    pub fn wss_default() -> Self {
        let mut attributes: Vec<IdAttribute> = ns::UTILITY_NAMESPACES
            .iter()
            .map(|u| IdAttribute::new(Some(*u), ns::attr::ID))
            .collect();
        attributes.push(IdAttribute::on_elements_in(ns::SAML_1, ns::attr::ASSERTION_ID));
        attributes.push(IdAttribute::on_elements_in(ns::SAML_2, ns::attr::SAML2_ID));
        attributes.push(IdAttribute::new(None, ns::attr::ID));
        Self { attributes }
    }

    /// The identifier of `id` under this configuration.
    pub fn id_of<'d>(&self, doc: &'d Document, id: NodeId) -> Option<&'d str> {
        self.attributes.iter().find_map(|a| a.value(doc, id))
    }
}

impl Default for IdAttributeConfig {
    fn default() -> Self {
        Self::wss_default()
    }
}

/// Identifier to element map with live fallback.
#[derive(Debug, Clone)]
pub struct IdIndex {
    config: IdAttributeConfig,
    map: HashMap<String, NodeId>,
    duplicates: BTreeSet<String>,
    generation: u64,
}

impl IdIndex {
    /// Scan the whole document once.
    pub fn build(doc: &Document, config: IdAttributeConfig) -> Self {
        let mut index = Self {
            config,
            map: HashMap::new(),
            duplicates: BTreeSet::new(),
            generation: doc.generation(),
        };
        index.rebuild(doc);
        index
    }

    pub fn config(&self) -> &IdAttributeConfig {
        &self.config
    }

    /// True when the document has changed since the snapshot.
    pub fn is_stale(&self, doc: &Document) -> bool {
        self.generation != doc.generation()
    }

    pub fn rebuild(&mut self, doc: &Document) {
        self.map.clear();
        self.duplicates.clear();
        for node in doc.descendants(doc.root()) {
            if let Some(v) = self.config.id_of(doc, node) {
                if self.map.contains_key(v) {
                    tracing::warn!(id = v, "identifier used by more than one element");
                    self.duplicates.insert(v.to_owned());
                } else {
                    self.map.insert(v.to_owned(), node);
                }
            }
        }
        self.generation = doc.generation();
    }

    /// Identifiers carried by more than one element at the last build.
    pub fn duplicate_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.duplicates.iter().map(String::as_str)
    }

    /// Fail with [`Error::InvalidDocumentFormat`] if any identifier was
    /// seen twice.
    pub fn check_unique(&self) -> Result<(), Error> {
        match self.duplicates.iter().next() {
            Some(id) => Err(Error::InvalidDocumentFormat(format!(
                "Duplicate element identifier: {id}"
            ))),
            None => Ok(()),
        }
    }

    /// Resolve `id` to an element, falling back to a document scan when the
    /// snapshot misses or points at a node that is no longer attached.
    pub fn find(&self, doc: &Document, id: &str) -> Option<NodeId> {
        if let Some(&node) = self.map.get(id) {
            if !self.is_stale(doc)
                || (doc.is_attached(node) && self.config.id_of(doc, node) == Some(id))
            {
                return Some(node);
            }
        }
        let found = doc
            .descendants(doc.root())
            .into_iter()
            .find(|n| self.config.id_of(doc, *n) == Some(id));
        if found.is_some() {
            tracing::trace!(id, "element found by fallback scan");
        }
        found
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
