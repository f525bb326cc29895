#![forbid(unsafe_code)]

//! Reference dereferencing.
//!
//! A [`ReferenceResolver`] turns a Reference URI into the data the
//! transform chain starts from, and backs the STR-Transform by replacing
//! a SecurityTokenReference with the token it names. The processor layers
//! attachments and token lookup on top of [`IdReferenceResolver`].

use wssec_core::{Error, Result};
use wssec_xml::{uri, Document, IdIndex, NodeId};

/// A MIME part referenced with a `cid:` URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimePart {
    /// Header name and value pairs in the order received.
    pub headers: Vec<(String, String)>,
    pub content: Vec<u8>,
}

impl MimePart {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What a Reference URI dereferenced to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedReference {
    /// `URI=""`: the whole document, comments excluded.
    Document,
    /// `URI="#id"`: one element subtree.
    Element(NodeId),
    /// `URI="cid:..."`: an attachment.
    Attachment(MimePart),
}

/// The replacement for a SecurityTokenReference under STR-Transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrTarget {
    /// A token element present in the document.
    Element(NodeId),
    /// A token with no element in the document, rendered as XML text.
    Synthesized(String),
}

pub trait ReferenceResolver {
    fn resolve(&self, doc: &Document, uri: &str) -> Result<ResolvedReference>;

    /// Dereference the SecurityTokenReference element `str_element`.
    fn dereference_str(&self, _doc: &Document, _str_element: NodeId) -> Result<StrTarget> {
        Err(Error::UnsupportedAlgorithm(
            "STR-Transform needs a token-aware resolver".into(),
        ))
    }
}

/// Resolves `""` and `#id` against an [`IdIndex`]. XPointer and
/// attachment references are refused.
pub struct IdReferenceResolver<'a> {
    index: &'a IdIndex,
}

impl<'a> IdReferenceResolver<'a> {
    pub fn new(index: &'a IdIndex) -> Self {
        Self { index }
    }
}

impl ReferenceResolver for IdReferenceResolver<'_> {
    fn resolve(&self, doc: &Document, reference: &str) -> Result<ResolvedReference> {
        resolve_same_document(self.index, doc, reference)
    }
}

/// Shared `""`/`#id` handling for resolvers that add more URI schemes.
pub fn resolve_same_document(
    index: &IdIndex,
    doc: &Document,
    reference: &str,
) -> Result<ResolvedReference> {
    if reference.is_empty() {
        return Ok(ResolvedReference::Document);
    }
    if uri::is_xpointer(reference) {
        return Err(Error::InvalidDocumentFormat(format!(
            "XPointer references are not supported: {reference}"
        )));
    }
    if let Some(id) = uri::parse_same_document_ref(reference) {
        return index
            .find(doc, id)
            .map(ResolvedReference::Element)
            .ok_or_else(|| Error::InvalidUri(format!("no element with id {id}")));
    }
    Err(Error::InvalidUri(format!("unsupported reference URI: {reference}")))
}
