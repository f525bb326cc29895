#![forbid(unsafe_code)]

//! XML Canonicalization (C14N) for the `wssec` processor.
//!
//! Implements the four W3C variants WS-Security messages use:
//! - Canonical XML 1.0 (with and without comments)
//! - Exclusive Canonical XML 1.0 (with and without comments)

pub mod escape;
pub mod exclusive;
pub mod inclusive;
pub mod render;

use wssec_core::{algorithm, Error};
use wssec_xml::{Document, NodeSet};

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMode {
    /// Canonical XML 1.0
    Inclusive,
    /// Canonical XML 1.0 with comments
    InclusiveWithComments,
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMode {
    /// Get the algorithm URI for this mode.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive => algorithm::C14N,
            Self::InclusiveWithComments => algorithm::C14N_WITH_COMMENTS,
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parse a C14N mode from an algorithm URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::C14N => Some(Self::Inclusive),
            algorithm::C14N_WITH_COMMENTS => Some(Self::InclusiveWithComments),
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(self, Self::InclusiveWithComments | Self::ExclusiveWithComments)
    }
}

/// Canonicalize a document, or the subset selected by `node_set`.
///
/// `inclusive_prefixes` is the exclusive-C14N InclusiveNamespaces
/// PrefixList and is ignored by the inclusive modes.
pub fn canonicalize(
    doc: &Document,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    match mode {
        C14nMode::Inclusive | C14nMode::InclusiveWithComments => {
            inclusive::canonicalize(doc, mode.with_comments(), node_set)
        }
        C14nMode::Exclusive | C14nMode::ExclusiveWithComments => {
            exclusive::canonicalize(doc, mode.with_comments(), node_set, inclusive_prefixes)
        }
    }
}

/// Canonicalize the subtree rooted at `id` (comments excluded unless the
/// mode keeps them).
pub fn canonicalize_subtree(
    doc: &Document,
    id: wssec_xml::NodeId,
    mode: C14nMode,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let set = if mode.with_comments() {
        NodeSet::tree_with_comments(id, doc)
    } else {
        NodeSet::tree_without_comments(id, doc)
    };
    canonicalize(doc, mode, Some(&set), inclusive_prefixes)
}
