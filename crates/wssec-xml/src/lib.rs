#![forbid(unsafe_code)]

//! XML document layer for the `wssec` WS-Security processor.
//!
//! Provides an arena-backed, mutable document parsed with `roxmltree`,
//! the element index used for `#id` reference resolution, and the
//! `NodeSet` type consumed by canonicalization and signature transforms.

pub mod document;
pub mod id;
pub mod nodeset;
pub mod uri;
pub mod writer;

pub use document::{
    Attribute, Document, DocumentId, Element, NodeId, NodeKind, ProcessingInstruction, QName,
};
pub use id::{IdAttribute, IdAttributeConfig, IdIndex};
pub use nodeset::NodeSet;
