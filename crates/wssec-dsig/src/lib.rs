#![forbid(unsafe_code)]

//! XML Digital Signature support for the `wssec` processor.
//!
//! Parses `<ds:Signature>`, runs each Reference through its transforms
//! (enveloped-signature, C14N, STR-Transform, SwA attachment transforms)
//! and verifies digests and the SignatureValue through a
//! [`wssec_crypto::CryptoEngine`]. How a Reference URI is dereferenced is
//! left to a [`ReferenceResolver`].

pub mod resolve;
pub mod sign;
pub mod signature;
pub mod transforms;
pub mod verify;

pub use resolve::{IdReferenceResolver, MimePart, ReferenceResolver, ResolvedReference, StrTarget};
pub use signature::{ReferenceInfo, SignatureInfo, TransformInfo};
pub use verify::{verify, ReferenceValidity, SignatureValidity};
