#![forbid(unsafe_code)]

//! Reference transforms.
//!
//! A Reference starts out as a node set, an attachment, or octets, and each
//! `<ds:Transform>` in turn rewrites it. Whatever is left at the end is
//! turned into octets (node sets with inclusive C14N) and digested.

use wssec_core::{algorithm, Error, Result};
use wssec_crypto::CryptoEngine;
use wssec_xml::{Document, NodeId, NodeSet};

use crate::resolve::{MimePart, ReferenceResolver, ResolvedReference, StrTarget};
use crate::signature::TransformInfo;

/// Data flowing through the transform pipeline.
#[derive(Debug, Clone)]
pub enum TransformData {
    /// A subset of the document being verified. `apex` is the referenced
    /// element, or `None` for the whole document.
    Nodes { set: NodeSet, apex: Option<NodeId> },
    /// An attachment, before an attachment transform picks what to digest.
    Mime(MimePart),
    Binary(Vec<u8>),
}

impl TransformData {
    pub fn from_resolved(doc: &Document, resolved: ResolvedReference) -> Self {
        match resolved {
            ResolvedReference::Document => TransformData::Nodes {
                set: NodeSet::all_without_comments(doc),
                apex: None,
            },
            ResolvedReference::Element(id) => TransformData::Nodes {
                set: NodeSet::tree_without_comments(id, doc),
                apex: Some(id),
            },
            ResolvedReference::Attachment(part) => TransformData::Mime(part),
        }
    }

    /// Final octets for digesting.
    pub fn into_octets(self, ctx: &TransformContext<'_>) -> Result<Vec<u8>> {
        match self {
            TransformData::Binary(data) => Ok(data),
            TransformData::Mime(part) => Ok(part.content),
            TransformData::Nodes { set, .. } => {
                ctx.engine.canonicalize(ctx.doc, algorithm::C14N, Some(&set), &[])
            }
        }
    }
}

/// What a transform may look at besides its input.
pub struct TransformContext<'a> {
    pub doc: &'a Document,
    pub engine: &'a dyn CryptoEngine,
    pub resolver: &'a dyn ReferenceResolver,
    /// The Signature being verified, cut out by the enveloped transform.
    pub signature: NodeId,
}

pub trait Transform: Send {
    fn uri(&self) -> &str;

    fn execute(&self, ctx: &TransformContext<'_>, input: TransformData) -> Result<TransformData>;
}

/// Build the transform described by a `<ds:Transform>` element.
pub fn from_info(info: &TransformInfo) -> Result<Box<dyn Transform>> {
    match info.algorithm.as_str() {
        algorithm::ENVELOPED_SIGNATURE => Ok(Box::new(EnvelopedSignatureTransform)),
        algorithm::C14N
        | algorithm::C14N_WITH_COMMENTS
        | algorithm::EXC_C14N
        | algorithm::EXC_C14N_WITH_COMMENTS => Ok(Box::new(C14nTransform::new(
            &info.algorithm,
            info.inclusive_prefixes.clone(),
        ))),
        algorithm::STR_TRANSFORM => {
            let c14n = info.parameter_c14n.as_deref().ok_or_else(|| {
                Error::InvalidDocumentFormat(
                    "STR-Transform without TransformationParameters/CanonicalizationMethod".into(),
                )
            })?;
            Ok(Box::new(StrTransform::new(c14n)))
        }
        algorithm::ATTACHMENT_CONTENT => Ok(Box::new(AttachmentContentTransform)),
        algorithm::ATTACHMENT_COMPLETE => Ok(Box::new(AttachmentCompleteTransform)),
        other => Err(Error::UnsupportedAlgorithm(format!("transform: {other}"))),
    }
}

/// A pipeline of transforms executed in sequence.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_infos(infos: &[TransformInfo]) -> Result<Self> {
        let transforms = infos.iter().map(from_info).collect::<Result<Vec<_>>>()?;
        Ok(Self { transforms })
    }

    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    pub fn execute(&self, ctx: &TransformContext<'_>, input: TransformData) -> Result<TransformData> {
        let mut data = input;
        for transform in &self.transforms {
            tracing::trace!(transform = transform.uri(), "applying transform");
            data = transform.execute(ctx, data)?;
        }
        Ok(data)
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

// ── Enveloped signature ──────────────────────────────────────────────

/// Removes the Signature being verified from the node set.
pub struct EnvelopedSignatureTransform;

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(&self, ctx: &TransformContext<'_>, input: TransformData) -> Result<TransformData> {
        match input {
            TransformData::Nodes { mut set, apex } => {
                set.remove_subtree(ctx.signature, ctx.doc);
                Ok(TransformData::Nodes { set, apex })
            }
            _ => Err(Error::InvalidDocumentFormat(
                "enveloped-signature transform requires a node set".into(),
            )),
        }
    }
}

// ── Canonicalization ─────────────────────────────────────────────────

pub struct C14nTransform {
    uri: String,
    inclusive_prefixes: Vec<String>,
}

impl C14nTransform {
    pub fn new(uri: &str, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            uri: uri.to_owned(),
            inclusive_prefixes,
        }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn execute(&self, ctx: &TransformContext<'_>, input: TransformData) -> Result<TransformData> {
        let bytes = match input {
            TransformData::Nodes { set, .. } => {
                ctx.engine
                    .canonicalize(ctx.doc, &self.uri, Some(&set), &self.inclusive_prefixes)?
            }
            TransformData::Binary(data) => {
                let parsed = Document::parse_bytes(&data)?;
                ctx.engine
                    .canonicalize(&parsed, &self.uri, None, &self.inclusive_prefixes)?
            }
            TransformData::Mime(_) => {
                return Err(Error::InvalidDocumentFormat(
                    "canonicalization of an attachment needs an attachment transform first".into(),
                ))
            }
        };
        Ok(TransformData::Binary(bytes))
    }
}

// ── STR-Transform ────────────────────────────────────────────────────

/// Replaces the referenced SecurityTokenReference with the token it
/// points at and canonicalizes the token.
pub struct StrTransform {
    c14n_uri: String,
}

impl StrTransform {
    pub fn new(c14n_uri: &str) -> Self {
        Self {
            c14n_uri: c14n_uri.to_owned(),
        }
    }
}

impl Transform for StrTransform {
    fn uri(&self) -> &str {
        algorithm::STR_TRANSFORM
    }

    fn execute(&self, ctx: &TransformContext<'_>, input: TransformData) -> Result<TransformData> {
        let str_element = match input {
            TransformData::Nodes { apex: Some(apex), .. } => apex,
            _ => {
                return Err(Error::InvalidDocumentFormat(
                    "STR-Transform must reference a SecurityTokenReference element".into(),
                ))
            }
        };
        let bytes = match ctx.resolver.dereference_str(ctx.doc, str_element)? {
            StrTarget::Element(token) => {
                let set = NodeSet::tree_without_comments(token, ctx.doc);
                ctx.engine.canonicalize(ctx.doc, &self.c14n_uri, Some(&set), &[])?
            }
            StrTarget::Synthesized(xml) => {
                let token_doc = Document::parse(&xml)?;
                ctx.engine.canonicalize(&token_doc, &self.c14n_uri, None, &[])?
            }
        };
        Ok(TransformData::Binary(bytes))
    }
}

// ── Attachments ──────────────────────────────────────────────────────

/// MIME headers covered by the attachment-complete transform.
const SIGNED_MIME_HEADERS: &[&str] = &[
    "Content-Description",
    "Content-Disposition",
    "Content-ID",
    "Content-Location",
    "Content-Type",
];

/// Digest the attachment body only.
pub struct AttachmentContentTransform;

impl Transform for AttachmentContentTransform {
    fn uri(&self) -> &str {
        algorithm::ATTACHMENT_CONTENT
    }

    fn execute(&self, _ctx: &TransformContext<'_>, input: TransformData) -> Result<TransformData> {
        match input {
            TransformData::Mime(part) => Ok(TransformData::Binary(part.content)),
            _ => Err(Error::InvalidDocumentFormat(
                "attachment transform applied to a non-attachment reference".into(),
            )),
        }
    }
}

/// Digest the signed MIME headers followed by the body.
pub struct AttachmentCompleteTransform;

impl Transform for AttachmentCompleteTransform {
    fn uri(&self) -> &str {
        algorithm::ATTACHMENT_COMPLETE
    }

    fn execute(&self, _ctx: &TransformContext<'_>, input: TransformData) -> Result<TransformData> {
        match input {
            TransformData::Mime(part) => Ok(TransformData::Binary(complete_octets(&part))),
            _ => Err(Error::InvalidDocumentFormat(
                "attachment transform applied to a non-attachment reference".into(),
            )),
        }
    }
}

/// Signed headers in lexical order as `Name: value\r\n`, a blank line,
/// then the body.
pub fn complete_octets(part: &MimePart) -> Vec<u8> {
    let mut headers: Vec<(&str, &str)> = SIGNED_MIME_HEADERS
        .iter()
        .filter_map(|name| part.header(name).map(|v| (*name, v.trim())))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = Vec::new();
    for (name, value) in headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&part.content);
    out
}
