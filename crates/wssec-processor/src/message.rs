#![forbid(unsafe_code)]

//! The message being undecorated.
//!
//! A message starts read-only. The first mutation (decryption, EncryptedKey
//! excision, header pruning) promotes it to writable; after that the same
//! document instance is mutated in place.

use std::collections::HashMap;

use wssec_core::Result;
use wssec_dsig::MimePart;
use wssec_xml::Document;

pub trait Message {
    fn document(&self) -> &Document;

    /// Promote the document to writable, once, and return it.
    fn document_writable(&mut self) -> &mut Document;

    fn is_writable(&self) -> bool;

    /// The MIME part with Content-ID `content_id` (without `cid:`).
    fn attachment(&self, content_id: &str) -> Option<&MimePart>;
}

/// An in-memory SOAP message with optional SwA attachments.
#[derive(Debug, Clone)]
pub struct SoapMessage {
    document: Document,
    attachments: HashMap<String, MimePart>,
    writable: bool,
}

impl SoapMessage {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            attachments: HashMap::new(),
            writable: false,
        }
    }

    pub fn parse(xml: &str) -> Result<Self> {
        Ok(Self::new(Document::parse(xml)?))
    }

    pub fn parse_bytes(data: &[u8]) -> Result<Self> {
        Ok(Self::new(Document::parse_bytes(data)?))
    }

    /// Attach a part under `content_id`; angle brackets are stripped.
    pub fn with_attachment(mut self, content_id: &str, part: MimePart) -> Self {
        self.attachments.insert(normalize_content_id(content_id).to_owned(), part);
        self
    }

    pub fn into_document(self) -> Document {
        self.document
    }
}

impl Message for SoapMessage {
    fn document(&self) -> &Document {
        &self.document
    }

    fn document_writable(&mut self) -> &mut Document {
        if !self.writable {
            tracing::trace!("message document promoted to writable");
            self.writable = true;
        }
        &mut self.document
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn attachment(&self, content_id: &str) -> Option<&MimePart> {
        self.attachments.get(normalize_content_id(content_id))
    }
}

fn normalize_content_id(id: &str) -> &str {
    id.trim().trim_start_matches('<').trim_end_matches('>')
}
