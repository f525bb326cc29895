#![forbid(unsafe_code)]

//! The record of what undecoration proved about a message.

use wssec_core::{Error, Result};
use wssec_xml::{DocumentId, NodeId};

use crate::confirmation::SignatureConfirmation;
use crate::header::SecurityActor;
use crate::timestamp::Timestamp;
use crate::token::{SecurityToken, TokenRef, TokenStore, UsernameToken};

/// An element covered by a verified signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedElement {
    /// The token credited with the signature. For a derived key this is
    /// the derivation source.
    pub token: TokenRef,
    pub element: NodeId,
    /// The `ds:Signature` element.
    pub signature: NodeId,
    pub signature_algorithm: String,
    pub digest_algorithms: Vec<String>,
}

/// An attachment covered by a verified signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPart {
    pub token: TokenRef,
    /// Content-ID of the part, without `cid:`.
    pub content_id: String,
}

/// An element that was successfully decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedElement {
    pub element: NodeId,
    /// The block cipher that was actually used.
    pub algorithm: String,
}

/// A SignatureValue that verified, kept for WS-Security 1.1 confirmation
/// in a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSignatureValue {
    pub value: String,
    /// The Signature element arrived encrypted.
    pub encrypted: bool,
}

/// A signature whose failure was tolerated because an EncryptedKey not
/// addressed to us was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredSignature {
    pub signature: NodeId,
    pub id: Option<String>,
    pub diagnostic: String,
}

#[derive(Debug)]
pub struct ProcessorResult {
    pub(crate) document: DocumentId,
    pub(crate) tokens: TokenStore,
    pub(crate) signed_elements: Vec<SignedElement>,
    pub(crate) signed_parts: Vec<SignedPart>,
    pub(crate) encrypted_elements: Vec<EncryptedElement>,
    pub(crate) timestamp: Option<Timestamp>,
    pub(crate) signature_confirmation: SignatureConfirmation,
    pub(crate) security_namespace: Option<String>,
    pub(crate) processed_actor: Option<SecurityActor>,
    pub(crate) validated_signature_values: Vec<ValidatedSignatureValue>,
    pub(crate) ignored_signatures: Vec<IgnoredSignature>,
    pub(crate) wss11_seen: bool,
    pub(crate) derived_keys_seen: bool,
    pub(crate) last_key_encryption_algorithm: Option<String>,
}

impl ProcessorResult {
    /// Result for a message with no Security header addressed to us.
    pub(crate) fn empty(document: DocumentId) -> Self {
        Self {
            document,
            tokens: TokenStore::default(),
            signed_elements: Vec::new(),
            signed_parts: Vec::new(),
            encrypted_elements: Vec::new(),
            timestamp: None,
            signature_confirmation: SignatureConfirmation::default(),
            security_namespace: None,
            processed_actor: None,
            validated_signature_values: Vec::new(),
            ignored_signatures: Vec::new(),
            wss11_seen: false,
            derived_keys_seen: false,
            last_key_encryption_algorithm: None,
        }
    }

    /// The document the node handles in this result belong to.
    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn token(&self, token: TokenRef) -> &SecurityToken {
        self.tokens.get(token)
    }

    pub fn elements_that_were_signed(&self) -> &[SignedElement] {
        &self.signed_elements
    }

    pub fn parts_that_were_signed(&self) -> &[SignedPart] {
        &self.signed_parts
    }

    pub fn elements_that_were_encrypted(&self) -> &[EncryptedElement] {
        &self.encrypted_elements
    }

    pub fn timestamp(&self) -> Option<&Timestamp> {
        self.timestamp.as_ref()
    }

    pub fn signature_confirmation(&self) -> &SignatureConfirmation {
        &self.signature_confirmation
    }

    /// Namespace of the processed Security header.
    pub fn security_namespace(&self) -> Option<&str> {
        self.security_namespace.as_deref()
    }

    pub fn processed_actor(&self) -> Option<&SecurityActor> {
        self.processed_actor.as_ref()
    }

    pub fn validated_signature_values(&self) -> &[ValidatedSignatureValue] {
        &self.validated_signature_values
    }

    pub fn ignored_signatures(&self) -> &[IgnoredSignature] {
        &self.ignored_signatures
    }

    pub fn username_tokens(&self) -> impl Iterator<Item = &UsernameToken> + '_ {
        self.tokens.iter().filter_map(|(_, t)| match t {
            SecurityToken::Username(u) => Some(u),
            _ => None,
        })
    }

    pub fn is_wss11_seen(&self) -> bool {
        self.wss11_seen
    }

    pub fn is_derived_keys_seen(&self) -> bool {
        self.derived_keys_seen
    }

    pub fn last_key_encryption_algorithm(&self) -> Option<&str> {
        self.last_key_encryption_algorithm.as_deref()
    }

    /// Tokens whose signatures cover `element`.
    ///
    /// `document` must be the document this result was produced from.
    pub fn signing_tokens_for(&self, document: DocumentId, element: NodeId) -> Result<Vec<&SecurityToken>> {
        if document != self.document {
            return Err(Error::Processor(
                "element does not belong to the processed document".into(),
            ));
        }
        let mut refs: Vec<TokenRef> = self
            .signed_elements
            .iter()
            .filter(|s| s.element == element)
            .map(|s| s.token)
            .collect();
        refs.sort();
        refs.dedup();
        Ok(refs.into_iter().map(|r| self.tokens.get(r)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{TokenBacking, X509Source, X509Token};
    use wssec_xml::Document;

    #[test]
    fn test_signing_tokens_for_checks_document() {
        let doc = Document::parse("<a><b/></a>").unwrap();
        let other = Document::parse("<a/>").unwrap();
        let root = doc.root_element().unwrap();

        let mut result = ProcessorResult::empty(doc.id());
        let token = result.tokens.push(SecurityToken::X509(X509Token::new(
            TokenBacking::Synthesized,
            None,
            wssec_keys::fixtures::certificate(),
            X509Source::Thumbprint,
        )));
        result.signed_elements.push(SignedElement {
            token,
            element: root,
            signature: root,
            signature_algorithm: "alg".into(),
            digest_algorithms: vec![],
        });

        let found = result.signing_tokens_for(doc.id(), root).unwrap();
        assert_eq!(found.len(), 1);
        assert!(matches!(found[0], SecurityToken::X509(_)));

        let b = doc.child_elements(root).next().unwrap();
        assert!(result.signing_tokens_for(doc.id(), b).unwrap().is_empty());
        assert!(result.signing_tokens_for(other.id(), root).is_err());
    }
}
