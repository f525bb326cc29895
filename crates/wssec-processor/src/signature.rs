#![forbid(unsafe_code)]

//! Signature verification inside the Security header.
//!
//! The signing token comes from the KeyInfo: a SecurityTokenReference, an
//! embedded certificate, or an X509Data reference. A signature whose
//! token cannot be found is left alone; one whose token is found must
//! verify, except when the failure is tolerated because encryption for
//! another recipient was skipped.

use std::collections::HashMap;

use wssec_core::{algorithm, ns, Error, Result};
use wssec_dsig::resolve::resolve_same_document;
use wssec_dsig::{MimePart, ReferenceInfo, ReferenceResolver, ResolvedReference, SignatureInfo, StrTarget};
use wssec_keys::X509Certificate;
use wssec_xml::{uri, Document, IdIndex, NodeId};

use crate::message::Message;
use crate::processor::{security_child, Walk};
use crate::result::{IgnoredSignature, SignedElement, SignedPart, ValidatedSignatureValue};
use crate::token::{decode_base64, SecurityToken, TokenBacking, TokenRef, X509Source, X509Token};

/// Dereferences Reference URIs against the message: elements by id,
/// attachments by Content-ID, and STR-Transform targets from the tokens
/// resolved before verification.
pub(crate) struct MessageReferenceResolver<'r> {
    pub(crate) index: &'r IdIndex,
    pub(crate) message: &'r dyn Message,
    pub(crate) max_attachment_size: u64,
    pub(crate) str_targets: &'r HashMap<NodeId, StrTarget>,
}

impl ReferenceResolver for MessageReferenceResolver<'_> {
    fn resolve(&self, doc: &Document, reference: &str) -> Result<ResolvedReference> {
        if let Some(content_id) = uri::parse_attachment_ref(reference) {
            let part: &MimePart = self
                .message
                .attachment(content_id)
                .ok_or_else(|| Error::InvalidUri(format!("no attachment with Content-ID {content_id}")))?;
            if part.content.len() as u64 > self.max_attachment_size {
                return Err(Error::Processor(format!(
                    "signed attachment {content_id} exceeds the maximum size of {} bytes",
                    self.max_attachment_size
                )));
            }
            return Ok(ResolvedReference::Attachment(part.clone()));
        }
        resolve_same_document(self.index, doc, reference)
    }

    fn dereference_str(&self, _doc: &Document, str_element: NodeId) -> Result<StrTarget> {
        self.str_targets.get(&str_element).cloned().ok_or_else(|| {
            Error::InvalidDocumentFormat("SecurityTokenReference under STR-Transform could not be resolved".into())
        })
    }
}

impl Walk<'_> {
    pub(crate) fn process_signature(&mut self, signature: NodeId) -> Result<()> {
        let info = SignatureInfo::parse(self.message.document(), signature)?;
        let key_info = info
            .key_info
            .ok_or_else(|| Error::InvalidDocumentFormat("Signature has no KeyInfo".into()))?;

        let Some(signer) = self.signing_token(key_info)? else {
            tracing::info!(signature = ?info.id, "no signing token found for Signature; leaving it unverified");
            return Ok(());
        };
        let key = self.verification_key(signer)?;

        if info.references.iter().any(|r| self.covers_envelope(r)) {
            self.excise_processed_encrypted_keys()?;
        }

        let str_targets = self.str_transform_targets(&info)?;
        let validity = {
            let resolver = MessageReferenceResolver {
                index: &self.index,
                message: &*self.message,
                max_attachment_size: self.config.signed_attachment_max_size,
                str_targets: &str_targets,
            };
            wssec_dsig::verify(self.message.document(), &info, &key, &resolver, self.engine)?
        };

        if !validity.is_valid() {
            let diagnostic = validity.diagnostic();
            if self.encryption_ignored && self.config.ignore_signature_failure_when_encryption_ignored {
                tracing::warn!(
                    signature = ?info.id,
                    %diagnostic,
                    "signature did not verify; tolerated because encryption for another recipient was skipped"
                );
                self.ignored_signatures.push(IgnoredSignature {
                    signature,
                    id: info.id.clone(),
                    diagnostic,
                });
                return Ok(());
            }
            return Err(Error::InvalidSignature(diagnostic));
        }

        self.record_verified_signature(signature, &info, signer, &str_targets)
    }

    fn record_verified_signature(
        &mut self,
        signature: NodeId,
        info: &SignatureInfo,
        signer: TokenRef,
        str_targets: &HashMap<NodeId, StrTarget>,
    ) -> Result<()> {
        let encrypted = self.is_encrypted(signature);
        self.validated_signature_values.push(ValidatedSignatureValue {
            value: info.signature_value_text.clone(),
            encrypted,
        });

        let credited = self.credited_token(signer);
        let digest_algorithms = info.digest_methods();
        let mut elements = Vec::with_capacity(info.references.len());
        let mut parts = Vec::new();
        for reference in &info.references {
            if let Some(content_id) = uri::parse_attachment_ref(&reference.uri) {
                parts.push(SignedPart {
                    token: credited,
                    content_id: content_id.to_owned(),
                });
                continue;
            }
            elements.push(SignedElement {
                token: credited,
                element: self.covered_element(reference, str_targets)?,
                signature,
                signature_algorithm: info.signature_method.clone(),
                digest_algorithms: digest_algorithms.clone(),
            });
        }

        tracing::debug!(
            signature = ?info.id,
            elements = elements.len(),
            parts = parts.len(),
            "signature verified"
        );
        self.signed_elements.extend(elements.iter().cloned());
        self.signed_parts.extend(parts.iter().cloned());
        if let Some(token) = self.tokens.get_mut(credited).as_signing_mut() {
            let state = token.signing_state_mut();
            state.possession_proven = true;
            state.signed_elements.extend(elements);
            state.signed_parts.extend(parts);
        }
        Ok(())
    }

    /// The token named by a signature's KeyInfo, if we can find it.
    fn signing_token(&mut self, key_info: NodeId) -> Result<Option<TokenRef>> {
        let doc = self.message.document();
        if let Some(str_element) = security_child(doc, key_info, ns::node::SECURITY_TOKEN_REFERENCE) {
            return self.resolve_str(str_element);
        }
        let Some(x509_data) = doc.find_child(key_info, ns::DSIG, ns::node::X509_DATA) else {
            return Ok(None);
        };
        if let Some(cert_element) = doc.find_child(x509_data, ns::DSIG, ns::node::X509_CERTIFICATE) {
            let der = decode_base64(&doc.text_content(cert_element))?;
            let certificate = X509Certificate::from_der(&der)?;
            if let Some(found) = self.tokens.x509_by_certificate(&certificate) {
                return Ok(Some(found));
            }
            return Ok(Some(self.tokens.push(SecurityToken::X509(X509Token::new(
                TokenBacking::Synthesized,
                None,
                certificate,
                X509Source::Embedded,
            )))));
        }
        self.resolve_x509_data(x509_data)
    }

    /// True if `reference` covers the whole envelope or the Security header.
    fn covers_envelope(&self, reference: &ReferenceInfo) -> bool {
        if reference.uri.is_empty() {
            return true;
        }
        let doc = self.message.document();
        match reference.target_id().and_then(|id| self.index.find(doc, id)) {
            Some(target) => target == self.security || Some(target) == doc.root_element(),
            None => false,
        }
    }

    /// Remove EncryptedKeys whose data has been decrypted, so that an
    /// enveloping signature sees the message as the sender signed it.
    fn excise_processed_encrypted_keys(&mut self) -> Result<()> {
        if self.processed_encrypted_keys.is_empty() {
            return Ok(());
        }
        let doc = self.message.document_writable();
        for encrypted_key in self.processed_encrypted_keys.drain(..) {
            if doc.is_attached(encrypted_key) {
                doc.remove(encrypted_key)?;
                tracing::debug!("removed processed EncryptedKey before verifying enveloping signature");
            }
        }
        self.index.rebuild(doc);
        Ok(())
    }

    /// What each STR-Transform reference's SecurityTokenReference stands for.
    fn str_transform_targets(&mut self, info: &SignatureInfo) -> Result<HashMap<NodeId, StrTarget>> {
        let mut targets = HashMap::new();
        for reference in &info.references {
            if !reference.has_transform(algorithm::STR_TRANSFORM) {
                continue;
            }
            let Some(str_element) = reference
                .target_id()
                .and_then(|id| self.index.find(self.message.document(), id))
            else {
                continue;
            };
            if let Some(token) = self.resolve_str(str_element)? {
                if let Some(target) = self.str_target(token) {
                    targets.insert(str_element, target);
                }
            }
        }
        Ok(targets)
    }

    /// The element a verified reference vouches for. Under STR-Transform
    /// that is the token element, not the reference itself.
    fn covered_element(&self, reference: &ReferenceInfo, str_targets: &HashMap<NodeId, StrTarget>) -> Result<NodeId> {
        let doc = self.message.document();
        let target = if reference.uri.is_empty() {
            doc.root_element()
        } else {
            reference.target_id().and_then(|id| self.index.find(doc, id))
        };
        let target = target.ok_or_else(|| {
            Error::InvalidDocumentFormat(format!(
                "Element covered by signature cannot be found in original document nor in processed X509 tokens: {}",
                reference.uri
            ))
        })?;
        if reference.has_transform(algorithm::STR_TRANSFORM) {
            if let Some(StrTarget::Element(token_element)) = str_targets.get(&target) {
                return Ok(*token_element);
            }
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessorConfig;
    use crate::message::SoapMessage;
    use crate::processor::WssProcessor;
    use crate::result::ProcessorResult;
    use crate::testutil::*;
    use crate::token::TokenKind;
    use base64::Engine;
    use wssec_keys::fixtures;

    fn bst_reference() -> String {
        str_reference("#X509-1", ns::value_type::X509V3)
    }

    fn run(processor: &WssProcessor, message: &mut SoapMessage) -> Result<ProcessorResult> {
        processor.undecorate_message(message, None, None, None)
    }

    fn attachment() -> MimePart {
        MimePart {
            headers: vec![("Content-Type".into(), "text/plain".into())],
            content: b"order 42 attachment".to_vec(),
        }
    }

    #[test]
    fn test_signed_attachment() {
        let content_transform = format!(r#"<ds:Transform Algorithm="{}"/>"#, algorithm::ATTACHMENT_CONTENT);
        let signature = signature_template(
            algorithm::RSA_SHA256,
            &[reference("#TS-1"), reference_with("cid:part1", &content_transform)],
            &bst_reference(),
        );
        let mut doc = parse(&envelope(&format!("{}{TIMESTAMP}{signature}", bst("X509-1"))));
        let mut context = SigningContext::default();
        context.attachments.insert("part1".into(), attachment());
        sign_all_with(&mut doc, &rsa_key(), &context);

        let mut message = SoapMessage::new(doc.clone()).with_attachment("<part1>", attachment());
        let result = run(&WssProcessor::default(), &mut message).unwrap();
        assert_eq!(result.parts_that_were_signed().len(), 1);
        let part = &result.parts_that_were_signed()[0];
        assert_eq!(part.content_id, "part1");
        assert_eq!(result.token(part.token).kind(), TokenKind::X509);
        assert_eq!(result.elements_that_were_signed().len(), 1);

        let small = WssProcessor::new(ProcessorConfig {
            signed_attachment_max_size: 4,
            ..ProcessorConfig::default()
        });
        let mut message = SoapMessage::new(doc).with_attachment("part1", attachment());
        let err = run(&small, &mut message).unwrap_err();
        assert!(matches!(err, Error::Processor(_)), "{err:?}");
    }

    #[test]
    fn test_embedded_certificate() {
        let key_info = format!(
            "<ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data>",
            certificate_b64()
        );
        let mut doc = parse(&envelope(&format!("{TIMESTAMP}{}", rsa_signature(&["TS-1"], &key_info))));
        sign_all(&mut doc, &rsa_key());

        let mut message = SoapMessage::new(doc);
        let result = run(&WssProcessor::default(), &mut message).unwrap();
        let signed = &result.elements_that_were_signed()[0];
        match result.token(signed.token) {
            SecurityToken::X509(x509) => {
                assert_eq!(x509.source, X509Source::Embedded);
                assert_eq!(x509.backing, TokenBacking::Synthesized);
            }
            other => panic!("unexpected token {:?}", other.kind()),
        }
    }

    #[test]
    fn test_embedded_certificate_reuses_binary_token() {
        let key_info = format!(
            "<ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data>",
            certificate_b64()
        );
        let security = format!("{}{TIMESTAMP}{}", bst("X509-1"), rsa_signature(&["TS-1"], &key_info));
        let mut doc = parse(&envelope(&security));
        sign_all(&mut doc, &rsa_key());

        let mut message = SoapMessage::new(doc);
        let result = run(&WssProcessor::default(), &mut message).unwrap();
        assert_eq!(result.tokens().len(), 1);
        let signed = &result.elements_that_were_signed()[0];
        assert_eq!(result.token(signed.token).id(), Some("X509-1"));
    }

    #[test]
    fn test_signature_without_known_signer_is_skipped() {
        let key_info = str_key_identifier(ns::value_type::THUMBPRINT_SHA1, fixtures::CERT_THUMBPRINT_B64);
        let mut doc = parse(&envelope(&format!("{TIMESTAMP}{}", rsa_signature(&["TS-1"], &key_info))));
        sign_all(&mut doc, &rsa_key());

        let mut message = SoapMessage::new(doc);
        let result = run(&WssProcessor::default(), &mut message).unwrap();
        assert!(result.elements_that_were_signed().is_empty());
        assert!(result.validated_signature_values().is_empty());
        assert!(!result.timestamp().unwrap().signed);
    }

    #[test]
    fn test_expired_signing_certificate() {
        let expired = X509Certificate::from_pem(fixtures::EXPIRED_CERT_PEM.as_bytes()).unwrap();
        let token = format!(
            r#"<wsse:BinarySecurityToken wsu:Id="X509-1" ValueType="{}">{}</wsse:BinarySecurityToken>"#,
            ns::value_type::X509V3,
            base64::engine::general_purpose::STANDARD.encode(expired.der())
        );
        let mut doc = parse(&envelope(&format!(
            "{token}{TIMESTAMP}{}",
            rsa_signature(&["TS-1"], &bst_reference())
        )));
        sign_all(&mut doc, &rsa_key());

        let mut message = SoapMessage::new(doc);
        let err = run(&WssProcessor::default(), &mut message).unwrap_err();
        assert!(matches!(err, Error::Certificate(_)), "{err:?}");
    }

    #[test]
    fn test_str_transform_credits_token_element() {
        let str_transform = format!(
            r#"<ds:Transform Algorithm="{}"><wsse:TransformationParameters><ds:CanonicalizationMethod Algorithm="{}"/></wsse:TransformationParameters></ds:Transform>"#,
            algorithm::STR_TRANSFORM,
            algorithm::EXC_C14N
        );
        let token_reference = format!(
            r##"<wsse:SecurityTokenReference wsu:Id="STR-1"><wsse:Reference URI="#X509-1" ValueType="{}"/></wsse:SecurityTokenReference>"##,
            ns::value_type::X509V3
        );
        let signature = signature_template(
            algorithm::RSA_SHA256,
            &[reference("#TS-1"), reference_with("#STR-1", &str_transform)],
            &bst_reference(),
        );
        let mut doc = parse(&envelope(&format!(
            "{}{token_reference}{TIMESTAMP}{signature}",
            bst("X509-1")
        )));
        let bst_element = find_by_id(&doc, "X509-1");
        let mut context = SigningContext::default();
        context
            .str_targets
            .insert(find_by_id(&doc, "STR-1"), StrTarget::Element(bst_element));
        sign_all_with(&mut doc, &rsa_key(), &context);

        let mut message = SoapMessage::new(doc);
        let result = run(&WssProcessor::default(), &mut message).unwrap();
        let covered: Vec<NodeId> = result.elements_that_were_signed().iter().map(|s| s.element).collect();
        assert_eq!(covered.len(), 2);
        assert!(covered.contains(&bst_element));
        assert!(covered.contains(&find_by_id(message.document(), "TS-1")));
    }

    #[test]
    fn test_signed_body() {
        let mut doc = parse(&envelope(&format!(
            "{}{TIMESTAMP}{}",
            bst("X509-1"),
            rsa_signature(&["Body-1"], &bst_reference())
        )));
        sign_all(&mut doc, &rsa_key());

        let mut message = SoapMessage::new(doc);
        let result = run(&WssProcessor::default(), &mut message).unwrap();
        let body = crate::header::body_element(message.document()).unwrap();
        assert_eq!(result.elements_that_were_signed()[0].element, body);
    }

    #[test]
    fn test_enveloped_signature_over_encrypted_body() {
        let transforms = format!(
            r#"<ds:Transform Algorithm="{}"/><ds:Transform Algorithm="{}"/>"#,
            algorithm::ENVELOPED_SIGNATURE,
            algorithm::EXC_C14N
        );
        let signature = signature_template(algorithm::RSA_SHA256, &[reference_with("", &transforms)], &bst_reference());
        let mut doc = parse(&envelope(&format!("{}{TIMESTAMP}{signature}", bst("X509-1"))));
        sign_all(&mut doc, &rsa_key());
        encrypt_body(&mut doc, None);
        add_encrypted_key(&mut doc, "EK-1", &["ED-1"]);

        let resolver = fixture_resolver();
        let mut message = SoapMessage::new(doc);
        let result = WssProcessor::default()
            .undecorate_message(&mut message, None, None, Some(&resolver))
            .unwrap();
        let doc = message.document();

        assert_eq!(result.elements_that_were_signed().len(), 1);
        assert_eq!(Some(result.elements_that_were_signed()[0].element), doc.root_element());
        assert_eq!(result.elements_that_were_encrypted().len(), 1);
        assert_eq!(count_named(doc, ns::ENC, ns::node::ENCRYPTED_KEY), 0);
        assert!(wssec_xml::writer::serialize(doc).contains(">42</m:order>"));
    }
}
