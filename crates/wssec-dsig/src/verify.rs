#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order:
//! 1. For each Reference: dereference the URI, run the transforms,
//!    digest, compare against DigestValue
//! 2. Canonicalize SignedInfo
//! 3. Verify SignatureValue with the caller-supplied key
//!
//! Key resolution is the caller's job; WS-Security resolves it from the
//! token model before getting here. Every reference is checked even after
//! one fails so the diagnostic names all of them.

use wssec_core::{algorithm, Error, Result};
use wssec_crypto::{CryptoEngine, SignatureKey};
use wssec_xml::{Document, NodeSet};

use crate::resolve::ReferenceResolver;
use crate::signature::{ReferenceInfo, SignatureInfo};
use crate::transforms::{TransformContext, TransformData, TransformPipeline};

/// Outcome for one Reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceValidity {
    pub uri: String,
    pub digest_valid: bool,
}

/// Outcome of verifying a Signature: per-reference digests plus the
/// SignatureValue check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureValidity {
    pub references: Vec<ReferenceValidity>,
    pub signature_value_valid: bool,
}

impl SignatureValidity {
    pub fn is_valid(&self) -> bool {
        self.signature_value_valid && self.references.iter().all(|r| r.digest_valid)
    }

    /// Human-readable account of what failed.
    pub fn diagnostic(&self) -> String {
        let mut msg = format!(
            "Signature not valid. SignedInfo: {}",
            if self.signature_value_valid {
                "signature value verified"
            } else {
                "signature value did not verify"
            }
        );
        for r in &self.references {
            msg.push_str(&format!(
                "\n\tElement {}: {}",
                r.uri,
                if r.digest_valid { "digest matched" } else { "digest mismatch" }
            ));
        }
        msg
    }
}

/// Verify `info` over `doc` with `key`.
///
/// `Ok` with an invalid [`SignatureValidity`] means the signature was
/// well-formed and simply does not verify; `Err` means it could not be
/// evaluated (unresolvable reference, unsupported algorithm, wrong key type).
pub fn verify(
    doc: &Document,
    info: &SignatureInfo,
    key: &SignatureKey,
    resolver: &dyn ReferenceResolver,
    engine: &dyn CryptoEngine,
) -> Result<SignatureValidity> {
    check_hmac_output_length(info, key)?;

    let ctx = TransformContext {
        doc,
        engine,
        resolver,
        signature: info.node,
    };

    let mut references = Vec::with_capacity(info.references.len());
    for reference in &info.references {
        let computed = reference_digest(&ctx, reference)?;
        let digest_valid = computed == reference.digest_value;
        if !digest_valid {
            tracing::debug!(uri = %reference.uri, "reference digest mismatch");
        }
        references.push(ReferenceValidity {
            uri: reference.uri.clone(),
            digest_valid,
        });
    }

    let signed_info = signed_info_octets(doc, info, engine)?;
    let signature_value_valid =
        engine.verify_signature(&info.signature_method, key, &signed_info, &info.signature_value)?;

    Ok(SignatureValidity {
        references,
        signature_value_valid,
    })
}

/// Dereference, transform and digest one Reference.
pub fn reference_digest(ctx: &TransformContext<'_>, reference: &ReferenceInfo) -> Result<Vec<u8>> {
    let resolved = ctx.resolver.resolve(ctx.doc, &reference.uri)?;
    let pipeline = TransformPipeline::from_infos(&reference.transforms)?;
    let data = pipeline.execute(ctx, TransformData::from_resolved(ctx.doc, resolved))?;
    let octets = data.into_octets(ctx)?;
    ctx.engine.digest(&reference.digest_method, &octets)
}

/// Canonical SignedInfo, the input to the SignatureValue.
pub fn signed_info_octets(
    doc: &Document,
    info: &SignatureInfo,
    engine: &dyn CryptoEngine,
) -> Result<Vec<u8>> {
    let set = NodeSet::tree_without_comments(info.signed_info, doc);
    engine.canonicalize(doc, &info.c14n_method, Some(&set), &info.inclusive_prefixes)
}

fn check_hmac_output_length(info: &SignatureInfo, key: &SignatureKey) -> Result<()> {
    let Some(bits) = info.hmac_output_length else {
        return Ok(());
    };
    if !algorithm::is_hmac(&info.signature_method) || !key.is_symmetric() {
        return Err(Error::InvalidDocumentFormat(
            "HMACOutputLength on a non-HMAC signature".into(),
        ));
    }
    if bits % 8 != 0 || bits / 8 != info.signature_value.len() {
        return Err(Error::InvalidDocumentFormat(format!(
            "HMACOutputLength {bits} does not match a {}-byte SignatureValue",
            info.signature_value.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::IdReferenceResolver;
    use crate::sign::{sign_template, SIGNATURE_TEMPLATE_HMAC};
    use wssec_crypto::SoftwareEngine;
    use wssec_xml::{IdAttributeConfig, IdIndex};

    fn signed_doc(template: &str, key: &SignatureKey) -> Document {
        let mut doc = Document::parse(template).unwrap();
        let index = IdIndex::build(&doc, IdAttributeConfig::wss_default());
        sign_template(&mut doc, key, &IdReferenceResolver::new(&index), &SoftwareEngine::new())
            .unwrap();
        doc
    }

    fn check(doc: &Document, key: &SignatureKey) -> Result<SignatureValidity> {
        let index = IdIndex::build(doc, IdAttributeConfig::wss_default());
        let sig = doc
            .find_descendant(doc.root(), wssec_core::ns::DSIG, "Signature")
            .unwrap();
        let info = SignatureInfo::parse(doc, sig)?;
        verify(doc, &info, key, &IdReferenceResolver::new(&index), &SoftwareEngine::new())
    }

    #[test]
    fn test_hmac_round_trip() {
        let key = SignatureKey::Hmac(b"0123456789abcdef0123".to_vec());
        let doc = signed_doc(SIGNATURE_TEMPLATE_HMAC, &key);
        let validity = check(&doc, &key).unwrap();
        assert!(validity.is_valid(), "{}", validity.diagnostic());
        assert_eq!(validity.references.len(), 2);
    }

    #[test]
    fn test_wrong_key_fails_signature_value_only() {
        let key = SignatureKey::Hmac(b"0123456789abcdef0123".to_vec());
        let doc = signed_doc(SIGNATURE_TEMPLATE_HMAC, &key);
        let validity = check(&doc, &SignatureKey::Hmac(b"another key entirely".to_vec())).unwrap();
        assert!(!validity.is_valid());
        assert!(!validity.signature_value_valid);
        assert!(validity.references.iter().all(|r| r.digest_valid));
        assert!(validity.diagnostic().contains("did not verify"));
    }

    #[test]
    fn test_tampered_body_fails_digest() {
        let key = SignatureKey::Hmac(b"0123456789abcdef0123".to_vec());
        let doc = signed_doc(SIGNATURE_TEMPLATE_HMAC, &key);
        let text = wssec_xml::writer::serialize(&doc).replace(">order 42<", ">order 43<");
        let tampered = Document::parse(&text).unwrap();
        let validity = check(&tampered, &key).unwrap();
        assert!(validity.signature_value_valid);
        assert_eq!(
            validity.references.iter().filter(|r| !r.digest_valid).count(),
            1
        );
        assert!(validity.diagnostic().contains("#Body-1: digest mismatch"));
    }

    #[test]
    fn test_rsa_signature_over_envelope() {
        let key = SignatureKey::Rsa(wssec_keys::fixtures::private_key());
        let template = SIGNATURE_TEMPLATE_HMAC
            .replace(algorithm::HMAC_SHA1, algorithm::RSA_SHA256)
            .replace(r##"URI="#Body-1""##, r##"URI="""##)
            .replace(
                r#"<ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>"#,
                r#"<ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/><ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>"#,
            );
        let doc = signed_doc(&template, &key);
        let public = wssec_keys::fixtures::certificate().public_key().unwrap();
        let validity = check(&doc, &public).unwrap();
        assert!(validity.is_valid(), "{}", validity.diagnostic());
    }

    #[test]
    fn test_hmac_output_length_must_match() {
        let key = SignatureKey::Hmac(b"0123456789abcdef0123".to_vec());
        let template = SIGNATURE_TEMPLATE_HMAC.replace(
            r#"<ds:SignatureMethod Algorithm="http://www.w3.org/2000/09/xmldsig#hmac-sha1"/>"#,
            r#"<ds:SignatureMethod Algorithm="http://www.w3.org/2000/09/xmldsig#hmac-sha1"><ds:HMACOutputLength>80</ds:HMACOutputLength></ds:SignatureMethod>"#,
        );
        let doc = signed_doc(&template, &key);
        let err = check(&doc, &key).unwrap_err();
        assert!(matches!(err, Error::InvalidDocumentFormat(_)));
    }

    #[test]
    fn test_missing_reference_target() {
        let key = SignatureKey::Hmac(b"0123456789abcdef0123".to_vec());
        let doc = signed_doc(SIGNATURE_TEMPLATE_HMAC, &key);
        let text = wssec_xml::writer::serialize(&doc).replace(r#"wsu:Id="Body-1""#, r#"wsu:Id="Body-2""#);
        let err = check(&Document::parse(&text).unwrap(), &key).unwrap_err();
        assert!(matches!(err, Error::InvalidUri(_)));
    }
}
