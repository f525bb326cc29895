#![forbid(unsafe_code)]

//! XML-DSig signature creation from a template.
//!
//! The document must already contain a `<ds:Signature>` whose
//! `DigestValue` and `SignatureValue` elements are empty. Digests are
//! computed with the same transform pipeline verification uses, so a
//! template signed here verifies with [`crate::verify::verify`]. This is
//! how tests and tooling produce signed messages; the processor itself
//! only verifies.

use base64::Engine;
use wssec_core::{ns, Error, Result};
use wssec_crypto::{CryptoEngine, SignatureKey};
use wssec_xml::{Document, NodeId};

use crate::resolve::ReferenceResolver;
use crate::signature::SignatureInfo;
use crate::transforms::TransformContext;
use crate::verify::{reference_digest, signed_info_octets};

/// Fill in the first unsigned Signature template in `doc`.
pub fn sign_template(
    doc: &mut Document,
    key: &SignatureKey,
    resolver: &dyn ReferenceResolver,
    engine: &dyn CryptoEngine,
) -> Result<NodeId> {
    let signature = find_template(doc)?;
    let count = SignatureInfo::parse(doc, signature)?.references.len();

    for i in 0..count {
        let info = SignatureInfo::parse(doc, signature)?;
        let reference = &info.references[i];
        let digest = {
            let ctx = TransformContext {
                doc: &*doc,
                engine,
                resolver,
                signature,
            };
            reference_digest(&ctx, reference)?
        };
        let value_node = doc
            .find_child(reference.node, ns::DSIG, ns::node::DIGEST_VALUE)
            .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
        set_text(doc, value_node, &base64::engine::general_purpose::STANDARD.encode(digest))?;
    }

    let info = SignatureInfo::parse(doc, signature)?;
    let octets = signed_info_octets(doc, &info, engine)?;
    let value = wssec_crypto::sign::from_uri(&info.signature_method)?.sign(key, &octets)?;
    let value_node = doc
        .find_child(signature, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
    set_text(doc, value_node, &base64::engine::general_purpose::STANDARD.encode(value))?;

    Ok(signature)
}

fn find_template(doc: &Document) -> Result<NodeId> {
    doc.descendants(doc.root())
        .into_iter()
        .filter(|n| doc.is_named(*n, ns::DSIG, ns::node::SIGNATURE))
        .find(|sig| {
            doc.find_child(*sig, ns::DSIG, ns::node::SIGNATURE_VALUE)
                .is_some_and(|v| doc.text_content(v).trim().is_empty())
        })
        .ok_or_else(|| Error::MissingElement("unsigned Signature template".into()))
}

/// Replace the content of element `id` with escaped `text`.
fn set_text(doc: &mut Document, id: NodeId, text: &str) -> Result<()> {
    let name = doc
        .element(id)
        .map(|e| e.name.qualified())
        .ok_or_else(|| Error::Processor("not an element".into()))?;
    let fragment = format!("<{name}>{}</{name}>", wssec_xml::writer::escape_text(text));
    doc.replace_with_fragment(id, &fragment)?;
    Ok(())
}

/// A SOAP message with a Timestamp and Body and an HMAC-SHA1 signature
/// template over both.
#[cfg(test)]
pub(crate) const SIGNATURE_TEMPLATE_HMAC: &str = concat!(
    r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" "#,
    r#"xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">"#,
    r#"<soap:Header><wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">"#,
    r#"<wsu:Timestamp wsu:Id="Timestamp-1"><wsu:Created>2024-01-01T00:00:00Z</wsu:Created></wsu:Timestamp>"#,
    r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo>"#,
    r#"<ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>"#,
    r#"<ds:SignatureMethod Algorithm="http://www.w3.org/2000/09/xmldsig#hmac-sha1"/>"#,
    r##"<ds:Reference URI="#Body-1"><ds:Transforms>"##,
    r#"<ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/></ds:Transforms>"#,
    r#"<ds:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"/><ds:DigestValue/></ds:Reference>"#,
    r##"<ds:Reference URI="#Timestamp-1"><ds:Transforms>"##,
    r#"<ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/></ds:Transforms>"#,
    r#"<ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue/></ds:Reference>"#,
    r#"</ds:SignedInfo><ds:SignatureValue/></ds:Signature>"#,
    r#"</wsse:Security></soap:Header>"#,
    r#"<soap:Body wsu:Id="Body-1"><m:order xmlns:m="urn:example:orders">order 42</m:order></soap:Body>"#,
    r#"</soap:Envelope>"#
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::IdReferenceResolver;
    use wssec_crypto::SoftwareEngine;
    use wssec_xml::{IdAttributeConfig, IdIndex};

    #[test]
    fn test_sign_fills_every_value() {
        let mut doc = Document::parse(SIGNATURE_TEMPLATE_HMAC).unwrap();
        let index = IdIndex::build(&doc, IdAttributeConfig::wss_default());
        let key = SignatureKey::Hmac(b"0123456789abcdef".to_vec());
        let sig = sign_template(&mut doc, &key, &IdReferenceResolver::new(&index), &SoftwareEngine::new())
            .unwrap();

        let info = SignatureInfo::parse(&doc, sig).unwrap();
        assert_eq!(info.references[0].digest_value.len(), 20);
        assert_eq!(info.references[1].digest_value.len(), 32);
        assert_eq!(info.signature_value.len(), 20);
    }

    #[test]
    fn test_no_template() {
        let mut doc = Document::parse("<a/>").unwrap();
        let index = IdIndex::build(&doc, IdAttributeConfig::wss_default());
        let key = SignatureKey::Hmac(b"0123456789abcdef".to_vec());
        let err = sign_template(&mut doc, &key, &IdReferenceResolver::new(&index), &SoftwareEngine::new())
            .unwrap_err();
        assert!(matches!(err, Error::MissingElement(_)));
    }
}
