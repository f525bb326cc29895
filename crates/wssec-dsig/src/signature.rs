#![forbid(unsafe_code)]

//! Parsed view of a `<ds:Signature>` element.
//!
//! Parsing reads everything verification needs out of the tree up front:
//! the SignedInfo algorithms, each Reference with its transform chain and
//! expected digest, and the SignatureValue bytes. Nothing is resolved or
//! checked here.

use base64::Engine;
use wssec_core::{algorithm, ns, Error, Result};
use wssec_xml::{Document, NodeId};

/// One `<ds:Transform>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformInfo {
    pub algorithm: String,
    pub node: NodeId,
    /// Exclusive C14N `InclusiveNamespaces/@PrefixList`.
    pub inclusive_prefixes: Vec<String>,
    /// STR-Transform `TransformationParameters/CanonicalizationMethod`.
    pub parameter_c14n: Option<String>,
}

/// One `<ds:Reference>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceInfo {
    pub node: NodeId,
    pub uri: String,
    pub transforms: Vec<TransformInfo>,
    pub digest_method: String,
    pub digest_value: Vec<u8>,
}

impl ReferenceInfo {
    /// The `#id` this reference points at, if it is a same-document one.
    pub fn target_id(&self) -> Option<&str> {
        wssec_xml::uri::parse_same_document_ref(&self.uri)
    }

    pub fn has_transform(&self, uri: &str) -> bool {
        self.transforms.iter().any(|t| t.algorithm == uri)
    }
}

/// A parsed `<ds:Signature>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub node: NodeId,
    pub id: Option<String>,
    pub signed_info: NodeId,
    pub c14n_method: String,
    pub inclusive_prefixes: Vec<String>,
    pub signature_method: String,
    pub hmac_output_length: Option<usize>,
    pub signature_value: Vec<u8>,
    /// SignatureValue text with whitespace removed, as echoed in
    /// SignatureConfirmation.
    pub signature_value_text: String,
    pub references: Vec<ReferenceInfo>,
    pub key_info: Option<NodeId>,
}

impl SignatureInfo {
    /// Parse the Signature element at `node`.
    pub fn parse(doc: &Document, node: NodeId) -> Result<Self> {
        if !doc.is_named(node, ns::DSIG, ns::node::SIGNATURE) {
            return Err(Error::InvalidDocumentFormat(format!(
                "expected ds:Signature, found {}",
                doc.local_name(node).unwrap_or("?")
            )));
        }

        let signed_info = doc
            .find_child(node, ns::DSIG, ns::node::SIGNED_INFO)
            .ok_or_else(|| Error::MissingElement("SignedInfo".into()))?;

        let c14n_node = doc
            .find_child(signed_info, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
            .ok_or_else(|| Error::MissingElement("CanonicalizationMethod".into()))?;
        let c14n_method = required_algorithm(doc, c14n_node, "CanonicalizationMethod")?;
        let inclusive_prefixes = read_inclusive_prefixes(doc, c14n_node);

        let method_node = doc
            .find_child(signed_info, ns::DSIG, ns::node::SIGNATURE_METHOD)
            .ok_or_else(|| Error::MissingElement("SignatureMethod".into()))?;
        let signature_method = required_algorithm(doc, method_node, "SignatureMethod")?;
        let hmac_output_length = match doc.find_child(method_node, ns::DSIG, ns::node::HMAC_OUTPUT_LENGTH) {
            Some(n) => Some(doc.text_content(n).trim().parse::<usize>().map_err(|_| {
                Error::InvalidDocumentFormat("HMACOutputLength is not a number".into())
            })?),
            None => None,
        };

        let references = doc
            .find_children(signed_info, ns::DSIG, ns::node::REFERENCE)
            .into_iter()
            .map(|r| parse_reference(doc, r))
            .collect::<Result<Vec<_>>>()?;
        if references.is_empty() {
            return Err(Error::InvalidDocumentFormat("SignedInfo has no Reference".into()));
        }

        let value_node = doc
            .find_child(node, ns::DSIG, ns::node::SIGNATURE_VALUE)
            .ok_or_else(|| Error::MissingElement("SignatureValue".into()))?;
        let signature_value_text = strip_whitespace(&doc.text_content(value_node));
        let signature_value = base64::engine::general_purpose::STANDARD
            .decode(&signature_value_text)
            .map_err(|e| Error::Base64(format!("SignatureValue: {e}")))?;

        Ok(Self {
            node,
            id: doc.attribute(node, ns::attr::ID).map(str::to_owned),
            signed_info,
            c14n_method,
            inclusive_prefixes,
            signature_method,
            hmac_output_length,
            signature_value,
            signature_value_text,
            references,
            key_info: doc.find_child(node, ns::DSIG, ns::node::KEY_INFO),
        })
    }

    /// Distinct digest algorithms across all references.
    pub fn digest_methods(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for r in &self.references {
            if !out.contains(&r.digest_method) {
                out.push(r.digest_method.clone());
            }
        }
        out
    }

    /// True when any reference covers the whole document (`URI=""`).
    pub fn covers_whole_document(&self) -> bool {
        self.references.iter().any(|r| r.uri.is_empty())
    }
}

fn parse_reference(doc: &Document, node: NodeId) -> Result<ReferenceInfo> {
    let uri = doc.attribute(node, ns::attr::URI).unwrap_or("").to_owned();

    let transforms = match doc.find_child(node, ns::DSIG, ns::node::TRANSFORMS) {
        Some(list) => doc
            .find_children(list, ns::DSIG, ns::node::TRANSFORM)
            .into_iter()
            .map(|t| parse_transform(doc, t))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let digest_node = doc
        .find_child(node, ns::DSIG, ns::node::DIGEST_METHOD)
        .ok_or_else(|| Error::MissingElement("DigestMethod".into()))?;
    let digest_method = required_algorithm(doc, digest_node, "DigestMethod")?;

    let value_node = doc
        .find_child(node, ns::DSIG, ns::node::DIGEST_VALUE)
        .ok_or_else(|| Error::MissingElement("DigestValue".into()))?;
    let digest_value = base64::engine::general_purpose::STANDARD
        .decode(strip_whitespace(&doc.text_content(value_node)))
        .map_err(|e| Error::Base64(format!("DigestValue: {e}")))?;

    Ok(ReferenceInfo {
        node,
        uri,
        transforms,
        digest_method,
        digest_value,
    })
}

fn parse_transform(doc: &Document, node: NodeId) -> Result<TransformInfo> {
    let algorithm = required_algorithm(doc, node, "Transform")?;
    let parameter_c14n = if algorithm == algorithm::STR_TRANSFORM {
        doc.child_elements(node)
            .find(|c| doc.local_name(*c) == Some(ns::node::TRANSFORMATION_PARAMETERS))
            .and_then(|p| {
                doc.child_elements(p)
                    .find(|c| doc.is_named(*c, ns::DSIG, ns::node::CANONICALIZATION_METHOD))
            })
            .and_then(|c| doc.attribute(c, ns::attr::ALGORITHM))
            .map(str::to_owned)
    } else {
        None
    };
    Ok(TransformInfo {
        inclusive_prefixes: read_inclusive_prefixes(doc, node),
        algorithm,
        node,
        parameter_c14n,
    })
}

fn required_algorithm(doc: &Document, node: NodeId, what: &str) -> Result<String> {
    doc.attribute(node, ns::attr::ALGORITHM)
        .map(str::to_owned)
        .ok_or_else(|| Error::MissingAttribute(format!("Algorithm on {what}")))
}

/// `InclusiveNamespaces/@PrefixList` under `node`.
pub fn read_inclusive_prefixes(doc: &Document, node: NodeId) -> Vec<String> {
    doc.child_elements(node)
        .find(|c| doc.is_named(*c, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES))
        .and_then(|c| doc.attribute(c, ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNATURE: &str = r##"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#" Id="Sig-1">
  <ds:SignedInfo>
    <ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#">
      <ec:InclusiveNamespaces xmlns:ec="http://www.w3.org/2001/10/xml-exc-c14n#" PrefixList="soap #default"/>
    </ds:CanonicalizationMethod>
    <ds:SignatureMethod Algorithm="http://www.w3.org/2000/09/xmldsig#hmac-sha1">
      <ds:HMACOutputLength>160</ds:HMACOutputLength>
    </ds:SignatureMethod>
    <ds:Reference URI="#Body-1">
      <ds:Transforms>
        <ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
      </ds:Transforms>
      <ds:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"/>
      <ds:DigestValue>AAEC
        AwQ=</ds:DigestValue>
    </ds:Reference>
    <ds:Reference URI="#STR-1">
      <ds:Transforms>
        <ds:Transform Algorithm="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#STR-Transform">
          <wsse:TransformationParameters xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">
            <ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
          </wsse:TransformationParameters>
        </ds:Transform>
      </ds:Transforms>
      <ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>
      <ds:DigestValue>AAEC</ds:DigestValue>
    </ds:Reference>
  </ds:SignedInfo>
  <ds:SignatureValue>c2ln
  bmF0dXJl</ds:SignatureValue>
  <ds:KeyInfo/>
</ds:Signature>"##;

    fn parse(xml: &str) -> Result<SignatureInfo> {
        let doc = Document::parse(xml).unwrap();
        SignatureInfo::parse(&doc, doc.root_element().unwrap())
    }

    #[test]
    fn test_parse_full_signature() {
        let info = parse(SIGNATURE).unwrap();
        assert_eq!(info.id.as_deref(), Some("Sig-1"));
        assert_eq!(info.c14n_method, algorithm::EXC_C14N);
        assert_eq!(info.inclusive_prefixes, vec!["soap", "#default"]);
        assert_eq!(info.signature_method, algorithm::HMAC_SHA1);
        assert_eq!(info.hmac_output_length, Some(160));
        assert_eq!(info.signature_value, b"signature");
        assert_eq!(info.signature_value_text, "c2lnbmF0dXJl");
        assert!(info.key_info.is_some());

        assert_eq!(info.references.len(), 2);
        let body = &info.references[0];
        assert_eq!(body.target_id(), Some("Body-1"));
        assert_eq!(body.digest_value, vec![0, 1, 2, 3, 4]);
        assert!(body.has_transform(algorithm::EXC_C14N));

        let str_ref = &info.references[1];
        assert_eq!(
            str_ref.transforms[0].parameter_c14n.as_deref(),
            Some(algorithm::EXC_C14N)
        );
        assert_eq!(info.digest_methods(), vec![algorithm::SHA1, algorithm::SHA256]);
        assert!(!info.covers_whole_document());
    }

    #[test]
    fn test_missing_signed_info() {
        let err = parse(r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"/>"#).unwrap_err();
        assert!(matches!(err, Error::MissingElement(_)));
    }

    #[test]
    fn test_not_a_signature() {
        let err = parse("<Signature/>").unwrap_err();
        assert!(matches!(err, Error::InvalidDocumentFormat(_)));
    }

    #[test]
    fn test_bad_signature_value_base64() {
        let xml = SIGNATURE.replace("c2ln\n  bmF0dXJl", "!!!");
        assert!(matches!(parse(&xml).unwrap_err(), Error::Base64(_)));
    }
}
