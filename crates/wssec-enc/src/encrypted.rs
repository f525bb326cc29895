#![forbid(unsafe_code)]

//! Parsed views of `<xenc:EncryptedKey>`, `<xenc:EncryptedData>` and
//! `<xenc:ReferenceList>`.

use base64::Engine;
use wssec_core::{ns, Error, Result};
use wssec_crypto::OaepParams;
use wssec_xml::{uri, Document, NodeId};

/// A parsed `<xenc:EncryptedKey>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedKeyInfo {
    pub node: NodeId,
    pub id: Option<String>,
    /// Key transport algorithm.
    pub method: String,
    pub oaep: OaepParams,
    /// The wrapped key octets.
    pub cipher_value: Vec<u8>,
    pub key_info: Option<NodeId>,
    pub reference_list: Option<NodeId>,
    /// `#`-stripped targets of the inner ReferenceList, in order.
    pub data_references: Vec<String>,
    pub recipient: Option<String>,
}

impl EncryptedKeyInfo {
    pub fn parse(doc: &Document, node: NodeId) -> Result<Self> {
        if !doc.is_named(node, ns::ENC, ns::node::ENCRYPTED_KEY) {
            return Err(Error::InvalidDocumentFormat("expected xenc:EncryptedKey".into()));
        }
        let method_node = doc
            .find_child(node, ns::ENC, ns::node::ENCRYPTION_METHOD)
            .ok_or_else(|| Error::MissingElement("EncryptionMethod on EncryptedKey".into()))?;
        let method = doc
            .attribute(method_node, ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute("Algorithm on EncryptedKey EncryptionMethod".into()))?
            .to_owned();

        let reference_list = doc.find_child(node, ns::ENC, ns::node::REFERENCE_LIST);
        let data_references = match reference_list {
            Some(list) => parse_reference_list(doc, list)?,
            None => Vec::new(),
        };

        Ok(Self {
            node,
            id: doc.attribute(node, ns::attr::ID).map(str::to_owned),
            oaep: read_oaep_params(doc, method_node)?,
            method,
            cipher_value: read_cipher_value(doc, node)?,
            key_info: doc.find_child(node, ns::DSIG, ns::node::KEY_INFO),
            reference_list,
            data_references,
            recipient: doc.attribute(node, ns::attr::RECIPIENT).map(str::to_owned),
        })
    }

    /// Base64 SHA-1 of the wrapped key, the `EncryptedKeySHA1` identifier.
    pub fn encrypted_key_sha1(&self) -> String {
        encrypted_key_sha1(&self.cipher_value)
    }
}

/// Base64 SHA-1 of wrapped key octets.
pub fn encrypted_key_sha1(cipher_value: &[u8]) -> String {
    use sha1::{Digest, Sha1};
    base64::engine::general_purpose::STANDARD.encode(Sha1::digest(cipher_value))
}

/// How the plaintext of an EncryptedData relates to what it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionType {
    Element,
    Content,
}

impl EncryptionType {
    /// Absent `Type` is read as content, which is what a fragment parse of
    /// an element plaintext also handles.
    pub fn from_uri(type_uri: Option<&str>) -> Result<Self> {
        match type_uri {
            Some(wssec_core::algorithm::TYPE_ELEMENT) => Ok(EncryptionType::Element),
            Some(wssec_core::algorithm::TYPE_CONTENT) | None => Ok(EncryptionType::Content),
            Some(other) => Err(Error::UnsupportedAlgorithm(format!(
                "EncryptedData Type: {other}"
            ))),
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            EncryptionType::Element => wssec_core::algorithm::TYPE_ELEMENT,
            EncryptionType::Content => wssec_core::algorithm::TYPE_CONTENT,
        }
    }
}

/// A parsed `<xenc:EncryptedData>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedDataInfo {
    pub node: NodeId,
    pub id: Option<String>,
    pub kind: EncryptionType,
    /// Block cipher algorithm.
    pub method: String,
    pub cipher_value: Vec<u8>,
    pub key_info: Option<NodeId>,
}

impl EncryptedDataInfo {
    pub fn parse(doc: &Document, node: NodeId) -> Result<Self> {
        if !doc.is_named(node, ns::ENC, ns::node::ENCRYPTED_DATA) {
            return Err(Error::InvalidDocumentFormat(format!(
                "expected xenc:EncryptedData, found {}",
                doc.local_name(node).unwrap_or("?")
            )));
        }
        let method_node = doc
            .find_child(node, ns::ENC, ns::node::ENCRYPTION_METHOD)
            .ok_or_else(|| Error::MissingElement("EncryptionMethod".into()))?;
        let method = doc
            .attribute(method_node, ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingAttribute("Algorithm on EncryptionMethod".into()))?
            .to_owned();
        Ok(Self {
            node,
            id: doc.attribute(node, ns::attr::ID).map(str::to_owned),
            kind: EncryptionType::from_uri(doc.attribute(node, ns::attr::TYPE))?,
            method,
            cipher_value: read_cipher_value(doc, node)?,
            key_info: doc.find_child(node, ns::DSIG, ns::node::KEY_INFO),
        })
    }
}

/// The `#`-stripped DataReference targets of a ReferenceList.
///
/// KeyReference entries are skipped. XPointer URIs are refused.
pub fn parse_reference_list(doc: &Document, list: NodeId) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for r in doc.find_children(list, ns::ENC, ns::node::DATA_REFERENCE) {
        let target = doc
            .attribute(r, ns::attr::URI)
            .ok_or_else(|| Error::MissingAttribute("URI on DataReference".into()))?;
        if uri::is_xpointer(target) {
            return Err(Error::InvalidDocumentFormat(format!(
                "XPointer references are not supported: {target}"
            )));
        }
        let id = uri::parse_same_document_ref(target).ok_or_else(|| {
            Error::InvalidDocumentFormat(format!("DataReference is not a local reference: {target}"))
        })?;
        out.push(id.to_owned());
    }
    Ok(out)
}

fn read_cipher_value(doc: &Document, node: NodeId) -> Result<Vec<u8>> {
    let cipher_data = doc
        .find_child(node, ns::ENC, ns::node::CIPHER_DATA)
        .ok_or_else(|| Error::MissingElement("CipherData".into()))?;
    if let Some(value) = doc.find_child(cipher_data, ns::ENC, ns::node::CIPHER_VALUE) {
        let clean: String = doc
            .text_content(value)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        return base64::engine::general_purpose::STANDARD
            .decode(&clean)
            .map_err(|e| Error::Base64(format!("CipherValue: {e}")));
    }
    if doc.find_child(cipher_data, ns::ENC, ns::node::CIPHER_REFERENCE).is_some() {
        return Err(Error::UnsupportedAlgorithm("CipherReference".into()));
    }
    Err(Error::MissingElement("CipherValue".into()))
}

fn read_oaep_params(doc: &Document, method: NodeId) -> Result<OaepParams> {
    let mut params = OaepParams::default();
    for child in doc.child_elements(method) {
        let local = doc.local_name(child).unwrap_or("");
        if local == ns::node::DIGEST_METHOD && doc.namespace_uri(child) == Some(ns::DSIG) {
            params.digest_uri = doc.attribute(child, ns::attr::ALGORITHM).map(str::to_owned);
        }
        if local == ns::node::OAEP_PARAMS && doc.namespace_uri(child) == Some(ns::ENC) {
            let clean: String = doc
                .text_content(child)
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            let label = base64::engine::general_purpose::STANDARD
                .decode(&clean)
                .map_err(|e| Error::Base64(format!("OAEPparams: {e}")))?;
            params.oaep_params = Some(label);
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wssec_core::algorithm;

    const EK: &str = r##"<xenc:EncryptedKey xmlns:xenc="http://www.w3.org/2001/04/xmlenc#" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" Id="EK-1" Recipient="svc">
  <xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p">
    <ds:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"/>
    <xenc:OAEPparams>bGFi ZWw=</xenc:OAEPparams>
  </xenc:EncryptionMethod>
  <ds:KeyInfo/>
  <xenc:CipherData><xenc:CipherValue>AAEC
    AwQ=</xenc:CipherValue></xenc:CipherData>
  <xenc:ReferenceList>
    <xenc:DataReference URI="#ED-1"/>
    <xenc:DataReference URI="#ED-2"/>
  </xenc:ReferenceList>
</xenc:EncryptedKey>"##;

    #[test]
    fn test_parse_encrypted_key() {
        let doc = Document::parse(EK).unwrap();
        let ek = EncryptedKeyInfo::parse(&doc, doc.root_element().unwrap()).unwrap();
        assert_eq!(ek.id.as_deref(), Some("EK-1"));
        assert_eq!(ek.method, algorithm::RSA_OAEP);
        assert_eq!(ek.oaep.digest_uri.as_deref(), Some(algorithm::SHA1));
        assert_eq!(ek.oaep.oaep_params.as_deref(), Some(&b"label"[..]));
        assert_eq!(ek.cipher_value, vec![0, 1, 2, 3, 4]);
        assert_eq!(ek.data_references, vec!["ED-1", "ED-2"]);
        assert_eq!(ek.recipient.as_deref(), Some("svc"));
        assert!(ek.key_info.is_some());
        // sha1(00 01 02 03 04)
        assert_eq!(ek.encrypted_key_sha1(), "HPJRRy1Z+Pres6sljpCZnYSRvhk=");
    }

    #[test]
    fn test_parse_encrypted_data() {
        let xml = r#"<xenc:EncryptedData xmlns:xenc="http://www.w3.org/2001/04/xmlenc#" Id="ED-1" Type="http://www.w3.org/2001/04/xmlenc#Element"><xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes128-cbc"/><xenc:CipherData><xenc:CipherValue>AAAA</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData>"#;
        let doc = Document::parse(xml).unwrap();
        let ed = EncryptedDataInfo::parse(&doc, doc.root_element().unwrap()).unwrap();
        assert_eq!(ed.kind, EncryptionType::Element);
        assert_eq!(ed.method, algorithm::AES128_CBC);
        assert_eq!(ed.cipher_value, vec![0, 0, 0]);
        assert!(ed.key_info.is_none());
    }

    #[test]
    fn test_cipher_reference_unsupported() {
        let xml = r#"<xenc:EncryptedData xmlns:xenc="http://www.w3.org/2001/04/xmlenc#"><xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes128-cbc"/><xenc:CipherData><xenc:CipherReference URI="cid:x"/></xenc:CipherData></xenc:EncryptedData>"#;
        let doc = Document::parse(xml).unwrap();
        let err = EncryptedDataInfo::parse(&doc, doc.root_element().unwrap()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn test_reference_list_rejects_xpointer() {
        let xml = r##"<xenc:ReferenceList xmlns:xenc="http://www.w3.org/2001/04/xmlenc#"><xenc:DataReference URI="#xpointer(id('a'))"/></xenc:ReferenceList>"##;
        let doc = Document::parse(xml).unwrap();
        let err = parse_reference_list(&doc, doc.root_element().unwrap()).unwrap_err();
        assert!(matches!(err, Error::InvalidDocumentFormat(_)));
    }

    #[test]
    fn test_unknown_type() {
        assert!(EncryptionType::from_uri(Some("urn:mime")).is_err());
        assert_eq!(EncryptionType::from_uri(None).unwrap(), EncryptionType::Content);
    }
}
