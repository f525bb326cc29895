#![forbid(unsafe_code)]

//! XML-Enc encryption.
//!
//! The processor only decrypts. These helpers produce the messages it
//! consumes: encrypt an element or its content in place, and build an
//! `<EncryptedKey>` that wraps the content key for a recipient.

use base64::Engine;
use wssec_core::{ns, Error, Result};
use wssec_crypto::OaepParams;
use wssec_xml::writer::{escape_attr, serialize_node};
use wssec_xml::{Document, NodeId};

use crate::encrypted::EncryptionType;

/// Encrypt `target` (or its content) with `key` and put an
/// `<xenc:EncryptedData>` in its place. Returns the new EncryptedData node.
///
/// `key_info_xml` is inserted verbatim as the EncryptedData's KeyInfo; any
/// prefix it uses must be declared in it or on an ancestor of `target`.
pub fn encrypt_in_place(
    doc: &mut Document,
    target: NodeId,
    kind: EncryptionType,
    cipher_uri: &str,
    key: &[u8],
    id: &str,
    key_info_xml: Option<&str>,
) -> Result<NodeId> {
    if !doc.is_element(target) {
        return Err(Error::Processor("encryption target is not an element".into()));
    }

    let plaintext = match kind {
        EncryptionType::Element => serialize_node(doc, target),
        EncryptionType::Content => doc
            .children(target)
            .map(|c| serialize_node(doc, c))
            .collect::<String>(),
    };

    let ciphertext = wssec_crypto::cipher::from_uri(cipher_uri)?.encrypt(key, plaintext.as_bytes())?;
    let cipher_b64 = base64::engine::general_purpose::STANDARD.encode(ciphertext);

    let fragment = format!(
        r#"<xenc:EncryptedData xmlns:xenc="{enc}" Id="{id}" Type="{ty}"><xenc:EncryptionMethod Algorithm="{alg}"/>{ki}<xenc:CipherData><xenc:CipherValue>{cipher_b64}</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData>"#,
        enc = ns::ENC,
        id = escape_attr(id),
        ty = kind.uri(),
        alg = escape_attr(cipher_uri),
        ki = key_info_xml.unwrap_or(""),
    );

    let inserted = match kind {
        EncryptionType::Element => doc.replace_with_fragment(target, &fragment)?,
        EncryptionType::Content => {
            let children: Vec<NodeId> = doc.children(target).collect();
            for child in children {
                doc.remove(child)?;
            }
            doc.insert_fragment(target, None, &fragment)?
        }
    };
    inserted
        .into_iter()
        .find(|n| doc.is_element(*n))
        .ok_or_else(|| Error::Processor("EncryptedData was not inserted".into()))
}

/// Wrap `key` for `public_key` with a key transport algorithm.
pub fn wrap_key(public_key: &rsa::RsaPublicKey, transport_uri: &str, key: &[u8]) -> Result<Vec<u8>> {
    wssec_crypto::keytransport::from_uri(transport_uri, OaepParams::default())?.encrypt(public_key, key)
}

/// A standalone `<xenc:EncryptedKey>` carrying `key` wrapped for
/// `public_key`, with a ReferenceList naming `data_references` (ids
/// without `#`). An empty `id` omits the Id attribute.
pub fn encrypted_key_xml(
    public_key: &rsa::RsaPublicKey,
    transport_uri: &str,
    key: &[u8],
    id: &str,
    key_info_xml: &str,
    data_references: &[&str],
) -> Result<String> {
    let wrapped = wrap_key(public_key, transport_uri, key)?;
    let cipher_b64 = base64::engine::general_purpose::STANDARD.encode(wrapped);

    let mut out = format!(r#"<xenc:EncryptedKey xmlns:xenc="{}""#, ns::ENC);
    if !id.is_empty() {
        out.push_str(&format!(r#" Id="{}""#, escape_attr(id)));
    }
    out.push_str(&format!(
        r#"><xenc:EncryptionMethod Algorithm="{}"/>{key_info_xml}<xenc:CipherData><xenc:CipherValue>{cipher_b64}</xenc:CipherValue></xenc:CipherData>"#,
        escape_attr(transport_uri)
    ));
    if !data_references.is_empty() {
        out.push_str("<xenc:ReferenceList>");
        for r in data_references {
            out.push_str(&format!(r##"<xenc:DataReference URI="#{}"/>"##, escape_attr(r)));
        }
        out.push_str("</xenc:ReferenceList>");
    }
    out.push_str("</xenc:EncryptedKey>");
    Ok(out)
}
