#![forbid(unsafe_code)]

//! XML-Enc decryption.
//!
//! Processing order:
//! 1. Unwrap the content-encryption key from an `<EncryptedKey>` (or take
//!    a key the caller already resolved, e.g. a derived key)
//! 2. Decrypt the `<EncryptedData>` CipherValue with the EncryptionMethod
//! 3. Replace `<EncryptedData>` in the live document with the plaintext,
//!    parsed as a fragment in the namespace context of its parent

use wssec_core::{algorithm, Error, Result};
use wssec_crypto::CryptoEngine;
use wssec_xml::{Document, NodeId, NodeKind};

use crate::encrypted::{EncryptedDataInfo, EncryptedKeyInfo};

/// What a decrypt-and-replace changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    /// The EncryptionMethod that was used.
    pub algorithm: String,
    /// Element that held the EncryptedData.
    pub parent: NodeId,
    /// Top-level nodes parsed out of the plaintext.
    pub inserted: Vec<NodeId>,
    /// The EncryptedData was the only non-whitespace content of `parent`.
    pub whole_parent: bool,
}

impl Decrypted {
    /// Inserted nodes that are elements.
    pub fn inserted_elements<'a>(&'a self, doc: &'a Document) -> impl Iterator<Item = NodeId> + 'a {
        self.inserted.iter().copied().filter(|n| doc.is_element(*n))
    }
}

/// Unwrap the symmetric key carried by `ek` with `private_key`.
pub fn unwrap_key(
    engine: &dyn CryptoEngine,
    ek: &EncryptedKeyInfo,
    private_key: &rsa::RsaPrivateKey,
) -> Result<Vec<u8>> {
    match ek.method.as_str() {
        algorithm::RSA_PKCS1 | algorithm::RSA_OAEP => {
            engine.unwrap_key(&ek.method, private_key, &ek.cipher_value, &ek.oaep)
        }
        other => Err(Error::UnsupportedAlgorithm(format!("EncryptedKey method: {other}"))),
    }
}

/// Decrypt `data` with `key` and splice the plaintext into `doc` in place
/// of the EncryptedData element.
pub fn decrypt_in_place(
    doc: &mut Document,
    data: &EncryptedDataInfo,
    key: &[u8],
    engine: &dyn CryptoEngine,
) -> Result<Decrypted> {
    let parent = doc
        .parent(data.node)
        .ok_or_else(|| Error::InvalidDocumentFormat("EncryptedData has no parent".into()))?;
    let whole_parent = is_only_content(doc, parent, data.node);

    let expected = key_length_for_algorithm(&data.method);
    let effective_key = if expected > 0 && key.len() > expected {
        &key[..expected]
    } else {
        key
    };

    let plaintext = engine.decrypt(&data.method, effective_key, &data.cipher_value)?;
    let text = String::from_utf8(plaintext)
        .map_err(|e| Error::Decryption(format!("plaintext is not valid UTF-8: {e}")))?;

    let inserted = doc.replace_with_fragment(data.node, &text)?;
    tracing::debug!(
        algorithm = %data.method,
        nodes = inserted.len(),
        whole_parent,
        "EncryptedData replaced"
    );
    Ok(Decrypted {
        algorithm: data.method.clone(),
        parent,
        inserted,
        whole_parent,
    })
}

/// True when `child` is the only child of `parent` apart from whitespace
/// text.
pub fn is_only_content(doc: &Document, parent: NodeId, child: NodeId) -> bool {
    doc.children(parent).all(|c| {
        c == child
            || matches!(doc.node_kind(c), Some(NodeKind::Text(t)) if t.trim().is_empty())
    })
}

/// Key size the cipher wants; longer keys (derived keys default to 32
/// bytes) are truncated to it.
fn key_length_for_algorithm(uri: &str) -> usize {
    match uri {
        algorithm::AES128_CBC | algorithm::AES128_GCM => 16,
        algorithm::AES192_CBC | algorithm::AES192_GCM => 24,
        algorithm::AES256_CBC | algorithm::AES256_GCM => 32,
        algorithm::TRIPLEDES_CBC => 24,
        _ => 0,
    }
}
