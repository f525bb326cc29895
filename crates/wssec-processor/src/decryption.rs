#![forbid(unsafe_code)]

//! Decryption of EncryptedKeys, ReferenceLists and the data they name.
//!
//! Decrypted plaintext replaces the EncryptedData in the live document. An
//! `wsse11:EncryptedHeader` is replaced as a whole by the header block it
//! carried. After each replacement the id index is rebuilt, so ids that
//! only exist in plaintext become resolvable.

use wssec_core::{ns, Error, Result};
use wssec_enc::{decrypt_in_place, parse_reference_list, EncryptedDataInfo, EncryptedKeyInfo};
use wssec_xml::writer::serialize_node;
use wssec_xml::NodeId;

use crate::processor::{security_child, Walk};
use crate::result::EncryptedElement;
use crate::token::{EncryptedKeyToken, SecurityToken};

/// Notified when decryption fails although a key was found.
///
/// The handler learns which EncryptedData failed and with which
/// algorithm, never why; callers use it to answer every failure the same
/// way.
pub trait DecryptionErrorHandler: Send + Sync {
    fn on_decryption_failure(&self, encrypted_data_id: Option<&str>, algorithm: &str);
}

impl Walk<'_> {
    pub(crate) fn process_encrypted_key(&mut self, element: NodeId) -> Result<()> {
        let info = EncryptedKeyInfo::parse(self.message.document(), element)?;

        let private_key = match self.recipient_private_key(info.key_info) {
            Ok(key) => key,
            Err(Error::UnexpectedKeyInfo(reason)) if !self.actor.is_explicit() => {
                tracing::info!(%reason, "EncryptedKey is not for this recipient; leaving it in place");
                self.encryption_ignored = true;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.last_key_encryption_algorithm = Some(info.method.clone());

        let data_references = info.data_references.clone();
        let reference_list = info.reference_list;
        let token = self
            .tokens
            .push(SecurityToken::EncryptedKey(EncryptedKeyToken::new(info, private_key)));
        if data_references.is_empty() {
            // unwrapped when something refers to it
            return Ok(());
        }

        let secret = self.token_secret(token)?;
        for id in &data_references {
            let target = self.find_encrypted(id)?;
            self.decrypt_element(target, &secret)?;
        }
        if let Some(list) = reference_list {
            let doc = self.message.document_writable();
            if doc.is_attached(list) {
                doc.remove(list)?;
            }
        }
        self.processed_encrypted_keys.push(element);
        Ok(())
    }

    /// A ReferenceList directly in the Security header; each EncryptedData
    /// names its key through its own KeyInfo.
    pub(crate) fn process_reference_list(&mut self, list: NodeId) -> Result<()> {
        let ids = parse_reference_list(self.message.document(), list)?;
        for id in ids {
            let target = self.find_encrypted(&id)?;
            let doc = self.message.document();
            let data_node = if doc.is_named(target, ns::WSSE11, ns::node::ENCRYPTED_HEADER) {
                doc.find_child(target, ns::ENC, ns::node::ENCRYPTED_DATA)
                    .ok_or_else(|| Error::InvalidDocumentFormat("EncryptedHeader has no EncryptedData".into()))?
            } else {
                target
            };
            let key_info = EncryptedDataInfo::parse(doc, data_node)?.key_info.ok_or_else(|| {
                Error::InvalidDocumentFormat(format!("EncryptedData {id} has no KeyInfo"))
            })?;

            let token = match security_child(doc, key_info, ns::node::SECURITY_TOKEN_REFERENCE) {
                Some(str_element) => self.resolve_str(str_element)?,
                None => None,
            };
            let Some(token) = token.filter(|t| self.tokens.get(*t).as_secret_source().is_some()) else {
                tracing::info!(%id, "no key for EncryptedData; leaving it encrypted");
                self.encryption_ignored = true;
                continue;
            };
            let secret = self.token_secret(token)?;
            self.decrypt_element(target, &secret)?;
        }
        Ok(())
    }

    fn find_encrypted(&self, id: &str) -> Result<NodeId> {
        self.index.find(self.message.document(), id).ok_or_else(|| {
            Error::InvalidDocumentFormat(format!("cannot find encrypted element {id} referenced by ReferenceList"))
        })
    }

    /// Decrypt the EncryptedData (or EncryptedHeader) `target` with `key`.
    pub(crate) fn decrypt_element(&mut self, target: NodeId, key: &[u8]) -> Result<()> {
        let doc = self.message.document();
        let (data_node, wrapper) = if doc.is_named(target, ns::ENC, ns::node::ENCRYPTED_DATA) {
            (target, None)
        } else if doc.is_named(target, ns::WSSE11, ns::node::ENCRYPTED_HEADER) {
            let inner = doc
                .find_child(target, ns::ENC, ns::node::ENCRYPTED_DATA)
                .ok_or_else(|| Error::InvalidDocumentFormat("EncryptedHeader has no EncryptedData".into()))?;
            (inner, Some(target))
        } else {
            return Err(Error::InvalidDocumentFormat(format!(
                "reference does not point at EncryptedData: {}",
                doc.local_name(target).unwrap_or("?")
            )));
        };
        if wrapper.is_some() {
            self.wss11_seen = true;
        }
        let info = EncryptedDataInfo::parse(doc, data_node)?;

        let engine = self.engine;
        let doc = self.message.document_writable();
        let decrypted = match decrypt_in_place(doc, &info, key, engine) {
            Ok(d) => d,
            Err(e) => {
                if let Some(handler) = self.error_handler {
                    handler.on_decryption_failure(info.id.as_deref(), &info.method);
                }
                return Err(e);
            }
        };

        match wrapper {
            Some(wrapper) => {
                let block = decrypted.inserted_elements(doc).next().ok_or_else(|| {
                    Error::InvalidDocumentFormat("EncryptedHeader did not contain a header block".into())
                })?;
                let xml = serialize_node(doc, block);
                let inserted = doc.replace_with_fragment(wrapper, &xml)?;
                let promoted = inserted
                    .into_iter()
                    .find(|n| doc.is_element(*n))
                    .ok_or_else(|| Error::InvalidDocumentFormat("decrypted header block is empty".into()))?;
                self.encrypted_elements.push(EncryptedElement {
                    element: promoted,
                    algorithm: decrypted.algorithm.clone(),
                });
            }
            None if decrypted.whole_parent => self.encrypted_elements.push(EncryptedElement {
                element: decrypted.parent,
                algorithm: decrypted.algorithm.clone(),
            }),
            None => {
                for element in decrypted.inserted_elements(doc) {
                    self.encrypted_elements.push(EncryptedElement {
                        element,
                        algorithm: decrypted.algorithm.clone(),
                    });
                }
            }
        }
        self.index.rebuild(doc);
        self.index.check_unique()?;
        tracing::debug!(id = ?info.id, algorithm = %decrypted.algorithm, "EncryptedData decrypted");
        Ok(())
    }
}
