#![forbid(unsafe_code)]

//! The crypto engine seam.
//!
//! Every primitive the processor needs (canonicalize, digest, verify,
//! decrypt, unwrap, derive) goes through [`CryptoEngine`]. Tests swap in
//! counting or failing engines; production uses [`SoftwareEngine`].

use std::sync::Arc;

use wssec_c14n::C14nMode;
use wssec_core::{Error, Result};
use wssec_xml::{Document, NodeSet};

use crate::cache::SignatureVerifyCache;
use crate::keytransport::OaepParams;
use crate::sign::SignatureKey;
use crate::{cipher, digest, kdf, keytransport, sign};

pub trait CryptoEngine: Send + Sync {
    /// Canonicalize `doc` (or the subset in `node_set`) with the algorithm
    /// named by `c14n_uri`.
    fn canonicalize(
        &self,
        doc: &Document,
        c14n_uri: &str,
        node_set: Option<&NodeSet>,
        inclusive_prefixes: &[String],
    ) -> Result<Vec<u8>>;

    fn digest(&self, digest_uri: &str, data: &[u8]) -> Result<Vec<u8>>;

    /// `Ok(false)` for a well-formed signature that does not verify;
    /// `Err` for unusable input (wrong key type, malformed signature bytes).
    fn verify_signature(
        &self,
        signature_uri: &str,
        key: &SignatureKey,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool>;

    fn decrypt(&self, cipher_uri: &str, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;

    fn unwrap_key(
        &self,
        transport_uri: &str,
        private_key: &rsa::RsaPrivateKey,
        wrapped: &[u8],
        params: &OaepParams,
    ) -> Result<Vec<u8>>;

    fn derive_key(
        &self,
        kdf_uri: Option<&str>,
        secret: &[u8],
        label: &[u8],
        nonce: &[u8],
        offset: usize,
        length: usize,
    ) -> Result<Vec<u8>>;
}

/// RustCrypto-backed engine with an optional shared verify cache.
#[derive(Debug, Default, Clone)]
pub struct SoftwareEngine {
    verify_cache: Option<Arc<SignatureVerifyCache>>,
}

impl SoftwareEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verify_cache(mut self, cache: Arc<SignatureVerifyCache>) -> Self {
        self.verify_cache = Some(cache);
        self
    }

    pub fn verify_cache(&self) -> Option<&Arc<SignatureVerifyCache>> {
        self.verify_cache.as_ref()
    }
}

impl CryptoEngine for SoftwareEngine {
    fn canonicalize(
        &self,
        doc: &Document,
        c14n_uri: &str,
        node_set: Option<&NodeSet>,
        inclusive_prefixes: &[String],
    ) -> Result<Vec<u8>> {
        let mode = C14nMode::from_uri(c14n_uri)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("canonicalization: {c14n_uri}")))?;
        wssec_c14n::canonicalize(doc, mode, node_set, inclusive_prefixes)
    }

    fn digest(&self, digest_uri: &str, data: &[u8]) -> Result<Vec<u8>> {
        digest::digest(digest_uri, data)
    }

    fn verify_signature(
        &self,
        signature_uri: &str,
        key: &SignatureKey,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        let alg = sign::from_uri(signature_uri)?;
        let cache_key = self
            .verify_cache
            .as_ref()
            .map(|_| SignatureVerifyCache::key(data, signature, key));
        if let (Some(cache), Some(k)) = (&self.verify_cache, &cache_key) {
            if cache.contains(k) {
                tracing::trace!("signature verify cache hit");
                return Ok(true);
            }
        }
        let ok = alg.verify(key, data, signature)?;
        if ok {
            if let (Some(cache), Some(k)) = (&self.verify_cache, cache_key) {
                cache.record_success(k);
            }
        }
        Ok(ok)
    }

    fn decrypt(&self, cipher_uri: &str, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        cipher::from_uri(cipher_uri)?.decrypt(key, ciphertext)
    }

    fn unwrap_key(
        &self,
        transport_uri: &str,
        private_key: &rsa::RsaPrivateKey,
        wrapped: &[u8],
        params: &OaepParams,
    ) -> Result<Vec<u8>> {
        keytransport::from_uri(transport_uri, params.clone())?.decrypt(private_key, wrapped)
    }

    fn derive_key(
        &self,
        kdf_uri: Option<&str>,
        secret: &[u8],
        label: &[u8],
        nonce: &[u8],
        offset: usize,
        length: usize,
    ) -> Result<Vec<u8>> {
        kdf::derive_key(kdf_uri, secret, label, nonce, offset, length)
    }
}
