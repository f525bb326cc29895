#![forbid(unsafe_code)]

//! Collaborators that supply key material from outside the message.
//!
//! [`SecurityTokenResolver`] finds certificates, private keys, Kerberos
//! session keys and cached EncryptedKey secrets. [`SecurityContextFinder`]
//! looks up WS-SecureConversation and Kerberos security contexts. Both are
//! shared across concurrent processing runs, so implementations must be
//! `Send + Sync`; the in-memory versions here guard their mutable state
//! with `parking_lot` locks.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;

use base64::Engine;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use wssec_keys::X509Certificate;

/// Default capacity of the EncryptedKeySHA1 secret cache.
pub const DEFAULT_SECRET_CACHE_CAPACITY: usize = 1000;

pub trait SecurityTokenResolver: Send + Sync {
    /// Certificate whose SHA-1 thumbprint is `thumbprint` (raw bytes).
    fn lookup_by_thumbprint(&self, thumbprint: &[u8]) -> Option<X509Certificate>;

    /// Certificate whose subject key identifier is `ski` (raw bytes).
    fn lookup_by_ski(&self, ski: &[u8]) -> Option<X509Certificate>;

    fn lookup_by_issuer_serial(&self, issuer: &str, serial: &str) -> Option<X509Certificate>;

    /// The private key matching `cert`, if we hold it.
    fn private_key_for(&self, cert: &X509Certificate) -> Option<rsa::RsaPrivateKey>;

    /// Session key for the Kerberos ticket with base64 SHA-1 `ap_req_sha1`.
    fn kerberos_session_key(&self, ap_req_sha1: &str) -> Option<Vec<u8>>;

    /// A previously unwrapped EncryptedKey secret.
    fn secret_for_encrypted_key_sha1(&self, encrypted_key_sha1: &str) -> Option<Vec<u8>>;

    fn put_secret_for_encrypted_key_sha1(&self, encrypted_key_sha1: &str, secret: &[u8]);
}

struct Entry {
    certificate: X509Certificate,
    thumbprint: [u8; 20],
    ski: Vec<u8>,
    private_key: Option<rsa::RsaPrivateKey>,
}

/// In-memory resolver over a fixed set of certificates and keys, with a
/// bounded LRU cache of unwrapped EncryptedKey secrets.
pub struct SimpleSecurityTokenResolver {
    entries: Vec<Entry>,
    kerberos: HashMap<String, Vec<u8>>,
    secrets: Option<Mutex<LruCache<String, Vec<u8>>>>,
}

impl SimpleSecurityTokenResolver {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            kerberos: HashMap::new(),
            secrets: Some(Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_SECRET_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ))),
        }
    }

    pub fn with_certificate(mut self, certificate: X509Certificate, private_key: Option<rsa::RsaPrivateKey>) -> Self {
        self.entries.push(Entry {
            thumbprint: certificate.thumbprint_sha1(),
            ski: certificate.subject_key_identifier(),
            certificate,
            private_key,
        });
        self
    }

    /// Register a Kerberos session key under the base64 SHA-1 of its AP-REQ.
    pub fn with_kerberos_session_key(mut self, ap_req_sha1: &str, session_key: Vec<u8>) -> Self {
        self.kerberos.insert(ap_req_sha1.to_owned(), session_key);
        self
    }

    /// Resize the secret cache; a capacity of 0 disables it.
    pub fn with_secret_cache_capacity(mut self, capacity: usize) -> Self {
        self.secrets = NonZeroUsize::new(capacity).map(|c| Mutex::new(LruCache::new(c)));
        self
    }

    pub fn cached_secret_count(&self) -> usize {
        self.secrets.as_ref().map_or(0, |s| s.lock().len())
    }
}

impl Default for SimpleSecurityTokenResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimpleSecurityTokenResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleSecurityTokenResolver")
            .field("certificates", &self.entries.len())
            .field("kerberos", &self.kerberos.len())
            .field("cached_secrets", &self.cached_secret_count())
            .finish()
    }
}

impl SecurityTokenResolver for SimpleSecurityTokenResolver {
    fn lookup_by_thumbprint(&self, thumbprint: &[u8]) -> Option<X509Certificate> {
        self.entries
            .iter()
            .find(|e| e.thumbprint == thumbprint)
            .map(|e| e.certificate.clone())
    }

    fn lookup_by_ski(&self, ski: &[u8]) -> Option<X509Certificate> {
        self.entries.iter().find(|e| e.ski == ski).map(|e| e.certificate.clone())
    }

    fn lookup_by_issuer_serial(&self, issuer: &str, serial: &str) -> Option<X509Certificate> {
        self.entries
            .iter()
            .find(|e| e.certificate.matches_issuer_serial(issuer, serial))
            .map(|e| e.certificate.clone())
    }

    fn private_key_for(&self, cert: &X509Certificate) -> Option<rsa::RsaPrivateKey> {
        self.entries
            .iter()
            .find(|e| &e.certificate == cert)
            .and_then(|e| e.private_key.clone())
    }

    fn kerberos_session_key(&self, ap_req_sha1: &str) -> Option<Vec<u8>> {
        self.kerberos.get(ap_req_sha1).cloned()
    }

    fn secret_for_encrypted_key_sha1(&self, encrypted_key_sha1: &str) -> Option<Vec<u8>> {
        self.secrets.as_ref()?.lock().get(encrypted_key_sha1).cloned()
    }

    fn put_secret_for_encrypted_key_sha1(&self, encrypted_key_sha1: &str, secret: &[u8]) {
        if let Some(secrets) = &self.secrets {
            secrets.lock().put(encrypted_key_sha1.to_owned(), secret.to_vec());
        }
    }
}

// ── Security contexts ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityContextKind {
    /// A WS-SecureConversation context, looked up by `wsc:Identifier`.
    SecureConversation,
    /// A Kerberos context, looked up by the base64 SHA-1 of the AP-REQ.
    Kerberos,
}

/// Shared secret established out of band.
#[derive(Clone)]
pub struct SecurityContext {
    pub shared_secret: Vec<u8>,
    /// Certificate of the party that established the context, if known.
    pub certificate: Option<X509Certificate>,
}

impl SecurityContext {
    pub fn new(shared_secret: Vec<u8>) -> Self {
        Self {
            shared_secret,
            certificate: None,
        }
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("shared_secret", &format_args!("{} bytes", self.shared_secret.len()))
            .field("certificate", &self.certificate.as_ref().map(|c| c.subject_dn()))
            .finish()
    }
}

pub trait SecurityContextFinder: Send + Sync {
    fn security_context(&self, kind: SecurityContextKind, identifier: &str) -> Option<SecurityContext>;
}

/// Contexts held in memory.
#[derive(Debug, Default)]
pub struct InMemorySecurityContextFinder {
    contexts: RwLock<HashMap<(SecurityContextKind, String), SecurityContext>>,
}

impl InMemorySecurityContextFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: SecurityContextKind, identifier: &str, context: SecurityContext) {
        self.contexts.write().insert((kind, identifier.to_owned()), context);
    }

    pub fn remove(&self, kind: SecurityContextKind, identifier: &str) -> Option<SecurityContext> {
        self.contexts.write().remove(&(kind, identifier.to_owned()))
    }
}

impl SecurityContextFinder for InMemorySecurityContextFinder {
    fn security_context(&self, kind: SecurityContextKind, identifier: &str) -> Option<SecurityContext> {
        self.contexts.read().get(&(kind, identifier.to_owned())).cloned()
    }
}

/// Base64 form used for thumbprints and key identifiers in log output.
pub(crate) fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wssec_keys::fixtures;

    fn decode(s: &str) -> Vec<u8> {
        base64::engine::general_purpose::STANDARD.decode(s).unwrap()
    }

    #[test]
    fn test_certificate_lookups() {
        let resolver = SimpleSecurityTokenResolver::new()
            .with_certificate(fixtures::certificate(), Some(fixtures::private_key()));
        let cert = resolver
            .lookup_by_thumbprint(&decode(fixtures::CERT_THUMBPRINT_B64))
            .unwrap();
        assert_eq!(cert, fixtures::certificate());
        assert!(resolver.lookup_by_ski(&decode(fixtures::CERT_SKI_B64)).is_some());
        assert!(resolver
            .lookup_by_issuer_serial(fixtures::CERT_ISSUER_DN, fixtures::CERT_SERIAL)
            .is_some());
        assert!(resolver.lookup_by_issuer_serial(fixtures::CERT_ISSUER_DN, "1").is_none());
        assert!(resolver.private_key_for(&cert).is_some());
        assert!(resolver.lookup_by_thumbprint(&[0u8; 20]).is_none());
    }

    #[test]
    fn test_secret_cache_is_bounded() {
        let resolver = SimpleSecurityTokenResolver::new().with_secret_cache_capacity(2);
        resolver.put_secret_for_encrypted_key_sha1("a", b"1");
        resolver.put_secret_for_encrypted_key_sha1("b", b"2");
        assert_eq!(resolver.secret_for_encrypted_key_sha1("a").as_deref(), Some(&b"1"[..]));
        resolver.put_secret_for_encrypted_key_sha1("c", b"3");
        // "b" was least recently used
        assert!(resolver.secret_for_encrypted_key_sha1("b").is_none());
        assert_eq!(resolver.cached_secret_count(), 2);
    }

    #[test]
    fn test_disabled_secret_cache() {
        let resolver = SimpleSecurityTokenResolver::new().with_secret_cache_capacity(0);
        resolver.put_secret_for_encrypted_key_sha1("a", b"1");
        assert!(resolver.secret_for_encrypted_key_sha1("a").is_none());
    }

    #[test]
    fn test_context_finder() {
        let finder = InMemorySecurityContextFinder::new();
        finder.insert(SecurityContextKind::SecureConversation, "urn:ctx", SecurityContext::new(vec![7; 16]));
        assert!(finder
            .security_context(SecurityContextKind::SecureConversation, "urn:ctx")
            .is_some());
        assert!(finder.security_context(SecurityContextKind::Kerberos, "urn:ctx").is_none());
        assert!(finder.remove(SecurityContextKind::SecureConversation, "urn:ctx").is_some());
        assert!(finder
            .security_context(SecurityContextKind::SecureConversation, "urn:ctx")
            .is_none());
    }

    #[test]
    fn test_shared_across_threads() {
        let resolver = std::sync::Arc::new(SimpleSecurityTokenResolver::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let r = resolver.clone();
                std::thread::spawn(move || {
                    let key = format!("k{i}");
                    r.put_secret_for_encrypted_key_sha1(&key, &[i as u8]);
                    r.secret_for_encrypted_key_sha1(&key)
                })
            })
            .collect();
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.join().unwrap(), Some(vec![i as u8]));
        }
    }
}
