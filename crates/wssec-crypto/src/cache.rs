#![forbid(unsafe_code)]

//! Bounded cache of successful signature verifications.
//!
//! Entries are keyed by a SHA-256 over `SHA-256(data)`, the signature and
//! the key fingerprint, each length-prefixed, so a hit means this exact
//! key already accepted this exact signature over this exact input.
//! Failures are never recorded.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::sign::SignatureKey;

pub const DEFAULT_CAPACITY: usize = 1000;

type CacheKey = [u8; 32];

/// Shared LRU of verification results. Construct one per processor and
/// hand it to the engine; it is safe to use from many threads.
pub struct SignatureVerifyCache {
    inner: Mutex<LruCache<CacheKey, ()>>,
}

impl SignatureVerifyCache {
    pub fn new(capacity: usize) -> Self {
        let size = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(size)),
        }
    }

    pub fn key(data: &[u8], signature: &[u8], key: &SignatureKey) -> CacheKey {
        use sha2::{Digest, Sha256};
        let mut h = Sha256::new();
        let data_digest = Sha256::digest(data);
        let fingerprint = key.fingerprint_bytes();
        for field in [data_digest.as_slice(), signature, fingerprint.as_slice()] {
            h.update((field.len() as u64).to_be_bytes());
            h.update(field);
        }
        h.finalize().into()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().get(key).is_some()
    }

    pub fn record_success(&self, key: CacheKey) {
        self.inner.lock().put(key, ());
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SignatureVerifyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for SignatureVerifyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SignatureVerifyCache")
            .field("len", &inner.len())
            .field("cap", &inner.cap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_depends_on_every_input() {
        let k = SignatureKey::Hmac(vec![1; 16]);
        let base = SignatureVerifyCache::key(b"data", b"sig", &k);
        assert_ne!(base, SignatureVerifyCache::key(b"datb", b"sig", &k));
        assert_ne!(base, SignatureVerifyCache::key(b"data", b"sih", &k));
        assert_ne!(base, SignatureVerifyCache::key(b"data", b"sig", &SignatureKey::Hmac(vec![2; 16])));
    }

    #[test]
    fn test_key_fields_are_framed() {
        let mut shifted = vec![b'g'];
        shifted.extend_from_slice(&[1; 16]);
        assert_ne!(
            SignatureVerifyCache::key(b"data", b"sig", &SignatureKey::Hmac(vec![1; 16])),
            SignatureVerifyCache::key(b"data", b"si", &SignatureKey::Hmac(shifted))
        );
    }

    #[test]
    fn test_eviction() {
        let cache = SignatureVerifyCache::new(2);
        let k = SignatureKey::Hmac(vec![1; 16]);
        let a = SignatureVerifyCache::key(b"a", b"s", &k);
        let b = SignatureVerifyCache::key(b"b", b"s", &k);
        let c = SignatureVerifyCache::key(b"c", b"s", &k);
        cache.record_success(a);
        cache.record_success(b);
        cache.record_success(c);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&a));
        assert!(cache.contains(&c));
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let cache = SignatureVerifyCache::new(0);
        cache.record_success([0u8; 32]);
        assert_eq!(cache.len(), 1);
    }
}
