#![forbid(unsafe_code)]

//! WS-SecureConversation key derivation (P_SHA1 from TLS 1.0).
//!
//! ```text
//! A(0) = seed
//! A(i) = HMAC_SHA1(secret, A(i-1))
//! P_SHA1(secret, seed) = HMAC_SHA1(secret, A(1) || seed) || HMAC_SHA1(secret, A(2) || seed) || ...
//! ```
//!
//! For a DerivedKeyToken the seed is `label || nonce`, and the key is the
//! `length` bytes of the stream starting at `offset`.

use hmac::{Hmac, Mac};
use wssec_core::{algorithm, Error};

type HmacSha1 = Hmac<sha1::Sha1>;

/// Largest derived key accepted, in bytes.
pub const MAX_DERIVED_KEY_LEN: usize = 1024;

/// Derive a key with the algorithm named by `uri` (P_SHA1 when `None`).
pub fn derive_key(
    uri: Option<&str>,
    secret: &[u8],
    label: &[u8],
    nonce: &[u8],
    offset: usize,
    length: usize,
) -> Result<Vec<u8>, Error> {
    match uri {
        None | Some(algorithm::P_SHA1_2005_02) | Some(algorithm::P_SHA1_1_3) => {
            let mut seed = Vec::with_capacity(label.len() + nonce.len());
            seed.extend_from_slice(label);
            seed.extend_from_slice(nonce);
            p_sha1(secret, &seed, offset, length)
        }
        Some(other) => Err(Error::UnsupportedAlgorithm(format!("key derivation: {other}"))),
    }
}

/// The `length` bytes of the P_SHA1 stream starting at `offset`.
pub fn p_sha1(secret: &[u8], seed: &[u8], offset: usize, length: usize) -> Result<Vec<u8>, Error> {
    if length == 0 || length > MAX_DERIVED_KEY_LEN {
        return Err(Error::Key(format!("derived key length {length} out of range")));
    }
    let total = offset
        .checked_add(length)
        .filter(|t| *t <= MAX_DERIVED_KEY_LEN * 4)
        .ok_or_else(|| Error::Key(format!("derived key offset {offset} out of range")))?;

    let mac = |data: &[&[u8]]| -> Result<Vec<u8>, Error> {
        let mut m = HmacSha1::new_from_slice(secret)
            .map_err(|e| Error::Key(format!("P_SHA1 secret: {e}")))?;
        for d in data {
            m.update(d);
        }
        Ok(m.finalize().into_bytes().to_vec())
    };

    let mut out = Vec::with_capacity(total + 20);
    let mut a = seed.to_vec();
    while out.len() < total {
        a = mac(&[&a])?;
        out.extend_from_slice(&mac(&[&a, seed])?);
    }
    Ok(out[offset..total].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL: &[u8] = b"WS-SecureConversationWS-SecureConversation";

    #[test]
    fn test_p_sha1_known_vector() {
        let key = derive_key(None, b"secret", LABEL, b"nonce", 0, 32).unwrap();
        assert_eq!(
            hex::encode(key),
            "f083452a7247df8456a8f4b2b13e3e14c5f926a1c67d5ec2052173144c480408"
        );
    }

    #[test]
    fn test_p_sha1_offset() {
        let key = derive_key(Some(algorithm::P_SHA1_2005_02), b"secret", LABEL, b"nonce", 16, 32).unwrap();
        assert_eq!(
            hex::encode(key),
            "c5f926a1c67d5ec2052173144c4804088a1dbf21ba7dcd6bc60db58f0a6c188c"
        );
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert!(p_sha1(b"s", b"seed", 0, 0).is_err());
        assert!(p_sha1(b"s", b"seed", usize::MAX, 16).is_err());
    }

    #[test]
    fn test_unknown_algorithm() {
        assert!(derive_key(Some("urn:kdf"), b"s", LABEL, b"n", 0, 16).is_err());
    }
}
