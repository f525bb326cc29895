#![forbid(unsafe_code)]

//! Signature algorithm implementations (RSA PKCS#1 v1.5, ECDSA, HMAC).
//!
//! Verification is the production path. Signing is kept so that tests and
//! tooling can produce messages for the verifier.

use signature::SignatureEncoding;
use wssec_core::{algorithm, Error};

/// Key material for signature operations.
#[derive(Clone)]
pub enum SignatureKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP256Public(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::SigningKey),
    EcP384Public(p384::ecdsa::VerifyingKey),
    Hmac(Vec<u8>),
}

impl SignatureKey {
    /// Stable bytes identifying the verification key, for cache keys.
    pub fn fingerprint_bytes(&self) -> Vec<u8> {
        match self {
            SignatureKey::Rsa(k) => rsa_public_bytes(&k.to_public_key()),
            SignatureKey::RsaPublic(k) => rsa_public_bytes(k),
            SignatureKey::EcP256(k) => k.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
            SignatureKey::EcP256Public(k) => k.to_encoded_point(false).as_bytes().to_vec(),
            SignatureKey::EcP384(k) => k.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
            SignatureKey::EcP384Public(k) => k.to_encoded_point(false).as_bytes().to_vec(),
            SignatureKey::Hmac(k) => k.clone(),
        }
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(self, SignatureKey::Hmac(_))
    }
}

fn rsa_public_bytes(key: &rsa::RsaPublicKey) -> Vec<u8> {
    use rsa::traits::PublicKeyParts;
    let n = key.n().to_bytes_be();
    let mut out = (n.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(&n);
    out.extend_from_slice(&key.e().to_bytes_be());
    out
}

impl std::fmt::Debug for SignatureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            SignatureKey::Rsa(_) => "Rsa",
            SignatureKey::RsaPublic(_) => "RsaPublic",
            SignatureKey::EcP256(_) => "EcP256",
            SignatureKey::EcP256Public(_) => "EcP256Public",
            SignatureKey::EcP384(_) => "EcP384",
            SignatureKey::EcP384Public(_) => "EcP384Public",
            SignatureKey::Hmac(_) => "Hmac",
        };
        f.debug_tuple("SignatureKey").field(&kind).finish()
    }
}

/// Trait for signature algorithms.
pub trait SignatureAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn sign(&self, key: &SignatureKey, data: &[u8]) -> Result<Vec<u8>, Error>;
    fn verify(&self, key: &SignatureKey, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    match uri {
        algorithm::RSA_SHA1 => Ok(Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA1, hash: HashType::Sha1 })),
        algorithm::RSA_SHA256 => Ok(Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA256, hash: HashType::Sha256 })),
        algorithm::RSA_SHA384 => Ok(Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA384, hash: HashType::Sha384 })),
        algorithm::RSA_SHA512 => Ok(Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA512, hash: HashType::Sha512 })),

        algorithm::ECDSA_SHA1 => Ok(Box::new(Ecdsa { uri: algorithm::ECDSA_SHA1, hash: HashType::Sha1 })),
        algorithm::ECDSA_SHA256 => Ok(Box::new(Ecdsa { uri: algorithm::ECDSA_SHA256, hash: HashType::Sha256 })),
        algorithm::ECDSA_SHA384 => Ok(Box::new(Ecdsa { uri: algorithm::ECDSA_SHA384, hash: HashType::Sha384 })),

        algorithm::HMAC_SHA1 => Ok(Box::new(HmacSign { uri: algorithm::HMAC_SHA1, hash: HashType::Sha1 })),
        algorithm::HMAC_SHA256 => Ok(Box::new(HmacSign { uri: algorithm::HMAC_SHA256, hash: HashType::Sha256 })),
        algorithm::HMAC_SHA384 => Ok(Box::new(HmacSign { uri: algorithm::HMAC_SHA384, hash: HashType::Sha384 })),
        algorithm::HMAC_SHA512 => Ok(Box::new(HmacSign { uri: algorithm::HMAC_SHA512, hash: HashType::Sha512 })),

        _ => Err(Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}"))),
    }
}

#[derive(Debug, Clone, Copy)]
enum HashType {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashType {
    fn output_len(self) -> usize {
        match self {
            HashType::Sha1 => 20,
            HashType::Sha256 => 32,
            HashType::Sha384 => 48,
            HashType::Sha512 => 64,
        }
    }
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    uri: &'static str,
    hash: HashType,
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SignatureKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        let SignatureKey::Rsa(private_key) = key else {
            return Err(Error::Key("RSA private key required".into()));
        };
        macro_rules! do_sign {
            ($hasher:ty) => {{
                let sk = rsa::pkcs1v15::SigningKey::<$hasher>::new(private_key.clone());
                Ok(sk.sign(data).to_vec())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_sign!(sha1::Sha1),
            HashType::Sha256 => do_sign!(sha2::Sha256),
            HashType::Sha384 => do_sign!(sha2::Sha384),
            HashType::Sha512 => do_sign!(sha2::Sha512),
        }
    }

    fn verify(&self, key: &SignatureKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let public_key = match key {
            SignatureKey::Rsa(pk) => pk.to_public_key(),
            SignatureKey::RsaPublic(pk) => pk.clone(),
            _ => return Err(Error::Key("RSA key required".into())),
        };
        let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key);
                Ok(vk.verify(data, &sig).is_ok())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_verify!(sha1::Sha1),
            HashType::Sha256 => do_verify!(sha2::Sha256),
            HashType::Sha384 => do_verify!(sha2::Sha384),
            HashType::Sha512 => do_verify!(sha2::Sha512),
        }
    }
}

// ── ECDSA ────────────────────────────────────────────────────────────

/// The curve comes from the key; the URI only fixes the digest, so both
/// directions work on a prehash.
struct Ecdsa {
    uri: &'static str,
    hash: HashType,
}

impl HashType {
    fn digest(self, data: &[u8]) -> Vec<u8> {
        use sha2::Digest;
        match self {
            HashType::Sha1 => sha1::Sha1::digest(data).to_vec(),
            HashType::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashType::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashType::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-256.
pub fn xmldsig_to_p256(rs: &[u8]) -> Result<p256::ecdsa::Signature, Error> {
    if rs.len() != 64 {
        return Err(Error::Crypto(format!("P-256 signature must be 64 bytes, got {}", rs.len())));
    }
    let r = p256::FieldBytes::from_slice(&rs[..32]);
    let s = p256::FieldBytes::from_slice(&rs[32..]);
    p256::ecdsa::Signature::from_scalars(*r, *s)
        .map_err(|e| Error::Crypto(format!("invalid P-256 signature: {e}")))
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-384.
pub fn xmldsig_to_p384(rs: &[u8]) -> Result<p384::ecdsa::Signature, Error> {
    if rs.len() != 96 {
        return Err(Error::Crypto(format!("P-384 signature must be 96 bytes, got {}", rs.len())));
    }
    let r = p384::FieldBytes::from_slice(&rs[..48]);
    let s = p384::FieldBytes::from_slice(&rs[48..]);
    p384::ecdsa::Signature::from_scalars(*r, *s)
        .map_err(|e| Error::Crypto(format!("invalid P-384 signature: {e}")))
}

impl SignatureAlgorithm for Ecdsa {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SignatureKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::hazmat::PrehashSigner;
        let prehash = self.hash.digest(data);
        match key {
            SignatureKey::EcP256(sk) => {
                let sig: p256::ecdsa::Signature = sk
                    .sign_prehash(&prehash)
                    .map_err(|e| Error::Crypto(format!("ECDSA sign: {e}")))?;
                Ok(sig.to_bytes().to_vec())
            }
            SignatureKey::EcP384(sk) => {
                let sig: p384::ecdsa::Signature = sk
                    .sign_prehash(&prehash)
                    .map_err(|e| Error::Crypto(format!("ECDSA sign: {e}")))?;
                Ok(sig.to_bytes().to_vec())
            }
            _ => Err(Error::Key("EC signing key required".into())),
        }
    }

    fn verify(&self, key: &SignatureKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::hazmat::PrehashVerifier;
        let prehash = self.hash.digest(data);
        match key {
            SignatureKey::EcP256(sk) => {
                let sig = xmldsig_to_p256(sig_bytes)?;
                Ok(sk.verifying_key().verify_prehash(&prehash, &sig).is_ok())
            }
            SignatureKey::EcP256Public(vk) => {
                let sig = xmldsig_to_p256(sig_bytes)?;
                Ok(vk.verify_prehash(&prehash, &sig).is_ok())
            }
            SignatureKey::EcP384(sk) => {
                let sig = xmldsig_to_p384(sig_bytes)?;
                Ok(sk.verifying_key().verify_prehash(&prehash, &sig).is_ok())
            }
            SignatureKey::EcP384Public(vk) => {
                let sig = xmldsig_to_p384(sig_bytes)?;
                Ok(vk.verify_prehash(&prehash, &sig).is_ok())
            }
            _ => Err(Error::Key("EC key required".into())),
        }
    }
}

// ── HMAC ─────────────────────────────────────────────────────────────

struct HmacSign {
    uri: &'static str,
    hash: HashType,
}

impl SignatureAlgorithm for HmacSign {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SignatureKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        let SignatureKey::Hmac(key_bytes) = key else {
            return Err(Error::Key("HMAC key required".into()));
        };
        compute_hmac(self.hash, key_bytes, data)
    }

    fn verify(&self, key: &SignatureKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let SignatureKey::Hmac(key_bytes) = key else {
            return Err(Error::Key("HMAC key required".into()));
        };
        // Truncated output is allowed down to half the digest or 80 bits.
        let min_len = (self.hash.output_len() / 2).max(10);
        if sig_bytes.len() < min_len {
            return Err(Error::Crypto(format!(
                "HMAC output of {} bytes is below the {min_len} byte minimum",
                sig_bytes.len()
            )));
        }
        let expected = compute_hmac(self.hash, key_bytes, data)?;
        Ok(constant_time_eq(&expected, sig_bytes))
    }
}

/// HMAC of `data` under `key` with the hash named by `hash`.
fn compute_hmac(hash: HashType, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    use hmac::{Hmac, Mac};
    macro_rules! hmac_compute {
        ($hasher:ty) => {{
            let mut mac = <Hmac<$hasher>>::new_from_slice(key)
                .map_err(|e| Error::Key(format!("HMAC key: {e}")))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }};
    }
    match hash {
        HashType::Sha1 => hmac_compute!(sha1::Sha1),
        HashType::Sha256 => hmac_compute!(sha2::Sha256),
        HashType::Sha384 => hmac_compute!(sha2::Sha384),
        HashType::Sha512 => hmac_compute!(sha2::Sha512),
    }
}

/// Compare `b` against the prefix of `a` of the same length.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if b.len() > a.len() {
        return false;
    }
    a[..b.len()]
        .iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
