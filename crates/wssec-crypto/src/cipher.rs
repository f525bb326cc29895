#![forbid(unsafe_code)]

//! Block ciphers used for EncryptedData and EncryptedHeader payloads.
//!
//! XML Encryption carries the IV (or GCM nonce) in front of the
//! ciphertext; both directions below use that layout.

use wssec_core::{algorithm, Error};

/// A symmetric content-encryption algorithm.
pub trait CipherAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn key_size(&self) -> usize;
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error>;
    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Create a cipher algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn CipherAlgorithm>, Error> {
    match uri {
        algorithm::AES128_CBC => Ok(Box::new(Cbc { uri: algorithm::AES128_CBC, kind: CbcKind::Aes128 })),
        algorithm::AES192_CBC => Ok(Box::new(Cbc { uri: algorithm::AES192_CBC, kind: CbcKind::Aes192 })),
        algorithm::AES256_CBC => Ok(Box::new(Cbc { uri: algorithm::AES256_CBC, kind: CbcKind::Aes256 })),
        algorithm::TRIPLEDES_CBC => Ok(Box::new(Cbc { uri: algorithm::TRIPLEDES_CBC, kind: CbcKind::TripleDes })),
        algorithm::AES128_GCM => Ok(Box::new(AesGcm { uri: algorithm::AES128_GCM, key_size: 16 })),
        algorithm::AES192_GCM => Ok(Box::new(AesGcm { uri: algorithm::AES192_GCM, key_size: 24 })),
        algorithm::AES256_GCM => Ok(Box::new(AesGcm { uri: algorithm::AES256_GCM, key_size: 32 })),
        _ => Err(Error::UnsupportedAlgorithm(format!("cipher: {uri}"))),
    }
}

fn check_key(expected: usize, key: &[u8]) -> Result<(), Error> {
    if key.len() != expected {
        return Err(Error::Key(format!(
            "expected {expected} byte key, got {}",
            key.len()
        )));
    }
    Ok(())
}

// ── CBC (AES and 3DES) ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum CbcKind {
    Aes128,
    Aes192,
    Aes256,
    TripleDes,
}

impl CbcKind {
    fn key_size(self) -> usize {
        match self {
            CbcKind::Aes128 => 16,
            CbcKind::Aes192 | CbcKind::TripleDes => 24,
            CbcKind::Aes256 => 32,
        }
    }

    fn block_size(self) -> usize {
        match self {
            CbcKind::TripleDes => 8,
            _ => 16,
        }
    }
}

struct Cbc {
    uri: &'static str,
    kind: CbcKind,
}

impl CipherAlgorithm for Cbc {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn key_size(&self) -> usize {
        self.kind.key_size()
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        use cbc::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};
        use rand::RngCore;

        check_key(self.key_size(), key)?;
        let bs = self.kind.block_size();
        let mut iv = vec![0u8; bs];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut buf = pkcs7_pad(plaintext, bs);
        let buf_len = buf.len();

        macro_rules! do_encrypt {
            ($c:ty) => {{
                let enc = cbc::Encryptor::<$c>::new_from_slices(key, &iv)
                    .map_err(|e| Error::Crypto(format!("CBC init: {e}")))?;
                enc.encrypt_padded_mut::<NoPadding>(&mut buf, buf_len)
                    .map_err(|e| Error::Crypto(format!("CBC encrypt: {e}")))?;
            }};
        }
        match self.kind {
            CbcKind::Aes128 => do_encrypt!(aes::Aes128),
            CbcKind::Aes192 => do_encrypt!(aes::Aes192),
            CbcKind::Aes256 => do_encrypt!(aes::Aes256),
            CbcKind::TripleDes => do_encrypt!(des::TdesEde3),
        }

        iv.extend_from_slice(&buf);
        Ok(iv)
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};

        check_key(self.key_size(), key)?;
        let bs = self.kind.block_size();
        if data.len() < 2 * bs || data.len() % bs != 0 {
            return Err(Error::Decryption(format!(
                "{} ciphertext has invalid length {}",
                self.uri,
                data.len()
            )));
        }

        let (iv, ciphertext) = data.split_at(bs);
        let mut buf = ciphertext.to_vec();

        macro_rules! do_decrypt {
            ($c:ty) => {{
                let dec = cbc::Decryptor::<$c>::new_from_slices(key, iv)
                    .map_err(|e| Error::Crypto(format!("CBC init: {e}")))?;
                dec.decrypt_padded_mut::<NoPadding>(&mut buf)
                    .map_err(|e| Error::Decryption(format!("CBC decrypt: {e}")))?;
            }};
        }
        match self.kind {
            CbcKind::Aes128 => do_decrypt!(aes::Aes128),
            CbcKind::Aes192 => do_decrypt!(aes::Aes192),
            CbcKind::Aes256 => do_decrypt!(aes::Aes256),
            CbcKind::TripleDes => do_decrypt!(des::TdesEde3),
        }

        xmlenc_unpad(&buf, bs)
    }
}

// ── AES-GCM ──────────────────────────────────────────────────────────

const GCM_NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;

struct AesGcm {
    uri: &'static str,
    key_size: usize,
}

impl CipherAlgorithm for AesGcm {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn key_size(&self) -> usize {
        self.key_size
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        use aes_gcm::{aead::Aead, KeyInit, Nonce};
        use rand::RngCore;

        check_key(self.key_size, key)?;
        let mut out = vec![0u8; GCM_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut out);
        let nonce = Nonce::from_slice(&out[..GCM_NONCE_LEN]).to_owned();

        macro_rules! do_encrypt {
            ($c:ty) => {{
                let cipher = <$c>::new_from_slice(key)
                    .map_err(|e| Error::Crypto(format!("AES-GCM init: {e}")))?;
                cipher
                    .encrypt(&nonce, plaintext)
                    .map_err(|e| Error::Crypto(format!("AES-GCM encrypt: {e}")))?
            }};
        }
        let ct = match self.key_size {
            16 => do_encrypt!(aes_gcm::Aes128Gcm),
            24 => do_encrypt!(aes_gcm::AesGcm<aes::Aes192, aes_gcm::aead::consts::U12>),
            _ => do_encrypt!(aes_gcm::Aes256Gcm),
        };
        out.extend_from_slice(&ct);
        Ok(out)
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        use aes_gcm::{aead::Aead, KeyInit, Nonce};

        check_key(self.key_size, key)?;
        if data.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
            return Err(Error::Decryption("AES-GCM ciphertext too short".into()));
        }
        let (nonce, ct_and_tag) = data.split_at(GCM_NONCE_LEN);
        let nonce = Nonce::from_slice(nonce);

        macro_rules! do_decrypt {
            ($c:ty) => {{
                let cipher = <$c>::new_from_slice(key)
                    .map_err(|e| Error::Crypto(format!("AES-GCM init: {e}")))?;
                cipher
                    .decrypt(nonce, ct_and_tag)
                    .map_err(|_| Error::Decryption("AES-GCM authentication failed".into()))
            }};
        }
        match self.key_size {
            16 => do_decrypt!(aes_gcm::Aes128Gcm),
            24 => do_decrypt!(aes_gcm::AesGcm<aes::Aes192, aes_gcm::aead::consts::U12>),
            _ => do_decrypt!(aes_gcm::Aes256Gcm),
        }
    }
}

// ── Padding ──────────────────────────────────────────────────────────

fn pkcs7_pad(data: &[u8], block_size: usize) -> Vec<u8> {
    let pad_len = block_size - (data.len() % block_size);
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    padded
}

/// Strip XML Encryption block padding.
///
/// Only the final byte is meaningful; the filler may be PKCS#7 or the
/// random bytes of ISO 10126.
fn xmlenc_unpad(data: &[u8], block_size: usize) -> Result<Vec<u8>, Error> {
    let Some(&pad_byte) = data.last() else {
        return Ok(Vec::new());
    };
    let pad_len = pad_byte as usize;
    if pad_len == 0 || pad_len > block_size || pad_len > data.len() {
        return Err(Error::Decryption("invalid block padding".into()));
    }
    Ok(data[..data.len() - pad_len].to_vec())
}
