#![forbid(unsafe_code)]

//! Key transport algorithms (RSA PKCS#1 v1.5, RSA-OAEP with MGF1-SHA1).

use wssec_core::{algorithm, Error};

/// Trait for key transport algorithms.
pub trait KeyTransportAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error>;
    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>, Error>;
}

/// RSA-OAEP parameters carried by an EncryptionMethod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OaepParams {
    /// DigestMethod URI; SHA-1 when absent.
    pub digest_uri: Option<String>,
    /// Decoded OAEPparams label.
    pub oaep_params: Option<Vec<u8>>,
}

/// Create a key transport algorithm from its URI.
pub fn from_uri(uri: &str, params: OaepParams) -> Result<Box<dyn KeyTransportAlgorithm>, Error> {
    match uri {
        algorithm::RSA_PKCS1 => Ok(Box::new(RsaPkcs1Transport)),
        algorithm::RSA_OAEP => Ok(Box::new(RsaOaepTransport { params })),
        _ => Err(Error::UnsupportedAlgorithm(format!("key transport: {uri}"))),
    }
}

struct RsaPkcs1Transport;

impl KeyTransportAlgorithm for RsaPkcs1Transport {
    fn uri(&self) -> &'static str {
        algorithm::RSA_PKCS1
    }

    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error> {
        use rsa::Pkcs1v15Encrypt;
        public_key
            .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, key_data)
            .map_err(|e| Error::Crypto(format!("RSA PKCS#1 encrypt: {e}")))
    }

    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        use rsa::Pkcs1v15Encrypt;
        private_key
            .decrypt(Pkcs1v15Encrypt, encrypted)
            .map_err(|e| Error::Decryption(format!("RSA PKCS#1 decrypt: {e}")))
    }
}

/// `rsa-oaep-mgf1p`: the mask generation function is always MGF1 with
/// SHA-1; DigestMethod only selects the label hash.
struct RsaOaepTransport {
    params: OaepParams,
}

impl RsaOaepTransport {
    fn padding(&self) -> Result<rsa::Oaep, Error> {
        use rsa::Oaep;
        let mut padding = match self.params.digest_uri.as_deref().unwrap_or(algorithm::SHA1) {
            algorithm::SHA1 => Oaep::new_with_mgf_hash::<sha1::Sha1, sha1::Sha1>(),
            algorithm::SHA256 => Oaep::new_with_mgf_hash::<sha2::Sha256, sha1::Sha1>(),
            algorithm::SHA384 => Oaep::new_with_mgf_hash::<sha2::Sha384, sha1::Sha1>(),
            algorithm::SHA512 => Oaep::new_with_mgf_hash::<sha2::Sha512, sha1::Sha1>(),
            other => {
                return Err(Error::UnsupportedAlgorithm(format!("OAEP digest: {other}")));
            }
        };
        if let Some(label) = &self.params.oaep_params {
            padding.label = Some(String::from_utf8_lossy(label).into_owned());
        }
        Ok(padding)
    }
}

impl KeyTransportAlgorithm for RsaOaepTransport {
    fn uri(&self) -> &'static str {
        algorithm::RSA_OAEP
    }

    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error> {
        public_key
            .encrypt(&mut rand::thread_rng(), self.padding()?, key_data)
            .map_err(|e| Error::Crypto(format!("RSA-OAEP encrypt: {e}")))
    }

    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        private_key
            .decrypt(self.padding()?, encrypted)
            .map_err(|e| Error::Decryption(format!("RSA-OAEP decrypt: {e}")))
    }
}
