#![forbid(unsafe_code)]

//! Certificate and private key loading from PEM and DER.

use std::path::Path;

use wssec_core::Error;
use wssec_crypto::SignatureKey;

use crate::X509Certificate;

/// Load the first certificate from PEM data.
pub fn load_certificate_pem(pem_data: &[u8]) -> Result<X509Certificate, Error> {
    load_certificates_pem(pem_data)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Certificate("no CERTIFICATE block in PEM data".into()))
}

/// Load every `CERTIFICATE` block from PEM data, skipping other labels.
pub fn load_certificates_pem(pem_data: &[u8]) -> Result<Vec<X509Certificate>, Error> {
    let text = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Certificate(format!("invalid PEM encoding: {e}")))?;

    let mut certs = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("-----BEGIN ") {
        let block = &rest[start..];
        let end_marker = block
            .find("-----END ")
            .and_then(|e| block[e + 9..].find("-----").map(|t| e + 9 + t + 5))
            .ok_or_else(|| Error::Certificate("unterminated PEM block".into()))?;
        let (label, der) = pem_rfc7468::decode_vec(block[..end_marker].trim().as_bytes())
            .map_err(|e| Error::Certificate(format!("failed to decode PEM: {e}")))?;
        if label == "CERTIFICATE" {
            certs.push(X509Certificate::from_der(&der)?);
        }
        rest = &block[end_marker..];
    }
    Ok(certs)
}

pub fn load_certificate_der(der: &[u8]) -> Result<X509Certificate, Error> {
    X509Certificate::from_der(der)
}

/// Load an RSA private key (PKCS#8 or PKCS#1) from PEM data.
pub fn load_rsa_private_pem(pem_data: &[u8]) -> Result<rsa::RsaPrivateKey, Error> {
    use pkcs1::DecodeRsaPrivateKey;
    use pkcs8::DecodePrivateKey;
    let pem_str = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))?;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_pem(pem_str) {
        return Ok(pk);
    }
    rsa::RsaPrivateKey::from_pkcs1_pem(pem_str)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key PEM: {e}")))
}

/// Load a private key usable for signing: RSA, then EC P-256, then P-384.
pub fn load_signing_key_pem(pem_data: &[u8]) -> Result<SignatureKey, Error> {
    use pkcs8::DecodePrivateKey;
    if let Ok(pk) = load_rsa_private_pem(pem_data) {
        return Ok(SignatureKey::Rsa(pk));
    }
    let pem_str = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))?;
    if let Ok(sk) = p256::ecdsa::SigningKey::from_pkcs8_pem(pem_str) {
        return Ok(SignatureKey::EcP256(sk));
    }
    if let Ok(sk) = p384::ecdsa::SigningKey::from_pkcs8_pem(pem_str) {
        return Ok(SignatureKey::EcP384(sk));
    }
    Err(Error::Key(
        "unable to parse private key PEM (tried RSA, P-256, P-384)".into(),
    ))
}

pub fn load_certificates_file(path: &Path) -> Result<Vec<X509Certificate>, Error> {
    let data = std::fs::read(path)?;
    if data.starts_with(b"-----") || data.iter().take(64).all(|b| b.is_ascii()) {
        load_certificates_pem(&data)
    } else {
        Ok(vec![load_certificate_der(&data)?])
    }
}

pub fn load_rsa_private_file(path: &Path) -> Result<rsa::RsaPrivateKey, Error> {
    load_rsa_private_pem(&std::fs::read(path)?)
}
