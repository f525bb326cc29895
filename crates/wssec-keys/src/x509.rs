#![forbid(unsafe_code)]

//! X.509 certificates as security-token key material.
//!
//! Only the facts the token profile needs are extracted: the SHA-1
//! thumbprint, the subject key identifier, issuer DN and serial for
//! `X509IssuerSerial` matching, the validity window, key usage and the
//! subject public key.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use der::{asn1::ObjectIdentifier, Decode, Encode};
use sha1::{Digest, Sha1};
use wssec_core::Error;
use wssec_crypto::SignatureKey;
use x509_cert::ext::pkix::{KeyUsage, KeyUsages, SubjectKeyIdentifier};
use x509_cert::Certificate;

const OID_SUBJECT_KEY_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");
const OID_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");

/// A parsed certificate plus its original DER encoding.
#[derive(Clone)]
pub struct X509Certificate {
    der: Vec<u8>,
    cert: Certificate,
}

impl X509Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let cert = Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
        Ok(Self {
            der: der.to_vec(),
            cert,
        })
    }

    pub fn from_pem(pem: &[u8]) -> Result<Self, Error> {
        crate::loader::load_certificate_pem(pem)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    /// SHA-1 over the DER encoding (`ThumbprintSHA1`).
    pub fn thumbprint_sha1(&self) -> [u8; 20] {
        Sha1::digest(&self.der).into()
    }

    /// The SubjectKeyIdentifier extension, or the RFC 5280 method 1 value
    /// (SHA-1 of the subjectPublicKey bits) when the extension is absent.
    pub fn subject_key_identifier(&self) -> Vec<u8> {
        if let Some(ext) = self.extension(&OID_SUBJECT_KEY_IDENTIFIER) {
            if let Ok(ski) = SubjectKeyIdentifier::from_der(ext) {
                return ski.0.as_bytes().to_vec();
            }
        }
        let spki = &self.cert.tbs_certificate.subject_public_key_info;
        Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec()
    }

    /// Issuer DN in RFC 4514 form (most specific RDN first).
    pub fn issuer_dn(&self) -> String {
        self.cert.tbs_certificate.issuer.to_string()
    }

    pub fn subject_dn(&self) -> String {
        self.cert.tbs_certificate.subject.to_string()
    }

    /// Serial number as an unsigned decimal string.
    pub fn serial_decimal(&self) -> String {
        format_serial_decimal(self.cert.tbs_certificate.serial_number.as_bytes())
    }

    /// True when `issuer`/`serial` (as written in `X509IssuerSerial`) name
    /// this certificate.
    pub fn matches_issuer_serial(&self, issuer: &str, serial: &str) -> bool {
        let serial = serial.trim().trim_start_matches('0');
        let own = self.serial_decimal();
        let own = own.trim_start_matches('0');
        serial == own && dn_equals(&self.issuer_dn(), issuer)
    }

    /// Reject the certificate if `at` falls outside its validity window.
    pub fn check_validity_at(&self, at: SystemTime) -> Result<(), Error> {
        let since_epoch = at
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Certificate(format!("system time error: {e}")))?;
        let now = der::DateTime::from_unix_duration(since_epoch)
            .map_err(|e| Error::Certificate(format!("time conversion error: {e}")))?;
        let validity = &self.cert.tbs_certificate.validity;
        let not_before = validity.not_before.to_date_time();
        let not_after = validity.not_after.to_date_time();
        if now < not_before {
            return Err(Error::Certificate(format!(
                "certificate {} is not yet valid (notBefore: {not_before})",
                self.subject_dn()
            )));
        }
        if now > not_after {
            return Err(Error::Certificate(format!(
                "certificate {} has expired (notAfter: {not_after})",
                self.subject_dn()
            )));
        }
        Ok(())
    }

    pub fn check_validity(&self) -> Result<(), Error> {
        self.check_validity_at(SystemTime::now())
    }

    /// The KeyUsage extension, if the certificate carries one.
    pub fn key_usage(&self) -> Option<KeyUsage> {
        self.extension(&OID_KEY_USAGE)
            .and_then(|bytes| KeyUsage::from_der(bytes).ok())
    }

    /// The subject public key as verification key material.
    pub fn public_key(&self) -> Result<SignatureKey, Error> {
        use spki::DecodePublicKey;
        let spki_der = self
            .cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;
        if let Ok(pk) = rsa::RsaPublicKey::from_public_key_der(&spki_der) {
            return Ok(SignatureKey::RsaPublic(pk));
        }
        if let Ok(vk) = p256::ecdsa::VerifyingKey::from_public_key_der(&spki_der) {
            return Ok(SignatureKey::EcP256Public(vk));
        }
        if let Ok(vk) = p384::ecdsa::VerifyingKey::from_public_key_der(&spki_der) {
            return Ok(SignatureKey::EcP384Public(vk));
        }
        Err(Error::Certificate(
            "unsupported public key algorithm in X.509 certificate".into(),
        ))
    }

    /// The RSA public key, for matching against a recipient private key.
    pub fn rsa_public_key(&self) -> Option<rsa::RsaPublicKey> {
        match self.public_key().ok()? {
            SignatureKey::RsaPublic(pk) => Some(pk),
            _ => None,
        }
    }

    fn extension(&self, oid: &ObjectIdentifier) -> Option<&[u8]> {
        self.cert
            .tbs_certificate
            .extensions
            .as_ref()?
            .iter()
            .find(|ext| ext.extn_id == *oid)
            .map(|ext| ext.extn_value.as_bytes())
    }
}

impl PartialEq for X509Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for X509Certificate {}

impl fmt::Debug for X509Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X509Certificate")
            .field("subject", &self.subject_dn())
            .field("issuer", &self.issuer_dn())
            .field("serial", &self.serial_decimal())
            .finish()
    }
}

// ── Key usage policy ─────────────────────────────────────────────────

/// What a certificate is about to be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsageActivity {
    VerifyXml,
    DecryptXml,
}

/// Policy hook consulted before a certificate's key is used.
pub trait KeyUsageChecker: Send + Sync {
    fn check(&self, cert: &X509Certificate, activity: KeyUsageActivity) -> Result<(), Error>;
}

/// Enforce the KeyUsage extension when present; certificates without it
/// are allowed for every activity.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtensionKeyUsageChecker;

impl KeyUsageChecker for ExtensionKeyUsageChecker {
    fn check(&self, cert: &X509Certificate, activity: KeyUsageActivity) -> Result<(), Error> {
        let Some(ku) = cert.key_usage() else {
            return Ok(());
        };
        let allowed = match activity {
            KeyUsageActivity::VerifyXml => {
                ku.0.contains(KeyUsages::DigitalSignature) || ku.0.contains(KeyUsages::NonRepudiation)
            }
            KeyUsageActivity::DecryptXml => {
                ku.0.contains(KeyUsages::KeyEncipherment) || ku.0.contains(KeyUsages::DataEncipherment)
            }
        };
        if allowed {
            Ok(())
        } else {
            Err(Error::Certificate(format!(
                "key usage of certificate {} does not permit {activity:?}",
                cert.subject_dn()
            )))
        }
    }
}

/// Accept every certificate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermitAllKeyUsage;

impl KeyUsageChecker for PermitAllKeyUsage {
    fn check(&self, _cert: &X509Certificate, _activity: KeyUsageActivity) -> Result<(), Error> {
        Ok(())
    }
}

// ── DN and serial helpers ────────────────────────────────────────────

/// Compare two string DNs after normalizing attribute names, spacing and
/// case. Either RDN order is accepted.
pub fn dn_equals(a: &str, b: &str) -> bool {
    let na = normalize_dn(a);
    let nb = normalize_dn(b);
    if na == nb {
        return true;
    }
    let mut reversed = nb;
    reversed.reverse();
    na == reversed
}

fn normalize_dn(dn: &str) -> Vec<String> {
    split_rdns(dn)
        .into_iter()
        .filter(|rdn| !rdn.trim().is_empty())
        .map(|rdn| match rdn.split_once('=') {
            Some((ty, value)) => {
                let ty = match ty.trim().to_ascii_uppercase().as_str() {
                    "E" | "EMAIL" | "EMAILADDRESS" | "1.2.840.113549.1.9.1" => "EMAILADDRESS".to_string(),
                    "S" | "ST" | "2.5.4.8" => "ST".to_string(),
                    "2.5.4.3" => "CN".to_string(),
                    "2.5.4.10" => "O".to_string(),
                    "2.5.4.11" => "OU".to_string(),
                    "2.5.4.6" => "C".to_string(),
                    "2.5.4.7" => "L".to_string(),
                    other => other.to_string(),
                };
                format!("{ty}={}", value.trim().to_lowercase())
            }
            None => rdn.trim().to_lowercase(),
        })
        .collect()
}

/// Split on commas and semicolons that are not backslash-escaped.
fn split_rdns(dn: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut escaped = false;
    for c in dn.chars() {
        if escaped {
            cur.push(c);
            escaped = false;
        } else if c == '\\' {
            cur.push(c);
            escaped = true;
        } else if c == ',' || c == ';' {
            out.push(std::mem::take(&mut cur));
        } else {
            cur.push(c);
        }
    }
    out.push(cur);
    out
}

/// Unsigned big-endian integer bytes to decimal.
pub fn format_serial_decimal(bytes: &[u8]) -> String {
    // little-endian base-10 digits
    let mut digits: Vec<u8> = vec![0];
    for &byte in bytes {
        let mut carry = byte as u32;
        for d in digits.iter_mut() {
            let val = (*d as u32) * 256 + carry;
            *d = (val % 10) as u8;
            carry = val / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }
    while digits.len() > 1 && digits.last() == Some(&0) {
        digits.pop();
    }
    digits.iter().rev().map(|d| (b'0' + d) as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use base64::Engine;

    #[test]
    fn test_fixture_facts() {
        let cert = fixtures::certificate();
        let b64 = base64::engine::general_purpose::STANDARD;
        assert_eq!(b64.encode(cert.thumbprint_sha1()), fixtures::CERT_THUMBPRINT_B64);
        assert_eq!(b64.encode(cert.subject_key_identifier()), fixtures::CERT_SKI_B64);
        assert_eq!(cert.serial_decimal(), fixtures::CERT_SERIAL);
        assert!(cert.matches_issuer_serial(fixtures::CERT_ISSUER_DN, "4660"));
        assert!(cert.matches_issuer_serial("C=US, O=Example Test, CN=wssec test", "04660"));
        assert!(!cert.matches_issuer_serial(fixtures::CERT_ISSUER_DN, "4661"));
    }

    #[test]
    fn test_validity_window() {
        let cert = fixtures::certificate();
        assert!(cert.check_validity().is_ok());
        assert!(cert.check_validity_at(UNIX_EPOCH).is_err());

        let expired = X509Certificate::from_pem(fixtures::EXPIRED_CERT_PEM.as_bytes()).unwrap();
        let err = expired.check_validity().unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_public_key_is_rsa() {
        let cert = fixtures::certificate();
        assert!(matches!(cert.public_key().unwrap(), SignatureKey::RsaPublic(_)));
        assert_eq!(cert.rsa_public_key().unwrap(), fixtures::private_key().to_public_key());
    }

    #[test]
    fn test_key_usage_checker() {
        let cert = fixtures::certificate();
        let checker = ExtensionKeyUsageChecker;
        assert!(checker.check(&cert, KeyUsageActivity::VerifyXml).is_ok());
        assert!(checker.check(&cert, KeyUsageActivity::DecryptXml).is_ok());
        // no KeyUsage extension at all
        let expired = X509Certificate::from_pem(fixtures::EXPIRED_CERT_PEM.as_bytes()).unwrap();
        assert!(expired.key_usage().is_none());
        assert!(checker.check(&expired, KeyUsageActivity::DecryptXml).is_ok());
    }

    #[test]
    fn test_format_serial_decimal() {
        assert_eq!(format_serial_decimal(&[]), "0");
        assert_eq!(format_serial_decimal(&[0x00, 0xff]), "255");
        assert_eq!(format_serial_decimal(&[0x12, 0x34]), "4660");
        assert_eq!(format_serial_decimal(&[0x01, 0x00, 0x00, 0x00, 0x00]), "4294967296");
    }

    #[test]
    fn test_dn_equals() {
        assert!(dn_equals("CN=a,O=b", "cn=A, o=B"));
        assert!(dn_equals("CN=a,O=b", "O=b,CN=a"));
        assert!(dn_equals("EMAILADDRESS=x@y,CN=a", "E=x@y, CN=a"));
        assert!(!dn_equals("CN=a,O=b", "CN=a,O=c"));
    }
}
