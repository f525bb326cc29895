#![forbid(unsafe_code)]

//! Certificate bundles carried in a BinarySecurityToken.
//!
//! `X509PKIPathv1` is a DER `SEQUENCE OF Certificate` ordered issuer
//! first; `PKCS7` is a (usually degenerate) SignedData whose
//! `certificates` field holds the chain. PKCS#7 blobs are frequently BER,
//! so they go through `yasna::parse_ber`.

use der::Decode;
use wssec_core::Error;
use yasna::models::ObjectIdentifier;
use yasna::{ASN1Error, ASN1ErrorKind, BERReader, Tag};

use crate::X509Certificate;

const OID_SIGNED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 2];

/// Parse an X509PKIPathv1 bundle.
pub fn parse_pki_path(data: &[u8]) -> Result<Vec<X509Certificate>, Error> {
    let certs = Vec::<x509_cert::Certificate>::from_der(data)
        .map_err(|e| Error::Certificate(format!("invalid PKIPath: {e}")))?;
    if certs.is_empty() {
        return Err(Error::Certificate("PKIPath contains no certificates".into()));
    }
    certs
        .iter()
        .map(|c| {
            use der::Encode;
            let der = c
                .to_der()
                .map_err(|e| Error::Certificate(format!("failed to encode certificate: {e}")))?;
            X509Certificate::from_der(&der)
        })
        .collect()
}

/// Parse the certificates out of a PKCS#7 SignedData.
pub fn parse_pkcs7(data: &[u8]) -> Result<Vec<X509Certificate>, Error> {
    let ders = yasna::parse_ber(data, |r| {
        r.read_sequence(|r| {
            let content_type = r.next().read_oid()?;
            if content_type != ObjectIdentifier::from_slice(OID_SIGNED_DATA) {
                return Err(ASN1Error::new(ASN1ErrorKind::Invalid));
            }
            r.next().read_tagged(Tag::context(0), parse_signed_data)
        })
    })
    .map_err(|e| Error::Certificate(format!("invalid PKCS#7 certificate bundle: {e}")))?;

    if ders.is_empty() {
        return Err(Error::Certificate("PKCS#7 bundle contains no certificates".into()));
    }
    ders.iter().map(|d| X509Certificate::from_der(d)).collect()
}

fn parse_signed_data(r: BERReader) -> Result<Vec<Vec<u8>>, ASN1Error> {
    r.read_sequence(|r| {
        let _version = r.next().read_u32()?;
        let _digest_algorithms = r.next().read_der()?;
        let _encap_content_info = r.next().read_der()?;
        let certs = r
            .read_optional(|r| {
                r.read_tagged_implicit(Tag::context(0), |r| r.collect_set_of(|r| r.read_der()))
            })?
            .unwrap_or_default();
        let _crls = r.read_optional(|r| {
            r.read_tagged_implicit(Tag::context(1), |r| r.collect_set_of(|r| r.read_der()))
        })?;
        let _signer_infos = r.next().read_der()?;
        Ok(certs)
    })
}

/// The end-entity certificate of a chain: the one that issued no other
/// certificate in the list. Falls back to the last entry.
pub fn leaf_certificate(chain: &[X509Certificate]) -> Option<&X509Certificate> {
    chain
        .iter()
        .find(|candidate| {
            let subject = candidate.subject_dn();
            !chain
                .iter()
                .any(|other| other != *candidate && other.issuer_dn() == subject)
        })
        .or_else(|| chain.last())
}
