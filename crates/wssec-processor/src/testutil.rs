//! Message builders shared by the processor tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine;
use wssec_core::{algorithm, ns, Error, Result};
use wssec_crypto::{CryptoEngine, OaepParams, SignatureKey, SoftwareEngine};
use wssec_dsig::resolve::resolve_same_document;
use wssec_dsig::{MimePart, ReferenceResolver, ResolvedReference, StrTarget};
use wssec_enc::EncryptionType;
use wssec_keys::{fixtures, X509Certificate};
use wssec_xml::{Document, IdAttributeConfig, IdIndex, NodeId, NodeSet};

use crate::header;
use crate::resolver::{SecurityTokenResolver, SimpleSecurityTokenResolver};

pub(crate) const ORDER: &str = r#"<m:order xmlns:m="urn:example:orders">42</m:order>"#;

pub(crate) const TIMESTAMP: &str = r#"<wsu:Timestamp wsu:Id="TS-1"><wsu:Created>2024-03-01T10:00:00Z</wsu:Created><wsu:Expires>2024-03-01T10:05:00Z</wsu:Expires></wsu:Timestamp>"#;

/// Symmetric key used for body encryption and HMAC signatures.
pub(crate) const CONTENT_KEY: [u8; 16] = [0x5a; 16];

/// A SOAP 1.1 envelope. `security_attrs` is spliced into the Security
/// start tag, e.g. ` soap:actor="secure_span"`.
pub(crate) fn soap(headers: &str, security_attrs: &str, security: &str, body: &str) -> String {
    format!(
        r#"<soap:Envelope xmlns:soap="{}" xmlns:wsse="{}" xmlns:wsu="{}" xmlns:ds="{}" xmlns:xenc="{}" xmlns:wsse11="{}" xmlns:wsc="{}"><soap:Header>{headers}<wsse:Security soap:mustUnderstand="1"{security_attrs}>{security}</wsse:Security></soap:Header><soap:Body wsu:Id="Body-1">{body}</soap:Body></soap:Envelope>"#,
        ns::SOAP_1_1,
        ns::WSSE,
        ns::WSU,
        ns::DSIG,
        ns::ENC,
        ns::WSSE11,
        ns::WSSC_2005_02,
    )
}

pub(crate) fn envelope(security: &str) -> String {
    soap("", "", security, ORDER)
}

pub(crate) fn parse(xml: &str) -> Document {
    Document::parse(xml).unwrap()
}

pub(crate) fn certificate_b64() -> String {
    base64::engine::general_purpose::STANDARD.encode(fixtures::certificate().der())
}

pub(crate) fn bst(id: &str) -> String {
    format!(
        r#"<wsse:BinarySecurityToken wsu:Id="{id}" ValueType="{}" EncodingType="{}">{}</wsse:BinarySecurityToken>"#,
        ns::value_type::X509V3,
        ns::encoding_type::BASE64_BINARY,
        certificate_b64()
    )
}

pub(crate) fn str_reference(uri: &str, value_type: &str) -> String {
    format!(
        r#"<wsse:SecurityTokenReference><wsse:Reference URI="{uri}" ValueType="{value_type}"/></wsse:SecurityTokenReference>"#
    )
}

/// Stand-in GSS AP-REQ bytes; the processor never parses the ticket.
pub(crate) const AP_REQ: &[u8] = b"\x60\x82\x01\x00 kerberos ap-req for tests";

pub(crate) fn kerberos_bst(id: &str) -> String {
    format!(
        r#"<wsse:BinarySecurityToken wsu:Id="{id}" ValueType="{}" EncodingType="{}">{}</wsse:BinarySecurityToken>"#,
        ns::value_type::KERBEROS_GSS_AP_REQ,
        ns::encoding_type::BASE64_BINARY,
        base64::engine::general_purpose::STANDARD.encode(AP_REQ)
    )
}

/// The `Kerberosv5APREQSHA1` identifier of [`AP_REQ`].
pub(crate) fn kerberos_sha1() -> String {
    use sha1::{Digest, Sha1};
    base64::engine::general_purpose::STANDARD.encode(Sha1::digest(AP_REQ))
}

pub(crate) fn str_key_identifier(value_type: &str, value: &str) -> String {
    format!(
        r#"<wsse:SecurityTokenReference><wsse:KeyIdentifier ValueType="{value_type}">{value}</wsse:KeyIdentifier></wsse:SecurityTokenReference>"#
    )
}

pub(crate) fn thumbprint_key_info() -> String {
    format!(
        "<ds:KeyInfo>{}</ds:KeyInfo>",
        str_key_identifier(ns::value_type::THUMBPRINT_SHA1, fixtures::CERT_THUMBPRINT_B64)
    )
}

/// A `<ds:Reference>` with an exclusive C14N transform and SHA-256 digest.
pub(crate) fn reference(uri: &str) -> String {
    reference_with(uri, &format!(r#"<ds:Transform Algorithm="{}"/>"#, algorithm::EXC_C14N))
}

pub(crate) fn reference_with(uri: &str, transforms: &str) -> String {
    format!(
        r#"<ds:Reference URI="{uri}"><ds:Transforms>{transforms}</ds:Transforms><ds:DigestMethod Algorithm="{}"/><ds:DigestValue/></ds:Reference>"#,
        algorithm::SHA256
    )
}

/// An unsigned Signature over `references`, ready for [`sign_all`].
pub(crate) fn signature_template(method: &str, references: &[String], key_info: &str) -> String {
    format!(
        r#"<ds:Signature><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="{}"/><ds:SignatureMethod Algorithm="{method}"/>{}</ds:SignedInfo><ds:SignatureValue/><ds:KeyInfo>{key_info}</ds:KeyInfo></ds:Signature>"#,
        algorithm::EXC_C14N,
        references.concat()
    )
}

/// RSA-SHA256 signature over `#id` references, keyed by the STR in `key_info`.
pub(crate) fn rsa_signature(ids: &[&str], key_info: &str) -> String {
    let references: Vec<String> = ids.iter().map(|id| reference(&format!("#{id}"))).collect();
    signature_template(algorithm::RSA_SHA256, &references, key_info)
}

pub(crate) fn rsa_key() -> SignatureKey {
    SignatureKey::Rsa(fixtures::private_key())
}

/// What the signing side dereferences beyond `#id`.
#[derive(Default)]
pub(crate) struct SigningContext {
    pub(crate) attachments: HashMap<String, MimePart>,
    pub(crate) str_targets: HashMap<NodeId, StrTarget>,
}

struct SigningResolver<'a> {
    index: &'a IdIndex,
    context: &'a SigningContext,
}

impl ReferenceResolver for SigningResolver<'_> {
    fn resolve(&self, doc: &Document, reference: &str) -> Result<ResolvedReference> {
        if let Some(cid) = reference.strip_prefix("cid:") {
            return self
                .context
                .attachments
                .get(cid)
                .cloned()
                .map(ResolvedReference::Attachment)
                .ok_or_else(|| Error::InvalidUri(reference.to_owned()));
        }
        resolve_same_document(self.index, doc, reference)
    }

    fn dereference_str(&self, _doc: &Document, str_element: NodeId) -> Result<StrTarget> {
        self.context
            .str_targets
            .get(&str_element)
            .cloned()
            .ok_or_else(|| Error::InvalidDocumentFormat("unknown STR".into()))
    }
}

/// Sign every Signature template in `doc` with `key`, in document order.
pub(crate) fn sign_all(doc: &mut Document, key: &SignatureKey) {
    sign_all_with(doc, key, &SigningContext::default());
}

pub(crate) fn sign_all_with(doc: &mut Document, key: &SignatureKey, context: &SigningContext) {
    let engine = SoftwareEngine::new();
    loop {
        let index = IdIndex::build(doc, IdAttributeConfig::wss_default());
        let resolver = SigningResolver { index: &index, context };
        match wssec_dsig::sign::sign_template(doc, key, &resolver, &engine) {
            Ok(_) => {}
            Err(Error::MissingElement(_)) => break,
            Err(e) => panic!("signing failed: {e}"),
        }
    }
}

/// Content-encrypt the SOAP Body with [`CONTENT_KEY`] as `ED-1`.
pub(crate) fn encrypt_body(doc: &mut Document, key_info_xml: Option<&str>) -> NodeId {
    let body = header::body_element(doc).unwrap();
    wssec_enc::encrypt_in_place(
        doc,
        body,
        EncryptionType::Content,
        algorithm::AES128_CBC,
        &CONTENT_KEY,
        "ED-1",
        key_info_xml,
    )
    .unwrap()
}

/// Prepend an EncryptedKey wrapping [`CONTENT_KEY`] for the fixture
/// certificate to the Security header.
pub(crate) fn add_encrypted_key(doc: &mut Document, id: &str, data_references: &[&str]) {
    let xml = wssec_enc::encrypted_key_xml(
        &fixtures::certificate().rsa_public_key().unwrap(),
        algorithm::RSA_OAEP,
        &CONTENT_KEY,
        id,
        &thumbprint_key_info(),
        data_references,
    )
    .unwrap();
    let security = security_header(doc);
    let first = doc.child_elements(security).next();
    doc.insert_fragment(security, first, &xml).unwrap();
}

pub(crate) fn security_header(doc: &Document) -> NodeId {
    let soap_header = header::header_element(doc).unwrap();
    doc.child_elements(soap_header)
        .find(|c| doc.local_name(*c) == Some(ns::node::SECURITY))
        .unwrap()
}

pub(crate) fn find_by_id(doc: &Document, id: &str) -> NodeId {
    IdIndex::build(doc, IdAttributeConfig::wss_default()).find(doc, id).unwrap()
}

pub(crate) fn count_named(doc: &Document, namespace: &str, local: &str) -> usize {
    doc.descendants(doc.root())
        .into_iter()
        .filter(|n| doc.is_named(*n, namespace, local))
        .count()
}

/// A resolver holding the fixture certificate and its private key.
pub(crate) fn fixture_resolver() -> SimpleSecurityTokenResolver {
    SimpleSecurityTokenResolver::new().with_certificate(fixtures::certificate(), Some(fixtures::private_key()))
}

/// Counts key unwraps; everything else goes to [`SoftwareEngine`].
#[derive(Default)]
pub(crate) struct CountingEngine {
    inner: SoftwareEngine,
    pub(crate) unwraps: AtomicUsize,
}

impl CountingEngine {
    pub(crate) fn unwraps(&self) -> usize {
        self.unwraps.load(Ordering::SeqCst)
    }
}

impl CryptoEngine for CountingEngine {
    fn canonicalize(
        &self,
        doc: &Document,
        c14n_uri: &str,
        node_set: Option<&NodeSet>,
        inclusive_prefixes: &[String],
    ) -> Result<Vec<u8>> {
        self.inner.canonicalize(doc, c14n_uri, node_set, inclusive_prefixes)
    }

    fn digest(&self, digest_uri: &str, data: &[u8]) -> Result<Vec<u8>> {
        self.inner.digest(digest_uri, data)
    }

    fn verify_signature(
        &self,
        signature_uri: &str,
        key: &SignatureKey,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        self.inner.verify_signature(signature_uri, key, data, signature)
    }

    fn decrypt(&self, cipher_uri: &str, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.inner.decrypt(cipher_uri, key, ciphertext)
    }

    fn unwrap_key(
        &self,
        transport_uri: &str,
        private_key: &rsa::RsaPrivateKey,
        wrapped: &[u8],
        params: &OaepParams,
    ) -> Result<Vec<u8>> {
        self.unwraps.fetch_add(1, Ordering::SeqCst);
        self.inner.unwrap_key(transport_uri, private_key, wrapped, params)
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
        self.inner.derive_key(kdf_uri, secret, label, nonce, offset, length)
    }
}

/// Counts thumbprint lookups on top of [`fixture_resolver`].
pub(crate) struct CountingResolver {
    inner: SimpleSecurityTokenResolver,
    thumbprint_lookups: AtomicUsize,
}

impl CountingResolver {
    pub(crate) fn new() -> Self {
        Self {
            inner: fixture_resolver(),
            thumbprint_lookups: AtomicUsize::new(0),
        }
    }

    pub(crate) fn thumbprint_lookups(&self) -> usize {
        self.thumbprint_lookups.load(Ordering::SeqCst)
    }
}

impl SecurityTokenResolver for CountingResolver {
    fn lookup_by_thumbprint(&self, thumbprint: &[u8]) -> Option<X509Certificate> {
        self.thumbprint_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup_by_thumbprint(thumbprint)
    }

    fn lookup_by_ski(&self, ski: &[u8]) -> Option<X509Certificate> {
        self.inner.lookup_by_ski(ski)
    }

    fn lookup_by_issuer_serial(&self, issuer: &str, serial: &str) -> Option<X509Certificate> {
        self.inner.lookup_by_issuer_serial(issuer, serial)
    }

    fn private_key_for(&self, cert: &X509Certificate) -> Option<rsa::RsaPrivateKey> {
        self.inner.private_key_for(cert)
    }

    fn kerberos_session_key(&self, ap_req_sha1: &str) -> Option<Vec<u8>> {
        self.inner.kerberos_session_key(ap_req_sha1)
    }

    fn secret_for_encrypted_key_sha1(&self, encrypted_key_sha1: &str) -> Option<Vec<u8>> {
        self.inner.secret_for_encrypted_key_sha1(encrypted_key_sha1)
    }

    fn put_secret_for_encrypted_key_sha1(&self, encrypted_key_sha1: &str, secret: &[u8]) {
        self.inner.put_secret_for_encrypted_key_sha1(encrypted_key_sha1, secret)
    }
}
