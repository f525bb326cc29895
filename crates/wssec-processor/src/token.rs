#![forbid(unsafe_code)]

//! Security tokens.
//!
//! One [`SecurityToken`] enum covers every token kind the header can
//! carry. Capabilities that only some kinds have are expressed as traits:
//! [`SigningToken`] for tokens that can be credited with a signature and
//! [`SecretKeySource`] for tokens that yield symmetric key material.
//!
//! Tokens live in a [`TokenStore`] owned by one processing run and are
//! referred to by [`TokenRef`] handles. A token is either backed by an
//! element of the processed document or synthesized in memory (a cache hit,
//! a certificate found through the resolver, an embedded KeyInfo
//! certificate).

use std::fmt;

use base64::Engine;
use once_cell::sync::OnceCell;
use wssec_core::{ns, Error, Result};
use wssec_enc::EncryptedKeyInfo;
use wssec_keys::X509Certificate;
use wssec_xml::writer::escape_attr;
use wssec_xml::{Document, NodeId};

use crate::resolver::SecurityContext;
use crate::result::{SignedElement, SignedPart};

/// Handle to a token in a [`TokenStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenRef(usize);

impl TokenRef {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Where a token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenBacking {
    Element(NodeId),
    /// Exists only in memory.
    Synthesized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    X509,
    Kerberos,
    SecurityContext,
    DerivedKey,
    EncryptedKey,
    SamlAssertion,
    Username,
}

// ── Capabilities ─────────────────────────────────────────────────────

/// What a token has signed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningState {
    pub possession_proven: bool,
    pub signed_elements: Vec<SignedElement>,
    pub signed_parts: Vec<SignedPart>,
}

pub trait SigningToken {
    fn signing_state(&self) -> &SigningState;
    fn signing_state_mut(&mut self) -> &mut SigningState;

    /// True once the token has produced a verified signature.
    fn is_possession_proven(&self) -> bool {
        self.signing_state().possession_proven
    }
}

pub trait SecretKeySource {
    /// The symmetric secret, if it is already known.
    fn known_secret(&self) -> Option<&[u8]>;
}

/// A secret computed at most once.
#[derive(Default)]
pub struct SecretCell(OnceCell<Vec<u8>>);

impl SecretCell {
    pub fn with_value(value: Vec<u8>) -> Self {
        Self(OnceCell::with_value(value))
    }

    pub fn get(&self) -> Option<&[u8]> {
        self.0.get().map(Vec::as_slice)
    }

    pub fn get_or_try_init(&self, init: impl FnOnce() -> Result<Vec<u8>>) -> Result<&[u8]> {
        self.0.get_or_try_init(init).map(Vec::as_slice)
    }
}

impl fmt::Debug for SecretCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(v) => write!(f, "SecretCell({} bytes)", v.len()),
            None => f.write_str("SecretCell(pending)"),
        }
    }
}

macro_rules! signing_token {
    ($ty:ty) => {
        impl SigningToken for $ty {
            fn signing_state(&self) -> &SigningState {
                &self.signing
            }
            fn signing_state_mut(&mut self) -> &mut SigningState {
                &mut self.signing
            }
        }
    };
}

// ── X.509 ────────────────────────────────────────────────────────────

/// How an X.509 token's certificate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X509Source {
    BinarySecurityToken,
    PkiPath,
    Pkcs7,
    Thumbprint,
    SubjectKeyIdentifier,
    IssuerSerial,
    /// A raw certificate in a signature's KeyInfo.
    Embedded,
    /// The sender certificate supplied by the caller.
    Sender,
}

#[derive(Debug, Clone)]
pub struct X509Token {
    pub backing: TokenBacking,
    pub id: Option<String>,
    pub certificate: X509Certificate,
    pub source: X509Source,
    pub signing: SigningState,
}

impl X509Token {
    pub fn new(backing: TokenBacking, id: Option<String>, certificate: X509Certificate, source: X509Source) -> Self {
        Self {
            backing,
            id,
            certificate,
            source,
            signing: SigningState::default(),
        }
    }

    /// The certificate as a standalone BinarySecurityToken, for tokens
    /// with no element in the message.
    pub fn binary_security_token_xml(&self, security_ns: &str) -> String {
        format!(
            r#"<wsse:BinarySecurityToken xmlns:wsse="{}" ValueType="{}" EncodingType="{}">{}</wsse:BinarySecurityToken>"#,
            escape_attr(security_ns),
            ns::value_type::X509V3,
            ns::encoding_type::BASE64_BINARY,
            base64::engine::general_purpose::STANDARD.encode(self.certificate.der())
        )
    }
}

signing_token!(X509Token);

// ── Kerberos ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct KerberosToken {
    pub backing: TokenBacking,
    pub id: Option<String>,
    /// The GSS AP-REQ; empty for a token synthesized from its hash.
    pub ap_req: Vec<u8>,
    /// Base64 SHA-1 of the AP-REQ, the `Kerberosv5APREQSHA1` identifier.
    pub ap_req_sha1: String,
    pub session_key: SecretCell,
    pub signing: SigningState,
}

impl KerberosToken {
    pub fn from_ap_req(element: NodeId, id: Option<String>, ap_req: Vec<u8>) -> Self {
        use sha1::{Digest, Sha1};
        let ap_req_sha1 = base64::engine::general_purpose::STANDARD.encode(Sha1::digest(&ap_req));
        Self {
            backing: TokenBacking::Element(element),
            id,
            ap_req,
            ap_req_sha1,
            session_key: SecretCell::default(),
            signing: SigningState::default(),
        }
    }

    pub fn from_session_key(ap_req_sha1: &str, session_key: Vec<u8>) -> Self {
        Self {
            backing: TokenBacking::Synthesized,
            id: None,
            ap_req: Vec::new(),
            ap_req_sha1: ap_req_sha1.to_owned(),
            session_key: SecretCell::with_value(session_key),
            signing: SigningState::default(),
        }
    }
}

signing_token!(KerberosToken);

impl SecretKeySource for KerberosToken {
    fn known_secret(&self) -> Option<&[u8]> {
        self.session_key.get()
    }
}

// ── WS-SecureConversation ────────────────────────────────────────────

#[derive(Debug)]
pub struct SecurityContextToken {
    pub backing: TokenBacking,
    pub id: Option<String>,
    pub identifier: String,
    pub context: SecurityContext,
    pub signing: SigningState,
}

signing_token!(SecurityContextToken);

impl SecretKeySource for SecurityContextToken {
    fn known_secret(&self) -> Option<&[u8]> {
        Some(&self.context.shared_secret)
    }
}

/// Default DerivedKeyToken label.
pub const DEFAULT_DERIVED_KEY_LABEL: &str = "WS-SecureConversationWS-SecureConversation";

/// Default derived key length in bytes.
pub const DEFAULT_DERIVED_KEY_LENGTH: usize = 32;

/// P_SHA1 inputs read from a DerivedKeyToken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationParams {
    /// `Algorithm` attribute; P_SHA1 when absent.
    pub algorithm: Option<String>,
    pub label: Vec<u8>,
    pub nonce: Vec<u8>,
    pub offset: usize,
    pub length: usize,
}

impl DerivationParams {
    /// Read the parameters of the DerivedKeyToken `dkt`. Children are
    /// matched in the token's own namespace.
    pub fn parse(doc: &Document, dkt: NodeId) -> Result<Self> {
        let sc = doc
            .namespace_uri(dkt)
            .filter(|u| ns::is_secure_conversation_ns(u))
            .ok_or_else(|| Error::InvalidDocumentFormat("DerivedKeyToken is not in a SecureConversation namespace".into()))?;

        let number = |name: &str| -> Result<Option<usize>> {
            match doc.find_child(dkt, sc, name) {
                Some(n) => doc
                    .text_content(n)
                    .trim()
                    .parse::<usize>()
                    .map(Some)
                    .map_err(|_| Error::InvalidDocumentFormat(format!("DerivedKeyToken {name} is not a number"))),
                None => Ok(None),
            }
        };

        let length = number(ns::node::LENGTH)?.unwrap_or(DEFAULT_DERIVED_KEY_LENGTH);
        let offset = match (number(ns::node::OFFSET)?, number(ns::node::GENERATION)?) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidDocumentFormat(
                    "DerivedKeyToken has both Offset and Generation".into(),
                ))
            }
            (Some(offset), None) => offset,
            (None, Some(generation)) => generation
                .checked_mul(length)
                .ok_or_else(|| Error::InvalidDocumentFormat("DerivedKeyToken Generation too large".into()))?,
            (None, None) => 0,
        };

        let label = doc
            .find_child(dkt, sc, ns::node::LABEL)
            .map(|n| doc.text_content(n))
            .unwrap_or_else(|| DEFAULT_DERIVED_KEY_LABEL.to_owned());

        let nonce_node = doc
            .find_child(dkt, sc, ns::node::NONCE)
            .ok_or_else(|| Error::InvalidDocumentFormat("DerivedKeyToken has no Nonce".into()))?;
        let nonce = decode_base64(&doc.text_content(nonce_node))?;

        Ok(Self {
            algorithm: doc.attribute(dkt, ns::attr::ALGORITHM).map(str::to_owned),
            label: label.into_bytes(),
            nonce,
            offset,
            length,
        })
    }
}

#[derive(Debug)]
pub struct DerivedKeyToken {
    pub backing: TokenBacking,
    pub id: Option<String>,
    pub params: DerivationParams,
    /// The token whose secret the key is derived from.
    pub source: TokenRef,
    pub key: SecretCell,
}

impl DerivedKeyToken {
    pub fn new(element: NodeId, id: Option<String>, params: DerivationParams, source: TokenRef) -> Self {
        Self {
            backing: TokenBacking::Element(element),
            id,
            params,
            source,
            key: SecretCell::default(),
        }
    }

    /// The derived key, computed with `derive` on first use.
    pub fn key(&self, derive: impl FnOnce(&DerivationParams) -> Result<Vec<u8>>) -> Result<&[u8]> {
        self.key.get_or_try_init(|| derive(&self.params))
    }
}

impl SecretKeySource for DerivedKeyToken {
    fn known_secret(&self) -> Option<&[u8]> {
        self.key.get()
    }
}

// ── EncryptedKey ─────────────────────────────────────────────────────

pub struct EncryptedKeyToken {
    pub backing: TokenBacking,
    pub id: Option<String>,
    /// The parsed element; `None` for a token rebuilt from the secret cache.
    pub info: Option<EncryptedKeyInfo>,
    /// Base64 SHA-1 of the wrapped key.
    pub encrypted_key_sha1: String,
    recipient_key: Option<rsa::RsaPrivateKey>,
    secret: SecretCell,
    pub signing: SigningState,
}

impl EncryptedKeyToken {
    /// A token for an EncryptedKey element, to be unwrapped with
    /// `recipient_key` when first needed.
    pub fn new(info: EncryptedKeyInfo, recipient_key: rsa::RsaPrivateKey) -> Self {
        Self {
            backing: TokenBacking::Element(info.node),
            id: info.id.clone(),
            encrypted_key_sha1: info.encrypted_key_sha1(),
            info: Some(info),
            recipient_key: Some(recipient_key),
            secret: SecretCell::default(),
            signing: SigningState::default(),
        }
    }

    /// A token for a secret found in the EncryptedKeySHA1 cache.
    pub fn from_cached_secret(encrypted_key_sha1: &str, secret: Vec<u8>) -> Self {
        Self {
            backing: TokenBacking::Synthesized,
            id: None,
            info: None,
            encrypted_key_sha1: encrypted_key_sha1.to_owned(),
            recipient_key: None,
            secret: SecretCell::with_value(secret),
            signing: SigningState::default(),
        }
    }

    pub fn is_unwrapped(&self) -> bool {
        self.secret.get().is_some()
    }

    /// The unwrapped secret. `unwrap` runs at most once per token.
    pub fn secret(
        &self,
        unwrap: impl FnOnce(&EncryptedKeyInfo, &rsa::RsaPrivateKey) -> Result<Vec<u8>>,
    ) -> Result<&[u8]> {
        self.secret.get_or_try_init(|| match (&self.info, &self.recipient_key) {
            (Some(info), Some(key)) => unwrap(info, key),
            _ => Err(Error::Key(format!(
                "no way to unwrap EncryptedKey {}",
                self.encrypted_key_sha1
            ))),
        })
    }
}

signing_token!(EncryptedKeyToken);

impl SecretKeySource for EncryptedKeyToken {
    fn known_secret(&self) -> Option<&[u8]> {
        self.secret.get()
    }
}

impl fmt::Debug for EncryptedKeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedKeyToken")
            .field("backing", &self.backing)
            .field("id", &self.id)
            .field("encrypted_key_sha1", &self.encrypted_key_sha1)
            .field("has_recipient_key", &self.recipient_key.is_some())
            .field("secret", &self.secret)
            .finish()
    }
}

// ── SAML ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlVersion {
    V1_1,
    V2_0,
}

#[derive(Debug, Clone)]
pub struct SamlAssertionToken {
    pub backing: TokenBacking,
    /// `AssertionID` (1.1) or `ID` (2.0).
    pub id: Option<String>,
    pub version: SamlVersion,
    /// Holder-of-key certificate from the subject confirmation.
    pub subject_certificate: Option<X509Certificate>,
    pub signing: SigningState,
}

signing_token!(SamlAssertionToken);

// ── UsernameToken ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameToken {
    pub backing: TokenBacking,
    pub id: Option<String>,
    pub username: String,
    pub password: Option<String>,
    /// Password `Type` URI; plain text when absent.
    pub password_type: Option<String>,
    pub nonce: Option<Vec<u8>>,
    pub created: Option<String>,
}

impl UsernameToken {
    pub fn parse(doc: &Document, element: NodeId) -> Result<Self> {
        let wsse = doc
            .namespace_uri(element)
            .filter(|u| ns::is_security_ns(u))
            .ok_or_else(|| Error::InvalidDocumentFormat("UsernameToken is not in a security namespace".into()))?;

        let username = doc
            .find_child(element, wsse, ns::node::USERNAME)
            .map(|n| doc.text_content(n).trim().to_owned())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::InvalidDocumentFormat("UsernameToken has no Username".into()))?;

        let password_node = doc.find_child(element, wsse, ns::node::PASSWORD);
        let nonce = match doc.find_child(element, wsse, ns::node::NONCE) {
            Some(n) => Some(decode_base64(&doc.text_content(n))?),
            None => None,
        };
        let created = ns::UTILITY_NAMESPACES
            .iter()
            .find_map(|u| doc.find_child(element, u, ns::node::CREATED))
            .map(|n| doc.text_content(n).trim().to_owned());

        Ok(Self {
            backing: TokenBacking::Element(element),
            id: doc.attribute_in(element, ns::UTILITY_NAMESPACES, ns::attr::ID).map(str::to_owned),
            username,
            password: password_node.map(|n| doc.text_content(n)),
            password_type: password_node
                .and_then(|n| doc.attribute(n, ns::attr::TYPE))
                .map(str::to_owned),
            nonce,
            created,
        })
    }

    pub fn is_digest(&self) -> bool {
        self.password_type.as_deref() == Some(ns::password_type::DIGEST)
    }
}

// ── The token enum ───────────────────────────────────────────────────

#[derive(Debug)]
pub enum SecurityToken {
    X509(X509Token),
    Kerberos(KerberosToken),
    SecurityContext(SecurityContextToken),
    DerivedKey(DerivedKeyToken),
    EncryptedKey(EncryptedKeyToken),
    SamlAssertion(SamlAssertionToken),
    Username(UsernameToken),
}

impl SecurityToken {
    pub fn kind(&self) -> TokenKind {
        match self {
            SecurityToken::X509(_) => TokenKind::X509,
            SecurityToken::Kerberos(_) => TokenKind::Kerberos,
            SecurityToken::SecurityContext(_) => TokenKind::SecurityContext,
            SecurityToken::DerivedKey(_) => TokenKind::DerivedKey,
            SecurityToken::EncryptedKey(_) => TokenKind::EncryptedKey,
            SecurityToken::SamlAssertion(_) => TokenKind::SamlAssertion,
            SecurityToken::Username(_) => TokenKind::Username,
        }
    }

    pub fn backing(&self) -> TokenBacking {
        match self {
            SecurityToken::X509(t) => t.backing,
            SecurityToken::Kerberos(t) => t.backing,
            SecurityToken::SecurityContext(t) => t.backing,
            SecurityToken::DerivedKey(t) => t.backing,
            SecurityToken::EncryptedKey(t) => t.backing,
            SecurityToken::SamlAssertion(t) => t.backing,
            SecurityToken::Username(t) => t.backing,
        }
    }

    /// The backing element, if any.
    pub fn element(&self) -> Option<NodeId> {
        match self.backing() {
            TokenBacking::Element(e) => Some(e),
            TokenBacking::Synthesized => None,
        }
    }

    pub fn is_synthesized(&self) -> bool {
        self.backing() == TokenBacking::Synthesized
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            SecurityToken::X509(t) => t.id.as_deref(),
            SecurityToken::Kerberos(t) => t.id.as_deref(),
            SecurityToken::SecurityContext(t) => t.id.as_deref(),
            SecurityToken::DerivedKey(t) => t.id.as_deref(),
            SecurityToken::EncryptedKey(t) => t.id.as_deref(),
            SecurityToken::SamlAssertion(t) => t.id.as_deref(),
            SecurityToken::Username(t) => t.id.as_deref(),
        }
    }

    pub fn as_signing(&self) -> Option<&dyn SigningToken> {
        match self {
            SecurityToken::X509(t) => Some(t),
            SecurityToken::Kerberos(t) => Some(t),
            SecurityToken::SecurityContext(t) => Some(t),
            SecurityToken::EncryptedKey(t) => Some(t),
            SecurityToken::SamlAssertion(t) => Some(t),
            SecurityToken::DerivedKey(_) | SecurityToken::Username(_) => None,
        }
    }

    pub fn as_signing_mut(&mut self) -> Option<&mut dyn SigningToken> {
        match self {
            SecurityToken::X509(t) => Some(t),
            SecurityToken::Kerberos(t) => Some(t),
            SecurityToken::SecurityContext(t) => Some(t),
            SecurityToken::EncryptedKey(t) => Some(t),
            SecurityToken::SamlAssertion(t) => Some(t),
            SecurityToken::DerivedKey(_) | SecurityToken::Username(_) => None,
        }
    }

    pub fn as_secret_source(&self) -> Option<&dyn SecretKeySource> {
        match self {
            SecurityToken::Kerberos(t) => Some(t),
            SecurityToken::SecurityContext(t) => Some(t),
            SecurityToken::DerivedKey(t) => Some(t),
            SecurityToken::EncryptedKey(t) => Some(t),
            _ => None,
        }
    }

    /// The certificate behind an X.509 token or a holder-of-key assertion.
    pub fn certificate(&self) -> Option<&X509Certificate> {
        match self {
            SecurityToken::X509(t) => Some(&t.certificate),
            SecurityToken::SamlAssertion(t) => t.subject_certificate.as_ref(),
            _ => None,
        }
    }
}

// ── Store ────────────────────────────────────────────────────────────

/// Every token seen while processing one message.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: Vec<SecurityToken>,
}

impl TokenStore {
    pub fn push(&mut self, token: SecurityToken) -> TokenRef {
        self.tokens.push(token);
        TokenRef(self.tokens.len() - 1)
    }

    /// Panics if `token` came from another store.
    pub fn get(&self, token: TokenRef) -> &SecurityToken {
        &self.tokens[token.0]
    }

    pub fn get_mut(&mut self, token: TokenRef) -> &mut SecurityToken {
        &mut self.tokens[token.0]
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenRef, &SecurityToken)> + '_ {
        self.tokens.iter().enumerate().map(|(i, t)| (TokenRef(i), t))
    }

    fn find(&self, pred: impl Fn(&SecurityToken) -> bool) -> Option<TokenRef> {
        self.iter().find(|(_, t)| pred(t)).map(|(r, _)| r)
    }

    pub fn by_element(&self, element: NodeId) -> Option<TokenRef> {
        self.find(|t| t.element() == Some(element))
    }

    /// An element-backed token with identifier `id`.
    pub fn by_id(&self, id: &str) -> Option<TokenRef> {
        self.find(|t| t.element().is_some() && t.id() == Some(id))
    }

    pub fn encrypted_key_by_sha1(&self, sha1: &str) -> Option<TokenRef> {
        self.find(|t| matches!(t, SecurityToken::EncryptedKey(ek) if ek.encrypted_key_sha1 == sha1))
    }

    pub fn kerberos_by_sha1(&self, sha1: &str) -> Option<TokenRef> {
        self.find(|t| matches!(t, SecurityToken::Kerberos(k) if k.ap_req_sha1 == sha1))
    }

    pub fn security_context_by_identifier(&self, identifier: &str) -> Option<TokenRef> {
        self.find(|t| matches!(t, SecurityToken::SecurityContext(s) if s.identifier == identifier))
    }

    pub fn x509_by_thumbprint(&self, thumbprint: &[u8]) -> Option<TokenRef> {
        self.find(|t| matches!(t, SecurityToken::X509(x) if x.certificate.thumbprint_sha1() == thumbprint))
    }

    pub fn x509_by_ski(&self, ski: &[u8]) -> Option<TokenRef> {
        self.find(|t| matches!(t, SecurityToken::X509(x) if x.certificate.subject_key_identifier() == ski))
    }

    pub fn x509_by_certificate(&self, cert: &X509Certificate) -> Option<TokenRef> {
        self.find(|t| matches!(t, SecurityToken::X509(x) if &x.certificate == cert))
    }
}

pub(crate) fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| Error::Base64(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_encrypted_key_unwraps_once() {
        let doc = Document::parse(&format!(
            r#"<xenc:EncryptedKey xmlns:xenc="{}" Id="EK-1"><xenc:EncryptionMethod Algorithm="{}"/><xenc:CipherData><xenc:CipherValue>AAEC</xenc:CipherValue></xenc:CipherData></xenc:EncryptedKey>"#,
            ns::ENC,
            wssec_core::algorithm::RSA_OAEP
        ))
        .unwrap();
        let info = EncryptedKeyInfo::parse(&doc, doc.root_element().unwrap()).unwrap();
        let token = EncryptedKeyToken::new(info, wssec_keys::fixtures::private_key());
        assert!(!token.is_unwrapped());

        let calls = Cell::new(0);
        for _ in 0..3 {
            let secret = token
                .secret(|_, _| {
                    calls.set(calls.get() + 1);
                    Ok(vec![1, 2, 3])
                })
                .unwrap();
            assert_eq!(secret, [1, 2, 3]);
        }
        assert_eq!(calls.get(), 1);
        assert!(token.is_unwrapped());
        assert_eq!(token.known_secret(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_failed_unwrap_is_retried() {
        let token = EncryptedKeyToken::from_cached_secret("abc", vec![9]);
        assert_eq!(token.secret(|_, _| unreachable!()).unwrap(), [9]);

        let doc = Document::parse(&format!(
            r#"<xenc:EncryptedKey xmlns:xenc="{}"><xenc:EncryptionMethod Algorithm="x"/><xenc:CipherData><xenc:CipherValue>AAEC</xenc:CipherValue></xenc:CipherData></xenc:EncryptedKey>"#,
            ns::ENC
        ))
        .unwrap();
        let info = EncryptedKeyInfo::parse(&doc, doc.root_element().unwrap()).unwrap();
        let token = EncryptedKeyToken::new(info, wssec_keys::fixtures::private_key());
        assert!(token.secret(|_, _| Err(Error::Decryption("bad".into()))).is_err());
        assert_eq!(token.secret(|_, _| Ok(vec![4])).unwrap(), [4]);
    }

    #[test]
    fn test_derivation_params_defaults_and_generation() {
        let xml = format!(
            r#"<wsc:DerivedKeyToken xmlns:wsc="{}"><wsc:Generation>2</wsc:Generation><wsc:Length>16</wsc:Length><wsc:Nonce>AQID</wsc:Nonce></wsc:DerivedKeyToken>"#,
            ns::WSSC_2005_02
        );
        let doc = Document::parse(&xml).unwrap();
        let p = DerivationParams::parse(&doc, doc.root_element().unwrap()).unwrap();
        assert_eq!(p.length, 16);
        assert_eq!(p.offset, 32);
        assert_eq!(p.label, DEFAULT_DERIVED_KEY_LABEL.as_bytes());
        assert_eq!(p.nonce, [1, 2, 3]);
        assert_eq!(p.algorithm, None);
    }

    #[test]
    fn test_derivation_params_reject_offset_and_generation() {
        let xml = format!(
            r#"<wsc:DerivedKeyToken xmlns:wsc="{}"><wsc:Offset>0</wsc:Offset><wsc:Generation>1</wsc:Generation><wsc:Nonce>AQID</wsc:Nonce></wsc:DerivedKeyToken>"#,
            ns::WSSC_1_3
        );
        let doc = Document::parse(&xml).unwrap();
        assert!(matches!(
            DerivationParams::parse(&doc, doc.root_element().unwrap()),
            Err(Error::InvalidDocumentFormat(_))
        ));
    }

    #[test]
    fn test_username_token() {
        let xml = format!(
            r#"<wsse:UsernameToken xmlns:wsse="{}" xmlns:wsu="{}" wsu:Id="UT-1"><wsse:Username> alice </wsse:Username><wsse:Password Type="{}">c2VjcmV0</wsse:Password><wsse:Nonce>AQID</wsse:Nonce><wsu:Created>2024-01-01T00:00:00Z</wsu:Created></wsse:UsernameToken>"#,
            ns::WSSE,
            ns::WSU,
            ns::password_type::DIGEST
        );
        let doc = Document::parse(&xml).unwrap();
        let ut = UsernameToken::parse(&doc, doc.root_element().unwrap()).unwrap();
        assert_eq!(ut.username, "alice");
        assert_eq!(ut.id.as_deref(), Some("UT-1"));
        assert!(ut.is_digest());
        assert_eq!(ut.nonce.as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(ut.created.as_deref(), Some("2024-01-01T00:00:00Z"));

        let doc = Document::parse(&format!(r#"<wsse:UsernameToken xmlns:wsse="{}"/>"#, ns::WSSE)).unwrap();
        assert!(UsernameToken::parse(&doc, doc.root_element().unwrap()).is_err());
    }

    #[test]
    fn test_store_lookups() {
        let cert = wssec_keys::fixtures::certificate();
        let mut store = TokenStore::default();
        let synthesized = store.push(SecurityToken::X509(X509Token::new(
            TokenBacking::Synthesized,
            Some("X-1".into()),
            cert.clone(),
            X509Source::Thumbprint,
        )));
        let kerberos = store.push(SecurityToken::Kerberos(KerberosToken::from_session_key("h", vec![1])));

        assert_eq!(store.x509_by_thumbprint(&cert.thumbprint_sha1()), Some(synthesized));
        assert_eq!(store.x509_by_ski(&cert.subject_key_identifier()), Some(synthesized));
        assert_eq!(store.kerberos_by_sha1("h"), Some(kerberos));
        // synthesized tokens are not addressable by id
        assert_eq!(store.by_id("X-1"), None);
        assert!(store.get(kerberos).as_signing().is_some());
        assert!(store.get(kerberos).as_secret_source().is_some());
        assert!(store.get(synthesized).as_secret_source().is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_dummy_binary_security_token() {
        let token = X509Token::new(
            TokenBacking::Synthesized,
            None,
            wssec_keys::fixtures::certificate(),
            X509Source::Embedded,
        );
        let xml = token.binary_security_token_xml(ns::WSSE);
        let doc = Document::parse(&xml).unwrap();
        let root = doc.root_element().unwrap();
        assert!(doc.is_named(root, ns::WSSE, ns::node::BINARY_SECURITY_TOKEN));
        let der = decode_base64(&doc.text_content(root)).unwrap();
        assert_eq!(der, token.certificate.der());
    }
}
