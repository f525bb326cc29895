#![forbid(unsafe_code)]

//! The undecoration walk.
//!
//! Processing happens in two passes over the selected Security header:
//!
//! 1. Collect every BinarySecurityToken and SAML assertion, then resolve
//!    free-standing SecurityTokenReferences, so that later elements may
//!    refer to tokens that appear after them.
//! 2. Visit the header children in document order, decrypting,
//!    verifying and recording as each element demands. Decryption may
//!    replace the element being visited; the walk always continues from
//!    the live successor.
//!
//! The state of one run lives in [`Walk`]. Its `impl` blocks are spread
//! over the `strref`, `keymaterial`, `signature` and `decryption` modules.

use std::collections::HashMap;
use std::sync::Arc;

use wssec_core::{ns, Error, Result};
use wssec_crypto::{CryptoEngine, SignatureVerifyCache, SoftwareEngine};
use wssec_keys::{bundle, ExtensionKeyUsageChecker, KeyUsageChecker, X509Certificate};
use wssec_xml::{Document, IdIndex, NodeId, NodeKind};

use crate::config::ProcessorConfig;
use crate::confirmation::{ConfirmationPolicy, SignatureConfirmation};
use crate::decryption::DecryptionErrorHandler;
use crate::header::{self, SecurityActor};
use crate::message::Message;
use crate::resolver::{SecurityContextFinder, SecurityContextKind, SecurityTokenResolver};
use crate::result::{
    EncryptedElement, IgnoredSignature, ProcessorResult, SignedElement, SignedPart,
    ValidatedSignatureValue,
};
use crate::timestamp::Timestamp;
use crate::token::{
    decode_base64, DerivationParams, DerivedKeyToken, KerberosToken, SamlAssertionToken,
    SamlVersion, SecurityContextToken, SecurityToken, SigningState, TokenBacking, TokenKind,
    TokenRef, TokenStore, UsernameToken, X509Source, X509Token,
};

/// SOAP fault code reported when a SecurityContextToken names an unknown
/// context.
pub const BAD_CONTEXT_TOKEN_FAULT: &str = "wsc:BadContextToken";

/// Validates and strips WS-Security decorations from inbound messages.
///
/// A processor is immutable and can be shared across threads; all per
/// message state lives in the run started by
/// [`undecorate_message`](Self::undecorate_message).
pub struct WssProcessor {
    config: ProcessorConfig,
    engine: Arc<dyn CryptoEngine>,
    key_usage: Arc<dyn KeyUsageChecker>,
    decryption_error_handler: Option<Arc<dyn DecryptionErrorHandler>>,
    request_signatures: Option<HashMap<String, bool>>,
}

impl WssProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        let mut engine = SoftwareEngine::new();
        if config.signature_verify_cache_size > 0 {
            engine = engine.with_verify_cache(Arc::new(SignatureVerifyCache::new(
                config.signature_verify_cache_size,
            )));
        }
        Self {
            config,
            engine: Arc::new(engine),
            key_usage: Arc::new(ExtensionKeyUsageChecker),
            decryption_error_handler: None,
            request_signatures: None,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn CryptoEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_key_usage_checker(mut self, checker: Arc<dyn KeyUsageChecker>) -> Self {
        self.key_usage = checker;
        self
    }

    pub fn with_decryption_error_handler(mut self, handler: Arc<dyn DecryptionErrorHandler>) -> Self {
        self.decryption_error_handler = Some(handler);
        self
    }

    /// Check SignatureConfirmations against the request this message
    /// answers: its SignatureValues, each mapped to whether the Signature
    /// was sent encrypted.
    pub fn with_request_signatures(mut self, signatures: HashMap<String, bool>) -> Self {
        self.request_signatures = Some(signatures);
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Process the Security header of `message` addressed to this node.
    ///
    /// `sender_certificate` is a certificate the caller already trusts for
    /// the sender (matched by X509SKI references); `finder` supplies
    /// security contexts and `resolver` certificates, private keys and
    /// cached secrets. A message without a Security header for us yields
    /// an empty result.
    pub fn undecorate_message<'a>(
        &'a self,
        message: &'a mut dyn Message,
        sender_certificate: Option<&'a X509Certificate>,
        finder: Option<&'a dyn SecurityContextFinder>,
        resolver: Option<&'a dyn SecurityTokenResolver>,
    ) -> Result<ProcessorResult> {
        let doc = message.document();
        if self.config.reject_on_must_understand {
            header::reject_if_headers_not_understood(doc)?;
        }
        let Some((security, actor)) = header::find_security_header(doc, &self.config) else {
            tracing::debug!("no Security header addressed to this node");
            return Ok(ProcessorResult::empty(doc.id()));
        };
        tracing::debug!(?actor, "processing Security header");

        let mut walk = Walk::new(self, message, security, actor, sender_certificate, finder, resolver);
        walk.index.check_unique()?;
        walk.collect_tokens()?;
        walk.process_header()?;
        walk.finish()
    }
}

impl Default for WssProcessor {
    fn default() -> Self {
        Self::new(ProcessorConfig::default())
    }
}

// ── Per-message state ────────────────────────────────────────────────

pub(crate) struct Walk<'a> {
    pub(crate) config: &'a ProcessorConfig,
    pub(crate) engine: &'a dyn CryptoEngine,
    pub(crate) key_usage: &'a dyn KeyUsageChecker,
    pub(crate) error_handler: Option<&'a dyn DecryptionErrorHandler>,
    pub(crate) request_signatures: Option<&'a HashMap<String, bool>>,
    pub(crate) sender_certificate: Option<&'a X509Certificate>,
    pub(crate) finder: Option<&'a dyn SecurityContextFinder>,
    pub(crate) resolver: Option<&'a dyn SecurityTokenResolver>,
    pub(crate) message: &'a mut dyn Message,

    pub(crate) index: IdIndex,
    pub(crate) security: NodeId,
    pub(crate) security_ns: String,
    pub(crate) actor: SecurityActor,
    pub(crate) tokens: TokenStore,
    /// SecurityTokenReference element → the token it resolved to.
    pub(crate) str_cache: HashMap<NodeId, TokenRef>,

    pub(crate) signed_elements: Vec<SignedElement>,
    pub(crate) signed_parts: Vec<SignedPart>,
    pub(crate) encrypted_elements: Vec<EncryptedElement>,
    pub(crate) timestamp: Option<Timestamp>,
    pub(crate) confirmation: SignatureConfirmation,
    pub(crate) validated_signature_values: Vec<ValidatedSignatureValue>,
    pub(crate) ignored_signatures: Vec<IgnoredSignature>,
    /// EncryptedKeys whose ReferenceList was fully processed.
    pub(crate) processed_encrypted_keys: Vec<NodeId>,
    /// An EncryptedKey or EncryptedData not addressed to us was skipped.
    pub(crate) encryption_ignored: bool,
    pub(crate) wss11_seen: bool,
    pub(crate) derived_keys_seen: bool,
    pub(crate) last_key_encryption_algorithm: Option<String>,
}

/// Security header children the walk knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderElement {
    EncryptedKey,
    EncryptedData,
    ReferenceList,
    Timestamp,
    BinarySecurityToken,
    SamlAssertion,
    Signature,
    UsernameToken,
    SecurityContextToken,
    DerivedKeyToken,
    SecurityTokenReference,
    SignatureConfirmation,
    Unknown,
}

impl HeaderElement {
    fn classify(doc: &Document, element: NodeId) -> Self {
        let (Some(local), Some(uri)) = (doc.local_name(element), doc.namespace_uri(element)) else {
            return HeaderElement::Unknown;
        };
        match local {
            ns::node::ENCRYPTED_KEY if uri == ns::ENC => HeaderElement::EncryptedKey,
            ns::node::ENCRYPTED_DATA if uri == ns::ENC => HeaderElement::EncryptedData,
            ns::node::REFERENCE_LIST if uri == ns::ENC => HeaderElement::ReferenceList,
            ns::node::TIMESTAMP if ns::is_utility_ns(uri) => HeaderElement::Timestamp,
            ns::node::BINARY_SECURITY_TOKEN if ns::is_security_ns(uri) => {
                HeaderElement::BinarySecurityToken
            }
            ns::node::ASSERTION if uri == ns::SAML_1 || uri == ns::SAML_2 => HeaderElement::SamlAssertion,
            ns::node::SIGNATURE if uri == ns::DSIG => HeaderElement::Signature,
            ns::node::USERNAME_TOKEN if ns::is_security_ns(uri) => HeaderElement::UsernameToken,
            ns::node::SECURITY_CONTEXT_TOKEN if ns::is_secure_conversation_ns(uri) => {
                HeaderElement::SecurityContextToken
            }
            ns::node::DERIVED_KEY_TOKEN if ns::is_secure_conversation_ns(uri) => {
                HeaderElement::DerivedKeyToken
            }
            ns::node::SECURITY_TOKEN_REFERENCE if ns::is_security_ns(uri) => {
                HeaderElement::SecurityTokenReference
            }
            ns::node::SIGNATURE_CONFIRMATION if uri == ns::WSSE11 => HeaderElement::SignatureConfirmation,
            _ => HeaderElement::Unknown,
        }
    }
}

/// Recognized BinarySecurityToken value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryTokenType {
    X509V3,
    PkiPath,
    Pkcs7,
    Kerberos,
}

impl BinaryTokenType {
    fn from_value_type(value_type: &str) -> Option<Self> {
        use ns::value_type as vt;
        if vt::matches(value_type, vt::X509V3) {
            Some(BinaryTokenType::X509V3)
        } else if vt::matches(value_type, vt::X509_PKI_PATH) {
            Some(BinaryTokenType::PkiPath)
        } else if vt::matches(value_type, vt::PKCS7) {
            Some(BinaryTokenType::Pkcs7)
        } else if value_type == vt::KERBEROS_GSS_AP_REQ || value_type == vt::KERBEROS_GSS_AP_REQ_1510 {
            Some(BinaryTokenType::Kerberos)
        } else {
            None
        }
    }
}

impl<'a> Walk<'a> {
    pub(crate) fn new(
        processor: &'a WssProcessor,
        message: &'a mut dyn Message,
        security: NodeId,
        actor: SecurityActor,
        sender_certificate: Option<&'a X509Certificate>,
        finder: Option<&'a dyn SecurityContextFinder>,
        resolver: Option<&'a dyn SecurityTokenResolver>,
    ) -> Self {
        let doc = message.document();
        let index = IdIndex::build(doc, processor.config.id_attribute_config());
        let security_ns = doc.namespace_uri(security).unwrap_or(ns::WSSE).to_owned();
        Self {
            config: &processor.config,
            engine: &*processor.engine,
            key_usage: &*processor.key_usage,
            error_handler: processor.decryption_error_handler.as_deref(),
            request_signatures: processor.request_signatures.as_ref(),
            sender_certificate,
            finder,
            resolver,
            message,
            index,
            security,
            security_ns,
            actor,
            tokens: TokenStore::default(),
            str_cache: HashMap::new(),
            signed_elements: Vec::new(),
            signed_parts: Vec::new(),
            encrypted_elements: Vec::new(),
            timestamp: None,
            confirmation: SignatureConfirmation::default(),
            validated_signature_values: Vec::new(),
            ignored_signatures: Vec::new(),
            processed_encrypted_keys: Vec::new(),
            encryption_ignored: false,
            wss11_seen: false,
            derived_keys_seen: false,
            last_key_encryption_algorithm: None,
        }
    }

    // ── Pass one: tokens ─────────────────────────────────────────────

    pub(crate) fn collect_tokens(&mut self) -> Result<()> {
        let doc = self.message.document();
        let children: Vec<(NodeId, HeaderElement)> = doc
            .child_elements(self.security)
            .map(|c| (c, HeaderElement::classify(doc, c)))
            .collect();

        for &(child, kind) in &children {
            match kind {
                HeaderElement::BinarySecurityToken => self.add_binary_security_token(child)?,
                HeaderElement::SamlAssertion => self.add_saml_assertion(child)?,
                _ => {}
            }
        }
        for &(child, kind) in &children {
            if kind == HeaderElement::SecurityTokenReference && self.resolve_str(child)?.is_none() {
                tracing::debug!("free-standing SecurityTokenReference left unresolved");
            }
        }
        Ok(())
    }

    fn add_binary_security_token(&mut self, element: NodeId) -> Result<()> {
        let doc = self.message.document();
        let value_type = doc.attribute(element, ns::attr::VALUE_TYPE).ok_or_else(|| {
            Error::InvalidDocumentFormat("BinarySecurityToken has no ValueType".into())
        })?;
        let Some(token_type) = BinaryTokenType::from_value_type(value_type) else {
            if self.config.permit_unknown_binary_security_tokens {
                tracing::warn!(value_type, "skipping BinarySecurityToken with unsupported ValueType");
                return Ok(());
            }
            return Err(Error::Processor(format!(
                "Unsupported BinarySecurityToken ValueType: {value_type}"
            )));
        };
        if let Some(encoding) = doc.attribute(element, ns::attr::ENCODING_TYPE) {
            if encoding != ns::encoding_type::BASE64_BINARY {
                return Err(Error::InvalidDocumentFormat(format!(
                    "unsupported BinarySecurityToken EncodingType: {encoding}"
                )));
            }
        }
        let text = doc.text_content(element);
        if text.trim().is_empty() {
            return Err(Error::InvalidDocumentFormat("BinarySecurityToken is empty".into()));
        }
        let data = decode_base64(&text)?;
        let id = doc
            .attribute_in(element, ns::UTILITY_NAMESPACES, ns::attr::ID)
            .map(str::to_owned);
        let backing = TokenBacking::Element(element);

        let token = match token_type {
            BinaryTokenType::X509V3 => SecurityToken::X509(X509Token::new(
                backing,
                id,
                X509Certificate::from_der(&data)?,
                X509Source::BinarySecurityToken,
            )),
            BinaryTokenType::PkiPath => {
                let chain = bundle::parse_pki_path(&data)?;
                SecurityToken::X509(X509Token::new(backing, id, leaf_of(&chain)?, X509Source::PkiPath))
            }
            BinaryTokenType::Pkcs7 => {
                let chain = bundle::parse_pkcs7(&data)?;
                SecurityToken::X509(X509Token::new(backing, id, leaf_of(&chain)?, X509Source::Pkcs7))
            }
            BinaryTokenType::Kerberos => SecurityToken::Kerberos(KerberosToken::from_ap_req(element, id, data)),
        };
        tracing::debug!(kind = ?token.kind(), "collected BinarySecurityToken");
        self.tokens.push(token);
        Ok(())
    }

    fn add_saml_assertion(&mut self, element: NodeId) -> Result<()> {
        let doc = self.message.document();
        let saml_ns = doc.namespace_uri(element).unwrap_or_default();
        let (version, id) = if saml_ns == ns::SAML_2 {
            (SamlVersion::V2_0, doc.attribute(element, ns::attr::SAML2_ID))
        } else {
            (SamlVersion::V1_1, doc.attribute(element, ns::attr::ASSERTION_ID))
        };
        let token = SamlAssertionToken {
            backing: TokenBacking::Element(element),
            id: id.map(str::to_owned),
            version,
            subject_certificate: saml_subject_certificate(doc, element, saml_ns),
            signing: SigningState::default(),
        };
        self.tokens.push(SecurityToken::SamlAssertion(token));
        Ok(())
    }

    // ── Pass two: the header walk ────────────────────────────────────

    pub(crate) fn process_header(&mut self) -> Result<()> {
        let mut cursor = self.message.document().child_elements(self.security).next();
        while let Some(element) = cursor {
            let following = next_element_sibling(self.message.document(), element);
            self.process_header_element(element)?;

            let doc = self.message.document();
            cursor = if doc.is_attached(element) {
                next_element_sibling(doc, element)
            } else {
                following.filter(|n| doc.is_attached(*n))
            };
        }
        Ok(())
    }

    fn process_header_element(&mut self, element: NodeId) -> Result<()> {
        let doc = self.message.document();
        match HeaderElement::classify(doc, element) {
            HeaderElement::EncryptedKey => self.process_encrypted_key(element),
            HeaderElement::ReferenceList => self.process_reference_list(element),
            HeaderElement::Timestamp => self.process_timestamp(element),
            HeaderElement::Signature => self.process_signature(element),
            HeaderElement::SecurityContextToken => self.process_security_context_token(element),
            HeaderElement::DerivedKeyToken => self.process_derived_key_token(element),
            HeaderElement::BinarySecurityToken | HeaderElement::SamlAssertion => Ok(()),
            HeaderElement::UsernameToken => {
                match UsernameToken::parse(doc, element) {
                    Ok(token) => {
                        self.tokens.push(SecurityToken::Username(token));
                    }
                    Err(e) => tracing::warn!(error = %e, "dropping malformed UsernameToken"),
                }
                Ok(())
            }
            HeaderElement::SecurityTokenReference => {
                if is_wss11_reference(doc, element) {
                    self.wss11_seen = true;
                }
                Ok(())
            }
            HeaderElement::SignatureConfirmation => {
                let value = doc.attribute(element, ns::attr::VALUE).map(str::to_owned);
                self.confirmation.record(value.as_deref(), element);
                self.wss11_seen = true;
                Ok(())
            }
            HeaderElement::EncryptedData => {
                tracing::debug!("EncryptedData in Security header not referenced by any key we hold");
                Ok(())
            }
            HeaderElement::Unknown => {
                let qname = doc.element(element).map(|e| e.name.qualified()).unwrap_or_default();
                if header::must_understand(doc, element) {
                    return Err(Error::Validation(format!(
                        "Unrecognized element in Security header with mustUnderstand: {qname}"
                    )));
                }
                tracing::debug!(element = %qname, "ignoring unrecognized Security header element");
                Ok(())
            }
        }
    }

    fn process_timestamp(&mut self, element: NodeId) -> Result<()> {
        if self.timestamp.is_some() {
            if self.config.permit_multiple_timestamps {
                tracing::debug!("ignoring additional Timestamp");
                return Ok(());
            }
            return Err(Error::InvalidDocumentFormat(
                "More than one Timestamp element was encountered in the Security header".into(),
            ));
        }
        self.timestamp = Some(Timestamp::parse(self.message.document(), element)?);
        Ok(())
    }

    fn process_security_context_token(&mut self, element: NodeId) -> Result<()> {
        let doc = self.message.document();
        let sc_ns = doc.namespace_uri(element).unwrap_or_default();
        let identifier = doc
            .find_child(element, sc_ns, ns::node::IDENTIFIER)
            .map(|n| doc.text_content(n).trim().to_owned())
            .filter(|i| !i.is_empty())
            .ok_or_else(|| Error::InvalidDocumentFormat("SecurityContextToken has no Identifier".into()))?;
        let id = doc
            .attribute_in(element, ns::UTILITY_NAMESPACES, ns::attr::ID)
            .map(str::to_owned);

        let finder = self.finder.ok_or_else(|| {
            Error::Processor("SecurityContextToken found but no security context finder is available".into())
        })?;
        let context = finder
            .security_context(SecurityContextKind::SecureConversation, &identifier)
            .ok_or_else(|| bad_context(&identifier))?;

        tracing::debug!(%identifier, "security context found");
        self.tokens.push(SecurityToken::SecurityContext(SecurityContextToken {
            backing: TokenBacking::Element(element),
            id,
            identifier,
            context,
            signing: SigningState::default(),
        }));
        Ok(())
    }

    fn process_derived_key_token(&mut self, element: NodeId) -> Result<()> {
        self.derived_keys_seen = true;
        let doc = self.message.document();
        let params = DerivationParams::parse(doc, element)?;
        let id = doc
            .attribute_in(element, ns::UTILITY_NAMESPACES, ns::attr::ID)
            .map(str::to_owned);
        let str_element = security_child(doc, element, ns::node::SECURITY_TOKEN_REFERENCE).ok_or_else(|| {
            Error::InvalidDocumentFormat("DerivedKeyToken has no SecurityTokenReference".into())
        })?;

        let Some(source) = self.resolve_str(str_element)? else {
            if self.encryption_ignored {
                tracing::info!("DerivedKeyToken source belongs to another recipient; skipping it");
                return Ok(());
            }
            return Err(Error::InvalidDocumentFormat(
                "Unable to resolve the DerivedKeyToken's SecurityTokenReference".into(),
            ));
        };
        match self.tokens.get(source).kind() {
            TokenKind::SecurityContext | TokenKind::EncryptedKey | TokenKind::Kerberos => {}
            other => {
                return Err(Error::InvalidDocumentFormat(format!(
                    "DerivedKeyToken cannot derive from a {other:?} token"
                )))
            }
        }
        self.tokens
            .push(SecurityToken::DerivedKey(DerivedKeyToken::new(element, id, params, source)));
        Ok(())
    }

    // ── Completion ───────────────────────────────────────────────────

    pub(crate) fn finish(mut self) -> Result<ProcessorResult> {
        if self.timestamp.is_none() {
            self.timestamp = self.legacy_timestamp()?;
        }
        self.check_timestamp_signatures()?;

        if let Some(request) = self.request_signatures {
            let policy = ConfirmationPolicy {
                strict: self.config.strict_signature_confirmation_validation,
                wss11_configured: self.config.wss11_configured,
                wss11_seen: self.wss11_seen,
            };
            let doc = self.message.document();
            let encrypted = &self.encrypted_elements;
            self.confirmation
                .validate(request, policy, |n| is_within_encrypted(doc, encrypted, n));
            for error in self.confirmation.errors() {
                tracing::warn!(%error, "SignatureConfirmation check failed");
            }
        }

        self.prune_empty_headers()?;

        Ok(ProcessorResult {
            document: self.message.document().id(),
            tokens: self.tokens,
            signed_elements: self.signed_elements,
            signed_parts: self.signed_parts,
            encrypted_elements: self.encrypted_elements,
            timestamp: self.timestamp,
            signature_confirmation: self.confirmation,
            security_namespace: Some(self.security_ns),
            processed_actor: Some(self.actor),
            validated_signature_values: self.validated_signature_values,
            ignored_signatures: self.ignored_signatures,
            wss11_seen: self.wss11_seen,
            derived_keys_seen: self.derived_keys_seen,
            last_key_encryption_algorithm: self.last_key_encryption_algorithm,
        })
    }

    /// A Timestamp placed directly in the SOAP Header by older senders.
    fn legacy_timestamp(&self) -> Result<Option<Timestamp>> {
        let doc = self.message.document();
        let Some(soap_header) = header::header_element(doc) else {
            return Ok(None);
        };
        let found = doc.child_elements(soap_header).find(|c| {
            doc.local_name(*c) == Some(ns::node::TIMESTAMP)
                && doc.namespace_uri(*c).is_some_and(ns::is_utility_ns)
        });
        match found {
            Some(element) => {
                tracing::debug!("using Timestamp from the SOAP Header");
                Timestamp::parse(doc, element).map(Some)
            }
            None => Ok(None),
        }
    }

    fn check_timestamp_signatures(&mut self) -> Result<()> {
        let Some(timestamp) = self.timestamp.as_mut() else {
            return Ok(());
        };
        let mut signatures: Vec<NodeId> = self
            .signed_elements
            .iter()
            .filter(|s| s.element == timestamp.element)
            .map(|s| s.signature)
            .collect();
        signatures.sort();
        signatures.dedup();
        if signatures.len() > 1 && !self.config.permit_multiple_timestamp_signatures {
            return Err(Error::Validation(
                "Found more than one signature covering the Timestamp".into(),
            ));
        }
        timestamp.signed = !signatures.is_empty();
        Ok(())
    }

    /// Drop the Security header, and then the SOAP Header, once nothing
    /// but whitespace is left in them.
    fn prune_empty_headers(&mut self) -> Result<()> {
        if !self.message.is_writable() {
            return Ok(());
        }
        let doc = self.message.document_writable();
        if !doc.is_attached(self.security) || !is_empty_element(doc, self.security) {
            return Ok(());
        }
        doc.remove(self.security)?;
        if let Some(soap_header) = header::header_element(doc) {
            if is_empty_element(doc, soap_header) {
                doc.remove(soap_header)?;
            }
        }
        tracing::debug!("removed emptied Security header");
        Ok(())
    }

    /// True if `node` lies inside an element that arrived encrypted.
    pub(crate) fn is_encrypted(&self, node: NodeId) -> bool {
        is_within_encrypted(self.message.document(), &self.encrypted_elements, node)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

pub(crate) fn bad_context(identifier: &str) -> Error {
    Error::BadSecurityContext {
        identifier: identifier.to_owned(),
        fault_code: BAD_CONTEXT_TOKEN_FAULT.to_owned(),
        message: "The security context token is unknown or has expired".to_owned(),
    }
}

/// The first child of `parent` named `local` in any secext namespace.
pub(crate) fn security_child(doc: &Document, parent: NodeId, local: &str) -> Option<NodeId> {
    doc.child_elements(parent).find(|c| {
        doc.local_name(*c) == Some(local) && doc.namespace_uri(*c).is_some_and(ns::is_security_ns)
    })
}

fn next_element_sibling(doc: &Document, node: NodeId) -> Option<NodeId> {
    let mut current = doc.next_sibling(node);
    while let Some(n) = current {
        if doc.is_element(n) {
            return Some(n);
        }
        current = doc.next_sibling(n);
    }
    None
}

fn is_empty_element(doc: &Document, element: NodeId) -> bool {
    doc.children(element).all(|c| match doc.node_kind(c) {
        Some(NodeKind::Text(t)) => t.trim().is_empty(),
        Some(NodeKind::Comment(_)) => true,
        _ => false,
    })
}

fn is_within_encrypted(doc: &Document, encrypted: &[EncryptedElement], node: NodeId) -> bool {
    encrypted.iter().any(|e| doc.is_ancestor_or_self(e.element, node))
}

/// A SecurityTokenReference using WS-Security 1.1 features.
fn is_wss11_reference(doc: &Document, str_element: NodeId) -> bool {
    doc.attribute_ns(str_element, ns::WSSE11, ns::attr::TOKEN_TYPE).is_some()
        || doc.child_elements(str_element).any(|c| {
            doc.local_name(c) == Some(ns::node::KEY_IDENTIFIER)
                && doc.attribute(c, ns::attr::VALUE_TYPE) == Some(ns::value_type::ENCRYPTED_KEY_SHA1)
        })
}

fn leaf_of(chain: &[X509Certificate]) -> Result<X509Certificate> {
    bundle::leaf_certificate(chain)
        .cloned()
        .ok_or_else(|| Error::Certificate("certificate bundle has no leaf certificate".into()))
}

/// Holder-of-key certificate in an assertion's SubjectConfirmation.
fn saml_subject_certificate(doc: &Document, assertion: NodeId, saml_ns: &str) -> Option<X509Certificate> {
    let confirmation = doc
        .descendants(assertion)
        .into_iter()
        .find(|n| doc.is_named(*n, saml_ns, ns::node::SUBJECT_CONFIRMATION))?;
    let cert_element = doc
        .descendants(confirmation)
        .into_iter()
        .find(|n| doc.is_named(*n, ns::DSIG, ns::node::X509_CERTIFICATE))?;
    let der = decode_base64(&doc.text_content(cert_element)).ok()?;
    match X509Certificate::from_der(&der) {
        Ok(cert) => Some(cert),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable SAML subject certificate");
            None
        }
    }
}
