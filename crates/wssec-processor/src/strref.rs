#![forbid(unsafe_code)]

//! SecurityTokenReference resolution.
//!
//! A reference is resolved at most once per run: the first successful
//! resolution is remembered against the STR element, and later lookups
//! return the same token without touching the resolver again. Tokens
//! found outside the message (a certificate from the resolver, a cached
//! EncryptedKey secret, a Kerberos session key) are synthesized into the
//! token store, where later references find them too.

use wssec_core::{ns, Error, Result};
use wssec_dsig::StrTarget;
use wssec_keys::X509Certificate;
use wssec_xml::{uri, Document, NodeId};

use crate::processor::{bad_context, Walk};
use crate::resolver::{b64, SecurityContextKind};
use crate::token::{
    decode_base64, EncryptedKeyToken, KerberosToken, SecurityContextToken, SecurityToken,
    SigningState, TokenBacking, TokenKind, TokenRef, X509Source, X509Token,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrShape {
    Reference,
    KeyIdentifier,
    X509Data,
}

/// How a certificate is named.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CertificateLookup<'k> {
    Thumbprint(&'k [u8]),
    SubjectKeyIdentifier(&'k [u8]),
    IssuerSerial { issuer: &'k str, serial: &'k str },
}

impl CertificateLookup<'_> {
    fn matches(&self, cert: &X509Certificate) -> bool {
        match *self {
            CertificateLookup::Thumbprint(tp) => cert.thumbprint_sha1() == tp,
            CertificateLookup::SubjectKeyIdentifier(ski) => cert.subject_key_identifier() == ski,
            CertificateLookup::IssuerSerial { issuer, serial } => cert.matches_issuer_serial(issuer, serial),
        }
    }

    fn source(&self) -> X509Source {
        match self {
            CertificateLookup::Thumbprint(_) => X509Source::Thumbprint,
            CertificateLookup::SubjectKeyIdentifier(_) => X509Source::SubjectKeyIdentifier,
            CertificateLookup::IssuerSerial { .. } => X509Source::IssuerSerial,
        }
    }
}

impl Walk<'_> {
    /// Resolve the SecurityTokenReference `str_element` to a token.
    ///
    /// `Ok(None)` means the reference is well formed but names nothing we
    /// can find; malformed references are errors.
    pub(crate) fn resolve_str(&mut self, str_element: NodeId) -> Result<Option<TokenRef>> {
        if let Some(found) = self.str_cache.get(&str_element) {
            return Ok(Some(*found));
        }
        let resolved = self.resolve_str_uncached(str_element)?;
        match resolved {
            Some(token) => {
                tracing::trace!(token = token.index(), "SecurityTokenReference resolved");
                self.str_cache.insert(str_element, token);
            }
            None => tracing::debug!("SecurityTokenReference could not be resolved"),
        }
        Ok(resolved)
    }

    fn resolve_str_uncached(&mut self, str_element: NodeId) -> Result<Option<TokenRef>> {
        let doc = self.message.document();
        let shape = doc.child_elements(str_element).find_map(|c| {
            let local = doc.local_name(c)?;
            let uri = doc.namespace_uri(c)?;
            let shape = match local {
                ns::node::REFERENCE if ns::is_security_ns(uri) => StrShape::Reference,
                ns::node::KEY_IDENTIFIER if ns::is_security_ns(uri) => StrShape::KeyIdentifier,
                ns::node::X509_DATA if uri == ns::DSIG => StrShape::X509Data,
                _ => return None,
            };
            Some((shape, c))
        });

        match shape {
            Some((StrShape::Reference, reference)) => self.resolve_direct_reference(reference),
            Some((StrShape::KeyIdentifier, key_identifier)) => self.resolve_key_identifier(key_identifier),
            Some((StrShape::X509Data, x509_data)) => self.resolve_x509_data(x509_data),
            None => {
                tracing::warn!("unsupported SecurityTokenReference form");
                Ok(None)
            }
        }
    }

    fn resolve_direct_reference(&mut self, reference: NodeId) -> Result<Option<TokenRef>> {
        let doc = self.message.document();
        let target_uri = doc
            .attribute(reference, ns::attr::URI)
            .ok_or_else(|| Error::InvalidDocumentFormat("SecurityTokenReference Reference has no URI".into()))?
            .to_owned();
        if uri::is_xpointer(&target_uri) {
            return Err(Error::InvalidDocumentFormat(format!(
                "XPointer references are not supported: {target_uri}"
            )));
        }
        let expects_certificate = doc
            .attribute(reference, ns::attr::VALUE_TYPE)
            .is_some_and(|vt| ns::value_type::matches(vt, ns::value_type::X509V3));

        let Some(id) = uri::parse_same_document_ref(&target_uri) else {
            // not a fragment: a SecureConversation context identifier
            return self.resolve_context_identifier(&target_uri);
        };

        let target = self.index.find(doc, id);
        if let Some(element) = target {
            if expects_certificate && !is_binary_security_token(doc, element) {
                return Err(Error::InvalidDocumentFormat(format!(
                    "X509v3 reference {target_uri} does not point at a BinarySecurityToken"
                )));
            }
        }
        Ok(target
            .and_then(|element| self.tokens.by_element(element))
            .or_else(|| self.tokens.by_id(id)))
    }

    fn resolve_context_identifier(&mut self, identifier: &str) -> Result<Option<TokenRef>> {
        if let Some(found) = self.tokens.security_context_by_identifier(identifier) {
            return Ok(Some(found));
        }
        let Some(finder) = self.finder else {
            return Ok(None);
        };
        let context = finder
            .security_context(SecurityContextKind::SecureConversation, identifier)
            .ok_or_else(|| bad_context(identifier))?;
        Ok(Some(self.tokens.push(SecurityToken::SecurityContext(SecurityContextToken {
            backing: TokenBacking::Synthesized,
            id: None,
            identifier: identifier.to_owned(),
            context,
            signing: SigningState::default(),
        }))))
    }

    fn resolve_key_identifier(&mut self, key_identifier: NodeId) -> Result<Option<TokenRef>> {
        use ns::value_type as vt;

        let doc = self.message.document();
        let value_type = doc
            .attribute(key_identifier, ns::attr::VALUE_TYPE)
            .ok_or_else(|| Error::InvalidDocumentFormat("KeyIdentifier has no ValueType".into()))?
            .to_owned();
        let value = doc.text_content(key_identifier).trim().to_owned();
        if value.is_empty() {
            return Err(Error::InvalidDocumentFormat("KeyIdentifier is empty".into()));
        }

        if value_type == vt::ENCRYPTED_KEY_SHA1 {
            self.wss11_seen = true;
            return Ok(self.resolve_encrypted_key_sha1(&value));
        }
        if vt::matches(&value_type, vt::THUMBPRINT_SHA1) {
            let thumbprint = decode_base64(&value)?;
            return Ok(self.resolve_certificate(CertificateLookup::Thumbprint(&thumbprint)));
        }
        if vt::matches(&value_type, vt::X509_SKI) {
            let ski = decode_base64(&value)?;
            return Ok(self.resolve_certificate(CertificateLookup::SubjectKeyIdentifier(&ski)));
        }
        if value_type == vt::SAML_ASSERTION_ID || value_type == vt::SAML_ID {
            return Ok(self
                .tokens
                .by_id(&value)
                .filter(|t| self.tokens.get(*t).kind() == TokenKind::SamlAssertion));
        }
        if value_type == vt::KERBEROS_AP_REQ_SHA1 {
            return Ok(self.resolve_kerberos_sha1(&value));
        }

        tracing::warn!(%value_type, "unsupported KeyIdentifier ValueType");
        Ok(None)
    }

    pub(crate) fn resolve_x509_data(&mut self, x509_data: NodeId) -> Result<Option<TokenRef>> {
        let doc = self.message.document();
        if let Some(issuer_serial) = doc.find_child(x509_data, ns::DSIG, ns::node::X509_ISSUER_SERIAL) {
            let part = |local: &str| {
                doc.find_child(issuer_serial, ns::DSIG, local)
                    .map(|n| doc.text_content(n).trim().to_owned())
                    .ok_or_else(|| Error::InvalidDocumentFormat(format!("X509IssuerSerial has no {local}")))
            };
            let issuer = part(ns::node::X509_ISSUER_NAME)?;
            let serial = part(ns::node::X509_SERIAL_NUMBER)?;
            return Ok(self.resolve_certificate(CertificateLookup::IssuerSerial {
                issuer: &issuer,
                serial: &serial,
            }));
        }
        if let Some(ski_element) = doc.find_child(x509_data, ns::DSIG, ns::node::X509_SKI) {
            let ski = decode_base64(&doc.text_content(ski_element))?;
            return Ok(self.resolve_certificate(CertificateLookup::SubjectKeyIdentifier(&ski)));
        }
        tracing::warn!("X509Data names no certificate we can look up");
        Ok(None)
    }

    /// An X.509 token for the named certificate: one already in the store,
    /// else the caller's sender certificate, else one from the resolver.
    pub(crate) fn resolve_certificate(&mut self, lookup: CertificateLookup<'_>) -> Option<TokenRef> {
        let existing = match lookup {
            CertificateLookup::Thumbprint(tp) => self.tokens.x509_by_thumbprint(tp),
            CertificateLookup::SubjectKeyIdentifier(ski) => self.tokens.x509_by_ski(ski),
            CertificateLookup::IssuerSerial { .. } => self
                .tokens
                .iter()
                .find(|(_, t)| matches!(t, SecurityToken::X509(x) if lookup.matches(&x.certificate)))
                .map(|(r, _)| r),
        };
        if existing.is_some() {
            return existing;
        }

        let (certificate, source) = match self.sender_certificate.filter(|c| lookup.matches(c)) {
            Some(sender) => (sender.clone(), X509Source::Sender),
            None => {
                let resolver = self.resolver?;
                let found = match lookup {
                    CertificateLookup::Thumbprint(tp) => resolver.lookup_by_thumbprint(tp),
                    CertificateLookup::SubjectKeyIdentifier(ski) => resolver.lookup_by_ski(ski),
                    CertificateLookup::IssuerSerial { issuer, serial } => {
                        resolver.lookup_by_issuer_serial(issuer, serial)
                    }
                };
                (found?, lookup.source())
            }
        };
        tracing::debug!(
            thumbprint = %b64(&certificate.thumbprint_sha1()),
            ?source,
            "certificate found outside the message"
        );
        Some(self.tokens.push(SecurityToken::X509(X509Token::new(
            TokenBacking::Synthesized,
            None,
            certificate,
            source,
        ))))
    }

    fn resolve_encrypted_key_sha1(&mut self, sha1: &str) -> Option<TokenRef> {
        if let Some(found) = self.tokens.encrypted_key_by_sha1(sha1) {
            return Some(found);
        }
        let secret = self.resolver?.secret_for_encrypted_key_sha1(sha1)?;
        tracing::debug!(encrypted_key_sha1 = sha1, "EncryptedKey secret found in cache");
        Some(self.tokens.push(SecurityToken::EncryptedKey(EncryptedKeyToken::from_cached_secret(
            sha1, secret,
        ))))
    }

    fn resolve_kerberos_sha1(&mut self, sha1: &str) -> Option<TokenRef> {
        if let Some(found) = self.tokens.kerberos_by_sha1(sha1) {
            return Some(found);
        }
        let session_key = self.kerberos_session_key(sha1)?;
        Some(self.tokens.push(SecurityToken::Kerberos(KerberosToken::from_session_key(sha1, session_key))))
    }

    /// The replacement the STR-Transform digests for `token`.
    pub(crate) fn str_target(&self, token: TokenRef) -> Option<StrTarget> {
        let token = self.tokens.get(token);
        if let Some(element) = token.element() {
            return Some(StrTarget::Element(element));
        }
        match token {
            SecurityToken::X509(x509) => Some(StrTarget::Synthesized(
                x509.binary_security_token_xml(&self.security_ns),
            )),
            _ => None,
        }
    }
}

fn is_binary_security_token(doc: &Document, element: NodeId) -> bool {
    doc.local_name(element) == Some(ns::node::BINARY_SECURITY_TOKEN)
        && doc.namespace_uri(element).is_some_and(ns::is_security_ns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::find_security_header;
    use crate::message::{Message, SoapMessage};
    use crate::processor::WssProcessor;
    use crate::resolver::{
        InMemorySecurityContextFinder, SecurityContext, SecurityContextFinder, SecurityTokenResolver,
        SimpleSecurityTokenResolver,
    };
    use crate::testutil::*;
    use wssec_keys::fixtures;

    /// Run `f` against a fresh walk over `xml`, with the Security header's
    /// child elements.
    fn with_walk<R>(
        xml: &str,
        sender: Option<&X509Certificate>,
        finder: Option<&dyn SecurityContextFinder>,
        resolver: Option<&dyn SecurityTokenResolver>,
        f: impl FnOnce(&mut Walk<'_>, Vec<NodeId>) -> R,
    ) -> R {
        let processor = WssProcessor::default();
        let mut message = SoapMessage::parse(xml).unwrap();
        let (security, actor) = find_security_header(message.document(), processor.config()).unwrap();
        let children: Vec<NodeId> = message.document().child_elements(security).collect();
        let mut walk = Walk::new(&processor, &mut message, security, actor, sender, finder, resolver);
        f(&mut walk, children)
    }

    fn x509_source(walk: &Walk<'_>, token: TokenRef) -> X509Source {
        match walk.tokens.get(token) {
            SecurityToken::X509(x509) => x509.source,
            other => panic!("expected an X.509 token, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_resolution_is_memoized() {
        let key_id = str_key_identifier(ns::value_type::THUMBPRINT_SHA1, fixtures::CERT_THUMBPRINT_B64);
        let xml = envelope(&format!("{key_id}{key_id}"));
        let resolver = CountingResolver::new();

        with_walk(&xml, None, None, Some(&resolver), |walk, children| {
            let first = walk.resolve_str(children[0]).unwrap().unwrap();
            assert_eq!(walk.resolve_str(children[0]).unwrap(), Some(first));
            // a second reference to the same certificate finds the synthesized token
            assert_eq!(walk.resolve_str(children[1]).unwrap(), Some(first));
            assert_eq!(walk.tokens.len(), 1);
            assert!(walk.tokens.get(first).is_synthesized());
            assert_eq!(x509_source(walk, first), X509Source::Thumbprint);
        });
        assert_eq!(resolver.thumbprint_lookups(), 1);
    }

    #[test]
    fn test_reference_to_binary_security_token() {
        let xml = envelope(&format!(
            "{}{}",
            bst("X509-1"),
            str_reference("#X509-1", ns::value_type::X509V3)
        ));
        with_walk(&xml, None, None, None, |walk, children| {
            walk.collect_tokens().unwrap();
            let token = walk.resolve_str(children[1]).unwrap().unwrap();
            assert_eq!(walk.tokens.get(token).element(), Some(children[0]));
            assert_eq!(x509_source(walk, token), X509Source::BinarySecurityToken);
            assert_eq!(walk.str_target(token), Some(StrTarget::Element(children[0])));
        });
    }

    #[test]
    fn test_x509_reference_must_name_binary_security_token() {
        let xml = envelope(&format!(
            "{TIMESTAMP}{}",
            str_reference("#TS-1", ns::value_type::X509V3)
        ));
        with_walk(&xml, None, None, None, |walk, children| {
            let err = walk.resolve_str(children[1]).unwrap_err();
            assert!(matches!(err, Error::InvalidDocumentFormat(_)), "{err:?}");
        });
    }

    #[test]
    fn test_xpointer_reference_rejected() {
        let xml = envelope(&str_reference("#xpointer(id('X509-1'))", ns::value_type::X509V3));
        with_walk(&xml, None, None, None, |walk, children| {
            assert!(walk.resolve_str(children[0]).is_err());
        });
    }

    #[test]
    fn test_encrypted_key_sha1_from_cache() {
        let resolver = SimpleSecurityTokenResolver::new();
        resolver.put_secret_for_encrypted_key_sha1("c2hhMS1vZi1layE=", &[9; 16]);
        let xml = envelope(&str_key_identifier(
            ns::value_type::ENCRYPTED_KEY_SHA1,
            "c2hhMS1vZi1layE=",
        ));

        with_walk(&xml, None, None, Some(&resolver), |walk, children| {
            let token = walk.resolve_str(children[0]).unwrap().unwrap();
            let token = walk.tokens.get(token);
            assert_eq!(token.kind(), TokenKind::EncryptedKey);
            assert_eq!(token.as_secret_source().unwrap().known_secret(), Some(&[9u8; 16][..]));
            assert!(walk.wss11_seen);
        });

        let empty = SimpleSecurityTokenResolver::new();
        with_walk(&xml, None, None, Some(&empty), |walk, children| {
            assert_eq!(walk.resolve_str(children[0]).unwrap(), None);
        });
    }

    #[test]
    fn test_sender_certificate_by_ski() {
        let xml = envelope(&format!(
            "<wsse:SecurityTokenReference><ds:X509Data><ds:X509SKI>{}</ds:X509SKI></ds:X509Data></wsse:SecurityTokenReference>",
            fixtures::CERT_SKI_B64
        ));
        let sender = fixtures::certificate();
        with_walk(&xml, Some(&sender), None, None, |walk, children| {
            let token = walk.resolve_str(children[0]).unwrap().unwrap();
            assert_eq!(x509_source(walk, token), X509Source::Sender);
            assert!(matches!(walk.str_target(token), Some(StrTarget::Synthesized(xml)) if xml.contains("BinarySecurityToken")));
        });
    }

    #[test]
    fn test_issuer_serial_from_resolver() {
        let xml = envelope(&format!(
            "<wsse:SecurityTokenReference><ds:X509Data><ds:X509IssuerSerial><ds:X509IssuerName>{}</ds:X509IssuerName><ds:X509SerialNumber>{}</ds:X509SerialNumber></ds:X509IssuerSerial></ds:X509Data></wsse:SecurityTokenReference>",
            fixtures::CERT_ISSUER_DN,
            fixtures::CERT_SERIAL
        ));
        let resolver = fixture_resolver();
        with_walk(&xml, None, None, Some(&resolver), |walk, children| {
            let token = walk.resolve_str(children[0]).unwrap().unwrap();
            assert_eq!(x509_source(walk, token), X509Source::IssuerSerial);
        });
    }

    #[test]
    fn test_unsupported_key_identifier_is_unresolved() {
        let xml = envelope(&str_key_identifier("urn:example:custom", "AAAA"));
        with_walk(&xml, None, None, None, |walk, children| {
            assert_eq!(walk.resolve_str(children[0]).unwrap(), None);
            assert!(walk.str_cache.is_empty());
        });
    }

    #[test]
    fn test_context_identifier_reference() {
        let finder = InMemorySecurityContextFinder::new();
        finder.insert(
            SecurityContextKind::SecureConversation,
            "urn:uuid:ctx-1",
            SecurityContext::new(vec![3; 32]),
        );
        let known = envelope(r#"<wsse:SecurityTokenReference><wsse:Reference URI="urn:uuid:ctx-1"/></wsse:SecurityTokenReference>"#);
        with_walk(&known, None, Some(&finder), None, |walk, children| {
            let token = walk.resolve_str(children[0]).unwrap().unwrap();
            assert_eq!(walk.tokens.get(token).kind(), TokenKind::SecurityContext);
            assert!(walk.tokens.get(token).is_synthesized());
        });

        let unknown = known.replace("ctx-1", "ctx-2");
        with_walk(&unknown, None, Some(&finder), None, |walk, children| {
            let err = walk.resolve_str(children[0]).unwrap_err();
            assert!(matches!(err, Error::BadSecurityContext { .. }), "{err:?}");
        });
    }

    #[test]
    fn test_kerberos_key_identifier_finds_ticket() {
        let sha1 = kerberos_sha1();
        let xml = envelope(&format!(
            "{}{}",
            kerberos_bst("KRB-1"),
            str_key_identifier(ns::value_type::KERBEROS_AP_REQ_SHA1, &sha1)
        ));
        let resolver = SimpleSecurityTokenResolver::new().with_kerberos_session_key(&sha1, vec![3; 16]);
        with_walk(&xml, None, None, Some(&resolver), |walk, children| {
            walk.collect_tokens().unwrap();
            let ticket = walk.tokens.kerberos_by_sha1(&sha1).unwrap();
            assert_eq!(walk.tokens.get(ticket).element(), Some(children[0]));
            assert_eq!(walk.tokens.get(ticket).kind(), TokenKind::Kerberos);

            assert_eq!(walk.resolve_str(children[1]).unwrap(), Some(ticket));
            assert_eq!(walk.token_secret(ticket).unwrap(), vec![3; 16]);
        });
    }

    #[test]
    fn test_kerberos_session_key_from_context_finder() {
        let sha1 = kerberos_sha1();
        let xml = envelope(&kerberos_bst("KRB-1"));
        let finder = InMemorySecurityContextFinder::new();
        finder.insert(SecurityContextKind::Kerberos, &sha1, SecurityContext::new(vec![4; 16]));
        with_walk(&xml, None, Some(&finder), None, |walk, _| {
            walk.collect_tokens().unwrap();
            let ticket = walk.tokens.kerberos_by_sha1(&sha1).unwrap();
            assert_eq!(walk.token_secret(ticket).unwrap(), vec![4; 16]);
        });
    }

    #[test]
    fn test_kerberos_without_session_key() {
        let sha1 = kerberos_sha1();
        let xml = envelope(&format!(
            "{}{}",
            kerberos_bst("KRB-1"),
            str_key_identifier(ns::value_type::KERBEROS_AP_REQ_SHA1, &sha1)
        ));
        let resolver = SimpleSecurityTokenResolver::new();
        let finder = InMemorySecurityContextFinder::new();
        with_walk(&xml, None, Some(&finder), Some(&resolver), |walk, children| {
            walk.collect_tokens().unwrap();
            let ticket = walk.resolve_str(children[1]).unwrap().unwrap();
            let err = walk.token_secret(ticket).unwrap_err();
            assert!(matches!(&err, Error::Key(m) if m.contains(&sha1)), "{err:?}");
        });
    }

    #[test]
    fn test_kerberos_key_identifier_without_ticket() {
        let sha1 = kerberos_sha1();
        let xml = envelope(&str_key_identifier(ns::value_type::KERBEROS_AP_REQ_SHA1, &sha1));
        with_walk(&xml, None, None, None, |walk, children| {
            assert_eq!(walk.resolve_str(children[0]).unwrap(), None);
        });

        let resolver = SimpleSecurityTokenResolver::new().with_kerberos_session_key(&sha1, vec![5; 16]);
        with_walk(&xml, None, None, Some(&resolver), |walk, children| {
            let ticket = walk.resolve_str(children[0]).unwrap().unwrap();
            assert!(walk.tokens.get(ticket).is_synthesized());
            assert_eq!(walk.token_secret(ticket).unwrap(), vec![5; 16]);
        });
    }
}
