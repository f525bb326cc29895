#![forbid(unsafe_code)]

//! Keys for verification and decryption.

use wssec_core::{ns, Error, Result};
use wssec_crypto::SignatureKey;
use wssec_keys::{KeyUsageActivity, X509Certificate};
use wssec_xml::NodeId;

use crate::processor::{security_child, Walk};
use crate::resolver::SecurityContextKind;
use crate::token::{SecurityToken, TokenRef};

impl Walk<'_> {
    /// Validity period, then key usage for `activity`.
    pub(crate) fn check_certificate(&self, cert: &X509Certificate, activity: KeyUsageActivity) -> Result<()> {
        cert.check_validity()?;
        self.key_usage.check(cert, activity)
    }

    /// The private key an EncryptedKey was wrapped for.
    ///
    /// Every way of not finding it is reported as
    /// [`Error::UnexpectedKeyInfo`], which the caller may tolerate when the
    /// header has no explicit actor.
    pub(crate) fn recipient_private_key(&mut self, key_info: Option<NodeId>) -> Result<rsa::RsaPrivateKey> {
        let key_info =
            key_info.ok_or_else(|| Error::UnexpectedKeyInfo("EncryptedKey has no KeyInfo".into()))?;
        let certificate = self.key_info_certificate(key_info)?.ok_or_else(|| {
            Error::UnexpectedKeyInfo("EncryptedKey KeyInfo does not name a known certificate".into())
        })?;
        let private_key = self
            .resolver
            .and_then(|r| r.private_key_for(&certificate))
            .ok_or_else(|| {
                Error::UnexpectedKeyInfo(format!(
                    "no private key for EncryptedKey recipient {}",
                    certificate.subject_dn()
                ))
            })?;
        self.check_certificate(&certificate, KeyUsageActivity::DecryptXml)?;
        Ok(private_key)
    }

    fn key_info_certificate(&mut self, key_info: NodeId) -> Result<Option<X509Certificate>> {
        let doc = self.message.document();
        let str_element = security_child(doc, key_info, ns::node::SECURITY_TOKEN_REFERENCE);
        let x509_data = doc.find_child(key_info, ns::DSIG, ns::node::X509_DATA);

        let token = match (str_element, x509_data) {
            (Some(str_element), _) => self.resolve_str(str_element)?,
            (None, Some(x509_data)) => self.resolve_x509_data(x509_data)?,
            (None, None) => None,
        };
        Ok(token.and_then(|t| self.tokens.get(t).certificate().cloned()))
    }

    /// The symmetric secret behind `token`.
    ///
    /// EncryptedKeys are unwrapped on first use only; a freshly unwrapped
    /// secret is published to the resolver's EncryptedKeySHA1 cache.
    pub(crate) fn token_secret(&self, token: TokenRef) -> Result<Vec<u8>> {
        match self.tokens.get(token) {
            SecurityToken::EncryptedKey(ek) => {
                let fresh = !ek.is_unwrapped();
                let secret = ek
                    .secret(|info, key| wssec_enc::unwrap_key(self.engine, info, key))?
                    .to_vec();
                if fresh {
                    tracing::debug!(encrypted_key_sha1 = %ek.encrypted_key_sha1, "EncryptedKey unwrapped");
                    if let Some(resolver) = self.resolver {
                        resolver.put_secret_for_encrypted_key_sha1(&ek.encrypted_key_sha1, &secret);
                    }
                }
                Ok(secret)
            }
            SecurityToken::SecurityContext(sct) => Ok(sct.context.shared_secret.clone()),
            SecurityToken::Kerberos(kerberos) => kerberos
                .session_key
                .get_or_try_init(|| {
                    self.kerberos_session_key(&kerberos.ap_req_sha1).ok_or_else(|| {
                        Error::Key(format!(
                            "no session key for Kerberos ticket {}",
                            kerberos.ap_req_sha1
                        ))
                    })
                })
                .map(<[u8]>::to_vec),
            SecurityToken::DerivedKey(dkt) => dkt
                .key(|p| {
                    let secret = self.token_secret(dkt.source)?;
                    self.engine
                        .derive_key(p.algorithm.as_deref(), &secret, &p.label, &p.nonce, p.offset, p.length)
                })
                .map(<[u8]>::to_vec),
            other => Err(Error::Key(format!("{:?} token carries no secret key", other.kind()))),
        }
    }

    pub(crate) fn kerberos_session_key(&self, ap_req_sha1: &str) -> Option<Vec<u8>> {
        self.resolver
            .and_then(|r| r.kerberos_session_key(ap_req_sha1))
            .or_else(|| {
                self.finder?
                    .security_context(SecurityContextKind::Kerberos, ap_req_sha1)
                    .map(|c| c.shared_secret)
            })
    }

    /// The key a signature made with `token` verifies under.
    pub(crate) fn verification_key(&self, token: TokenRef) -> Result<SignatureKey> {
        match self.tokens.get(token).certificate() {
            Some(cert) => {
                self.check_certificate(cert, KeyUsageActivity::VerifyXml)?;
                cert.public_key()
            }
            None => Ok(SignatureKey::Hmac(self.token_secret(token)?)),
        }
    }

    /// The token credited with a signature: a derived key's source.
    pub(crate) fn credited_token(&self, mut token: TokenRef) -> TokenRef {
        while let SecurityToken::DerivedKey(dkt) = self.tokens.get(token) {
            token = dkt.source;
        }
        token
    }
}
