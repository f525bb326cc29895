#![forbid(unsafe_code)]

//! Namespace URIs, value types and element names for WS-Security messages.
//!
//! Matching is exact: an element is only recognized when both its local
//! name and its namespace URI appear here.

// ── SOAP ─────────────────────────────────────────────────────────────

/// SOAP 1.1 envelope namespace
pub const SOAP_1_1: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// SOAP 1.2 envelope namespace
pub const SOAP_1_2: &str = "http://www.w3.org/2003/05/soap-envelope";

pub const SOAP_1_1_ACTOR_NEXT: &str = "http://schemas.xmlsoap.org/soap/actor/next";
pub const SOAP_1_2_ROLE_NEXT: &str = "http://www.w3.org/2003/05/soap-envelope/role/next";

// ── WS-Security ──────────────────────────────────────────────────────

/// WSS 1.0 (OASIS 2004) secext namespace
pub const WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// WSS 1.1 secext namespace
pub const WSSE11: &str = "http://docs.oasis-open.org/wss/oasis-wss-wssecurity-secext-1.1.xsd";

/// Pre-OASIS secext namespaces still seen in the wild.
pub const WSSE_2002_12: &str = "http://schemas.xmlsoap.org/ws/2002/12/secext";
pub const WSSE_2002_07: &str = "http://schemas.xmlsoap.org/ws/2002/07/secext";
pub const WSSE_2002_04: &str = "http://schemas.xmlsoap.org/ws/2002/04/secext";

/// WSS 1.0 (OASIS 2004) utility namespace
pub const WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

/// Pre-OASIS utility namespace
pub const WSU_2002_07: &str = "http://schemas.xmlsoap.org/ws/2002/07/utility";
pub const WSU_2003_06: &str = "http://schemas.xmlsoap.org/ws/2003/06/utility";

/// Every secext namespace we accept for Security header children.
pub const SECURITY_NAMESPACES: &[&str] = &[WSSE, WSSE_2002_12, WSSE_2002_07, WSSE_2002_04];

/// Every utility namespace we accept for `Id`/`Timestamp`.
pub const UTILITY_NAMESPACES: &[&str] = &[WSU, WSU_2003_06, WSU_2002_07];

// ── WS-SecureConversation ────────────────────────────────────────────

pub const WSSC_2004_04: &str = "http://schemas.xmlsoap.org/ws/2004/04/sc";
pub const WSSC_2005_02: &str = "http://schemas.xmlsoap.org/ws/2005/02/sc";
pub const WSSC_1_3: &str = "http://docs.oasis-open.org/ws-sx/ws-secureconversation/200512";

pub const SECURE_CONVERSATION_NAMESPACES: &[&str] = &[WSSC_2005_02, WSSC_1_3, WSSC_2004_04];

// ── SAML ─────────────────────────────────────────────────────────────

pub const SAML_1: &str = "urn:oasis:names:tc:SAML:1.0:assertion";
pub const SAML_2: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

// ── XML-DSig / XML-Enc ───────────────────────────────────────────────

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Encryption namespace
pub const ENC: &str = "http://www.w3.org/2001/04/xmlenc#";

/// Exclusive C14N namespace
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";

// ── Actors ───────────────────────────────────────────────────────────

/// Actor/role values that address a SOAP header to this gateway.
pub const L7_ACTOR: &str = "secure_span";
pub const L7_ACTOR_URI: &str = "http://www.layer7tech.com/ws/policy";
pub const L7_HEADER_ACTOR: &str = "SecureSpan";

// ── Value and encoding types ─────────────────────────────────────────

pub mod value_type {
    const X509_PROFILE: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0";

    pub const X509V3: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
    pub const X509_PKI_PATH: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509PKIPathv1";
    pub const PKCS7: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#PKCS7";
    pub const X509_SKI: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509SubjectKeyIdentifier";
    pub const THUMBPRINT_SHA1: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-soap-message-security-1.1#ThumbprintSHA1";
    pub const ENCRYPTED_KEY_SHA1: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-soap-message-security-1.1#EncryptedKeySHA1";
    pub const ENCRYPTED_KEY: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-soap-message-security-1.1#EncryptedKey";
    pub const KERBEROS_GSS_AP_REQ: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-kerberos-token-profile-1.1#GSS_Kerberosv5_AP_REQ";
    pub const KERBEROS_GSS_AP_REQ_1510: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-kerberos-token-profile-1.1#GSS_Kerberosv5_AP_REQ1510";
    pub const KERBEROS_AP_REQ_SHA1: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-kerberos-token-profile-1.1#Kerberosv5APREQSHA1";
    pub const SAML_ASSERTION_ID: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.0#SAMLAssertionID";
    pub const SAML_ID: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLID";

    /// Some senders emit the X.509 value types with a bare fragment and no
    /// profile prefix. Returns true if `value` names `full` either way.
    pub fn matches(value: &str, full: &str) -> bool {
        if value == full {
            return true;
        }
        match full.split_once('#') {
            Some((prefix, frag)) if prefix == X509_PROFILE => value == frag,
            _ => false,
        }
    }
}

pub mod encoding_type {
    pub const BASE64_BINARY: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
}

pub mod password_type {
    pub const TEXT: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";
    pub const DIGEST: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
}

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // SOAP
    pub const ENVELOPE: &str = "Envelope";
    pub const HEADER: &str = "Header";
    pub const BODY: &str = "Body";

    // WS-Security
    pub const SECURITY: &str = "Security";
    pub const BINARY_SECURITY_TOKEN: &str = "BinarySecurityToken";
    pub const SECURITY_TOKEN_REFERENCE: &str = "SecurityTokenReference";
    pub const KEY_IDENTIFIER: &str = "KeyIdentifier";
    pub const REFERENCE: &str = "Reference";
    pub const USERNAME_TOKEN: &str = "UsernameToken";
    pub const USERNAME: &str = "Username";
    pub const PASSWORD: &str = "Password";
    pub const NONCE: &str = "Nonce";
    pub const CREATED: &str = "Created";
    pub const EXPIRES: &str = "Expires";
    pub const TIMESTAMP: &str = "Timestamp";
    pub const SIGNATURE_CONFIRMATION: &str = "SignatureConfirmation";
    pub const ENCRYPTED_HEADER: &str = "EncryptedHeader";

    // WS-SecureConversation
    pub const SECURITY_CONTEXT_TOKEN: &str = "SecurityContextToken";
    pub const DERIVED_KEY_TOKEN: &str = "DerivedKeyToken";
    pub const IDENTIFIER: &str = "Identifier";
    pub const GENERATION: &str = "Generation";
    pub const OFFSET: &str = "Offset";
    pub const LENGTH: &str = "Length";
    pub const LABEL: &str = "Label";

    // SAML
    pub const ASSERTION: &str = "Assertion";
    pub const SUBJECT_CONFIRMATION: &str = "SubjectConfirmation";

    // DSig
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const TRANSFORMATION_PARAMETERS: &str = "TransformationParameters";
    pub const KEY_INFO: &str = "KeyInfo";
    pub const KEY_NAME: &str = "KeyName";
    pub const X509_DATA: &str = "X509Data";
    pub const X509_CERTIFICATE: &str = "X509Certificate";
    pub const X509_ISSUER_SERIAL: &str = "X509IssuerSerial";
    pub const X509_ISSUER_NAME: &str = "X509IssuerName";
    pub const X509_SERIAL_NUMBER: &str = "X509SerialNumber";
    pub const X509_SKI: &str = "X509SKI";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";
    pub const HMAC_OUTPUT_LENGTH: &str = "HMACOutputLength";

    // XML-Enc
    pub const ENCRYPTED_DATA: &str = "EncryptedData";
    pub const ENCRYPTED_KEY: &str = "EncryptedKey";
    pub const ENCRYPTION_METHOD: &str = "EncryptionMethod";
    pub const CIPHER_DATA: &str = "CipherData";
    pub const CIPHER_VALUE: &str = "CipherValue";
    pub const CIPHER_REFERENCE: &str = "CipherReference";
    pub const REFERENCE_LIST: &str = "ReferenceList";
    pub const DATA_REFERENCE: &str = "DataReference";
    pub const KEY_REFERENCE: &str = "KeyReference";
    pub const OAEP_PARAMS: &str = "OAEPparams";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const ASSERTION_ID: &str = "AssertionID";
    pub const SAML2_ID: &str = "ID";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const ALGORITHM: &str = "Algorithm";
    pub const VALUE_TYPE: &str = "ValueType";
    pub const ENCODING_TYPE: &str = "EncodingType";
    pub const VALUE: &str = "Value";
    pub const ACTOR: &str = "actor";
    pub const ROLE: &str = "role";
    pub const MUST_UNDERSTAND: &str = "mustUnderstand";
    pub const PREFIX_LIST: &str = "PrefixList";
    pub const MIME_TYPE: &str = "MimeType";
    pub const NONCE: &str = "Nonce";
    pub const LABEL: &str = "Label";
    pub const LENGTH: &str = "Length";
    pub const OFFSET: &str = "Offset";
    pub const GENERATION: &str = "Generation";
    pub const RECIPIENT: &str = "Recipient";
    /// `wsse11:TokenType` on a SecurityTokenReference.
    pub const TOKEN_TYPE: &str = "TokenType";
}

/// True if `uri` is one of the accepted secext namespaces.
pub fn is_security_ns(uri: &str) -> bool {
    SECURITY_NAMESPACES.contains(&uri)
}

/// True if `uri` is one of the accepted utility namespaces.
pub fn is_utility_ns(uri: &str) -> bool {
    UTILITY_NAMESPACES.contains(&uri)
}

/// True if `uri` is one of the accepted WS-SecureConversation namespaces.
pub fn is_secure_conversation_ns(uri: &str) -> bool {
    SECURE_CONVERSATION_NAMESPACES.contains(&uri)
}

pub fn is_soap_ns(uri: &str) -> bool {
    uri == SOAP_1_1 || uri == SOAP_1_2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_fragment_match() {
        assert!(value_type::matches("X509v3", value_type::X509V3));
        assert!(value_type::matches(value_type::X509V3, value_type::X509V3));
        assert!(!value_type::matches("ThumbprintSHA1", value_type::THUMBPRINT_SHA1));
    }

    #[test]
    fn test_namespace_families() {
        assert!(is_security_ns(WSSE));
        assert!(is_security_ns(WSSE_2002_12));
        assert!(!is_security_ns(WSSE11));
        assert!(is_utility_ns(WSU));
        assert!(is_secure_conversation_ns(WSSC_1_3));
        assert!(is_soap_ns(SOAP_1_2));
    }
}
