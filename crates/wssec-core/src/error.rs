#![forbid(unsafe_code)]

/// Errors produced while undecorating a WS-Security message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Generic processing failure, including wrapped engine failures.
    #[error("processing error: {0}")]
    Processor(String),

    /// The input message itself is invalid or violates policy.
    #[error("message validation failed: {0}")]
    Validation(String),

    #[error("bad security context {identifier}: {message}")]
    BadSecurityContext {
        identifier: String,
        fault_code: String,
        message: String,
    },

    /// An EncryptedKey addressed to this recipient names a key we do not hold.
    #[error("unexpected KeyInfo: {0}")]
    UnexpectedKeyInfo(String),

    #[error("invalid document format: {0}")]
    InvalidDocumentFormat(String),

    #[error("signature is not valid: {0}")]
    InvalidSignature(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error says the message is bad, rather than that
    /// processing broke.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::InvalidSignature(_)
                | Error::BadSecurityContext { .. }
                | Error::UnexpectedKeyInfo(_)
                | Error::InvalidDocumentFormat(_)
        )
    }

    /// The SOAP fault code a caller should surface, if the error carries one.
    pub fn fault_code(&self) -> Option<&str> {
        match self {
            Error::BadSecurityContext { fault_code, .. } => Some(fault_code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
