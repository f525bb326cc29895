#![forbid(unsafe_code)]

//! WS-Security undecoration for inbound SOAP messages.
//!
//! [`WssProcessor::undecorate_message`] selects the Security header
//! addressed to this node, resolves the security tokens it carries,
//! decrypts what was encrypted for us, verifies signatures and reports
//! what was proven in a [`ProcessorResult`]. Certificates, private keys and
//! security contexts come from a [`SecurityTokenResolver`] and a
//! [`SecurityContextFinder`] supplied by the caller.

pub mod config;
pub mod confirmation;
pub mod header;
pub mod message;
pub mod processor;
pub mod resolver;
pub mod result;
pub mod timestamp;
pub mod token;

mod decryption;
mod keymaterial;
mod signature;
mod strref;

#[cfg(test)]
mod testutil;

pub use config::ProcessorConfig;
pub use confirmation::SignatureConfirmation;
pub use decryption::DecryptionErrorHandler;
pub use header::SecurityActor;
pub use message::{Message, SoapMessage};
pub use processor::{WssProcessor, BAD_CONTEXT_TOKEN_FAULT};
pub use resolver::{
    InMemorySecurityContextFinder, SecurityContext, SecurityContextFinder, SecurityContextKind,
    SecurityTokenResolver, SimpleSecurityTokenResolver,
};
pub use result::{
    EncryptedElement, IgnoredSignature, ProcessorResult, SignedElement, SignedPart,
    ValidatedSignatureValue,
};
pub use timestamp::{Timestamp, TimestampDate};
pub use token::{SecurityToken, TokenKind, TokenRef, TokenStore};
