#![forbid(unsafe_code)]

//! WS-Security undecoration for SOAP messages.
//!
//! The processor lives in [`processor`]; the other crates are re-exported
//! for callers that need the XML, crypto or key layers directly.

pub use wssec_c14n as c14n;
pub use wssec_core as core;
pub use wssec_crypto as crypto;
pub use wssec_dsig as dsig;
pub use wssec_enc as enc;
pub use wssec_keys as keys;
pub use wssec_processor as processor;
pub use wssec_xml as xml;

pub use wssec_core::{Error, Result};
pub use wssec_processor::{
    Message, ProcessorConfig, ProcessorResult, SecurityContextFinder, SecurityTokenResolver,
    SimpleSecurityTokenResolver, SoapMessage, WssProcessor,
};

pub mod report;
