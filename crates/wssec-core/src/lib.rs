#![forbid(unsafe_code)]

//! Core types shared by every `wssec` crate: the error enum plus the
//! namespace and algorithm URI constants used to match WS-Security,
//! XML-Signature and XML-Encryption elements.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};
