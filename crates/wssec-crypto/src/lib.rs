#![forbid(unsafe_code)]

//! Cryptographic primitives for the `wssec` processor.
//!
//! The processor never calls these modules directly: it goes through the
//! [`CryptoEngine`] trait so that the primitives can be swapped or
//! instrumented. [`SoftwareEngine`] is the RustCrypto-backed default.

pub mod cache;
pub mod cipher;
pub mod digest;
pub mod engine;
pub mod kdf;
pub mod keytransport;
pub mod sign;

pub use cache::SignatureVerifyCache;
pub use engine::{CryptoEngine, SoftwareEngine};
pub use keytransport::OaepParams;
pub use sign::SignatureKey;
