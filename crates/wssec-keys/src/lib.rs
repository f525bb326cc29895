#![forbid(unsafe_code)]

//! Certificate handling for the `wssec` processor.
//!
//! Provides the X.509 model used by X509 security tokens, PKIPath and
//! PKCS#7 bundle parsing for BinarySecurityTokens, and PEM loading.

pub mod bundle;
pub mod loader;
pub mod x509;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use x509::{
    ExtensionKeyUsageChecker, KeyUsageActivity, KeyUsageChecker, PermitAllKeyUsage,
    X509Certificate,
};
