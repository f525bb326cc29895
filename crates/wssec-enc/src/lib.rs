#![forbid(unsafe_code)]

//! XML Encryption support for the `wssec` processor.
//!
//! Parses `<xenc:EncryptedKey>` and `<xenc:EncryptedData>`, unwraps
//! content keys and decrypts EncryptedData back into the live document.
//! Encryption helpers exist for building test messages.

pub mod decrypt;
pub mod encrypt;
pub mod encrypted;

pub use decrypt::{decrypt_in_place, is_only_content, unwrap_key, Decrypted};
pub use encrypt::{encrypt_in_place, encrypted_key_xml, wrap_key};
pub use encrypted::{
    encrypted_key_sha1, parse_reference_list, EncryptedDataInfo, EncryptedKeyInfo, EncryptionType,
};
