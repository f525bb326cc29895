#![forbid(unsafe_code)]

//! Processor configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use wssec_core::{ns, Error, Result};
use wssec_xml::{IdAttribute, IdAttributeConfig};

/// Tunables for [`crate::WssProcessor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Largest attachment a signature may cover, in bytes.
    pub signed_attachment_max_size: u64,

    /// Reject SOAP headers addressed to us with `mustUnderstand` that we do
    /// not process.
    pub reject_on_must_understand: bool,

    /// Allow more than one signature to cover the Timestamp.
    pub permit_multiple_timestamp_signatures: bool,

    /// Accept a Security header with more than one Timestamp. Only the
    /// first is reported.
    pub permit_multiple_timestamps: bool,

    /// Skip BinarySecurityTokens with an unrecognized ValueType instead of
    /// failing.
    pub permit_unknown_binary_security_tokens: bool,

    pub strict_signature_confirmation_validation: bool,

    /// Tolerate an invalid signature when an EncryptedKey addressed to
    /// someone else was skipped earlier in the same header. Tolerated
    /// signatures are listed in `ProcessorResult::ignored_signatures`.
    pub ignore_signature_failure_when_encryption_ignored: bool,

    /// Treat the exchange as WS-Security 1.1 even if the message does not
    /// say so.
    pub wss11_configured: bool,

    /// Security header actors/roles that address this node.
    pub recipient_actors: Vec<String>,

    /// Attributes recognized as element identifiers.
    pub id_attributes: Vec<IdAttribute>,

    /// Capacity of the shared signature-verify cache; 0 disables it.
    pub signature_verify_cache_size: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            signed_attachment_max_size: 5 * 1024 * 1024,
            reject_on_must_understand: true,
            permit_multiple_timestamp_signatures: false,
            permit_multiple_timestamps: false,
            permit_unknown_binary_security_tokens: false,
            strict_signature_confirmation_validation: true,
            ignore_signature_failure_when_encryption_ignored: false,
            wss11_configured: false,
            recipient_actors: vec![ns::L7_ACTOR.to_owned(), ns::L7_ACTOR_URI.to_owned()],
            id_attributes: IdAttributeConfig::wss_default().attributes,
            signature_verify_cache_size: 1000,
        }
    }
}

impl ProcessorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn id_attribute_config(&self) -> IdAttributeConfig {
        IdAttributeConfig::new(self.id_attributes.clone())
    }

    /// True if `actor` names this node.
    pub fn is_recipient_actor(&self, actor: &str) -> bool {
        self.recipient_actors.iter().any(|a| a == actor)
    }
}
