#![forbid(unsafe_code)]

//! Loading inputs for the command-line tool and rendering what the
//! processor found.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use wssec_core::{ns, Error, Result};
use wssec_keys::loader;
use wssec_processor::header;
use wssec_processor::{ProcessorConfig, ProcessorResult, SimpleSecurityTokenResolver};
use wssec_xml::{Document, NodeId};

/// A resolver over the certificates in `cert_paths`. The private key in
/// `key_path`, if any, belongs to the first certificate.
pub fn build_resolver(cert_paths: &[PathBuf], key_path: Option<&Path>) -> Result<SimpleSecurityTokenResolver> {
    let mut private_key = key_path.map(loader::load_rsa_private_file).transpose()?;
    if private_key.is_some() && cert_paths.is_empty() {
        return Err(Error::Config("--key needs the matching --cert".into()));
    }

    let mut resolver = SimpleSecurityTokenResolver::new();
    for path in cert_paths {
        for certificate in loader::load_certificates_file(path)? {
            tracing::debug!(path = %path.display(), subject = %certificate.subject_dn(), "loaded certificate");
            resolver = resolver.with_certificate(certificate, private_key.take());
        }
    }
    Ok(resolver)
}

pub fn load_config(path: Option<&Path>) -> Result<ProcessorConfig> {
    match path {
        Some(p) => ProcessorConfig::from_file(p),
        None => Ok(ProcessorConfig::default()),
    }
}

fn element_label(doc: &Document, node: NodeId) -> String {
    let name = doc
        .element(node)
        .map(|e| e.name.qualified())
        .unwrap_or_else(|| "?".to_owned());
    match element_id(doc, node) {
        Some(id) => format!("{name} [{id}]"),
        None => name,
    }
}

fn element_id(doc: &Document, node: NodeId) -> Option<&str> {
    doc.attribute_in(node, ns::UTILITY_NAMESPACES, ns::attr::ID)
        .or_else(|| doc.attribute(node, ns::attr::ID))
        .or_else(|| doc.attribute(node, ns::attr::ASSERTION_ID))
}

/// One line per child of the Security header addressed to us.
pub fn inspect(doc: &Document, config: &ProcessorConfig) -> Vec<String> {
    let Some((security, actor)) = header::find_security_header(doc, config) else {
        return vec!["no Security header for this recipient".to_owned()];
    };
    let mut lines = vec![format!("Security header ({actor:?})")];
    lines.extend(doc.child_elements(security).map(|c| format!("  {}", element_label(doc, c))));
    lines
}

/// A human-readable account of `result` over the processed document.
pub fn summary(result: &ProcessorResult, doc: &Document) -> String {
    let mut out = String::new();
    if result.processed_actor().is_none() {
        out.push_str("no Security header processed\n");
        return out;
    }

    let _ = writeln!(out, "tokens:");
    for (token_ref, token) in result.tokens().iter() {
        let proven = token
            .as_signing()
            .is_some_and(|s| s.is_possession_proven());
        let _ = writeln!(
            out,
            "  #{} {:?}{}{}{}",
            token_ref.index(),
            token.kind(),
            token.id().map(|id| format!(" [{id}]")).unwrap_or_default(),
            if token.is_synthesized() { " (synthesized)" } else { "" },
            if proven { " possession proven" } else { "" },
        );
    }

    let _ = writeln!(out, "signed:");
    for signed in result.elements_that_were_signed() {
        let _ = writeln!(
            out,
            "  {} by #{}",
            element_label(doc, signed.element),
            signed.token.index()
        );
    }
    for part in result.parts_that_were_signed() {
        let _ = writeln!(out, "  cid:{} by #{}", part.content_id, part.token.index());
    }

    let _ = writeln!(out, "encrypted:");
    for encrypted in result.elements_that_were_encrypted() {
        let _ = writeln!(
            out,
            "  {} ({})",
            element_label(doc, encrypted.element),
            encrypted.algorithm
        );
    }

    if let Some(timestamp) = result.timestamp() {
        let raw = |d: &Option<wssec_processor::TimestampDate>| {
            d.as_ref().map(|d| d.raw.clone()).unwrap_or_else(|| "-".to_owned())
        };
        let _ = writeln!(
            out,
            "timestamp: created {} expires {}{}",
            raw(&timestamp.created),
            raw(&timestamp.expires),
            if timestamp.signed { " (signed)" } else { "" }
        );
    }
    for ignored in result.ignored_signatures() {
        let _ = writeln!(out, "ignored signature: {}", ignored.diagnostic);
    }
    for error in result.signature_confirmation().errors() {
        let _ = writeln!(out, "confirmation error: {error}");
    }
    out
}
