#![forbid(unsafe_code)]

//! SOAP envelope navigation: picking the Security header addressed to
//! this node and enforcing `mustUnderstand` on the other header blocks.

use wssec_core::{ns, Error, Result};
use wssec_xml::{Document, NodeId};

use crate::config::ProcessorConfig;

/// Who the processed Security header was addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityActor {
    /// One of the configured recipient actors.
    Recipient(String),
    /// No actor/role attribute.
    NoActor,
}

impl SecurityActor {
    pub fn is_explicit(&self) -> bool {
        matches!(self, SecurityActor::Recipient(_))
    }
}

/// The SOAP envelope namespace of `doc`, if its root is an Envelope.
pub fn soap_namespace(doc: &Document) -> Option<&str> {
    let root = doc.root_element()?;
    let uri = doc.namespace_uri(root)?;
    (ns::is_soap_ns(uri) && doc.local_name(root) == Some(ns::node::ENVELOPE)).then_some(uri)
}

/// The SOAP Header element.
pub fn header_element(doc: &Document) -> Option<NodeId> {
    let soap = soap_namespace(doc)?;
    doc.find_child(doc.root_element()?, soap, ns::node::HEADER)
}

/// The SOAP Body element.
pub fn body_element(doc: &Document) -> Option<NodeId> {
    let soap = soap_namespace(doc)?;
    doc.find_child(doc.root_element()?, soap, ns::node::BODY)
}

/// The `actor` (SOAP 1.1) or `role` (SOAP 1.2) of a header block.
///
/// SOAP 1.1 senders sometimes leave `actor` unqualified; that form is
/// accepted too.
pub fn actor_of(doc: &Document, block: NodeId) -> Option<&str> {
    match soap_namespace(doc) {
        Some(ns::SOAP_1_2) => doc.attribute_ns(block, ns::SOAP_1_2, ns::attr::ROLE),
        Some(soap) => doc
            .attribute_ns(block, soap, ns::attr::ACTOR)
            .or_else(|| doc.attribute(block, ns::attr::ACTOR)),
        None => None,
    }
}

/// True when `mustUnderstand` is present and not `0`/`false`.
pub fn must_understand(doc: &Document, block: NodeId) -> bool {
    let Some(soap) = soap_namespace(doc) else {
        return false;
    };
    match doc.attribute_ns(block, soap, ns::attr::MUST_UNDERSTAND) {
        Some(v) => {
            let v = v.trim();
            !(v == "0" || v.eq_ignore_ascii_case("false"))
        }
        None => false,
    }
}

/// Select the Security header for this node: the first one in document
/// order addressed to a recipient actor, otherwise the first one without
/// an actor.
pub fn find_security_header(doc: &Document, config: &ProcessorConfig) -> Option<(NodeId, SecurityActor)> {
    let header = header_element(doc)?;
    let candidates: Vec<NodeId> = doc
        .child_elements(header)
        .filter(|c| {
            doc.local_name(*c) == Some(ns::node::SECURITY)
                && doc.namespace_uri(*c).is_some_and(ns::is_security_ns)
        })
        .collect();

    let addressed = candidates.iter().find_map(|c| {
        actor_of(doc, *c)
            .filter(|actor| config.is_recipient_actor(actor))
            .map(|actor| (*c, SecurityActor::Recipient(actor.to_owned())))
    });
    if addressed.is_some() {
        return addressed;
    }
    candidates
        .into_iter()
        .find(|c| actor_of(doc, *c).is_none())
        .map(|c| (c, SecurityActor::NoActor))
}

/// Fail if a header block addressed to us (`SecureSpan` or the "next"
/// actor/role) demands to be understood and is not one we process.
pub fn reject_if_headers_not_understood(doc: &Document) -> Result<()> {
    let Some(header) = header_element(doc) else {
        return Ok(());
    };
    for block in doc.child_elements(header) {
        let name = doc.local_name(block).unwrap_or_default();
        let in_security_ns = doc.namespace_uri(block).is_some_and(ns::is_security_ns);
        if (name == ns::node::SECURITY && in_security_ns) || name == ns::node::TIMESTAMP {
            continue;
        }
        if !must_understand(doc, block) {
            continue;
        }
        let addressed = matches!(
            actor_of(doc, block),
            Some(ns::L7_HEADER_ACTOR) | Some(ns::SOAP_1_1_ACTOR_NEXT) | Some(ns::SOAP_1_2_ROLE_NEXT)
        );
        if addressed {
            let qname = doc
                .element(block)
                .map(|e| e.name.qualified())
                .unwrap_or_default();
            return Err(Error::InvalidDocumentFormat(format!(
                "Header addressed to us with mustUnderstand: {qname}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(headers: &str) -> Document {
        Document::parse(&format!(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" xmlns:wsse="{}"><s:Header>{headers}</s:Header><s:Body/></s:Envelope>"#,
            ns::WSSE
        ))
        .unwrap()
    }

    #[test]
    fn test_prefers_recipient_actor() {
        let doc = envelope(
            r#"<wsse:Security Id="plain"/><wsse:Security s:actor="other"/><wsse:Security s:actor="secure_span" Id="ours"/>"#,
        );
        let (found, actor) = find_security_header(&doc, &ProcessorConfig::default()).unwrap();
        assert_eq!(doc.attribute(found, "Id"), Some("ours"));
        assert_eq!(actor, SecurityActor::Recipient("secure_span".into()));
        assert!(actor.is_explicit());
    }

    #[test]
    fn test_configured_recipient_actor() {
        let doc = envelope(r#"<wsse:Security s:actor="secure_span"/><wsse:Security s:actor="urn:gateway" Id="ours"/>"#);
        let config = ProcessorConfig {
            recipient_actors: vec!["urn:gateway".into()],
            ..ProcessorConfig::default()
        };
        let (found, actor) = find_security_header(&doc, &config).unwrap();
        assert_eq!(doc.attribute(found, "Id"), Some("ours"));
        assert_eq!(actor, SecurityActor::Recipient("urn:gateway".into()));
    }

    #[test]
    fn test_falls_back_to_no_actor() {
        let doc = envelope(r#"<wsse:Security s:actor="other"/><wsse:Security Id="plain"/>"#);
        let (found, actor) = find_security_header(&doc, &ProcessorConfig::default()).unwrap();
        assert_eq!(doc.attribute(found, "Id"), Some("plain"));
        assert_eq!(actor, SecurityActor::NoActor);
    }

    #[test]
    fn test_no_header_for_us() {
        let doc = envelope(r#"<wsse:Security s:actor="other"/>"#);
        assert!(find_security_header(&doc, &ProcessorConfig::default()).is_none());
    }

    #[test]
    fn test_soap12_role() {
        let doc = Document::parse(&format!(
            r#"<e:Envelope xmlns:e="{}" xmlns:wsse="{}"><e:Header><wsse:Security e:role="http://www.layer7tech.com/ws/policy"/></e:Header><e:Body/></e:Envelope>"#,
            ns::SOAP_1_2,
            ns::WSSE
        ))
        .unwrap();
        let (_, actor) = find_security_header(&doc, &ProcessorConfig::default()).unwrap();
        assert_eq!(actor, SecurityActor::Recipient(ns::L7_ACTOR_URI.into()));
    }

    #[test]
    fn test_must_understand_addressed_to_us() {
        let doc = envelope(r#"<x:Custom xmlns:x="urn:x" s:mustUnderstand="1" s:actor="SecureSpan"/>"#);
        assert!(matches!(
            reject_if_headers_not_understood(&doc),
            Err(Error::InvalidDocumentFormat(_))
        ));

        let doc = envelope(r#"<x:Custom xmlns:x="urn:x" s:mustUnderstand="true" s:actor="http://schemas.xmlsoap.org/soap/actor/next"/>"#);
        assert!(reject_if_headers_not_understood(&doc).is_err());
    }

    #[test]
    fn test_must_understand_ignored_cases() {
        for headers in [
            r#"<x:Custom xmlns:x="urn:x" s:mustUnderstand="0" s:actor="SecureSpan"/>"#,
            r#"<x:Custom xmlns:x="urn:x" s:mustUnderstand="1" s:actor="someone-else"/>"#,
            r#"<x:Custom xmlns:x="urn:x" s:mustUnderstand="1"/>"#,
            r#"<wsse:Security s:mustUnderstand="1" s:actor="SecureSpan"/>"#,
        ] {
            assert!(reject_if_headers_not_understood(&envelope(headers)).is_ok(), "{headers}");
        }
    }
}
