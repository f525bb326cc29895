#![forbid(unsafe_code)]

//! WS-Security 1.1 SignatureConfirmation.
//!
//! A reply confirms the signatures of the request it answers by echoing
//! their SignatureValues. A single confirmation without a Value says the
//! request carried no signatures. Violations are collected, not raised;
//! the caller decides whether to enforce them.

use std::collections::{BTreeMap, HashMap};

use wssec_xml::NodeId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureConfirmation {
    values: BTreeMap<String, NodeId>,
    null_confirmation: Option<NodeId>,
    errors: Vec<String>,
}

/// Rules that shape [`SignatureConfirmation::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub strict: bool,
    /// WS-Security 1.1 was configured for the exchange.
    pub wss11_configured: bool,
    /// The message itself used WS-Security 1.1 features.
    pub wss11_seen: bool,
}

impl SignatureConfirmation {
    /// Record a confirmation element and its `Value`, if any.
    pub fn record(&mut self, value: Option<&str>, element: NodeId) {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => {
                self.values.insert(v.to_owned(), element);
            }
            None => self.null_confirmation = Some(element),
        }
    }

    pub fn confirmed_values(&self) -> impl Iterator<Item = &str> + '_ {
        self.values.keys().map(String::as_str)
    }

    pub fn element_for(&self, value: &str) -> Option<NodeId> {
        self.values.get(value).copied()
    }

    pub fn has_null_value(&self) -> bool {
        self.null_confirmation.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.null_confirmation.is_none()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Check the confirmations against `request_signatures`, the
    /// SignatureValues of the request mapped to whether each was sent
    /// encrypted. `is_encrypted` says whether a confirmation element
    /// arrived encrypted in this message.
    pub fn validate(
        &mut self,
        request_signatures: &HashMap<String, bool>,
        policy: ConfirmationPolicy,
        is_encrypted: impl Fn(NodeId) -> bool,
    ) {
        let mut errors = Vec::new();

        if self.is_empty() {
            if policy.wss11_configured || (policy.wss11_seen && policy.strict) {
                errors.push("Response does not contain SignatureConfirmation element(s)".to_owned());
            }
        } else if self.values.is_empty() {
            if (policy.strict || policy.wss11_configured) && !request_signatures.is_empty() {
                errors.push(
                    "Response SignatureConfirmation has no value but the request was signed".to_owned(),
                );
            }
        } else {
            if policy.strict && self.null_confirmation.is_some() {
                errors.push("SignatureConfirmation without a value mixed with valued confirmations".to_owned());
            }
            let mut request: Vec<(&String, &bool)> = request_signatures.iter().collect();
            request.sort();
            for (value, encrypted) in request {
                match self.values.get(value) {
                    None => errors.push(format!("Request signature was not confirmed: {value}")),
                    Some(element) if policy.strict && *encrypted && !is_encrypted(*element) => {
                        errors.push(format!(
                            "Encrypted request signature confirmed without encryption: {value}"
                        ))
                    }
                    Some(_) => {}
                }
            }
            if policy.strict {
                for value in self.values.keys() {
                    if !request_signatures.contains_key(value) {
                        errors.push(format!("Unexpected SignatureConfirmation value: {value}"));
                    }
                }
            }
        }

        self.errors.extend(errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRICT: ConfirmationPolicy = ConfirmationPolicy {
        strict: true,
        wss11_configured: false,
        wss11_seen: true,
    };

    fn node(i: usize) -> NodeId {
        NodeId::new(i)
    }

    fn request(values: &[(&str, bool)]) -> HashMap<String, bool> {
        values.iter().map(|(v, e)| (v.to_string(), *e)).collect()
    }

    #[test]
    fn test_echoed_value_is_valid() {
        let mut sc = SignatureConfirmation::default();
        sc.record(Some("V"), node(1));
        sc.validate(&request(&[("V", false)]), STRICT, |_| false);
        assert!(sc.is_valid(), "{:?}", sc.errors());
    }

    #[test]
    fn test_null_confirmation_for_signed_request() {
        let mut sc = SignatureConfirmation::default();
        sc.record(None, node(1));
        assert!(sc.has_null_value());
        sc.validate(&request(&[("V", false)]), STRICT, |_| false);
        assert_eq!(sc.errors().len(), 1);

        let mut lenient = SignatureConfirmation::default();
        lenient.record(None, node(1));
        lenient.validate(
            &request(&[("V", false)]),
            ConfirmationPolicy { strict: false, ..STRICT },
            |_| false,
        );
        assert!(lenient.is_valid());
    }

    #[test]
    fn test_missing_confirmations() {
        let mut sc = SignatureConfirmation::default();
        sc.validate(&request(&[("V", false)]), STRICT, |_| false);
        assert!(!sc.is_valid());

        let mut lenient = SignatureConfirmation::default();
        lenient.validate(
            &request(&[("V", false)]),
            ConfirmationPolicy {
                strict: false,
                wss11_configured: false,
                wss11_seen: true,
            },
            |_| false,
        );
        assert!(lenient.is_valid());

        let mut configured = SignatureConfirmation::default();
        configured.validate(
            &request(&[]),
            ConfirmationPolicy {
                strict: false,
                wss11_configured: true,
                wss11_seen: false,
            },
            |_| false,
        );
        assert!(!configured.is_valid());
    }

    #[test]
    fn test_unconfirmed_and_unexpected() {
        let mut sc = SignatureConfirmation::default();
        sc.record(Some("X"), node(1));
        sc.validate(&request(&[("V", false)]), STRICT, |_| false);
        assert_eq!(sc.errors().len(), 2);
        assert!(sc.errors()[0].contains("not confirmed"));
        assert!(sc.errors()[1].contains("Unexpected"));
    }

    #[test]
    fn test_encrypted_request_needs_encrypted_confirmation() {
        let mut sc = SignatureConfirmation::default();
        sc.record(Some("V"), node(4));
        sc.validate(&request(&[("V", true)]), STRICT, |_| false);
        assert_eq!(sc.errors().len(), 1);

        let mut ok = SignatureConfirmation::default();
        ok.record(Some("V"), node(4));
        ok.validate(&request(&[("V", true)]), STRICT, |n| n == node(4));
        assert!(ok.is_valid());
    }
}
