#![forbid(unsafe_code)]

//! Same-document URI references.
//!
//! WS-Security references are `#id` fragments, `cid:` attachment
//! references, or the empty URI. XPointer forms are recognized only so
//! that they can be rejected.

/// Parse a same-document reference (`#foo` → `foo`).
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    uri.strip_prefix('#').filter(|id| !id.is_empty() && !id.starts_with("xpointer("))
}

/// True for `#xpointer(...)` references.
pub fn is_xpointer(uri: &str) -> bool {
    uri.strip_prefix('#').is_some_and(|s| s.starts_with("xpointer("))
}

/// Parse a MIME attachment reference (`cid:part1` → `part1`).
pub fn parse_attachment_ref(uri: &str) -> Option<&str> {
    uri.strip_prefix("cid:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_shapes() {
        assert_eq!(parse_same_document_ref("#Timestamp-1"), Some("Timestamp-1"));
        assert_eq!(parse_same_document_ref("#"), None);
        assert_eq!(parse_same_document_ref("#xpointer(/)"), None);
        assert!(is_xpointer("#xpointer(id('a'))"));
        assert!(!is_xpointer("#a"));
        assert_eq!(parse_attachment_ref("cid:att"), Some("att"));
        assert_eq!(parse_attachment_ref("#a"), None);
    }
}
