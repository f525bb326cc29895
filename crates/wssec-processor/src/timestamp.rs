#![forbid(unsafe_code)]

//! `wsu:Timestamp`.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use wssec_core::{ns, Error, Result};
use wssec_xml::{Document, NodeId};

/// A Created or Expires value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampDate {
    pub value: DateTime<Utc>,
    /// The text as it appeared in the message.
    pub raw: String,
}

impl TimestampDate {
    /// Parse an xsd:dateTime. Values without a zone are taken as UTC.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let value = DateTime::parse_from_rfc3339(trimmed)
            .map(|d| d.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc())
            })
            .map_err(|e| Error::InvalidDocumentFormat(format!("bad Timestamp date {trimmed:?}: {e}")))?;
        Ok(Self {
            value,
            raw: trimmed.to_owned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    pub element: NodeId,
    pub created: Option<TimestampDate>,
    pub expires: Option<TimestampDate>,
    /// Covered by at least one verified signature.
    pub signed: bool,
}

impl Timestamp {
    pub fn parse(doc: &Document, element: NodeId) -> Result<Self> {
        let wsu = doc
            .namespace_uri(element)
            .filter(|u| ns::is_utility_ns(u))
            .ok_or_else(|| Error::InvalidDocumentFormat("Timestamp is not in a utility namespace".into()))?;

        let single = |name: &str| -> Result<Option<TimestampDate>> {
            match doc.find_children(element, wsu, name).as_slice() {
                [] => Ok(None),
                [one] => TimestampDate::parse(&doc.text_content(*one)).map(Some),
                _ => Err(Error::InvalidDocumentFormat(format!(
                    "Timestamp has more than one {name}"
                ))),
            }
        };

        Ok(Self {
            element,
            created: single(ns::node::CREATED)?,
            expires: single(ns::node::EXPIRES)?,
            signed: false,
        })
    }

    /// True when Expires is present and earlier than `now - skew`.
    pub fn is_expired(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires.as_ref().is_some_and(|e| e.value + skew < now)
    }

    /// True when Created lies beyond `now + skew`.
    pub fn is_created_in_future(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.created.as_ref().is_some_and(|c| c.value - skew > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(inner: &str) -> Result<Timestamp> {
        let xml = format!(r#"<wsu:Timestamp xmlns:wsu="{}">{inner}</wsu:Timestamp>"#, ns::WSU);
        let doc = Document::parse(&xml).unwrap();
        Timestamp::parse(&doc, doc.root_element().unwrap())
    }

    #[test]
    fn test_date_forms() {
        let z = TimestampDate::parse("2024-03-01T10:00:00Z").unwrap();
        let frac = TimestampDate::parse("2024-03-01T10:00:00.250Z").unwrap();
        let offset = TimestampDate::parse("2024-03-01T12:00:00+02:00").unwrap();
        let naive = TimestampDate::parse(" 2024-03-01T10:00:00 ").unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(z.value, expected);
        assert_eq!(offset.value, expected);
        assert_eq!(naive.value, expected);
        assert_eq!(naive.raw, "2024-03-01T10:00:00");
        assert_eq!(frac.value, expected + Duration::milliseconds(250));
        assert!(TimestampDate::parse("yesterday").is_err());
    }

    #[test]
    fn test_expiry() {
        let ts = parse(
            "<wsu:Created>2024-03-01T10:00:00Z</wsu:Created><wsu:Expires>2024-03-01T10:05:00Z</wsu:Expires>",
        )
        .unwrap();
        let at = |m: u32| Utc.with_ymd_and_hms(2024, 3, 1, 10, m, 0).unwrap();
        assert!(!ts.is_expired(at(4), Duration::zero()));
        assert!(ts.is_expired(at(6), Duration::zero()));
        assert!(!ts.is_expired(at(6), Duration::minutes(2)));
        assert!(!ts.is_created_in_future(at(0), Duration::zero()));
        assert!(ts.is_created_in_future(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(), Duration::zero()));
    }

    #[test]
    fn test_optional_children() {
        let ts = parse("").unwrap();
        assert!(ts.created.is_none());
        assert!(!ts.is_expired(Utc::now(), Duration::zero()));
    }

    #[test]
    fn test_duplicate_created_rejected() {
        let err = parse("<wsu:Created>2024-03-01T10:00:00Z</wsu:Created><wsu:Created>2024-03-01T10:00:00Z</wsu:Created>")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDocumentFormat(_)));
    }
}
