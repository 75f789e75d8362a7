//! Conditional request evaluation (RFC 7232 validators, plus `If-Range`)
//!
//! Every check answers with a tri-state `Option<bool>`:
//! * `None` - the header is absent or its date does not parse; the caller
//!   must not reject the request because of it
//! * `Some(true)` / `Some(false)` - the condition holds or does not
//!
//! Date comparisons happen at the one-second resolution of HTTP dates, so an
//! entity modified at `08:49:37.600` is considered unmodified since
//! `Sun, 06 Nov 1994 08:49:37 GMT`. Modification times outside the range an
//! HTTP date can express still compare: anything before 1970 is older than
//! every header date, anything past year 9999 newer.

use crate::header_value::HeaderValueParser;
use crate::headers::ConsumedHeader;
use http::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Evaluates the validators carried by one request
pub struct ConditionalRequest<'a> {
    headers: &'a HeaderMap,
}

impl<'a> ConditionalRequest<'a> {
    pub fn new(headers: &'a HeaderMap) -> Self {
        ConditionalRequest { headers }
    }

    /// `If-Modified-Since`: true iff the entity changed after the given date
    pub fn check_if_modified_since(&self, last_modified: SystemTime) -> Option<bool> {
        let since = self.header_date(ConsumedHeader::IfModifiedSince)?;
        Some(whole_seconds(last_modified) > since)
    }

    /// `If-Unmodified-Since`: true iff the entity did not change after the date
    pub fn check_if_unmodified_since(&self, last_modified: SystemTime) -> Option<bool> {
        let since = self.header_date(ConsumedHeader::IfUnmodifiedSince)?;
        Some(whole_seconds(last_modified) <= since)
    }

    /// `Unless-Modified-Since`: same semantics as `If-Unmodified-Since`
    pub fn check_unless_modified_since(&self, last_modified: SystemTime) -> Option<bool> {
        let since = self.header_date(ConsumedHeader::UnlessModifiedSince)?;
        Some(whole_seconds(last_modified) <= since)
    }

    /// `If-Range`: whether the `Range` header may be honoured
    ///
    /// Only evaluated when a `Range` header is present. A value that parses
    /// as an HTTP date is compared against `last_modified`; anything else is
    /// an opaque entity tag compared byte-for-byte.
    pub fn check_if_range(&self, entity_tag: &str, last_modified: SystemTime) -> Option<bool> {
        ConsumedHeader::Range.get(self.headers)?;
        let value = ConsumedHeader::IfRange.get(self.headers)?.trim();

        let result = match httpdate::parse_http_date(value) {
            Ok(date) => whole_seconds(last_modified) <= date,
            Err(_) => value == entity_tag,
        };
        debug!("If-Range {:?} evaluated to {}", value, result);
        Some(result)
    }

    /// `If-Match`: `*` matches any existing entity, otherwise any listed tag
    /// must equal `entity_tag` exactly
    pub fn check_if_match(&self, entity_tag: &str, entity_exists: bool) -> Option<bool> {
        let value = self.list_header(ConsumedHeader::IfMatch)?;
        if value.trim() == "*" {
            return Some(entity_exists);
        }
        Some(
            HeaderValueParser::parse_identities(&value)
                .into_iter()
                .any(|tag| tag == entity_tag),
        )
    }

    /// `If-None-Match`: `*` holds only when the entity is missing, otherwise
    /// true iff no listed tag equals `entity_tag`
    pub fn check_if_none_match(&self, entity_tag: &str, entity_exists: bool) -> Option<bool> {
        let value = self.list_header(ConsumedHeader::IfNoneMatch)?;
        if value.trim() == "*" {
            return Some(!entity_exists);
        }
        Some(
            !HeaderValueParser::parse_identities(&value)
                .into_iter()
                .any(|tag| tag == entity_tag),
        )
    }

    fn header_date(&self, header: ConsumedHeader) -> Option<SystemTime> {
        let raw = header.get(self.headers)?;
        match httpdate::parse_http_date(raw.trim()) {
            Ok(date) => Some(date),
            Err(_) => {
                debug!("Ignoring unparseable {} value {:?}", header.name(), raw);
                None
            }
        }
    }

    // List headers may be split over several field lines; join them back.
    fn list_header(&self, header: ConsumedHeader) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(header.name())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(","))
        }
    }
}

// Drop sub-second precision; HTTP dates cannot carry it. Times before the
// epoch are left alone, they already order before any parsed header date.
fn whole_seconds(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since_epoch) => UNIX_EPOCH + Duration::from_secs(since_epoch.as_secs()),
        Err(_) => time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    // Sun, 06 Nov 1994 08:49:37 GMT
    const REFERENCE_SECS: u64 = 784111777;
    const REFERENCE_DATE: &str = "Sun, 06 Nov 1994 08:49:37 GMT";

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_if_modified_since() {
        let map = headers(&[("if-modified-since", REFERENCE_DATE)]);
        let req = ConditionalRequest::new(&map);
        assert_eq!(req.check_if_modified_since(at(REFERENCE_SECS + 1)), Some(true));
        assert_eq!(req.check_if_modified_since(at(REFERENCE_SECS)), Some(false));
        assert_eq!(req.check_if_modified_since(at(REFERENCE_SECS - 60)), Some(false));
    }

    #[test]
    fn test_sub_second_modification_is_not_newer() {
        let map = headers(&[("if-modified-since", REFERENCE_DATE)]);
        let req = ConditionalRequest::new(&map);
        let last_modified = at(REFERENCE_SECS) + Duration::from_millis(600);
        assert_eq!(req.check_if_modified_since(last_modified), Some(false));
    }

    #[test]
    fn test_missing_or_bad_dates_are_unknown() {
        let empty = HeaderMap::new();
        let req = ConditionalRequest::new(&empty);
        assert_eq!(req.check_if_modified_since(at(REFERENCE_SECS)), None);
        assert_eq!(req.check_if_unmodified_since(at(REFERENCE_SECS)), None);

        let map = headers(&[
            ("if-modified-since", "yesterday"),
            ("if-unmodified-since", "not a date"),
        ]);
        let req = ConditionalRequest::new(&map);
        assert_eq!(req.check_if_modified_since(at(REFERENCE_SECS)), None);
        assert_eq!(req.check_if_unmodified_since(at(REFERENCE_SECS)), None);
    }

    #[test]
    fn test_if_unmodified_since_and_unless_variant() {
        let map = headers(&[
            ("if-unmodified-since", REFERENCE_DATE),
            ("unless-modified-since", REFERENCE_DATE),
        ]);
        let req = ConditionalRequest::new(&map);
        assert_eq!(req.check_if_unmodified_since(at(REFERENCE_SECS)), Some(true));
        assert_eq!(req.check_if_unmodified_since(at(REFERENCE_SECS + 1)), Some(false));
        assert_eq!(req.check_unless_modified_since(at(REFERENCE_SECS)), Some(true));
        assert_eq!(req.check_unless_modified_since(at(REFERENCE_SECS + 1)), Some(false));
    }

    #[test]
    fn test_unless_modified_since_reads_its_own_header() {
        let map = headers(&[("if-unmodified-since", REFERENCE_DATE)]);
        let req = ConditionalRequest::new(&map);
        assert_eq!(req.check_unless_modified_since(at(REFERENCE_SECS)), None);
    }

    #[test]
    fn test_if_range_requires_range_header() {
        let map = headers(&[("if-range", "\"abc\"")]);
        let req = ConditionalRequest::new(&map);
        assert_eq!(req.check_if_range("\"abc\"", at(REFERENCE_SECS)), None);

        let map = headers(&[("range", "bytes=0-1")]);
        let req = ConditionalRequest::new(&map);
        assert_eq!(req.check_if_range("\"abc\"", at(REFERENCE_SECS)), None);
    }

    #[test]
    fn test_if_range_entity_tag() {
        let map = headers(&[("range", "bytes=0-1"), ("if-range", "\"abc\"")]);
        let req = ConditionalRequest::new(&map);
        assert_eq!(req.check_if_range("\"abc\"", at(REFERENCE_SECS)), Some(true));
        assert_eq!(req.check_if_range("\"ABC\"", at(REFERENCE_SECS)), Some(false));
    }

    #[test]
    fn test_if_range_date() {
        let map = headers(&[("range", "bytes=0-1"), ("if-range", REFERENCE_DATE)]);
        let req = ConditionalRequest::new(&map);
        assert_eq!(req.check_if_range("\"abc\"", at(REFERENCE_SECS)), Some(true));
        assert_eq!(req.check_if_range("\"abc\"", at(REFERENCE_SECS + 5)), Some(false));
    }

    #[test]
    fn test_if_match() {
        let map = headers(&[("if-match", "*")]);
        let req = ConditionalRequest::new(&map);
        assert_eq!(req.check_if_match("\"a\"", true), Some(true));
        assert_eq!(req.check_if_match("\"a\"", false), Some(false));

        let map = headers(&[("if-match", "\"x\", \"a\"")]);
        let req = ConditionalRequest::new(&map);
        assert_eq!(req.check_if_match("\"a\"", true), Some(true));
        assert_eq!(req.check_if_match("\"A\"", true), Some(false));

        let empty = HeaderMap::new();
        assert_eq!(ConditionalRequest::new(&empty).check_if_match("\"a\"", true), None);
    }

    #[test]
    fn test_if_none_match() {
        let map = headers(&[("if-none-match", "*")]);
        let req = ConditionalRequest::new(&map);
        assert_eq!(req.check_if_none_match("\"a\"", false), Some(true));
        assert_eq!(req.check_if_none_match("\"a\"", true), Some(false));

        let map = headers(&[("if-none-match", "\"x\""), ("if-none-match", "\"a\"")]);
        let req = ConditionalRequest::new(&map);
        assert_eq!(req.check_if_none_match("\"a\"", true), Some(false));
        assert_eq!(req.check_if_none_match("\"b\"", true), Some(true));
    }

    #[test]
    fn test_quoted_tags_with_commas() {
        let map = headers(&[("if-match", "\"a,b\", \"c\"")]);
        let req = ConditionalRequest::new(&map);
        assert_eq!(req.check_if_match("\"a,b\"", true), Some(true));
        assert_eq!(req.check_if_match("\"a", true), Some(false));
    }

    #[test]
    fn test_pre_epoch_modification_time() {
        let map = headers(&[
            ("range", "bytes=0-1"),
            ("if-range", REFERENCE_DATE),
            ("if-modified-since", REFERENCE_DATE),
            ("if-unmodified-since", REFERENCE_DATE),
            ("unless-modified-since", "Thu, 01 Jan 1970 00:00:00 GMT"),
        ]);
        let req = ConditionalRequest::new(&map);
        let before_epoch = UNIX_EPOCH - Duration::from_secs(86_400);

        assert_eq!(req.check_if_modified_since(before_epoch), Some(false));
        assert_eq!(req.check_if_unmodified_since(before_epoch), Some(true));
        assert_eq!(req.check_unless_modified_since(before_epoch), Some(true));
        assert_eq!(req.check_if_range("\"abc\"", before_epoch), Some(true));

        let just_before = UNIX_EPOCH - Duration::from_millis(1);
        assert_eq!(req.check_unless_modified_since(just_before), Some(true));
    }

    #[test]
    fn test_far_future_modification_time() {
        let map = headers(&[
            ("range", "bytes=0-1"),
            ("if-range", REFERENCE_DATE),
            ("if-modified-since", REFERENCE_DATE),
            ("if-unmodified-since", REFERENCE_DATE),
            ("unless-modified-since", REFERENCE_DATE),
        ]);
        let req = ConditionalRequest::new(&map);
        // Beyond year 9999
        let far_future = UNIX_EPOCH + Duration::from_secs(300_000_000_000);

        assert_eq!(req.check_if_modified_since(far_future), Some(true));
        assert_eq!(req.check_if_unmodified_since(far_future), Some(false));
        assert_eq!(req.check_unless_modified_since(far_future), Some(false));
        assert_eq!(req.check_if_range("\"abc\"", far_future), Some(false));
    }
}
