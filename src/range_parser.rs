//! `Range` header parsing against a known content length
//!
//! Ranges are validated strictly: one malformed or out-of-bounds piece makes
//! the whole header unsatisfiable, and bounds are never clamped. A request such
//! as `bytes=0-20000` against a 10000 byte entity is rejected rather than
//! truncated.

use crate::headers::ConsumedHeader;
use crate::models::RangeItem;
use http::HeaderMap;
use tracing::debug;

/// Outcome of parsing a `Range` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No `Range` header (or an empty one)
    Unknown,
    /// The header could not be honoured; callers answer 416
    Unsatisfiable,
    /// Every requested range is valid, in request order
    Satisfiable(Vec<RangeItem>),
}

impl RangeOutcome {
    /// The parsed ranges; empty unless satisfiable
    pub fn ranges(&self) -> &[RangeItem] {
        match self {
            RangeOutcome::Satisfiable(ranges) => ranges,
            RangeOutcome::Unknown | RangeOutcome::Unsatisfiable => &[],
        }
    }

    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, RangeOutcome::Unsatisfiable)
    }
}

/// Parser for the `bytes` range unit
pub struct RangeParser;

impl RangeParser {
    /// Parse the `Range` header of a request
    pub fn from_headers(headers: &HeaderMap, content_length: u64) -> RangeOutcome {
        Self::parse(ConsumedHeader::Range.get(headers), content_length)
    }

    /// Parse a raw `Range` value against `content_length`
    ///
    /// Spaces are ignored and the `bytes=` prefix is optional. Each
    /// comma-separated piece must be `start-end`, `start-` or `-suffix`:
    /// * an empty end means the last byte of the entity
    /// * an empty start turns the end value into a suffix length, counted
    ///   back from the end of the entity
    pub fn parse(range_header: Option<&str>, content_length: u64) -> RangeOutcome {
        let Some(header) = range_header else {
            return RangeOutcome::Unknown;
        };

        let compact: String = header.chars().filter(|c| *c != ' ').collect();
        if compact.is_empty() {
            return RangeOutcome::Unknown;
        }

        let range_set = strip_unit(&compact);
        let length = i64::try_from(content_length).unwrap_or(i64::MAX);

        let mut ranges = Vec::new();
        for piece in range_set.split(',') {
            match parse_piece(piece, length) {
                Some(range) => ranges.push(range),
                None => {
                    debug!(
                        "Unsatisfiable Range {:?}: piece {:?} invalid for length {}",
                        header, piece, content_length
                    );
                    return RangeOutcome::Unsatisfiable;
                }
            }
        }

        debug!(
            "Parsed Range {:?} into {} range(s) for length {}",
            header,
            ranges.len(),
            content_length
        );
        RangeOutcome::Satisfiable(ranges)
    }
}

fn strip_unit(value: &str) -> &str {
    match value.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bytes=") => &value[6..],
        _ => value,
    }
}

fn parse_piece(piece: &str, length: i64) -> Option<RangeItem> {
    let mut parts = piece.split('-');
    let (Some(start_part), Some(end_part), None) = (parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let mut end = if end_part.is_empty() {
        length - 1
    } else {
        end_part.parse::<i64>().ok()?
    };

    let start = if start_part.is_empty() {
        // "-N": the value parsed as end is the suffix length
        let start = length.checked_sub(end)?;
        end = length - 1;
        start
    } else {
        start_part.parse::<i64>().ok()?
    };

    let last = length - 1;
    if start < 0 || end < 0 || start > last || end > last || end < start {
        return None;
    }

    // Bounds checked above, both values are non-negative
    Some(RangeItem {
        start: start as u64,
        end: end as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(outcome: RangeOutcome) -> Vec<(u64, u64)> {
        match outcome {
            RangeOutcome::Satisfiable(r) => r.into_iter().map(|r| (r.start, r.end)).collect(),
            other => panic!("Expected Satisfiable, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_header_is_unknown() {
        assert_eq!(RangeParser::parse(None, 100), RangeOutcome::Unknown);
        assert_eq!(RangeParser::parse(Some(""), 100), RangeOutcome::Unknown);
        assert_eq!(RangeParser::parse(Some("   "), 100), RangeOutcome::Unknown);
        assert!(RangeOutcome::Unknown.ranges().is_empty());
    }

    #[test]
    fn test_standard_forms() {
        assert_eq!(ranges(RangeParser::parse(Some("bytes=0-499"), 10000)), vec![(0, 499)]);
        assert_eq!(ranges(RangeParser::parse(Some("bytes=9500-"), 10000)), vec![(9500, 9999)]);
        assert_eq!(ranges(RangeParser::parse(Some("bytes=-500"), 10000)), vec![(9500, 9999)]);
        assert_eq!(ranges(RangeParser::parse(Some("bytes=-1"), 10000)), vec![(9999, 9999)]);
    }

    #[test]
    fn test_spaces_and_case() {
        assert_eq!(
            ranges(RangeParser::parse(Some(" bytes = 0 - 4 , 6 - 7 "), 10)),
            vec![(0, 4), (6, 7)]
        );
        assert_eq!(ranges(RangeParser::parse(Some("BYTES=1-2"), 10)), vec![(1, 2)]);
    }

    #[test]
    fn test_multiple_ranges_keep_order() {
        assert_eq!(
            ranges(RangeParser::parse(Some("bytes=500-999,0-499"), 10000)),
            vec![(500, 999), (0, 499)]
        );
    }

    #[test]
    fn test_rejections() {
        let rejected = [
            "bytes=499-0",
            "bytes=0-20000",
            "bytes=10000-",
            "bytes=-20000",
            "bytes=-0",
            "bytes=a-b",
            "bytes=0-1-2",
            "bytes=5",
            "bytes=0-1,",
            "bytes=0-1,9-2",
            "items=0-1",
        ];
        for raw in rejected {
            assert_eq!(
                RangeParser::parse(Some(raw), 10000),
                RangeOutcome::Unsatisfiable,
                "input {raw}"
            );
        }
    }

    #[test]
    fn test_one_bad_piece_rejects_all() {
        let outcome = RangeParser::parse(Some("bytes=0-1,5-20000"), 10000);
        assert!(outcome.is_unsatisfiable());
        assert!(outcome.ranges().is_empty());
    }

    #[test]
    fn test_empty_entity_has_no_satisfiable_range() {
        assert!(RangeParser::parse(Some("bytes=0-"), 0).is_unsatisfiable());
        assert!(RangeParser::parse(Some("bytes=-1"), 0).is_unsatisfiable());
    }

    #[test]
    fn test_bounds_beyond_32_bits() {
        let length = 5 * 1024 * 1024 * 1024u64;
        assert_eq!(
            ranges(RangeParser::parse(Some("bytes=4294967296-4294967299"), length)),
            vec![(4294967296, 4294967299)]
        );
    }

    #[test]
    fn test_dash_only_reads_as_suffix_of_whole_length() {
        // empty end resolves to length-1 first, then the empty start treats
        // it as a suffix length
        assert_eq!(ranges(RangeParser::parse(Some("bytes=-"), 10)), vec![(1, 9)]);
    }
}
