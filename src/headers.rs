//! Header names read and written by the delivery core

use http::header::{self, HeaderName};
use http::HeaderMap;

/// Non-standard counterpart of `If-Unmodified-Since` honoured by the core
pub const UNLESS_MODIFIED_SINCE: HeaderName = HeaderName::from_static("unless-modified-since");

/// Request headers the core interprets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumedHeader {
    AcceptEncoding,
    Range,
    IfRange,
    IfMatch,
    IfNoneMatch,
    IfModifiedSince,
    IfUnmodifiedSince,
    UnlessModifiedSince,
}

impl ConsumedHeader {
    pub const ALL: [ConsumedHeader; 8] = [
        ConsumedHeader::AcceptEncoding,
        ConsumedHeader::Range,
        ConsumedHeader::IfRange,
        ConsumedHeader::IfMatch,
        ConsumedHeader::IfNoneMatch,
        ConsumedHeader::IfModifiedSince,
        ConsumedHeader::IfUnmodifiedSince,
        ConsumedHeader::UnlessModifiedSince,
    ];

    pub fn name(&self) -> HeaderName {
        match self {
            ConsumedHeader::AcceptEncoding => header::ACCEPT_ENCODING,
            ConsumedHeader::Range => header::RANGE,
            ConsumedHeader::IfRange => header::IF_RANGE,
            ConsumedHeader::IfMatch => header::IF_MATCH,
            ConsumedHeader::IfNoneMatch => header::IF_NONE_MATCH,
            ConsumedHeader::IfModifiedSince => header::IF_MODIFIED_SINCE,
            ConsumedHeader::IfUnmodifiedSince => header::IF_UNMODIFIED_SINCE,
            ConsumedHeader::UnlessModifiedSince => UNLESS_MODIFIED_SINCE,
        }
    }

    /// Case-insensitive lookup of a header name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|h| h.name().as_str().eq_ignore_ascii_case(name))
    }

    /// Read this header from a request as text
    ///
    /// Absent headers and values that are not visible ASCII both read as
    /// `None`; the core treats them identically.
    pub fn get<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers.get(self.name()).and_then(|v| v.to_str().ok())
    }
}

/// Response headers the core emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProducedHeader {
    ContentEncoding,
    ContentLength,
    ContentType,
    ContentRange,
    AcceptRanges,
}

impl ProducedHeader {
    pub fn name(&self) -> HeaderName {
        match self {
            ProducedHeader::ContentEncoding => header::CONTENT_ENCODING,
            ProducedHeader::ContentLength => header::CONTENT_LENGTH,
            ProducedHeader::ContentType => header::CONTENT_TYPE,
            ProducedHeader::ContentRange => header::CONTENT_RANGE,
            ProducedHeader::AcceptRanges => header::ACCEPT_RANGES,
        }
    }
}
