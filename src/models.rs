//! Core data models for entity delivery

use crate::error::{DeliveryError, Result};
use http::{HeaderMap, HeaderValue};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Content coding of an entity at rest, or of a response on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionType {
    /// Identity coding
    #[default]
    None,
    /// gzip (also accepted as `x-gzip`)
    GZip,
    /// deflate
    Deflate,
}

impl CompressionType {
    /// Map a content-coding token to a compression type, case-insensitively
    ///
    /// Returns `None` for codings this crate cannot produce.
    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("gzip") || token.eq_ignore_ascii_case("x-gzip") {
            Some(CompressionType::GZip)
        } else if token.eq_ignore_ascii_case("deflate") {
            Some(CompressionType::Deflate)
        } else if token.eq_ignore_ascii_case("identity") {
            Some(CompressionType::None)
        } else {
            None
        }
    }

    /// The `Content-Encoding` token for this coding, `None` for identity
    pub fn content_encoding(&self) -> Option<&'static str> {
        match self {
            CompressionType::None => None,
            CompressionType::GZip => Some("gzip"),
            CompressionType::Deflate => Some("deflate"),
        }
    }

    pub fn is_compressed(&self) -> bool {
        *self != CompressionType::None
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_encoding().unwrap_or("identity"))
    }
}

/// Request method as seen by the delivery core
///
/// Only `Get` and `Head` can carry an entity body decision; every other
/// method is rejected by [`crate::PreparedResponse::send_body`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Put,
    Post,
    Delete,
    Options,
    Trace,
    Connect,
    Other,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Other => "OTHER",
        }
    }

    /// Whether entity bodies are negotiated for this method
    pub fn is_body_method(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head)
    }
}

impl From<&str> for HttpMethod {
    /// Method tokens are case-sensitive; anything unrecognised is `Other`.
    fn from(method: &str) -> Self {
        match method {
            "GET" => HttpMethod::Get,
            "HEAD" => HttpMethod::Head,
            "PUT" => HttpMethod::Put,
            "POST" => HttpMethod::Post,
            "DELETE" => HttpMethod::Delete,
            "OPTIONS" => HttpMethod::Options,
            "TRACE" => HttpMethod::Trace,
            "CONNECT" => HttpMethod::Connect,
            _ => HttpMethod::Other,
        }
    }
}

impl From<&http::Method> for HttpMethod {
    fn from(method: &http::Method) -> Self {
        HttpMethod::from(method.as_str())
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inclusive byte interval inside an entity
///
/// Produced by [`crate::RangeParser`] only after validation, so
/// `start <= end < content_length` always holds for parsed items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeItem {
    /// First byte offset (inclusive)
    pub start: u64,
    /// Last byte offset (inclusive)
    pub end: u64,
}

impl RangeItem {
    /// Create a new RangeItem
    ///
    /// # Returns
    /// * `Ok(RangeItem)` if `start <= end`
    /// * `Err(DeliveryError)` otherwise
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(DeliveryError::InvalidHeader(format!(
                "range start ({}) must be <= end ({})",
                start, end
            )));
        }
        Ok(RangeItem { start, end })
    }

    /// Number of bytes covered by this range
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A valid range is never empty; provided for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for this range within an entity of `total` bytes
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Metadata of the entity being served
///
/// Immutable for the duration of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInfo {
    /// Stored length in bytes (of the encoded form when `compression` is set)
    pub content_length: u64,
    /// Media type sent as `Content-Type`
    pub content_type: String,
    /// Coding the entity is stored in
    pub compression: CompressionType,
    /// Opaque entity tag, compared byte-for-byte by conditional checks
    pub etag: Option<String>,
    /// Last modification time
    pub last_modified: Option<SystemTime>,
}

impl EntityInfo {
    /// Create metadata for an uncompressed entity without validators
    pub fn new(content_length: u64, content_type: impl Into<String>) -> Self {
        EntityInfo {
            content_length,
            content_type: content_type.into(),
            compression: CompressionType::None,
            etag: None,
            last_modified: None,
        }
    }

    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: SystemTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Write `ETag` and `Last-Modified` for whichever validators are known
    ///
    /// A modification time an HTTP date cannot express (before 1970 or past
    /// year 9999) is left out rather than sent wrong.
    pub fn write_validators(&self, headers: &mut HeaderMap) -> Result<()> {
        if let Some(etag) = &self.etag {
            headers.insert(
                http::header::ETAG,
                HeaderValue::from_str(etag)
                    .map_err(|e| DeliveryError::InvalidHeader(format!("ETag {:?}: {}", etag, e)))?,
            );
        }

        if let Some(last_modified) = self.last_modified {
            let Some(formatted) = format_http_date(last_modified) else {
                warn!("Omitting Last-Modified: {:?} is not a valid HTTP date", last_modified);
                return Ok(());
            };
            headers.insert(
                http::header::LAST_MODIFIED,
                HeaderValue::from_str(&formatted)
                    .map_err(|e| DeliveryError::InvalidHeader(format!("Last-Modified: {}", e)))?,
            );
        }

        Ok(())
    }
}

// Fri, 31 Dec 9999 23:59:59 GMT
const MAX_HTTP_DATE_SECS: u64 = 253_402_300_799;

/// IMF-fixdate for `time`, `None` outside 1970 through year 9999
fn format_http_date(time: SystemTime) -> Option<String> {
    let since_epoch = time.duration_since(UNIX_EPOCH).ok()?;
    if since_epoch > Duration::from_secs(MAX_HTTP_DATE_SECS) {
        return None;
    }
    Some(httpdate::fmt_http_date(time))
}
